use ndarray::Array2;
use std::collections::BTreeMap;

use crate::error::{PipelineError, Result};

/// Named numeric features of a single row
pub type FeatureVector = BTreeMap<String, f64>;

/// One column of a feature table
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Numeric(Vec<f64>),
    Text(Vec<String>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(values) => values.len(),
            Column::Text(values) => values.len(),
        }
    }

    /// Cell rendered as text. Integral numbers drop the fractional part so
    /// cluster ids read back as "0", "1", ...
    pub fn text_at(&self, index: usize) -> String {
        match self {
            Column::Numeric(values) => format_number(values[index]),
            Column::Text(values) => values[index].clone(),
        }
    }

    fn take(&self, indices: &[usize]) -> Column {
        match self {
            Column::Numeric(values) => Column::Numeric(indices.iter().map(|&i| values[i]).collect()),
            Column::Text(values) => Column::Text(indices.iter().map(|&i| values[i].clone()).collect()),
        }
    }
}

/// Column-oriented feature table with a fixed row count.
///
/// Rows are kept in insertion order; the clusterer and the one-step label lag
/// both rely on that order being the time order of the upstream merge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureFrame {
    names: Vec<String>,
    columns: Vec<Column>,
    len: usize,
}

impl FeatureFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.names.iter().position(|n| n == name).map(|i| &self.columns[i])
    }

    /// Insert or replace a column. The first column fixes the row count.
    pub fn insert(&mut self, name: impl Into<String>, column: Column) -> Result<()> {
        let name = name.into();
        if !self.names.is_empty() && column.len() != self.len {
            return Err(PipelineError::Config(format!(
                "column '{}' has {} rows, frame has {}",
                name,
                column.len(),
                self.len
            )));
        }
        self.len = column.len();
        match self.names.iter().position(|n| *n == name) {
            Some(idx) => self.columns[idx] = column,
            None => {
                self.names.push(name);
                self.columns.push(column);
            }
        }
        Ok(())
    }

    pub fn with_numeric(mut self, name: impl Into<String>, values: Vec<f64>) -> Result<Self> {
        self.insert(name, Column::Numeric(values))?;
        Ok(self)
    }

    pub fn with_text(mut self, name: impl Into<String>, values: Vec<String>) -> Result<Self> {
        self.insert(name, Column::Text(values))?;
        Ok(self)
    }

    /// Fail with a schema error naming every absent column
    pub fn require<S: AsRef<str>>(&self, columns: &[S]) -> Result<()> {
        let missing: Vec<String> = columns
            .iter()
            .map(|c| c.as_ref())
            .filter(|c| !self.has_column(c))
            .map(str::to_string)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::missing(missing))
        }
    }

    pub fn numeric(&self, name: &str) -> Result<&[f64]> {
        match self.column(name) {
            Some(Column::Numeric(values)) => Ok(values),
            Some(Column::Text(_)) => Err(PipelineError::Config(format!(
                "column '{}' is not numeric",
                name
            ))),
            None => Err(PipelineError::missing([name])),
        }
    }

    /// Text view of a column, used for state labels
    pub fn labels(&self, name: &str) -> Result<Vec<String>> {
        let column = self.column(name).ok_or_else(|| PipelineError::missing([name]))?;
        Ok((0..self.len).map(|i| column.text_at(i)).collect())
    }

    /// Last `n` rows (all rows when the frame is shorter)
    pub fn tail(&self, n: usize) -> FeatureFrame {
        let start = self.len.saturating_sub(n);
        let indices: Vec<usize> = (start..self.len).collect();
        self.take(&indices)
    }

    pub fn take(&self, indices: &[usize]) -> FeatureFrame {
        FeatureFrame {
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c.take(indices)).collect(),
            len: indices.len(),
        }
    }

    /// Dense (rows x columns) matrix of the given numeric columns, in the given order
    pub fn select<S: AsRef<str>>(&self, columns: &[S]) -> Result<Array2<f64>> {
        self.require(columns)?;
        let mut data = Array2::zeros((self.len, columns.len()));
        for (j, name) in columns.iter().enumerate() {
            let values = self.numeric(name.as_ref())?;
            for (i, &v) in values.iter().enumerate() {
                data[[i, j]] = v;
            }
        }
        Ok(data)
    }

    /// Numeric cells of one row keyed by column name
    pub fn row(&self, index: usize) -> FeatureVector {
        self.names
            .iter()
            .zip(&self.columns)
            .filter_map(|(name, column)| match column {
                Column::Numeric(values) => Some((name.clone(), values[index])),
                Column::Text(_) => None,
            })
            .collect()
    }

    pub fn rows(&self) -> impl Iterator<Item = FeatureVector> + '_ {
        (0..self.len).map(move |i| self.row(i))
    }

    /// Last non-blank value of a column, rendered as text
    pub fn last_value(&self, name: &str) -> Option<String> {
        let column = self.column(name)?;
        (0..self.len)
            .rev()
            .map(|i| column.text_at(i))
            .find(|v| !v.is_empty() && v != "NaN")
    }
}

pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FeatureFrame {
        FeatureFrame::new()
            .with_numeric("a", vec![1.0, 2.0, 3.0])
            .unwrap()
            .with_numeric("b", vec![4.0, 5.0, 6.0])
            .unwrap()
            .with_text("state", vec!["A".into(), "B".into(), "A".into()])
            .unwrap()
    }

    #[test]
    fn test_select_preserves_column_order() {
        let frame = sample();
        let data = frame.select(&["b", "a"]).unwrap();
        assert_eq!(data.shape(), &[3, 2]);
        assert_eq!(data[[0, 0]], 4.0);
        assert_eq!(data[[2, 1]], 3.0);
    }

    #[test]
    fn test_select_reports_all_missing_columns() {
        let frame = sample();
        match frame.select(&["a", "x", "y"]) {
            Err(PipelineError::Schema { missing }) => assert_eq!(missing, vec!["x", "y"]),
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_tail_and_row() {
        let frame = sample().tail(2);
        assert_eq!(frame.len(), 2);
        let row = frame.row(0);
        assert_eq!(row.get("a"), Some(&2.0));
        assert!(!row.contains_key("state"));
    }

    #[test]
    fn test_numeric_labels_render_as_integers() {
        let frame = FeatureFrame::new().with_numeric("label", vec![0.0, 1.0]).unwrap();
        assert_eq!(frame.labels("label").unwrap(), vec!["0", "1"]);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let result = sample().with_numeric("c", vec![1.0]);
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_last_value_skips_blanks() {
        let frame = FeatureFrame::new()
            .with_text("window_id", vec!["w1".into(), "w2".into(), String::new()])
            .unwrap();
        assert_eq!(frame.last_value("window_id").as_deref(), Some("w2"));
    }
}
