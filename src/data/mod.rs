//! CSV exchange format for feature tables.
//!
//! The upstream merge stage hands over a minute-aligned table with a header
//! row. Columns whose non-blank cells all parse as numbers load as numeric
//! (blank cells become NaN); everything else loads as text.

use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::types::{format_number, Column, FeatureFrame};

pub fn read_csv(path: &Path) -> Result<FeatureFrame> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();

    let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    for record in reader.records() {
        let record = record?;
        for (j, column) in cells.iter_mut().enumerate() {
            column.push(record.get(j).unwrap_or("").trim().to_string());
        }
    }

    let mut frame = FeatureFrame::new();
    for (name, raw) in headers.into_iter().zip(cells) {
        frame.insert(name, parse_column(raw))?;
    }
    debug!("Read {} rows x {} columns from {}", frame.len(), frame.column_names().len(), path.display());
    Ok(frame)
}

fn parse_column(raw: Vec<String>) -> Column {
    let parsed: Option<Vec<f64>> = raw
        .iter()
        .map(|cell| {
            if cell.is_empty() {
                Some(f64::NAN)
            } else {
                cell.parse::<f64>().ok()
            }
        })
        .collect();

    match parsed {
        Some(values) if raw.iter().any(|c| !c.is_empty()) => Column::Numeric(values),
        _ => Column::Text(raw),
    }
}

pub fn write_csv(frame: &FeatureFrame, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(frame.column_names())?;

    let columns: Vec<&Column> = frame
        .column_names()
        .iter()
        .filter_map(|name| frame.column(name))
        .collect();
    for i in 0..frame.len() {
        let record: Vec<String> = columns
            .iter()
            .map(|column| match column {
                Column::Numeric(values) => format_number(values[i]),
                Column::Text(values) => values[i].clone(),
            })
            .collect();
        writer.write_record(&record)?;
    }
    writer.flush()?;
    debug!("Wrote {} rows to {}", frame.len(), path.display());
    Ok(())
}

/// Create the parent directory of an output path
pub fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(PipelineError::Io)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_column_typing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("features.csv");
        fs::write(&path, "minute_close,state,MFI,CVD\n2024-01-01T00:01,A,0.2,1\n2024-01-01T00:02,B,,-3\n").unwrap();

        let frame = read_csv(&path).unwrap();
        assert_eq!(frame.len(), 2);
        assert!(matches!(frame.column("state"), Some(Column::Text(_))));
        assert!(matches!(frame.column("minute_close"), Some(Column::Text(_))));
        let mfi = frame.numeric("MFI").unwrap();
        assert_eq!(mfi[0], 0.2);
        assert!(mfi[1].is_nan());
        assert_eq!(frame.numeric("CVD").unwrap(), &[1.0, -3.0]);
    }

    #[test]
    fn test_write_then_read_keeps_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.csv");
        let frame = FeatureFrame::new()
            .with_numeric("label", vec![0.0, 1.0])
            .unwrap()
            .with_numeric("weight", vec![0.5, 0.25])
            .unwrap();

        write_csv(&frame, &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("label,weight\n0,0.5\n1,0.25"));
        assert_eq!(read_csv(&path).unwrap(), frame);
    }
}
