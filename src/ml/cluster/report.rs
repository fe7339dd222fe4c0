use chrono::{SecondsFormat, Utc};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use tracing::debug;

use crate::data::{ensure_parent, write_csv};
use crate::error::Result;
use crate::types::FeatureFrame;

/// One row of the label-alignment report.
///
/// ARI/AMI stay at zero until historical label tracking feeds them; the
/// hamming distance mirrors the swap count meanwhile.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentReport {
    pub window_id: String,
    pub swap_count: u32,
    pub stability: f64,
    pub ari: f64,
    pub ami: f64,
    pub hamming_distance: f64,
}

impl AlignmentReport {
    pub fn new(window_id: String, swapped: bool, drift: f64) -> Self {
        let swap_count = u32::from(swapped);
        Self {
            window_id,
            swap_count,
            stability: (1.0 - drift).max(0.0),
            ari: 0.0,
            ami: 0.0,
            hamming_distance: swap_count as f64,
        }
    }

    pub fn to_markdown(&self) -> String {
        [
            "# Clusterer Dynamic - Label Alignment Report".to_string(),
            String::new(),
            "| window_id | swap_count | stability | ARI | AMI | hamming_distance |".to_string(),
            "| --- | --- | --- | --- | --- | --- |".to_string(),
            format!(
                "| {} | {} | {:.4} | {:.4} | {:.4} | {:.4} |",
                self.window_id, self.swap_count, self.stability, self.ari, self.ami, self.hamming_distance
            ),
            String::new(),
            "> ARI/AMI/Hamming placeholders will be replaced once historical alignment tracking is wired in."
                .to_string(),
        ]
        .join("\n")
    }
}

/// Identifier of the window: last `window_id`, else last `minute_close`, else `tail_<n>`
pub fn resolve_window_id(window: &FeatureFrame) -> String {
    window
        .last_value("window_id")
        .or_else(|| window.last_value("minute_close"))
        .unwrap_or_else(|| format!("tail_{}", window.len()))
}

pub fn alignment_log_line(window_size: usize, swapped: bool, drift: f64) -> String {
    format!(
        "{} window={}, label_switch={}, prototype_drift={:.4}\n",
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        window_size,
        u8::from(swapped),
        drift
    )
}

pub fn append_alignment_log(path: &Path, window_size: usize, swapped: bool, drift: f64) -> Result<()> {
    ensure_parent(path)?;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(alignment_log_line(window_size, swapped, drift).as_bytes())?;
    Ok(())
}

pub fn write_alignment_report(path: &Path, report: &AlignmentReport) -> Result<()> {
    ensure_parent(path)?;
    fs::write(path, report.to_markdown())?;
    debug!("Alignment report written to {}", path.display());
    Ok(())
}

/// Window rows with their cluster label and soft weight appended
pub fn export_labels(window: &FeatureFrame, labels: &[usize], weights: &[f64], path: &Path) -> Result<()> {
    let enriched = window
        .clone()
        .with_numeric("label", labels.iter().map(|&l| l as f64).collect())?
        .with_numeric("weight", weights.to_vec())?;
    write_csv(&enriched, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_stability_floor() {
        let report = AlignmentReport::new("w".to_string(), true, 1.7);
        assert_eq!(report.stability, 0.0);
        assert_eq!(report.swap_count, 1);
        assert_eq!(report.hamming_distance, 1.0);
        assert!(report.to_markdown().contains("| w | 1 | 0.0000 | 0.0000 | 0.0000 | 1.0000 |"));
    }

    #[test]
    fn test_window_id_fallbacks() {
        let frame = FeatureFrame::new().with_numeric("x", vec![1.0, 2.0, 3.0]).unwrap();
        assert_eq!(resolve_window_id(&frame), "tail_3");

        let frame = frame
            .with_text("minute_close", vec!["t1".into(), "t2".into(), "t3".into()])
            .unwrap();
        assert_eq!(resolve_window_id(&frame), "t3");

        let frame = frame.with_numeric("window_id", vec![7.0, 8.0, f64::NAN]).unwrap();
        assert_eq!(resolve_window_id(&frame), "8");
    }

    #[test]
    fn test_log_line_format() {
        let line = alignment_log_line(240, true, 0.12346);
        assert!(line.ends_with("window=240, label_switch=1, prototype_drift=0.1235\n"));
    }
}
