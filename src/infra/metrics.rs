// ============================================================
// Layer 6 — Metrics Sinks
// ============================================================
// Where per-epoch numbers end up.
//
//   CsvMetricsSink — appends one row per epoch to
//                    <log_dir>/metrics.csv, ready for plotting
//   LogMetricsSink — one human-readable line per epoch on
//                    stdout plus a structured tracing event
//
// Example CSV output:
//   epoch,lr,train_loss,train_acc,val_loss,val_acc,val_f1,val_precision,val_recall
//   1,0.010000,2.301200,0.184000,2.298000,0.180000,0.041000,0.052000,0.061000
//
// How to read the metrics:
//   - If val_loss increases while train_loss decreases → overfitting
//   - val_f1 far below val_acc → the model is collapsing onto
//     the most frequent codes

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use crate::domain::metrics::EpochMetrics;
use crate::domain::traits::MetricsSink;

const CSV_HEADER: &str = "epoch,lr,train_loss,train_acc,val_loss,val_acc,val_f1,val_precision,val_recall";

pub struct CsvMetricsSink {
    csv_path: PathBuf,
}

impl CsvMetricsSink {
    /// Writes the CSV header if the file doesn't exist yet.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create log directory '{}'", dir.display()))?;

        let csv_path = dir.join("metrics.csv");

        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            writeln!(f, "{CSV_HEADER}")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

impl MetricsSink for CsvMetricsSink {
    fn record(&mut self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot append to '{}'", self.csv_path.display()))?;

        writeln!(
            f,
            "{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6}",
            m.epoch,
            m.lr,
            m.train_loss,
            m.train_acc,
            m.val_loss,
            m.val_acc,
            m.val_f1,
            m.val_precision,
            m.val_recall,
        )?;
        Ok(())
    }
}

/// Prints the epoch table line the trainer shows while running.
#[derive(Debug, Default)]
pub struct LogMetricsSink;

impl MetricsSink for LogMetricsSink {
    fn record(&mut self, m: &EpochMetrics) -> Result<()> {
        println!(
            "Epoch {:>3} | lr={:.2e} | train_loss={:.4} | train_acc={:.1}% | val_loss={:.4} | val_acc={:.1}% | val_f1={:.3}",
            m.epoch,
            m.lr,
            m.train_loss,
            m.train_acc * 100.0,
            m.val_loss,
            m.val_acc * 100.0,
            m.val_f1,
        );
        tracing::info!(
            epoch = m.epoch,
            val_precision = m.val_precision,
            val_recall = m.val_recall,
            "epoch finished"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(epoch: usize, val_loss: f64) -> EpochMetrics {
        EpochMetrics {
            epoch,
            lr:            0.01,
            train_loss:    2.5,
            train_acc:     0.2,
            val_loss,
            val_acc:       0.25,
            val_f1:        0.1,
            val_precision: 0.12,
            val_recall:    0.09,
        }
    }

    #[test]
    fn test_csv_rows_are_appended_once_per_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvMetricsSink::new(dir.path()).unwrap();
        sink.record(&metrics(1, 2.3)).unwrap();
        sink.record(&metrics(2, 2.1)).unwrap();

        // a second sink on the same directory must not repeat the header
        let mut again = CsvMetricsSink::new(dir.path()).unwrap();
        again.record(&metrics(3, 2.0)).unwrap();

        let text  = fs::read_to_string(sink.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], CSV_HEADER);
        assert!(lines[1].starts_with("1,0.010000,2.500000"));
        assert!(lines[3].starts_with("3,"));
    }

    #[test]
    fn test_stacked_sinks() {
        let dir = tempfile::tempdir().unwrap();
        let mut sinks: Vec<Box<dyn MetricsSink>> = vec![
            Box::new(LogMetricsSink),
            Box::new(CsvMetricsSink::new(dir.path()).unwrap()),
        ];
        sinks.record(&metrics(1, 1.0)).unwrap();

        let text = fs::read_to_string(dir.path().join("metrics.csv")).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}
