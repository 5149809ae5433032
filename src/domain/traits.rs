// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The narrow seams between the training core and its
// collaborators. The trainer only ever sees these traits:
//   - where notes come from        (NoteSource)
//   - where epoch numbers go       (MetricsSink)

use anyhow::Result;

use crate::domain::metrics::EpochMetrics;
use crate::domain::note::ClinicalNote;

// ─── NoteSource ───────────────────────────────────────────────────────────────
/// Any component that can produce the notes of one data split.
///
/// Implementations:
///   - JsonlNoteLoader → one JSON object per line on disk
pub trait NoteSource {
    fn load_all(&self) -> Result<Vec<ClinicalNote>>;
}

// ─── MetricsSink ──────────────────────────────────────────────────────────────
/// Receives one record per finished epoch.
///
/// Implementations:
///   - CsvMetricsSink → appends rows to metrics.csv
pub trait MetricsSink {
    fn record(&mut self, metrics: &EpochMetrics) -> Result<()>;
}

/// Sinks can be stacked: every record goes to each of them in turn.
impl MetricsSink for Vec<Box<dyn MetricsSink>> {
    fn record(&mut self, metrics: &EpochMetrics) -> Result<()> {
        for sink in self.iter_mut() {
            sink.record(metrics)?;
        }
        Ok(())
    }
}
