// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns the training core reaches through
// narrow interfaces:
//
//   checkpoint.rs — the run directory: weights per epoch
//                   (Burn CompactRecorder), the train config,
//                   the model config, vocabulary and label map
//                   as JSON so a run can be reloaded later.
//
//   metrics.rs    — MetricsSink implementations: CSV file
//                   and the per-epoch console line.

/// Run directory: weights, configs, vocabulary, labels
pub mod checkpoint;

/// Per-epoch metrics sinks
pub mod metrics;
