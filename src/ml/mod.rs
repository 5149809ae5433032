// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All tensor code lives here.
//
//   gru.rs        — bidirectional GRU with padding masks
//   attention.rs  — attention pooling and masked mean pooling
//   model.rs      — NoteClassifier: HAN, hierarchical and
//                   CBOW document encoders + linear head
//   loss.rs       — cross-entropy, focal and BCE criteria
//   schedule.rs   — step learning-rate decay
//   evaluator.rs  — loss / accuracy / P / R / F1 on a split
//   trainer.rs    — the epoch loop
//   predictor.rs  — ranked codes from a saved run
//
// Reference: Yang et al. (2016) Hierarchical Attention Networks
//            for Document Classification

pub mod gru;
pub mod attention;
pub mod model;
pub mod loss;
pub mod schedule;
pub mod evaluator;
pub mod trainer;
pub mod predictor;
