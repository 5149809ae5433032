// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from the preprocessed .jsonl splits to tensor
// batches on the training device.
//
//   notes.jsonl
//       │
//       ▼
//   JsonlNoteLoader   → reads ClinicalNotes
//       │
//       ▼
//   LabelMap          → code → class index
//   Vocabulary        → token → embedding row
//       │
//       ▼
//   NotesDataset      → encoded notes, Burn Dataset trait
//       │
//       ▼
//   NoteBatcher       → collate + upload, Burn Batcher trait
//       │
//       ▼
//   DataLoader        → feeds batches to the training loop
//
// starspace.rs sits beside the pipeline: it exports notes for
// the external StarSpace tool and reads its vectors back.

/// Reads .jsonl note files
pub mod loader;

/// Billing code ↔ class index
pub mod labels;

/// Token ↔ embedding row
pub mod vocab;

/// Encoded notes implementing Burn's Dataset trait
pub mod dataset;

/// Pads ragged notes into dense buffers
pub mod collate;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// Seeded train/validation split
pub mod splitter;

/// StarSpace export, invocation and vector loading
pub mod starspace;
