// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs and traits describing what the system
// works with: clinical notes, their billing codes, and the
// per-epoch numbers a training run produces.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, and traits

// One admission note, already split into sentences of tokens
pub mod note;

// Per-epoch training / validation numbers
pub mod metrics;

// Core abstractions (traits) that other layers implement
pub mod traits;
