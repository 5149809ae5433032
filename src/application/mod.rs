// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Orchestrates the other layers to accomplish one goal per
// command: train a run, evaluate it, or predict with it.
//
// Rules for this layer:
//   - No tensor math or model code here
//   - No printing here (that's Layer 1)
//   - Only workflow coordination
//
// Each use case is generic over the Burn backend and offers a
// run() that picks the concrete backend from a BackendKind.

/// wgpu / ndarray switch
pub mod backend;

/// The training workflow
pub mod train_use_case;

/// Score a saved run on a data file
pub mod evaluate_use_case;

/// Ranked codes from a saved run
pub mod predict_use_case;

/// StarSpace input file (and optional build) on its own
pub mod starspace_use_case;
