//! Report renderers for resolution results.
//!
//! - [`terminal`]: colored, tabular output with summary box; respects `--verbose` / `--quiet`.
//! - JSON output is serialized directly in `main` via `serde_json`.

pub mod terminal;
