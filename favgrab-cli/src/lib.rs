//! Library target for the `favgrab` package.
//!
//! The primary deliverable of this package is the `favgrab` CLI binary
//! (`src/main.rs`). This library exists so CI can run
//! `cargo test -p favgrab --doc` for feature/doctype validation.

#[doc(hidden)]
pub use favgrab_engine;
