//! Tree-edit protocol and svndiff binary delta codec.
//!
//! This crate carries the two building blocks every repository-aware
//! operation is expressed in:
//!
//! * the [`Editor`] trait, a callback-driven description of a tree
//!   transformation (add/open/close/delete, property changes, and binary
//!   text-delta application), used uniformly to update a working copy, to
//!   drive a commit, and to emit diffs;
//! * the svndiff codec, the windowed copy/insert instruction stream that
//!   represents one file's bytes relative to a source.

pub mod editor;
pub mod error;
pub mod null;
pub mod svndiff;
pub mod trace;
pub mod window;

pub use editor::{Editor, WindowSink};
pub use error::DeltaError;
pub use null::{NullEditor, NullSink};
pub use svndiff::apply::WindowApplier;
pub use svndiff::read::SvndiffDecoder;
pub use svndiff::write::SvndiffWriter;
pub use trace::TraceEditor;
pub use window::{fulltext_windows, DeltaWindow, Instruction};
