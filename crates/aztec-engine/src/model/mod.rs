//! Annotated text model.
//!
//! ## Architecture
//!
//! A [`Document`] is an `xi_rope::Rope` plus a flat list of [`Annotation`]s.
//! Raw edits go through [`Cmd`]; styling goes through the formatters in
//! [`crate::formatting`], which add and remove annotations and then let
//! normalization restore the invariants.

pub mod annotation;
pub mod commands;
pub mod document;
pub mod invariants;
pub mod lines;
pub mod media;
mod normalize;
pub mod patch;
pub mod span;

pub use annotation::*;
pub use commands::Cmd;
pub use document::Document;
pub use lines::LineRef;
pub use media::{MediaCompletion, MediaDisplay, MediaRequest, MediaResolver, NoopResolver};
pub use patch::Patch;
pub use span::Span;

/// Appended while the last line carries a block annotation.
pub const END_OF_BUFFER_MARKER: char = '\u{200B}';

/// Stands in for media, unknown markup and page breaks in the buffer.
pub const OBJECT_REPLACEMENT: char = '\u{FFFC}';
