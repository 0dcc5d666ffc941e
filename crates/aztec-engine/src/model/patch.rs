use super::span::Span;

/// Result of applying a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    /// Byte ranges of inserted text, in post-edit offsets.
    pub changed: Vec<Span>,
    pub version: u64,
}
