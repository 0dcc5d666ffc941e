use xi_rope::delta::Builder;
use xi_rope::{Delta, Rope, RopeInfo};

use super::document::Document;
use super::span::Span;

/// Raw edits that can be applied to the document buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum Cmd {
    InsertText { at: usize, text: String },
    DeleteRange { range: Span },
    ReplaceRange { range: Span, text: String },
}

impl Cmd {
    /// Offsets, in the post-edit buffer, of the line separators this command inserts.
    pub(crate) fn inserted_breaks(&self) -> Vec<usize> {
        match self {
            Cmd::InsertText { at, text } => breaks_from(*at, text),
            Cmd::ReplaceRange { range, text } => breaks_from(range.start, text),
            Cmd::DeleteRange { .. } => Vec::new(),
        }
    }

    pub(crate) fn is_noop(&self) -> bool {
        match self {
            Cmd::InsertText { text, .. } => text.is_empty(),
            Cmd::DeleteRange { range } => range.is_empty(),
            Cmd::ReplaceRange { range, text } => range.is_empty() && text.is_empty(),
        }
    }
}

fn breaks_from(at: usize, text: &str) -> Vec<usize> {
    text.match_indices('\n').map(|(i, _)| at + i).collect()
}

/// Compile a command into a delta
pub(crate) fn compile_command(doc: &Document, cmd: &Cmd) -> Delta<RopeInfo> {
    let mut builder = Builder::new(doc.len());
    match cmd {
        Cmd::InsertText { at, text } => {
            builder.replace(*at..*at, Rope::from(text));
        }
        Cmd::DeleteRange { range } => {
            builder.delete(range.as_range());
        }
        Cmd::ReplaceRange { range, text } => {
            builder.replace(range.as_range(), Rope::from(text));
        }
    }
    builder.build()
}

/// Byte ranges of inserted text in the post-edit buffer.
pub(crate) fn changed_ranges(delta: &Delta<RopeInfo>) -> Vec<Span> {
    let mut changed = Vec::new();
    let mut cursor = 0;
    for op in delta.els.iter() {
        match op {
            xi_rope::delta::DeltaElement::Copy(from, to) => {
                cursor += to - from;
            }
            xi_rope::delta::DeltaElement::Insert(inserted) => {
                let start = cursor;
                let end = cursor + inserted.len();
                changed.push(Span { start, end });
                cursor = end;
            }
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breaks_are_reported_in_new_offsets() {
        let cmd = Cmd::InsertText {
            at: 4,
            text: "a\nb\n".into(),
        };
        assert_eq!(cmd.inserted_breaks(), vec![5, 7]);
    }

    #[test]
    fn delete_has_no_breaks() {
        let cmd = Cmd::DeleteRange {
            range: Span::new(0, 3),
        };
        assert!(cmd.inserted_breaks().is_empty());
        assert!(!cmd.is_noop());
    }

    #[test]
    fn insert_delta_reports_changed_range() {
        let doc = Document::from_text("hello");
        let delta = compile_command(
            &doc,
            &Cmd::InsertText {
                at: 5,
                text: " there".into(),
            },
        );
        assert_eq!(changed_ranges(&delta), vec![Span::new(5, 11)]);
        assert_eq!(delta.apply(&doc.buffer).to_string(), "hello there");
    }
}
