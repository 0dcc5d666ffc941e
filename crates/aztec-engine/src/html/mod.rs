//! HTML import and export.
//!
//! ## Architecture
//!
//! Parsing runs in three stages:
//!
//! 1. [`tokenizer`]: a byte [`cursor::Cursor`] splits the source into tags,
//!    text, comments and declarations, each carrying its source span
//! 2. [`tree`]: tokens are assembled into a forgiving element tree
//! 3. `parser`: the tree is walked into buffer text plus annotations
//!
//! Markup that is not understood never fails the parse. It becomes an
//! `UnknownBlock` placeholder holding the exact source slice, which the
//! serializer writes back unchanged.
//!
//! Serializing walks the buffer once, opening and closing block tags at line
//! boundaries and inline tags in a fixed nesting order, so equal documents
//! always produce identical HTML.

pub mod cursor;
mod parser;
mod serializer;
pub mod tokenizer;
pub mod tree;

use crate::model::{Document, Span};

/// Empty element marking the caret in diagnostic output.
pub const CURSOR_TAG: &str = "aztec_cursor";

/// A parsed document and the caret position found in the markup, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedHtml {
    pub document: Document,
    pub cursor: Option<usize>,
}

/// Parses HTML into a document. Never fails.
pub fn parse(html: &str) -> ParsedHtml {
    parser::parse(html)
}

/// Canonical HTML for `doc`, with a caret marker at `cursor` if given.
pub fn serialize(doc: &Document, cursor: Option<usize>) -> String {
    serializer::join(&serializer::pieces(doc, cursor), false)
}

/// Like [`serialize`], with block tags and page breaks on lines of their own.
pub fn to_formatted_html(doc: &Document) -> String {
    serializer::join(&serializer::pieces(doc, None), true)
}

/// Strips source layout by re-serializing canonically.
pub fn remove_source_formatting(html: &str) -> String {
    let parsed = parse(html);
    serialize(&parsed.document, parsed.cursor)
}

/// HTML for the text in `range`, keeping inline styles and placeholders but
/// not block structure.
pub fn fragment(doc: &Document, range: Span) -> String {
    let range = doc.clamp_span(range);
    let mut copy = Document::from_text(&doc.slice(range));
    for annotation in doc.annotations() {
        if annotation.kind().is_block() {
            continue;
        }
        let start = annotation.start().max(range.start);
        let end = annotation.end().min(range.end);
        if start < end {
            copy.push_annotation(
                annotation.kind().clone(),
                Span::new(start - range.start, end - range.start),
                annotation.attributes().clone(),
            );
        }
    }
    copy.normalize();
    serialize(&copy, None)
}

/// Replaces `selection` with the content of `html` and returns the range of
/// the inserted text.
///
/// Line separators around the pasted content are trimmed. Inline styles and
/// placeholders come along; block structure does not.
pub fn paste(doc: &mut Document, html: &str, selection: Span) -> Span {
    let selection = doc.clamp_span(selection);
    let pasted = parse(html).document;
    let content = pasted.content();
    let lead = content.len() - content.trim_start_matches('\n').len();
    let body = content.trim_matches('\n');
    let source = Span::new(lead, lead + body.len());

    doc.replace(selection, body);
    let at = selection.start;
    for annotation in pasted.annotations() {
        if annotation.kind().is_block() {
            continue;
        }
        let start = annotation.start().max(source.start);
        let end = annotation.end().min(source.end);
        if start < end {
            doc.push_annotation(
                annotation.kind().clone(),
                Span::new(start - lead + at, end - lead + at),
                annotation.attributes().clone(),
            );
        }
    }
    doc.normalize();
    log::debug!("pasted {} bytes at {at}", body.len());
    Span::new(at, at + body.len())
}
