use super::annotation::AnnotationKind;
use super::document::Document;
use super::lines::is_line_start;
use super::{END_OF_BUFFER_MARKER, OBJECT_REPLACEMENT};

/// Validates the annotation invariants of a document.
///
/// Asserts that:
/// - All spans are non-empty, within the buffer and on char boundaries
/// - Inline annotations never contain a line separator and same-kind runs are merged
/// - Block annotations start and end on line boundaries
/// - Every list item sits directly inside a list one nesting level up
/// - Placeholders cover exactly one object replacement character
/// - The end marker is present exactly while a block covers the last line
///
/// # Panics
/// Panics with a descriptive message if any invariant is violated.
pub fn check(doc: &Document) {
    let text = doc.text();
    let n = text.len();

    for a in doc.annotations() {
        let span = a.span();
        assert!(
            span.start < span.end && span.end <= n,
            "annotation span out of bounds or empty: {:?} {span:?} (len: {n})",
            a.kind()
        );
        assert!(
            text.is_char_boundary(span.start) && text.is_char_boundary(span.end),
            "annotation span splits a character: {:?} {span:?}",
            a.kind()
        );
        let covered = &text[span.as_range()];

        if a.kind().is_inline() {
            assert!(
                !covered.contains('\n'),
                "inline annotation crosses a line: {:?} {span:?}",
                a.kind()
            );
        }
        if a.kind().is_block() {
            assert!(
                is_line_start(&text, span.start),
                "block annotation does not start a line: {:?} {span:?}",
                a.kind()
            );
            assert!(
                span.end == n || is_line_start(&text, span.end),
                "block annotation does not end a line: {:?} {span:?}",
                a.kind()
            );
        }
        if a.kind().is_placeholder() {
            assert_eq!(
                covered,
                OBJECT_REPLACEMENT.to_string(),
                "placeholder does not cover its character: {:?}",
                a.kind()
            );
        }
        if *a.kind() == AnnotationKind::ListItem {
            let level = a.nesting_level().unwrap_or(0);
            let parent = doc.annotations().iter().any(|list| {
                list.kind().is_list()
                    && list.span().contains_span(span)
                    && list.nesting_level().map(|l| l + 1) == Some(level)
            });
            assert!(parent, "list item at {span:?} has no enclosing list at level {level}");
        }
    }

    for a in doc.annotations().iter().filter(|a| a.kind().is_inline()) {
        for b in doc.annotations().iter().filter(|b| b.id() != a.id()) {
            if a.kind() == b.kind() && a.attributes() == b.attributes() {
                assert!(
                    a.end() < b.start() || b.end() < a.start(),
                    "unmerged {:?} annotations at {:?} and {:?}",
                    a.kind(),
                    a.span(),
                    b.span()
                );
            }
        }
    }

    let marker_at = text.find(END_OF_BUFFER_MARKER);
    if let Some(at) = marker_at {
        assert_eq!(at + END_OF_BUFFER_MARKER.len_utf8(), n, "end marker inside the buffer");
        assert!(
            doc.annotations().iter().any(|a| a.kind().is_block() && a.end() == n),
            "end marker without a block on the last line"
        );
    } else if n > 0 && !text.ends_with('\n') {
        assert!(
            !doc.annotations().iter().any(|a| a.kind().is_block() && a.end() == n),
            "block on the last line without an end marker"
        );
    }
}
