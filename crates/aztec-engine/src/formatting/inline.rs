use crate::model::{AnnotationKind, Attributes, Document, END_OF_BUFFER_MARKER, Span};

/// Kinds that `Code` refuses to nest inside.
const CODE_CONFLICTS: [AnnotationKind; 4] = [
    AnnotationKind::Bold,
    AnnotationKind::Italic,
    AnnotationKind::Underline,
    AnnotationKind::Strikethrough,
];

/// Toggles an inline `kind` over `selection`.
///
/// Removes it when the whole selection already carries it, otherwise applies
/// it. Collapsed selections and links without a URL are left alone; returns
/// whether anything was done.
pub fn toggle(doc: &mut Document, kind: AnnotationKind, selection: Span) -> bool {
    let selection = doc.clamp_span(selection);
    if selection.is_empty() {
        return false;
    }
    if contains_style(doc, &kind, selection) {
        remove(doc, &kind, selection);
        true
    } else if kind == AnnotationKind::Link {
        false
    } else {
        apply(doc, kind, selection, Attributes::new());
        true
    }
}

/// Covers `selection` with `kind`, merging with neighbours of the same kind.
pub fn apply(doc: &mut Document, kind: AnnotationKind, selection: Span, attributes: Attributes) {
    let selection = doc.clamp_span(selection);
    if selection.is_empty() || !kind.is_inline() {
        return;
    }
    if kind == AnnotationKind::Code {
        for conflict in &CODE_CONFLICTS {
            split_out(doc, conflict, selection);
        }
    }
    doc.push_annotation(kind, selection, attributes);
    doc.normalize();
}

/// Removes `kind` from `selection`, keeping the parts of annotations outside it.
pub fn remove(doc: &mut Document, kind: &AnnotationKind, selection: Span) {
    let selection = doc.clamp_span(selection);
    split_out(doc, kind, selection);
    doc.normalize();
}

/// Removes every inline style from `selection`.
pub fn remove_inline_styles(doc: &mut Document, selection: Span) {
    let selection = doc.clamp_span(selection);
    let kinds: Vec<AnnotationKind> = doc
        .query_spans_in_range(selection, None)
        .into_iter()
        .filter(|a| a.kind().is_inline())
        .map(|a| a.kind().clone())
        .collect();
    for kind in kinds {
        split_out(doc, &kind, selection);
    }
    doc.normalize();
}

/// Cuts `selection` out of every annotation of `kind`, leaving left and right
/// remnants. Does not normalize.
fn split_out(doc: &mut Document, kind: &AnnotationKind, selection: Span) {
    if selection.is_empty() {
        return;
    }
    let hits: Vec<_> = doc
        .annotations()
        .iter()
        .filter(|a| a.kind() == kind && a.span().overlaps(selection))
        .map(|a| a.id())
        .collect();

    for id in hits {
        let Some(annotation) = doc.take_annotation(id) else {
            continue;
        };
        let span = annotation.span();
        if span.start < selection.start {
            doc.push_annotation(
                annotation.kind().clone(),
                Span::new(span.start, selection.start),
                annotation.attributes().clone(),
            );
        }
        if selection.end < span.end {
            doc.push_annotation(
                annotation.kind().clone(),
                Span::new(selection.end, span.end),
                annotation.attributes().clone(),
            );
        }
    }
}

/// True if every character of `selection` is covered by `kind`.
///
/// A caret is judged by the character before it, or the one after it when it
/// sits at the start of a line. Line separators and the end marker are not
/// styled, so they are skipped.
pub fn contains_style(doc: &Document, kind: &AnnotationKind, selection: Span) -> bool {
    let selection = doc.clamp_span(selection);
    let window = if selection.is_empty() {
        match caret_window(doc, selection.start) {
            Some(window) => window,
            None => return false,
        }
    } else {
        selection
    };

    let covering: Vec<Span> = doc
        .query_spans_in_range(window, Some(kind))
        .into_iter()
        .map(|a| a.span())
        .collect();
    if covering.is_empty() {
        return false;
    }

    let text = doc.slice(window);
    let mut checked = false;
    for (i, c) in text.char_indices() {
        if c == '\n' || c == END_OF_BUFFER_MARKER {
            continue;
        }
        let unit = Span::new(window.start + i, window.start + i + c.len_utf8());
        if !covering.iter().any(|span| span.contains_span(unit)) {
            return false;
        }
        checked = true;
    }
    checked
}

/// The single character whose styles a caret at `offset` reports.
pub fn caret_window(doc: &Document, offset: usize) -> Option<Span> {
    if doc.is_empty() {
        return None;
    }
    let offset = doc.clamp_offset(offset);
    match doc.char_before(offset) {
        Some(prev) if prev != '\n' => Some(Span::new(offset - prev.len_utf8(), offset)),
        _ => {
            let next = doc.char_at(offset).filter(|c| *c != END_OF_BUFFER_MARKER)?;
            Some(Span::new(offset, offset + next.len_utf8()))
        }
    }
}

/// Backspace at the very start of the buffer: drop inline styles that begin
/// at offset 0 instead of deleting anything. Returns true if any were removed.
pub fn remove_leading_inline_style(doc: &mut Document) -> bool {
    let leading: Vec<_> = doc
        .annotations()
        .iter()
        .filter(|a| a.kind().is_inline() && a.start() == 0)
        .map(|a| a.id())
        .collect();
    for id in &leading {
        doc.take_annotation(*id);
    }
    if !leading.is_empty() {
        doc.normalize();
    }
    !leading.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html;
    use crate::model::invariants;
    use pretty_assertions::assert_eq;

    fn spans(doc: &Document, kind: &AnnotationKind) -> Vec<Span> {
        doc.query_spans_in_range(Span::new(0, doc.len()), Some(kind))
            .iter()
            .map(|a| a.span())
            .collect()
    }

    #[test]
    fn toggle_twice_is_identity() {
        let original = html::parse("Some <i>mixed</i> text here").document;
        for selection in [Span::new(0, 4), Span::new(3, 12), Span::new(5, 10)] {
            let mut doc = original.clone();
            assert!(toggle(&mut doc, AnnotationKind::Bold, selection));
            invariants::check(&doc);
            assert!(toggle(&mut doc, AnnotationKind::Bold, selection));
            assert_eq!(doc, original);
        }
    }

    #[test]
    fn removing_from_the_middle_splits() {
        let mut doc = Document::from_text("abcdef");
        apply(&mut doc, AnnotationKind::Bold, Span::new(0, 6), Attributes::new());
        toggle(&mut doc, AnnotationKind::Bold, Span::new(2, 4));
        assert_eq!(spans(&doc, &AnnotationKind::Bold), vec![Span::new(0, 2), Span::new(4, 6)]);
    }

    #[test]
    fn partial_coverage_toggles_on() {
        let mut doc = Document::from_text("abcdef");
        apply(&mut doc, AnnotationKind::Italic, Span::new(0, 3), Attributes::new());
        toggle(&mut doc, AnnotationKind::Italic, Span::new(2, 6));
        assert_eq!(spans(&doc, &AnnotationKind::Italic), vec![Span::new(0, 6)]);
    }

    #[test]
    fn code_removes_conflicting_styles() {
        let mut doc = Document::from_text("let x = 1;");
        apply(&mut doc, AnnotationKind::Bold, Span::new(0, 10), Attributes::new());
        apply(&mut doc, AnnotationKind::Underline, Span::new(4, 5), Attributes::new());
        toggle(&mut doc, AnnotationKind::Code, Span::new(4, 9));
        assert_eq!(spans(&doc, &AnnotationKind::Bold), vec![Span::new(0, 4), Span::new(9, 10)]);
        assert!(spans(&doc, &AnnotationKind::Underline).is_empty());
        assert_eq!(spans(&doc, &AnnotationKind::Code), vec![Span::new(4, 9)]);
    }

    #[test]
    fn caret_uses_previous_character() {
        let doc = html::parse("<b>ab</b>cd").document;
        assert!(contains_style(&doc, &AnnotationKind::Bold, Span::new(2, 2)));
        assert!(!contains_style(&doc, &AnnotationKind::Bold, Span::new(3, 3)));
        assert!(contains_style(&doc, &AnnotationKind::Bold, Span::new(0, 0)));
    }

    #[test]
    fn separators_do_not_break_coverage() {
        let mut doc = Document::from_text("ab\ncd");
        toggle(&mut doc, AnnotationKind::Strikethrough, Span::new(0, 5));
        assert!(contains_style(&doc, &AnnotationKind::Strikethrough, Span::new(0, 5)));
        toggle(&mut doc, AnnotationKind::Strikethrough, Span::new(0, 5));
        assert!(doc.annotations().is_empty());
    }

    #[test]
    fn leading_bold_is_stripped_without_deleting() {
        let mut doc = html::parse("<b>Hello</b> world").document;
        let len = doc.len();
        assert!(remove_leading_inline_style(&mut doc));
        assert_eq!(doc.len(), len);
        assert!(doc.annotations().is_empty());
        assert!(!remove_leading_inline_style(&mut doc));
    }

    #[test]
    fn clear_all_inline_styles() {
        let mut doc = html::parse("<b><i>ab</i></b><u>cd</u>").document;
        remove_inline_styles(&mut doc, Span::new(1, 3));
        assert_eq!(spans(&doc, &AnnotationKind::Bold), vec![Span::new(0, 1)]);
        assert_eq!(spans(&doc, &AnnotationKind::Italic), vec![Span::new(0, 1)]);
        assert_eq!(spans(&doc, &AnnotationKind::Underline), vec![Span::new(3, 4)]);
    }
}
