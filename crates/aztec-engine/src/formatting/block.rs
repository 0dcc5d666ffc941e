//! Line-scoped styles.
//!
//! Every operation first widens the selection to the whole lines it touches.
//! On an empty last line the end marker is appended so the new block has a
//! character to cover.
//!
//! Blocks are kept properly nested: a new block either sits inside a block
//! that contains all of its lines, or the conflicting blocks are cut back
//! around it.

use crate::model::lines::{expand_to_lines, line_end, line_spans_in};
use crate::model::{Annotation, AnnotationId, AnnotationKind, Attributes, Document, HeadingLevel, PageBreak, Span};

pub fn contains_heading(doc: &Document, level: HeadingLevel, selection: Span) -> bool {
    every_line(doc, selection, |doc, line| {
        covered_by(doc, line, |kind| *kind == AnnotationKind::Heading(level))
    })
}

/// True if every selected line is an item whose innermost list is `kind`.
pub fn contains_list(doc: &Document, kind: &AnnotationKind, selection: Span) -> bool {
    every_line(doc, selection, |doc, line| line_in_list(doc, kind, line))
}

pub fn contains_quote(doc: &Document, selection: Span) -> bool {
    every_line(doc, selection, |doc, line| {
        covered_by(doc, line, |kind| *kind == AnnotationKind::Quote)
    })
}

/// Wraps the selected lines in a list of `kind`, or unwraps them when they
/// already are. Lines in a list of another kind are converted.
pub fn toggle_list(doc: &mut Document, kind: AnnotationKind, selection: Span) {
    if !kind.is_list() {
        return;
    }
    let range = prepare_lines(doc, selection);
    let lines = line_spans_in(&doc.text(), range);

    if lines.iter().all(|line| line_in_list(doc, &kind, *line)) {
        for line in &lines {
            remove_list_level(doc, *line);
        }
        doc.normalize();
        return;
    }

    for line in &lines {
        remove_list_level(doc, *line);
    }
    carve_conflicts(doc, &kind, range);

    let depth = depth_for(doc, &kind, range);
    push_at_level(doc, kind.clone(), range, Attributes::new(), depth);
    for line in &lines {
        push_at_level(doc, AnnotationKind::ListItem, *line, Attributes::new(), depth + 1);
    }
    doc.normalize();
    merge_touching(doc, &kind, range);
}

/// Quotes the selected lines, or unquotes them when they all are.
pub fn toggle_quote(doc: &mut Document, selection: Span) {
    let range = prepare_lines(doc, selection);
    let lines = line_spans_in(&doc.text(), range);
    let quoted = lines
        .iter()
        .all(|line| covered_by(doc, *line, |kind| *kind == AnnotationKind::Quote));

    if quoted {
        for id in overlapping(doc, range, |kind| *kind == AnnotationKind::Quote) {
            carve(doc, id, range);
        }
        doc.normalize();
        return;
    }

    let range = widen_for_quote(doc, range);
    let nested = overlapping(doc, range, |kind| {
        matches!(kind, AnnotationKind::Quote | AnnotationKind::Heading(_))
    });
    for id in nested {
        carve(doc, id, range);
    }

    let depth = depth_for(doc, &AnnotationKind::Quote, range);
    push_at_level(doc, AnnotationKind::Quote, range, Attributes::new(), depth);
    doc.normalize();
    merge_touching(doc, &AnnotationKind::Quote, range);
}

/// Sets heading `level` on the selected lines, or clears it when every line
/// already has it. A heading line leaves any list or quote it was in.
pub fn toggle_heading(doc: &mut Document, level: HeadingLevel, selection: Span) {
    let kind = AnnotationKind::Heading(level);
    let range = prepare_lines(doc, selection);
    let lines = line_spans_in(&doc.text(), range);

    if lines.iter().all(|line| covered_by(doc, *line, |k| *k == kind)) {
        remove_headings(doc, range);
        doc.normalize();
        return;
    }

    for line in &lines {
        remove_headings(doc, *line);
        while remove_list_level(doc, *line) {}
        for id in overlapping(doc, *line, |k| *k == AnnotationKind::Quote) {
            carve(doc, id, *line);
        }
        let depth = depth_for(doc, &kind, *line);
        push_at_level(doc, kind.clone(), *line, Attributes::new(), depth);
    }
    doc.normalize();
}

/// Turns the selected heading lines back into plain paragraphs.
pub fn clear_headings(doc: &mut Document, selection: Span) {
    let range = line_range(doc, selection);
    if range.is_empty() {
        return;
    }
    remove_headings(doc, range);
    doc.normalize();
}

/// Removes every block style from the selected lines.
pub fn remove_block_styles(doc: &mut Document, selection: Span) {
    let range = line_range(doc, selection);
    if range.is_empty() {
        return;
    }
    for id in overlapping(doc, range, AnnotationKind::is_block) {
        carve(doc, id, range);
    }
    doc.normalize();
}

/// Backspace at offset 0: strips the innermost block level from the first
/// line instead of deleting. Returns true if anything was removed.
pub fn remove_block_style_from_first_line(doc: &mut Document) -> bool {
    let text = doc.text();
    if text.is_empty() {
        return false;
    }
    let line = Span::new(0, line_end(&text, 0));
    let innermost = doc
        .annotations()
        .iter()
        .filter(|a| a.kind().is_block() && a.span().contains_span(line))
        .max_by_key(|a| (a.nesting_level(), a.kind().block_rank()))
        .map(|a| (a.id(), a.kind().clone()));
    let Some((id, kind)) = innermost else {
        return false;
    };

    if kind == AnnotationKind::ListItem || kind.is_list() {
        remove_list_level(doc, line);
    } else {
        carve(doc, id, line);
    }
    doc.normalize();
    true
}

/// Inserts a page-break comment at `at`.
pub fn insert_page_break(doc: &mut Document, page_break: PageBreak, at: usize) -> AnnotationId {
    doc.insert_placeholder(at, AnnotationKind::Comment(page_break), Attributes::new())
}

fn line_range(doc: &Document, selection: Span) -> Span {
    expand_to_lines(&doc.text(), doc.clamp_span(selection))
}

/// Whole-line range for a mutating operation, appending the end marker when
/// the selection sits on an empty last line.
fn prepare_lines(doc: &mut Document, selection: Span) -> Span {
    let range = line_range(doc, selection);
    if !range.is_empty() {
        return range;
    }
    let start = doc.len();
    doc.append_end_marker();
    Span::new(start, doc.len())
}

fn every_line(doc: &Document, selection: Span, test: impl Fn(&Document, Span) -> bool) -> bool {
    let range = line_range(doc, selection);
    if range.is_empty() {
        return false;
    }
    line_spans_in(&doc.text(), range)
        .into_iter()
        .all(|line| test(doc, line))
}

fn covered_by(doc: &Document, line: Span, kind: impl Fn(&AnnotationKind) -> bool) -> bool {
    doc.annotations()
        .iter()
        .any(|a| kind(a.kind()) && a.span().contains_span(line))
}

fn line_in_list(doc: &Document, kind: &AnnotationKind, line: Span) -> bool {
    innermost_item(doc, line)
        .and_then(|item| parent_list(doc, item))
        .is_some_and(|list| list.kind() == kind)
}

fn innermost_item(doc: &Document, line: Span) -> Option<&Annotation> {
    doc.annotations()
        .iter()
        .filter(|a| *a.kind() == AnnotationKind::ListItem && a.span().contains_span(line))
        .max_by_key(|a| a.nesting_level())
}

fn parent_list<'a>(doc: &'a Document, item: &Annotation) -> Option<&'a Annotation> {
    let level = item.nesting_level().unwrap_or(0);
    doc.annotations()
        .iter()
        .filter(|a| {
            a.kind().is_list()
                && a.span().contains_span(item.span())
                && a.nesting_level().unwrap_or(0) < level
        })
        .max_by_key(|a| a.nesting_level())
}

/// Takes `line` out of its innermost list item and that item's list.
fn remove_list_level(doc: &mut Document, line: Span) -> bool {
    let Some(item) = innermost_item(doc, line) else {
        return false;
    };
    let item_id = item.id();
    let list_id = parent_list(doc, item).map(Annotation::id);
    carve(doc, item_id, line);
    if let Some(id) = list_id {
        carve(doc, id, line);
    }
    true
}

fn remove_headings(doc: &mut Document, range: Span) {
    for id in overlapping(doc, range, |kind| matches!(kind, AnnotationKind::Heading(_))) {
        carve(doc, id, range);
    }
}

fn overlapping(doc: &Document, range: Span, kind: impl Fn(&AnnotationKind) -> bool) -> Vec<AnnotationId> {
    doc.annotations()
        .iter()
        .filter(|a| kind(a.kind()) && a.span().overlaps(range))
        .map(Annotation::id)
        .collect()
}

/// Cuts `cut` out of an annotation. The left part keeps the identity, the
/// right part becomes a new annotation at the same level. Does not normalize.
fn carve(doc: &mut Document, id: AnnotationId, cut: Span) {
    let Some(annotation) = doc.annotation(id).cloned() else {
        return;
    };
    let span = annotation.span();
    if span.start < cut.start {
        if let Some(left) = doc.annotation_mut(id) {
            left.span = Span::new(span.start, cut.start.min(span.end));
        }
    } else {
        doc.take_annotation(id);
    }
    if cut.end < span.end {
        let right = Span::new(cut.end.max(span.start), span.end);
        push_at_level(
            doc,
            annotation.kind().clone(),
            right,
            annotation.attributes().clone(),
            annotation.nesting_level().unwrap_or(0),
        );
    }
}

fn push_at_level(doc: &mut Document, kind: AnnotationKind, span: Span, attributes: Attributes, level: usize) {
    let id = doc.push_annotation(kind, span, attributes);
    if let Some(annotation) = doc.annotation_mut(id) {
        annotation.nesting_level = Some(level);
    }
}

/// Nesting level for a new `kind` block over `range`: the number of blocks
/// that will enclose it.
fn depth_for(doc: &Document, kind: &AnnotationKind, range: Span) -> usize {
    doc.annotations()
        .iter()
        .filter(|a| a.kind().is_block() && a.span().contains_span(range))
        .filter(|a| a.span() != range || encloses_same_range(a.kind(), kind))
        .count()
}

/// Whether an existing `outer` block over exactly the same lines as a new
/// `inner` block stays outside it.
fn encloses_same_range(outer: &AnnotationKind, inner: &AnnotationKind) -> bool {
    match inner {
        AnnotationKind::Quote => false,
        AnnotationKind::Heading(_) => true,
        _ => !matches!(outer, AnnotationKind::Heading(_)),
    }
}

/// Blocks a new list over `range` cannot nest with are cut back.
fn carve_conflicts(doc: &mut Document, kind: &AnnotationKind, range: Span) {
    let conflicts: Vec<AnnotationId> = doc
        .annotations()
        .iter()
        .filter(|a| a.kind().is_block() && a.span().overlaps(range))
        .filter(|a| {
            let encloses = a.span().contains_span(range)
                && (a.span() != range || encloses_same_range(a.kind(), kind));
            !encloses
        })
        .map(Annotation::id)
        .collect();
    for id in conflicts {
        carve(doc, id, range);
    }
}

/// Grows a quote range until it no longer cuts through another block or
/// through several items of one list.
fn widen_for_quote(doc: &Document, mut range: Span) -> Span {
    loop {
        let mut grown = range;
        for a in doc.annotations().iter().filter(|a| a.kind().is_block()) {
            let span = a.span();
            if !span.overlaps(grown) {
                continue;
            }
            let crosses = !span.contains_span(grown) && !grown.contains_span(span);
            let splits_items = a.kind().is_list()
                && span.contains_span(grown)
                && !doc.annotations().iter().any(|item| {
                    *item.kind() == AnnotationKind::ListItem
                        && span.contains_span(item.span())
                        && item.span().contains_span(grown)
                });
            if crosses || splits_items {
                grown = Span::new(grown.start.min(span.start), grown.end.max(span.end));
            }
        }
        if grown == range {
            return range;
        }
        range = grown;
    }
}

fn merge_touching(doc: &mut Document, kind: &AnnotationKind, range: Span) {
    doc.merge_runs(
        |a| a.kind == *kind && a.span.start <= range.end && range.start <= a.span.end,
        false,
    );
    doc.normalize();
}
