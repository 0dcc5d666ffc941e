use std::fmt;

use xi_rope::delta::{Builder, Transformer};
use xi_rope::{Delta, Rope, RopeInfo};

use super::annotation::{Annotation, AnnotationId, AnnotationKind, Attributes};
use super::commands::{Cmd, changed_ranges, compile_command};
use super::lines::{LineRef, lines_with_spans};
use super::patch::Patch;
use super::span::Span;
use super::{END_OF_BUFFER_MARKER, OBJECT_REPLACEMENT};

/// Annotated text buffer.
///
/// A Document is a character buffer plus a flat list of [`Annotation`]s over it.
///
/// ## 1. Buffer
/// - The text lives in one `xi_rope::Rope`; offsets are UTF-8 byte offsets.
/// - Media, unknown markup and page breaks each occupy one
///   [`OBJECT_REPLACEMENT`] character.
/// - When the last line belongs to a block annotation the buffer ends with
///   [`END_OF_BUFFER_MARKER`] so that line is never empty. [`content_len`]
///   excludes it and every public offset is clamped below it.
///
/// ## 2. Edits
/// - All changes flow through [`Cmd`], compiled to a `Delta` and applied in one
///   step.
/// - Annotation offsets move with `xi_rope::delta::Transformer`: starts move when
///   text is inserted at or before them, ends move when text is inserted before
///   them, or exactly at them for end-inclusive inline kinds.
/// - After every edit the annotation set is normalized (see `normalize.rs`).
///
/// ## 3. Identity
/// - Every annotation keeps its [`AnnotationId`] across edits, so deferred work
///   (media loads, unknown block edits) can find it again.
///
/// ```rust
/// # use aztec_engine::{AnnotationKind, Document, Span};
/// let mut doc = Document::from_text("Hello world");
/// doc.add_annotation(AnnotationKind::Bold, Span::new(0, 5), Default::default());
/// doc.insert(5, "!!");
///
/// let bold = doc.query_spans_in_range(Span::new(0, 1), Some(&AnnotationKind::Bold));
/// assert_eq!(bold[0].span(), Span::new(0, 7));
/// ```
///
/// [`content_len`]: Document::content_len
#[derive(Clone)]
pub struct Document {
    pub(crate) buffer: Rope,
    /// Annotations in creation order.
    pub(crate) annotations: Vec<Annotation>,
    pub(crate) next_id: u64,
    /// Incremented on each edit.
    pub(crate) version: u64,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            buffer: Rope::from(""),
            annotations: Vec::new(),
            next_id: 0,
            version: 0,
        }
    }

    /// Plain document without annotations.
    pub fn from_text(text: &str) -> Self {
        Self {
            buffer: Rope::from(text),
            ..Self::new()
        }
    }

    /// Apply a command to the document.
    ///
    /// Offsets in the command are clamped to [`content_len`](Self::content_len)
    /// and snapped down to char boundaries first.
    pub fn apply(&mut self, cmd: Cmd) -> Patch {
        let cmd = self.clamp_command(cmd);
        if cmd.is_noop() {
            return Patch {
                changed: Vec::new(),
                version: self.version,
            };
        }

        let delta = compile_command(self, &cmd);
        let changed = changed_ranges(&delta);
        let breaks = cmd.inserted_breaks();

        self.buffer = delta.apply(&self.buffer);
        self.transform_annotations(&delta);
        self.normalize_with_breaks(&breaks);

        self.version += 1;
        Patch {
            changed,
            version: self.version,
        }
    }

    /// Inserts `text` at `position`.
    pub fn insert(&mut self, position: usize, text: &str) -> Patch {
        self.apply(Cmd::InsertText {
            at: position,
            text: text.to_string(),
        })
    }

    /// Removes `range` from the buffer. Annotations left empty disappear.
    pub fn delete(&mut self, range: Span) -> Patch {
        self.apply(Cmd::DeleteRange { range })
    }

    /// Replaces `range` with `text`.
    pub fn replace(&mut self, range: Span, text: &str) -> Patch {
        self.apply(Cmd::ReplaceRange {
            range,
            text: text.to_string(),
        })
    }

    fn clamp_command(&self, cmd: Cmd) -> Cmd {
        match cmd {
            Cmd::InsertText { at, text } => Cmd::InsertText {
                at: self.clamp_offset(at),
                text,
            },
            Cmd::DeleteRange { range } => Cmd::DeleteRange {
                range: self.clamp_span(range),
            },
            Cmd::ReplaceRange { range, text } => Cmd::ReplaceRange {
                range: self.clamp_span(range),
                text,
            },
        }
    }

    fn transform_annotations(&mut self, delta: &Delta<RopeInfo>) {
        let mut transformer = Transformer::new(delta);
        for annotation in &mut self.annotations {
            let start = transformer.transform(annotation.span.start, true);
            let end = transformer.transform(annotation.span.end, annotation.kind.end_inclusive());
            annotation.span = Span::new(start, end.max(start));
        }
    }

    /// Adds an annotation and normalizes the document.
    ///
    /// The span is clamped to the buffer. Zero-width annotations are dropped by
    /// normalization, so the returned id may not resolve afterwards.
    pub fn add_annotation(&mut self, kind: AnnotationKind, span: Span, attributes: Attributes) -> AnnotationId {
        let id = self.push_annotation(kind, span, attributes);
        self.normalize();
        id
    }

    /// Adds an annotation without normalizing. Callers normalize once they are done.
    pub(crate) fn push_annotation(&mut self, kind: AnnotationKind, span: Span, attributes: Attributes) -> AnnotationId {
        let id = self.next_annotation_id();
        let len = self.len();
        let start = span.start.min(span.end).min(len);
        let end = span.end.max(span.start).min(len);
        self.annotations
            .push(Annotation::new(id, kind, Span::new(start, end), attributes));
        id
    }

    pub(crate) fn next_annotation_id(&mut self) -> AnnotationId {
        let id = AnnotationId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Removes an annotation by identity and normalizes the document.
    pub fn remove_annotation(&mut self, id: AnnotationId) -> Option<Annotation> {
        let removed = self.take_annotation(id);
        if removed.is_some() {
            self.normalize();
        }
        removed
    }

    pub(crate) fn take_annotation(&mut self, id: AnnotationId) -> Option<Annotation> {
        let index = self.annotations.iter().position(|a| a.id == id)?;
        Some(self.annotations.remove(index))
    }

    /// Replaces the attributes of an annotation. Returns false if it no longer exists.
    pub fn set_attributes(&mut self, id: AnnotationId, attributes: Attributes) -> bool {
        match self.annotation_mut(id) {
            Some(annotation) => {
                annotation.attributes = attributes;
                self.normalize();
                true
            }
            None => false,
        }
    }

    pub fn annotation(&self, id: AnnotationId) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.id == id)
    }

    pub(crate) fn annotation_mut(&mut self, id: AnnotationId) -> Option<&mut Annotation> {
        self.annotations.iter_mut().find(|a| a.id == id)
    }

    /// All annotations in creation order.
    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    /// All annotations ordered by start, ties in creation order.
    pub fn annotations_sorted(&self) -> Vec<&Annotation> {
        let mut sorted: Vec<&Annotation> = self.annotations.iter().collect();
        sorted.sort_by_key(|a| a.span.start);
        sorted
    }

    /// Annotations intersecting `range`, optionally restricted to one kind.
    ///
    /// A non-empty range matches annotations sharing at least one byte with
    /// it; an empty range also matches annotations that merely touch it.
    /// Results are ordered by start, ties in creation order.
    pub fn query_spans_in_range(&self, range: Span, kind: Option<&AnnotationKind>) -> Vec<&Annotation> {
        let mut found: Vec<&Annotation> = self
            .annotations
            .iter()
            .filter(|a| kind.is_none_or(|k| a.kind == *k))
            .filter(|a| {
                if range.is_empty() {
                    a.span.start <= range.start && range.start <= a.span.end
                } else {
                    a.span.overlaps(range)
                }
            })
            .collect();
        found.sort_by_key(|a| a.span.start);
        found
    }

    /// Merges annotations of `kind` that touch end-to-start and carry equal
    /// attributes.
    pub fn merge_adjacent(&mut self, kind: &AnnotationKind) {
        if kind.is_placeholder() {
            return;
        }
        self.merge_runs(|a| a.kind == *kind, false);
        self.normalize();
    }

    /// Merges runs of annotations selected by `select` that share kind,
    /// attributes and nesting. Overlapping ones merge too when `overlapping`.
    pub(crate) fn merge_runs(&mut self, select: impl Fn(&Annotation) -> bool, overlapping: bool) {
        let mut order: Vec<usize> = (0..self.annotations.len())
            .filter(|&i| select(&self.annotations[i]))
            .collect();
        order.sort_by(|&a, &b| {
            let (a, b) = (&self.annotations[a], &self.annotations[b]);
            (&a.kind, &a.attributes, a.nesting_level, a.span.start)
                .cmp(&(&b.kind, &b.attributes, b.nesting_level, b.span.start))
        });

        let mut removed = vec![false; self.annotations.len()];
        let mut current: Option<usize> = None;
        for i in order {
            if let Some(c) = current {
                let (head, next) = (&self.annotations[c], &self.annotations[i]);
                let same = head.kind == next.kind
                    && head.attributes == next.attributes
                    && head.nesting_level == next.nesting_level;
                let joins = if overlapping {
                    next.span.start <= head.span.end
                } else {
                    next.span.start == head.span.end
                };
                if same && joins {
                    let end = head.span.end.max(next.span.end);
                    self.annotations[c].span.end = end;
                    removed[i] = true;
                    continue;
                }
            }
            current = Some(i);
        }

        let mut index = 0;
        self.annotations.retain(|_| {
            let keep = !removed[index];
            index += 1;
            keep
        });
    }

    /// Get the current text content, including the end marker if present.
    pub fn text(&self) -> String {
        self.buffer.to_string()
    }

    /// Text without the end marker.
    pub fn content(&self) -> String {
        let mut text = self.text();
        if text.ends_with(END_OF_BUFFER_MARKER) {
            text.pop();
        }
        text
    }

    /// Buffer length in bytes, including the end marker.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content_len() == 0
    }

    /// Length of the user-visible content, excluding the end marker.
    pub fn content_len(&self) -> usize {
        if self.has_end_marker() {
            self.len() - END_OF_BUFFER_MARKER.len_utf8()
        } else {
            self.len()
        }
    }

    pub fn has_end_marker(&self) -> bool {
        let len = self.len();
        let Some(start) = len.checked_sub(END_OF_BUFFER_MARKER.len_utf8()) else {
            return false;
        };
        self.buffer.is_codepoint_boundary(start)
            && self
                .buffer
                .slice_to_cow(start..len)
                .starts_with(END_OF_BUFFER_MARKER)
    }

    /// Get the current version
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Lines of the buffer with their spans.
    pub fn lines(&self) -> Vec<LineRef> {
        lines_with_spans(&self.buffer).collect()
    }

    /// Slice the buffer to a string, clamping the range to the buffer.
    pub fn slice(&self, range: Span) -> String {
        let start = self.floor_char_boundary(range.start);
        let end = self.floor_char_boundary(range.end).max(start);
        self.buffer.slice_to_cow(start..end).into_owned()
    }

    /// The character ending at `offset`, if any.
    pub fn char_before(&self, offset: usize) -> Option<char> {
        let end = self.floor_char_boundary(offset);
        let start = self.floor_char_boundary(end.checked_sub(1)?);
        self.buffer.slice_to_cow(start..end).chars().next()
    }

    /// The character starting at `offset`, if any.
    pub fn char_at(&self, offset: usize) -> Option<char> {
        let start = self.floor_char_boundary(offset);
        // A UTF-8 sequence is at most four bytes.
        let end = self.floor_char_boundary(start + 4);
        self.buffer.slice_to_cow(start..end).chars().next()
    }

    /// Clamps an offset to `[0, content_len]` and snaps it down to a char boundary.
    pub fn clamp_offset(&self, offset: usize) -> usize {
        self.floor_char_boundary(offset.min(self.content_len()))
    }

    /// Largest char boundary of the buffer at or below `offset`.
    fn floor_char_boundary(&self, offset: usize) -> usize {
        let mut offset = offset.min(self.len());
        while offset > 0 && !self.buffer.is_codepoint_boundary(offset) {
            offset -= 1;
        }
        offset
    }

    /// Orders and clamps both ends of a range with [`clamp_offset`](Self::clamp_offset).
    pub fn clamp_span(&self, span: Span) -> Span {
        let (start, end) = if span.start <= span.end {
            (span.start, span.end)
        } else {
            (span.end, span.start)
        };
        Span::new(self.clamp_offset(start), self.clamp_offset(end))
    }

    /// Appends the end marker. Blocks ending on an unterminated last line grow
    /// over it; after a trailing separator the marker starts a line of its own.
    pub(crate) fn append_end_marker(&mut self) {
        let len = self.len();
        let grow = !self.text().ends_with('\n');
        let mut builder = Builder::new(len);
        builder.replace(len..len, Rope::from(END_OF_BUFFER_MARKER.to_string()));
        self.buffer = builder.build().apply(&self.buffer);
        let new_len = self.len();
        for annotation in &mut self.annotations {
            if grow && annotation.span.end == len && annotation.kind.is_block() {
                annotation.span.end = new_len;
            }
        }
    }

    /// Removes the end marker, clipping annotations to the shorter buffer.
    pub(crate) fn remove_end_marker(&mut self) {
        let len = self.len();
        let new_len = len - END_OF_BUFFER_MARKER.len_utf8();
        let mut builder = Builder::new(len);
        builder.delete(new_len..len);
        self.buffer = builder.build().apply(&self.buffer);
        for annotation in &mut self.annotations {
            annotation.span.start = annotation.span.start.min(new_len);
            annotation.span.end = annotation.span.end.min(new_len);
        }
    }

    /// Inserts an [`OBJECT_REPLACEMENT`] character at `at` and annotates it.
    pub fn insert_placeholder(&mut self, at: usize, kind: AnnotationKind, attributes: Attributes) -> AnnotationId {
        let at = self.clamp_offset(at);
        let mut builder = Builder::new(self.len());
        builder.replace(at..at, Rope::from(OBJECT_REPLACEMENT.to_string()));
        let delta = builder.build();
        self.buffer = delta.apply(&self.buffer);
        self.transform_annotations(&delta);
        let id = self.push_annotation(
            kind,
            Span::new(at, at + OBJECT_REPLACEMENT.len_utf8()),
            attributes,
        );
        self.normalize();
        self.version += 1;
        id
    }

    /// Panics if an annotation invariant does not hold. See [`invariants::check`].
    ///
    /// [`invariants::check`]: super::invariants::check
    pub fn check_invariants(&self) {
        super::invariants::check(self);
    }
}

/// Structural equality: same buffer and the same annotations, ignoring
/// identities, creation order and media load state.
impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        if self.text() != other.text() || self.annotations.len() != other.annotations.len() {
            return false;
        }
        let mut ours: Vec<_> = self.annotations.iter().map(Annotation::structural_key).collect();
        let mut theirs: Vec<_> = other.annotations.iter().map(Annotation::structural_key).collect();
        ours.sort();
        theirs.sort();
        ours == theirs
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("text", &self.text())
            .field("annotations", &self.annotations_sorted())
            .field("version", &self.version)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::HeadingLevel;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn bold_doc() -> Document {
        let mut doc = Document::from_text("Hello world");
        doc.add_annotation(AnnotationKind::Bold, Span::new(0, 5), Attributes::new());
        doc
    }

    fn spans_of(doc: &Document, kind: &AnnotationKind) -> Vec<Span> {
        doc.query_spans_in_range(Span::new(0, doc.len()), Some(kind))
            .iter()
            .map(|a| a.span())
            .collect()
    }

    #[rstest]
    #[case::inside(2, Span::new(0, 7))]
    #[case::at_end(5, Span::new(0, 7))]
    #[case::at_start(0, Span::new(2, 7))]
    #[case::after(6, Span::new(0, 5))]
    fn insert_moves_bold(#[case] at: usize, #[case] expected: Span) {
        let mut doc = bold_doc();
        doc.insert(at, "xx");
        assert_eq!(spans_of(&doc, &AnnotationKind::Bold), vec![expected]);
    }

    #[test]
    fn link_does_not_grow_at_its_end() {
        let mut doc = Document::from_text("click here");
        let href = Attributes::from([("href".to_string(), "https://a.b".to_string())]);
        doc.add_annotation(AnnotationKind::Link, Span::new(6, 10), href);
        doc.insert(10, "!");
        assert_eq!(spans_of(&doc, &AnnotationKind::Link), vec![Span::new(6, 10)]);
        doc.insert(8, "-");
        assert_eq!(spans_of(&doc, &AnnotationKind::Link), vec![Span::new(6, 11)]);
    }

    #[test]
    fn delete_clips_and_drops() {
        let mut doc = bold_doc();
        doc.add_annotation(AnnotationKind::Italic, Span::new(6, 8), Attributes::new());
        doc.delete(Span::new(3, 9));
        assert_eq!(doc.text(), "Helld");
        assert_eq!(spans_of(&doc, &AnnotationKind::Bold), vec![Span::new(0, 3)]);
        assert!(spans_of(&doc, &AnnotationKind::Italic).is_empty());
    }

    #[test]
    fn deleting_part_of_a_placeholder_is_impossible() {
        let mut doc = Document::from_text("ab");
        doc.insert_placeholder(1, AnnotationKind::Media, Attributes::new());
        // Offset 2 is inside the three-byte placeholder and snaps down to 1.
        doc.delete(Span::new(2, 3));
        assert_eq!(doc.annotations().len(), 1);
        doc.delete(Span::new(1, 4));
        assert_eq!(doc.text(), "ab");
        assert!(doc.annotations().is_empty());
    }

    #[test]
    fn insert_then_delete_restores_state() {
        let mut doc = bold_doc();
        let href = Attributes::from([("href".to_string(), "x".to_string())]);
        doc.add_annotation(AnnotationKind::Link, Span::new(6, 11), href);
        let before = doc.clone();

        for at in [0, 3, 5, 6, 11] {
            doc.insert(at, "abc");
            doc.delete(Span::new(at, at + 3));
            assert_eq!(doc, before, "insert at {at}");
        }
    }

    #[test]
    fn adjacent_bold_merges_after_delete() {
        let mut doc = Document::from_text("aa bb");
        doc.add_annotation(AnnotationKind::Bold, Span::new(0, 2), Attributes::new());
        doc.add_annotation(AnnotationKind::Bold, Span::new(3, 5), Attributes::new());
        doc.delete(Span::new(2, 3));
        assert_eq!(spans_of(&doc, &AnnotationKind::Bold), vec![Span::new(0, 4)]);
    }

    #[test]
    fn merge_adjacent_requires_equal_attributes() {
        let mut doc = Document::from_text("abcd");
        let a = Attributes::from([("href".to_string(), "a".to_string())]);
        let b = Attributes::from([("href".to_string(), "b".to_string())]);
        doc.add_annotation(AnnotationKind::Link, Span::new(0, 2), a.clone());
        doc.add_annotation(AnnotationKind::Link, Span::new(2, 4), b);
        doc.merge_adjacent(&AnnotationKind::Link);
        assert_eq!(spans_of(&doc, &AnnotationKind::Link).len(), 2);
    }

    #[test]
    fn query_orders_by_start_then_creation() {
        let mut doc = Document::from_text("abcdef");
        let late = doc.add_annotation(AnnotationKind::Italic, Span::new(2, 4), Attributes::new());
        let early = doc.add_annotation(AnnotationKind::Bold, Span::new(0, 3), Attributes::new());
        let same_start = doc.add_annotation(AnnotationKind::Underline, Span::new(2, 6), Attributes::new());
        let ids: Vec<_> = doc
            .query_spans_in_range(Span::new(1, 3), None)
            .iter()
            .map(|a| a.id())
            .collect();
        assert_eq!(ids, vec![early, late, same_start]);
    }

    #[test]
    fn empty_query_range_matches_touching() {
        let doc = bold_doc();
        assert_eq!(doc.query_spans_in_range(Span::new(5, 5), None).len(), 1);
        assert_eq!(doc.query_spans_in_range(Span::new(5, 7), None).len(), 0);
    }

    #[test]
    fn block_on_last_line_keeps_end_marker() {
        let mut doc = Document::from_text("Title");
        let h1 = AnnotationKind::Heading(HeadingLevel::ALL[0]);
        let id = doc.add_annotation(h1.clone(), Span::new(0, 5), Attributes::new());
        assert!(doc.has_end_marker());
        assert_eq!(doc.content_len(), 5);
        assert_eq!(doc.content(), "Title");

        doc.insert(5, "!");
        assert_eq!(spans_of(&doc, &h1), vec![Span::new(0, 6 + END_OF_BUFFER_MARKER.len_utf8())]);

        doc.remove_annotation(id);
        assert!(!doc.has_end_marker());
        assert_eq!(doc.text(), "Title!");
    }

    #[test]
    fn offsets_clamp_below_marker_and_to_char_boundaries() {
        let mut doc = Document::from_text("héllo");
        assert_eq!(doc.clamp_offset(2), 1);
        assert_eq!(doc.clamp_offset(99), doc.len());
        doc.add_annotation(AnnotationKind::Quote, Span::new(0, 6), Attributes::new());
        assert_eq!(doc.clamp_offset(99), doc.content_len());
        assert_eq!(doc.clamp_span(Span { start: 4, end: 2 }), Span::new(1, 4));
    }

    #[rstest]
    #[case::accent_first("éab")]
    #[case::wide_middle("a€b")]
    #[case::emoji_last("x😀")]
    fn multibyte_tails_are_not_mistaken_for_the_marker(#[case] text: &str) {
        let doc = Document::from_text(text);
        assert!(!doc.has_end_marker());
        assert_eq!(doc.content_len(), text.len());
        assert_eq!(doc.clamp_offset(99), text.len());
        assert_eq!(doc.char_before(text.len()), text.chars().next_back());
        assert_eq!(doc.char_at(0), text.chars().next());
    }

    #[test]
    fn placeholder_followed_by_one_character() {
        let mut doc = Document::from_text("ab");
        doc.insert_placeholder(1, AnnotationKind::Media, Attributes::new());
        assert!(!doc.has_end_marker());
        assert_eq!(doc.content_len(), 5);
        assert_eq!(doc.char_before(4), Some(OBJECT_REPLACEMENT));
        assert_eq!(doc.char_at(4), Some('b'));
        assert_eq!(doc.clamp_offset(3), 1);
        assert_eq!(doc.slice(Span::new(0, 3)), "a");
    }

    #[test]
    fn patch_reports_inserted_text() {
        let mut doc = Document::from_text("héllo");
        let patch = doc.replace(Span::new(1, 3), "ey ");
        assert_eq!(doc.text(), "hey llo");
        assert_eq!(patch.changed, vec![Span::new(1, 4)]);
        assert_eq!(patch.version, doc.version());

        let noop = doc.delete(Span::new(2, 2));
        assert!(noop.changed.is_empty());
        assert_eq!(noop.version, patch.version);
    }

    #[test]
    fn equality_ignores_identity_and_order() {
        let mut a = Document::from_text("abc");
        a.add_annotation(AnnotationKind::Bold, Span::new(0, 1), Attributes::new());
        a.add_annotation(AnnotationKind::Italic, Span::new(1, 2), Attributes::new());
        let mut b = Document::from_text("abc");
        b.add_annotation(AnnotationKind::Underline, Span::new(2, 3), Attributes::new());
        b.add_annotation(AnnotationKind::Italic, Span::new(1, 2), Attributes::new());
        b.add_annotation(AnnotationKind::Bold, Span::new(0, 1), Attributes::new());
        assert_ne!(a, b);
        a.add_annotation(AnnotationKind::Underline, Span::new(2, 3), Attributes::new());
        assert_eq!(a, b);
    }
}
