//! Editing session.
//!
//! ## Architecture
//!
//! [`Editor`] is what a UI layer talks to. It owns the [`Document`], the
//! selection, styles waiting for the next typed text, and the [`History`].
//! Every mutating call is wrapped so that formatted HTML is snapshotted
//! before the edit and committed after it; calls that change nothing leave
//! no history entry.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::formatting::{self, StyleKind, block, inline, link};
use crate::history::{History, HistoryConfig, HistoryState};
use crate::html;
use crate::model::media::{self, MediaCompletion, MediaRequest};
use crate::model::{AnnotationId, AnnotationKind, Attributes, Document, MediaResolver, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditorConfig {
    pub history: HistoryConfig,
    /// Largest width media requests ask for.
    pub max_media_width: u32,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            history: HistoryConfig::default(),
            max_media_width: 800,
        }
    }
}

/// Persisted session: history, selection and content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorState {
    pub history: HistoryState,
    pub selection_start: usize,
    pub selection_end: usize,
    pub html: String,
}

/// Inline styles toggled on a collapsed caret, applied to the next text typed
/// there. `true` turns a style on, `false` off.
#[derive(Debug, Clone, Default)]
struct TypingStyles {
    at: usize,
    styles: BTreeMap<AnnotationKind, bool>,
}

pub struct Editor {
    doc: Document,
    selection: Span,
    typing: TypingStyles,
    history: History,
    config: EditorConfig,
}

impl Editor {
    pub fn new(config: EditorConfig) -> Result<Self, EngineError> {
        Ok(Self {
            doc: Document::new(),
            selection: Span::default(),
            typing: TypingStyles::default(),
            history: History::new(config.history)?,
            config,
        })
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// Direct access for media completions. Changes made here bypass history.
    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    /// Replaces the content, clears history and asks `resolver` for every
    /// media placeholder. The caret goes to the cursor marker if the markup
    /// has one, otherwise to the end.
    pub fn load_html(&mut self, source: &str, resolver: &dyn MediaResolver) {
        let parsed = html::parse(source);
        self.doc = parsed.document;
        let caret = parsed.cursor.unwrap_or(self.doc.content_len());
        self.selection = Span::new(caret, caret);
        self.typing = TypingStyles::default();
        self.history.clear();
        media::request_all(&self.doc, resolver, self.config.max_media_width);
    }

    pub fn to_html(&self, with_cursor: bool) -> String {
        html::serialize(&self.doc, with_cursor.then_some(self.selection.end))
    }

    pub fn to_formatted_html(&self) -> String {
        html::to_formatted_html(&self.doc)
    }

    pub fn to_plain_text(&self) -> String {
        self.doc.content()
    }

    pub fn selection(&self) -> Span {
        self.selection
    }

    pub fn set_selection(&mut self, selection: Span) {
        let clamped = self.doc.clamp_span(selection);
        if clamped != selection {
            log::debug!("clamped selection {selection:?} to {clamped:?}");
        }
        self.selection = clamped;
        if !clamped.is_empty() || clamped.start != self.typing.at {
            self.typing.styles.clear();
        }
    }

    /// Styles at the selection, including styles toggled for the next typed
    /// text.
    pub fn active_styles(&self) -> BTreeSet<StyleKind> {
        let mut active = formatting::active_styles(&self.doc, self.selection);
        for (kind, on) in self.pending_styles() {
            let Some(style) = style_for(kind) else {
                continue;
            };
            if *on {
                active.insert(style);
            } else {
                active.remove(&style);
            }
        }
        active
    }

    /// Toggles `style` for the selection. On a collapsed caret inline styles
    /// are remembered for the next typed text. Returns true if anything
    /// changed.
    pub fn toggle_style(&mut self, style: StyleKind) -> bool {
        if let Some(page_break) = style.page_break() {
            self.insert_page_break(page_break);
            return true;
        }
        if self.selection.is_empty()
            && let Some(kind) = style.inline_kind().filter(|k| *k != AnnotationKind::Link)
        {
            let on = !self.active_styles().contains(&style);
            if self.typing.at != self.selection.start {
                self.typing = TypingStyles {
                    at: self.selection.start,
                    styles: BTreeMap::new(),
                };
            }
            self.typing.styles.insert(kind, on);
            return true;
        }
        let selection = self.selection;
        self.edit(|doc| formatting::toggle(doc, style, selection))
    }

    /// Replaces the selection with `text` and leaves the caret after it.
    pub fn insert_text(&mut self, text: &str) {
        let selection = self.selection;
        let pending: Vec<(AnnotationKind, bool)> =
            self.pending_styles().map(|(kind, on)| (kind.clone(), *on)).collect();
        self.typing.styles.clear();

        let mut caret = selection.start;
        self.edit(|doc| {
            let patch = doc.replace(selection, text);
            log::trace!("typed {:?} at version {}", patch.changed, patch.version);
            let typed = patch
                .changed
                .first()
                .copied()
                .unwrap_or(Span::new(selection.start, selection.start));
            caret = typed.end;
            for (kind, on) in pending {
                if on {
                    inline::apply(doc, kind, typed, Attributes::new());
                } else {
                    inline::remove(doc, &kind, typed);
                }
            }
            true
        });
        self.collapse_to(caret);
    }

    /// Backspace. At the very start of the buffer this strips the leading
    /// inline styles and the first line's innermost block style instead of
    /// deleting; returns whether anything changed.
    pub fn delete_backward(&mut self) -> bool {
        if !self.selection.is_empty() {
            return self.delete_range(self.selection);
        }
        let caret = self.selection.start;
        if caret == 0 {
            return self.edit(|doc| {
                let inline = inline::remove_leading_inline_style(doc);
                let block = block::remove_block_style_from_first_line(doc);
                inline || block
            });
        }
        let width = self.doc.char_before(caret).map_or(0, char::len_utf8);
        self.delete_range(Span::new(caret - width, caret))
    }

    pub fn delete_range(&mut self, range: Span) -> bool {
        let range = self.doc.clamp_span(range);
        if range.is_empty() {
            return false;
        }
        let changed = self.edit(|doc| {
            doc.delete(range);
            true
        });
        self.collapse_to(range.start);
        changed
    }

    /// Links the selection to `url`. See [`link::link`].
    pub fn link(&mut self, url: &str, anchor: &str) {
        let selection = self.selection;
        let mut linked = selection;
        self.edit(|doc| {
            linked = link::link(doc, url, anchor, selection);
            true
        });
        self.selection = self.doc.clamp_span(linked);
    }

    pub fn remove_link(&mut self) -> bool {
        let selection = self.selection;
        self.edit(|doc| link::remove_link(doc, selection))
    }

    /// `(href, anchor)` of the link under the selection.
    pub fn selected_link(&self) -> Option<(String, String)> {
        link::selected_link(&self.doc, self.selection).map(|l| (l.href, l.anchor))
    }

    pub fn remove_inline_styles(&mut self) -> bool {
        let selection = self.selection;
        self.edit(|doc| {
            inline::remove_inline_styles(doc, selection);
            true
        })
    }

    pub fn remove_block_styles(&mut self) -> bool {
        let selection = self.selection;
        self.edit(|doc| {
            block::remove_block_styles(doc, selection);
            true
        })
    }

    /// Replaces the selection with a media placeholder and requests it from
    /// `resolver`.
    pub fn insert_media(&mut self, attributes: Attributes, resolver: &dyn MediaResolver) -> AnnotationId {
        let selection = self.selection;
        let mut id = AnnotationId(0);
        self.edit(|doc| {
            doc.delete(selection);
            id = doc.insert_placeholder(selection.start, AnnotationKind::Media, attributes);
            true
        });
        let placed = self
            .doc
            .annotation(id)
            .map(|placeholder| (placeholder.end(), placeholder.attribute("src").unwrap_or_default().to_string()));
        if let Some((end, src)) = placed {
            self.collapse_to(end);
            resolver.resolve(
                MediaRequest {
                    src,
                    max_width: self.config.max_media_width,
                },
                MediaCompletion::new(id),
            );
        }
        id
    }

    pub fn find_media(&self, predicate: impl Fn(&Attributes) -> bool) -> Vec<Attributes> {
        media::find(&self.doc, predicate)
    }

    /// Attributes of the first media placeholder matching `predicate`.
    pub fn media_attributes(&self, predicate: impl Fn(&Attributes) -> bool) -> Option<Attributes> {
        media::find(&self.doc, predicate).into_iter().next()
    }

    /// Replaces the attributes of every matching media placeholder.
    pub fn set_media_attributes(&mut self, predicate: impl Fn(&Attributes) -> bool, attributes: Attributes) -> bool {
        let ids = self.media_ids(&predicate);
        self.edit(|doc| {
            let mut changed = false;
            for id in ids {
                changed |= doc.set_attributes(id, attributes.clone());
            }
            changed
        })
    }

    /// Deletes every matching media placeholder.
    pub fn remove_media(&mut self, predicate: impl Fn(&Attributes) -> bool) -> bool {
        let ids = self.media_ids(&predicate);
        let removed = self.edit(|doc| {
            let mut spans: Vec<Span> = ids.iter().filter_map(|id| doc.annotation(*id)).map(|a| a.span()).collect();
            spans.sort_by_key(|span| std::cmp::Reverse(span.start));
            for span in &spans {
                doc.delete(*span);
            }
            !spans.is_empty()
        });
        self.selection = self.doc.clamp_span(self.selection);
        removed
    }

    fn insert_page_break(&mut self, page_break: crate::model::PageBreak) {
        let selection = self.selection;
        let mut caret = selection.start;
        self.edit(|doc| {
            doc.delete(selection);
            let id = block::insert_page_break(doc, page_break, selection.start);
            if let Some(placeholder) = doc.annotation(id) {
                caret = placeholder.end();
            }
            true
        });
        self.collapse_to(caret);
    }

    /// HTML of the selection for the clipboard.
    pub fn copy_html(&self) -> String {
        html::fragment(&self.doc, self.selection)
    }

    /// Pastes HTML over the selection and leaves the caret after it.
    pub fn paste_html(&mut self, source: &str) {
        let selection = self.selection;
        let mut pasted = selection;
        self.edit(|doc| {
            pasted = html::paste(doc, source, selection);
            true
        });
        self.collapse_to(pasted.end);
    }

    /// The preserved markup of an unknown block, for the block editor.
    pub fn unknown_block_html(&self, id: AnnotationId) -> Option<String> {
        match self.doc.annotation(id)?.kind() {
            AnnotationKind::UnknownBlock { raw } => Some(raw.clone()),
            _ => None,
        }
    }

    /// Replaces an unknown block with edited markup, which is parsed like a
    /// paste at the block's position.
    pub fn replace_unknown_block(&mut self, id: AnnotationId, source: &str) -> Result<(), EngineError> {
        let span = match self.doc.annotation(id) {
            Some(a) if matches!(a.kind(), AnnotationKind::UnknownBlock { .. }) => a.span(),
            _ => return Err(EngineError::UnknownBlockNotFound(id)),
        };
        self.edit(|doc| {
            html::paste(doc, source, span);
            true
        });
        self.selection = self.doc.clamp_span(self.selection);
        Ok(())
    }

    pub fn undo(&mut self) -> bool {
        match self.history.undo() {
            Some(snapshot) => {
                self.restore_snapshot(&snapshot);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.history.redo() {
            Some(snapshot) => {
                self.restore_snapshot(&snapshot);
                true
            }
            None => false,
        }
    }

    pub fn save_state(&self) -> EditorState {
        EditorState {
            history: self.history.state(),
            selection_start: self.selection.start,
            selection_end: self.selection.end,
            html: self.to_html(false),
        }
    }

    /// Restores a saved session. The selection is kept only if it still lies
    /// inside the content; otherwise the caret goes to the end.
    pub fn restore_state(&mut self, state: EditorState) {
        self.doc = html::parse(&state.html).document;
        self.history.restore(state.history);
        self.typing = TypingStyles::default();
        let len = self.doc.content_len();
        let fits = state.selection_start <= state.selection_end && state.selection_end <= len;
        self.selection = if fits {
            self.doc
                .clamp_span(Span::new(state.selection_start, state.selection_end))
        } else {
            Span::new(len, len)
        };
    }

    /// Runs `op` between a history snapshot and a commit. `op` reports
    /// whether it changed anything.
    fn edit(&mut self, op: impl FnOnce(&mut Document) -> bool) -> bool {
        self.history.snapshot_before(&html::to_formatted_html(&self.doc));
        let changed = op(&mut self.doc);
        self.history.commit(&html::to_formatted_html(&self.doc));
        changed
    }

    fn restore_snapshot(&mut self, snapshot: &str) {
        self.doc = html::parse(snapshot).document;
        self.typing = TypingStyles::default();
        self.selection = self.doc.clamp_span(self.selection);
    }

    fn collapse_to(&mut self, caret: usize) {
        let caret = self.doc.clamp_offset(caret);
        self.selection = Span::new(caret, caret);
    }

    fn pending_styles(&self) -> impl Iterator<Item = (&AnnotationKind, &bool)> {
        let live = self.selection.is_empty() && self.selection.start == self.typing.at;
        self.typing.styles.iter().filter(move |_| live)
    }

    fn media_ids(&self, predicate: &impl Fn(&Attributes) -> bool) -> Vec<AnnotationId> {
        self.doc
            .annotations()
            .iter()
            .filter(|a| *a.kind() == AnnotationKind::Media && predicate(a.attributes()))
            .map(|a| a.id())
            .collect()
    }
}

fn style_for(kind: &AnnotationKind) -> Option<StyleKind> {
    match kind {
        AnnotationKind::Bold => Some(StyleKind::Bold),
        AnnotationKind::Italic => Some(StyleKind::Italic),
        AnnotationKind::Underline => Some(StyleKind::Underline),
        AnnotationKind::Strikethrough => Some(StyleKind::Strikethrough),
        AnnotationKind::Code => Some(StyleKind::Code),
        _ => None,
    }
}
