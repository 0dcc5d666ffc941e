//! Selection-scoped formatting.
//!
//! ## Architecture
//!
//! - [`inline`]: character styles (bold, italic, underline, strikethrough, code)
//! - [`block`]: line styles (headings, lists, quotes)
//! - [`link`]: adding, editing and removing links
//!
//! All operations are free functions over `&mut Document`. Selections are
//! clamped with [`Document::clamp_span`] before use, so out-of-range input is
//! corrected rather than rejected.

pub mod block;
pub mod inline;
pub mod link;

use std::collections::BTreeSet;

use crate::model::{AnnotationKind, Document, HeadingLevel, PageBreak, Span};

/// Styles exposed to toolbars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StyleKind {
    /// Plain line: clears headings.
    Paragraph,
    Heading(HeadingLevel),
    Bold,
    Italic,
    Underline,
    Strikethrough,
    Code,
    Link,
    UnorderedList,
    OrderedList,
    Quote,
    /// `<!--more-->` page break.
    More,
    /// `<!--nextpage-->` page break.
    Page,
}

impl StyleKind {
    /// Every style that can be reported as active.
    pub fn queryable() -> Vec<StyleKind> {
        let mut all = vec![
            StyleKind::Bold,
            StyleKind::Italic,
            StyleKind::Underline,
            StyleKind::Strikethrough,
            StyleKind::Code,
            StyleKind::Link,
            StyleKind::UnorderedList,
            StyleKind::OrderedList,
            StyleKind::Quote,
        ];
        all.extend(HeadingLevel::ALL.map(StyleKind::Heading));
        all
    }

    /// Annotation kind toggled by an inline style.
    pub fn inline_kind(self) -> Option<AnnotationKind> {
        match self {
            StyleKind::Bold => Some(AnnotationKind::Bold),
            StyleKind::Italic => Some(AnnotationKind::Italic),
            StyleKind::Underline => Some(AnnotationKind::Underline),
            StyleKind::Strikethrough => Some(AnnotationKind::Strikethrough),
            StyleKind::Code => Some(AnnotationKind::Code),
            StyleKind::Link => Some(AnnotationKind::Link),
            _ => None,
        }
    }

    pub fn page_break(self) -> Option<PageBreak> {
        match self {
            StyleKind::More => Some(PageBreak::More),
            StyleKind::Page => Some(PageBreak::NextPage),
            _ => None,
        }
    }
}

/// True if `style` applies to the whole selection.
pub fn contains(doc: &Document, style: StyleKind, selection: Span) -> bool {
    match style {
        StyleKind::Heading(level) => block::contains_heading(doc, level, selection),
        StyleKind::UnorderedList => block::contains_list(doc, &AnnotationKind::UnorderedList, selection),
        StyleKind::OrderedList => block::contains_list(doc, &AnnotationKind::OrderedList, selection),
        StyleKind::Quote => block::contains_quote(doc, selection),
        StyleKind::Paragraph | StyleKind::More | StyleKind::Page => false,
        inline => inline
            .inline_kind()
            .is_some_and(|kind| inline::contains_style(doc, &kind, selection)),
    }
}

/// Styles active for `selection`.
///
/// A caret looks at the character before it, or at the character after it at
/// the start of a line. An empty document has no active styles.
pub fn active_styles(doc: &Document, selection: Span) -> BTreeSet<StyleKind> {
    if doc.is_empty() {
        return BTreeSet::new();
    }
    let selection = doc.clamp_span(selection);
    let window = if selection.is_empty() {
        match inline::caret_window(doc, selection.start) {
            Some(window) => window,
            None => return BTreeSet::new(),
        }
    } else {
        selection
    };
    StyleKind::queryable()
        .into_iter()
        .filter(|style| contains(doc, *style, window))
        .collect()
}

/// Toggles `style` over `selection`. Returns true if the document changed.
///
/// Links need a URL and go through [`link::link`]; page breaks are inserted
/// with [`block::insert_page_break`].
pub fn toggle(doc: &mut Document, style: StyleKind, selection: Span) -> bool {
    let before = doc.clone();
    match style {
        StyleKind::Paragraph => block::clear_headings(doc, selection),
        StyleKind::Heading(level) => block::toggle_heading(doc, level, selection),
        StyleKind::UnorderedList => block::toggle_list(doc, AnnotationKind::UnorderedList, selection),
        StyleKind::OrderedList => block::toggle_list(doc, AnnotationKind::OrderedList, selection),
        StyleKind::Quote => block::toggle_quote(doc, selection),
        StyleKind::More | StyleKind::Page | StyleKind::Link => {}
        inline => {
            if let Some(kind) = inline.inline_kind() {
                inline::toggle(doc, kind, selection);
            }
        }
    }
    *doc != before
}
