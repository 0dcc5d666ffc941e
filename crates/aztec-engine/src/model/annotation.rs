use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::media::MediaDisplay;
use super::span::Span;

/// Stable identity of an annotation. Survives every edit that moves its offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnnotationId(pub u64);

/// Attribute name to value. Ordered so that serialization is deterministic.
pub type Attributes = BTreeMap<String, String>;

/// Heading level, always within `1..=6`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeadingLevel(u8);

impl HeadingLevel {
    pub const ALL: [HeadingLevel; 6] = [
        HeadingLevel(1),
        HeadingLevel(2),
        HeadingLevel(3),
        HeadingLevel(4),
        HeadingLevel(5),
        HeadingLevel(6),
    ];

    pub fn new(level: u8) -> Option<Self> {
        (1..=6).contains(&level).then_some(Self(level))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn tag(self) -> &'static str {
        match self.0 {
            1 => "h1",
            2 => "h2",
            3 => "h3",
            4 => "h4",
            5 => "h5",
            _ => "h6",
        }
    }
}

/// WordPress page break comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PageBreak {
    /// `<!--more-->`
    More,
    /// `<!--nextpage-->`
    NextPage,
}

impl PageBreak {
    /// Comment body as written between `<!--` and `-->`.
    pub fn comment_text(self) -> &'static str {
        match self {
            PageBreak::More => "more",
            PageBreak::NextPage => "nextpage",
        }
    }
}

/// Every kind of annotation the model knows about.
///
/// Inline kinds cover characters, block kinds cover whole lines, and
/// placeholder kinds cover exactly one [`OBJECT_REPLACEMENT`](super::OBJECT_REPLACEMENT)
/// character.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AnnotationKind {
    Bold,
    Italic,
    Underline,
    Strikethrough,
    Code,
    /// `href` lives in the attributes.
    Link,
    Heading(HeadingLevel),
    UnorderedList,
    OrderedList,
    ListItem,
    Quote,
    /// `src` and the other image attributes live in the attributes.
    Media,
    /// Markup the parser does not understand, kept byte for byte.
    UnknownBlock {
        raw: String,
    },
    Comment(PageBreak),
}

impl AnnotationKind {
    pub fn is_inline(&self) -> bool {
        matches!(
            self,
            AnnotationKind::Bold
                | AnnotationKind::Italic
                | AnnotationKind::Underline
                | AnnotationKind::Strikethrough
                | AnnotationKind::Code
                | AnnotationKind::Link
        )
    }

    /// Line-scoped kinds.
    pub fn is_block(&self) -> bool {
        matches!(
            self,
            AnnotationKind::Heading(_)
                | AnnotationKind::UnorderedList
                | AnnotationKind::OrderedList
                | AnnotationKind::ListItem
                | AnnotationKind::Quote
        )
    }

    /// Kinds backed by a single placeholder character.
    pub fn is_placeholder(&self) -> bool {
        matches!(
            self,
            AnnotationKind::Media | AnnotationKind::UnknownBlock { .. } | AnnotationKind::Comment(_)
        )
    }

    pub fn is_list(&self) -> bool {
        matches!(
            self,
            AnnotationKind::UnorderedList | AnnotationKind::OrderedList
        )
    }

    /// Inline kinds whose end follows text typed right after them.
    pub(crate) fn end_inclusive(&self) -> bool {
        matches!(
            self,
            AnnotationKind::Bold
                | AnnotationKind::Italic
                | AnnotationKind::Underline
                | AnnotationKind::Strikethrough
                | AnnotationKind::Code
        )
    }

    /// Position in the canonical inline nesting order, outermost first.
    pub(crate) fn inline_rank(&self) -> Option<usize> {
        match self {
            AnnotationKind::Link => Some(0),
            AnnotationKind::Bold => Some(1),
            AnnotationKind::Italic => Some(2),
            AnnotationKind::Underline => Some(3),
            AnnotationKind::Strikethrough => Some(4),
            AnnotationKind::Code => Some(5),
            _ => None,
        }
    }

    /// Order used when block annotations share the same range, outermost first.
    pub(crate) fn block_rank(&self) -> usize {
        match self {
            AnnotationKind::Quote => 0,
            AnnotationKind::UnorderedList | AnnotationKind::OrderedList => 1,
            AnnotationKind::ListItem => 2,
            AnnotationKind::Heading(_) => 3,
            _ => 4,
        }
    }
}

/// A styled or structural range over the buffer.
#[derive(Debug, Clone)]
pub struct Annotation {
    pub(crate) id: AnnotationId,
    pub(crate) kind: AnnotationKind,
    pub(crate) span: Span,
    pub(crate) attributes: Attributes,
    /// Depth among enclosing block annotations. `None` for inline kinds.
    pub(crate) nesting_level: Option<usize>,
    pub(crate) display: Option<MediaDisplay>,
}

impl Annotation {
    pub(crate) fn new(id: AnnotationId, kind: AnnotationKind, span: Span, attributes: Attributes) -> Self {
        let nesting_level = kind.is_block().then_some(0);
        let display = matches!(kind, AnnotationKind::Media).then_some(MediaDisplay::Pending);
        Self {
            id,
            kind,
            span,
            attributes,
            nesting_level,
            display,
        }
    }

    pub fn id(&self) -> AnnotationId {
        self.id
    }

    pub fn kind(&self) -> &AnnotationKind {
        &self.kind
    }

    pub fn span(&self) -> Span {
        self.span
    }

    pub fn start(&self) -> usize {
        self.span.start
    }

    pub fn end(&self) -> usize {
        self.span.end
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn nesting_level(&self) -> Option<usize> {
        self.nesting_level
    }

    /// Load state of a media placeholder.
    pub fn display(&self) -> Option<&MediaDisplay> {
        self.display.as_ref()
    }

    /// Identity-free view used for structural comparison.
    pub(crate) fn structural_key(&self) -> (Span, &AnnotationKind, &Attributes, Option<usize>) {
        (self.span, &self.kind, &self.attributes, self.nesting_level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_level_bounds() {
        assert!(HeadingLevel::new(0).is_none());
        assert!(HeadingLevel::new(7).is_none());
        assert_eq!(HeadingLevel::new(3).map(HeadingLevel::tag), Some("h3"));
    }

    #[test]
    fn kind_families_do_not_overlap() {
        let kinds = [
            AnnotationKind::Bold,
            AnnotationKind::Link,
            AnnotationKind::Heading(HeadingLevel::ALL[0]),
            AnnotationKind::ListItem,
            AnnotationKind::Media,
            AnnotationKind::UnknownBlock { raw: "<x>".into() },
            AnnotationKind::Comment(PageBreak::More),
        ];
        for kind in kinds {
            let families =
                [kind.is_inline(), kind.is_block(), kind.is_placeholder()].iter().filter(|f| **f).count();
            assert_eq!(families, 1, "{kind:?}");
        }
    }

    #[test]
    fn link_is_outermost_and_code_innermost() {
        assert_eq!(AnnotationKind::Link.inline_rank(), Some(0));
        assert_eq!(AnnotationKind::Code.inline_rank(), Some(5));
        assert!(!AnnotationKind::Link.end_inclusive());
        assert!(AnnotationKind::Bold.end_inclusive());
    }
}
