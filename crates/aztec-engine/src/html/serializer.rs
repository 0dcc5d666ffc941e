use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};

use html_escape::{encode_double_quoted_attribute, encode_text};

use super::CURSOR_TAG;
use crate::model::{Annotation, AnnotationKind, Attributes, Document};

/// How a piece of output sits in formatted HTML.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Layout {
    Text,
    Inline,
    /// Gets a line of its own.
    Block,
    /// Gets a line of its own.
    PageBreak,
    /// Preserved markup, never reflowed.
    Opaque,
    Marker,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Piece {
    pub markup: String,
    pub layout: Layout,
}

struct Writer<'a> {
    pieces: Vec<Piece>,
    text: String,
    inlines: Vec<&'a Annotation>,
    blocks: Vec<&'a Annotation>,
}

/// Renders `doc` as a flat list of markup pieces. `cursor`, if given, is
/// written as an empty `<aztec_cursor>` element at that offset.
pub(super) fn pieces(doc: &Document, cursor: Option<usize>) -> Vec<Piece> {
    let text = doc.text();
    let content_len = doc.content_len();
    let cursor = cursor.map(|c| doc.clamp_offset(c));

    let mut blocks: Vec<&Annotation> = doc.annotations().iter().filter(|a| a.kind().is_block()).collect();
    blocks.sort_by_key(|a| {
        (
            a.start(),
            Reverse(a.end()),
            a.nesting_level().unwrap_or(0),
            a.kind().block_rank(),
            a.id(),
        )
    });
    let inlines: Vec<&Annotation> = doc.annotations().iter().filter(|a| a.kind().is_inline()).collect();
    let boundaries: BTreeSet<usize> = inlines.iter().flat_map(|a| [a.start(), a.end()]).collect();
    let placeholders: HashMap<usize, &Annotation> = doc
        .annotations()
        .iter()
        .filter(|a| a.kind().is_placeholder())
        .map(|a| (a.start(), a))
        .collect();

    let mut out = Writer {
        pieces: Vec::new(),
        text: String::new(),
        inlines: Vec::new(),
        blocks: Vec::new(),
    };
    let mut next_block = 0;

    for (i, ch) in text.char_indices() {
        while out.blocks.last().is_some_and(|b| b.end() <= i) {
            out.close_block();
        }
        while let Some(&block) = blocks.get(next_block).filter(|b| b.start() <= i) {
            out.open_block(block);
            next_block += 1;
        }
        if cursor == Some(i) {
            out.marker();
        }
        if i >= content_len {
            continue;
        }

        if ch == '\n' {
            out.close_inlines();
            let implicit = out.blocks.iter().any(|b| b.end() == i + 1)
                || blocks.get(next_block).is_some_and(|b| b.start() == i + 1);
            if !implicit {
                out.tag("<br>".to_string(), Layout::Inline);
            }
            continue;
        }

        if boundaries.contains(&i) {
            let active = active_inlines(&inlines, i);
            out.sync_inlines(active);
        }
        match placeholders.get(&i) {
            Some(placeholder) => out.placeholder(placeholder),
            None => out.text.push(ch),
        }
    }

    // Blocks still open here end after a trailing separator, so the caret at
    // the very end sits outside them.
    while !out.blocks.is_empty() {
        out.close_block();
    }
    if cursor == Some(text.len()) {
        out.marker();
    }
    out.close_inlines();
    // An empty last line. The parser drops one trailing `<br>`, so a buffer
    // ending in a separator always ends in an extra one.
    if text.ends_with('\n') {
        out.tag("<br>".to_string(), Layout::Inline);
    }
    out.flush();
    out.pieces
}

/// Inline annotations covering the character at `i`, outermost first.
fn active_inlines<'a>(inlines: &[&'a Annotation], i: usize) -> Vec<&'a Annotation> {
    let mut active: Vec<&Annotation> = inlines
        .iter()
        .copied()
        .filter(|a| a.start() <= i && i < a.end())
        .collect();
    active.sort_by_key(|a| (a.kind().inline_rank(), a.start(), a.id()));
    active
}

impl<'a> Writer<'a> {
    fn flush(&mut self) {
        if self.text.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.text);
        self.pieces.push(Piece {
            markup: encode_text(&text).into_owned(),
            layout: Layout::Text,
        });
    }

    fn tag(&mut self, markup: String, layout: Layout) {
        self.flush();
        self.pieces.push(Piece { markup, layout });
    }

    fn marker(&mut self) {
        self.tag(format!("<{CURSOR_TAG}></{CURSOR_TAG}>"), Layout::Marker);
    }

    fn open_block(&mut self, block: &'a Annotation) {
        self.close_inlines();
        if let Some(name) = tag_name(block.kind()) {
            self.tag(open_tag(name, block.attributes()), Layout::Block);
        }
        self.blocks.push(block);
    }

    fn close_block(&mut self) {
        self.close_inlines();
        if let Some(block) = self.blocks.pop()
            && let Some(name) = tag_name(block.kind())
        {
            self.tag(format!("</{name}>"), Layout::Block);
        }
    }

    /// Keeps the shared prefix of open inline tags and reopens the rest.
    fn sync_inlines(&mut self, active: Vec<&'a Annotation>) {
        let shared = self
            .inlines
            .iter()
            .zip(&active)
            .take_while(|(open, want)| open.id() == want.id())
            .count();
        while self.inlines.len() > shared {
            self.close_inline();
        }
        for annotation in active.into_iter().skip(shared) {
            if let Some(name) = tag_name(annotation.kind()) {
                self.tag(open_tag(name, annotation.attributes()), Layout::Inline);
            }
            self.inlines.push(annotation);
        }
    }

    fn close_inline(&mut self) {
        if let Some(annotation) = self.inlines.pop()
            && let Some(name) = tag_name(annotation.kind())
        {
            self.tag(format!("</{name}>"), Layout::Inline);
        }
    }

    fn close_inlines(&mut self) {
        while !self.inlines.is_empty() {
            self.close_inline();
        }
    }

    fn placeholder(&mut self, placeholder: &Annotation) {
        match placeholder.kind() {
            AnnotationKind::Media => self.tag(open_tag("img", placeholder.attributes()), Layout::Inline),
            AnnotationKind::UnknownBlock { raw } => self.tag(raw.clone(), Layout::Opaque),
            AnnotationKind::Comment(page_break) => {
                self.tag(format!("<!--{}-->", page_break.comment_text()), Layout::PageBreak)
            }
            _ => {}
        }
    }
}

fn tag_name(kind: &AnnotationKind) -> Option<&'static str> {
    Some(match kind {
        AnnotationKind::Bold => "b",
        AnnotationKind::Italic => "i",
        AnnotationKind::Underline => "u",
        AnnotationKind::Strikethrough => "s",
        AnnotationKind::Code => "code",
        AnnotationKind::Link => "a",
        AnnotationKind::Heading(level) => level.tag(),
        AnnotationKind::UnorderedList => "ul",
        AnnotationKind::OrderedList => "ol",
        AnnotationKind::ListItem => "li",
        AnnotationKind::Quote => "blockquote",
        AnnotationKind::Media | AnnotationKind::UnknownBlock { .. } | AnnotationKind::Comment(_) => return None,
    })
}

fn open_tag(name: &str, attributes: &Attributes) -> String {
    let mut tag = format!("<{name}");
    for (key, value) in attributes {
        tag.push_str(&format!(" {key}=\"{}\"", encode_double_quoted_attribute(value)));
    }
    tag.push('>');
    tag
}

/// Concatenates pieces. Formatted output puts block tags and page breaks on
/// lines of their own.
pub(super) fn join(pieces: &[Piece], formatted: bool) -> String {
    let mut html = String::new();
    for (index, piece) in pieces.iter().enumerate() {
        let prev = index.checked_sub(1).map(|p| &pieces[p]);
        let next = pieces.get(index + 1);
        if formatted && prev.is_some_and(|p| breaks_line(p) || breaks_line(piece)) {
            html.push('\n');
        }
        let blank = piece.layout == Layout::Text && piece.markup.bytes().all(|b| b.is_ascii_whitespace());
        if blank && !between_inlines(prev, next) {
            html.push_str(&protect_whitespace(&piece.markup));
        } else {
            html.push_str(&piece.markup);
        }
    }
    html
}

fn breaks_line(piece: &Piece) -> bool {
    matches!(piece.layout, Layout::Block | Layout::PageBreak)
}

fn between_inlines(prev: Option<&Piece>, next: Option<&Piece>) -> bool {
    let inline = |p: Option<&Piece>| p.is_some_and(|p| matches!(p.layout, Layout::Inline | Layout::Opaque));
    inline(prev) && inline(next)
}

/// Whitespace-only text next to a block boundary reads as source layout when
/// parsed. Writing its first character as a reference keeps it content.
fn protect_whitespace(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => format!("&#{};{}", u32::from(first), chars.as_str()),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::parse;
    use crate::model::{Span, END_OF_BUFFER_MARKER};
    use pretty_assertions::assert_eq;

    fn render(doc: &Document) -> String {
        join(&pieces(doc, None), false)
    }

    #[test]
    fn overlapping_inlines_nest_canonically() {
        let mut doc = Document::from_text("abcd");
        doc.add_annotation(AnnotationKind::Italic, Span::new(0, 3), Attributes::new());
        doc.add_annotation(AnnotationKind::Bold, Span::new(1, 4), Attributes::new());
        assert_eq!(render(&doc), "<i>a</i><b><i>bc</i>d</b>");
    }

    #[test]
    fn separators_inside_blocks_are_implicit() {
        let doc = parse("<h1>Title</h1>body<br>more").document;
        assert_eq!(render(&doc), "<h1>Title</h1>body<br>more");
    }

    #[test]
    fn marker_is_not_written() {
        let doc = parse("<blockquote>q</blockquote>").document;
        assert!(doc.text().ends_with(END_OF_BUFFER_MARKER));
        assert_eq!(render(&doc), "<blockquote>q</blockquote>");
    }

    #[test]
    fn text_and_attributes_are_escaped() {
        let mut doc = Document::from_text("a<b & c");
        let href = Attributes::from([("href".to_string(), "x?a=1&b=\"2\"".to_string())]);
        doc.add_annotation(AnnotationKind::Link, Span::new(0, 1), href);
        assert_eq!(render(&doc), "<a href=\"x?a=1&amp;b=&quot;2&quot;\">a</a>&lt;b &amp; c");
    }

    #[test]
    fn cursor_is_written_where_asked() {
        let doc = parse("<b>abc</b>").document;
        assert_eq!(
            join(&pieces(&doc, Some(1)), false),
            "<b>a<aztec_cursor></aztec_cursor>bc</b>"
        );
        assert_eq!(
            join(&pieces(&doc, Some(3)), false),
            "<b>abc<aztec_cursor></aztec_cursor></b>"
        );
    }

    #[test]
    fn trailing_empty_line_gets_an_extra_break() {
        let mut doc = parse("<h1>Title</h1>").document;
        doc.insert(5, "\n");
        assert_eq!(doc.text(), "Title\n");
        assert_eq!(render(&doc), "<h1>Title</h1><br>");
        assert_eq!(
            join(&pieces(&doc, Some(6)), false),
            "<h1>Title</h1><aztec_cursor></aztec_cursor><br>"
        );
        assert_eq!(render(&Document::from_text("a\n")), "a<br><br>");
    }

    #[test]
    fn formatted_output_puts_blocks_on_lines() {
        let doc = parse("<ul><li>a</li><li>b</li></ul>c<!--more-->d").document;
        assert_eq!(
            join(&pieces(&doc, None), true),
            "<ul>\n<li>\na\n</li>\n<li>\nb\n</li>\n</ul>\nc\n<!--more-->\nd"
        );
    }

    #[test]
    fn blank_block_content_survives() {
        let doc = parse("<h2>&#32;</h2>").document;
        assert_eq!(doc.content(), " ");
        let html = render(&doc);
        assert_eq!(html, "<h2>&#32;</h2>");
        assert_eq!(parse(&html).document, doc);
        assert_eq!(parse(&join(&pieces(&doc, None), true)).document, doc);
    }
}
