use std::sync::OnceLock;

use html_escape::decode_html_entities;
use regex::Regex;

use super::tree::{Element, Node, build};
use super::{CURSOR_TAG, ParsedHtml};
use crate::model::{
    AnnotationKind, Attributes, Document, END_OF_BUFFER_MARKER, HeadingLevel, OBJECT_REPLACEMENT, PageBreak, Span,
};

/// How the parser treats an element.
enum Role {
    Inline(AnnotationKind),
    Block(AnnotationKind),
    LineBreak,
    Media,
    Cursor,
    Unknown,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Parent {
    Root,
    Inline,
    Block { list: bool },
}

struct Pending {
    kind: AnnotationKind,
    span: Span,
    attributes: Attributes,
    level: Option<usize>,
}

struct Builder<'a> {
    source: &'a str,
    text: String,
    pending: Vec<Pending>,
    /// The buffer ends with a separator added for a block boundary rather
    /// than a `<br>`.
    synthetic_end: bool,
    block_depth: usize,
    cursor: Option<usize>,
}

pub(super) fn parse(source: &str) -> ParsedHtml {
    let nodes = build(source);
    let mut builder = Builder {
        source,
        text: String::new(),
        pending: Vec::new(),
        synthetic_end: false,
        block_depth: 0,
        cursor: None,
    };
    builder.children(&nodes, Parent::Root);
    builder.finish()
}

impl Builder<'_> {
    fn children(&mut self, nodes: &[Node], parent: Parent) {
        let mut i = 0;
        while i < nodes.len() {
            if self.is_whitespace(&nodes[i]) && self.drops_whitespace(nodes, i, parent) {
                i += 1;
                continue;
            }
            if let Some(end) = self.unknown_run(nodes, i, parent) {
                let raw = &self.source[nodes[i].span().start..nodes[end].span().end];
                self.placeholder(AnnotationKind::UnknownBlock { raw: raw.to_string() }, Attributes::new());
                i = end + 1;
                continue;
            }
            match &nodes[i] {
                Node::Text(span) => self.text_node(nodes, i, *span, parent),
                Node::Comment { body, .. } => {
                    if let Some(page_break) = page_break(&self.source[body.as_range()]) {
                        self.placeholder(AnnotationKind::Comment(page_break), Attributes::new());
                    }
                }
                Node::Element(element) => self.element(element),
                Node::Declaration(_) => {}
            }
            i += 1;
        }
    }

    fn element(&mut self, element: &Element) {
        let attributes: Attributes = element.attributes.iter().cloned().collect();
        match role(element) {
            Role::Inline(kind) => {
                let index = self.open(kind, attributes, None);
                self.children(&element.children, Parent::Inline);
                self.close(index);
            }
            Role::Block(kind) => {
                self.open_block();
                let start = self.text.len();
                let list = kind.is_list();
                let index = self.open(kind, attributes, Some(self.block_depth));
                self.block_depth += 1;
                self.children(&element.children, Parent::Block { list });
                self.block_depth -= 1;
                self.close_block(start);
                self.close(index);
            }
            Role::LineBreak => {
                self.text.push('\n');
                self.synthetic_end = false;
            }
            Role::Media => self.placeholder(AnnotationKind::Media, attributes),
            Role::Cursor => self.cursor = Some(self.text.len()),
            Role::Unknown => {
                let raw = &self.source[element.span.as_range()];
                self.placeholder(AnnotationKind::UnknownBlock { raw: raw.to_string() }, Attributes::new());
            }
        }
    }

    fn text_node(&mut self, nodes: &[Node], i: usize, span: Span, parent: Parent) {
        let mut text = &self.source[span.as_range()];
        if self.boundary_before(nodes, i, parent) {
            text = strip_leading_newline(text);
        }
        if self.boundary_after(nodes, i, parent) {
            text = strip_trailing_newline(text);
        }
        if text.is_empty() {
            return;
        }
        let decoded = decode_html_entities(text);
        let cleaned: String = decoded
            .replace("\r\n", "\n")
            .chars()
            .filter(|c| *c != END_OF_BUFFER_MARKER && *c != OBJECT_REPLACEMENT)
            .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
            .collect();
        if cleaned.is_empty() {
            return;
        }
        self.text.push_str(&cleaned);
        self.synthetic_end = false;
    }

    /// Ends the current line before a block starts.
    fn open_block(&mut self) {
        if !self.text.is_empty() && !self.synthetic_end {
            self.text.push('\n');
            self.synthetic_end = true;
        }
    }

    /// Ends the block's last line, unless a nested block already did.
    fn close_block(&mut self, start: usize) {
        if !(self.synthetic_end && self.text.len() > start) {
            self.text.push('\n');
            self.synthetic_end = true;
        }
    }

    fn placeholder(&mut self, kind: AnnotationKind, attributes: Attributes) {
        let index = self.open(kind, attributes, None);
        self.text.push(OBJECT_REPLACEMENT);
        self.synthetic_end = false;
        self.close(index);
    }

    /// Starts an annotation at the current offset. Annotations are recorded
    /// in document order of their start tags.
    fn open(&mut self, kind: AnnotationKind, attributes: Attributes, level: Option<usize>) -> usize {
        let at = self.text.len();
        self.pending.push(Pending {
            kind,
            span: Span::new(at, at),
            attributes,
            level,
        });
        self.pending.len() - 1
    }

    fn close(&mut self, index: usize) {
        self.pending[index].span.end = self.text.len();
    }

    /// Index of the last node of a run of unknown markup starting at `i`.
    ///
    /// Unknown siblings separated only by whitespace form one run, and
    /// whitespace directly around the run joins it.
    fn unknown_run(&self, nodes: &[Node], i: usize, parent: Parent) -> Option<usize> {
        let first = if self.is_whitespace(&nodes[i]) {
            let next = i + 1;
            if !nodes.get(next).is_some_and(|n| self.is_unknown(n)) {
                return None;
            }
            next
        } else if self.is_unknown(&nodes[i]) {
            i
        } else {
            return None;
        };

        let mut last = first;
        loop {
            let mut k = last + 1;
            while k < nodes.len() && self.is_whitespace(&nodes[k]) {
                k += 1;
            }
            if k < nodes.len() && self.is_unknown(&nodes[k]) {
                last = k;
            } else {
                break;
            }
        }
        let trailing = last + 1;
        if nodes.get(trailing).is_some_and(|n| self.is_whitespace(n)) && !self.drops_whitespace(nodes, trailing, parent)
        {
            return Some(trailing);
        }
        Some(last)
    }

    fn is_unknown(&self, node: &Node) -> bool {
        match node {
            Node::Element(element) => matches!(role(element), Role::Unknown),
            Node::Comment { body, .. } => page_break(&self.source[body.as_range()]).is_none(),
            Node::Declaration(_) => true,
            Node::Text(_) => false,
        }
    }

    fn is_whitespace(&self, node: &Node) -> bool {
        match node {
            Node::Text(span) => self.source[span.as_range()]
                .bytes()
                .all(|b| b.is_ascii_whitespace()),
            _ => false,
        }
    }

    /// Whitespace-only text that is source layout rather than content.
    fn drops_whitespace(&self, nodes: &[Node], i: usize, parent: Parent) -> bool {
        parent == Parent::Block { list: true }
            || self.boundary_before(nodes, i, parent)
            || self.boundary_after(nodes, i, parent)
    }

    fn boundary_before(&self, nodes: &[Node], i: usize, parent: Parent) -> bool {
        match i.checked_sub(1).map(|p| &nodes[p]) {
            Some(prev) => self.is_line_boundary(prev),
            None => matches!(parent, Parent::Block { .. }),
        }
    }

    fn boundary_after(&self, nodes: &[Node], i: usize, parent: Parent) -> bool {
        match nodes.get(i + 1) {
            Some(next) => self.is_line_boundary(next),
            None => matches!(parent, Parent::Block { .. }),
        }
    }

    /// Block elements and page breaks start and end lines of their own in
    /// formatted source.
    fn is_line_boundary(&self, node: &Node) -> bool {
        match node {
            Node::Element(element) => matches!(role(element), Role::Block(_)),
            Node::Comment { body, .. } => page_break(&self.source[body.as_range()]).is_some(),
            _ => false,
        }
    }

    fn finish(mut self) -> ParsedHtml {
        // A trailing `<br>` ends the last line without starting another.
        if !self.synthetic_end && self.text.ends_with('\n') {
            self.text.pop();
            let len = self.text.len();
            for pending in &mut self.pending {
                pending.span.start = pending.span.start.min(len);
                pending.span.end = pending.span.end.min(len);
            }
        } else if self.synthetic_end && self.text.ends_with('\n') {
            // A trailing block boundary becomes the end marker so the last
            // block keeps its own line.
            let old_len = self.text.len();
            self.text.pop();
            self.text.push(END_OF_BUFFER_MARKER);
            let new_len = self.text.len();
            for pending in &mut self.pending {
                if pending.span.end == old_len && !pending.span.is_empty() {
                    pending.span.end = if pending.kind.is_block() { new_len } else { old_len - 1 };
                }
            }
        }

        let mut document = Document::from_text(&self.text);
        for pending in self.pending.into_iter().filter(|p| !p.span.is_empty()) {
            let id = document.push_annotation(pending.kind, pending.span, pending.attributes);
            if let (Some(level), Some(annotation)) = (pending.level, document.annotation_mut(id)) {
                annotation.nesting_level = Some(level);
            }
        }
        document.normalize();

        let cursor = self.cursor.map(|c| document.clamp_offset(c));
        ParsedHtml { document, cursor }
    }
}

fn role(element: &Element) -> Role {
    match element.name.as_str() {
        "b" | "strong" => Role::Inline(AnnotationKind::Bold),
        "i" | "em" => Role::Inline(AnnotationKind::Italic),
        "u" => Role::Inline(AnnotationKind::Underline),
        "s" | "strike" | "del" => Role::Inline(AnnotationKind::Strikethrough),
        "code" => Role::Inline(AnnotationKind::Code),
        "a" if element.attributes.iter().any(|(name, _)| name == "href") => Role::Inline(AnnotationKind::Link),
        "ul" => Role::Block(AnnotationKind::UnorderedList),
        "ol" => Role::Block(AnnotationKind::OrderedList),
        "li" => Role::Block(AnnotationKind::ListItem),
        "blockquote" => Role::Block(AnnotationKind::Quote),
        "br" => Role::LineBreak,
        "img" => Role::Media,
        CURSOR_TAG => Role::Cursor,
        name => match heading_level(name) {
            Some(level) => Role::Block(AnnotationKind::Heading(level)),
            None => Role::Unknown,
        },
    }
}

fn heading_level(name: &str) -> Option<HeadingLevel> {
    static HEADING: OnceLock<Regex> = OnceLock::new();
    let heading = HEADING.get_or_init(|| Regex::new(r"^h([1-6])$").expect("Invalid heading regex"));
    let level = heading.captures(name)?[1].parse().ok()?;
    HeadingLevel::new(level)
}

/// Recognizes `<!--more-->` and `<!--nextpage-->`, optionally with extra text
/// after the keyword as WordPress allows for `more`.
fn page_break(body: &str) -> Option<PageBreak> {
    static SENTINEL: OnceLock<Regex> = OnceLock::new();
    let sentinel = SENTINEL.get_or_init(|| Regex::new(r"^(more|nextpage)$").expect("Invalid sentinel regex"));
    let caps = sentinel.captures(body.trim())?;
    match &caps[1] {
        "more" => Some(PageBreak::More),
        _ => Some(PageBreak::NextPage),
    }
}

fn strip_leading_newline(text: &str) -> &str {
    text.strip_prefix("\r\n")
        .or_else(|| text.strip_prefix('\n'))
        .unwrap_or(text)
}

fn strip_trailing_newline(text: &str) -> &str {
    text.strip_suffix("\r\n")
        .or_else(|| text.strip_suffix('\n'))
        .unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::invariants;
    use pretty_assertions::assert_eq;

    fn summary(html: &str) -> (String, Vec<(AnnotationKind, Span, Option<usize>)>) {
        let doc = parse(html).document;
        invariants::check(&doc);
        let annotations = doc
            .annotations_sorted()
            .into_iter()
            .map(|a| (a.kind().clone(), a.span(), a.nesting_level()))
            .collect();
        (doc.text(), annotations)
    }

    #[test]
    fn inline_tags_become_annotations() {
        let (text, annotations) = summary("<b>Hello</b> <em>World</em>");
        assert_eq!(text, "Hello World");
        assert_eq!(
            annotations,
            vec![
                (AnnotationKind::Bold, Span::new(0, 5), None),
                (AnnotationKind::Italic, Span::new(6, 11), None),
            ]
        );
    }

    #[test]
    fn blocks_end_their_lines() {
        let (text, annotations) = summary("intro<h2>Title</h2>after");
        assert_eq!(text, "intro\nTitle\nafter");
        assert_eq!(
            annotations,
            vec![(AnnotationKind::Heading(HeadingLevel::new(2).unwrap()), Span::new(6, 12), Some(0))]
        );
    }

    #[test]
    fn trailing_block_gets_the_end_marker() {
        let (text, annotations) = summary("<ul><li>a</li><li>b</li></ul>");
        assert_eq!(text, format!("a\nb{END_OF_BUFFER_MARKER}"));
        let end = text.len();
        assert_eq!(
            annotations,
            vec![
                (AnnotationKind::UnorderedList, Span::new(0, end), Some(0)),
                (AnnotationKind::ListItem, Span::new(0, 2), Some(1)),
                (AnnotationKind::ListItem, Span::new(2, end), Some(1)),
            ]
        );
    }

    #[test]
    fn layout_whitespace_is_dropped() {
        let formatted = parse("<ul>\n<li>a</li>\n<li>b</li>\n</ul>\n<blockquote>\nq\n</blockquote>").document;
        let compact = parse("<ul><li>a</li><li>b</li></ul><blockquote>q</blockquote>").document;
        assert_eq!(formatted, compact);
    }

    #[test]
    fn entities_are_decoded_and_newlines_are_spaces() {
        let (text, _) = summary("a &amp; b\nc&lt;d&nbsp;");
        assert_eq!(text, "a & b c<d\u{a0}");
    }

    #[test]
    fn unknown_markup_is_one_placeholder() {
        let html = "<div class=\"x\">a <b>b</b></div>\n<p>c</p>";
        let doc = parse(html).document;
        assert_eq!(doc.text(), OBJECT_REPLACEMENT.to_string());
        assert_eq!(
            doc.annotations()[0].kind(),
            &AnnotationKind::UnknownBlock { raw: html.to_string() }
        );
    }

    #[test]
    fn page_break_comments_are_recognized() {
        let doc = parse("a<!--more-->b<!-- note -->").document;
        let kinds: Vec<_> = doc.annotations_sorted().into_iter().map(|a| a.kind().clone()).collect();
        assert_eq!(
            kinds,
            vec![
                AnnotationKind::Comment(PageBreak::More),
                AnnotationKind::UnknownBlock { raw: "<!-- note -->".to_string() },
            ]
        );
    }

    #[test]
    fn cursor_marker_is_consumed() {
        let parsed = parse("<b>ab<aztec_cursor></aztec_cursor>c</b>");
        assert_eq!(parsed.document.text(), "abc");
        assert_eq!(parsed.cursor, Some(2));
    }

    #[test]
    fn malformed_markup_degrades() {
        let (text, annotations) = summary("</i><b>bold <i>both</b> plain");
        assert_eq!(text, "bold both plain");
        assert_eq!(
            annotations,
            vec![
                (AnnotationKind::Bold, Span::new(0, 9), None),
                (AnnotationKind::Italic, Span::new(5, 9), None),
            ]
        );
    }

    #[test]
    fn line_breaks_and_media() {
        let (text, annotations) = summary(r#"a<br><img src="x.png">"#);
        assert_eq!(text, format!("a\n{OBJECT_REPLACEMENT}"));
        assert_eq!(annotations, vec![(AnnotationKind::Media, Span::new(2, 5), None)]);
    }

    #[test]
    fn anchors_without_href_are_unknown() {
        let doc = parse(r#"<a name="top"></a>x"#).document;
        assert_eq!(
            doc.annotations()[0].kind(),
            &AnnotationKind::UnknownBlock { raw: r#"<a name="top"></a>"#.to_string() }
        );
    }
}
