use xi_rope::Rope;

use super::span::Span;

/// A reference to a single line in the rope with its byte span.
#[derive(Debug, Clone)]
pub struct LineRef {
    /// Byte span of this line in the rope (includes newline if present).
    pub span: Span,
    pub text: String,
}

impl LineRef {
    /// Line text without its trailing separator.
    pub fn content(&self) -> &str {
        self.text.strip_suffix('\n').unwrap_or(&self.text)
    }
}

/// Returns an iterator over lines with their byte spans.
///
/// Uses `lines_raw` to preserve newline characters so spans tile the buffer.
/// A buffer ending in `'\n'` has no trailing empty line here; see
/// [`line_spans_in`] for the addressable view.
pub fn lines_with_spans(rope: &Rope) -> impl Iterator<Item = LineRef> + '_ {
    let mut offset = 0usize;
    rope.lines_raw(..).map(move |line| {
        let start = offset;
        let len = line.len();
        offset += len;
        LineRef {
            span: Span { start, end: offset },
            text: line.into_owned(),
        }
    })
}

/// Start offset of the line containing `pos`.
pub fn line_start(text: &str, pos: usize) -> usize {
    let pos = pos.min(text.len());
    text.as_bytes()[..pos]
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |i| i + 1)
}

/// End offset (past the separator) of the line containing `pos`.
pub fn line_end(text: &str, pos: usize) -> usize {
    let pos = pos.min(text.len());
    text.as_bytes()[pos..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(text.len(), |i| pos + i + 1)
}

/// True if `pos` is the first offset of a line.
pub fn is_line_start(text: &str, pos: usize) -> bool {
    pos == 0 || text.as_bytes().get(pos - 1) == Some(&b'\n')
}

/// Expands `range` to the whole lines it touches.
///
/// A non-empty range ending right after a separator does not pull in the next
/// line.
pub fn expand_to_lines(text: &str, range: Span) -> Span {
    let start = line_start(text, range.start);
    let end = if range.end > range.start && is_line_start(text, range.end) {
        range.end
    } else {
        line_end(text, range.end)
    };
    Span { start, end }
}

/// Spans of every line inside `range` (which should already be line-aligned).
///
/// An empty range at the buffer end yields the empty last line.
pub fn line_spans_in(text: &str, range: Span) -> Vec<Span> {
    let mut lines = Vec::new();
    let mut pos = range.start;
    if range.is_empty() {
        lines.push(Span::new(pos, pos));
        return lines;
    }
    while pos < range.end {
        let end = line_end(text, pos).min(range.end);
        lines.push(Span::new(pos, end));
        pos = end;
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn lines_keep_separators() {
        let rope = Rope::from("a\nbc\n");
        let lines: Vec<_> = lines_with_spans(&rope).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].span, Span::new(0, 2));
        assert_eq!(lines[1].span, Span::new(2, 5));
        assert_eq!(lines[1].content(), "bc");
    }

    #[test]
    fn start_and_end_of_line() {
        let text = "one\ntwo\nthree";
        assert_eq!(line_start(text, 5), 4);
        assert_eq!(line_end(text, 5), 8);
        assert_eq!(line_end(text, 9), text.len());
        assert_eq!(line_start(text, 4), 4);
    }

    #[test]
    fn expand_caret_to_line() {
        let text = "one\ntwo\nthree";
        assert_eq!(expand_to_lines(text, Span::new(5, 5)), Span::new(4, 8));
    }

    #[test]
    fn expand_selection_ending_at_line_start() {
        let text = "one\ntwo\nthree";
        assert_eq!(expand_to_lines(text, Span::new(1, 4)), Span::new(0, 4));
        assert_eq!(expand_to_lines(text, Span::new(1, 5)), Span::new(0, 8));
    }

    #[test]
    fn line_spans_cover_range() {
        let text = "a\nb\nc";
        assert_eq!(
            line_spans_in(text, Span::new(0, 5)),
            vec![Span::new(0, 2), Span::new(2, 4), Span::new(4, 5)]
        );
        assert_eq!(line_spans_in(text, Span::new(5, 5)), vec![Span::new(5, 5)]);
    }
}
