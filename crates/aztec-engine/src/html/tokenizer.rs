use std::sync::OnceLock;

use html_escape::decode_html_entities;
use regex::Regex;

use super::cursor::Cursor;
use crate::model::Span;

/// A lexical unit of HTML source. Every token records the source span it was
/// read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Text(Span),
    Open {
        /// Lowercased tag name.
        name: String,
        /// Attributes in source order, values entity-decoded.
        attributes: Vec<(String, String)>,
        self_closing: bool,
        span: Span,
    },
    Close {
        name: String,
        span: Span,
    },
    /// `<!-- ... -->`; `body` excludes the delimiters.
    Comment {
        body: Span,
        span: Span,
    },
    /// `<!DOCTYPE ...>`, `<?xml ...?>` and other bang or question-mark markup.
    Declaration(Span),
}

/// Elements whose content is not markup.
const RAW_TEXT: [&str; 4] = ["script", "style", "textarea", "title"];

/// Splits `source` into tokens. Never fails: anything that does not look like
/// markup is text.
pub fn tokenize(source: &str) -> Vec<Token> {
    let mut cur = Cursor::new(source);
    let mut tokens = Vec::new();
    let mut text_start = 0;

    while !cur.eof() {
        if cur.peek() != Some(b'<') {
            cur.bump();
            continue;
        }
        let start = cur.pos();
        let Some(token) = try_markup(&mut cur) else {
            cur.bump();
            continue;
        };
        flush_text(&mut tokens, text_start, start);

        let raw_text = match &token {
            Token::Open {
                name,
                self_closing: false,
                ..
            } if RAW_TEXT.contains(&name.as_str()) => Some(format!("</{name}")),
            _ => None,
        };
        tokens.push(token);

        if let Some(close) = raw_text {
            let body_start = cur.pos();
            while !cur.eof() && !cur.starts_with_ignore_case(close.as_bytes()) {
                cur.bump();
            }
            flush_text(&mut tokens, body_start, cur.pos());
        }
        text_start = cur.pos();
    }
    flush_text(&mut tokens, text_start, cur.pos());
    tokens
}

fn flush_text(tokens: &mut Vec<Token>, start: usize, end: usize) {
    if end > start {
        tokens.push(Token::Text(Span { start, end }));
    }
}

/// Attempts to read markup at a `<`. On failure the cursor is restored.
fn try_markup(cur: &mut Cursor<'_>) -> Option<Token> {
    let saved = cur.clone();
    let start = cur.pos();

    if cur.starts_with(b"<!--") {
        cur.bump_n(4);
        let body_start = cur.pos();
        let body_end = cur.skip_past(b"-->").unwrap_or(cur.pos());
        return Some(Token::Comment {
            body: Span::new(body_start, body_end),
            span: Span::new(start, cur.pos()),
        });
    }

    match cur.peek_at(1) {
        Some(b'/') if cur.peek_at(2).is_some_and(|b| b.is_ascii_alphabetic()) => {
            cur.bump_n(2);
            let name = read_name(cur);
            cur.skip_past(b">");
            Some(Token::Close {
                name,
                span: Span::new(start, cur.pos()),
            })
        }
        Some(b'!') | Some(b'?') => {
            cur.skip_past(b">");
            Some(Token::Declaration(Span::new(start, cur.pos())))
        }
        Some(b) if b.is_ascii_alphabetic() => {
            cur.bump();
            let name = read_name(cur);
            let inner_start = cur.pos();
            let inner_end = skip_tag_body(cur);
            let inner = &cur.s[inner_start..inner_end];
            Some(Token::Open {
                name,
                attributes: parse_attributes(inner),
                self_closing: inner.trim_end().ends_with('/'),
                span: Span::new(start, cur.pos()),
            })
        }
        _ => {
            *cur = saved;
            None
        }
    }
}

fn read_name(cur: &mut Cursor<'_>) -> String {
    let start = cur.pos();
    cur.bump_while(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b':'));
    cur.s[start..cur.pos()].to_ascii_lowercase()
}

/// Skips to just past the closing `>` of a start tag, ignoring `>` inside
/// quoted values. Returns the offset where the attribute text ends.
fn skip_tag_body(cur: &mut Cursor<'_>) -> usize {
    let mut quote = None;
    while let Some(b) = cur.peek() {
        match (quote, b) {
            (None, b'>') => {
                let end = cur.pos();
                cur.bump();
                return end;
            }
            (None, b'"' | b'\'') => quote = Some(b),
            (Some(q), _) if q == b => quote = None,
            _ => {}
        }
        cur.bump();
    }
    cur.pos()
}

fn attribute_regex() -> &'static Regex {
    static ATTRIBUTE: OnceLock<Regex> = OnceLock::new();
    ATTRIBUTE.get_or_init(|| {
        Regex::new(r#"([^\s"'>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
            .expect("Invalid attribute regex")
    })
}

/// Parses the attribute text of a start tag. Names are lowercased; a name
/// without a value gets an empty one.
pub fn parse_attributes(inner: &str) -> Vec<(String, String)> {
    attribute_regex()
        .captures_iter(inner)
        .map(|caps| {
            let name = caps[1].to_ascii_lowercase();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| decode_html_entities(m.as_str()).into_owned())
                .unwrap_or_default();
            (name, value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn slices<'a>(source: &'a str, tokens: &[Token]) -> Vec<&'a str> {
        tokens
            .iter()
            .map(|t| {
                let span = match t {
                    Token::Text(span) | Token::Declaration(span) => *span,
                    Token::Open { span, .. } | Token::Close { span, .. } | Token::Comment { span, .. } => *span,
                };
                &source[span.as_range()]
            })
            .collect()
    }

    #[test]
    fn tokens_tile_the_source() {
        let source = "<!DOCTYPE html>a <b class=x>b</b><!-- c --><br/>";
        let tokens = tokenize(source);
        assert_eq!(
            slices(source, &tokens),
            vec!["<!DOCTYPE html>", "a ", "<b class=x>", "b", "</b>", "<!-- c -->", "<br/>"]
        );
    }

    #[test]
    fn attributes_are_decoded_and_lowercased() {
        let attrs = parse_attributes(r#" HREF="a?b=1&amp;c=2" data-x='y' hidden"#);
        assert_eq!(
            attrs,
            vec![
                ("href".to_string(), "a?b=1&c=2".to_string()),
                ("data-x".to_string(), "y".to_string()),
                ("hidden".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn quoted_gt_does_not_end_the_tag() {
        let tokens = tokenize(r#"<img alt="a > b" src=x>"#);
        assert_eq!(tokens.len(), 1);
        let Token::Open { attributes, self_closing, .. } = &tokens[0] else {
            panic!("expected a start tag");
        };
        assert!(!self_closing);
        assert_eq!(attributes[0], ("alt".to_string(), "a > b".to_string()));
    }

    #[test]
    fn stray_angle_bracket_is_text() {
        let source = "1 < 2 <3";
        assert_eq!(tokenize(source), vec![Token::Text(Span::new(0, source.len()))]);
    }

    #[test]
    fn script_content_is_not_markup() {
        let source = "<script>if (a<b) { x = '</b>'; }</script>";
        let tokens = tokenize(source);
        assert_eq!(
            slices(source, &tokens),
            vec!["<script>", "if (a<b) { x = '</b>'; }", "</script>"]
        );
    }

    #[test]
    fn unterminated_comment_runs_to_the_end() {
        let source = "a<!-- open";
        let tokens = tokenize(source);
        assert_eq!(
            tokens[1],
            Token::Comment {
                body: Span::new(5, source.len()),
                span: Span::new(1, source.len()),
            }
        );
    }
}
