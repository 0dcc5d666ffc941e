//! Forgiving tree construction.
//!
//! - A closing tag with no open element of that name is ignored.
//! - A closing tag matching an outer element closes everything inside it.
//! - Elements still open at the end of input are closed there.
//!
//! Element spans always cover the source they were built from, so an
//! element's markup can be sliced back out byte for byte.

use super::tokenizer::{Token, tokenize};
use crate::model::Span;

const VOID: [&str; 14] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source", "track", "wbr",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(Span),
    Comment { body: Span, span: Span },
    Declaration(Span),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
    /// From the start tag to the end of the closing tag, or to the end of the
    /// last child when the element was closed implicitly.
    pub span: Span,
}

impl Node {
    pub fn span(&self) -> Span {
        match self {
            Node::Element(element) => element.span,
            Node::Text(span) | Node::Declaration(span) => *span,
            Node::Comment { span, .. } => *span,
        }
    }
}

pub fn build(source: &str) -> Vec<Node> {
    let mut root = Vec::new();
    let mut stack: Vec<Element> = Vec::new();

    for token in tokenize(source) {
        match token {
            Token::Text(span) => attach(&mut stack, &mut root, Node::Text(span)),
            Token::Comment { body, span } => attach(&mut stack, &mut root, Node::Comment { body, span }),
            Token::Declaration(span) => attach(&mut stack, &mut root, Node::Declaration(span)),
            Token::Open {
                name,
                attributes,
                self_closing,
                span,
            } => {
                let void = self_closing || VOID.contains(&name.as_str());
                let element = Element {
                    name,
                    attributes,
                    children: Vec::new(),
                    span,
                };
                if void {
                    attach(&mut stack, &mut root, Node::Element(element));
                } else {
                    stack.push(element);
                }
            }
            Token::Close { name, span } => {
                let Some(index) = stack.iter().rposition(|e| e.name == name) else {
                    log::debug!("ignoring unmatched </{name}> at {}", span.start);
                    continue;
                };
                while stack.len() > index + 1 {
                    if let Some(inner) = stack.pop() {
                        log::debug!("closing <{}> implicitly at </{name}>", inner.name);
                        close_implicitly(&mut stack, &mut root, inner);
                    }
                }
                if let Some(mut element) = stack.pop() {
                    element.span.end = span.end;
                    attach(&mut stack, &mut root, Node::Element(element));
                }
            }
        }
    }

    while let Some(element) = stack.pop() {
        log::debug!("closing <{}> at end of input", element.name);
        close_implicitly(&mut stack, &mut root, element);
    }
    root
}

fn close_implicitly(stack: &mut Vec<Element>, root: &mut Vec<Node>, mut element: Element) {
    if let Some(last) = element.children.last() {
        element.span.end = last.span().end;
    }
    attach(stack, root, Node::Element(element));
}

fn attach(stack: &mut [Element], root: &mut Vec<Node>, node: Node) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => root.push(node),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn element(node: &Node) -> &Element {
        match node {
            Node::Element(element) => element,
            other => panic!("expected element, got {other:?}"),
        }
    }

    #[test]
    fn nested_elements() {
        let source = "<ul><li>a</li><li>b</li></ul>";
        let nodes = build(source);
        assert_eq!(nodes.len(), 1);
        let ul = element(&nodes[0]);
        assert_eq!(ul.span, Span::new(0, source.len()));
        assert_eq!(ul.children.len(), 2);
        assert_eq!(&source[ul.children[1].span().as_range()], "<li>b</li>");
    }

    #[test]
    fn unmatched_close_is_ignored() {
        let source = "a</b>c";
        let nodes = build(source);
        assert_eq!(nodes, vec![Node::Text(Span::new(0, 1)), Node::Text(Span::new(5, 6))]);
    }

    #[test]
    fn outer_close_closes_inner() {
        let source = "<i><b>x</i>y";
        let nodes = build(source);
        let i = element(&nodes[0]);
        assert_eq!(i.span, Span::new(0, 11));
        let b = element(&i.children[0]);
        assert_eq!(b.span, Span::new(3, 7));
        assert_eq!(nodes[1], Node::Text(Span::new(11, 12)));
    }

    #[test]
    fn open_elements_close_at_end() {
        let source = "<blockquote><b>x";
        let nodes = build(source);
        let quote = element(&nodes[0]);
        assert_eq!(quote.span, Span::new(0, source.len()));
        assert_eq!(element(&quote.children[0]).span, Span::new(12, source.len()));
    }

    #[test]
    fn void_elements_have_no_children() {
        let nodes = build("<img src=a>text<br>");
        assert_eq!(nodes.len(), 3);
        assert!(element(&nodes[0]).children.is_empty());
    }
}
