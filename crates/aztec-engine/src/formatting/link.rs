use crate::formatting::inline;
use crate::model::{AnnotationId, AnnotationKind, Attributes, Document, Span};

/// The link under the caret or selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedLink {
    pub id: AnnotationId,
    pub href: String,
    pub anchor: String,
    pub span: Span,
}

pub fn selected_link(doc: &Document, selection: Span) -> Option<SelectedLink> {
    let selection = doc.clamp_span(selection);
    let link = doc
        .query_spans_in_range(selection, Some(&AnnotationKind::Link))
        .into_iter()
        .next()?;
    Some(SelectedLink {
        id: link.id(),
        href: link.attribute("href").unwrap_or_default().to_string(),
        anchor: doc.slice(link.span()),
        span: link.span(),
    })
}

/// Links `anchor` to `url` and returns the range of the link.
///
/// - An empty `url` removes the selected link, if any.
/// - A selected link gets the new URL and anchor text.
/// - Otherwise the anchor replaces the selection; an empty anchor falls back
///   to the URL itself.
pub fn link(doc: &mut Document, url: &str, anchor: &str, selection: Span) -> Span {
    let selection = doc.clamp_span(selection);
    let existing = selected_link(doc, selection);
    let url = url.trim();
    if url.is_empty() {
        if let Some(existing) = existing {
            doc.remove_annotation(existing.id);
        }
        return selection;
    }

    let target = existing.map_or(selection, |l| l.span);
    let anchor = if anchor.is_empty() { url } else { anchor };
    let span = if doc.slice(target) == anchor {
        target
    } else {
        doc.replace(target, anchor);
        Span::new(target.start, target.start + anchor.len())
    };

    inline::remove(doc, &AnnotationKind::Link, span);
    let href = Attributes::from([("href".to_string(), url.to_string())]);
    inline::apply(doc, AnnotationKind::Link, span, href);
    span
}

/// Removes every link touched by the selection. Returns true if one was found.
pub fn remove_link(doc: &mut Document, selection: Span) -> bool {
    let selection = doc.clamp_span(selection);
    let ids: Vec<AnnotationId> = doc
        .query_spans_in_range(selection, Some(&AnnotationKind::Link))
        .into_iter()
        .map(|a| a.id())
        .collect();
    for id in &ids {
        doc.remove_annotation(*id);
    }
    !ids.is_empty()
}
