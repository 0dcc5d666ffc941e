//! Deferred media loading.
//!
//! ## Architecture
//!
//! Loading an image is the embedder's job and may finish long after the
//! document has been edited again. The engine hands out a [`MediaCompletion`]
//! per placeholder, keyed by [`AnnotationId`] rather than by offset, so a late
//! callback lands on the right placeholder however far it moved, and silently
//! does nothing if the placeholder was deleted in the meantime.

use super::annotation::{AnnotationId, AnnotationKind, Attributes};
use super::document::Document;

/// Load state of a media placeholder. Not part of the HTML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaDisplay {
    /// No callback has fired yet.
    Pending,
    Loading,
    Loaded { width: u32, height: u32 },
    Failed,
    /// The resolver asked for the default placeholder image.
    Default,
}

/// What the resolver is asked to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRequest {
    pub src: String,
    /// Largest width the embedder can display.
    pub max_width: u32,
}

/// Fetches media for placeholders. Must not block.
pub trait MediaResolver {
    fn resolve(&self, request: MediaRequest, completion: MediaCompletion);
}

/// Resolver that never loads anything; placeholders stay pending.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopResolver;

impl MediaResolver for NoopResolver {
    fn resolve(&self, request: MediaRequest, _completion: MediaCompletion) {
        log::trace!("ignoring media request for {}", request.src);
    }
}

/// One-shot completion token for a single media placeholder.
///
/// `loading` may be reported any number of times; the terminal outcomes
/// consume the token. Every method returns whether the placeholder still
/// existed.
#[derive(Debug)]
pub struct MediaCompletion {
    id: AnnotationId,
}

impl MediaCompletion {
    pub(crate) fn new(id: AnnotationId) -> Self {
        Self { id }
    }

    pub fn annotation_id(&self) -> AnnotationId {
        self.id
    }

    pub fn loading(&self, doc: &mut Document) -> bool {
        update_display(doc, self.id, MediaDisplay::Loading)
    }

    pub fn loaded(self, doc: &mut Document, width: u32, height: u32) -> bool {
        update_display(doc, self.id, MediaDisplay::Loaded { width, height })
    }

    pub fn failed(self, doc: &mut Document) -> bool {
        update_display(doc, self.id, MediaDisplay::Failed)
    }

    pub fn use_default(self, doc: &mut Document) -> bool {
        update_display(doc, self.id, MediaDisplay::Default)
    }
}

fn update_display(doc: &mut Document, id: AnnotationId, display: MediaDisplay) -> bool {
    match doc.annotation_mut(id) {
        Some(annotation) if annotation.kind == AnnotationKind::Media => {
            annotation.display = Some(display);
            true
        }
        _ => {
            log::debug!("media completion for {id:?} arrived after the placeholder was removed");
            false
        }
    }
}

/// Issues a completion token for every media placeholder in `doc`.
pub(crate) fn request_all(doc: &Document, resolver: &dyn MediaResolver, max_width: u32) {
    for annotation in doc.annotations() {
        if annotation.kind != AnnotationKind::Media {
            continue;
        }
        let src = annotation.attribute("src").unwrap_or_default().to_string();
        resolver.resolve(
            MediaRequest { src, max_width },
            MediaCompletion::new(annotation.id),
        );
    }
}

/// Attributes of every media placeholder matching `predicate`, in buffer order.
pub(crate) fn find(doc: &Document, predicate: impl Fn(&Attributes) -> bool) -> Vec<Attributes> {
    doc.annotations_sorted()
        .into_iter()
        .filter(|a| a.kind == AnnotationKind::Media && predicate(&a.attributes))
        .map(|a| a.attributes.clone())
        .collect()
}
