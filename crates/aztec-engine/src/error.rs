use crate::history::HistoryConfigError;
use crate::model::AnnotationId;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid history configuration: {0}")]
    History(#[from] HistoryConfigError),
    #[error("No unknown block with id {0:?}")]
    UnknownBlockNotFound(AnnotationId),
}
