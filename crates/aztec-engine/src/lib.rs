pub mod editor;
pub mod error;
pub mod formatting;
pub mod history;
pub mod html;
pub mod model;

// Re-export key types for easier usage
pub use editor::{Editor, EditorConfig, EditorState};
pub use error::EngineError;
pub use formatting::StyleKind;
pub use history::{History, HistoryConfig, HistoryConfigError, HistoryState};
pub use html::{ParsedHtml, parse, remove_source_formatting, serialize, to_formatted_html};
pub use model::*;
