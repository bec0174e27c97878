use crate::modules::codec::CodecError;
use crate::modules::gemini::GeminiError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("a person photo is required")]
    MissingPersonImage,
    #[error("a clothing photo is required")]
    MissingClothingImage,
    #[error("a style prompt is required")]
    EmptyPrompt,
    #[error("no saved session to load")]
    NoSavedSession,
    #[error("the saved session holds an unreadable image")]
    UnreadableSavedSession,
    #[error("history is empty")]
    EmptyHistory,
    #[error("history item not found: {0}")]
    UnknownHistoryItem(String),
    #[error("suggestion {0} has no image yet")]
    SuggestionNotReady(usize),
    #[error("no result to share")]
    NoResult,
    #[error("{action} is not available from the {view} screen")]
    WrongView {
        action: &'static str,
        view: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum StudioError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Gateway(#[from] GeminiError),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl StudioError {
    pub fn is_validation(&self) -> bool {
        matches!(self, StudioError::Validation(_))
    }
}
