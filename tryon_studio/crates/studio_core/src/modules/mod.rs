pub mod codec;
pub mod config;
pub mod error;
pub mod gemini;
pub mod history;
pub mod i18n;
pub mod prompts;
pub mod protocol;
pub mod storage;
pub mod studio;
pub mod suggestions;
