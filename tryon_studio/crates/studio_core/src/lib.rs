pub mod modules;

pub use modules::{
    codec, config, error, gemini, history, i18n, prompts, protocol, storage, studio, suggestions,
};
