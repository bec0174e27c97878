//! View/session state machine.
//!
//! ```text
//! start --start_new/resume/load_saved_session--> tryOn --try_on--> loading --ok--> result
//!   |                                              ^                   |
//!   +--view_history--> history                     +-------err---------+
//! ```
//!
//! `loading` has no user transitions; it always resolves inside [`Studio::try_on`].

use crate::modules::codec::{data_url_to_file, extension_for_mime, payload_to_data_url, ImageFile};
use crate::modules::error::{StudioError, ValidationError};
use crate::modules::gemini::StylistGateway;
use crate::modules::history::{self, HistoryStore, SessionSlot};
use crate::modules::i18n::{text, Text};
use crate::modules::protocol::{
    HistoryItem, ImagePayload, Language, SavedSession, StyleTheme, Theme,
};
use crate::modules::storage::{
    Prefs, KEY_CLOTHING_PREVIEW, KEY_LANGUAGE, KEY_PERSON_PREVIEW, KEY_REMOVE_BACKGROUND,
    KEY_STYLE_THEME, KEY_THEME,
};
use crate::modules::suggestions::{SuggestionBatch, SuggestionEvent, SuggestionId, TileRenders};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Start,
    TryOn,
    Loading,
    Result,
    History,
}

impl View {
    pub fn name(self) -> &'static str {
        match self {
            View::Start => "start",
            View::TryOn => "tryOn",
            View::Loading => "loading",
            View::Result => "result",
            View::History => "history",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadingStage {
    RemovingBackground,
    GeneratingLook,
    FetchingSuggestions,
    RenderingSuggestions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StudioEvent {
    ViewChanged(View),
    Loading { stage: LoadingStage, message: String },
    Suggestion(SuggestionEvent),
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    pub file: ImageFile,
    pub preview_url: String,
}

impl UploadedImage {
    pub fn new(file: ImageFile) -> Self {
        let preview_url = file.to_data_url();
        Self { file, preview_url }
    }

    fn from_preview(preview_url: &str, stem: &str) -> Option<Self> {
        let file = data_url_to_file(preview_url, stem)?;
        let name = format!("{stem}.{}", extension_for_mime(&file.mime_type));
        Some(Self {
            file: ImageFile { name, ..file },
            preview_url: preview_url.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryOnResult {
    pub image: ImagePayload,
    pub data_url: String,
}

pub struct Studio<G> {
    gateway: Arc<G>,
    prefs: Prefs,
    history: HistoryStore,
    session: SessionSlot,
    events: Option<mpsc::UnboundedSender<StudioEvent>>,

    view: View,
    theme: Theme,
    language: Language,
    remove_background: bool,
    style_theme: StyleTheme,

    person: Option<UploadedImage>,
    clothing: Option<UploadedImage>,
    result: Option<TryOnResult>,
    error: Option<String>,

    suggestions: SuggestionBatch,
    renders: TileRenders,
    suggestions_loading: bool,

    modal: Option<String>,
    pending_delete: Option<String>,
}

impl<G: StylistGateway + 'static> Studio<G> {
    /// Single startup load pass over every persisted key.
    pub fn open(gateway: G, prefs: Prefs) -> Self {
        let history = HistoryStore::load(prefs.clone());
        let session = SessionSlot::load(prefs.clone());

        let person = prefs
            .load::<String>(KEY_PERSON_PREVIEW)
            .and_then(|url| UploadedImage::from_preview(&url, "person"));
        let clothing = prefs
            .load::<String>(KEY_CLOTHING_PREVIEW)
            .and_then(|url| UploadedImage::from_preview(&url, "clothing"));

        let studio = Self {
            theme: prefs.load(KEY_THEME).unwrap_or_default(),
            language: prefs.load(KEY_LANGUAGE).unwrap_or_default(),
            remove_background: prefs.load(KEY_REMOVE_BACKGROUND).unwrap_or(false),
            style_theme: prefs.load(KEY_STYLE_THEME).unwrap_or_default(),
            gateway: Arc::new(gateway),
            prefs,
            history,
            session,
            events: None,
            view: View::Start,
            person,
            clothing,
            result: None,
            error: None,
            suggestions: SuggestionBatch::default(),
            renders: TileRenders::default(),
            suggestions_loading: false,
            modal: None,
            pending_delete: None,
        };
        tracing::info!(
            history = studio.history.len(),
            saved_session = studio.session.get().is_some(),
            "studio opened"
        );
        studio
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<StudioEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(tx);
        rx
    }

    /// Drops the event sender so the paired receiver ends.
    pub fn unsubscribe(&mut self) {
        self.events = None;
    }

    pub fn gateway(&self) -> &G {
        self.gateway.as_ref()
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn remove_background(&self) -> bool {
        self.remove_background
    }

    pub fn style_theme(&self) -> StyleTheme {
        self.style_theme
    }

    pub fn person(&self) -> Option<&UploadedImage> {
        self.person.as_ref()
    }

    pub fn clothing(&self) -> Option<&UploadedImage> {
        self.clothing.as_ref()
    }

    pub fn result(&self) -> Option<&TryOnResult> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn history(&self) -> &[HistoryItem] {
        self.history.list()
    }

    pub fn saved_session(&self) -> Option<&SavedSession> {
        self.session.get()
    }

    pub fn suggestions(&self) -> &SuggestionBatch {
        &self.suggestions
    }

    pub fn suggestions_loading(&self) -> bool {
        self.suggestions_loading
    }

    pub fn modal(&self) -> Option<&HistoryItem> {
        self.modal.as_deref().and_then(|id| self.history.get(id))
    }

    pub fn pending_delete(&self) -> Option<&HistoryItem> {
        self.pending_delete.as_deref().and_then(|id| self.history.get(id))
    }

    pub fn can_load_saved_session(&self) -> bool {
        self.session.get().is_some()
    }

    pub fn can_view_history(&self) -> bool {
        !self.history.is_empty()
    }

    pub fn can_resume(&self) -> bool {
        self.person.is_some() || self.clothing.is_some()
    }

    // ---- preferences -------------------------------------------------------

    pub fn set_theme(&mut self, theme: Theme) {
        self.theme = theme;
        self.prefs.save(KEY_THEME, &theme);
    }

    pub fn toggle_theme(&mut self) -> Theme {
        self.set_theme(self.theme.toggled());
        self.theme
    }

    pub fn set_language(&mut self, language: Language) {
        self.language = language;
        self.prefs.save(KEY_LANGUAGE, &language);
    }

    pub fn set_remove_background(&mut self, on: bool) {
        self.remove_background = on;
        self.prefs.save(KEY_REMOVE_BACKGROUND, &on);
    }

    pub fn set_style_theme(&mut self, theme: StyleTheme) {
        self.style_theme = theme;
        self.prefs.save(KEY_STYLE_THEME, &theme);
    }

    // ---- navigation --------------------------------------------------------

    /// Fresh session: clears in-memory work and opens the editor.
    pub fn start_new(&mut self) -> Result<(), StudioError> {
        self.require_not_loading("start new")?;
        self.reset();
        self.set_view(View::TryOn);
        Ok(())
    }

    /// Reopens the editor with whatever uploads were restored at startup.
    pub fn resume(&mut self) -> Result<(), StudioError> {
        self.require_view(&[View::Start, View::Result], "resume")?;
        self.set_view(View::TryOn);
        Ok(())
    }

    pub fn view_history(&mut self) -> Result<(), StudioError> {
        self.require_not_loading("view history")?;
        if self.history.is_empty() {
            return Err(ValidationError::EmptyHistory.into());
        }
        self.set_view(View::History);
        Ok(())
    }

    pub fn back(&mut self) -> Result<(), StudioError> {
        let to = match self.view {
            View::Start => return Ok(()),
            View::TryOn | View::History => View::Start,
            View::Result => View::TryOn,
            View::Loading => {
                return Err(wrong_view("back", self.view));
            }
        };
        self.modal = None;
        self.pending_delete = None;
        self.set_view(to);
        Ok(())
    }

    // ---- uploads -----------------------------------------------------------

    pub fn upload_person(&mut self, file: ImageFile) -> Result<(), StudioError> {
        self.require_view(&[View::Start, View::TryOn], "upload")?;
        let upload = UploadedImage::new(file);
        self.prefs.save(KEY_PERSON_PREVIEW, &upload.preview_url);
        self.person = Some(upload);
        Ok(())
    }

    pub fn upload_clothing(&mut self, file: ImageFile) -> Result<(), StudioError> {
        self.require_view(&[View::Start, View::TryOn], "upload")?;
        let upload = UploadedImage::new(file);
        self.prefs.save(KEY_CLOTHING_PREVIEW, &upload.preview_url);
        self.clothing = Some(upload);
        Ok(())
    }

    // ---- try-on ------------------------------------------------------------

    pub async fn try_on(&mut self) -> Result<(), StudioError> {
        self.require_view(&[View::TryOn], "try-on")?;

        let (person, clothing) = match (&self.person, &self.clothing) {
            (Some(p), Some(c)) => (p.clone(), c.clone()),
            (None, _) => return Err(self.reject(ValidationError::MissingPersonImage)),
            (_, None) => return Err(self.reject(ValidationError::MissingClothingImage)),
        };

        self.error = None;
        self.set_view(View::Loading);
        tracing::info!(
            remove_background = self.remove_background,
            style = self.style_theme.as_str(),
            "try-on started"
        );

        match self.run_try_on(&person, &clothing).await {
            Ok(image) => {
                let data_url = payload_to_data_url(&image);
                self.history.append(history::new_item(
                    person.preview_url,
                    clothing.preview_url,
                    data_url.clone(),
                ));
                self.result = Some(TryOnResult { image, data_url });
                tracing::info!("try-on finished");
                self.set_view(View::Result);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "try-on failed");
                let message = format!("{}: {e}", text(self.language, Text::TryOnFailed));
                self.set_error(message);
                self.set_view(View::TryOn);
                Err(e)
            }
        }
    }

    async fn run_try_on(
        &self,
        person: &UploadedImage,
        clothing: &UploadedImage,
    ) -> Result<ImagePayload, StudioError> {
        let mut person_image = person.file.to_payload();
        let clothing_image = clothing.file.to_payload();

        if self.remove_background {
            self.emit_loading(LoadingStage::RemovingBackground, Text::RemovingBackground);
            person_image = self.gateway.remove_background(&person_image).await?;
        }

        self.emit_loading(LoadingStage::GeneratingLook, Text::GeneratingLook);
        let image = self
            .gateway
            .virtual_try_on(&person_image, &clothing_image, self.style_theme)
            .await?;
        Ok(image)
    }

    pub fn share_result(&self) -> Result<ImageFile, StudioError> {
        let result = self.result.as_ref().ok_or(ValidationError::NoResult)?;
        let name = format!(
            "virtual-try-on.{}",
            extension_for_mime(&result.image.mime_type)
        );
        Ok(ImageFile::from_payload(&result.image, &name)?)
    }

    // ---- suggestions -------------------------------------------------------

    /// Fetches a suggestion list and issues one image request per suggestion.
    ///
    /// The requests settle through [`Studio::next_suggestion`]; a tile is
    /// selectable as soon as its own image is ready.
    pub async fn start_suggestions(
        &mut self,
        prompt: &str,
        preferred_colors: Option<&str>,
    ) -> Result<(), StudioError> {
        self.require_view(&[View::TryOn], "suggestions")?;
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(self.reject(ValidationError::EmptyPrompt));
        }

        self.error = None;
        self.renders = TileRenders::default();
        self.suggestions = SuggestionBatch::default();
        self.suggestions_loading = true;
        self.emit_loading(LoadingStage::FetchingSuggestions, Text::FetchingSuggestions);

        let listed = self
            .gateway
            .clothing_suggestions(prompt, self.language, preferred_colors)
            .await;
        let list = match listed {
            Ok(list) => list,
            Err(e) => {
                self.suggestions_loading = false;
                tracing::warn!(error = %e, "suggestion request failed");
                let message = format!("{}: {e}", text(self.language, Text::SuggestionsFailed));
                self.set_error(message);
                return Err(e.into());
            }
        };

        tracing::info!(count = list.len(), "suggestions received");
        self.suggestions = SuggestionBatch::new(list);
        self.emit(StudioEvent::Suggestion(SuggestionEvent::Listed {
            count: self.suggestions.suggestions().len(),
        }));
        if self.suggestions.is_empty() {
            self.suggestions_loading = false;
            return Ok(());
        }

        self.emit_loading(
            LoadingStage::RenderingSuggestions,
            Text::GeneratingSuggestionImages,
        );
        self.renders = TileRenders::start(
            Arc::clone(&self.gateway),
            &mut self.suggestions,
            self.style_theme,
        );
        Ok(())
    }

    /// Applies the next settled tile request. `None` once the batch is complete.
    pub async fn next_suggestion(&mut self) -> Option<SuggestionEvent> {
        let event = self.renders.next(&mut self.suggestions).await;
        if let Some(ev) = &event {
            self.emit(StudioEvent::Suggestion(ev.clone()));
        }
        if self.renders.is_empty() {
            self.suggestions_loading = false;
        }
        event
    }

    /// [`Studio::start_suggestions`], then waits until every tile settled.
    ///
    /// Failed tiles are dropped, not reported as an error.
    pub async fn request_suggestions(
        &mut self,
        prompt: &str,
        preferred_colors: Option<&str>,
    ) -> Result<(), StudioError> {
        self.start_suggestions(prompt, preferred_colors).await?;
        while self.next_suggestion().await.is_some() {}
        Ok(())
    }

    /// Uses a ready suggestion tile as the clothing image.
    pub fn select_suggestion(&mut self, id: SuggestionId) -> Result<(), StudioError> {
        self.require_view(&[View::TryOn], "select suggestion")?;
        let img = self
            .suggestions
            .ready_image(id)
            .ok_or(ValidationError::SuggestionNotReady(id))?;
        let upload = UploadedImage {
            file: img.file.clone(),
            preview_url: img.data_url.clone(),
        };
        self.prefs.save(KEY_CLOTHING_PREVIEW, &upload.preview_url);
        self.clothing = Some(upload);
        Ok(())
    }

    // ---- saved session -----------------------------------------------------

    pub fn save_session(&mut self) -> Result<(), StudioError> {
        let person = match &self.person {
            Some(p) => p.preview_url.clone(),
            None => return Err(self.reject(ValidationError::MissingPersonImage)),
        };
        let clothing = match &self.clothing {
            Some(c) => c.preview_url.clone(),
            None => return Err(self.reject(ValidationError::MissingClothingImage)),
        };
        self.session.set(SavedSession {
            person_image: person,
            clothing_image: clothing,
            remove_background: self.remove_background,
            style_theme: self.style_theme,
        });
        tracing::info!("session saved");
        Ok(())
    }

    pub fn load_saved_session(&mut self) -> Result<(), StudioError> {
        self.require_not_loading("load session")?;
        let saved = self
            .session
            .get()
            .cloned()
            .ok_or(ValidationError::NoSavedSession)?;

        let person = UploadedImage::from_preview(&saved.person_image, "person");
        let clothing = UploadedImage::from_preview(&saved.clothing_image, "clothing");
        let (Some(person), Some(clothing)) = (person, clothing) else {
            tracing::warn!("saved session holds an unreadable image");
            return Err(self.reject(ValidationError::UnreadableSavedSession));
        };

        self.result = None;
        self.error = None;
        self.clear_suggestions();
        self.prefs.save(KEY_PERSON_PREVIEW, &person.preview_url);
        self.prefs.save(KEY_CLOTHING_PREVIEW, &clothing.preview_url);
        self.person = Some(person);
        self.clothing = Some(clothing);
        self.set_remove_background(saved.remove_background);
        self.set_style_theme(saved.style_theme);
        self.set_view(View::TryOn);
        Ok(())
    }

    /// Clears uploads, result, suggestions and any open modal or pending delete.
    /// History and the saved session are kept.
    pub fn reset(&mut self) {
        self.person = None;
        self.clothing = None;
        self.result = None;
        self.error = None;
        self.modal = None;
        self.pending_delete = None;
        self.clear_suggestions();
        self.prefs.remove(KEY_PERSON_PREVIEW);
        self.prefs.remove(KEY_CLOTHING_PREVIEW);
        if self.view != View::Start {
            self.set_view(View::Start);
        }
    }

    // ---- history -----------------------------------------------------------

    pub fn open_history_item(&mut self, id: &str) -> Result<&HistoryItem, StudioError> {
        self.require_view(&[View::History, View::Result], "open history item")?;
        let item = self
            .history
            .get(id)
            .ok_or_else(|| ValidationError::UnknownHistoryItem(id.to_string()))?;
        self.modal = Some(item.id.clone());
        Ok(item)
    }

    pub fn close_modal(&mut self) {
        self.modal = None;
    }

    /// First step of deletion; nothing is removed until [`Studio::confirm_delete`].
    pub fn request_delete(&mut self, id: &str) -> Result<(), StudioError> {
        self.require_view(&[View::History, View::Result], "delete")?;
        if self.history.get(id).is_none() {
            return Err(ValidationError::UnknownHistoryItem(id.to_string()).into());
        }
        self.pending_delete = Some(id.to_string());
        Ok(())
    }

    pub fn cancel_delete(&mut self) {
        self.pending_delete = None;
    }

    pub fn confirm_delete(&mut self) -> Option<HistoryItem> {
        let id = self.pending_delete.take()?;
        let removed = self.history.delete(&id)?;
        if self.modal.as_deref() == Some(id.as_str()) {
            self.modal = None;
        }
        tracing::info!(id = %id, "history item deleted");
        if self.view == View::History && self.history.is_empty() {
            self.set_view(View::Start);
        }
        Some(removed)
    }

    // ---- internals ---------------------------------------------------------

    fn clear_suggestions(&mut self) {
        self.renders = TileRenders::default();
        self.suggestions = SuggestionBatch::default();
        self.suggestions_loading = false;
    }

    fn set_view(&mut self, view: View) {
        tracing::debug!(from = self.view.name(), to = view.name(), "view change");
        self.view = view;
        self.emit(StudioEvent::ViewChanged(view));
    }

    fn set_error(&mut self, message: String) {
        self.emit(StudioEvent::Error(message.clone()));
        self.error = Some(message);
    }

    fn reject(&mut self, err: ValidationError) -> StudioError {
        self.set_error(err.to_string());
        err.into()
    }

    fn emit(&self, event: StudioEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    fn emit_loading(&self, stage: LoadingStage, key: Text) {
        self.emit(StudioEvent::Loading {
            stage,
            message: text(self.language, key).to_string(),
        });
    }

    fn require_view(&self, allowed: &[View], action: &'static str) -> Result<(), StudioError> {
        if allowed.contains(&self.view) {
            Ok(())
        } else {
            Err(wrong_view(action, self.view))
        }
    }

    fn require_not_loading(&self, action: &'static str) -> Result<(), StudioError> {
        if self.view == View::Loading {
            Err(wrong_view(action, self.view))
        } else {
            Ok(())
        }
    }
}

fn wrong_view(action: &'static str, view: View) -> StudioError {
    ValidationError::WrongView {
        action,
        view: view.name(),
    }
    .into()
}
