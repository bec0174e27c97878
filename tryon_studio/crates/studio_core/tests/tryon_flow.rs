use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use studio_core::codec::ImageFile;
use studio_core::error::{StudioError, ValidationError};
use studio_core::gemini::{GeminiError, StylistGateway};
use studio_core::protocol::{
    ClothingSuggestion, ImagePayload, Language, SavedSession, StyleTheme, Theme,
};
use studio_core::storage::{
    KeyValueStore, MemoryStore, Prefs, StorageError, KEY_CLOTHING_PREVIEW, KEY_PERSON_PREVIEW,
    KEY_SAVED_SESSION,
};
use studio_core::studio::{LoadingStage, Studio, StudioEvent, View};
use studio_core::suggestions::{SuggestionEvent, SuggestionImageState};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Suggestions(String),
    ClothingImage(String),
    RemoveBackground(ImagePayload),
    TryOn {
        person: ImagePayload,
        clothing: ImagePayload,
        theme: StyleTheme,
    },
}

#[derive(Default)]
struct MockGateway {
    calls: Mutex<Vec<Call>>,
    suggestions: Vec<ClothingSuggestion>,
    fail_suggestions: bool,
    fail_try_on: bool,
    fail_images_for: Vec<String>,
    image_delay_ms: HashMap<String, u64>,
    renders: AtomicU8,
}

impl MockGateway {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl StylistGateway for MockGateway {
    async fn clothing_suggestions(
        &self,
        prompt: &str,
        _language: Language,
        _preferred_colors: Option<&str>,
    ) -> Result<Vec<ClothingSuggestion>, GeminiError> {
        self.record(Call::Suggestions(prompt.to_string()));
        if self.fail_suggestions {
            return Err(GeminiError::Parse("not a list".into()));
        }
        Ok(self.suggestions.clone())
    }

    async fn generate_clothing_image(
        &self,
        description: &str,
        _theme: StyleTheme,
    ) -> Result<ImagePayload, GeminiError> {
        self.record(Call::ClothingImage(description.to_string()));
        if let Some(ms) = self.image_delay_ms.get(description) {
            tokio::time::sleep(Duration::from_millis(*ms)).await;
        }
        if self.fail_images_for.iter().any(|d| d == description) {
            return Err(GeminiError::Blocked("SAFETY".into()));
        }
        Ok(png(description.len() as u8).to_payload())
    }

    async fn remove_background(&self, image: &ImagePayload) -> Result<ImagePayload, GeminiError> {
        self.record(Call::RemoveBackground(image.clone()));
        Ok(png(0xBB).to_payload())
    }

    async fn virtual_try_on(
        &self,
        person: &ImagePayload,
        clothing: &ImagePayload,
        theme: StyleTheme,
    ) -> Result<ImagePayload, GeminiError> {
        self.record(Call::TryOn {
            person: person.clone(),
            clothing: clothing.clone(),
            theme,
        });
        if self.fail_try_on {
            return Err(GeminiError::NoImage("STOP".into()));
        }
        let n = self.renders.fetch_add(1, Ordering::SeqCst);
        Ok(png(0xC0 + n).to_payload())
    }
}

fn png(tag: u8) -> ImageFile {
    ImageFile {
        name: "image.png".into(),
        mime_type: "image/png".into(),
        bytes: vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, tag],
    }
}

fn suggestion(name: &str, description: &str) -> ClothingSuggestion {
    ClothingSuggestion {
        name: name.into(),
        description: description.into(),
    }
}

fn studio_with(gateway: MockGateway) -> (Studio<MockGateway>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let studio = Studio::open(gateway, Prefs::from_arc(store.clone()));
    (studio, store)
}

fn ready_to_try_on(gateway: MockGateway) -> (Studio<MockGateway>, Arc<MemoryStore>) {
    let (mut studio, store) = studio_with(gateway);
    studio.start_new().unwrap();
    studio.upload_person(png(1)).unwrap();
    studio.upload_clothing(png(2)).unwrap();
    (studio, store)
}

#[tokio::test]
async fn try_on_without_both_images_never_reaches_the_gateway() {
    let (mut studio, _) = studio_with(MockGateway::default());
    studio.start_new().unwrap();

    let err = studio.try_on().await.unwrap_err();
    assert!(matches!(
        err,
        StudioError::Validation(ValidationError::MissingPersonImage)
    ));
    assert_eq!(studio.view(), View::TryOn);

    studio.upload_person(png(1)).unwrap();
    let err = studio.try_on().await.unwrap_err();
    assert!(matches!(
        err,
        StudioError::Validation(ValidationError::MissingClothingImage)
    ));
    assert_eq!(studio.view(), View::TryOn);
    assert!(studio.error().is_some());
    assert!(studio.gateway().calls().is_empty());
}

#[tokio::test]
async fn try_on_is_only_available_from_the_editor() {
    let (mut studio, _) = studio_with(MockGateway::default());
    let err = studio.try_on().await.unwrap_err();
    assert!(matches!(
        err,
        StudioError::Validation(ValidationError::WrongView { .. })
    ));
    assert_eq!(studio.view(), View::Start);
}

#[tokio::test]
async fn background_removal_feeds_the_composite() {
    let (mut studio, _) = ready_to_try_on(MockGateway::default());
    studio.set_remove_background(true);
    studio.set_style_theme(StyleTheme::MagazineCover);
    let mut events = studio.subscribe();

    studio.try_on().await.unwrap();

    assert_eq!(
        studio.gateway().calls(),
        vec![
            Call::RemoveBackground(png(1).to_payload()),
            Call::TryOn {
                person: png(0xBB).to_payload(),
                clothing: png(2).to_payload(),
                theme: StyleTheme::MagazineCover,
            },
        ]
    );

    let mut stages = Vec::new();
    while let Ok(ev) = events.try_recv() {
        if let StudioEvent::Loading { stage, message } = ev {
            assert!(!message.is_empty());
            stages.push(stage);
        }
    }
    assert_eq!(
        stages,
        vec![LoadingStage::RemovingBackground, LoadingStage::GeneratingLook]
    );
}

#[tokio::test]
async fn background_removal_is_skipped_when_disabled() {
    let (mut studio, _) = ready_to_try_on(MockGateway::default());
    studio.try_on().await.unwrap();

    let calls = studio.gateway().calls();
    assert_eq!(calls.len(), 1);
    assert!(matches!(&calls[0], Call::TryOn { person, .. } if *person == png(1).to_payload()));
}

#[tokio::test]
async fn successful_try_on_prepends_history_and_shows_result() {
    let (mut studio, _) = ready_to_try_on(MockGateway::default());
    studio.try_on().await.unwrap();
    studio.back().unwrap();
    studio.try_on().await.unwrap();

    assert_eq!(studio.view(), View::Result);
    assert_eq!(studio.history().len(), 2);

    let result = studio.result().unwrap();
    assert_eq!(result.image, png(0xC1).to_payload());
    assert_eq!(studio.history()[0].result_preview, result.data_url);
    assert_eq!(studio.history()[0].person_preview, png(1).to_data_url());
    assert_eq!(studio.history()[0].clothing_preview, png(2).to_data_url());

    let shared = studio.share_result().unwrap();
    assert_eq!(shared.name, "virtual-try-on.png");
    assert_eq!(shared.bytes, png(0xC1).bytes);
}

#[tokio::test]
async fn failed_try_on_returns_to_editor_with_error() {
    let gateway = MockGateway {
        fail_try_on: true,
        ..Default::default()
    };
    let (mut studio, _) = ready_to_try_on(gateway);
    let mut events = studio.subscribe();

    let err = studio.try_on().await.unwrap_err();
    assert!(matches!(err, StudioError::Gateway(GeminiError::NoImage(_))));
    assert_eq!(studio.view(), View::TryOn);
    assert!(studio.history().is_empty());
    assert!(studio.result().is_none());
    assert!(!studio.error().unwrap_or_default().is_empty());

    let views: Vec<View> = std::iter::from_fn(|| events.try_recv().ok())
        .filter_map(|ev| match ev {
            StudioEvent::ViewChanged(v) => Some(v),
            _ => None,
        })
        .collect();
    assert_eq!(views, vec![View::Loading, View::TryOn]);
}

#[tokio::test]
async fn deleting_history_requires_confirmation_and_keeps_order() {
    let (mut studio, _) = ready_to_try_on(MockGateway::default());
    for _ in 0..4 {
        studio.try_on().await.unwrap();
        studio.back().unwrap();
    }
    let before: Vec<String> = studio.history().iter().map(|h| h.id.clone()).collect();

    studio.back().unwrap();
    studio.view_history().unwrap();
    studio.request_delete(&before[1]).unwrap();
    studio.cancel_delete();
    assert!(studio.confirm_delete().is_none());
    assert_eq!(studio.history().len(), 4);

    studio.request_delete(&before[1]).unwrap();
    let removed = studio.confirm_delete().unwrap();
    assert_eq!(removed.id, before[1]);

    let after: Vec<String> = studio.history().iter().map(|h| h.id.clone()).collect();
    assert_eq!(after, vec![before[0].clone(), before[2].clone(), before[3].clone()]);

    assert!(studio.request_delete("missing").is_err());
}

#[tokio::test]
async fn history_modal_opens_and_closes() {
    let (mut studio, _) = ready_to_try_on(MockGateway::default());
    studio.try_on().await.unwrap();
    let id = studio.history()[0].id.clone();

    studio.open_history_item(&id).unwrap();
    assert_eq!(studio.modal().map(|h| h.id.as_str()), Some(id.as_str()));
    studio.close_modal();
    assert!(studio.modal().is_none());
}

#[tokio::test]
async fn one_failed_suggestion_image_leaves_the_others_usable() {
    let gateway = MockGateway {
        suggestions: vec![
            suggestion("Jacket", "slow denim jacket"),
            suggestion("Jacket", "broken leather jacket"),
            suggestion("Scarf", "quick silk scarf"),
        ],
        fail_images_for: vec!["broken leather jacket".into()],
        image_delay_ms: HashMap::from([
            ("slow denim jacket".to_string(), 40),
            ("broken leather jacket".to_string(), 20),
        ]),
        ..Default::default()
    };
    let (mut studio, _) = studio_with(gateway);
    studio.start_new().unwrap();
    let mut events = studio.subscribe();

    studio
        .request_suggestions("street style", Some("blue"))
        .await
        .unwrap();

    assert!(!studio.suggestions_loading());
    let batch = studio.suggestions();
    assert_eq!(batch.suggestions().len(), 3);
    assert_eq!(batch.image_count(), 2);
    assert!(batch.is_selectable(0));
    assert!(!batch.is_selectable(1));
    assert!(batch.is_selectable(2));
    assert_eq!(batch.state(1), SuggestionImageState::Failed);
    assert!(studio.error().is_none());

    let settled: Vec<usize> = std::iter::from_fn(|| events.try_recv().ok())
        .filter_map(|ev| match ev {
            StudioEvent::Suggestion(SuggestionEvent::Ready { id, .. })
            | StudioEvent::Suggestion(SuggestionEvent::Failed { id, .. }) => Some(id),
            _ => None,
        })
        .collect();
    assert_eq!(settled, vec![2, 1, 0]);

    studio.select_suggestion(2).unwrap();
    let clothing = studio.clothing().unwrap();
    assert_eq!(clothing.file.bytes, png("quick silk scarf".len() as u8).bytes);
    assert!(studio.select_suggestion(1).is_err());
}

#[tokio::test]
async fn suggestions_need_a_prompt_and_surface_list_failures() {
    let gateway = MockGateway {
        fail_suggestions: true,
        ..Default::default()
    };
    let (mut studio, _) = studio_with(gateway);
    studio.start_new().unwrap();

    let err = studio.request_suggestions("   ", None).await.unwrap_err();
    assert!(err.is_validation());
    assert!(studio.gateway().calls().is_empty());

    let err = studio.request_suggestions("boho", None).await.unwrap_err();
    assert!(!err.is_validation());
    assert!(!studio.suggestions_loading());
    assert!(studio.error().is_some());
    assert_eq!(studio.view(), View::TryOn);
}

#[tokio::test]
async fn saved_session_round_trips_and_overwrites() {
    let (mut studio, store) = ready_to_try_on(MockGateway::default());
    studio.set_remove_background(true);
    studio.set_style_theme(StyleTheme::Artistic);
    studio.save_session().unwrap();

    studio.upload_clothing(png(3)).unwrap();
    studio.set_remove_background(false);
    studio.set_style_theme(StyleTheme::Realistic);
    studio.save_session().unwrap();

    studio.reset();
    assert!(studio.person().is_none());
    assert_eq!(studio.view(), View::Start);

    let mut reopened = Studio::open(MockGateway::default(), Prefs::from_arc(store.clone()));
    assert!(reopened.can_load_saved_session());
    reopened.load_saved_session().unwrap();

    assert_eq!(reopened.view(), View::TryOn);
    assert_eq!(reopened.person().unwrap().file.bytes, png(1).bytes);
    assert_eq!(reopened.clothing().unwrap().file.bytes, png(3).bytes);
    assert!(!reopened.remove_background());
    assert_eq!(reopened.style_theme(), StyleTheme::Realistic);
}

#[tokio::test]
async fn reset_keeps_history_and_session() {
    let (mut studio, store) = ready_to_try_on(MockGateway::default());
    studio.save_session().unwrap();
    studio.try_on().await.unwrap();
    assert!(store.keys().contains(&KEY_PERSON_PREVIEW.to_string()));

    studio.reset();
    let keys = store.keys();
    assert!(!keys.contains(&KEY_PERSON_PREVIEW.to_string()));
    assert!(!keys.contains(&KEY_CLOTHING_PREVIEW.to_string()));
    assert!(studio.result().is_none());
    assert_eq!(studio.history().len(), 1);
    assert!(studio.saved_session().is_some());

    let reopened = Studio::open(MockGateway::default(), Prefs::from_arc(store));
    assert!(reopened.can_view_history());
    assert!(!reopened.can_resume());
}

#[tokio::test]
async fn uploads_are_restored_at_startup() {
    let (studio, store) = ready_to_try_on(MockGateway::default());
    drop(studio);

    let mut reopened = Studio::open(MockGateway::default(), Prefs::from_arc(store));
    assert!(reopened.can_resume());
    assert_eq!(reopened.person().unwrap().file.name, "person.png");
    reopened.resume().unwrap();
    assert_eq!(reopened.view(), View::TryOn);
}

#[tokio::test]
async fn view_history_needs_entries() {
    let (mut studio, _) = studio_with(MockGateway::default());
    assert!(!studio.can_view_history());
    assert!(studio.view_history().is_err());
    assert_eq!(studio.view(), View::Start);
}

#[tokio::test]
async fn ready_tile_is_selectable_while_siblings_render() {
    let gateway = MockGateway {
        suggestions: vec![
            suggestion("Coat", "slow wool coat"),
            suggestion("Cap", "fast cap"),
        ],
        image_delay_ms: HashMap::from([("slow wool coat".to_string(), 200)]),
        ..Default::default()
    };
    let (mut studio, _) = studio_with(gateway);
    studio.start_new().unwrap();
    let mut events = studio.subscribe();

    studio.start_suggestions("winter", None).await.unwrap();
    assert!(studio.suggestions_loading());

    let first = studio.next_suggestion().await.unwrap();
    let image = match first {
        SuggestionEvent::Ready { id: 1, image, .. } => image,
        other => panic!("expected the fast tile first, got {other:?}"),
    };
    assert!(studio.suggestions_loading());
    assert_eq!(studio.suggestions().pending_count(), 1);
    assert_eq!(studio.suggestions().state(0), SuggestionImageState::Pending);

    studio.select_suggestion(1).unwrap();
    assert_eq!(studio.clothing().unwrap().file, image.file);
    assert!(studio.select_suggestion(0).is_err());

    assert!(matches!(
        studio.next_suggestion().await,
        Some(SuggestionEvent::Ready { id: 0, .. })
    ));
    assert!(studio.next_suggestion().await.is_none());
    assert!(!studio.suggestions_loading());

    let stages: Vec<LoadingStage> = std::iter::from_fn(|| events.try_recv().ok())
        .filter_map(|ev| match ev {
            StudioEvent::Loading { stage, .. } => Some(stage),
            _ => None,
        })
        .collect();
    assert_eq!(
        stages,
        vec![
            LoadingStage::FetchingSuggestions,
            LoadingStage::RenderingSuggestions
        ]
    );
}

struct FailingStore;

impl KeyValueStore for FailingStore {
    fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(StorageError::Poisoned)
    }
    fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::Poisoned)
    }
    fn remove(&self, _key: &str) -> Result<(), StorageError> {
        Err(StorageError::Poisoned)
    }
}

#[tokio::test]
async fn failing_storage_never_breaks_the_flow() {
    let mut studio = Studio::open(MockGateway::default(), Prefs::new(FailingStore));
    assert!(!studio.can_view_history());

    studio.start_new().unwrap();
    studio.upload_person(png(1)).unwrap();
    studio.upload_clothing(png(2)).unwrap();
    studio.set_remove_background(true);
    studio.save_session().unwrap();

    studio.try_on().await.unwrap();
    assert_eq!(studio.view(), View::Result);
    assert_eq!(studio.history().len(), 1);
    assert!(studio.error().is_none());

    studio.reset();
    assert_eq!(studio.view(), View::Start);
}

#[tokio::test]
async fn unreadable_saved_session_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let prefs = Prefs::from_arc(store.clone());
    prefs.save(
        KEY_SAVED_SESSION,
        &SavedSession {
            person_image: "data:image/png;base64".into(),
            clothing_image: png(2).to_data_url(),
            remove_background: true,
            style_theme: StyleTheme::Artistic,
        },
    );

    let mut studio = Studio::open(MockGateway::default(), prefs);
    let err = studio.load_saved_session().unwrap_err();
    assert!(matches!(
        err,
        StudioError::Validation(ValidationError::UnreadableSavedSession)
    ));
    assert_eq!(studio.view(), View::Start);
    assert!(studio.person().is_none());
    assert!(studio.clothing().is_none());
    assert!(!studio.remove_background());
    assert!(studio.error().is_some());
    assert!(!store.keys().contains(&KEY_CLOTHING_PREVIEW.to_string()));
}

#[tokio::test]
async fn start_new_from_result_drops_pending_delete() {
    let (mut studio, _) = ready_to_try_on(MockGateway::default());
    studio.try_on().await.unwrap();
    let id = studio.history()[0].id.clone();
    studio.open_history_item(&id).unwrap();
    studio.request_delete(&id).unwrap();

    studio.start_new().unwrap();
    assert_eq!(studio.view(), View::TryOn);
    assert!(studio.person().is_none());
    assert!(studio.clothing().is_none());
    assert!(studio.result().is_none());
    assert!(studio.modal().is_none());
    assert!(studio.pending_delete().is_none());

    assert!(studio.confirm_delete().is_none());
    assert_eq!(studio.history().len(), 1);
}

#[tokio::test]
async fn theme_toggle_is_persisted() {
    let (mut studio, store) = studio_with(MockGateway::default());
    assert_eq!(studio.theme(), Theme::Light);
    assert_eq!(studio.toggle_theme(), Theme::Dark);

    let reopened = Studio::open(MockGateway::default(), Prefs::from_arc(store));
    assert_eq!(reopened.theme(), Theme::Dark);
}
