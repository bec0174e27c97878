//! Stylist suggestion batches and their per-tile image state.

use crate::modules::codec::{extension_for_mime, payload_to_data_url, ImageFile};
use crate::modules::gemini::{GeminiError, StylistGateway};
use crate::modules::protocol::{ClothingSuggestion, ImagePayload, StyleTheme};
use futures_util::future::BoxFuture;
use futures_util::stream::{FuturesUnordered, StreamExt};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Position of a suggestion inside its batch.
pub type SuggestionId = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestionImage {
    pub data_url: String,
    pub mime_type: String,
    pub file: ImageFile,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuggestionImageState {
    NotStarted,
    Pending,
    Ready(SuggestionImage),
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuggestionEvent {
    Listed { count: usize },
    Ready { id: SuggestionId, name: String, image: SuggestionImage },
    Failed { id: SuggestionId, name: String, error: String },
}

#[derive(Debug, Default)]
pub struct SuggestionBatch {
    suggestions: Vec<ClothingSuggestion>,
    // Live entries only (Pending / Ready); failures are dropped from here.
    images: BTreeMap<SuggestionId, SuggestionImageState>,
    failed: BTreeSet<SuggestionId>,
}

impl SuggestionBatch {
    pub fn new(suggestions: Vec<ClothingSuggestion>) -> Self {
        Self {
            suggestions,
            images: BTreeMap::new(),
            failed: BTreeSet::new(),
        }
    }

    pub fn suggestions(&self) -> &[ClothingSuggestion] {
        &self.suggestions
    }

    pub fn is_empty(&self) -> bool {
        self.suggestions.is_empty()
    }

    pub fn get(&self, id: SuggestionId) -> Option<&ClothingSuggestion> {
        self.suggestions.get(id)
    }

    pub fn state(&self, id: SuggestionId) -> SuggestionImageState {
        if let Some(s) = self.images.get(&id) {
            return s.clone();
        }
        if self.failed.contains(&id) {
            SuggestionImageState::Failed
        } else {
            SuggestionImageState::NotStarted
        }
    }

    /// Number of entries in the image map (pending or ready).
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn pending_count(&self) -> usize {
        self.images
            .values()
            .filter(|s| matches!(s, SuggestionImageState::Pending))
            .count()
    }

    pub fn ready_image(&self, id: SuggestionId) -> Option<&SuggestionImage> {
        match self.images.get(&id) {
            Some(SuggestionImageState::Ready(img)) => Some(img),
            _ => None,
        }
    }

    pub fn is_selectable(&self, id: SuggestionId) -> bool {
        self.ready_image(id).is_some()
    }

    fn mark_pending(&mut self, id: SuggestionId) {
        self.failed.remove(&id);
        self.images.insert(id, SuggestionImageState::Pending);
    }

    fn resolve(
        &mut self,
        id: SuggestionId,
        result: Result<ImagePayload, GeminiError>,
    ) -> SuggestionEvent {
        let name = self
            .suggestions
            .get(id)
            .map(|s| s.name.clone())
            .unwrap_or_default();

        let ready = result.map_err(|e| e.to_string()).and_then(|payload| {
            let file_name = format!("suggestion-{id}.{}", extension_for_mime(&payload.mime_type));
            let file = ImageFile::from_payload(&payload, &file_name).map_err(|e| e.to_string())?;
            Ok(SuggestionImage {
                data_url: payload_to_data_url(&payload),
                mime_type: payload.mime_type,
                file,
            })
        });

        match ready {
            Ok(image) => {
                self.images
                    .insert(id, SuggestionImageState::Ready(image.clone()));
                SuggestionEvent::Ready { id, name, image }
            }
            Err(error) => {
                self.images.remove(&id);
                self.failed.insert(id);
                SuggestionEvent::Failed { id, name, error }
            }
        }
    }
}

type TileRender = BoxFuture<'static, (SuggestionId, Result<ImagePayload, GeminiError>)>;

/// In-flight image requests for one batch.
///
/// Requests run concurrently and are driven by [`TileRenders::next`]; between
/// two calls the batch can be read and its ready tiles used.
#[derive(Default)]
pub struct TileRenders {
    in_flight: FuturesUnordered<TileRender>,
}

impl TileRenders {
    /// Marks every tile pending and issues one request per suggestion.
    pub fn start<G>(gateway: Arc<G>, batch: &mut SuggestionBatch, theme: StyleTheme) -> Self
    where
        G: StylistGateway + ?Sized + 'static,
    {
        let in_flight = FuturesUnordered::new();
        for (id, suggestion) in batch.suggestions.iter().enumerate() {
            let gateway = Arc::clone(&gateway);
            let description = suggestion.description.clone();
            in_flight.push(Box::pin(async move {
                let result = gateway.generate_clothing_image(&description, theme).await;
                (id, result)
            }) as TileRender);
        }
        for id in 0..batch.suggestions.len() {
            batch.mark_pending(id);
        }
        Self { in_flight }
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }

    /// Waits for the next request to settle and applies it to its tile.
    ///
    /// Returns `None` once every request has settled.
    pub async fn next(&mut self, batch: &mut SuggestionBatch) -> Option<SuggestionEvent> {
        let (id, result) = self.in_flight.next().await?;
        let event = batch.resolve(id, result);
        if let SuggestionEvent::Failed { error, .. } = &event {
            tracing::warn!(suggestion = id, %error, "suggestion image failed");
        }
        Some(event)
    }
}
