//! Try-on history (newest first) and the single saved-session slot.

use crate::modules::protocol::{HistoryItem, SavedSession};
use crate::modules::storage::{Prefs, KEY_HISTORY, KEY_SAVED_SESSION};
use rand::Rng;
use serde_json::Value;

/// Append-only log; entries leave only through an explicit delete.
pub struct HistoryStore {
    prefs: Prefs,
    items: Vec<HistoryItem>,
}

impl HistoryStore {
    pub fn load(prefs: Prefs) -> Self {
        // Decoded entry by entry so one unreadable entry never hides the rest.
        let raw: Vec<Value> = prefs.load(KEY_HISTORY).unwrap_or_default();
        let mut items: Vec<HistoryItem> = raw
            .into_iter()
            .enumerate()
            .filter_map(|(index, value)| match serde_json::from_value(value) {
                Ok(item) => Some(item),
                Err(e) => {
                    tracing::warn!(index, error = %e, "skipping unreadable history entry");
                    None
                }
            })
            .collect();

        // Entries written before ids existed get one now.
        let mut patched = false;
        for item in items.iter_mut().filter(|i| i.id.trim().is_empty()) {
            item.id = generate_id();
            patched = true;
        }
        let store = Self { prefs, items };
        if patched {
            store.persist();
        }
        store
    }

    pub fn list(&self) -> &[HistoryItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&HistoryItem> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn append(&mut self, item: HistoryItem) {
        self.items.insert(0, item);
        self.persist();
    }

    pub fn delete(&mut self, id: &str) -> Option<HistoryItem> {
        let pos = self.items.iter().position(|i| i.id == id)?;
        let removed = self.items.remove(pos);
        self.persist();
        Some(removed)
    }

    /// Positional delete against the current order.
    pub fn delete_at(&mut self, index: usize) -> Option<HistoryItem> {
        if index >= self.items.len() {
            return None;
        }
        let removed = self.items.remove(index);
        self.persist();
        Some(removed)
    }

    fn persist(&self) {
        self.prefs.save(KEY_HISTORY, &self.items);
    }
}

pub struct SessionSlot {
    prefs: Prefs,
    current: Option<SavedSession>,
}

impl SessionSlot {
    pub fn load(prefs: Prefs) -> Self {
        let current = prefs.load(KEY_SAVED_SESSION);
        Self { prefs, current }
    }

    pub fn get(&self) -> Option<&SavedSession> {
        self.current.as_ref()
    }

    pub fn set(&mut self, session: SavedSession) {
        self.prefs.save(KEY_SAVED_SESSION, &session);
        self.current = Some(session);
    }
}

pub fn new_item(person_preview: String, clothing_preview: String, result_preview: String) -> HistoryItem {
    HistoryItem {
        id: generate_id(),
        created_at_ms: now_millis(),
        person_preview,
        clothing_preview,
        result_preview,
    }
}

pub fn generate_id() -> String {
    let bytes: [u8; 8] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn now_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::protocol::StyleTheme;
    use crate::modules::storage::MemoryStore;

    fn item(tag: &str) -> HistoryItem {
        new_item(format!("p-{tag}"), format!("c-{tag}"), format!("r-{tag}"))
    }

    fn results(store: &HistoryStore) -> Vec<String> {
        store.list().iter().map(|i| i.result_preview.clone()).collect()
    }

    #[test]
    fn append_is_newest_first_and_persisted() {
        let prefs = Prefs::new(MemoryStore::new());
        let mut store = HistoryStore::load(prefs.clone());
        store.append(item("a"));
        store.append(item("b"));
        assert_eq!(results(&store), vec!["r-b", "r-a"]);

        let reloaded = HistoryStore::load(prefs);
        assert_eq!(results(&reloaded), vec!["r-b", "r-a"]);
    }

    #[test]
    fn delete_at_keeps_relative_order() {
        let mut store = HistoryStore::load(Prefs::new(MemoryStore::new()));
        for t in ["a", "b", "c", "d"] {
            store.append(item(t));
        }
        let removed = store.delete_at(1).unwrap();
        assert_eq!(removed.result_preview, "r-c");
        assert_eq!(results(&store), vec!["r-d", "r-b", "r-a"]);
        assert!(store.delete_at(3).is_none());
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn delete_by_id_is_stable_across_appends() {
        let mut store = HistoryStore::load(Prefs::new(MemoryStore::new()));
        store.append(item("a"));
        let target = store.list()[0].id.clone();
        store.append(item("b"));

        let removed = store.delete(&target).unwrap();
        assert_eq!(removed.result_preview, "r-a");
        assert_eq!(results(&store), vec!["r-b"]);
        assert!(store.delete(&target).is_none());
    }

    #[test]
    fn appends_never_drop_old_entries() {
        let mut store = HistoryStore::load(Prefs::new(MemoryStore::new()));
        for i in 0..120 {
            store.append(item(&i.to_string()));
        }
        assert_eq!(store.len(), 120);
        assert_eq!(store.list()[119].result_preview, "r-0");
    }

    #[test]
    fn legacy_entries_survive_load_and_append() {
        let prefs = Prefs::new(MemoryStore::new());
        prefs.save(
            KEY_HISTORY,
            &serde_json::json!([
                { "person_preview": "p1", "clothing_preview": "c1", "result_preview": "r1" },
                { "id": "abc", "person_preview": "p2", "clothing_preview": "c2", "result_preview": "r2" },
                { "unexpected": true }
            ]),
        );
        let mut store = HistoryStore::load(prefs.clone());
        assert_eq!(results(&store), vec!["r1", "r2"]);
        assert_eq!(store.list()[0].id.len(), 16);
        assert_eq!(store.list()[1].id, "abc");

        store.append(item("new"));
        let reloaded = HistoryStore::load(prefs);
        assert_eq!(results(&reloaded), vec!["r-new", "r1", "r2"]);
        assert_eq!(reloaded.list()[1].id, store.list()[1].id);
    }

    #[test]
    fn session_slot_overwrites() {
        let prefs = Prefs::new(MemoryStore::new());
        let mut slot = SessionSlot::load(prefs.clone());
        assert!(slot.get().is_none());

        let first = SavedSession {
            person_image: "p1".into(),
            clothing_image: "c1".into(),
            remove_background: true,
            style_theme: StyleTheme::Artistic,
        };
        slot.set(first);
        let second = SavedSession {
            person_image: "p2".into(),
            clothing_image: "c2".into(),
            remove_background: false,
            style_theme: StyleTheme::Realistic,
        };
        slot.set(second.clone());

        let reloaded = SessionSlot::load(prefs);
        assert_eq!(reloaded.get(), Some(&second));
    }
}
