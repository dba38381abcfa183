use crate::character::{Character, Item};
use crate::error::StoreError;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

/// A patch against a single owned item, addressed by id.
#[derive(Debug, Clone)]
pub struct ItemPatch {
    pub id: String,
    pub patch: Value,
}

impl ItemPatch {
    pub fn new(id: impl Into<String>, patch: Value) -> Self {
        ItemPatch {
            id: id.into(),
            patch,
        }
    }
}

/// Persistence seam between the generation pipeline and wherever the
/// character actually lives. Steps only ever see this trait.
#[async_trait]
pub trait CharacterStore: Send + Sync {
    /// Full copy of the character as it stands right now.
    async fn snapshot(&self) -> Result<Character, StoreError>;

    /// Deep-merge `patch` into the character. Objects merge key by key,
    /// everything else (arrays included) replaces wholesale. Items are
    /// owned documents and must go through the item methods instead.
    async fn update(&self, patch: Value) -> Result<(), StoreError>;

    /// Add items, minting an id for any item that arrives without one.
    /// Returns the ids in the same order as the input.
    async fn create_items(&self, items: Vec<Item>) -> Result<Vec<String>, StoreError>;

    /// Deep-merge each patch into the item it addresses.
    async fn update_items(&self, patches: Vec<ItemPatch>) -> Result<(), StoreError>;
}

/// In-memory store backing a single generation run.
pub struct MemoryStore {
    character: Mutex<Character>,
}

impl MemoryStore {
    pub fn new(character: Character) -> Self {
        MemoryStore {
            character: Mutex::new(character),
        }
    }

    /// Consume the store and hand back the finished character.
    pub fn into_character(self) -> Character {
        self.character.into_inner()
    }
}

#[async_trait]
impl CharacterStore for MemoryStore {
    async fn snapshot(&self) -> Result<Character, StoreError> {
        Ok(self.character.lock().await.clone())
    }

    async fn update(&self, patch: Value) -> Result<(), StoreError> {
        if patch.get("items").is_some() {
            return Err(StoreError::IllegalPatch(
                "items cannot be patched through update; use create_items/update_items".into(),
            ));
        }
        let mut guard = self.character.lock().await;
        let mut doc = serde_json::to_value(&*guard)?;
        deep_merge(&mut doc, &patch);
        *guard = serde_json::from_value(doc)?;
        Ok(())
    }

    async fn create_items(&self, items: Vec<Item>) -> Result<Vec<String>, StoreError> {
        let mut guard = self.character.lock().await;
        let mut ids = Vec::with_capacity(items.len());
        for mut item in items {
            if item.id.is_empty() {
                item.id = Uuid::new_v4().to_string();
            }
            ids.push(item.id.clone());
            guard.items.push(item);
        }
        Ok(ids)
    }

    async fn update_items(&self, patches: Vec<ItemPatch>) -> Result<(), StoreError> {
        let mut guard = self.character.lock().await;
        for ItemPatch { id, patch } in patches {
            let item = guard
                .items
                .iter_mut()
                .find(|item| item.id == id)
                .ok_or_else(|| StoreError::MissingItem(id.clone()))?;
            let mut doc = serde_json::to_value(&*item)?;
            deep_merge(&mut doc, &patch);
            *item = serde_json::from_value(doc)?;
        }
        Ok(())
    }
}

/// Recursive merge: object-into-object merges per key, any other pairing
/// replaces the target. Arrays replace so a patch can rewrite a list
/// without knowing its previous contents.
pub fn deep_merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                match target_map.get_mut(key) {
                    Some(slot) => deep_merge(slot, patch_value),
                    None => {
                        target_map.insert(key.clone(), patch_value.clone());
                    }
                }
            }
        }
        (slot, patch_value) => {
            *slot = patch_value.clone();
        }
    }
}
