//! Collection data with unique-key indexes.
//!
//! Everything here is synchronous. Callers hold the store lock (or own a
//! private transaction copy) while calling in.

use std::collections::{BTreeMap, HashMap};

use grantstore_storage::{
    Collection, Document, DocumentFilter, EXPIRY_FIELD, ID_FIELD, StorageError, StorageResult,
    UniqueKey, prepare_create, prepare_update, str_field, unique_value,
};
use serde_json::Value;

/// One collection: documents by id plus secondary unique indexes.
#[derive(Debug, Clone, Default)]
pub(crate) struct CollectionData {
    docs: BTreeMap<String, Document>,
    index: HashMap<(UniqueKey, String), String>,
}

impl CollectionData {
    fn owner_of(&self, key: UniqueKey, value: &str) -> Option<&str> {
        match key {
            UniqueKey::Id => self.docs.get_key_value(value).map(|(k, _)| k.as_str()),
            _ => self.index.get(&(key, value.to_string())).map(String::as_str),
        }
    }

    fn check_unique(
        &self,
        collection: Collection,
        document: &Document,
        replacing: Option<&str>,
    ) -> StorageResult<()> {
        for key in collection.unique_keys() {
            let Some(value) = unique_value(document, *key) else {
                continue;
            };
            if let Some(owner) = self.owner_of(*key, &value)
                && Some(owner) != replacing
            {
                return Err(StorageError::conflict(
                    collection.name(),
                    key.field(),
                    value,
                ));
            }
        }
        Ok(())
    }

    fn index_document(&mut self, collection: Collection, id: &str, document: &Document) {
        for key in collection.unique_keys() {
            if *key == UniqueKey::Id {
                continue;
            }
            if let Some(value) = unique_value(document, *key) {
                self.index.insert((*key, value), id.to_string());
            }
        }
    }

    fn unindex_document(&mut self, collection: Collection, document: &Document) {
        for key in collection.unique_keys() {
            if let Some(value) = unique_value(document, *key) {
                self.index.remove(&(*key, value));
            }
        }
    }

    fn insert_prepared(&mut self, collection: Collection, document: Document) -> StorageResult<()> {
        let id = str_field(&document, ID_FIELD)
            .ok_or_else(|| StorageError::internal("prepared document has no id"))?
            .to_string();
        self.check_unique(collection, &document, None)?;
        self.index_document(collection, &id, &document);
        self.docs.insert(id, document);
        Ok(())
    }

    fn replace_prepared(
        &mut self,
        collection: Collection,
        id: &str,
        document: Document,
    ) -> StorageResult<()> {
        let existing = self
            .docs
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::not_found(collection.name(), id))?;
        self.check_unique(collection, &document, Some(id))?;
        self.unindex_document(collection, &existing);
        self.index_document(collection, id, &document);
        self.docs.insert(id.to_string(), document);
        Ok(())
    }

    fn remove(&mut self, collection: Collection, id: &str) -> StorageResult<Document> {
        let removed = self
            .docs
            .remove(id)
            .ok_or_else(|| StorageError::not_found(collection.name(), id))?;
        self.unindex_document(collection, &removed);
        Ok(removed)
    }

    fn id_for_signature(&self, signature: &str) -> Option<String> {
        self.owner_of(UniqueKey::Signature, signature)
            .map(String::from)
    }

    fn expired_ids(&self, cutoff: i64) -> Vec<String> {
        self.docs
            .iter()
            .filter(|(_, doc)| {
                doc.get(EXPIRY_FIELD)
                    .and_then(Value::as_i64)
                    .is_some_and(|expiry| expiry < cutoff)
            })
            .map(|(id, _)| id.clone())
            .collect()
    }
}

/// A committed write, recorded by transactions for replay at commit time.
#[derive(Debug, Clone)]
pub(crate) enum JournalEntry {
    Insert(Collection, Document),
    Replace(Collection, String, Document),
    Remove(Collection, String),
}

/// The full data set of a store.
#[derive(Debug, Clone, Default)]
pub(crate) struct State {
    collections: HashMap<Collection, CollectionData>,
}

impl State {
    fn data(&self, collection: Collection) -> Option<&CollectionData> {
        self.collections.get(&collection)
    }

    fn data_mut(&mut self, collection: Collection) -> &mut CollectionData {
        self.collections.entry(collection).or_default()
    }

    pub(crate) fn create(
        &mut self,
        collection: Collection,
        document: Document,
        now: i64,
    ) -> StorageResult<Document> {
        let prepared = prepare_create(collection, document, now)?;
        self.data_mut(collection)
            .insert_prepared(collection, prepared.clone())?;
        Ok(prepared)
    }

    pub(crate) fn get(&self, collection: Collection, id: &str) -> StorageResult<Document> {
        self.data(collection)
            .and_then(|data| data.docs.get(id))
            .cloned()
            .ok_or_else(|| StorageError::not_found(collection.name(), id))
    }

    pub(crate) fn get_by_signature(
        &self,
        collection: Collection,
        signature: &str,
    ) -> StorageResult<Document> {
        self.data(collection)
            .and_then(|data| data.id_for_signature(signature))
            .and_then(|id| self.get(collection, &id).ok())
            .ok_or_else(|| StorageError::not_found(collection.name(), signature))
    }

    pub(crate) fn update(
        &mut self,
        collection: Collection,
        id: &str,
        document: Document,
        now: i64,
    ) -> StorageResult<Document> {
        let existing = self.get(collection, id)?;
        let prepared = prepare_update(collection, id, &existing, document, now)?;
        self.data_mut(collection)
            .replace_prepared(collection, id, prepared.clone())?;
        Ok(prepared)
    }

    pub(crate) fn delete(&mut self, collection: Collection, id: &str) -> StorageResult<()> {
        self.data_mut(collection).remove(collection, id).map(|_| ())
    }

    /// Resolves a signature to its document id.
    pub(crate) fn id_for_signature(
        &self,
        collection: Collection,
        signature: &str,
    ) -> StorageResult<String> {
        self.data(collection)
            .and_then(|data| data.id_for_signature(signature))
            .ok_or_else(|| StorageError::not_found(collection.name(), signature))
    }

    pub(crate) fn list(&self, collection: Collection, filter: &DocumentFilter) -> Vec<Document> {
        self.data(collection)
            .map(|data| {
                data.docs
                    .values()
                    .filter(|doc| filter.matches(doc))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Ids of documents that expire before `cutoff`.
    pub(crate) fn expired_ids(&self, collection: Collection, cutoff: i64) -> Vec<String> {
        self.data(collection)
            .map(|data| data.expired_ids(cutoff))
            .unwrap_or_default()
    }

    pub(crate) fn count(&self, collection: Collection) -> usize {
        self.data(collection).map_or(0, |data| data.docs.len())
    }

    /// Re-applies a journaled write against this state.
    pub(crate) fn apply(&mut self, entry: &JournalEntry) -> StorageResult<()> {
        match entry {
            JournalEntry::Insert(collection, document) => self
                .data_mut(*collection)
                .insert_prepared(*collection, document.clone()),
            JournalEntry::Replace(collection, id, document) => self
                .data_mut(*collection)
                .replace_prepared(*collection, id, document.clone()),
            JournalEntry::Remove(collection, id) => self.delete(*collection, id),
        }
    }
}
