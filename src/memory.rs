//! In-memory [`SearchIndex`] and [`DocumentRepository`].
//!
//! Documents are kept behind `std::sync::RwLock`, keyed by `(index, id)`, so
//! writes are upserts exactly like a real search index. The repository view
//! reads back content documents by harvest source URI, which lets repeated
//! cycles against the same instance exercise identity reuse and change
//! detection.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use crate::model::{ContentDocument, IndexDocument, IndexItem, ItemOutcome};
use crate::traits::{DocumentRepository, IndexError, RepositoryError, SearchIndex};

pub struct InMemoryIndex {
    indices: RwLock<BTreeSet<String>>,
    documents: RwLock<HashMap<(String, String), IndexDocument>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            indices: RwLock::new(BTreeSet::new()),
            documents: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, index: &str, id: &str) -> Option<IndexDocument> {
        self.documents
            .read()
            .ok()?
            .get(&(index.to_string(), id.to_string()))
            .cloned()
    }

    /// Number of documents stored in `index`.
    pub fn count(&self, index: &str) -> usize {
        self.documents
            .read()
            .map(|docs| docs.keys().filter(|(i, _)| i == index).count())
            .unwrap_or(0)
    }

    /// All documents stored in `index`, ordered by id.
    pub fn documents(&self, index: &str) -> Vec<(String, IndexDocument)> {
        let Ok(docs) = self.documents.read() else {
            return Vec::new();
        };
        let mut found: Vec<_> = docs
            .iter()
            .filter(|((i, _), _)| i == index)
            .map(|((_, id), doc)| (id.clone(), doc.clone()))
            .collect();
        found.sort_by(|a, b| a.0.cmp(&b.0));
        found
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<E>(_: E) -> IndexError {
    IndexError::Transport("in-memory index lock poisoned".to_string())
}

#[async_trait]
impl SearchIndex for InMemoryIndex {
    async fn index_exists(&self, name: &str) -> Result<bool, IndexError> {
        Ok(self.indices.read().map_err(poisoned)?.contains(name))
    }

    async fn create_index(&self, name: &str) -> Result<(), IndexError> {
        self.indices.write().map_err(poisoned)?.insert(name.to_string());
        Ok(())
    }

    async fn bulk_upsert(&self, items: &[IndexItem]) -> Result<Vec<ItemOutcome>, IndexError> {
        let indices = self.indices.read().map_err(poisoned)?;
        let mut documents = self.documents.write().map_err(poisoned)?;

        Ok(items
            .iter()
            .map(|item| {
                if !indices.contains(&item.index) {
                    return ItemOutcome::Failed {
                        reason: format!("index_not_found: {}", item.index),
                    };
                }
                documents.insert(
                    (item.index.clone(), item.id.clone()),
                    item.document.clone(),
                );
                ItemOutcome::Indexed
            })
            .collect())
    }
}

#[async_trait]
impl DocumentRepository for InMemoryIndex {
    async fn find_by_harvest_source_uri(
        &self,
        harvest_source_uri: &str,
    ) -> Result<Option<ContentDocument>, RepositoryError> {
        let documents = self
            .documents
            .read()
            .map_err(|_| RepositoryError::Unavailable("in-memory index lock poisoned".to_string()))?;

        Ok(documents.values().find_map(|doc| match doc {
            IndexDocument::Content(content) if content.harvest_source_uri == harvest_source_uri => {
                Some(content.clone())
            }
            _ => None,
        }))
    }
}
