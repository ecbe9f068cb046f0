//! Provides an in memory implementation of [`Store`].
//!
//! Currently this is provided for testing purposes and not designed for use in a production system.
//!
//! It is not optimized instead is designed to be a correct implementation for use in a test setup.
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, RwLock,
};

use async_trait::async_trait;
use tracing::instrument;

use super::{matches::Matches, Filter, Index, Store, StoreError, Update};
use crate::{document::Document, item::ItemId};

/// An in memory implementation of [`Store`].
///
/// Every operation takes a lock over the whole collection, which makes
/// [`Store::find_one_and_update`] trivially atomic.
///
/// **This is not designed for use in a production systems.**
#[derive(Clone, Default, Debug)]
pub struct InMemoryStore {
    documents: Arc<RwLock<Vec<Document>>>,
    indexes: Arc<RwLock<Vec<Index>>>,
    id_counter: Arc<AtomicU64>,
}

impl InMemoryStore {
    /// Creates a new instance of [`InMemoryStore`].
    pub fn new() -> Self {
        Self::default()
    }

    /// The indexes created so far, in creation order.
    pub fn indexes(&self) -> Result<Vec<Index>, StoreError> {
        Ok(self
            .indexes
            .read()
            .map_err(|_| StoreError::BadState)?
            .clone())
    }

    /// A copy of every stored document, in insertion order.
    pub fn documents(&self) -> Result<Vec<Document>, StoreError> {
        Ok(self
            .documents
            .read()
            .map_err(|_| StoreError::BadState)?
            .clone())
    }

    fn next_id(&self) -> ItemId {
        let id = self.id_counter.fetch_add(1, Ordering::SeqCst);
        format!("{id:024x}").into()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    #[instrument(skip(self))]
    async fn find_one_and_update(
        &self,
        filter: &Filter,
        update: &Update,
    ) -> Result<Option<Document>, StoreError> {
        let mut documents = self.documents.write().map_err(|_| StoreError::BadState)?;
        Ok(documents
            .iter_mut()
            .find(|document| filter.matches(document))
            .map(|document| {
                update.apply(document);
                document.clone()
            }))
    }

    #[instrument(skip(self, document))]
    async fn insert_one(&self, document: Document) -> Result<ItemId, StoreError> {
        let mut documents = self.documents.write().map_err(|_| StoreError::BadState)?;
        let id = self.next_id();
        documents.push(document.with_id(id.clone()));
        Ok(id)
    }

    #[instrument(skip(self))]
    async fn delete_one(&self, id: &ItemId) -> Result<u64, StoreError> {
        let mut documents = self.documents.write().map_err(|_| StoreError::BadState)?;
        match documents
            .iter()
            .position(|document| document.id.as_ref() == Some(id))
        {
            Some(position) => {
                documents.remove(position);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    #[instrument(skip(self))]
    async fn count(&self, filter: &Filter) -> Result<u64, StoreError> {
        Ok(self
            .documents
            .read()
            .map_err(|_| StoreError::BadState)?
            .iter()
            .filter(|document| filter.matches(document))
            .count() as u64)
    }

    #[instrument(skip(self))]
    async fn ensure_index(&self, index: &Index) -> Result<(), StoreError> {
        let mut indexes = self.indexes.write().map_err(|_| StoreError::BadState)?;
        if !indexes.iter().any(|existing| existing.name == index.name) {
            indexes.push(index.clone());
        }
        Ok(())
    }
}
