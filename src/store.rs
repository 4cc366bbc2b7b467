//!
//! beacon store collaborator
//! -------------------------
//! The repositories are storage-agnostic: they talk to an injected `Store`
//! with fetch/find/select/put/remove capability and never cache entities
//! across calls. Sorting and keyset filtering are expressed through a
//! closed, per-entity enumeration of sortable fields mapped to explicit
//! value extractors; a field name outside the enumeration is rejected
//! before the store is ever touched.
//!
//! `MemStore` is the in-memory implementation used by the default process
//! and by tests. Its `select` orders ascending by (field value, id) so a
//! cursor stays stable and resumable when the sort field has duplicates.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::AppResult;

/// A comparable cursor value, typed by the sort field it belongs to.
#[derive(Debug, Clone)]
pub enum SortValue {
    Text(String),
    Int(i64),
    Float(f64),
}

impl Ord for SortValue {
    fn cmp(&self, other: &Self) -> Ordering {
        use SortValue::*;
        match (self, other) {
            (Text(a), Text(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Int(a), Float(b)) => (*a as f64).total_cmp(b),
            (Float(a), Int(b)) => a.total_cmp(&(*b as f64)),
            // Mixed text/numeric never happens in practice: the field
            // determines the value type. Order text last for determinism.
            (Text(_), _) => Ordering::Greater,
            (_, Text(_)) => Ordering::Less,
        }
    }
}

impl PartialOrd for SortValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl PartialEq for SortValue {
    fn eq(&self, other: &Self) -> bool { self.cmp(other) == Ordering::Equal }
}

impl Eq for SortValue {}

/// Closed enumeration of the sortable fields of one entity type.
pub trait SortField: Copy + Eq + Send + Sync + 'static {
    /// Resolve a caller-supplied field name, `None` for anything outside
    /// the allow-list.
    fn parse(name: &str) -> Option<Self>;
    fn name(self) -> &'static str;
    /// Parse a raw cursor value as this field's type.
    fn parse_value(self, raw: &str) -> Option<SortValue>;
}

/// A record type the store can hold.
pub trait Entity: Clone + Send + Sync + 'static {
    type Sort: SortField;
    /// Natural key used when the caller names no sort field.
    const DEFAULT_SORT: Self::Sort;
    /// Short type label used in event names and error codes.
    const KIND: &'static str;

    fn id(&self) -> Uuid;
    fn sort_value(&self, field: Self::Sort) -> SortValue;
    /// Refresh the audit stamp after a mutation.
    fn touch(&mut self, actor: Option<Uuid>);
}

/// Record store collaborator. Assumed already connected; owns its own
/// concurrency discipline. Same-id concurrent writes are last-commit-wins
/// at the store's isolation level.
#[async_trait]
pub trait Store<E: Entity>: Send + Sync {
    async fn fetch(&self, id: Uuid) -> AppResult<Option<E>>;
    /// First entity whose `field` value equals `value`, by (value, id) order.
    async fn find_by(&self, field: E::Sort, value: &SortValue) -> AppResult<Option<E>>;
    /// Ascending by (`field`, id); entries with value >= `after` when given;
    /// at most `limit` rows.
    async fn select(&self, field: E::Sort, after: Option<&SortValue>, limit: usize) -> AppResult<Vec<E>>;
    /// Insert or replace by id.
    async fn put(&self, entity: E) -> AppResult<()>;
    async fn remove(&self, id: Uuid) -> AppResult<Option<E>>;
}

/// In-memory store over a shared map.
pub struct MemStore<E> {
    rows: Arc<RwLock<HashMap<Uuid, E>>>,
}

impl<E> Clone for MemStore<E> {
    fn clone(&self) -> Self { Self { rows: Arc::clone(&self.rows) } }
}

impl<E> MemStore<E> {
    pub fn new() -> Self { Self { rows: Arc::new(RwLock::new(HashMap::new())) } }

    pub fn len(&self) -> usize { self.rows.read().len() }

    pub fn is_empty(&self) -> bool { self.rows.read().is_empty() }
}

impl<E> Default for MemStore<E> {
    fn default() -> Self { Self::new() }
}

#[async_trait]
impl<E: Entity> Store<E> for MemStore<E> {
    async fn fetch(&self, id: Uuid) -> AppResult<Option<E>> {
        Ok(self.rows.read().get(&id).cloned())
    }

    async fn find_by(&self, field: E::Sort, value: &SortValue) -> AppResult<Option<E>> {
        let rows = self.rows.read();
        let mut hit: Option<&E> = None;
        for e in rows.values() {
            if e.sort_value(field) == *value {
                match hit {
                    Some(prev) if prev.id() <= e.id() => {}
                    _ => hit = Some(e),
                }
            }
        }
        Ok(hit.cloned())
    }

    async fn select(&self, field: E::Sort, after: Option<&SortValue>, limit: usize) -> AppResult<Vec<E>> {
        let mut out: Vec<E> = self.rows.read().values().cloned().collect();
        if let Some(after) = after {
            out.retain(|e| e.sort_value(field) >= *after);
        }
        // id as secondary key keeps the cursor stable under duplicates
        out.sort_by(|a, b| {
            a.sort_value(field)
                .cmp(&b.sort_value(field))
                .then_with(|| a.id().cmp(&b.id()))
        });
        out.truncate(limit);
        Ok(out)
    }

    async fn put(&self, entity: E) -> AppResult<()> {
        self.rows.write().insert(entity.id(), entity);
        Ok(())
    }

    async fn remove(&self, id: Uuid) -> AppResult<Option<E>> {
        Ok(self.rows.write().remove(&id))
    }
}
