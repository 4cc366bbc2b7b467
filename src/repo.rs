//!
//! beacon repositories
//! -------------------
//! One generic repository carries the pagination and merge logic for every
//! entity type; the entity-specific repositories compose it by delegation
//! and add unique-key lookups and their own create/update behavior (e.g.
//! hashing a password before it is stored). Repositories hold no cross-call
//! state and re-read from the store on every operation.
//!
//! Listing is keyset-paginated: ascending by a validated sort field with
//! the entity id as tiebreak, resuming inclusively from `after_value`.
//! Concurrent updates to the same id are last-commit-wins at the store's
//! isolation level; there is no optimistic-lock versioning here.

use std::marker::PhantomData;

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::identity::{Principal, UserLookup};
use crate::model::{
    Item, ItemCreate, ItemSortField, ItemUpdate, User, UserCreate, UserSortField, UserUpdate,
};
use crate::store::{Entity, SortField, SortValue, Store};

/// Applied when the caller omits `limit`; a caller must not be able to
/// request unbounded results by omission.
pub const DEFAULT_LIST_LIMIT: usize = 500;
/// Server-enforced ceiling on `limit`.
pub const MAX_LIST_LIMIT: usize = 1000;

/// A creation payload: validates itself and builds a fresh entity with a
/// generated id, defaults, and the audit stamp.
pub trait Draft<E>: Send {
    fn build(self, actor: Option<Uuid>) -> AppResult<E>;
}

/// An update payload with partial-merge semantics: only fields present in
/// the patch overwrite the entity, absent fields are left untouched.
pub trait Patch<E>: Send {
    fn apply(self, entity: &mut E) -> AppResult<()>;
}

fn entity_not_found<E: Entity>() -> AppError {
    AppError::not_found(format!("{}_not_found", E::KIND), format!("{} does not exist", E::KIND))
}

/// Generic create/read/update/delete plus keyset-paginated listing over a
/// homogeneous collection of one entity type.
pub struct Repository<E: Entity, S: Store<E>> {
    store: S,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity, S: Store<E> + Clone> Clone for Repository<E, S> {
    fn clone(&self) -> Self { Self { store: self.store.clone(), _entity: PhantomData } }
}

impl<E: Entity, S: Store<E>> Repository<E, S> {
    pub fn new(store: S) -> Self {
        Self { store, _entity: PhantomData }
    }

    pub fn store(&self) -> &S { &self.store }

    pub async fn get(&self, id: Uuid) -> AppResult<E> {
        self.store.fetch(id).await?.ok_or_else(entity_not_found::<E>)
    }

    pub async fn find_by(&self, field: E::Sort, value: &SortValue) -> AppResult<Option<E>> {
        self.store.find_by(field, value).await
    }

    /// Keyset listing. The cursor is validated before the store is touched:
    /// `after_field` must be in the entity's sortable allow-list,
    /// `after_value` must parse as that field's type and requires
    /// `after_field` to be named explicitly. The default sort field applies
    /// only when neither cursor half is supplied.
    pub async fn list(
        &self,
        after_field: Option<&str>,
        after_value: Option<&str>,
        limit: Option<usize>,
    ) -> AppResult<Vec<E>> {
        if after_value.is_some() && after_field.is_none() {
            return Err(AppError::validation(
                "after_field".to_string(),
                "after_field is required when after_value is supplied".to_string(),
            ));
        }
        let field = match after_field {
            Some(name) => E::Sort::parse(name).ok_or_else(|| {
                AppError::validation(
                    "after_field".to_string(),
                    format!("'{name}' is not a sortable {} field", E::KIND),
                )
            })?,
            None => E::DEFAULT_SORT,
        };
        let after = match after_value {
            Some(raw) => Some(field.parse_value(raw).ok_or_else(|| {
                AppError::validation(
                    "after_value".to_string(),
                    format!("'{raw}' is not comparable to {}", field.name()),
                )
            })?),
            None => None,
        };
        let limit = match limit {
            None => DEFAULT_LIST_LIMIT,
            Some(0) => {
                return Err(AppError::validation(
                    "limit".to_string(),
                    "limit must be a positive integer".to_string(),
                ))
            }
            Some(n) => n.min(MAX_LIST_LIMIT),
        };
        debug!(target: "beacon::repo", "list {} by {} after={:?} limit={}", E::KIND, field.name(), after_value, limit);
        self.store.select(field, after.as_ref(), limit).await
    }

    pub async fn create<D: Draft<E>>(&self, draft: D, actor: Option<Uuid>) -> AppResult<E> {
        // build validates everything up front, so a failure persists nothing
        let entity = draft.build(actor)?;
        self.store.put(entity.clone()).await?;
        debug!(target: "beacon::repo", "create {} id={}", E::KIND, entity.id());
        Ok(entity)
    }

    pub async fn update<P: Patch<E>>(&self, id: Uuid, patch: P, actor: Option<Uuid>) -> AppResult<E> {
        let mut entity = self.store.fetch(id).await?.ok_or_else(entity_not_found::<E>)?;
        patch.apply(&mut entity)?;
        entity.touch(actor);
        self.store.put(entity.clone()).await?;
        debug!(target: "beacon::repo", "update {} id={}", E::KIND, id);
        Ok(entity)
    }

    /// Remove and return the entity for caller confirmation. Deleting a
    /// missing (or already deleted) id fails with not-found.
    pub async fn delete(&self, id: Uuid) -> AppResult<E> {
        let removed = self.store.remove(id).await?.ok_or_else(entity_not_found::<E>)?;
        debug!(target: "beacon::repo", "delete {} id={}", E::KIND, id);
        Ok(removed)
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

pub struct UserRepo<S: Store<User>> {
    repo: Repository<User, S>,
}

impl<S: Store<User> + Clone> Clone for UserRepo<S> {
    fn clone(&self) -> Self { Self { repo: self.repo.clone() } }
}

impl<S: Store<User>> UserRepo<S> {
    pub fn new(store: S) -> Self { Self { repo: Repository::new(store) } }

    pub async fn get(&self, id: Uuid) -> AppResult<User> { self.repo.get(id).await }

    pub async fn get_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let needle = SortValue::Text(email.trim().to_ascii_lowercase());
        self.repo.find_by(UserSortField::Email, &needle).await
    }

    pub async fn list(
        &self,
        after_field: Option<&str>,
        after_value: Option<&str>,
        limit: Option<usize>,
    ) -> AppResult<Vec<User>> {
        self.repo.list(after_field, after_value, limit).await
    }

    pub async fn create(&self, draft: UserCreate, actor: Option<Uuid>) -> AppResult<User> {
        if self.get_by_email(&draft.email).await?.is_some() {
            return Err(AppError::conflict("email_taken", "a user with this email already exists"));
        }
        self.repo.create(draft, actor).await
    }

    pub async fn update(&self, id: Uuid, patch: UserUpdate, actor: Option<Uuid>) -> AppResult<User> {
        if let Some(email) = patch.email.as_deref() {
            if let Some(existing) = self.get_by_email(email).await? {
                if existing.id != id {
                    return Err(AppError::conflict("email_taken", "a user with this email already exists"));
                }
            }
        }
        self.repo.update(id, patch, actor).await
    }

    pub async fn delete(&self, id: Uuid) -> AppResult<User> { self.repo.delete(id).await }

    /// Password login used by the token-issuing endpoint.
    pub async fn authenticate_password(&self, email: &str, password: &str) -> AppResult<User> {
        let Some(user) = self.get_by_email(email).await? else {
            warn!(target: "beacon::auth", "login failed: unknown email");
            return Err(AppError::invalid_credentials("bad_login", "email or password is incorrect"));
        };
        if !crate::security::verify_password(&user.hashed_password, password) {
            warn!(target: "beacon::auth", "login failed: password mismatch for {}", user.id);
            return Err(AppError::invalid_credentials("bad_login", "email or password is incorrect"));
        }
        Ok(user)
    }
}

#[async_trait]
impl<S: Store<User>> UserLookup for UserRepo<S> {
    async fn find_principal(&self, id: Uuid) -> AppResult<Option<Principal>> {
        Ok(self.repo.store().fetch(id).await?.map(|u| Principal {
            id: u.id,
            is_active: u.is_active,
            is_superuser: u.is_superuser,
        }))
    }
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

pub struct ItemRepo<S: Store<Item>> {
    repo: Repository<Item, S>,
}

impl<S: Store<Item> + Clone> Clone for ItemRepo<S> {
    fn clone(&self) -> Self { Self { repo: self.repo.clone() } }
}

impl<S: Store<Item>> ItemRepo<S> {
    pub fn new(store: S) -> Self { Self { repo: Repository::new(store) } }

    pub async fn get(&self, id: Uuid) -> AppResult<Item> { self.repo.get(id).await }

    pub async fn get_by_code(&self, code: &str) -> AppResult<Option<Item>> {
        self.repo.find_by(ItemSortField::Code, &SortValue::Text(code.trim().to_string())).await
    }

    pub async fn get_by_name(&self, name: &str) -> AppResult<Option<Item>> {
        self.repo.find_by(ItemSortField::Name, &SortValue::Text(name.trim().to_string())).await
    }

    pub async fn list(
        &self,
        after_field: Option<&str>,
        after_value: Option<&str>,
        limit: Option<usize>,
    ) -> AppResult<Vec<Item>> {
        self.repo.list(after_field, after_value, limit).await
    }

    pub async fn create(&self, draft: ItemCreate, actor: Option<Uuid>) -> AppResult<Item> {
        if self.get_by_code(&draft.code).await?.is_some() {
            return Err(AppError::conflict("code_taken", "an item with this code already exists"));
        }
        if self.get_by_name(&draft.name).await?.is_some() {
            return Err(AppError::conflict("name_taken", "an item with this name already exists"));
        }
        self.repo.create(draft, actor).await
    }

    pub async fn update(&self, id: Uuid, patch: ItemUpdate, actor: Option<Uuid>) -> AppResult<Item> {
        self.repo.update(id, patch, actor).await
    }

    pub async fn delete(&self, id: Uuid) -> AppResult<Item> { self.repo.delete(id).await }
}
