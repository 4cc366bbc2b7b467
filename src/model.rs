//!
//! beacon entity model
//! -------------------
//! Record types served by the repositories: user accounts and item records
//! (the directory entries observers watch for changes). Each entity embeds
//! a `ByAt` audit stamp by value and declares a closed enumeration of its
//! sortable fields for keyset pagination.
//!
//! Create/update payloads validate their own fields; update payloads carry
//! `Option` fields with partial-merge semantics, so an absent field leaves
//! the stored value untouched.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::repo::{Draft, Patch};
use crate::store::{Entity, SortField, SortValue};

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());
static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+?[\d\s\-().]{6,49}$").unwrap());
static WEBSITE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^https?://\S+$").unwrap());

const MIN_PASSWORD_CHARS: usize = 8;

/// Audit stamp embedded by value in every entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ByAt {
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    #[serde(default)]
    pub created_by: Option<Uuid>,
    #[serde(default)]
    pub modified_by: Option<Uuid>,
}

impl ByAt {
    pub fn stamp(actor: Option<Uuid>) -> Self {
        let now = Utc::now();
        Self { created: now, updated: now, created_by: actor, modified_by: actor }
    }

    pub fn touch(&mut self, actor: Option<Uuid>) {
        self.updated = Utc::now();
        self.modified_by = actor;
    }
}

fn none_if_empty(v: Option<String>) -> Option<String> {
    match v {
        Some(s) if s.trim().is_empty() => None,
        Some(s) => Some(s.trim().to_string()),
        None => None,
    }
}

fn validate_email(raw: &str) -> AppResult<String> {
    let email = raw.trim().to_ascii_lowercase();
    if !EMAIL_RE.is_match(&email) {
        return Err(AppError::validation("email", "not a valid email address"));
    }
    Ok(email)
}

/// Shape-check a phone number and normalize it to digits with an optional
/// leading `+`.
fn validate_phone(raw: &str) -> AppResult<String> {
    let trimmed = raw.trim();
    if !PHONE_RE.is_match(trimmed) {
        return Err(AppError::validation("phone", "please provide a valid phone number"));
    }
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    if !(6..=15).contains(&digits.len()) {
        return Err(AppError::validation("phone", "please provide a valid phone number"));
    }
    Ok(if trimmed.starts_with('+') { format!("+{digits}") } else { digits })
}

fn validate_website(raw: &str) -> AppResult<String> {
    let url = raw.trim();
    if !WEBSITE_RE.is_match(url) {
        return Err(AppError::validation("website", "must be an http(s) URL"));
    }
    Ok(url.to_string())
}

fn validate_password(raw: &str) -> AppResult<()> {
    if raw.chars().count() < MIN_PASSWORD_CHARS {
        return Err(AppError::validation("password", "password should be at least 8 characters"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    /// Stored lowercase; unique across the collection.
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub hashed_password: String,
    pub is_active: bool,
    pub is_verified: bool,
    pub is_superuser: bool,
    #[serde(flatten)]
    pub by_at: ByAt,
}

/// External (read) representation of a user; never exposes the hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserOut {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub is_active: bool,
    pub is_verified: bool,
    pub is_superuser: bool,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl User {
    pub fn to_public(&self) -> UserOut {
        UserOut {
            id: self.id,
            email: self.email.clone(),
            full_name: self.full_name.clone(),
            phone: self.phone.clone(),
            is_active: self.is_active,
            is_verified: self.is_verified,
            is_superuser: self.is_superuser,
            created: self.by_at.created,
            updated: self.by_at.updated,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserSortField {
    Email,
    FullName,
}

impl SortField for UserSortField {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "email" => Some(UserSortField::Email),
            "full_name" => Some(UserSortField::FullName),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            UserSortField::Email => "email",
            UserSortField::FullName => "full_name",
        }
    }

    fn parse_value(self, raw: &str) -> Option<SortValue> {
        match self {
            // emails compare case-insensitively
            UserSortField::Email => Some(SortValue::Text(raw.to_ascii_lowercase())),
            UserSortField::FullName => Some(SortValue::Text(raw.to_string())),
        }
    }
}

impl Entity for User {
    type Sort = UserSortField;
    const DEFAULT_SORT: UserSortField = UserSortField::Email;
    const KIND: &'static str = "user";

    fn id(&self) -> Uuid { self.id }

    fn sort_value(&self, field: UserSortField) -> SortValue {
        match field {
            UserSortField::Email => SortValue::Text(self.email.to_ascii_lowercase()),
            UserSortField::FullName => SortValue::Text(self.full_name.clone().unwrap_or_default()),
        }
    }

    fn touch(&mut self, actor: Option<Uuid>) { self.by_at.touch(actor) }
}

fn default_true() -> bool { true }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCreate {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub is_superuser: bool,
}

impl Draft<User> for UserCreate {
    fn build(self, actor: Option<Uuid>) -> AppResult<User> {
        let email = validate_email(&self.email)?;
        validate_password(&self.password)?;
        let phone = none_if_empty(self.phone).map(|p| validate_phone(&p)).transpose()?;
        let hashed_password = crate::security::hash_password(&self.password)
            .map_err(|e| AppError::internal(e.to_string()))?;
        Ok(User {
            id: Uuid::new_v4(),
            email,
            full_name: none_if_empty(self.full_name),
            phone,
            hashed_password,
            is_active: self.is_active,
            is_verified: self.is_verified,
            is_superuser: self.is_superuser,
            by_at: ByAt::stamp(actor),
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserUpdate {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub is_verified: Option<bool>,
    #[serde(default)]
    pub is_superuser: Option<bool>,
}

impl Patch<User> for UserUpdate {
    fn apply(self, user: &mut User) -> AppResult<()> {
        if let Some(email) = self.email {
            user.email = validate_email(&email)?;
        }
        if let Some(password) = self.password {
            validate_password(&password)?;
            // the plaintext never reaches the store
            user.hashed_password = crate::security::hash_password(&password)
                .map_err(|e| AppError::internal(e.to_string()))?;
        }
        if let Some(full_name) = self.full_name {
            user.full_name = none_if_empty(Some(full_name));
        }
        if let Some(phone) = self.phone {
            user.phone = none_if_empty(Some(phone)).map(|p| validate_phone(&p)).transpose()?;
        }
        if let Some(b) = self.is_active {
            user.is_active = b;
        }
        if let Some(b) = self.is_verified {
            user.is_verified = b;
        }
        if let Some(b) = self.is_superuser {
            user.is_superuser = b;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    /// Unique natural key; the default pagination cursor field.
    pub code: String,
    /// Stored trimmed.
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub municipality: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(flatten)]
    pub by_at: ByAt,
}

/// External (read) representation of an item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemOut {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub address: Option<String>,
    pub region: Option<String>,
    pub municipality: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub website: Option<String>,
    pub phone: Option<String>,
    pub updated: DateTime<Utc>,
}

impl Item {
    pub fn to_public(&self) -> ItemOut {
        ItemOut {
            id: self.id,
            code: self.code.clone(),
            name: self.name.clone(),
            address: self.address.clone(),
            region: self.region.clone(),
            municipality: self.municipality.clone(),
            lat: self.lat,
            lng: self.lng,
            website: self.website.clone(),
            phone: self.phone.clone(),
            updated: self.by_at.updated,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemSortField {
    Code,
    Name,
    Region,
}

impl SortField for ItemSortField {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "code" => Some(ItemSortField::Code),
            "name" => Some(ItemSortField::Name),
            "region" => Some(ItemSortField::Region),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            ItemSortField::Code => "code",
            ItemSortField::Name => "name",
            ItemSortField::Region => "region",
        }
    }

    fn parse_value(self, raw: &str) -> Option<SortValue> {
        Some(SortValue::Text(raw.to_string()))
    }
}

impl Entity for Item {
    type Sort = ItemSortField;
    const DEFAULT_SORT: ItemSortField = ItemSortField::Code;
    const KIND: &'static str = "item";

    fn id(&self) -> Uuid { self.id }

    fn sort_value(&self, field: ItemSortField) -> SortValue {
        match field {
            ItemSortField::Code => SortValue::Text(self.code.clone()),
            ItemSortField::Name => SortValue::Text(self.name.clone()),
            ItemSortField::Region => SortValue::Text(self.region.clone().unwrap_or_default()),
        }
    }

    fn touch(&mut self, actor: Option<Uuid>) { self.by_at.touch(actor) }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemCreate {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub municipality: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl Draft<Item> for ItemCreate {
    fn build(self, actor: Option<Uuid>) -> AppResult<Item> {
        let code = self.code.trim().to_string();
        if code.is_empty() {
            return Err(AppError::validation("code", "code must not be empty"));
        }
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::validation("name", "name must not be empty"));
        }
        let website = none_if_empty(self.website).map(|w| validate_website(&w)).transpose()?;
        let phone = none_if_empty(self.phone).map(|p| validate_phone(&p)).transpose()?;
        Ok(Item {
            id: Uuid::new_v4(),
            code,
            name,
            address: none_if_empty(self.address),
            region: none_if_empty(self.region),
            municipality: none_if_empty(self.municipality),
            lat: self.lat,
            lng: self.lng,
            website,
            phone,
            by_at: ByAt::stamp(actor),
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub municipality: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl Patch<Item> for ItemUpdate {
    fn apply(self, item: &mut Item) -> AppResult<()> {
        if let Some(name) = self.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(AppError::validation("name", "name must not be empty"));
            }
            item.name = name;
        }
        if let Some(address) = self.address {
            item.address = none_if_empty(Some(address));
        }
        if let Some(region) = self.region {
            item.region = none_if_empty(Some(region));
        }
        if let Some(municipality) = self.municipality {
            item.municipality = none_if_empty(Some(municipality));
        }
        if let Some(lat) = self.lat {
            item.lat = Some(lat);
        }
        if let Some(lng) = self.lng {
            item.lng = Some(lng);
        }
        if let Some(website) = self.website {
            item.website = none_if_empty(Some(website)).map(|w| validate_website(&w)).transpose()?;
        }
        if let Some(phone) = self.phone {
            item.phone = none_if_empty(Some(phone)).map(|p| validate_phone(&p)).transpose()?;
        }
        Ok(())
    }
}
