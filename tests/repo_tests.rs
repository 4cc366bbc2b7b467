//! Repository integration tests: keyset pagination with its cursor
//! validation, partial-merge updates, delete semantics and the
//! entity-specific repositories (unique keys, password handling).

use anyhow::Result;

use beacon::error::AppError;
use beacon::model::{Item, ItemCreate, ItemUpdate, User, UserCreate, UserUpdate};
use beacon::repo::{ItemRepo, UserRepo};
use beacon::security::verify_password;
use beacon::store::MemStore;

fn item_draft(code: &str, name: &str) -> ItemCreate {
    ItemCreate {
        code: code.into(),
        name: name.into(),
        address: None,
        region: None,
        municipality: None,
        lat: None,
        lng: None,
        website: None,
        phone: None,
    }
}

fn user_draft(email: &str) -> UserCreate {
    UserCreate {
        email: email.into(),
        password: "s3cr3t-pass".into(),
        full_name: None,
        phone: None,
        is_active: true,
        is_verified: false,
        is_superuser: false,
    }
}

fn items() -> ItemRepo<MemStore<Item>> {
    ItemRepo::new(MemStore::new())
}

fn users() -> UserRepo<MemStore<User>> {
    UserRepo::new(MemStore::new())
}

async fn seed_codes(repo: &ItemRepo<MemStore<Item>>, codes: &[&str]) {
    for code in codes {
        repo.create(item_draft(code, &format!("item {code}")), None)
            .await
            .expect("seed item");
    }
}

#[tokio::test]
async fn keyset_window_is_inclusive_and_ascending() -> Result<()> {
    let repo = items();
    // insertion order deliberately scrambled
    seed_codes(&repo, &["C", "A", "D", "B"]).await;

    let page = repo.list(Some("code"), Some("B"), Some(2)).await?;
    let codes: Vec<&str> = page.iter().map(|i| i.code.as_str()).collect();
    assert_eq!(codes, vec!["B", "C"], "window must start at the cursor value, ascending");
    Ok(())
}

#[tokio::test]
async fn list_defaults_to_the_natural_key() -> Result<()> {
    let repo = items();
    seed_codes(&repo, &["B", "A", "C"]).await;

    let all = repo.list(None, None, None).await?;
    let codes: Vec<&str> = all.iter().map(|i| i.code.as_str()).collect();
    assert_eq!(codes, vec!["A", "B", "C"]);
    Ok(())
}

#[tokio::test]
async fn after_value_without_after_field_is_a_caller_error() {
    let repo = items();
    let err = repo.list(None, Some("B"), None).await.unwrap_err();
    match err {
        AppError::Validation { code, .. } => assert_eq!(code, "after_field"),
        other => panic!("expected validation error, got {other}"),
    }
}

#[tokio::test]
async fn unknown_sort_field_is_rejected_before_the_store() {
    let repo = items();
    let err = repo.list(Some("hashed_password"), None, None).await.unwrap_err();
    assert!(matches!(err, AppError::Validation { .. }), "got {err}");
}

#[tokio::test]
async fn zero_limit_is_rejected() {
    let repo = items();
    let err = repo.list(None, None, Some(0)).await.unwrap_err();
    match err {
        AppError::Validation { code, .. } => assert_eq!(code, "limit"),
        other => panic!("expected validation error, got {other}"),
    }
}

#[tokio::test]
async fn duplicate_sort_values_keep_a_stable_order() -> Result<()> {
    let repo = items();
    repo.create(item_draft("X1", "Clinic"), None).await?;
    repo.create(item_draft("X2", "Clinic"), None).await?;
    repo.create(item_draft("X3", "Apex"), None).await?;

    let first = repo.list(Some("name"), None, None).await?;
    let second = repo.list(Some("name"), None, None).await?;
    let ids1: Vec<_> = first.iter().map(|i| i.id).collect();
    let ids2: Vec<_> = second.iter().map(|i| i.id).collect();
    assert_eq!(ids1, ids2, "duplicate values must order deterministically by id tiebreak");
    assert_eq!(first[0].name, "Apex");
    assert!(first[1].id < first[2].id, "ties break ascending by id");
    Ok(())
}

#[tokio::test]
async fn update_merges_partially() -> Result<()> {
    let repo = items();
    let mut draft = item_draft("GH01", "Y");
    draft.address = Some("Z".into());
    let created = repo.create(draft, None).await?;

    let patch = ItemUpdate { name: Some("X".into()), ..Default::default() };
    let updated = repo.update(created.id, patch, None).await?;
    assert_eq!(updated.name, "X");
    assert_eq!(updated.address.as_deref(), Some("Z"), "absent fields stay untouched");
    assert!(updated.by_at.updated >= created.by_at.updated);
    Ok(())
}

#[tokio::test]
async fn update_of_missing_id_is_not_found() {
    let repo = items();
    let err = repo
        .update(uuid::Uuid::new_v4(), ItemUpdate::default(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound { .. }), "got {err}");
}

#[tokio::test]
async fn failed_update_persists_nothing() -> Result<()> {
    let repo = items();
    let created = repo.create(item_draft("GH01", "Before"), None).await?;

    // name change rides along with an invalid website; neither may land
    let patch = ItemUpdate {
        name: Some("After".into()),
        website: Some("ftp://nope".into()),
        ..Default::default()
    };
    assert!(repo.update(created.id, patch, None).await.is_err());
    let stored = repo.get(created.id).await?;
    assert_eq!(stored.name, "Before", "no partial state after a failed update");
    Ok(())
}

#[tokio::test]
async fn delete_returns_the_entity_and_repeats_fail_cleanly() -> Result<()> {
    let repo = items();
    let created = repo.create(item_draft("GH01", "General"), None).await?;

    let removed = repo.delete(created.id).await?;
    assert_eq!(removed.id, created.id);

    let err = repo.delete(created.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound { .. }), "second delete must fail not-found");
    let err = repo.get(created.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound { .. }));
    Ok(())
}

#[tokio::test]
async fn item_unique_code_and_name_conflict() -> Result<()> {
    let repo = items();
    repo.create(item_draft("GH01", "General"), None).await?;

    let err = repo.create(item_draft("GH01", "Other"), None).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict { .. }), "duplicate code, got {err}");
    let err = repo.create(item_draft("GH02", "General"), None).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict { .. }), "duplicate name, got {err}");
    Ok(())
}

#[tokio::test]
async fn get_by_code_finds_the_record() -> Result<()> {
    let repo = items();
    let created = repo.create(item_draft("GH01", "General"), None).await?;
    let found = repo.get_by_code("GH01").await?.expect("by code");
    assert_eq!(found.id, created.id);
    assert!(repo.get_by_code("NOPE").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn user_create_stores_a_hash_not_the_password() -> Result<()> {
    let repo = users();
    let user = repo.create(user_draft("alice@example.com"), None).await?;
    assert_ne!(user.hashed_password, "s3cr3t-pass");
    assert!(verify_password(&user.hashed_password, "s3cr3t-pass"));
    Ok(())
}

#[tokio::test]
async fn user_email_is_unique_case_insensitively() -> Result<()> {
    let repo = users();
    repo.create(user_draft("alice@example.com"), None).await?;
    let err = repo.create(user_draft("Alice@Example.COM"), None).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict { .. }), "got {err}");
    Ok(())
}

#[tokio::test]
async fn user_update_rehashes_the_password() -> Result<()> {
    let repo = users();
    let user = repo.create(user_draft("alice@example.com"), None).await?;

    let patch = UserUpdate { password: Some("new-password".into()), ..Default::default() };
    repo.update(user.id, patch, None).await?;

    assert!(repo.authenticate_password("alice@example.com", "new-password").await.is_ok());
    assert!(repo.authenticate_password("alice@example.com", "s3cr3t-pass").await.is_err());
    Ok(())
}

#[tokio::test]
async fn password_login_positive_and_negative() -> Result<()> {
    let repo = users();
    let created = repo.create(user_draft("alice@example.com"), None).await?;

    let ok = repo.authenticate_password("Alice@Example.com", "s3cr3t-pass").await?;
    assert_eq!(ok.id, created.id, "email comparison is case-insensitive");

    let err = repo.authenticate_password("alice@example.com", "wrong").await.unwrap_err();
    assert!(matches!(err, AppError::InvalidCredentials { .. }), "got {err}");
    let err = repo.authenticate_password("nobody@example.com", "s3cr3t-pass").await.unwrap_err();
    assert!(matches!(err, AppError::InvalidCredentials { .. }), "got {err}");
    Ok(())
}
