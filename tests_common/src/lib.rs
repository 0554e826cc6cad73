//! Common integration testing utilities and generic tests reusable across backends.

use async_trait::async_trait;
use tagstore::TaggedRecord;
use tagstore_core::{RepoError, RepoResult, Repository};

#[async_trait]
pub trait StoreFactory {
    /// Construct a clean repository connected to a store whose schema is already in place.
    async fn new_record_repo(
        &self,
    ) -> RepoResult<Box<dyn Repository<TaggedRecord> + Send + Sync>>;
}

fn record(owner_id: i64, key: &str) -> TaggedRecord {
    TaggedRecord::new(owner_id, key, format!("value of {}", key))
}

/// Create then fetch-first returns the caller's fields plus the assigned ones.
pub async fn test_round_trip<F: StoreFactory + Sync>(f: &F) -> RepoResult<()> {
    let repo = f.new_record_repo().await?;
    let input = record(1, "color");

    let created = repo.insert(&input).await?;
    assert!(created.id.is_some());
    assert!(created.created_at.is_some() && created.updated_at.is_some());

    let first = repo.find_first().await?;
    assert_eq!(first.id, created.id);
    assert!(first.same_caller_fields(&input));
    assert_eq!(repo.find_by_id(&created.id.unwrap()).await?, Some(first));
    Ok(())
}

/// Persist with a changed field is visible on the next fetch and keeps the id.
pub async fn test_update<F: StoreFactory + Sync>(f: &F) -> RepoResult<()> {
    let repo = f.new_record_repo().await?;
    let created = repo.insert(&record(1, "size")).await?;

    let mut changed = created.clone();
    changed.value = "large".into();
    changed.updated_by = 42;
    let saved = repo.save(&changed).await?;
    assert_eq!(saved.id, created.id);

    let first = repo.find_first().await?;
    assert_eq!(first.value, "large");
    assert_eq!(first.updated_by, 42);
    assert_eq!(first.created_at, created.created_at);
    assert!(first.updated_at >= created.updated_at);
    assert_eq!(repo.count().await?, 1);
    Ok(())
}

/// After a delete the table answers NotFound, never a stale row.
pub async fn test_delete<F: StoreFactory + Sync>(f: &F) -> RepoResult<()> {
    let repo = f.new_record_repo().await?;
    let created = repo.insert(&record(3, "shape")).await?;
    assert!(repo.delete_by_id(&created.id.unwrap()).await?);

    match repo.find_first().await {
        Err(e) => assert!(e.is_not_found(), "expected NotFound, got {:?}", e),
        Ok(stale) => panic!("deleted record still returned: {:?}", stale),
    }
    Ok(())
}

/// A second record with the same (owner_id, key) pair is a constraint violation.
pub async fn test_uniqueness<F: StoreFactory + Sync>(f: &F) -> RepoResult<()> {
    let repo = f.new_record_repo().await?;
    repo.insert(&record(5, "dup")).await?;

    let err = repo
        .insert(&record(5, "dup"))
        .await
        .expect_err("duplicate pair must be rejected");
    assert!(err.is_constraint(), "expected Constraint, got {:?}", err);

    // Same key under another owner is fine.
    repo.insert(&record(6, "dup")).await?;
    assert_eq!(repo.count().await?, 2);
    Ok(())
}

/// Persisting a change that collides with another record's pair is a
/// constraint violation and leaves the stored row untouched.
pub async fn test_persist_uniqueness<F: StoreFactory + Sync>(f: &F) -> RepoResult<()> {
    let repo = f.new_record_repo().await?;
    repo.insert(&record(1, "a")).await?;
    let b = repo.insert(&record(2, "a")).await?;
    let b_id = b.id.unwrap();

    let mut moved = b.clone();
    moved.owner_id = 1;
    let err = repo
        .save(&moved)
        .await
        .expect_err("colliding pair must be rejected");
    assert!(err.is_constraint(), "expected Constraint, got {:?}", err);

    assert_eq!(repo.find_by_id(&b_id).await?, Some(b));
    assert_eq!(repo.count().await?, 2);
    Ok(())
}

/// Deleting an absent id succeeds and reports that nothing was removed.
pub async fn test_idempotent_delete<F: StoreFactory + Sync>(f: &F) -> RepoResult<()> {
    let repo = f.new_record_repo().await?;
    assert!(!repo.delete_by_id(&12345).await?);

    let created = repo.insert(&record(7, "once")).await?;
    let id = created.id.unwrap();
    assert!(repo.delete_by_id(&id).await?);
    assert!(!repo.delete_by_id(&id).await?);
    Ok(())
}

/// The seed scenario: owner 1 becomes owner 100 under id 1, then disappears.
pub async fn test_seed_scenario<F: StoreFactory + Sync>(f: &F) -> RepoResult<()> {
    let repo = f.new_record_repo().await?;
    repo.insert(&TaggedRecord {
        owner_id: 1,
        ..TaggedRecord::default()
    })
    .await?;

    let mut first = repo.find_first().await?;
    assert_eq!((first.id, first.owner_id), (Some(1), 1));

    first.owner_id = 100;
    repo.save(&first).await?;
    let again = repo.find_first().await?;
    assert_eq!((again.id, again.owner_id), (Some(1), 100));

    repo.delete_by_id(&1).await?;
    assert!(matches!(repo.find_first().await, Err(RepoError::NotFound)));
    Ok(())
}

/// Every scenario above, each on a fresh repository.
pub async fn run_all<F: StoreFactory + Sync>(f: &F) -> RepoResult<()> {
    test_round_trip(f).await?;
    test_update(f).await?;
    test_delete(f).await?;
    test_uniqueness(f).await?;
    test_persist_uniqueness(f).await?;
    test_idempotent_delete(f).await?;
    test_seed_scenario(f).await?;
    Ok(())
}
