//! End-to-end CRUD check for [`TaggedRecord`].
//!
//! [`run`] walks a fixed sequence against any schema manager and repository:
//! ensure the table, create a record, read it back, persist a change, read the
//! change back, delete it, and confirm the table is empty again. The first
//! failing step aborts the run and is reported in the returned [`VerifyError`].

use std::fmt;

use tagstore_core::{RepoError, Repository, SchemaManager};
use tracing::debug;

use crate::record::{self, TaggedRecord};

/// Owner assigned when the record is created.
pub const INITIAL_OWNER: i64 = 1;
/// Owner the fetched record is changed to before it is persisted.
pub const UPDATED_OWNER: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    EnsureSchema,
    Create,
    FetchCreated,
    Persist,
    FetchPersisted,
    Delete,
    FetchDeleted,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::EnsureSchema => "ensure schema",
            Step::Create => "create",
            Step::FetchCreated => "fetch created record",
            Step::Persist => "persist changed record",
            Step::FetchPersisted => "fetch persisted record",
            Step::Delete => "delete",
            Step::FetchDeleted => "fetch after delete",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// A store operation failed.
    #[error("{step}: {source}")]
    Repo {
        step: Step,
        #[source]
        source: RepoError,
    },
    /// The store answered, but not with what the step expects.
    #[error("{step}: expected {expected}, observed {observed}")]
    Assertion {
        step: Step,
        expected: String,
        observed: String,
    },
}

impl VerifyError {
    pub fn step(&self) -> Step {
        match self {
            VerifyError::Repo { step, .. } | VerifyError::Assertion { step, .. } => *step,
        }
    }

    fn assertion(step: Step, expected: impl fmt::Display, observed: impl fmt::Display) -> Self {
        VerifyError::Assertion {
            step,
            expected: expected.to_string(),
            observed: observed.to_string(),
        }
    }
}

fn at(step: Step) -> impl FnOnce(RepoError) -> VerifyError {
    move |source| VerifyError::Repo { step, source }
}

/// Records observed along a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    /// As returned by the create step.
    pub created: TaggedRecord,
    /// As returned by the persist step.
    pub persisted: TaggedRecord,
}

/// Run the verification sequence. Steps execute strictly in order and the first
/// failure ends the run.
pub async fn run<S, R>(schema: &S, repo: &R) -> Result<Report, VerifyError>
where
    S: SchemaManager + ?Sized,
    R: Repository<TaggedRecord> + ?Sized,
{
    schema
        .ensure_schema(&record::schema())
        .await
        .map_err(at(Step::EnsureSchema))?;

    let seed = TaggedRecord {
        owner_id: INITIAL_OWNER,
        ..TaggedRecord::default()
    };
    let created = repo.insert(&seed).await.map_err(at(Step::Create))?;
    debug!(step = %Step::Create, id = ?created.id, "step ok");

    let fetched = repo.find_first().await.map_err(at(Step::FetchCreated))?;
    let id = match fetched.id {
        Some(id) if created.id == Some(id) => id,
        other => {
            return Err(VerifyError::assertion(
                Step::FetchCreated,
                format!("id {:?}", created.id),
                format!("id {:?}", other),
            ))
        }
    };
    if fetched.created_at.is_none() || fetched.updated_at.is_none() {
        return Err(VerifyError::assertion(
            Step::FetchCreated,
            "created_at and updated_at set",
            format!(
                "created_at {:?}, updated_at {:?}",
                fetched.created_at, fetched.updated_at
            ),
        ));
    }
    if !fetched.same_caller_fields(&created) {
        return Err(VerifyError::assertion(
            Step::FetchCreated,
            format!("{:?}", created),
            format!("{:?}", fetched),
        ));
    }
    debug!(step = %Step::FetchCreated, id, "step ok");

    let mut changed = fetched.clone();
    changed.owner_id = UPDATED_OWNER;
    let persisted = repo.save(&changed).await.map_err(at(Step::Persist))?;
    debug!(step = %Step::Persist, id = ?persisted.id, "step ok");

    let refetched = repo.find_first().await.map_err(at(Step::FetchPersisted))?;
    if refetched.owner_id != UPDATED_OWNER {
        return Err(VerifyError::assertion(
            Step::FetchPersisted,
            format!("owner_id {}", UPDATED_OWNER),
            format!("owner_id {}", refetched.owner_id),
        ));
    }
    if refetched.id != Some(id) {
        return Err(VerifyError::assertion(
            Step::FetchPersisted,
            format!("id {}", id),
            format!("id {:?}", refetched.id),
        ));
    }
    if refetched.updated_at < fetched.updated_at {
        return Err(VerifyError::assertion(
            Step::FetchPersisted,
            format!("updated_at not earlier than {:?}", fetched.updated_at),
            format!("updated_at {:?}", refetched.updated_at),
        ));
    }
    debug!(step = %Step::FetchPersisted, id, "step ok");

    let delete_id = persisted.id.unwrap_or(id);
    let removed = repo
        .delete_by_id(&delete_id)
        .await
        .map_err(at(Step::Delete))?;
    debug!(step = %Step::Delete, id = delete_id, removed, "step ok");

    match repo.find_first().await {
        Err(RepoError::NotFound) => {}
        Ok(stale) => {
            return Err(VerifyError::assertion(
                Step::FetchDeleted,
                "not found",
                format!("record with id {:?}", stale.id),
            ))
        }
        Err(other) => {
            return Err(VerifyError::assertion(
                Step::FetchDeleted,
                "not found",
                format!("error: {}", other),
            ))
        }
    }
    debug!(step = %Step::FetchDeleted, "step ok");

    Ok(Report { created, persisted })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tagstore_core::{async_trait, RepoResult, TableSchema};

    struct NoSchema;

    #[async_trait]
    impl SchemaManager for NoSchema {
        async fn ensure_schema(&self, _schema: &TableSchema) -> RepoResult<()> {
            Ok(())
        }
    }

    /// Which misbehaviour the fake repository should show.
    #[derive(Clone, Copy, PartialEq)]
    enum Fault {
        None,
        IgnoreUpdates,
        IgnoreDeletes,
        BackendErrorAfterDelete,
    }

    struct FakeRepo {
        fault: Fault,
        row: Mutex<Option<TaggedRecord>>,
    }

    impl FakeRepo {
        fn new(fault: Fault) -> Self {
            Self {
                fault,
                row: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl Repository<TaggedRecord> for FakeRepo {
        async fn find_by_id(&self, id: &i64) -> RepoResult<Option<TaggedRecord>> {
            let row = self.row.lock().unwrap().clone();
            Ok(row.filter(|r| r.id == Some(*id)))
        }

        async fn find_first(&self) -> RepoResult<TaggedRecord> {
            let row = self.row.lock().unwrap().clone();
            match row {
                Some(r) => Ok(r),
                None if self.fault == Fault::BackendErrorAfterDelete => Err(RepoError::backend(
                    std::io::Error::new(std::io::ErrorKind::Other, "disk gone"),
                )),
                None => Err(RepoError::NotFound),
            }
        }

        async fn count(&self) -> RepoResult<u64> {
            Ok(self.row.lock().unwrap().is_some() as u64)
        }

        async fn insert(&self, entity: &TaggedRecord) -> RepoResult<TaggedRecord> {
            let mut e = entity.clone();
            e.id = Some(1);
            e.created_at = Some(tagstore_core::timestamp_now());
            e.updated_at = e.created_at;
            *self.row.lock().unwrap() = Some(e.clone());
            Ok(e)
        }

        async fn update(&self, entity: &TaggedRecord) -> RepoResult<TaggedRecord> {
            if self.fault != Fault::IgnoreUpdates {
                *self.row.lock().unwrap() = Some(entity.clone());
            }
            Ok(entity.clone())
        }

        async fn delete_by_id(&self, _id: &i64) -> RepoResult<bool> {
            if self.fault == Fault::IgnoreDeletes {
                return Ok(false);
            }
            Ok(self.row.lock().unwrap().take().is_some())
        }
    }

    #[tokio::test]
    async fn passes_against_a_well_behaved_repository() {
        let report = run(&NoSchema, &FakeRepo::new(Fault::None)).await.unwrap();
        assert_eq!(report.created.owner_id, INITIAL_OWNER);
        assert_eq!(report.persisted.owner_id, UPDATED_OWNER);
        assert_eq!(report.created.id, report.persisted.id);
    }

    #[tokio::test]
    async fn lost_update_fails_the_persisted_fetch() {
        let err = run(&NoSchema, &FakeRepo::new(Fault::IgnoreUpdates))
            .await
            .unwrap_err();
        assert_eq!(err.step(), Step::FetchPersisted);
        assert!(err.to_string().contains("owner_id 100"));
    }

    #[tokio::test]
    async fn stale_row_after_delete_is_an_assertion_failure() {
        let err = run(&NoSchema, &FakeRepo::new(Fault::IgnoreDeletes))
            .await
            .unwrap_err();
        assert_eq!(err.step(), Step::FetchDeleted);
        assert!(matches!(err, VerifyError::Assertion { .. }));
    }

    #[tokio::test]
    async fn other_error_after_delete_is_not_accepted_as_absence() {
        let err = run(&NoSchema, &FakeRepo::new(Fault::BackendErrorAfterDelete))
            .await
            .unwrap_err();
        assert_eq!(err.step(), Step::FetchDeleted);
        assert!(err.to_string().contains("backend error"));
    }

    #[test]
    fn step_names_read_as_phrases() {
        assert_eq!(Step::FetchDeleted.to_string(), "fetch after delete");
        let err = VerifyError::Repo {
            step: Step::Create,
            source: RepoError::NotFound,
        };
        assert_eq!(err.to_string(), "create: entity not found");
    }
}
