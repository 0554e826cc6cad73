#![forbid(unsafe_code)]
//! LibSQL (local, embedded SQLite) backend for tagstore.
//!
//! [`LibsqlStore`] is the store handle: it owns a single connection to a file
//! or in-memory database, creates and verifies tables from a
//! [`TableSchema`](tagstore_core::TableSchema), and vends
//! [`LibsqlRepository`] instances that share its connection.

mod config;
mod repository;
mod store;

pub use config::StoreConfig;
pub use repository::LibsqlRepository;
pub use store::LibsqlStore;

use std::time::{Duration, Instant};
use tagstore_core::RepoError;

#[cfg(feature = "tracing")]
use tracing::{debug, info, warn};

/// Logging knobs copied out of [`StoreConfig`] into every repository.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Observe {
    pub(crate) slow_threshold: Option<Duration>,
    pub(crate) log_not_found: bool,
}

impl From<&StoreConfig> for Observe {
    fn from(cfg: &StoreConfig) -> Self {
        Self {
            slow_threshold: cfg.slow_threshold,
            log_not_found: cfg.log_not_found,
        }
    }
}

#[inline]
#[allow(unused_variables)]
pub(crate) fn obs_record(
    obs: &Observe,
    op: &str,
    table: &str,
    start: Instant,
    rows: usize,
    err: Option<&RepoError>,
) {
    let elapsed = start.elapsed();
    let elapsed_ms = elapsed.as_millis() as u64;
    let success = err.is_none();
    #[cfg(feature = "tracing")]
    {
        match err {
            Some(e) if e.is_not_found() && !obs.log_not_found => {
                debug!(table = table, op = op, elapsed_ms = elapsed_ms, "repo op: not found");
            }
            Some(e) => {
                warn!(
                    table = table,
                    op = op,
                    elapsed_ms = elapsed_ms,
                    error = %e,
                    "repo op failed"
                );
            }
            None if obs.slow_threshold.is_some_and(|t| elapsed >= t) => {
                warn!(
                    table = table,
                    op = op,
                    rows = rows,
                    elapsed_ms = elapsed_ms,
                    "slow repo op"
                );
            }
            None => {
                info!(
                    table = table,
                    op = op,
                    rows = rows,
                    elapsed_ms = elapsed_ms,
                    success = success,
                    "repo op"
                );
            }
        }
    }
    #[cfg(feature = "metrics")]
    {
        metrics::counter!("repo_ops_total", 1, "op" => op.to_string(), "table" => table.to_string(), "success" => success.to_string());
        metrics::histogram!("repo_op_duration_ms", elapsed_ms as f64, "op" => op.to_string(), "table" => table.to_string());
        if !success {
            metrics::counter!("repo_op_errors_total", 1, "op" => op.to_string(), "table" => table.to_string());
        }
    }
}

/// Map a driver error on a read or write path to the repository taxonomy.
/// SQLite reports every constraint kind (UNIQUE, PRIMARY KEY, NOT NULL, CHECK)
/// as "<KIND> constraint failed: ..."; remote transports use the result-code name.
pub(crate) fn classify(e: libsql::Error) -> RepoError {
    // Primary result code 19 is SQLITE_CONSTRAINT; the extended code lives in the high bits.
    if let libsql::Error::SqliteFailure(code, _) = &e {
        if code & 0xff == 19 {
            return RepoError::constraint(e);
        }
    }
    let msg = e.to_string().to_lowercase();
    if msg.contains("constraint failed") || msg.contains("sqlite_constraint") {
        RepoError::constraint(e)
    } else {
        RepoError::backend(e)
    }
}
