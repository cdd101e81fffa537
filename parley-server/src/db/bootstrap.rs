//! Ordered SQL bootstrap for the messaging schema.
//!
//! Scripts live under `db.bootstrap_path` in one folder per stage. Stages run
//! in a fixed order and files within a stage run by file name, each inside its
//! own transaction. Every script is written to be re-runnable.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, info, warn};

use shared::config::server::DatabaseConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScriptStage {
    Schema,
    Procedures,
    Indexes,
    Seed,
}

impl ScriptStage {
    const ORDERED: [ScriptStage; 4] = [
        ScriptStage::Schema,
        ScriptStage::Procedures,
        ScriptStage::Indexes,
        ScriptStage::Seed,
    ];

    fn folder(self) -> &'static str {
        match self {
            ScriptStage::Schema => "schema",
            ScriptStage::Procedures => "procedures",
            ScriptStage::Indexes => "indexes",
            ScriptStage::Seed => "seed",
        }
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("database bootstrap directory does not exist: {0}")]
    MissingRoot(PathBuf),
    #[error("database bootstrap stage '{stage}' missing at {path}")]
    MissingStage { stage: &'static str, path: PathBuf },
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("database error executing {path}: {source}")]
    Sql {
        path: PathBuf,
        #[source]
        source: sqlx::Error,
    },
}

/// Resolves every stage folder to its ordered script list without touching
/// the database, so layout problems surface before any SQL runs. The `seed`
/// stage is left out entirely unless `include_seed` is set.
fn plan(
    root: &Path,
    include_seed: bool,
) -> Result<Vec<(ScriptStage, Vec<PathBuf>)>, BootstrapError> {
    if !root.is_dir() {
        return Err(BootstrapError::MissingRoot(root.to_path_buf()));
    }

    ScriptStage::ORDERED
        .iter()
        .filter(|&&stage| include_seed || stage != ScriptStage::Seed)
        .map(|&stage| {
            let path = root.join(stage.folder());
            if !path.is_dir() {
                return Err(BootstrapError::MissingStage {
                    stage: stage.folder(),
                    path,
                });
            }
            Ok((stage, collect_sql_files(&path)?))
        })
        .collect()
}

/// Execute all bootstrap SQL scripts in stage order. Returns the number of
/// scripts applied.
pub async fn run(pool: &PgPool, config: &DatabaseConfig) -> Result<usize, BootstrapError> {
    let root = &config.bootstrap_path;
    let stages = plan(root, config.seed_demo_data)?;
    info!(
        path = %root.display(),
        seed = config.seed_demo_data,
        "running database bootstrap"
    );

    let mut applied = 0;
    for (stage, files) in stages {
        if files.is_empty() {
            debug!(stage = stage.folder(), "no bootstrap scripts found for stage");
            continue;
        }

        info!(stage = stage.folder(), count = files.len(), "applying bootstrap scripts");
        for path in files {
            if apply_script(pool, &path, config.statement_timeout_ms).await? {
                applied += 1;
            }
        }
    }

    Ok(applied)
}

/// Simple liveness check used during startup.
pub async fn ensure_liveness(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await.map(|_| ())
}

/// Readiness probe that expects the health procedure from the `procedures` stage.
pub async fn ensure_readiness(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("CALL sp_healthz()")
        .execute(pool)
        .await
        .map(|_| ())
}

fn collect_sql_files(dir: &Path) -> Result<Vec<PathBuf>, BootstrapError> {
    let io_error = |source| BootstrapError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error)? {
        let path = entry.map_err(io_error)?.path();
        let is_sql = path
            .extension()
            .and_then(OsStr::to_str)
            .is_some_and(|ext| ext.eq_ignore_ascii_case("sql"));
        if is_sql && path.is_file() {
            files.push(path);
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

async fn apply_script(
    pool: &PgPool,
    path: &Path,
    statement_timeout_ms: u64,
) -> Result<bool, BootstrapError> {
    let sql = fs::read_to_string(path).map_err(|source| BootstrapError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let trimmed = sql.trim();
    if trimmed.is_empty() {
        warn!(path = %path.display(), "skipping empty bootstrap script");
        return Ok(false);
    }

    let sql_error = |source| BootstrapError::Sql {
        path: path.to_path_buf(),
        source,
    };

    let mut transaction = pool.begin().await.map_err(sql_error)?;
    if statement_timeout_ms > 0 {
        sqlx::query(&format!("SET LOCAL statement_timeout = {statement_timeout_ms}"))
            .execute(&mut *transaction)
            .await
            .map_err(sql_error)?;
    }

    info!(script = %path.display(), "executing bootstrap script");
    sqlx::raw_sql(trimmed)
        .execute(&mut *transaction)
        .await
        .map_err(sql_error)?;

    transaction.commit().await.map_err(sql_error)?;
    Ok(true)
}
