//! PostgreSQL store for review rows
//!
//! The processor owns a single connection: one message is handled at a time,
//! so a pool would never hand out a second one.

use async_trait::async_trait;
use ketl_common::retry::{retry_with_fixed_delay, RetryPolicy};
use ketl_common::{KetlError, Result as KetlResult};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::extract::RelationalRow;

/// Schema applied at startup when no `DDL_PATH` is given.
pub const EMBEDDED_DDL: &str = include_str!("../../ddl/review.sql");

/// Host used when the URL is assembled from `POSTGRES_*` variables.
pub const DEFAULT_POSTGRES_HOST: &str = "psql_service";

/// Upper bound on a single connection attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const INSERT_REVIEW: &str = "INSERT INTO review (id, brand, model, production_year, \
     policy_holder_name, address, post_code, state, city, country, currency, total_cost, \
     time_of_accident, estimate, raw) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)";

/// Store unreachable at startup
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("Database configuration error: {0}. Check DATABASE_URL or POSTGRES_* settings.")]
    Config(String),

    #[error("Database connection failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Database connection attempt timed out after {0:?}")]
    Timeout(Duration),
}

/// Failure writing to the store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistError {
    /// The connection is unusable; the processor cannot continue
    #[error("Database connection lost: {0}")]
    Connection(String),

    /// The statement was rejected; other rows may still succeed
    #[error("Database rejected statement: {0}")]
    Statement(String),

    #[error("Database connection already closed")]
    Closed,
}

impl PersistError {
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, PersistError::Connection(_) | PersistError::Closed)
    }
}

impl From<sqlx::Error> for PersistError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => PersistError::Connection(err.to_string()),
            _ => PersistError::Statement(err.to_string()),
        }
    }
}

/// Connection settings for the store
#[derive(Clone)]
pub struct DatabaseConfig {
    pub source: DatabaseSource,
    pub connect_timeout: Duration,
    pub retry: RetryPolicy,
}

/// Where the connection parameters come from
#[derive(Clone)]
pub enum DatabaseSource {
    Url(String),
    Parts {
        host: String,
        user: String,
        password: String,
        database: String,
    },
}

impl std::fmt::Debug for DatabaseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseSource::Url(_) => f.debug_tuple("Url").field(&"***").finish(),
            DatabaseSource::Parts {
                host,
                user,
                database,
                ..
            } => f
                .debug_struct("Parts")
                .field("host", host)
                .field("user", user)
                .field("password", &"***")
                .field("database", database)
                .finish(),
        }
    }
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("source", &self.source)
            .field("connect_timeout", &self.connect_timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

impl DatabaseConfig {
    /// Read `DATABASE_URL`, falling back to `POSTGRES_USER`,
    /// `POSTGRES_PASSWORD`, `POSTGRES_HOST` and `POSTGRES_DB`
    pub fn from_env() -> KetlResult<Self> {
        let source = match std::env::var("DATABASE_URL") {
            Ok(url) => DatabaseSource::Url(url),
            Err(_) => {
                let require = |name: &str| {
                    std::env::var(name).map_err(|_| {
                        KetlError::config(format!("Neither DATABASE_URL nor {name} is set"))
                    })
                };
                DatabaseSource::Parts {
                    host: std::env::var("POSTGRES_HOST")
                        .unwrap_or_else(|_| DEFAULT_POSTGRES_HOST.to_string()),
                    user: require("POSTGRES_USER")?,
                    password: require("POSTGRES_PASSWORD")?,
                    database: require("POSTGRES_DB")?,
                }
            },
        };

        let max_attempts = std::env::var("DB_CONNECT_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(ketl_common::retry::DEFAULT_MAX_ATTEMPTS);

        let delay = std::env::var("DB_CONNECT_RETRY_DELAY_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(ketl_common::retry::DEFAULT_RETRY_DELAY);

        Ok(Self {
            source,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            retry: RetryPolicy::new(max_attempts, delay),
        })
    }

    pub fn validate(&self) -> KetlResult<()> {
        match &self.source {
            DatabaseSource::Url(url) if url.trim().is_empty() => {
                Err(KetlError::config("DATABASE_URL cannot be empty"))
            },
            DatabaseSource::Parts { host, database, .. }
                if host.trim().is_empty() || database.trim().is_empty() =>
            {
                Err(KetlError::config("POSTGRES_HOST and POSTGRES_DB cannot be empty"))
            },
            _ => Ok(()),
        }
    }

    pub fn connect_options(&self) -> Result<PgConnectOptions, ConnectError> {
        match &self.source {
            DatabaseSource::Url(url) => url
                .parse::<PgConnectOptions>()
                .map_err(|e| ConnectError::Config(e.to_string())),
            DatabaseSource::Parts {
                host,
                user,
                password,
                database,
            } => Ok(PgConnectOptions::new()
                .host(host)
                .username(user)
                .password(password)
                .database(database)),
        }
    }
}

/// Read the DDL script from `path`, or use the embedded one
pub fn load_ddl(path: Option<&Path>) -> std::io::Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path),
        None => Ok(EMBEDDED_DDL.to_string()),
    }
}

/// Durable destination for review rows
#[async_trait]
pub trait ReviewStore: Send {
    /// Apply the DDL script in one transaction
    async fn ensure_schema(&mut self) -> Result<(), PersistError>;

    /// Insert one row in its own transaction
    async fn persist(&mut self, row: &RelationalRow) -> Result<(), PersistError>;

    async fn close(&mut self);
}

/// [`ReviewStore`] over a single PostgreSQL connection
pub struct PgReviewStore {
    conn: Option<PgConnection>,
    ddl: String,
}

impl PgReviewStore {
    /// Connect, retrying per the configured policy
    pub async fn connect(config: &DatabaseConfig, ddl: String) -> Result<Self, ConnectError> {
        let options = config.connect_options()?;
        let options = &options;
        let connect_timeout = config.connect_timeout;

        let conn = retry_with_fixed_delay(
            config.retry,
            |e: &ConnectError| !matches!(e, ConnectError::Config(_)),
            move || async move {
                match tokio::time::timeout(connect_timeout, PgConnection::connect_with(options)).await
                {
                    Ok(result) => result.map_err(ConnectError::from),
                    Err(_) => Err(ConnectError::Timeout(connect_timeout)),
                }
            },
        )
        .await?;

        info!("Database connection established");

        Ok(Self::from_connection(conn, ddl))
    }

    pub fn from_connection(conn: PgConnection, ddl: String) -> Self {
        Self {
            conn: Some(conn),
            ddl,
        }
    }
}

#[async_trait]
impl ReviewStore for PgReviewStore {
    async fn ensure_schema(&mut self) -> Result<(), PersistError> {
        let conn = self.conn.as_mut().ok_or(PersistError::Closed)?;

        let mut tx = conn.begin().await?;
        sqlx::Executor::execute(&mut *tx, sqlx::raw_sql(&self.ddl)).await?;
        tx.commit().await?;

        info!("Store schema ensured");
        Ok(())
    }

    async fn persist(&mut self, row: &RelationalRow) -> Result<(), PersistError> {
        let conn = self.conn.as_mut().ok_or(PersistError::Closed)?;

        let mut tx = conn.begin().await?;
        sqlx::query(INSERT_REVIEW)
            .bind(&row.id)
            .bind(&row.brand)
            .bind(&row.model)
            .bind(&row.production_year)
            .bind(&row.policy_holder_name)
            .bind(&row.address)
            .bind(&row.post_code)
            .bind(&row.state)
            .bind(&row.city)
            .bind(&row.country)
            .bind(&row.currency)
            .bind(row.total_cost)
            .bind(&row.time_of_accident)
            .bind(&row.estimate)
            .bind(&row.raw)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(())
    }

    async fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            match conn.close().await {
                Ok(()) => info!("Database connection closed"),
                Err(e) => warn!(error = %e, "Error while closing database connection"),
            }
        }
    }
}
