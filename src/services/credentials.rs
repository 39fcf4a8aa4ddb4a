//! Credential store: one session record per device name in an embedded SQLite file.
//!
//! The file is opened for every `load`/`save` and closed again when the call returns,
//! so nothing holds the database between lifecycle events.

use crate::db::models::{NewStoredSession, StoredSession};
use crate::schema;
use crate::session::{SESSION_FORMAT_VERSION, SessionRecord};
use chrono::Utc;
use diesel::SqliteConnection;
use diesel::prelude::*;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use log::{debug, info};
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[derive(Debug)]
pub enum StoreError {
    Connection(String),
    Migration(String),
    Query(diesel::result::Error),
    Encoding(serde_json::Error),
    /// The stored record was written by a newer release.
    UnsupportedVersion { device_name: String, version: i32 },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Connection(e) => write!(f, "opening session store failed: {}", e),
            StoreError::Migration(e) => write!(f, "applying session store migrations failed: {}", e),
            StoreError::Query(e) => write!(f, "session store query failed: {}", e),
            StoreError::Encoding(e) => write!(f, "session record encoding failed: {}", e),
            StoreError::UnsupportedVersion { device_name, version } => write!(
                f,
                "session for {} has format version {} (supported: {})",
                device_name, version, SESSION_FORMAT_VERSION
            ),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StoreError::Query(e) => Some(e),
            StoreError::Encoding(e) => Some(e),
            _ => None,
        }
    }
}

impl From<diesel::result::Error> for StoreError {
    fn from(value: diesel::result::Error) -> Self {
        StoreError::Query(value)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        StoreError::Encoding(value)
    }
}

#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CredentialStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<SqliteConnection, StoreError> {
        let mut conn = SqliteConnection::establish(&self.path.to_string_lossy())
            .map_err(|e| StoreError::Connection(format!("{}: {}", self.path.display(), e)))?;
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        if !applied.is_empty() {
            let names = applied.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
            info!("Initialised session store {} ({})", self.path.display(), names);
        }
        Ok(conn)
    }

    /// Returns `None` when no session exists for the device.
    pub fn load(&self, device_name: &str) -> Result<Option<SessionRecord>, StoreError> {
        use schema::sessions::dsl as S;

        let mut conn = self.open()?;
        let row = S::sessions
            .filter(S::device_name.eq(device_name))
            .select(StoredSession::as_select())
            .first(&mut conn)
            .optional()?;

        let Some(row) = row else {
            debug!("No session stored for {}", device_name);
            return Ok(None);
        };
        if row.format_version > SESSION_FORMAT_VERSION {
            return Err(StoreError::UnsupportedVersion {
                device_name: row.device_name,
                version: row.format_version,
            });
        }
        let record: SessionRecord = serde_json::from_str(&row.record)?;
        debug!("Loaded session for {} (updated {})", device_name, row.updated_at);
        Ok(Some(record))
    }

    /// Replaces whatever is stored for the device with `record`.
    pub fn save(&self, device_name: &str, record: &SessionRecord) -> Result<(), StoreError> {
        use schema::sessions::dsl as S;

        let row = NewStoredSession {
            device_name,
            format_version: SESSION_FORMAT_VERSION,
            record: serde_json::to_string(record)?,
            updated_at: Utc::now().naive_utc(),
        };
        let mut conn = self.open()?;
        diesel::replace_into(S::sessions).values(&row).execute(&mut conn)?;
        debug!("Persisted session for {}", device_name);
        Ok(())
    }
}
