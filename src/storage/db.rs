use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use anyhow::{Context, Result, anyhow};
use rusqlite::{Connection, OpenFlags};

use super::migrations;

/// Shared handle to the engine's SQLite database. All stores clone this
/// handle; operations are serialized through the connection mutex.
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl Db {
    pub fn initialize(config_dir: &Path) -> Result<Self> {
        fs::create_dir_all(config_dir)
            .with_context(|| format!("failed to create {}", config_dir.display()))?;

        let db_path = config_dir.join("certkeeper.sqlite");
        let created = !db_path.exists();
        let conn = Connection::open_with_flags(
            &db_path,
            OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )
        .with_context(|| format!("failed to open SQLite database at {}", db_path.display()))?;

        Self::configure_connection(&conn)?;
        migrations::run_all(&conn)?;
        Self::enforce_permissions(&db_path, created)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|err| anyhow!("SQLite connection poisoned: {err}"))
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA foreign_keys = ON;
            "#,
        )?;
        // Ride out transient locks while a previous run is still closing.
        conn.busy_timeout(Duration::from_secs(5))
            .context("failed to set SQLite busy timeout")?;
        Ok(())
    }

    #[cfg(unix)]
    fn enforce_permissions(db_path: &Path, created: bool) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let desired = fs::Permissions::from_mode(0o600);
        if created {
            fs::set_permissions(db_path, desired)?;
        } else {
            let metadata = fs::metadata(db_path)?;
            let current = metadata.permissions();
            if current.mode() & 0o177 != 0 {
                fs::set_permissions(db_path, desired)?;
            }
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn enforce_permissions(_db_path: &Path, _created: bool) -> Result<()> {
        Ok(())
    }
}
