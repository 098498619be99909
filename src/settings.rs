use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use log::warn;
use rusqlite::{OptionalExtension, params};

use crate::storage::Db;

/// Engine constants, with operator overrides persisted in the preferences
/// table. Defaults: a 60 day renewal window and a 2 s poll interval capped
/// at 4 tries per authorization.
#[derive(Debug, Clone)]
pub struct Settings {
    pub config_dir: PathBuf,
    /// Days between a successful renewal and the next due date.
    pub renewal_days: i64,
    /// Sleep between authorization status polls.
    pub poll_interval: Duration,
    /// Maximum number of status polls per authorization.
    pub poll_max_tries: u32,
    /// Re-use cached certificate bytes for reissues inside this window.
    pub certificate_cache_days: i64,
    /// Store name used when a renewal names neither a central SSL path nor
    /// a certificate store.
    pub default_certificate_store: String,
}

impl Settings {
    pub fn defaults(config_dir: PathBuf) -> Self {
        Self {
            config_dir,
            renewal_days: 60,
            poll_interval: Duration::from_secs(2),
            poll_max_tries: 4,
            certificate_cache_days: 1,
            default_certificate_store: "WebHosting".to_string(),
        }
    }

    /// Builds settings from defaults plus any overrides present in the
    /// preferences table. Unparseable overrides are logged and ignored.
    pub fn load(config_dir: PathBuf, db: &Db) -> Result<Self> {
        let mut settings = Self::defaults(config_dir);
        if let Some(value) = read_preference(db, "renewal_days")? {
            apply_numeric(&mut settings.renewal_days, "renewal_days", &value);
        }
        if let Some(value) = read_preference(db, "poll_interval_secs")? {
            let mut secs = settings.poll_interval.as_secs() as i64;
            apply_numeric(&mut secs, "poll_interval_secs", &value);
            settings.poll_interval = Duration::from_secs(secs.max(0) as u64);
        }
        if let Some(value) = read_preference(db, "poll_max_tries")? {
            let mut tries = settings.poll_max_tries as i64;
            apply_numeric(&mut tries, "poll_max_tries", &value);
            settings.poll_max_tries = tries.clamp(1, i64::from(u32::MAX)) as u32;
        }
        if let Some(value) = read_preference(db, "certificate_cache_days")? {
            apply_numeric(&mut settings.certificate_cache_days, "certificate_cache_days", &value);
        }
        if let Some(value) = read_preference(db, "default_certificate_store")? {
            settings.default_certificate_store = value;
        }
        Ok(settings)
    }
}

fn apply_numeric(slot: &mut i64, name: &str, raw: &str) {
    match raw.trim().parse::<i64>() {
        Ok(parsed) => *slot = parsed,
        Err(err) => warn!("[settings] ignoring preference {name}={raw}: {err}"),
    }
}

fn read_preference(db: &Db, name: &str) -> Result<Option<String>> {
    let conn = db.lock_conn()?;
    let value = conn
        .prepare("SELECT value FROM preferences WHERE name = ?1")?
        .query_row(params![name], |row| row.get::<_, String>(0))
        .optional()?;
    Ok(value)
}

/// Upserts a preference override.
pub fn write_preference(db: &Db, name: &str, value: &str) -> Result<()> {
    let conn = db.lock_conn()?;
    conn.execute(
        r#"
        INSERT INTO preferences (name, value, updated_at)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(name) DO UPDATE
        SET value = excluded.value,
            updated_at = excluded.updated_at
        "#,
        params![name, value, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use uuid::Uuid;

    #[test]
    fn overrides_from_preferences_apply() -> Result<()> {
        let mut dir = std::env::temp_dir();
        dir.push(format!("certkeeper_settings_test_{}", Uuid::new_v4().as_simple()));
        let db = Db::initialize(&dir)?;

        write_preference(&db, "renewal_days", "30")?;
        write_preference(&db, "poll_max_tries", "7")?;
        write_preference(&db, "certificate_cache_days", "not-a-number")?;
        write_preference(&db, "default_certificate_store", "My")?;

        let settings = Settings::load(dir.clone(), &db)?;
        assert_eq!(settings.renewal_days, 30);
        assert_eq!(settings.poll_max_tries, 7);
        // Bad override falls back to the default.
        assert_eq!(settings.certificate_cache_days, 1);
        assert_eq!(settings.default_certificate_store, "My");
        assert_eq!(settings.poll_interval, Duration::from_secs(2));

        fs::remove_dir_all(&dir)?;
        Ok(())
    }
}
