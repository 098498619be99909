//! The renewal registry.
//!
//! Persists the set of scheduled renewals in SQLite and answers the two
//! questions the engine asks: "is there already a record for this target?"
//! and "which records exist right now?". At most one row exists per target
//! identity (primary host plus plugin coordinates); saving against an
//! existing identity replaces the row in place.

use std::path::PathBuf;
use std::sync::MutexGuard;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use rusqlite::{Connection, Row, params};
use uuid::Uuid;

use crate::storage::db::Db;
use crate::types::{RenewResult, ScheduledRenewal, Target};

/// SQLite-backed registry of scheduled renewals.
#[derive(Clone)]
pub struct RenewalStore {
    db: Db,
    /// Days until a freshly renewed certificate is due again.
    renewal_days: i64,
}

impl RenewalStore {
    pub fn initialize(db: Db, renewal_days: i64) -> Result<Self> {
        Ok(Self { db, renewal_days })
    }

    /// Locates the record whose target identity matches `target`.
    pub fn find(&self, target: &Target) -> Result<Option<ScheduledRenewal>> {
        let conn = self.lock_conn()?;
        Self::find_with_conn(&conn, target)
    }

    /// Persists a renewal together with the outcome of its latest attempt.
    /// A successful outcome clears the new flag, stamps the run and moves
    /// the due date one renewal window ahead.
    pub fn save(&self, renewal: &mut ScheduledRenewal, result: &RenewResult) -> Result<()> {
        if renewal.binding.target_plugin.is_empty() || renewal.binding.validation_plugin.is_empty()
        {
            return Err(anyhow!(
                "refusing to persist renewal for {} without plugin coordinates",
                renewal.binding.primary_host
            ));
        }

        if result.success {
            renewal.is_new = false;
            renewal.last_run = Some(result.date);
            renewal.due_date = Some(result.date + Duration::days(self.renewal_days));
            if result.thumbprint.is_some() {
                renewal.certificate_thumbprint = result.thumbprint.clone();
            }
        }

        let conn = self.lock_conn()?;
        let existing_id = Self::find_row_id(&conn, &renewal.binding)?;
        let id = existing_id.unwrap_or_else(|| format!("renewal_{}", Uuid::new_v4().as_simple()));
        let now = Utc::now().to_rfc3339();
        let target_json = serde_json::to_string(&renewal.binding)
            .context("failed to serialize renewal target")?;
        let installation_json = serde_json::to_string(&renewal.installation_plugin_names)
            .context("failed to serialize installation plugin list")?;
        let result_json =
            serde_json::to_string(result).context("failed to serialize renew result")?;

        conn.execute(
            r#"
            INSERT INTO scheduled_renewals (
                id, primary_host, target_plugin, validation_plugin, target_json,
                last_run, due_date, is_new, test_mode, script, script_parameters,
                central_ssl_store, certificate_store, keep_existing,
                installation_plugins, warmup, certificate_thumbprint,
                last_result_json, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?19)
            ON CONFLICT(id) DO UPDATE SET
                primary_host = excluded.primary_host,
                target_plugin = excluded.target_plugin,
                validation_plugin = excluded.validation_plugin,
                target_json = excluded.target_json,
                last_run = excluded.last_run,
                due_date = excluded.due_date,
                is_new = excluded.is_new,
                test_mode = excluded.test_mode,
                script = excluded.script,
                script_parameters = excluded.script_parameters,
                central_ssl_store = excluded.central_ssl_store,
                certificate_store = excluded.certificate_store,
                keep_existing = excluded.keep_existing,
                installation_plugins = excluded.installation_plugins,
                warmup = excluded.warmup,
                certificate_thumbprint = excluded.certificate_thumbprint,
                last_result_json = excluded.last_result_json,
                updated_at = excluded.updated_at
            "#,
            params![
                id,
                renewal.binding.primary_host,
                renewal.binding.target_plugin,
                renewal.binding.validation_plugin,
                target_json,
                renewal.last_run.map(|t| t.to_rfc3339()),
                renewal.due_date.map(|t| t.to_rfc3339()),
                renewal.is_new as i64,
                renewal.test_mode as i64,
                renewal.script.as_ref().map(|p| p.display().to_string()),
                renewal.script_parameters,
                renewal
                    .central_ssl_store
                    .as_ref()
                    .map(|p| p.display().to_string()),
                renewal.certificate_store,
                renewal.keep_existing.map(|b| b as i64),
                installation_json,
                renewal.warmup as i64,
                renewal.certificate_thumbprint,
                result_json,
                now
            ],
        )?;

        debug!(
            "[registry] saved renewal for {} (success={}, due={:?})",
            renewal.binding.primary_host, result.success, renewal.due_date
        );
        Ok(())
    }

    /// Removes the record matching the renewal's target identity.
    pub fn cancel(&self, renewal: &ScheduledRenewal) -> Result<()> {
        let conn = self.lock_conn()?;
        let removed = conn.execute(
            r#"
            DELETE FROM scheduled_renewals
            WHERE primary_host = ?1 AND target_plugin = ?2 AND validation_plugin = ?3
            "#,
            params![
                renewal.binding.primary_host,
                renewal.binding.target_plugin,
                renewal.binding.validation_plugin
            ],
        )?;
        if removed == 0 {
            return Err(anyhow!(
                "no scheduled renewal found for {}",
                renewal.binding.primary_host
            ));
        }
        info!("[registry] cancelled renewal for {}", renewal.binding.primary_host);
        Ok(())
    }

    /// Snapshot of all scheduled records, stable across reads within a run.
    pub fn renewals(&self) -> Result<Vec<ScheduledRenewal>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT target_json, last_run, due_date, is_new, test_mode, script,
                   script_parameters, central_ssl_store, certificate_store,
                   keep_existing, installation_plugins, warmup, certificate_thumbprint
            FROM scheduled_renewals
            ORDER BY created_at ASC
            "#,
        )?;

        let mut rows = stmt.query([])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(Self::row_to_record(row)?);
        }
        Ok(records)
    }

    fn find_with_conn(conn: &Connection, target: &Target) -> Result<Option<ScheduledRenewal>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT target_json, last_run, due_date, is_new, test_mode, script,
                   script_parameters, central_ssl_store, certificate_store,
                   keep_existing, installation_plugins, warmup, certificate_thumbprint
            FROM scheduled_renewals
            WHERE primary_host = ?1 AND target_plugin = ?2 AND validation_plugin = ?3
            "#,
        )?;

        let mut rows = stmt.query(params![
            target.primary_host,
            target.target_plugin,
            target.validation_plugin
        ])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::row_to_record(row)?))
        } else {
            Ok(None)
        }
    }

    fn find_row_id(conn: &Connection, target: &Target) -> Result<Option<String>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT id FROM scheduled_renewals
            WHERE primary_host = ?1 AND target_plugin = ?2 AND validation_plugin = ?3
            "#,
        )?;
        let mut rows = stmt.query(params![
            target.primary_host,
            target.target_plugin,
            target.validation_plugin
        ])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row.get(0)?))
        } else {
            Ok(None)
        }
    }

    fn row_to_record(row: &Row<'_>) -> Result<ScheduledRenewal> {
        let target_json: String = row.get(0)?;
        let binding: Target =
            serde_json::from_str(&target_json).context("failed to parse stored target")?;
        let installation_json: String = row.get(10)?;
        let installation_plugin_names: Vec<String> = serde_json::from_str(&installation_json)
            .context("failed to parse stored installation plugin list")?;

        Ok(ScheduledRenewal {
            binding,
            last_run: parse_timestamp(row.get::<_, Option<String>>(1)?)?,
            due_date: parse_timestamp(row.get::<_, Option<String>>(2)?)?,
            is_new: row.get::<_, i64>(3)? != 0,
            updated: false,
            test_mode: row.get::<_, i64>(4)? != 0,
            script: row.get::<_, Option<String>>(5)?.map(PathBuf::from),
            script_parameters: row.get(6)?,
            central_ssl_store: row.get::<_, Option<String>>(7)?.map(PathBuf::from),
            certificate_store: row.get(8)?,
            keep_existing: row.get::<_, Option<i64>>(9)?.map(|v| v != 0),
            installation_plugin_names,
            warmup: row.get::<_, i64>(11)? != 0,
            certificate_thumbprint: row.get(12)?,
        })
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock_conn()
    }
}

fn parse_timestamp(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    match raw {
        None => Ok(None),
        Some(text) => Ok(Some(
            DateTime::parse_from_rfc3339(&text)
                .map(|dt| dt.with_timezone(&Utc))
                .context("failed to parse stored timestamp")?,
        )),
    }
}
