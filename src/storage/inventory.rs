//! Certificate inventory rows backing the SQLite certificate store plugin.

use std::sync::MutexGuard;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::storage::db::Db;
use crate::types::CertificateInfo;

/// Thread-safe access to the `certificate_records` table. Certificates are
/// keyed by thumbprint within a named store.
#[derive(Clone)]
pub struct InventoryStore {
    db: Db,
}

impl InventoryStore {
    pub fn initialize(db: Db) -> Result<Self> {
        Ok(Self { db })
    }

    pub fn find(&self, store_name: &str, thumbprint: &str) -> Result<Option<CertificateInfo>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT thumbprint, hosts, pem, store_name
            FROM certificate_records
            WHERE store_name = ?1 AND thumbprint = ?2
            "#,
        )?;
        let record = stmt
            .query_row(params![store_name, thumbprint], |row| Self::row_to_record(row))
            .optional()?;
        record.map(Self::finish_record).transpose()
    }

    pub fn insert(&self, store_name: &str, certificate: &CertificateInfo) -> Result<()> {
        let conn = self.lock_conn()?;
        let hosts_json = serde_json::to_string(&certificate.hosts)
            .context("failed to serialize certificate hosts")?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO certificate_records (thumbprint, store_name, hosts, pem, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                certificate.thumbprint,
                store_name,
                hosts_json,
                certificate.pem,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn delete(&self, store_name: &str, thumbprint: &str) -> Result<bool> {
        let conn = self.lock_conn()?;
        let removed = conn.execute(
            "DELETE FROM certificate_records WHERE store_name = ?1 AND thumbprint = ?2",
            params![store_name, thumbprint],
        )?;
        Ok(removed > 0)
    }

    fn row_to_record(row: &Row<'_>) -> rusqlite::Result<(String, String, String, String)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
    }

    fn finish_record(
        (thumbprint, hosts_json, pem, store_name): (String, String, String, String),
    ) -> Result<CertificateInfo> {
        let hosts: Vec<String> = serde_json::from_str(&hosts_json)
            .context("failed to parse stored certificate hosts")?;
        Ok(CertificateInfo {
            thumbprint,
            pem,
            hosts,
            store: Some(store_name),
        })
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock_conn()
    }
}
