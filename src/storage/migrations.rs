use anyhow::{Context, Result};
use rusqlite::Connection;

/// Runs all schema creation and migrations for the engine database.
pub fn run_all(conn: &Connection) -> Result<()> {
    create_tables(conn)?;
    migrate_tables(conn)?;
    Ok(())
}

fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS scheduled_renewals (
            id TEXT PRIMARY KEY,
            primary_host TEXT NOT NULL,
            target_plugin TEXT NOT NULL,
            validation_plugin TEXT NOT NULL,
            target_json TEXT NOT NULL,
            last_run TEXT,
            due_date TEXT,
            is_new INTEGER NOT NULL DEFAULT 1,
            test_mode INTEGER NOT NULL DEFAULT 0,
            script TEXT,
            script_parameters TEXT,
            central_ssl_store TEXT,
            certificate_store TEXT,
            keep_existing INTEGER,
            installation_plugins TEXT NOT NULL DEFAULT '[]',
            warmup INTEGER NOT NULL DEFAULT 0,
            certificate_thumbprint TEXT,
            last_result_json TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS certificate_records (
            thumbprint TEXT NOT NULL,
            store_name TEXT NOT NULL,
            hosts TEXT NOT NULL,
            pem TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (thumbprint, store_name)
        );

        CREATE TABLE IF NOT EXISTS preferences (
            name TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

fn migrate_tables(conn: &Connection) -> Result<()> {
    ensure_columns(conn, "scheduled_renewals", &[
        ("last_result_json", "ALTER TABLE scheduled_renewals ADD COLUMN last_result_json TEXT"),
        ("warmup", "ALTER TABLE scheduled_renewals ADD COLUMN warmup INTEGER NOT NULL DEFAULT 0"),
        (
            "certificate_thumbprint",
            "ALTER TABLE scheduled_renewals ADD COLUMN certificate_thumbprint TEXT",
        ),
    ])?;
    Ok(())
}

fn ensure_columns(conn: &Connection, table: &str, alters: &[(&str, &str)]) -> Result<()> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .with_context(|| format!("failed to introspect table {table}"))?;
    let mut rows = stmt.query([])?;
    let mut existing = Vec::new();
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        existing.push(name);
    }

    for (column, alter_sql) in alters {
        if !existing.iter().any(|c| c == column) {
            conn.execute(alter_sql, [])
                .with_context(|| format!("failed to apply migration for {table}.{column}"))?;
        }
    }

    Ok(())
}
