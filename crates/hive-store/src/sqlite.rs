//! SQLite gateway implementation.
//!
//! rusqlite behind an r2d2 pool. Every new connection gets WAL mode, a busy
//! timeout, and foreign keys via a pragma customizer. Set/map fields are
//! stored as JSON text columns; timestamps as fixed-width RFC 3339 strings
//! so staleness comparisons can happen in SQL.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use hive_core::{AuthToken, PluginDefinition, PluginId, PluginInstance, PluginStatus, SessionId};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, params};

use crate::errors::{Result, StoreError};
use crate::store::PluginStore;

type ConnectionPool = Pool<SqliteConnectionManager>;
type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS plugin_definitions (
    id            TEXT PRIMARY KEY,
    version       TEXT NOT NULL,
    api_version   TEXT NOT NULL,
    depends_on    TEXT NOT NULL,
    capabilities  TEXT NOT NULL,
    enabled       INTEGER NOT NULL,
    metadata      TEXT NOT NULL,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS plugin_instances (
    id             TEXT PRIMARY KEY,
    definition_id  TEXT NOT NULL,
    status         TEXT NOT NULL,
    enabled        INTEGER NOT NULL,
    auth_token     TEXT NOT NULL,
    last_heartbeat TEXT,
    started_at     TEXT NOT NULL,
    metadata       TEXT NOT NULL,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_instances_definition ON plugin_instances(definition_id);
CREATE INDEX IF NOT EXISTS idx_instances_status ON plugin_instances(status);
";

#[derive(Debug)]
struct PragmaCustomizer;

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for PragmaCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;\
             PRAGMA busy_timeout = 5000;\
             PRAGMA foreign_keys = ON;\
             PRAGMA synchronous = NORMAL;",
        )
    }
}

/// Fixed-width RFC 3339 (UTC, microseconds) so string comparison in SQL
/// matches chronological order.
fn ts_to_sql(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn ts_from_sql(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

/// Columns of a definition row, fetched raw and decoded outside the
/// rusqlite row closure.
struct DefinitionRow {
    id: String,
    version: String,
    api_version: String,
    depends_on: String,
    capabilities: String,
    enabled: bool,
    metadata: String,
    created_at: String,
    updated_at: String,
}

impl DefinitionRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            version: row.get(1)?,
            api_version: row.get(2)?,
            depends_on: row.get(3)?,
            capabilities: row.get(4)?,
            enabled: row.get(5)?,
            metadata: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn decode(self) -> Result<PluginDefinition> {
        Ok(PluginDefinition {
            id: PluginId::from(self.id),
            version: self.version,
            api_version: self.api_version,
            depends_on: serde_json::from_str(&self.depends_on)?,
            capabilities: serde_json::from_str(&self.capabilities)?,
            enabled: self.enabled,
            metadata: serde_json::from_str(&self.metadata)?,
            created_at: ts_from_sql(&self.created_at)?,
            updated_at: ts_from_sql(&self.updated_at)?,
        })
    }
}

struct InstanceRow {
    id: String,
    definition_id: String,
    status: String,
    enabled: bool,
    auth_token: String,
    last_heartbeat: Option<String>,
    started_at: String,
    metadata: String,
    created_at: String,
    updated_at: String,
}

impl InstanceRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            definition_id: row.get(1)?,
            status: row.get(2)?,
            enabled: row.get(3)?,
            auth_token: row.get(4)?,
            last_heartbeat: row.get(5)?,
            started_at: row.get(6)?,
            metadata: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn decode(self) -> Result<PluginInstance> {
        let status = self
            .status
            .parse::<PluginStatus>()
            .map_err(StoreError::Backend)?;
        Ok(PluginInstance {
            id: SessionId::from(self.id),
            definition_id: PluginId::from(self.definition_id),
            status,
            enabled: self.enabled,
            auth_token: AuthToken::from(self.auth_token),
            last_heartbeat: self.last_heartbeat.as_deref().map(ts_from_sql).transpose()?,
            started_at: ts_from_sql(&self.started_at)?,
            metadata: serde_json::from_str(&self.metadata)?,
            created_at: ts_from_sql(&self.created_at)?,
            updated_at: ts_from_sql(&self.updated_at)?,
        })
    }
}

/// File-backed gateway over a pooled SQLite database.
pub struct SqliteStore {
    pool: ConnectionPool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and run migrations.
    pub fn open(path: &Path) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder()
            .max_size(8)
            .connection_timeout(std::time::Duration::from_secs(5))
            .connection_customizer(Box::new(PragmaCustomizer))
            .build(manager)?;
        let store = Self { pool };
        store.conn()?.execute_batch(SCHEMA)?;
        Ok(store)
    }

    fn conn(&self) -> Result<PooledConnection> {
        Ok(self.pool.get()?)
    }
}

#[async_trait]
impl PluginStore for SqliteStore {
    async fn upsert_definition(&self, def: PluginDefinition) -> Result<()> {
        let now = ts_to_sql(Utc::now());
        let _ = self.conn()?.execute(
            "INSERT INTO plugin_definitions
                 (id, version, api_version, depends_on, capabilities, enabled,
                  metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                 version = excluded.version,
                 api_version = excluded.api_version,
                 depends_on = excluded.depends_on,
                 capabilities = excluded.capabilities,
                 enabled = excluded.enabled,
                 metadata = excluded.metadata,
                 updated_at = excluded.updated_at",
            params![
                def.id.as_str(),
                def.version,
                def.api_version,
                serde_json::to_string(&def.depends_on)?,
                serde_json::to_string(&def.capabilities)?,
                def.enabled,
                serde_json::to_string(&def.metadata)?,
                ts_to_sql(def.created_at),
                now,
            ],
        )?;
        Ok(())
    }

    async fn get_definition(&self, id: &PluginId) -> Result<PluginDefinition> {
        let row = self
            .conn()?
            .query_row(
                "SELECT id, version, api_version, depends_on, capabilities, enabled,
                        metadata, created_at, updated_at
                 FROM plugin_definitions WHERE id = ?1",
                params![id.as_str()],
                DefinitionRow::read,
            )
            .optional()?
            .ok_or_else(|| StoreError::definition_not_found(id.as_str()))?;
        row.decode()
    }

    async fn list_definitions(&self) -> Result<Vec<PluginDefinition>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, version, api_version, depends_on, capabilities, enabled,
                    metadata, created_at, updated_at
             FROM plugin_definitions ORDER BY id",
        )?;
        let rows = stmt.query_map([], DefinitionRow::read)?;
        let mut defs = Vec::new();
        for row in rows {
            defs.push(row?.decode()?);
        }
        Ok(defs)
    }

    async fn set_definition_enabled(&self, id: &PluginId, enabled: bool) -> Result<()> {
        let updated = self.conn()?.execute(
            "UPDATE plugin_definitions SET enabled = ?1, updated_at = ?2 WHERE id = ?3",
            params![enabled, ts_to_sql(Utc::now()), id.as_str()],
        )?;
        if updated == 0 {
            return Err(StoreError::definition_not_found(id.as_str()));
        }
        Ok(())
    }

    async fn create_instance(&self, inst: PluginInstance) -> Result<()> {
        let result = self.conn()?.execute(
            "INSERT INTO plugin_instances
                 (id, definition_id, status, enabled, auth_token, last_heartbeat,
                  started_at, metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                inst.id.as_str(),
                inst.definition_id.as_str(),
                inst.status.as_str(),
                inst.enabled,
                inst.auth_token.as_str(),
                inst.last_heartbeat.map(ts_to_sql),
                ts_to_sql(inst.started_at),
                serde_json::to_string(&inst.metadata)?,
                ts_to_sql(inst.created_at),
                ts_to_sql(inst.updated_at),
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::Duplicate(inst.id.as_str().to_owned()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_instance(&self, id: &SessionId) -> Result<PluginInstance> {
        let row = self
            .conn()?
            .query_row(
                "SELECT id, definition_id, status, enabled, auth_token, last_heartbeat,
                        started_at, metadata, created_at, updated_at
                 FROM plugin_instances WHERE id = ?1",
                params![id.as_str()],
                InstanceRow::read,
            )
            .optional()?
            .ok_or_else(|| StoreError::instance_not_found(id.as_str()))?;
        row.decode()
    }

    async fn list_instances(&self) -> Result<Vec<PluginInstance>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, definition_id, status, enabled, auth_token, last_heartbeat,
                    started_at, metadata, created_at, updated_at
             FROM plugin_instances ORDER BY id",
        )?;
        let rows = stmt.query_map([], InstanceRow::read)?;
        let mut instances = Vec::new();
        for row in rows {
            instances.push(row?.decode()?);
        }
        Ok(instances)
    }

    async fn update_instance(&self, inst: PluginInstance) -> Result<()> {
        let updated = self.conn()?.execute(
            "UPDATE plugin_instances SET
                 definition_id = ?1, status = ?2, enabled = ?3, auth_token = ?4,
                 last_heartbeat = ?5, started_at = ?6, metadata = ?7, updated_at = ?8
             WHERE id = ?9",
            params![
                inst.definition_id.as_str(),
                inst.status.as_str(),
                inst.enabled,
                inst.auth_token.as_str(),
                inst.last_heartbeat.map(ts_to_sql),
                ts_to_sql(inst.started_at),
                serde_json::to_string(&inst.metadata)?,
                ts_to_sql(Utc::now()),
                inst.id.as_str(),
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::instance_not_found(inst.id.as_str()));
        }
        Ok(())
    }

    async fn set_instance_enabled(&self, id: &SessionId, enabled: bool) -> Result<()> {
        let updated = self.conn()?.execute(
            "UPDATE plugin_instances SET enabled = ?1, updated_at = ?2 WHERE id = ?3",
            params![enabled, ts_to_sql(Utc::now()), id.as_str()],
        )?;
        if updated == 0 {
            return Err(StoreError::instance_not_found(id.as_str()));
        }
        Ok(())
    }

    async fn stale_instances(&self, cutoff: DateTime<Utc>) -> Result<Vec<PluginInstance>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, definition_id, status, enabled, auth_token, last_heartbeat,
                    started_at, metadata, created_at, updated_at
             FROM plugin_instances
             WHERE status = 'running'
               AND (last_heartbeat IS NULL OR last_heartbeat < ?1)
             ORDER BY id",
        )?;
        let rows = stmt.query_map(params![ts_to_sql(cutoff)], InstanceRow::read)?;
        let mut instances = Vec::new();
        for row in rows {
            instances.push(row?.decode()?);
        }
        Ok(instances)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::{BTreeSet, HashMap};

    use chrono::Duration;

    use super::*;

    fn open_temp() -> (SqliteStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("hive.db")).unwrap();
        (store, dir)
    }

    fn make_definition(id: &str, version: &str) -> PluginDefinition {
        PluginDefinition::new(
            PluginId::from(id),
            version,
            "1.0",
            BTreeSet::from(["forecast".to_owned()]),
            HashMap::from([("owner".to_owned(), "infra".to_owned())]),
        )
    }

    fn make_instance(id: &str, plugin: &str) -> PluginInstance {
        PluginInstance::new(
            SessionId::from(id),
            PluginId::from(plugin),
            AuthToken::generate(),
            HashMap::new(),
        )
    }

    #[tokio::test]
    async fn definition_round_trip() {
        let (store, _dir) = open_temp();
        let def = make_definition("weather", "1.2.3");
        store.upsert_definition(def.clone()).await.unwrap();
        let back = store.get_definition(&def.id).await.unwrap();
        assert_eq!(back.version, "1.2.3");
        assert_eq!(back.capabilities, def.capabilities);
        assert_eq!(back.metadata, def.metadata);
    }

    #[tokio::test]
    async fn upsert_is_full_replace() {
        let (store, _dir) = open_temp();
        let mut first = make_definition("weather", "1.0.0");
        first.enabled = false;
        store.upsert_definition(first).await.unwrap();

        store.upsert_definition(make_definition("weather", "2.0.0")).await.unwrap();
        let def = store.get_definition(&PluginId::from("weather")).await.unwrap();
        assert_eq!(def.version, "2.0.0");
        assert!(def.enabled);
        assert_eq!(store.list_definitions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn instance_round_trip_keeps_token_and_heartbeat() {
        let (store, _dir) = open_temp();
        let inst = make_instance("inst-1", "weather");
        let token = inst.auth_token.clone();
        store.create_instance(inst).await.unwrap();

        let back = store.get_instance(&SessionId::from("inst-1")).await.unwrap();
        assert_eq!(back.auth_token, token);
        assert_eq!(back.status, PluginStatus::Running);
        assert!(back.last_heartbeat.is_some());
    }

    #[tokio::test]
    async fn duplicate_instance_id_rejected() {
        let (store, _dir) = open_temp();
        store.create_instance(make_instance("inst-1", "weather")).await.unwrap();
        let err = store.create_instance(make_instance("inst-1", "weather")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn null_heartbeat_round_trips_as_none() {
        let (store, _dir) = open_temp();
        let mut inst = make_instance("inst-1", "weather");
        inst.last_heartbeat = None;
        store.create_instance(inst).await.unwrap();
        let back = store.get_instance(&SessionId::from("inst-1")).await.unwrap();
        assert!(back.last_heartbeat.is_none());
    }

    #[tokio::test]
    async fn stale_query_matches_absent_and_old() {
        let (store, _dir) = open_temp();

        let mut stale = make_instance("inst-stale", "weather");
        stale.last_heartbeat = Some(Utc::now() - Duration::seconds(120));
        store.create_instance(stale).await.unwrap();

        let mut silent = make_instance("inst-silent", "weather");
        silent.last_heartbeat = None;
        store.create_instance(silent).await.unwrap();

        store.create_instance(make_instance("inst-fresh", "weather")).await.unwrap();

        let mut stopped = make_instance("inst-stopped", "weather");
        stopped.status = PluginStatus::Stopped;
        stopped.last_heartbeat = None;
        store.create_instance(stopped).await.unwrap();

        let cutoff = Utc::now() - Duration::seconds(30);
        let ids: Vec<_> = store
            .stale_instances(cutoff)
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.id.as_str().to_owned())
            .collect();
        assert_eq!(ids, vec!["inst-silent", "inst-stale"]);
    }

    #[tokio::test]
    async fn update_instance_persists_status_change() {
        let (store, _dir) = open_temp();
        let mut inst = make_instance("inst-1", "weather");
        store.create_instance(inst.clone()).await.unwrap();

        inst.status = PluginStatus::Unhealthy;
        store.update_instance(inst).await.unwrap();

        let back = store.get_instance(&SessionId::from("inst-1")).await.unwrap();
        assert_eq!(back.status, PluginStatus::Unhealthy);
    }

    #[tokio::test]
    async fn update_missing_instance_is_not_found() {
        let (store, _dir) = open_temp();
        let err = store.update_instance(make_instance("inst-missing", "weather")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn enabled_flag_setters() {
        let (store, _dir) = open_temp();
        store.upsert_definition(make_definition("weather", "1")).await.unwrap();
        store.create_instance(make_instance("inst-1", "weather")).await.unwrap();

        store.set_definition_enabled(&PluginId::from("weather"), false).await.unwrap();
        store.set_instance_enabled(&SessionId::from("inst-1"), false).await.unwrap();

        assert!(!store.get_definition(&PluginId::from("weather")).await.unwrap().enabled);
        assert!(!store.get_instance(&SessionId::from("inst-1")).await.unwrap().enabled);
    }

    #[tokio::test]
    async fn reopen_preserves_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hive.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.upsert_definition(make_definition("weather", "1")).await.unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.list_definitions().await.unwrap().len(), 1);
    }
}
