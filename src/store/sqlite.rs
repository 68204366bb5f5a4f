//! SQLite-backed store.
//!
//! One table per concern: `entity_types` holds schemas, `work_items` holds
//! the queue contents. WAL mode so a crash never exposes a half-written
//! record. Identities are rowids, so insertion order is the query order.

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::model::{EntityDef, Identity, Properties, WorkItem};
use crate::store::Store;

/// Store backend. Owns the SQLite connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init(conn: &Connection) -> Result<()> {
        // WAL mode for concurrent readers
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS entity_types (
                name    TEXT PRIMARY KEY,
                fields  TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS work_items (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                entity_type TEXT NOT NULL REFERENCES entity_types(name),
                properties  TEXT NOT NULL DEFAULT '{}',
                created_at  TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_items_type ON work_items(entity_type, id);
            ",
        )?;

        Ok(())
    }

    /// Register or replace an entity type schema.
    pub async fn define_entity(&self, def: &EntityDef) -> Result<()> {
        let fields = serde_json::to_string(&def.fields)
            .map_err(|e| Error::Other(format!("unencodable schema for {}: {e}", def.name)))?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO entity_types (name, fields) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET fields = excluded.fields",
            params![def.name, fields],
        )?;
        Ok(())
    }

    /// Number of stored items of a type, leased or not.
    pub async fn len(&self, entity_type: &str) -> Result<usize> {
        let conn = self.conn.lock().await;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM work_items WHERE entity_type = ?1",
            params![entity_type],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }
}

fn entity_def_on(conn: &Connection, entity_type: &str) -> Result<Option<EntityDef>> {
    let fields: Option<String> = conn
        .query_row(
            "SELECT fields FROM entity_types WHERE name = ?1",
            params![entity_type],
            |row| row.get(0),
        )
        .optional()?;

    fields
        .map(|raw| {
            let fields = serde_json::from_str(&raw)
                .map_err(|e| Error::Other(format!("corrupt schema for {entity_type}: {e}")))?;
            Ok(EntityDef {
                name: entity_type.to_string(),
                fields,
            })
        })
        .transpose()
}

fn parse_item(entity_type: &str, id: i64, properties: &str, created_at: &str) -> Result<WorkItem> {
    Ok(WorkItem {
        identity: Identity(id),
        entity_type: entity_type.to_string(),
        properties: serde_json::from_str(properties)
            .map_err(|e| Error::Other(format!("corrupt properties for item {id}: {e}")))?,
        created_at: created_at
            .parse()
            .map_err(|e| Error::Other(format!("corrupt timestamp for item {id}: {e}")))?,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn entity_def(&self, entity_type: &str) -> Result<Option<EntityDef>> {
        let conn = self.conn.lock().await;
        entity_def_on(&conn, entity_type)
    }

    async fn insert(&self, entity_type: &str, properties: Properties) -> Result<WorkItem> {
        let conn = self.conn.lock().await;

        let def = entity_def_on(&conn, entity_type)?
            .ok_or_else(|| Error::UnknownEntityType(entity_type.to_string()))?;
        def.validate(&properties)?;

        let encoded = serde_json::to_string(&properties)
            .map_err(|e| Error::Other(format!("unencodable properties: {e}")))?;
        let created_at = Utc::now();
        conn.execute(
            "INSERT INTO work_items (entity_type, properties, created_at) VALUES (?1, ?2, ?3)",
            params![entity_type, encoded, created_at.to_rfc3339()],
        )?;

        Ok(WorkItem {
            identity: Identity(conn.last_insert_rowid()),
            entity_type: entity_type.to_string(),
            properties,
            created_at,
        })
    }

    async fn query_available(
        &self,
        entity_type: &str,
        excluding: &HashSet<Identity>,
        limit: usize,
    ) -> Result<Vec<WorkItem>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        // Over-fetch by the exclusion count and filter here: every excluded
        // identity can occupy at most one fetched row, so `limit` eligible
        // items survive, and the statement stays fixed-shape regardless of
        // how many leases are outstanding.
        let fetch = excluding.len().saturating_add(limit) as i64;

        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, properties, created_at FROM work_items
             WHERE entity_type = ?1 ORDER BY id ASC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![entity_type, fetch], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .filter(|&(id, ..)| !excluding.contains(&Identity(id)))
            .take(limit)
            .map(|(id, properties, created_at)| {
                parse_item(entity_type, id, &properties, &created_at)
            })
            .collect()
    }

    async fn delete(&self, identity: Identity) -> Result<()> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "DELETE FROM work_items WHERE id = ?1",
            params![identity.0],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(identity));
        }
        Ok(())
    }
}
