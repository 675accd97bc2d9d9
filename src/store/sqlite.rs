use std::collections::BTreeSet;

use rusqlite::{Connection, params};

use crate::error::StoreError;
use crate::store::repo::{KvStore, WriteBatch, WriteOp};
use crate::store::StoreName;

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &std::path::Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let repo = Self { conn };
        repo.migrate()?;
        Ok(repo)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let repo = Self { conn };
        repo.migrate()?;
        Ok(repo)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS kv (
                store  TEXT NOT NULL,
                key    TEXT NOT NULL,
                value  TEXT NOT NULL,
                PRIMARY KEY (store, key)
            );
            "#,
        )?;
        Ok(())
    }
}

fn apply_op(conn: &Connection, op: &WriteOp) -> Result<(), StoreError> {
    match op {
        WriteOp::Put { store, key, value } => {
            conn.execute(
                r#"
                INSERT INTO kv (store, key, value) VALUES (?1, ?2, ?3)
                ON CONFLICT(store, key) DO UPDATE SET value=excluded.value
                "#,
                params![store.as_str(), key, value],
            )?;
        }
        WriteOp::Delete { store, key } => {
            conn.execute(
                r#"DELETE FROM kv WHERE store=?1 AND key=?2"#,
                params![store.as_str(), key],
            )?;
        }
    }
    Ok(())
}

impl KvStore for SqliteStore {
    fn get(&self, store: StoreName, key: &str) -> Result<Option<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(r#"SELECT value FROM kv WHERE store=?1 AND key=?2"#)?;
        let mut rows = stmt.query(params![store.as_str(), key])?;
        if let Some(r) = rows.next()? {
            Ok(Some(r.get(0)?))
        } else {
            Ok(None)
        }
    }

    fn put(&self, store: StoreName, key: &str, value: &str) -> Result<(), StoreError> {
        apply_op(
            &self.conn,
            &WriteOp::Put {
                store,
                key: key.to_string(),
                value: value.to_string(),
            },
        )
    }

    fn delete(&self, store: StoreName, key: &str) -> Result<(), StoreError> {
        apply_op(
            &self.conn,
            &WriteOp::Delete {
                store,
                key: key.to_string(),
            },
        )
    }

    fn keys(&self, store: StoreName) -> Result<BTreeSet<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(r#"SELECT key FROM kv WHERE store=?1"#)?;
        let mut rows = stmt.query(params![store.as_str()])?;
        let mut out = BTreeSet::new();
        while let Some(r) = rows.next()? {
            out.insert(r.get::<_, String>(0)?);
        }
        Ok(out)
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        let tx = self.conn.unchecked_transaction()?;
        for op in batch.ops() {
            apply_op(&tx, op)?;
        }
        tx.commit()?;
        Ok(())
    }
}
