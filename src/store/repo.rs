use std::collections::BTreeSet;

use crate::error::StoreError;
use crate::store::StoreName;

/// Key-value persistence used by every feed component.
///
/// `put` and `delete` are atomic per key. `commit` applies a whole batch or
/// nothing, so one feed cycle can land its writes to all stores together.
pub trait KvStore {
    fn get(&self, store: StoreName, key: &str) -> Result<Option<String>, StoreError>;
    fn put(&self, store: StoreName, key: &str, value: &str) -> Result<(), StoreError>;
    fn delete(&self, store: StoreName, key: &str) -> Result<(), StoreError>;
    fn keys(&self, store: StoreName) -> Result<BTreeSet<String>, StoreError>;

    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put {
        store: StoreName,
        key: String,
        value: String,
    },
    Delete {
        store: StoreName,
        key: String,
    },
}

#[derive(Debug, Default, Clone)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, store: StoreName, key: impl Into<String>, value: impl Into<String>) {
        self.ops.push(WriteOp::Put {
            store,
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn delete(&mut self, store: StoreName, key: impl Into<String>) {
        self.ops.push(WriteOp::Delete {
            store,
            key: key.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }
}
