//! Key/value store contract.
//!
//! Holds origin texts and per-segment vote/score/weight values. Keys are
//! plain strings namespaced by the engine; values are strings (JSON-encoded
//! where structured).

use async_trait::async_trait;

use crate::error::Result;

/// Contract for key/value store backends.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a key.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a key unconditionally, no TTL.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Write a key only when absent. Returns whether the write happened.
    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool>;

    /// Delete a key. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Delete every key with the given prefix; returns how many were
    /// removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<usize>;

    /// All keys with the given prefix, in lexicographic order.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>>;
}
