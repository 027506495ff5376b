//! Keyed store abstractions for the fingerprint index.
//!
//! The index needs a small Redis-shaped surface: strings with TTL, hashes,
//! sets, key expiry, and pipelined batches. [`KeyedStore`] is that surface.
//! A batch is applied in order and returns one reply per command, but it is
//! not a transaction: a failure part-way leaves earlier commands applied.
//!
//! ## Key Layout
//!
//! ```text
//! {prefix}fp:{id}            # hash: fingerprint record (TTL = job TTL)
//! {prefix}loc:{id}           # hash: location record   (TTL = job TTL)
//! {prefix}band:{band_key}    # set:  posting ids       (no TTL)
//! {prefix}geo:{location}     # string: geocode cache   (TTL = geo TTL)
//! {prefix}metrics:{date}     # hash: daily counters    (TTL = metrics TTL)
//! ```

pub mod keys;
pub mod local;
pub mod memory;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{AppError, Result};

// Re-export for convenience
pub use keys::Keys;
pub use local::LocalStore;
pub use memory::MemoryStore;

/// A single store command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Get(String),
    Set {
        key: String,
        value: String,
        ttl: Option<Duration>,
    },
    Del(String),
    Exists(String),
    Expire {
        key: String,
        ttl: Duration,
    },
    HSet {
        key: String,
        fields: Vec<(String, String)>,
    },
    HGetAll(String),
    HIncrBy {
        key: String,
        field: String,
        delta: i64,
    },
    SAdd {
        key: String,
        member: String,
    },
    SRem {
        key: String,
        member: String,
    },
    SMembers(String),
}

impl Command {
    /// Whether applying the command can change stored state.
    pub fn is_write(&self) -> bool {
        !matches!(
            self,
            Command::Get(_) | Command::Exists(_) | Command::HGetAll(_) | Command::SMembers(_)
        )
    }
}

/// Reply to a single command.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Nil,
    Ok,
    Int(i64),
    Str(String),
    Hash(HashMap<String, String>),
    Members(Vec<String>),
}

impl Reply {
    pub fn into_int(self) -> Result<i64> {
        match self {
            Reply::Int(n) => Ok(n),
            other => Err(unexpected("integer", &other)),
        }
    }

    pub fn into_bool(self) -> Result<bool> {
        Ok(self.into_int()? > 0)
    }

    /// String value, `None` for a missing key.
    pub fn into_string(self) -> Result<Option<String>> {
        match self {
            Reply::Str(s) => Ok(Some(s)),
            Reply::Nil => Ok(None),
            other => Err(unexpected("string", &other)),
        }
    }

    /// Hash fields; a missing key is an empty hash.
    pub fn into_hash(self) -> Result<HashMap<String, String>> {
        match self {
            Reply::Hash(h) => Ok(h),
            Reply::Nil => Ok(HashMap::new()),
            other => Err(unexpected("hash", &other)),
        }
    }

    /// Set members; a missing key is an empty set.
    pub fn into_members(self) -> Result<Vec<String>> {
        match self {
            Reply::Members(m) => Ok(m),
            Reply::Nil => Ok(Vec::new()),
            other => Err(unexpected("set", &other)),
        }
    }
}

fn unexpected(expected: &str, got: &Reply) -> AppError {
    AppError::store(format!("expected {expected} reply, got {got:?}"))
}

/// Trait for keyed store backends.
#[async_trait]
pub trait KeyedStore: Send + Sync {
    /// Apply a pipelined batch of commands in order.
    async fn exec(&self, batch: Vec<Command>) -> Result<Vec<Reply>>;

    /// All live keys starting with `prefix`.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    /// Make buffered writes durable. Backends that write through do nothing.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    async fn exec_one(&self, command: Command) -> Result<Reply> {
        self.exec(vec![command])
            .await?
            .pop()
            .ok_or_else(|| AppError::store("empty reply to single command"))
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.exec_one(Command::Get(key.to_string()))
            .await?
            .into_string()
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        self.exec_one(Command::Set {
            key: key.to_string(),
            value: value.to_string(),
            ttl,
        })
        .await?;
        Ok(())
    }

    /// Delete a key, returning whether it existed.
    async fn del(&self, key: &str) -> Result<bool> {
        self.exec_one(Command::Del(key.to_string()))
            .await?
            .into_bool()
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.exec_one(Command::Exists(key.to_string()))
            .await?
            .into_bool()
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.exec_one(Command::Expire {
            key: key.to_string(),
            ttl,
        })
        .await?
        .into_bool()
    }

    /// Set hash fields, returning how many were new.
    async fn hset(&self, key: &str, fields: Vec<(String, String)>) -> Result<i64> {
        self.exec_one(Command::HSet {
            key: key.to_string(),
            fields,
        })
        .await?
        .into_int()
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        self.exec_one(Command::HGetAll(key.to_string()))
            .await?
            .into_hash()
    }

    async fn hincrby(&self, key: &str, field: &str, delta: i64) -> Result<i64> {
        self.exec_one(Command::HIncrBy {
            key: key.to_string(),
            field: field.to_string(),
            delta,
        })
        .await?
        .into_int()
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool> {
        self.exec_one(Command::SAdd {
            key: key.to_string(),
            member: member.to_string(),
        })
        .await?
        .into_bool()
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool> {
        self.exec_one(Command::SRem {
            key: key.to_string(),
            member: member.to_string(),
        })
        .await?
        .into_bool()
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        self.exec_one(Command::SMembers(key.to_string()))
            .await?
            .into_members()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_are_not_writes() {
        assert!(!Command::Get("k".into()).is_write());
        assert!(!Command::SMembers("k".into()).is_write());
        assert!(Command::Del("k".into()).is_write());
        assert!(
            Command::Expire {
                key: "k".into(),
                ttl: Duration::from_secs(1)
            }
            .is_write()
        );
    }

    #[test]
    fn test_nil_converts_to_empty_collections() {
        assert!(Reply::Nil.into_hash().unwrap().is_empty());
        assert!(Reply::Nil.into_members().unwrap().is_empty());
        assert_eq!(Reply::Nil.into_string().unwrap(), None);
    }

    #[test]
    fn test_mismatched_reply_is_a_store_error() {
        let err = Reply::Ok.into_int().unwrap_err();
        assert!(err.is_store());
    }
}
