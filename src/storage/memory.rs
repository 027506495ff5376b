//! In-process keyed store.
//!
//! Expiry is lazy: an expired slot is dropped the next time any command or
//! scan touches it. A whole batch runs under one lock.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::storage::{Command, KeyedStore, Reply};

/// Stored value shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Value {
    Str(String),
    Hash(BTreeMap<String, String>),
    Set(BTreeSet<String>),
}

/// A value plus its absolute expiry in unix milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl Slot {
    fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at.is_some_and(|at| at <= now_ms)
    }
}

/// Memory-backed [`KeyedStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: Mutex<HashMap<String, Slot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from a snapshot, discarding expired slots.
    pub fn from_snapshot(snapshot: HashMap<String, Slot>) -> Self {
        let now = now_ms();
        let slots = snapshot
            .into_iter()
            .filter(|(_, slot)| !slot.is_expired(now))
            .collect();
        Self {
            slots: Mutex::new(slots),
        }
    }

    /// Copy of every live slot.
    pub fn snapshot(&self) -> Result<HashMap<String, Slot>> {
        let now = now_ms();
        let slots = self.lock()?;
        Ok(slots
            .iter()
            .filter(|(_, slot)| !slot.is_expired(now))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    /// Number of live keys.
    pub fn len(&self) -> Result<usize> {
        let now = now_ms();
        Ok(self.lock()?.values().filter(|s| !s.is_expired(now)).count())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Slot>>> {
        self.slots
            .lock()
            .map_err(|_| AppError::store("memory store lock poisoned"))
    }
}

#[async_trait]
impl KeyedStore for MemoryStore {
    async fn exec(&self, batch: Vec<Command>) -> Result<Vec<Reply>> {
        let now = now_ms();
        let mut slots = self.lock()?;
        batch
            .into_iter()
            .map(|command| apply(&mut slots, command, now))
            .collect()
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let now = now_ms();
        let mut slots = self.lock()?;
        slots.retain(|_, slot| !slot.is_expired(now));
        let mut keys: Vec<String> = slots
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn expiry(now: i64, ttl: Duration) -> i64 {
    now.saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
}

/// Live slot for `key`, dropping it first if it has expired.
fn live<'a>(slots: &'a mut HashMap<String, Slot>, key: &str, now: i64) -> Option<&'a mut Slot> {
    if slots.get(key).is_some_and(|s| s.is_expired(now)) {
        slots.remove(key);
    }
    slots.get_mut(key)
}

fn wrong_type(key: &str) -> AppError {
    AppError::store(format!(
        "WRONGTYPE operation against key '{key}' holding the wrong kind of value"
    ))
}

fn apply(slots: &mut HashMap<String, Slot>, command: Command, now: i64) -> Result<Reply> {
    match command {
        Command::Get(key) => match live(slots, &key, now) {
            None => Ok(Reply::Nil),
            Some(Slot {
                value: Value::Str(s),
                ..
            }) => Ok(Reply::Str(s.clone())),
            Some(_) => Err(wrong_type(&key)),
        },

        Command::Set { key, value, ttl } => {
            slots.insert(
                key,
                Slot {
                    value: Value::Str(value),
                    expires_at: ttl.map(|ttl| expiry(now, ttl)),
                },
            );
            Ok(Reply::Ok)
        }

        Command::Del(key) => {
            let existed = live(slots, &key, now).is_some();
            slots.remove(&key);
            Ok(Reply::Int(existed as i64))
        }

        Command::Exists(key) => Ok(Reply::Int(live(slots, &key, now).is_some() as i64)),

        Command::Expire { key, ttl } => match live(slots, &key, now) {
            Some(slot) => {
                slot.expires_at = Some(expiry(now, ttl));
                Ok(Reply::Int(1))
            }
            None => Ok(Reply::Int(0)),
        },

        Command::HSet { key, fields } => {
            if live(slots, &key, now).is_none() {
                slots.insert(
                    key.clone(),
                    Slot {
                        value: Value::Hash(BTreeMap::new()),
                        expires_at: None,
                    },
                );
            }
            let Some(Slot {
                value: Value::Hash(hash),
                ..
            }) = slots.get_mut(&key)
            else {
                return Err(wrong_type(&key));
            };
            let added = fields
                .into_iter()
                .filter(|(field, value)| hash.insert(field.clone(), value.clone()).is_none())
                .count();
            Ok(Reply::Int(added as i64))
        }

        Command::HGetAll(key) => match live(slots, &key, now) {
            None => Ok(Reply::Nil),
            Some(Slot {
                value: Value::Hash(hash),
                ..
            }) => Ok(Reply::Hash(
                hash.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            )),
            Some(_) => Err(wrong_type(&key)),
        },

        Command::HIncrBy { key, field, delta } => {
            if live(slots, &key, now).is_none() {
                slots.insert(
                    key.clone(),
                    Slot {
                        value: Value::Hash(BTreeMap::new()),
                        expires_at: None,
                    },
                );
            }
            let Some(Slot {
                value: Value::Hash(hash),
                ..
            }) = slots.get_mut(&key)
            else {
                return Err(wrong_type(&key));
            };
            let current = match hash.get(&field) {
                Some(raw) => raw.parse::<i64>().map_err(|_| {
                    AppError::store(format!("hash field '{field}' is not an integer"))
                })?,
                None => 0,
            };
            let next = current.saturating_add(delta);
            hash.insert(field, next.to_string());
            Ok(Reply::Int(next))
        }

        Command::SAdd { key, member } => {
            if live(slots, &key, now).is_none() {
                slots.insert(
                    key.clone(),
                    Slot {
                        value: Value::Set(BTreeSet::new()),
                        expires_at: None,
                    },
                );
            }
            let Some(Slot {
                value: Value::Set(set),
                ..
            }) = slots.get_mut(&key)
            else {
                return Err(wrong_type(&key));
            };
            Ok(Reply::Int(set.insert(member) as i64))
        }

        Command::SRem { key, member } => {
            let (removed, now_empty) = match live(slots, &key, now) {
                None => return Ok(Reply::Int(0)),
                Some(Slot {
                    value: Value::Set(set),
                    ..
                }) => (set.remove(&member), set.is_empty()),
                Some(_) => return Err(wrong_type(&key)),
            };
            // Empty sets do not exist.
            if now_empty {
                slots.remove(&key);
            }
            Ok(Reply::Int(removed as i64))
        }

        Command::SMembers(key) => match live(slots, &key, now) {
            None => Ok(Reply::Nil),
            Some(Slot {
                value: Value::Set(set),
                ..
            }) => Ok(Reply::Members(set.iter().cloned().collect())),
            Some(_) => Err(wrong_type(&key)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_string_set_get_del() {
        let store = MemoryStore::new();
        store.set("k", "v", None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
        assert!(store.del("k").await.unwrap());
        assert!(!store.del("k").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_zero_ttl_expires_immediately() {
        let store = MemoryStore::new();
        store.set("k", "v", Some(Duration::ZERO)).await.unwrap();
        assert!(!store.exists("k").await.unwrap());
        assert!(store.scan_prefix("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_expire_on_missing_key() {
        let store = MemoryStore::new();
        assert!(!store.expire("nope", Duration::from_secs(5)).await.unwrap());
        store.sadd("s", "a").await.unwrap();
        assert!(store.expire("s", Duration::from_secs(5)).await.unwrap());
    }

    #[tokio::test]
    async fn test_hash_commands() {
        let store = MemoryStore::new();
        let added = store
            .exec_one(Command::HSet {
                key: "h".into(),
                fields: vec![("a".into(), "1".into()), ("b".into(), "2".into())],
            })
            .await
            .unwrap();
        assert_eq!(added, Reply::Int(2));
        assert_eq!(store.hincrby("h", "a", 5).await.unwrap(), 6);
        assert_eq!(store.hincrby("h", "c", 1).await.unwrap(), 1);
        let hash = store.hgetall("h").await.unwrap();
        assert_eq!(hash.get("a").map(String::as_str), Some("6"));
        assert_eq!(hash.len(), 3);
    }

    #[tokio::test]
    async fn test_set_removes_key_when_emptied() {
        let store = MemoryStore::new();
        assert!(store.sadd("s", "a").await.unwrap());
        assert!(!store.sadd("s", "a").await.unwrap());
        store.sadd("s", "b").await.unwrap();
        assert_eq!(store.smembers("s").await.unwrap(), vec!["a", "b"]);
        assert!(store.srem("s", "a").await.unwrap());
        assert!(store.srem("s", "b").await.unwrap());
        assert!(!store.exists("s").await.unwrap());
    }

    #[tokio::test]
    async fn test_wrong_type_is_error() {
        let store = MemoryStore::new();
        store.set("k", "v", None).await.unwrap();
        assert!(store.sadd("k", "x").await.unwrap_err().is_store());
        assert!(store.hgetall("k").await.is_err());
    }

    #[tokio::test]
    async fn test_batch_replies_in_order() {
        let store = MemoryStore::new();
        let replies = store
            .exec(vec![
                Command::SAdd {
                    key: "s".into(),
                    member: "x".into(),
                },
                Command::Exists("s".into()),
                Command::Exists("missing".into()),
                Command::SMembers("s".into()),
            ])
            .await
            .unwrap();
        assert_eq!(
            replies,
            vec![
                Reply::Int(1),
                Reply::Int(1),
                Reply::Int(0),
                Reply::Members(vec!["x".into()]),
            ]
        );
    }

    #[tokio::test]
    async fn test_scan_prefix_and_snapshot() {
        let store = MemoryStore::new();
        store.set("a:1", "x", None).await.unwrap();
        store.set("a:2", "y", None).await.unwrap();
        store.set("b:1", "z", None).await.unwrap();
        assert_eq!(store.scan_prefix("a:").await.unwrap(), vec!["a:1", "a:2"]);

        let restored = MemoryStore::from_snapshot(store.snapshot().unwrap());
        assert_eq!(restored.len().unwrap(), 3);
        assert_eq!(restored.get("b:1").await.unwrap(), Some("z".into()));
    }
}
