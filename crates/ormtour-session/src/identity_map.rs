//! Identity map: at most one object per `(table, primary key)`.
//!
//! Keys are hashed with integer widths normalized, so a key read back as
//! `BigInt(1)` finds an object whose key was written as `Int(1)`.

use crate::instance::{Tracked, same_object};
use ormtour_core::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// The identity of a persistent object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityKey {
    pub table: String,
    pub pk: Vec<Value>,
}

impl IdentityKey {
    pub fn new(table: impl Into<String>, pk: Vec<Value>) -> Self {
        Self {
            table: table.into(),
            pk,
        }
    }

    fn matches(&self, table: &str, pk: &[Value]) -> bool {
        self.table == table
            && self.pk.len() == pk.len()
            && self.pk.iter().zip(pk).all(|(a, b)| a.same_key(b))
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pk: Vec<String> = self.pk.iter().map(Value::to_sql_literal).collect();
        write!(f, "{}({})", self.table, pk.join(", "))
    }
}

fn hash_key(table: &str, pk: &[Value]) -> u64 {
    let mut hasher = DefaultHasher::new();
    table.hash(&mut hasher);
    for value in pk {
        if let Some(i) = value.as_i64() {
            0u8.hash(&mut hasher);
            i.hash(&mut hasher);
            continue;
        }
        match value {
            Value::Null => 1u8.hash(&mut hasher),
            Value::Double(d) => {
                2u8.hash(&mut hasher);
                d.to_bits().hash(&mut hasher);
            }
            Value::Text(s) => {
                3u8.hash(&mut hasher);
                s.hash(&mut hasher);
            }
            Value::Bytes(b) => {
                4u8.hash(&mut hasher);
                b.hash(&mut hasher);
            }
            Value::Json(j) => {
                5u8.hash(&mut hasher);
                j.to_string().hash(&mut hasher);
            }
            Value::Bool(_) | Value::Int(_) | Value::BigInt(_) => {}
        }
    }
    hasher.finish()
}

/// One persistent object and what the session knows about it.
pub(crate) struct Entry {
    pub key: IdentityKey,
    pub object: Arc<dyn Tracked>,
    /// Column values as last loaded or flushed.
    pub snapshot: Vec<(&'static str, Value)>,
    /// Fields must be reloaded from the next row that carries this key.
    pub expired: bool,
    seq: u64,
}

impl Entry {
    pub fn new(key: IdentityKey, object: Arc<dyn Tracked>) -> Self {
        let snapshot = object.values();
        Self {
            key,
            object,
            snapshot,
            expired: false,
            seq: 0,
        }
    }

    /// Columns whose current value differs from the snapshot.
    ///
    /// Expiry does not hide edits: the snapshot still holds the values last
    /// loaded or flushed.
    pub fn changes(&self) -> Vec<(&'static str, Value)> {
        self.object
            .values()
            .into_iter()
            .filter(|(column, value)| {
                self.snapshot
                    .iter()
                    .find(|(c, _)| c == column)
                    .is_none_or(|(_, old)| old != value)
            })
            .collect()
    }
}

/// Entries bucketed by key hash; a bucket holds every key sharing a hash.
#[derive(Default)]
pub(crate) struct IdentityMap {
    buckets: HashMap<u64, Vec<Entry>>,
    next_seq: u64,
}

impl IdentityMap {
    pub fn get(&self, table: &str, pk: &[Value]) -> Option<&Entry> {
        self.buckets
            .get(&hash_key(table, pk))?
            .iter()
            .find(|e| e.key.matches(table, pk))
    }

    pub fn get_mut(&mut self, table: &str, pk: &[Value]) -> Option<&mut Entry> {
        self.buckets
            .get_mut(&hash_key(table, pk))?
            .iter_mut()
            .find(|e| e.key.matches(table, pk))
    }

    /// Add an entry, replacing one with the same key.
    pub fn insert(&mut self, mut entry: Entry) {
        entry.seq = self.next_seq;
        self.next_seq += 1;
        let bucket = self
            .buckets
            .entry(hash_key(&entry.key.table, &entry.key.pk))
            .or_default();
        bucket.retain(|e| !e.key.matches(&entry.key.table, &entry.key.pk));
        bucket.push(entry);
    }

    pub fn contains_object(&self, object: &Arc<dyn Tracked>) -> bool {
        self.buckets
            .values()
            .flatten()
            .any(|e| same_object(&e.object, object))
    }

    pub fn remove_object(&mut self, object: &Arc<dyn Tracked>) -> Option<Entry> {
        let (hash, pos) = self.buckets.iter().find_map(|(hash, bucket)| {
            bucket
                .iter()
                .position(|e| same_object(&e.object, object))
                .map(|pos| (*hash, pos))
        })?;
        let bucket = self.buckets.get_mut(&hash)?;
        let entry = bucket.remove(pos);
        if bucket.is_empty() {
            self.buckets.remove(&hash);
        }
        Some(entry)
    }

    /// Entries in the order they entered the map.
    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        let mut entries: Vec<&Entry> = self.buckets.values().flatten().collect();
        entries.sort_by_key(|e| e.seq);
        entries.into_iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entry> {
        self.buckets.values_mut().flatten()
    }

    pub fn drain(&mut self) -> Vec<Entry> {
        let mut entries: Vec<Entry> = self.buckets.drain().flat_map(|(_, b)| b).collect();
        entries.sort_by_key(|e| e.seq);
        entries
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    /// Insert under an explicit hash, for exercising shared buckets.
    #[cfg(test)]
    fn insert_with_hash(&mut self, hash: u64, mut entry: Entry) {
        entry.seq = self.next_seq;
        self.next_seq += 1;
        self.buckets.entry(hash).or_default().push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::Instance;
    use ormtour_macros::Model;

    #[derive(Model, Debug, Clone)]
    struct Tag {
        #[orm(primary_key, auto_increment)]
        id: Option<i64>,
        label: String,
    }

    fn persistent(id: i64, label: &str) -> Instance<Tag> {
        Instance::new(Tag {
            id: Some(id),
            label: label.to_string(),
        })
    }

    fn entry(instance: &Instance<Tag>) -> Entry {
        let key = IdentityKey::new("tag", instance.primary_key().unwrap());
        Entry::new(key, instance.erased())
    }

    #[test]
    fn test_integer_widths_share_a_key() {
        let mut map = IdentityMap::default();
        let tag = persistent(1, "rust");
        map.insert(entry(&tag));

        assert!(map.get("tag", &[Value::Int(1)]).is_some());
        assert!(map.get("tag", &[Value::BigInt(1)]).is_some());
        assert!(map.get("tag", &[Value::BigInt(2)]).is_none());
        assert!(map.get("other", &[Value::BigInt(1)]).is_none());
    }

    #[test]
    fn test_iteration_follows_insertion_order() {
        let mut map = IdentityMap::default();
        for id in [5, 2, 9] {
            map.insert(entry(&persistent(id, "x")));
        }
        let ids: Vec<String> = map.iter().map(|e| e.key.to_string()).collect();
        assert_eq!(ids, vec!["tag(5)", "tag(2)", "tag(9)"]);
    }

    #[test]
    fn test_colliding_keys_keep_both_entries() {
        let mut map = IdentityMap::default();
        let first = persistent(1, "rust");
        let second = persistent(2, "sql");
        map.insert(entry(&first));
        let shared_hash = hash_key("tag", &[Value::BigInt(1)]);
        map.insert_with_hash(shared_hash, entry(&second));

        assert_eq!(map.len(), 2);
        let bucket_hit = map.buckets[&shared_hash]
            .iter()
            .find(|e| e.key.matches("tag", &[Value::BigInt(2)]))
            .unwrap();
        assert!(same_object(&bucket_hit.object, &second.erased()));
        assert!(same_object(
            &map.get("tag", &[Value::BigInt(1)]).unwrap().object,
            &first.erased()
        ));

        map.remove_object(&second.erased()).unwrap();
        assert!(map.get("tag", &[Value::BigInt(1)]).is_some());
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_insert_replaces_same_key() {
        let mut map = IdentityMap::default();
        let old = persistent(1, "old");
        let new = persistent(1, "new");
        map.insert(entry(&old));
        map.insert(entry(&new));
        assert_eq!(map.len(), 1);
        assert!(same_object(
            &map.get("tag", &[Value::Int(1)]).unwrap().object,
            &new.erased()
        ));
    }

    #[test]
    fn test_remove_by_object() {
        let mut map = IdentityMap::default();
        let tag = persistent(1, "rust");
        map.insert(entry(&tag));
        assert!(map.contains_object(&tag.erased()));

        let removed = map.remove_object(&tag.erased()).unwrap();
        assert_eq!(removed.key, IdentityKey::new("tag", vec![Value::BigInt(1)]));
        assert_eq!(map.len(), 0);
        assert!(map.remove_object(&tag.erased()).is_none());
    }

    #[test]
    fn test_changes_against_snapshot() {
        let tag = persistent(1, "rust");
        let mut e = entry(&tag);
        assert!(e.changes().is_empty());

        tag.write().label = "sql".to_string();
        assert_eq!(e.changes(), vec![("label", Value::Text("sql".into()))]);

        e.expired = true;
        assert_eq!(e.changes(), vec![("label", Value::Text("sql".into()))]);
    }

    #[test]
    fn test_key_display_and_json() {
        let key = IdentityKey::new("address", vec![Value::BigInt(3)]);
        assert_eq!(key.to_string(), "address(3)");
        let json = serde_json::to_value(&key).unwrap();
        assert_eq!(json["table"], "address");
    }
}
