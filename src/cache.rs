use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde_json::Value;
use uuid::Uuid;

/// The fields a query session can accumulate across workflow steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheField {
    Question,
    Sql,
    Results,
    Columns,
    Figure,
    Error,
}

impl CacheField {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheField::Question => "question",
            CacheField::Sql => "sql",
            CacheField::Results => "results",
            CacheField::Columns => "columns",
            CacheField::Figure => "figure",
            CacheField::Error => "error",
        }
    }
}

#[derive(Debug, Clone)]
struct FieldSlot {
    value: Value,
    // Process-global sequence assigned the first time the field was written.
    // Overwrites keep the original position so history ordering is stable.
    first_set: u64,
}

#[derive(Debug, Default)]
struct CacheEntry {
    fields: HashMap<CacheField, FieldSlot>,
}

/// In-memory store for query state shared across workflow steps.
///
/// Entries are keyed by an opaque handle minted with [`QueryCache::new_handle`]
/// and live for the process lifetime. Writes are last-write-wins per field;
/// a later step never clears what an earlier step stored.
#[derive(Debug, Default)]
pub struct QueryCache {
    entries: DashMap<Uuid, CacheEntry>,
    write_seq: AtomicU64,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh handle. Handles are never reused.
    pub fn new_handle(&self) -> Uuid {
        Uuid::new_v4()
    }

    /// Set `field` for `id`, creating the entry on first write.
    pub fn set(&self, id: Uuid, field: CacheField, value: Value) {
        let seq = self.write_seq.fetch_add(1, Ordering::Relaxed);
        let mut entry = self.entries.entry(id).or_default();
        match entry.fields.entry(field) {
            Entry::Occupied(mut slot) => {
                slot.get_mut().value = value;
            }
            Entry::Vacant(slot) => {
                slot.insert(FieldSlot {
                    value,
                    first_set: seq,
                });
            }
        }
    }

    /// Returns the stored value, or `None` for an unknown handle or field.
    pub fn get(&self, id: Uuid, field: CacheField) -> Option<Value> {
        self.entries
            .get(&id)
            .and_then(|entry| entry.fields.get(&field).map(|slot| slot.value.clone()))
    }

    pub fn exists(&self, id: Uuid) -> bool {
        self.entries.contains_key(&id)
    }

    /// All `(handle, value)` pairs carrying `field`, ordered by when the field
    /// was first set for each handle.
    pub fn list_by_field(&self, field: CacheField) -> Vec<(Uuid, Value)> {
        let mut items: Vec<(u64, Uuid, Value)> = self
            .entries
            .iter()
            .filter_map(|entry| {
                entry
                    .fields
                    .get(&field)
                    .map(|slot| (slot.first_set, *entry.key(), slot.value.clone()))
            })
            .collect();
        items.sort_by_key(|(seq, _, _)| *seq);
        items.into_iter().map(|(_, id, value)| (id, value)).collect()
    }

    pub fn delete(&self, id: Uuid) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn handles_are_unique() {
        let cache = QueryCache::new();
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(cache.new_handle()));
        }
    }

    #[test]
    fn get_on_unknown_handle_or_field_is_none() {
        let cache = QueryCache::new();
        let id = cache.new_handle();
        assert_eq!(cache.get(id, CacheField::Question), None);

        cache.set(id, CacheField::Question, json!("How many customers?"));
        assert_eq!(cache.get(id, CacheField::Sql), None);
        assert_eq!(cache.get(Uuid::new_v4(), CacheField::Question), None);
    }

    #[test]
    fn set_overwrites_last_write_wins() {
        let cache = QueryCache::new();
        let id = cache.new_handle();
        cache.set(id, CacheField::Sql, json!("SELECT 1"));
        cache.set(id, CacheField::Sql, json!("SELECT 2"));
        assert_eq!(cache.get(id, CacheField::Sql), Some(json!("SELECT 2")));
    }

    #[test]
    fn overwrite_keeps_other_fields() {
        let cache = QueryCache::new();
        let id = cache.new_handle();
        cache.set(id, CacheField::Question, json!("q"));
        cache.set(id, CacheField::Sql, json!("SELECT 1"));
        cache.set(id, CacheField::Sql, json!("SELECT 2"));
        assert_eq!(cache.get(id, CacheField::Question), Some(json!("q")));
    }

    #[test]
    fn exists_only_after_first_write() {
        let cache = QueryCache::new();
        let id = cache.new_handle();
        assert!(!cache.exists(id));
        cache.set(id, CacheField::Question, json!("q"));
        assert!(cache.exists(id));
    }

    #[test]
    fn list_by_field_orders_by_first_set_of_that_field() {
        let cache = QueryCache::new();
        let a = cache.new_handle();
        let b = cache.new_handle();
        let c = cache.new_handle();

        // b gets an unrelated field first; question ordering must not care.
        cache.set(b, CacheField::Sql, json!("SELECT 1"));
        cache.set(a, CacheField::Question, json!("first"));
        cache.set(b, CacheField::Question, json!("second"));
        cache.set(c, CacheField::Question, json!("third"));
        // Overwriting must not move a to the back.
        cache.set(a, CacheField::Question, json!("first again"));

        let listed = cache.list_by_field(CacheField::Question);
        let ids: Vec<Uuid> = listed.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![a, b, c]);
        assert_eq!(listed[0].1, json!("first again"));
    }

    #[test]
    fn delete_clear_size() {
        let cache = QueryCache::new();
        let id = cache.new_handle();
        assert_eq!(cache.size(), 0);
        assert!(!cache.delete(id));

        cache.set(id, CacheField::Question, json!("q"));
        assert_eq!(cache.size(), 1);
        assert!(cache.delete(id));
        assert!(!cache.exists(id));

        cache.set(cache.new_handle(), CacheField::Question, json!("q"));
        cache.set(cache.new_handle(), CacheField::Question, json!("q"));
        cache.clear();
        assert_eq!(cache.size(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_writers_on_distinct_handles_do_not_interfere() {
        let cache = Arc::new(QueryCache::new());
        let mut tasks = Vec::new();
        for n in 0..50u32 {
            let cache = cache.clone();
            tasks.push(tokio::spawn(async move {
                let id = cache.new_handle();
                cache.set(id, CacheField::Question, json!(format!("question {n}")));
                cache.set(id, CacheField::Sql, json!(format!("SELECT {n}")));
                (id, n)
            }));
        }
        for task in tasks {
            let (id, n) = task.await.expect("writer task panicked");
            assert_eq!(
                cache.get(id, CacheField::Question),
                Some(json!(format!("question {n}")))
            );
            assert_eq!(
                cache.get(id, CacheField::Sql),
                Some(json!(format!("SELECT {n}")))
            );
        }
        assert_eq!(cache.size(), 50);
    }
}
