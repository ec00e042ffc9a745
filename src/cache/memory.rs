//! In-process fast store.
//!
//! One `RwLock` guards the whole keyspace, which gives every trait call the
//! single-operation atomicity the engine relies on. Expiry uses the tokio
//! clock, so a paused test runtime controls marker lifetimes.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use async_trait::async_trait;
use tokio::time::Instant;

use super::lock::{rw_read, rw_write};
use super::store::{FastStore, FieldMap, ScoredMember, StoreError, ViewKeys, ViewOutcome};

const SOURCE: &str = "cache::memory";

#[derive(Debug, Clone)]
struct RankKey {
    score: f64,
    member: String,
}

impl PartialEq for RankKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RankKey {}

impl PartialOrd for RankKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RankKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| self.member.cmp(&other.member))
    }
}

#[derive(Debug, Default)]
struct SortedSet {
    scores: HashMap<String, f64>,
    order: BTreeSet<RankKey>,
}

impl SortedSet {
    fn insert_if_absent(&mut self, member: String, score: f64) -> bool {
        if self.scores.contains_key(&member) {
            return false;
        }
        self.order.insert(RankKey {
            score,
            member: member.clone(),
        });
        self.scores.insert(member, score);
        true
    }

    fn set(&mut self, member: &str, score: f64) {
        self.remove(member);
        self.insert_if_absent(member.to_string(), score);
    }

    fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(score) => {
                self.order.remove(&RankKey {
                    score,
                    member: member.to_string(),
                });
                true
            }
            None => false,
        }
    }

    fn incr(&mut self, member: &str, delta: f64) -> f64 {
        let score = self.scores.get(member).copied().unwrap_or(0.0) + delta;
        self.set(member, score);
        score
    }

    fn len(&self) -> usize {
        self.scores.len()
    }

    fn range_desc(&self, start: i64, stop: i64) -> Vec<ScoredMember> {
        let len = self.len() as i64;
        let start = if start < 0 { (len + start).max(0) } else { start };
        let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
        if start > stop || start >= len {
            return Vec::new();
        }
        self.order
            .iter()
            .rev()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .map(|key| ScoredMember {
                member: key.member.clone(),
                score: key.score,
            })
            .collect()
    }
}

#[derive(Debug)]
enum Value {
    Hash(FieldMap),
    Sorted(SortedSet),
    Flag,
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn persistent(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| deadline > now)
    }
}

#[derive(Debug, Default)]
struct Keyspace {
    entries: HashMap<String, Entry>,
}

impl Keyspace {
    fn live(&self, key: &str) -> Option<&Entry> {
        let now = Instant::now();
        self.entries.get(key).filter(|entry| entry.is_live(now))
    }

    fn live_mut(&mut self, key: &str) -> Option<&mut Entry> {
        let now = Instant::now();
        if self.entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }

    fn hash(&self, key: &str) -> Result<Option<&FieldMap>, StoreError> {
        match self.live(key).map(|entry| &entry.value) {
            None => Ok(None),
            Some(Value::Hash(fields)) => Ok(Some(fields)),
            Some(_) => Err(StoreError::wrong_type(key)),
        }
    }

    fn hash_mut(&mut self, key: &str) -> Result<Option<&mut FieldMap>, StoreError> {
        match self.live_mut(key).map(|entry| &mut entry.value) {
            None => Ok(None),
            Some(Value::Hash(fields)) => Ok(Some(fields)),
            Some(_) => Err(StoreError::wrong_type(key)),
        }
    }

    fn sorted(&self, key: &str) -> Result<Option<&SortedSet>, StoreError> {
        match self.live(key).map(|entry| &entry.value) {
            None => Ok(None),
            Some(Value::Sorted(set)) => Ok(Some(set)),
            Some(_) => Err(StoreError::wrong_type(key)),
        }
    }

    fn sorted_mut(&mut self, key: &str) -> Result<Option<&mut SortedSet>, StoreError> {
        match self.live_mut(key).map(|entry| &mut entry.value) {
            None => Ok(None),
            Some(Value::Sorted(set)) => Ok(Some(set)),
            Some(_) => Err(StoreError::wrong_type(key)),
        }
    }

    fn sorted_or_create(&mut self, key: &str) -> Result<&mut SortedSet, StoreError> {
        if self.sorted_mut(key)?.is_none() {
            self.entries.insert(
                key.to_string(),
                Entry::persistent(Value::Sorted(SortedSet::default())),
            );
        }
        match self.entries.get_mut(key).map(|entry| &mut entry.value) {
            Some(Value::Sorted(set)) => Ok(set),
            _ => Err(StoreError::wrong_type(key)),
        }
    }

    /// An emptied set disappears, matching the "absent means rebuild" contract.
    fn drop_if_empty(&mut self, key: &str) {
        if matches!(
            self.entries.get(key).map(|entry| &entry.value),
            Some(Value::Sorted(set)) if set.len() == 0
        ) {
            self.entries.remove(key);
        }
    }
}

/// Fast store held in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    keyspace: RwLock<Keyspace>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with [`StoreError::Unavailable`]
    /// until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, AtomicOrdering::SeqCst);
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        rw_read(&self.keyspace, SOURCE, "len")
            .entries
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.offline.load(AtomicOrdering::SeqCst) {
            return Err(StoreError::unavailable("memory store switched offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl FastStore for MemoryStore {
    async fn hash_get_all(&self, key: &str) -> Result<Option<FieldMap>, StoreError> {
        self.ensure_online()?;
        let keyspace = rw_read(&self.keyspace, SOURCE, "hash_get_all");
        Ok(keyspace.hash(key)?.cloned())
    }

    async fn hash_set_all(
        &self,
        key: &str,
        fields: Vec<(String, String)>,
    ) -> Result<(), StoreError> {
        self.ensure_online()?;
        let mut keyspace = rw_write(&self.keyspace, SOURCE, "hash_set_all");
        keyspace.entries.insert(
            key.to_string(),
            Entry::persistent(Value::Hash(fields.into_iter().collect())),
        );
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.ensure_online()?;
        Ok(rw_read(&self.keyspace, SOURCE, "exists").live(key).is_some())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
        self.ensure_online()?;
        let mut keyspace = rw_write(&self.keyspace, SOURCE, "delete");
        let mut removed = 0;
        for key in keys {
            if keyspace.live_mut(key).is_some() {
                keyspace.entries.remove(key);
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn sorted_add(&self, key: &str, entries: Vec<ScoredMember>) -> Result<u64, StoreError> {
        self.ensure_online()?;
        if entries.is_empty() {
            return Ok(0);
        }
        let mut keyspace = rw_write(&self.keyspace, SOURCE, "sorted_add");
        let set = keyspace.sorted_or_create(key)?;
        let added = entries
            .into_iter()
            .filter(|entry| set.insert_if_absent(entry.member.clone(), entry.score))
            .count();
        Ok(added as u64)
    }

    async fn sorted_set_if_present(
        &self,
        key: &str,
        member: &str,
        score: f64,
    ) -> Result<bool, StoreError> {
        self.ensure_online()?;
        let mut keyspace = rw_write(&self.keyspace, SOURCE, "sorted_set_if_present");
        match keyspace.sorted_mut(key)? {
            Some(set) => {
                set.set(member, score);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn sorted_remove(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.ensure_online()?;
        let mut keyspace = rw_write(&self.keyspace, SOURCE, "sorted_remove");
        let removed = match keyspace.sorted_mut(key)? {
            Some(set) => set.remove(member),
            None => false,
        };
        keyspace.drop_if_empty(key);
        Ok(removed)
    }

    async fn sorted_score(&self, key: &str, member: &str) -> Result<Option<f64>, StoreError> {
        self.ensure_online()?;
        let keyspace = rw_read(&self.keyspace, SOURCE, "sorted_score");
        Ok(keyspace
            .sorted(key)?
            .and_then(|set| set.scores.get(member).copied()))
    }

    async fn sorted_card(&self, key: &str) -> Result<u64, StoreError> {
        self.ensure_online()?;
        let keyspace = rw_read(&self.keyspace, SOURCE, "sorted_card");
        Ok(keyspace.sorted(key)?.map_or(0, |set| set.len() as u64))
    }

    async fn sorted_range_desc(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<Vec<ScoredMember>, StoreError> {
        self.ensure_online()?;
        let keyspace = rw_read(&self.keyspace, SOURCE, "sorted_range_desc");
        Ok(keyspace
            .sorted(key)?
            .map(|set| set.range_desc(start, stop))
            .unwrap_or_default())
    }

    async fn record_view(&self, keys: ViewKeys<'_>) -> Result<ViewOutcome, StoreError> {
        self.ensure_online()?;
        let mut keyspace = rw_write(&self.keyspace, SOURCE, "record_view");

        match keyspace.sorted(keys.index)? {
            None => return Ok(ViewOutcome::Unranked),
            Some(set) if !set.scores.contains_key(keys.member) => {
                return Ok(ViewOutcome::UnknownMember);
            }
            Some(_) => {}
        }
        if keyspace.live_mut(keys.marker).is_some() {
            return Ok(ViewOutcome::Cooldown);
        }
        keyspace.hash(keys.record)?;

        keyspace.entries.insert(
            keys.marker.to_string(),
            Entry {
                value: Value::Flag,
                expires_at: Some(Instant::now() + keys.cooldown),
            },
        );
        if let Some(fields) = keyspace.hash_mut(keys.record)? {
            incr_field(fields, keys.record, keys.record_field, 1)?;
        }
        let score = keyspace.sorted_or_create(keys.index)?.incr(keys.member, 1.0);
        Ok(ViewOutcome::Counted(score))
    }
}

fn incr_field(fields: &mut FieldMap, key: &str, field: &str, delta: i64) -> Result<i64, StoreError> {
    let current = match fields.get(field) {
        Some(raw) => raw
            .parse::<i64>()
            .map_err(|_| StoreError::wrong_type(format!("{key}.{field}")))?,
        None => 0,
    };
    let next = current + delta;
    fields.insert(field.to_string(), next.to_string());
    Ok(next)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn scored(member: &str, score: f64) -> ScoredMember {
        ScoredMember {
            member: member.to_string(),
            score,
        }
    }

    #[tokio::test]
    async fn range_reads_descending_with_negative_stop() {
        let store = MemoryStore::new();
        store
            .sorted_add("z", vec![scored("a", 1.0), scored("b", 3.0), scored("c", 2.0)])
            .await
            .expect("add");

        let all = store.sorted_range_desc("z", 0, -1).await.expect("range");
        let members: Vec<_> = all.iter().map(|m| m.member.as_str()).collect();
        assert_eq!(members, ["b", "c", "a"]);

        let tail = store.sorted_range_desc("z", 1, 10).await.expect("range");
        assert_eq!(tail.len(), 2);
        assert!(store.sorted_range_desc("z", 5, 9).await.expect("range").is_empty());
    }

    #[tokio::test]
    async fn repeated_add_keeps_existing_scores() {
        let store = MemoryStore::new();
        store.sorted_add("z", vec![scored("a", 1.0)]).await.expect("add");
        assert!(store.sorted_set_if_present("z", "a", 5.0).await.expect("set"));
        let added = store
            .sorted_add("z", vec![scored("a", 1.0), scored("b", 2.0)])
            .await
            .expect("add");
        assert_eq!(added, 1);
        assert_eq!(store.sorted_score("z", "a").await.expect("score"), Some(5.0));
        assert_eq!(store.sorted_card("z").await.expect("card"), 2);
    }

    #[tokio::test]
    async fn conditional_set_never_creates_a_set() {
        let store = MemoryStore::new();
        assert!(!store.sorted_set_if_present("z", "a", 1.0).await.expect("set"));
        assert!(!store.exists("z").await.expect("exists"));

        store.sorted_add("z", vec![scored("a", 1.0)]).await.expect("add");
        assert!(store.sorted_set_if_present("z", "b", 9.0).await.expect("set"));
        assert_eq!(store.sorted_score("z", "b").await.expect("score"), Some(9.0));
    }

    #[tokio::test]
    async fn removing_last_member_drops_the_set() {
        let store = MemoryStore::new();
        store.sorted_add("z", vec![scored("a", 1.0)]).await.expect("add");
        assert!(store.sorted_remove("z", "a").await.expect("remove"));
        assert!(!store.exists("z").await.expect("exists"));
    }

    #[tokio::test]
    async fn type_mismatch_is_reported() {
        let store = MemoryStore::new();
        store
            .hash_set_all("h", vec![("f".to_string(), "1".to_string())])
            .await
            .expect("set");
        assert_eq!(
            store.sorted_card("h").await,
            Err(StoreError::wrong_type("h"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn view_marker_expires_after_cooldown() {
        let store = MemoryStore::new();
        store.sorted_add("views", vec![scored("1", 0.0)]).await.expect("add");
        let keys = ViewKeys {
            marker: "1:v",
            cooldown: Duration::from_secs(30),
            record: "article:1:Hash",
            record_field: "view_count",
            index: "views",
            member: "1",
        };

        assert_eq!(store.record_view(keys).await, Ok(ViewOutcome::Counted(1.0)));
        assert_eq!(store.record_view(keys).await, Ok(ViewOutcome::Cooldown));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(store.record_view(keys).await, Ok(ViewOutcome::Counted(2.0)));
    }

    #[tokio::test]
    async fn view_on_absent_index_writes_nothing() {
        let store = MemoryStore::new();
        let keys = ViewKeys {
            marker: "1:v",
            cooldown: Duration::from_secs(30),
            record: "article:1:Hash",
            record_field: "view_count",
            index: "views",
            member: "1",
        };
        assert_eq!(store.record_view(keys).await, Ok(ViewOutcome::Unranked));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn offline_store_fails_every_call() {
        let store = MemoryStore::new();
        store.set_offline(true);
        assert!(matches!(
            store.exists("k").await,
            Err(StoreError::Unavailable { .. })
        ));
    }
}
