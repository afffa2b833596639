pub mod builder;
mod sweeper;

use parking_lot::RwLock;
use priority_queue::PriorityQueue;
use std::borrow::Borrow;
use std::cmp::Reverse;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hashbrown::hash_map::{DefaultHashBuilder, HashMap};

use sweeper::Sweeper;

/// A sharded concurrent hashmap where every entry carries its own expiry.
///
/// Expired entries read as missing straight away, but they only leave memory on [`Self::sweep`],
/// which runs periodically on a background thread when the map is built with a sweep interval.
pub struct ExpiringMap<K, V, S = DefaultHashBuilder> {
    shards: Arc<Shards<K, V, S>>,
    _sweeper: Option<Sweeper>,
}

pub(crate) struct Shards<K, V, S> {
    build_hasher: S,
    shards: Box<[Shard<K, V>]>,
}

pub(crate) struct Shard<K, V> {
    table: RwLock<Table<K, V>>,
}

struct Table<K, V> {
    entries: HashMap<K, Entry<V>>,
    // only entries that can expire, soonest first
    expiring: PriorityQueue<K, Reverse<Instant>>,
}

struct Entry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

impl<K, V> ExpiringMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub fn new() -> Self {
        builder::MapBuilder::new().build(Default::default())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        builder::MapBuilder::new()
            .estimated_size(capacity)
            .build(Default::default())
    }
}

impl<K, V> Default for ExpiringMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> ExpiringMap<K, V, S> {
    /// The number of stored entries, including expired entries that haven't been swept yet
    pub fn len(&self) -> usize {
        self.shards
            .shards
            .iter()
            .map(|s| s.table.read().entries.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V, S> ExpiringMap<K, V, S>
where
    K: Eq + Hash + Clone,
    V: Clone,
    S: BuildHasher,
{
    /// Insert a value that expires `ttl` from now, returning the previous live value
    pub fn insert(&self, key: K, value: V, ttl: Duration) -> Option<V> {
        let shard = self.shards.shard(&key);

        shard.insert(key, value, Instant::now().checked_add(ttl))
    }

    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.shards.shard(key).get(key, Instant::now())
    }

    /// Remove a key, returning its value if it was still live
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.shards.shard(key).remove(key, Instant::now())
    }

    /// Drop every expired entry, returning how many were removed
    pub fn sweep(&self) -> usize {
        self.shards.sweep()
    }
}

impl<K, V, S> Shards<K, V, S>
where
    K: Eq + Hash + Clone,
    S: BuildHasher,
{
    fn shard<Q>(&self, key: &Q) -> &Shard<K, V>
    where
        Q: Hash + ?Sized,
    {
        let hash = hash_key(&self.build_hasher, key);

        // shards is always a non zero power of two
        &self.shards[hash as usize & (self.shards.len() - 1)]
    }

    pub(crate) fn sweep(&self) -> usize {
        let now = Instant::now();
        let removed = self.shards.iter().map(|s| s.sweep(now)).sum();

        if removed > 0 {
            tracing::trace!(removed, "swept expired entries");
        }

        removed
    }
}

impl<K, V> Shard<K, V>
where
    K: Eq + Hash + Clone,
{
    fn new(capacity: usize) -> Self {
        Shard {
            table: RwLock::new(Table {
                entries: HashMap::with_capacity(capacity),
                expiring: PriorityQueue::new(),
            }),
        }
    }

    fn insert(&self, key: K, value: V, expires_at: Option<Instant>) -> Option<V>
    where
        V: Clone,
    {
        let now = Instant::now();
        let mut table = self.table.write();

        match expires_at {
            Some(at) => {
                table.expiring.push(key.clone(), Reverse(at));
            }
            None => {
                table.expiring.remove(&key);
            }
        }

        table
            .entries
            .insert(key, Entry { value, expires_at })
            .filter(|old| old.is_live(now))
            .map(|old| old.value)
    }

    fn get<Q>(&self, key: &Q, now: Instant) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        let table = self.table.read();

        table
            .entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone())
    }

    fn remove<Q>(&self, key: &Q, now: Instant) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut table = self.table.write();

        let (key, entry) = table.entries.remove_entry(key)?;
        table.expiring.remove(&key);

        entry.is_live(now).then_some(entry.value)
    }

    fn sweep(&self, now: Instant) -> usize {
        let mut table = self.table.write();
        let mut removed = 0;

        while let Some(&Reverse(at)) = table.expiring.peek().map(|(_, at)| at) {
            if at > now {
                break;
            }

            if let Some((key, _)) = table.expiring.pop() {
                table.entries.remove(&key);
                removed += 1;
            }
        }

        removed
    }
}

pub(crate) fn hash_key<Q, S>(build_hasher: &S, key: &Q) -> u64
where
    Q: Hash + ?Sized,
    S: BuildHasher,
{
    let mut hasher = build_hasher.build_hasher();
    key.hash(&mut hasher);
    hasher.finish()
}

fn max_parallelism() -> usize {
    use std::sync::atomic::{AtomicUsize, Ordering};
    static AVAILABLE_PARALLELISM: AtomicUsize = AtomicUsize::new(0);
    let mut ap = AVAILABLE_PARALLELISM.load(Ordering::Relaxed);
    if ap == 0 {
        ap = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        AVAILABLE_PARALLELISM.store(ap, Ordering::Relaxed);
    }
    ap
}
