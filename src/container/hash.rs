use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::RwLock;

/// ExtendibleHashTable implements a concurrent hash map with a dynamic
/// directory. A key is dispatched to a bucket by the low `global_depth`
/// bits of its hash. When a bucket overflows, only that bucket splits;
/// the directory doubles only when the overflowing bucket already
/// distinguishes `global_depth` bits.
///
/// The directory holds indices into a bucket arena instead of shared
/// bucket handles: several directory slots may carry the same index, and
/// a split allocates a fresh arena slot and repoints half of the aliases.
///
/// Locking is two-level. A read-write lock protects the directory (global
/// depth, slots, arena membership) and each bucket carries its own lock
/// over its entries and local depth. Lookups take both in shared mode,
/// mutations of a single bucket take the directory lock in shared mode
/// and only their target bucket exclusively, so traffic on one bucket
/// does not block the others. Directory growth and bucket splits retake
/// the directory lock exclusively.
///
/// The buffer pool uses it as the page table (page id to frame id), but
/// any hashable key works.
pub struct ExtendibleHashTable<K, V> {
    bucket_size: usize,
    dir: RwLock<Directory<K, V>>,
}

struct Directory<K, V> {
    global_depth: usize,
    num_buckets: usize,
    /// slots[i] is an index into `buckets`; the slot count is always
    /// 1 << global_depth.
    slots: Vec<usize>,
    /// bucket arena. Buckets are never freed, a split only adds one.
    buckets: Vec<Bucket<K, V>>,
}

struct Bucket<K, V> {
    data: RwLock<BucketData<K, V>>,
}

struct BucketData<K, V> {
    /// number of low hash bits this bucket distinguishes, <= global_depth.
    local_depth: usize,
    items: Vec<(K, V)>,
}

impl<K, V> Bucket<K, V> {
    fn new(local_depth: usize, capacity: usize) -> Self {
        let data = BucketData { local_depth, items: Vec::with_capacity(capacity) };
        Bucket { data: RwLock::new(data) }
    }
}

fn hash_of<K: Hash>(key: &K) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

impl<K: Hash + Eq, V> ExtendibleHashTable<K, V> {
    /// Create a table with a single bucket holding at most `bucket_size`
    /// entries.
    pub fn new(bucket_size: usize) -> Self {
        assert!(bucket_size > 0, "bucket size should be larger than zero");
        let dir = Directory {
            global_depth: 0,
            num_buckets: 1,
            slots: vec![0],
            buckets: vec![Bucket::new(0, bucket_size)],
        };
        ExtendibleHashTable { bucket_size, dir: RwLock::new(dir) }
    }

    /// Look up the value stored under the key, if any.
    pub fn find(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        let dir = self.dir.read().unwrap();
        let bucket = &dir.buckets[dir.slots[dir.index_of(key)]];
        let data = bucket.data.read().unwrap();
        data.items.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
    }

    /// Insert the key/value pair, overwriting the value if the key is
    /// already present. Splits the target bucket (growing the directory
    /// as needed) until there is room.
    pub fn insert(&self, key: K, value: V) {
        // fast path: lock only the target bucket. The directory stays
        // shared, so inserts into other buckets and lookups proceed.
        {
            let dir = self.dir.read().unwrap();
            let bucket = &dir.buckets[dir.slots[dir.index_of(&key)]];
            let mut data = bucket.data.write().unwrap();
            if let Some((_, v)) = data.items.iter_mut().find(|(k, _)| *k == key) {
                *v = value;
                return;
            }
            if data.items.len() < self.bucket_size {
                data.items.push((key, value));
                return;
            }
        }

        // the target bucket is full: retake the directory exclusively and
        // split until there is room. Another thread may have raced in
        // between, the loop re-checks everything from scratch.
        let mut dir = self.dir.write().unwrap();
        dir.insert(key, value, self.bucket_size)
    }

    /// Remove the key. Returns true iff the key was present. Buckets are
    /// not merged and the directory never shrinks, so the directory lock
    /// stays shared and only the target bucket is locked exclusively.
    pub fn remove(&self, key: &K) -> bool {
        let dir = self.dir.read().unwrap();
        let bucket = &dir.buckets[dir.slots[dir.index_of(key)]];
        let mut data = bucket.data.write().unwrap();
        match data.items.iter().position(|(k, _)| k == key) {
            Some(pos) => {
                data.items.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Number of directory-indexing bits.
    pub fn global_depth(&self) -> usize {
        self.dir.read().unwrap().global_depth
    }

    /// Local depth of the bucket referenced by the given directory slot.
    pub fn local_depth(&self, dir_index: usize) -> usize {
        let dir = self.dir.read().unwrap();
        let local_depth = dir.buckets[dir.slots[dir_index]].data.read().unwrap().local_depth;
        local_depth
    }

    /// Number of distinct buckets.
    pub fn num_buckets(&self) -> usize {
        self.dir.read().unwrap().num_buckets
    }

    /// Total number of stored entries.
    pub fn len(&self) -> usize {
        let dir = self.dir.read().unwrap();
        dir.buckets.iter().map(|b| b.data.read().unwrap().items.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Hash + Eq, V> Directory<K, V> {
    /// Directory slot of the key: the low global_depth bits of its hash.
    fn index_of(&self, key: &K) -> usize {
        let mask = (1usize << self.global_depth) - 1;
        hash_of(key) as usize & mask
    }

    /// Insert under the exclusive directory lock. Bucket locks are still
    /// taken along the way, uncontended here since every shared-mode path
    /// first goes through the directory lock.
    fn insert(&mut self, key: K, value: V, bucket_size: usize) {
        loop {
            let bucket_index = self.slots[self.index_of(&key)];
            let mut data = self.buckets[bucket_index].data.write().unwrap();
            if let Some((_, v)) = data.items.iter_mut().find(|(k, _)| *k == key) {
                *v = value;
                return;
            }
            if data.items.len() < bucket_size {
                data.items.push((key, value));
                return;
            }
            let local_depth = data.local_depth;
            drop(data);

            // the target bucket is full. Double the directory if the bucket
            // already distinguishes every directory bit, then split it. The
            // new bucket may end up full again when many keys collide on the
            // next bit as well, hence the loop.
            if local_depth == self.global_depth {
                self.grow_directory();
            }
            let dir_index = self.index_of(&key);
            self.split_bucket(dir_index, bucket_size);
        }
    }

    /// Double the directory. Every new slot initially aliases the bucket of
    /// its lower twin, so slot i and slot i + old_size keep resolving to
    /// the same bucket until a split repoints one of them.
    fn grow_directory(&mut self) {
        let old_size = self.slots.len();
        for i in 0..old_size {
            let bucket_index = self.slots[i];
            self.slots.push(bucket_index);
        }
        self.global_depth += 1;
    }

    /// Split the bucket referenced by the given directory slot into two
    /// buckets of local depth + 1 and redistribute its entries.
    fn split_bucket(&mut self, dir_index: usize, bucket_size: usize) {
        let old_index = self.slots[dir_index];
        let new_index = self.buckets.len();

        let mut old = self.buckets[old_index].data.write().unwrap();
        let old_depth = old.local_depth;
        debug_assert!(old_depth < self.global_depth);
        old.local_depth = old_depth + 1;
        let items = std::mem::take(&mut old.items);
        drop(old);

        self.buckets.push(Bucket::new(old_depth + 1, bucket_size));

        // every aliasing slot agrees with dir_index on the low old_depth
        // bits; the next bit now tells the two halves apart.
        for slot in 0..self.slots.len() {
            if self.slots[slot] == old_index && (slot >> old_depth) & 1 == 1 {
                self.slots[slot] = new_index;
            }
        }

        // rehash the split bucket's entries into the two halves. No room
        // check here: a redistribution target can exceed its capacity
        // transiently and the insert loop keeps splitting until it fits.
        for (k, v) in items {
            let bucket_index = self.slots[self.index_of(&k)];
            self.buckets[bucket_index].data.write().unwrap().items.push((k, v));
        }

        self.num_buckets += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    /// Directory invariants: power-of-two size, local depths bounded by the
    /// global depth, and aliases of one bucket congruent modulo
    /// 2^local_depth.
    fn check_directory<K: Hash + Eq, V>(table: &ExtendibleHashTable<K, V>) {
        let dir = table.dir.read().unwrap();
        assert_eq!(1 << dir.global_depth, dir.slots.len());
        for (slot, &bucket_index) in dir.slots.iter().enumerate() {
            let local_depth = dir.buckets[bucket_index].data.read().unwrap().local_depth;
            assert!(local_depth <= dir.global_depth);
            for (other, &other_index) in dir.slots.iter().enumerate() {
                if other_index == bucket_index {
                    assert_eq!(slot % (1 << local_depth), other % (1 << local_depth));
                }
            }
        }
    }

    #[test]
    fn test_point_ops() {
        let table: ExtendibleHashTable<i64, usize> = ExtendibleHashTable::new(4);

        assert_eq!(None, table.find(&1));
        assert!(!table.remove(&1));

        table.insert(1, 10);
        table.insert(2, 20);
        assert_eq!(Some(10), table.find(&1));
        assert_eq!(Some(20), table.find(&2));
        assert_eq!(2, table.len());

        // insert is an upsert
        table.insert(1, 11);
        assert_eq!(Some(11), table.find(&1));
        assert_eq!(2, table.len());

        assert!(table.remove(&1));
        assert_eq!(None, table.find(&1));
        assert!(!table.remove(&1));
        assert_eq!(Some(20), table.find(&2));
    }

    #[test]
    fn test_directory_growth() {
        let table: ExtendibleHashTable<u64, u64> = ExtendibleHashTable::new(2);

        let mut num_buckets = table.num_buckets();
        assert_eq!(1, num_buckets);
        for key in 0..64u64 {
            table.insert(key, key * 2);
            // bucket count only ever grows
            assert!(table.num_buckets() >= num_buckets);
            num_buckets = table.num_buckets();
            check_directory(&table);
        }

        assert!(table.global_depth() > 0);
        assert_eq!(64, table.len());
        for key in 0..64u64 {
            assert_eq!(Some(key * 2), table.find(&key), "key {} lost in growth", key);
        }

        // removals leave the directory in place
        for key in 0..64u64 {
            assert!(table.remove(&key));
        }
        assert!(table.is_empty());
        assert_eq!(num_buckets, table.num_buckets());
        check_directory(&table);
    }

    #[test]
    fn test_colliding_keys_split_until_separated() {
        // four keys whose hashes agree on the low 3 bits, found by probing
        // the same hash the table uses. A bucket of capacity 2 then has to
        // split past depth 3 before any two of them can part ways.
        let mut keys = vec![];
        let mut candidate = 0u64;
        while keys.len() < 4 {
            if hash_of(&candidate) & 0b111 == 0b101 {
                keys.push(candidate);
            }
            candidate += 1;
        }

        let table: ExtendibleHashTable<u64, u64> = ExtendibleHashTable::new(2);
        for &key in &keys {
            table.insert(key, key + 100);
        }

        assert!(table.global_depth() >= 3, "global depth is {}", table.global_depth());
        for &key in &keys {
            assert_eq!(Some(key + 100), table.find(&key));
        }
        check_directory(&table);
    }

    #[test]
    fn test_index_within_directory() {
        let table: ExtendibleHashTable<u64, ()> = ExtendibleHashTable::new(2);
        for key in 0..256u64 {
            table.insert(key, ());
            let dir = table.dir.read().unwrap();
            assert!(dir.index_of(&key) < dir.slots.len());
        }
    }

    #[test]
    fn test_concurrent_insert_find() {
        let table: Arc<ExtendibleHashTable<u64, u64>> = Arc::new(ExtendibleHashTable::new(2));

        let mut handles = vec![];
        for t in 0..4u64 {
            let table = Arc::clone(&table);
            handles.push(thread::spawn(move || {
                for key in (t * 256)..((t + 1) * 256) {
                    table.insert(key, key + 1);
                    assert_eq!(Some(key + 1), table.find(&key));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(1024, table.len());
        for key in 0..1024u64 {
            assert_eq!(Some(key + 1), table.find(&key));
        }
        check_directory(&table);
    }
}
