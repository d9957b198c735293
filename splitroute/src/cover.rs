use rustc_hash::FxHashMap;
use sr_net::AddressBits;

/// Default capacity of the per-family cover caches.
pub const COVER_CACHE_CAPACITY: usize = 4094;

struct Entry {
    covered: bool,
    last_used: u64,
}

/// Bounded LRU cache of "is this address already inside an installed
/// subnet", keyed by the integer address. Eviction scans for the least
/// recently used entry, which is cheap at this capacity and only happens
/// once the cache is full.
pub struct CoverCache<B: AddressBits> {
    entries: FxHashMap<B, Entry>,
    tick: u64,
    capacity: usize,
}

impl<B: AddressBits> CoverCache<B> {
    pub fn new(capacity: usize) -> Self {
        Self { entries: FxHashMap::default(), tick: 0, capacity }
    }

    pub fn lookup(&mut self, address: B) -> Option<bool> {
        self.tick += 1;
        let tick = self.tick;
        self.entries.get_mut(&address).map(|entry| {
            entry.last_used = tick;
            entry.covered
        })
    }

    pub fn insert(&mut self, address: B, covered: bool) {
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&address) {
            if let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(address, _)| *address)
            {
                self.entries.remove(&oldest);
            }
        }
        self.tick += 1;
        self.entries.insert(address, Entry { covered, last_used: self.tick });
    }

    /// Drop everything. Called when a subnet is withdrawn, since cached
    /// positives would otherwise mask addresses that need re-learning.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
