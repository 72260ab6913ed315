use hashbrown::HashMap;

/// Cache hit/miss counters for the in-memory store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
}

/// Backing store for serialized microcode entries.
///
/// Entries are keyed by the 32-bit hash of the shader source and compile
/// configuration (see [`HlslProgram::source_key`]). The store holds opaque
/// byte blobs; interpretation is entirely the [`cache`] codec's business.
///
/// `saves_enabled` is the engine-wide toggle for whether freshly compiled
/// programs should be persisted at all; loading existing entries is always
/// allowed.
///
/// [`HlslProgram::source_key`]: crate::HlslProgram::source_key
/// [`cache`]: crate::cache
pub trait MicrocodeCache {
    fn contains(&self, key: u32) -> bool;

    fn load(&mut self, key: u32) -> Option<Vec<u8>>;

    fn store(&mut self, key: u32, blob: Vec<u8>);

    fn saves_enabled(&self) -> bool;
}

/// Process-local microcode cache. Saves are enabled by default.
#[derive(Debug)]
pub struct MemoryMicrocodeCache {
    entries: HashMap<u32, Vec<u8>>,
    saves_enabled: bool,
    stats: CacheStats,
}

impl MemoryMicrocodeCache {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            saves_enabled: true,
            stats: CacheStats::default(),
        }
    }

    pub fn set_saves_enabled(&mut self, enabled: bool) {
        self.saves_enabled = enabled;
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MemoryMicrocodeCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MicrocodeCache for MemoryMicrocodeCache {
    fn contains(&self, key: u32) -> bool {
        self.entries.contains_key(&key)
    }

    fn load(&mut self, key: u32) -> Option<Vec<u8>> {
        match self.entries.get(&key) {
            Some(blob) => {
                self.stats.hits = self.stats.hits.saturating_add(1);
                Some(blob.clone())
            }
            None => {
                self.stats.misses = self.stats.misses.saturating_add(1);
                None
            }
        }
    }

    fn store(&mut self, key: u32, blob: Vec<u8>) {
        self.stats.stores = self.stats.stores.saturating_add(1);
        self.entries.insert(key, blob);
    }

    fn saves_enabled(&self) -> bool {
        self.saves_enabled
    }
}
