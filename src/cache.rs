//! Page Cache
//!
//! Bounded in-memory cache from fixed-length binary keys to values, evicted a
//! page at a time in least-recently-used order.
//!
//! Entries are grouped into pages of `entries_per_page` slots. Full pages sit on
//! a circular list anchored by a sentinel, most recently used first. The page
//! currently being filled (the partial page) is kept off the list until its last
//! slot is written. When no page is free, the least recently used page is
//! emptied in one step and becomes the new partial page.
//!
//! Values are copied with the cache's duplicate function on the way in and on the
//! way out, so nothing handed to or returned from the cache aliases cache memory.
//!
//! [`PageCache`] takes `&mut self` and does no locking. [`SyncPageCache`] wraps it
//! in one exclusive lock; a read-write split would not help since every hit
//! reorders the list.

use crate::error::CacheError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Copies a value into or out of the cache.
pub type DuplicateFn<V> = Arc<dyn Fn(&V) -> Result<V, CacheError> + Send + Sync>;

/// Index of the list anchor in `PageCache::pages`.
const SENTINEL: usize = 0;

/// Shape of a cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheGeometry {
    /// Every key must be exactly this many bytes
    pub key_len: usize,
    /// Maximum number of pages ever allocated
    pub pages: usize,
    /// Slots per page
    pub entries_per_page: usize,
}

impl CacheGeometry {
    fn validate(&self) -> Result<(), CacheError> {
        if self.pages == 0 {
            return Err(CacheError::InvalidGeometry(
                "cache needs at least one page".to_string(),
            ));
        }
        if self.entries_per_page == 0 {
            return Err(CacheError::InvalidGeometry(
                "pages need at least one entry".to_string(),
            ));
        }
        Ok(())
    }
}

/// Hit, miss and eviction counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

struct Page<V> {
    prev: usize,
    next: usize,
    entries: Vec<(Vec<u8>, V)>,
}

impl<V> Page<V> {
    fn detached(capacity: usize) -> Self {
        Self {
            prev: SENTINEL,
            next: SENTINEL,
            entries: Vec::with_capacity(capacity),
        }
    }
}

/// Unsynchronized page cache
pub struct PageCache<V> {
    geometry: CacheGeometry,
    duplicate: DuplicateFn<V>,
    /// Slot 0 is the sentinel; allocated pages follow.
    pages: Vec<Page<V>>,
    /// key -> (page, slot)
    index: HashMap<Vec<u8>, (usize, usize)>,
    partial_page: Option<usize>,
    stats: CacheStats,
}

impl<V> PageCache<V> {
    /// Create a cache; pages are allocated lazily as entries arrive.
    pub fn new(geometry: CacheGeometry, duplicate: DuplicateFn<V>) -> Result<Self, CacheError> {
        geometry.validate()?;
        Ok(Self {
            geometry,
            duplicate,
            pages: vec![Page::detached(0)],
            index: HashMap::new(),
            partial_page: None,
            stats: CacheStats::default(),
        })
    }

    /// Look up `key`, promoting its page on a hit. A miss changes nothing.
    pub fn get(&mut self, key: &[u8]) -> Result<Option<V>, CacheError> {
        self.check_key(key)?;
        let Some(&(page, slot)) = self.index.get(key) else {
            self.stats.misses += 1;
            return Ok(None);
        };

        let value = (self.duplicate)(&self.pages[page].entries[slot].1)?;
        self.promote(page);
        self.stats.hits += 1;
        Ok(Some(value))
    }

    /// Insert or replace the value for `key`.
    ///
    /// If duplicating `value` fails the cache is left untouched.
    pub fn set(&mut self, key: &[u8], value: &V) -> Result<(), CacheError> {
        self.check_key(key)?;
        let copy = (self.duplicate)(value)?;

        if let Some(&(page, slot)) = self.index.get(key) {
            self.pages[page].entries[slot].1 = copy;
            self.promote(page);
            return Ok(());
        }

        let page = match self.partial_page {
            Some(page) => page,
            None => {
                let page = self.fresh_page();
                self.partial_page = Some(page);
                page
            }
        };

        let slot = self.pages[page].entries.len();
        self.pages[page].entries.push((key.to_vec(), copy));
        self.index.insert(key.to_vec(), (page, slot));

        if self.pages[page].entries.len() == self.geometry.entries_per_page {
            self.link_front(page);
            self.partial_page = None;
        }
        Ok(())
    }

    /// Whether `key` is cached, without touching recency.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Number of pages allocated so far
    pub fn page_count(&self) -> usize {
        self.pages.len() - 1
    }

    pub fn geometry(&self) -> CacheGeometry {
        self.geometry
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    fn check_key(&self, key: &[u8]) -> Result<(), CacheError> {
        if key.len() != self.geometry.key_len {
            return Err(CacheError::KeyLength {
                expected: self.geometry.key_len,
                actual: key.len(),
            });
        }
        Ok(())
    }

    /// Allocate a page if the budget allows, else empty the LRU page.
    fn fresh_page(&mut self) -> usize {
        if self.page_count() < self.geometry.pages {
            self.pages.push(Page::detached(self.geometry.entries_per_page));
            return self.pages.len() - 1;
        }

        // With no partial page every allocated page is full and on the list.
        let victim = self.pages[SENTINEL].prev;
        debug_assert_ne!(victim, SENTINEL);
        self.unlink(victim);
        for (key, _) in self.pages[victim].entries.drain(..) {
            self.index.remove(&key);
        }
        self.stats.evictions += 1;
        debug!(page = victim, "Evicted least recently used cache page");
        victim
    }

    fn promote(&mut self, page: usize) {
        if self.partial_page == Some(page) || self.pages[SENTINEL].next == page {
            return;
        }
        self.unlink(page);
        self.link_front(page);
    }

    fn unlink(&mut self, page: usize) {
        let (prev, next) = (self.pages[page].prev, self.pages[page].next);
        self.pages[prev].next = next;
        self.pages[next].prev = prev;
        self.pages[page].prev = SENTINEL;
        self.pages[page].next = SENTINEL;
    }

    fn link_front(&mut self, page: usize) {
        let first = self.pages[SENTINEL].next;
        self.pages[page].prev = SENTINEL;
        self.pages[page].next = first;
        self.pages[first].prev = page;
        self.pages[SENTINEL].next = page;
    }
}

impl<V: Clone + 'static> PageCache<V> {
    /// Cache whose duplicate function is `Clone::clone`.
    pub fn cloning(geometry: CacheGeometry) -> Result<Self, CacheError> {
        let duplicate: DuplicateFn<V> =
            Arc::new(|value: &V| -> Result<V, CacheError> { Ok(value.clone()) });
        Self::new(geometry, duplicate)
    }
}

impl<V> fmt::Debug for PageCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageCache")
            .field("geometry", &self.geometry)
            .field("entries", &self.index.len())
            .field("pages", &self.page_count())
            .field("stats", &self.stats)
            .finish()
    }
}

/// Page cache with every operation serialized behind one lock
pub struct SyncPageCache<V> {
    inner: Mutex<PageCache<V>>,
}

impl<V> SyncPageCache<V> {
    pub fn new(geometry: CacheGeometry, duplicate: DuplicateFn<V>) -> Result<Self, CacheError> {
        Ok(Self {
            inner: Mutex::new(PageCache::new(geometry, duplicate)?),
        })
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<V>, CacheError> {
        self.inner.lock().get(key)
    }

    pub fn set(&self, key: &[u8], value: &V) -> Result<(), CacheError> {
        self.inner.lock().set(key, value)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats()
    }
}

impl<V: Clone + 'static> SyncPageCache<V> {
    pub fn cloning(geometry: CacheGeometry) -> Result<Self, CacheError> {
        Ok(Self {
            inner: Mutex::new(PageCache::cloning(geometry)?),
        })
    }
}

impl<V> From<PageCache<V>> for SyncPageCache<V> {
    fn from(cache: PageCache<V>) -> Self {
        Self {
            inner: Mutex::new(cache),
        }
    }
}
