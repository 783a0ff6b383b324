//! crates/doc_library_core/src/cache.rs
//!
//! Time-bounded, in-memory snapshots of the subject and document lists.
//!
//! There is one entry per resource kind and no per-id caching. Staleness is
//! checked lazily on read; nothing runs in the background.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::CoreConfig;
use crate::domain::{Document, Subject};
use crate::ports::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Subjects,
    Documents,
}

impl CacheKey {
    pub const ALL: [CacheKey; 2] = [CacheKey::Subjects, CacheKey::Documents];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKey::Subjects => "subjects",
            CacheKey::Documents => "documents",
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    data: Option<T>,
    timestamp: Option<DateTime<Utc>>,
}

impl<T> CacheEntry<T> {
    fn empty() -> Self {
        Self {
            data: None,
            timestamp: None,
        }
    }

    fn filled_at(&self) -> Option<DateTime<Utc>> {
        match (&self.data, self.timestamp) {
            (Some(_), Some(ts)) => Some(ts),
            _ => None,
        }
    }
}

/// Owns the cache entries of the core.
pub struct ResourceCache {
    enabled: bool,
    max_age: chrono::Duration,
    clock: Arc<dyn Clock>,
    subjects: CacheEntry<Vec<Subject>>,
    documents: CacheEntry<Vec<Document>>,
}

impl ResourceCache {
    pub fn new(config: &CoreConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_settings(config.use_cache, config.cache_duration, clock)
    }

    pub fn with_settings(enabled: bool, max_age: Duration, clock: Arc<dyn Clock>) -> Self {
        let max_age = chrono::Duration::from_std(max_age)
            .unwrap_or_else(|_| chrono::Duration::weeks(52_000));
        Self {
            enabled,
            max_age,
            clock,
            subjects: CacheEntry::empty(),
            documents: CacheEntry::empty(),
        }
    }

    /// True when caching is enabled and the entry was filled less than
    /// `cache_duration` ago.
    pub fn is_valid(&self, key: CacheKey) -> bool {
        if !self.enabled {
            return false;
        }
        let filled_at = match key {
            CacheKey::Subjects => self.subjects.filled_at(),
            CacheKey::Documents => self.documents.filled_at(),
        };
        match filled_at {
            Some(ts) => self.clock.now() - ts < self.max_age,
            None => false,
        }
    }

    /// A copy of the cached subject list, if still valid.
    pub fn subjects(&self) -> Option<Vec<Subject>> {
        if !self.is_valid(CacheKey::Subjects) {
            return None;
        }
        self.subjects.data.clone()
    }

    /// A copy of the cached document list, if still valid.
    pub fn documents(&self) -> Option<Vec<Document>> {
        if !self.is_valid(CacheKey::Documents) {
            return None;
        }
        self.documents.data.clone()
    }

    pub fn set_subjects(&mut self, data: Vec<Subject>) {
        self.subjects = CacheEntry {
            data: Some(data),
            timestamp: Some(self.clock.now()),
        };
    }

    pub fn set_documents(&mut self, data: Vec<Document>) {
        self.documents = CacheEntry {
            data: Some(data),
            timestamp: Some(self.clock.now()),
        };
    }

    /// Resets one entry, or every entry when `key` is `None`.
    pub fn clear(&mut self, key: Option<CacheKey>) {
        match key {
            Some(CacheKey::Subjects) => self.subjects = CacheEntry::empty(),
            Some(CacheKey::Documents) => self.documents = CacheEntry::empty(),
            None => {
                self.subjects = CacheEntry::empty();
                self.documents = CacheEntry::empty();
            }
        }
    }
}
