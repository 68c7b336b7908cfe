// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Point-lookup result cache
//!
//! Caches materialized lookup results under the latest read view: full
//! tuples, or absent-markers proving a key has no visible value. An
//! absent-marker is a DELETE statement at the pending LSN, so the
//! scanner's `lsn <= vlsn` visibility filter exposes it to latest-view
//! readers only; a pinned snapshot can never prove absence from it.
//!
//! Cached tuples carry the LSN of the newest statement folded into them,
//! which makes entries safely reusable by older snapshots: a reader at
//! `vlsn` sees a cached tuple iff every newer statement of the key is
//! invisible to it as well.
//!
//! Eviction is the owner's business; the cache only grows and shrinks
//! through `add` and `invalidate`.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use dashmap::DashMap;

use loamdb_core::{Tuple, Value};

use crate::keydef::KeyDef;
use crate::statement::{Statement, PENDING_LSN};
use crate::stats::CacheStat;

/// Shared result cache of one index.
#[derive(Debug)]
pub struct PointCache {
    cmp_def: Arc<KeyDef>,
    entries: DashMap<Vec<Value>, Arc<Statement>>,
    stat: CacheStat,
}

impl PointCache {
    pub fn new(cmp_def: Arc<KeyDef>) -> Self {
        Self {
            cmp_def,
            entries: DashMap::new(),
            stat: CacheStat::default(),
        }
    }

    pub fn stat(&self) -> &CacheStat {
        &self.stat
    }

    /// The cached statement for `key`, if any. Always terminal: a full
    /// tuple or a delete marker, never a bare upsert.
    pub fn get(&self, key: &Tuple) -> Option<Arc<Statement>> {
        self.stat.lookup.fetch_add(1, Ordering::Relaxed);
        self.entries
            .get(&self.cmp_def.extract_key(key))
            .map(|e| Arc::clone(e.value()))
    }

    /// Install a lookup result under the latest view. `None` records a
    /// proven miss.
    pub fn add(&self, stmt: Option<Arc<Statement>>, key: &Tuple) {
        let image = self.cmp_def.extract_key(key);
        let entry = match stmt {
            Some(s) => {
                debug_assert!(s.is_terminal());
                s
            }
            None => Statement::new_delete(Tuple::new(image.clone()), PENDING_LSN),
        };
        self.stat.put.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(image, entry);
    }

    /// Drop the entry for `key`. Called by writers before publishing a
    /// newer statement.
    pub fn invalidate(&self, key: &Tuple) {
        if self
            .entries
            .remove(&self.cmp_def.extract_key(key))
            .is_some()
        {
            self.stat.invalidate.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::StatementKind;

    fn cache() -> PointCache {
        PointCache::new(Arc::new(KeyDef::new(1)))
    }

    fn key(k: i64) -> Tuple {
        Tuple::new(vec![Value::Int(k)])
    }

    #[test]
    fn test_add_and_get_round() {
        let c = cache();
        let s = Statement::new_replace(Tuple::new(vec![Value::Int(1), Value::from("v")]), 50);
        c.add(Some(Arc::clone(&s)), &key(1));
        let got = c.get(&key(1)).unwrap();
        assert!(Arc::ptr_eq(&got, &s));
        assert!(c.get(&key(2)).is_none());
    }

    #[test]
    fn test_absent_marker_is_a_pending_tombstone() {
        let c = cache();
        c.add(None, &key(1));
        let marker = c.get(&key(1)).unwrap();
        assert_eq!(marker.kind(), StatementKind::Delete);
        assert_eq!(marker.lsn(), PENDING_LSN);
    }

    #[test]
    fn test_invalidate_removes_entry() {
        let c = cache();
        c.add(None, &key(1));
        c.invalidate(&key(1));
        assert!(c.get(&key(1)).is_none());
        assert!(c.is_empty());
        // A second invalidate of the same key is a no-op.
        c.invalidate(&key(1));
        assert_eq!(c.stat().invalidate.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_extra_key_fields_are_ignored() {
        let c = cache();
        let s = Statement::new_replace(Tuple::new(vec![Value::Int(1), Value::from("v")]), 50);
        c.add(Some(s), &key(1));
        // A search key with trailing value fields maps to the same entry.
        let wide = Tuple::new(vec![Value::Int(1), Value::from("junk")]);
        assert!(c.get(&wide).is_some());
    }
}
