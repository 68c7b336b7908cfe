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

//! Index handles
//!
//! An [`Index`] ties together everything a point lookup consults: the
//! copy-on-write mem list (one active tree plus sealed ones awaiting
//! dump), the range tree over on-disk slices, the result cache, the
//! comparators, statistics and environment.
//!
//! The mem list is published through an atomic pointer swap. Readers
//! load one consistent list and never block writers; rotation and dump
//! completion build a new list, swap it in and bump `mem_list_version`.
//! A lookup that suspended in a run read compares the version before and
//! after: any change means mem-resident statements it collected may
//! reference reclaimed trees, and it must restart. A rotation alone
//! would preserve them, but the read path cannot tell a rotation from a
//! dump, so it restarts on both.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use loamdb_core::Tuple;

use crate::cache::PointCache;
use crate::keydef::KeyDef;
use crate::mem::MemTree;
use crate::range::{RangeTree, Slice};
use crate::run::{Run, RunRead};
use crate::statement::{Statement, PENDING_LSN};
use crate::stats::IndexStat;

/// Index environment: knobs shared by the indexes of one engine.
#[derive(Debug, Clone)]
pub struct IndexEnv {
    /// Lookups slower than this are logged.
    pub too_long_threshold: Duration,
}

impl Default for IndexEnv {
    fn default() -> Self {
        Self {
            too_long_threshold: Duration::from_millis(500),
        }
    }
}

/// One consistent snapshot of the index's mem trees.
#[derive(Debug)]
pub struct MemList {
    active: Arc<MemTree>,
    /// Sealed trees, newest first.
    sealed: Vec<Arc<MemTree>>,
}

impl MemList {
    #[inline]
    pub fn active(&self) -> &Arc<MemTree> {
        &self.active
    }

    #[inline]
    pub fn sealed(&self) -> &[Arc<MemTree>] {
        &self.sealed
    }
}

/// A mutable index handle.
#[derive(Debug)]
pub struct Index {
    id: u32,
    name: String,
    cmp_def: Arc<KeyDef>,
    key_def: Arc<KeyDef>,
    env: Arc<IndexEnv>,
    mems: ArcSwap<MemList>,
    mem_list_version: AtomicU32,
    /// Serializes mem-list mutations; readers go through `mems` only.
    version_lock: Mutex<()>,
    next_mem_id: AtomicU64,
    next_slice_id: AtomicU64,
    ranges: RangeTree,
    cache: PointCache,
    stat: IndexStat,
}

impl Index {
    pub fn new(
        id: u32,
        name: impl Into<String>,
        cmp_def: Arc<KeyDef>,
        key_def: Arc<KeyDef>,
        env: Arc<IndexEnv>,
    ) -> Self {
        let active = Arc::new(MemTree::new(1, Arc::clone(&cmp_def)));
        Self {
            id,
            name: name.into(),
            cache: PointCache::new(Arc::clone(&cmp_def)),
            cmp_def,
            key_def,
            env,
            mems: ArcSwap::from_pointee(MemList {
                active,
                sealed: Vec::new(),
            }),
            mem_list_version: AtomicU32::new(0),
            version_lock: Mutex::new(()),
            next_mem_id: AtomicU64::new(2),
            next_slice_id: AtomicU64::new(1),
            ranges: RangeTree::new(),
            stat: IndexStat::default(),
        }
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn cmp_def(&self) -> &Arc<KeyDef> {
        &self.cmp_def
    }

    #[inline]
    pub fn key_def(&self) -> &Arc<KeyDef> {
        &self.key_def
    }

    #[inline]
    pub fn env(&self) -> &IndexEnv {
        &self.env
    }

    #[inline]
    pub fn stat(&self) -> &IndexStat {
        &self.stat
    }

    #[inline]
    pub fn cache(&self) -> &PointCache {
        &self.cache
    }

    #[inline]
    pub fn range_tree(&self) -> &RangeTree {
        &self.ranges
    }

    /// Load the current mem list.
    pub fn mem_list(&self) -> Arc<MemList> {
        self.mems.load_full()
    }

    /// Counter bumped on every mem-list change.
    pub fn mem_list_version(&self) -> u32 {
        self.mem_list_version.load(Ordering::Acquire)
    }

    /// Apply a committed statement to the active mem and drop any cached
    /// result it supersedes.
    pub fn insert(&self, stmt: Arc<Statement>) {
        debug_assert!(stmt.lsn() != PENDING_LSN, "committed write without an LSN");
        let _guard = self.version_lock.lock();
        self.cache.invalidate(stmt.tuple());
        self.mems.load().active().insert(stmt);
    }

    /// Seal the active mem and start a fresh one.
    pub fn rotate_mem(&self) {
        let _guard = self.version_lock.lock();
        let current = self.mems.load_full();
        current.active.seal();

        let mut sealed = Vec::with_capacity(current.sealed.len() + 1);
        sealed.push(Arc::clone(&current.active));
        sealed.extend(current.sealed.iter().cloned());

        let active = Arc::new(MemTree::new(
            self.next_mem_id.fetch_add(1, Ordering::Relaxed),
            Arc::clone(&self.cmp_def),
        ));
        self.mems.store(Arc::new(MemList { active, sealed }));
        self.mem_list_version.fetch_add(1, Ordering::Release);
    }

    /// Register a run with the range owning `key`. Used by tests and by
    /// recovery to attach pre-built runs; does not touch the mem list.
    pub fn add_slice(&self, run: Arc<dyn RunRead>, key: &Tuple) -> Arc<Slice> {
        let slice = Arc::new(Slice::new(
            self.next_slice_id.fetch_add(1, Ordering::Relaxed),
            run,
        ));
        let range = self.ranges.find_by_key(self.cmp_def.key_of(key));
        range.add_slice(Arc::clone(&slice));
        slice
    }

    /// Finish a dump: attach the run produced from the sealed mems and
    /// release them. Reclaims the memory lookups may still reference,
    /// which is why the version bump is mandatory.
    pub fn complete_dump(&self, run: Arc<Run>) -> Arc<Slice> {
        let _guard = self.version_lock.lock();
        debug_assert!(!run.is_empty(), "dump produced an empty run");

        let slice = Arc::new(Slice::new(
            self.next_slice_id.fetch_add(1, Ordering::Relaxed),
            Arc::clone(&run) as Arc<dyn RunRead>,
        ));
        let range = match run.min_key() {
            Some(key) => self.ranges.find_by_key(key),
            None => self.ranges.find_by_key(&[]),
        };
        range.add_slice(Arc::clone(&slice));

        let current = self.mems.load_full();
        self.mems.store(Arc::new(MemList {
            active: Arc::clone(&current.active),
            sealed: Vec::new(),
        }));
        self.mem_list_version.fetch_add(1, Ordering::Release);
        slice
    }
}
