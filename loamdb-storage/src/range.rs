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

//! Ranges and slices
//!
//! A range is a contiguous keyspace partition owning an ordered list of
//! slices, newest first. A slice is a pinnable handle to a run: the pin
//! count keeps compaction from reclaiming the underlying run while a
//! lookup is consulting it. The range tree maps every possible key to
//! exactly one range (total cover), so an exact-match query never fails.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use loamdb_core::{Tuple, Value};

use crate::read_view::ReadView;
use crate::run::{RunIterator, RunRead};

/// A pinnable window over a run.
#[derive(Debug)]
pub struct Slice {
    id: u64,
    run: Arc<dyn RunRead>,
    pin_count: AtomicU32,
}

impl Slice {
    pub fn new(id: u64, run: Arc<dyn RunRead>) -> Self {
        Self {
            id,
            run,
            pin_count: AtomicU32::new(0),
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Keep the underlying run alive across suspension points.
    pub fn pin(&self) {
        self.pin_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Release one pin. Every pin must be paired with exactly one unpin.
    pub fn unpin(&self) {
        let prev = self.pin_count.fetch_sub(1, Ordering::Relaxed);
        debug_assert!(prev > 0, "unpin without a matching pin");
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Relaxed)
    }

    /// Open an equal-key iterator over the slice's run.
    pub fn open_point<'a>(&'a self, key: &Tuple, rv: ReadView) -> Box<dyn RunIterator + 'a> {
        self.run.open_point(key, rv)
    }
}

/// A contiguous keyspace partition.
#[derive(Debug)]
pub struct Range {
    /// Inclusive lower bound of the partition; empty means unbounded.
    begin: Vec<Value>,
    /// Newest first.
    slices: RwLock<Vec<Arc<Slice>>>,
}

impl Range {
    pub fn new(begin: Vec<Value>) -> Self {
        Self {
            begin,
            slices: RwLock::new(Vec::new()),
        }
    }

    pub fn begin(&self) -> &[Value] {
        &self.begin
    }

    pub fn slice_count(&self) -> usize {
        self.slices.read().len()
    }

    /// Register a freshly dumped slice. New slices hold the newest data
    /// and go to the front.
    pub fn add_slice(&self, slice: Arc<Slice>) {
        self.slices.write().insert(0, slice);
    }

    /// Pin every slice of the range and return them in scan order. The
    /// whole set is pinned under one lock acquisition, freezing it with
    /// respect to concurrent compaction before any scan begins.
    pub(crate) fn pin_slices(&self) -> Vec<Arc<Slice>> {
        let guard = self.slices.read();
        let mut pinned = Vec::with_capacity(guard.len());
        for slice in guard.iter() {
            slice.pin();
            pinned.push(Arc::clone(slice));
        }
        pinned
    }
}

/// Total-cover map from keys to ranges.
#[derive(Debug)]
pub struct RangeTree {
    ranges: RwLock<BTreeMap<Vec<Value>, Arc<Range>>>,
}

impl RangeTree {
    /// A tree seeded with a single range covering the whole keyspace.
    pub fn new() -> Self {
        let mut ranges = BTreeMap::new();
        ranges.insert(Vec::new(), Arc::new(Range::new(Vec::new())));
        Self {
            ranges: RwLock::new(ranges),
        }
    }

    /// Add a partition starting at `begin`. The previous owner of that
    /// keyspace keeps everything below `begin`.
    pub fn insert_range(&self, begin: Vec<Value>) -> Arc<Range> {
        let range = Arc::new(Range::new(begin.clone()));
        self.ranges.write().insert(begin, Arc::clone(&range));
        range
    }

    /// The unique range owning `key`.
    pub fn find_by_key(&self, key: &[Value]) -> Arc<Range> {
        let guard = self.ranges.read();
        guard
            .range(..=key.to_vec())
            .next_back()
            .map(|(_, r)| Arc::clone(r))
            .expect("range tree covers the whole keyspace")
    }

    pub fn range_count(&self) -> usize {
        self.ranges.read().len()
    }
}

impl Default for RangeTree {
    fn default() -> Self {
        Self::new()
    }
}
