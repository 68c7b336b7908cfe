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

//! Transaction handles
//!
//! The read path needs two things from a transaction: its private write
//! set (a transaction sees its own uncommitted writes ahead of every
//! shared source, with no snapshot filtering) and read-intent tracking.
//! `track_point` registers the key with the conflict manager before any
//! scanning starts, so a commit that overwrites the key while the lookup
//! is suspended in a run read sends this transaction to a read view
//! instead of letting it publish a stale cache entry.
//!
//! Commit, abort and conflict resolution live with the transaction
//! manager, not here.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use loamdb_core::{Result, StorageError, Tuple, Value};

use crate::index::Index;
use crate::statement::Statement;

/// Limits applied to one transaction.
#[derive(Debug, Clone)]
pub struct TxOptions {
    /// Most point read-intents a transaction may register.
    pub max_tracked_points: usize,
}

impl Default for TxOptions {
    fn default() -> Self {
        Self {
            max_tracked_points: 4096,
        }
    }
}

type WriteSetKey = (u32, Vec<Value>);

/// An in-flight transaction, as seen by the read path.
#[derive(Debug)]
pub struct Tx {
    id: u64,
    opts: TxOptions,
    write_set: Mutex<BTreeMap<WriteSetKey, Arc<Statement>>>,
    tracked: Mutex<HashSet<WriteSetKey>>,
}

impl Tx {
    pub fn new(id: u64) -> Self {
        Self::with_options(id, TxOptions::default())
    }

    pub fn with_options(id: u64, opts: TxOptions) -> Self {
        Self {
            id,
            opts,
            write_set: Mutex::new(BTreeMap::new()),
            tracked: Mutex::new(HashSet::new()),
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stage a write. Later writes of the same key replace earlier ones;
    /// the statement keeps its pending LSN until commit.
    pub fn set(&self, index: &Index, stmt: Arc<Statement>) {
        let key = index.cmp_def().extract_key(stmt.tuple());
        self.write_set.lock().insert((index.id(), key), stmt);
    }

    /// The staged statement for `(index, key)`, if any.
    pub fn search_point(&self, index: &Index, key: &Tuple) -> Option<Arc<Statement>> {
        let image = index.cmp_def().extract_key(key);
        self.write_set
            .lock()
            .get(&(index.id(), image))
            .map(Arc::clone)
    }

    /// Register a point read-intent for conflict tracking.
    pub fn track_point(&self, index: &Index, key: &Tuple) -> Result<()> {
        let mut tracked = self.tracked.lock();
        let entry = (index.id(), index.cmp_def().extract_key(key));
        if !tracked.contains(&entry) && tracked.len() >= self.opts.max_tracked_points {
            return Err(StorageError::ResourceExhausted(format!(
                "transaction {} read-intent quota exhausted ({} keys)",
                self.id, self.opts.max_tracked_points
            )));
        }
        tracked.insert(entry);
        Ok(())
    }

    pub fn tracked_points(&self) -> usize {
        self.tracked.lock().len()
    }

    pub fn write_count(&self) -> usize {
        self.write_set.lock().len()
    }
}
