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

//! Runs and run iterators
//!
//! A run is an immutable sorted statement sequence produced by a dump or
//! a compaction. The read path consumes runs through the [`RunRead`]
//! seam: an equal-key [`RunIterator`] positions at the newest statement
//! of the key visible in the read view (`next_key`), then walks the
//! version chain downward (`next_lsn`). Run reads are the only part of a
//! lookup that touches secondary storage and may therefore suspend the
//! worker; everything above this seam must tolerate the world changing
//! across a call.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use loamdb_core::{Result, Tuple, Value};

use crate::keydef::KeyDef;
use crate::read_view::ReadView;
use crate::statement::{Lsn, Statement};

/// Equal-key version-chain iterator over one run.
///
/// Contract: one `next_key` call positions at the newest visible
/// statement of the key (or yields `None`); each following `next_lsn`
/// steps to the next older statement of the same key. Resources are
/// released on drop.
pub trait RunIterator {
    fn next_key(&mut self) -> Result<Option<Arc<Statement>>>;
    fn next_lsn(&mut self) -> Result<Option<Arc<Statement>>>;
}

/// Read access to one run's statements.
pub trait RunRead: fmt::Debug + Send + Sync {
    /// Open an equal-key iterator for `key` bound to `rv`.
    fn open_point<'a>(&'a self, key: &Tuple, rv: ReadView) -> Box<dyn RunIterator + 'a>;
}

/// An immutable sorted statement sequence.
#[derive(Debug)]
pub struct Run {
    id: u64,
    cmp_def: Arc<KeyDef>,
    /// Sorted by (key ascending, LSN descending).
    stmts: Vec<Arc<Statement>>,
    min_key: Option<Vec<Value>>,
    max_lsn: Lsn,
}

impl Run {
    /// Build a run from unordered statements.
    pub fn build(id: u64, cmp_def: Arc<KeyDef>, mut stmts: Vec<Arc<Statement>>) -> Self {
        stmts.sort_by(|a, b| {
            cmp_def
                .cmp_tuples(a.tuple(), b.tuple())
                .then_with(|| b.lsn().cmp(&a.lsn()))
        });
        let min_key = stmts.first().map(|s| cmp_def.extract_key(s.tuple()));
        let max_lsn = stmts.iter().map(|s| s.lsn()).max().unwrap_or(0);
        Self {
            id,
            cmp_def,
            stmts,
            min_key,
            max_lsn,
        }
    }

    /// Build a run from the contents of a mem tree, as a dump does.
    pub fn from_mem(id: u64, mem: &crate::mem::MemTree) -> Self {
        Self::build(id, Arc::clone(mem.cmp_def()), mem.statements())
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn len(&self) -> usize {
        self.stmts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }

    /// Smallest key in the run, if any.
    pub fn min_key(&self) -> Option<&[Value]> {
        self.min_key.as_deref()
    }

    pub fn max_lsn(&self) -> Lsn {
        self.max_lsn
    }
}

impl RunRead for Run {
    fn open_point<'a>(&'a self, key: &Tuple, rv: ReadView) -> Box<dyn RunIterator + 'a> {
        Box::new(RunPointIterator {
            run: self,
            key: self.cmp_def.extract_key(key),
            vlsn: rv.vlsn(),
            pos: 0,
            positioned: false,
            done: false,
        })
    }
}

/// Equal-key iterator over an in-memory run.
struct RunPointIterator<'a> {
    run: &'a Run,
    key: Vec<Value>,
    vlsn: Lsn,
    pos: usize,
    positioned: bool,
    done: bool,
}

impl RunIterator for RunPointIterator<'_> {
    fn next_key(&mut self) -> Result<Option<Arc<Statement>>> {
        if self.positioned || self.done {
            // An equal-key iterator visits a single key.
            self.done = true;
            return Ok(None);
        }
        self.positioned = true;
        let def = &self.run.cmp_def;
        let idx = self.run.stmts.partition_point(|s| {
            match def.cmp_keys(def.key_of(s.tuple()), &self.key) {
                Ordering::Less => true,
                Ordering::Equal => s.lsn() > self.vlsn,
                Ordering::Greater => false,
            }
        });
        match self.run.stmts.get(idx) {
            Some(s) if def.cmp_keys(def.key_of(s.tuple()), &self.key) == Ordering::Equal => {
                self.pos = idx;
                Ok(Some(Arc::clone(s)))
            }
            _ => {
                self.done = true;
                Ok(None)
            }
        }
    }

    fn next_lsn(&mut self) -> Result<Option<Arc<Statement>>> {
        if !self.positioned || self.done {
            return Ok(None);
        }
        self.pos += 1;
        let def = &self.run.cmp_def;
        match self.run.stmts.get(self.pos) {
            Some(s) if def.cmp_keys(def.key_of(s.tuple()), &self.key) == Ordering::Equal => {
                Ok(Some(Arc::clone(s)))
            }
            _ => {
                self.done = true;
                Ok(None)
            }
        }
    }
}
