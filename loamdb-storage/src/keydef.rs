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

//! Key definitions
//!
//! A [`KeyDef`] designates the leading `part_count` fields of a tuple as
//! the key and compares tuples by that prefix. An index carries two
//! handles: `cmp_def` for full key ordering and `key_def` for key
//! identity; for a primary index they point at the same definition.

use std::cmp::Ordering;

use loamdb_core::{Tuple, Value};

/// Key layout and comparison for one index.
#[derive(Debug, Clone)]
pub struct KeyDef {
    part_count: usize,
}

impl KeyDef {
    /// Create a definition with `part_count` key fields.
    pub fn new(part_count: usize) -> Self {
        assert!(part_count > 0, "key must have at least one part");
        Self { part_count }
    }

    /// Key arity.
    #[inline]
    pub fn part_count(&self) -> usize {
        self.part_count
    }

    /// Compare two key images by the leading `part_count` fields.
    #[inline]
    pub fn cmp_keys(&self, a: &[Value], b: &[Value]) -> Ordering {
        debug_assert!(a.len() >= self.part_count && b.len() >= self.part_count);
        a[..self.part_count].cmp(&b[..self.part_count])
    }

    /// Compare two tuples by their key prefixes.
    #[inline]
    pub fn cmp_tuples(&self, a: &Tuple, b: &Tuple) -> Ordering {
        self.cmp_keys(a.fields(), b.fields())
    }

    /// Borrow the key prefix of a tuple.
    #[inline]
    pub fn key_of<'a>(&self, tuple: &'a Tuple) -> &'a [Value] {
        debug_assert!(tuple.field_count() >= self.part_count);
        &tuple.fields()[..self.part_count]
    }

    /// Clone the key prefix of a tuple into an owned image.
    pub fn extract_key(&self, tuple: &Tuple) -> Vec<Value> {
        self.key_of(tuple).to_vec()
    }
}
