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

//! Statements
//!
//! A statement is one versioned write of a key: a full-tuple REPLACE or
//! INSERT, a DELETE tombstone, or a partial-update UPSERT delta. REPLACE,
//! INSERT and DELETE are *terminal*: each fully determines the tuple (or
//! its absence) at its LSN. An UPSERT only makes sense composed with an
//! older statement of the same key; see [`crate::upsert`].
//!
//! Statements are shared as `Arc<Statement>` between mem trees, runs, the
//! result cache, transaction write sets and in-flight lookups. [`dup`]
//! produces a detached deep copy.
//!
//! [`dup`]: Statement::dup

use std::fmt;
use std::mem;
use std::sync::Arc;

use loamdb_core::Tuple;

use crate::upsert::UpsertOp;

/// Log sequence number. Monotonically assigned to each committed write.
pub type Lsn = i64;

/// LSN carried by statements that are not committed yet (transaction
/// write-set entries); commit assigns the real one. Sorts above every
/// committed LSN.
pub const PENDING_LSN: Lsn = Lsn::MAX;

/// Statement type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// Full-tuple write, overwrites whatever was there.
    Replace,
    /// Full-tuple write of a key asserted to be absent.
    Insert,
    /// Tombstone.
    Delete,
    /// Partial-update delta.
    Upsert,
}

impl StatementKind {
    /// Terminal statements fully determine the value at their LSN.
    #[inline]
    pub fn is_terminal(self) -> bool {
        !matches!(self, StatementKind::Upsert)
    }
}

/// One versioned write of a key.
#[derive(Debug)]
pub struct Statement {
    kind: StatementKind,
    lsn: Lsn,
    /// Full tuple for REPLACE/INSERT, key image for DELETE, default tuple
    /// for UPSERT (the value the upsert produces when no base exists).
    tuple: Tuple,
    /// Update operations; non-empty only for UPSERT.
    ops: Vec<UpsertOp>,
}

impl Statement {
    pub fn new_replace(tuple: Tuple, lsn: Lsn) -> Arc<Self> {
        Arc::new(Self {
            kind: StatementKind::Replace,
            lsn,
            tuple,
            ops: Vec::new(),
        })
    }

    pub fn new_insert(tuple: Tuple, lsn: Lsn) -> Arc<Self> {
        Arc::new(Self {
            kind: StatementKind::Insert,
            lsn,
            tuple,
            ops: Vec::new(),
        })
    }

    /// A tombstone carries only the key image.
    pub fn new_delete(key: Tuple, lsn: Lsn) -> Arc<Self> {
        Arc::new(Self {
            kind: StatementKind::Delete,
            lsn,
            tuple: key,
            ops: Vec::new(),
        })
    }

    /// `tuple` is the default image applied when the key does not exist;
    /// `ops` are folded into the base otherwise.
    pub fn new_upsert(tuple: Tuple, ops: Vec<UpsertOp>, lsn: Lsn) -> Arc<Self> {
        Arc::new(Self {
            kind: StatementKind::Upsert,
            lsn,
            tuple,
            ops,
        })
    }

    #[inline]
    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    #[inline]
    pub fn lsn(&self) -> Lsn {
        self.lsn
    }

    #[inline]
    pub fn tuple(&self) -> &Tuple {
        &self.tuple
    }

    #[inline]
    pub fn ops(&self) -> &[UpsertOp] {
        &self.ops
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }

    /// Deep copy into a fresh allocation. Used when a statement must
    /// outlive the storage that currently holds it.
    pub fn dup(&self) -> Arc<Statement> {
        Arc::new(Statement {
            kind: self.kind,
            lsn: self.lsn,
            tuple: self.tuple.clone(),
            ops: self.ops.clone(),
        })
    }

    /// Approximate in-memory footprint, fed to statement counters.
    pub fn approx_size(&self) -> usize {
        mem::size_of::<Self>()
            + self.tuple.approx_size()
            + self.ops.len() * mem::size_of::<UpsertOp>()
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            StatementKind::Replace => "REPLACE",
            StatementKind::Insert => "INSERT",
            StatementKind::Delete => "DELETE",
            StatementKind::Upsert => "UPSERT",
        };
        if self.lsn == PENDING_LSN {
            write!(f, "{kind}{} @ pending", self.tuple)
        } else {
            write!(f, "{kind}{} @ {}", self.tuple, self.lsn)
        }
    }
}
