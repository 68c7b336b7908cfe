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

//! LoamDB Storage Layer
//!
//! LSM-style secondary storage with a snapshot-consistent point-lookup
//! read path.
//!
//! ## Read Path
//!
//! A point lookup merges statements from four sources in strict
//! precedence order and folds them into at most one tuple:
//!
//! ```text
//! point_lookup
//!   ├── transaction write set   (own writes, no snapshot filter)
//!   ├── result cache            (materialized latest results)
//!   ├── mem trees               (active, then sealed newest→oldest)
//!   └── run slices              (pinned up front; the only disk reads)
//! ```
//!
//! Each source appends to a per-call statement [`History`]; scanning
//! short-circuits once the history is terminal. Run reads may suspend
//! the worker, so the lookup validates the index's `mem_list_version`
//! around them and restarts when a concurrent dump could have reclaimed
//! mem statements it collected.
//!
//! ## Components
//!
//! - **Statements** (`statement`): versioned writes; REPLACE/INSERT/
//!   DELETE terminate a key's history, UPSERT deltas compose with older
//!   statements.
//! - **Upsert algebra** (`upsert`): folds a delta into a base tuple.
//! - **Mem trees** (`mem`): in-memory write accumulation ordered by
//!   (key asc, LSN desc).
//! - **Runs** (`run`): immutable sorted statement sequences behind the
//!   `RunRead` seam; equal-key iterators walk a version chain.
//! - **Ranges** (`range`): keyspace partitions owning pinnable slices.
//! - **Cache** (`cache`): materialized point results under the latest
//!   view, including proven misses.
//! - **Index** (`index`): copy-on-write mem list, range tree, cache,
//!   comparators, stats, environment.
//! - **Lookup** (`point_lookup`): the orchestrator.

pub mod cache;
pub mod history;
pub mod index;
pub mod keydef;
pub mod mem;
pub mod point_lookup;
pub mod range;
pub mod read_view;
pub mod run;
pub mod statement;
pub mod stats;
pub mod tx;
pub mod upsert;

pub use loamdb_core::{Result, StorageError, Tuple, Value};

pub use cache::PointCache;
pub use history::{History, HistoryNode, SourceTag};
pub use index::{Index, IndexEnv, MemList};
pub use keydef::KeyDef;
pub use mem::MemTree;
pub use point_lookup::point_lookup;
pub use range::{Range, RangeTree, Slice};
pub use read_view::ReadView;
pub use run::{Run, RunIterator, RunRead};
pub use statement::{Lsn, Statement, StatementKind, PENDING_LSN};
pub use stats::{CacheStat, IndexStat, LatencyCollector, SourceIterStat, StmtCounter};
pub use tx::{Tx, TxOptions};
pub use upsert::{apply_upsert, UpsertOp};
