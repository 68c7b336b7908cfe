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

//! Index statistics
//!
//! Lock-free counters bumped along the read path: per-source iterator
//! lookups, statement counters (rows and bytes), restarts, applied
//! upserts, and a log-bucket latency histogram.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::statement::Statement;

/// Rows and bytes accounted for fetched statements.
#[derive(Debug, Default)]
pub struct StmtCounter {
    rows: AtomicU64,
    bytes: AtomicU64,
}

impl StmtCounter {
    pub fn acct(&self, stmt: &Statement) {
        self.rows.fetch_add(1, Ordering::Relaxed);
        self.bytes
            .fetch_add(stmt.approx_size() as u64, Ordering::Relaxed);
    }

    pub fn rows(&self) -> u64 {
        self.rows.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

/// Counters of one history source's iterator.
#[derive(Debug, Default)]
pub struct SourceIterStat {
    /// Times the source was probed.
    pub lookup: AtomicU64,
    /// Statements the source contributed.
    pub get: StmtCounter,
}

/// Result cache counters.
#[derive(Debug, Default)]
pub struct CacheStat {
    pub lookup: AtomicU64,
    pub get: StmtCounter,
    pub put: AtomicU64,
    pub invalidate: AtomicU64,
}

/// Per-index read-path statistics.
#[derive(Debug, Default)]
pub struct IndexStat {
    /// Point lookups issued.
    pub lookup: AtomicU64,
    /// Tuples returned.
    pub get: StmtCounter,
    /// Lookups restarted because the mem list changed under them.
    pub restart: AtomicU64,
    /// Upsert deltas folded during materialization.
    pub upsert_applied: AtomicU64,
    pub txw: SourceIterStat,
    pub memory: SourceIterStat,
    pub disk: SourceIterStat,
    pub latency: LatencyCollector,
}

const LATENCY_BUCKETS: usize = 16;

/// Log-bucket latency histogram. Bucket `i` counts lookups that took
/// `[2^i, 2^(i+1))` microseconds; the last bucket absorbs the tail.
#[derive(Debug)]
pub struct LatencyCollector {
    count: AtomicU64,
    sum_ns: AtomicU64,
    max_ns: AtomicU64,
    buckets: [AtomicU64; LATENCY_BUCKETS],
}

impl Default for LatencyCollector {
    fn default() -> Self {
        Self {
            count: AtomicU64::new(0),
            sum_ns: AtomicU64::new(0),
            max_ns: AtomicU64::new(0),
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }
}

impl LatencyCollector {
    pub fn collect(&self, latency: Duration) {
        let ns = latency.as_nanos() as u64;
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_ns.fetch_add(ns, Ordering::Relaxed);
        self.max_ns.fetch_max(ns, Ordering::Relaxed);
        let us = (latency.as_micros() as u64).max(1);
        let idx = (us.ilog2() as usize).min(LATENCY_BUCKETS - 1);
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum_ns(&self) -> u64 {
        self.sum_ns.load(Ordering::Relaxed)
    }

    pub fn max_ns(&self) -> u64 {
        self.max_ns.load(Ordering::Relaxed)
    }

    pub fn bucket(&self, idx: usize) -> u64 {
        self.buckets[idx].load(Ordering::Relaxed)
    }
}
