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

//! Point lookup
//!
//! Finds the single tuple visible for an exact key in a snapshot, merging
//! four statement sources in strict precedence order:
//!
//! 1. the caller's transaction write set,
//! 2. the shared result cache,
//! 3. the mem trees (active, then sealed newest to oldest),
//! 4. the on-disk run slices of the owning range.
//!
//! Each scanner appends to a shared [`History`]; once the history is
//! terminal (ends in a full tuple or tombstone) the remaining sources are
//! skipped. The history is then folded into at most one result tuple and,
//! under the latest read view, published to the cache.
//!
//! Only the run scan touches disk and may suspend the worker. The
//! scanners above it run as one non-preemptible section, so the lookup
//! snapshots `mem_list_version` right before the run scan and restarts
//! from scratch if the version moved while it was suspended: a dump may
//! have reclaimed mem trees whose statements the history references.
//! Slices are pinned up front, so the run set itself cannot change under
//! the scan.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use loamdb_core::{Result, Tuple};

use crate::history::{History, SourceTag};
use crate::index::Index;
use crate::mem::MemTree;
use crate::range::Slice;
use crate::read_view::ReadView;
use crate::statement::{Statement, StatementKind};
use crate::tx::Tx;
use crate::upsert::apply_upsert;

/// Look up the tuple of `key` visible in `rv`.
///
/// Returns `Ok(Some(..))` on a hit, `Ok(None)` when no value is visible,
/// and an error on resource exhaustion or run-read failure. `key` must
/// carry at least `cmp_def.part_count` fields.
pub fn point_lookup(
    index: &Index,
    tx: Option<&Tx>,
    rv: ReadView,
    key: &Tuple,
) -> Result<Option<Arc<Statement>>> {
    assert!(
        key.field_count() >= index.cmp_def().part_count(),
        "point lookup key arity {} below index arity {}",
        key.field_count(),
        index.cmp_def().part_count()
    );

    let start = Instant::now();
    index.stat().lookup.fetch_add(1, Ordering::Relaxed);

    // Register the read-intent before scanning anything: a commit that
    // overwrites the key while we are suspended in a run read must force
    // this transaction to a read view, or we could publish a stale cache
    // entry afterwards.
    if let Some(tx) = tx {
        tx.track_point(index, key)?;
    }

    let mut history = History::new();
    let result = loop {
        history.clear();

        scan_txw(index, tx, key, &mut history);
        if history.is_terminal() {
            break apply_history(index, rv, key, &history)?;
        }

        scan_cache(index, rv, key, &mut history);
        if history.is_terminal() {
            break apply_history(index, rv, key, &history)?;
        }

        scan_mems(index, rv, key, &mut history);
        if history.is_terminal() {
            break apply_history(index, rv, key, &history)?;
        }

        // The run scan may suspend; snapshot the version first.
        let mem_list_version = index.mem_list_version();

        scan_slices(index, rv, key, &mut history)?;

        if index.mem_list_version() != mem_list_version {
            // The mem list changed while we were suspended. A rotation
            // would preserve the statements the history references, a
            // dump would not, and we cannot tell which happened.
            index.stat().restart.fetch_add(1, Ordering::Relaxed);
            debug!(
                index = index.name(),
                "mem list changed during run scan, restarting get({key})"
            );
            continue;
        }

        break apply_history(index, rv, key, &history)?;
    };
    drop(history);

    let latency = start.elapsed();
    index.stat().latency.collect(latency);
    if latency > index.env().too_long_threshold {
        let shown = match &result {
            Some(stmt) => stmt.to_string(),
            None => "none".to_owned(),
        };
        warn!(
            index = index.name(),
            "get({key}) => {shown} took too long: {:.3} sec",
            latency.as_secs_f64()
        );
    }
    Ok(result)
}

/// Probe the transaction write set. Contributes at most one node, with no
/// LSN filtering: a transaction sees its own writes in any snapshot.
fn scan_txw(index: &Index, tx: Option<&Tx>, key: &Tuple, history: &mut History) {
    let Some(tx) = tx else { return };
    index.stat().txw.lookup.fetch_add(1, Ordering::Relaxed);
    let Some(stmt) = tx.search_point(index, key) else {
        return;
    };
    index.stat().txw.get.acct(&stmt);
    history.append(SourceTag::TxWrite, stmt);
}

/// Probe the result cache. Contributes at most one node, and a cached
/// statement is terminal by construction.
fn scan_cache(index: &Index, rv: ReadView, key: &Tuple, history: &mut History) {
    let Some(stmt) = index.cache().get(key) else {
        return;
    };
    if !rv.sees(stmt.lsn()) {
        return;
    }
    index.cache().stat().get.acct(&stmt);
    debug_assert!(stmt.is_terminal());
    history.append(SourceTag::Cache, stmt);
}

/// Scan the active mem, then the sealed ones newest to oldest, stopping
/// at the first terminal.
fn scan_mems(index: &Index, rv: ReadView, key: &Tuple, history: &mut History) {
    let mems = index.mem_list();
    scan_mem(index, mems.active(), rv, key, history);
    for mem in mems.sealed() {
        if history.is_terminal() {
            break;
        }
        scan_mem(index, mem, rv, key, history);
    }
}

/// Harvest one mem tree's version chain for `key`, newest visible
/// statement downward, until the history becomes terminal or the chain
/// ends.
fn scan_mem(index: &Index, mem: &MemTree, rv: ReadView, key: &Tuple, history: &mut History) {
    index.stat().memory.lookup.fetch_add(1, Ordering::Relaxed);
    let cmp_def = index.cmp_def();
    let tree = mem.read();
    let mut iter = tree.range(mem.seek_bound(key, rv.vlsn())..);

    let Some((pos, first)) = iter.next() else {
        return;
    };
    if cmp_def.cmp_keys(pos.key(), key.fields()) != std::cmp::Ordering::Equal {
        return;
    }

    let mut stmt = first;
    loop {
        index.stat().memory.get.acct(stmt);
        history.append(SourceTag::Mem, Arc::clone(stmt));
        if history.is_terminal() {
            break;
        }
        let Some((next_pos, next)) = iter.next() else {
            break;
        };
        // The tree orders each key's chain by strictly decreasing LSN;
        // a non-decreasing step means we crossed into another chain.
        if next.lsn() >= stmt.lsn() {
            break;
        }
        if cmp_def.cmp_keys(next_pos.key(), key.fields()) != std::cmp::Ordering::Equal {
            break;
        }
        stmt = next;
    }
}

/// Scan one pinned slice through its equal-key run iterator. Sets
/// `terminal_found` when the version chain bottomed out in a full tuple
/// or tombstone.
fn scan_slice(
    index: &Index,
    slice: &Slice,
    rv: ReadView,
    key: &Tuple,
    history: &mut History,
    terminal_found: &mut bool,
) -> Result<()> {
    index.stat().disk.lookup.fetch_add(1, Ordering::Relaxed);
    let mut iter = slice.open_point(key, rv);
    let mut next = iter.next_key()?;
    while let Some(stmt) = next {
        index.stat().disk.get.acct(&stmt);
        let terminal = stmt.is_terminal();
        history.append(SourceTag::Run, stmt);
        if terminal {
            *terminal_found = true;
            break;
        }
        next = iter.next_lsn()?;
    }
    Ok(())
}

/// Locate the range owning `key`, pin all its slices, scan them in order.
/// Every slice is pinned before the first scan and unpinned on every
/// path, errors included.
fn scan_slices(index: &Index, rv: ReadView, key: &Tuple, history: &mut History) -> Result<()> {
    let range = index.range_tree().find_by_key(index.cmp_def().key_of(key));
    let slices = range.pin_slices();

    let mut rc = Ok(());
    let mut terminal_found = false;
    for slice in &slices {
        if rc.is_ok() && !terminal_found {
            rc = scan_slice(index, slice, rv, key, history, &mut terminal_found);
        }
        slice.unpin();
    }
    rc
}

/// Fold the collected history into at most one owned tuple and publish
/// the outcome to the cache when the latest view allows it.
fn apply_history(
    index: &Index,
    rv: ReadView,
    key: &Tuple,
    history: &History,
) -> Result<Option<Arc<Statement>>> {
    let mut result: Option<Arc<Statement>> = None;
    let mut nodes = history.iter_oldest_first();

    if history.is_terminal() {
        if let Some(tail) = nodes.next() {
            let stmt = tail.statement();
            result = match stmt.kind() {
                StatementKind::Delete => None,
                _ if tail.source() == SourceTag::Mem => {
                    // Mem storage may be reclaimed once the caller yields;
                    // hand out a detached copy.
                    Some(stmt.dup())
                }
                _ => Some(Arc::clone(stmt)),
            };
        }
    }

    for node in nodes {
        let delta = node.statement();
        debug_assert_eq!(delta.kind(), StatementKind::Upsert);
        // Invisible statements never enter the history; transactional
        // upserts bypass the snapshot.
        debug_assert!(node.source() == SourceTag::TxWrite || rv.sees(delta.lsn()));

        let folded = apply_upsert(delta, result.as_deref(), index.cmp_def())?;
        index.stat().upsert_applied.fetch_add(1, Ordering::Relaxed);
        result = Some(folded);
    }

    if let Some(stmt) = &result {
        index.stat().get.acct(stmt);
    }

    // Publish under the latest view only, and never a result derived
    // from uncommitted writes.
    if rv.is_latest() && !history.has_source(SourceTag::TxWrite) {
        index.cache().add(result.clone(), key);
    }
    Ok(result)
}
