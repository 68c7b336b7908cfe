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

//! End-to-end point-lookup scenarios: source precedence, snapshot
//! visibility, upsert folding, tombstones, restart on concurrent dump,
//! cache publication rules and resource cleanup.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use loamdb_storage::{
    point_lookup, Index, IndexEnv, KeyDef, Lsn, ReadView, Run, RunIterator, RunRead, Statement,
    StatementKind, StorageError, Tuple, Tx, TxOptions, UpsertOp, Value, PENDING_LSN,
};

// ---------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------

fn new_index() -> Arc<Index> {
    let def = Arc::new(KeyDef::new(1));
    Arc::new(Index::new(
        1,
        "primary",
        Arc::clone(&def),
        def,
        Arc::new(IndexEnv::default()),
    ))
}

fn key(k: i64) -> Tuple {
    Tuple::new(vec![Value::Int(k)])
}

fn replace_str(k: i64, v: &str, lsn: Lsn) -> Arc<Statement> {
    Statement::new_replace(Tuple::new(vec![Value::Int(k), Value::from(v)]), lsn)
}

fn replace_int(k: i64, v: i64, lsn: Lsn) -> Arc<Statement> {
    Statement::new_replace(Tuple::new(vec![Value::Int(k), Value::Int(v)]), lsn)
}

fn delete(k: i64, lsn: Lsn) -> Arc<Statement> {
    Statement::new_delete(key(k), lsn)
}

fn upsert_add(k: i64, delta: i64, lsn: Lsn) -> Arc<Statement> {
    Statement::new_upsert(
        Tuple::new(vec![Value::Int(k), Value::Int(delta)]),
        vec![UpsertOp::Add { field: 1, delta }],
        lsn,
    )
}

fn int_field(stmt: &Statement) -> i64 {
    stmt.tuple().field(1).and_then(Value::as_int).unwrap()
}

fn str_field(stmt: &Statement) -> &Value {
    stmt.tuple().field(1).unwrap()
}

/// Attach a run built from `stmts` as one slice of the index.
fn attach_run(index: &Index, at: i64, stmts: Vec<Arc<Statement>>) -> Arc<Run> {
    let run = Arc::new(Run::build(99, Arc::clone(index.cmp_def()), stmts));
    index.add_slice(Arc::clone(&run) as Arc<dyn RunRead>, &key(at));
    run
}

// ---------------------------------------------------------------------
// Run wrappers for fault and yield injection
// ---------------------------------------------------------------------

/// Rotates the index's mem list the first time a reader steps into the
/// run, simulating a dump finishing while the lookup is suspended in a
/// disk read.
#[derive(Debug)]
struct RotatingRun {
    inner: Arc<Run>,
    index: OnceLock<Weak<Index>>,
    fired: AtomicBool,
}

impl RotatingRun {
    fn new(inner: Arc<Run>) -> Self {
        Self {
            inner,
            index: OnceLock::new(),
            fired: AtomicBool::new(false),
        }
    }

    fn arm(&self, index: &Arc<Index>) {
        self.index
            .set(Arc::downgrade(index))
            .expect("armed exactly once");
    }

    fn rotate_once(&self) {
        if !self.fired.swap(true, Ordering::SeqCst) {
            if let Some(index) = self.index.get().and_then(Weak::upgrade) {
                index.rotate_mem();
            }
        }
    }
}

impl RunRead for RotatingRun {
    fn open_point<'a>(&'a self, key: &Tuple, rv: ReadView) -> Box<dyn RunIterator + 'a> {
        Box::new(RotatingIter {
            owner: self,
            inner: self.inner.open_point(key, rv),
        })
    }
}

struct RotatingIter<'a> {
    owner: &'a RotatingRun,
    inner: Box<dyn RunIterator + 'a>,
}

impl RunIterator for RotatingIter<'_> {
    fn next_key(&mut self) -> loamdb_storage::Result<Option<Arc<Statement>>> {
        self.owner.rotate_once();
        self.inner.next_key()
    }

    fn next_lsn(&mut self) -> loamdb_storage::Result<Option<Arc<Statement>>> {
        self.inner.next_lsn()
    }
}

/// Fails every read, as a timed-out or corrupt run file would.
#[derive(Debug)]
struct FailingRun;

impl RunRead for FailingRun {
    fn open_point<'a>(&'a self, _key: &Tuple, _rv: ReadView) -> Box<dyn RunIterator + 'a> {
        Box::new(FailingIter)
    }
}

struct FailingIter;

impl RunIterator for FailingIter {
    fn next_key(&mut self) -> loamdb_storage::Result<Option<Arc<Statement>>> {
        Err(StorageError::Io(io::Error::other("run read failed")))
    }

    fn next_lsn(&mut self) -> loamdb_storage::Result<Option<Arc<Statement>>> {
        Err(StorageError::Io(io::Error::other("run read failed")))
    }
}

// ---------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------

#[test]
fn test_cache_hit_skips_lower_sources() {
    let ix = new_index();
    ix.cache().add(Some(replace_str(1, "v", 50)), &key(1));

    let got = point_lookup(&ix, None, ReadView::at(100), &key(1))
        .unwrap()
        .unwrap();
    assert_eq!(str_field(&got), &Value::from("v"));

    // Neither mems nor slices were consulted.
    assert_eq!(ix.stat().memory.lookup.load(Ordering::Relaxed), 0);
    assert_eq!(ix.stat().disk.lookup.load(Ordering::Relaxed), 0);
    assert_eq!(ix.cache().stat().get.rows(), 1);
}

#[test]
fn test_snapshot_hides_newer_version() {
    let ix = new_index();
    ix.insert(replace_str(1, "old", 100));
    ix.insert(replace_str(1, "new", 200));

    let got = point_lookup(&ix, None, ReadView::at(150), &key(1))
        .unwrap()
        .unwrap();
    assert_eq!(str_field(&got), &Value::from("old"));

    let latest = point_lookup(&ix, None, ReadView::LATEST, &key(1))
        .unwrap()
        .unwrap();
    assert_eq!(str_field(&latest), &Value::from("new"));
}

#[test]
fn test_upsert_folds_over_run_base() {
    let ix = new_index();
    attach_run(&ix, 1, vec![replace_int(1, 10, 20)]);
    ix.insert(upsert_add(1, 1, 50));

    let got = point_lookup(&ix, None, ReadView::LATEST, &key(1))
        .unwrap()
        .unwrap();
    assert_eq!(int_field(&got), 11);
    assert_eq!(got.lsn(), 50);
    assert_eq!(ix.stat().upsert_applied.load(Ordering::Relaxed), 1);

    // The folded tuple was published.
    let cached = ix.cache().get(&key(1)).unwrap();
    assert_eq!(int_field(&cached), 11);
}

#[test]
fn test_upsert_folds_across_slices() {
    let ix = new_index();
    // Older slice first; newer slices go to the front of the range.
    attach_run(&ix, 1, vec![replace_int(1, 10, 20)]);
    attach_run(&ix, 1, vec![upsert_add(1, 5, 40)]);

    let got = point_lookup(&ix, None, ReadView::LATEST, &key(1))
        .unwrap()
        .unwrap();
    assert_eq!(int_field(&got), 15);
    assert_eq!(ix.stat().disk.lookup.load(Ordering::Relaxed), 2);
}

#[test]
fn test_tombstone_yields_absence_and_caches_it() {
    let ix = new_index();
    ix.insert(replace_str(1, "x", 40));
    ix.insert(delete(1, 80));

    assert!(point_lookup(&ix, None, ReadView::LATEST, &key(1))
        .unwrap()
        .is_none());

    let marker = ix.cache().get(&key(1)).unwrap();
    assert_eq!(marker.kind(), StatementKind::Delete);

    // A second latest-view lookup is served from the cache.
    let disk_before = ix.stat().disk.lookup.load(Ordering::Relaxed);
    let mem_before = ix.stat().memory.lookup.load(Ordering::Relaxed);
    assert!(point_lookup(&ix, None, ReadView::LATEST, &key(1))
        .unwrap()
        .is_none());
    assert_eq!(ix.stat().disk.lookup.load(Ordering::Relaxed), disk_before);
    assert_eq!(ix.stat().memory.lookup.load(Ordering::Relaxed), mem_before);
}

#[test]
fn test_insert_terminates_history_like_replace() {
    let ix = new_index();
    ix.insert(Statement::new_insert(
        Tuple::new(vec![Value::Int(1), Value::Int(7)]),
        30,
    ));
    ix.insert(upsert_add(1, 2, 60));

    let got = point_lookup(&ix, None, ReadView::LATEST, &key(1))
        .unwrap()
        .unwrap();
    assert_eq!(int_field(&got), 9);
    assert_eq!(got.kind(), StatementKind::Replace);
}

#[test]
fn test_older_snapshot_still_sees_below_tombstone() {
    let ix = new_index();
    ix.insert(replace_str(1, "x", 40));
    ix.insert(delete(1, 80));

    let got = point_lookup(&ix, None, ReadView::at(79), &key(1))
        .unwrap()
        .unwrap();
    assert_eq!(str_field(&got), &Value::from("x"));
}

#[test]
fn test_restart_on_dump_during_run_scan() {
    let ix = new_index();
    ix.insert(upsert_add(1, 5, 30));

    let base = Arc::new(Run::build(
        7,
        Arc::clone(ix.cmp_def()),
        vec![replace_int(1, 0, 10)],
    ));
    let rotating = Arc::new(RotatingRun::new(Arc::clone(&base)));
    rotating.arm(&ix);
    let slice = ix.add_slice(Arc::clone(&rotating) as Arc<dyn RunRead>, &key(1));

    let got = point_lookup(&ix, None, ReadView::LATEST, &key(1))
        .unwrap()
        .unwrap();
    assert_eq!(int_field(&got), 5);

    // Exactly one restart, and no leaked pins.
    assert_eq!(ix.stat().restart.load(Ordering::Relaxed), 1);
    assert_eq!(slice.pin_count(), 0);
    // Both passes consulted the slice.
    assert_eq!(ix.stat().disk.lookup.load(Ordering::Relaxed), 2);
}

#[test]
fn test_transaction_own_write_wins_and_skips_cache_publish() {
    let ix = new_index();
    ix.insert(replace_str(1, "m", 60));
    attach_run(&ix, 1, vec![replace_str(1, "r", 10)]);
    let cached = replace_str(1, "c", 50);
    ix.cache().add(Some(Arc::clone(&cached)), &key(1));

    let tx = Tx::new(1);
    tx.set(&ix, replace_str(1, "t", PENDING_LSN));

    let got = point_lookup(&ix, Some(&tx), ReadView::LATEST, &key(1))
        .unwrap()
        .unwrap();
    assert_eq!(str_field(&got), &Value::from("t"));

    // The cache still holds the pre-lookup entry.
    let after = ix.cache().get(&key(1)).unwrap();
    assert!(Arc::ptr_eq(&after, &cached));
}

#[test]
fn test_transactional_upsert_composes_without_publishing() {
    let ix = new_index();
    ix.insert(replace_int(1, 10, 50));
    let cache_len_before = ix.cache().len();

    let tx = Tx::new(1);
    tx.set(&ix, upsert_add(1, 1, PENDING_LSN));

    let got = point_lookup(&ix, Some(&tx), ReadView::LATEST, &key(1))
        .unwrap()
        .unwrap();
    assert_eq!(int_field(&got), 11);
    assert_eq!(ix.cache().len(), cache_len_before);
}

#[test]
fn test_txw_terminal_short_circuits_everything() {
    let ix = new_index();
    ix.insert(replace_str(1, "m", 60));

    let tx = Tx::new(1);
    tx.set(&ix, replace_str(1, "t", PENDING_LSN));

    let got = point_lookup(&ix, Some(&tx), ReadView::LATEST, &key(1))
        .unwrap()
        .unwrap();
    assert_eq!(str_field(&got), &Value::from("t"));
    assert_eq!(ix.cache().stat().lookup.load(Ordering::Relaxed), 0);
    assert_eq!(ix.stat().memory.lookup.load(Ordering::Relaxed), 0);
    assert_eq!(ix.stat().disk.lookup.load(Ordering::Relaxed), 0);
}

// ---------------------------------------------------------------------
// Error paths
// ---------------------------------------------------------------------

#[test]
fn test_run_read_failure_propagates_and_unpins() {
    let ix = new_index();
    let slice = ix.add_slice(Arc::new(FailingRun) as Arc<dyn RunRead>, &key(1));

    let err = point_lookup(&ix, None, ReadView::LATEST, &key(1)).unwrap_err();
    assert!(matches!(err, StorageError::Io(_)));
    assert_eq!(slice.pin_count(), 0);
    // Nothing is published on error.
    assert!(ix.cache().is_empty());
}

#[test]
fn test_failed_slice_does_not_block_unpin_of_others() {
    let ix = new_index();
    // The failing slice is scanned first (newest); the good one is
    // never reached but must still be unpinned.
    let good_run = Arc::new(Run::build(
        1,
        Arc::clone(ix.cmp_def()),
        vec![replace_int(1, 1, 10)],
    ));
    let good = ix.add_slice(good_run as Arc<dyn RunRead>, &key(1));
    let failing = ix.add_slice(Arc::new(FailingRun) as Arc<dyn RunRead>, &key(1));

    assert!(point_lookup(&ix, None, ReadView::LATEST, &key(1)).is_err());
    assert_eq!(failing.pin_count(), 0);
    assert_eq!(good.pin_count(), 0);
}

#[test]
fn test_track_point_quota_fails_before_any_scan() {
    let ix = new_index();
    ix.insert(replace_str(1, "v", 10));

    let tx = Tx::with_options(
        9,
        TxOptions {
            max_tracked_points: 0,
        },
    );
    let err = point_lookup(&ix, Some(&tx), ReadView::LATEST, &key(1)).unwrap_err();
    assert!(matches!(err, StorageError::ResourceExhausted(_)));
    assert_eq!(ix.stat().txw.lookup.load(Ordering::Relaxed), 0);
    assert_eq!(ix.stat().memory.lookup.load(Ordering::Relaxed), 0);
}

// ---------------------------------------------------------------------
// Resource accounting
// ---------------------------------------------------------------------

#[test]
fn test_statement_references_balance_after_lookups() {
    let ix = new_index();
    let run_stmt = replace_int(1, 10, 20);
    attach_run(&ix, 1, vec![Arc::clone(&run_stmt)]);
    ix.insert(upsert_add(1, 1, 50));

    let baseline = Arc::strong_count(&run_stmt);
    for _ in 0..8 {
        // Non-latest views never publish, so nothing outlives the call.
        let got = point_lookup(&ix, None, ReadView::at(1000), &key(1)).unwrap();
        drop(got);
    }
    assert_eq!(Arc::strong_count(&run_stmt), baseline);
}

#[test]
fn test_mem_terminal_is_duplicated() {
    let ix = new_index();
    let stored = replace_str(1, "v", 50);
    ix.insert(Arc::clone(&stored));

    let got = point_lookup(&ix, None, ReadView::LATEST, &key(1))
        .unwrap()
        .unwrap();
    assert_eq!(got.tuple(), stored.tuple());
    assert!(!Arc::ptr_eq(&got, &stored));
}

#[test]
fn test_run_terminal_is_shared_not_copied() {
    let ix = new_index();
    let stored = replace_str(1, "v", 50);
    attach_run(&ix, 1, vec![Arc::clone(&stored)]);

    let got = point_lookup(&ix, None, ReadView::at(1000), &key(1))
        .unwrap()
        .unwrap();
    assert!(Arc::ptr_eq(&got, &stored));
}

// ---------------------------------------------------------------------
// Snapshot monotonicity against a reference model
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum ModelWrite {
    Replace(i64),
    Delete,
    UpsertAdd(i64),
}

/// Fold the visible history of one key exactly as materialization does.
fn model_result(writes: &[(Lsn, ModelWrite)], vlsn: Lsn) -> Option<i64> {
    let mut visible: Vec<&(Lsn, ModelWrite)> =
        writes.iter().filter(|(lsn, _)| *lsn <= vlsn).collect();
    visible.sort_by_key(|(lsn, _)| std::cmp::Reverse(*lsn));

    let mut deltas: Vec<i64> = Vec::new();
    let mut base: Option<i64> = None;
    for (_, write) in visible {
        match write {
            ModelWrite::UpsertAdd(d) => deltas.push(*d),
            ModelWrite::Replace(v) => {
                base = Some(*v);
                break;
            }
            ModelWrite::Delete => break,
        }
    }
    // Oldest delta first; with no base the oldest upsert writes its own
    // default tuple, whose counter equals its delta.
    for d in deltas.into_iter().rev() {
        base = Some(match base {
            Some(v) => v + d,
            None => d,
        });
    }
    base
}

#[test]
fn test_snapshot_monotonicity_random_history() {
    let mut rng = StdRng::seed_from_u64(0x10a3);
    for round in 0..8 {
        let ix = new_index();
        let mut writes: Vec<(Lsn, ModelWrite)> = Vec::new();
        let mut lsn = 0;

        for step in 0..40 {
            lsn += rng.gen_range(1..4);
            let write = match rng.gen_range(0..10) {
                0..=4 => ModelWrite::Replace(rng.gen_range(0..100)),
                5 => ModelWrite::Delete,
                _ => ModelWrite::UpsertAdd(rng.gen_range(1..10)),
            };
            writes.push((lsn, write));
            match write {
                ModelWrite::Replace(v) => ix.insert(replace_int(1, v, lsn)),
                ModelWrite::Delete => ix.insert(delete(1, lsn)),
                ModelWrite::UpsertAdd(d) => ix.insert(upsert_add(1, d, lsn)),
            }
            // Push the older half of the history through a dump so the
            // lookup has to merge mem and run sources.
            if step == 19 {
                ix.rotate_mem();
                let sealed = Arc::clone(&ix.mem_list().sealed()[0]);
                ix.complete_dump(Arc::new(Run::from_mem(round as u64, &sealed)));
            }
        }

        for vlsn in 0..=lsn + 2 {
            let got = point_lookup(&ix, None, ReadView::at(vlsn), &key(1))
                .unwrap()
                .map(|s| int_field(&s));
            assert_eq!(
                got,
                model_result(&writes, vlsn),
                "round {round}, vlsn {vlsn}"
            );
        }
    }
}
