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

//! Upsert application
//!
//! An UPSERT statement carries a default tuple and a list of field
//! operations. Applied to an existing base tuple, the operations are
//! folded into the base left to right; applied to nothing, the upsert
//! degrades to a REPLACE of its default tuple and the operations are not
//! executed. Either way the result is a REPLACE at the delta's LSN, so a
//! chain of upserts folds bottom-up into a single terminal statement.
//!
//! Key fields are immutable: an operation addressing a key part is an
//! error, as is addressing a missing field or adding to a non-integer.

use std::sync::Arc;

use loamdb_core::{Result, StorageError, Value};

use crate::keydef::KeyDef;
use crate::statement::{Statement, StatementKind};

/// One field operation of an UPSERT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOp {
    /// Add `delta` to the integer field at `field`.
    Add { field: usize, delta: i64 },
    /// Overwrite the field at `field` with `value`.
    Assign { field: usize, value: Value },
}

impl UpsertOp {
    fn field(&self) -> usize {
        match self {
            UpsertOp::Add { field, .. } | UpsertOp::Assign { field, .. } => *field,
        }
    }
}

/// Apply the upsert `delta` to `base`, producing a new REPLACE statement.
///
/// `base` must be a terminal non-tombstone statement when present; a
/// deleted or never-written key passes `None`.
pub fn apply_upsert(
    delta: &Statement,
    base: Option<&Statement>,
    def: &KeyDef,
) -> Result<Arc<Statement>> {
    debug_assert_eq!(delta.kind(), StatementKind::Upsert);

    let Some(base) = base else {
        // No older value: the upsert acts as a plain write of its
        // default tuple.
        return Ok(Statement::new_replace(delta.tuple().clone(), delta.lsn()));
    };
    debug_assert!(base.is_terminal() && base.kind() != StatementKind::Delete);

    let mut fields = base.tuple().fields().to_vec();
    for op in delta.ops() {
        let idx = op.field();
        if idx < def.part_count() {
            return Err(StorageError::Upsert(format!(
                "operation targets key field {idx}"
            )));
        }
        let Some(slot) = fields.get_mut(idx) else {
            return Err(StorageError::Upsert(format!(
                "operation targets missing field {idx} (tuple has {})",
                base.tuple().field_count()
            )));
        };
        match op {
            UpsertOp::Add { delta, .. } => match slot {
                Value::Int(v) => *v = v.wrapping_add(*delta),
                other => {
                    return Err(StorageError::Upsert(format!(
                        "cannot add to non-integer field {idx}: {other}"
                    )));
                }
            },
            UpsertOp::Assign { value, .. } => *slot = value.clone(),
        }
    }
    Ok(Statement::new_replace(fields.into(), delta.lsn()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use loamdb_core::Tuple;

    fn def() -> KeyDef {
        KeyDef::new(1)
    }

    fn base(counter: i64) -> Arc<Statement> {
        Statement::new_replace(Tuple::new(vec![Value::Int(1), Value::Int(counter)]), 20)
    }

    fn add_upsert(delta: i64, lsn: i64) -> Arc<Statement> {
        Statement::new_upsert(
            Tuple::new(vec![Value::Int(1), Value::Int(delta)]),
            vec![UpsertOp::Add { field: 1, delta }],
            lsn,
        )
    }

    #[test]
    fn test_apply_without_base_uses_default_tuple() {
        let delta = add_upsert(5, 30);
        let out = apply_upsert(&delta, None, &def()).unwrap();
        assert_eq!(out.kind(), StatementKind::Replace);
        assert_eq!(out.lsn(), 30);
        assert_eq!(out.tuple().field(1), Some(&Value::Int(5)));
    }

    #[test]
    fn test_add_folds_into_base() {
        let delta = add_upsert(1, 50);
        let out = apply_upsert(&delta, Some(&base(10)), &def()).unwrap();
        assert_eq!(out.lsn(), 50);
        assert_eq!(out.tuple().field(1), Some(&Value::Int(11)));
    }

    #[test]
    fn test_assign_overwrites_field() {
        let delta = Statement::new_upsert(
            Tuple::new(vec![Value::Int(1), Value::Int(0)]),
            vec![UpsertOp::Assign {
                field: 1,
                value: Value::from("new"),
            }],
            50,
        );
        let out = apply_upsert(&delta, Some(&base(10)), &def()).unwrap();
        assert_eq!(out.tuple().field(1), Some(&Value::from("new")));
    }

    #[test]
    fn test_missing_field_is_an_error() {
        let delta = Statement::new_upsert(
            Tuple::new(vec![Value::Int(1), Value::Int(0)]),
            vec![UpsertOp::Add { field: 9, delta: 1 }],
            50,
        );
        let err = apply_upsert(&delta, Some(&base(10)), &def()).unwrap_err();
        assert!(matches!(err, StorageError::Upsert(_)));
    }

    #[test]
    fn test_key_field_is_immutable() {
        let delta = Statement::new_upsert(
            Tuple::new(vec![Value::Int(1), Value::Int(0)]),
            vec![UpsertOp::Add { field: 0, delta: 1 }],
            50,
        );
        assert!(apply_upsert(&delta, Some(&base(10)), &def()).is_err());
    }

    #[test]
    fn test_add_to_string_is_an_error() {
        let delta = add_upsert(1, 50);
        let strbase =
            Statement::new_replace(Tuple::new(vec![Value::Int(1), Value::from("s")]), 20);
        assert!(apply_upsert(&delta, Some(&strbase), &def()).is_err());
    }
}
