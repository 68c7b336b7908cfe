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

//! Tuples
//!
//! A tuple is a flat vector of [`Value`] fields. An index's key definition
//! designates the leading fields as the key; search keys are tuples whose
//! field count is at least the key arity.

use std::fmt;
use std::mem;

use crate::value::Value;

/// A flat field vector.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tuple {
    fields: Vec<Value>,
}

impl Tuple {
    /// Create a tuple from its fields.
    pub fn new(fields: Vec<Value>) -> Self {
        Self { fields }
    }

    /// Number of fields.
    #[inline]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// All fields, in order.
    #[inline]
    pub fn fields(&self) -> &[Value] {
        &self.fields
    }

    /// Field at `idx`, if present.
    #[inline]
    pub fn field(&self, idx: usize) -> Option<&Value> {
        self.fields.get(idx)
    }

    /// Approximate in-memory footprint in bytes.
    pub fn approx_size(&self) -> usize {
        mem::size_of::<Self>() + self.fields.iter().map(Value::approx_size).sum::<usize>()
    }
}

impl From<Vec<Value>> for Tuple {
    fn from(fields: Vec<Value>) -> Self {
        Self::new(fields)
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, v) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v}")?;
        }
        write!(f, ")")
    }
}
