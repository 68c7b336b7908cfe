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

//! LoamDB Core Types
//!
//! Shared vocabulary for the LoamDB storage engine:
//!
//! - **Errors** (`error`): the `StorageError` enum and the crate-wide
//!   `Result` alias.
//! - **Values** (`value`): the ordered datum type stored in tuple fields.
//! - **Tuples** (`tuple`): flat field vectors, the unit of storage and the
//!   shape of search keys.

pub mod error;
pub mod tuple;
pub mod value;

pub use error::{Result, StorageError};
pub use tuple::Tuple;
pub use value::Value;
