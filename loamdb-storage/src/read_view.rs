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

//! Read views
//!
//! A read view is a snapshot bound: a statement is visible iff its LSN is
//! at most the view's `vlsn`. [`ReadView::LATEST`] sees everything
//! committed and is the only view under which lookup results may be
//! published to the result cache.

use crate::statement::Lsn;

/// Snapshot visibility bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadView {
    vlsn: Lsn,
}

impl ReadView {
    /// The latest committed state.
    pub const LATEST: ReadView = ReadView { vlsn: Lsn::MAX };

    /// A view pinned at `vlsn`.
    #[inline]
    pub fn at(vlsn: Lsn) -> Self {
        Self { vlsn }
    }

    #[inline]
    pub fn vlsn(&self) -> Lsn {
        self.vlsn
    }

    #[inline]
    pub fn is_latest(&self) -> bool {
        self.vlsn == Lsn::MAX
    }

    /// Whether a statement committed at `lsn` is visible in this view.
    #[inline]
    pub fn sees(&self, lsn: Lsn) -> bool {
        lsn <= self.vlsn
    }
}
