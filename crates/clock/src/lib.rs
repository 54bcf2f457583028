// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Time sources. Components that record timestamps take a [`Clock`] instead of reading the
//! system time themselves, so that tests can drive time explicitly.

#[cfg(any(test, feature = "test-util"))]
mod mock_clock;
pub mod time;
mod wall_clock;

#[cfg(any(test, feature = "test-util"))]
pub use mock_clock::MockClock;
pub use time::MillisSinceEpoch;
pub use wall_clock::WallClock;

/// A source of the current unix time.
pub trait Clock: Send + Sync {
    /// Current unix timestamp in milliseconds.
    fn now(&self) -> MillisSinceEpoch;
}
