// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::time::SystemTime;

use crate::Clock;
use crate::time::MillisSinceEpoch;

/// Production implementation of [`Clock`] backed by system time.
///
/// Every call to [`now()`](Clock::now) reads `SystemTime::now()`. `WallClock` is `Copy` and can be
/// shared freely across threads.
#[derive(Debug, Default, Copy, Clone)]
pub struct WallClock;

impl WallClock {
    /// Returns the current unix timestamp in milliseconds via `SystemTime::now()`.
    #[inline]
    pub fn now_ms() -> MillisSinceEpoch {
        MillisSinceEpoch::from(SystemTime::now())
    }
}

impl Clock for WallClock {
    #[inline]
    fn now(&self) -> MillisSinceEpoch {
        WallClock::now_ms()
    }
}
