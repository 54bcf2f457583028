// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, derive_builder::Builder, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
#[builder(default)]
pub struct MessageGroupOptions {
    /// # Warn on overflow
    ///
    /// Log a warning when an accepted message makes a group hold more members than its declared
    /// sequence size. Such a group can never become complete. This happens when producers emit
    /// sequence numbers outside of `1..=sequence-size`.
    pub warn_on_overflow: bool,
}

impl Default for MessageGroupOptions {
    fn default() -> Self {
        Self {
            warn_on_overflow: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use googletest::prelude::*;

    #[test]
    fn missing_fields_take_defaults() {
        let options: MessageGroupOptions = serde_json::from_str("{}").unwrap();

        assert_that!(options, eq(MessageGroupOptions::default()));
        assert_that!(options.warn_on_overflow, eq(true));
    }

    #[test]
    fn reads_kebab_case_keys() {
        let options: MessageGroupOptions =
            serde_json::from_str(r#"{ "warn-on-overflow": false }"#).unwrap();

        assert_that!(
            options,
            eq(MessageGroupOptionsBuilder::default()
                .warn_on_overflow(false)
                .build()
                .unwrap())
        );
    }
}
