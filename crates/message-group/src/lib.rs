// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Correlated message groups.
//!
//! Aggregation pipelines collect messages that share a correlation key, for example the parts of
//! a split request, until the collection is complete, and then release them downstream. A
//! [`MessageGroup`] holds that state for one correlation key: the pending (*unmarked*) members,
//! the already released (*marked*) members and the time the group was created.
//!
//! Mapping keys to groups, persisting them and deciding when to check for completeness is left to
//! the owner of the groups.

mod error;
mod group;
mod member_set;
mod message;
mod options;
mod simple;

#[cfg(any(test, feature = "test-util"))]
pub mod test_util;

pub use error::AddRejected;
pub use group::MessageGroup;
pub use member_set::Snapshot;
pub use message::{CorrelationKey, Message, MessageBuilder, MessageHeaders, MessageId};
pub use options::{MessageGroupOptions, MessageGroupOptionsBuilder, MessageGroupOptionsBuilderError};
pub use simple::SimpleMessageGroup;
