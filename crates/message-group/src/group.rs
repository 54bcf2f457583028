// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::sync::Arc;

use restate_clock::MillisSinceEpoch;

use crate::member_set::Snapshot;
use crate::message::{CorrelationKey, Message};

/// A group of correlated messages that is collected until it is complete.
///
/// Members are partitioned into *unmarked* messages, which are still pending, and *marked*
/// messages, which have already been released downstream. A message belongs to at most one of
/// the two partitions.
///
/// The group is owned by a store that maps correlation keys to groups. Implementations are not
/// required to make sequences of calls atomic: a store that evaluates completeness while other
/// callers keep adding must serialize access to a group itself.
pub trait MessageGroup<P> {
    fn correlation_key(&self) -> &CorrelationKey;

    /// Creation time of the group.
    fn timestamp(&self) -> MillisSinceEpoch;

    /// Pending members.
    fn unmarked(&self) -> Snapshot<P>;

    /// Members that have already been released.
    fn marked(&self) -> Snapshot<P>;

    /// Adds a message to the unmarked members. Returns `false` if the message is rejected: it was
    /// already released, or the group holds a message that supersedes it. Re-adding a pending
    /// message without sequence number succeeds without changing the group.
    fn add(&self, message: Arc<Message<P>>) -> bool;

    /// Moves all unmarked members to the marked ones.
    fn mark(&self);

    /// Any member, preferring unmarked ones. Callers must not rely on which member is returned.
    fn one(&self) -> Option<Arc<Message<P>>> {
        if let Some(message) = self.unmarked().first() {
            return Some(Arc::clone(message));
        }
        self.marked().first().cloned()
    }

    fn size(&self) -> usize {
        self.unmarked().len() + self.marked().len()
    }

    /// Sequence size declared by the members, `0` for an empty group or if the members are not
    /// part of a counted sequence.
    fn sequence_size(&self) -> u32 {
        self.one()
            .map(|message| message.headers().sequence_size())
            .unwrap_or_default()
    }

    /// An empty group is complete. Otherwise the group is complete once it holds as many members
    /// as its sequence size. Groups without a sequence size never complete.
    fn is_complete(&self) -> bool {
        let size = self.size();
        if size == 0 {
            return true;
        }
        let sequence_size = self.sequence_size();
        sequence_size > 0 && sequence_size as usize == size
    }

    /// Whether the group holds more members than its sequence size, in which case it can never
    /// become complete.
    fn exceeds_sequence_size(&self) -> bool {
        let sequence_size = self.sequence_size();
        sequence_size > 0 && self.size() > sequence_size as usize
    }
}
