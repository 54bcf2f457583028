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

use arc_swap::ArcSwap;

use crate::message::{Message, MessageId};

/// Immutable point-in-time view of the members of a set.
pub type Snapshot<P> = Arc<Vec<Arc<Message<P>>>>;

/// A copy-on-write set of messages, unique by [`MessageId`].
///
/// Readers load the current snapshot without locking and keep iterating over it even while
/// writers replace it. Writers go through `rcu`, so concurrent inserts never lose each other.
/// Each individual operation is atomic, sequences of operations are not.
pub(crate) struct MemberSet<P> {
    members: ArcSwap<Vec<Arc<Message<P>>>>,
}

impl<P> Default for MemberSet<P> {
    fn default() -> Self {
        Self {
            members: ArcSwap::from_pointee(Vec::new()),
        }
    }
}

impl<P> Clone for MemberSet<P> {
    fn clone(&self) -> Self {
        Self {
            members: ArcSwap::new(self.members.load_full()),
        }
    }
}

impl<P> MemberSet<P> {
    /// Builds a set from members that are known to be unique.
    pub fn from_snapshot(snapshot: Snapshot<P>) -> Self {
        Self {
            members: ArcSwap::new(snapshot),
        }
    }

    pub fn snapshot(&self) -> Snapshot<P> {
        self.members.load_full()
    }

    pub fn len(&self) -> usize {
        self.members.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.load().is_empty()
    }

    pub fn first(&self) -> Option<Arc<Message<P>>> {
        self.members.load().first().cloned()
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.members.load().iter().any(|member| member.id() == id)
    }

    pub fn contains_sequence_number(&self, sequence_number: u32) -> bool {
        self.members
            .load()
            .iter()
            .any(|member| member.headers().sequence_number() == Some(sequence_number))
    }

    /// Returns `false` if a message with the same id is already present.
    pub fn insert(&self, message: Arc<Message<P>>) -> bool {
        let mut inserted = false;
        self.members.rcu(|current| {
            if current.iter().any(|member| member.id() == message.id()) {
                inserted = false;
                Arc::clone(current)
            } else {
                inserted = true;
                let mut next = Vec::with_capacity(current.len() + 1);
                next.extend(current.iter().cloned());
                next.push(Arc::clone(&message));
                Arc::new(next)
            }
        });
        inserted
    }

    /// Inserts every message not yet present and returns how many were added.
    pub fn insert_all(&self, messages: &[Arc<Message<P>>]) -> usize {
        let mut added = 0;
        self.members.rcu(|current| {
            let mut next = Vec::clone(current);
            for message in messages {
                if !next.iter().any(|member| member.id() == message.id()) {
                    next.push(Arc::clone(message));
                }
            }
            added = next.len() - current.len();
            next
        });
        added
    }

    /// Removes the given messages, leaving any member that is not among them in place.
    pub fn remove_all(&self, messages: &[Arc<Message<P>>]) {
        self.members.rcu(|current| {
            current
                .iter()
                .filter(|member| !messages.iter().any(|m| m.id() == member.id()))
                .cloned()
                .collect::<Vec<_>>()
        });
    }
}
