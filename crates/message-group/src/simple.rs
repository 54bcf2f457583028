// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use restate_clock::{Clock, MillisSinceEpoch};

use crate::error::AddRejected;
use crate::group::MessageGroup;
use crate::member_set::{MemberSet, Snapshot};
use crate::message::{CorrelationKey, Message};
use crate::options::MessageGroupOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
enum Partition {
    #[display("unmarked")]
    Unmarked,
    #[display("marked")]
    Marked,
}

impl Partition {
    fn other(self) -> Self {
        match self {
            Partition::Unmarked => Partition::Marked,
            Partition::Marked => Partition::Unmarked,
        }
    }
}

enum Admission {
    Insert,
    /// The same message without sequence headers is already in the target partition.
    AlreadyPresent,
}

/// In-memory [`MessageGroup`] backed by two copy-on-write member sets.
///
/// All operations take `&self` and the group can be shared between threads. Readers always see a
/// consistent snapshot of each set, but no operation is atomic with respect to another one. In
/// particular, deciding whether a message may join and inserting it are separate steps, so two
/// concurrent writers can both insert a message for the same sequence number. Owners that
/// aggregate from concurrent producers must serialize access per correlation key.
pub struct SimpleMessageGroup<P> {
    correlation_key: CorrelationKey,
    timestamp: MillisSinceEpoch,
    unmarked: MemberSet<P>,
    marked: MemberSet<P>,
    options: MessageGroupOptions,
}

impl<P> SimpleMessageGroup<P> {
    /// Creates an empty group, timestamped with the current time of `clock`.
    pub fn new(correlation_key: impl Into<CorrelationKey>, clock: &impl Clock) -> Self {
        Self::from_parts(
            std::iter::empty(),
            std::iter::empty(),
            correlation_key,
            clock.now(),
        )
    }

    /// Creates a group holding the given pending messages. Messages that would be rejected by
    /// [`add`](MessageGroup::add) are dropped. Use
    /// [`from_parts_with_options`](Self::from_parts_with_options) to seed a group with non-default
    /// options.
    pub fn with_unmarked(
        unmarked: impl IntoIterator<Item = Arc<Message<P>>>,
        correlation_key: impl Into<CorrelationKey>,
        clock: &impl Clock,
    ) -> Self {
        Self::from_parts(unmarked, std::iter::empty(), correlation_key, clock.now())
    }

    /// Restores a group from its members.
    ///
    /// Unmarked messages are added before marked ones and both go through the same admission
    /// check, so if both lists claim the same sequence slot the unmarked message is kept.
    pub fn from_parts(
        unmarked: impl IntoIterator<Item = Arc<Message<P>>>,
        marked: impl IntoIterator<Item = Arc<Message<P>>>,
        correlation_key: impl Into<CorrelationKey>,
        timestamp: MillisSinceEpoch,
    ) -> Self {
        Self::from_parts_with_options(
            unmarked,
            marked,
            correlation_key,
            timestamp,
            MessageGroupOptions::default(),
        )
    }

    /// Like [`from_parts`](Self::from_parts), with `options` in effect while the members are
    /// added.
    pub fn from_parts_with_options(
        unmarked: impl IntoIterator<Item = Arc<Message<P>>>,
        marked: impl IntoIterator<Item = Arc<Message<P>>>,
        correlation_key: impl Into<CorrelationKey>,
        timestamp: MillisSinceEpoch,
        options: MessageGroupOptions,
    ) -> Self {
        let group = Self {
            correlation_key: correlation_key.into(),
            timestamp,
            unmarked: MemberSet::default(),
            marked: MemberSet::default(),
            options,
        };
        for message in unmarked {
            let _ = group.insert(message, Partition::Unmarked);
        }
        for message in marked {
            let _ = group.insert(message, Partition::Marked);
        }
        group
    }

    /// Copies key, timestamp and members of `template` without re-checking them.
    pub fn from_template<G>(template: &G) -> Self
    where
        G: MessageGroup<P> + ?Sized,
    {
        Self {
            correlation_key: template.correlation_key().clone(),
            timestamp: template.timestamp(),
            unmarked: MemberSet::from_snapshot(template.unmarked()),
            marked: MemberSet::from_snapshot(template.marked()),
            options: MessageGroupOptions::default(),
        }
    }

    pub fn with_options(mut self, options: MessageGroupOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &MessageGroupOptions {
        &self.options
    }

    /// Like [`add`](MessageGroup::add), but tells why a message was rejected.
    pub fn try_add(&self, message: Arc<Message<P>>) -> Result<(), AddRejected> {
        self.insert(message, Partition::Unmarked)
    }

    fn members(&self, partition: Partition) -> &MemberSet<P> {
        match partition {
            Partition::Unmarked => &self.unmarked,
            Partition::Marked => &self.marked,
        }
    }

    fn insert(&self, message: Arc<Message<P>>, partition: Partition) -> Result<(), AddRejected> {
        let id = message.id();
        let unsequenced = message.headers().sequence_number().is_none();
        let result = self
            .admit(&message, partition)
            .and_then(|admission| match admission {
                Admission::AlreadyPresent => Ok(false),
                Admission::Insert => {
                    if self.members(partition).insert(message) {
                        Ok(true)
                    } else if unsequenced {
                        // a concurrent writer inserted the same message first
                        Ok(false)
                    } else {
                        Err(AddRejected::AlreadyMember { id })
                    }
                }
            });

        match &result {
            Ok(true) => {
                trace!(
                    correlation_key = %self.correlation_key,
                    message_id = %id,
                    %partition,
                    "Added message to group"
                );
                self.check_overflow();
            }
            Ok(false) => {
                trace!(
                    correlation_key = %self.correlation_key,
                    message_id = %id,
                    %partition,
                    "Message is already a member of the group"
                );
            }
            Err(rejected) => {
                debug!(
                    correlation_key = %self.correlation_key,
                    message_id = %id,
                    %partition,
                    "Rejected message: {rejected}"
                );
            }
        }
        result.map(|_| ())
    }

    /// Decides whether the group already holds `message` or a message that supersedes it.
    fn admit(&self, message: &Message<P>, partition: Partition) -> Result<Admission, AddRejected> {
        if self.unmarked.is_empty() && self.marked.is_empty() {
            return Ok(Admission::Insert);
        }

        let id = message.id();
        let sequence_number = message.headers().sequence_number();
        if self.members(partition).contains(id) {
            return match sequence_number {
                None => Ok(Admission::AlreadyPresent),
                Some(_) => Err(AddRejected::AlreadyMember { id }),
            };
        }
        // a message is never pending and released at the same time
        if self.members(partition.other()).contains(id) {
            return Err(AddRejected::AlreadyMember { id });
        }

        // messages outside of a counted sequence are always admitted
        let Some(sequence_number) = sequence_number else {
            return Ok(Admission::Insert);
        };

        let expected = self.sequence_size();
        let actual = message.headers().sequence_size();
        if actual != expected {
            return Err(AddRejected::SequenceSizeMismatch {
                sequence_number,
                expected,
                actual,
            });
        }

        if self.unmarked.contains_sequence_number(sequence_number)
            || self.marked.contains_sequence_number(sequence_number)
        {
            return Err(AddRejected::DuplicateSequenceNumber { sequence_number });
        }

        Ok(Admission::Insert)
    }

    fn check_overflow(&self) {
        if let Some(sequence_size) = self.overflow_to_report() {
            warn!(
                correlation_key = %self.correlation_key,
                sequence_size,
                "Message group holds more members than its sequence size and can no longer complete"
            );
        }
    }

    /// The sequence size the group just outgrew, if that is to be reported. Only the member that
    /// crosses the declared size is reported.
    fn overflow_to_report(&self) -> Option<u32> {
        if !self.options.warn_on_overflow {
            return None;
        }
        let sequence_size = self.sequence_size();
        (sequence_size > 0 && self.size() == sequence_size as usize + 1).then_some(sequence_size)
    }
}

impl<P> MessageGroup<P> for SimpleMessageGroup<P> {
    fn correlation_key(&self) -> &CorrelationKey {
        &self.correlation_key
    }

    fn timestamp(&self) -> MillisSinceEpoch {
        self.timestamp
    }

    fn unmarked(&self) -> Snapshot<P> {
        self.unmarked.snapshot()
    }

    fn marked(&self) -> Snapshot<P> {
        self.marked.snapshot()
    }

    fn add(&self, message: Arc<Message<P>>) -> bool {
        self.try_add(message).is_ok()
    }

    fn mark(&self) {
        let pending = self.unmarked.snapshot();
        if pending.is_empty() {
            return;
        }
        // Copy first, remove after: a concurrent reader may briefly see a message in both sets,
        // but never in neither. Messages added in between are not part of `pending` and stay.
        let moved = self.marked.insert_all(&pending);
        self.unmarked.remove_all(&pending);
        debug!(
            correlation_key = %self.correlation_key,
            moved,
            "Marked pending messages"
        );
    }

    fn one(&self) -> Option<Arc<Message<P>>> {
        self.unmarked.first().or_else(|| self.marked.first())
    }

    fn size(&self) -> usize {
        self.unmarked.len() + self.marked.len()
    }
}

impl<P> Clone for SimpleMessageGroup<P> {
    fn clone(&self) -> Self {
        Self {
            correlation_key: self.correlation_key.clone(),
            timestamp: self.timestamp,
            unmarked: self.unmarked.clone(),
            marked: self.marked.clone(),
            options: self.options,
        }
    }
}

impl<P> fmt::Debug for SimpleMessageGroup<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleMessageGroup")
            .field("correlation_key", &self.correlation_key)
            .field("timestamp", &self.timestamp)
            .field("unmarked", &self.unmarked.len())
            .field("marked", &self.marked.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert2::let_assert;
    use googletest::prelude::*;
    use test_log::test;

    use restate_clock::MockClock;

    use crate::message::MessageBuilder;
    use crate::test_util::{sequenced, unsequenced};

    fn clock() -> MockClock {
        MockClock::with_timestamp(MillisSinceEpoch::new(1_700_000_000_000))
    }

    #[test]
    fn new_group_is_empty_and_complete() {
        let group = SimpleMessageGroup::<()>::new("order-42", &clock());

        assert_that!(group.size(), eq(0));
        assert_that!(group.is_complete(), eq(true));
        assert_that!(group.sequence_size(), eq(0));
        assert_that!(group.one(), none());
        assert_that!(group.correlation_key().as_str(), eq("order-42"));
        assert_that!(group.timestamp(), eq(MillisSinceEpoch::new(1_700_000_000_000)));
    }

    #[test]
    fn timestamp_is_fixed_at_creation() {
        let clock = clock();
        let group = SimpleMessageGroup::<()>::new("order-42", &clock);

        clock.advance_ms(5_000);
        group.add(sequenced(1, 2));

        assert_that!(group.timestamp(), eq(MillisSinceEpoch::new(1_700_000_000_000)));
    }

    #[test]
    fn completes_when_all_sequence_members_arrived() {
        let group = SimpleMessageGroup::new("order-42", &clock());

        assert_that!(group.add(sequenced(1, 3)), eq(true));
        assert_that!(group.add(sequenced(2, 3)), eq(true));
        assert_that!(group.is_complete(), eq(false));

        assert_that!(group.add(sequenced(3, 3)), eq(true));
        assert_that!(group.size(), eq(3));
        assert_that!(group.sequence_size(), eq(3));
        assert_that!(group.is_complete(), eq(true));
    }

    #[test]
    fn rejects_redelivered_message() {
        let group = SimpleMessageGroup::new("order-42", &clock());
        let a = sequenced(1, 3);
        group.add(Arc::clone(&a));
        group.add(sequenced(2, 3));
        group.add(sequenced(3, 3));

        assert_that!(group.add(Arc::clone(&a)), eq(false));
        assert_that!(group.size(), eq(3));
        assert_that!(
            group.try_add(a.clone()),
            err(eq(AddRejected::AlreadyMember { id: a.id() }))
        );
    }

    #[test]
    fn rejects_distinct_message_for_taken_sequence_number() {
        let group = SimpleMessageGroup::new("order-42", &clock());
        group.add(sequenced(1, 3));

        assert_that!(
            group.try_add(sequenced(1, 3)),
            err(eq(AddRejected::DuplicateSequenceNumber { sequence_number: 1 }))
        );
        assert_that!(group.size(), eq(1));
    }

    #[test]
    fn rejects_sequence_size_mismatch() {
        let group = SimpleMessageGroup::new("order-42", &clock());
        group.add(sequenced(1, 3));

        let_assert!(
            Err(AddRejected::SequenceSizeMismatch {
                sequence_number: 1,
                expected: 3,
                actual: 5,
            }) = group.try_add(sequenced(1, 5))
        );
        assert_that!(group.add(sequenced(2, 5)), eq(false));
        assert_that!(group.size(), eq(1));
    }

    #[test]
    fn unsequenced_messages_are_always_admitted() {
        let group = SimpleMessageGroup::new("order-42", &clock());
        group.add(sequenced(1, 2));

        for expected_size in 2..10 {
            assert_that!(group.add(unsequenced()), eq(true));
            assert_that!(group.size(), eq(expected_size));
        }
        assert_that!(group.is_complete(), eq(false));
    }

    #[test]
    fn group_without_sequence_size_never_completes() {
        let group = SimpleMessageGroup::new("order-42", &clock());
        group.add(unsequenced());

        assert_that!(group.is_complete(), eq(false));
        // the representative declares no sequence size, so any sequenced message mismatches
        assert_that!(group.add(sequenced(1, 1)), eq(false));
    }

    #[test]
    fn mark_moves_all_pending_members() {
        let group = SimpleMessageGroup::new("order-42", &clock());
        group.add(sequenced(1, 3));
        group.add(sequenced(2, 3));
        group.add(sequenced(3, 3));

        group.mark();

        assert_that!(group.unmarked().len(), eq(0));
        assert_that!(group.marked().len(), eq(3));
        assert_that!(group.size(), eq(3));
        assert_that!(group.is_complete(), eq(true));
    }

    #[test]
    fn mark_is_idempotent() {
        let group = SimpleMessageGroup::new("order-42", &clock());
        group.add(sequenced(1, 2));
        group.mark();
        let marked = group.marked();

        group.mark();

        assert_that!(group.unmarked().len(), eq(0));
        assert_that!(group.marked(), eq(marked));
    }

    #[test]
    fn marked_members_still_block_their_sequence_number() {
        let group = SimpleMessageGroup::new("order-42", &clock());
        group.add(sequenced(1, 2));
        group.mark();

        assert_that!(group.add(sequenced(1, 2)), eq(false));
        assert_that!(group.add(sequenced(2, 2)), eq(true));
        assert_that!(group.is_complete(), eq(true));
    }

    #[test]
    fn one_prefers_unmarked_members() {
        let group = SimpleMessageGroup::new("order-42", &clock());
        let first = sequenced(1, 2);
        group.add(Arc::clone(&first));
        group.mark();

        assert_that!(group.one().map(|m| m.id()), some(eq(first.id())));

        let second = sequenced(2, 2);
        group.add(Arc::clone(&second));
        assert_that!(group.one().map(|m| m.id()), some(eq(second.id())));
    }

    #[test]
    fn with_unmarked_drops_superseded_messages() {
        let group = SimpleMessageGroup::with_unmarked(
            [sequenced(1, 2), sequenced(1, 2), sequenced(2, 2)],
            "order-42",
            &clock(),
        );

        assert_that!(group.size(), eq(2));
        assert_that!(group.marked().len(), eq(0));
        assert_that!(group.is_complete(), eq(true));
    }

    #[test]
    fn from_parts_prefers_unmarked_on_overlap() {
        let pending = sequenced(1, 2);
        let released = sequenced(1, 2);

        let group = SimpleMessageGroup::from_parts(
            [Arc::clone(&pending)],
            [Arc::clone(&released), sequenced(2, 2)],
            "order-42",
            MillisSinceEpoch::new(1_000),
        );

        assert_that!(group.unmarked().len(), eq(1));
        assert_that!(group.unmarked()[0].id(), eq(pending.id()));
        assert_that!(group.marked().len(), eq(1));
        assert_that!(group.marked()[0].headers().sequence_number(), some(eq(2)));
        assert_that!(group.timestamp(), eq(MillisSinceEpoch::new(1_000)));
    }

    #[test]
    fn overflowing_group_is_reported_but_not_complete() {
        let group = SimpleMessageGroup::new("order-42", &clock());
        group.add(sequenced(1, 2));
        group.add(sequenced(2, 2));
        assert_that!(group.exceeds_sequence_size(), eq(false));

        // out of range, but distinct from every member
        assert_that!(group.add(sequenced(3, 2)), eq(true));

        assert_that!(group.exceeds_sequence_size(), eq(true));
        assert_that!(group.is_complete(), eq(false));
    }

    #[test]
    fn unsequenced_redelivery_is_accepted_without_growing() {
        let group = SimpleMessageGroup::new("order-42", &clock());
        group.add(sequenced(1, 3));
        let m = unsequenced();

        assert_that!(group.add(Arc::clone(&m)), eq(true));
        assert_that!(group.add(Arc::clone(&m)), eq(true));
        assert_that!(group.try_add(Arc::clone(&m)), ok(eq(())));
        assert_that!(group.size(), eq(2));
        assert_that!(group.unmarked().len(), eq(2));
    }

    #[test]
    fn released_message_cannot_become_pending_again() {
        let group = SimpleMessageGroup::new("order-42", &clock());
        let m = unsequenced();
        group.add(Arc::clone(&m));
        group.mark();

        assert_that!(
            group.try_add(Arc::clone(&m)),
            err(eq(AddRejected::AlreadyMember { id: m.id() }))
        );
        assert_that!(group.unmarked().len(), eq(0));
        assert_that!(group.marked().len(), eq(1));
    }

    #[test]
    fn from_parts_keeps_unsequenced_message_in_first_list() {
        let m = unsequenced();

        let group = SimpleMessageGroup::from_parts(
            [Arc::clone(&m), Arc::clone(&m)],
            [Arc::clone(&m)],
            "order-42",
            MillisSinceEpoch::new(1_000),
        );

        assert_that!(group.unmarked().len(), eq(1));
        assert_that!(group.marked().len(), eq(0));
    }

    #[test]
    fn sequence_number_zero_is_never_rejected() {
        let group = SimpleMessageGroup::new("order-42", &clock());
        group.add(sequenced(1, 3));

        assert_that!(group.add(sequenced(0, 3)), eq(true));
        assert_that!(group.add(sequenced(0, 7)), eq(true));
        assert_that!(group.add(sequenced(0, 3)), eq(true));
        assert_that!(group.size(), eq(4));
    }

    #[test]
    fn missing_sequence_size_mismatches_known_size() {
        let group = SimpleMessageGroup::new("order-42", &clock());
        group.add(sequenced(1, 3));

        let_assert!(
            Err(AddRejected::SequenceSizeMismatch {
                sequence_number: 2,
                expected: 3,
                actual: 0,
            }) = group.try_add(MessageBuilder::with_payload(()).sequence_number(2).build_shared())
        );
        assert_that!(group.size(), eq(1));
    }

    #[test]
    fn seeding_honors_options() {
        let over_full = || [sequenced(1, 2), sequenced(2, 2), sequenced(3, 2)];
        let quiet = MessageGroupOptions {
            warn_on_overflow: false,
        };

        let group = SimpleMessageGroup::from_parts_with_options(
            over_full(),
            std::iter::empty(),
            "order-42",
            MillisSinceEpoch::new(1_000),
            quiet,
        );
        assert_that!(*group.options(), eq(quiet));
        assert_that!(group.exceeds_sequence_size(), eq(true));
        assert_that!(group.overflow_to_report(), none());

        let group = SimpleMessageGroup::from_parts(
            over_full(),
            std::iter::empty(),
            "order-42",
            MillisSinceEpoch::new(1_000),
        );
        assert_that!(group.overflow_to_report(), some(eq(2)));
    }

    #[test]
    fn options_survive_clone_but_not_template_copy() {
        let options = MessageGroupOptions {
            warn_on_overflow: false,
        };
        let group = SimpleMessageGroup::new("order-42", &clock()).with_options(options);
        group.add(MessageBuilder::with_payload(()).sequence(1, 1).build_shared());

        assert_that!(*group.clone().options(), eq(options));
        assert_that!(
            *SimpleMessageGroup::from_template(&group).options(),
            eq(MessageGroupOptions::default())
        );
    }

    #[test]
    fn clone_is_independent() {
        let group = SimpleMessageGroup::new("order-42", &clock());
        group.add(sequenced(1, 2));

        let copy = group.clone();
        copy.add(sequenced(2, 2));

        assert_that!(group.size(), eq(1));
        assert_that!(copy.size(), eq(2));
    }
}
