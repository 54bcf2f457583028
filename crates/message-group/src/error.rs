// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use crate::message::MessageId;

/// Reason why a message was not added to a group.
///
/// Rejections are an expected outcome of redelivery and inconsistent producers, not a failure of
/// the group.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddRejected {
    #[error("message {id} is already a member of the group")]
    AlreadyMember { id: MessageId },
    #[error(
        "message with sequence number {sequence_number} declares sequence size {actual}, but the group has sequence size {expected}"
    )]
    SequenceSizeMismatch {
        sequence_number: u32,
        expected: u32,
        actual: u32,
    },
    #[error("sequence number {sequence_number} is already taken by another member")]
    DuplicateSequenceNumber { sequence_number: u32 },
}
