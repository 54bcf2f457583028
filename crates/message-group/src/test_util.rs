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

use crate::message::{Message, MessageBuilder};

/// A fresh message at position `sequence_number` of a sequence of `sequence_size` messages.
pub fn sequenced(sequence_number: u32, sequence_size: u32) -> Arc<Message<()>> {
    MessageBuilder::with_payload(())
        .sequence(sequence_number, sequence_size)
        .build_shared()
}

/// A fresh message without sequence headers.
pub fn unsequenced() -> Arc<Message<()>> {
    MessageBuilder::with_payload(()).build_shared()
}
