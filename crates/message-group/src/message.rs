// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The message envelope collected by message groups.

use std::sync::Arc;

use bytestring::ByteString;
use ulid::Ulid;

/// Unique identity of a [`Message`]. Group membership is decided by this id, never by payload
/// equality.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display, derive_more::From,
)]
pub struct MessageId(Ulid);

impl MessageId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

/// Key shared by all messages that belong to the same group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display)]
pub struct CorrelationKey(ByteString);

impl CorrelationKey {
    pub fn new(key: impl Into<ByteString>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for CorrelationKey {
    fn from(value: &'static str) -> Self {
        Self(ByteString::from_static(value))
    }
}

impl From<String> for CorrelationKey {
    fn from(value: String) -> Self {
        Self(value.into())
    }
}

impl From<ByteString> for CorrelationKey {
    fn from(value: ByteString) -> Self {
        Self(value)
    }
}

/// Headers of a [`Message`].
///
/// `sequence_number` and `sequence_size` describe the position of a message within a split
/// sequence. A value of `0` carries the same meaning as an absent header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeaders {
    id: MessageId,
    correlation_id: Option<CorrelationKey>,
    sequence_number: Option<u32>,
    sequence_size: Option<u32>,
}

impl MessageHeaders {
    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn correlation_id(&self) -> Option<&CorrelationKey> {
        self.correlation_id.as_ref()
    }

    /// Position within the originating sequence, `None` if the message is not part of a counted
    /// sequence.
    pub fn sequence_number(&self) -> Option<u32> {
        self.sequence_number.filter(|n| *n > 0)
    }

    /// Declared total number of messages in the sequence, `0` if unknown.
    pub fn sequence_size(&self) -> u32 {
        self.sequence_size.unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message<P> {
    headers: MessageHeaders,
    payload: P,
}

impl<P> Message<P> {
    pub fn headers(&self) -> &MessageHeaders {
        &self.headers
    }

    pub fn id(&self) -> MessageId {
        self.headers.id
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn into_payload(self) -> P {
        self.payload
    }
}

/// Builds [`Message`]s. Every built message gets a fresh [`MessageId`].
#[derive(Debug, Clone)]
pub struct MessageBuilder<P> {
    payload: P,
    correlation_id: Option<CorrelationKey>,
    sequence_number: Option<u32>,
    sequence_size: Option<u32>,
}

impl<P> MessageBuilder<P> {
    pub fn with_payload(payload: P) -> Self {
        Self {
            payload,
            correlation_id: None,
            sequence_number: None,
            sequence_size: None,
        }
    }

    /// Copies the correlation and sequence headers of `template`, but not its id.
    pub fn from_message(template: &Message<P>) -> Self
    where
        P: Clone,
    {
        Self {
            payload: template.payload.clone(),
            correlation_id: template.headers.correlation_id.clone(),
            sequence_number: template.headers.sequence_number,
            sequence_size: template.headers.sequence_size,
        }
    }

    pub fn correlation_id(mut self, key: impl Into<CorrelationKey>) -> Self {
        self.correlation_id = Some(key.into());
        self
    }

    pub fn sequence_number(mut self, sequence_number: u32) -> Self {
        self.sequence_number = Some(sequence_number);
        self
    }

    pub fn sequence_size(mut self, sequence_size: u32) -> Self {
        self.sequence_size = Some(sequence_size);
        self
    }

    /// Shorthand for setting both `sequence_number` and `sequence_size`.
    pub fn sequence(self, sequence_number: u32, sequence_size: u32) -> Self {
        self.sequence_number(sequence_number)
            .sequence_size(sequence_size)
    }

    pub fn build(self) -> Message<P> {
        Message {
            headers: MessageHeaders {
                id: MessageId::new(),
                correlation_id: self.correlation_id,
                sequence_number: self.sequence_number,
                sequence_size: self.sequence_size,
            },
            payload: self.payload,
        }
    }

    pub fn build_shared(self) -> Arc<Message<P>> {
        Arc::new(self.build())
    }
}
