//! `Any`-style payloads: a type URL plus the bytes of one schema message.
//!
//! # Dispatch rules
//! - The type URL alone decides how `value` is read; the discriminator of the
//!   enclosing `Timer`/`Trigger` is checked later, at dispatch
//! - A recognized message name is decoded eagerly into its typed body
//! - Any other name is carried as opaque bytes and re-emitted unchanged

// Encoded sizes are bounded by addressable memory.
#![allow(clippy::arithmetic_side_effects)]

use bytes::{BufMut, Bytes};
use prost::encoding;

use crate::codec::{
    DecodeContext, Message, SizeCache, body_size, cached_body_len, decode_message,
    len_delimited_len, put_len_delimited_header,
};
use crate::wire::next_field;
use crate::{
    CodecConfig, CompositeMaxDurationTrigger, CronTrigger, ExpireTimerData, IntervalTrigger,
    PointInTimeTrigger, ProcessTimer, Result, TimerNodeTimerData, UnknownFields,
};

/// Host prefix used when packing payloads.
pub const TYPE_URL_PREFIX: &str = "type.googleapis.com/";

/// Schema package all timer messages live in.
pub const PACKAGE: &str = "org.drools.serialization.protobuf";

/// Message name part of a type URL (everything after the last `/`).
#[must_use]
pub fn message_name(type_url: &str) -> &str {
    type_url
        .rsplit_once('/')
        .map_or(type_url, |(_, name)| name)
}

/// Decoded content of a [`Payload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadBody {
    /// `ExpireTimerData`
    ExpireTimer(ExpireTimerData),
    /// `TimerNodeTimerData`
    TimerNodeTimer(TimerNodeTimerData),
    /// `ProcessTimer`
    ProcessTimer(Box<ProcessTimer>),
    /// `CronTrigger`
    CronTrigger(CronTrigger),
    /// `IntervalTrigger`
    IntervalTrigger(IntervalTrigger),
    /// `PointInTimeTrigger`
    PointInTimeTrigger(PointInTimeTrigger),
    /// `CompositeMaxDurationTrigger`
    CompositeMaxDurationTrigger(Box<CompositeMaxDurationTrigger>),
    /// Message type this schema does not know; bytes kept verbatim.
    Opaque(Bytes),
}

impl Default for PayloadBody {
    fn default() -> Self {
        Self::Opaque(Bytes::new())
    }
}

impl PayloadBody {
    /// Package-qualified name of the typed body, `None` when opaque.
    #[must_use]
    pub const fn full_name(&self) -> Option<&'static str> {
        match self {
            Self::ExpireTimer(_) => Some(ExpireTimerData::FULL_NAME),
            Self::TimerNodeTimer(_) => Some(TimerNodeTimerData::FULL_NAME),
            Self::ProcessTimer(_) => Some(ProcessTimer::FULL_NAME),
            Self::CronTrigger(_) => Some(CronTrigger::FULL_NAME),
            Self::IntervalTrigger(_) => Some(IntervalTrigger::FULL_NAME),
            Self::PointInTimeTrigger(_) => Some(PointInTimeTrigger::FULL_NAME),
            Self::CompositeMaxDurationTrigger(_) => Some(CompositeMaxDurationTrigger::FULL_NAME),
            Self::Opaque(_) => None,
        }
    }

    fn size(&self, sizes: &mut SizeCache) -> usize {
        match self {
            Self::ExpireTimer(m) => m.size(sizes),
            Self::TimerNodeTimer(m) => m.size(sizes),
            Self::ProcessTimer(m) => m.size(sizes),
            Self::CronTrigger(m) => m.size(sizes),
            Self::IntervalTrigger(m) => m.size(sizes),
            Self::PointInTimeTrigger(m) => m.size(sizes),
            Self::CompositeMaxDurationTrigger(m) => m.size(sizes),
            Self::Opaque(bytes) => bytes.len(),
        }
    }

    fn write<B: BufMut>(&self, sizes: &mut SizeCache, buf: &mut B) {
        match self {
            Self::ExpireTimer(m) => m.write(sizes, buf),
            Self::TimerNodeTimer(m) => m.write(sizes, buf),
            Self::ProcessTimer(m) => m.write(sizes, buf),
            Self::CronTrigger(m) => m.write(sizes, buf),
            Self::IntervalTrigger(m) => m.write(sizes, buf),
            Self::PointInTimeTrigger(m) => m.write(sizes, buf),
            Self::CompositeMaxDurationTrigger(m) => m.write(sizes, buf),
            Self::Opaque(bytes) => buf.put_slice(bytes),
        }
    }

    /// Wire bytes of the body, as they would appear in `Any.value`.
    fn to_value(&self) -> Vec<u8> {
        let mut sizes = SizeCache::new();
        let len = self.size(&mut sizes);
        let mut value = Vec::with_capacity(len);
        self.write(&mut sizes, &mut value);
        value
    }

    fn decode(type_url: &str, value: &[u8], ctx: &mut DecodeContext) -> Result<Self> {
        let name = message_name(type_url);
        let mut value = value;
        let body = if name == ExpireTimerData::FULL_NAME {
            Self::ExpireTimer(decode_message(&mut value, ctx)?)
        } else if name == TimerNodeTimerData::FULL_NAME {
            Self::TimerNodeTimer(decode_message(&mut value, ctx)?)
        } else if name == ProcessTimer::FULL_NAME {
            Self::ProcessTimer(Box::new(decode_message(&mut value, ctx)?))
        } else if name == CronTrigger::FULL_NAME {
            Self::CronTrigger(decode_message(&mut value, ctx)?)
        } else if name == IntervalTrigger::FULL_NAME {
            Self::IntervalTrigger(decode_message(&mut value, ctx)?)
        } else if name == PointInTimeTrigger::FULL_NAME {
            Self::PointInTimeTrigger(decode_message(&mut value, ctx)?)
        } else if name == CompositeMaxDurationTrigger::FULL_NAME {
            Self::CompositeMaxDurationTrigger(Box::new(decode_message(&mut value, ctx)?))
        } else {
            Self::Opaque(Bytes::copy_from_slice(value))
        };
        Ok(body)
    }
}

/// A schema message that can travel inside a [`Payload`].
pub trait Pack: Message {
    /// Wrap `self` as a payload body.
    fn into_body(self) -> PayloadBody;
}

impl Pack for ExpireTimerData {
    fn into_body(self) -> PayloadBody {
        PayloadBody::ExpireTimer(self)
    }
}

impl Pack for TimerNodeTimerData {
    fn into_body(self) -> PayloadBody {
        PayloadBody::TimerNodeTimer(self)
    }
}

impl Pack for ProcessTimer {
    fn into_body(self) -> PayloadBody {
        PayloadBody::ProcessTimer(Box::new(self))
    }
}

impl Pack for CronTrigger {
    fn into_body(self) -> PayloadBody {
        PayloadBody::CronTrigger(self)
    }
}

impl Pack for IntervalTrigger {
    fn into_body(self) -> PayloadBody {
        PayloadBody::IntervalTrigger(self)
    }
}

impl Pack for PointInTimeTrigger {
    fn into_body(self) -> PayloadBody {
        PayloadBody::PointInTimeTrigger(self)
    }
}

impl Pack for CompositeMaxDurationTrigger {
    fn into_body(self) -> PayloadBody {
        PayloadBody::CompositeMaxDurationTrigger(Box::new(self))
    }
}

/// `google.protobuf.Any` carrying one timer or trigger record.
///
/// Fields are private so the type URL and the body can never disagree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    type_url: String,
    body: PayloadBody,
    unknown_fields: UnknownFields,
}

impl Payload {
    /// Pack a schema message under its canonical type URL.
    pub fn pack<M: Pack>(message: M) -> Self {
        Self {
            type_url: format!("{TYPE_URL_PREFIX}{}", M::FULL_NAME),
            body: message.into_body(),
            unknown_fields: UnknownFields::new(),
        }
    }

    /// Build from a type URL and raw value bytes, decoding them exactly as
    /// the wire path would.
    ///
    /// # Errors
    /// Malformed `value` for a recognized type, or recursion limit.
    pub fn from_parts(type_url: impl Into<String>, value: &[u8], config: &CodecConfig) -> Result<Self> {
        let type_url = type_url.into();
        let mut ctx = DecodeContext::new(*config);
        let body = PayloadBody::decode(&type_url, value, &mut ctx)?;
        Ok(Self {
            type_url,
            body,
            unknown_fields: UnknownFields::new(),
        })
    }

    /// Type URL as carried on the wire.
    #[must_use]
    pub fn type_url(&self) -> &str {
        &self.type_url
    }

    /// Decoded body.
    #[must_use]
    pub const fn body(&self) -> &PayloadBody {
        &self.body
    }

    /// Take the decoded body.
    #[must_use]
    pub fn into_body(self) -> PayloadBody {
        self.body
    }

    /// Unknown fields of the `Any` wrapper itself.
    #[must_use]
    pub const fn unknown_fields(&self) -> &UnknownFields {
        &self.unknown_fields
    }

    /// True when the body was decoded as a schema message.
    #[must_use]
    pub const fn is_recognized(&self) -> bool {
        self.body.full_name().is_some()
    }
}

impl Message for Payload {
    const NAME: &'static str = "Any";
    const FULL_NAME: &'static str = "google.protobuf.Any";

    fn size(&self, sizes: &mut SizeCache) -> usize {
        let type_url = if self.type_url.is_empty() {
            0
        } else {
            encoding::string::encoded_len(1, &self.type_url)
        };
        let body = match body_size(sizes, |sizes| self.body.size(sizes)) {
            0 => 0,
            len => len_delimited_len(2, len),
        };
        type_url + body + self.unknown_fields.encoded_len()
    }

    fn write<B: BufMut>(&self, sizes: &mut SizeCache, buf: &mut B) {
        if !self.type_url.is_empty() {
            encoding::string::encode(1, &self.type_url, buf);
        }
        let len = cached_body_len(sizes);
        if len > 0 {
            put_len_delimited_header(2, len, buf);
            self.body.write(sizes, buf);
        }
        self.unknown_fields.encode(buf);
    }

    /// The value can arrive before the type URL, so it is decoded only
    /// once the whole wrapper has been read.
    ///
    /// Merging into a payload that already holds a body follows message
    /// merge rules: a type URL or value present on the wire replaces the
    /// current one, an absent one is kept. The body is decoded once, from
    /// whichever value is current, under whichever type URL is current.
    fn merge(&mut self, buf: &mut &[u8], ctx: &mut DecodeContext) -> Result<()> {
        let mut type_url = None;
        let mut value = None;
        while let Some(field) = next_field(Self::NAME, buf)? {
            match field.tag() {
                1 => field.merge_string(&mut type_url, buf)?,
                2 => value = Some(field.take_nested(buf)?),
                _ => field.retain(&mut self.unknown_fields, buf)?,
            }
        }
        if type_url.is_none() && value.is_none() {
            return Ok(());
        }
        if let Some(type_url) = type_url {
            self.type_url = type_url;
        }
        self.body = match value {
            Some(value) => PayloadBody::decode(&self.type_url, value, ctx)?,
            None => PayloadBody::decode(&self.type_url, &self.body.to_value(), ctx)?,
        };
        Ok(())
    }
}
