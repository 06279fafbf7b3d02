//! The `Message` trait, the size cache, and the shared field plumbing.
//!
//! Encoding is two-pass. The size pass walks the tree once, bottom-up, and
//! records the length of every nested message in a [`SizeCache`], in the
//! order the write pass emits them. The write pass reads each length prefix
//! back from the cache, so no subtree is ever measured twice.

// Encoded sizes are bounded by addressable memory.
#![allow(clippy::arithmetic_side_effects)]

use bytes::BufMut;
use prost::encoding::{self, WireType};
use tracing::debug;

use crate::wire::{Field, WireError, take_delimited};
use crate::{CodecConfig, Error, Result};

/// Per-call decode state. Never shared between calls.
#[derive(Debug, Clone)]
pub struct DecodeContext {
    config: CodecConfig,
    trigger_depth: usize,
}

impl DecodeContext {
    /// Fresh context for one top-level decode.
    #[must_use]
    pub const fn new(config: CodecConfig) -> Self {
        Self {
            config,
            trigger_depth: 0,
        }
    }

    /// Limits in force.
    #[must_use]
    pub const fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Current trigger nesting (0 outside any trigger).
    #[must_use]
    pub const fn trigger_depth(&self) -> usize {
        self.trigger_depth
    }

    pub(crate) fn enter_trigger(&mut self) -> Result<()> {
        let limit = self.config.max_trigger_depth;
        if self.trigger_depth >= limit {
            debug!(limit, "trigger nesting limit exceeded");
            return Err(Error::RecursionLimitExceeded { limit });
        }
        self.trigger_depth = self.trigger_depth.saturating_add(1);
        Ok(())
    }

    pub(crate) const fn exit_trigger(&mut self) {
        self.trigger_depth = self.trigger_depth.saturating_sub(1);
    }
}

impl Default for DecodeContext {
    fn default() -> Self {
        Self::new(CodecConfig::default())
    }
}

/// Nested-message lengths recorded by the size pass, consumed by the write pass.
///
/// Slots are reserved in pre-order (a parent's slot before its children's),
/// which is exactly the order the write pass needs the length prefixes in.
#[derive(Debug, Clone, Default)]
pub struct SizeCache {
    sizes: Vec<usize>,
    cursor: usize,
    trigger_depth: usize,
    deepest_trigger: usize,
}

impl SizeCache {
    /// Empty cache.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            sizes: Vec::new(),
            cursor: 0,
            trigger_depth: 0,
            deepest_trigger: 0,
        }
    }

    /// Number of nested lengths recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    /// True when no nested length was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// Deepest trigger chain seen by the size pass.
    #[must_use]
    pub const fn deepest_trigger(&self) -> usize {
        self.deepest_trigger
    }

    fn reserve(&mut self) -> usize {
        self.sizes.push(0);
        self.sizes.len() - 1
    }

    fn record(&mut self, slot: usize, len: usize) {
        if let Some(entry) = self.sizes.get_mut(slot) {
            *entry = len;
        }
    }

    fn next_len(&mut self) -> usize {
        let len = self.sizes.get(self.cursor).copied().unwrap_or_default();
        self.cursor += 1;
        len
    }

    pub(crate) fn enter_trigger(&mut self) {
        self.trigger_depth += 1;
        self.deepest_trigger = self.deepest_trigger.max(self.trigger_depth);
    }

    pub(crate) const fn exit_trigger(&mut self) {
        self.trigger_depth = self.trigger_depth.saturating_sub(1);
    }
}

/// A schema message with a fixed field-number table.
pub trait Message: Default {
    /// Short name used in error context.
    const NAME: &'static str;

    /// Package-qualified name used in type URLs.
    const FULL_NAME: &'static str;

    /// Size pass: exact encoded length of `self`, recording the length of
    /// every nested message in `sizes`.
    fn size(&self, sizes: &mut SizeCache) -> usize;

    /// Write pass: every present field, then the retained unknown fields.
    ///
    /// `sizes` must come from [`Message::size`] on the same value, and the
    /// buffer must have room for the length it returned.
    fn write<B: BufMut>(&self, sizes: &mut SizeCache, buf: &mut B);

    /// Merge all fields remaining in `buf` into `self`.
    ///
    /// # Errors
    /// Malformed input or recursion limit.
    fn merge(&mut self, buf: &mut &[u8], ctx: &mut DecodeContext) -> Result<()>;

    /// Exact encoded size in bytes.
    fn encoded_len(&self) -> usize {
        self.size(&mut SizeCache::new())
    }

    /// Encode into a caller-supplied buffer with default limits.
    ///
    /// # Errors
    /// See [`Message::encode_with`].
    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        self.encode_with(buf, &CodecConfig::default())
    }

    /// Encode into a caller-supplied buffer, refusing output that a decoder
    /// with the same limits would reject.
    ///
    /// # Errors
    /// - [`Error::RecursionLimitExceeded`] when a trigger chain is deeper
    ///   than `max_trigger_depth`
    /// - [`Error::InsufficientCapacity`] when the buffer is too small
    ///
    /// Nothing is written on error.
    fn encode_with<B: BufMut>(&self, buf: &mut B, config: &CodecConfig) -> Result<()> {
        let mut sizes = SizeCache::new();
        let required = self.size(&mut sizes);
        check_depth(&sizes, config)?;
        let remaining = buf.remaining_mut();
        if required > remaining {
            return Err(Error::InsufficientCapacity {
                required,
                remaining,
            });
        }
        self.write(&mut sizes, buf);
        Ok(())
    }

    /// Encode into a new vector sized exactly by the size pass.
    ///
    /// Does not check limits: a value nested deeper than the decoder's
    /// `max_trigger_depth` still encodes. Use [`Message::encode_with`] for
    /// output that must decode again.
    fn encode_to_vec(&self) -> Vec<u8> {
        let mut sizes = SizeCache::new();
        let len = self.size(&mut sizes);
        let mut buf = Vec::with_capacity(len);
        self.write(&mut sizes, &mut buf);
        debug_assert_eq!(buf.len(), len, "{} size pass disagrees with write", Self::NAME);
        buf
    }

    /// Encode with a varint byte-length prefix. Limits are not checked.
    fn encode_length_delimited_to_vec(&self) -> Vec<u8> {
        let mut sizes = SizeCache::new();
        let len = self.size(&mut sizes);
        let mut buf = Vec::with_capacity(prost::length_delimiter_len(len) + len);
        encoding::encode_varint(len as u64, &mut buf);
        self.write(&mut sizes, &mut buf);
        buf
    }

    /// Decode with default limits.
    ///
    /// # Errors
    /// See [`Message::decode_with`].
    fn decode(bytes: &[u8]) -> Result<Self> {
        Self::decode_with(bytes, &CodecConfig::default())
    }

    /// Decode the whole of `bytes`.
    ///
    /// # Errors
    /// - [`Error::MalformedInput`] for bad framing, bad UTF-8, or oversize input
    /// - [`Error::RecursionLimitExceeded`] for over-nested triggers
    ///
    /// [`Error::TypeMismatch`] is never returned here; it comes from dispatch.
    fn decode_with(bytes: &[u8], config: &CodecConfig) -> Result<Self> {
        check_size(bytes.len(), config)?;
        let mut ctx = DecodeContext::new(*config);
        let mut buf = bytes;
        decode_message(&mut buf, &mut ctx)
    }

    /// Decode a message written by [`Message::encode_length_delimited_to_vec`].
    ///
    /// The prefix must cover the rest of `bytes` exactly, so a truncated
    /// buffer is always rejected.
    ///
    /// # Errors
    /// As [`Message::decode_with`], plus trailing bytes after the record.
    fn decode_length_delimited(bytes: &[u8]) -> Result<Self> {
        Self::decode_length_delimited_with(bytes, &CodecConfig::default())
    }

    /// [`Message::decode_length_delimited`] with explicit limits.
    ///
    /// # Errors
    /// As [`Message::decode_length_delimited`].
    fn decode_length_delimited_with(bytes: &[u8], config: &CodecConfig) -> Result<Self> {
        let mut outer = bytes;
        let mut record = take_delimited(Self::NAME, &mut outer)?;
        check_size(record.len(), config)?;
        if !outer.is_empty() {
            return Err(WireError::TrailingBytes {
                remaining: outer.len(),
            }
            .into());
        }
        let mut ctx = DecodeContext::new(*config);
        decode_message(&mut record, &mut ctx)
    }
}

pub(crate) fn check_size(size: usize, config: &CodecConfig) -> Result<()> {
    if size > config.max_message_size {
        return Err(WireError::message_too_large(size, config.max_message_size).into());
    }
    Ok(())
}

pub(crate) fn check_depth(sizes: &SizeCache, config: &CodecConfig) -> Result<()> {
    let limit = config.max_trigger_depth;
    if sizes.deepest_trigger() > limit {
        debug!(limit, depth = sizes.deepest_trigger(), "refusing to encode over-nested trigger");
        return Err(Error::RecursionLimitExceeded { limit });
    }
    Ok(())
}

/// Decode a fresh message from the rest of `buf`.
pub(crate) fn decode_message<M: Message>(buf: &mut &[u8], ctx: &mut DecodeContext) -> Result<M> {
    let mut message = M::default();
    message.merge(buf, ctx)?;
    Ok(message)
}

/// Merge a length-delimited child into an optional slot. A repeated
/// occurrence merges into the message already there.
pub(crate) fn merge_optional<'a, M: Message>(
    field: &Field<'a>,
    slot: &mut Option<M>,
    buf: &mut &'a [u8],
    ctx: &mut DecodeContext,
) -> Result<()> {
    let mut nested = field.take_nested(buf)?;
    slot.get_or_insert_with(M::default).merge(&mut nested, ctx)
}

/// Decode a length-delimited child and append it.
pub(crate) fn merge_repeated<'a, M: Message>(
    field: &Field<'a>,
    values: &mut Vec<M>,
    buf: &mut &'a [u8],
    ctx: &mut DecodeContext,
) -> Result<()> {
    let mut nested = field.take_nested(buf)?;
    values.push(decode_message(&mut nested, ctx)?);
    Ok(())
}

/// Key plus length prefix plus a body of `len` bytes.
pub(crate) fn len_delimited_len(tag: u32, len: usize) -> usize {
    encoding::key_len(tag) + encoding::encoded_len_varint(len as u64) + len
}

pub(crate) fn put_len_delimited_header<B: BufMut>(tag: u32, len: usize, buf: &mut B) {
    encoding::encode_key(tag, WireType::LengthDelimited, buf);
    encoding::encode_varint(len as u64, buf);
}

/// Size a nested message, caching its length for [`write_message`].
pub(crate) fn message_size<M: Message>(tag: u32, message: &M, sizes: &mut SizeCache) -> usize {
    let slot = sizes.reserve();
    let len = message.size(sizes);
    sizes.record(slot, len);
    len_delimited_len(tag, len)
}

pub(crate) fn write_message<M: Message, B: BufMut>(
    tag: u32,
    message: &M,
    sizes: &mut SizeCache,
    buf: &mut B,
) {
    let len = sizes.next_len();
    put_len_delimited_header(tag, len, buf);
    message.write(sizes, buf);
}

pub(crate) fn opt_message_size<M: Message>(
    tag: u32,
    message: Option<&M>,
    sizes: &mut SizeCache,
) -> usize {
    message.map_or(0, |m| message_size(tag, m, sizes))
}

pub(crate) fn write_opt_message<M: Message, B: BufMut>(
    tag: u32,
    message: Option<&M>,
    sizes: &mut SizeCache,
    buf: &mut B,
) {
    if let Some(m) = message {
        write_message(tag, m, sizes, buf);
    }
}

/// Reserve a slot for a body measured by the caller (an `Any` value).
pub(crate) fn body_size(sizes: &mut SizeCache, measure: impl FnOnce(&mut SizeCache) -> usize) -> usize {
    let slot = sizes.reserve();
    let len = measure(sizes);
    sizes.record(slot, len);
    len
}

/// Length recorded by [`body_size`].
pub(crate) fn cached_body_len(sizes: &mut SizeCache) -> usize {
    sizes.next_len()
}

pub(crate) fn int64_size(tag: u32, value: Option<i64>) -> usize {
    value.map_or(0, |v| encoding::int64::encoded_len(tag, &v))
}

pub(crate) fn write_int64<B: BufMut>(tag: u32, value: Option<i64>, buf: &mut B) {
    if let Some(v) = value {
        encoding::int64::encode(tag, &v, buf);
    }
}

pub(crate) fn int32_size(tag: u32, value: Option<i32>) -> usize {
    value.map_or(0, |v| encoding::int32::encoded_len(tag, &v))
}

pub(crate) fn write_int32<B: BufMut>(tag: u32, value: Option<i32>, buf: &mut B) {
    if let Some(v) = value {
        encoding::int32::encode(tag, &v, buf);
    }
}

pub(crate) fn string_size(tag: u32, value: Option<&String>) -> usize {
    value.map_or(0, |v| encoding::string::encoded_len(tag, v))
}

pub(crate) fn write_string<B: BufMut>(tag: u32, value: Option<&String>, buf: &mut B) {
    if let Some(v) = value {
        encoding::string::encode(tag, v, buf);
    }
}

/// Enums have implicit presence: the zero value is not written.
pub(crate) fn enum_size(tag: u32, value: i32) -> usize {
    if value == 0 {
        0
    } else {
        encoding::int32::encoded_len(tag, &value)
    }
}

pub(crate) fn write_enum<B: BufMut>(tag: u32, value: i32, buf: &mut B) {
    if value != 0 {
        encoding::int32::encode(tag, &value, buf);
    }
}
