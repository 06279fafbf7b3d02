//! Generic-object escape hatch: opaque bytes tagged with a strategy index.
//!
//! The codec never interprets `SerializedObject::object`. Turning those
//! bytes back into host objects is the job of a caller-supplied
//! [`StrategyRegistry`].

// Encoded sizes are bounded by addressable memory.
#![allow(clippy::arithmetic_side_effects)]

use bytes::{BufMut, Bytes};
use prost::encoding;

use crate::codec::{
    DecodeContext, Message, SizeCache, int32_size, merge_repeated, message_size, write_int32,
    write_message,
};
use crate::wire::next_field;
use crate::{Result, UnknownFields};

/// A codec for one family of host objects.
pub trait ObjectStrategy {
    /// Host object type this strategy handles.
    type Object;
    /// Strategy-specific failure.
    type Error: std::error::Error;

    /// Rebuild an object from its serialized bytes.
    ///
    /// # Errors
    /// Bytes this strategy cannot read.
    fn unmarshal(&self, bytes: &[u8]) -> std::result::Result<Self::Object, Self::Error>;

    /// Serialize an object.
    ///
    /// # Errors
    /// Objects this strategy cannot write.
    fn marshal(&self, object: &Self::Object) -> std::result::Result<Vec<u8>, Self::Error>;
}

/// Out-of-band table mapping strategy indices to strategies.
pub trait StrategyRegistry {
    /// Strategy type held by the table.
    type Strategy: ObjectStrategy;

    /// Strategy registered at `index`.
    fn resolve(&self, index: i32) -> Option<&Self::Strategy>;

    /// First strategy willing to serialize `object`, with its index.
    fn select(
        &self,
        object: &<Self::Strategy as ObjectStrategy>::Object,
    ) -> Option<(i32, &Self::Strategy)>;
}

/// Failure threading an object through a [`StrategyRegistry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyError<E> {
    /// No strategy registered at this index.
    UnknownStrategy(i32),
    /// The record carries no strategy index.
    MissingStrategyIndex,
    /// No registered strategy accepts the object.
    NoMatchingStrategy,
    /// The selected strategy failed.
    Strategy {
        /// Index of the failing strategy
        index: i32,
        /// Strategy error
        reason: E,
    },
}

impl<E: std::fmt::Display> std::fmt::Display for StrategyError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownStrategy(index) => write!(f, "no strategy registered at index {index}"),
            Self::MissingStrategyIndex => write!(f, "serialized object has no strategy index"),
            Self::NoMatchingStrategy => write!(f, "no registered strategy accepts the object"),
            Self::Strategy { index, reason } => write!(f, "strategy {index} failed: {reason}"),
        }
    }
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for StrategyError<E> {}

type ObjectOf<R> = <<R as StrategyRegistry>::Strategy as ObjectStrategy>::Object;
type StrategyErrorOf<R> = StrategyError<<<R as StrategyRegistry>::Strategy as ObjectStrategy>::Error>;

/// Host object snapshot the schema cannot model structurally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SerializedObject {
    /// Index into the caller's strategy table.
    pub strategy_index: Option<i32>,
    /// Strategy-encoded bytes.
    pub object: Option<Bytes>,
    /// Fields from newer schema versions.
    pub unknown_fields: UnknownFields,
}

impl SerializedObject {
    /// Record from a strategy index and raw bytes.
    #[must_use]
    pub fn new(strategy_index: i32, object: impl Into<Bytes>) -> Self {
        Self {
            strategy_index: Some(strategy_index),
            object: Some(object.into()),
            unknown_fields: UnknownFields::new(),
        }
    }

    /// Serialize `object` with the first strategy that accepts it.
    ///
    /// # Errors
    /// No accepting strategy, or the strategy itself failed.
    pub fn marshal<R: StrategyRegistry>(
        registry: &R,
        object: &ObjectOf<R>,
    ) -> std::result::Result<Self, StrategyErrorOf<R>> {
        let (index, strategy) = registry
            .select(object)
            .ok_or(StrategyError::NoMatchingStrategy)?;
        let bytes = strategy
            .marshal(object)
            .map_err(|reason| StrategyError::Strategy { index, reason })?;
        Ok(Self::new(index, bytes))
    }

    /// Rebuild the host object through the strategy named by
    /// `strategy_index`. Absent bytes are handed over as an empty slice.
    ///
    /// # Errors
    /// Missing or unregistered index, or the strategy itself failed.
    pub fn unmarshal<R: StrategyRegistry>(
        &self,
        registry: &R,
    ) -> std::result::Result<ObjectOf<R>, StrategyErrorOf<R>> {
        let index = self
            .strategy_index
            .ok_or(StrategyError::MissingStrategyIndex)?;
        let strategy = registry
            .resolve(index)
            .ok_or(StrategyError::UnknownStrategy(index))?;
        strategy
            .unmarshal(self.object.as_deref().unwrap_or_default())
            .map_err(|reason| StrategyError::Strategy { index, reason })
    }
}

impl Message for SerializedObject {
    const NAME: &'static str = "SerializedObject";
    const FULL_NAME: &'static str = full_name!("SerializedObject");

    fn size(&self, _sizes: &mut SizeCache) -> usize {
        int32_size(1, self.strategy_index)
            + self
                .object
                .as_ref()
                .map_or(0, |object| encoding::bytes::encoded_len(2, object))
            + self.unknown_fields.encoded_len()
    }

    fn write<B: BufMut>(&self, _sizes: &mut SizeCache, buf: &mut B) {
        write_int32(1, self.strategy_index, buf);
        if let Some(object) = &self.object {
            encoding::bytes::encode(2, object, buf);
        }
        self.unknown_fields.encode(buf);
    }

    fn merge(&mut self, buf: &mut &[u8], _ctx: &mut DecodeContext) -> Result<()> {
        while let Some(field) = next_field(Self::NAME, buf)? {
            match field.tag() {
                1 => field.merge_int32(&mut self.strategy_index, buf)?,
                2 => field.merge_bytes(&mut self.object, buf)?,
                _ => field.retain(&mut self.unknown_fields, buf)?,
            }
        }
        Ok(())
    }
}

/// Fact handles paired with serialized fact snapshots.
///
/// Producers keep `handle_id` and `object` aligned index for index, but
/// decoding does not enforce it; see [`Tuple::is_aligned`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tuple {
    /// Fact handle ids. Always written packed.
    pub handle_id: Vec<i64>,
    /// Serialized facts.
    pub object: Vec<SerializedObject>,
    /// Fields from newer schema versions.
    pub unknown_fields: UnknownFields,
}

impl Tuple {
    /// Empty tuple.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an aligned (handle, object) pair.
    #[must_use]
    pub fn with_entry(mut self, handle_id: i64, object: SerializedObject) -> Self {
        self.handle_id.push(handle_id);
        self.object.push(object);
        self
    }

    /// True when both sequences have the same length.
    #[must_use]
    pub fn is_aligned(&self) -> bool {
        self.handle_id.len() == self.object.len()
    }

    /// Aligned pairs; stops at the shorter sequence.
    pub fn entries(&self) -> impl Iterator<Item = (i64, &SerializedObject)> {
        self.handle_id.iter().copied().zip(&self.object)
    }
}

impl Message for Tuple {
    const NAME: &'static str = "Tuple";
    const FULL_NAME: &'static str = full_name!("Tuple");

    fn size(&self, sizes: &mut SizeCache) -> usize {
        let objects: usize = self
            .object
            .iter()
            .map(|object| message_size(2, object, sizes))
            .sum();
        encoding::int64::encoded_len_packed(1, &self.handle_id)
            + objects
            + self.unknown_fields.encoded_len()
    }

    fn write<B: BufMut>(&self, sizes: &mut SizeCache, buf: &mut B) {
        encoding::int64::encode_packed(1, &self.handle_id, buf);
        for object in &self.object {
            write_message(2, object, sizes, buf);
        }
        self.unknown_fields.encode(buf);
    }

    fn merge(&mut self, buf: &mut &[u8], ctx: &mut DecodeContext) -> Result<()> {
        while let Some(field) = next_field(Self::NAME, buf)? {
            match field.tag() {
                1 => field.merge_repeated_int64(&mut self.handle_id, buf)?,
                2 => merge_repeated(&field, &mut self.object, buf, ctx)?,
                _ => field.retain(&mut self.unknown_fields, buf)?,
            }
        }
        Ok(())
    }
}
