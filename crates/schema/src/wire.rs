//! Field-level decoding over `prost::encoding`.
//!
//! Buffers are byte slices advanced in place as fields are consumed, so the
//! exact bytes a field occupied stay addressable afterwards. That is what
//! lets unrecognized fields be kept verbatim.
//!
//! # Invariants
//! - No read reaches past the end of the slice it was given
//! - A nested slice covers exactly the bytes named by its length prefix

use bytes::Bytes;
use prost::DecodeError;
use prost::encoding::{self, WireType};
use thiserror::Error;
use tracing::trace;

use crate::UnknownFields;

/// Result type alias for field-level decoding.
pub type WireResult<T> = std::result::Result<T, WireError>;

/// Malformed wire input.
///
/// Unknown field numbers and unknown enum values are NOT errors; they are
/// preserved by the message types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// Rejected by the protobuf primitives.
    ///
    /// Caused by:
    /// - Truncated or overlong varint
    /// - Field number 0 or wire type 6/7
    /// - Wire type inconsistent with the field's declared type
    /// - Invalid UTF-8 in a string field
    /// - Unbalanced group in an unknown field
    #[error("{message}: {source}")]
    Rejected {
        /// Message being decoded
        message: &'static str,
        /// Primitive decoder error
        source: DecodeError,
    },

    /// Length prefix reaches past the end of the enclosing buffer.
    #[error("{message}: length prefix {length} overruns buffer ({remaining} bytes remaining)")]
    LengthOverrun {
        /// Message being decoded
        message: &'static str,
        /// Declared length
        length: u64,
        /// Bytes actually left
        remaining: usize,
    },

    /// Bytes left over after a complete length-delimited record.
    #[error("{remaining} trailing bytes after length-delimited record")]
    TrailingBytes {
        /// Unread byte count
        remaining: usize,
    },

    /// Input larger than the configured decode limit.
    #[error("message too large: {size} bytes (max {max} bytes)")]
    MessageTooLarge {
        /// Input size in bytes
        size: usize,
        /// Configured maximum
        max: usize,
    },
}

impl WireError {
    /// Wrap a primitive decoder error with the message it occurred in.
    #[must_use]
    pub const fn rejected(message: &'static str, source: DecodeError) -> Self {
        Self::Rejected { message, source }
    }

    /// Create a `MessageTooLarge` error.
    #[must_use]
    pub const fn message_too_large(size: usize, max: usize) -> Self {
        Self::MessageTooLarge { size, max }
    }
}

/// Context for prost's own nesting budget (unknown groups only).
fn primitive_context() -> encoding::DecodeContext {
    encoding::DecodeContext::default()
}

/// One field key, positioned just before its value.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Field<'a> {
    message: &'static str,
    tag: u32,
    wire_type: WireType,
    start: &'a [u8],
}

/// Read the next field key, or `None` once `buf` is exhausted.
pub(crate) fn next_field<'a>(
    message: &'static str,
    buf: &mut &'a [u8],
) -> WireResult<Option<Field<'a>>> {
    if buf.is_empty() {
        return Ok(None);
    }
    let start: &'a [u8] = *buf;
    let (tag, wire_type) =
        encoding::decode_key(buf).map_err(|source| WireError::rejected(message, source))?;
    Ok(Some(Field {
        message,
        tag,
        wire_type,
        start,
    }))
}

/// Split a varint length prefix, and the bytes it covers, off the front of `buf`.
pub(crate) fn take_delimited<'a>(message: &'static str, buf: &mut &'a [u8]) -> WireResult<&'a [u8]> {
    let length =
        encoding::decode_varint(buf).map_err(|source| WireError::rejected(message, source))?;
    let rest: &'a [u8] = *buf;
    let (payload, rest) = usize::try_from(length)
        .ok()
        .and_then(|len| rest.split_at_checked(len))
        .ok_or(WireError::LengthOverrun {
            message,
            length,
            remaining: rest.len(),
        })?;
    *buf = rest;
    Ok(payload)
}

impl<'a> Field<'a> {
    /// Field number.
    pub(crate) const fn tag(&self) -> u32 {
        self.tag
    }

    const fn rejected(&self, source: DecodeError) -> WireError {
        WireError::rejected(self.message, source)
    }

    pub(crate) fn merge_int64(&self, slot: &mut Option<i64>, buf: &mut &[u8]) -> WireResult<()> {
        encoding::int64::merge(
            self.wire_type,
            slot.get_or_insert_default(),
            buf,
            primitive_context(),
        )
        .map_err(|source| self.rejected(source))
    }

    pub(crate) fn merge_int32(&self, slot: &mut Option<i32>, buf: &mut &[u8]) -> WireResult<()> {
        encoding::int32::merge(
            self.wire_type,
            slot.get_or_insert_default(),
            buf,
            primitive_context(),
        )
        .map_err(|source| self.rejected(source))
    }

    /// Enum value; unknown values come back as-is.
    pub(crate) fn read_enum(&self, buf: &mut &[u8]) -> WireResult<i32> {
        let mut value = 0;
        encoding::int32::merge(self.wire_type, &mut value, buf, primitive_context())
            .map_err(|source| self.rejected(source))?;
        Ok(value)
    }

    pub(crate) fn merge_string(&self, slot: &mut Option<String>, buf: &mut &[u8]) -> WireResult<()> {
        encoding::string::merge(
            self.wire_type,
            slot.get_or_insert_default(),
            buf,
            primitive_context(),
        )
        .map_err(|source| self.rejected(source))
    }

    pub(crate) fn merge_bytes(&self, slot: &mut Option<Bytes>, buf: &mut &[u8]) -> WireResult<()> {
        encoding::bytes::merge(
            self.wire_type,
            slot.get_or_insert_default(),
            buf,
            primitive_context(),
        )
        .map_err(|source| self.rejected(source))
    }

    /// Packed and one-tag-per-element forms are both accepted.
    pub(crate) fn merge_repeated_int64(&self, values: &mut Vec<i64>, buf: &mut &[u8]) -> WireResult<()> {
        encoding::int64::merge_repeated(self.wire_type, values, buf, primitive_context())
            .map_err(|source| self.rejected(source))
    }

    pub(crate) fn merge_repeated_string(
        &self,
        values: &mut Vec<String>,
        buf: &mut &[u8],
    ) -> WireResult<()> {
        encoding::string::merge_repeated(self.wire_type, values, buf, primitive_context())
            .map_err(|source| self.rejected(source))
    }

    /// Payload of a length-delimited field.
    pub(crate) fn take_nested(&self, buf: &mut &'a [u8]) -> WireResult<&'a [u8]> {
        encoding::check_wire_type(WireType::LengthDelimited, self.wire_type)
            .map_err(|source| self.rejected(source))?;
        take_delimited(self.message, buf)
    }

    /// Skip the value and keep the complete field, key included, in `unknown`.
    pub(crate) fn retain(&self, unknown: &mut UnknownFields, buf: &mut &'a [u8]) -> WireResult<()> {
        encoding::skip_field(self.wire_type, self.tag, buf, primitive_context())
            .map_err(|source| self.rejected(source))?;
        let consumed = self.start.len().saturating_sub(buf.len());
        let raw = self.start.get(..consumed).unwrap_or_default();
        trace!(
            message_type = self.message,
            field = self.tag,
            bytes = raw.len(),
            "retaining unknown field"
        );
        unknown.push(raw);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]
    #![allow(clippy::indexing_slicing)]

    use super::*;

    fn first_field<'a>(buf: &mut &'a [u8]) -> Field<'a> {
        next_field("Test", buf)
            .expect("key should decode")
            .expect("field should be present")
    }

    fn assert_rejected(error: &WireError, description: &str) {
        assert!(
            matches!(error, WireError::Rejected { message: "Test", .. }),
            "{error}"
        );
        assert!(error.to_string().contains(description), "{error}");
    }

    #[test]
    fn test_empty_buffer_has_no_field() {
        let mut buf: &[u8] = &[];
        assert!(next_field("Test", &mut buf).unwrap().is_none());
    }

    #[test]
    fn test_field_number_zero_rejected() {
        let mut buf: &[u8] = &[0x00, 0x01];
        let error = next_field("Test", &mut buf).unwrap_err();
        assert_rejected(&error, "invalid tag value: 0");
    }

    #[test]
    fn test_invalid_wire_type_rejected() {
        // field 1, wire type 7
        let mut buf: &[u8] = &[0x0F];
        let error = next_field("Test", &mut buf).unwrap_err();
        assert_rejected(&error, "invalid wire type value: 7");
    }

    #[test]
    fn test_wire_type_mismatch() {
        let mut bytes = Vec::new();
        encoding::string::encode(1, &"5".to_string(), &mut bytes);
        let mut buf = bytes.as_slice();
        let field = first_field(&mut buf);
        let error = field.merge_int64(&mut None, &mut buf).unwrap_err();
        assert_rejected(&error, "invalid wire type: LengthDelimited (expected Varint)");
    }

    #[test]
    fn test_length_overrun() {
        // field 2 LEN, length 5, only 2 bytes follow
        let mut buf: &[u8] = &[0x12, 0x05, b'a', b'b'];
        let field = first_field(&mut buf);
        assert_eq!(
            field.take_nested(&mut buf),
            Err(WireError::LengthOverrun {
                message: "Test",
                length: 5,
                remaining: 2,
            })
        );
    }

    #[test]
    fn test_invalid_utf8() {
        let mut buf: &[u8] = &[0x12, 0x02, 0xC3, 0x28];
        let field = first_field(&mut buf);
        let error = field.merge_string(&mut None, &mut buf).unwrap_err();
        assert_rejected(&error, "not UTF-8");
    }

    #[test]
    fn test_nested_slice_is_confined() {
        // field 3 LEN of 2 bytes, then field 1 varint outside it
        let mut buf: &[u8] = &[0x1A, 0x02, 0x08, 0x07, 0x08, 0x09];
        let field = first_field(&mut buf);
        let mut nested = field.take_nested(&mut buf).unwrap();
        assert_eq!(nested, &[0x08, 0x07]);

        let inner = first_field(&mut nested);
        let mut value = None;
        inner.merge_int64(&mut value, &mut nested).unwrap();
        assert_eq!(value, Some(7));
        assert!(nested.is_empty());
        assert_eq!(buf, &[0x08, 0x09]);
    }

    #[test]
    fn test_repeated_int64_both_forms() {
        let mut packed = Vec::new();
        encoding::int64::encode_packed(1, &[7, -2, 300], &mut packed);

        let mut unpacked = Vec::new();
        for value in [7_i64, -2, 300] {
            encoding::int64::encode(1, &value, &mut unpacked);
        }

        for bytes in [packed, unpacked] {
            let mut buf = bytes.as_slice();
            let mut values = Vec::new();
            while let Some(field) = next_field("Tuple", &mut buf).unwrap() {
                field.merge_repeated_int64(&mut values, &mut buf).unwrap();
            }
            assert_eq!(values, vec![7, -2, 300]);
        }
    }

    #[test]
    fn test_retain_keeps_raw_field() {
        let mut bytes = Vec::new();
        encoding::string::encode(40, &"future".to_string(), &mut bytes);
        let unknown_len = bytes.len();
        encoding::int64::encode(1, &3, &mut bytes);

        let mut buf = bytes.as_slice();
        let field = first_field(&mut buf);
        let mut unknown = UnknownFields::new();
        field.retain(&mut unknown, &mut buf).unwrap();
        assert_eq!(unknown.as_bytes(), &bytes[..unknown_len]);

        let next = first_field(&mut buf);
        assert_eq!(next.tag(), 1);
    }

    #[test]
    fn test_retain_nested_groups() {
        // group 5 { group 6 { varint field 1 = 1 } }
        let bytes = [0x2B, 0x33, 0x08, 0x01, 0x34, 0x2C];
        let mut buf = &bytes[..];
        let field = first_field(&mut buf);
        let mut unknown = UnknownFields::new();
        field.retain(&mut unknown, &mut buf).unwrap();
        assert_eq!(unknown.as_bytes(), &bytes[..]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_unterminated_group() {
        let bytes = [0x2B, 0x08, 0x01];
        let mut buf = &bytes[..];
        let field = first_field(&mut buf);
        let error = field.retain(&mut UnknownFields::new(), &mut buf).unwrap_err();
        assert!(matches!(error, WireError::Rejected { .. }));
    }

    #[test]
    fn test_stray_end_group() {
        let mut buf: &[u8] = &[0x2C];
        let field = first_field(&mut buf);
        let error = field.retain(&mut UnknownFields::new(), &mut buf).unwrap_err();
        assert_rejected(&error, "unexpected end group tag");
    }

    #[test]
    fn test_take_delimited() {
        let mut buf: &[u8] = &[0x02, 0x08, 0x01, 0xFF];
        assert_eq!(take_delimited("Test", &mut buf).unwrap(), &[0x08, 0x01]);
        assert_eq!(buf, &[0xFF]);

        let mut short: &[u8] = &[0x7F, 0x08];
        assert!(matches!(
            take_delimited("Test", &mut short),
            Err(WireError::LengthOverrun { length: 127, remaining: 1, .. })
        ));
    }

    #[test]
    fn test_enum_keeps_negative_values() {
        let mut bytes = Vec::new();
        encoding::int32::encode(1, &-3, &mut bytes);
        assert_eq!(bytes.len(), 11);
        let mut buf = bytes.as_slice();
        let field = first_field(&mut buf);
        assert_eq!(field.read_enum(&mut buf).unwrap(), -3);
    }
}
