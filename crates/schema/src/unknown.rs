//! Verbatim storage for fields the current schema does not know.

use bytes::BufMut;

/// Raw key/value bytes of unrecognized fields, in arrival order.
///
/// Re-encoding emits these bytes unchanged after the known fields, so data
/// written by a newer schema survives a round trip through older code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct UnknownFields {
    raw: Vec<u8>,
}

impl UnknownFields {
    /// Empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self { raw: Vec::new() }
    }

    /// Append one complete field (key included).
    pub fn push(&mut self, field: &[u8]) {
        self.raw.extend_from_slice(field);
    }

    /// True when no unknown field was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Encoded length in bytes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        self.raw.len()
    }

    /// Raw bytes as they will be re-emitted.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Write the captured bytes verbatim.
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_slice(&self.raw);
    }

    /// Drop every captured field.
    pub fn clear(&mut self) {
        self.raw.clear();
    }
}

impl From<Vec<u8>> for UnknownFields {
    fn from(raw: Vec<u8>) -> Self {
        Self { raw }
    }
}
