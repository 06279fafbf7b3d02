//! Sequences of length-delimited records in one buffer.
//!
//! Each record is a varint byte length followed by that many bytes of one
//! message. A record whose content is malformed can be skipped because its
//! length is still known; a broken length prefix ends the stream.

use std::marker::PhantomData;

use bytes::Bytes;
use prost::encoding;
use tracing::warn;

use crate::codec::{DecodeContext, Message, SizeCache, check_depth, check_size, decode_message};
use crate::wire::take_delimited;
use crate::{CodecConfig, Result};

/// Appends length-delimited records to an in-memory buffer.
#[derive(Debug, Clone, Default)]
pub struct RecordWriter {
    buf: Vec<u8>,
    config: CodecConfig,
    records: usize,
}

impl RecordWriter {
    /// Empty writer with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty writer refusing records a reader with `config` would reject.
    #[must_use]
    pub const fn with_config(config: CodecConfig) -> Self {
        Self {
            buf: Vec::new(),
            config,
            records: 0,
        }
    }

    /// Append one record.
    ///
    /// # Errors
    /// [`crate::Error::RecursionLimitExceeded`] when the message nests
    /// triggers deeper than `max_trigger_depth`. Nothing is written then.
    pub fn push<M: Message>(&mut self, message: &M) -> Result<()> {
        let mut sizes = SizeCache::new();
        let len = message.size(&mut sizes);
        check_depth(&sizes, &self.config)?;
        encoding::encode_varint(len as u64, &mut self.buf);
        message.write(&mut sizes, &mut self.buf);
        self.records = self.records.saturating_add(1);
        Ok(())
    }

    /// Records written so far.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.records
    }

    /// True when nothing has been written.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.records == 0
    }

    /// Bytes written so far.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Finish and take the buffer.
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        Bytes::from(self.buf)
    }
}

/// Iterates over the records of a buffer written by [`RecordWriter`].
///
/// Yields `Err` for a record whose content is malformed and moves on to
/// the next one. A framing error (bad or overrunning length prefix) is
/// yielded once and ends iteration.
#[derive(Debug)]
pub struct RecordReader<'a, M> {
    rest: &'a [u8],
    config: CodecConfig,
    index: usize,
    done: bool,
    _message: PhantomData<fn() -> M>,
}

impl<'a, M: Message> RecordReader<'a, M> {
    /// Reader with default limits.
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self::with_config(bytes, CodecConfig::default())
    }

    /// Reader with explicit limits, applied per record.
    #[must_use]
    pub const fn with_config(bytes: &'a [u8], config: CodecConfig) -> Self {
        Self {
            rest: bytes,
            config,
            index: 0,
            done: false,
            _message: PhantomData,
        }
    }

    /// Records successfully framed so far.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.index
    }

    /// Decode every record, logging and skipping the malformed ones.
    pub fn lenient(self) -> impl Iterator<Item = M> + 'a
    where
        M: 'a,
    {
        let mut index = 0usize;
        self.filter_map(move |record| {
            let current = index;
            index = index.saturating_add(1);
            match record {
                Ok(message) => Some(message),
                Err(error) => {
                    warn!(record = current, record_type = M::NAME, %error, "skipping corrupt record");
                    None
                }
            }
        })
    }

    fn read_record(&mut self) -> Result<M> {
        let mut record = take_delimited(M::NAME, &mut self.rest).inspect_err(|_| self.done = true)?;
        self.index = self.index.saturating_add(1);
        check_size(record.len(), &self.config)?;
        let mut ctx = DecodeContext::new(self.config);
        decode_message(&mut record, &mut ctx)
    }
}

impl<M: Message> Iterator for RecordReader<'_, M> {
    type Item = Result<M>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.rest.is_empty() {
            return None;
        }
        Some(self.read_record())
    }
}
