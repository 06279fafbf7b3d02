//! Timer envelope, timer records and timer-kind dispatch.

// Encoded sizes are bounded by addressable memory.
#![allow(clippy::arithmetic_side_effects)]

use bytes::BufMut;
use tracing::{debug, warn};

use crate::codec::{
    DecodeContext, Message, SizeCache, enum_size, int32_size, int64_size, merge_optional,
    merge_repeated, message_size, opt_message_size, string_size, write_enum, write_int32,
    write_int64, write_message, write_opt_message, write_string,
};
use crate::wire::next_field;
use crate::{Error, Payload, PayloadBody, ProcessTimer, Result, Tuple, UnknownFields};

/// Kind of a persisted timer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TimerType {
    /// Fact expiration; payload is [`ExpireTimerData`].
    #[default]
    Expire,
    /// Rule activation timer; payload is [`ExpireTimerData`].
    Activation,
    /// Behavior (sliding window) timer; payload is [`ExpireTimerData`].
    Behavior,
    /// Process-level timer; lives in the envelope's `proc_timer` slot.
    Process,
    /// Timer node inside a process; payload is [`TimerNodeTimerData`].
    TimerNode,
    /// Value written by a newer schema. Re-encodes as the same integer.
    Unrecognized(i32),
}

impl TimerType {
    /// Decode a wire value. Unknown values are kept, never clamped.
    #[must_use]
    pub const fn from_i32(value: i32) -> Self {
        match value {
            0 => Self::Expire,
            1 => Self::Activation,
            2 => Self::Behavior,
            3 => Self::Process,
            4 => Self::TimerNode,
            other => Self::Unrecognized(other),
        }
    }

    /// Wire value.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::Expire => 0,
            Self::Activation => 1,
            Self::Behavior => 2,
            Self::Process => 3,
            Self::TimerNode => 4,
            Self::Unrecognized(value) => value,
        }
    }
}

/// Expiration, activation or behavior timer record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpireTimerData {
    /// Fact handle the timer belongs to.
    pub handle_id: Option<i64>,
    /// Entry point the fact was inserted through.
    pub entry_point_id: Option<String>,
    /// Class of the expiring fact.
    pub class_name: Option<String>,
    /// Next fire time, epoch millis.
    pub next_fire_timestamp: Option<i64>,
    /// Fields from newer schema versions.
    pub unknown_fields: UnknownFields,
}

impl Message for ExpireTimerData {
    const NAME: &'static str = "ExpireTimerData";
    const FULL_NAME: &'static str = full_name!("ExpireTimerData");

    fn size(&self, _sizes: &mut SizeCache) -> usize {
        int64_size(1, self.handle_id)
            + string_size(2, self.entry_point_id.as_ref())
            + string_size(3, self.class_name.as_ref())
            + int64_size(4, self.next_fire_timestamp)
            + self.unknown_fields.encoded_len()
    }

    fn write<B: BufMut>(&self, _sizes: &mut SizeCache, buf: &mut B) {
        write_int64(1, self.handle_id, buf);
        write_string(2, self.entry_point_id.as_ref(), buf);
        write_string(3, self.class_name.as_ref(), buf);
        write_int64(4, self.next_fire_timestamp, buf);
        self.unknown_fields.encode(buf);
    }

    fn merge(&mut self, buf: &mut &[u8], _ctx: &mut DecodeContext) -> Result<()> {
        while let Some(field) = next_field(Self::NAME, buf)? {
            match field.tag() {
                1 => field.merge_int64(&mut self.handle_id, buf)?,
                2 => field.merge_string(&mut self.entry_point_id, buf)?,
                3 => field.merge_string(&mut self.class_name, buf)?,
                4 => field.merge_int64(&mut self.next_fire_timestamp, buf)?,
                _ => field.retain(&mut self.unknown_fields, buf)?,
            }
        }
        Ok(())
    }
}

/// Timer attached to a timer node of a running process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimerNodeTimerData {
    /// Node identifier within the process definition.
    pub node_id: Option<i32>,
    /// Working-memory facts the timer was matched against.
    pub tuple: Option<Tuple>,
    /// Fields from newer schema versions.
    pub unknown_fields: UnknownFields,
}

impl Message for TimerNodeTimerData {
    const NAME: &'static str = "TimerNodeTimerData";
    const FULL_NAME: &'static str = full_name!("TimerNodeTimerData");

    fn size(&self, sizes: &mut SizeCache) -> usize {
        int32_size(1, self.node_id)
            + opt_message_size(2, self.tuple.as_ref(), sizes)
            + self.unknown_fields.encoded_len()
    }

    fn write<B: BufMut>(&self, sizes: &mut SizeCache, buf: &mut B) {
        write_int32(1, self.node_id, buf);
        write_opt_message(2, self.tuple.as_ref(), sizes, buf);
        self.unknown_fields.encode(buf);
    }

    fn merge(&mut self, buf: &mut &[u8], ctx: &mut DecodeContext) -> Result<()> {
        while let Some(field) = next_field(Self::NAME, buf)? {
            match field.tag() {
                1 => field.merge_int32(&mut self.node_id, buf)?,
                2 => merge_optional(&field, &mut self.tuple, buf, ctx)?,
                _ => field.retain(&mut self.unknown_fields, buf)?,
            }
        }
        Ok(())
    }
}

/// One persisted timer: a discriminator plus a packed record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timer {
    /// Which record `data` must hold.
    pub timer_type: TimerType,
    /// Packed record; absent for process timers stored in `Timers::proc_timer`.
    pub data: Option<Payload>,
    /// Fields from newer schema versions.
    pub unknown_fields: UnknownFields,
}

/// Typed view of a [`Timer`], checked against its discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerRecord<'a> {
    /// EXPIRE, ACTIVATION or BEHAVIOR timer.
    Expire(&'a ExpireTimerData),
    /// TIMER_NODE timer.
    TimerNode(&'a TimerNodeTimerData),
    /// PROCESS timer; `None` when the record sits in the envelope slot and
    /// the timer was dispatched on its own.
    Process(Option<&'a ProcessTimer>),
    /// Discriminator this schema does not know.
    Unrecognized {
        /// Raw discriminator value
        type_value: i32,
        /// Payload, uninterpreted
        payload: Option<&'a Payload>,
    },
}

impl Timer {
    fn with_payload(timer_type: TimerType, data: Payload) -> Self {
        Self {
            timer_type,
            data: Some(data),
            unknown_fields: UnknownFields::new(),
        }
    }

    /// EXPIRE timer.
    #[must_use]
    pub fn expire(data: ExpireTimerData) -> Self {
        Self::with_payload(TimerType::Expire, Payload::pack(data))
    }

    /// ACTIVATION timer.
    #[must_use]
    pub fn activation(data: ExpireTimerData) -> Self {
        Self::with_payload(TimerType::Activation, Payload::pack(data))
    }

    /// BEHAVIOR timer.
    #[must_use]
    pub fn behavior(data: ExpireTimerData) -> Self {
        Self::with_payload(TimerType::Behavior, Payload::pack(data))
    }

    /// TIMER_NODE timer.
    #[must_use]
    pub fn timer_node(data: TimerNodeTimerData) -> Self {
        Self::with_payload(TimerType::TimerNode, Payload::pack(data))
    }

    /// PROCESS timer whose record lives in `Timers::proc_timer`.
    #[must_use]
    pub fn process() -> Self {
        Self {
            timer_type: TimerType::Process,
            data: None,
            unknown_fields: UnknownFields::new(),
        }
    }

    /// Resolve the payload against the discriminator.
    ///
    /// Returns `Ok(None)` when a non-process timer carries no payload.
    ///
    /// # Errors
    /// [`Error::TypeMismatch`] when the payload's type is not the one the
    /// discriminator requires.
    pub fn record(&self) -> Result<Option<TimerRecord<'_>>> {
        let body = self.data.as_ref().map(Payload::body);
        match self.timer_type {
            TimerType::Expire | TimerType::Activation | TimerType::Behavior => match body {
                None => Ok(None),
                Some(PayloadBody::ExpireTimer(data)) => Ok(Some(TimerRecord::Expire(data))),
                Some(_) => Err(self.mismatch(ExpireTimerData::FULL_NAME)),
            },
            TimerType::TimerNode => match body {
                None => Ok(None),
                Some(PayloadBody::TimerNodeTimer(data)) => Ok(Some(TimerRecord::TimerNode(data))),
                Some(_) => Err(self.mismatch(TimerNodeTimerData::FULL_NAME)),
            },
            TimerType::Process => match body {
                None => Ok(Some(TimerRecord::Process(None))),
                Some(PayloadBody::ProcessTimer(timer)) => {
                    Ok(Some(TimerRecord::Process(Some(timer.as_ref()))))
                }
                Some(_) => Err(self.mismatch(ProcessTimer::FULL_NAME)),
            },
            TimerType::Unrecognized(type_value) => Ok(Some(TimerRecord::Unrecognized {
                type_value,
                payload: self.data.as_ref(),
            })),
        }
    }

    fn mismatch(&self, expected: &'static str) -> Error {
        let found = self.data.as_ref().map_or("", Payload::type_url);
        Error::type_mismatch(expected, found)
    }
}

impl Message for Timer {
    const NAME: &'static str = "Timer";
    const FULL_NAME: &'static str = full_name!("Timer");

    fn size(&self, sizes: &mut SizeCache) -> usize {
        enum_size(1, self.timer_type.as_i32())
            + opt_message_size(2, self.data.as_ref(), sizes)
            + self.unknown_fields.encoded_len()
    }

    fn write<B: BufMut>(&self, sizes: &mut SizeCache, buf: &mut B) {
        write_enum(1, self.timer_type.as_i32(), buf);
        write_opt_message(2, self.data.as_ref(), sizes, buf);
        self.unknown_fields.encode(buf);
    }

    fn merge(&mut self, buf: &mut &[u8], ctx: &mut DecodeContext) -> Result<()> {
        while let Some(field) = next_field(Self::NAME, buf)? {
            match field.tag() {
                1 => {
                    self.timer_type = TimerType::from_i32(field.read_enum(buf)?);
                    if let TimerType::Unrecognized(value) = self.timer_type {
                        debug!(value, "unrecognized timer type");
                    }
                }
                2 => merge_optional(&field, &mut self.data, buf, ctx)?,
                _ => field.retain(&mut self.unknown_fields, buf)?,
            }
        }
        Ok(())
    }
}

/// Root persisted unit: every pending timer of a session or process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timers {
    /// Timers in persisted order.
    pub timer: Vec<Timer>,
    /// Process-level timer, independent of `timer`.
    pub proc_timer: Option<ProcessTimer>,
    /// Fields from newer schema versions.
    pub unknown_fields: UnknownFields,
}

impl Timers {
    /// Empty envelope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a timer.
    #[must_use]
    pub fn with_timer(mut self, timer: Timer) -> Self {
        self.timer.push(timer);
        self
    }

    /// Set the process timer slot.
    #[must_use]
    pub fn with_proc_timer(mut self, proc_timer: ProcessTimer) -> Self {
        self.proc_timer = Some(proc_timer);
        self
    }

    /// Resolve every timer, logging and skipping the ones that cannot be
    /// dispatched. A PROCESS timer without its own payload resolves to the
    /// envelope's `proc_timer` slot.
    pub fn records(&self) -> impl Iterator<Item = TimerRecord<'_>> {
        self.timer
            .iter()
            .enumerate()
            .filter_map(move |(index, timer)| match timer.record() {
                Ok(Some(TimerRecord::Process(None))) => {
                    Some(TimerRecord::Process(self.proc_timer.as_ref()))
                }
                Ok(Some(record)) => Some(record),
                Ok(None) => {
                    debug!(index, timer_type = ?timer.timer_type, "timer has no payload, skipping");
                    None
                }
                Err(error) => {
                    warn!(index, %error, "skipping unresolvable timer record");
                    None
                }
            })
    }
}

impl Message for Timers {
    const NAME: &'static str = "Timers";
    const FULL_NAME: &'static str = full_name!("Timers");

    fn size(&self, sizes: &mut SizeCache) -> usize {
        let timers: usize = self
            .timer
            .iter()
            .map(|timer| message_size(1, timer, sizes))
            .sum();
        timers
            + opt_message_size(2, self.proc_timer.as_ref(), sizes)
            + self.unknown_fields.encoded_len()
    }

    fn write<B: BufMut>(&self, sizes: &mut SizeCache, buf: &mut B) {
        for timer in &self.timer {
            write_message(1, timer, sizes, buf);
        }
        write_opt_message(2, self.proc_timer.as_ref(), sizes, buf);
        self.unknown_fields.encode(buf);
    }

    fn merge(&mut self, buf: &mut &[u8], ctx: &mut DecodeContext) -> Result<()> {
        while let Some(field) = next_field(Self::NAME, buf)? {
            match field.tag() {
                1 => merge_repeated(&field, &mut self.timer, buf, ctx)?,
                2 => merge_optional(&field, &mut self.proc_timer, buf, ctx)?,
                _ => field.retain(&mut self.unknown_fields, buf)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::indexing_slicing)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]

    use super::*;
    use crate::{CronTrigger, Trigger};

    fn expire_data() -> ExpireTimerData {
        ExpireTimerData {
            handle_id: Some(12),
            entry_point_id: Some("DEFAULT".to_string()),
            class_name: Some("com.acme.Order".to_string()),
            next_fire_timestamp: Some(1_700_000_000_000),
            unknown_fields: UnknownFields::new(),
        }
    }

    #[test]
    fn test_timer_type_wire_values() {
        for value in 0..=4 {
            assert_eq!(TimerType::from_i32(value).as_i32(), value);
        }
        assert_eq!(TimerType::from_i32(17), TimerType::Unrecognized(17));
        assert_eq!(TimerType::Unrecognized(17).as_i32(), 17);
        assert_eq!(TimerType::default(), TimerType::Expire);
    }

    #[test]
    fn test_expire_timer_round_trip() {
        let timer = Timer::activation(expire_data());
        let decoded = Timer::decode(&timer.encode_to_vec()).unwrap();
        assert_eq!(decoded, timer);
        assert_eq!(
            decoded.record().unwrap(),
            Some(TimerRecord::Expire(&expire_data()))
        );
    }

    #[test]
    fn test_zero_values_are_present_not_absent() {
        let data = ExpireTimerData {
            handle_id: Some(0),
            next_fire_timestamp: Some(0),
            ..ExpireTimerData::default()
        };
        let decoded = ExpireTimerData::decode(&data.encode_to_vec()).unwrap();
        assert_eq!(decoded.handle_id, Some(0));
        assert_eq!(decoded.next_fire_timestamp, Some(0));
        assert_eq!(decoded.entry_point_id, None);
        assert_eq!(decoded.class_name, None);
    }

    #[test]
    fn test_payload_mismatch_is_type_error() {
        let timer = Timer {
            timer_type: TimerType::TimerNode,
            data: Some(Payload::pack(expire_data())),
            unknown_fields: UnknownFields::new(),
        };
        let decoded = Timer::decode(&timer.encode_to_vec()).unwrap();
        let error = decoded.record().unwrap_err();
        assert_eq!(
            error,
            Error::type_mismatch(
                TimerNodeTimerData::FULL_NAME,
                "type.googleapis.com/org.drools.serialization.protobuf.ExpireTimerData"
            )
        );
    }

    #[test]
    fn test_trigger_payload_in_timer_is_rejected() {
        let timer = Timer {
            timer_type: TimerType::Expire,
            data: Some(Payload::pack(CronTrigger::new().with_cron_expression("0 0 * * * ?"))),
            unknown_fields: UnknownFields::new(),
        };
        assert!(timer.record().unwrap_err().is_type_mismatch());
    }

    #[test]
    fn test_expire_without_payload() {
        let timer = Timer::default();
        assert_eq!(timer.record().unwrap(), None);
    }

    #[test]
    fn test_unrecognized_timer_type_round_trip() {
        let timer = Timer {
            timer_type: TimerType::Unrecognized(42),
            data: Some(Payload::pack(expire_data())),
            unknown_fields: UnknownFields::new(),
        };
        let bytes = timer.encode_to_vec();
        assert_eq!(&bytes[..2], &[0x08, 0x2A]);

        let decoded = Timer::decode(&bytes).unwrap();
        assert_eq!(decoded.timer_type, TimerType::Unrecognized(42));
        assert!(matches!(
            decoded.record().unwrap(),
            Some(TimerRecord::Unrecognized { type_value: 42, payload: Some(_) })
        ));
        assert_eq!(decoded.encode_to_vec(), bytes);
    }

    #[test]
    fn test_process_timer_resolves_to_envelope_slot() {
        let proc_timer = ProcessTimer::new()
            .with_id(5)
            .with_trigger(Trigger::cron(CronTrigger::new().with_cron_expression("0/5 * * * * ?")));
        let timers = Timers::new()
            .with_timer(Timer::expire(expire_data()))
            .with_timer(Timer::process())
            .with_proc_timer(proc_timer.clone());

        let decoded = Timers::decode(&timers.encode_to_vec()).unwrap();
        assert_eq!(decoded, timers);

        let records: Vec<_> = decoded.records().collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1], TimerRecord::Process(Some(&proc_timer)));
    }

    #[test]
    fn test_process_timer_with_embedded_payload() {
        let proc_timer = ProcessTimer::new().with_id(9);
        let timer = Timer {
            timer_type: TimerType::Process,
            data: Some(Payload::pack(proc_timer.clone())),
            unknown_fields: UnknownFields::new(),
        };
        assert_eq!(
            timer.record().unwrap(),
            Some(TimerRecord::Process(Some(&proc_timer)))
        );
    }

    #[test]
    fn test_records_skip_mismatched_timers() {
        let bad = Timer {
            timer_type: TimerType::TimerNode,
            data: Some(Payload::pack(expire_data())),
            unknown_fields: UnknownFields::new(),
        };
        let timers = Timers::new()
            .with_timer(bad)
            .with_timer(Timer::behavior(expire_data()))
            .with_timer(Timer::default());

        let records: Vec<_> = timers.records().collect();
        assert_eq!(records, vec![TimerRecord::Expire(&expire_data())]);
    }

    #[test]
    fn test_repeated_data_merges_into_existing_payload() {
        let mut bytes = Timer::expire(expire_data()).encode_to_vec();

        // Second occurrence of `data` carrying only a value
        let later = ExpireTimerData {
            handle_id: Some(99),
            ..ExpireTimerData::default()
        };
        let mut any = Vec::new();
        prost::encoding::bytes::encode(2, &later.encode_to_vec(), &mut any);
        prost::encoding::bytes::encode(2, &any, &mut bytes);

        let decoded = Timer::decode(&bytes).unwrap();
        let data = decoded.data.as_ref().unwrap();
        assert_eq!(
            data.type_url(),
            "type.googleapis.com/org.drools.serialization.protobuf.ExpireTimerData"
        );
        assert_eq!(decoded.record().unwrap(), Some(TimerRecord::Expire(&later)));
    }

    #[test]
    fn test_empty_envelope_encodes_to_nothing() {
        assert!(Timers::new().encode_to_vec().is_empty());
        assert_eq!(Timers::decode(&[]).unwrap(), Timers::new());
    }

    #[test]
    fn test_timer_order_is_preserved() {
        let timers = Timers::new()
            .with_timer(Timer::expire(ExpireTimerData {
                handle_id: Some(1),
                ..ExpireTimerData::default()
            }))
            .with_timer(Timer::expire(ExpireTimerData {
                handle_id: Some(2),
                ..ExpireTimerData::default()
            }));
        let decoded = Timers::decode(&timers.encode_to_vec()).unwrap();
        let ids: Vec<_> = decoded
            .records()
            .filter_map(|record| match record {
                TimerRecord::Expire(data) => data.handle_id,
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }
}
