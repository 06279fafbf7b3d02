//! Scheduling triggers and trigger-kind dispatch.
//!
//! `CompositeMaxDurationTrigger` wraps another [`Trigger`], so the schema
//! is recursive. Decoding counts trigger nesting in the [`DecodeContext`]
//! and stops at `max_trigger_depth`; the walking helpers here
//! ([`Trigger::depth`], [`Trigger::innermost`]) loop instead of recursing.

// Encoded sizes are bounded by addressable memory.
#![allow(clippy::arithmetic_side_effects)]

use bytes::BufMut;
use prost::encoding;
use tracing::debug;

use crate::codec::{
    DecodeContext, Message, SizeCache, enum_size, int32_size, int64_size, merge_optional,
    opt_message_size, string_size, write_enum, write_int32, write_int64, write_opt_message,
    write_string,
};
use crate::wire::next_field;
use crate::{Error, Payload, PayloadBody, Result, UnknownFields};

/// Scheduling algorithm of a [`Trigger`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TriggerType {
    /// Cron expression; payload is [`CronTrigger`].
    #[default]
    Cron,
    /// Fixed period; payload is [`IntervalTrigger`].
    Interval,
    /// Single shot; payload is [`PointInTimeTrigger`].
    PointInTime,
    /// Inner trigger capped at a deadline; payload is [`CompositeMaxDurationTrigger`].
    CompositeMaxDuration,
    /// Value written by a newer schema. Re-encodes as the same integer.
    Unrecognized(i32),
}

impl TriggerType {
    /// Decode a wire value. Unknown values are kept, never clamped.
    #[must_use]
    pub const fn from_i32(value: i32) -> Self {
        match value {
            0 => Self::Cron,
            1 => Self::Interval,
            2 => Self::PointInTime,
            3 => Self::CompositeMaxDuration,
            other => Self::Unrecognized(other),
        }
    }

    /// Wire value.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::Cron => 0,
            Self::Interval => 1,
            Self::PointInTime => 2,
            Self::CompositeMaxDuration => 3,
            Self::Unrecognized(value) => value,
        }
    }
}

/// Cron-scheduled trigger.
///
/// A missing `cron_expression` is representable; rejecting it is up to the
/// scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CronTrigger {
    /// Earliest firing, epoch millis.
    pub start_time: Option<i64>,
    /// Latest firing, epoch millis.
    pub end_time: Option<i64>,
    /// Maximum number of firings.
    pub repeat_limit: Option<i32>,
    /// Firings so far.
    pub repeat_count: Option<i32>,
    /// Quartz-style cron expression.
    pub cron_expression: Option<String>,
    /// Next firing, epoch millis.
    pub next_fire_time: Option<i64>,
    /// Exclusion calendars, in order.
    pub calendar_name: Vec<String>,
    /// Fields from newer schema versions.
    pub unknown_fields: UnknownFields,
}

impl CronTrigger {
    /// Trigger with no fields present.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `cron_expression`.
    #[must_use]
    pub fn with_cron_expression(mut self, expression: impl Into<String>) -> Self {
        self.cron_expression = Some(expression.into());
        self
    }

    /// Set `start_time`.
    #[must_use]
    pub const fn with_start_time(mut self, start_time: i64) -> Self {
        self.start_time = Some(start_time);
        self
    }

    /// Set `end_time`.
    #[must_use]
    pub const fn with_end_time(mut self, end_time: i64) -> Self {
        self.end_time = Some(end_time);
        self
    }

    /// Set `repeat_limit`.
    #[must_use]
    pub const fn with_repeat_limit(mut self, repeat_limit: i32) -> Self {
        self.repeat_limit = Some(repeat_limit);
        self
    }

    /// Set `repeat_count`.
    #[must_use]
    pub const fn with_repeat_count(mut self, repeat_count: i32) -> Self {
        self.repeat_count = Some(repeat_count);
        self
    }

    /// Set `next_fire_time`.
    #[must_use]
    pub const fn with_next_fire_time(mut self, next_fire_time: i64) -> Self {
        self.next_fire_time = Some(next_fire_time);
        self
    }

    /// Append an exclusion calendar.
    #[must_use]
    pub fn with_calendar(mut self, name: impl Into<String>) -> Self {
        self.calendar_name.push(name.into());
        self
    }
}

impl Message for CronTrigger {
    const NAME: &'static str = "CronTrigger";
    const FULL_NAME: &'static str = full_name!("CronTrigger");

    fn size(&self, _sizes: &mut SizeCache) -> usize {
        int64_size(1, self.start_time)
            + int64_size(2, self.end_time)
            + int32_size(3, self.repeat_limit)
            + int32_size(4, self.repeat_count)
            + string_size(5, self.cron_expression.as_ref())
            + int64_size(6, self.next_fire_time)
            + encoding::string::encoded_len_repeated(7, &self.calendar_name)
            + self.unknown_fields.encoded_len()
    }

    fn write<B: BufMut>(&self, _sizes: &mut SizeCache, buf: &mut B) {
        write_int64(1, self.start_time, buf);
        write_int64(2, self.end_time, buf);
        write_int32(3, self.repeat_limit, buf);
        write_int32(4, self.repeat_count, buf);
        write_string(5, self.cron_expression.as_ref(), buf);
        write_int64(6, self.next_fire_time, buf);
        encoding::string::encode_repeated(7, &self.calendar_name, buf);
        self.unknown_fields.encode(buf);
    }

    fn merge(&mut self, buf: &mut &[u8], _ctx: &mut DecodeContext) -> Result<()> {
        while let Some(field) = next_field(Self::NAME, buf)? {
            match field.tag() {
                1 => field.merge_int64(&mut self.start_time, buf)?,
                2 => field.merge_int64(&mut self.end_time, buf)?,
                3 => field.merge_int32(&mut self.repeat_limit, buf)?,
                4 => field.merge_int32(&mut self.repeat_count, buf)?,
                5 => field.merge_string(&mut self.cron_expression, buf)?,
                6 => field.merge_int64(&mut self.next_fire_time, buf)?,
                7 => field.merge_repeated_string(&mut self.calendar_name, buf)?,
                _ => field.retain(&mut self.unknown_fields, buf)?,
            }
        }
        Ok(())
    }
}

/// Fixed-period trigger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntervalTrigger {
    /// Earliest firing, epoch millis.
    pub start_time: Option<i64>,
    /// Latest firing, epoch millis.
    pub end_time: Option<i64>,
    /// Maximum number of firings.
    pub repeat_limit: Option<i32>,
    /// Firings so far.
    pub repeat_count: Option<i32>,
    /// Next firing, epoch millis.
    pub next_fire_time: Option<i64>,
    /// Millis between firings.
    pub period: Option<i64>,
    /// Exclusion calendars, in order.
    pub calendar_name: Vec<String>,
    /// Fields from newer schema versions.
    pub unknown_fields: UnknownFields,
}

impl IntervalTrigger {
    /// Trigger with no fields present.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `start_time`.
    #[must_use]
    pub const fn with_start_time(mut self, start_time: i64) -> Self {
        self.start_time = Some(start_time);
        self
    }

    /// Set `end_time`.
    #[must_use]
    pub const fn with_end_time(mut self, end_time: i64) -> Self {
        self.end_time = Some(end_time);
        self
    }

    /// Set `repeat_limit`.
    #[must_use]
    pub const fn with_repeat_limit(mut self, repeat_limit: i32) -> Self {
        self.repeat_limit = Some(repeat_limit);
        self
    }

    /// Set `repeat_count`.
    #[must_use]
    pub const fn with_repeat_count(mut self, repeat_count: i32) -> Self {
        self.repeat_count = Some(repeat_count);
        self
    }

    /// Set `next_fire_time`.
    #[must_use]
    pub const fn with_next_fire_time(mut self, next_fire_time: i64) -> Self {
        self.next_fire_time = Some(next_fire_time);
        self
    }

    /// Set `period`.
    #[must_use]
    pub const fn with_period(mut self, period: i64) -> Self {
        self.period = Some(period);
        self
    }

    /// Append an exclusion calendar.
    #[must_use]
    pub fn with_calendar(mut self, name: impl Into<String>) -> Self {
        self.calendar_name.push(name.into());
        self
    }
}

impl Message for IntervalTrigger {
    const NAME: &'static str = "IntervalTrigger";
    const FULL_NAME: &'static str = full_name!("IntervalTrigger");

    fn size(&self, _sizes: &mut SizeCache) -> usize {
        int64_size(1, self.start_time)
            + int64_size(2, self.end_time)
            + int32_size(3, self.repeat_limit)
            + int32_size(4, self.repeat_count)
            + int64_size(5, self.next_fire_time)
            + int64_size(6, self.period)
            + encoding::string::encoded_len_repeated(7, &self.calendar_name)
            + self.unknown_fields.encoded_len()
    }

    fn write<B: BufMut>(&self, _sizes: &mut SizeCache, buf: &mut B) {
        write_int64(1, self.start_time, buf);
        write_int64(2, self.end_time, buf);
        write_int32(3, self.repeat_limit, buf);
        write_int32(4, self.repeat_count, buf);
        write_int64(5, self.next_fire_time, buf);
        write_int64(6, self.period, buf);
        encoding::string::encode_repeated(7, &self.calendar_name, buf);
        self.unknown_fields.encode(buf);
    }

    fn merge(&mut self, buf: &mut &[u8], _ctx: &mut DecodeContext) -> Result<()> {
        while let Some(field) = next_field(Self::NAME, buf)? {
            match field.tag() {
                1 => field.merge_int64(&mut self.start_time, buf)?,
                2 => field.merge_int64(&mut self.end_time, buf)?,
                3 => field.merge_int32(&mut self.repeat_limit, buf)?,
                4 => field.merge_int32(&mut self.repeat_count, buf)?,
                5 => field.merge_int64(&mut self.next_fire_time, buf)?,
                6 => field.merge_int64(&mut self.period, buf)?,
                7 => field.merge_repeated_string(&mut self.calendar_name, buf)?,
                _ => field.retain(&mut self.unknown_fields, buf)?,
            }
        }
        Ok(())
    }
}

/// One-shot trigger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointInTimeTrigger {
    /// The single firing, epoch millis.
    pub next_fire_time: Option<i64>,
    /// Fields from newer schema versions.
    pub unknown_fields: UnknownFields,
}

impl PointInTimeTrigger {
    /// Trigger with no fields present.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `next_fire_time`.
    #[must_use]
    pub const fn with_next_fire_time(mut self, next_fire_time: i64) -> Self {
        self.next_fire_time = Some(next_fire_time);
        self
    }
}

impl Message for PointInTimeTrigger {
    const NAME: &'static str = "PointInTimeTrigger";
    const FULL_NAME: &'static str = full_name!("PointInTimeTrigger");

    fn size(&self, _sizes: &mut SizeCache) -> usize {
        int64_size(1, self.next_fire_time) + self.unknown_fields.encoded_len()
    }

    fn write<B: BufMut>(&self, _sizes: &mut SizeCache, buf: &mut B) {
        write_int64(1, self.next_fire_time, buf);
        self.unknown_fields.encode(buf);
    }

    fn merge(&mut self, buf: &mut &[u8], _ctx: &mut DecodeContext) -> Result<()> {
        while let Some(field) = next_field(Self::NAME, buf)? {
            match field.tag() {
                1 => field.merge_int64(&mut self.next_fire_time, buf)?,
                _ => field.retain(&mut self.unknown_fields, buf)?,
            }
        }
        Ok(())
    }
}

/// Inner trigger capped at an absolute deadline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompositeMaxDurationTrigger {
    /// Deadline after which the inner trigger stops, epoch millis.
    pub max_duration_timestamp: Option<i64>,
    /// Scheduler clock when the timer was saved, epoch millis.
    pub timer_current_date: Option<i64>,
    /// Wrapped trigger.
    pub timer_trigger: Option<Trigger>,
    /// Fields from newer schema versions.
    pub unknown_fields: UnknownFields,
}

impl CompositeMaxDurationTrigger {
    /// Composite wrapping `inner`.
    #[must_use]
    pub fn wrapping(inner: Trigger) -> Self {
        Self {
            timer_trigger: Some(inner),
            ..Self::default()
        }
    }

    /// Set `max_duration_timestamp`.
    #[must_use]
    pub const fn with_max_duration_timestamp(mut self, timestamp: i64) -> Self {
        self.max_duration_timestamp = Some(timestamp);
        self
    }

    /// Set `timer_current_date`.
    #[must_use]
    pub const fn with_timer_current_date(mut self, timestamp: i64) -> Self {
        self.timer_current_date = Some(timestamp);
        self
    }
}

impl Message for CompositeMaxDurationTrigger {
    const NAME: &'static str = "CompositeMaxDurationTrigger";
    const FULL_NAME: &'static str = full_name!("CompositeMaxDurationTrigger");

    fn size(&self, sizes: &mut SizeCache) -> usize {
        int64_size(1, self.max_duration_timestamp)
            + int64_size(2, self.timer_current_date)
            + opt_message_size(3, self.timer_trigger.as_ref(), sizes)
            + self.unknown_fields.encoded_len()
    }

    fn write<B: BufMut>(&self, sizes: &mut SizeCache, buf: &mut B) {
        write_int64(1, self.max_duration_timestamp, buf);
        write_int64(2, self.timer_current_date, buf);
        write_opt_message(3, self.timer_trigger.as_ref(), sizes, buf);
        self.unknown_fields.encode(buf);
    }

    fn merge(&mut self, buf: &mut &[u8], ctx: &mut DecodeContext) -> Result<()> {
        while let Some(field) = next_field(Self::NAME, buf)? {
            match field.tag() {
                1 => field.merge_int64(&mut self.max_duration_timestamp, buf)?,
                2 => field.merge_int64(&mut self.timer_current_date, buf)?,
                3 => merge_optional(&field, &mut self.timer_trigger, buf, ctx)?,
                _ => field.retain(&mut self.unknown_fields, buf)?,
            }
        }
        Ok(())
    }
}

/// Discriminator plus packed trigger record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trigger {
    /// Which record `trigger` must hold.
    pub trigger_type: TriggerType,
    /// Packed record.
    pub trigger: Option<Payload>,
    /// Fields from newer schema versions.
    pub unknown_fields: UnknownFields,
}

/// Typed view of a [`Trigger`], checked against its discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind<'a> {
    /// CRON
    Cron(&'a CronTrigger),
    /// INTERVAL
    Interval(&'a IntervalTrigger),
    /// POINT_IN_TIME
    PointInTime(&'a PointInTimeTrigger),
    /// COMPOSITE_MAX_DURATION
    CompositeMaxDuration(&'a CompositeMaxDurationTrigger),
    /// Discriminator this schema does not know.
    Unrecognized {
        /// Raw discriminator value
        type_value: i32,
        /// Payload, uninterpreted
        payload: Option<&'a Payload>,
    },
}

impl Trigger {
    fn with_payload(trigger_type: TriggerType, payload: Payload) -> Self {
        Self {
            trigger_type,
            trigger: Some(payload),
            unknown_fields: UnknownFields::new(),
        }
    }

    /// CRON trigger.
    #[must_use]
    pub fn cron(trigger: CronTrigger) -> Self {
        Self::with_payload(TriggerType::Cron, Payload::pack(trigger))
    }

    /// INTERVAL trigger.
    #[must_use]
    pub fn interval(trigger: IntervalTrigger) -> Self {
        Self::with_payload(TriggerType::Interval, Payload::pack(trigger))
    }

    /// POINT_IN_TIME trigger.
    #[must_use]
    pub fn point_in_time(trigger: PointInTimeTrigger) -> Self {
        Self::with_payload(TriggerType::PointInTime, Payload::pack(trigger))
    }

    /// COMPOSITE_MAX_DURATION trigger.
    #[must_use]
    pub fn composite_max_duration(trigger: CompositeMaxDurationTrigger) -> Self {
        Self::with_payload(TriggerType::CompositeMaxDuration, Payload::pack(trigger))
    }

    /// Resolve the payload against the discriminator.
    ///
    /// Returns `Ok(None)` when a recognized trigger carries no payload.
    ///
    /// # Errors
    /// [`Error::TypeMismatch`] when the payload's type is not the one the
    /// discriminator requires.
    pub fn kind(&self) -> Result<Option<TriggerKind<'_>>> {
        let body = self.trigger.as_ref().map(Payload::body);
        let kind = match (self.trigger_type, body) {
            (TriggerType::Unrecognized(type_value), _) => TriggerKind::Unrecognized {
                type_value,
                payload: self.trigger.as_ref(),
            },
            (_, None) => return Ok(None),
            (TriggerType::Cron, Some(PayloadBody::CronTrigger(t))) => TriggerKind::Cron(t),
            (TriggerType::Interval, Some(PayloadBody::IntervalTrigger(t))) => {
                TriggerKind::Interval(t)
            }
            (TriggerType::PointInTime, Some(PayloadBody::PointInTimeTrigger(t))) => {
                TriggerKind::PointInTime(t)
            }
            (
                TriggerType::CompositeMaxDuration,
                Some(PayloadBody::CompositeMaxDurationTrigger(t)),
            ) => TriggerKind::CompositeMaxDuration(t),
            (trigger_type, Some(_)) => return Err(self.mismatch(trigger_type)),
        };
        Ok(Some(kind))
    }

    fn mismatch(&self, trigger_type: TriggerType) -> Error {
        let expected = match trigger_type {
            TriggerType::Cron => CronTrigger::FULL_NAME,
            TriggerType::Interval => IntervalTrigger::FULL_NAME,
            TriggerType::PointInTime => PointInTimeTrigger::FULL_NAME,
            TriggerType::CompositeMaxDuration | TriggerType::Unrecognized(_) => {
                CompositeMaxDurationTrigger::FULL_NAME
            }
        };
        let found = self.trigger.as_ref().map_or("", Payload::type_url);
        Error::type_mismatch(expected, found)
    }

    /// Inner trigger when this is a composite wrapping one.
    fn wrapped(&self) -> Option<&Self> {
        match (self.trigger_type, self.trigger.as_ref().map(Payload::body)) {
            (
                TriggerType::CompositeMaxDuration,
                Some(PayloadBody::CompositeMaxDurationTrigger(composite)),
            ) => composite.timer_trigger.as_ref(),
            _ => None,
        }
    }

    /// Number of trigger levels, counting `self` as 1.
    #[must_use]
    pub fn depth(&self) -> usize {
        let mut depth: usize = 1;
        let mut current = self;
        while let Some(inner) = current.wrapped() {
            depth = depth.saturating_add(1);
            current = inner;
        }
        depth
    }

    /// The trigger at the bottom of a composite chain; `self` otherwise.
    #[must_use]
    pub fn innermost(&self) -> &Self {
        let mut current = self;
        while let Some(inner) = current.wrapped() {
            current = inner;
        }
        current
    }
}

impl Message for Trigger {
    const NAME: &'static str = "Trigger";
    const FULL_NAME: &'static str = full_name!("Trigger");

    fn size(&self, sizes: &mut SizeCache) -> usize {
        sizes.enter_trigger();
        let len = enum_size(1, self.trigger_type.as_i32())
            + opt_message_size(2, self.trigger.as_ref(), sizes)
            + self.unknown_fields.encoded_len();
        sizes.exit_trigger();
        len
    }

    fn write<B: BufMut>(&self, sizes: &mut SizeCache, buf: &mut B) {
        write_enum(1, self.trigger_type.as_i32(), buf);
        write_opt_message(2, self.trigger.as_ref(), sizes, buf);
        self.unknown_fields.encode(buf);
    }

    fn merge(&mut self, buf: &mut &[u8], ctx: &mut DecodeContext) -> Result<()> {
        ctx.enter_trigger()?;
        let result = self.merge_fields(buf, ctx);
        ctx.exit_trigger();
        result
    }
}

impl Trigger {
    fn merge_fields(&mut self, buf: &mut &[u8], ctx: &mut DecodeContext) -> Result<()> {
        while let Some(field) = next_field(Self::NAME, buf)? {
            match field.tag() {
                1 => {
                    self.trigger_type = TriggerType::from_i32(field.read_enum(buf)?);
                    if let TriggerType::Unrecognized(value) = self.trigger_type {
                        debug!(value, "unrecognized trigger type");
                    }
                }
                2 => merge_optional(&field, &mut self.trigger, buf, ctx)?,
                _ => field.retain(&mut self.unknown_fields, buf)?,
            }
        }
        Ok(())
    }
}
