//! Process-level timer record.

// Encoded sizes are bounded by addressable memory.
#![allow(clippy::arithmetic_side_effects)]

use bytes::BufMut;

use crate::codec::{
    DecodeContext, Message, SizeCache, int32_size, int64_size, merge_optional, opt_message_size,
    string_size, write_int32, write_int64, write_opt_message, write_string,
};
use crate::trigger::Trigger;
use crate::wire::next_field;
use crate::{Result, UnknownFields};

/// Timer owned by a running process instance.
///
/// Every scalar field has explicit presence: `Some(0)` and `None` are
/// different states and both survive a round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessTimer {
    /// Timer instance id.
    pub id: Option<i64>,
    /// Id of the timer definition in the process.
    pub timer_id: Option<String>,
    /// Initial delay, millis.
    pub delay: Option<i64>,
    /// Repeat period, millis.
    pub period: Option<i64>,
    /// Owning process instance.
    pub process_instance_id: Option<String>,
    /// Activation time, epoch millis.
    pub activated_time: Option<i64>,
    /// Last firing, epoch millis.
    pub last_triggered: Option<i64>,
    /// Remaining repetitions; `-1` means unbounded.
    pub repeat_limit: Option<i32>,
    /// Trigger that computes the next firing.
    pub trigger: Option<Trigger>,
    /// Fields from newer schema versions.
    pub unknown_fields: UnknownFields,
}

impl ProcessTimer {
    /// Timer with no fields present.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `id`.
    #[must_use]
    pub const fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    /// Set `timer_id`.
    #[must_use]
    pub fn with_timer_id(mut self, timer_id: impl Into<String>) -> Self {
        self.timer_id = Some(timer_id.into());
        self
    }

    /// Set `delay`.
    #[must_use]
    pub const fn with_delay(mut self, delay: i64) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Set `period`.
    #[must_use]
    pub const fn with_period(mut self, period: i64) -> Self {
        self.period = Some(period);
        self
    }

    /// Set `process_instance_id`.
    #[must_use]
    pub fn with_process_instance_id(mut self, process_instance_id: impl Into<String>) -> Self {
        self.process_instance_id = Some(process_instance_id.into());
        self
    }

    /// Set `activated_time`.
    #[must_use]
    pub const fn with_activated_time(mut self, activated_time: i64) -> Self {
        self.activated_time = Some(activated_time);
        self
    }

    /// Set `last_triggered`.
    #[must_use]
    pub const fn with_last_triggered(mut self, last_triggered: i64) -> Self {
        self.last_triggered = Some(last_triggered);
        self
    }

    /// Set `repeat_limit`.
    #[must_use]
    pub const fn with_repeat_limit(mut self, repeat_limit: i32) -> Self {
        self.repeat_limit = Some(repeat_limit);
        self
    }

    /// Set `trigger`.
    #[must_use]
    pub fn with_trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    /// True when a positive period is set.
    #[must_use]
    pub fn is_repeating(&self) -> bool {
        self.period.is_some_and(|p| p > 0)
    }

    /// True when there is no finite repeat limit.
    #[must_use]
    pub fn is_unbounded(&self) -> bool {
        self.repeat_limit.is_none_or(|l| l == -1)
    }
}

impl Message for ProcessTimer {
    const NAME: &'static str = "ProcessTimer";
    const FULL_NAME: &'static str = full_name!("ProcessTimer");

    fn size(&self, sizes: &mut SizeCache) -> usize {
        int64_size(1, self.id)
            + string_size(2, self.timer_id.as_ref())
            + int64_size(3, self.delay)
            + int64_size(4, self.period)
            + string_size(5, self.process_instance_id.as_ref())
            + int64_size(6, self.activated_time)
            + int64_size(7, self.last_triggered)
            + int32_size(8, self.repeat_limit)
            + opt_message_size(9, self.trigger.as_ref(), sizes)
            + self.unknown_fields.encoded_len()
    }

    fn write<B: BufMut>(&self, sizes: &mut SizeCache, buf: &mut B) {
        write_int64(1, self.id, buf);
        write_string(2, self.timer_id.as_ref(), buf);
        write_int64(3, self.delay, buf);
        write_int64(4, self.period, buf);
        write_string(5, self.process_instance_id.as_ref(), buf);
        write_int64(6, self.activated_time, buf);
        write_int64(7, self.last_triggered, buf);
        write_int32(8, self.repeat_limit, buf);
        write_opt_message(9, self.trigger.as_ref(), sizes, buf);
        self.unknown_fields.encode(buf);
    }

    fn merge(&mut self, buf: &mut &[u8], ctx: &mut DecodeContext) -> Result<()> {
        while let Some(field) = next_field(Self::NAME, buf)? {
            match field.tag() {
                1 => field.merge_int64(&mut self.id, buf)?,
                2 => field.merge_string(&mut self.timer_id, buf)?,
                3 => field.merge_int64(&mut self.delay, buf)?,
                4 => field.merge_int64(&mut self.period, buf)?,
                5 => field.merge_string(&mut self.process_instance_id, buf)?,
                6 => field.merge_int64(&mut self.activated_time, buf)?,
                7 => field.merge_int64(&mut self.last_triggered, buf)?,
                8 => field.merge_int32(&mut self.repeat_limit, buf)?,
                9 => merge_optional(&field, &mut self.trigger, buf, ctx)?,
                _ => field.retain(&mut self.unknown_fields, buf)?,
            }
        }
        Ok(())
    }
}
