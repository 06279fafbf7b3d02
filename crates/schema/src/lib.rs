//! Durable wire schema for workflow-engine timer state.
//!
//! This crate defines what persisted timer bytes mean so that pending
//! timers (deadlines, timeouts, recurring triggers) resume correctly after a
//! process engine restart or migration. It covers:
//!
//! - **Envelope**: [`Timers`], an ordered list of [`Timer`] records plus an
//!   optional [`ProcessTimer`] slot
//! - **Timer payloads**: [`ExpireTimerData`], [`TimerNodeTimerData`],
//!   [`ProcessTimer`], carried in an `Any`-style [`Payload`]
//! - **Triggers**: [`CronTrigger`], [`IntervalTrigger`],
//!   [`PointInTimeTrigger`] and the recursive
//!   [`CompositeMaxDurationTrigger`]
//! - **Escape hatch**: [`Tuple`] and [`SerializedObject`], whose bytes are
//!   interpreted only by a caller-supplied [`StrategyRegistry`]
//!
//! Who schedules, fires or stores timers is out of scope.
//!
//! # Compatibility
//!
//! - Field numbers are the only on-wire identity
//! - Unknown fields are kept verbatim and re-emitted on encode
//! - Unknown enum values decode to an `Unrecognized(raw)` variant and re-encode unchanged
//!
//! # Example
//!
//! ```rust
//! use timerstate_schema::{IntervalTrigger, Message, ProcessTimer, Trigger};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let timer = ProcessTimer::new()
//!     .with_id(42)
//!     .with_timer_id("t-1")
//!     .with_period(5000)
//!     .with_repeat_limit(-1)
//!     .with_trigger(Trigger::interval(
//!         IntervalTrigger::new()
//!             .with_period(5000)
//!             .with_next_fire_time(1_700_000_000_000),
//!     ));
//!
//! let bytes = timer.encode_to_vec();
//! let decoded = ProcessTimer::decode(&bytes)?;
//! assert_eq!(decoded, timer);
//! assert_eq!(decoded.delay, None);
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

/// Package-qualified message name, as carried in type URLs.
macro_rules! full_name {
    ($name:literal) => {
        concat!("org.drools.serialization.protobuf.", $name)
    };
}

mod codec;
mod config;
mod error;
mod object;
mod payload;
mod process_timer;
mod stream;
mod timer;
mod trigger;
mod unknown;
mod wire;

pub use codec::{DecodeContext, Message, SizeCache};
pub use config::{CodecConfig, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_MAX_TRIGGER_DEPTH};
pub use error::{Error, Result};
pub use object::{ObjectStrategy, SerializedObject, StrategyError, StrategyRegistry, Tuple};
pub use payload::{PACKAGE, Pack, Payload, PayloadBody, TYPE_URL_PREFIX, message_name};
pub use process_timer::ProcessTimer;
pub use stream::{RecordReader, RecordWriter};
pub use timer::{ExpireTimerData, Timer, TimerNodeTimerData, TimerRecord, TimerType, Timers};
pub use trigger::{
    CompositeMaxDurationTrigger, CronTrigger, IntervalTrigger, PointInTimeTrigger, Trigger,
    TriggerKind, TriggerType,
};
pub use unknown::UnknownFields;
pub use wire::{WireError, WireResult};
