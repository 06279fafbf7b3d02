//! Error path tests for the timer schema
//!
//! Tests verify that corrupt or hostile input is rejected with the right
//! error kind and never panics.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(clippy::indexing_slicing)]
#![allow(clippy::arithmetic_side_effects)]

use prost::encoding;
use timerstate_schema::{
    CodecConfig, CompositeMaxDurationTrigger, CronTrigger, Error, ExpireTimerData, Message,
    Payload, PointInTimeTrigger, ProcessTimer, Timer, TimerNodeTimerData, TimerType, Timers,
    Trigger, TriggerType, WireError,
};

const COMPOSITE_URL: &str =
    "type.googleapis.com/org.drools.serialization.protobuf.CompositeMaxDurationTrigger";

/// A composite trigger chain `levels` deep, built directly as bytes so the
/// test never holds the deep structure in memory.
fn nested_composite_bytes(levels: usize) -> Vec<u8> {
    let mut trigger = Trigger::point_in_time(PointInTimeTrigger::new().with_next_fire_time(1))
        .encode_to_vec();
    for _ in 0..levels {
        let mut composite = Vec::new();
        encoding::int64::encode(1, &1_700_000_000_000, &mut composite);
        encoding::bytes::encode(3, &trigger, &mut composite);

        let mut any = Vec::new();
        encoding::string::encode(1, &COMPOSITE_URL.to_string(), &mut any);
        encoding::bytes::encode(2, &composite, &mut any);

        trigger.clear();
        encoding::int32::encode(1, &TriggerType::CompositeMaxDuration.as_i32(), &mut trigger);
        encoding::bytes::encode(2, &any, &mut trigger);
    }
    trigger
}

/// Assert a primitive-level rejection inside `message`.
fn assert_rejected(error: &Error, message: &str, description: &str) {
    match error {
        Error::MalformedInput(WireError::Rejected {
            message: rejected_in,
            source,
        }) => {
            assert_eq!(*rejected_in, message);
            assert!(source.to_string().contains(description), "{source}");
        }
        other => panic!("expected rejected input, got {other:?}"),
    }
}

fn sample_envelope() -> Timers {
    Timers::new()
        .with_timer(Timer::expire(ExpireTimerData {
            handle_id: Some(1),
            class_name: Some("com.acme.Order".to_string()),
            ..ExpireTimerData::default()
        }))
        .with_proc_timer(
            ProcessTimer::new()
                .with_id(7)
                .with_process_instance_id("pi-1")
                .with_trigger(Trigger::cron(
                    CronTrigger::new().with_cron_expression("0 0 * * * ?"),
                )),
        )
}

#[test]
fn test_thousand_level_composite_hits_recursion_limit() {
    let bytes = nested_composite_bytes(1000);
    let error = Trigger::decode(&bytes).unwrap_err();
    assert_eq!(error, Error::RecursionLimitExceeded { limit: 16 });
    assert!(error.is_recursion_limit());
}

#[test]
fn test_recursion_limit_applies_inside_process_timer() {
    let trigger = nested_composite_bytes(40);
    let mut bytes = Vec::new();
    encoding::int64::encode(1, &5, &mut bytes);
    encoding::bytes::encode(9, &trigger, &mut bytes);

    let error = ProcessTimer::decode(&bytes).unwrap_err();
    assert!(error.is_recursion_limit());
}

#[test]
fn test_configured_recursion_limit() {
    let bytes = nested_composite_bytes(3);
    assert!(Trigger::decode(&bytes).is_ok());

    let config = CodecConfig::default().with_max_trigger_depth(3);
    assert_eq!(
        Trigger::decode_with(&bytes, &config).unwrap_err(),
        Error::RecursionLimitExceeded { limit: 3 }
    );

    let config = CodecConfig::default().with_max_trigger_depth(4);
    let trigger = Trigger::decode_with(&bytes, &config).unwrap();
    assert_eq!(trigger.depth(), 4);
}

#[test]
fn test_every_truncated_delimited_buffer_is_rejected() {
    let bytes = sample_envelope().encode_length_delimited_to_vec();
    for len in 0..bytes.len() {
        let error = Timers::decode_length_delimited(&bytes[..len]).unwrap_err();
        assert!(error.is_malformed_input(), "prefix {len}: {error}");
    }
    assert!(Timers::decode_length_delimited(&bytes).is_ok());
}

#[test]
fn test_truncation_mid_field_is_rejected() {
    let bytes = sample_envelope().encode_to_vec();
    // Cut inside the first timer record
    let error = Timers::decode(&bytes[..bytes.len() / 4]).unwrap_err();
    assert!(error.is_malformed_input());
}

#[test]
fn test_trailing_bytes_after_delimited_record() {
    let mut bytes = sample_envelope().encode_length_delimited_to_vec();
    bytes.push(0x08);
    let error = Timers::decode_length_delimited(&bytes).unwrap_err();
    assert!(matches!(
        error,
        Error::MalformedInput(WireError::TrailingBytes { remaining: 1, .. })
    ));
}

#[test]
fn test_wire_type_mismatch() {
    // ProcessTimer.id (int64) sent as a length-delimited field
    let mut bytes = Vec::new();
    encoding::string::encode(1, &"42".to_string(), &mut bytes);
    let error = ProcessTimer::decode(&bytes).unwrap_err();
    assert_rejected(
        &error,
        "ProcessTimer",
        "invalid wire type: LengthDelimited (expected Varint)",
    );
}

#[test]
fn test_invalid_utf8_is_rejected() {
    let mut bytes = Vec::new();
    encoding::bytes::encode(3, &vec![b'c', 0xC3, 0x28], &mut bytes);
    let error = ExpireTimerData::decode(&bytes).unwrap_err();
    assert_rejected(&error, "ExpireTimerData", "not UTF-8");
}

#[test]
fn test_nested_length_overrun() {
    // TimerNodeTimerData.tuple claims 10 bytes, only 2 follow
    let bytes = [0x12, 0x0A, 0x08, 0x01];
    let error = TimerNodeTimerData::decode(&bytes).unwrap_err();
    assert!(matches!(
        error,
        Error::MalformedInput(WireError::LengthOverrun { length: 10, .. })
    ));
}

#[test]
fn test_inner_message_cannot_read_past_its_length() {
    // Tuple of length 2 whose packed handle run claims 3 bytes
    let bytes = [0x12, 0x02, 0x0A, 0x03, 0x01, 0x02, 0x03];
    let error = TimerNodeTimerData::decode(&bytes).unwrap_err();
    assert!(error.is_malformed_input());
}

#[test]
fn test_overlong_varint() {
    let mut bytes = vec![0x08];
    bytes.extend([0xFF; 10]);
    let error = ProcessTimer::decode(&bytes).unwrap_err();
    assert_rejected(&error, "ProcessTimer", "invalid varint");
}

#[test]
fn test_field_number_zero() {
    let error = Timers::decode(&[0x00, 0x01]).unwrap_err();
    assert_rejected(&error, "Timers", "invalid tag value: 0");
}

#[test]
fn test_unknown_field_with_invalid_wire_type() {
    let error = Timers::decode(&[0x7E]).unwrap_err();
    assert_rejected(&error, "Timers", "invalid wire type value: 6");
}

#[test]
fn test_unterminated_unknown_group() {
    let error = Timers::decode(&[0xB3, 0x01, 0x08, 0x05]).unwrap_err();
    assert!(error.is_malformed_input());
}

#[test]
fn test_encode_refuses_what_decode_would_reject() {
    let mut trigger = Trigger::point_in_time(PointInTimeTrigger::new().with_next_fire_time(1));
    for _ in 0..16 {
        trigger = Trigger::composite_max_duration(CompositeMaxDurationTrigger::wrapping(trigger));
    }
    assert_eq!(trigger.depth(), 17);
    let timer = ProcessTimer::new().with_trigger(trigger);

    let mut buf = Vec::new();
    assert_eq!(
        timer.encode(&mut buf),
        Err(Error::RecursionLimitExceeded { limit: 16 })
    );
    assert!(buf.is_empty());

    // The unchecked path still writes it, and the default decoder refuses it
    let bytes = timer.encode_to_vec();
    assert!(ProcessTimer::decode(&bytes).unwrap_err().is_recursion_limit());
}

#[test]
fn test_oversized_input_rejected() {
    let bytes = sample_envelope().encode_to_vec();
    let config = CodecConfig::default().with_max_message_size(bytes.len() - 1);
    let error = Timers::decode_with(&bytes, &config).unwrap_err();
    assert!(matches!(
        error,
        Error::MalformedInput(WireError::MessageTooLarge { .. })
    ));
}

#[test]
fn test_discriminator_mismatch_is_type_error() {
    let timer = Timer {
        timer_type: TimerType::TimerNode,
        data: Some(Payload::pack(CronTrigger::new())),
        ..Timer::default()
    };
    let decoded = Timer::decode(&timer.encode_to_vec()).unwrap();
    let error = decoded.record().unwrap_err();
    assert!(error.is_type_mismatch());
    assert!(error.to_string().contains("TimerNodeTimerData"));
}

#[test]
fn test_trigger_payload_in_wrong_trigger_type() {
    let trigger = Trigger {
        trigger_type: TriggerType::PointInTime,
        trigger: Some(Payload::pack(CronTrigger::new().with_cron_expression("* * * * * ?"))),
        ..Trigger::default()
    };
    let error = trigger.kind().unwrap_err();
    assert_eq!(
        error,
        Error::type_mismatch(
            "org.drools.serialization.protobuf.PointInTimeTrigger",
            "type.googleapis.com/org.drools.serialization.protobuf.CronTrigger"
        )
    );
}

#[test]
fn test_malformed_payload_value_fails_whole_decode() {
    let mut any = Vec::new();
    encoding::string::encode(
        1,
        &"type.googleapis.com/org.drools.serialization.protobuf.ExpireTimerData".to_string(),
        &mut any,
    );
    // class_name with invalid UTF-8
    encoding::bytes::encode(2, &vec![0x1A, 0x01, 0xFF], &mut any);
    let mut bytes = Vec::new();
    encoding::bytes::encode(2, &any, &mut bytes);

    let error = Timer::decode(&bytes).unwrap_err();
    assert!(error.is_malformed_input());
}
