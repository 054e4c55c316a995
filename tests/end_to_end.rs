//! End-to-end scenarios over the full service pool: frames go in through the
//! codec and dispatcher, telemetry frames come out through the downlink
//! capture.
use core::sync::atomic::{AtomicU32, Ordering};
use core::time::Duration;

use pus_stack::codec;
use pus_stack::error::SpacecraftError;
use pus_stack::mem::{params, ParameterRegistry, ParameterValue};
use pus_stack::message::Message;
use pus_stack::services::{event, ServicePool};
use pus_stack::testutil::{Harness, ManualClock};
use pus_stack::time::UtcTimestamp;
use pus_stack::{PacketType, ECSS_FUNCTION_MAX_ARG_LENGTH, ECSS_TC_REQUEST_STRING_SIZE};

fn at(seconds: u64) -> UtcTimestamp {
    UtcTimestamp::from_epoch_seconds(seconds)
}

const T0: u64 = 1_800_000_000;

fn harness() -> Harness {
    let mut harness = Harness::new();
    harness.register_lft_parameters();
    harness.register_scheduling_parameters();
    harness.clock.set(at(T0));
    harness
}

/// Push a raw frame through parse + dispatch.
fn uplink(pool: &mut ServicePool, harness: &mut Harness, frame: &[u8]) {
    let mut message = codec::parse(frame, true, true).expect("uplinked frame must parse");
    let mut ctx = harness.ctx();
    pool.dispatch(&mut ctx, &mut message);
}

fn compose_tc(message: &Message) -> Vec<u8> {
    let ecss_total = message.data_len() + 5;
    codec::compose(message, ecss_total, &ManualClock::default()).unwrap()
}

#[test]
fn ping_round_trip() {
    let mut harness = harness();
    let mut pool = ServicePool::new();

    // Minimal TC[17,1] are-you-alive frame.
    let frame: [u8; 11] = [
        0x18, 0x01, 0xC0, 0x00, 0x00, 0x04, 0x20, 0x11, 0x01, 0x00, 0x00,
    ];
    uplink(&mut pool, &mut harness, &frame);

    let reports = harness.downlink.parsed();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].packet_type, PacketType::Tm);
    assert_eq!(reports[0].service_type, 17);
    assert_eq!(reports[0].message_type, 2);
}

#[test]
fn unknown_service_raises_internal_error_event() {
    let mut harness = harness();
    let mut pool = ServicePool::new();
    let request = Message::tc(42, 1, 1);
    uplink(&mut pool, &mut harness, &compose_tc(&request));

    let reports = harness.downlink.parsed();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].service_type, 5);
    assert_eq!(reports[0].message_type, 2); // low severity anomaly
    let payload = reports[0].payload();
    assert_eq!(
        &payload[..2],
        &(event::Event::FailedStartOfExecution as u16).to_be_bytes()
    );
    assert_eq!(
        &payload[2..4],
        &u16::from(SpacecraftError::OtherMessageType).to_be_bytes()
    );
}

#[test]
fn housekeeping_periodic_cycle() {
    let mut harness = harness();
    harness.registry.register(100, ParameterValue::U16(0x1234));
    harness.registry.register(101, ParameterValue::U8(0x56));
    let mut pool = ServicePool::new();

    // TC[3,1]: structure 1, interval 2 s, parameters 100 and 101.
    let mut create = Message::tc(3, 1, 1);
    create.append_u16(1).unwrap();
    create.append_u32(2).unwrap();
    create.append_u16(2).unwrap();
    create.append_u16(100).unwrap();
    create.append_u16(101).unwrap();
    uplink(&mut pool, &mut harness, &compose_tc(&create));

    // TC[3,5]: enable periodic generation.
    let mut enable = Message::tc(3, 5, 1);
    enable.append_u8(1).unwrap();
    enable.append_u16(1).unwrap();
    uplink(&mut pool, &mut harness, &compose_tc(&enable));

    // Two ticks two seconds apart, starting on an even epoch second.
    let t = T0 + (2 - T0 % 2);
    let mut ctx = harness.ctx();
    pool.housekeeping
        .report_pending(&mut ctx, at(t), at(t - 1), Duration::from_secs(1));
    let mut ctx = harness.ctx();
    let next = pool.housekeeping.report_pending(
        &mut ctx,
        at(t + 2),
        at(t),
        Duration::from_secs(2),
    );
    assert_eq!(next.to_epoch_seconds(), t + 4);

    let reports = harness.downlink.parsed();
    let hk: Vec<_> = reports
        .iter()
        .filter(|r| r.service_type == 3 && r.message_type == 25)
        .collect();
    assert_eq!(hk.len(), 2);
    for report in hk {
        assert_eq!(report.payload(), &[0x00, 0x01, 0x12, 0x34, 0x56]);
    }
}

#[test]
fn schedule_insert_and_release() {
    let mut harness = harness();
    let mut pool = ServicePool::new();

    // The scheduled activity is a ping TC.
    let ping = Message::tc(17, 1, 1);
    let ping_frame = compose_tc(&ping);
    let mut image = [0u8; ECSS_TC_REQUEST_STRING_SIZE];
    image[..ping_frame.len()].copy_from_slice(&ping_frame);

    let mut insert = Message::tc(11, 4, 1);
    insert.append_u16(1).unwrap();
    insert.append_utc_timestamp(at(T0 + 10)).unwrap();
    insert.append_string(&image).unwrap();
    uplink(&mut pool, &mut harness, &compose_tc(&insert));
    assert_eq!(harness.scheduler.pokes(), 1);

    // Early tick: nothing released, next wakeup reported.
    let mut ctx = harness.ctx();
    let next = pool.scheduling.release(&mut ctx, at(T0));
    assert_eq!(next, at(T0 + 10));
    assert!(harness.tc_queue.released().is_empty());

    // Due tick: released exactly once into the TC queue.
    let mut ctx = harness.ctx();
    let next = pool.scheduling.release(&mut ctx, at(T0 + 10));
    assert_eq!(next, UtcTimestamp::MAX);
    let (mut released, priority) = harness.tc_queue.pop().expect("activity must be queued");
    assert_eq!(priority, 20);

    // The released TC runs through the normal dispatch path.
    let mut ctx = harness.ctx();
    pool.dispatch(&mut ctx, &mut released);
    let reports = harness.downlink.parsed();
    assert!(reports
        .iter()
        .any(|r| r.service_type == 17 && r.message_type == 2));
}

#[test]
fn large_packet_uplink_with_recovery_mid_transfer() {
    let mut harness = harness();
    let mut pool = ServicePool::new();

    let mut first = Message::tc(13, 9, 1);
    first.append_u16(130).unwrap();
    first.append_u16(0).unwrap();
    let mut filename = [0u8; 10];
    filename[..8].copy_from_slice(b"SCHED_TC");
    first.append_string(&filename).unwrap();
    first.append_u32(381).unwrap();
    uplink(&mut pool, &mut harness, &compose_tc(&first));

    let mut part1 = Message::tc(13, 10, 1);
    part1.append_u16(130).unwrap();
    part1.append_u16(1).unwrap();
    part1.append_string(&[b'A'; 127]).unwrap();
    uplink(&mut pool, &mut harness, &compose_tc(&part1));

    // Reboot: a fresh pool resumes from the registry-persisted sequence.
    let mut pool = ServicePool::new();
    let mut part2 = Message::tc(13, 10, 1);
    part2.append_u16(130).unwrap();
    part2.append_u16(2).unwrap();
    part2.append_string(&[b'B'; 127]).unwrap();
    uplink(&mut pool, &mut harness, &compose_tc(&part2));

    let mut last = Message::tc(13, 11, 1);
    last.append_u16(130).unwrap();
    last.append_u16(3).unwrap();
    last.append_string(&[b'C'; 127]).unwrap();
    uplink(&mut pool, &mut harness, &compose_tc(&last));

    let file = harness.store.file_contents("SCHED_TC").unwrap();
    assert_eq!(file.len(), 381);
    assert_eq!(
        harness.registry.get(params::LFT_SEQUENCE_NUM).unwrap(),
        ParameterValue::U32(3)
    );
    assert_eq!(
        harness.registry.get(params::LFT_DISCONTINUITY_COUNTER).unwrap(),
        ParameterValue::U32(0)
    );
}

static BOUND_FUNCTION_CALLS: AtomicU32 = AtomicU32::new(0);

fn bound_function(args: &[u8; ECSS_FUNCTION_MAX_ARG_LENGTH]) -> Result<(), SpacecraftError> {
    assert_eq!(args[0], 0xA5);
    BOUND_FUNCTION_CALLS.fetch_add(1, Ordering::SeqCst);
    Ok(())
}

#[test]
fn event_action_calls_bound_function() {
    let mut harness = harness();
    let mut pool = ServicePool::new();
    pool.function_management.register(0x0010, bound_function).unwrap();

    // Bind event 8 (safe mode) to function 0x0010 with one argument byte.
    let mut add = Message::tc(19, 1, 1);
    add.append_u8(1).unwrap();
    add.append_u16(1).unwrap();
    add.append_u16(event::Event::SafeMode as u16).unwrap();
    add.append_u16(0x0010).unwrap();
    add.append_u8(1).unwrap();
    add.append_u8(0xA5).unwrap();
    uplink(&mut pool, &mut harness, &compose_tc(&add));

    let mut enable = Message::tc(19, 5, 1);
    enable.append_u8(0).unwrap();
    uplink(&mut pool, &mut harness, &compose_tc(&enable));

    // The global gate is still off: raising the event emits TM only.
    let mut ctx = harness.ctx();
    pool.raise_event(&mut ctx, event::Event::SafeMode as u16, event::Severity::High, &[]);
    assert_eq!(BOUND_FUNCTION_CALLS.load(Ordering::SeqCst), 0);

    let mut enable_function = Message::tc(19, 8, 1);
    uplink(&mut pool, &mut harness, &compose_tc(&enable_function));
    let mut ctx = harness.ctx();
    pool.raise_event(&mut ctx, event::Event::SafeMode as u16, event::Severity::High, &[]);
    assert_eq!(BOUND_FUNCTION_CALLS.load(Ordering::SeqCst), 1);

    let severity_reports: usize = harness
        .downlink
        .parsed()
        .iter()
        .filter(|r| r.service_type == 5 && r.message_type == 4)
        .count();
    assert_eq!(severity_reports, 2);
}

#[test]
fn perform_function_with_unknown_id_fails_and_raises_event() {
    let mut harness = harness();
    let mut pool = ServicePool::new();

    let mut request = Message::tc(8, 1, 1);
    request.append_u16(0x0BAD).unwrap();
    uplink(&mut pool, &mut harness, &compose_tc(&request));

    let reports = harness.downlink.parsed();
    // Failed completion carries the function id in the request identity.
    let completion = reports
        .iter()
        .find(|r| r.service_type == 1 && r.message_type == 8)
        .expect("missing TM[1,8]");
    assert_eq!(&completion.payload()[4..6], &0x0BADu16.to_be_bytes());
    assert_eq!(
        &completion.payload()[6..8],
        &u16::from(SpacecraftError::FunctionNotFound).to_be_bytes()
    );
    // And the failed-start event went out as well.
    assert!(reports
        .iter()
        .any(|r| r.service_type == 5 && r.message_type == 2));
}

#[test]
fn telemetry_sequence_counts_are_monotonic() {
    let mut harness = harness();
    let mut pool = ServicePool::new();
    for _ in 0..5 {
        let ping = Message::tc(17, 1, 1);
        uplink(&mut pool, &mut harness, &compose_tc(&ping));
    }
    let reports = harness.downlink.parsed();
    assert_eq!(reports.len(), 5);
    for (i, report) in reports.iter().enumerate() {
        assert_eq!(report.sequence_count, i as u16);
        assert_eq!(report.message_type_counter, i as u16);
    }
}

#[test]
fn wrong_subservice_gets_failed_acceptance_with_request_identity() {
    let mut harness = harness();
    let mut pool = ServicePool::new();
    let mut request = Message::tc(17, 9, 1);
    request.sequence_count = 5;
    uplink(&mut pool, &mut harness, &compose_tc(&request));

    let reports = harness.downlink.parsed();
    assert_eq!(reports.len(), 1);
    assert_eq!((reports[0].service_type, reports[0].message_type), (1, 2));
    // Identity replay: TC bit, secondary header flag, apid 1, then the
    // sequence flags and count.
    assert_eq!(&reports[0].payload()[..4], &[0x18, 0x01, 0xC0, 0x05]);
}
