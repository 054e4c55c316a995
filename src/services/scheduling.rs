//! ST[11] time-based scheduling: timed release of uplinked telecommands.
//!
//! The schedule lives in the single `SCHED_TC` file as two regions. The
//! activity index holds one `{slot_id, release_time, state}` record per slot
//! and is the authoritative ordering; behind it, each slot owns a fixed
//! MRAM-aligned record with the full CCSDS telecommand image, the request
//! identity and the release time. A slot cycles `invalid → waiting` on
//! insertion and back on execution or expiry, so a reboot recovers the whole
//! schedule from the file.
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::SpacecraftError;
use crate::mem::{files, params, MemErrno, ParameterValue};
use crate::message::Message;
use crate::services::{
    create_tm, store_tm, verification, ServiceContext, RELEASED_TC_PRIORITY,
};
use crate::time::{UtcTimestamp, UTC_TIMESTAMP_SIZE};
use crate::{
    CCSDS_MAX_MESSAGE_SIZE, ECSS_MAX_SCHED_ACTIVITIES, ECSS_TC_REQUEST_STRING_SIZE,
    ECSS_TC_SECONDARY_HEADER_SIZE, ECSS_TIME_MARGIN_FOR_ACTIVATION_SECS, MRAM_DATA_BLOCK_SIZE,
};

pub const SERVICE_TYPE: u8 = 11;

#[derive(Debug, Eq, PartialEq, Copy, Clone, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum MessageType {
    EnableScheduleExecution = 1,
    DisableScheduleExecution = 2,
    ResetSchedule = 3,
    InsertActivities = 4,
    DeleteActivitiesById = 5,
    TimeShiftActivitiesById = 7,
    DetailReportActivitiesById = 9,
    ScheduleDetailReport = 10,
    SummaryReportActivitiesById = 12,
    /// TM[11,13] schedule summary report; as a telecommand it requests the
    /// summary of the whole schedule.
    ScheduleSummaryReport = 13,
    TimeShiftAllActivities = 15,
    DetailReportAllActivities = 16,
}

const BLOCK_DATA_SIZE: usize = MRAM_DATA_BLOCK_SIZE - 1;

/// One activity index record: slot id, release time, state.
const INDEX_ENTRY_SIZE: usize = 1 + UTC_TIMESTAMP_SIZE + 1;
const INDEX_SIZE: usize = INDEX_ENTRY_SIZE * ECSS_MAX_SCHED_ACTIVITIES;
/// Blocks reserved for the index region at the start of the file.
const INDEX_BLOCKS: u32 = INDEX_SIZE.div_ceil(BLOCK_DATA_SIZE) as u32;

/// One persisted activity: full telecommand image, request id, release time.
const ACTIVITY_RECORD_SIZE: usize = CCSDS_MAX_MESSAGE_SIZE + 6 + UTC_TIMESTAMP_SIZE;
/// Blocks per activity slot, rounding the record up to whole MRAM blocks.
const ACTIVITY_SLOT_BLOCKS: u32 = ACTIVITY_RECORD_SIZE.div_ceil(BLOCK_DATA_SIZE) as u32;

const _: () = assert!(ACTIVITY_SLOT_BLOCKS as usize * BLOCK_DATA_SIZE >= ACTIVITY_RECORD_SIZE);

const fn activity_block_offset(slot: usize) -> u32 {
    INDEX_BLOCKS + slot as u32 * ACTIVITY_SLOT_BLOCKS
}

#[derive(Debug, Eq, PartialEq, Copy, Clone, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ActivityState {
    Invalid = 0,
    Waiting = 1,
}

/// Index record of one schedule slot.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ActivityEntry {
    pub slot_id: u8,
    pub release_time: UtcTimestamp,
    pub state: ActivityState,
}

impl ActivityEntry {
    fn empty(slot_id: u8) -> Self {
        ActivityEntry {
            slot_id,
            release_time: UtcTimestamp::default(),
            state: ActivityState::Invalid,
        }
    }

    fn is_waiting(&self) -> bool {
        self.state == ActivityState::Waiting
    }
}

/// Request identity used to address schedule entries from ground.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct RequestId {
    pub application_id: u16,
    pub sequence_count: u16,
    pub source_id: u16,
}

/// A recovered schedule entry: the telecommand to release plus its identity
/// and release time.
#[derive(Debug, Clone)]
pub struct ScheduledActivity {
    pub request: Message,
    pub request_id: RequestId,
    pub release_time: UtcTimestamp,
}

type IndexArray = [ActivityEntry; ECSS_MAX_SCHED_ACTIVITIES];

/// Partition waiting entries to the front, then order them by release time
/// with slot id as the tie breaker. The schedule is small, so an in-place
/// insertion-style pass is enough.
fn sort_entries(entries: &mut IndexArray) {
    let mut valid_count = 0;
    for i in 0..entries.len() {
        if entries[i].is_waiting() {
            entries.swap(i, valid_count);
            valid_count += 1;
        }
    }
    for i in 1..valid_count {
        let mut j = i;
        while j > 0 {
            let earlier = (
                entries[j].release_time,
                entries[j].slot_id,
            ) < (entries[j - 1].release_time, entries[j - 1].slot_id);
            if !earlier {
                break;
            }
            entries.swap(j, j - 1);
            j -= 1;
        }
    }
}

#[derive(Debug, Default)]
pub struct TimeBasedSchedulingService;

impl TimeBasedSchedulingService {
    /// Read the activity index, treating a missing file as an empty
    /// schedule.
    fn read_index(&self, ctx: &mut ServiceContext<'_>) -> Result<IndexArray, SpacecraftError> {
        let mut entries = core::array::from_fn(|i| ActivityEntry::empty(i as u8));
        let mut raw = [0u8; INDEX_SIZE];
        match ctx
            .store
            .read_from_file(files::SCHED_TC, &mut raw, 0, INDEX_BLOCKS)
        {
            Ok(_) => {}
            Err(MemErrno::FileDoesNotExist) | Err(MemErrno::ReachedEof) => return Ok(entries),
            Err(e) => {
                log::error!("[TC_SCHEDULING] error reading activity index");
                return Err(e.into());
            }
        }
        for (i, entry) in entries.iter_mut().enumerate() {
            let record = &raw[i * INDEX_ENTRY_SIZE..(i + 1) * INDEX_ENTRY_SIZE];
            let state = ActivityState::try_from(record[8])
                .map_err(|_| SpacecraftError::CorruptedScheduleFile)?;
            *entry = ActivityEntry {
                slot_id: record[0],
                release_time: UtcTimestamp {
                    year: u16::from_be_bytes([record[1], record[2]]),
                    month: record[3],
                    day: record[4],
                    hour: record[5],
                    minute: record[6],
                    second: record[7],
                },
                state,
            };
        }
        Ok(entries)
    }

    fn write_index(
        &self,
        ctx: &mut ServiceContext<'_>,
        entries: &IndexArray,
    ) -> Result<(), SpacecraftError> {
        let mut raw = [0u8; INDEX_SIZE];
        for (i, entry) in entries.iter().enumerate() {
            let record = &mut raw[i * INDEX_ENTRY_SIZE..(i + 1) * INDEX_ENTRY_SIZE];
            record[0] = entry.slot_id;
            record[1..3].copy_from_slice(&entry.release_time.year.to_be_bytes());
            record[3] = entry.release_time.month;
            record[4] = entry.release_time.day;
            record[5] = entry.release_time.hour;
            record[6] = entry.release_time.minute;
            record[7] = entry.release_time.second;
            record[8] = entry.state as u8;
        }
        ctx.store
            .write_at_block(files::SCHED_TC, &raw, 0)
            .map_err(|e| {
                log::error!("[TC_SCHEDULING] error writing activity index");
                e.into()
            })
    }

    /// Persist one activity into its slot record.
    fn store_activity(
        &self,
        ctx: &mut ServiceContext<'_>,
        slot: usize,
        activity: &ScheduledActivity,
    ) -> Result<(), SpacecraftError> {
        let mut record = [0u8; ACTIVITY_RECORD_SIZE];
        let ecss_size = activity.request.data_len() + ECSS_TC_SECONDARY_HEADER_SIZE as u16;
        let frame = crate::codec::compose(&activity.request, ecss_size, ctx.clock)?;
        record[..frame.len()].copy_from_slice(&frame);

        let mut offset = CCSDS_MAX_MESSAGE_SIZE;
        record[offset..offset + 2].copy_from_slice(&activity.request_id.application_id.to_be_bytes());
        offset += 2;
        record[offset..offset + 2].copy_from_slice(&activity.request_id.sequence_count.to_be_bytes());
        offset += 2;
        record[offset..offset + 2].copy_from_slice(&activity.request_id.source_id.to_be_bytes());
        offset += 2;
        record[offset..offset + 2].copy_from_slice(&activity.release_time.year.to_be_bytes());
        record[offset + 2] = activity.release_time.month;
        record[offset + 3] = activity.release_time.day;
        record[offset + 4] = activity.release_time.hour;
        record[offset + 5] = activity.release_time.minute;
        record[offset + 6] = activity.release_time.second;

        ctx.store
            .write_at_block(files::SCHED_TC, &record, activity_block_offset(slot))
            .map_err(|e| {
                log::error!("[TC_SCHEDULING] error writing activity record {slot}");
                e.into()
            })
    }

    /// Recover the activity persisted in one slot record.
    fn recover_activity(
        &self,
        ctx: &mut ServiceContext<'_>,
        slot: usize,
    ) -> Result<ScheduledActivity, SpacecraftError> {
        let mut record = [0u8; ACTIVITY_RECORD_SIZE];
        let offset = activity_block_offset(slot);
        ctx.store
            .read_from_file(
                files::SCHED_TC,
                &mut record,
                offset,
                offset + ACTIVITY_SLOT_BLOCKS,
            )
            .map_err(|e| {
                log::error!("[TC_SCHEDULING] error reading activity record {slot}");
                SpacecraftError::from(e)
            })?;

        let frame_len = crate::codec::embedded_frame_len(&record[..CCSDS_MAX_MESSAGE_SIZE])?;
        let request = crate::codec::parse(&record[..frame_len], false, true)?;

        let mut offset = CCSDS_MAX_MESSAGE_SIZE;
        let application_id = u16::from_be_bytes([record[offset], record[offset + 1]]);
        offset += 2;
        let sequence_count = u16::from_be_bytes([record[offset], record[offset + 1]]);
        offset += 2;
        let source_id = u16::from_be_bytes([record[offset], record[offset + 1]]);
        offset += 2;
        let release_time = UtcTimestamp::new(
            u16::from_be_bytes([record[offset], record[offset + 1]]),
            record[offset + 2],
            record[offset + 3],
            record[offset + 4],
            record[offset + 5],
            record[offset + 6],
        )
        .map_err(|_| SpacecraftError::CorruptedScheduleFile)?;

        Ok(ScheduledActivity {
            request,
            request_id: RequestId {
                application_id,
                sequence_count,
                source_id,
            },
            release_time,
        })
    }

    /// Find the waiting entry whose persisted request identity matches.
    fn find_waiting_match(
        &self,
        ctx: &mut ServiceContext<'_>,
        entries: &IndexArray,
        request_id: RequestId,
    ) -> Option<(usize, ScheduledActivity)> {
        for (index, entry) in entries.iter().enumerate() {
            if !entry.is_waiting() {
                continue;
            }
            match self.recover_activity(ctx, usize::from(entry.slot_id)) {
                Ok(activity) if activity.request_id == request_id => {
                    return Some((index, activity));
                }
                Ok(_) => {}
                Err(e) => {
                    log::error!(
                        "[TC_SCHEDULING] skipping unreadable slot {}: {e}",
                        entry.slot_id
                    );
                }
            }
        }
        None
    }

    fn read_request_id(request: &mut Message) -> Result<RequestId, SpacecraftError> {
        let source_id = request.read_u16()?;
        let application_id = request.read_u16()?;
        let sequence_count = request.read_u16()?;
        Ok(RequestId {
            application_id,
            sequence_count,
            source_id,
        })
    }

    /// Validate the persisted schedule after boot and publish the result to
    /// the registry. Returns the number of waiting activities.
    pub fn recover(&self, ctx: &mut ServiceContext<'_>) -> Result<usize, SpacecraftError> {
        let entries = match self.read_index(ctx) {
            Ok(entries) => entries,
            Err(e) => {
                let _ = ctx
                    .registry
                    .set(params::VALID_TC_SCHEDULE_LIST, ParameterValue::U8(0));
                return Err(e);
            }
        };
        let waiting = entries.iter().filter(|e| e.is_waiting()).count();
        let _ = ctx
            .registry
            .set(params::VALID_TC_SCHEDULE_LIST, ParameterValue::U8(1));
        log::info!("[TC_SCHEDULING] recovered {waiting} scheduled activities");
        Ok(waiting)
    }

    /// TC[11,1] / TC[11,2] enable or disable the schedule execution
    /// function.
    fn set_execution(&self, ctx: &mut ServiceContext<'_>, request: &Message, enable: bool) {
        let expected = if enable {
            MessageType::EnableScheduleExecution
        } else {
            MessageType::DisableScheduleExecution
        };
        if !verification::guard_tc(ctx, request, SERVICE_TYPE, expected as u8) {
            return;
        }
        if let Err(e) = ctx
            .registry
            .set(params::TC_SCHEDULE_ACTIVE, ParameterValue::U8(u8::from(enable)))
        {
            verification::fail_start(ctx, request, e.into());
        }
    }

    /// TC[11,3] reset the schedule: every slot becomes invalid.
    fn reset_schedule(&self, ctx: &mut ServiceContext<'_>, request: &Message) {
        if !verification::guard_tc(ctx, request, SERVICE_TYPE, MessageType::ResetSchedule as u8) {
            return;
        }
        let entries = core::array::from_fn(|i| ActivityEntry::empty(i as u8));
        if let Err(e) = self.write_index(ctx, &entries) {
            verification::fail_completion(ctx, request, e);
            return;
        }
        let _ = ctx
            .registry
            .set(params::VALID_TC_SCHEDULE_LIST, ParameterValue::U8(1));
        let _ = ctx
            .registry
            .set(params::TC_SCHEDULE_ACTIVE, ParameterValue::U8(0));
    }

    /// TC[11,4] insert activities. Items are accepted individually; the
    /// batch ends with a sorted, persisted index and a scheduler wakeup.
    fn insert_activities(&self, ctx: &mut ServiceContext<'_>, request: &mut Message) {
        if !verification::guard_tc(ctx, request, SERVICE_TYPE, MessageType::InsertActivities as u8)
        {
            return;
        }
        let mut entries = match self.read_index(ctx) {
            Ok(entries) => entries,
            Err(e) => {
                verification::fail_start(ctx, request, e);
                return;
            }
        };

        let count = match request.read_u16() {
            Ok(count) => count,
            Err(e) => {
                verification::fail_acceptance(ctx, request, e);
                return;
            }
        };
        let mut inserted = false;
        for _ in 0..count {
            let release_time = match request.read_utc_timestamp() {
                Ok(ts) => ts,
                Err(e) => {
                    verification::fail_acceptance(ctx, request, e);
                    break;
                }
            };
            let mut image = [0u8; ECSS_TC_REQUEST_STRING_SIZE];
            if let Err(e) = request.read_bytes(&mut image) {
                verification::fail_acceptance(ctx, request, e);
                break;
            }

            let now = ctx.clock.now_utc();
            let margin =
                now + core::time::Duration::from_secs(ECSS_TIME_MARGIN_FOR_ACTIVATION_SECS);
            if release_time < margin {
                log::warn!("[TC_SCHEDULING] rejected scheduled TC: release time too close");
                verification::fail_start(
                    ctx,
                    request,
                    SpacecraftError::InstructionExecutionStartError,
                );
                continue;
            }
            let Some(free) = entries.iter().position(|e| !e.is_waiting()) else {
                log::warn!("[TC_SCHEDULING] rejected scheduled TC: schedule full");
                verification::fail_start(
                    ctx,
                    request,
                    SpacecraftError::InstructionExecutionStartError,
                );
                continue;
            };

            let embedded = crate::codec::embedded_frame_len(&image)
                .and_then(|len| crate::codec::parse(&image[..len], false, true));
            let embedded_request = match embedded {
                Ok(parsed) => parsed,
                Err(e) => {
                    log::warn!("[TC_SCHEDULING] error parsing scheduled TC: {e}");
                    verification::fail_start(ctx, request, e);
                    continue;
                }
            };

            let slot = usize::from(entries[free].slot_id);
            let activity = ScheduledActivity {
                request: embedded_request,
                request_id: RequestId {
                    application_id: request.application_id,
                    sequence_count: request.sequence_count,
                    source_id: request.source_id,
                },
                release_time,
            };
            if let Err(e) = self.store_activity(ctx, slot, &activity) {
                verification::fail_completion(ctx, request, e);
                continue;
            }
            entries[free].release_time = release_time;
            entries[free].state = ActivityState::Waiting;
            inserted = true;
        }

        sort_entries(&mut entries);
        if let Err(e) = self.write_index(ctx, &entries) {
            verification::fail_completion(ctx, request, e);
            return;
        }
        if inserted {
            ctx.scheduler.poke();
        }
    }

    /// TC[11,5] delete activities by request id.
    fn delete_activities_by_id(&self, ctx: &mut ServiceContext<'_>, request: &mut Message) {
        if !verification::guard_tc(
            ctx,
            request,
            SERVICE_TYPE,
            MessageType::DeleteActivitiesById as u8,
        ) {
            return;
        }
        let mut entries = match self.read_index(ctx) {
            Ok(entries) => entries,
            Err(e) => {
                verification::fail_start(ctx, request, e);
                return;
            }
        };
        let count = match request.read_u16() {
            Ok(count) => count,
            Err(e) => {
                verification::fail_acceptance(ctx, request, e);
                return;
            }
        };
        for _ in 0..count {
            let request_id = match Self::read_request_id(request) {
                Ok(id) => id,
                Err(e) => {
                    verification::fail_acceptance(ctx, request, e);
                    break;
                }
            };
            match self.find_waiting_match(ctx, &entries, request_id) {
                Some((index, _)) => entries[index].state = ActivityState::Invalid,
                None => {
                    log::warn!("[TC_SCHEDULING] failed to delete activity");
                    verification::fail_start(
                        ctx,
                        request,
                        SpacecraftError::InstructionExecutionStartError,
                    );
                }
            }
        }
        sort_entries(&mut entries);
        if let Err(e) = self.write_index(ctx, &entries) {
            verification::fail_completion(ctx, request, e);
        }
    }

    /// TC[11,7] time-shift activities by request id.
    fn time_shift_by_id(&self, ctx: &mut ServiceContext<'_>, request: &mut Message) {
        if !verification::guard_tc(
            ctx,
            request,
            SERVICE_TYPE,
            MessageType::TimeShiftActivitiesById as u8,
        ) {
            return;
        }
        let mut entries = match self.read_index(ctx) {
            Ok(entries) => entries,
            Err(e) => {
                verification::fail_start(ctx, request, e);
                return;
            }
        };
        let parsed = request
            .read_i32()
            .and_then(|offset| Ok((offset, request.read_u16()?)));
        let (offset_seconds, count) = match parsed {
            Ok(pair) => pair,
            Err(e) => {
                verification::fail_acceptance(ctx, request, e);
                return;
            }
        };
        let now = ctx.clock.now_utc();
        let margin = now + core::time::Duration::from_secs(ECSS_TIME_MARGIN_FOR_ACTIVATION_SECS);
        for _ in 0..count {
            let request_id = match Self::read_request_id(request) {
                Ok(id) => id,
                Err(e) => {
                    verification::fail_acceptance(ctx, request, e);
                    break;
                }
            };
            let Some((index, mut activity)) = self.find_waiting_match(ctx, &entries, request_id)
            else {
                verification::fail_start(
                    ctx,
                    request,
                    SpacecraftError::InstructionExecutionStartError,
                );
                continue;
            };
            let shifted = activity.release_time.checked_shift(i64::from(offset_seconds));
            let Some(shifted) = shifted.filter(|s| *s >= margin) else {
                log::warn!("[TC_SCHEDULING] time shift failed, new release time out of bounds");
                verification::fail_start(
                    ctx,
                    request,
                    SpacecraftError::InstructionExecutionStartError,
                );
                continue;
            };
            activity.release_time = shifted;
            let slot = usize::from(entries[index].slot_id);
            if let Err(e) = self.store_activity(ctx, slot, &activity) {
                verification::fail_completion(ctx, request, e);
                continue;
            }
            entries[index].release_time = shifted;
        }
        sort_entries(&mut entries);
        if let Err(e) = self.write_index(ctx, &entries) {
            verification::fail_completion(ctx, request, e);
        }
    }

    /// TC[11,15] time-shift every waiting activity. Rejected wholesale when
    /// the earliest shifted release time would violate the margin.
    fn time_shift_all(&self, ctx: &mut ServiceContext<'_>, request: &mut Message) {
        if !verification::guard_tc(
            ctx,
            request,
            SERVICE_TYPE,
            MessageType::TimeShiftAllActivities as u8,
        ) {
            return;
        }
        let mut entries = match self.read_index(ctx) {
            Ok(entries) => entries,
            Err(e) => {
                verification::fail_start(ctx, request, e);
                return;
            }
        };
        let offset_seconds = match request.read_i32() {
            Ok(offset) => offset,
            Err(e) => {
                verification::fail_acceptance(ctx, request, e);
                return;
            }
        };

        let earliest = entries
            .iter()
            .filter(|e| e.is_waiting())
            .map(|e| e.release_time)
            .min();
        let Some(earliest) = earliest else {
            verification::fail_start(
                ctx,
                request,
                SpacecraftError::SubServiceExecutionStartError,
            );
            return;
        };
        let now = ctx.clock.now_utc();
        let margin = now + core::time::Duration::from_secs(ECSS_TIME_MARGIN_FOR_ACTIVATION_SECS);
        let shifted_ok = earliest
            .checked_shift(i64::from(offset_seconds))
            .is_some_and(|s| s >= margin);
        if !shifted_ok {
            log::warn!("[TC_SCHEDULING] time shift failed, new release time out of bounds");
            verification::fail_start(
                ctx,
                request,
                SpacecraftError::SubServiceExecutionStartError,
            );
            return;
        }

        for index in 0..entries.len() {
            if !entries[index].is_waiting() {
                continue;
            }
            let slot = usize::from(entries[index].slot_id);
            let mut activity = match self.recover_activity(ctx, slot) {
                Ok(activity) => activity,
                Err(e) => {
                    verification::fail_completion(ctx, request, e);
                    continue;
                }
            };
            // The earliest entry passed the margin check, so every shift
            // stays in range.
            let Some(shifted) = activity.release_time.checked_shift(i64::from(offset_seconds))
            else {
                continue;
            };
            activity.release_time = shifted;
            if let Err(e) = self.store_activity(ctx, slot, &activity) {
                verification::fail_completion(ctx, request, e);
                continue;
            }
            entries[index].release_time = shifted;
        }
        sort_entries(&mut entries);
        if let Err(e) = self.write_index(ctx, &entries) {
            verification::fail_completion(ctx, request, e);
        }
    }

    /// Matched-subset reports: read request ids, recover the matching
    /// activities, report the sorted subset.
    fn report_by_id(&self, ctx: &mut ServiceContext<'_>, request: &mut Message, detailed: bool) {
        let expected = if detailed {
            MessageType::DetailReportActivitiesById
        } else {
            MessageType::SummaryReportActivitiesById
        };
        if !verification::guard_tc(ctx, request, SERVICE_TYPE, expected as u8) {
            return;
        }
        let entries = match self.read_index(ctx) {
            Ok(entries) => entries,
            Err(e) => {
                verification::fail_start(ctx, request, e);
                return;
            }
        };
        let count = match request.read_u16() {
            Ok(count) => count,
            Err(e) => {
                verification::fail_acceptance(ctx, request, e);
                return;
            }
        };
        let mut matched: Vec<ScheduledActivity> = Vec::new();
        for _ in 0..count {
            let request_id = match Self::read_request_id(request) {
                Ok(id) => id,
                Err(e) => {
                    verification::fail_acceptance(ctx, request, e);
                    break;
                }
            };
            match self.find_waiting_match(ctx, &entries, request_id) {
                Some((_, activity)) => matched.push(activity),
                None => {
                    verification::fail_start(
                        ctx,
                        request,
                        SpacecraftError::InstructionExecutionStartError,
                    );
                }
            }
        }
        matched.sort_by_key(|a| a.release_time);
        if detailed {
            self.detail_report(ctx, &matched);
        } else {
            self.summary_report(ctx, &matched);
        }
    }

    /// Whole-schedule reports (TC[11,16] detailed, TC[11,13] summary).
    fn report_all(&self, ctx: &mut ServiceContext<'_>, request: &Message, detailed: bool) {
        let expected = if detailed {
            MessageType::DetailReportAllActivities
        } else {
            MessageType::ScheduleSummaryReport
        };
        if !verification::guard_tc(ctx, request, SERVICE_TYPE, expected as u8) {
            return;
        }
        let mut entries = match self.read_index(ctx) {
            Ok(entries) => entries,
            Err(e) => {
                verification::fail_start(ctx, request, e);
                return;
            }
        };
        sort_entries(&mut entries);
        let mut activities: Vec<ScheduledActivity> = Vec::new();
        for entry in entries.iter().filter(|e| e.is_waiting()) {
            match self.recover_activity(ctx, usize::from(entry.slot_id)) {
                Ok(activity) => activities.push(activity),
                Err(e) => {
                    log::error!(
                        "[TC_SCHEDULING] skipping unreadable slot {}: {e}",
                        entry.slot_id
                    );
                }
            }
        }
        if detailed {
            self.detail_report(ctx, &activities);
        } else {
            self.summary_report(ctx, &activities);
        }
    }

    /// TM[11,10] schedule detail report: release time plus the composed
    /// ECSS image of each telecommand.
    fn detail_report(&self, ctx: &mut ServiceContext<'_>, activities: &[ScheduledActivity]) {
        let mut report = create_tm(SERVICE_TYPE, MessageType::ScheduleDetailReport as u8);
        let mut assembled = report.append_u16(activities.len() as u16);
        for activity in activities {
            if assembled.is_err() {
                break;
            }
            let ecss_size = activity.request.data_len() + ECSS_TC_SECONDARY_HEADER_SIZE as u16;
            assembled = report
                .append_utc_timestamp(activity.release_time)
                .and_then(|()| {
                    let image = crate::codec::compose_ecss(&activity.request, ecss_size, ctx.clock)?;
                    report.append_string(&image)
                });
        }
        if let Err(e) = assembled {
            log::error!("[TC_SCHEDULING] failed to assemble detail report: {e}");
            return;
        }
        store_tm(ctx, report);
    }

    /// TM[11,13] schedule summary report: release time and request identity
    /// per activity.
    fn summary_report(&self, ctx: &mut ServiceContext<'_>, activities: &[ScheduledActivity]) {
        let mut report = create_tm(SERVICE_TYPE, MessageType::ScheduleSummaryReport as u8);
        let mut assembled = report.append_u16(activities.len() as u16);
        for activity in activities {
            if assembled.is_err() {
                break;
            }
            assembled = report
                .append_utc_timestamp(activity.release_time)
                .and_then(|()| report.append_u16(activity.request_id.source_id))
                .and_then(|()| report.append_u16(activity.request_id.application_id))
                .and_then(|()| report.append_u16(activity.request_id.sequence_count));
        }
        if let Err(e) = assembled {
            log::error!("[TC_SCHEDULING] failed to assemble summary report: {e}");
            return;
        }
        store_tm(ctx, report);
    }

    /// Release engine, called from the scheduler tick task. Expired leading
    /// entries are dropped, due entries are recovered and handed to the TC
    /// handling queue, and the next release time (or the far-future
    /// sentinel) is returned.
    pub fn release(&self, ctx: &mut ServiceContext<'_>, now: UtcTimestamp) -> UtcTimestamp {
        let active = ctx
            .registry
            .get(params::TC_SCHEDULE_ACTIVE)
            .ok()
            .and_then(|v| v.as_u32())
            .unwrap_or(0);
        if active == 0 {
            return UtcTimestamp::MAX;
        }
        let margin_ms = ctx
            .registry
            .get(params::SCHEDULED_TC_EXECUTION_MARGIN)
            .ok()
            .and_then(|v| v.as_u32())
            .unwrap_or(5000);
        let margin_seconds = u64::from(margin_ms) / 1000;

        let mut entries = match self.read_index(ctx) {
            Ok(entries) => entries,
            Err(_) => return UtcTimestamp::MAX,
        };
        sort_entries(&mut entries);

        let now_seconds = now.to_epoch_seconds();
        let mut changed = false;
        for index in 0..entries.len() {
            if !entries[index].is_waiting() {
                break;
            }
            let release_seconds = entries[index].release_time.to_epoch_seconds();
            if now_seconds > release_seconds + margin_seconds {
                log::warn!(
                    "[TC_SCHEDULING] dropping expired activity in slot {}",
                    entries[index].slot_id
                );
                entries[index].state = ActivityState::Invalid;
                changed = true;
                continue;
            }
            if now_seconds.abs_diff(release_seconds) > margin_seconds {
                break;
            }
            match self.recover_activity(ctx, usize::from(entries[index].slot_id)) {
                Ok(activity) => {
                    if !ctx.tc_queue.enqueue(activity.request, RELEASED_TC_PRIORITY) {
                        log::error!(
                            "[TC_SCHEDULING] failed to add activity to TC handling queue"
                        );
                    }
                }
                Err(e) => {
                    log::error!(
                        "[TC_SCHEDULING] dropping unreadable slot {}: {e}",
                        entries[index].slot_id
                    );
                }
            }
            entries[index].state = ActivityState::Invalid;
            changed = true;
        }

        if changed {
            sort_entries(&mut entries);
            if self.write_index(ctx, &entries).is_err() {
                return UtcTimestamp::MAX;
            }
        }
        entries
            .iter()
            .find(|e| e.is_waiting())
            .map(|e| e.release_time)
            .unwrap_or(UtcTimestamp::MAX)
    }

    pub fn execute(&mut self, ctx: &mut ServiceContext<'_>, message: &mut Message) {
        match MessageType::try_from(message.message_type) {
            Ok(MessageType::EnableScheduleExecution) => self.set_execution(ctx, message, true),
            Ok(MessageType::DisableScheduleExecution) => self.set_execution(ctx, message, false),
            Ok(MessageType::ResetSchedule) => self.reset_schedule(ctx, message),
            Ok(MessageType::InsertActivities) => self.insert_activities(ctx, message),
            Ok(MessageType::DeleteActivitiesById) => self.delete_activities_by_id(ctx, message),
            Ok(MessageType::TimeShiftActivitiesById) => self.time_shift_by_id(ctx, message),
            Ok(MessageType::DetailReportActivitiesById) => self.report_by_id(ctx, message, true),
            Ok(MessageType::SummaryReportActivitiesById) => self.report_by_id(ctx, message, false),
            Ok(MessageType::TimeShiftAllActivities) => self.time_shift_all(ctx, message),
            Ok(MessageType::DetailReportAllActivities) => self.report_all(ctx, message, true),
            Ok(MessageType::ScheduleSummaryReport) => self.report_all(ctx, message, false),
            _ => {
                log::error!(
                    "[TC_SCHEDULING] unexpected message type [11,{}]",
                    message.message_type
                );
                verification::fail_acceptance(ctx, message, SpacecraftError::OtherMessageType);
            }
        }
    }
}
