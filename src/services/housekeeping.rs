//! ST[03] housekeeping: persisted parameter-report structures with periodic
//! generation.
//!
//! Each structure occupies one fixed MRAM slot of the `HK_STRUCTS` file,
//! serialized big-endian as `structure_id ‖ interval ‖ is_periodic ‖
//! param_count ‖ param_ids`. A slot whose structure id is zero is absent.
//! The periodic tick emits TM[3,25] reports for enabled structures whose
//! collection interval divides the current epoch second.
use core::time::Duration;

use heapless::Vec;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::SpacecraftError;
use crate::mem::files;
use crate::message::Message;
use crate::services::{create_tm, parameter, store_tm, verification, ServiceContext};
use crate::time::UtcTimestamp;
use crate::{
    ECSS_MAX_HOUSEKEEPING_STRUCTURES, ECSS_MAX_SIMPLY_COMMUTATED_PARAMETERS, MRAM_DATA_BLOCK_SIZE,
};

pub const SERVICE_TYPE: u8 = 3;

#[derive(Debug, Eq, PartialEq, Copy, Clone, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum MessageType {
    CreateHousekeepingReportStructure = 1,
    DeleteHousekeepingReportStructure = 3,
    EnablePeriodicHousekeepingParametersReport = 5,
    DisablePeriodicHousekeepingParametersReport = 6,
    ReportHousekeepingStructures = 9,
    HousekeepingStructuresReport = 10,
    HousekeepingParametersReport = 25,
    GenerateOneShotHousekeepingReport = 27,
    AppendParametersToHousekeepingStructure = 29,
    ModifyCollectionIntervalOfStructures = 31,
    ReportHousekeepingPeriodicProperties = 33,
    HousekeepingPeriodicPropertiesReport = 35,
}

/// Serialized size of one structure record inside its MRAM slot.
pub const STRUCT_RECORD_SIZE: usize = MRAM_DATA_BLOCK_SIZE - 1;

const _: () =
    assert!(2 + 4 + 2 + 2 + 2 * ECSS_MAX_SIMPLY_COMMUTATED_PARAMETERS <= STRUCT_RECORD_SIZE);

/// One housekeeping report structure. The zero value doubles as the absent
/// slot marker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HousekeepingStructure {
    pub structure_id: u16,
    pub collection_interval: u32,
    pub periodic_enabled: bool,
    pub parameter_ids: Vec<u16, ECSS_MAX_SIMPLY_COMMUTATED_PARAMETERS>,
}

impl HousekeepingStructure {
    pub fn is_absent(&self) -> bool {
        self.structure_id == 0
    }

    fn to_record(&self) -> [u8; STRUCT_RECORD_SIZE] {
        let mut record = [0u8; STRUCT_RECORD_SIZE];
        record[0..2].copy_from_slice(&self.structure_id.to_be_bytes());
        record[2..6].copy_from_slice(&self.collection_interval.to_be_bytes());
        record[6..8].copy_from_slice(&u16::from(self.periodic_enabled).to_be_bytes());
        record[8..10].copy_from_slice(&(self.parameter_ids.len() as u16).to_be_bytes());
        let mut offset = 10;
        for id in &self.parameter_ids {
            record[offset..offset + 2].copy_from_slice(&id.to_be_bytes());
            offset += 2;
        }
        record
    }

    fn from_record(record: &[u8; STRUCT_RECORD_SIZE]) -> Self {
        let structure_id = u16::from_be_bytes([record[0], record[1]]);
        let collection_interval =
            u32::from_be_bytes([record[2], record[3], record[4], record[5]]);
        let periodic_enabled = u16::from_be_bytes([record[6], record[7]]) == 1;
        let count = usize::from(u16::from_be_bytes([record[8], record[9]]));
        let mut parameter_ids = Vec::new();
        let mut offset = 10;
        for _ in 0..count.min(ECSS_MAX_SIMPLY_COMMUTATED_PARAMETERS) {
            let _ = parameter_ids.push(u16::from_be_bytes([record[offset], record[offset + 1]]));
            offset += 2;
        }
        HousekeepingStructure {
            structure_id,
            collection_interval,
            periodic_enabled,
            parameter_ids,
        }
    }
}

#[derive(Debug, Default)]
pub struct HousekeepingService;

impl HousekeepingService {
    /// Read the structure stored in one slot. Read failures are treated as
    /// an absent slot.
    pub fn read_structure(
        &self,
        ctx: &mut ServiceContext<'_>,
        slot: usize,
    ) -> HousekeepingStructure {
        let mut record = [0u8; STRUCT_RECORD_SIZE];
        match ctx.store.read_from_file(
            files::HK_STRUCTS,
            &mut record,
            slot as u32,
            slot as u32 + 1,
        ) {
            Ok(_) => HousekeepingStructure::from_record(&record),
            Err(e) => {
                log::debug!("[HOUSEKEEPING_STRUCT] slot {slot} unreadable ({e:?}), treating as empty");
                HousekeepingStructure::default()
            }
        }
    }

    fn write_structure(
        &self,
        ctx: &mut ServiceContext<'_>,
        slot: usize,
        structure: &HousekeepingStructure,
    ) -> Result<(), SpacecraftError> {
        let record = structure.to_record();
        ctx.store
            .write_at_block(files::HK_STRUCTS, &record, slot as u32)
            .map_err(|e| {
                log::error!("[HOUSEKEEPING_STRUCT] error saving housekeeping struct {slot}");
                SpacecraftError::from(e)
            })
    }

    /// Scan the slot array for a structure id.
    pub fn find_structure(
        &self,
        ctx: &mut ServiceContext<'_>,
        structure_id: u16,
    ) -> Option<(usize, HousekeepingStructure)> {
        if structure_id == 0 {
            return None;
        }
        for slot in 0..ECSS_MAX_HOUSEKEEPING_STRUCTURES {
            let structure = self.read_structure(ctx, slot);
            if structure.structure_id == structure_id {
                return Some((slot, structure));
            }
        }
        None
    }

    /// TC[3,1] create a housekeeping report structure.
    fn create_structure(&self, ctx: &mut ServiceContext<'_>, request: &mut Message) {
        if !verification::guard_tc(
            ctx,
            request,
            SERVICE_TYPE,
            MessageType::CreateHousekeepingReportStructure as u8,
        ) {
            return;
        }
        let parsed = (|| -> Result<HousekeepingStructure, SpacecraftError> {
            let structure_id = request.read_u16()?;
            let collection_interval = request.read_u32()?;
            let count = request.read_u16()?;
            let mut structure = HousekeepingStructure {
                structure_id,
                collection_interval,
                periodic_enabled: false,
                parameter_ids: Vec::new(),
            };
            for _ in 0..count {
                let parameter_id = request.read_u16()?;
                if structure.parameter_ids.len() < ECSS_MAX_SIMPLY_COMMUTATED_PARAMETERS {
                    let _ = structure.parameter_ids.push(parameter_id);
                }
            }
            Ok(structure)
        })();
        let structure = match parsed {
            Ok(structure) => structure,
            Err(e) => {
                verification::fail_acceptance(ctx, request, e);
                return;
            }
        };
        if structure.structure_id == 0 {
            verification::fail_start(ctx, request, SpacecraftError::InvalidArgument);
            return;
        }
        let slot = usize::from(structure.structure_id) % ECSS_MAX_HOUSEKEEPING_STRUCTURES;
        if self.write_structure(ctx, slot, &structure).is_err() {
            verification::fail_completion(ctx, request, SpacecraftError::MemoryWriteError);
        }
    }

    /// TC[3,3] delete housekeeping report structures. A structure with
    /// periodic generation enabled is protected.
    fn delete_structures(&self, ctx: &mut ServiceContext<'_>, request: &mut Message) {
        if !verification::guard_tc(
            ctx,
            request,
            SERVICE_TYPE,
            MessageType::DeleteHousekeepingReportStructure as u8,
        ) {
            return;
        }
        let count = match request.read_u8() {
            Ok(count) => count,
            Err(e) => {
                verification::fail_acceptance(ctx, request, e);
                return;
            }
        };
        for _ in 0..count {
            let structure_id = match request.read_u16() {
                Ok(id) => id,
                Err(e) => {
                    verification::fail_acceptance(ctx, request, e);
                    return;
                }
            };
            match self.find_structure(ctx, structure_id) {
                None => {
                    verification::fail_start(
                        ctx,
                        request,
                        SpacecraftError::RequestedNonExistingStructure,
                    );
                }
                Some((_, structure)) if structure.periodic_enabled => {
                    verification::fail_start(
                        ctx,
                        request,
                        SpacecraftError::RequestedDeletionOfEnabledHousekeeping,
                    );
                }
                Some((slot, _)) => {
                    let _ = self.write_structure(ctx, slot, &HousekeepingStructure::default());
                }
            }
        }
    }

    /// TC[3,5] / TC[3,6] enable or disable periodic generation.
    fn set_periodic(&self, ctx: &mut ServiceContext<'_>, request: &mut Message, enable: bool) {
        let expected = if enable {
            MessageType::EnablePeriodicHousekeepingParametersReport
        } else {
            MessageType::DisablePeriodicHousekeepingParametersReport
        };
        if !verification::guard_tc(ctx, request, SERVICE_TYPE, expected as u8) {
            return;
        }
        let count = match request.read_u8() {
            Ok(count) => count,
            Err(e) => {
                verification::fail_acceptance(ctx, request, e);
                return;
            }
        };
        for _ in 0..count {
            let structure_id = match request.read_u16() {
                Ok(id) => id,
                Err(e) => {
                    verification::fail_acceptance(ctx, request, e);
                    return;
                }
            };
            match self.find_structure(ctx, structure_id) {
                Some((slot, mut structure)) => {
                    structure.periodic_enabled = enable;
                    let _ = self.write_structure(ctx, slot, &structure);
                }
                None => {
                    verification::fail_start(
                        ctx,
                        request,
                        SpacecraftError::RequestedNonExistingStructure,
                    );
                }
            }
        }
    }

    /// TC[3,9] report structure definitions with TM[3,10].
    fn report_structures(&self, ctx: &mut ServiceContext<'_>, request: &mut Message) {
        if !verification::guard_tc(
            ctx,
            request,
            SERVICE_TYPE,
            MessageType::ReportHousekeepingStructures as u8,
        ) {
            return;
        }
        let count = match request.read_u8() {
            Ok(count) => count,
            Err(e) => {
                verification::fail_acceptance(ctx, request, e);
                return;
            }
        };
        for _ in 0..count {
            let structure_id = match request.read_u16() {
                Ok(id) => id,
                Err(e) => {
                    verification::fail_acceptance(ctx, request, e);
                    return;
                }
            };
            if !self.structure_report(ctx, structure_id) {
                verification::fail_start(
                    ctx,
                    request,
                    SpacecraftError::RequestedNonExistingStructure,
                );
            }
        }
    }

    /// TM[3,10] housekeeping structure report for one id.
    fn structure_report(&self, ctx: &mut ServiceContext<'_>, structure_id: u16) -> bool {
        let Some((_, structure)) = self.find_structure(ctx, structure_id) else {
            return false;
        };
        let mut report = create_tm(SERVICE_TYPE, MessageType::HousekeepingStructuresReport as u8);
        let mut assembled = report
            .append_u16(structure_id)
            .and_then(|()| report.append_bool(structure.periodic_enabled))
            .and_then(|()| report.append_u32(structure.collection_interval))
            .and_then(|()| report.append_u16(structure.parameter_ids.len() as u16));
        for id in &structure.parameter_ids {
            if assembled.is_err() {
                break;
            }
            assembled = report.append_u16(*id);
        }
        if let Err(e) = assembled {
            log::error!("[HOUSEKEEPING] failed to assemble structure report: {e}");
            return true;
        }
        store_tm(ctx, report);
        true
    }

    /// TM[3,25] housekeeping parameters report: the structure id followed by
    /// the current value of each parameter in its declared type.
    pub fn parameters_report(&self, ctx: &mut ServiceContext<'_>, structure_id: u16) {
        let Some((_, structure)) = self.find_structure(ctx, structure_id) else {
            return;
        };
        let mut report = create_tm(SERVICE_TYPE, MessageType::HousekeepingParametersReport as u8);
        if report.append_u16(structure_id).is_err() {
            return;
        }
        for &parameter_id in &structure.parameter_ids {
            if let Err(e) = parameter::append_parameter_to_message(ctx, &mut report, parameter_id)
            {
                log::error!(
                    "[HOUSEKEEPING] could not sample parameter {parameter_id}: {e}"
                );
            }
        }
        store_tm(ctx, report);
    }

    /// TC[3,27] generate one-shot housekeeping reports.
    fn one_shot_report(&self, ctx: &mut ServiceContext<'_>, request: &mut Message) {
        if !verification::guard_tc(
            ctx,
            request,
            SERVICE_TYPE,
            MessageType::GenerateOneShotHousekeepingReport as u8,
        ) {
            return;
        }
        let count = match request.read_u8() {
            Ok(count) => count,
            Err(e) => {
                verification::fail_acceptance(ctx, request, e);
                return;
            }
        };
        for _ in 0..count {
            match request.read_u16() {
                Ok(structure_id) => self.parameters_report(ctx, structure_id),
                Err(e) => {
                    verification::fail_acceptance(ctx, request, e);
                    return;
                }
            }
        }
    }

    /// TC[3,29] append parameters to an existing structure. Duplicates and
    /// unknown parameters are skipped without rejecting the whole request.
    fn append_parameters(&self, ctx: &mut ServiceContext<'_>, request: &mut Message) {
        if !verification::guard_tc(
            ctx,
            request,
            SERVICE_TYPE,
            MessageType::AppendParametersToHousekeepingStructure as u8,
        ) {
            return;
        }
        let structure_id = match request.read_u16() {
            Ok(id) => id,
            Err(e) => {
                verification::fail_acceptance(ctx, request, e);
                return;
            }
        };
        let Some((slot, mut structure)) = self.find_structure(ctx, structure_id) else {
            verification::fail_start(ctx, request, SpacecraftError::RequestedNonExistingStructure);
            return;
        };
        if structure.periodic_enabled {
            verification::fail_start(
                ctx,
                request,
                SpacecraftError::RequestedAppendToEnabledHousekeeping,
            );
            return;
        }
        let count = match request.read_u16() {
            Ok(count) => count,
            Err(e) => {
                verification::fail_acceptance(ctx, request, e);
                return;
            }
        };
        for _ in 0..count {
            let parameter_id = match request.read_u16() {
                Ok(id) => id,
                Err(e) => {
                    verification::fail_acceptance(ctx, request, e);
                    return;
                }
            };
            if structure.parameter_ids.is_full() {
                verification::fail_start(
                    ctx,
                    request,
                    SpacecraftError::ExceededMaxNumberOfSimplyCommutatedParameters,
                );
                break;
            }
            if !ctx.registry.exists(parameter_id) {
                verification::fail_start(ctx, request, SpacecraftError::NonExistingParameter);
                continue;
            }
            if structure.parameter_ids.contains(&parameter_id) {
                continue;
            }
            let _ = structure.parameter_ids.push(parameter_id);
        }
        let _ = self.write_structure(ctx, slot, &structure);
    }

    /// TC[3,31] modify collection intervals.
    fn modify_intervals(&self, ctx: &mut ServiceContext<'_>, request: &mut Message) {
        if !verification::guard_tc(
            ctx,
            request,
            SERVICE_TYPE,
            MessageType::ModifyCollectionIntervalOfStructures as u8,
        ) {
            return;
        }
        let count = match request.read_u8() {
            Ok(count) => count,
            Err(e) => {
                verification::fail_acceptance(ctx, request, e);
                return;
            }
        };
        for _ in 0..count {
            let parsed = request
                .read_u16()
                .and_then(|id| Ok((id, request.read_u32()?)));
            let (structure_id, interval) = match parsed {
                Ok(pair) => pair,
                Err(e) => {
                    verification::fail_acceptance(ctx, request, e);
                    return;
                }
            };
            match self.find_structure(ctx, structure_id) {
                Some((slot, mut structure)) => {
                    structure.collection_interval = interval;
                    let _ = self.write_structure(ctx, slot, &structure);
                }
                None => {
                    verification::fail_start(
                        ctx,
                        request,
                        SpacecraftError::RequestedNonExistingStructure,
                    );
                }
            }
        }
    }

    /// TC[3,33] report periodic generation properties with TM[3,35].
    fn report_periodic_properties(&self, ctx: &mut ServiceContext<'_>, request: &mut Message) {
        if !verification::guard_tc(
            ctx,
            request,
            SERVICE_TYPE,
            MessageType::ReportHousekeepingPeriodicProperties as u8,
        ) {
            return;
        }
        let count = match request.read_u8() {
            Ok(count) => count,
            Err(e) => {
                verification::fail_acceptance(ctx, request, e);
                return;
            }
        };
        let mut valid = 0u8;
        for _ in 0..count {
            match request.read_u16() {
                Ok(id) if self.find_structure(ctx, id).is_some() => valid += 1,
                Ok(_) => {}
                Err(e) => {
                    verification::fail_acceptance(ctx, request, e);
                    return;
                }
            }
        }

        let mut report = create_tm(
            SERVICE_TYPE,
            MessageType::HousekeepingPeriodicPropertiesReport as u8,
        );
        if report.append_u8(valid).is_err() {
            return;
        }
        request.reset_read();
        let count = request.read_u8().unwrap_or(0);
        for _ in 0..count {
            let Ok(structure_id) = request.read_u16() else {
                break;
            };
            let Some((_, structure)) = self.find_structure(ctx, structure_id) else {
                continue;
            };
            let assembled = report
                .append_u16(structure_id)
                .and_then(|()| report.append_bool(structure.periodic_enabled))
                .and_then(|()| report.append_u32(structure.collection_interval));
            if let Err(e) = assembled {
                log::error!("[HOUSEKEEPING] failed to assemble periodic properties: {e}");
                return;
            }
        }
        store_tm(ctx, report);
    }

    pub fn execute(&mut self, ctx: &mut ServiceContext<'_>, message: &mut Message) {
        match MessageType::try_from(message.message_type) {
            Ok(MessageType::CreateHousekeepingReportStructure) => {
                self.create_structure(ctx, message)
            }
            Ok(MessageType::DeleteHousekeepingReportStructure) => {
                self.delete_structures(ctx, message)
            }
            Ok(MessageType::EnablePeriodicHousekeepingParametersReport) => {
                self.set_periodic(ctx, message, true)
            }
            Ok(MessageType::DisablePeriodicHousekeepingParametersReport) => {
                self.set_periodic(ctx, message, false)
            }
            Ok(MessageType::ReportHousekeepingStructures) => self.report_structures(ctx, message),
            Ok(MessageType::GenerateOneShotHousekeepingReport) => {
                self.one_shot_report(ctx, message)
            }
            Ok(MessageType::AppendParametersToHousekeepingStructure) => {
                self.append_parameters(ctx, message)
            }
            Ok(MessageType::ModifyCollectionIntervalOfStructures) => {
                self.modify_intervals(ctx, message)
            }
            Ok(MessageType::ReportHousekeepingPeriodicProperties) => {
                self.report_periodic_properties(ctx, message)
            }
            _ => {
                log::error!(
                    "[HOUSEKEEPING] unexpected message type [3,{}]",
                    message.message_type
                );
                verification::fail_acceptance(ctx, message, SpacecraftError::OtherMessageType);
            }
        }
    }

    /// Periodic tick: emit TM[3,25] for every enabled structure whose
    /// interval is due, and return the earliest next collection time.
    ///
    /// A structure is due when the current epoch second is a multiple of its
    /// interval, or when the previous tick plus the expected tick delay
    /// lands on a multiple (so a late tick does not lose a cycle). Interval
    /// zero reports on every tick.
    pub fn report_pending(
        &self,
        ctx: &mut ServiceContext<'_>,
        now: UtcTimestamp,
        previous: UtcTimestamp,
        expected_delay: Duration,
    ) -> UtcTimestamp {
        let mut next_collection = UtcTimestamp::MAX;
        for slot in 0..ECSS_MAX_HOUSEKEEPING_STRUCTURES {
            let structure = self.read_structure(ctx, slot);
            if structure.is_absent() || !structure.periodic_enabled {
                continue;
            }
            if structure.collection_interval == 0 {
                self.parameters_report(ctx, structure.structure_id);
                next_collection = now;
                continue;
            }
            let current_seconds = now.to_epoch_seconds();
            let previous_seconds = previous.to_epoch_seconds();
            let delay_seconds = expected_delay.as_secs();
            let interval = u64::from(structure.collection_interval);

            if current_seconds != 0
                && (current_seconds % interval == 0
                    || (previous_seconds + delay_seconds) % interval == 0)
            {
                self.parameters_report(ctx, structure.structure_id);
            }

            let seconds_until_next = interval - current_seconds % interval;
            let structure_next = now + Duration::from_secs(seconds_until_next);
            if next_collection > structure_next {
                next_collection = structure_next;
            }
        }
        next_collection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::ParameterValue;
    use crate::testutil::Harness;

    fn create_request(id: u16, interval: u32, ids: &[u16]) -> Message {
        let mut request = Message::tc(3, 1, 1);
        request.append_u16(id).unwrap();
        request.append_u32(interval).unwrap();
        request.append_u16(ids.len() as u16).unwrap();
        for &param in ids {
            request.append_u16(param).unwrap();
        }
        request
    }

    fn enable_request(ids: &[u16]) -> Message {
        let mut request = Message::tc(3, 5, 1);
        request.append_u8(ids.len() as u8).unwrap();
        for &id in ids {
            request.append_u16(id).unwrap();
        }
        request
    }

    #[test]
    fn test_create_persists_in_slot() {
        let mut harness = Harness::new();
        let service = HousekeepingService;
        let mut request = create_request(1, 2, &[100, 101]);
        let mut ctx = harness.ctx();
        service.create_structure(&mut ctx, &mut request);

        let mut ctx = harness.ctx();
        let stored = service.read_structure(&mut ctx, 1);
        assert_eq!(stored.structure_id, 1);
        assert_eq!(stored.collection_interval, 2);
        assert!(!stored.periodic_enabled);
        assert_eq!(stored.parameter_ids.as_slice(), &[100, 101]);
    }

    #[test]
    fn test_create_delete_symmetry() {
        let mut harness = Harness::new();
        let service = HousekeepingService;
        let mut request = create_request(4, 10, &[7]);
        let mut ctx = harness.ctx();
        service.create_structure(&mut ctx, &mut request);

        let mut delete = Message::tc(3, 3, 1);
        delete.append_u8(1).unwrap();
        delete.append_u16(4).unwrap();
        let mut ctx = harness.ctx();
        service.delete_structures(&mut ctx, &mut delete);

        let mut ctx = harness.ctx();
        let slot = service.read_structure(&mut ctx, 4);
        assert_eq!(slot, HousekeepingStructure::default());
    }

    #[test]
    fn test_delete_rejects_enabled_structure() {
        let mut harness = Harness::new();
        let service = HousekeepingService;
        let mut request = create_request(4, 10, &[7]);
        let mut ctx = harness.ctx();
        service.create_structure(&mut ctx, &mut request);
        let mut enable = enable_request(&[4]);
        let mut ctx = harness.ctx();
        service.set_periodic(&mut ctx, &mut enable, true);

        let mut delete = Message::tc(3, 3, 1);
        delete.append_u8(1).unwrap();
        delete.append_u16(4).unwrap();
        let mut ctx = harness.ctx();
        service.delete_structures(&mut ctx, &mut delete);

        let mut ctx = harness.ctx();
        assert!(service.find_structure(&mut ctx, 4).is_some());
        let reports = harness.downlink.parsed();
        let fail = reports.last().unwrap();
        assert_eq!(fail.service_type, 1);
        assert_eq!(fail.message_type, 4);
        assert_eq!(
            &fail.payload()[fail.payload().len() - 2..],
            &u16::from(SpacecraftError::RequestedDeletionOfEnabledHousekeeping).to_be_bytes()
        );
    }

    #[test]
    fn test_structure_report() {
        let mut harness = Harness::new();
        let service = HousekeepingService;
        let mut request = create_request(9, 60, &[5, 6]);
        let mut ctx = harness.ctx();
        service.create_structure(&mut ctx, &mut request);

        let mut report_request = Message::tc(3, 9, 1);
        report_request.append_u8(1).unwrap();
        report_request.append_u16(9).unwrap();
        let mut ctx = harness.ctx();
        service.report_structures(&mut ctx, &mut report_request);

        let reports = harness.downlink.parsed();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].message_type, 10);
        assert_eq!(
            reports[0].payload(),
            &[0, 9, 0, 0, 0, 0, 60, 0, 2, 0, 5, 0, 6]
        );
    }

    #[test]
    fn test_one_shot_report_samples_registry() {
        let mut harness = Harness::new();
        harness.registry.register(100, ParameterValue::U16(0x1234));
        harness.registry.register(101, ParameterValue::U8(0x56));
        let service = HousekeepingService;
        let mut request = create_request(1, 2, &[100, 101]);
        let mut ctx = harness.ctx();
        service.create_structure(&mut ctx, &mut request);

        let mut one_shot = Message::tc(3, 27, 1);
        one_shot.append_u8(1).unwrap();
        one_shot.append_u16(1).unwrap();
        let mut ctx = harness.ctx();
        service.one_shot_report(&mut ctx, &mut one_shot);

        let reports = harness.downlink.parsed();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].message_type, 25);
        assert_eq!(reports[0].payload(), &[0x00, 0x01, 0x12, 0x34, 0x56]);
    }

    #[test]
    fn test_append_skips_duplicates_and_unknown() {
        let mut harness = Harness::new();
        harness.registry.register(100, ParameterValue::U16(1));
        harness.registry.register(102, ParameterValue::U8(2));
        let service = HousekeepingService;
        let mut request = create_request(1, 2, &[100]);
        let mut ctx = harness.ctx();
        service.create_structure(&mut ctx, &mut request);

        let mut append = Message::tc(3, 29, 1);
        append.append_u16(1).unwrap();
        append.append_u16(3).unwrap();
        append.append_u16(100).unwrap(); // duplicate
        append.append_u16(999).unwrap(); // not in the registry
        append.append_u16(102).unwrap(); // appended
        let mut ctx = harness.ctx();
        service.append_parameters(&mut ctx, &mut append);

        let mut ctx = harness.ctx();
        let stored = service.read_structure(&mut ctx, 1);
        assert_eq!(stored.parameter_ids.as_slice(), &[100, 102]);
    }

    #[test]
    fn test_append_rejected_while_periodic() {
        let mut harness = Harness::new();
        harness.registry.register(100, ParameterValue::U16(1));
        let service = HousekeepingService;
        let mut request = create_request(1, 2, &[100]);
        let mut ctx = harness.ctx();
        service.create_structure(&mut ctx, &mut request);
        let mut enable = enable_request(&[1]);
        let mut ctx = harness.ctx();
        service.set_periodic(&mut ctx, &mut enable, true);

        let mut append = Message::tc(3, 29, 1);
        append.append_u16(1).unwrap();
        append.append_u16(1).unwrap();
        append.append_u16(102).unwrap();
        let mut ctx = harness.ctx();
        service.append_parameters(&mut ctx, &mut append);

        let mut ctx = harness.ctx();
        let stored = service.read_structure(&mut ctx, 1);
        assert_eq!(stored.parameter_ids.as_slice(), &[100]);
    }

    #[test]
    fn test_periodic_properties_report() {
        let mut harness = Harness::new();
        let service = HousekeepingService;
        let mut request = create_request(2, 30, &[]);
        let mut ctx = harness.ctx();
        service.create_structure(&mut ctx, &mut request);

        let mut props = Message::tc(3, 33, 1);
        props.append_u8(2).unwrap();
        props.append_u16(2).unwrap();
        props.append_u16(77).unwrap(); // absent
        let mut ctx = harness.ctx();
        service.report_periodic_properties(&mut ctx, &mut props);

        let reports = harness.downlink.parsed();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].message_type, 35);
        assert_eq!(reports[0].payload(), &[1, 0, 2, 0, 0, 0, 0, 30]);
    }

    #[test]
    fn test_periodic_tick_cadence() {
        let mut harness = Harness::new();
        harness.registry.register(100, ParameterValue::U16(0x1234));
        harness.registry.register(101, ParameterValue::U8(0x56));
        let service = HousekeepingService;
        let mut request = create_request(1, 2, &[100, 101]);
        let mut ctx = harness.ctx();
        service.create_structure(&mut ctx, &mut request);
        let mut enable = enable_request(&[1]);
        let mut ctx = harness.ctx();
        service.set_periodic(&mut ctx, &mut enable, true);

        // Even epoch second: due. The next collection is two seconds later.
        let now = UtcTimestamp::from_epoch_seconds(1_000_000);
        let prev = UtcTimestamp::from_epoch_seconds(999_999);
        let mut ctx = harness.ctx();
        let next = service.report_pending(&mut ctx, now, prev, Duration::from_secs(1));
        assert_eq!(next.to_epoch_seconds(), 1_000_002);

        // Odd epoch second and no missed boundary: not due.
        let now = UtcTimestamp::from_epoch_seconds(1_000_001);
        let prev = UtcTimestamp::from_epoch_seconds(1_000_000);
        let mut ctx = harness.ctx();
        service.report_pending(&mut ctx, now, prev, Duration::from_secs(3));

        let reports = harness.downlink.parsed();
        let hk: usize = reports.iter().filter(|r| r.message_type == 25).count();
        assert_eq!(hk, 1);
        assert_eq!(
            reports
                .iter()
                .find(|r| r.message_type == 25)
                .unwrap()
                .payload(),
            &[0x00, 0x01, 0x12, 0x34, 0x56]
        );
    }
}
