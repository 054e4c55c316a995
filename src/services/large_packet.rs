//! ST[13] large packet transfer.
//!
//! Uplink reassembly is a three-state machine per transaction: a first part
//! carries the target filename and total size, intermediate parts carry
//! exactly one fixed octet-string of data each, the last part closes the
//! transfer. All transfer state (transaction id, received sequence number,
//! discontinuity counter, announced size) is persisted in the parameter
//! registry, so a reboot resumes from the last accepted part. Part payloads
//! land in the backing file at `PART_SIZE × (seq − 1)`; firmware transactions
//! pack four parts per flash page and flush the page on the fourth or last
//! part.
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::SpacecraftError;
use crate::mem::{params, ParameterId, ParameterValue};
use crate::message::Message;
use crate::services::{create_tm, store_tm, verification, ServiceContext};
use crate::{ECSS_MAX_FIXED_OCTET_STRING_SIZE, MRAM_DATA_BLOCK_SIZE};

pub const SERVICE_TYPE: u8 = 13;

/// MRAM blocks occupied by one full part.
const BLOCKS_PER_PART: u32 =
    (ECSS_MAX_FIXED_OCTET_STRING_SIZE / (MRAM_DATA_BLOCK_SIZE - 1)) as u32;

/// Uplink part payload size. Intermediate parts carry exactly this many
/// bytes; the last part may carry fewer.
pub const PART_SIZE: usize = ECSS_MAX_FIXED_OCTET_STRING_SIZE;
/// Length of the fixed filename field of a first uplink part.
pub const MAX_FILENAME: usize = 10;
/// Firmware parts buffered per internal-flash page.
pub const FLASH_PARTS_PER_PAGE: usize = 4;

#[derive(Debug, Eq, PartialEq, Copy, Clone, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum MessageType {
    FirstDownlinkPartReport = 1,
    IntermediateDownlinkPartReport = 2,
    LastDownlinkPartReport = 3,
    FirstUplinkPart = 9,
    IntermediateUplinkPart = 10,
    LastUplinkPart = 11,
    UplinkAborted = 16,
}

/// Recognized uplink transaction identifiers.
#[derive(Debug, Eq, PartialEq, Copy, Clone, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum UplinkTransactionId {
    AtlasMcuFirmware = 70,
    AtlasSoftCpuFirmware = 80,
    AtlasBitstream = 90,
    ScheduledTc = 130,
    ObcFirmware = 140,
}

impl UplinkTransactionId {
    /// Backing file of the transaction.
    pub fn filename(self) -> &'static str {
        match self {
            UplinkTransactionId::AtlasMcuFirmware => "MCU_FW____",
            UplinkTransactionId::AtlasSoftCpuFirmware => "SCPU_FW___",
            UplinkTransactionId::AtlasBitstream => "BITSTREAM_",
            UplinkTransactionId::ScheduledTc => crate::mem::files::SCHED_TC,
            UplinkTransactionId::ObcFirmware => "OBC_FW____",
        }
    }

    fn from_filename(name: &[u8; MAX_FILENAME]) -> Option<Self> {
        [
            UplinkTransactionId::AtlasMcuFirmware,
            UplinkTransactionId::AtlasSoftCpuFirmware,
            UplinkTransactionId::AtlasBitstream,
            UplinkTransactionId::ScheduledTc,
            UplinkTransactionId::ObcFirmware,
        ]
        .into_iter()
        .find(|id| {
            let filename = id.filename().as_bytes();
            name[..filename.len()] == *filename && name[filename.len()..].iter().all(|&b| b == 0)
        })
    }

    /// Firmware transactions target the internal flash and are paged.
    pub fn is_firmware(self) -> bool {
        !matches!(self, UplinkTransactionId::ScheduledTc)
    }
}

pub struct LargePacketTransferService {
    page_buffer: [u8; FLASH_PARTS_PER_PAGE * PART_SIZE],
    page_fill: usize,
}

impl Default for LargePacketTransferService {
    fn default() -> Self {
        LargePacketTransferService {
            page_buffer: [0; FLASH_PARTS_PER_PAGE * PART_SIZE],
            page_fill: 0,
        }
    }
}

impl LargePacketTransferService {
    fn get_u32(
        &self,
        ctx: &mut ServiceContext<'_>,
        request: &Message,
        id: ParameterId,
    ) -> Option<u32> {
        match ctx.registry.get(id) {
            Ok(value) => match value.as_u32() {
                Some(v) => Some(v),
                None => {
                    verification::fail_acceptance(ctx, request, SpacecraftError::MemoryCorrupted);
                    None
                }
            },
            Err(e) => {
                verification::fail_acceptance(ctx, request, e.into());
                None
            }
        }
    }

    fn set_param(
        &self,
        ctx: &mut ServiceContext<'_>,
        request: &Message,
        id: ParameterId,
        value: ParameterValue,
    ) -> bool {
        if let Err(e) = ctx.registry.set(id, value) {
            verification::fail_acceptance(ctx, request, e.into());
            return false;
        }
        true
    }

    /// Read and validate the transaction id field common to all uplink
    /// parts.
    fn read_transaction(
        &self,
        ctx: &mut ServiceContext<'_>,
        request: &mut Message,
    ) -> Option<UplinkTransactionId> {
        let raw = match request.read_u16() {
            Ok(raw) => raw,
            Err(e) => {
                verification::fail_acceptance(ctx, request, e);
                return None;
            }
        };
        match UplinkTransactionId::try_from(raw) {
            Ok(id) => Some(id),
            Err(_) => {
                log::warn!("[LARGE_PACKET] unknown uplink transaction id {raw}");
                verification::fail_acceptance(ctx, request, SpacecraftError::InvalidArgument);
                None
            }
        }
    }

    /// Check that an intermediate/last part belongs to the transaction
    /// opened by the first part.
    fn validate_stored_transaction(
        &self,
        ctx: &mut ServiceContext<'_>,
        request: &Message,
        expected: UplinkTransactionId,
    ) -> bool {
        let stored = match ctx.registry.get(params::LFT_TRANSACTION_ID) {
            Ok(value) => value.as_u16(),
            Err(e) => {
                verification::fail_acceptance(ctx, request, e.into());
                return false;
            }
        };
        if stored != Some(expected as u16) {
            verification::fail_acceptance(ctx, request, SpacecraftError::InvalidArgument);
            return false;
        }
        true
    }

    /// TC[13,9] first uplink part: `transaction ‖ seq(=0) ‖ filename[10] ‖
    /// size(u32)`. Opens the transfer and resets the persisted counters.
    fn first_uplink_part(&mut self, ctx: &mut ServiceContext<'_>, request: &mut Message) {
        if !verification::guard_tc(ctx, request, SERVICE_TYPE, MessageType::FirstUplinkPart as u8)
        {
            return;
        }
        let Some(transaction) = self.read_transaction(ctx, request) else {
            return;
        };
        let part_seq = match request.read_u16() {
            Ok(seq) => seq,
            Err(e) => {
                verification::fail_acceptance(ctx, request, e);
                return;
            }
        };
        if part_seq != 0 {
            verification::fail_acceptance(ctx, request, SpacecraftError::InvalidArgument);
            return;
        }
        let mut filename = [0u8; MAX_FILENAME];
        let parsed = request
            .read_bytes(&mut filename)
            .and_then(|()| request.read_u32());
        let size = match parsed {
            Ok(size) => size,
            Err(e) => {
                verification::fail_acceptance(ctx, request, e);
                return;
            }
        };

        if UplinkTransactionId::from_filename(&filename) != Some(transaction) {
            // The announced filename disagrees with the transaction id.
            let _ = ctx
                .registry
                .set(params::LFT_COUNT, ParameterValue::U32(0));
            verification::fail_acceptance(ctx, request, SpacecraftError::InvalidArgument);
            return;
        }

        if !self.set_param(
            ctx,
            request,
            params::LFT_TRANSACTION_ID,
            ParameterValue::U16(transaction as u16),
        ) {
            return;
        }
        if !self.set_param(ctx, request, params::LFT_UPLINK_SIZE, ParameterValue::U32(size)) {
            return;
        }
        if !self.set_param(ctx, request, params::LFT_COUNT, ParameterValue::U32(0)) {
            return;
        }
        if !self.set_param(ctx, request, params::LFT_SEQUENCE_NUM, ParameterValue::U32(0)) {
            return;
        }
        self.page_fill = 0;

        log::info!(
            "[LARGE_PACKET] transfer {transaction:?} opened, {size} bytes announced"
        );
        verification::success_acceptance(ctx, request);
    }

    /// Sequence continuity check shared by intermediate and last parts. On a
    /// gap the discontinuity counter is bumped and the part is refused.
    fn validate_sequence(
        &self,
        ctx: &mut ServiceContext<'_>,
        request: &Message,
        part_seq: u16,
    ) -> bool {
        let Some(stored) = self.get_u32(ctx, request, params::LFT_SEQUENCE_NUM) else {
            return false;
        };
        if stored + 1 == u32::from(part_seq) {
            return true;
        }
        log::warn!(
            "[LARGE_PACKET] sequence discontinuity: expected {}, got {part_seq}",
            stored + 1
        );
        if let Some(discontinuities) =
            self.get_u32(ctx, request, params::LFT_DISCONTINUITY_COUNTER)
        {
            let _ = ctx.registry.set(
                params::LFT_DISCONTINUITY_COUNTER,
                ParameterValue::U32(discontinuities + 1),
            );
        }
        verification::fail_progress(
            ctx,
            request,
            SpacecraftError::InvalidArgument,
            part_seq.min(u16::from(u8::MAX)) as u8,
        );
        false
    }

    /// Write one data part at its slot in the backing store. Data parts are
    /// numbered from 1, so part `seq` starts at byte `PART_SIZE × (seq−1)`.
    fn write_part(
        &mut self,
        ctx: &mut ServiceContext<'_>,
        transaction: UplinkTransactionId,
        part_seq: u16,
        data: &[u8],
        is_last: bool,
    ) -> Result<(), SpacecraftError> {
        let part_index = u32::from(part_seq) - 1;
        if !transaction.is_firmware() {
            return ctx
                .store
                .write_at_block(transaction.filename(), data, BLOCKS_PER_PART * part_index)
                .map_err(SpacecraftError::from);
        }

        // Firmware path: pack parts into the page buffer and flush a whole
        // page on the fourth or the last part.
        let offset_in_page = (part_index as usize % FLASH_PARTS_PER_PAGE) * PART_SIZE;
        self.page_buffer[offset_in_page..offset_in_page + data.len()].copy_from_slice(data);
        self.page_fill = offset_in_page + data.len();
        if part_index as usize % FLASH_PARTS_PER_PAGE == FLASH_PARTS_PER_PAGE - 1 || is_last {
            let page_index = part_index / FLASH_PARTS_PER_PAGE as u32;
            let filled = self.page_fill;
            self.page_fill = 0;
            return ctx
                .store
                .write_at_block(
                    transaction.filename(),
                    &self.page_buffer[..filled],
                    page_index * FLASH_PARTS_PER_PAGE as u32 * BLOCKS_PER_PART,
                )
                .map_err(SpacecraftError::from);
        }
        Ok(())
    }

    /// TC[13,10] intermediate uplink part: `transaction ‖ seq ‖ data[127]`.
    fn intermediate_uplink_part(&mut self, ctx: &mut ServiceContext<'_>, request: &mut Message) {
        if !verification::guard_tc(
            ctx,
            request,
            SERVICE_TYPE,
            MessageType::IntermediateUplinkPart as u8,
        ) {
            return;
        }
        let Some(transaction) = self.read_transaction(ctx, request) else {
            return;
        };
        if !self.validate_stored_transaction(ctx, request, transaction) {
            return;
        }
        let part_seq = match request.read_u16() {
            Ok(seq) => seq,
            Err(e) => {
                verification::fail_acceptance(ctx, request, e);
                return;
            }
        };
        if request.remaining().len() != PART_SIZE {
            verification::fail_acceptance(ctx, request, SpacecraftError::InvalidArgument);
            return;
        }
        if !self.validate_sequence(ctx, request, part_seq) {
            return;
        }
        let mut data = [0u8; PART_SIZE];
        if request.read_bytes(&mut data).is_err() {
            verification::fail_acceptance(ctx, request, SpacecraftError::MessageTooShort);
            return;
        }
        if let Err(e) = self.write_part(ctx, transaction, part_seq, &data, false) {
            verification::fail_acceptance(ctx, request, e);
            return;
        }
        if !self.set_param(
            ctx,
            request,
            params::LFT_SEQUENCE_NUM,
            ParameterValue::U32(u32::from(part_seq)),
        ) {
            return;
        }
        verification::success_progress(ctx, request, part_seq.min(u16::from(u8::MAX)) as u8);
    }

    /// TC[13,11] last uplink part: like an intermediate part, but the data
    /// may be shorter and the transfer completes afterwards.
    fn last_uplink_part(&mut self, ctx: &mut ServiceContext<'_>, request: &mut Message) {
        if !verification::guard_tc(ctx, request, SERVICE_TYPE, MessageType::LastUplinkPart as u8) {
            return;
        }
        let Some(transaction) = self.read_transaction(ctx, request) else {
            return;
        };
        if !self.validate_stored_transaction(ctx, request, transaction) {
            return;
        }
        let part_seq = match request.read_u16() {
            Ok(seq) => seq,
            Err(e) => {
                verification::fail_acceptance(ctx, request, e);
                return;
            }
        };
        if request.remaining().len() > PART_SIZE {
            verification::fail_acceptance(ctx, request, SpacecraftError::InvalidArgument);
            return;
        }
        if !self.validate_sequence(ctx, request, part_seq) {
            return;
        }
        let mut data = [0u8; PART_SIZE];
        let data_len = request.remaining().len();
        if request.read_bytes(&mut data[..data_len]).is_err() {
            verification::fail_acceptance(ctx, request, SpacecraftError::MessageTooShort);
            return;
        }
        if let Err(e) = self.write_part(ctx, transaction, part_seq, &data[..data_len], true) {
            verification::fail_acceptance(ctx, request, e);
            return;
        }
        if !self.set_param(
            ctx,
            request,
            params::LFT_SEQUENCE_NUM,
            ParameterValue::U32(u32::from(part_seq)),
        ) {
            return;
        }

        if let Some(announced) = self.get_u32(ctx, request, params::LFT_UPLINK_SIZE) {
            let calculated = (PART_SIZE as u32) * u32::from(part_seq);
            if announced != calculated {
                log::warn!(
                    "[LARGE_PACKET] announced size {announced} disagrees with received {calculated}"
                );
            }
        }
        log::info!("[LARGE_PACKET] transfer {transaction:?} complete after {part_seq} parts");
        verification::success_completion(ctx, request);
    }

    /// TM[13,1..3] downlink part reports.
    fn downlink_part_report(
        &self,
        ctx: &mut ServiceContext<'_>,
        report_type: MessageType,
        transaction_id: u16,
        part_seq: u16,
        data: &[u8],
    ) {
        let mut report = create_tm(SERVICE_TYPE, report_type as u8);
        let assembled = report
            .append_u16(transaction_id)
            .and_then(|()| report.append_u16(part_seq))
            .and_then(|()| report.append_octet_string(data));
        if let Err(e) = assembled {
            log::error!("[LARGE_PACKET] failed to assemble downlink part report: {e}");
            return;
        }
        store_tm(ctx, report);
    }

    /// Slice an oversized message into fixed parts and emit the TM[13,1..3]
    /// sequence for it.
    pub fn split(
        &self,
        ctx: &mut ServiceContext<'_>,
        message: &Message,
        transaction_id: u16,
    ) {
        let payload = message.payload();
        let parts: Vec<&[u8]> = payload.chunks(PART_SIZE).collect();
        if parts.len() < 2 {
            log::error!("[LARGE_PACKET] refusing to split a message of a single part");
            return;
        }
        for (index, part) in parts.iter().enumerate() {
            let report_type = if index == 0 {
                MessageType::FirstDownlinkPartReport
            } else if index == parts.len() - 1 {
                MessageType::LastDownlinkPartReport
            } else {
                MessageType::IntermediateDownlinkPartReport
            };
            self.downlink_part_report(ctx, report_type, transaction_id, index as u16, part);
        }
    }

    pub fn execute(&mut self, ctx: &mut ServiceContext<'_>, message: &mut Message) {
        match MessageType::try_from(message.message_type) {
            Ok(MessageType::FirstUplinkPart) => self.first_uplink_part(ctx, message),
            Ok(MessageType::IntermediateUplinkPart) => self.intermediate_uplink_part(ctx, message),
            Ok(MessageType::LastUplinkPart) => self.last_uplink_part(ctx, message),
            _ => {
                log::error!(
                    "[LARGE_PACKET] unexpected message type [13,{}]",
                    message.message_type
                );
                verification::fail_acceptance(ctx, message, SpacecraftError::OtherMessageType);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::ParameterRegistry;
    use crate::testutil::Harness;

    fn first_part(id: u16, filename: &str, size: u32) -> Message {
        let mut request = Message::tc(13, 9, 1);
        request.append_u16(id).unwrap();
        request.append_u16(0).unwrap();
        let mut name = [0u8; MAX_FILENAME];
        name[..filename.len()].copy_from_slice(filename.as_bytes());
        request.append_string(&name).unwrap();
        request.append_u32(size).unwrap();
        request
    }

    fn data_part(message_type: u8, id: u16, seq: u16, data: &[u8]) -> Message {
        let mut request = Message::tc(13, message_type, 1);
        request.append_u16(id).unwrap();
        request.append_u16(seq).unwrap();
        request.append_string(data).unwrap();
        request
    }

    fn harness() -> Harness {
        let mut harness = Harness::new();
        harness.register_lft_parameters();
        harness
    }

    #[test]
    fn test_uplink_happy_path() {
        let mut harness = harness();
        let mut service = LargePacketTransferService::default();

        // The scheduled-TC transaction takes the plain MRAM path.
        let mut first = first_part(130, "SCHED_TC", 381);
        let mut ctx = harness.ctx();
        service.execute(&mut ctx, &mut first);

        let mut part1 = data_part(10, 130, 1, &[b'A'; PART_SIZE]);
        let mut ctx = harness.ctx();
        service.execute(&mut ctx, &mut part1);
        let mut part2 = data_part(10, 130, 2, &[b'B'; PART_SIZE]);
        let mut ctx = harness.ctx();
        service.execute(&mut ctx, &mut part2);
        let mut last = data_part(11, 130, 3, &[b'C'; PART_SIZE]);
        let mut ctx = harness.ctx();
        service.execute(&mut ctx, &mut last);

        let file = harness.store.file_contents("SCHED_TC").unwrap();
        assert_eq!(file.len(), 381);
        assert!(file[..127].iter().all(|&b| b == b'A'));
        assert!(file[127..254].iter().all(|&b| b == b'B'));
        assert!(file[254..].iter().all(|&b| b == b'C'));
        assert_eq!(
            harness.registry.get(params::LFT_SEQUENCE_NUM).unwrap(),
            ParameterValue::U32(3)
        );
        assert_eq!(
            harness.registry.get(params::LFT_DISCONTINUITY_COUNTER).unwrap(),
            ParameterValue::U32(0)
        );

        // Acceptance success, two progress successes, completion success.
        let reports = harness.downlink.parsed();
        let verification_types: Vec<u8> = reports
            .iter()
            .filter(|r| r.service_type == 1)
            .map(|r| r.message_type)
            .collect();
        assert_eq!(verification_types, vec![1, 5, 5, 7]);
    }

    #[test]
    fn test_out_of_order_part_counts_discontinuity() {
        let mut harness = harness();
        let mut service = LargePacketTransferService::default();
        let mut first = first_part(130, "SCHED_TC", 381);
        let mut ctx = harness.ctx();
        service.execute(&mut ctx, &mut first);
        let mut part1 = data_part(10, 130, 1, &[b'A'; PART_SIZE]);
        let mut ctx = harness.ctx();
        service.execute(&mut ctx, &mut part1);

        // Premature last part (sequence 3 while 2 is expected).
        let mut premature = data_part(11, 130, 3, &[b'C'; PART_SIZE]);
        let mut ctx = harness.ctx();
        service.execute(&mut ctx, &mut premature);
        assert_eq!(
            harness.registry.get(params::LFT_DISCONTINUITY_COUNTER).unwrap(),
            ParameterValue::U32(1)
        );
        assert_eq!(
            harness.registry.get(params::LFT_SEQUENCE_NUM).unwrap(),
            ParameterValue::U32(1)
        );
        let reports = harness.downlink.parsed();
        let fail = reports.last().unwrap();
        assert_eq!((fail.service_type, fail.message_type), (1, 6));
        assert_eq!(fail.payload()[6], 3); // step id

        // The in-order part 2 still goes through.
        let mut part2 = data_part(10, 130, 2, &[b'B'; PART_SIZE]);
        let mut ctx = harness.ctx();
        service.execute(&mut ctx, &mut part2);
        assert_eq!(
            harness.registry.get(params::LFT_SEQUENCE_NUM).unwrap(),
            ParameterValue::U32(2)
        );
    }

    #[test]
    fn test_unknown_transaction_rejected() {
        let mut harness = harness();
        let mut service = LargePacketTransferService::default();
        let mut first = first_part(999, "SCHED_TC", 100);
        let mut ctx = harness.ctx();
        service.execute(&mut ctx, &mut first);
        let reports = harness.downlink.parsed();
        assert_eq!(reports.len(), 1);
        assert_eq!((reports[0].service_type, reports[0].message_type), (1, 2));
    }

    #[test]
    fn test_filename_transaction_mismatch_rejected() {
        let mut harness = harness();
        let mut service = LargePacketTransferService::default();
        let mut first = first_part(130, "MCU_FW____", 100);
        let mut ctx = harness.ctx();
        service.execute(&mut ctx, &mut first);
        let reports = harness.downlink.parsed();
        assert_eq!((reports[0].service_type, reports[0].message_type), (1, 2));
    }

    #[test]
    fn test_first_part_requires_sequence_zero() {
        let mut harness = harness();
        let mut service = LargePacketTransferService::default();
        let mut request = Message::tc(13, 9, 1);
        request.append_u16(130).unwrap();
        request.append_u16(1).unwrap();
        let mut ctx = harness.ctx();
        service.execute(&mut ctx, &mut request);
        let reports = harness.downlink.parsed();
        assert_eq!((reports[0].service_type, reports[0].message_type), (1, 2));
    }

    #[test]
    fn test_intermediate_part_must_be_exact_size() {
        let mut harness = harness();
        let mut service = LargePacketTransferService::default();
        let mut first = first_part(130, "SCHED_TC", 381);
        let mut ctx = harness.ctx();
        service.execute(&mut ctx, &mut first);

        let mut short = data_part(10, 130, 1, &[b'A'; PART_SIZE - 1]);
        let mut ctx = harness.ctx();
        service.execute(&mut ctx, &mut short);
        let fail = harness.downlink.parsed();
        assert_eq!((fail.last().unwrap().service_type, fail.last().unwrap().message_type), (1, 2));
    }

    #[test]
    fn test_part_for_wrong_stored_transaction_rejected() {
        let mut harness = harness();
        let mut service = LargePacketTransferService::default();
        let mut first = first_part(130, "SCHED_TC", 381);
        let mut ctx = harness.ctx();
        service.execute(&mut ctx, &mut first);

        let mut foreign = data_part(10, 140, 1, &[0u8; PART_SIZE]);
        let mut ctx = harness.ctx();
        service.execute(&mut ctx, &mut foreign);
        let reports = harness.downlink.parsed();
        assert_eq!((reports.last().unwrap().service_type, reports.last().unwrap().message_type), (1, 2));
    }

    #[test]
    fn test_firmware_transfer_packs_pages() {
        let mut harness = harness();
        let mut service = LargePacketTransferService::default();
        let mut first = first_part(140, "OBC_FW____", (PART_SIZE * 5) as u32);
        let mut ctx = harness.ctx();
        service.execute(&mut ctx, &mut first);

        // Three intermediates buffer into the page; nothing is flushed yet.
        for seq in 1..=3u16 {
            let fill = seq as u8;
            let mut part = data_part(10, 140, seq, &[fill; PART_SIZE]);
            let mut ctx = harness.ctx();
            service.execute(&mut ctx, &mut part);
        }
        assert!(harness.store.file_contents("OBC_FW____").is_none());

        // The fourth part completes the page.
        let mut part4 = data_part(10, 140, 4, &[4u8; PART_SIZE]);
        let mut ctx = harness.ctx();
        service.execute(&mut ctx, &mut part4);
        let file = harness.store.file_contents("OBC_FW____").unwrap();
        assert_eq!(file.len(), 4 * PART_SIZE);

        // A short last part flushes the partial page behind it.
        let mut last = data_part(11, 140, 5, &[5u8; 10]);
        let mut ctx = harness.ctx();
        service.execute(&mut ctx, &mut last);
        let file = harness.store.file_contents("OBC_FW____").unwrap();
        assert_eq!(file.len(), 4 * PART_SIZE + 10);
        assert!(file[..PART_SIZE].iter().all(|&b| b == 1));
        assert!(file[3 * PART_SIZE..4 * PART_SIZE].iter().all(|&b| b == 4));
        assert!(file[4 * PART_SIZE..].iter().all(|&b| b == 5));
    }

    #[test]
    fn test_split_emits_part_reports() {
        let mut harness = harness();
        let service = LargePacketTransferService::default();
        let mut big = Message::tm(13, 1, 1);
        big.append_string(&[0xAB; PART_SIZE * 2 + 10]).unwrap();
        let mut ctx = harness.ctx();
        service.split(&mut ctx, &big, 70);

        let reports = harness.downlink.parsed();
        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].message_type, 1);
        assert_eq!(reports[1].message_type, 2);
        assert_eq!(reports[2].message_type, 3);
        // transaction id, part seq, octet string length.
        assert_eq!(&reports[2].payload()[..6], &[0, 70, 0, 2, 0, 10]);
    }
}
