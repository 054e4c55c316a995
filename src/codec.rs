//! Bit-exact parsing and composition of the nested CCSDS + ECSS packet
//! headers.
//!
//! A complete packet is the 6 byte CCSDS primary header, the PUS C secondary
//! header (5 bytes for telecommands, 15 for telemetry), the application data,
//! and an optional CRC-16 trailer over everything before it. [parse] turns a
//! received frame into a [Message]; [compose] produces the raw frame for a
//! message, zero-padding the ECSS area up to the requested total size.
use crate::crc::{calc_crc16, verify_crc16};
use zerocopy::FromBytes;
use crate::error::SpacecraftError;
use crate::message::Message;
use crate::time::Clock;
use crate::{
    PacketType, CCSDS_MAX_MESSAGE_SIZE, CCSDS_PRIMARY_HEADER_SIZE, CRC_ENABLED,
    ECSS_MAX_MESSAGE_SIZE, ECSS_PUS_VERSION, ECSS_TC_SECONDARY_HEADER_SIZE,
    ECSS_TM_SECONDARY_HEADER_SIZE,
};

/// Zero-copy views of the fixed-size PUS C secondary headers.
pub mod zc {
    use zerocopy::byteorder::{NetworkEndian, U16, U32};
    use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

    #[derive(FromZeroes, FromBytes, AsBytes, Unaligned)]
    #[repr(C)]
    pub struct PusTcSecondaryHeader {
        pub version_ack: u8,
        pub service_type: u8,
        pub message_type: u8,
        pub source_id: U16<NetworkEndian>,
    }

    #[derive(FromZeroes, FromBytes, AsBytes, Unaligned)]
    #[repr(C)]
    pub struct PusTmSecondaryHeader {
        pub version_spare: u8,
        pub service_type: u8,
        pub message_type: u8,
        pub message_type_counter: U16<NetworkEndian>,
        pub destination_id: U16<NetworkEndian>,
        /// Unix epoch seconds, low 32 bits.
        pub time_seconds: U32<NetworkEndian>,
        pub spare: [u8; 4],
    }

    impl PusTcSecondaryHeader {
        pub fn pus_version(&self) -> u8 {
            self.version_ack >> 4
        }
    }

    impl PusTmSecondaryHeader {
        pub fn pus_version(&self) -> u8 {
            self.version_spare >> 4
        }
    }
}

const _: () = assert!(core::mem::size_of::<zc::PusTcSecondaryHeader>() == ECSS_TC_SECONDARY_HEADER_SIZE);
const _: () = assert!(core::mem::size_of::<zc::PusTmSecondaryHeader>() == ECSS_TM_SECONDARY_HEADER_SIZE);

fn secondary_header_size(packet_type: PacketType) -> usize {
    match packet_type {
        PacketType::Tc => ECSS_TC_SECONDARY_HEADER_SIZE,
        PacketType::Tm => ECSS_TM_SECONDARY_HEADER_SIZE,
    }
}

/// Parse a complete frame into a [Message].
///
/// `error_reporting_active` enables the strict envelope checks (version
/// bits, secondary header flag, segmentation flags); `parse_ccsds` is a
/// caller contract and must be true.
pub fn parse(
    data: &[u8],
    error_reporting_active: bool,
    parse_ccsds: bool,
) -> Result<Message, SpacecraftError> {
    if data.len() < CCSDS_PRIMARY_HEADER_SIZE {
        return Err(SpacecraftError::LengthLessThanExpected);
    }
    if !parse_ccsds {
        return Err(SpacecraftError::WrongPusVersion);
    }

    let mut data = data;
    if CRC_ENABLED {
        if !verify_crc16(data) {
            return Err(SpacecraftError::CrcMismatch);
        }
        data = &data[..data.len() - 2];
    }

    let packet_id = u16::from_be_bytes([data[0], data[1]]);
    let packet_sequence_control = u16::from_be_bytes([data[2], data[3]]);
    let ccsds_data_length = u16::from_be_bytes([data[4], data[5]]);

    let version_number = data[0] >> 5;
    let packet_type = if data[0] & 0x10 == 0 {
        PacketType::Tm
    } else {
        PacketType::Tc
    };
    let secondary_header_flag = data[0] & 0x08 != 0;
    let apid = packet_id & 0x07FF;
    let sequence_flags = (packet_sequence_control >> 14) as u8;
    let sequence_count = packet_sequence_control & 0x3FFF;

    if data.len() < CCSDS_PRIMARY_HEADER_SIZE + secondary_header_size(packet_type) {
        return Err(match packet_type {
            PacketType::Tc => SpacecraftError::TcSizeLessThanExpected,
            PacketType::Tm => SpacecraftError::TmSizeLessThanExpected,
        });
    }

    if error_reporting_active {
        if version_number != 0 {
            return Err(SpacecraftError::WrongPusVersion);
        }
        if !secondary_header_flag {
            return Err(SpacecraftError::MissingSecondaryHeader);
        }
        if sequence_flags != 0b11 {
            return Err(SpacecraftError::InvalidSequenceFlags);
        }
    }

    if usize::from(ccsds_data_length) > ECSS_MAX_MESSAGE_SIZE {
        return Err(SpacecraftError::TcSizeLargerThanExpected);
    }

    let ecss_area = &data[CCSDS_PRIMARY_HEADER_SIZE..];
    if ecss_area.len() > ECSS_MAX_MESSAGE_SIZE {
        return Err(match packet_type {
            PacketType::Tc => SpacecraftError::TcSizeLargerThanExpected,
            PacketType::Tm => SpacecraftError::TmSizeLargerThanExpected,
        });
    }

    let mut message = Message::new(0, 0, packet_type, apid);
    message.sequence_count = sequence_count;

    match packet_type {
        PacketType::Tc => parse_tc_secondary(ecss_area, &mut message)?,
        PacketType::Tm => parse_tm_secondary(ecss_area, &mut message)?,
    }
    Ok(message)
}

/// Parse the ECSS area (secondary TC header plus application data) of a
/// telecommand into `message`. Used both by [parse] and when recovering a
/// telecommand image embedded in another message.
pub fn parse_tc_secondary(
    ecss_area: &[u8],
    message: &mut Message,
) -> Result<(), SpacecraftError> {
    if ecss_area.len() > ECSS_MAX_MESSAGE_SIZE {
        return Err(SpacecraftError::TcSizeLargerThanExpected);
    }
    if ecss_area.len() < ECSS_TC_SECONDARY_HEADER_SIZE {
        return Err(SpacecraftError::TcSizeLessThanExpected);
    }
    let header =
        zc::PusTcSecondaryHeader::read_from(&ecss_area[..ECSS_TC_SECONDARY_HEADER_SIZE])
            .ok_or(SpacecraftError::TcSizeLessThanExpected)?;
    if header.pus_version() != ECSS_PUS_VERSION {
        return Err(SpacecraftError::WrongPusVersion);
    }

    message.service_type = header.service_type;
    message.message_type = header.message_type;
    message.source_id = header.source_id.get();

    let payload = &ecss_area[ECSS_TC_SECONDARY_HEADER_SIZE..];
    message.data[..payload.len()].copy_from_slice(payload);
    message.data_len = payload.len() as u16;
    Ok(())
}

fn parse_tm_secondary(ecss_area: &[u8], message: &mut Message) -> Result<(), SpacecraftError> {
    if ecss_area.len() < ECSS_TM_SECONDARY_HEADER_SIZE {
        return Err(SpacecraftError::TmSizeLessThanExpected);
    }
    let header =
        zc::PusTmSecondaryHeader::read_from(&ecss_area[..ECSS_TM_SECONDARY_HEADER_SIZE])
            .ok_or(SpacecraftError::TmSizeLessThanExpected)?;
    if header.pus_version() != ECSS_PUS_VERSION {
        return Err(SpacecraftError::WrongPusVersion);
    }

    message.service_type = header.service_type;
    message.message_type = header.message_type;
    message.message_type_counter = header.message_type_counter.get();

    let payload = &ecss_area[ECSS_TM_SECONDARY_HEADER_SIZE..];
    message.data[..payload.len()].copy_from_slice(payload);
    message.data_len = payload.len() as u16;
    Ok(())
}

/// Build the ECSS area of a message: secondary header, application data,
/// zero padding up to `ecss_total_size`.
pub fn compose_ecss(
    message: &Message,
    ecss_total_size: u16,
    clock: &dyn Clock,
) -> Result<Vec<u8>, SpacecraftError> {
    let total = usize::from(ecss_total_size);
    if total > ECSS_MAX_MESSAGE_SIZE {
        return Err(SpacecraftError::ComposedSizeLargerThanExpected);
    }
    let header_size = secondary_header_size(message.packet_type);
    if total < header_size {
        return Err(match message.packet_type {
            PacketType::Tc => SpacecraftError::TcSizeLessThanExpected,
            PacketType::Tm => SpacecraftError::TmSizeLessThanExpected,
        });
    }

    let mut out = Vec::with_capacity(total);
    match message.packet_type {
        PacketType::Tc => {
            out.push(ECSS_PUS_VERSION << 4);
            out.push(message.service_type);
            out.push(message.message_type);
            out.extend_from_slice(&message.source_id.to_be_bytes());
        }
        PacketType::Tm => {
            let ticks = (clock.epoch_seconds() & 0xFFFF_FFFF) as u32;
            out.push(ECSS_PUS_VERSION << 4);
            out.push(message.service_type);
            out.push(message.message_type);
            out.extend_from_slice(&message.message_type_counter.to_be_bytes());
            out.extend_from_slice(&message.application_id.to_be_bytes());
            out.extend_from_slice(&ticks.to_be_bytes());
            out.extend_from_slice(&[0, 0, 0, 0]);
        }
    }
    // The requested size governs, not the write cursor: short application
    // data is zero-padded, the backing buffer beyond the cursor is zeroed.
    let payload_bytes = total - header_size;
    out.extend_from_slice(&message.data[..payload_bytes]);
    Ok(out)
}

/// Compose the complete frame for a message, prepending the CCSDS primary
/// header and appending the CRC-16 trailer when enabled.
pub fn compose(
    message: &Message,
    ecss_total_size: u16,
    clock: &dyn Clock,
) -> Result<Vec<u8>, SpacecraftError> {
    if usize::from(ecss_total_size) > CCSDS_MAX_MESSAGE_SIZE - CCSDS_PRIMARY_HEADER_SIZE {
        return Err(SpacecraftError::ComposedSizeLargerThanExpected);
    }
    let ecss = compose_ecss(message, ecss_total_size, clock)?;

    let mut packet_id = message.application_id & 0x07FF;
    packet_id |= 1 << 11;
    if message.packet_type == PacketType::Tc {
        packet_id |= 1 << 12;
    }
    let packet_sequence_control = (message.sequence_count & 0x3FFF) | (0b11 << 14);
    let ccsds_data_length = (ecss.len() - 1) as u16;

    let mut frame = Vec::with_capacity(CCSDS_PRIMARY_HEADER_SIZE + ecss.len() + 2);
    frame.extend_from_slice(&packet_id.to_be_bytes());
    frame.extend_from_slice(&packet_sequence_control.to_be_bytes());
    frame.extend_from_slice(&ccsds_data_length.to_be_bytes());
    frame.extend_from_slice(&ecss);

    if CRC_ENABLED {
        let crc = calc_crc16(&frame);
        frame.extend_from_slice(&crc.to_be_bytes());
    }
    Ok(frame)
}

/// Total frame length of a telecommand image, derived from its CCSDS data
/// length field. Used when the image sits inside a fixed-size capture area.
pub fn embedded_frame_len(image: &[u8]) -> Result<usize, SpacecraftError> {
    if image.len() < CCSDS_PRIMARY_HEADER_SIZE {
        return Err(SpacecraftError::LengthLessThanExpected);
    }
    let data_length = u16::from_be_bytes([image[4], image[5]]);
    let total = CCSDS_PRIMARY_HEADER_SIZE + usize::from(data_length) + 1;
    if total > image.len() {
        return Err(SpacecraftError::LengthLessThanExpected);
    }
    Ok(total)
}
