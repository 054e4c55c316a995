//! # On-board PUS services core
//!
//! This crate contains the telecommand/telemetry core of an on-board software
//! stack conforming to the
//! [ECSS-E-ST-70-41C standard](https://ecss.nl/standard/ecss-e-st-70-41c-space-engineering-telemetry-and-telecommand-packet-utilization-15-april-2016/)
//! carried inside space packets according to
//! [CCSDS 133.0-B-1](https://public.ccsds.org/Pubs/133x0b1c2.pdf).
//! It provides the following components:
//!
//!  - The [Message](message::Message) packet buffer with bit- and
//!    byte-granular append and read cursors.
//!  - The packet [codec] performing bit-exact parsing and composition of the
//!    nested CCSDS and ECSS headers, including the optional CRC-16 trailer.
//!  - The [service dispatcher](services::ServicePool) routing parsed
//!    telecommands to the built-in PUS services: request verification ST\[01\],
//!    housekeeping ST\[03\], event reporting ST\[05\], function management
//!    ST\[08\], time-based scheduling ST\[11\], large packet transfer ST\[13\],
//!    the test service ST\[17\], event-action ST\[19\] and parameter
//!    management ST\[20\].
//!
//! Persistent storage, the parameter registry, the wall clock, the TC queue
//! and the downlink are external collaborators reached through the traits in
//! [mem], [time] and [services]; [testutil] ships in-memory implementations
//! for all of them.
//!
//! ## Features
//!
//! Each service can be compiled out individually through the `service-*`
//! features (`all-services` is the default). A telecommand addressed to a
//! service that was not built in raises an internal error instead of being
//! dispatched.
//!
//! The optional `serde` feature derives [`serde::Serialize`] and
//! [`serde::Deserialize`] on the small value types, which allows moving them
//! through a serde provider like [`postcard`](https://docs.rs/postcard).
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub mod codec;
pub mod crc;
pub mod error;
pub mod mem;
pub mod message;
pub mod seq_count;
pub mod services;
pub mod testutil;
pub mod time;

/// Maximum value of the 11-bit application process identifier.
pub const MAX_APID: u16 = 2u16.pow(11) - 1;
/// Maximum value of the 14-bit packet sequence count.
pub const MAX_SEQ_COUNT: u16 = 2u16.pow(14) - 1;

/// Size of the CCSDS space packet primary header.
pub const CCSDS_PRIMARY_HEADER_SIZE: usize = 6;
/// Largest complete space packet this stack produces or accepts.
pub const CCSDS_MAX_MESSAGE_SIZE: usize = 1024;
/// Capacity of the ECSS area of a [message::Message], secondary header included.
pub const ECSS_MAX_MESSAGE_SIZE: usize = 1017;
/// Size of the PUS C telecommand secondary header.
pub const ECSS_TC_SECONDARY_HEADER_SIZE: usize = 5;
/// Size of the PUS C telemetry secondary header, including the 4 byte
/// epoch-seconds time field and 4 spare bytes.
pub const ECSS_TM_SECONDARY_HEADER_SIZE: usize = 15;
/// The only PUS version accepted and produced by this stack (PUS C).
pub const ECSS_PUS_VERSION: u8 = 2;

/// Whether composed packets carry a trailing CRC-16. The CRC helpers in
/// [crc] are available either way.
pub const CRC_ENABLED: bool = false;

/// Size of one MRAM block of the persistent store, including the one byte of
/// driver overhead. Only `MRAM_DATA_BLOCK_SIZE - 1` bytes per block carry data.
pub const MRAM_DATA_BLOCK_SIZE: usize = 128;
/// Fixed octet-string size used by the large packet transfer service. One
/// uplink part carries exactly this many payload bytes (the last may carry
/// fewer) and it must fill MRAM data blocks evenly.
pub const ECSS_MAX_FIXED_OCTET_STRING_SIZE: usize = 127;
/// Size of the captured telecommand image inside a TC[11,4] insert request.
pub const ECSS_TC_REQUEST_STRING_SIZE: usize = 64;

/// Number of housekeeping structure slots in the persisted array.
pub const ECSS_MAX_HOUSEKEEPING_STRUCTURES: usize = 10;
/// Maximum number of simply commutated parameters per housekeeping structure.
pub const ECSS_MAX_SIMPLY_COMMUTATED_PARAMETERS: usize = 30;
/// Number of slots in the persisted time-based schedule.
pub const ECSS_MAX_SCHED_ACTIVITIES: usize = 16;
/// Capacity of the event-action definitions table.
pub const ECSS_EVENT_ACTION_MAP_SIZE: usize = 16;
/// Fixed length of the argument blob handed to an ST[08] function.
pub const ECSS_FUNCTION_MAX_ARG_LENGTH: usize = 16;
/// Number of event definition ids known to the event reporting service.
/// Valid event ids are `1..=ECSS_NUMBER_OF_EVENTS`.
pub const ECSS_NUMBER_OF_EVENTS: usize = 15;
/// Maximum auxiliary data size attached to an event report.
pub const ECSS_EVENT_DATA_AUX_MAX_SIZE: usize = 64;

/// Minimum distance of a scheduled activity's release time from the current
/// time, in seconds. Closer insertions and shifts are rejected.
pub const ECSS_TIME_MARGIN_FOR_ACTIVATION_SECS: u64 = 5;

/// The application process id of this on-board application.
pub const APPLICATION_ID: u16 = 1;

// An uplink part must fill MRAM data blocks evenly so that per-part writes
// land on block boundaries.
const _: () = assert!(ECSS_MAX_FIXED_OCTET_STRING_SIZE % (MRAM_DATA_BLOCK_SIZE - 1) == 0);
const _: () =
    assert!(ECSS_MAX_MESSAGE_SIZE + CCSDS_PRIMARY_HEADER_SIZE + 1 <= CCSDS_MAX_MESSAGE_SIZE);
const _: () = assert!(ECSS_TC_REQUEST_STRING_SIZE <= ECSS_MAX_MESSAGE_SIZE);

/// Packet type bit of the CCSDS primary header.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PacketType {
    Tm = 0,
    Tc = 1,
}

impl TryFrom<u8> for PacketType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            x if x == PacketType::Tm as u8 => Ok(PacketType::Tm),
            x if x == PacketType::Tc as u8 => Ok(PacketType::Tc),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_type_helper() {
        assert_eq!(PacketType::try_from(0b00).unwrap(), PacketType::Tm);
        assert_eq!(PacketType::try_from(0b01).unwrap(), PacketType::Tc);
        assert!(PacketType::try_from(0b10).is_err());
    }

    #[test]
    fn test_field_limits() {
        assert_eq!(MAX_APID, 2047);
        assert_eq!(MAX_SEQ_COUNT, 16383);
    }
}
