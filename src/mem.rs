//! Interfaces to the persistent memory layer.
//!
//! The core never talks to the MRAM driver directly: it sees a block-oriented
//! file store and a typed parameter registry, both implemented by the memory
//! management task of the surrounding application. Files are addressed in
//! blocks of [crate::MRAM_DATA_BLOCK_SIZE] bytes of which the last one is
//! driver overhead, so one block carries `MRAM_DATA_BLOCK_SIZE - 1` data
//! bytes.
use num_enum::{IntoPrimitive, TryFromPrimitive};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identifier of a registry parameter.
pub type ParameterId = u16;

/// Error codes surfaced by the memory layer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum MemErrno {
    FileDoesNotExist = 1,
    ReachedEof = 2,
    OutOfBounds = 3,
    ReadFailed = 4,
    WriteFailed = 5,
    CorruptedData = 6,
    ParameterDoesNotExist = 7,
    UnknownError = 8,
}

/// Block-oriented persistent file store.
pub trait MemoryStore {
    /// Read the data bytes of blocks `start_block..end_block` into `out`.
    /// Returns the number of bytes read; reading past the end of the file
    /// yields [MemErrno::ReachedEof] with the bytes read so far discarded.
    fn read_from_file(
        &mut self,
        path: &str,
        out: &mut [u8],
        start_block: u32,
        end_block: u32,
    ) -> Result<usize, MemErrno>;

    /// Append `data` to the end of the file, creating it if necessary.
    fn write_to_file(&mut self, path: &str, data: &[u8]) -> Result<(), MemErrno>;

    /// Write `data` starting at the given block offset, zero-extending the
    /// file if it is shorter.
    fn write_at_block(&mut self, path: &str, data: &[u8], block_offset: u32)
        -> Result<(), MemErrno>;

    fn delete_file(&mut self, path: &str) -> Result<(), MemErrno>;

    fn file_size(&mut self, path: &str) -> Result<u32, MemErrno>;
}

/// Declared type of a registry parameter.
#[derive(Debug, Copy, Clone, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum ParameterType {
    U8 = 1,
    I8 = 2,
    U16 = 3,
    I16 = 4,
    U32 = 5,
    I32 = 6,
    U64 = 7,
    I64 = 8,
    F32 = 9,
    F64 = 10,
}

/// A typed parameter value. Replaces the untyped in/out pointers of a raw
/// registry with a sum over the primitive types.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ParameterValue {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl ParameterValue {
    pub fn type_of(&self) -> ParameterType {
        match self {
            ParameterValue::U8(_) => ParameterType::U8,
            ParameterValue::I8(_) => ParameterType::I8,
            ParameterValue::U16(_) => ParameterType::U16,
            ParameterValue::I16(_) => ParameterType::I16,
            ParameterValue::U32(_) => ParameterType::U32,
            ParameterValue::I32(_) => ParameterType::I32,
            ParameterValue::U64(_) => ParameterType::U64,
            ParameterValue::I64(_) => ParameterType::I64,
            ParameterValue::F32(_) => ParameterType::F32,
            ParameterValue::F64(_) => ParameterType::F64,
        }
    }

    /// Widen an integer-typed value to `u32`. Used by the transfer state
    /// parameters, which are all unsigned counters.
    pub fn as_u32(&self) -> Option<u32> {
        match *self {
            ParameterValue::U8(v) => Some(v.into()),
            ParameterValue::U16(v) => Some(v.into()),
            ParameterValue::U32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_u16(&self) -> Option<u16> {
        match *self {
            ParameterValue::U8(v) => Some(v.into()),
            ParameterValue::U16(v) => Some(v),
            _ => None,
        }
    }
}

/// Typed process-wide parameter registry.
pub trait ParameterRegistry {
    fn get(&self, id: ParameterId) -> Result<ParameterValue, MemErrno>;

    /// Store a new value. The value's type must match the declared type of
    /// the parameter.
    fn set(&mut self, id: ParameterId, value: ParameterValue) -> Result<(), MemErrno>;

    fn type_of(&self, id: ParameterId) -> Option<ParameterType>;

    fn exists(&self, id: ParameterId) -> bool {
        self.type_of(id).is_some()
    }
}

/// Well-known parameter ids consumed by the core.
pub mod params {
    use super::ParameterId;

    pub const LFT_TRANSACTION_ID: ParameterId = 0x0301;
    pub const LFT_SEQUENCE_NUM: ParameterId = 0x0302;
    pub const LFT_COUNT: ParameterId = 0x0303;
    pub const LFT_UPLINK_SIZE: ParameterId = 0x0304;
    pub const LFT_DISCONTINUITY_COUNTER: ParameterId = 0x0305;

    pub const VALID_TC_SCHEDULE_LIST: ParameterId = 0x0401;
    pub const TC_SCHEDULE_ACTIVE: ParameterId = 0x0402;
    /// Execution margin of the release engine, in milliseconds.
    pub const SCHEDULED_TC_EXECUTION_MARGIN: ParameterId = 0x0403;

    pub const MEMORY_HEALTH_CHECKS_IS_SET: ParameterId = 0x0501;
}

/// Filenames of the persistent records owned by the core.
pub mod files {
    /// Time-based schedule: activity index plus per-slot activity records.
    pub const SCHED_TC: &str = "SCHED_TC";
    /// Housekeeping structure slot array.
    pub const HK_STRUCTS: &str = "HK_STRUCTS";
}
