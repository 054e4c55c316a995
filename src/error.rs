//! The spacecraft-wide error taxonomy.
//!
//! Every fallible operation of the core reports through the single 16-bit
//! [SpacecraftError] code so that failed-verification telemetry can carry the
//! code verbatim. The groups follow the TM[1,x] phases: message-buffer misuse,
//! acceptance, start of execution, and persistence.
use core::fmt::{Display, Formatter};
use num_enum::{IntoPrimitive, TryFromPrimitive};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::mem::MemErrno;

#[derive(Debug, Copy, Clone, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u16)]
#[non_exhaustive]
pub enum SpacecraftError {
    // Message buffer misuse. These indicate a malformed request or an
    // internal composition bug, depending on which cursor tripped.
    MessageTooLarge = 100,
    MessageTooShort = 101,
    TooManyBitsAppend = 102,
    TooManyBitsRead = 103,
    ByteBetweenBits = 104,
    StringTooLarge = 105,
    StringTooShort = 106,
    InvalidDate = 107,

    // Packet acceptance.
    LengthLessThanExpected = 200,
    WrongPusVersion = 201,
    MissingSecondaryHeader = 202,
    InvalidSequenceFlags = 203,
    TcSizeLessThanExpected = 204,
    TmSizeLessThanExpected = 205,
    TcSizeLargerThanExpected = 206,
    TmSizeLargerThanExpected = 207,
    ComposedSizeLargerThanExpected = 208,
    CrcMismatch = 209,
    UnacceptableMessage = 210,
    OtherMessageType = 211,
    InvalidArgument = 212,

    // Start of execution.
    InstructionExecutionStartError = 300,
    SubServiceExecutionStartError = 301,
    RequestedNonExistingStructure = 302,
    RequestedDeletionOfEnabledHousekeeping = 303,
    RequestedAppendToEnabledHousekeeping = 304,
    ExceededMaxNumberOfSimplyCommutatedParameters = 305,
    NonExistingParameter = 306,
    EventActionEnabledError = 307,
    EventActionDeleteEnabledDefinitionError = 308,
    EventActionUnknownDefinitionError = 309,
    EventActionDefinitionsMapIsFull = 310,
    FunctionNotFound = 311,
    ScheduleFull = 312,
    FunctionMapFull = 313,

    // Persistence, mapped from [MemErrno].
    EmptyScheduleList = 400,
    CorruptedScheduleFile = 401,
    MemoryFileDoesNotExist = 402,
    MemoryReadError = 403,
    MemoryWriteError = 404,
    MemoryOutOfBounds = 405,
    MemoryCorrupted = 406,
    MemoryUnknownError = 407,
    ParameterDoesNotExist = 408,
}

impl Display for SpacecraftError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "spacecraft error {:?} ({})", self, u16::from(*self))
    }
}

impl std::error::Error for SpacecraftError {}

impl From<MemErrno> for SpacecraftError {
    fn from(e: MemErrno) -> Self {
        match e {
            MemErrno::FileDoesNotExist => SpacecraftError::MemoryFileDoesNotExist,
            MemErrno::ReachedEof => SpacecraftError::MemoryReadError,
            MemErrno::OutOfBounds => SpacecraftError::MemoryOutOfBounds,
            MemErrno::ReadFailed => SpacecraftError::MemoryReadError,
            MemErrno::WriteFailed => SpacecraftError::MemoryWriteError,
            MemErrno::CorruptedData => SpacecraftError::MemoryCorrupted,
            MemErrno::ParameterDoesNotExist => SpacecraftError::ParameterDoesNotExist,
            MemErrno::UnknownError => SpacecraftError::MemoryUnknownError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_code_round_trip() {
        let code: u16 = SpacecraftError::WrongPusVersion.into();
        assert_eq!(code, 201);
        assert_eq!(
            SpacecraftError::try_from(code).unwrap(),
            SpacecraftError::WrongPusVersion
        );
    }

    #[test]
    fn test_unknown_wire_code_rejected() {
        let conversion = SpacecraftError::try_from(9999);
        assert!(conversion.is_err());
        assert_eq!(conversion.unwrap_err().number, 9999);
    }

    #[test]
    fn test_memory_error_mapping() {
        assert_eq!(
            SpacecraftError::from(MemErrno::FileDoesNotExist),
            SpacecraftError::MemoryFileDoesNotExist
        );
        assert_eq!(
            SpacecraftError::from(MemErrno::WriteFailed),
            SpacecraftError::MemoryWriteError
        );
    }
}
