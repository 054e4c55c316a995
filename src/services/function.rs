//! ST[08] function management.
//!
//! A static registry maps 16-bit function ids to on-board functions taking a
//! fixed-length argument blob. TC[8,1] requests are parsed by the dispatcher
//! (`ServicePool::perform_function`) so that an unknown id can raise the
//! failed-start-of-execution event through the pool.
use heapless::FnvIndexMap;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::SpacecraftError;
use crate::ECSS_FUNCTION_MAX_ARG_LENGTH;

pub const SERVICE_TYPE: u8 = 8;

/// Capacity of the function registry. Must be a power of two.
pub const FUNCTION_MAP_SIZE: usize = 32;

#[derive(Debug, Eq, PartialEq, Copy, Clone, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum MessageType {
    PerformFunction = 1,
}

/// An on-board function invocable by id with a fixed-length argument blob.
pub type FunctionHandler =
    fn(&[u8; ECSS_FUNCTION_MAX_ARG_LENGTH]) -> Result<(), SpacecraftError>;

#[derive(Default)]
pub struct FunctionManagementService {
    registry: FnvIndexMap<u16, FunctionHandler, FUNCTION_MAP_SIZE>,
}

impl FunctionManagementService {
    /// Register a function under its id. Typically called once at
    /// initialization for every function the mission exposes.
    pub fn register(
        &mut self,
        function_id: u16,
        handler: FunctionHandler,
    ) -> Result<(), SpacecraftError> {
        self.registry
            .insert(function_id, handler)
            .map(|_| ())
            .map_err(|_| SpacecraftError::FunctionMapFull)
    }

    /// Look up and invoke a function. An unknown id yields
    /// [SpacecraftError::FunctionNotFound].
    pub fn call(
        &self,
        function_id: u16,
        args: &[u8; ECSS_FUNCTION_MAX_ARG_LENGTH],
    ) -> Result<(), SpacecraftError> {
        match self.registry.get(&function_id) {
            Some(handler) => handler(args),
            None => Err(SpacecraftError::FunctionNotFound),
        }
    }
}
