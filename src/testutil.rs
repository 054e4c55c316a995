//! In-memory implementations of the external collaborators, for unit and
//! integration tests.
//!
//! [RamStore] mimics the block-addressed MRAM filesystem, [RamRegistry] the
//! typed parameter registry, [ManualClock] a settable wall clock, and
//! [Harness] bundles one of each behind a ready-made [ServiceContext].
use core::cell::Cell;
use core::time::Duration;
use std::collections::HashMap;

use crate::codec;
use crate::mem::{params, MemErrno, MemoryStore, ParameterId, ParameterRegistry, ParameterType, ParameterValue};
use crate::message::Message;
use crate::seq_count::CounterBank;
use crate::services::{SchedulerHook, ServiceContext, TcUplinkQueue, TmSink};
use crate::time::{Clock, UtcTimestamp};
use crate::MRAM_DATA_BLOCK_SIZE;

const BLOCK_DATA_SIZE: usize = MRAM_DATA_BLOCK_SIZE - 1;

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Cell<UtcTimestamp>,
}

impl ManualClock {
    pub fn new(now: UtcTimestamp) -> Self {
        ManualClock { now: Cell::new(now) }
    }

    pub fn set(&self, now: UtcTimestamp) {
        self.now.set(now);
    }

    pub fn advance(&self, duration: Duration) {
        self.now.set(self.now.get() + duration);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        ManualClock::new(UtcTimestamp {
            year: 2026,
            month: 1,
            day: 1,
            hour: 0,
            minute: 0,
            second: 0,
        })
    }
}

impl Clock for ManualClock {
    fn now_utc(&self) -> UtcTimestamp {
        self.now.get()
    }
}

/// Block-addressed in-memory file store.
#[derive(Debug, Default)]
pub struct RamStore {
    files: HashMap<String, Vec<u8>>,
}

impl RamStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file_contents(&self, path: &str) -> Option<&Vec<u8>> {
        self.files.get(path)
    }
}

impl MemoryStore for RamStore {
    fn read_from_file(
        &mut self,
        path: &str,
        out: &mut [u8],
        start_block: u32,
        end_block: u32,
    ) -> Result<usize, MemErrno> {
        let file = self.files.get(path).ok_or(MemErrno::FileDoesNotExist)?;
        if end_block < start_block {
            return Err(MemErrno::OutOfBounds);
        }
        let start = start_block as usize * BLOCK_DATA_SIZE;
        if start >= file.len() {
            return Err(MemErrno::ReachedEof);
        }
        let window = (end_block - start_block) as usize * BLOCK_DATA_SIZE;
        let count = out.len().min(window).min(file.len() - start);
        out[..count].copy_from_slice(&file[start..start + count]);
        Ok(count)
    }

    fn write_to_file(&mut self, path: &str, data: &[u8]) -> Result<(), MemErrno> {
        self.files
            .entry(path.to_owned())
            .or_default()
            .extend_from_slice(data);
        Ok(())
    }

    fn write_at_block(
        &mut self,
        path: &str,
        data: &[u8],
        block_offset: u32,
    ) -> Result<(), MemErrno> {
        let file = self.files.entry(path.to_owned()).or_default();
        let start = block_offset as usize * BLOCK_DATA_SIZE;
        if file.len() < start + data.len() {
            file.resize(start + data.len(), 0);
        }
        file[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn delete_file(&mut self, path: &str) -> Result<(), MemErrno> {
        self.files
            .remove(path)
            .map(|_| ())
            .ok_or(MemErrno::FileDoesNotExist)
    }

    fn file_size(&mut self, path: &str) -> Result<u32, MemErrno> {
        self.files
            .get(path)
            .map(|f| f.len() as u32)
            .ok_or(MemErrno::FileDoesNotExist)
    }
}

/// Typed in-memory parameter registry.
#[derive(Debug, Default)]
pub struct RamRegistry {
    parameters: HashMap<ParameterId, ParameterValue>,
}

impl RamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a parameter (or overwrite its value and type).
    pub fn register(&mut self, id: ParameterId, value: ParameterValue) {
        self.parameters.insert(id, value);
    }
}

impl ParameterRegistry for RamRegistry {
    fn get(&self, id: ParameterId) -> Result<ParameterValue, MemErrno> {
        self.parameters
            .get(&id)
            .copied()
            .ok_or(MemErrno::ParameterDoesNotExist)
    }

    fn set(&mut self, id: ParameterId, value: ParameterValue) -> Result<(), MemErrno> {
        match self.parameters.get_mut(&id) {
            Some(stored) if stored.type_of() == value.type_of() => {
                *stored = value;
                Ok(())
            }
            Some(_) => Err(MemErrno::UnknownError),
            None => Err(MemErrno::ParameterDoesNotExist),
        }
    }

    fn type_of(&self, id: ParameterId) -> Option<ParameterType> {
        self.parameters.get(&id).map(|v| v.type_of())
    }
}

/// Downlink sink capturing every composed frame.
#[derive(Debug)]
pub struct TmCapture {
    frames: Vec<Vec<u8>>,
    accepting: bool,
}

impl TmCapture {
    pub fn new() -> Self {
        TmCapture {
            frames: Vec::new(),
            accepting: true,
        }
    }

    pub fn frames(&self) -> &[Vec<u8>] {
        &self.frames
    }

    /// Parse the captured frames back into messages.
    pub fn parsed(&self) -> Vec<Message> {
        self.frames
            .iter()
            .map(|frame| codec::parse(frame, true, true).expect("captured an unparseable frame"))
            .collect()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    pub fn set_accepting(&mut self, accepting: bool) {
        self.accepting = accepting;
    }
}

impl Default for TmCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl TmSink for TmCapture {
    fn store(&mut self, frame: &[u8]) -> bool {
        if !self.accepting {
            return false;
        }
        self.frames.push(frame.to_vec());
        true
    }
}

/// TC handling queue capturing released telecommands.
#[derive(Debug)]
pub struct RamTcQueue {
    released: Vec<(Message, u8)>,
    accepting: bool,
}

impl RamTcQueue {
    pub fn new() -> Self {
        RamTcQueue {
            released: Vec::new(),
            accepting: true,
        }
    }

    pub fn released(&self) -> &[(Message, u8)] {
        &self.released
    }

    pub fn pop(&mut self) -> Option<(Message, u8)> {
        if self.released.is_empty() {
            None
        } else {
            Some(self.released.remove(0))
        }
    }

    pub fn set_accepting(&mut self, accepting: bool) {
        self.accepting = accepting;
    }
}

impl Default for RamTcQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TcUplinkQueue for RamTcQueue {
    fn enqueue(&mut self, request: Message, priority: u8) -> bool {
        if !self.accepting {
            return false;
        }
        self.released.push((request, priority));
        true
    }
}

/// Scheduler wakeup line counting pokes.
#[derive(Debug, Default)]
pub struct PokeCounter {
    pokes: usize,
}

impl PokeCounter {
    pub fn pokes(&self) -> usize {
        self.pokes
    }
}

impl SchedulerHook for PokeCounter {
    fn poke(&mut self) {
        self.pokes += 1;
    }
}

/// All external collaborators in one bundle.
pub struct Harness {
    pub store: RamStore,
    pub registry: RamRegistry,
    pub clock: ManualClock,
    pub downlink: TmCapture,
    pub tc_queue: RamTcQueue,
    pub scheduler: PokeCounter,
    pub counters: CounterBank,
}

impl Harness {
    pub fn new() -> Self {
        Harness {
            store: RamStore::new(),
            registry: RamRegistry::new(),
            clock: ManualClock::default(),
            downlink: TmCapture::new(),
            tc_queue: RamTcQueue::new(),
            scheduler: PokeCounter::default(),
            counters: CounterBank::new(),
        }
    }

    /// Borrow everything as one [ServiceContext].
    pub fn ctx(&mut self) -> ServiceContext<'_> {
        ServiceContext {
            store: &mut self.store,
            registry: &mut self.registry,
            clock: &self.clock,
            downlink: &mut self.downlink,
            tc_queue: &mut self.tc_queue,
            scheduler: &mut self.scheduler,
            counters: &mut self.counters,
        }
    }

    /// Declare the large-packet-transfer state parameters.
    pub fn register_lft_parameters(&mut self) {
        self.registry
            .register(params::LFT_TRANSACTION_ID, ParameterValue::U16(0));
        self.registry
            .register(params::LFT_SEQUENCE_NUM, ParameterValue::U32(0));
        self.registry.register(params::LFT_COUNT, ParameterValue::U32(0));
        self.registry
            .register(params::LFT_UPLINK_SIZE, ParameterValue::U32(0));
        self.registry
            .register(params::LFT_DISCONTINUITY_COUNTER, ParameterValue::U32(0));
    }

    /// Declare the scheduling flags with execution enabled and a 5 second
    /// release margin.
    pub fn register_scheduling_parameters(&mut self) {
        self.registry
            .register(params::VALID_TC_SCHEDULE_LIST, ParameterValue::U8(1));
        self.registry
            .register(params::TC_SCHEDULE_ACTIVE, ParameterValue::U8(1));
        self.registry.register(
            params::SCHEDULED_TC_EXECUTION_MARGIN,
            ParameterValue::U32(5000),
        );
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ram_store_block_addressing() {
        let mut store = RamStore::new();
        store.write_at_block("F", &[0xAA; 10], 2).unwrap();
        assert_eq!(store.file_size("F").unwrap(), (2 * 127 + 10) as u32);

        let mut out = [0u8; 10];
        let count = store.read_from_file("F", &mut out, 2, 3).unwrap();
        assert_eq!(count, 10);
        assert_eq!(out, [0xAA; 10]);

        // The gap before the written block reads back as zeros.
        let mut out = [0u8; 4];
        store.read_from_file("F", &mut out, 0, 1).unwrap();
        assert_eq!(out, [0; 4]);
    }

    #[test]
    fn test_ram_store_append_and_errors() {
        let mut store = RamStore::new();
        let mut out = [0u8; 4];
        assert_eq!(
            store.read_from_file("missing", &mut out, 0, 1).unwrap_err(),
            MemErrno::FileDoesNotExist
        );
        store.write_to_file("F", &[1, 2]).unwrap();
        store.write_to_file("F", &[3]).unwrap();
        assert_eq!(store.file_contents("F").unwrap().as_slice(), &[1, 2, 3]);
        assert_eq!(
            store.read_from_file("F", &mut out, 1, 2).unwrap_err(),
            MemErrno::ReachedEof
        );
        store.delete_file("F").unwrap();
        assert_eq!(store.delete_file("F").unwrap_err(), MemErrno::FileDoesNotExist);
    }

    #[test]
    fn test_ram_registry_type_checking() {
        let mut registry = RamRegistry::new();
        registry.register(1, ParameterValue::U16(5));
        assert_eq!(registry.get(1).unwrap(), ParameterValue::U16(5));
        assert_eq!(registry.type_of(1), Some(ParameterType::U16));
        assert!(registry.exists(1));
        assert!(!registry.exists(2));

        assert_eq!(
            registry.set(1, ParameterValue::U32(9)).unwrap_err(),
            MemErrno::UnknownError
        );
        registry.set(1, ParameterValue::U16(9)).unwrap();
        assert_eq!(registry.get(1).unwrap(), ParameterValue::U16(9));
        assert_eq!(
            registry.set(2, ParameterValue::U8(0)).unwrap_err(),
            MemErrno::ParameterDoesNotExist
        );
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::default();
        let start = clock.now_utc();
        clock.advance(Duration::from_secs(90));
        assert_eq!(
            clock.now_utc().to_epoch_seconds(),
            start.to_epoch_seconds() + 90
        );
    }
}
