//! The in-memory representation of one PUS packet.
//!
//! A [Message] owns a fixed-capacity octet buffer holding the application
//! data of a telecommand or telemetry packet, together with the identity
//! fields of both envelope headers. Appending moves a write cursor with bit
//! granularity; reading moves an independent read cursor. All multi-byte
//! integers are big-endian and bit fields are packed MSB first.
use crate::error::SpacecraftError;
use crate::seq_count::CounterBank;
use crate::time::{UtcTimestamp, UTC_TIMESTAMP_SIZE};
use crate::{PacketType, ECSS_MAX_MESSAGE_SIZE};

/// A mutable packet buffer plus envelope identity fields.
#[derive(Clone)]
pub struct Message {
    pub service_type: u8,
    pub message_type: u8,
    pub packet_type: PacketType,
    pub application_id: u16,
    pub source_id: u16,
    pub sequence_count: u16,
    pub message_type_counter: u16,
    /// Function id replayed in verification reports for ST[08] requests.
    pub function_id: u16,
    pub(crate) data: [u8; ECSS_MAX_MESSAGE_SIZE],
    pub(crate) data_len: u16,
    write_bit_offset: u8,
    read_pos: u16,
    read_bit_offset: u8,
}

impl core::fmt::Debug for Message {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Message")
            .field("service_type", &self.service_type)
            .field("message_type", &self.message_type)
            .field("packet_type", &self.packet_type)
            .field("application_id", &self.application_id)
            .field("source_id", &self.source_id)
            .field("sequence_count", &self.sequence_count)
            .field("data_len", &self.data_len)
            .finish()
    }
}

impl Message {
    pub fn new(
        service_type: u8,
        message_type: u8,
        packet_type: PacketType,
        application_id: u16,
    ) -> Self {
        Message {
            service_type,
            message_type,
            packet_type,
            application_id,
            source_id: 0,
            sequence_count: 0,
            message_type_counter: 0,
            function_id: 0,
            data: [0; ECSS_MAX_MESSAGE_SIZE],
            data_len: 0,
            write_bit_offset: 0,
            read_pos: 0,
            read_bit_offset: 0,
        }
    }

    /// Telecommand constructor helper.
    pub fn tc(service_type: u8, message_type: u8, application_id: u16) -> Self {
        Self::new(service_type, message_type, PacketType::Tc, application_id)
    }

    /// Telemetry constructor helper.
    pub fn tm(service_type: u8, message_type: u8, application_id: u16) -> Self {
        Self::new(service_type, message_type, PacketType::Tm, application_id)
    }

    /// Number of application data bytes currently held.
    pub fn data_len(&self) -> u16 {
        self.data_len
    }

    /// The application data written so far.
    pub fn payload(&self) -> &[u8] {
        &self.data[..usize::from(self.data_len)]
    }

    /// Current position of the read cursor, in bytes.
    pub fn read_pos(&self) -> u16 {
        self.read_pos
    }

    /// Application data remaining after the read cursor.
    pub fn remaining(&self) -> &[u8] {
        &self.data[usize::from(self.read_pos)..usize::from(self.data_len)]
    }

    /// True when this message is a telecommand of the given service and
    /// message type. Every handler checks this before any side effect.
    pub fn assert_tc(&self, service_type: u8, message_type: u8) -> bool {
        self.packet_type == PacketType::Tc
            && self.service_type == service_type
            && self.message_type == message_type
    }

    /// Append the `num_bits` low bits of `value`, MSB first, starting at the
    /// current bit offset.
    pub fn append_bits(&mut self, num_bits: u8, value: u16) -> Result<(), SpacecraftError> {
        if num_bits > 16 {
            return Err(SpacecraftError::TooManyBitsAppend);
        }
        let mut num_bits = num_bits;
        let mut value = value;
        while num_bits > 0 {
            if usize::from(self.data_len) >= ECSS_MAX_MESSAGE_SIZE {
                return Err(SpacecraftError::MessageTooLarge);
            }
            if self.write_bit_offset + num_bits >= 8 {
                // Fill up the current byte and continue in the next one.
                let bits_to_add_now = 8 - self.write_bit_offset;
                self.data[usize::from(self.data_len)] |=
                    (value >> (num_bits - bits_to_add_now)) as u8;
                value &= (1u16 << (num_bits - bits_to_add_now)) - 1;
                num_bits -= bits_to_add_now;
                self.write_bit_offset = 0;
                self.data_len += 1;
            } else {
                self.data[usize::from(self.data_len)] |=
                    (value << (8 - self.write_bit_offset - num_bits)) as u8;
                self.write_bit_offset += num_bits;
                num_bits = 0;
            }
        }
        Ok(())
    }

    fn check_append(&self, bytes: usize) -> Result<(), SpacecraftError> {
        if self.write_bit_offset != 0 {
            return Err(SpacecraftError::ByteBetweenBits);
        }
        if usize::from(self.data_len) + bytes > ECSS_MAX_MESSAGE_SIZE {
            return Err(SpacecraftError::MessageTooLarge);
        }
        Ok(())
    }

    pub fn append_u8(&mut self, value: u8) -> Result<(), SpacecraftError> {
        self.check_append(1)?;
        self.data[usize::from(self.data_len)] = value;
        self.data_len += 1;
        Ok(())
    }

    pub fn append_u16(&mut self, value: u16) -> Result<(), SpacecraftError> {
        self.check_append(2)?;
        self.data[usize::from(self.data_len)..usize::from(self.data_len) + 2]
            .copy_from_slice(&value.to_be_bytes());
        self.data_len += 2;
        Ok(())
    }

    pub fn append_u32(&mut self, value: u32) -> Result<(), SpacecraftError> {
        self.check_append(4)?;
        self.data[usize::from(self.data_len)..usize::from(self.data_len) + 4]
            .copy_from_slice(&value.to_be_bytes());
        self.data_len += 4;
        Ok(())
    }

    pub fn append_u64(&mut self, value: u64) -> Result<(), SpacecraftError> {
        self.check_append(8)?;
        self.data[usize::from(self.data_len)..usize::from(self.data_len) + 8]
            .copy_from_slice(&value.to_be_bytes());
        self.data_len += 8;
        Ok(())
    }

    pub fn append_i8(&mut self, value: i8) -> Result<(), SpacecraftError> {
        self.append_u8(value as u8)
    }

    pub fn append_i16(&mut self, value: i16) -> Result<(), SpacecraftError> {
        self.append_u16(value as u16)
    }

    pub fn append_i32(&mut self, value: i32) -> Result<(), SpacecraftError> {
        self.append_u32(value as u32)
    }

    pub fn append_i64(&mut self, value: i64) -> Result<(), SpacecraftError> {
        self.append_u64(value as u64)
    }

    pub fn append_f32(&mut self, value: f32) -> Result<(), SpacecraftError> {
        self.append_u32(value.to_bits())
    }

    pub fn append_f64(&mut self, value: f64) -> Result<(), SpacecraftError> {
        self.append_u64(value.to_bits())
    }

    pub fn append_bool(&mut self, value: bool) -> Result<(), SpacecraftError> {
        self.append_u8(u8::from(value))
    }

    /// Append raw bytes.
    pub fn append_string(&mut self, bytes: &[u8]) -> Result<(), SpacecraftError> {
        self.check_append(bytes.len())?;
        self.data[usize::from(self.data_len)..usize::from(self.data_len) + bytes.len()]
            .copy_from_slice(bytes);
        self.data_len += bytes.len() as u16;
        Ok(())
    }

    /// Append `bytes` and zero-fill up to `capacity`.
    pub fn append_fixed_string(
        &mut self,
        bytes: &[u8],
        capacity: usize,
    ) -> Result<(), SpacecraftError> {
        if bytes.len() > capacity {
            return Err(SpacecraftError::StringTooLarge);
        }
        self.check_append(capacity)?;
        self.append_string(bytes)?;
        for _ in bytes.len()..capacity {
            self.append_u8(0)?;
        }
        Ok(())
    }

    /// Append a 16-bit length field followed by the raw bytes.
    pub fn append_octet_string(&mut self, bytes: &[u8]) -> Result<(), SpacecraftError> {
        if bytes.len() > usize::from(u16::MAX) {
            return Err(SpacecraftError::StringTooLarge);
        }
        self.check_append(2 + bytes.len())?;
        self.append_u16(bytes.len() as u16)?;
        self.append_string(bytes)
    }

    pub fn append_utc_timestamp(&mut self, ts: UtcTimestamp) -> Result<(), SpacecraftError> {
        self.check_append(UTC_TIMESTAMP_SIZE)?;
        self.append_u16(ts.year)?;
        self.append_u8(ts.month)?;
        self.append_u8(ts.day)?;
        self.append_u8(ts.hour)?;
        self.append_u8(ts.minute)?;
        self.append_u8(ts.second)
    }

    /// Close the user data field: a partially written byte is padded with
    /// zeros (ECSS 7.4.3.2.c spare field), and telemetry receives its
    /// message type counter and packet sequence count from the process-wide
    /// counters.
    pub fn finalize(&mut self, counters: &mut CounterBank) {
        if self.write_bit_offset != 0 {
            self.write_bit_offset = 0;
            self.data_len += 1;
        }
        if self.packet_type == PacketType::Tm {
            self.message_type_counter =
                counters.next_message_type_count(self.service_type, self.message_type);
            self.sequence_count = counters.next_sequence_count();
        }
    }

    /// Read `num_bits` bits, MSB first, mirroring [Self::append_bits].
    pub fn read_bits(&mut self, num_bits: u8) -> Result<u16, SpacecraftError> {
        if num_bits > 16 {
            return Err(SpacecraftError::TooManyBitsRead);
        }
        let mut num_bits = num_bits;
        let mut value: u16 = 0;
        while num_bits > 0 {
            if self.read_pos >= self.data_len {
                return Err(SpacecraftError::MessageTooShort);
            }
            let byte = self.data[usize::from(self.read_pos)];
            if self.read_bit_offset + num_bits >= 8 {
                let bits_to_take_now = 8 - self.read_bit_offset;
                let mask = (1u16 << bits_to_take_now) - 1;
                let masked = u16::from(byte) & mask;
                value |= masked << (num_bits - bits_to_take_now);
                num_bits -= bits_to_take_now;
                self.read_bit_offset = 0;
                self.read_pos += 1;
            } else {
                value |= (u16::from(byte) >> (8 - self.read_bit_offset - num_bits))
                    & ((1u16 << num_bits) - 1);
                self.read_bit_offset += num_bits;
                num_bits = 0;
            }
        }
        Ok(value)
    }

    fn check_read(&self, bytes: usize) -> Result<(), SpacecraftError> {
        if usize::from(self.read_pos) + bytes > usize::from(self.data_len) {
            return Err(SpacecraftError::MessageTooShort);
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, SpacecraftError> {
        self.check_read(1)?;
        let value = self.data[usize::from(self.read_pos)];
        self.read_pos += 1;
        Ok(value)
    }

    pub fn read_u16(&mut self) -> Result<u16, SpacecraftError> {
        self.check_read(2)?;
        let pos = usize::from(self.read_pos);
        let value = u16::from_be_bytes(self.data[pos..pos + 2].try_into().unwrap());
        self.read_pos += 2;
        Ok(value)
    }

    pub fn read_u32(&mut self) -> Result<u32, SpacecraftError> {
        self.check_read(4)?;
        let pos = usize::from(self.read_pos);
        let value = u32::from_be_bytes(self.data[pos..pos + 4].try_into().unwrap());
        self.read_pos += 4;
        Ok(value)
    }

    pub fn read_u64(&mut self) -> Result<u64, SpacecraftError> {
        self.check_read(8)?;
        let pos = usize::from(self.read_pos);
        let value = u64::from_be_bytes(self.data[pos..pos + 8].try_into().unwrap());
        self.read_pos += 8;
        Ok(value)
    }

    pub fn read_i8(&mut self) -> Result<i8, SpacecraftError> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_i16(&mut self) -> Result<i16, SpacecraftError> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_i32(&mut self) -> Result<i32, SpacecraftError> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_i64(&mut self) -> Result<i64, SpacecraftError> {
        Ok(self.read_u64()? as i64)
    }

    pub fn read_f32(&mut self) -> Result<f32, SpacecraftError> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub fn read_f64(&mut self) -> Result<f64, SpacecraftError> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    pub fn read_bool(&mut self) -> Result<bool, SpacecraftError> {
        Ok(self.read_u8()? != 0)
    }

    /// Copy `out.len()` bytes from the read cursor.
    pub fn read_bytes(&mut self, out: &mut [u8]) -> Result<(), SpacecraftError> {
        self.check_read(out.len())?;
        let pos = usize::from(self.read_pos);
        out.copy_from_slice(&self.data[pos..pos + out.len()]);
        self.read_pos += out.len() as u16;
        Ok(())
    }

    pub fn read_utc_timestamp(&mut self) -> Result<UtcTimestamp, SpacecraftError> {
        let year = self.read_u16()?;
        let month = self.read_u8()?;
        let day = self.read_u8()?;
        let hour = self.read_u8()?;
        let minute = self.read_u8()?;
        let second = self.read_u8()?;
        UtcTimestamp::new(year, month, day, hour, minute, second)
    }

    /// Move the read cursor back to the start of the application data.
    pub fn reset_read(&mut self) {
        self.read_pos = 0;
        self.read_bit_offset = 0;
    }
}
