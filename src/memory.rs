//! Generic RAM devices addressed with a 16-bit memory address.

use byteorder::{ByteOrder, LittleEndian};
use embedded_hal::delay::DelayNs;

use crate::{AtomicSection, BusPin, Driver, Error, OpCode, RomId};

#[derive(Clone, Copy, Debug)]
#[repr(u8)]
pub enum Command {
    ReadMemory = 0xF0,
    WriteMemory = 0x0F,
}

impl OpCode for Command {
    fn op_code(&self) -> u8 {
        *self as _
    }
}

fn address_bytes(command: Command, address: u16) -> [u8; 3] {
    let mut bytes = [command.op_code(), 0, 0];
    LittleEndian::write_u16(&mut bytes[1..], address);
    bytes
}

impl<P: BusPin, S: AtomicSection> Driver<P, S> {
    /// Reads `data.len()` bytes starting at `address`
    pub fn read_ram(
        &mut self,
        delay: &mut impl DelayNs,
        rom_id: &RomId,
        address: u16,
        data: &mut [u8],
    ) -> Result<(), Error<P::Error>> {
        if data.is_empty() {
            return Err(Error::ZeroLength);
        }

        self.reset_select_write_read(
            delay,
            rom_id,
            &address_bytes(Command::ReadMemory, address),
            data,
        )
    }

    /// Writes `data` starting at `address`, verifying every byte.
    ///
    /// After each byte the device answers with a CRC16 and the byte as stored.
    /// The CRC16 is read but not checked. The first stored byte that differs
    /// from the written one aborts the transfer with `VerifyMismatch`; bytes
    /// before it are already written.
    pub fn write_ram(
        &mut self,
        delay: &mut impl DelayNs,
        rom_id: &RomId,
        address: u16,
        data: &[u8],
    ) -> Result<(), Error<P::Error>> {
        if data.is_empty() {
            return Err(Error::ZeroLength);
        }

        self.reset_select_write_only(delay, rom_id, &address_bytes(Command::WriteMemory, address))?;

        for (offset, byte) in data.iter().enumerate() {
            self.write_byte(delay, *byte)?;

            // TODO: check the CRC16 over command, address and data once a device needs it
            let mut crc16 = [0u8; 2];
            self.read_bytes(delay, &mut crc16)?;

            let stored = self.read_byte(delay)?;
            if stored != *byte {
                warn!(
                    "RAM verify of {} failed at offset {}: wrote {}, read {}",
                    rom_id, offset, byte, stored
                );
                return Err(Error::VerifyMismatch(*byte, stored));
            }
        }
        Ok(())
    }
}
