use crate::{crc8, AtomicSection, BusPin, Command, Driver, Error, OpCode, SearchSession};
use core::{
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    ops::{Deref, DerefMut},
    str::FromStr,
};
use embedded_hal::delay::DelayNs;

/// Factory programmed 64-bit device address: family code, 48-bit serial
/// number and a CRC8 over the first seven bytes
#[derive(Debug, Clone, Copy, PartialOrd, Ord, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct RomId {
    raw: [u8; Self::BYTES as usize],
}

impl Default for RomId {
    fn default() -> Self {
        Self::from([0; Self::BYTES as usize])
    }
}

impl From<[u8; Self::BYTES as usize]> for RomId {
    fn from(raw: [u8; Self::BYTES as usize]) -> Self {
        RomId { raw }
    }
}

impl From<RomId> for [u8; RomId::BYTES as usize] {
    fn from(rom_id: RomId) -> [u8; RomId::BYTES as usize] {
        rom_id.raw
    }
}

impl Deref for RomId {
    type Target = [u8; Self::BYTES as usize];

    fn deref(&self) -> &Self::Target {
        &self.raw
    }
}

impl DerefMut for RomId {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.raw
    }
}

impl AsRef<[u8]> for RomId {
    fn as_ref(&self) -> &[u8] {
        self.deref() as _
    }
}

impl AsMut<[u8]> for RomId {
    fn as_mut(&mut self) -> &mut [u8] {
        self.deref_mut() as _
    }
}

impl RomId {
    /// The length of device address in bytes
    pub const BYTES: u8 = 8;

    /// The length of device address in bits
    pub const BITS: u8 = Self::BYTES * 8;

    pub fn family_code(&self) -> u8 {
        self[0]
    }

    /// The 48-bit serial number, least significant byte first
    pub fn serial(&self) -> &[u8] {
        &self[1..7]
    }

    pub fn crc(&self) -> u8 {
        self[7]
    }

    pub fn is_crc_valid(&self) -> bool {
        crc8(&self[..7]) == self.crc()
    }
}

/// Error type
#[derive(Debug, PartialEq, Eq)]
pub enum RomIdError {
    NotEnough,
    Invalid,
}

fn hex_to_u8(c: char) -> Option<u8> {
    c.to_digit(16).map(|digit| digit as u8)
}

impl FromStr for RomId {
    type Err = RomIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut rom_id = RomId::default();
        let mut chars = s.chars().filter(|c| !c.is_whitespace() && *c != ':');

        for i in 0..Self::BYTES as usize {
            match (chars.next(), chars.next()) {
                (Some(h), Some(l)) => match (hex_to_u8(h), hex_to_u8(l)) {
                    (Some(h), Some(l)) => {
                        rom_id[i] = (h << 4) | l;
                    }
                    _ => return Err(RomIdError::Invalid),
                },
                _ => return Err(RomIdError::NotEnough),
            }
        }

        Ok(rom_id)
    }
}

impl Display for RomId {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self[0], self[1], self[2], self[3], self[4], self[5], self[6], self[7],
        )
    }
}

impl RomId {
    /// Reads the address of the only device on the bus (ReadROM).
    ///
    /// With more than one device connected all of them answer at once and the
    /// result is garbage, which is up to the caller to rule out.
    pub fn read_single<P: BusPin, S: AtomicSection>(
        &mut self,
        driver: &mut Driver<P, S>,
        delay: &mut impl DelayNs,
    ) -> Result<(), Error<P::Error>> {
        driver.reset_write_read(delay, &[Command::ReadRom.op_code()], self.as_mut())?;
        Ok(())
    }

    pub fn get_single<P: BusPin, S: AtomicSection>(
        driver: &mut Driver<P, S>,
        delay: &mut impl DelayNs,
    ) -> Result<Self, Error<P::Error>> {
        let mut rom_id = Self::default();
        rom_id.read_single(driver, delay)?;
        Ok(rom_id)
    }

    /// Runs a targeted search and returns the first device of the given family
    pub fn search_first<P: BusPin, S: AtomicSection>(
        driver: &mut Driver<P, S>,
        delay: &mut impl DelayNs,
        family_code: u8,
    ) -> Result<Option<Self>, Error<P::Error>> {
        let mut search = SearchSession::for_family(family_code);
        while let Some(rom_id) = driver.search_next(&mut search, delay)? {
            if family_code == rom_id.family_code() {
                return Ok(Some(rom_id));
            }
        }
        Ok(None)
    }
}
