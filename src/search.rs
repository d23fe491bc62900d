use crate::{crc8_update, AtomicSection, BusPin, Command, Driver, Error, RomId};
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;

/// State of a ROM search on one bus.
///
/// A session remembers the address assembled by the previous pass and the
/// bit position of the last branch where the zero path was taken, so the next
/// pass can walk the same prefix and then take the one path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchSession {
    rom: [u8; RomId::BYTES as usize],
    /// 1-based bit index, 0 when there is no unexplored branch
    last_discrepancy: u8,
    done: bool,
}

impl SearchSession {
    pub fn new() -> SearchSession {
        SearchSession::default()
    }

    /// Primes a session so the first pass prefers devices of the given family
    pub fn for_family(family: u8) -> SearchSession {
        let mut search = SearchSession::new();
        search.rom[0] = family;
        search.last_discrepancy = RomId::BITS;
        search
    }

    /// Starts over with a full scan
    pub fn reset(&mut self) {
        *self = SearchSession::new();
    }

    pub fn last_discrepancy(&self) -> u8 {
        self.last_discrepancy
    }

    /// Whether the last pass walked the final branch of the tree
    pub fn is_done(&self) -> bool {
        self.done
    }

    fn is_bit_set(&self, byte_index: usize, mask: u8) -> bool {
        self.rom[byte_index] & mask != 0x00
    }

    fn write_bit(&mut self, byte_index: usize, mask: u8, value: bool) {
        if value {
            self.rom[byte_index] |= mask;
        } else {
            self.rom[byte_index] &= !mask;
        }
    }

    pub fn into_iter<'a, P: BusPin, S: AtomicSection, D: DelayNs>(
        self,
        driver: &'a mut Driver<P, S>,
        delay: &'a mut D,
    ) -> DeviceSearchIter<'a, P, S, D> {
        DeviceSearchIter {
            search: Some(self),
            driver,
            delay,
        }
    }
}

pub struct DeviceSearchIter<'a, P: BusPin, S: AtomicSection, D: DelayNs> {
    search: Option<SearchSession>,
    driver: &'a mut Driver<P, S>,
    delay: &'a mut D,
}

impl<'a, P: BusPin, S: AtomicSection, D: DelayNs> Iterator for DeviceSearchIter<'a, P, S, D> {
    type Item = Result<RomId, Error<P::Error>>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut search = self.search.take()?;
        let result = self
            .driver
            .search_next(&mut search, &mut *self.delay)
            .transpose()?;
        if result.is_ok() {
            self.search = Some(search);
        }
        Some(result)
    }
}

impl<E: Debug, P: BusPin<Error = E>, S: AtomicSection> Driver<P, S> {
    /// Runs one pass of the ROM search and returns the next device address.
    ///
    /// `Ok(None)` means no (further) device was found: the session is exhausted,
    /// nobody answered the reset, or the pass was garbled (no response to a bit
    /// or a CRC mismatch). A garbled pass clears the discrepancy so the next call
    /// starts the scan over.
    pub fn search_next(
        &mut self,
        session: &mut SearchSession,
        delay: &mut impl DelayNs,
    ) -> Result<Option<RomId>, Error<E>> {
        if session.done || !self.reset_presence(delay)? {
            return Ok(None);
        }

        self.write_command(delay, Command::SearchRom)?;

        let mut crc = 0_u8;
        let mut discrepancy_marker = 0_u8;
        let mut bit_index = 1_u8;
        let mut byte_index = 0_usize;
        let mut mask = 0x01_u8;

        while bit_index <= RomId::BITS {
            let bit = match self.read_bit_pair(delay)? {
                (true, true) => break,
                (false, false) => {
                    let bit = if bit_index < session.last_discrepancy {
                        session.is_bit_set(byte_index, mask)
                    } else {
                        bit_index == session.last_discrepancy
                    };
                    if !bit {
                        discrepancy_marker = bit_index;
                    }
                    bit
                }
                (bit, _) => bit,
            };

            session.write_bit(byte_index, mask, bit);
            self.write_bit(delay, bit)?;

            bit_index += 1;
            mask = mask.rotate_left(1);
            if mask == 0x01 {
                crc = crc8_update(crc, session.rom[byte_index]);
                byte_index += 1;
            }
        }

        if bit_index <= RomId::BITS || crc != 0 {
            warn!(
                "1-Wire search aborted at bit {} (crc {})",
                bit_index, crc
            );
            session.last_discrepancy = 0;
            return Ok(None);
        }

        session.last_discrepancy = discrepancy_marker;
        session.done = discrepancy_marker == 0;

        let rom_id = RomId::from(session.rom);
        trace!("1-Wire search found {}", rom_id);
        Ok(Some(rom_id))
    }
}
