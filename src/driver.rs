use crate::{AtomicSection, BusPin, Command, CriticalSection, Error, OpCode, RomId, Timing};
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;

pub struct Driver<P: BusPin, S: AtomicSection = CriticalSection> {
    pin: P,
    section: S,
    timing: Timing,
}

impl<P: BusPin> Driver<P> {
    pub fn new(pin: P) -> Self {
        Self::with_section(pin, CriticalSection)
    }
}

impl<E: Debug, P: BusPin<Error = E>, S: AtomicSection> Driver<P, S> {
    pub fn with_section(pin: P, section: S) -> Self {
        Driver {
            pin,
            section,
            timing: Timing::default(),
        }
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    /// Gives back the pin and the atomic section
    pub fn free(self) -> (P, S) {
        (self.pin, self.section)
    }

    pub fn reset_write_read(
        &mut self,
        delay: &mut impl DelayNs,
        write: &[u8],
        read: &mut [u8],
    ) -> Result<(), Error<E>> {
        self.reset(delay)?;
        self.write_bytes(delay, write)?;
        self.read_bytes(delay, read)?;
        Ok(())
    }

    pub fn reset_select_write_read(
        &mut self,
        delay: &mut impl DelayNs,
        rom_id: &RomId,
        write: &[u8],
        read: &mut [u8],
    ) -> Result<(), Error<E>> {
        self.reset_select(delay, rom_id)?;
        self.write_bytes(delay, write)?;
        self.read_bytes(delay, read)?;
        Ok(())
    }

    pub fn reset_select_write_only(
        &mut self,
        delay: &mut impl DelayNs,
        rom_id: &RomId,
        write: &[u8],
    ) -> Result<(), Error<E>> {
        self.reset_select(delay, rom_id)?;
        self.write_bytes(delay, write)?;
        Ok(())
    }

    pub fn reset_skip_write_only(
        &mut self,
        delay: &mut impl DelayNs,
        write: &[u8],
    ) -> Result<(), Error<E>> {
        self.reset(delay)?;
        self.skip(delay)?;
        self.write_bytes(delay, write)?;
        Ok(())
    }

    /// Resets the bus and addresses exactly one device (MatchROM).
    /// It stays selected until the next reset.
    pub fn reset_select(&mut self, delay: &mut impl DelayNs, rom_id: &RomId) -> Result<(), Error<E>> {
        self.reset(delay)?;
        self.select(delay, rom_id)
    }

    pub fn skip(&mut self, delay: &mut impl DelayNs) -> Result<(), Error<E>> {
        self.write_command(delay, Command::SkipRom)?;
        Ok(())
    }

    pub fn select(&mut self, delay: &mut impl DelayNs, rom_id: &RomId) -> Result<(), Error<E>> {
        self.write_command(delay, Command::MatchRom)?;
        self.write_bytes(delay, rom_id.as_ref())?;
        Ok(())
    }

    /// Performs a reset and listens for a presence pulse
    /// Returns Err(WireFault) if the wire does not return high after the reset slot,
    /// Err(NoPresence) if no device answered but the wire seems to be ok
    pub fn reset(&mut self, delay: &mut impl DelayNs) -> Result<(), Error<E>> {
        let Self {
            pin,
            section,
            timing,
        } = self;
        let presence = section.run(|| -> Result<bool, E> {
            pin.drive_low()?;
            delay.delay_us(timing.reset_low);
            pin.release()?;
            delay.delay_us(timing.presence_sample);
            let presence = pin.is_low()?;
            delay.delay_us(timing.reset_recovery);
            Ok(presence)
        })?;

        self.ensure_wire_high(delay)?;
        if presence {
            Ok(())
        } else {
            debug!("1-Wire reset: no presence pulse");
            Err(Error::NoPresence)
        }
    }

    /// Like [`Driver::reset`] but reports a missing presence pulse as `Ok(false)`
    pub fn reset_presence(&mut self, delay: &mut impl DelayNs) -> Result<bool, Error<E>> {
        self.reset(delay).map(|_| true).or_else(|error| {
            if matches!(error, Error::NoPresence) {
                Ok(false)
            } else {
                Err(error)
            }
        })
    }

    fn ensure_wire_high(&mut self, delay: &mut impl DelayNs) -> Result<(), Error<E>> {
        for _ in 0..self.timing.wire_high_polls {
            if self.pin.is_high()? {
                return Ok(());
            }
            delay.delay_us(self.timing.wire_high_poll_interval);
        }
        warn!("1-Wire line stuck low after reset");
        Err(Error::WireFault)
    }

    pub fn read_bytes(&mut self, delay: &mut impl DelayNs, dst: &mut [u8]) -> Result<(), E> {
        for d in dst {
            *d = self.read_byte(delay)?;
        }
        Ok(())
    }

    pub fn read_byte(&mut self, delay: &mut impl DelayNs) -> Result<u8, E> {
        let Self {
            pin,
            section,
            timing,
        } = self;
        section.run(|| -> Result<u8, E> {
            let mut byte = 0_u8;
            for _ in 0..8 {
                byte >>= 1;
                if read_slot(pin, delay, timing)? {
                    byte |= 0x80;
                }
                delay.delay_us(timing.bit_gap);
            }
            Ok(byte)
        })
    }

    pub fn read_bit(&mut self, delay: &mut impl DelayNs) -> Result<bool, E> {
        let Self {
            pin,
            section,
            timing,
        } = self;
        section.run(|| read_slot(pin, delay, timing))
    }

    /// Two consecutive read slots inside one atomic section
    pub(crate) fn read_bit_pair(&mut self, delay: &mut impl DelayNs) -> Result<(bool, bool), E> {
        let Self {
            pin,
            section,
            timing,
        } = self;
        section.run(|| -> Result<(bool, bool), E> {
            let first = read_slot(pin, delay, timing)?;
            let second = read_slot(pin, delay, timing)?;
            Ok((first, second))
        })
    }

    pub fn write_command(&mut self, delay: &mut impl DelayNs, cmd: impl OpCode) -> Result<(), E> {
        self.write_byte(delay, cmd.op_code())
    }

    pub fn write_bytes(&mut self, delay: &mut impl DelayNs, bytes: &[u8]) -> Result<(), E> {
        for b in bytes {
            self.write_byte(delay, *b)?;
        }
        Ok(())
    }

    pub fn write_byte(&mut self, delay: &mut impl DelayNs, byte: u8) -> Result<(), E> {
        let Self {
            pin,
            section,
            timing,
        } = self;
        section.run(|| -> Result<(), E> {
            let mut byte = byte;
            for _ in 0..8 {
                write_slot(pin, delay, timing, (byte & 0x01) == 0x01)?;
                byte >>= 1;
                delay.delay_us(timing.bit_gap);
            }
            Ok(())
        })
    }

    pub fn write_bit(&mut self, delay: &mut impl DelayNs, high: bool) -> Result<(), E> {
        let Self {
            pin,
            section,
            timing,
        } = self;
        section.run(|| write_slot(pin, delay, timing, high))
    }

    /// Issues read slots until a device releases the line, e.g. at the end of a
    /// temperature conversion.
    ///
    /// With `timeout_ms` set to `None` this waits for as long as the device keeps
    /// the line low. Otherwise the elapsed slot time is accounted against the
    /// timeout and `Err(Timeout)` is returned once it is used up.
    pub fn wait_until_done(
        &mut self,
        delay: &mut impl DelayNs,
        timeout_ms: Option<u32>,
    ) -> Result<(), Error<E>> {
        let Some(timeout_ms) = timeout_ms else {
            return self.wait_until_done_with(delay, || false);
        };

        let slot = u64::from(self.timing.read_slot());
        let mut remaining = u64::from(timeout_ms) * 1000;
        self.wait_until_done_with(delay, || {
            if remaining < slot {
                true
            } else {
                remaining -= slot;
                false
            }
        })
        .map_err(|error| match error {
            Error::Cancelled => {
                warn!("1-Wire device still busy after {} ms", timeout_ms);
                Error::Timeout
            }
            error => error,
        })
    }

    /// Issues read slots until a device releases the line or `cancel` returns
    /// true, which is checked after every slot that still read low.
    pub fn wait_until_done_with(
        &mut self,
        delay: &mut impl DelayNs,
        mut cancel: impl FnMut() -> bool,
    ) -> Result<(), Error<E>> {
        loop {
            if self.read_bit(delay)? {
                return Ok(());
            }
            if cancel() {
                return Err(Error::Cancelled);
            }
        }
    }
}

fn read_slot<P: BusPin>(
    pin: &mut P,
    delay: &mut impl DelayNs,
    timing: &Timing,
) -> Result<bool, P::Error> {
    pin.drive_low()?;
    delay.delay_us(timing.read_low);
    pin.release()?;
    delay.delay_us(timing.read_sample);
    let val = pin.is_high()?;
    delay.delay_us(timing.read_recovery);
    Ok(val)
}

fn write_slot<P: BusPin>(
    pin: &mut P,
    delay: &mut impl DelayNs,
    timing: &Timing,
    high: bool,
) -> Result<(), P::Error> {
    pin.drive_low()?;
    delay.delay_us(if high {
        timing.write_one_low
    } else {
        timing.write_zero_low
    });
    pin.release()?;
    delay.delay_us(if high {
        timing.write_one_high
    } else {
        timing.write_zero_high
    });
    Ok(())
}
