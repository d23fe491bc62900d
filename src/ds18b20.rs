use byteorder::{ByteOrder, LittleEndian};
use embedded_hal::delay::DelayNs;

use crate::{crc8, AtomicSection, BusPin, Device, Driver, Error, OpCode, RomId, Sensor};

#[derive(Clone, Copy, Debug)]
#[repr(u8)]
pub enum Command {
    Convert = 0x44,
    WriteScratchpad = 0x4e,
    ReadScratchpad = 0xBE,
}

impl OpCode for Command {
    fn op_code(&self) -> u8 {
        *self as _
    }
}

/// Conversion resolution in bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Resolution {
    Bits9 = 9,
    Bits10 = 10,
    Bits11 = 11,
    Bits12 = 12,
}

impl Resolution {
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            9 => Some(Resolution::Bits9),
            10 => Some(Resolution::Bits10),
            11 => Some(Resolution::Bits11),
            12 => Some(Resolution::Bits12),
            _ => None,
        }
    }

    /// Resolution selected by the R0/R1 bits (5 and 6) of a config register
    pub fn from_config(config: u8) -> Self {
        match (config >> 5) & 0b11 {
            0 => Resolution::Bits9,
            1 => Resolution::Bits10,
            2 => Resolution::Bits11,
            _ => Resolution::Bits12,
        }
    }

    pub fn bits(&self) -> u8 {
        *self as u8
    }

    /// Config register value written along with the alarm thresholds
    pub fn config_byte(&self) -> u8 {
        ((self.bits() - 9) << 5) | 0x60
    }

    /// Maximum conversion time
    pub fn time_ms(&self) -> u16 {
        match self {
            Resolution::Bits9 => 94,
            Resolution::Bits10 => 188,
            Resolution::Bits11 => 375,
            Resolution::Bits12 => 750,
        }
    }
}

/// Registers used to interpolate below one LSB of the temperature register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Extended {
    pub count_remain: u8,
    pub count_per_degree: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConversionResult {
    /// Temperature register, two's complement in 1/16 °C
    pub raw: u16,
    pub extended: Option<Extended>,
}

impl ConversionResult {
    pub fn celsius(&self) -> f32 {
        self.raw as i16 as f32 / 16_f32
    }

    /// `T = whole degrees - 0.25 + (count_per_degree - count_remain) / count_per_degree`
    ///
    /// `None` without extended registers or with a zero count per degree.
    pub fn interpolated_celsius(&self) -> Option<f32> {
        let extended = self.extended?;
        if extended.count_per_degree == 0 {
            return None;
        }
        let per_degree = f32::from(extended.count_per_degree);
        let whole = f32::from(self.raw as i16 >> 4);
        Some(whole - 0.25 + (per_degree - f32::from(extended.count_remain)) / per_degree)
    }
}

/// All nine scratchpad bytes, CRC checked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Scratchpad {
    raw: [u8; Self::BYTES],
}

impl Scratchpad {
    pub const BYTES: usize = 9;

    pub fn temperature(&self) -> u16 {
        LittleEndian::read_u16(&self.raw[0..2])
    }

    pub fn alarm_high(&self) -> i8 {
        self.raw[2] as i8
    }

    pub fn alarm_low(&self) -> i8 {
        self.raw[3] as i8
    }

    pub fn config(&self) -> u8 {
        self.raw[4]
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::from_config(self.config())
    }

    pub fn extended(&self) -> Extended {
        Extended {
            count_remain: self.raw[6],
            count_per_degree: self.raw[7],
        }
    }

    pub fn as_bytes(&self) -> &[u8; Self::BYTES] {
        &self.raw
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Ds18b20 {
    rom_id: RomId,
    resolution: Resolution,
}

impl From<Ds18b20> for RomId {
    fn from(device: Ds18b20) -> Self {
        device.rom_id
    }
}

impl Ds18b20 {
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Writes the alarm thresholds and the resolution, then reads the
    /// scratchpad back and compares the three written bytes.
    pub fn write_scratchpad<P: BusPin, S: AtomicSection>(
        &mut self,
        driver: &mut Driver<P, S>,
        delay: &mut impl DelayNs,
        alarm_low: i8,
        alarm_high: i8,
        resolution: u8,
    ) -> Result<(), Error<P::Error>> {
        let Some(resolution) = Resolution::from_bits(resolution) else {
            return Err(Error::InvalidResolution(resolution));
        };
        self.ensure_family::<P::Error>()?;

        let config = resolution.config_byte();
        let write = [
            Command::WriteScratchpad.op_code(),
            alarm_high as u8,
            alarm_low as u8,
            config,
        ];
        driver.reset_select_write_only(delay, &self.rom_id, &write)?;

        let mut read = [0u8; 5];
        driver.reset_select_write_read(
            delay,
            &self.rom_id,
            &[Command::ReadScratchpad.op_code()],
            &mut read,
        )?;
        for (written, read) in write[1..].iter().zip(&read[2..]) {
            if written != read {
                warn!(
                    "scratchpad verify of {} failed: wrote {}, read {}",
                    self.rom_id, written, read
                );
                return Err(Error::VerifyMismatch(*written, *read));
            }
        }

        self.resolution = Resolution::from_config(config);
        Ok(())
    }

    /// Starts a temperature conversion on this sensor. Returns the configured
    /// resolution so the caller knows how long the conversion takes.
    pub fn start_conversion<P: BusPin, S: AtomicSection>(
        &self,
        driver: &mut Driver<P, S>,
        delay: &mut impl DelayNs,
    ) -> Result<Resolution, Error<P::Error>> {
        self.ensure_family::<P::Error>()?;
        driver.reset_select_write_only(delay, &self.rom_id, &[Command::Convert.op_code()])?;
        Ok(self.resolution)
    }

    /// Starts a conversion on every sensor of the bus at once
    pub fn start_conversion_all<P: BusPin, S: AtomicSection>(
        driver: &mut Driver<P, S>,
        delay: &mut impl DelayNs,
    ) -> Result<(), Error<P::Error>> {
        driver.reset_skip_write_only(delay, &[Command::Convert.op_code()])
    }

    pub fn read_result<P: BusPin, S: AtomicSection>(
        &self,
        driver: &mut Driver<P, S>,
        delay: &mut impl DelayNs,
    ) -> Result<u16, Error<P::Error>> {
        self.ensure_family::<P::Error>()?;
        let mut temperature = [0u8; 2];
        driver.reset_select_write_read(
            delay,
            &self.rom_id,
            &[Command::ReadScratchpad.op_code()],
            &mut temperature,
        )?;
        Ok(LittleEndian::read_u16(&temperature))
    }

    /// Reads the temperature together with count remain (byte 6) and count per
    /// degree (byte 7)
    pub fn read_result_extended<P: BusPin, S: AtomicSection>(
        &self,
        driver: &mut Driver<P, S>,
        delay: &mut impl DelayNs,
    ) -> Result<ConversionResult, Error<P::Error>> {
        self.ensure_family::<P::Error>()?;
        let mut scratchpad = [0u8; 8];
        driver.reset_select_write_read(
            delay,
            &self.rom_id,
            &[Command::ReadScratchpad.op_code()],
            &mut scratchpad,
        )?;
        Ok(ConversionResult {
            raw: LittleEndian::read_u16(&scratchpad[0..2]),
            extended: Some(Extended {
                count_remain: scratchpad[6],
                count_per_degree: scratchpad[7],
            }),
        })
    }

    pub fn read_scratchpad<P: BusPin, S: AtomicSection>(
        &self,
        driver: &mut Driver<P, S>,
        delay: &mut impl DelayNs,
    ) -> Result<Scratchpad, Error<P::Error>> {
        self.ensure_family::<P::Error>()?;
        let mut raw = [0u8; Scratchpad::BYTES];
        driver.reset_select_write_read(
            delay,
            &self.rom_id,
            &[Command::ReadScratchpad.op_code()],
            &mut raw,
        )?;
        let computed = crc8(&raw[..8]);
        if computed != raw[8] {
            return Err(Error::CrcMismatch(computed, raw[8]));
        }
        Ok(Scratchpad { raw })
    }

    /// Converts, waits for the sensor to finish and reads the temperature
    pub fn start_and_read<P: BusPin, S: AtomicSection>(
        &self,
        driver: &mut Driver<P, S>,
        delay: &mut impl DelayNs,
        timeout_ms: Option<u32>,
    ) -> Result<ConversionResult, Error<P::Error>> {
        self.start_conversion(driver, delay)?;
        driver.wait_until_done(delay, timeout_ms)?;
        let raw = self.read_result(driver, delay)?;
        Ok(ConversionResult {
            raw,
            extended: None,
        })
    }

    pub fn start_and_read_extended<P: BusPin, S: AtomicSection>(
        &self,
        driver: &mut Driver<P, S>,
        delay: &mut impl DelayNs,
        timeout_ms: Option<u32>,
    ) -> Result<ConversionResult, Error<P::Error>> {
        self.start_conversion(driver, delay)?;
        driver.wait_until_done(delay, timeout_ms)?;
        self.read_result_extended(driver, delay)
    }
}

impl Device for Ds18b20 {
    const FAMILY_CODE: u8 = 0x28;

    fn rom_id(&self) -> &RomId {
        &self.rom_id
    }

    unsafe fn from_rom_id_unchecked(rom_id: RomId) -> Self {
        Self {
            rom_id,
            resolution: Resolution::Bits12,
        }
    }
}

impl Sensor for Ds18b20 {
    fn start_measurement<P: BusPin, S: AtomicSection>(
        &self,
        driver: &mut Driver<P, S>,
        delay: &mut impl DelayNs,
    ) -> Result<u16, Error<P::Error>> {
        Ok(self.start_conversion(driver, delay)?.time_ms())
    }

    fn read_measurement<P: BusPin, S: AtomicSection>(
        &self,
        driver: &mut Driver<P, S>,
        delay: &mut impl DelayNs,
    ) -> Result<f32, Error<P::Error>> {
        self.read_result(driver, delay)
            .map(|t| t as i16 as f32 / 16_f32)
    }

    fn read_measurement_raw<P: BusPin, S: AtomicSection>(
        &self,
        driver: &mut Driver<P, S>,
        delay: &mut impl DelayNs,
    ) -> Result<u16, Error<P::Error>> {
        self.read_result(driver, delay)
    }
}

/// Split raw u16 value to two parts: integer and fraction N
/// Original value may be calculated as: integer + fraction/10000
pub fn split_temp(temperature: u16) -> (i16, i16) {
    let value = i32::from(temperature as i16);
    let abs = value.abs();
    let (integer, fraction) = ((abs >> 4) as i16, ((abs & 0xF) * 625) as i16);
    if value < 0 {
        (-integer, -fraction)
    } else {
        (integer, fraction)
    }
}
