use crate::{AtomicSection, BusPin, Driver, Error, RomId};
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;

/// Fails with `FamilyCodeMismatch` unless the address belongs to `family`.
///
/// Device specific transactions call this before touching the bus.
pub fn check_family<E: Sized + Debug>(rom_id: &RomId, family: u8) -> Result<(), Error<E>> {
    if rom_id.family_code() != family {
        Err(Error::FamilyCodeMismatch(family, rom_id.family_code()))
    } else {
        Ok(())
    }
}

/// Generic device interface
pub trait Device: Sized {
    /// Device family code
    const FAMILY_CODE: u8;

    /// Get device address
    fn rom_id(&self) -> &RomId;

    /// Instantiate device using address without checks
    ///
    /// # Safety
    ///
    /// This is marked as unsafe because it does not check whether the given address
    /// is compatible with a specific device. It assumes so.
    unsafe fn from_rom_id_unchecked(rom_id: RomId) -> Self;

    /// Instantiate device from address
    fn from_rom_id<E: Sized + Debug>(rom_id: RomId) -> Result<Self, Error<E>> {
        check_family(&rom_id, Self::FAMILY_CODE)
            .map(|_| unsafe { Self::from_rom_id_unchecked(rom_id) })
    }

    fn ensure_family<E: Sized + Debug>(&self) -> Result<(), Error<E>> {
        check_family(self.rom_id(), Self::FAMILY_CODE)
    }

    fn search_first<P: BusPin, S: AtomicSection>(
        driver: &mut Driver<P, S>,
        delay: &mut impl DelayNs,
    ) -> Result<Option<Self>, Error<P::Error>> {
        RomId::search_first(driver, delay, Self::FAMILY_CODE)
            .map(|res| res.map(|rom_id| unsafe { Self::from_rom_id_unchecked(rom_id) }))
    }

    fn get_single<P: BusPin, S: AtomicSection>(
        driver: &mut Driver<P, S>,
        delay: &mut impl DelayNs,
    ) -> Result<Self, Error<P::Error>> {
        let rom_id = RomId::get_single(driver, delay)?;
        Self::from_rom_id(rom_id)
    }
}
