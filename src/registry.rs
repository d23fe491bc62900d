use crate::{AtomicSection, BusPin, Driver, Error, RomId, SearchSession};
use embedded_hal::delay::DelayNs;
use heapless::Vec;

/// Addresses found by the last discovery pass, in search order.
///
/// Devices are numbered from 1. The numbering only holds until the next
/// [`DeviceRegistry::discover`], which rebuilds the list from scratch.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry<const N: usize> {
    devices: Vec<RomId, N>,
}

impl<const N: usize> DeviceRegistry<N> {
    pub fn new() -> Self {
        DeviceRegistry { devices: Vec::new() }
    }

    /// Enumerates the bus with a fresh search session until no further device
    /// answers or the registry is full. Returns the number of devices found.
    pub fn discover<P: BusPin, S: AtomicSection>(
        &mut self,
        driver: &mut Driver<P, S>,
        delay: &mut impl DelayNs,
    ) -> Result<usize, Error<P::Error>> {
        self.devices.clear();
        let mut search = SearchSession::new();
        while !self.devices.is_full() {
            match driver.search_next(&mut search, delay)? {
                Some(rom_id) => {
                    // cannot fail, capacity checked above
                    let _ = self.devices.push(rom_id);
                }
                None => break,
            }
        }
        debug!("1-Wire discovery found {} device(s)", self.devices.len());
        Ok(self.devices.len())
    }

    /// Device number `index`, counting from 1
    pub fn get(&self, index: usize) -> Option<&RomId> {
        index.checked_sub(1).and_then(|i| self.devices.get(i))
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn capacity(&self) -> usize {
        N
    }

    pub fn iter(&self) -> impl Iterator<Item = &RomId> {
        self.devices.iter()
    }

    pub fn as_slice(&self) -> &[RomId] {
        &self.devices
    }
}
