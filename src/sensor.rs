use crate::{AtomicSection, BusPin, Device, Driver, Error};
use embedded_hal::delay::DelayNs;

pub trait Sensor: Device {
    /// returns the milliseconds required to wait until the measurement finished
    fn start_measurement<P: BusPin, S: AtomicSection>(
        &self,
        driver: &mut Driver<P, S>,
        delay: &mut impl DelayNs,
    ) -> Result<u16, Error<P::Error>>;

    /// returns the measured value
    fn read_measurement<P: BusPin, S: AtomicSection>(
        &self,
        driver: &mut Driver<P, S>,
        delay: &mut impl DelayNs,
    ) -> Result<f32, Error<P::Error>>;

    fn read_measurement_raw<P: BusPin, S: AtomicSection>(
        &self,
        driver: &mut Driver<P, S>,
        delay: &mut impl DelayNs,
    ) -> Result<u16, Error<P::Error>>;
}
