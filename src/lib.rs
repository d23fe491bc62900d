#![no_std]
#![doc = include_str!("../README.md")]

#[macro_use]
mod fmt;

mod command;
mod crc;
mod device;
mod driver;
#[cfg(feature = "ds18b20")]
pub mod ds18b20;
#[cfg(feature = "memory")]
pub mod memory;
mod pin;
mod registry;
mod result;
mod rom_id;
mod search;
mod section;
mod sensor;
mod timing;

pub use command::{Command, OpCode};
pub use crc::{compute_partial_crc8, crc8, crc8_update};
pub use device::{check_family, Device};
pub use driver::Driver;
pub use pin::{BusPin, Inverted};
pub use registry::DeviceRegistry;
pub use result::Error;
pub use rom_id::{RomId, RomIdError};
pub use search::{DeviceSearchIter, SearchSession};
pub use section::{AtomicSection, CriticalSection};
pub use sensor::Sensor;
pub use timing::Timing;
