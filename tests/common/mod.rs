//! Simulated 1-Wire bus with a virtual microsecond clock.
//!
//! The simulated pin, delay and atomic section share one `Bus`. Devices only
//! look at the pulses the master produces: a low pulse of at least 480 µs is a
//! reset, a shorter one opens a slot. A slot shorter than 15 µs reads as a
//! written 1, anything longer as a written 0. A device sending a 0 holds the
//! line low for 45 µs from the falling edge.
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use onewire_bus::{crc8, AtomicSection, BusPin, Driver, RomId};

const US: u64 = 1_000;
const RESET_MIN: u64 = 480 * US;
const ONE_MAX: u64 = 15 * US;
const SEND_ZERO_HOLD: u64 = 45 * US;
const PRESENCE_DELAY: u64 = 15 * US;
const PRESENCE_HOLD: u64 = 120 * US;

/// Power-on scratchpad of a DS18B20 (85 °C, TH 75, TL 70, 12 bit)
const POWER_ON_SCRATCHPAD: [u8; 8] = [0x50, 0x05, 0x4B, 0x46, 0x7F, 0xFF, 0x0C, 0x10];

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Stats {
    pub resets: usize,
    pub slots: usize,
    /// Slots with devices sending different bits at the same time
    pub conflicting_slots: usize,
    pub slots_outside_section: usize,
    pub sections: usize,
}

impl Stats {
    /// Bus transactions of any kind
    pub fn traffic(&self) -> usize {
        self.resets + self.slots
    }

    /// Search steps where devices disagreed on the address bit (every
    /// disagreement shows up in both the bit and the complement slot)
    pub fn collisions(&self) -> usize {
        self.conflicting_slots / 2
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Idle,
    Rom,
    Search { bit: usize, phase: u8 },
    Match { byte: usize },
    Function,
    WriteScratchpad { offset: usize },
    MemoryAddress { write: bool, bytes: Vec<u8> },
    MemoryWrite { address: usize },
    Busy { remaining: usize },
    Done,
}

#[derive(Debug, Clone)]
pub struct SimDevice {
    pub rom: [u8; 8],
    pub scratchpad: [u8; 9],
    pub memory: [u8; 64],
    /// Temperature register loaded by the next conversion
    pub temperature: u16,
    /// Read slots answered with 0 after a convert command
    pub conversion_slots: usize,
    /// Scratchpad writes are ignored
    pub scratchpad_read_only: bool,
    /// Memory address whose write ends up stored with all bits flipped
    pub corrupt_memory_at: Option<usize>,
    /// ROM bit index from which the device stops answering a search
    pub silent_from_search_bit: Option<usize>,
    pub conversions: usize,
    state: State,
    rx: u8,
    rx_bits: u8,
    tx: VecDeque<bool>,
    low_from: u64,
    low_until: u64,
}

impl SimDevice {
    pub fn new(rom_id: RomId) -> Self {
        let mut scratchpad = [0u8; 9];
        scratchpad[..8].copy_from_slice(&POWER_ON_SCRATCHPAD);
        scratchpad[8] = crc8(&scratchpad[..8]);
        SimDevice {
            rom: rom_id.into(),
            scratchpad,
            memory: [0; 64],
            temperature: 0x0191,
            conversion_slots: 3,
            scratchpad_read_only: false,
            corrupt_memory_at: None,
            silent_from_search_bit: None,
            conversions: 0,
            state: State::Idle,
            rx: 0,
            rx_bits: 0,
            tx: VecDeque::new(),
            low_from: 0,
            low_until: 0,
        }
    }

    pub fn with_temperature(mut self, raw: u16) -> Self {
        self.temperature = raw;
        self
    }

    fn pulls_low(&self, now: u64) -> bool {
        self.low_from <= now && now < self.low_until
    }

    fn rom_bit(&self, bit: usize) -> bool {
        self.rom[bit / 8] & (1 << (bit % 8)) != 0
    }

    fn queue(&mut self, bytes: &[u8]) {
        for byte in bytes {
            for bit in 0..8 {
                self.tx.push_back(byte & (1 << bit) != 0);
            }
        }
    }

    fn on_reset(&mut self, now: u64) {
        self.state = State::Rom;
        self.rx = 0;
        self.rx_bits = 0;
        self.tx.clear();
        self.low_from = now + PRESENCE_DELAY;
        self.low_until = now + PRESENCE_DELAY + PRESENCE_HOLD;
    }

    fn send(&mut self, start: u64, bit: bool) -> Option<bool> {
        if !bit {
            self.low_from = start;
            self.low_until = start + SEND_ZERO_HOLD;
        }
        Some(bit)
    }

    /// Handles one time slot, returns the bit this device put on the line
    fn on_slot(&mut self, start: u64, written: bool) -> Option<bool> {
        match self.state.clone() {
            State::Idle => None,
            State::Search { bit, .. }
                if self.silent_from_search_bit.is_some_and(|from| bit >= from) =>
            {
                self.state = State::Idle;
                None
            }
            State::Search { bit, phase } => match phase {
                0 => {
                    self.state = State::Search { bit, phase: 1 };
                    let value = self.rom_bit(bit);
                    self.send(start, value)
                }
                1 => {
                    self.state = State::Search { bit, phase: 2 };
                    let value = !self.rom_bit(bit);
                    self.send(start, value)
                }
                _ => {
                    self.state = if written != self.rom_bit(bit) || bit + 1 == 64 {
                        State::Idle
                    } else {
                        State::Search {
                            bit: bit + 1,
                            phase: 0,
                        }
                    };
                    None
                }
            },
            State::Busy { remaining } => {
                if remaining == 0 {
                    self.state = State::Done;
                    None
                } else {
                    self.state = State::Busy {
                        remaining: remaining - 1,
                    };
                    self.send(start, false)
                }
            }
            _ if !self.tx.is_empty() => {
                let bit = self.tx.pop_front().unwrap_or(true);
                self.send(start, bit)
            }
            State::Done => None,
            _ => {
                self.rx |= (written as u8) << self.rx_bits;
                self.rx_bits += 1;
                if self.rx_bits == 8 {
                    let byte = self.rx;
                    self.rx = 0;
                    self.rx_bits = 0;
                    self.on_byte(byte);
                }
                None
            }
        }
    }

    fn on_byte(&mut self, byte: u8) {
        self.state = match std::mem::replace(&mut self.state, State::Idle) {
            State::Rom => match byte {
                0xF0 => State::Search { bit: 0, phase: 0 },
                0x55 => State::Match { byte: 0 },
                0x33 => {
                    let rom = self.rom;
                    self.queue(&rom);
                    State::Function
                }
                0xCC => State::Function,
                _ => State::Idle,
            },
            State::Match { byte: index } => {
                if byte != self.rom[index] {
                    State::Idle
                } else if index + 1 == 8 {
                    State::Function
                } else {
                    State::Match { byte: index + 1 }
                }
            }
            State::Function => match byte {
                0x44 => {
                    self.conversions += 1;
                    self.scratchpad[0] = self.temperature as u8;
                    self.scratchpad[1] = (self.temperature >> 8) as u8;
                    self.scratchpad[8] = crc8(&self.scratchpad[..8]);
                    State::Busy {
                        remaining: self.conversion_slots,
                    }
                }
                0x4E => State::WriteScratchpad { offset: 0 },
                0xBE => {
                    let scratchpad = self.scratchpad;
                    self.queue(&scratchpad);
                    State::Done
                }
                0xF0 => State::MemoryAddress {
                    write: false,
                    bytes: Vec::new(),
                },
                0x0F => State::MemoryAddress {
                    write: true,
                    bytes: Vec::new(),
                },
                _ => State::Idle,
            },
            State::WriteScratchpad { offset } => {
                if !self.scratchpad_read_only {
                    self.scratchpad[2 + offset] = byte;
                    self.scratchpad[8] = crc8(&self.scratchpad[..8]);
                }
                if offset + 1 == 3 {
                    State::Done
                } else {
                    State::WriteScratchpad { offset: offset + 1 }
                }
            }
            State::MemoryAddress { write, mut bytes } => {
                bytes.push(byte);
                if bytes.len() < 2 {
                    State::MemoryAddress { write, bytes }
                } else {
                    let address = usize::from(u16::from_le_bytes([bytes[0], bytes[1]]));
                    if write {
                        State::MemoryWrite { address }
                    } else {
                        let data = self.memory[address..].to_vec();
                        self.queue(&data);
                        State::Done
                    }
                }
            }
            State::MemoryWrite { address } => {
                let stored = if self.corrupt_memory_at == Some(address) {
                    !byte
                } else {
                    byte
                };
                self.memory[address] = stored;
                self.queue(&[0xA5, 0x5A, stored]);
                State::MemoryWrite {
                    address: address + 1,
                }
            }
            state => state,
        };
    }
}

pub struct Bus {
    now: u64,
    master_low_since: Option<u64>,
    in_section: bool,
    pub stuck_low: bool,
    pub devices: Vec<SimDevice>,
    pub stats: Stats,
    /// Length of every low pulse driven by the master, in µs
    pub pulses: Vec<u64>,
}

impl Bus {
    pub fn now_us(&self) -> u64 {
        self.now / US
    }

    fn line_low(&self) -> bool {
        self.master_low_since.is_some()
            || self.stuck_low
            || self.devices.iter().any(|device| device.pulls_low(self.now))
    }

    fn on_pulse(&mut self, start: u64) {
        let now = self.now;
        let length = now - start;
        self.pulses.push(length / US);
        if !self.in_section {
            self.stats.slots_outside_section += 1;
        }

        if length >= RESET_MIN {
            self.stats.resets += 1;
            for device in self.devices.iter_mut() {
                device.on_reset(now);
            }
            return;
        }

        self.stats.slots += 1;
        let written = length < ONE_MAX;
        let sent: Vec<bool> = self
            .devices
            .iter_mut()
            .filter_map(|device| device.on_slot(start, written))
            .collect();
        if sent.contains(&true) && sent.contains(&false) {
            self.stats.conflicting_slots += 1;
        }
    }
}

pub type SharedBus = Rc<RefCell<Bus>>;

pub struct SimPin(SharedBus);

impl BusPin for SimPin {
    type Error = Infallible;

    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.0.borrow().line_low())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(self.0.borrow().line_low())
    }

    fn drive_low(&mut self) -> Result<(), Self::Error> {
        let mut bus = self.0.borrow_mut();
        if bus.master_low_since.is_none() {
            bus.master_low_since = Some(bus.now);
        }
        Ok(())
    }

    fn release(&mut self) -> Result<(), Self::Error> {
        let mut bus = self.0.borrow_mut();
        if let Some(start) = bus.master_low_since.take() {
            bus.on_pulse(start);
        }
        Ok(())
    }
}

pub struct SimDelay(SharedBus);

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.0.borrow_mut().now += u64::from(ns);
    }

    fn delay_us(&mut self, us: u32) {
        self.0.borrow_mut().now += u64::from(us) * US;
    }
}

/// Marks the bus as being inside an atomic section, refusing nesting
pub struct SimSection(SharedBus);

impl AtomicSection for SimSection {
    fn run<R>(&mut self, f: impl FnOnce() -> R) -> R {
        {
            let mut bus = self.0.borrow_mut();
            assert!(!bus.in_section, "atomic sections must not nest");
            bus.in_section = true;
            bus.stats.sections += 1;
        }
        let result = f();
        self.0.borrow_mut().in_section = false;
        result
    }
}

pub type SimDriver = Driver<SimPin, SimSection>;

pub fn bus(devices: Vec<SimDevice>) -> (SimDriver, SimDelay, SharedBus) {
    let bus = Rc::new(RefCell::new(Bus {
        now: 0,
        master_low_since: None,
        in_section: false,
        stuck_low: false,
        devices,
        stats: Stats::default(),
        pulses: Vec::new(),
    }));
    let driver = Driver::with_section(SimPin(bus.clone()), SimSection(bus.clone()));
    (driver, SimDelay(bus.clone()), bus)
}

/// Pin and delay without a custom section, for drivers using `CriticalSection`
pub fn pin_and_delay(devices: Vec<SimDevice>) -> (SimPin, SimDelay, SharedBus) {
    let (driver, delay, bus) = bus(devices);
    let (pin, _) = driver.free();
    // the simulated section flag stays clear, slots are counted as outside
    (pin, delay, bus)
}

/// Builds a valid ROM id from a family code and a serial number
pub fn rom_id(family: u8, serial: [u8; 6]) -> RomId {
    let mut raw = [0u8; 8];
    raw[0] = family;
    raw[1..7].copy_from_slice(&serial);
    raw[7] = crc8(&raw[..7]);
    RomId::from(raw)
}

pub fn ds18b20(serial: [u8; 6]) -> SimDevice {
    SimDevice::new(rom_id(0x28, serial))
}
