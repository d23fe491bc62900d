/// Slot timing of the bus master, all values in microseconds.
///
/// The defaults follow the standard speed 1-Wire slots. Delays are executed
/// through `DelayNs`, so targets with a coarse or slow delay implementation
/// may need shorter values to land inside the device sampling windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timing {
    /// Reset pulse
    pub reset_low: u32,
    /// From releasing the reset pulse to sampling the presence pulse
    pub presence_sample: u32,
    /// Rest of the reset slot after sampling
    pub reset_recovery: u32,
    /// Number of polls while waiting for the line to return high after reset
    pub wire_high_polls: u32,
    /// Pause between two polls of the idle line
    pub wire_high_poll_interval: u32,
    pub write_one_low: u32,
    pub write_one_high: u32,
    pub write_zero_low: u32,
    pub write_zero_high: u32,
    /// Low pulse opening a read slot
    pub read_low: u32,
    /// From releasing the line to sampling it
    pub read_sample: u32,
    /// Rest of the read slot after sampling
    pub read_recovery: u32,
    /// Settling gap between the bits of a byte
    pub bit_gap: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Timing {
            reset_low: 480,
            presence_sample: 70,
            reset_recovery: 410,
            wire_high_polls: 125,
            wire_high_poll_interval: 2,
            write_one_low: 6,
            write_one_high: 64,
            write_zero_low: 60,
            write_zero_high: 10,
            read_low: 6,
            read_sample: 9,
            read_recovery: 55,
            bit_gap: 1,
        }
    }
}

impl Timing {
    /// Duration of one complete read slot
    pub fn read_slot(&self) -> u32 {
        self.read_low + self.read_sample + self.read_recovery
    }
}
