//! Dallas/Maxim CRC8 (polynomial x^8 + x^5 + x^4 + 1, LSB first)

const POLYNOMIAL: u8 = 0x8C;

const TABLE: [u8; 256] = build_table();

const fn build_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x01 != 0 {
                (crc >> 1) ^ POLYNOMIAL
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Folds one byte into a running crc
#[inline]
pub fn crc8_update(crc: u8, byte: u8) -> u8 {
    TABLE[(crc ^ byte) as usize]
}

pub fn compute_partial_crc8(crc: u8, data: &[u8]) -> u8 {
    data.iter().fold(crc, |crc, byte| crc8_update(crc, *byte))
}

pub fn crc8(data: &[u8]) -> u8 {
    compute_partial_crc8(0, data)
}
