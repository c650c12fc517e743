//! Helper for computing cyclic redundancy checks.
//!
//! Frames are protected by CRC-16/XMODEM (polynomial `0x1021`, no reflection,
//! zero initial value), the variant used by the receiver firmware.

/// Compute the check value of a slice of bytes.
pub fn checksum16(r: &[u8]) -> u16 {
    compute_crc(0, r)
}

/// Accumulate a slice of bytes into a cyclic redundancy check value.
pub fn compute_crc(init: u16, r: &[u8]) -> u16 {
    r.iter().fold(init, |acc, b| crc_byte(acc, *b))
}

/// Accumulate a single byte into a cyclic redundancy check value.
fn crc_byte(crc: u16, b: u8) -> u16 {
    const CRC_TABLE: [u16; 16] = [
        0x0000, 0x1021, 0x2042, 0x3063, 0x4084, 0x50A5, 0x60C6, 0x70E7, 0x8108, 0x9129, 0xA14A,
        0xB16B, 0xC18C, 0xD1AD, 0xE1CE, 0xF1EF,
    ];

    let crc = (crc << 4) ^ CRC_TABLE[(((crc >> 12) as u8 ^ (b >> 4)) & 0xF) as usize];
    (crc << 4) ^ CRC_TABLE[(((crc >> 12) as u8 ^ b) & 0xF) as usize]
}
