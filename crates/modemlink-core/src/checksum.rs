//! Checksum and CRC routines
//!
//! Block check functions used by the transfer protocols and exposed for
//! general use. Every function takes a buffer plus an inclusive
//! `[start, end]` index range.
//!
//! Indices outside the buffer, or `start > end`, are programming errors and
//! panic like any other out-of-bounds slice access.

/// Sum of all bytes modulo 256 (XMODEM checksum mode)
pub fn checksum8(buf: &[u8], start: usize, end: usize) -> u8 {
    buf[start..=end]
        .iter()
        .fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Longitudinal redundancy check: running XOR of all bytes
pub fn lrc(buf: &[u8], start: usize, end: usize) -> u8 {
    buf[start..=end].iter().fold(0u8, |acc, &b| acc ^ b)
}

/// Dallas/Maxim 1-Wire CRC-8 (polynomial 0x31 reflected, init 0x00)
pub fn crc8_dallas_1wire(buf: &[u8], start: usize, end: usize) -> u8 {
    let mut crc = 0u8;
    for &byte in &buf[start..=end] {
        let mut data = byte;
        for _ in 0..8 {
            let mix = (crc ^ data) & 0x01;
            crc >>= 1;
            if mix != 0 {
                crc ^= 0x8C;
            }
            data >>= 1;
        }
    }
    crc
}

/// CRC-16/ARC (polynomial 0x8005 reflected, init 0x0000)
pub fn crc16(buf: &[u8], start: usize, end: usize) -> u16 {
    crc16_reflected(&buf[start..=end], 0xA001, 0x0000)
}

/// CRC-16-CCITT as used by XMODEM/YMODEM (polynomial 0x1021, init 0x0000, MSB first)
pub fn crc16_ccitt(buf: &[u8], start: usize, end: usize) -> u16 {
    crc16_ccitt_update(0, &buf[start..=end])
}

/// CRC-16-DNP (polynomial 0x3D65 reflected, init 0x0000, complemented).
///
/// The result is byte-swapped so that the high byte is the first byte
/// transmitted on the wire, matching DNP3 frame layout.
pub fn crc16_dnp(buf: &[u8], start: usize, end: usize) -> u16 {
    let crc = !crc16_reflected(&buf[start..=end], 0xA6BC, 0x0000);
    crc.swap_bytes()
}

/// CRC-16 with the IBM/Modbus initialisation (polynomial 0x8005 reflected, init 0xFFFF)
pub fn crc16_ibm(buf: &[u8], start: usize, end: usize) -> u16 {
    crc16_reflected(&buf[start..=end], 0xA001, 0xFFFF)
}

/// Feed `data` into a running CRC-16-CCITT value.
///
/// Used by the block framer, which checks whole payload slices.
pub(crate) fn crc16_ccitt_update(mut crc: u16, data: &[u8]) -> u16 {
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// LSB-first CRC-16 with a pre-reflected polynomial
fn crc16_reflected(data: &[u8], poly: u16, init: u16) -> u16 {
    let mut crc = init;
    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ poly;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}
