use modemlink_core::checksum::{
    checksum8, crc16, crc16_ccitt, crc16_dnp, crc16_ibm, crc8_dallas_1wire, lrc,
};

const SENTENCE: &[u8] = b"The root cause of suffering is our identification with the mind.";

fn last() -> usize {
    SENTENCE.len() - 1
}

#[test]
fn test_checksum8_vector() {
    assert_eq!(checksum8(SENTENCE, 0, last()), 0xA3);
}

#[test]
fn test_lrc_vector() {
    // Excludes the final '.'
    assert_eq!(lrc(SENTENCE, 0, last() - 1), 0x4B);
    assert_eq!(lrc(SENTENCE, 0, last()), 0x4B ^ b'.');
}

#[test]
fn test_crc8_dallas_vector() {
    assert_eq!(crc8_dallas_1wire(SENTENCE, 0, last()), 0x4D);
}

#[test]
fn test_crc16_vector() {
    assert_eq!(crc16(SENTENCE, 0, last()), 0xAB97);
}

#[test]
fn test_crc16_ccitt_vector() {
    assert_eq!(crc16_ccitt(SENTENCE, 0, last()), 0x138A);
}

#[test]
fn test_crc16_dnp_vector() {
    assert_eq!(crc16_dnp(SENTENCE, 0, last()), 0x55BD);
}

#[test]
fn test_crc16_ibm_vector() {
    assert_eq!(crc16_ibm(SENTENCE, 0, last()), 0x84D7);
}

#[test]
fn test_sub_range_matches_slice() {
    // A window inside a larger buffer gives the same result as the bare window
    let mut padded = vec![0xEEu8; 5];
    padded.extend_from_slice(SENTENCE);
    padded.extend_from_slice(&[0x11; 7]);
    let start = 5;
    let end = 5 + last();
    assert_eq!(crc16_ccitt(&padded, start, end), 0x138A);
    assert_eq!(checksum8(&padded, start, end), 0xA3);
    assert_eq!(crc16_ibm(&padded, start, end), 0x84D7);
}

#[test]
fn test_single_byte_range() {
    assert_eq!(checksum8(b"A", 0, 0), b'A');
    assert_eq!(lrc(b"xyz", 1, 1), b'y');
}

#[test]
fn test_deterministic() {
    let first = crc16_ccitt(SENTENCE, 3, 40);
    for _ in 0..10 {
        assert_eq!(crc16_ccitt(SENTENCE, 3, 40), first);
    }
}
