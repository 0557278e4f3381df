//! Authentication slot encodings
//!
//! SJA2/SJA5 keep one slot file per generation: a header byte followed by
//! the key and the OPc. SJS1 has a two byte algorithm file plus separate
//! Ki and OPc files.

use crate::card::{Algorithm, Generation};

const HEADER_USE_OPC: u8 = 1 << 4;
const HEADER_KEY_256: u8 = 1 << 6;

/// Offset of the key within an SJA slot
pub const SJA_KEY_OFFSET: u16 = 1;

/// Algorithm code in the low nibble of an SJA slot header
pub fn sja_code(algorithm: Algorithm) -> u8 {
    match algorithm {
        Algorithm::Comp128v1 => 0x01,
        Algorithm::Comp128v2 => 0x02,
        Algorithm::Comp128v3 => 0x03,
        Algorithm::Milenage => 0x04,
        Algorithm::Sha1Aka => 0x05,
        Algorithm::Tuak => 0x06,
        Algorithm::Xor2g => 0x0E,
        Algorithm::Xor => 0x0F,
    }
}

pub fn sja_header(algorithm: Algorithm, use_opc: bool, key_256: bool) -> u8 {
    let mut header = sja_code(algorithm);
    if use_opc {
        header |= HEADER_USE_OPC;
    }
    if key_256 {
        header |= HEADER_KEY_256;
    }
    header
}

/// Algorithm codes of the SJS1 EF.AUTH bytes
///
/// XOR has distinct codes per slot; COMP128 and XOR-2G have no 3G code.
pub fn sjs1_code(algorithm: Algorithm, generation: Generation) -> Option<u8> {
    let code = match (algorithm, generation) {
        (Algorithm::Milenage, _) => 0x01,
        (Algorithm::Comp128v1, Generation::TwoG) => 0x03,
        (Algorithm::Xor, Generation::TwoG) => 0x04,
        (Algorithm::Comp128v2, Generation::TwoG) => 0x06,
        (Algorithm::Comp128v3, Generation::TwoG) => 0x07,
        (Algorithm::Xor, _) => 0x08,
        (Algorithm::Sha1Aka, _) => 0x09,
        _ => return None,
    };
    Some(code)
}
