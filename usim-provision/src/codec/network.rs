//! PLMN selector files

use super::bcd::encode_plmn;
use crate::card::{Algorithm, Generation};
use crate::config::{ConfigurationRecord, OplmnEntry};

pub const PLMNSEL_LEN: usize = 24;
pub const OPLMN_ENTRY_LEN: usize = 5;
pub const OPLMN_SLOTS: usize = 40;

/// Access technology bits of a PLMNwAcT entry
pub mod act {
    pub const UTRAN: u16 = 0x8000;
    pub const EUTRAN: u16 = 0x4000;
    pub const NR: u16 = 0x2000;
    pub const GSM: u16 = 0x0080;
}

/// Technologies the card will attach with, derived from its algorithms
pub fn access_technology(record: &ConfigurationRecord) -> u16 {
    let mut flags = 0;
    for generation in Generation::ALL {
        // Every slot is always configured; the bitmap follows the slots.
        let algorithm = record.algorithm(generation);
        flags |= match generation {
            Generation::TwoG => act::GSM,
            Generation::ThreeG => act::UTRAN,
            Generation::FourFiveG if algorithm == Algorithm::Tuak => act::EUTRAN | act::NR,
            Generation::FourFiveG => act::EUTRAN,
        };
    }
    flags
}

/// EF.PLMNsel with the home network first, `FF` padded
pub fn plmnsel(hplmn: &str) -> Option<Vec<u8>> {
    let mut data = vec![0xFF; PLMNSEL_LEN];
    data[..3].copy_from_slice(&encode_plmn(hplmn)?);
    Some(data)
}

fn entry(plmn: &str, act: u16) -> Option<[u8; OPLMN_ENTRY_LEN]> {
    let p = encode_plmn(plmn)?;
    let a = act.to_be_bytes();
    Some([p[0], p[1], p[2], a[0], a[1]])
}

/// Single entry EF.HPLMNwAcT
pub fn hplmnwact(hplmn: &str, act: u16) -> Option<Vec<u8>> {
    entry(hplmn, act).map(|e| e.to_vec())
}

/// EF.OPLMNwAcT with every slot present, unused slots `FF`
pub fn oplmnwact(entries: &[OplmnEntry]) -> Option<Vec<u8>> {
    if entries.len() > OPLMN_SLOTS {
        return None;
    }
    let mut data = vec![0xFF; OPLMN_SLOTS * OPLMN_ENTRY_LEN];
    for (slot, e) in data.chunks_exact_mut(OPLMN_ENTRY_LEN).zip(entries) {
        slot.copy_from_slice(&entry(&e.plmn, e.act)?);
    }
    Some(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plmnsel_padding() {
        let data = plmnsel("24001").unwrap();
        assert_eq!(data.len(), PLMNSEL_LEN);
        assert_eq!(&data[..4], &[0x42, 0xF0, 0x10, 0xFF]);
        assert!(plmnsel("2400").is_none());
    }

    #[test]
    fn test_hplmnwact() {
        assert_eq!(
            hplmnwact("310410", act::UTRAN | act::GSM).unwrap(),
            vec![0x13, 0x00, 0x14, 0x80, 0x80]
        );
    }

    #[test]
    fn test_oplmnwact_layout() {
        let entries = vec![
            OplmnEntry {
                plmn: "24001".into(),
                act: 0xC080,
            },
            OplmnEntry {
                plmn: "24002".into(),
                act: 0x4000,
            },
        ];
        let data = oplmnwact(&entries).unwrap();
        assert_eq!(data.len(), 200);
        assert_eq!(&data[..5], &[0x42, 0xF0, 0x10, 0xC0, 0x80]);
        assert_eq!(&data[5..10], &[0x42, 0xF0, 0x20, 0x40, 0x00]);
        assert!(data[10..].iter().all(|b| *b == 0xFF));
    }

    #[test]
    fn test_oplmnwact_too_many() {
        let entries = vec![
            OplmnEntry {
                plmn: "24001".into(),
                act: 0x8000,
            };
            41
        ];
        assert!(oplmnwact(&entries).is_none());
    }
}
