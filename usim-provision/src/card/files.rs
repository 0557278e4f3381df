//! Elementary file locations on sysmocom cards
//!
//! Paths are absolute from the MF and are selected one identifier at a
//! time. The vendor specific files live under DF_SYSTEM (SJA2/SJA5) or
//! DF 7FCC (SJS1).

use std::fmt;

use super::variant::{CardTypeVariant, Generation};

/// Absolute path of a file, MF first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilePath(pub &'static [u16]);

impl FilePath {
    pub fn ids(&self) -> &'static [u16] {
        self.0
    }

    /// File identifier of the final EF
    pub fn fid(&self) -> u16 {
        self.0.last().copied().unwrap_or(MF)
    }
}

impl fmt::Display for FilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|id| format!("{:04X}", id)).collect();
        f.write_str(&parts.join("/"))
    }
}

pub const MF: u16 = 0x3F00;
pub const DF_GSM: u16 = 0x7F20;
pub const ADF_USIM: u16 = 0x7FFF;
pub const ADF_ISIM: u16 = 0x7FFE;
pub const DF_5GS: u16 = 0x5FC0;
pub const DF_SYSTEM: u16 = 0xA515;
pub const DF_SJS1_VENDOR: u16 = 0x7FCC;

// Identity, present on every variant
pub const EF_ICCID: FilePath = FilePath(&[MF, 0x2FE2]);
pub const EF_GSM_IMSI: FilePath = FilePath(&[MF, DF_GSM, 0x6F07]);
pub const EF_GSM_AD: FilePath = FilePath(&[MF, DF_GSM, 0x6FAD]);
pub const EF_USIM_IMSI: FilePath = FilePath(&[MF, ADF_USIM, 0x6F07]);
pub const EF_USIM_AD: FilePath = FilePath(&[MF, ADF_USIM, 0x6FAD]);

// Network selection
pub const EF_PLMNSEL: FilePath = FilePath(&[MF, DF_GSM, 0x6F30]);
pub const EF_HPLMNWACT: FilePath = FilePath(&[MF, DF_GSM, 0x6F62]);
pub const EF_OPLMNWACT: FilePath = FilePath(&[MF, DF_GSM, 0x6F61]);

// 5G concealment and the service table
pub const EF_UST: FilePath = FilePath(&[MF, ADF_USIM, 0x6F38]);
pub const EF_SUCI_CALC_INFO: FilePath = FilePath(&[MF, ADF_USIM, DF_5GS, 0x6FE2]);
pub const EF_ROUTING_INDICATOR: FilePath = FilePath(&[MF, ADF_USIM, DF_5GS, 0x6FE3]);

// SJA2 / SJA5 vendor files
pub const EF_SJA_AUTH_2G: FilePath = FilePath(&[MF, DF_GSM, 0x6F20]);
pub const EF_SJA_AUTH_USIM: FilePath = FilePath(&[MF, ADF_USIM, 0xAF01]);
pub const EF_SJA_AUTH_ISIM: FilePath = FilePath(&[MF, ADF_ISIM, 0xAF01]);
pub const EF_SJA_MILENAGE_CFG: FilePath = FilePath(&[MF, DF_SYSTEM, 0xAF20]);
pub const EF_SJA5_TUAK_CFG: FilePath = FilePath(&[MF, ADF_USIM, 0xAF22]);
pub const EF_SJA_SQN: FilePath = FilePath(&[MF, ADF_USIM, 0xAF30]);

// SJS1 vendor files
pub const EF_SJS1_AUTH: FilePath = FilePath(&[MF, DF_SJS1_VENDOR, 0x6F00]);
pub const EF_SJS1_MILENAGE_CFG: FilePath = FilePath(&[MF, DF_SJS1_VENDOR, 0x6F01]);
pub const EF_SJS1_SQN: FilePath = FilePath(&[MF, DF_SJS1_VENDOR, 0x6F02]);
pub const EF_SJS1_KI: FilePath = FilePath(&[MF, DF_GSM, 0x00FF]);
pub const EF_SJS1_OPC: FilePath = FilePath(&[MF, DF_GSM, 0x00F7]);

/// Authentication slot file for a generation on SJA2/SJA5
///
/// SJS1 has no per-generation slot files and returns None.
pub fn auth_slot(variant: CardTypeVariant, generation: Generation) -> Option<FilePath> {
    match variant {
        CardTypeVariant::Sjs1 => None,
        CardTypeVariant::Sja2 | CardTypeVariant::Sja5 => Some(match generation {
            Generation::TwoG => EF_SJA_AUTH_2G,
            Generation::ThreeG => EF_SJA_AUTH_USIM,
            Generation::FourFiveG => EF_SJA_AUTH_ISIM,
        }),
    }
}

pub fn milenage_cfg(variant: CardTypeVariant) -> FilePath {
    match variant {
        CardTypeVariant::Sjs1 => EF_SJS1_MILENAGE_CFG,
        _ => EF_SJA_MILENAGE_CFG,
    }
}

pub fn sqn(variant: CardTypeVariant) -> FilePath {
    match variant {
        CardTypeVariant::Sjs1 => EF_SJS1_SQN,
        _ => EF_SJA_SQN,
    }
}

/// Files the card never lets anyone read back
const SECRET_FILES: [FilePath; 9] = [
    EF_SJA_AUTH_2G,
    EF_SJA_AUTH_USIM,
    EF_SJA_AUTH_ISIM,
    EF_SJA_MILENAGE_CFG,
    EF_SJA5_TUAK_CFG,
    EF_SJS1_AUTH,
    EF_SJS1_MILENAGE_CFG,
    EF_SJS1_KI,
    EF_SJS1_OPC,
];

pub fn is_secret(path: &FilePath) -> bool {
    SECRET_FILES.contains(path)
}

/// Same as [`is_secret`] for a path held as plain identifiers
pub fn is_secret_ids(ids: &[u16]) -> bool {
    SECRET_FILES.iter().any(|p| p.ids() == ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_display() {
        assert_eq!(EF_SUCI_CALC_INFO.to_string(), "3F00/7FFF/5FC0/6FE2");
        assert_eq!(EF_ICCID.fid(), 0x2FE2);
    }

    #[test]
    fn test_auth_slots() {
        assert_eq!(
            auth_slot(CardTypeVariant::Sja5, Generation::FourFiveG),
            Some(EF_SJA_AUTH_ISIM)
        );
        assert_eq!(auth_slot(CardTypeVariant::Sjs1, Generation::TwoG), None);
    }

    #[test]
    fn test_identity_files_are_not_secret() {
        for path in [EF_ICCID, EF_GSM_IMSI, EF_USIM_IMSI, EF_GSM_AD, EF_UST] {
            assert!(!is_secret(&path));
        }
        assert!(is_secret(&EF_SJS1_KI));
    }
}
