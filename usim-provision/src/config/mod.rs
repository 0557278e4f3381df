//! Parsed card configuration
//!
//! [`ConfigurationRecord`] is what a validated [`RawRecord`] becomes. Key
//! material is held in [`SecretBytes`] and is only ever handed to the codec.

mod secret;

pub use secret::{Adm1Key, InvalidAdm1Key, SecretBytes};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::card::{Algorithm, Generation};
use crate::records::{columns, RawRecord};
use crate::validation::{self, Diagnostic};

/// A field of a configuration record, named by its input column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Imsi,
    Iccid,
    MncLength,
    Ki,
    Opc,
    UseOpc,
    Algorithm(Generation),
    /// Index 0..5
    MilenageR(usize),
    /// Index 0..5
    MilenageC(usize),
    TuakResSize,
    TuakMacSize,
    TuakCkikSize,
    TuakNumKeccak,
    SqnIndSizeBits,
    SqnCheckEnabled,
    SqnAgeLimitEnabled,
    SqnMaxDeltaEnabled,
    SqnCheckSkipFirst,
    Hplmn,
    OplmnAct,
    RoutingIndicator,
    ProtectionSchemeId,
    HnetPubkeyId,
    HnetPubkey,
    /// Whole-file writes of a parameter group
    MilenageConfig,
    TuakConfig,
    SqnConfig,
    /// Service bits in EF.UST touched by concealment
    ServiceTable,
    Adm1,
}

impl Field {
    /// Input column the field is read from
    pub fn column(&self) -> &'static str {
        use columns::*;
        match self {
            Field::Imsi => IMSI,
            Field::Iccid => ICCID,
            Field::MncLength => MNC_LENGTH,
            Field::Ki => KI,
            Field::Opc => OPC,
            Field::UseOpc => USE_OPC,
            Field::Algorithm(Generation::TwoG) => ALGO_2G,
            Field::Algorithm(Generation::ThreeG) => ALGO_3G,
            Field::Algorithm(Generation::FourFiveG) => ALGO_4G5G,
            Field::MilenageR(i) => MILENAGE_R[(*i).min(4)],
            Field::MilenageC(i) => MILENAGE_C[(*i).min(4)],
            Field::TuakResSize => TUAK_RES_SIZE,
            Field::TuakMacSize => TUAK_MAC_SIZE,
            Field::TuakCkikSize => TUAK_CKIK_SIZE,
            Field::TuakNumKeccak => TUAK_NUM_KECCAK,
            Field::SqnIndSizeBits => SQN_IND_SIZE_BITS,
            Field::SqnCheckEnabled => SQN_CHECK_ENABLED,
            Field::SqnAgeLimitEnabled => SQN_AGE_LIMIT_ENABLED,
            Field::SqnMaxDeltaEnabled => SQN_MAX_DELTA_ENABLED,
            Field::SqnCheckSkipFirst => SQN_CHECK_SKIP_FIRST,
            Field::Hplmn => HPLMN,
            Field::OplmnAct => OPLMN_ACT,
            Field::RoutingIndicator => ROUTING_INDICATOR,
            Field::ProtectionSchemeId => PROTECTION_SCHEME_ID,
            Field::HnetPubkeyId => HNET_PUBKEY_ID,
            Field::HnetPubkey => HNET_PUBKEY,
            Field::MilenageConfig => "MILENAGE_R1..C5",
            Field::TuakConfig => "TUAK_*",
            Field::SqnConfig => "SQN_*",
            Field::ServiceTable => "UST",
            Field::Adm1 => ADM1,
        }
    }

    /// Fields that are write-only on the card
    pub fn is_secret(&self) -> bool {
        matches!(
            self,
            Field::Ki
                | Field::Opc
                | Field::MilenageR(_)
                | Field::MilenageC(_)
                | Field::TuakResSize
                | Field::TuakMacSize
                | Field::TuakCkikSize
                | Field::TuakNumKeccak
                | Field::MilenageConfig
                | Field::TuakConfig
                | Field::Adm1
        )
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// Milenage rotation and constant values
#[derive(Clone, PartialEq, Eq)]
pub struct MilenageParams {
    pub r: [u8; 5],
    pub c: [[u8; 16]; 5],
}

impl fmt::Debug for MilenageParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MilenageParams(<redacted>)")
    }
}

/// TUAK output sizes in bits and the Keccak iteration count
#[derive(Clone, PartialEq, Eq)]
pub struct TuakParams {
    pub res_size: u16,
    pub mac_size: u16,
    pub ckik_size: u16,
    pub num_keccak: u8,
}

impl fmt::Debug for TuakParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TuakParams(<redacted>)")
    }
}

/// Sequence number checking policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqnPolicy {
    pub ind_size_bits: u8,
    pub check_enabled: bool,
    pub age_limit_enabled: bool,
    pub max_delta_enabled: bool,
    pub check_skip_first: bool,
}

/// Operator PLMN with its access technology bitmap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OplmnEntry {
    pub plmn: String,
    pub act: u16,
}

/// Home and operator network selection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSelection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hplmn: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub oplmn: Vec<OplmnEntry>,
}

impl NetworkSelection {
    /// `PLMN:ACT` pairs joined with commas, as in the input column
    pub fn oplmn_column(&self) -> String {
        self.oplmn
            .iter()
            .map(|e| format!("{}:{:04X}", e.plmn, e.act))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// 5G SUCI concealment parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concealment {
    pub routing_indicator: String,
    pub protection_scheme: u8,
    pub pubkey_id: u8,
    /// Home network public key; empty for the null scheme
    #[serde(with = "hex")]
    pub pubkey: Vec<u8>,
}

/// One card's parameters, parsed and validated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationRecord {
    pub imsi: String,
    pub iccid: String,
    pub mnc_length: u8,
    pub ki: SecretBytes,
    /// OPc, or OP when `use_opc` is false
    pub opc: Option<SecretBytes>,
    pub use_opc: bool,
    pub algo_2g: Algorithm,
    pub algo_3g: Algorithm,
    pub algo_4g5g: Algorithm,
    pub milenage: Option<MilenageParams>,
    pub tuak: Option<TuakParams>,
    pub sqn: Option<SqnPolicy>,
    pub network: Option<NetworkSelection>,
    pub concealment: Option<Concealment>,
    pub adm1: Option<Adm1Key>,
}

impl ConfigurationRecord {
    /// Validate a raw record generically and parse it
    ///
    /// Any diagnostic rejects the whole record.
    pub fn from_raw(raw: &RawRecord) -> Result<Self, Vec<Diagnostic>> {
        validation::parse(raw)
    }

    pub fn algorithm(&self, generation: Generation) -> Algorithm {
        match generation {
            Generation::TwoG => self.algo_2g,
            Generation::ThreeG => self.algo_3g,
            Generation::FourFiveG => self.algo_4g5g,
        }
    }

    pub fn uses_tuak(&self) -> bool {
        Generation::ALL
            .iter()
            .any(|g| self.algorithm(*g) == Algorithm::Tuak)
    }

    /// Whether any configured algorithm needs OPc/OP
    pub fn needs_opc(&self) -> bool {
        Generation::ALL.iter().any(|g| self.algorithm(*g).needs_opc())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_columns() {
        assert_eq!(Field::Algorithm(Generation::FourFiveG).column(), "ALGO_4G5G");
        assert_eq!(Field::MilenageC(2).to_string(), "MILENAGE_C3");
        assert!(Field::Ki.is_secret());
        assert!(Field::TuakNumKeccak.is_secret());
        assert!(!Field::Imsi.is_secret());
    }

    #[test]
    fn test_oplmn_column() {
        let net = NetworkSelection {
            hplmn: None,
            oplmn: vec![
                OplmnEntry {
                    plmn: "24001".into(),
                    act: 0xC080,
                },
                OplmnEntry {
                    plmn: "310410".into(),
                    act: 0x8000,
                },
            ],
        };
        assert_eq!(net.oplmn_column(), "24001:C080,310410:8000");
    }

    #[test]
    fn test_concealment_pubkey_serializes_as_hex() {
        let c = Concealment {
            routing_indicator: "0000".into(),
            protection_scheme: 1,
            pubkey_id: 1,
            pubkey: vec![0xAB, 0x01],
        };
        let json = serde_json::to_string(&c).unwrap();
        assert!(json.contains("\"ab01\""));
    }
}
