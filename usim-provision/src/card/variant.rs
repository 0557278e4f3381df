//! Card type variants and what each of them can be programmed with

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Mobile network generation a card authentication slot serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Generation {
    TwoG,
    ThreeG,
    FourFiveG,
}

impl Generation {
    pub const ALL: [Generation; 3] = [Generation::TwoG, Generation::ThreeG, Generation::FourFiveG];
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Generation::TwoG => "2G",
            Generation::ThreeG => "3G",
            Generation::FourFiveG => "4G/5G",
        })
    }
}

/// Authentication algorithm a slot can be configured with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    #[serde(rename = "COMP128v1")]
    Comp128v1,
    #[serde(rename = "COMP128v2")]
    Comp128v2,
    #[serde(rename = "COMP128v3")]
    Comp128v3,
    #[serde(rename = "MILENAGE")]
    Milenage,
    #[serde(rename = "SHA1-AKA")]
    Sha1Aka,
    #[serde(rename = "XOR")]
    Xor,
    #[serde(rename = "XOR-2G")]
    Xor2g,
    #[serde(rename = "TUAK")]
    Tuak,
}

impl Algorithm {
    pub const ALL: [Algorithm; 8] = [
        Algorithm::Comp128v1,
        Algorithm::Comp128v2,
        Algorithm::Comp128v3,
        Algorithm::Milenage,
        Algorithm::Sha1Aka,
        Algorithm::Xor,
        Algorithm::Xor2g,
        Algorithm::Tuak,
    ];

    /// Token used in input files and backups
    pub fn token(self) -> &'static str {
        match self {
            Algorithm::Comp128v1 => "COMP128v1",
            Algorithm::Comp128v2 => "COMP128v2",
            Algorithm::Comp128v3 => "COMP128v3",
            Algorithm::Milenage => "MILENAGE",
            Algorithm::Sha1Aka => "SHA1-AKA",
            Algorithm::Xor => "XOR",
            Algorithm::Xor2g => "XOR-2G",
            Algorithm::Tuak => "TUAK",
        }
    }

    /// Whether the algorithm needs an OPc/OP value
    pub fn needs_opc(self) -> bool {
        matches!(self, Algorithm::Milenage | Algorithm::Sha1Aka | Algorithm::Tuak)
    }

    /// COMP128 and XOR-2G only produce 2G (SRES/Kc) vectors
    pub fn serves(self, generation: Generation) -> bool {
        match self {
            Algorithm::Comp128v1
            | Algorithm::Comp128v2
            | Algorithm::Comp128v3
            | Algorithm::Xor2g => {
                generation == Generation::TwoG
            }
            _ => true,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Error returned when an algorithm token is not known at all
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown algorithm token '{0}'")]
pub struct UnknownAlgorithm(pub String);

impl FromStr for Algorithm {
    type Err = UnknownAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Algorithm::ALL
            .into_iter()
            .find(|a| a.token() == s.trim())
            .ok_or_else(|| UnknownAlgorithm(s.to_string()))
    }
}

/// What a card type supports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// XOR-2G and TUAK are available
    pub tuak: bool,
    /// 256-bit K and TOPc (TUAK only)
    pub long_keys: bool,
    /// 5G SUCI concealment files are present
    pub concealment: bool,
    /// The card has a 4G/5G authentication slot distinct from 3G
    pub separate_4g5g_slot: bool,
}

impl Capabilities {
    /// Check whether `algorithm` can be placed into the slot for `generation`
    pub fn supports(&self, algorithm: Algorithm, generation: Generation) -> bool {
        if !algorithm.serves(generation) {
            return false;
        }
        match algorithm {
            Algorithm::Tuak | Algorithm::Xor2g => self.tuak,
            _ => true,
        }
    }

    /// Algorithms legal for a generation, in token order
    pub fn algorithms_for(&self, generation: Generation) -> Vec<Algorithm> {
        Algorithm::ALL
            .into_iter()
            .filter(|a| self.supports(*a, generation))
            .collect()
    }
}

/// The card families this tool knows how to program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CardTypeVariant {
    #[serde(rename = "SJA2")]
    Sja2,
    #[serde(rename = "SJA5")]
    Sja5,
    #[serde(rename = "SJS1")]
    Sjs1,
}

impl CardTypeVariant {
    pub const ALL: [CardTypeVariant; 3] =
        [CardTypeVariant::Sja2, CardTypeVariant::Sja5, CardTypeVariant::Sjs1];

    pub fn capabilities(self) -> Capabilities {
        match self {
            CardTypeVariant::Sja2 => Capabilities {
                tuak: false,
                long_keys: false,
                concealment: false,
                separate_4g5g_slot: true,
            },
            CardTypeVariant::Sja5 => Capabilities {
                tuak: true,
                long_keys: true,
                concealment: true,
                separate_4g5g_slot: true,
            },
            CardTypeVariant::Sjs1 => Capabilities {
                tuak: false,
                long_keys: false,
                concealment: false,
                separate_4g5g_slot: false,
            },
        }
    }

    /// Short tag used in backups and on the command line
    pub fn tag(self) -> &'static str {
        match self {
            CardTypeVariant::Sja2 => "SJA2",
            CardTypeVariant::Sja5 => "SJA5",
            CardTypeVariant::Sjs1 => "SJS1",
        }
    }

    /// Product name
    pub fn product_name(self) -> &'static str {
        match self {
            CardTypeVariant::Sja2 => "sysmoISIM-SJA2",
            CardTypeVariant::Sja5 => "sysmoISIM-SJA5",
            CardTypeVariant::Sjs1 => "sysmoUSIM-SJS1",
        }
    }
}

impl fmt::Display for CardTypeVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown card type '{0}' (expected SJA2, SJA5 or SJS1)")]
pub struct UnknownCardType(pub String);

impl FromStr for CardTypeVariant {
    type Err = UnknownCardType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CardTypeVariant::ALL
            .into_iter()
            .find(|v| v.tag().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownCardType(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_tokens_parse() {
        for algo in Algorithm::ALL {
            assert_eq!(algo.token().parse::<Algorithm>().unwrap(), algo);
        }
        assert!("MILENAGE2".parse::<Algorithm>().is_err());
        assert!("milenage".parse::<Algorithm>().is_err());
    }

    #[test]
    fn test_tuak_only_on_sja5() {
        for gen in [Generation::ThreeG, Generation::FourFiveG] {
            assert!(CardTypeVariant::Sja5.capabilities().supports(Algorithm::Tuak, gen));
            assert!(!CardTypeVariant::Sja2.capabilities().supports(Algorithm::Tuak, gen));
            assert!(!CardTypeVariant::Sjs1.capabilities().supports(Algorithm::Tuak, gen));
        }
    }

    #[test]
    fn test_xor_2g_is_2g_only() {
        let caps = CardTypeVariant::Sja5.capabilities();
        assert!(caps.supports(Algorithm::Xor2g, Generation::TwoG));
        assert!(!caps.supports(Algorithm::Xor2g, Generation::ThreeG));
        assert!(!CardTypeVariant::Sjs1.capabilities().supports(Algorithm::Xor2g, Generation::TwoG));
    }

    #[test]
    fn test_comp128_not_offered_for_3g() {
        let algos = CardTypeVariant::Sja2.capabilities().algorithms_for(Generation::ThreeG);
        assert_eq!(algos, vec![Algorithm::Milenage, Algorithm::Sha1Aka, Algorithm::Xor]);
    }

    #[test]
    fn test_variant_from_str() {
        assert_eq!("sja5".parse::<CardTypeVariant>().unwrap(), CardTypeVariant::Sja5);
        assert!("SJA9".parse::<CardTypeVariant>().is_err());
    }
}
