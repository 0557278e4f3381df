//! ATR (Answer To Reset) classification
//!
//! sysmocom cards share a long common ATR prefix and differ in the last few
//! historical bytes. Patterns are tried most specific first and the first
//! match wins; anything else is rejected rather than guessed.

use super::variant::CardTypeVariant;
use thiserror::Error;

/// Shortest ATR worth looking at
pub const MIN_ATR_LEN: usize = 16;

/// sysmoISIM-SJA5 (9FV)
pub const SJA5_ATR_9FV: &[u8] = &[
    0x3B, 0x9F, 0x96, 0x80, 0x1F, 0x87, 0x80, 0x31, 0xE0, 0x73, 0xFE, 0x21, 0x1B, 0x67, 0x4A,
    0x35, 0x75, 0x30, 0x35,
];

/// sysmoISIM-SJA5 (SLM17)
pub const SJA5_ATR_SLM17: &[u8] = &[
    0x3B, 0x9F, 0x96, 0x80, 0x1F, 0x87, 0x80, 0x31, 0xE0, 0x73, 0xFE, 0x21, 0x1B, 0x67, 0x4A,
    0x35, 0x75, 0x30, 0x34,
];

/// sysmoISIM-SJA5 (3FJ)
pub const SJA5_ATR_3FJ: &[u8] = &[
    0x3B, 0x9F, 0x96, 0x80, 0x1F, 0xC7, 0x80, 0x31, 0xE0, 0x73, 0xFE, 0x21, 0x1B, 0x64, 0x10,
    0x38, 0x0A, 0x00, 0x74,
];

/// sysmoUSIM-SJS1
pub const SJS1_ATR: &[u8] = &[
    0x3B, 0x9F, 0x96, 0x80, 0x1F, 0x87, 0x80, 0x31, 0xE0, 0x73, 0xFE, 0x21, 0x1B, 0x67, 0x4A,
    0x35, 0x75, 0x30, 0x31,
];

/// sysmoISIM-SJA2, matched on the first 16 bytes only
pub const SJA2_ATR_PREFIX: &[u8] = &[
    0x3B, 0x9F, 0x96, 0x80, 0x1F, 0x87, 0x80, 0x31, 0xE0, 0x73, 0xFE, 0x21, 0x1B, 0x67, 0x4A,
    0x4C,
];

/// Ordered pattern table: (pattern, variant)
const PATTERNS: &[(&[u8], CardTypeVariant)] = &[
    (SJA5_ATR_9FV, CardTypeVariant::Sja5),
    (SJA5_ATR_SLM17, CardTypeVariant::Sja5),
    (SJA5_ATR_3FJ, CardTypeVariant::Sja5),
    (SJS1_ATR, CardTypeVariant::Sjs1),
    (SJA2_ATR_PREFIX, CardTypeVariant::Sja2),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DetectionError {
    #[error("unrecognized card (ATR {})", atr_to_string(.0))]
    UnrecognizedCard(Vec<u8>),
}

/// Classifies ATRs into card type variants
#[derive(Debug, Clone, Copy, Default)]
pub struct CardDetector;

impl CardDetector {
    /// Classify an ATR
    pub fn detect(atr: &[u8]) -> Result<CardTypeVariant, DetectionError> {
        if atr.len() < MIN_ATR_LEN {
            return Err(DetectionError::UnrecognizedCard(atr.to_vec()));
        }
        PATTERNS
            .iter()
            .find(|(pattern, _)| atr.starts_with(pattern))
            .map(|(_, variant)| *variant)
            .ok_or_else(|| DetectionError::UnrecognizedCard(atr.to_vec()))
    }

    /// A full ATR the given variant presents, used by the simulated reader
    pub fn reference_atr(variant: CardTypeVariant) -> Vec<u8> {
        match variant {
            CardTypeVariant::Sja2 => {
                let mut atr = SJA2_ATR_PREFIX.to_vec();
                atr.extend_from_slice(&[0x75, 0x30, 0x34, 0x05, 0x4B, 0xA9]);
                atr
            }
            CardTypeVariant::Sja5 => {
                let mut atr = SJA5_ATR_9FV.to_vec();
                atr.extend_from_slice(&[0x02, 0x59, 0xC4]);
                atr
            }
            CardTypeVariant::Sjs1 => {
                let mut atr = SJS1_ATR.to_vec();
                atr.extend_from_slice(&[0x02, 0x65, 0xF8]);
                atr
            }
        }
    }
}

/// Render an ATR as space separated upper case hex (`3B 9F 96 ...`)
pub fn atr_to_string(atr: &[u8]) -> String {
    if atr.is_empty() {
        return "No ATR".to_string();
    }
    atr.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
