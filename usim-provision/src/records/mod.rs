//! Raw input records
//!
//! A [`RawRecord`] is the column to value form a card's parameters take
//! between input files, validation and backup restore. Values are kept as
//! the operator wrote them; parsing happens in [`crate::validation`].

mod card_params;
mod csv_file;

pub use card_params::{load_card_parameters, parse_card_parameters};
pub use csv_file::{load_csv, read_csv, save_csv, write_csv};

use std::collections::BTreeMap;
use std::path::PathBuf;

use thiserror::Error;

/// Column names used by input files
pub mod columns {
    pub const IMSI: &str = "IMSI";
    pub const ICCID: &str = "ICCID";
    pub const KI: &str = "Ki";
    pub const OPC: &str = "OPc";
    pub const ALGO_2G: &str = "ALGO_2G";
    pub const ALGO_3G: &str = "ALGO_3G";
    pub const ALGO_4G5G: &str = "ALGO_4G5G";
    pub const MNC_LENGTH: &str = "MNC_LENGTH";
    pub const USE_OPC: &str = "USE_OPC";
    pub const MILENAGE_R: [&str; 5] = [
        "MILENAGE_R1",
        "MILENAGE_R2",
        "MILENAGE_R3",
        "MILENAGE_R4",
        "MILENAGE_R5",
    ];
    pub const MILENAGE_C: [&str; 5] = [
        "MILENAGE_C1",
        "MILENAGE_C2",
        "MILENAGE_C3",
        "MILENAGE_C4",
        "MILENAGE_C5",
    ];
    pub const TUAK_RES_SIZE: &str = "TUAK_RES_SIZE";
    pub const TUAK_MAC_SIZE: &str = "TUAK_MAC_SIZE";
    pub const TUAK_CKIK_SIZE: &str = "TUAK_CKIK_SIZE";
    pub const TUAK_NUM_KECCAK: &str = "TUAK_NUM_KECCAK";
    pub const SQN_IND_SIZE_BITS: &str = "SQN_IND_SIZE_BITS";
    pub const SQN_CHECK_ENABLED: &str = "SQN_CHECK_ENABLED";
    pub const SQN_AGE_LIMIT_ENABLED: &str = "SQN_AGE_LIMIT_ENABLED";
    pub const SQN_MAX_DELTA_ENABLED: &str = "SQN_MAX_DELTA_ENABLED";
    pub const SQN_CHECK_SKIP_FIRST: &str = "SQN_CHECK_SKIP_FIRST";
    pub const HPLMN: &str = "HPLMN";
    pub const OPLMN_ACT: &str = "OPLMN_ACT";
    pub const ROUTING_INDICATOR: &str = "ROUTING_INDICATOR";
    pub const PROTECTION_SCHEME_ID: &str = "PROTECTION_SCHEME_ID";
    pub const HNET_PUBKEY_ID: &str = "HNET_PUBKEY_ID";
    pub const HNET_PUBKEY: &str = "HNET_PUBKEY";
    pub const ADM1: &str = "ADM1";
}

use columns::*;

/// Columns every input file must carry
pub const REQUIRED_COLUMNS: [&str; 8] =
    [IMSI, ICCID, KI, OPC, ALGO_2G, ALGO_3G, ALGO_4G5G, MNC_LENGTH];

pub const MILENAGE_COLUMNS: [&str; 10] = [
    MILENAGE_R[0],
    MILENAGE_R[1],
    MILENAGE_R[2],
    MILENAGE_R[3],
    MILENAGE_R[4],
    MILENAGE_C[0],
    MILENAGE_C[1],
    MILENAGE_C[2],
    MILENAGE_C[3],
    MILENAGE_C[4],
];

pub const TUAK_COLUMNS: [&str; 4] = [TUAK_RES_SIZE, TUAK_MAC_SIZE, TUAK_CKIK_SIZE, TUAK_NUM_KECCAK];

pub const SQN_COLUMNS: [&str; 5] = [
    SQN_IND_SIZE_BITS,
    SQN_CHECK_ENABLED,
    SQN_AGE_LIMIT_ENABLED,
    SQN_MAX_DELTA_ENABLED,
    SQN_CHECK_SKIP_FIRST,
];

pub const NETWORK_COLUMNS: [&str; 2] = [HPLMN, OPLMN_ACT];

pub const CONCEALMENT_COLUMNS: [&str; 4] = [
    ROUTING_INDICATOR,
    PROTECTION_SCHEME_ID,
    HNET_PUBKEY_ID,
    HNET_PUBKEY,
];

/// Every known column in file order
pub fn all_columns() -> Vec<&'static str> {
    let mut cols: Vec<&'static str> = REQUIRED_COLUMNS.to_vec();
    cols.push(USE_OPC);
    cols.extend_from_slice(&MILENAGE_COLUMNS);
    cols.extend_from_slice(&SQN_COLUMNS);
    cols.extend_from_slice(&TUAK_COLUMNS);
    cols.extend_from_slice(&NETWORK_COLUMNS);
    cols.extend_from_slice(&CONCEALMENT_COLUMNS);
    cols.push(ADM1);
    cols
}

/// Columns that must never be written into backups or logs
pub fn is_secret_column(column: &str) -> bool {
    column == KI
        || column == OPC
        || column == ADM1
        || MILENAGE_COLUMNS.contains(&column)
        || TUAK_COLUMNS.contains(&column)
}

/// Defaults applied to absent base columns
const BASE_DEFAULTS: [(&str, &str); 5] = [
    (USE_OPC, "1"),
    (ALGO_2G, "MILENAGE"),
    (ALGO_3G, "MILENAGE"),
    (ALGO_4G5G, "MILENAGE"),
    (MNC_LENGTH, "2"),
];

/// Group defaults, applied to unset members once any member is set
const GROUP_DEFAULTS: [&[(&str, &str)]; 4] = [
    &[
        (MILENAGE_R[0], "40"),
        (MILENAGE_R[1], "00"),
        (MILENAGE_R[2], "20"),
        (MILENAGE_R[3], "40"),
        (MILENAGE_R[4], "60"),
        (MILENAGE_C[0], "00000000000000000000000000000000"),
        (MILENAGE_C[1], "00000000000000000000000000000001"),
        (MILENAGE_C[2], "00000000000000000000000000000002"),
        (MILENAGE_C[3], "00000000000000000000000000000004"),
        (MILENAGE_C[4], "00000000000000000000000000000008"),
    ],
    &[
        (TUAK_RES_SIZE, "128"),
        (TUAK_MAC_SIZE, "128"),
        (TUAK_CKIK_SIZE, "128"),
        (TUAK_NUM_KECCAK, "12"),
    ],
    &[
        (SQN_IND_SIZE_BITS, "5"),
        (SQN_CHECK_ENABLED, "1"),
        (SQN_AGE_LIMIT_ENABLED, "0"),
        (SQN_MAX_DELTA_ENABLED, "1"),
        (SQN_CHECK_SKIP_FIRST, "1"),
    ],
    &[
        (ROUTING_INDICATOR, "0000"),
        (PROTECTION_SCHEME_ID, "1"),
        (HNET_PUBKEY_ID, "1"),
    ],
];

/// Errors from reading or writing record files
#[derive(Debug, Error)]
pub enum InputError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("no card records found")]
    Empty,
}

/// One card's parameters as column/value text
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    values: BTreeMap<String, String>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of a column, with blank values treated as absent
    pub fn get(&self, column: &str) -> Option<&str> {
        self.values
            .get(column)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn is_set(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.values.insert(column.into(), value.into());
    }

    pub fn with(mut self, column: &str, value: &str) -> Self {
        self.set(column, value);
        self
    }

    pub fn remove(&mut self, column: &str) -> Option<String> {
        self.values.remove(column)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Copy of the record with defaults filled in
    ///
    /// Base columns always get their default when blank. Milenage, TUAK,
    /// SQN and concealment groups are only completed when at least one
    /// member of the group is set.
    pub fn with_defaults(&self) -> RawRecord {
        let mut out = self.clone();
        for (column, value) in BASE_DEFAULTS {
            if !out.is_set(column) {
                out.set(column, value);
            }
        }
        for group in GROUP_DEFAULTS {
            if group.iter().any(|(column, _)| self.is_set(column)) {
                for (column, value) in group.iter() {
                    if !out.is_set(column) {
                        out.set(*column, *value);
                    }
                }
            }
        }
        out
    }
}

impl std::fmt::Debug for RawRecord {
    /// Secret columns are masked
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (column, value) in &self.values {
            if is_secret_column(column) && !value.is_empty() {
                map.entry(column, &"<redacted>");
            } else {
                map.entry(column, value);
            }
        }
        map.finish()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = RawRecord::new();
        for (k, v) in iter {
            record.set(k, v);
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_is_absent() {
        let r = RawRecord::new().with(IMSI, "  ");
        assert_eq!(r.get(IMSI), None);
        assert!(!r.is_set(IMSI));
    }

    #[test]
    fn test_base_defaults() {
        let r = RawRecord::new().with(ALGO_2G, "COMP128v1").with_defaults();
        assert_eq!(r.get(ALGO_2G), Some("COMP128v1"));
        assert_eq!(r.get(ALGO_3G), Some("MILENAGE"));
        assert_eq!(r.get(USE_OPC), Some("1"));
        assert_eq!(r.get(MNC_LENGTH), Some("2"));
        // Groups stay unset
        assert!(!r.is_set(MILENAGE_R[0]));
        assert!(!r.is_set(SQN_IND_SIZE_BITS));
    }

    #[test]
    fn test_group_defaults_fill_only_when_touched() {
        let r = RawRecord::new().with(MILENAGE_R[1], "11").with_defaults();
        assert_eq!(r.get(MILENAGE_R[0]), Some("40"));
        assert_eq!(r.get(MILENAGE_R[1]), Some("11"));
        assert_eq!(r.get(MILENAGE_C[4]), Some("00000000000000000000000000000008"));
        assert!(!r.is_set(TUAK_RES_SIZE));

        let r = RawRecord::new().with(HNET_PUBKEY, "AA").with_defaults();
        assert_eq!(r.get(ROUTING_INDICATOR), Some("0000"));
        assert_eq!(r.get(PROTECTION_SCHEME_ID), Some("1"));
    }

    #[test]
    fn test_debug_masks_secrets() {
        let r = RawRecord::new()
            .with(KI, "000102030405060708090A0B0C0D0E0F")
            .with(IMSI, "001010000000001");
        let shown = format!("{:?}", r);
        assert!(shown.contains("001010000000001"));
        assert!(!shown.contains("000102030405"));
    }

    #[test]
    fn test_all_columns_unique() {
        let cols = all_columns();
        let mut dedup = cols.clone();
        dedup.sort();
        dedup.dedup();
        assert_eq!(cols.len(), dedup.len());
    }
}
