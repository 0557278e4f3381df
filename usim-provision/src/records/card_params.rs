//! `card-parameters.txt` as shipped with sysmocom card batches
//!
//! ```text
//! Card #1:
//! ICCID: 8988211000000000001
//! IMSI: 001010000000001
//! Ki: 00112233445566778899AABBCCDDEEFF
//! OPc: ABCDEF0123456789ABCDEF0123456789
//! ADM1: 12345678
//! ```

use std::path::Path;

use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;

use super::columns::*;
use super::{InputError, RawRecord};

static SECTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"Card\s+#\d+:").expect("static regex"));
static IMSI_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"IMSI:\s*(\d+)").expect("static regex"));
static ICCID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"ICCID:\s*(\d+)").expect("static regex"));
static KI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Ki:\s*([0-9A-Fa-f]+)").expect("static regex"));
static OPC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"OP[cC]?:\s*([0-9A-Fa-f]+)").expect("static regex"));
static ADM1_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"ADM1:\s*(\d{8})").expect("static regex"));

fn capture<'a>(re: &Regex, text: &'a str) -> Option<&'a str> {
    re.captures(text).and_then(|c| c.get(1)).map(|m| m.as_str())
}

/// Parse the text of a card parameters file
///
/// Sections without an IMSI are dropped.
pub fn parse_card_parameters(content: &str) -> Vec<RawRecord> {
    let mut records = Vec::new();
    for (n, section) in SECTION.split(content).skip(1).enumerate() {
        let mut record = RawRecord::new();
        if let Some(v) = capture(&IMSI_RE, section) {
            record.set(IMSI, v);
        }
        if let Some(v) = capture(&ICCID_RE, section) {
            record.set(ICCID, v);
        }
        if let Some(v) = capture(&KI_RE, section) {
            record.set(KI, v.to_uppercase());
        }
        if let Some(v) = capture(&OPC_RE, section) {
            record.set(OPC, v.to_uppercase());
        }
        if let Some(v) = capture(&ADM1_RE, section) {
            record.set(ADM1, v);
        }

        if record.is_set(IMSI) {
            records.push(record);
        } else {
            warn!("Card section {} has no IMSI, skipped", n + 1);
        }
    }
    records
}

/// Load a card parameters file
pub fn load_card_parameters(path: &Path) -> Result<Vec<RawRecord>, InputError> {
    let content = std::fs::read_to_string(path).map_err(|source| InputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let records = parse_card_parameters(&content);
    if records.is_empty() {
        return Err(InputError::Empty);
    }
    info!("Loaded {} cards from {}", records.len(), path.display());
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Card #1:
ICCID: 8988211000000000001
IMSI: 001010000000001
Ki: 00112233445566778899aabbccddeeff
OPc: ABCDEF0123456789ABCDEF0123456789
ADM1: 12345678

Card #2:
ICCID: 8988211000000000002
IMSI: 001010000000002
Ki: 00112233445566778899AABBCCDDEEFF
OP: 11112222333344445555666677778888

Card #3:
ICCID: 8988211000000000003
";

    #[test]
    fn test_parse_sections() {
        let records = parse_card_parameters(SAMPLE);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get(KI), Some("00112233445566778899AABBCCDDEEFF"));
        assert_eq!(records[0].get(ADM1), Some("12345678"));
        assert_eq!(records[1].get(OPC), Some("11112222333344445555666677778888"));
        assert_eq!(records[1].get(ADM1), None);
    }

    #[test]
    fn test_empty_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("card-parameters.txt");
        std::fs::write(&path, "nothing here").unwrap();
        assert!(matches!(load_card_parameters(&path), Err(InputError::Empty)));
    }
}
