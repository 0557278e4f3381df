use super::bcd;
use crate::card::{files, FilePath};
use crate::config::{ConfigurationRecord, Field};

/// Fields that can be read back from a card
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityField {
    Imsi,
    Iccid,
    MncLength,
}

impl IdentityField {
    pub const ALL: [IdentityField; 3] =
        [IdentityField::Imsi, IdentityField::Iccid, IdentityField::MncLength];

    pub fn field(self) -> Field {
        match self {
            IdentityField::Imsi => Field::Imsi,
            IdentityField::Iccid => Field::Iccid,
            IdentityField::MncLength => Field::MncLength,
        }
    }

    /// The file read back; DF GSM is present on every supported card
    pub fn path(self) -> FilePath {
        match self {
            IdentityField::Imsi => files::EF_GSM_IMSI,
            IdentityField::Iccid => files::EF_ICCID,
            IdentityField::MncLength => files::EF_GSM_AD,
        }
    }

    pub fn read_len(self) -> usize {
        match self {
            IdentityField::Imsi => bcd::IMSI_FILE_LEN,
            IdentityField::Iccid => bcd::ICCID_FILE_LEN,
            IdentityField::MncLength => 4,
        }
    }

    pub fn decode(self, data: &[u8]) -> Option<String> {
        match self {
            IdentityField::Imsi => bcd::decode_imsi(data),
            IdentityField::Iccid => bcd::decode_iccid(data),
            IdentityField::MncLength => match data.get(3).map(|b| b & 0x0F) {
                Some(n @ 1..=3) => Some(n.to_string()),
                _ => None,
            },
        }
    }

    /// The value a programmed card should read back
    pub fn expected(self, record: &ConfigurationRecord) -> String {
        match self {
            IdentityField::Imsi => record.imsi.clone(),
            IdentityField::Iccid => record.iccid.clone(),
            IdentityField::MncLength => record.mnc_length.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_mnc_length() {
        let f = IdentityField::MncLength;
        assert_eq!(f.decode(&[0x00, 0x00, 0x00, 0x03]).as_deref(), Some("3"));
        assert_eq!(f.decode(&[0x81, 0x00, 0x00, 0xF2]).as_deref(), Some("2"));
        assert_eq!(f.decode(&[0x00, 0x00, 0x00, 0x0F]), None);
        assert_eq!(f.decode(&[0x00, 0x00]), None);
    }

    #[test]
    fn test_decode_iccid_file() {
        let data = bcd::encode_iccid("8988211000000000001").unwrap();
        assert_eq!(
            IdentityField::Iccid.decode(&data).as_deref(),
            Some("8988211000000000001")
        );
    }
}
