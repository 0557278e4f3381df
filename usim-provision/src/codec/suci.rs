//! 5G SUCI calculation info and routing indicator

use crate::config::Concealment;
use crate::tlv::{tags, TLVBuilder, TLVEncoder};

/// UST byte holding services 124 (SUCI by USIM) and 125 (SUCI by ME)
pub const UST_SUCI_OFFSET: u16 = 15;
/// Calculation in the ME
pub const UST_SUCI_BY_ME: u8 = 0x10;
/// Calculation on the USIM, which these cards don't do
pub const UST_SUCI_BY_USIM: u8 = 0x20;

/// EF.SUCI_Calc_Info
///
/// One protection scheme with priority 0 pointing at key index 1. The key
/// list is left out for the null scheme without a key.
pub fn calc_info(c: &Concealment) -> Vec<u8> {
    let schemes =
        TLVEncoder::encode(tags::PROTECTION_SCHEME_LIST, &[0x00, c.protection_scheme, 0x01]);
    let mut builder = TLVBuilder::new().add_raw(&schemes);
    if !c.pubkey.is_empty() {
        let mut key = vec![c.pubkey_id];
        key.extend_from_slice(&c.pubkey);
        builder = builder.add(tags::HN_PUBKEY_LIST, &key);
    }
    builder.build()
}

/// EF.Routing_Indicator: two BCD bytes followed by `FF FF`
pub fn routing_indicator(ri: &str) -> Option<Vec<u8>> {
    let mut data = hex::decode(ri).ok()?;
    if data.len() != 2 {
        return None;
    }
    data.extend_from_slice(&[0xFF, 0xFF]);
    Some(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calc_info_profile_a() {
        let c = Concealment {
            routing_indicator: "0000".into(),
            protection_scheme: 1,
            pubkey_id: 1,
            pubkey: vec![0xAA; 32],
        };
        let data = calc_info(&c);
        assert_eq!(&data[..5], &[0x80, 0x03, 0x00, 0x01, 0x01]);
        assert_eq!(&data[5..8], &[0xA0, 33, 0x01]);
        assert_eq!(data.len(), 5 + 2 + 33);
    }

    #[test]
    fn test_calc_info_null_scheme() {
        let c = Concealment {
            routing_indicator: "0000".into(),
            protection_scheme: 0,
            pubkey_id: 1,
            pubkey: Vec::new(),
        };
        assert_eq!(calc_info(&c), vec![0x80, 0x03, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn test_routing_indicator() {
        assert_eq!(routing_indicator("0123").unwrap(), vec![0x01, 0x23, 0xFF, 0xFF]);
        assert!(routing_indicator("012").is_none());
        assert!(routing_indicator("01234567").is_none());
    }
}
