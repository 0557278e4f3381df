//! Nibble-swapped BCD as used by IMSI, ICCID and PLMN files

/// Swap the two nibbles of every byte
pub fn swap_nibbles(data: &[u8]) -> Vec<u8> {
    data.iter().map(|b| b.rotate_left(4)).collect()
}

/// Pack ASCII digits (and `F` filler) two per byte, first digit in the high nibble
fn pack(digits: &str) -> Option<Vec<u8>> {
    if digits.len() % 2 != 0 {
        return None;
    }
    hex::decode(digits).ok()
}

/// Unpack bytes into lower case hex digits
fn unpack(data: &[u8]) -> String {
    hex::encode(data)
}

pub const IMSI_FILE_LEN: usize = 9;
pub const ICCID_FILE_LEN: usize = 10;

/// EF.IMSI: length byte 08, then `9` + 15 digits nibble-swapped
pub fn encode_imsi(imsi: &str) -> Option<Vec<u8>> {
    let packed = pack(&format!("9{}", imsi))?;
    let mut out = Vec::with_capacity(IMSI_FILE_LEN);
    out.push(packed.len() as u8);
    out.extend(swap_nibbles(&packed));
    Some(out)
}

pub fn decode_imsi(data: &[u8]) -> Option<String> {
    let (&len, rest) = data.split_first()?;
    let len = len as usize;
    if len == 0 || len > rest.len() {
        return None;
    }
    let digits = unpack(&swap_nibbles(&rest[..len]));
    // First nibble is the parity/type indicator
    let digits = digits.get(1..)?.trim_end_matches('f');
    digits
        .bytes()
        .all(|b| b.is_ascii_digit())
        .then(|| digits.to_string())
}

/// EF.ICCID: 20 digits nibble-swapped, `F` padded
pub fn encode_iccid(iccid: &str) -> Option<Vec<u8>> {
    if iccid.len() > ICCID_FILE_LEN * 2 {
        return None;
    }
    let padded = format!("{:f<20}", iccid);
    Some(swap_nibbles(&pack(&padded)?))
}

pub fn decode_iccid(data: &[u8]) -> Option<String> {
    let digits = unpack(&swap_nibbles(data));
    let digits = digits.trim_end_matches('f');
    (!digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())).then(|| digits.to_string())
}

/// 3-byte PLMN: `[MCC2 MCC1] [MNC3 MCC3] [MNC2 MNC1]`, MNC3 = F for 2-digit MNCs
pub fn encode_plmn(plmn: &str) -> Option<[u8; 3]> {
    let d: Vec<u8> = plmn
        .bytes()
        .map(|b| b.is_ascii_digit().then(|| b - b'0'))
        .collect::<Option<_>>()?;
    let mnc3 = match d.len() {
        5 => 0x0F,
        6 => d[5],
        _ => return None,
    };
    Some([d[1] << 4 | d[0], mnc3 << 4 | d[2], d[4] << 4 | d[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_imsi() {
        let encoded = encode_imsi("001010000000001").unwrap();
        assert_eq!(
            encoded,
            vec![0x08, 0x09, 0x10, 0x10, 0x00, 0x00, 0x00, 0x00, 0x10]
        );
        assert_eq!(decode_imsi(&encoded).unwrap(), "001010000000001");
    }

    #[test]
    fn test_imsi_with_trailing_file_padding() {
        let mut encoded = encode_imsi("262011234567890").unwrap();
        encoded.extend_from_slice(&[0xFF, 0xFF]);
        assert_eq!(decode_imsi(&encoded).unwrap(), "262011234567890");
    }

    #[test]
    fn test_decode_imsi_garbage() {
        assert_eq!(decode_imsi(&[]), None);
        assert_eq!(decode_imsi(&[0x08, 0x09]), None);
        assert_eq!(decode_imsi(&[0xFF; 9]), None);
    }

    #[test]
    fn test_encode_iccid_19_digits() {
        let encoded = encode_iccid("8988211000000000001").unwrap();
        assert_eq!(encoded.len(), ICCID_FILE_LEN);
        assert_eq!(encoded[0], 0x98);
        assert_eq!(encoded[9], 0xF1);
        assert_eq!(decode_iccid(&encoded).unwrap(), "8988211000000000001");
    }

    #[test]
    fn test_encode_iccid_20_digits() {
        let encoded = encode_iccid("89882110000000000012").unwrap();
        assert_eq!(encoded[9], 0x21);
        assert_eq!(decode_iccid(&encoded).unwrap(), "89882110000000000012");
    }

    #[test]
    fn test_encode_plmn() {
        assert_eq!(encode_plmn("24001"), Some([0x42, 0xF0, 0x10]));
        assert_eq!(encode_plmn("310410"), Some([0x13, 0x00, 0x14]));
        assert_eq!(encode_plmn("2400"), None);
        assert_eq!(encode_plmn("24a01"), None);
    }
}
