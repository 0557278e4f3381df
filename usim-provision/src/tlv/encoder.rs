//! BER-TLV Encoder

/// TLV Encoder for building BER-TLV structures
pub struct TLVEncoder;

impl TLVEncoder {
    /// Encode a tag-value pair to bytes
    pub fn encode(tag: u32, value: &[u8]) -> Vec<u8> {
        let mut result = Vec::with_capacity(value.len() + 4);
        result.extend(Self::encode_tag(tag));
        result.extend(Self::encode_length(value.len()));
        result.extend_from_slice(value);
        result
    }

    /// Encode just the tag bytes
    pub fn encode_tag(tag: u32) -> Vec<u8> {
        if tag > 0xFFFF {
            vec![(tag >> 16) as u8, (tag >> 8) as u8, tag as u8]
        } else if tag > 0xFF {
            vec![(tag >> 8) as u8, tag as u8]
        } else {
            vec![tag as u8]
        }
    }

    /// Encode just the length bytes
    ///
    /// Short form below 128, otherwise 0x80 | n followed by n length bytes.
    pub fn encode_length(length: usize) -> Vec<u8> {
        if length < 128 {
            return vec![length as u8];
        }
        let bytes = length.to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        let mut out = Vec::with_capacity(1 + bytes.len() - skip);
        out.push(0x80 | (bytes.len() - skip) as u8);
        out.extend_from_slice(&bytes[skip..]);
        out
    }
}

/// Builder for concatenated TLV structures
#[derive(Debug, Default)]
pub struct TLVBuilder {
    data: Vec<u8>,
}

impl TLVBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a primitive TLV
    pub fn add(mut self, tag: u32, value: &[u8]) -> Self {
        self.data.extend(TLVEncoder::encode(tag, value));
        self
    }

    /// Add raw bytes (pre-encoded TLV)
    pub fn add_raw(mut self, data: &[u8]) -> Self {
        self.data.extend_from_slice(data);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.data
    }
}
