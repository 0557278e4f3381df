//! Response APDUs

use super::status::SW;

/// Data bytes plus status word, as exchanged with a card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub data: Vec<u8>,
    pub sw1: u8,
    pub sw2: u8,
}

impl Response {
    pub fn new(data: Vec<u8>, sw: u16) -> Self {
        Self {
            data,
            sw1: (sw >> 8) as u8,
            sw2: sw as u8,
        }
    }

    /// Split raw bytes received from a reader into data and status word
    ///
    /// Returns None when fewer than two bytes came back.
    pub fn from_bytes(raw: &[u8]) -> Option<Self> {
        if raw.len() < 2 {
            return None;
        }
        let (data, sw) = raw.split_at(raw.len() - 2);
        Some(Self {
            data: data.to_vec(),
            sw1: sw[0],
            sw2: sw[1],
        })
    }

    pub fn success(data: Vec<u8>) -> Self {
        Self::new(data, SW::SUCCESS)
    }

    pub fn ok() -> Self {
        Self::success(Vec::new())
    }

    /// Status word only
    pub fn error(sw: u16) -> Self {
        Self::new(Vec::new(), sw)
    }

    /// 63Cx with `retries` attempts left
    pub fn counter_warning(retries: u8) -> Self {
        Self::error(SW::counter_warning(retries))
    }

    /// Check if the response is okay (0x9000, 0x61xx or GSM 0x9Fxx)
    pub fn is_okay(&self) -> bool {
        SW::is_success(self.sw())
    }

    pub fn sw(&self) -> u16 {
        ((self.sw1 as u16) << 8) | (self.sw2 as u16)
    }

    /// Bytes waiting for GET RESPONSE (61xx, or 9Fxx from GSM cards)
    pub fn available_response(&self) -> Option<u8> {
        if self.sw1 == 0x61 || self.sw1 == 0x9F {
            Some(self.sw2)
        } else {
            None
        }
    }

    /// Data followed by SW1 SW2
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut result = Vec::with_capacity(self.data.len() + 2);
        result.extend_from_slice(&self.data);
        result.push(self.sw1);
        result.push(self.sw2);
        result
    }

}
