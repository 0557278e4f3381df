//! APDU (Application Protocol Data Unit) handling
//!
//! Command and response units for the UICC / GSM SIM command sets used when
//! provisioning cards. The host side builds commands with the constructors on
//! [`APDU`] and encodes them with [`APDU::to_bytes`]; the simulated card in
//! [`crate::sim`] goes the other way with [`parse_apdu`].
//!
//! # Example
//! ```
//! use usim_provision::apdu::{parse_apdu, APDU, Class};
//!
//! let select = APDU::select(Class::Uicc, 0x3F00);
//! let raw = select.to_bytes();
//! assert_eq!(raw, vec![0x00, 0xA4, 0x00, 0x04, 0x02, 0x3F, 0x00]);
//!
//! let parsed = parse_apdu(&raw).unwrap();
//! assert_eq!(parsed.ins, 0xA4);
//! ```

mod response;
mod status;

pub use response::Response;
pub use status::SW;

use thiserror::Error;

/// Errors that can occur during APDU parsing
#[derive(Debug, Error, PartialEq, Eq)]
pub enum APDUError {
    #[error("APDU too short: expected at least 4 bytes, got {0}")]
    TooShort(usize),

    #[error("Invalid APDU length")]
    InvalidLength,

    #[error("Command data too long for a short APDU: {0} bytes")]
    DataTooLong(usize),
}

/// Command class byte family
///
/// sysmoISIM cards speak the UICC (ETSI TS 102 221) command set, the older
/// sysmoUSIM-SJS1 administrative files are reached with GSM class commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Class {
    /// CLA 0x00
    Uicc,
    /// CLA 0xA0
    Gsm,
}

impl Class {
    pub fn cla(self) -> u8 {
        match self {
            Class::Uicc => 0x00,
            Class::Gsm => 0xA0,
        }
    }
}

/// A command APDU
///
/// # Fields
/// - `cla`: Class byte
/// - `ins`: Instruction byte
/// - `p1`, `p2`: Parameter bytes (command-specific)
/// - `data`: Command data (may be empty)
/// - `le`: Expected response length (None if not specified)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct APDU {
    /// Class byte (CLA)
    pub cla: u8,
    /// Instruction byte (INS)
    pub ins: u8,
    /// Parameter 1 (P1)
    pub p1: u8,
    /// Parameter 2 (P2)
    pub p2: u8,
    /// Command data (may be empty)
    pub data: Vec<u8>,
    /// Expected response length (Le), None if not specified
    pub le: Option<u32>,
}

impl APDU {
    /// Create a new APDU with just the header (CLA, INS, P1, P2)
    pub fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: Vec::new(),
            le: None,
        }
    }

    /// Create a new APDU with data
    pub fn with_data(cla: u8, ins: u8, p1: u8, p2: u8, data: Vec<u8>) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data,
            le: None,
        }
    }

    /// SELECT by file identifier
    ///
    /// UICC class asks for the FCP template (P2=0x04), GSM class uses P2=0x00.
    pub fn select(class: Class, fid: u16) -> Self {
        let p2 = match class {
            Class::Uicc => 0x04,
            Class::Gsm => 0x00,
        };
        Self::with_data(class.cla(), ins::SELECT, 0x00, p2, fid.to_be_bytes().to_vec())
    }

    /// READ BINARY of `length` bytes from `offset` in the selected EF
    pub fn read_binary(class: Class, offset: u16, length: u8) -> Self {
        let [p1, p2] = offset.to_be_bytes();
        let mut apdu = Self::new(class.cla(), ins::READ_BINARY, p1, p2);
        apdu.le = Some(if length == 0 { 256 } else { length as u32 });
        apdu
    }

    /// UPDATE BINARY at `offset` in the selected EF
    pub fn update_binary(class: Class, offset: u16, data: Vec<u8>) -> Self {
        let [p1, p2] = offset.to_be_bytes();
        Self::with_data(class.cla(), ins::UPDATE_BINARY, p1, p2, data)
    }

    /// VERIFY CHV / PIN against key reference `reference`
    ///
    /// An empty body asks the card for the remaining retry counter.
    pub fn verify(class: Class, reference: u8, data: Vec<u8>) -> Self {
        Self::with_data(class.cla(), ins::VERIFY, 0x00, reference, data)
    }

    /// GET RESPONSE for `length` pending bytes
    pub fn get_response(class: Class, length: u8) -> Self {
        let mut apdu = Self::new(class.cla(), ins::GET_RESPONSE, 0x00, 0x00);
        apdu.le = Some(if length == 0 { 256 } else { length as u32 });
        apdu
    }

    /// Get P1-P2 combined as a u16 (the offset for binary commands)
    pub fn p1p2(&self) -> u16 {
        ((self.p1 as u16) << 8) | (self.p2 as u16)
    }

    /// Encode as a short APDU: CLA INS P1 P2 [Lc Data] [Le]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(5 + self.data.len() + 1);
        out.extend_from_slice(&[self.cla, self.ins, self.p1, self.p2]);
        if !self.data.is_empty() {
            out.push(self.data.len() as u8);
            out.extend_from_slice(&self.data);
        }
        if let Some(le) = self.le {
            out.push(if le >= 256 { 0x00 } else { le as u8 });
        }
        out
    }

    /// Encode, rejecting bodies that do not fit a short APDU
    pub fn try_to_bytes(&self) -> Result<Vec<u8>, APDUError> {
        if self.data.len() > 255 {
            return Err(APDUError::DataTooLong(self.data.len()));
        }
        Ok(self.to_bytes())
    }
}

/// Parse raw bytes into a short-format APDU
///
/// - Case 1: CLA INS P1 P2
/// - Case 2: CLA INS P1 P2 Le
/// - Case 3: CLA INS P1 P2 Lc Data
/// - Case 4: CLA INS P1 P2 Lc Data Le
///
/// A single trailing byte is read as Le, which is how the GSM command set
/// encodes READ BINARY and GET RESPONSE.
pub fn parse_apdu(data: &[u8]) -> Result<APDU, APDUError> {
    if data.len() < 4 {
        return Err(APDUError::TooShort(data.len()));
    }

    let cla = data[0];
    let ins = data[1];
    let p1 = data[2];
    let p2 = data[3];

    let remaining = &data[4..];
    if remaining.is_empty() {
        return Ok(APDU::new(cla, ins, p1, p2));
    }

    let first_byte = remaining[0];

    // Case 2: Le only, Le=0 means 256
    if remaining.len() == 1 {
        let le = if first_byte == 0 { 256 } else { first_byte as u32 };
        return Ok(APDU {
            cla, ins, p1, p2,
            data: Vec::new(),
            le: Some(le),
        });
    }

    let lc = first_byte as usize;

    // Case 3: Lc + Data
    if remaining.len() == 1 + lc {
        return Ok(APDU {
            cla, ins, p1, p2,
            data: remaining[1..1 + lc].to_vec(),
            le: None,
        });
    }

    // Case 4: Lc + Data + Le
    if remaining.len() == 1 + lc + 1 {
        let le_byte = remaining[1 + lc];
        let le = if le_byte == 0 { 256 } else { le_byte as u32 };
        return Ok(APDU {
            cla, ins, p1, p2,
            data: remaining[1..1 + lc].to_vec(),
            le: Some(le),
        });
    }

    Err(APDUError::InvalidLength)
}

/// Instruction bytes used while provisioning
pub mod ins {
    pub const SELECT: u8 = 0xA4;
    pub const READ_BINARY: u8 = 0xB0;
    pub const UPDATE_BINARY: u8 = 0xD6;
    pub const VERIFY: u8 = 0x20;
    pub const GET_RESPONSE: u8 = 0xC0;
}

/// Key references for VERIFY
pub mod key_ref {
    /// ADM1 administrative key on sysmocom cards
    pub const ADM1: u8 = 0x0A;
}
