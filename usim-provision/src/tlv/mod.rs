//! BER-TLV encoding for the structured 5G files
//!
//! Only the encoder is needed: EF.SUCI_Calc_Info is written, never parsed.
//!
//! # Example
//! ```
//! use usim_provision::tlv::{tags, TLVBuilder};
//!
//! let info = TLVBuilder::new()
//!     .add(tags::PROTECTION_SCHEME_LIST, &[0x00, 0x01, 0x01])
//!     .build();
//! assert_eq!(info, vec![0x80, 0x03, 0x00, 0x01, 0x01]);
//! ```

mod encoder;

pub use encoder::{TLVBuilder, TLVEncoder};

/// Tags used in EF.SUCI_Calc_Info
pub mod tags {
    /// Protection scheme identifier list
    pub const PROTECTION_SCHEME_LIST: u32 = 0x80;
    /// Home network public key list
    pub const HN_PUBKEY_LIST: u32 = 0xA0;
}
