//! Programmer for sysmocom USIM/ISIM cards
//!
//! Writes subscriber identity, authentication keys, algorithm selection and
//! network parameters to sysmoUSIM-SJS1, sysmoISIM-SJA2 and sysmoISIM-SJA5
//! cards, one card after another from a list of records.
//!
//! The pieces:
//! - [`card`]: card types and ATR detection
//! - [`codec`]: record to file-write plan, per card type
//! - [`session`]: ADM1 verification and the retry counter
//! - [`programmer`]: plan execution and identity read-back
//! - [`validation`]: record diagnostics
//! - [`batch`]: the multi-card run loop
//! - [`inspect`]: detect and read back a single card
//! - [`backup`]: JSON snapshots taken before a card is written
//! - [`sim`]: an in-memory card for tests and dry runs

pub mod apdu;
pub mod backup;
pub mod batch;
pub mod card;
pub mod codec;
pub mod config;
pub mod error;
pub mod inspect;
pub mod programmer;
pub mod records;
pub mod session;
pub mod settings;
pub mod sim;
pub mod tlv;
pub mod transport;
pub mod validation;

pub use batch::{BatchEvent, BatchOrchestrator, BatchReport, Control};
pub use card::{CardDetector, CardTypeVariant};
pub use config::ConfigurationRecord;
pub use error::{ItemFailure, RetrySafety};
pub use inspect::CardInspection;
pub use settings::Settings;
pub use transport::Transport;
