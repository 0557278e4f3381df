//! Card types, ATR detection and the file layout of each card family

pub mod detector;
pub mod files;
pub mod variant;

pub use detector::{atr_to_string, CardDetector, DetectionError};
pub use files::FilePath;
pub use variant::{Algorithm, Capabilities, CardTypeVariant, Generation, UnknownAlgorithm};
