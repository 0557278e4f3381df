//! Write-only key material

use std::fmt;

use thiserror::Error;

/// Key bytes that are written to a card and never shown again
///
/// `Debug` and `Display` only reveal the length.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretBytes(Vec<u8>);

impl SecretBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Bytes for the codec; do not log them
    pub fn expose(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretBytes({})", self)
    }
}

impl fmt::Display for SecretBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} bytes redacted>", self.0.len())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("ADM1 key must be exactly 8 digits")]
pub struct InvalidAdm1Key;

/// The 8 digit administrative key
#[derive(Clone, PartialEq, Eq)]
pub struct Adm1Key(String);

impl Adm1Key {
    pub const LEN: usize = 8;

    pub fn parse(value: &str) -> Result<Self, InvalidAdm1Key> {
        let value = value.trim();
        if value.len() != Self::LEN || !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(InvalidAdm1Key);
        }
        Ok(Self(value.to_string()))
    }

    /// ASCII digits as presented in VERIFY
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl std::str::FromStr for Adm1Key {
    type Err = InvalidAdm1Key;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Debug for Adm1Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Adm1Key(********)")
    }
}
