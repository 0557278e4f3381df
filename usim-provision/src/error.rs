//! Per-card failure taxonomy of a batch run

use thiserror::Error;

use crate::backup::BackupError;
use crate::codec::CodecError;
use crate::config::Field;
use crate::programmer::ProgramError;
use crate::session::{AuthError, AuthOutcome};
use crate::validation::{Diagnostic, DiagnosticKind};

/// Whether repeating the failed step can harm the card
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrySafety {
    /// Nothing irreversible happened
    Retryable,
    /// Retrying costs something, such as an ADM1 attempt
    OperatorDecision,
    /// The card may be partially written or unusable
    Unsafe,
}

fn joined(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ItemFailure {
    #[error("card type not recognized (ATR {atr})")]
    DetectionFailure { atr: String },
    #[error("ADM1 rejected, {remaining} attempts left")]
    AuthenticationFailure { remaining: u8 },
    #[error("ADM1 is locked")]
    AuthenticationLocked,
    #[error("{remaining} ADM1 attempts left, confirmation needed before trying")]
    ConfirmationRequired { remaining: u8 },
    #[error("no ADM1 key for this card")]
    MissingAdm1Key,
    #[error("invalid record: {}", joined(.0))]
    Validation(Vec<Diagnostic>),
    #[error("not supported by the card: {}", joined(.0))]
    CapabilityViolation(Vec<Diagnostic>),
    #[error("{field} cannot be encoded")]
    Encoding { field: Field },
    #[error("writing {field} failed: {message}")]
    WriteFailure { field: Field, message: String },
    #[error("{field} reads back as {actual}, expected {expected}")]
    VerifyMismatch {
        field: Field,
        expected: String,
        actual: String,
    },
    #[error("no card in the reader")]
    CardNotPresent,
    #[error("card removed")]
    CardRemoved,
    #[error("backup failed: {0}")]
    Backup(String),
    #[error("card I/O failed: {0}")]
    CardIo(String),
}

impl ItemFailure {
    /// Failure for an ADM1 outcome that leaves the card unauthenticated
    pub fn from_auth(outcome: AuthOutcome) -> Option<Self> {
        match outcome {
            AuthOutcome::Authenticated => None,
            AuthOutcome::Rejected { remaining } => {
                Some(ItemFailure::AuthenticationFailure { remaining })
            }
            AuthOutcome::Locked => Some(ItemFailure::AuthenticationLocked),
            AuthOutcome::ConfirmationRequired { remaining } => {
                Some(ItemFailure::ConfirmationRequired { remaining })
            }
        }
    }

    pub fn retry_safety(&self) -> RetrySafety {
        match self {
            ItemFailure::DetectionFailure { .. }
            | ItemFailure::MissingAdm1Key
            | ItemFailure::Validation(_)
            | ItemFailure::CapabilityViolation(_)
            | ItemFailure::Encoding { .. }
            | ItemFailure::CardNotPresent
            | ItemFailure::Backup(_) => RetrySafety::Retryable,
            ItemFailure::AuthenticationFailure { .. }
            | ItemFailure::ConfirmationRequired { .. }
            | ItemFailure::CardRemoved
            | ItemFailure::CardIo(_) => RetrySafety::OperatorDecision,
            ItemFailure::AuthenticationLocked
            | ItemFailure::WriteFailure { .. }
            | ItemFailure::VerifyMismatch { .. } => RetrySafety::Unsafe,
        }
    }
}

impl From<CodecError> for ItemFailure {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::UnsupportedField { field, variant } => {
                ItemFailure::CapabilityViolation(vec![Diagnostic::new(
                    field,
                    DiagnosticKind::CapabilityViolation(variant),
                )])
            }
            CodecError::Unencodable { field } => ItemFailure::Encoding { field },
        }
    }
}

impl From<ProgramError> for ItemFailure {
    fn from(e: ProgramError) -> Self {
        match e {
            ProgramError::Capability(e) => e.into(),
            ProgramError::WriteFailed { field, cause } => ItemFailure::WriteFailure {
                field,
                message: cause.to_string(),
            },
            ProgramError::VerifyMismatch {
                field,
                expected,
                actual,
            } => ItemFailure::VerifyMismatch {
                field,
                expected,
                actual,
            },
            ProgramError::Transport(cause) if cause.is_card_removed() => ItemFailure::CardRemoved,
            other => ItemFailure::CardIo(other.to_string()),
        }
    }
}

impl From<AuthError> for ItemFailure {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Card(cause) if cause.is_card_removed() => ItemFailure::CardRemoved,
            AuthError::Card(cause) => ItemFailure::CardIo(cause.to_string()),
        }
    }
}

impl From<BackupError> for ItemFailure {
    fn from(e: BackupError) -> Self {
        ItemFailure::Backup(e.to_string())
    }
}
