//! Card programming and read-back verification

use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::{CodecError, FileWrite, IdentityField, ParameterCodec, WriteOp};
use crate::config::{ConfigurationRecord, Field};
use crate::session::AuthenticationSession;
use crate::transport::{CardIoError, Transport};

#[derive(Debug, Error)]
pub enum ProgramError {
    #[error("card is not authenticated")]
    NotAuthenticated,
    #[error(transparent)]
    Capability(#[from] CodecError),
    #[error("writing {field} failed: {cause}")]
    WriteFailed { field: Field, cause: CardIoError },
    #[error("{field} reads back as {actual}, expected {expected}")]
    VerifyMismatch {
        field: Field,
        expected: String,
        actual: String,
    },
    #[error(transparent)]
    Transport(#[from] CardIoError),
}

impl ProgramError {
    /// Whether the card went away mid-operation
    pub fn is_card_removed(&self) -> bool {
        match self {
            ProgramError::WriteFailed { cause, .. } | ProgramError::Transport(cause) => {
                cause.is_card_removed()
            }
            _ => false,
        }
    }
}

/// Identity fields as read from a card; blank files read as `None`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySnapshot {
    pub imsi: Option<String>,
    pub iccid: Option<String>,
    pub mnc_length: Option<u8>,
}

/// Summary of a programmed card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Programmed {
    pub writes: usize,
    pub identity: IdentitySnapshot,
}

pub struct CardProgrammer;

impl CardProgrammer {
    /// Plan, write and verify one record
    pub fn program<T: Transport + ?Sized>(
        session: &mut AuthenticationSession<'_, T>,
        record: &ConfigurationRecord,
    ) -> Result<Programmed, ProgramError> {
        if !session.is_authenticated() {
            return Err(ProgramError::NotAuthenticated);
        }
        let plan = ParameterCodec::plan(session.variant(), record)?;
        Self::write_plan(session, &plan)?;
        let identity = Self::verify(session, record)?;
        info!(
            "Programmed {} with IMSI {} ({} writes)",
            session.variant(),
            record.imsi,
            plan.len()
        );
        Ok(Programmed {
            writes: plan.len(),
            identity,
        })
    }

    /// Execute writes in order, stopping at the first failure
    pub fn write_plan<T: Transport + ?Sized>(
        session: &mut AuthenticationSession<'_, T>,
        plan: &[FileWrite],
    ) -> Result<(), ProgramError> {
        if !session.is_authenticated() {
            return Err(ProgramError::NotAuthenticated);
        }
        for write in plan {
            Self::write_one(session, write).map_err(|cause| {
                error!("Writing {} to {} failed: {}", write.field, write.path, cause);
                ProgramError::WriteFailed {
                    field: write.field,
                    cause,
                }
            })?;
        }
        Ok(())
    }

    fn write_one<T: Transport + ?Sized>(
        session: &mut AuthenticationSession<'_, T>,
        write: &FileWrite,
    ) -> Result<(), CardIoError> {
        let channel = session.channel_mut();
        channel.select_path(&write.path)?;
        match &write.op {
            WriteOp::Replace { offset, data } => {
                debug!("Writing {} bytes of {} at {}", data.len(), write.field, offset);
                channel.update_binary(*offset, data)
            }
            WriteOp::SetBits { offset, set, clear } => {
                let old = channel
                    .read_binary(*offset, 1)?
                    .first()
                    .copied()
                    .ok_or(CardIoError::Malformed("READ BINARY"))?;
                channel.update_binary(*offset, &[WriteOp::merge(*set, *clear, old)])
            }
        }
    }

    /// Compare IMSI, ICCID and MNC length on the card with the record
    ///
    /// Nothing is rewritten on mismatch.
    pub fn verify<T: Transport + ?Sized>(
        session: &mut AuthenticationSession<'_, T>,
        record: &ConfigurationRecord,
    ) -> Result<IdentitySnapshot, ProgramError> {
        for field in IdentityField::ALL {
            let raw = read_raw(session, field)?;
            let expected = field.expected(record);
            let actual = field.decode(&raw).unwrap_or_else(|| hex::encode_upper(&raw));
            if actual != expected {
                error!("Verify of {} failed", field.field());
                return Err(ProgramError::VerifyMismatch {
                    field: field.field(),
                    expected,
                    actual,
                });
            }
        }
        Self::read_identity(session)
    }

    /// Read the identity fields for a backup
    pub fn read_identity<T: Transport + ?Sized>(
        session: &mut AuthenticationSession<'_, T>,
    ) -> Result<IdentitySnapshot, ProgramError> {
        let imsi = IdentityField::Imsi.decode(&read_raw(session, IdentityField::Imsi)?);
        let iccid = IdentityField::Iccid.decode(&read_raw(session, IdentityField::Iccid)?);
        let mnc_length = IdentityField::MncLength
            .decode(&read_raw(session, IdentityField::MncLength)?)
            .and_then(|n| n.parse().ok());
        Ok(IdentitySnapshot {
            imsi,
            iccid,
            mnc_length,
        })
    }
}

fn read_raw<T: Transport + ?Sized>(
    session: &mut AuthenticationSession<'_, T>,
    field: IdentityField,
) -> Result<Vec<u8>, CardIoError> {
    session
        .channel_mut()
        .read_file(&field.path(), field.read_len() as u8)
}
