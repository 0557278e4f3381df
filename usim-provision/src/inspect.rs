//! Single-card reads
//!
//! Detect whatever card is in the reader, optionally present ADM1, and read
//! its identity back without writing anything. [`backup_card`] stores the
//! result the same way a batch does before programming.

use std::path::PathBuf;
use std::time::Duration;

use log::{info, warn};

use crate::backup::{BackupRecord, BackupStore};
use crate::card::{atr_to_string, CardDetector, CardTypeVariant};
use crate::config::Adm1Key;
use crate::error::ItemFailure;
use crate::programmer::{CardProgrammer, IdentitySnapshot};
use crate::session::AuthenticationSession;
use crate::settings::Settings;
use crate::transport::{Transport, TransportError};

/// What a card reported
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardInspection {
    pub variant: CardTypeVariant,
    pub atr: Vec<u8>,
    /// ADM1 attempts left once the read finished
    pub adm1_remaining: u8,
    /// Whether ADM1 was presented and accepted
    pub authenticated: bool,
    pub identity: IdentitySnapshot,
}

/// Read one card and eject it
///
/// Without a key no VERIFY with key material is sent. A key that is not
/// accepted fails the read, as does a used counter unless
/// `settings.force_auth` is set.
pub fn inspect<T: Transport + ?Sized>(
    transport: &mut T,
    settings: &Settings,
    key: Option<&Adm1Key>,
) -> Result<CardInspection, ItemFailure> {
    let atr = connect(transport, settings.card_timeout)?;
    let result = read_card(transport, atr, settings, key);
    transport.disconnect();
    result
}

/// [`inspect`], then save the identity as a backup
pub fn backup_card<T: Transport + ?Sized>(
    transport: &mut T,
    settings: &Settings,
    key: Option<&Adm1Key>,
    store: &BackupStore,
) -> Result<(CardInspection, PathBuf), ItemFailure> {
    let inspection = inspect(transport, settings, key)?;
    let record = BackupRecord::capture(
        inspection.variant,
        &inspection.atr,
        &inspection.identity,
        None,
    );
    let path = store.save(&record)?;
    info!("Backed up {} to {}", inspection.variant, path.display());
    Ok((inspection, path))
}

fn connect<T: Transport + ?Sized>(
    transport: &mut T,
    timeout: Duration,
) -> Result<Vec<u8>, ItemFailure> {
    transport.connect(timeout).map_err(|e| match e {
        TransportError::CardNotPresent => ItemFailure::CardNotPresent,
        TransportError::CardRemoved => ItemFailure::CardRemoved,
        other => ItemFailure::CardIo(other.to_string()),
    })
}

fn read_card<T: Transport + ?Sized>(
    transport: &mut T,
    atr: Vec<u8>,
    settings: &Settings,
    key: Option<&Adm1Key>,
) -> Result<CardInspection, ItemFailure> {
    let variant = CardDetector::detect(&atr).map_err(|e| {
        warn!("{}", e);
        ItemFailure::DetectionFailure {
            atr: atr_to_string(&atr),
        }
    })?;
    info!("Detected {}", variant);

    let mut session = AuthenticationSession::open(transport, variant)?;
    if let Some(key) = key {
        let outcome = session.authenticate(key, settings.force_auth)?;
        if let Some(failure) = ItemFailure::from_auth(outcome) {
            return Err(failure);
        }
    }
    let identity = CardProgrammer::read_identity(&mut session)?;
    Ok(CardInspection {
        variant,
        atr,
        adm1_remaining: session.remaining(),
        authenticated: session.is_authenticated(),
        identity,
    })
}
