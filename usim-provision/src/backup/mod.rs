//! Card backups
//!
//! Handles persistent JSON snapshots of what a card held before it was
//! programmed. Key material is never part of a backup.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::card::{atr_to_string, Algorithm, CardTypeVariant};
use crate::config::{Concealment, ConfigurationRecord, NetworkSelection, SqnPolicy};
use crate::programmer::IdentitySnapshot;
use crate::records::{columns, RawRecord};

pub const BACKUP_VERSION: &str = "1.0";
pub const BACKUP_DIR_ENV: &str = "USIM_PROVISION_BACKUP_DIR";

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("backup is marked as not restorable")]
    NotRestorable,
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> BackupError + '_ {
    move |source| BackupError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Algorithm choice and OPc flag that were about to be written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationIntent {
    pub algo_2g: Algorithm,
    pub algo_3g: Algorithm,
    pub algo_4g5g: Algorithm,
    pub use_opc: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardData {
    pub imsi: Option<String>,
    pub iccid: Option<String>,
    pub mnc_length: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<AuthenticationIntent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sqn: Option<SqnPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkSelection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concealment: Option<Concealment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub backup_version: String,
    pub timestamp: DateTime<Local>,
    pub card_type: CardTypeVariant,
    pub card_atr: String,
    pub card_data: CardData,
    pub can_restore: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl BackupRecord {
    /// Snapshot a card's identity, plus the non-secret parts of the record
    /// it is about to receive
    pub fn capture(
        variant: CardTypeVariant,
        atr: &[u8],
        identity: &IdentitySnapshot,
        intent: Option<&ConfigurationRecord>,
    ) -> Self {
        let card_data = CardData {
            imsi: identity.imsi.clone(),
            iccid: identity.iccid.clone(),
            mnc_length: identity.mnc_length,
            authentication: intent.map(|r| AuthenticationIntent {
                algo_2g: r.algo_2g,
                algo_3g: r.algo_3g,
                algo_4g5g: r.algo_4g5g,
                use_opc: r.use_opc,
            }),
            sqn: intent.and_then(|r| r.sqn),
            network: intent.and_then(|r| r.network.clone()),
            concealment: intent.and_then(|r| r.concealment.clone()),
        };
        Self {
            backup_version: BACKUP_VERSION.to_string(),
            timestamp: Local::now(),
            card_type: variant,
            card_atr: atr_to_string(atr),
            card_data,
            can_restore: true,
            notes: None,
        }
    }

    /// Column form of the backup, without key material
    ///
    /// Ki and OPc have to be supplied again before the row can be written.
    pub fn to_raw(&self) -> RawRecord {
        use columns::*;

        let data = &self.card_data;
        let mut raw = RawRecord::new();
        let flag = |b: bool| if b { "1" } else { "0" };
        if let Some(imsi) = &data.imsi {
            raw.set(IMSI, imsi.as_str());
        }
        if let Some(iccid) = &data.iccid {
            raw.set(ICCID, iccid.as_str());
        }
        if let Some(mnc) = data.mnc_length {
            raw.set(MNC_LENGTH, mnc.to_string());
        }
        if let Some(auth) = &data.authentication {
            raw.set(ALGO_2G, auth.algo_2g.token());
            raw.set(ALGO_3G, auth.algo_3g.token());
            raw.set(ALGO_4G5G, auth.algo_4g5g.token());
            raw.set(USE_OPC, flag(auth.use_opc));
        }
        if let Some(sqn) = &data.sqn {
            raw.set(SQN_IND_SIZE_BITS, sqn.ind_size_bits.to_string());
            raw.set(SQN_CHECK_ENABLED, flag(sqn.check_enabled));
            raw.set(SQN_AGE_LIMIT_ENABLED, flag(sqn.age_limit_enabled));
            raw.set(SQN_MAX_DELTA_ENABLED, flag(sqn.max_delta_enabled));
            raw.set(SQN_CHECK_SKIP_FIRST, flag(sqn.check_skip_first));
        }
        if let Some(net) = &data.network {
            if let Some(hplmn) = &net.hplmn {
                raw.set(HPLMN, hplmn.as_str());
            }
            if !net.oplmn.is_empty() {
                raw.set(OPLMN_ACT, net.oplmn_column());
            }
        }
        if let Some(c) = &data.concealment {
            raw.set(ROUTING_INDICATOR, c.routing_indicator.as_str());
            raw.set(PROTECTION_SCHEME_ID, c.protection_scheme.to_string());
            raw.set(HNET_PUBKEY_ID, c.pubkey_id.to_string());
            if !c.pubkey.is_empty() {
                raw.set(HNET_PUBKEY, hex::encode_upper(&c.pubkey));
            }
        }
        raw
    }
}

/// Summary of a backup file for listings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    pub path: PathBuf,
    pub timestamp: DateTime<Local>,
    pub card_type: CardTypeVariant,
    pub iccid: Option<String>,
    pub imsi: Option<String>,
}

/// Directory of backup files
pub struct BackupStore {
    dir: PathBuf,
}

impl BackupStore {
    /// Get the default backup directory
    pub fn default_dir() -> PathBuf {
        if let Ok(path) = std::env::var(BACKUP_DIR_ENV) {
            return PathBuf::from(path);
        }
        if let Some(data) = dirs::data_dir() {
            return data.join("usim-provision").join("backups");
        }
        PathBuf::from("backups")
    }

    pub fn new(dir: Option<PathBuf>) -> Self {
        Self {
            dir: dir.unwrap_or_else(Self::default_dir),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_dir(&self) -> Result<(), BackupError> {
        fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))
    }

    fn file_stem(record: &BackupRecord) -> String {
        let iccid = record.card_data.iccid.as_deref().unwrap_or("unknown");
        format!("backup_{}_{}", iccid, record.timestamp.format("%Y%m%d_%H%M%S_%6f"))
    }

    /// Write a new backup file; existing files are never replaced
    pub fn save(&self, record: &BackupRecord) -> Result<PathBuf, BackupError> {
        self.ensure_dir()?;
        let json = serde_json::to_string_pretty(record).map_err(|source| BackupError::Json {
            path: self.dir.clone(),
            source,
        })?;
        // Written in full before it gets a backup name; dropped on failure
        let mut tmp = tempfile::Builder::new()
            .prefix(".backup_")
            .suffix(".partial")
            .tempfile_in(&self.dir)
            .map_err(io_error(&self.dir))?;
        tmp.write_all(json.as_bytes()).map_err(io_error(tmp.path()))?;
        tmp.as_file().sync_all().map_err(io_error(tmp.path()))?;

        let stem = Self::file_stem(record);
        let mut suffix = 0u32;
        loop {
            let name = if suffix == 0 {
                format!("{}.json", stem)
            } else {
                format!("{}_{}.json", stem, suffix)
            };
            let path = self.dir.join(name);
            match tmp.persist_noclobber(&path) {
                Ok(_) => {
                    info!("Saved backup {}", path.display());
                    return Ok(path);
                }
                Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                    tmp = e.file;
                    suffix += 1;
                }
                Err(e) => return Err(io_error(&path)(e.error)),
            }
        }
    }

    pub fn load(path: &Path) -> Result<BackupRecord, BackupError> {
        let content = fs::read_to_string(path).map_err(io_error(path))?;
        let record: BackupRecord =
            serde_json::from_str(&content).map_err(|source| BackupError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        if record.backup_version != BACKUP_VERSION {
            warn!(
                "Backup version mismatch in {}: expected {}, got {}",
                path.display(),
                BACKUP_VERSION,
                record.backup_version
            );
        }
        Ok(record)
    }

    /// Backups in the directory, newest first
    pub fn list(&self, iccid_filter: Option<&str>) -> Result<Vec<BackupEntry>, BackupError> {
        let dir = match fs::read_dir(&self.dir) {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&self.dir)(e)),
        };
        let mut entries = Vec::new();
        for item in dir {
            let path = item.map_err(io_error(&self.dir))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let record = match Self::load(&path) {
                Ok(record) => record,
                Err(e) => {
                    debug!("Skipping {}: {}", path.display(), e);
                    continue;
                }
            };
            if let Some(filter) = iccid_filter {
                if record.card_data.iccid.as_deref() != Some(filter) {
                    continue;
                }
            }
            entries.push(BackupEntry {
                path,
                timestamp: record.timestamp,
                card_type: record.card_type,
                iccid: record.card_data.iccid,
                imsi: record.card_data.imsi,
            });
        }
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(entries)
    }

    /// Record to reprogram a card from, if the backup allows it
    pub fn restore(record: &BackupRecord) -> Result<RawRecord, BackupError> {
        if !record.can_restore {
            return Err(BackupError::NotRestorable);
        }
        Ok(record.to_raw())
    }

    /// A backup file as an input row
    pub fn export_row(path: &Path) -> Result<RawRecord, BackupError> {
        Ok(Self::load(path)?.to_raw())
    }
}
