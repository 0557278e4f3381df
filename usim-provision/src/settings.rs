//! Run settings
//!
//! Defaults, then environment, then whatever the command line sets.

use std::path::PathBuf;
use std::time::Duration;

use log::warn;

use crate::config::Adm1Key;

pub const CARD_TIMEOUT_ENV: &str = "USIM_PROVISION_CARD_TIMEOUT_SECS";
pub const DEFAULT_CARD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct Settings {
    /// Backup directory; `None` resolves through [`crate::backup::BackupStore::default_dir`]
    pub backup_dir: Option<PathBuf>,
    /// How long to wait for a card to be inserted
    pub card_timeout: Duration,
    pub backup_before_program: bool,
    /// Present ADM1 even when attempts were already used on a card
    pub force_auth: bool,
    /// Key for records without their own ADM1
    pub default_adm1: Option<Adm1Key>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backup_dir: None,
            card_timeout: DEFAULT_CARD_TIMEOUT,
            backup_before_program: true,
            force_auth: false,
            default_adm1: None,
        }
    }
}

impl Settings {
    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        settings.apply_env(|key| std::env::var(key).ok());
        settings
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(value) = var(CARD_TIMEOUT_ENV) {
            match value.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.card_timeout = Duration::from_secs(secs),
                _ => warn!(
                    "Ignoring {}={:?}: not a positive number of seconds",
                    CARD_TIMEOUT_ENV, value
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.card_timeout, Duration::from_secs(30));
        assert!(s.backup_before_program);
        assert!(!s.force_auth);
        assert!(s.default_adm1.is_none());
    }

    #[test]
    fn test_timeout_from_env() {
        let mut s = Settings::default();
        s.apply_env(|k| (k == CARD_TIMEOUT_ENV).then(|| "5".to_string()));
        assert_eq!(s.card_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_bad_timeout_is_ignored() {
        let mut s = Settings::default();
        s.apply_env(|_| Some("soon".to_string()));
        assert_eq!(s.card_timeout, DEFAULT_CARD_TIMEOUT);
        s.apply_env(|_| Some("0".to_string()));
        assert_eq!(s.card_timeout, DEFAULT_CARD_TIMEOUT);
    }
}
