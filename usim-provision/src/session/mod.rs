//! ADM1 authentication session
//!
//! A session wraps the channel to one inserted card. The remaining-attempts
//! counter always comes from the card and never goes up, except when a
//! verification succeeds.

use log::{info, warn};
use thiserror::Error;

use crate::card::CardTypeVariant;
use crate::codec::ParameterCodec;
use crate::config::Adm1Key;
use crate::transport::{CardChannel, CardIoError, Transport, VerifyStatus};

/// Retry counter of a fresh ADM1
pub const MAX_ADM1_ATTEMPTS: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    NotAuthenticated,
    Authenticating,
    Authenticated,
    Locked,
}

/// Result of one call to [`AuthenticationSession::authenticate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Authenticated,
    /// Wrong key; retrying with the right key is safe
    Rejected { remaining: u8 },
    /// No attempts left; the card needs unblocking
    Locked,
    /// Already-used attempts were found and no key was presented
    ConfirmationRequired { remaining: u8 },
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Card(#[from] CardIoError),
}

pub struct AuthenticationSession<'t, T: Transport + ?Sized> {
    channel: CardChannel<'t, T>,
    variant: CardTypeVariant,
    state: AuthState,
    remaining: u8,
}

impl<'t, T: Transport + ?Sized> AuthenticationSession<'t, T> {
    /// Start a session on a detected card by reading its ADM1 counter
    pub fn open(transport: &'t mut T, variant: CardTypeVariant) -> Result<Self, AuthError> {
        let mut channel = CardChannel::new(transport, ParameterCodec::class(variant));
        let remaining = channel.adm1_retries()?;
        let state = if remaining == 0 {
            warn!("{} ADM1 is blocked", variant);
            AuthState::Locked
        } else {
            AuthState::NotAuthenticated
        };
        Ok(Self {
            channel,
            variant,
            state,
            remaining,
        })
    }

    pub fn variant(&self) -> CardTypeVariant {
        self.variant
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    /// Attempts left as last reported by the card
    pub fn remaining(&self) -> u8 {
        self.remaining
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == AuthState::Authenticated
    }

    /// Present ADM1
    ///
    /// With attempts already used on this card the key is only sent when
    /// `force` is set. Terminal states answer without contacting the card.
    pub fn authenticate(&mut self, key: &Adm1Key, force: bool) -> Result<AuthOutcome, AuthError> {
        match self.state {
            AuthState::Authenticated => return Ok(AuthOutcome::Authenticated),
            AuthState::Locked => return Ok(AuthOutcome::Locked),
            AuthState::NotAuthenticated | AuthState::Authenticating => {}
        }
        if self.remaining < MAX_ADM1_ATTEMPTS && !force {
            return Ok(AuthOutcome::ConfirmationRequired {
                remaining: self.remaining,
            });
        }

        self.state = AuthState::Authenticating;
        let status = match self.channel.verify_adm1(key.as_bytes()) {
            Ok(status) => status,
            Err(e) => {
                self.state = AuthState::NotAuthenticated;
                return Err(e.into());
            }
        };
        match status {
            VerifyStatus::Accepted => {
                info!("{} authenticated with ADM1", self.variant);
                self.state = AuthState::Authenticated;
                self.remaining = MAX_ADM1_ATTEMPTS;
                Ok(AuthOutcome::Authenticated)
            }
            VerifyStatus::Blocked => Ok(self.lock()),
            VerifyStatus::Rejected(reported) => {
                let previous = self.remaining;
                let counted = match self.channel.adm1_retries() {
                    Ok(n) => n,
                    Err(e) => {
                        warn!("Could not re-read ADM1 counter: {}", e);
                        reported.unwrap_or_else(|| previous.saturating_sub(1))
                    }
                };
                self.remaining = counted.min(previous);
                if self.remaining == 0 {
                    return Ok(self.lock());
                }
                warn!(
                    "{} rejected ADM1, {} attempts left",
                    self.variant, self.remaining
                );
                self.state = AuthState::NotAuthenticated;
                Ok(AuthOutcome::Rejected {
                    remaining: self.remaining,
                })
            }
        }
    }

    fn lock(&mut self) -> AuthOutcome {
        warn!("{} ADM1 locked", self.variant);
        self.state = AuthState::Locked;
        self.remaining = 0;
        AuthOutcome::Locked
    }

    /// Start over on the same card, re-reading the counter
    pub fn reset(&mut self) -> Result<(), AuthError> {
        self.remaining = self.channel.adm1_retries()?;
        self.state = if self.remaining == 0 {
            AuthState::Locked
        } else {
            AuthState::NotAuthenticated
        };
        Ok(())
    }

    /// Channel for reads; writes are gated by the programmer
    pub(crate) fn channel_mut(&mut self) -> &mut CardChannel<'t, T> {
        &mut self.channel
    }
}
