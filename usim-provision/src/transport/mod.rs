//! Reader transport abstraction and the file-level card channel
//!
//! A [`Transport`] exchanges raw APDUs with one inserted card. [`CardChannel`]
//! layers the SELECT / READ BINARY / UPDATE BINARY / VERIFY primitives on top
//! and turns non-success status words into [`CardIoError`].

#[cfg(feature = "pcsc")]
pub mod pcsc;

use std::time::Duration;

use log::debug;
use thiserror::Error;

use crate::apdu::{key_ref, Class, Response, APDU, SW};
use crate::card::FilePath;

/// Transport level failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("no card present in the reader")]
    CardNotPresent,

    #[error("card removed during exchange")]
    CardRemoved,

    #[error("reader I/O error: {0}")]
    Io(String),
}

/// A synchronous exchange with a single card reader
///
/// `&mut self` keeps at most one exchange in flight.
pub trait Transport: Send {
    /// Wait up to `timeout` for a card and power it up, returning its ATR
    fn connect(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError>;

    /// Send one command APDU and return the raw response (data + SW1 SW2)
    fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>, TransportError>;

    /// Release the card so the next one can be inserted
    fn disconnect(&mut self);
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn connect(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        (**self).connect(timeout)
    }

    fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>, TransportError> {
        (**self).transmit(command)
    }

    fn disconnect(&mut self) {
        (**self).disconnect()
    }
}

/// Failure of a single card operation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CardIoError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("card returned SW {sw:04X} for {operation}")]
    Status { operation: &'static str, sw: u16 },

    #[error("malformed response to {0}")]
    Malformed(&'static str),

    #[error("{0} bytes do not fit a single command")]
    TooLong(usize),
}

impl CardIoError {
    /// Status word reported by the card, if the card answered at all
    pub fn sw(&self) -> Option<u16> {
        match self {
            CardIoError::Status { sw, .. } => Some(*sw),
            _ => None,
        }
    }

    pub fn is_card_removed(&self) -> bool {
        matches!(
            self,
            CardIoError::Transport(TransportError::CardRemoved | TransportError::CardNotPresent)
        )
    }
}

/// Result of presenting ADM1 to the card
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyStatus {
    Accepted,
    /// Wrong key; the card may say how many tries are left
    Rejected(Option<u8>),
    Blocked,
}

/// File oriented view of a transport
pub struct CardChannel<'a, T: Transport + ?Sized> {
    transport: &'a mut T,
    class: Class,
}

impl<'a, T: Transport + ?Sized> CardChannel<'a, T> {
    pub fn new(transport: &'a mut T, class: Class) -> Self {
        Self { transport, class }
    }

    pub fn class(&self) -> Class {
        self.class
    }

    /// Send an APDU, following 61xx / 9Fxx with GET RESPONSE
    pub fn send(&mut self, apdu: &APDU) -> Result<Response, CardIoError> {
        let raw = apdu
            .try_to_bytes()
            .map_err(|_| CardIoError::TooLong(apdu.data.len()))?;
        debug!(
            "> {:02X} {:02X} {:02X} {:02X} ({} bytes)",
            apdu.cla,
            apdu.ins,
            apdu.p1,
            apdu.p2,
            apdu.data.len()
        );
        let reply = self.transport.transmit(&raw)?;
        let mut response = Response::from_bytes(&reply).ok_or(CardIoError::Malformed("APDU"))?;
        debug!("< SW {:04X}", response.sw());

        if let Some(pending) = response.available_response() {
            let get = APDU::get_response(self.class, pending);
            let reply = self.transport.transmit(&get.to_bytes())?;
            response =
                Response::from_bytes(&reply).ok_or(CardIoError::Malformed("GET RESPONSE"))?;
            debug!("< SW {:04X} (GET RESPONSE)", response.sw());
        }
        Ok(response)
    }

    fn expect_ok(&mut self, operation: &'static str, apdu: &APDU) -> Result<Response, CardIoError> {
        let response = self.send(apdu)?;
        if response.sw() != SW::SUCCESS {
            return Err(CardIoError::Status {
                operation,
                sw: response.sw(),
            });
        }
        Ok(response)
    }

    /// Select every identifier of `path` in turn, starting at the MF
    pub fn select_path(&mut self, path: &FilePath) -> Result<(), CardIoError> {
        for fid in path.ids() {
            self.expect_ok("SELECT", &APDU::select(self.class, *fid))?;
        }
        Ok(())
    }

    /// READ BINARY of `length` bytes at `offset` from the selected EF
    pub fn read_binary(&mut self, offset: u16, length: u8) -> Result<Vec<u8>, CardIoError> {
        let command = APDU::read_binary(self.class, offset, length);
        let response = self.expect_ok("READ BINARY", &command)?;
        Ok(response.data)
    }

    /// UPDATE BINARY at `offset` of the selected EF
    pub fn update_binary(&mut self, offset: u16, data: &[u8]) -> Result<(), CardIoError> {
        self.expect_ok(
            "UPDATE BINARY",
            &APDU::update_binary(self.class, offset, data.to_vec()),
        )?;
        Ok(())
    }

    /// Select `path` and read `length` bytes from its start
    pub fn read_file(&mut self, path: &FilePath, length: u8) -> Result<Vec<u8>, CardIoError> {
        self.select_path(path)?;
        self.read_binary(0, length)
    }

    /// Ask the card for the remaining ADM1 attempts without presenting a key
    pub fn adm1_retries(&mut self) -> Result<u8, CardIoError> {
        let response = self.send(&APDU::verify(self.class, key_ref::ADM1, Vec::new()))?;
        let sw = response.sw();
        if let Some(count) = SW::get_retry_count(sw) {
            return Ok(count);
        }
        if SW::is_blocked(sw) {
            return Ok(0);
        }
        Err(CardIoError::Status {
            operation: "VERIFY (retry counter)",
            sw,
        })
    }

    /// Present the 8 ASCII digit ADM1 key
    pub fn verify_adm1(&mut self, key: &[u8]) -> Result<VerifyStatus, CardIoError> {
        let response = self.send(&APDU::verify(self.class, key_ref::ADM1, key.to_vec()))?;
        let sw = response.sw();
        match sw {
            SW::SUCCESS => Ok(VerifyStatus::Accepted),
            _ if SW::is_blocked(sw) => Ok(VerifyStatus::Blocked),
            _ if SW::is_counter_warning(sw) => Ok(VerifyStatus::Rejected(SW::get_retry_count(sw))),
            SW::GSM_ACCESS_CONDITION_NOT_FULFILLED | SW::SECURITY_STATUS_NOT_SATISFIED => {
                Ok(VerifyStatus::Rejected(None))
            }
            _ => Err(CardIoError::Status {
                operation: "VERIFY",
                sw,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Replays canned responses and records what was sent
    struct Scripted {
        replies: VecDeque<Vec<u8>>,
        sent: Vec<Vec<u8>>,
    }

    impl Scripted {
        fn new(replies: &[&[u8]]) -> Self {
            Self {
                replies: replies.iter().map(|r| r.to_vec()).collect(),
                sent: Vec::new(),
            }
        }
    }

    impl Transport for Scripted {
        fn connect(&mut self, _timeout: Duration) -> Result<Vec<u8>, TransportError> {
            Ok(vec![0x3B])
        }

        fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>, TransportError> {
            self.sent.push(command.to_vec());
            self.replies.pop_front().ok_or(TransportError::CardRemoved)
        }

        fn disconnect(&mut self) {}
    }

    #[test]
    fn test_select_path_walks_every_id() {
        let mut t = Scripted::new(&[&[0x90, 0x00], &[0x90, 0x00], &[0x90, 0x00]]);
        CardChannel::new(&mut t, Class::Uicc)
            .select_path(&crate::card::files::EF_GSM_IMSI)
            .unwrap();
        assert_eq!(t.sent.len(), 3);
        assert_eq!(&t.sent[1][5..], &[0x7F, 0x20]);
    }

    #[test]
    fn test_get_response_is_followed() {
        let mut t = Scripted::new(&[&[0x9F, 0x02], &[0xAA, 0xBB, 0x90, 0x00]]);
        let resp = CardChannel::new(&mut t, Class::Gsm)
            .send(&APDU::select(Class::Gsm, 0x3F00))
            .unwrap();
        assert_eq!(resp.data, vec![0xAA, 0xBB]);
        assert_eq!(t.sent[1], vec![0xA0, 0xC0, 0x00, 0x00, 0x02]);
    }

    #[test]
    fn test_status_error_carries_sw() {
        let mut t = Scripted::new(&[&[0x6A, 0x82]]);
        let err = CardChannel::new(&mut t, Class::Uicc)
            .read_binary(0, 4)
            .unwrap_err();
        assert_eq!(err.sw(), Some(0x6A82));
    }

    #[test]
    fn test_retry_counter_query() {
        let mut t = Scripted::new(&[&[0x63, 0xC2], &[0x69, 0x83]]);
        let mut ch = CardChannel::new(&mut t, Class::Uicc);
        assert_eq!(ch.adm1_retries().unwrap(), 2);
        assert_eq!(ch.adm1_retries().unwrap(), 0);
    }

    #[test]
    fn test_verify_outcomes() {
        let mut t = Scripted::new(&[&[0x90, 0x00], &[0x63, 0xC1], &[0x98, 0x04], &[0x98, 0x40]]);
        let mut ch = CardChannel::new(&mut t, Class::Gsm);
        assert_eq!(ch.verify_adm1(b"12345678").unwrap(), VerifyStatus::Accepted);
        assert_eq!(ch.verify_adm1(b"12345678").unwrap(), VerifyStatus::Rejected(Some(1)));
        assert_eq!(ch.verify_adm1(b"12345678").unwrap(), VerifyStatus::Rejected(None));
        assert_eq!(ch.verify_adm1(b"12345678").unwrap(), VerifyStatus::Blocked);
    }

    #[test]
    fn test_removed_card_surfaces_transport_error() {
        let mut t = Scripted::new(&[]);
        let err = CardChannel::new(&mut t, Class::Uicc)
            .update_binary(0, &[0x01])
            .unwrap_err();
        assert!(err.is_card_removed());
    }
}
