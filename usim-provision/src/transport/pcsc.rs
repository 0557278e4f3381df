//! PC/SC reader transport (feature `pcsc`)

use std::ffi::CString;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use pcsc::{
    Card, Context, Disposition, Protocols, ReaderState, Scope, ShareMode, State, MAX_BUFFER_SIZE,
};

use super::{Transport, TransportError};

/// Poll interval while waiting for a card
const POLL: Duration = Duration::from_millis(250);

pub struct PcscTransport {
    ctx: Context,
    reader: CString,
    card: Option<Card>,
}

impl PcscTransport {
    /// Open the named reader, or the first reader the PC/SC service lists
    pub fn open(reader: Option<&str>) -> Result<Self, TransportError> {
        let ctx = Context::establish(Scope::User).map_err(io)?;
        let reader = match reader {
            Some(name) => CString::new(name).map_err(|e| TransportError::Io(e.to_string()))?,
            None => ctx
                .list_readers_owned()
                .map_err(io)?
                .into_iter()
                .next()
                .ok_or_else(|| TransportError::Io("no PC/SC readers found".to_string()))?,
        };
        info!("Using reader {}", reader.to_string_lossy());
        Ok(Self {
            ctx,
            reader,
            card: None,
        })
    }

    fn card_present(&self) -> Result<bool, TransportError> {
        let mut states = [ReaderState::new(self.reader.clone(), State::UNAWARE)];
        self.ctx
            .get_status_change(Duration::from_secs(0), &mut states)
            .map_err(io)?;
        Ok(states[0].event_state().contains(State::PRESENT))
    }
}

fn io(err: pcsc::Error) -> TransportError {
    match err {
        pcsc::Error::NoSmartcard => TransportError::CardNotPresent,
        pcsc::Error::RemovedCard | pcsc::Error::ResetCard => TransportError::CardRemoved,
        other => TransportError::Io(other.to_string()),
    }
}

impl Transport for PcscTransport {
    fn connect(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let deadline = Instant::now() + timeout;
        while !self.card_present()? {
            if Instant::now() >= deadline {
                return Err(TransportError::CardNotPresent);
            }
            std::thread::sleep(POLL);
        }

        let card = self
            .ctx
            .connect(&self.reader, ShareMode::Shared, Protocols::ANY)
            .map_err(io)?;
        let atr = card
            .get_attribute_owned(pcsc::Attribute::AtrString)
            .map_err(io)?;
        debug!("Connected, ATR {} bytes", atr.len());
        self.card = Some(card);
        Ok(atr)
    }

    fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>, TransportError> {
        let card = self.card.as_ref().ok_or(TransportError::CardNotPresent)?;
        let mut buf = [0u8; MAX_BUFFER_SIZE];
        let reply = card.transmit(command, &mut buf).map_err(io)?;
        Ok(reply.to_vec())
    }

    fn disconnect(&mut self) {
        if let Some(card) = self.card.take() {
            if let Err((_, err)) = card.disconnect(Disposition::ResetCard) {
                warn!("PC/SC disconnect failed: {}", err);
            }
        }
    }
}
