//! A reader with a stack of simulated cards
//!
//! Each `connect` takes the next card from the queue; `disconnect` ejects
//! it onto a tray that outlives the reader, so a test can inspect cards
//! after the reader moved into a batch thread.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use log::info;
use parking_lot::Mutex;

use super::SimulatedCard;
use crate::transport::{Transport, TransportError};

/// Cards the reader has ejected, in ejection order
pub type Tray = Arc<Mutex<Vec<SimulatedCard>>>;

#[derive(Debug, Default)]
pub struct SimulatedReader {
    queue: VecDeque<Option<SimulatedCard>>,
    inserted: Option<SimulatedCard>,
    tray: Tray,
}

impl SimulatedReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cards(cards: impl IntoIterator<Item = SimulatedCard>) -> Self {
        let mut reader = Self::new();
        for card in cards {
            reader.push(card);
        }
        reader
    }

    pub fn push(&mut self, card: SimulatedCard) {
        self.queue.push_back(Some(card));
    }

    /// The next connect finds the reader empty
    pub fn push_gap(&mut self) {
        self.queue.push_back(None);
    }

    pub fn tray(&self) -> Tray {
        Arc::clone(&self.tray)
    }

    pub fn inserted(&self) -> Option<&SimulatedCard> {
        self.inserted.as_ref()
    }

    pub fn inserted_mut(&mut self) -> Option<&mut SimulatedCard> {
        self.inserted.as_mut()
    }
}

impl Transport for SimulatedReader {
    fn connect(&mut self, _timeout: Duration) -> Result<Vec<u8>, TransportError> {
        if self.inserted.is_none() {
            self.inserted = self.queue.pop_front().flatten();
        }
        let card = self.inserted.as_mut().ok_or(TransportError::CardNotPresent)?;
        info!("Simulated {} inserted", card.variant());
        Ok(card.reset())
    }

    fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>, TransportError> {
        let card = self.inserted.as_mut().ok_or(TransportError::CardRemoved)?;
        Ok(card.process_apdu(command))
    }

    fn disconnect(&mut self) {
        if let Some(card) = self.inserted.take() {
            self.tray.lock().push(card);
        }
    }
}
