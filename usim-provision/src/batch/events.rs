use std::fmt;
use std::path::PathBuf;

use crate::card::CardTypeVariant;
use crate::error::ItemFailure;
use crate::records::{columns, RawRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Running,
    Paused,
    Completed,
    Aborted,
}

/// Operator commands, honoured between cards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Pause,
    Resume,
    /// Mark the next pending item skipped without touching a card
    Skip,
    Stop,
}

/// Steps of one item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validating,
    WaitingForCard,
    Detecting,
    Authenticating,
    CheckingCapabilities,
    BackingUp,
    /// Writing the plan, then reading the identity back
    Programming,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Validating => "validating",
            Stage::WaitingForCard => "waiting for card",
            Stage::Detecting => "detecting card",
            Stage::Authenticating => "authenticating",
            Stage::CheckingCapabilities => "checking capabilities",
            Stage::BackingUp => "backing up",
            Stage::Programming => "programming",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Pending,
    Success,
    Failed,
    Skipped,
}

/// One input record and what became of it
#[derive(Debug, Clone)]
pub struct BatchItem {
    record: RawRecord,
    outcome: ItemOutcome,
    failure: Option<ItemFailure>,
}

impl BatchItem {
    pub fn new(record: RawRecord) -> Self {
        Self {
            record,
            outcome: ItemOutcome::Pending,
            failure: None,
        }
    }

    pub fn record(&self) -> &RawRecord {
        &self.record
    }

    pub fn outcome(&self) -> ItemOutcome {
        self.outcome
    }

    pub fn failure(&self) -> Option<&ItemFailure> {
        self.failure.as_ref()
    }

    pub fn imsi(&self) -> Option<&str> {
        self.record.get(columns::IMSI)
    }

    /// Record the outcome; only a pending item can finish
    pub fn finish(&mut self, outcome: ItemOutcome, failure: Option<ItemFailure>) -> bool {
        if self.outcome != ItemOutcome::Pending || outcome == ItemOutcome::Pending {
            return false;
        }
        self.outcome = outcome;
        self.failure = failure;
        true
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    pub remaining: usize,
}

impl Tally {
    pub fn of(items: &[BatchItem]) -> Self {
        items.iter().fold(Tally::default(), |mut t, item| {
            match item.outcome() {
                ItemOutcome::Pending => t.remaining += 1,
                ItemOutcome::Success => t.success += 1,
                ItemOutcome::Failed => t.failed += 1,
                ItemOutcome::Skipped => t.skipped += 1,
            }
            t
        })
    }
}

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} programmed, {} failed, {} skipped, {} remaining",
            self.success, self.failed, self.skipped, self.remaining
        )
    }
}

/// Final state of a run, items in input order
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub state: BatchState,
    pub tally: Tally,
    pub items: Vec<BatchItem>,
}

/// Everything the run loop reports; `index` is the item's input position
#[derive(Debug, Clone)]
pub enum BatchEvent {
    StateChanged(BatchState),
    ItemStarted { index: usize, imsi: Option<String> },
    Stage { index: usize, stage: Stage },
    CardDetected { index: usize, variant: CardTypeVariant },
    /// ADM1 attempts left before the key is presented
    AdmCounter { index: usize, remaining: u8 },
    BackupCreated { index: usize, path: PathBuf },
    /// The batch paused; `Resume` retries the same item
    AwaitingOperator { index: usize, failure: ItemFailure },
    ItemFinished {
        index: usize,
        outcome: ItemOutcome,
        failure: Option<ItemFailure>,
    },
    Tally(Tally),
    Finished(BatchReport),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_finishes_once() {
        let mut item = BatchItem::new(RawRecord::new().with(columns::IMSI, "001010000000001"));
        assert!(!item.finish(ItemOutcome::Pending, None));
        assert!(item.finish(ItemOutcome::Skipped, None));
        assert!(!item.finish(ItemOutcome::Success, None));
        assert_eq!(item.outcome(), ItemOutcome::Skipped);
        assert_eq!(item.imsi(), Some("001010000000001"));
    }

    #[test]
    fn test_tally() {
        let mut items: Vec<BatchItem> = (0..4).map(|_| BatchItem::new(RawRecord::new())).collect();
        items[0].finish(ItemOutcome::Success, None);
        items[1].finish(ItemOutcome::Failed, Some(ItemFailure::AuthenticationLocked));
        let t = Tally::of(&items);
        assert_eq!(
            t,
            Tally {
                success: 1,
                failed: 1,
                skipped: 0,
                remaining: 2
            }
        );
        assert_eq!(t.to_string(), "1 programmed, 1 failed, 0 skipped, 2 remaining");
    }
}
