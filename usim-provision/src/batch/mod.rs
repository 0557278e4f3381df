//! Multi-card batch runs
//!
//! The run loop takes records in input order and programs one inserted card
//! per record. Operator controls arrive over a channel and are looked at
//! only between items, so a card that started programming is always
//! written and verified to the end. Progress goes out as [`BatchEvent`]s.

mod events;

pub use events::{
    BatchEvent, BatchItem, BatchReport, BatchState, Control, ItemOutcome, Stage, Tally,
};

use std::io;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use log::{debug, info, warn};

use crate::backup::{BackupRecord, BackupStore};
use crate::card::{atr_to_string, CardDetector, CardTypeVariant};
use crate::config::{Adm1Key, ConfigurationRecord};
use crate::error::ItemFailure;
use crate::programmer::CardProgrammer;
use crate::records::RawRecord;
use crate::session::AuthenticationSession;
use crate::settings::Settings;
use crate::transport::{Transport, TransportError};
use crate::validation;

/// What the operator decided while the batch was paused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Resume,
    Skip,
    Stop,
}

/// Result of one pass over an item
enum Step {
    Done(ItemOutcome, Option<ItemFailure>),
    /// Needs the operator; the item stays pending
    Interrupted(ItemFailure),
}

/// Event sender that tolerates a receiver that went away
struct Events(Sender<BatchEvent>);

impl Events {
    fn send(&self, event: BatchEvent) {
        if self.0.send(event).is_err() {
            debug!("Batch event dropped, nobody is listening");
        }
    }

    fn stage(&self, index: usize, stage: Stage) {
        debug!("Item {}: {}", index + 1, stage);
        self.send(BatchEvent::Stage { index, stage });
    }
}

pub struct BatchOrchestrator<T: Transport> {
    transport: T,
    items: Vec<BatchItem>,
    settings: Settings,
    backups: Option<BackupStore>,
    control: Receiver<Control>,
    events: Events,
    state: BatchState,
}

impl<T: Transport> BatchOrchestrator<T> {
    pub fn new(
        transport: T,
        records: Vec<RawRecord>,
        settings: Settings,
        control: Receiver<Control>,
        events: Sender<BatchEvent>,
    ) -> Self {
        let backups = settings
            .backup_before_program
            .then(|| BackupStore::new(settings.backup_dir.clone()));
        Self {
            transport,
            items: records.into_iter().map(BatchItem::new).collect(),
            settings,
            backups,
            control,
            events: Events(events),
            state: BatchState::Idle,
        }
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn items(&self) -> &[BatchItem] {
        &self.items
    }

    /// Run every item and return the final report
    pub fn run(mut self) -> BatchReport {
        info!("Starting batch of {} records", self.items.len());
        self.set_state(BatchState::Running);
        self.send_tally();

        let mut index = 0;
        while index < self.items.len() {
            match self.at_boundary() {
                Decision::Stop => {
                    self.set_state(BatchState::Aborted);
                    break;
                }
                Decision::Skip => {
                    info!("Item {} skipped by operator", index + 1);
                    self.finish(index, ItemOutcome::Skipped, None);
                    index += 1;
                    continue;
                }
                Decision::Resume => {}
            }

            match self.process(index) {
                Step::Done(outcome, failure) => {
                    self.finish(index, outcome, failure);
                    index += 1;
                }
                Step::Interrupted(failure) => {
                    warn!("Item {} waiting for operator: {}", index + 1, failure);
                    self.events.send(BatchEvent::AwaitingOperator {
                        index,
                        failure: failure.clone(),
                    });
                    self.set_state(BatchState::Paused);
                    match self.wait_for_operator() {
                        Decision::Resume => self.set_state(BatchState::Running),
                        Decision::Skip => {
                            self.set_state(BatchState::Running);
                            self.finish(index, ItemOutcome::Skipped, Some(failure));
                            index += 1;
                        }
                        Decision::Stop => {
                            self.set_state(BatchState::Aborted);
                            break;
                        }
                    }
                }
            }
        }

        if self.state != BatchState::Aborted {
            self.set_state(BatchState::Completed);
        }
        let report = BatchReport {
            state: self.state,
            tally: Tally::of(&self.items),
            items: self.items,
        };
        info!("Batch finished: {}", report.tally);
        self.events.send(BatchEvent::Finished(report.clone()));
        report
    }

    fn set_state(&mut self, state: BatchState) {
        if self.state != state {
            debug!("Batch {:?} -> {:?}", self.state, state);
            self.state = state;
            self.events.send(BatchEvent::StateChanged(state));
        }
    }

    fn send_tally(&self) {
        self.events.send(BatchEvent::Tally(Tally::of(&self.items)));
    }

    fn finish(&mut self, index: usize, outcome: ItemOutcome, failure: Option<ItemFailure>) {
        if self.items[index].finish(outcome, failure.clone()) {
            self.events.send(BatchEvent::ItemFinished {
                index,
                outcome,
                failure,
            });
            self.send_tally();
        }
    }

    /// Apply whatever controls queued up while the last item ran
    fn at_boundary(&mut self) -> Decision {
        loop {
            match self.control.try_recv() {
                Ok(Control::Pause) => {
                    self.set_state(BatchState::Paused);
                    match self.wait_for_operator() {
                        Decision::Resume => self.set_state(BatchState::Running),
                        Decision::Skip => {
                            self.set_state(BatchState::Running);
                            return Decision::Skip;
                        }
                        Decision::Stop => return Decision::Stop,
                    }
                }
                Ok(Control::Resume) => {}
                Ok(Control::Skip) => return Decision::Skip,
                Ok(Control::Stop) => return Decision::Stop,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {
                    return Decision::Resume
                }
            }
        }
    }

    /// Block until the operator resumes, skips or stops
    ///
    /// A control channel that closes while paused stops the batch.
    fn wait_for_operator(&mut self) -> Decision {
        loop {
            match self.control.recv() {
                Ok(Control::Resume) => return Decision::Resume,
                Ok(Control::Skip) => return Decision::Skip,
                Ok(Control::Stop) => return Decision::Stop,
                Ok(Control::Pause) => {}
                Err(_) => {
                    warn!("Control channel closed while paused, stopping");
                    return Decision::Stop;
                }
            }
        }
    }

    fn process(&mut self, index: usize) -> Step {
        let raw = self.items[index].record().clone();
        self.events.send(BatchEvent::ItemStarted {
            index,
            imsi: raw.get(crate::records::columns::IMSI).map(str::to_string),
        });

        self.events.stage(index, Stage::Validating);
        let record = match ConfigurationRecord::from_raw(&raw) {
            Ok(record) => record,
            Err(diagnostics) => {
                warn!("Item {} is invalid: {} problems", index + 1, diagnostics.len());
                return Step::Done(ItemOutcome::Skipped, Some(ItemFailure::Validation(diagnostics)));
            }
        };
        let key = match record.adm1.clone().or_else(|| self.settings.default_adm1.clone()) {
            Some(key) => key,
            None => return Step::Done(ItemOutcome::Skipped, Some(ItemFailure::MissingAdm1Key)),
        };

        self.events.stage(index, Stage::WaitingForCard);
        let atr = match self.transport.connect(self.settings.card_timeout) {
            Ok(atr) => atr,
            Err(TransportError::CardNotPresent) => {
                return Step::Interrupted(ItemFailure::CardNotPresent)
            }
            Err(TransportError::CardRemoved) => return Step::Interrupted(ItemFailure::CardRemoved),
            Err(e) => {
                return Step::Done(
                    ItemOutcome::Failed,
                    Some(ItemFailure::CardIo(e.to_string())),
                )
            }
        };

        self.events.stage(index, Stage::Detecting);
        let variant = match CardDetector::detect(&atr) {
            Ok(variant) => variant,
            Err(e) => {
                warn!("Item {}: {}", index + 1, e);
                self.transport.disconnect();
                return Step::Interrupted(ItemFailure::DetectionFailure {
                    atr: atr_to_string(&atr),
                });
            }
        };
        info!("Item {}: detected {}", index + 1, variant);
        self.events.send(BatchEvent::CardDetected { index, variant });

        let result = program_card(
            &mut self.transport,
            &self.events,
            &self.settings,
            self.backups.as_ref(),
            index,
            (variant, &atr),
            &record,
            &key,
        );
        self.transport.disconnect();

        match result {
            Ok(()) => {
                info!("Item {} programmed", index + 1);
                Step::Done(ItemOutcome::Success, None)
            }
            Err(failure @ (ItemFailure::CardRemoved | ItemFailure::CardNotPresent)) => {
                Step::Interrupted(failure)
            }
            Err(failure) => {
                warn!("Item {} failed: {}", index + 1, failure);
                Step::Done(ItemOutcome::Failed, Some(failure))
            }
        }
    }
}

/// Everything between detection and disconnect for one card
#[allow(clippy::too_many_arguments)]
fn program_card<T: Transport + ?Sized>(
    transport: &mut T,
    events: &Events,
    settings: &Settings,
    backups: Option<&BackupStore>,
    index: usize,
    (variant, atr): (CardTypeVariant, &[u8]),
    record: &ConfigurationRecord,
    key: &Adm1Key,
) -> Result<(), ItemFailure> {
    events.stage(index, Stage::Authenticating);
    let mut session = AuthenticationSession::open(transport, variant)?;
    events.send(BatchEvent::AdmCounter {
        index,
        remaining: session.remaining(),
    });
    let outcome = session.authenticate(key, settings.force_auth)?;
    if let Some(failure) = ItemFailure::from_auth(outcome) {
        return Err(failure);
    }

    events.stage(index, Stage::CheckingCapabilities);
    let diagnostics = validation::check_capabilities(record, variant);
    if !diagnostics.is_empty() {
        return Err(ItemFailure::CapabilityViolation(diagnostics));
    }

    if let Some(store) = backups {
        events.stage(index, Stage::BackingUp);
        let identity = CardProgrammer::read_identity(&mut session)?;
        let backup = BackupRecord::capture(variant, atr, &identity, Some(record));
        let path = store.save(&backup)?;
        info!("Item {}: backup written to {}", index + 1, path.display());
        events.send(BatchEvent::BackupCreated { index, path });
    }

    events.stage(index, Stage::Programming);
    let programmed = CardProgrammer::program(&mut session, record)?;
    debug!("Item {}: {} writes verified", index + 1, programmed.writes);
    Ok(())
}

/// A batch running on its own thread
pub struct BatchHandle {
    control: Sender<Control>,
    events: Receiver<BatchEvent>,
    join: JoinHandle<BatchReport>,
}

impl BatchHandle {
    /// Queue a control; it is honoured at the next item boundary
    pub fn send(&self, control: Control) -> bool {
        self.control.send(control).is_ok()
    }

    pub fn controls(&self) -> Sender<Control> {
        self.control.clone()
    }

    pub fn events(&self) -> &Receiver<BatchEvent> {
        &self.events
    }

    /// Wait for the run to end
    pub fn join(self) -> thread::Result<BatchReport> {
        self.join.join()
    }
}

/// Start a batch on a worker thread
pub fn spawn<T: Transport + 'static>(
    transport: T,
    records: Vec<RawRecord>,
    settings: Settings,
) -> io::Result<BatchHandle> {
    let (control_tx, control_rx) = unbounded();
    let (event_tx, event_rx) = unbounded();
    let orchestrator = BatchOrchestrator::new(transport, records, settings, control_rx, event_tx);
    let join = thread::Builder::new()
        .name("usim-batch".to_string())
        .spawn(move || orchestrator.run())?;
    Ok(BatchHandle {
        control: control_tx,
        events: event_rx,
        join,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::files;
    use crate::records::columns::*;
    use crate::sim::{SimulatedCard, SimulatedReader, Tray};
    use std::time::Duration;
    use tempfile::TempDir;

    const KEY: &str = "12345678";

    fn record(n: usize) -> RawRecord {
        RawRecord::new()
            .with(IMSI, &format!("00101000000000{}", n))
            .with(ICCID, &format!("898821100000000000{}", n))
            .with(KI, "000102030405060708090A0B0C0D0E0F")
            .with(OPC, "ABCDEF0123456789ABCDEF0123456789")
            .with(ALGO_2G, "MILENAGE")
            .with(ALGO_3G, "MILENAGE")
            .with(ALGO_4G5G, "MILENAGE")
            .with(MNC_LENGTH, "2")
            .with(ADM1, KEY)
    }

    fn card(n: usize, variant: CardTypeVariant) -> SimulatedCard {
        SimulatedCard::new(variant, &format!("89882110000000010{:02}", n), KEY)
    }

    fn settings() -> Settings {
        Settings {
            backup_before_program: false,
            card_timeout: Duration::from_millis(10),
            ..Settings::default()
        }
    }

    fn run<T: Transport>(
        transport: T,
        records: Vec<RawRecord>,
        settings: Settings,
    ) -> (BatchReport, Vec<BatchEvent>) {
        let (_control_tx, control_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();
        let report =
            BatchOrchestrator::new(transport, records, settings, control_rx, event_tx).run();
        (report, event_rx.try_iter().collect())
    }

    fn outcomes(report: &BatchReport) -> Vec<ItemOutcome> {
        report.items.iter().map(BatchItem::outcome).collect()
    }

    #[test]
    fn test_invalid_records_are_skipped_in_order() {
        let mut records: Vec<RawRecord> = (1..=5).map(record).collect();
        records[1].set(IMSI, "00101000000002");
        records[3].set(IMSI, "00101000000004");
        let reader = SimulatedReader::with_cards([
            card(1, CardTypeVariant::Sja2),
            card(3, CardTypeVariant::Sja5),
            card(5, CardTypeVariant::Sjs1),
        ]);
        let tray = reader.tray();

        let (report, events) = run(reader, records, settings());
        assert_eq!(report.state, BatchState::Completed);
        assert_eq!(
            outcomes(&report),
            vec![
                ItemOutcome::Success,
                ItemOutcome::Skipped,
                ItemOutcome::Success,
                ItemOutcome::Skipped,
                ItemOutcome::Success,
            ]
        );
        assert_eq!(
            report.tally,
            Tally {
                success: 3,
                failed: 0,
                skipped: 2,
                remaining: 0
            }
        );
        assert!(matches!(report.items[1].failure(), Some(ItemFailure::Validation(_))));

        let finished: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                BatchEvent::ItemFinished { index, .. } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(finished, vec![0, 1, 2, 3, 4]);
        // Initial tally plus one per item
        let tallies = events.iter().filter(|e| matches!(e, BatchEvent::Tally(_))).count();
        assert_eq!(tallies, 6);
        assert!(matches!(events.last(), Some(BatchEvent::Finished(_))));

        // Skipped records never reached a card
        let tray = tray.lock();
        assert_eq!(tray.len(), 3);
        let imsis: Vec<&[u8]> = tray.iter().map(|c| c.file(&files::EF_GSM_IMSI).unwrap()).collect();
        assert_eq!(imsis[1], &crate::codec::bcd::encode_imsi("001010000000003").unwrap()[..]);
    }

    /// Sends `Stop` once the given card starts receiving writes
    struct StopDuring {
        inner: SimulatedReader,
        card: usize,
        connects: usize,
        control: Sender<Control>,
        sent: bool,
    }

    impl Transport for StopDuring {
        fn connect(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
            self.connects += 1;
            self.inner.connect(timeout)
        }

        fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>, TransportError> {
            let is_update = command.get(1) == Some(&crate::apdu::ins::UPDATE_BINARY);
            if self.connects == self.card && !self.sent && is_update {
                self.control.send(Control::Stop).unwrap();
                self.sent = true;
            }
            self.inner.transmit(command)
        }

        fn disconnect(&mut self) {
            self.inner.disconnect()
        }
    }

    #[test]
    fn test_stop_finishes_card_in_flight() {
        let reader = SimulatedReader::with_cards((1..=5).map(|n| card(n, CardTypeVariant::Sja5)));
        let tray = reader.tray();
        let (control_tx, control_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();
        let transport = StopDuring {
            inner: reader,
            card: 3,
            connects: 0,
            control: control_tx,
            sent: false,
        };
        let records = (1..=5).map(record).collect();
        let report =
            BatchOrchestrator::new(transport, records, settings(), control_rx, event_tx).run();

        assert_eq!(report.state, BatchState::Aborted);
        assert_eq!(
            outcomes(&report),
            vec![
                ItemOutcome::Success,
                ItemOutcome::Success,
                ItemOutcome::Success,
                ItemOutcome::Pending,
                ItemOutcome::Pending,
            ]
        );
        assert_eq!(report.tally.remaining, 2);
        // The third card was fully written and verified
        let tray = tray.lock();
        assert_eq!(tray.len(), 3);
        assert_eq!(
            tray[2].file(&files::EF_ICCID).unwrap(),
            &crate::codec::bcd::encode_iccid("8988211000000000003").unwrap()[..]
        );
        let states: Vec<BatchState> = event_rx
            .try_iter()
            .filter_map(|e| match e {
                BatchEvent::StateChanged(s) => Some(s),
                _ => None,
            })
            .collect();
        assert_eq!(states, vec![BatchState::Running, BatchState::Aborted]);
    }

    fn wait_for_pause(handle: &BatchHandle) -> ItemFailure {
        for event in handle.events().iter() {
            if let BatchEvent::AwaitingOperator { failure, .. } = event {
                return failure;
            }
        }
        panic!("batch ended without pausing");
    }

    #[test]
    fn test_missing_card_pauses_then_resumes_same_item() {
        let mut reader = SimulatedReader::new();
        reader.push_gap();
        reader.push(card(1, CardTypeVariant::Sja2));
        let handle = spawn(reader, vec![record(1)], settings()).unwrap();

        assert_eq!(wait_for_pause(&handle), ItemFailure::CardNotPresent);
        assert!(handle.send(Control::Resume));
        let report = handle.join().unwrap();
        assert_eq!(report.state, BatchState::Completed);
        assert_eq!(outcomes(&report), vec![ItemOutcome::Success]);
    }

    #[test]
    fn test_unknown_card_pauses_and_skip_moves_on() {
        let mut stranger = card(1, CardTypeVariant::Sja2);
        stranger.set_atr(vec![0x3B; 20]);
        let reader = SimulatedReader::with_cards([stranger, card(2, CardTypeVariant::Sja2)]);
        let tray = reader.tray();
        let handle = spawn(reader, vec![record(1), record(2)], settings()).unwrap();

        let failure = wait_for_pause(&handle);
        assert!(matches!(failure, ItemFailure::DetectionFailure { .. }));
        handle.send(Control::Skip);
        let report = handle.join().unwrap();
        assert_eq!(outcomes(&report), vec![ItemOutcome::Skipped, ItemOutcome::Success]);
        // The unrecognized card was ejected untouched
        assert_eq!(tray.lock()[0].file(&files::EF_GSM_IMSI).unwrap(), &[0xFF; 9]);
    }

    #[test]
    fn test_stop_while_paused_aborts() {
        let mut reader = SimulatedReader::new();
        reader.push_gap();
        let handle = spawn(reader, vec![record(1), record(2)], settings()).unwrap();
        wait_for_pause(&handle);
        handle.send(Control::Stop);
        let report = handle.join().unwrap();
        assert_eq!(report.state, BatchState::Aborted);
        assert_eq!(report.tally.remaining, 2);
    }

    #[test]
    fn test_queued_skip_does_not_touch_card() {
        let reader = SimulatedReader::with_cards([card(2, CardTypeVariant::Sja2)]);
        let tray = reader.tray();
        let (control_tx, control_rx) = unbounded();
        let (event_tx, _event_rx) = unbounded();
        control_tx.send(Control::Skip).unwrap();
        let records = vec![record(1), record(2)];
        let report =
            BatchOrchestrator::new(reader, records, settings(), control_rx, event_tx).run();
        assert_eq!(outcomes(&report), vec![ItemOutcome::Skipped, ItemOutcome::Success]);
        assert!(report.items[0].failure().is_none());
        assert_eq!(tray.lock().len(), 1);
    }

    fn ejected(tray: &Tray, n: usize) -> SimulatedCard {
        tray.lock()[n].clone()
    }

    #[test]
    fn test_wrong_key_fails_item_and_batch_continues() {
        let reader = SimulatedReader::with_cards((1..=2).map(|n| card(n, CardTypeVariant::Sjs1)));
        let tray = reader.tray();
        let records = vec![record(1).with(ADM1, "87654321"), record(2)];
        let (report, events) = run(reader, records, settings());

        assert_eq!(outcomes(&report), vec![ItemOutcome::Failed, ItemOutcome::Success]);
        assert_eq!(
            report.items[0].failure(),
            Some(&ItemFailure::AuthenticationFailure { remaining: 2 })
        );
        assert_eq!(ejected(&tray, 0).adm1_retries(), 2);
        assert!(events
            .iter()
            .any(|e| matches!(e, BatchEvent::AdmCounter { index: 0, remaining: 3 })));
    }

    #[test]
    fn test_used_counter_needs_force() {
        let mut tired = card(1, CardTypeVariant::Sja5);
        tired.set_adm1_retries(2);
        let reader = SimulatedReader::with_cards([tired.clone()]);
        let (report, _) = run(reader, vec![record(1)], settings());
        assert_eq!(
            report.items[0].failure(),
            Some(&ItemFailure::ConfirmationRequired { remaining: 2 })
        );

        let reader = SimulatedReader::with_cards([tired]);
        let forced = Settings {
            force_auth: true,
            ..settings()
        };
        let (report, _) = run(reader, vec![record(1)], forced);
        assert_eq!(outcomes(&report), vec![ItemOutcome::Success]);
    }

    #[test]
    fn test_default_key_and_missing_key() {
        let reader = SimulatedReader::with_cards([card(2, CardTypeVariant::Sja2)]);
        let mut without = record(1);
        without.remove(ADM1);
        let (report, _) = run(reader, vec![without.clone(), record(2)], settings());
        assert_eq!(report.items[0].failure(), Some(&ItemFailure::MissingAdm1Key));
        assert_eq!(report.items[0].outcome(), ItemOutcome::Skipped);

        let reader = SimulatedReader::with_cards([card(1, CardTypeVariant::Sja2)]);
        let with_default = Settings {
            default_adm1: Some(Adm1Key::parse(KEY).unwrap()),
            ..settings()
        };
        let (report, _) = run(reader, vec![without], with_default);
        assert_eq!(outcomes(&report), vec![ItemOutcome::Success]);
    }

    #[test]
    fn test_capability_violation_fails_before_writing() {
        let reader = SimulatedReader::with_cards([card(1, CardTypeVariant::Sjs1)]);
        let tray = reader.tray();
        let tuak = record(1).with(ALGO_4G5G, "TUAK");
        let (report, _) = run(reader, vec![tuak], settings());
        assert!(matches!(
            report.items[0].failure(),
            Some(ItemFailure::CapabilityViolation(_))
        ));
        assert_eq!(ejected(&tray, 0).file(&files::EF_GSM_IMSI).unwrap(), &[0xFF; 9]);
    }

    #[test]
    fn test_backup_taken_before_programming() {
        let dir = TempDir::new().unwrap();
        let reader = SimulatedReader::with_cards([card(1, CardTypeVariant::Sja2)]);
        let with_backup = Settings {
            backup_before_program: true,
            backup_dir: Some(dir.path().to_path_buf()),
            ..settings()
        };
        let (report, events) = run(reader, vec![record(1)], with_backup);
        assert_eq!(outcomes(&report), vec![ItemOutcome::Success]);

        let path = events
            .iter()
            .find_map(|e| match e {
                BatchEvent::BackupCreated { path, .. } => Some(path.clone()),
                _ => None,
            })
            .unwrap();
        let backup = BackupStore::load(&path).unwrap();
        // Factory ICCID, not the one the record wrote
        assert_eq!(backup.card_data.iccid.as_deref(), Some("8988211000000001001"));
        assert_eq!(backup.card_data.imsi, None);
    }

    #[test]
    fn test_stages_run_backup_then_programming() {
        let dir = TempDir::new().unwrap();
        let reader = SimulatedReader::with_cards([card(1, CardTypeVariant::Sja5)]);
        let tray = reader.tray();
        let with_backup = Settings {
            backup_before_program: true,
            backup_dir: Some(dir.path().to_path_buf()),
            ..settings()
        };
        let (report, events) = run(reader, vec![record(1)], with_backup);
        assert_eq!(outcomes(&report), vec![ItemOutcome::Success]);

        let stages: Vec<Stage> = events
            .iter()
            .filter_map(|e| match e {
                BatchEvent::Stage { stage, .. } => Some(*stage),
                _ => None,
            })
            .collect();
        assert_eq!(
            stages,
            vec![
                Stage::Validating,
                Stage::WaitingForCard,
                Stage::Detecting,
                Stage::Authenticating,
                Stage::CheckingCapabilities,
                Stage::BackingUp,
                Stage::Programming,
            ]
        );
        let programmed = ejected(&tray, 0);
        assert_eq!(
            programmed.file(&files::EF_GSM_IMSI).unwrap(),
            &crate::codec::bcd::encode_imsi("001010000000001").unwrap()[..]
        );
    }
}
