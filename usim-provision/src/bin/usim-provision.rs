//! usim-provision: batch programmer for sysmocom USIM/ISIM cards
//!
//! ```bash
//! # Check an input file without touching a card
//! usim-provision validate cards.csv --card sja5
//!
//! # Program one card per record from a PC/SC reader
//! usim-provision batch cards.csv --adm1 12345678
//!
//! # Dry run against simulated cards
//! usim-provision batch cards.csv --simulate sja2
//!
//! # Show what the inserted card holds, then back it up
//! usim-provision read
//! usim-provision backup create --adm1 12345678
//!
//! # Turn a backup back into an input row
//! usim-provision backup export backup_8988...json --output restore.csv
//! ```
//!
//! While a batch runs, type `p` (pause), `r` (resume), `s` (skip) or `q`
//! (stop) followed by Enter. Controls apply between cards.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{info, warn};

use usim_provision::backup::BackupStore;
use usim_provision::batch::{self, BatchEvent, Control, ItemOutcome};
use usim_provision::card::atr_to_string;
use usim_provision::config::Adm1Key;
use usim_provision::inspect::{self, CardInspection};
use usim_provision::records::{load_card_parameters, load_csv, save_csv, RawRecord};
use usim_provision::sim::{SimulatedCard, SimulatedReader};
use usim_provision::transport::Transport;
use usim_provision::{validation, CardTypeVariant, Settings};

/// ADM1 of simulated cards when records carry none
const SIM_DEFAULT_ADM1: &str = "12345678";
/// ICCID printed into simulated cards at "manufacture"
const SIM_FACTORY_ICCID: &str = "8988211000000000000";

#[derive(Parser)]
#[command(name = "usim-provision")]
#[command(author, version, about = "Program sysmoUSIM/ISIM cards in batches", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check records without contacting a card
    Validate {
        /// CSV file or card-parameters.txt
        input: PathBuf,

        /// Also check against this card type
        #[arg(long, value_enum)]
        card: Option<CardArg>,
    },

    /// Program one card per record
    Batch(BatchCmd),

    /// Detect the inserted card and print its identity
    Read(CardCmd),

    /// Create, inspect and export backups
    #[command(subcommand)]
    Backup(BackupCmd),
}

#[derive(Args)]
struct BatchCmd {
    /// CSV file or card-parameters.txt
    input: PathBuf,

    /// PC/SC reader name (default: first reader)
    #[arg(long, conflicts_with = "simulate")]
    reader: Option<String>,

    /// Use simulated cards of this type instead of a reader
    #[arg(long, value_enum)]
    simulate: Option<CardArg>,

    /// ADM1 for records without their own
    #[arg(long, env = "USIM_PROVISION_ADM1", hide_env_values = true)]
    adm1: Option<String>,

    /// Do not back up cards before writing them
    #[arg(long)]
    no_backup: bool,

    /// Backup directory
    #[arg(long)]
    backup_dir: Option<PathBuf>,

    /// Present ADM1 even if attempts were already used on a card
    #[arg(long)]
    force: bool,

    /// Seconds to wait for each card
    #[arg(long)]
    timeout: Option<u64>,
}

#[derive(Args)]
struct CardCmd {
    /// PC/SC reader name (default: first reader)
    #[arg(long, conflicts_with = "simulate")]
    reader: Option<String>,

    /// Use a factory-fresh simulated card of this type
    #[arg(long, value_enum)]
    simulate: Option<CardArg>,

    /// ADM1 to present first (default: read without it)
    #[arg(long, env = "USIM_PROVISION_ADM1", hide_env_values = true)]
    adm1: Option<String>,

    /// Present ADM1 even if attempts were already used on the card
    #[arg(long)]
    force: bool,

    /// Seconds to wait for the card
    #[arg(long)]
    timeout: Option<u64>,
}

#[derive(Subcommand)]
enum BackupCmd {
    /// Back up the inserted card without writing to it
    Create {
        #[command(flatten)]
        card: CardCmd,

        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// List backups, newest first
    List {
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Only backups of this ICCID
        #[arg(long)]
        iccid: Option<String>,
    },

    /// Print a backup file
    Show { path: PathBuf },

    /// Write backups as CSV rows (keys are left empty)
    Export {
        paths: Vec<PathBuf>,

        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CardArg {
    Sja2,
    Sja5,
    Sjs1,
}

impl From<CardArg> for CardTypeVariant {
    fn from(arg: CardArg) -> Self {
        match arg {
            CardArg::Sja2 => CardTypeVariant::Sja2,
            CardArg::Sja5 => CardTypeVariant::Sja5,
            CardArg::Sjs1 => CardTypeVariant::Sjs1,
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { input, card } => validate(&input, card.map(Into::into)),
        Commands::Batch(cmd) => run_batch(cmd),
        Commands::Read(cmd) => read_card(&cmd),
        Commands::Backup(cmd) => backup(cmd),
    }
}

fn load_records(path: &Path) -> Result<Vec<RawRecord>> {
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
    let records = if is_csv {
        load_csv(path)
    } else {
        load_card_parameters(path)
    }
    .with_context(|| format!("Failed to load records from {}", path.display()))?;
    if records.is_empty() {
        bail!("No records in {}", path.display());
    }
    Ok(records)
}

fn validate(input: &Path, card: Option<CardTypeVariant>) -> Result<()> {
    let records = load_records(input)?;
    let mut invalid = 0;
    for (n, raw) in records.iter().enumerate() {
        let diagnostics = validation::validate(raw, card);
        if diagnostics.is_empty() {
            println!("#{} ok", n + 1);
            continue;
        }
        invalid += 1;
        println!("#{} invalid", n + 1);
        for d in diagnostics {
            println!("    {}", d);
        }
    }
    if invalid > 0 {
        bail!("{} of {} records are invalid", invalid, records.len());
    }
    println!("All {} records are valid", records.len());
    Ok(())
}

fn settings(cmd: &BatchCmd) -> Result<Settings> {
    let mut settings = Settings::from_env();
    if let Some(dir) = &cmd.backup_dir {
        settings.backup_dir = Some(dir.clone());
    }
    if cmd.no_backup {
        settings.backup_before_program = false;
    }
    if cmd.force {
        settings.force_auth = true;
    }
    if let Some(secs) = cmd.timeout {
        settings.card_timeout = Duration::from_secs(secs);
    }
    if let Some(key) = &cmd.adm1 {
        settings.default_adm1 = Some(Adm1Key::parse(key).context("Invalid --adm1")?);
    }
    Ok(settings)
}

/// A reader holding one blank card per record
fn simulated_reader(
    variant: CardTypeVariant,
    records: &[RawRecord],
    default_adm1: Option<&str>,
) -> SimulatedReader {
    let cards = records.iter().map(|raw| {
        let adm1 = raw
            .get(usim_provision::records::columns::ADM1)
            .or(default_adm1)
            .unwrap_or(SIM_DEFAULT_ADM1);
        SimulatedCard::new(variant, SIM_FACTORY_ICCID, adm1)
    });
    SimulatedReader::with_cards(cards)
}

#[cfg(feature = "pcsc")]
fn pcsc_reader(name: Option<&str>) -> Result<Box<dyn Transport>> {
    let reader = usim_provision::transport::pcsc::PcscTransport::open(name)
        .context("Failed to open PC/SC reader")?;
    Ok(Box::new(reader))
}

#[cfg(not(feature = "pcsc"))]
fn pcsc_reader(_name: Option<&str>) -> Result<Box<dyn Transport>> {
    bail!("Built without PC/SC support; rebuild with --features pcsc or use --simulate")
}

/// Reader, settings and key for a single-card command
fn card_setup(cmd: &CardCmd) -> Result<(Box<dyn Transport>, Settings, Option<Adm1Key>)> {
    let mut settings = Settings::from_env();
    settings.force_auth = cmd.force;
    if let Some(secs) = cmd.timeout {
        settings.card_timeout = Duration::from_secs(secs);
    }
    let key = cmd
        .adm1
        .as_deref()
        .map(Adm1Key::parse)
        .transpose()
        .context("Invalid --adm1")?;
    let transport: Box<dyn Transport> = match cmd.simulate {
        Some(variant) => {
            let adm1 = cmd.adm1.as_deref().unwrap_or(SIM_DEFAULT_ADM1);
            let card = SimulatedCard::new(variant.into(), SIM_FACTORY_ICCID, adm1);
            Box::new(SimulatedReader::with_cards([card]))
        }
        None => pcsc_reader(cmd.reader.as_deref())?,
    };
    Ok((transport, settings, key))
}

fn print_inspection(inspection: &CardInspection) {
    let identity = &inspection.identity;
    println!("card: {}", inspection.variant);
    println!("ATR: {}", atr_to_string(&inspection.atr));
    println!("ADM1 attempts left: {}", inspection.adm1_remaining);
    println!("ADM1 verified: {}", if inspection.authenticated { "yes" } else { "no" });
    println!("ICCID: {}", identity.iccid.as_deref().unwrap_or("-"));
    println!("IMSI: {}", identity.imsi.as_deref().unwrap_or("-"));
    match identity.mnc_length {
        Some(n) => println!("MNC length: {}", n),
        None => println!("MNC length: -"),
    }
}

fn read_card(cmd: &CardCmd) -> Result<()> {
    let (mut transport, settings, key) = card_setup(cmd)?;
    let inspection = inspect::inspect(transport.as_mut(), &settings, key.as_ref())
        .context("Failed to read card")?;
    print_inspection(&inspection);
    Ok(())
}

/// Forward single-letter commands from stdin to the batch
fn spawn_control_reader(controls: crossbeam_channel::Sender<Control>) {
    let spawned = thread::Builder::new().name("usim-controls".to_string()).spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let control = match line.trim() {
                "p" => Control::Pause,
                "r" => Control::Resume,
                "s" => Control::Skip,
                "q" => Control::Stop,
                "" => continue,
                other => {
                    eprintln!("Unknown command {:?} (p, r, s or q)", other);
                    continue;
                }
            };
            if controls.send(control).is_err() {
                break;
            }
        }
    });
    if let Err(e) = spawned {
        warn!("No interactive controls: {}", e);
    }
}

fn run_batch(cmd: BatchCmd) -> Result<()> {
    let records = load_records(&cmd.input)?;
    let settings = settings(&cmd)?;
    let transport: Box<dyn Transport> = match cmd.simulate {
        Some(variant) => Box::new(simulated_reader(variant.into(), &records, cmd.adm1.as_deref())),
        None => pcsc_reader(cmd.reader.as_deref())?,
    };

    info!("Programming {} records", records.len());
    let handle =
        batch::spawn(transport, records, settings).context("Failed to start batch thread")?;
    spawn_control_reader(handle.controls());

    for event in handle.events().iter() {
        match event {
            BatchEvent::ItemStarted { index, imsi } => {
                println!("#{} IMSI {}", index + 1, imsi.as_deref().unwrap_or("?"));
            }
            BatchEvent::CardDetected { variant, .. } => println!("    card: {}", variant),
            BatchEvent::AdmCounter { remaining, .. } => {
                println!("    ADM1 attempts left: {}", remaining)
            }
            BatchEvent::BackupCreated { path, .. } => println!("    backup: {}", path.display()),
            BatchEvent::AwaitingOperator { index, failure } => {
                println!("#{} paused: {}", index + 1, failure);
                println!("    insert a card and type r to retry, s to skip, q to stop");
            }
            BatchEvent::ItemFinished {
                index,
                outcome,
                failure,
            } => match failure {
                Some(f) => println!("#{} {:?}: {} ({:?})", index + 1, outcome, f, f.retry_safety()),
                None => println!("#{} {:?}", index + 1, outcome),
            },
            BatchEvent::Tally(tally) => println!("    {}", tally),
            BatchEvent::StateChanged(state) => info!("Batch {:?}", state),
            BatchEvent::Stage { .. } => {}
            BatchEvent::Finished(_) => break,
        }
    }

    let report = match handle.join() {
        Ok(report) => report,
        Err(_) => bail!("Batch thread panicked"),
    };
    println!("Batch {:?}: {}", report.state, report.tally);
    let failed = report
        .items
        .iter()
        .filter(|item| item.outcome() == ItemOutcome::Failed)
        .count();
    if failed > 0 {
        bail!("{} cards failed", failed);
    }
    Ok(())
}

fn backup(cmd: BackupCmd) -> Result<()> {
    match cmd {
        BackupCmd::Create { card, dir } => {
            let (mut transport, settings, key) = card_setup(&card)?;
            let store = BackupStore::new(dir.or(settings.backup_dir.clone()));
            let (inspection, path) =
                inspect::backup_card(transport.as_mut(), &settings, key.as_ref(), &store)
                    .context("Failed to back up card")?;
            print_inspection(&inspection);
            println!("backup: {}", path.display());
        }
        BackupCmd::List { dir, iccid } => {
            let store = BackupStore::new(dir);
            let entries = store
                .list(iccid.as_deref())
                .with_context(|| format!("Failed to list {}", store.dir().display()))?;
            if entries.is_empty() {
                println!("No backups in {}", store.dir().display());
            }
            for entry in entries {
                println!(
                    "{}  {}  ICCID {}  IMSI {}  {}",
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    entry.card_type,
                    entry.iccid.as_deref().unwrap_or("-"),
                    entry.imsi.as_deref().unwrap_or("-"),
                    entry.path.display()
                );
            }
        }
        BackupCmd::Show { path } => {
            let record = BackupStore::load(&path)?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        BackupCmd::Export { paths, output } => {
            if paths.is_empty() {
                bail!("No backup files given");
            }
            let rows = paths
                .iter()
                .map(|p| {
                    BackupStore::export_row(p)
                        .with_context(|| format!("Failed to read {}", p.display()))
                })
                .collect::<Result<Vec<_>>>()?;
            save_csv(&output, &rows, true)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("Wrote {} rows to {}", rows.len(), output.display());
        }
    }
    Ok(())
}
