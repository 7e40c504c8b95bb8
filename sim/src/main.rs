// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Command line simulator for the bearer wallet key custody engine

use std::{
    io::{self, Write},
    path::PathBuf,
};

use clap::{Parser, Subcommand};
use log::{debug, info, LevelFilter};
use strum::Display;

use bearer_core::{engine::Event, storage::RecordKind};
use bearer_sim::*;

/// Bearer wallet simulator
///
/// Each invocation powers on the simulated device (running the boot
/// integrity check), executes a single command and powers off.
#[derive(Clone, PartialEq, Debug, Parser)]
struct Options {
    /// Directory holding the flash image and hardware state
    #[clap(long, env = "BEARER_SIM_DIR", default_value = ".bearer-sim")]
    state_dir: PathBuf,

    /// Subcommand to execute
    #[clap(subcommand)]
    cmd: Actions,

    /// Log level
    #[clap(long, default_value = "info")]
    log_level: LevelFilter,
}

#[derive(Clone, PartialEq, Debug, Subcommand)]
enum Actions {
    /// Fetch wallet status summary
    Status,

    /// Fetch device lifecycle state
    State,

    /// Run an integrity check
    Check,

    /// Generate and seal wallet keys
    Init,

    /// Fetch wallet address
    Address,

    /// Fetch wallet public key
    Pubkey,

    /// Request private key disclosure
    Reveal,

    /// Sign a transaction hash
    Sign {
        /// Hex-encoded 32-byte hash
        hash: HexData<32>,
    },

    /// Factory reset, erasing keys and seal
    Reset,

    /// Modify simulated hardware (device powered off)
    Tamper {
        /// Set tamper loop continuity
        #[clap(long)]
        circuit: Option<bool>,

        /// Set the secure element tamper register
        #[clap(long)]
        se_tampered: Option<bool>,

        /// Stop the secure element responding
        #[clap(long)]
        se_wedged: Option<bool>,
    },

    /// Flip bits in a stored record (device powered off)
    Corrupt {
        /// Record to corrupt
        #[clap(value_enum)]
        record: Record,

        /// Byte offset within the record sector
        #[clap(long, default_value = "4")]
        offset: u32,

        /// Bit mask to apply
        #[clap(long, default_value = "1")]
        mask: u8,
    },

    /// Run the device control loop, reading commands from stdin
    Run {
        /// Hold the button at power on (enters boot mode)
        #[clap(long)]
        button_held: bool,
    },
}

/// Stored record selector
#[derive(Copy, Clone, PartialEq, Debug, Display, clap::ValueEnum)]
#[strum(serialize_all = "lowercase")]
enum Record {
    Keys,
    State,
    Seal,
}

impl From<Record> for RecordKind {
    fn from(r: Record) -> Self {
        match r {
            Record::Keys => RecordKind::Keys,
            Record::State => RecordKind::State,
            Record::Seal => RecordKind::Seal,
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
struct HexData<const N: usize>(pub [u8; N]);

impl<const N: usize> std::str::FromStr for HexData<N> {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut b = [0u8; N];

        hex::decode_to_slice(s, &mut b)?;

        Ok(HexData(b))
    }
}

fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Options::parse();

    // Setup logging (stdout carries command output)
    let _ = simplelog::TermLogger::init(
        args.log_level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    );

    debug!("using state directory: '{}'", args.state_dir.display());

    // Hardware modifications happen with the device powered off
    match &args.cmd {
        Actions::Tamper {
            circuit,
            se_tampered,
            se_wedged,
        } => {
            let p = args.state_dir.join(HARDWARE_FILE);
            std::fs::create_dir_all(&args.state_dir)?;

            let mut hw = HardwareState::load_or_create(&p)?;
            if let Some(v) = circuit {
                hw.circuit_intact = *v;
            }
            if let Some(v) = se_tampered {
                hw.se_tampered = *v;
            }
            if let Some(v) = se_wedged {
                hw.se_wedged = *v;
            }
            hw.save(&p)?;

            info!("hardware state updated");
            println!("{}", serde_json::to_string(&hw)?);

            return Ok(());
        }
        Actions::Corrupt {
            record,
            offset,
            mask,
        } => {
            let mut s = Simulator::open(&args.state_dir)?;
            s.corrupt(RecordKind::from(*record), *offset, *mask)?;
            s.save()?;

            info!("corrupted {} record at offset {}", record, offset);

            return Ok(());
        }
        _ => (),
    }

    // Power on
    let mut s = Simulator::open(&args.state_dir)?;
    s.boot();

    let evt = match args.cmd {
        Actions::Status => Event::GetStatus,
        Actions::State => Event::GetState,
        Actions::Check => Event::CheckIntegrity,
        Actions::Init => Event::GenerateKeys,
        Actions::Address => Event::GetAddress,
        Actions::Pubkey => Event::GetPublicKey,
        Actions::Reveal => Event::RevealPrivateKey,
        Actions::Sign { hash } => Event::SignHash { hash: hash.0 },
        Actions::Reset => Event::FactoryReset,
        Actions::Run { button_held } => {
            let stdin = io::stdin();
            s.run(stdin.lock(), io::stdout(), button_held)?;
            return Ok(());
        }
        Actions::Tamper { .. } | Actions::Corrupt { .. } => unreachable!(),
    };

    let r = s.execute(&evt);
    let failed = r.is_err();

    let mut stdout = io::stdout();
    write_response(&mut stdout, r)?;
    stdout.flush()?;

    s.save()?;

    if failed {
        std::process::exit(1);
    }

    Ok(())
}
