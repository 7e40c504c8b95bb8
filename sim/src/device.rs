// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Simulated device: engine wiring, persistence and the control loop

use std::{
    io::{BufRead, Write},
    path::{Path, PathBuf},
};

use log::{debug, info, warn};
use serde::Serialize;

use bearer_core::{
    control::{classify_press, verdict_pattern, wait_for_release, ButtonAction, Indication, Mode},
    engine::{Engine, Event, Output, WalletStatus},
    error::WalletError,
    platform::Clock,
    state::DeviceState,
    storage::RecordKind,
    tamper::TamperStatus,
};

use crate::{
    flash::FileFlash,
    hardware::{HardwareState, SimClock, SimPlatform, SimSecureElement},
};

/// Flash image file name within the state directory
pub const FLASH_FILE: &str = "flash.bin";

/// Hardware state file name within the state directory
pub const HARDWARE_FILE: &str = "hardware.json";

pub type SimEngine = Engine<SimSecureElement, FileFlash, SimPlatform>;

/// JSON-friendly [Output] encoding
#[derive(Clone, PartialEq, Debug, Serialize)]
#[serde(untagged)]
pub enum Response {
    None,
    Status(WalletStatus),
    State { state: DeviceState },
    Tamper(TamperStatus),
    Address { address: String },
    PublicKey { public_key: String },
    PrivateKey { private_key: String },
    Signature { signature: String },
}

impl From<Output> for Response {
    fn from(o: Output) -> Self {
        match o {
            Output::None => Response::None,
            Output::Status(s) => Response::Status(s),
            Output::State(state) => Response::State { state },
            Output::Tamper(t) => Response::Tamper(t),
            Output::Address(a) => Response::Address {
                address: a.as_str().to_string(),
            },
            Output::PublicKey(k) => Response::PublicKey {
                public_key: hex::encode(k),
            },
            Output::PrivateKey(k) => Response::PrivateKey {
                private_key: hex::encode(k),
            },
            Output::Signature(s) => Response::Signature {
                signature: hex::encode(s),
            },
        }
    }
}

/// Error response, coarse category only
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u8,
}

impl From<WalletError> for ErrorResponse {
    fn from(e: WalletError) -> Self {
        Self {
            error: format!("{e}"),
            code: e as u8,
        }
    }
}

/// Simulated bearer wallet device
pub struct Simulator {
    dir: PathBuf,
    clock: SimClock,
    engine: SimEngine,
}

impl Simulator {
    /// Open (or create) simulator state in the provided directory
    pub fn open(dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(dir)?;

        let hw = HardwareState::load_or_create(&dir.join(HARDWARE_FILE))?;
        let flash = FileFlash::open(&dir.join(FLASH_FILE))?;

        let clock = SimClock::new();
        let platform = SimPlatform::new(clock.clone(), hw.circuit_intact);
        let se = SimSecureElement::new(hw, clock.clone());

        Ok(Self {
            dir: dir.to_path_buf(),
            clock,
            engine: Engine::new(se, flash, platform),
        })
    }

    /// Power on the device
    pub fn boot(&mut self) -> TamperStatus {
        let s = self.engine.boot();

        info!(
            "booted, state: {} (intact: {}, tamper count: {})",
            self.engine.current_device_state(),
            s.is_intact,
            s.tamper_count
        );

        s
    }

    /// Access the engine
    pub fn engine(&mut self) -> &mut SimEngine {
        &mut self.engine
    }

    /// Dispatch an event to the engine
    pub fn execute(&mut self, evt: &Event) -> Result<Response, WalletError> {
        self.engine.update(evt).map(Response::from)
    }

    /// Write flash image and hardware state back to the state directory
    pub fn save(&mut self) -> anyhow::Result<()> {
        self.engine.store_mut().flash_mut().save()?;

        let mut hw = self.engine.se_mut().hardware().clone();
        hw.circuit_intact = self.engine.platform_mut().circuit_intact();
        hw.save(&self.dir.join(HARDWARE_FILE))?;

        Ok(())
    }

    /// Current presentation indication
    pub fn indication(&self) -> Indication {
        Indication::from(self.engine.current_device_state())
    }

    /// Run the cooperative control loop over line-based input.
    ///
    /// Commands:
    /// - `press <ms>`: button press of the provided duration
    /// - `usb <command> [hex]`: USB command, see [usb_event]
    /// - `circuit <intact>`: set tamper loop continuity
    /// - `se-tamper <tampered>`: set the secure element tamper register
    /// - `quit`
    pub fn run<R: BufRead, W: Write>(
        &mut self,
        input: R,
        mut output: W,
        button_held: bool,
    ) -> anyhow::Result<()> {
        let mode = Mode::select(self.engine.current_device_state(), button_held);

        info!("control loop started in {} mode", mode);
        if mode == Mode::Boot {
            writeln!(output, "mass storage mode")?;
        }
        writeln!(output, "indication: {}", self.indication())?;

        for line in input.lines() {
            let line = line?;
            let mut args = line.split_whitespace();

            let cmd = match args.next() {
                Some(c) => c,
                None => continue,
            };

            debug!("command: {}", line);

            match (cmd, args.next(), args.next()) {
                ("quit", _, _) => break,
                ("press", Some(ms), _) => {
                    let ms: u32 = ms.parse()?;
                    self.press(mode, ms, &mut output)?;
                }
                ("usb", Some(c), arg) => {
                    let evt = match usb_event(c, arg) {
                        Some(e) => e,
                        None => {
                            warn!("unrecognised usb command: {}", c);
                            writeln!(output, "unrecognised usb command: {c}")?;
                            continue;
                        }
                    };

                    writeln!(output, "indication: {}", Indication::Busy)?;
                    let r = self.execute(&evt);
                    write_response(&mut output, r)?;
                }
                ("circuit", Some(v), _) => {
                    self.engine.platform_mut().set_circuit(v.parse()?);
                }
                ("se-tamper", Some(v), _) => {
                    self.engine.se_mut().hardware_mut().se_tampered = v.parse()?;
                }
                _ => {
                    warn!("unrecognised command: {}", line);
                    writeln!(output, "unrecognised command: {line}")?;
                    continue;
                }
            }

            writeln!(output, "indication: {}", self.indication())?;

            self.save()?;
        }

        self.save()?;

        Ok(())
    }

    /// Handle a button press of the provided duration
    fn press<W: Write>(&mut self, mode: Mode, ms: u32, output: &mut W) -> anyhow::Result<()> {
        writeln!(output, "indication: {}", Indication::Busy)?;

        // Hold the button for the requested duration
        let start = self.clock.now_ms();
        let probe = self.clock.clone();
        let mut clock = self.clock.clone();
        let held = wait_for_release(&mut clock, || probe.now_ms().wrapping_sub(start) < ms)
            .map_err(|_| anyhow::anyhow!("button release timeout"))?;

        let action = match classify_press(mode, held) {
            Some(a) => a,
            None => {
                debug!("ignoring {} ms press in {} mode", held, mode);
                return Ok(());
            }
        };

        info!("button: {} ({} ms)", action, held);

        if action == ButtonAction::MassStorage {
            writeln!(output, "mass storage mode")?;
            return Ok(());
        }

        let evt = match action.event() {
            Some(e) => e,
            None => return Ok(()),
        };

        match self.engine.update(&evt) {
            Ok(Output::Tamper(s)) => {
                let (indication, blinks) = verdict_pattern(s.is_intact);
                writeln!(output, "blink: {indication} x{blinks}")?;

                if let Some(signals) = self.engine.last_signals() {
                    writeln!(output, "signals: {}", serde_json::to_string(&signals)?)?;
                }
            }
            Ok(_) => (),
            Err(e) => writeln!(output, "error: {e}")?,
        }

        Ok(())
    }

    /// Flip bits in a stored record (fault injection)
    pub fn corrupt(&mut self, kind: RecordKind, offset: u32, mask: u8) -> anyhow::Result<()> {
        let o = self.engine.store_mut().record_offset(kind) + offset;
        self.engine.store_mut().flash_mut().corrupt(o, mask)
    }
}

/// Map USB commands to engine events
pub fn usb_event(cmd: &str, arg: Option<&str>) -> Option<Event> {
    let evt = match cmd {
        "status" => Event::GetStatus,
        "state" => Event::GetState,
        "tamper" => Event::GetTamperStatus,
        "check" => Event::CheckIntegrity,
        "init" => Event::GenerateKeys,
        "address" => Event::GetAddress,
        "pubkey" => Event::GetPublicKey,
        "reveal" => Event::RevealPrivateKey,
        "sign" => {
            let mut hash = [0u8; 32];
            hex::decode_to_slice(arg?, &mut hash).ok()?;
            Event::SignHash { hash }
        }
        "reset" => Event::FactoryReset,
        _ => return None,
    };

    Some(evt)
}

/// Write an engine response as a single JSON line
pub fn write_response<W: Write>(
    output: &mut W,
    r: Result<Response, WalletError>,
) -> anyhow::Result<()> {
    let s = match r {
        Ok(v) => serde_json::to_string(&v)?,
        Err(e) => serde_json::to_string(&ErrorResponse::from(e))?,
    };

    writeln!(output, "{s}")?;

    Ok(())
}
