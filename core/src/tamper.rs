// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Tamper integrity monitor
//!
//! Integrity is the conjunction of three independent signals: the enclosure
//! tamper loop, the secure element tamper register, and seal verification.
//! Each is sampled once per check and any failure to obtain a signal counts
//! as a failed signal.

use embedded_storage::nor_flash::NorFlash;

use crate::{
    platform::Platform, seal::SealManager, secure_element::SecureElement, storage::RecordStore,
};

/// Integrity verdict from the most recent check
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TamperStatus {
    /// All integrity signals passed
    pub is_intact: bool,
    /// Cumulative failed checks
    pub tamper_count: u32,
    /// Platform time of the last check (ms, wrapping)
    pub last_check_time: u32,
}

/// Raw integrity signals from a single sample
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Signals {
    /// Enclosure tamper loop continuous
    pub circuit: bool,
    /// Secure element reports no tamper event
    pub secure_element: bool,
    /// Stored seal matches recomputed seal
    pub seal: bool,
}

impl Signals {
    /// Conjunctive verdict, every signal must pass
    pub fn intact(&self) -> bool {
        self.circuit && self.secure_element && self.seal
    }
}

/// [`TamperMonitor`] samples integrity signals and tracks the tamper counter
#[derive(Clone, PartialEq, Debug)]
pub struct TamperMonitor {
    status: TamperStatus,
    last: Option<Signals>,
}

impl TamperMonitor {
    /// Create a monitor with a previously persisted tamper count.
    ///
    /// No check has run yet so the initial verdict is not intact.
    pub fn new(tamper_count: u32) -> Self {
        Self {
            status: TamperStatus {
                is_intact: false,
                tamper_count,
                last_check_time: 0,
            },
            last: None,
        }
    }

    /// Current tamper status
    pub fn status(&self) -> TamperStatus {
        self.status
    }

    /// Signals from the most recent check, if any
    pub fn last_signals(&self) -> Option<Signals> {
        self.last
    }

    /// Sample all integrity signals (one read each, no retries)
    pub fn sample<P: Platform, SE: SecureElement, F: NorFlash>(
        platform: &mut P,
        se: &mut SE,
        store: &mut RecordStore<F>,
    ) -> Signals {
        let circuit = platform.tamper_loop_intact();

        let secure_element = match se.tamper_flag() {
            Ok(v) => v,
            Err(_e) => {
                #[cfg(feature = "log")]
                log::error!("secure element tamper flag unavailable: {:?}", _e);

                false
            }
        };

        let seal = SealManager::new(store, se).verify_seal();

        let s = Signals {
            circuit,
            secure_element,
            seal,
        };

        #[cfg(feature = "log")]
        log::debug!("integrity signals: {:?}", s);

        s
    }

    /// Record a check result.
    ///
    /// `latched` forces a failed verdict irrespective of the sampled signals,
    /// used once the device is compromised. Each failed verdict increments
    /// the tamper count.
    pub fn record(&mut self, signals: Signals, latched: bool, now: u32) -> TamperStatus {
        let is_intact = signals.intact() && !latched;

        if !is_intact {
            self.status.tamper_count = self.status.tamper_count.saturating_add(1);

            #[cfg(feature = "log")]
            log::warn!(
                "integrity check failed (count: {}, signals: {:?}, latched: {})",
                self.status.tamper_count,
                signals,
                latched
            );
        }

        self.status.is_intact = is_intact;
        self.status.last_check_time = now;
        self.last = Some(signals);

        self.status
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const PASS: Signals = Signals {
        circuit: true,
        secure_element: true,
        seal: true,
    };

    #[test]
    fn initial_status() {
        let m = TamperMonitor::new(5);
        assert_eq!(
            m.status(),
            TamperStatus {
                is_intact: false,
                tamper_count: 5,
                last_check_time: 0
            }
        );
        assert_eq!(m.last_signals(), None);
    }

    #[test]
    fn any_signal_fails() {
        let tests = [
            Signals {
                circuit: false,
                ..PASS
            },
            Signals {
                secure_element: false,
                ..PASS
            },
            Signals {
                seal: false,
                ..PASS
            },
        ];

        for s in tests {
            assert!(!s.intact(), "{s:?}");
        }
        assert!(PASS.intact());
    }

    #[test]
    fn count_increments_per_failure() {
        let mut m = TamperMonitor::new(0);

        assert!(m.record(PASS, false, 10).is_intact);
        assert_eq!(m.status().tamper_count, 0);

        let fail = Signals {
            circuit: false,
            ..PASS
        };
        for i in 1..=3 {
            let s = m.record(fail, false, 10 + i);
            assert!(!s.is_intact);
            assert_eq!(s.tamper_count, i);
            assert_eq!(s.last_check_time, 10 + i);
        }

        // Passing check leaves the count untouched
        assert_eq!(m.record(PASS, false, 20).tamper_count, 3);
        assert_eq!(m.last_signals(), Some(PASS));
    }

    #[test]
    fn latched_fails() {
        let mut m = TamperMonitor::new(1);

        let s = m.record(PASS, true, 0);
        assert!(!s.is_intact);
        assert_eq!(s.tamper_count, 2);
    }

    #[test]
    fn count_saturates() {
        let mut m = TamperMonitor::new(u32::MAX);

        let s = m.record(PASS, true, 0);
        assert_eq!(s.tamper_count, u32::MAX);
    }
}
