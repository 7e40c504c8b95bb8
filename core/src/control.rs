// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Button handling and presentation helpers for the device control loop

use strum::{Display, EnumIter, EnumString};

use crate::{
    consts::{
        BUTTON_POLL_INTERVAL_MS, BUTTON_RELEASE_TIMEOUT_MS, FACTORY_RESET_PRESS_MS,
        MASS_STORAGE_PRESS_MS,
    },
    engine::Event,
    helpers::{poll_until, Timeout},
    platform::Clock,
    state::DeviceState,
};

/// Firmware operating mode
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, EnumString, EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Mode {
    /// Maintenance mode, entered on first boot or with the button held at power on
    Boot,
    /// Normal operation, button runs integrity checks
    Test,
}

impl Mode {
    /// Select the operating mode at power on
    pub fn select(state: DeviceState, button_held: bool) -> Self {
        match state == DeviceState::New || button_held {
            true => Mode::Boot,
            false => Mode::Test,
        }
    }
}

/// Action requested by a button press
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, EnumIter)]
pub enum ButtonAction {
    CheckIntegrity,
    /// Hand over to the USB mass storage collaborator
    MassStorage,
    FactoryReset,
}

impl ButtonAction {
    /// Engine event for this action, `None` where the action is handled
    /// outside the engine
    pub fn event(&self) -> Option<Event> {
        match self {
            ButtonAction::CheckIntegrity => Some(Event::CheckIntegrity),
            ButtonAction::MassStorage => None,
            ButtonAction::FactoryReset => Some(Event::FactoryReset),
        }
    }
}

/// Classify a completed button press
pub fn classify_press(mode: Mode, duration_ms: u32) -> Option<ButtonAction> {
    match mode {
        Mode::Test => Some(ButtonAction::CheckIntegrity),
        Mode::Boot if duration_ms > FACTORY_RESET_PRESS_MS => Some(ButtonAction::FactoryReset),
        Mode::Boot if duration_ms > MASS_STORAGE_PRESS_MS => Some(ButtonAction::MassStorage),
        Mode::Boot => None,
    }
}

/// Wait for button release, returning the press duration in milliseconds
pub fn wait_for_release<C: Clock>(
    clock: &mut C,
    mut pressed: impl FnMut() -> bool,
) -> Result<u32, Timeout> {
    let start = clock.now_ms();

    poll_until(
        clock,
        BUTTON_POLL_INTERVAL_MS,
        BUTTON_RELEASE_TIMEOUT_MS,
        || (!pressed()).then_some(()),
    )?;

    Ok(clock.now_ms().wrapping_sub(start))
}

/// Status indication shown to the operator
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, EnumString, EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Indication {
    /// Blue, no keys
    New,
    /// Green, sealed and intact
    Sealed,
    /// Red, tamper detected
    Unsealed,
    /// Yellow, operation in progress
    Busy,
}

impl From<DeviceState> for Indication {
    fn from(s: DeviceState) -> Self {
        match s {
            DeviceState::New => Indication::New,
            DeviceState::Initialized => Indication::Busy,
            DeviceState::Sealed => Indication::Sealed,
            DeviceState::Compromised => Indication::Unsealed,
        }
    }
}

/// Blink pattern reporting an integrity verdict
pub fn verdict_pattern(is_intact: bool) -> (Indication, usize) {
    match is_intact {
        true => (Indication::Sealed, 3),
        false => (Indication::Unsealed, 5),
    }
}

#[cfg(test)]
mod test {
    use core::cell::Cell;

    use super::*;

    #[test]
    fn classify() {
        let tests = &[
            (Mode::Test, 0, Some(ButtonAction::CheckIntegrity)),
            (Mode::Test, 10_000, Some(ButtonAction::CheckIntegrity)),
            (Mode::Boot, 500, None),
            (Mode::Boot, 1_000, None),
            (Mode::Boot, 1_001, Some(ButtonAction::MassStorage)),
            (Mode::Boot, 5_000, Some(ButtonAction::MassStorage)),
            (Mode::Boot, 5_001, Some(ButtonAction::FactoryReset)),
        ];

        for (mode, duration, expected) in tests {
            assert_eq!(
                classify_press(*mode, *duration),
                *expected,
                "{mode} press for {duration} ms"
            );
        }
    }

    #[test]
    fn mode_select() {
        assert_eq!(Mode::select(DeviceState::New, false), Mode::Boot);
        assert_eq!(Mode::select(DeviceState::Sealed, true), Mode::Boot);
        assert_eq!(Mode::select(DeviceState::Sealed, false), Mode::Test);
        assert_eq!(Mode::select(DeviceState::Compromised, false), Mode::Test);
    }

    #[test]
    fn action_events() {
        assert_eq!(
            ButtonAction::CheckIntegrity.event(),
            Some(Event::CheckIntegrity)
        );
        assert_eq!(ButtonAction::MassStorage.event(), None);
        assert_eq!(ButtonAction::FactoryReset.event(), Some(Event::FactoryReset));
    }

    struct TestClock(Cell<u32>);

    impl Clock for TestClock {
        fn now_ms(&self) -> u32 {
            self.0.get()
        }

        fn delay_ms(&mut self, ms: u32) {
            self.0.set(self.0.get() + ms);
        }
    }

    #[test]
    fn release_duration() {
        let mut c = TestClock(Cell::new(100));
        let mut polls = 0;

        let d = wait_for_release(&mut c, || {
            polls += 1;
            polls < 6
        });

        assert_eq!(d, Ok(50));
    }

    #[test]
    fn release_timeout() {
        let mut c = TestClock(Cell::new(0));

        assert_eq!(wait_for_release(&mut c, || true), Err(Timeout));
    }

    #[test]
    fn indications() {
        assert_eq!(Indication::from(DeviceState::New), Indication::New);
        assert_eq!(Indication::from(DeviceState::Sealed), Indication::Sealed);
        assert_eq!(
            Indication::from(DeviceState::Compromised),
            Indication::Unsealed
        );
        assert_eq!(verdict_pattern(true), (Indication::Sealed, 3));
        assert_eq!(verdict_pattern(false), (Indication::Unsealed, 5));
    }
}
