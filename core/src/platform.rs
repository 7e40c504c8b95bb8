// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Platform support traits

/// Millisecond clock and blocking delay
pub trait Clock {
    /// Milliseconds since boot (wrapping)
    fn now_ms(&self) -> u32;

    /// Block for the provided duration
    fn delay_ms(&mut self, ms: u32);
}

/// [`Platform`] provides board-level signals to the [`Engine`][crate::engine::Engine]
pub trait Platform: Clock {
    /// Sample the enclosure tamper loop, `true` while the conductor is continuous
    fn tamper_loop_intact(&mut self) -> bool;
}

impl<T: Clock> Clock for &mut T {
    fn now_ms(&self) -> u32 {
        T::now_ms(self)
    }

    fn delay_ms(&mut self, ms: u32) {
        T::delay_ms(self, ms)
    }
}

impl<T: Platform> Platform for &mut T {
    fn tamper_loop_intact(&mut self) -> bool {
        T::tamper_loop_intact(self)
    }
}
