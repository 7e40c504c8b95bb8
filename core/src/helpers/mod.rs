// Copyright (c) 2022-2023 The MobileCoin Foundation

use core::fmt::Write;

use crate::{platform::Clock, secure_element::Address};

/// Bounded poll expired
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Timeout;

/// Poll `f` every `interval_ms` until it returns a value or `timeout_ms` elapses.
///
/// `f` is always called at least once, and once more after the bound expires
/// so a condition becoming true during the final delay is not lost.
pub fn poll_until<C: Clock, T>(
    clock: &mut C,
    interval_ms: u32,
    timeout_ms: u32,
    mut f: impl FnMut() -> Option<T>,
) -> Result<T, Timeout> {
    let start = clock.now_ms();

    loop {
        if let Some(v) = f() {
            return Ok(v);
        }

        if clock.now_ms().wrapping_sub(start) >= timeout_ms {
            break;
        }

        clock.delay_ms(interval_ms);
    }

    f().ok_or(Timeout)
}

/// Build an [Address] from a string, `None` if it exceeds the address length
pub fn address_from_str(s: &str) -> Option<Address> {
    let mut a = Address::new();
    a.push_str(s).ok()?;
    Some(a)
}

/// Write hex-encoded bytes to an [Address] buffer
pub fn push_hex(a: &mut Address, data: &[u8]) -> Option<()> {
    for b in data {
        write!(a, "{b:02x}").ok()?;
    }
    Some(())
}

#[cfg(test)]
mod test {
    use core::cell::Cell;

    use super::*;
    use crate::consts::ADDRESS_LEN;

    struct TestClock(Cell<u32>);

    impl Clock for TestClock {
        fn now_ms(&self) -> u32 {
            self.0.get()
        }

        fn delay_ms(&mut self, ms: u32) {
            self.0.set(self.0.get().wrapping_add(ms));
        }
    }

    #[test]
    fn poll_ready() {
        let mut c = TestClock(Cell::new(0));
        let mut n = 0;

        let r = poll_until(&mut c, 10, 100, || {
            n += 1;
            (n == 3).then_some(n)
        });

        assert_eq!(r, Ok(3));
        assert_eq!(c.now_ms(), 20);
    }

    #[test]
    fn poll_timeout() {
        let mut c = TestClock(Cell::new(0));
        let mut calls = 0;

        let r: Result<(), _> = poll_until(&mut c, 10, 100, || {
            calls += 1;
            None
        });

        assert_eq!(r, Err(Timeout));
        assert_eq!(c.now_ms(), 100);
        // initial + one per interval + final
        assert_eq!(calls, 12);
    }

    #[test]
    fn poll_wrapping_clock() {
        let mut c = TestClock(Cell::new(u32::MAX - 15));

        let r: Result<(), _> = poll_until(&mut c, 10, 50, || None);

        assert_eq!(r, Err(Timeout));
        assert_eq!(c.now_ms(), 34);
    }

    #[test]
    fn address_bounds() {
        assert!(address_from_str("bc1qexample").is_some());

        let long = [b'a'; ADDRESS_LEN + 1];
        let long = core::str::from_utf8(&long).unwrap();
        assert!(address_from_str(long).is_none());
    }

    #[test]
    fn hex_address() {
        let mut a = address_from_str("bc1q").unwrap();
        push_hex(&mut a, &[0x00, 0xab, 0x10]).unwrap();
        assert_eq!(a.as_str(), "bc1q00ab10");
    }
}
