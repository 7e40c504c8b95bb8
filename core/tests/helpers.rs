#![allow(unused)]

use bearer_core::{
    engine::Engine,
    mock::{MockPlatform, MockSecureElement},
    storage::MemFlash,
};

pub type TestEngine = Engine<MockSecureElement, MemFlash, MockPlatform>;

/// Device secret for the mock secure element
pub const DEVICE_SECRET: [u8; 32] = [0x5c; 32];

pub fn setup_logging() {
    let _ = simplelog::SimpleLogger::init(log::LevelFilter::Debug, Default::default());
}

/// Create and boot an engine on blank flash
pub fn new_engine() -> TestEngine {
    setup_logging();

    let mut e = Engine::new(
        MockSecureElement::new(DEVICE_SECRET),
        MemFlash::new(),
        MockPlatform::new(),
    );
    e.boot();
    e
}

/// Create, boot and seal an engine
pub fn sealed_engine() -> TestEngine {
    let mut e = new_engine();
    e.generate_new_keys().expect("key generation failed");
    e
}

/// Power cycle an engine, keeping flash and secure element contents
pub fn reboot(e: TestEngine) -> TestEngine {
    let (se, flash, mut platform) = e.into_inner();
    platform.advance(1_000);

    let mut e = Engine::new(se, flash, platform);
    e.boot();
    e
}
