use std::time::Instant;

/// HID usage page for generic desktop controls (axes)
pub const USAGE_PAGE_GENERIC_DESKTOP: u16 = 0x01;
/// HID usage page for buttons
pub const USAGE_PAGE_BUTTON: u16 = 0x09;

/// Generic desktop usages
pub const USAGE_X: u16 = 0x30;
pub const USAGE_Y: u16 = 0x31;

/// A single input element value read from the keypad. Button samples may
/// carry the full raw report so the bit-packed button state can be decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct InputSample {
    pub timestamp: Instant,
    pub usage_page: u16,
    pub usage: u16,
    pub value: i32,
    pub raw: Vec<u8>,
}

impl InputSample {
    /// Sample carrying the whole raw report for the button decoder
    pub fn button_report(raw: Vec<u8>) -> Self {
        Self {
            timestamp: Instant::now(),
            usage_page: USAGE_PAGE_BUTTON,
            usage: 0,
            value: 0,
            raw,
        }
    }

    /// Sample for a single button element
    pub fn button(usage: u16, pressed: bool) -> Self {
        Self {
            timestamp: Instant::now(),
            usage_page: USAGE_PAGE_BUTTON,
            usage,
            value: pressed as i32,
            raw: Vec::new(),
        }
    }

    /// Sample for a generic desktop axis
    pub fn axis(usage: u16, value: i32) -> Self {
        Self {
            timestamp: Instant::now(),
            usage_page: USAGE_PAGE_GENERIC_DESKTOP,
            usage,
            value,
            raw: Vec::new(),
        }
    }
}

/// A logical key changing state. Keys are numbered 1 through 22.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyTransition {
    pub key: u8,
    pub pressed: bool,
}

impl KeyTransition {
    pub fn press(key: u8) -> Self {
        Self { key, pressed: true }
    }

    pub fn release(key: u8) -> Self {
        Self {
            key,
            pressed: false,
        }
    }
}
