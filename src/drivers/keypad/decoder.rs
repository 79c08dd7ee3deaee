use crate::input::event::KeyTransition;

/// Number of logical keys on the keypad
pub const KEY_COUNT: usize = 22;

/// Shortest report that carries all button bytes
pub const REPORT_MIN_SIZE: usize = 5;

/// Report bytes holding button bits
pub const BUTTON_BYTES: [usize; 3] = [2, 3, 4];

/// Position of a single button bit in a raw report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BitCoordinate {
    pub byte: usize,
    pub bit: u8,
}

const fn coord(byte: usize, bit: u8) -> BitCoordinate {
    BitCoordinate { byte, bit }
}

/// Bit position of each logical key. Key N is at index N - 1.
pub const BUTTON_MAP: [BitCoordinate; KEY_COUNT] = [
    // BYTE 2
    coord(2, 0),
    coord(2, 1),
    coord(2, 2),
    coord(2, 3),
    coord(2, 4),
    coord(2, 5),
    coord(2, 6),
    coord(2, 7),
    // BYTE 3
    coord(3, 0),
    coord(3, 1),
    coord(3, 2),
    coord(3, 3),
    coord(3, 4),
    coord(3, 5),
    coord(3, 6),
    coord(3, 7),
    // BYTE 4, bits 6-7 are padding
    coord(4, 0),
    coord(4, 1),
    coord(4, 2),
    coord(4, 3),
    coord(4, 4),
    coord(4, 5),
];

/// Logical key at the given bit position
pub fn key_for(coordinate: BitCoordinate) -> Option<u8> {
    BUTTON_MAP
        .iter()
        .position(|c| *c == coordinate)
        .map(|index| index as u8 + 1)
}

/// Bit position of the given logical key
pub fn coordinate_for(key: u8) -> Option<BitCoordinate> {
    BUTTON_MAP.get((key as usize).checked_sub(1)?).copied()
}

/// Decodes bit-packed button reports into key transitions by comparing each
/// report with the one before it
#[derive(Debug, Default)]
pub struct BitReportDecoder {
    previous: Option<Vec<u8>>,
}

impl BitReportDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the previous report. The next report is decoded as if it
    /// were the first.
    pub fn reset(&mut self) {
        self.previous = None;
    }

    /// Decode the given report. The first report yields a press for every
    /// set bit. Later reports yield a transition for every changed bit, in
    /// ascending byte then bit order. Reports that are too short are stored
    /// but yield nothing.
    pub fn decode(&mut self, sample: &[u8]) -> Vec<KeyTransition> {
        let previous = self.previous.replace(sample.to_vec());
        if sample.len() < REPORT_MIN_SIZE {
            log::trace!("Ignoring short report of {} bytes", sample.len());
            return Vec::new();
        }

        let mut transitions = Vec::new();
        for byte in BUTTON_BYTES {
            let current = sample[byte];
            let changed = match previous.as_ref() {
                Some(previous) => current ^ previous.get(byte).copied().unwrap_or(0),
                None => current,
            };
            if changed == 0 {
                continue;
            }

            for bit in 0..8u8 {
                let mask = 1u8 << bit;
                if changed & mask == 0 {
                    continue;
                }
                let coordinate = BitCoordinate { byte, bit };
                let Some(key) = key_for(coordinate) else {
                    log::trace!("Ignoring unmapped bit {coordinate:?}");
                    continue;
                };
                transitions.push(KeyTransition {
                    key,
                    pressed: current & mask != 0,
                });
            }
        }

        transitions
    }
}
