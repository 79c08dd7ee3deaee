use packed_struct::prelude::*;

use super::decoder::KEY_COUNT;

/// Raw axis value at rest
pub const AXIS_CENTER: u8 = 0x80;

// InputDataReport
//
// The keypad sends a report without a report ID. The stick is two unsigned
// bytes centered at 0x80, followed by 22 button bits packed LSB first.
//
// # X | Y | Buttons 1-8 | Buttons 9-16 | Buttons 17-22 + 2 padding bits
// E: 000000.000000 5 80 80 00 00 00
//
// Stick left, button 1 and button 22 held
// E: 000012.004113 5 00 80 01 00 20
#[derive(PackedStruct, Debug, Copy, Clone, PartialEq, Default)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "5")]
pub struct InputDataReport {
    // BYTE 0
    #[packed_field(bytes = "0")]
    pub joystick_x: u8,
    // BYTE 1
    #[packed_field(bytes = "1")]
    pub joystick_y: u8,
    // BYTE 2-4
    #[packed_field(bytes = "2..=4")]
    pub buttons: [u8; 3],
}

impl InputDataReport {
    /// Report with the stick centered and nothing pressed
    pub fn centered() -> Self {
        Self {
            joystick_x: AXIS_CENTER,
            joystick_y: AXIS_CENTER,
            buttons: [0; 3],
        }
    }

    /// Set the bit for the given logical key
    pub fn set_key(&mut self, key: u8, pressed: bool) {
        if key == 0 || key as usize > KEY_COUNT {
            return;
        }
        let index = (key - 1) as usize;
        let mask = 1u8 << (index % 8);
        if pressed {
            self.buttons[index / 8] |= mask;
        } else {
            self.buttons[index / 8] &= !mask;
        }
    }

    pub fn is_pressed(&self, key: u8) -> bool {
        if key == 0 || key as usize > KEY_COUNT {
            return false;
        }
        let index = (key - 1) as usize;
        self.buttons[index / 8] & (1 << (index % 8)) != 0
    }
}
