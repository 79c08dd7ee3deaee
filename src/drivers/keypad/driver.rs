use std::{error::Error, ffi::CString};

use hidapi::HidDevice;
use packed_struct::PackedStruct;

use crate::input::event::{InputSample, USAGE_X, USAGE_Y};

use super::{decoder::REPORT_MIN_SIZE, hid_report::InputDataReport};

// Largest report we expect to read
const READ_BUFFER_SIZE: usize = 64;

// HID buffer read timeout
const HID_TIMEOUT: i32 = 10;

// Input report axis ranges
pub const JOY_AXIS_MIN: f64 = 0.0;
pub const JOY_AXIS_MAX: f64 = 255.0;

pub struct Driver {
    /// HIDRAW device instance
    device: HidDevice,
    /// State of the keypad from the last full report
    state: Option<InputDataReport>,
}

impl Driver {
    /// Open the hidraw device at the given path, e.g. `/dev/hidraw3`
    pub fn new(path: &str) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let cs_path = CString::new(path)?;
        let api = hidapi::HidApi::new()?;
        let device = api.open_path(&cs_path)?;
        let info = device.get_device_info()?;
        log::info!(
            "Opened keypad '{}' at {path} ({:04x}:{:04x})",
            info.product_string().unwrap_or_default(),
            info.vendor_id(),
            info.product_id()
        );

        Ok(Self {
            device,
            state: None,
        })
    }

    /// Poll the device and read input reports
    pub fn poll(&mut self) -> Result<Vec<InputSample>, Box<dyn Error + Send + Sync>> {
        // Read data from the device into a buffer
        let mut buf = [0; READ_BUFFER_SIZE];
        let bytes_read = self.device.read_timeout(&mut buf[..], HID_TIMEOUT)?;
        if bytes_read == 0 {
            return Ok(Vec::new());
        }
        let slice = &buf[..bytes_read];

        // Short reports still go to the button decoder so it tracks them
        if bytes_read < REPORT_MIN_SIZE {
            log::trace!("Got short report of {bytes_read} bytes");
            self.state = None;
            return Ok(vec![InputSample::button_report(slice.to_vec())]);
        }

        let sized_buf: [u8; REPORT_MIN_SIZE] = slice[..REPORT_MIN_SIZE].try_into()?;
        let input_report = InputDataReport::unpack(&sized_buf)?;

        // Update the state
        let old_state = self.update_state(input_report);

        // Translate the state into a stream of input samples
        Ok(translate_samples(old_state, input_report, slice))
    }

    /// Update the keypad state, returning the previous one
    fn update_state(&mut self, input_report: InputDataReport) -> Option<InputDataReport> {
        let old_state = self.state;
        self.state = Some(input_report);
        old_state
    }
}

/// Translate a report into input samples. Elements that did not change since
/// the previous report are left out.
pub fn translate_samples(
    old_state: Option<InputDataReport>,
    state: InputDataReport,
    raw: &[u8],
) -> Vec<InputSample> {
    let mut samples = Vec::new();
    let Some(old_state) = old_state else {
        samples.push(InputSample::button_report(raw.to_vec()));
        samples.push(InputSample::axis(USAGE_X, state.joystick_x as i32));
        samples.push(InputSample::axis(USAGE_Y, state.joystick_y as i32));
        return samples;
    };

    if state.buttons != old_state.buttons {
        samples.push(InputSample::button_report(raw.to_vec()));
    }
    if state.joystick_x != old_state.joystick_x {
        samples.push(InputSample::axis(USAGE_X, state.joystick_x as i32));
    }
    if state.joystick_y != old_state.joystick_y {
        samples.push(InputSample::axis(USAGE_Y, state.joystick_y as i32));
    }

    samples
}
