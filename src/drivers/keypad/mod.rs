pub mod decoder;
pub mod driver;
pub mod hid_report;
