//! Fixed layout of the 16x2 character display.
//!
//! ```text
//! Temp:67F Heating
//! 07:05PM 67F-68F
//! ```

use chrono::NaiveTime;

use crate::{ports::Display, range::HysteresisBand};

pub const COLUMNS: u8 = 16;
pub const ROWS: u8 = 2;

const SPLASH_COLUMN: u8 = 3;
const STATUS_COLUMN: u8 = 9;
const BAND_COLUMN: u8 = 8;

/// Word shown in the status field at the right of the top row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusWord {
    #[default]
    Blank,
    Heating,
    Cooling,
    Steady,
    Fault,
}

impl StatusWord {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blank => "",
            Self::Heating => "Heating",
            Self::Cooling => "Cooling",
            Self::Steady => "Steady",
            Self::Fault => "Fault",
        }
    }

    /// Padded to the field width so a shorter word erases a longer one.
    fn field(self) -> &'static str {
        match self {
            Self::Blank => "       ",
            Self::Heating => "Heating",
            Self::Cooling => "Cooling",
            Self::Steady => "Steady ",
            Self::Fault => "Fault  ",
        }
    }
}

pub fn temperature_text(temp_f: f32) -> String {
    format!("Temp:{:02}F", temp_f.trunc() as i32)
}

pub fn time_text(time: Option<NaiveTime>) -> String {
    match time {
        Some(time) => time.format("%I:%M%p").to_string(),
        None => "--:----".to_string(),
    }
}

pub fn band_text(band: &HysteresisBand) -> String {
    format!("{}F-{}F", band.floor_f as i32, band.ceiling_f as i32)
}

pub fn show_splash<D: Display + ?Sized>(display: &mut D, text: &str) {
    display.write_at(SPLASH_COLUMN, 0, text);
}

pub fn show_temperature<D: Display + ?Sized>(display: &mut D, temp_f: f32) {
    display.write_at(0, 0, &temperature_text(temp_f));
}

pub fn show_sensor_fault<D: Display + ?Sized>(display: &mut D) {
    display.write_at(0, 0, "Temp:--F ");
}

pub fn show_status<D: Display + ?Sized>(display: &mut D, word: StatusWord) {
    display.write_at(STATUS_COLUMN, 0, word.field());
}

pub fn show_time<D: Display + ?Sized>(display: &mut D, time: Option<NaiveTime>) {
    display.write_at(0, 1, &time_text(time));
}

pub fn show_band<D: Display + ?Sized>(display: &mut D, band: &HysteresisBand) {
    display.write_at(BAND_COLUMN, 1, &band_text(band));
}
