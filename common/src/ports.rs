//! Collaborator interfaces the regulator is written against.
//!
//! A board (real hardware or [`crate::sim::SimBoard`]) implements every trait;
//! the control logic only ever sees pin numbers from
//! [`PinConfig`](crate::config::PinConfig) and never touches GPIO directly.

use chrono::NaiveTime;

use crate::error::SensorFault;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Active,
    Inactive,
}

impl Level {
    pub fn is_active(self) -> bool {
        self == Self::Active
    }

    /// Maps an electrical level to a logical one.
    pub fn from_pin(high: bool, active_low: bool) -> Self {
        if high != active_low {
            Self::Active
        } else {
            Self::Inactive
        }
    }
}

pub trait AnalogInput {
    /// One 8-bit conversion from the given ADC channel.
    fn read_raw_sample(&mut self, channel: u8) -> Result<u8, SensorFault>;
}

pub trait DigitalInput {
    fn read_level(&mut self, pin: i32) -> Level;
}

pub trait DutyCycleOutput {
    fn write_duty_cycle(&mut self, pin: i32, percent: u8);
}

/// Character display, written by column/row.
pub trait Display {
    fn clear(&mut self);
    fn set_backlight(&mut self, on: bool);
    fn write_at(&mut self, col: u8, row: u8, text: &str);
}

pub trait Clock {
    /// Local wall-clock time, or `None` when the clock is not set.
    fn local_time(&self) -> Option<NaiveTime>;
}

pub trait Delay {
    fn delay_ms(&mut self, ms: u64);
}

pub trait Board: AnalogInput + DigitalInput + DutyCycleOutput + Display + Clock + Delay {}

impl<T> Board for T where T: AnalogInput + DigitalInput + DutyCycleOutput + Display + Clock + Delay {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_low_inputs_read_active_when_pulled_down() {
        assert_eq!(Level::from_pin(false, true), Level::Active);
        assert_eq!(Level::from_pin(true, true), Level::Inactive);
        assert_eq!(Level::from_pin(true, false), Level::Active);
        assert_eq!(Level::from_pin(false, false), Level::Inactive);
    }
}
