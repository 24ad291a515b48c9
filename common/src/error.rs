use thiserror::Error;

use crate::range::RangeDirection;

/// Why a temperature could not be produced from the thermistor divider.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum SensorFault {
    /// Full-scale sample: the divider reads the reference voltage, so the
    /// thermistor resistance is unbounded.
    #[error("thermistor open circuit (sample {sample} at full scale)")]
    OpenCircuit { sample: u8 },
    /// Zero sample: the thermistor reads as zero ohms.
    #[error("thermistor short circuit (sample 0)")]
    ShortCircuit,
    #[error("conversion produced a non-finite value from sample {sample}")]
    NonFinite { sample: u8 },
    #[error("temperature {temp_f:.1}F from sample {sample} outside the plausible range")]
    OutOfRange { sample: u8, temp_f: f32 },
    #[error("analog input read failed on channel {channel}")]
    Bus { channel: u8 },
}

/// A range adjustment that would push the band past an absolute limit.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("cannot {direction} range: {threshold_f}F would reach the {limit_f}F limit")]
pub struct RangeLimitReached {
    pub direction: RangeDirection,
    /// The trigger threshold that would have crossed the limit.
    pub threshold_f: f32,
    pub limit_f: f32,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error(
        "band must satisfy heat < floor <= ceiling < cool (got {heat_temp_f}/{floor_f}/{ceiling_f}/{cool_temp_f})"
    )]
    BandOrder {
        heat_temp_f: f32,
        floor_f: f32,
        ceiling_f: f32,
        cool_temp_f: f32,
    },
    #[error("band {heat_temp_f}F..{cool_temp_f}F lies outside the {min_f}F..{max_f}F limits")]
    BandOutsideLimits {
        heat_temp_f: f32,
        cool_temp_f: f32,
        min_f: f32,
        max_f: f32,
    },
    #[error("heat and cool outputs share pin {0}")]
    SharedOutputPin(i32),
    #[error("{role} is assigned to reserved pin {pin}")]
    ReservedPin { role: &'static str, pin: i32 },
    #[error("invalid config json: {0}")]
    Parse(String),
}
