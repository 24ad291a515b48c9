use serde::Serialize;

use crate::{actuator::Channel, range::HysteresisBand};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Idle,
    Active,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Active => "ACTIVE",
        }
    }
}

/// Outcome of one control decision. Computed fresh every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    Heating,
    Cooling,
    Steady,
    Idle,
    Unchanged,
}

impl ControlState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Heating => "HEATING",
            Self::Cooling => "COOLING",
            Self::Steady => "STEADY",
            Self::Idle => "IDLE",
            Self::Unchanged => "UNCHANGED",
        }
    }
}

/// Which channel the control engine currently holds on. The constructors
/// are the only way to build one, so heating and cooling are never both set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActuatorStatus {
    heating: bool,
    cooling: bool,
}

impl ActuatorStatus {
    pub const fn idle() -> Self {
        Self {
            heating: false,
            cooling: false,
        }
    }

    pub const fn heating() -> Self {
        Self {
            heating: true,
            cooling: false,
        }
    }

    pub const fn cooling() -> Self {
        Self {
            heating: false,
            cooling: true,
        }
    }

    pub fn is_heating(self) -> bool {
        self.heating
    }

    pub fn is_cooling(self) -> bool {
        self.cooling
    }

    pub fn is_active(self) -> bool {
        self.heating || self.cooling
    }

    pub fn active_channel(self) -> Option<Channel> {
        if self.heating {
            Some(Channel::Heat)
        } else if self.cooling {
            Some(Channel::Cool)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RegulatorStatus {
    pub mode: &'static str,
    pub state: &'static str,
    #[serde(rename = "currentTemp")]
    pub current_temp_f: Option<f32>,
    pub band: HysteresisBand,
    pub heating: bool,
    pub cooling: bool,
    #[serde(rename = "heatPercent")]
    pub heat_percent: u8,
    #[serde(rename = "coolPercent")]
    pub cool_percent: u8,
    #[serde(rename = "sensorFault")]
    pub sensor_fault: Option<String>,
}
