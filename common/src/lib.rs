pub mod actuator;
pub mod config;
pub mod control;
pub mod error;
pub mod ports;
pub mod range;
pub mod regulator;
pub mod screen;
pub mod sensor;
pub mod sim;
pub mod types;

pub use actuator::{ActuatorDriver, Channel, RampOutcome, RampStep};
pub use config::{
    BusConfig, PinConfig, RampConfig, RangeLimitPolicy, RangeLimits, RegulatorConfig,
    RuntimeConfig, SimulationConfig, ThermistorConfig, ESP32_RESERVED_PINS,
};
pub use control::{decide, ControlEngine};
pub use error::{ConfigError, RangeLimitReached, SensorFault};
pub use ports::{AnalogInput, Board, Clock, Delay, DigitalInput, Display, DutyCycleOutput, Level};
pub use range::{HysteresisBand, RangeDirection, RangeManager};
pub use regulator::{Regulator, RunExit, TickOutcome};
pub use screen::StatusWord;
pub use sensor::SensorReader;
pub use sim::{SimBoard, ThermalPlant};
pub use types::{ActuatorStatus, ControlState, Mode, RegulatorStatus};
