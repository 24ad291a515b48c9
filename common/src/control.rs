use tracing::{debug, info};

use crate::{
    actuator::{ActuatorDriver, Channel, RampOutcome, RampStep},
    config::{PinConfig, RegulatorConfig},
    ports::{AnalogInput, Delay, DutyCycleOutput},
    range::HysteresisBand,
    sensor::SensorReader,
    types::{ActuatorStatus, ControlState},
};

/// Hysteresis decision for one reading. Heating and cooling only fire when
/// that channel is not already held, and the steady transition only fires
/// while something is on; everything else is `Unchanged`.
pub fn decide(temp_f: f32, band: &HysteresisBand, status: ActuatorStatus) -> ControlState {
    if temp_f <= band.heat_temp_f {
        if status.is_heating() {
            ControlState::Unchanged
        } else {
            ControlState::Heating
        }
    } else if temp_f >= band.cool_temp_f {
        if status.is_cooling() {
            ControlState::Unchanged
        } else {
            ControlState::Cooling
        }
    } else if band.contains_steady(temp_f) && status.is_active() {
        ControlState::Steady
    } else {
        ControlState::Unchanged
    }
}

#[derive(Debug, Clone)]
pub struct ControlEngine {
    status: ActuatorStatus,
    driver: ActuatorDriver,
    heat_power_percent: u8,
    cool_power_percent: u8,
    last_ramp: Option<RampOutcome>,
}

impl ControlEngine {
    pub fn new(config: &RegulatorConfig, pins: &PinConfig) -> Self {
        Self {
            status: ActuatorStatus::idle(),
            driver: ActuatorDriver::new(pins, config.ramp.clone()),
            heat_power_percent: config.heat_power_percent,
            cool_power_percent: config.cool_power_percent,
            last_ramp: None,
        }
    }

    pub fn status(&self) -> ActuatorStatus {
        self.status
    }

    pub fn driver(&self) -> &ActuatorDriver {
        &self.driver
    }

    pub fn last_ramp(&self) -> Option<RampOutcome> {
        self.last_ramp
    }

    /// Applies [`decide`] to the board. A steady transition blocks for the
    /// whole ramp-down; `on_ramp_step` runs after each step is written. The
    /// channel being released is always zeroed before the other is driven.
    pub fn tick<B, F>(
        &mut self,
        board: &mut B,
        sensor: &SensorReader,
        temp_f: f32,
        band: &HysteresisBand,
        on_ramp_step: F,
    ) -> ControlState
    where
        B: AnalogInput + DutyCycleOutput + Delay + ?Sized,
        F: FnMut(&mut B, &RampStep),
    {
        let state = decide(temp_f, band, self.status);
        match state {
            ControlState::Heating => {
                self.status = ActuatorStatus::heating();
                self.driver.set_channel(board, Channel::Cool, 0);
                self.driver
                    .set_channel(board, Channel::Heat, self.heat_power_percent);
                info!("heating up at {temp_f:.1}F");
            }
            ControlState::Cooling => {
                self.status = ActuatorStatus::cooling();
                self.driver.set_channel(board, Channel::Heat, 0);
                self.driver
                    .set_channel(board, Channel::Cool, self.cool_power_percent);
                info!("cooling down at {temp_f:.1}F");
            }
            ControlState::Steady => {
                if let Some(channel) = self.status.active_channel() {
                    let outcome = self
                        .driver
                        .ramp_down(board, sensor, channel, band, on_ramp_step);
                    match outcome {
                        RampOutcome::Completed => debug!("ramp-down completed"),
                        RampOutcome::Aborted {
                            temp_f,
                            last_percent,
                        } => debug!("ramp-down cut short at {last_percent}% ({temp_f:.1}F)"),
                        RampOutcome::SensorFault {
                            fault,
                            last_percent,
                        } => debug!("ramp-down interrupted at {last_percent}%: {fault}"),
                    }
                    self.last_ramp = Some(outcome);
                }
                self.driver.all_off(board);
                self.status = ActuatorStatus::idle();
                info!("steady state at {temp_f:.1}F");
            }
            ControlState::Idle | ControlState::Unchanged => {}
        }
        state
    }

    /// De-energizes both channels and forgets the held state.
    pub fn force_off<O: DutyCycleOutput + ?Sized>(&mut self, out: &mut O) {
        self.driver.all_off(out);
        self.status = ActuatorStatus::idle();
    }
}
