use tracing::{debug, info};

use crate::{
    config::{PinConfig, RampConfig},
    error::SensorFault,
    ports::{AnalogInput, Delay, DutyCycleOutput},
    range::HysteresisBand,
    sensor::SensorReader,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Heat,
    Cool,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Heat => "HEAT",
            Self::Cool => "COOL",
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Heat => 0,
            Self::Cool => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RampOutcome {
    /// Every step was written and waited out.
    Completed,
    /// The live reading left the steady window; the channel was left at
    /// `last_percent`.
    Aborted { temp_f: f32, last_percent: u8 },
    SensorFault {
        fault: SensorFault,
        last_percent: u8,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampStep {
    pub channel: Channel,
    pub percent: u8,
    pub temp_f: f32,
}

/// Duty-cycle writer for the two Peltier channels. Holds no opinion about
/// which channel may be on; mutual exclusion belongs to the control engine.
#[derive(Debug, Clone)]
pub struct ActuatorDriver {
    heat_pin: i32,
    cool_pin: i32,
    ramp: RampConfig,
    levels: [u8; 2],
}

impl ActuatorDriver {
    pub fn new(pins: &PinConfig, ramp: RampConfig) -> Self {
        Self {
            heat_pin: pins.heat_pwm,
            cool_pin: pins.cool_pwm,
            ramp,
            levels: [0, 0],
        }
    }

    pub fn pin(&self, channel: Channel) -> i32 {
        match channel {
            Channel::Heat => self.heat_pin,
            Channel::Cool => self.cool_pin,
        }
    }

    /// Last duty cycle written to `channel`.
    pub fn level(&self, channel: Channel) -> u8 {
        self.levels[channel.index()]
    }

    pub fn set_channel<O: DutyCycleOutput + ?Sized>(
        &mut self,
        out: &mut O,
        channel: Channel,
        percent: u8,
    ) {
        let percent = percent.min(100);
        out.write_duty_cycle(self.pin(channel), percent);
        self.levels[channel.index()] = percent;
    }

    pub fn all_off<O: DutyCycleOutput + ?Sized>(&mut self, out: &mut O) {
        self.set_channel(out, Channel::Heat, 0);
        self.set_channel(out, Channel::Cool, 0);
    }

    /// Steps `channel` down through the configured levels, pausing between
    /// steps. Each step first re-reads the sensor and stops early once the
    /// truncated reading is at or below `band.floor_f` or at or above
    /// `band.ceiling_f`. Never zeros the channel: callers follow up with
    /// [`Self::all_off`].
    pub fn ramp_down<B, F>(
        &mut self,
        board: &mut B,
        sensor: &SensorReader,
        channel: Channel,
        band: &HysteresisBand,
        mut on_step: F,
    ) -> RampOutcome
    where
        B: AnalogInput + DutyCycleOutput + Delay + ?Sized,
        F: FnMut(&mut B, &RampStep),
    {
        info!(channel = channel.as_str(), "ramping down");

        for percent in self.ramp.levels() {
            let temp_f = match sensor.read_temperature(&mut *board) {
                Ok(temp_f) => temp_f,
                Err(fault) => {
                    return RampOutcome::SensorFault {
                        fault,
                        last_percent: self.level(channel),
                    }
                }
            };

            let whole_f = temp_f.trunc();
            if whole_f <= band.floor_f || whole_f >= band.ceiling_f {
                debug!("ramp stopped early at {temp_f:.2}F");
                return RampOutcome::Aborted {
                    temp_f,
                    last_percent: self.level(channel),
                };
            }

            self.set_channel(&mut *board, channel, percent);
            let step = RampStep {
                channel,
                percent,
                temp_f,
            };
            on_step(&mut *board, &step);
            debug!("ramp step {}% at {temp_f:.2}F", percent);
            board.delay_ms(self.ramp.step_interval_ms);
        }

        RampOutcome::Completed
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{config::ThermistorConfig, sim::SimBoard};

    fn wide_band() -> HysteresisBand {
        HysteresisBand {
            heat_temp_f: 60.0,
            floor_f: 64.0,
            ceiling_f: 70.0,
            cool_temp_f: 74.0,
        }
    }

    fn driver() -> ActuatorDriver {
        ActuatorDriver::new(&PinConfig::default(), RampConfig::default())
    }

    fn sensor() -> SensorReader {
        SensorReader::new(0, ThermistorConfig::default())
    }

    #[test]
    fn set_channel_clamps_and_tracks_levels() {
        let mut board = SimBoard::default();
        let mut driver = driver();

        driver.set_channel(&mut board, Channel::Heat, 150);
        driver.set_channel(&mut board, Channel::Cool, 7);

        assert_eq!(driver.level(Channel::Heat), 100);
        assert_eq!(driver.level(Channel::Cool), 7);
        assert_eq!(board.duty_writes(), &[(26, 100), (1, 7)]);
    }

    #[test]
    fn full_ramp_is_monotonic_and_paced() {
        // Sample 143 reads ~67.28F, inside the 64..70 window for every step.
        let mut board = SimBoard::default();
        board.script_samples([143]);
        let mut driver = driver();
        driver.set_channel(&mut board, Channel::Heat, 15);
        board.take_duty_writes();
        let mut observed = Vec::new();

        let outcome = driver.ramp_down(
            &mut board,
            &sensor(),
            Channel::Heat,
            &wide_band(),
            |_, step| observed.push(step.percent),
        );

        assert_eq!(outcome, RampOutcome::Completed);
        assert_eq!(observed, vec![12, 10, 8, 6, 4, 2]);
        let written: Vec<u8> = board.take_duty_writes().iter().map(|(_, pct)| *pct).collect();
        assert_eq!(written, vec![12, 10, 8, 6, 4, 2]);
        assert!(written.windows(2).all(|pair| pair[0] >= pair[1]));
        assert_eq!(board.delays(), &[20_000; 6]);
        assert_eq!(driver.level(Channel::Heat), 2);
    }

    #[test]
    fn ramp_aborts_when_reading_leaves_window() {
        // 143 -> ~67.3F (continue), 147 -> ~64.8F truncates to 64 (abort).
        let mut board = SimBoard::default();
        board.script_samples([143, 147]);
        let mut driver = driver();
        driver.set_channel(&mut board, Channel::Cool, 15);
        board.take_duty_writes();

        let outcome =
            driver.ramp_down(&mut board, &sensor(), Channel::Cool, &wide_band(), |_, _| {});

        match outcome {
            RampOutcome::Aborted {
                temp_f,
                last_percent,
            } => {
                assert!((temp_f - 64.795).abs() < 0.01, "got {temp_f}");
                assert_eq!(last_percent, 12);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(board.take_duty_writes(), vec![(1, 12)]);
        assert_eq!(board.delays(), &[20_000]);
    }

    #[test]
    fn ramp_aborts_immediately_at_the_band_edges() {
        // ~67.28F truncates onto the default floor of 67.
        let mut board = SimBoard::default();
        board.script_samples([143]);
        let mut driver = driver();
        driver.set_channel(&mut board, Channel::Heat, 15);
        board.take_duty_writes();

        let outcome = driver.ramp_down(
            &mut board,
            &sensor(),
            Channel::Heat,
            &HysteresisBand::default(),
            |_, _| {},
        );

        assert!(matches!(
            outcome,
            RampOutcome::Aborted {
                last_percent: 15,
                ..
            }
        ));
        assert!(board.take_duty_writes().is_empty());
        assert!(board.delays().is_empty());
    }

    #[test]
    fn ramp_stops_on_sensor_fault() {
        let mut board = SimBoard::default();
        board.script_samples([143, 255]);
        let mut driver = driver();

        let outcome =
            driver.ramp_down(&mut board, &sensor(), Channel::Heat, &wide_band(), |_, _| {});

        assert_eq!(
            outcome,
            RampOutcome::SensorFault {
                fault: SensorFault::OpenCircuit { sample: 255 },
                last_percent: 12,
            }
        );
    }
}
