//! In-memory board with a lumped thermal model.
//!
//! Backs the host build and the unit tests. Time only moves when
//! [`Delay::delay_ms`] or [`SimBoard::advance`] is called, so a full
//! ramp-down runs instantly under test.

use std::collections::{HashMap, VecDeque};

use chrono::{Duration, NaiveTime};

use crate::{
    config::{PinConfig, SimulationConfig, ThermistorConfig},
    error::SensorFault,
    ports::{AnalogInput, Clock, Delay, DigitalInput, Display, DutyCycleOutput, Level},
    screen::{COLUMNS, ROWS},
};

const MAX_STEP_MS: u64 = 1_000;

/// Single thermal mass coupled to ambient, pushed by the two channels.
#[derive(Debug, Clone)]
pub struct ThermalPlant {
    pub temp_f: f32,
    pub ambient_f: f32,
    ambient_coupling_per_s: f32,
    heat_gain: f32,
    cool_gain: f32,
}

impl ThermalPlant {
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self {
            temp_f: config.initial_temp_f,
            ambient_f: config.ambient_temp_f,
            ambient_coupling_per_s: config.ambient_coupling_per_s,
            heat_gain: config.heat_gain_f_per_s_per_pct,
            cool_gain: config.cool_gain_f_per_s_per_pct,
        }
    }

    pub fn step(&mut self, dt_s: f32, heat_percent: u8, cool_percent: u8) {
        let drift = self.ambient_coupling_per_s * (self.ambient_f - self.temp_f);
        let drive =
            self.heat_gain * heat_percent as f32 - self.cool_gain * cool_percent as f32;
        self.temp_f += (drift + drive) * dt_s;
    }
}

#[derive(Debug, Clone)]
pub struct SimBoard {
    calibration: ThermistorConfig,
    plant: ThermalPlant,
    heat_pin: i32,
    cool_pin: i32,
    script: VecDeque<u8>,
    adc_fault: bool,
    levels: HashMap<i32, Level>,
    duty: HashMap<i32, u8>,
    duty_writes: Vec<(i32, u8)>,
    delays: Vec<u64>,
    elapsed_ms: u64,
    clock_start: Option<NaiveTime>,
    frame: [[char; COLUMNS as usize]; ROWS as usize],
    backlight: bool,
}

impl Default for SimBoard {
    fn default() -> Self {
        Self::new(
            &PinConfig::default(),
            ThermistorConfig::default(),
            &SimulationConfig::default(),
        )
    }
}

impl SimBoard {
    pub fn new(pins: &PinConfig, calibration: ThermistorConfig, sim: &SimulationConfig) -> Self {
        let mut levels = HashMap::new();
        if sim.switch_on_at_start {
            levels.insert(pins.enable_switch, Level::Active);
        }
        Self {
            calibration,
            plant: ThermalPlant::from_config(sim),
            heat_pin: pins.heat_pwm,
            cool_pin: pins.cool_pwm,
            script: VecDeque::new(),
            adc_fault: false,
            levels,
            duty: HashMap::new(),
            duty_writes: Vec::new(),
            delays: Vec::new(),
            elapsed_ms: 0,
            clock_start: None,
            frame: [[' '; COLUMNS as usize]; ROWS as usize],
            backlight: false,
        }
    }

    pub fn with_clock(mut self, start: NaiveTime) -> Self {
        self.clock_start = Some(start);
        self
    }

    /// Queues raw samples ahead of the thermal model. The last one keeps
    /// being returned until the script is cleared.
    pub fn script_samples(&mut self, samples: impl IntoIterator<Item = u8>) {
        self.script.extend(samples);
    }

    pub fn clear_script(&mut self) {
        self.script.clear();
    }

    pub fn set_adc_fault(&mut self, failing: bool) {
        self.adc_fault = failing;
    }

    pub fn set_level(&mut self, pin: i32, level: Level) {
        self.levels.insert(pin, level);
    }

    pub fn set_temperature_f(&mut self, temp_f: f32) {
        self.plant.temp_f = temp_f;
    }

    pub fn set_ambient_f(&mut self, ambient_f: f32) {
        self.plant.ambient_f = ambient_f;
    }

    pub fn plant(&self) -> &ThermalPlant {
        &self.plant
    }

    /// Runs the thermal model forward without recording a delay.
    pub fn advance(&mut self, ms: u64) {
        let heat = self.duty(self.heat_pin);
        let cool = self.duty(self.cool_pin);
        let mut remaining = ms;
        while remaining > 0 {
            let step = remaining.min(MAX_STEP_MS);
            self.plant.step(step as f32 / 1000.0, heat, cool);
            remaining -= step;
        }
        self.elapsed_ms += ms;
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    pub fn duty(&self, pin: i32) -> u8 {
        self.duty.get(&pin).copied().unwrap_or(0)
    }

    pub fn duty_writes(&self) -> &[(i32, u8)] {
        &self.duty_writes
    }

    pub fn take_duty_writes(&mut self) -> Vec<(i32, u8)> {
        std::mem::take(&mut self.duty_writes)
    }

    pub fn delays(&self) -> &[u64] {
        &self.delays
    }

    pub fn backlight(&self) -> bool {
        self.backlight
    }

    pub fn line(&self, row: u8) -> String {
        self.frame
            .get(row as usize)
            .map(|cells| cells.iter().collect())
            .unwrap_or_default()
    }
}

impl AnalogInput for SimBoard {
    fn read_raw_sample(&mut self, channel: u8) -> Result<u8, SensorFault> {
        if self.adc_fault {
            return Err(SensorFault::Bus { channel });
        }
        let scripted = if self.script.len() > 1 {
            self.script.pop_front()
        } else {
            self.script.front().copied()
        };
        Ok(scripted.unwrap_or_else(|| self.calibration.sample_for_temperature(self.plant.temp_f)))
    }
}

impl DigitalInput for SimBoard {
    fn read_level(&mut self, pin: i32) -> Level {
        self.levels.get(&pin).copied().unwrap_or(Level::Inactive)
    }
}

impl DutyCycleOutput for SimBoard {
    fn write_duty_cycle(&mut self, pin: i32, percent: u8) {
        self.duty.insert(pin, percent);
        self.duty_writes.push((pin, percent));
    }
}

impl Display for SimBoard {
    fn clear(&mut self) {
        self.frame = [[' '; COLUMNS as usize]; ROWS as usize];
    }

    fn set_backlight(&mut self, on: bool) {
        self.backlight = on;
    }

    fn write_at(&mut self, col: u8, row: u8, text: &str) {
        let Some(cells) = self.frame.get_mut(row as usize) else {
            return;
        };
        for (cell, ch) in cells.iter_mut().skip(col as usize).zip(text.chars()) {
            *cell = ch;
        }
    }
}

impl Clock for SimBoard {
    fn local_time(&self) -> Option<NaiveTime> {
        self.clock_start
            .map(|start| start + Duration::milliseconds(self.elapsed_ms as i64))
    }
}

impl Delay for SimBoard {
    fn delay_ms(&mut self, ms: u64) {
        self.delays.push(ms);
        self.advance(ms);
    }
}
