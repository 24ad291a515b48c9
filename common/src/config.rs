use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, range::HysteresisBand};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RangeLimitPolicy {
    /// Refuse the adjustment and keep regulating.
    Clamp,
    /// Stop the run loop, de-energizing both channels first.
    Halt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermistorConfig {
    pub adc_full_scale: u8,
    pub reference_voltage: f32,
    pub fixed_resistor: f32,
    pub nominal_resistance: f32,
    pub nominal_temp_k: f32,
    pub beta: f32,
    pub min_valid_temp_f: f32,
    pub max_valid_temp_f: f32,
}

impl Default for ThermistorConfig {
    fn default() -> Self {
        Self {
            adc_full_scale: 255,
            reference_voltage: 3.3,
            fixed_resistor: 10.0,
            nominal_resistance: 10.0,
            nominal_temp_k: 298.15,
            beta: 3950.0,
            min_valid_temp_f: -40.0,
            max_valid_temp_f: 150.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RampConfig {
    pub start_percent: u8,
    pub step_percent: u8,
    pub step_interval_ms: u64,
}

impl Default for RampConfig {
    fn default() -> Self {
        Self {
            start_percent: 12,
            step_percent: 2,
            step_interval_ms: 20_000,
        }
    }
}

impl RampConfig {
    /// Duty levels written by a full ramp, highest first.
    pub fn levels(&self) -> impl Iterator<Item = u8> {
        let step = self.step_percent.max(1) as usize;
        (1..=self.start_percent).rev().step_by(step)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeLimits {
    pub min_heat_temp_f: f32,
    pub max_cool_temp_f: f32,
}

impl Default for RangeLimits {
    fn default() -> Self {
        Self {
            min_heat_temp_f: 50.0,
            max_cool_temp_f: 75.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegulatorConfig {
    pub tick_interval_ms: u64,
    pub heat_power_percent: u8,
    pub cool_power_percent: u8,
    pub ramp: RampConfig,
    pub band: HysteresisBand,
    pub limits: RangeLimits,
    pub limit_policy: RangeLimitPolicy,
    pub thermistor: ThermistorConfig,
    pub splash_text: String,
    pub splash_ms: u64,
    pub status_log_interval_ms: u64,
}

impl Default for RegulatorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 500,
            heat_power_percent: 15,
            cool_power_percent: 15,
            ramp: RampConfig::default(),
            band: HysteresisBand::default(),
            limits: RangeLimits::default(),
            limit_policy: RangeLimitPolicy::Clamp,
            thermistor: ThermistorConfig::default(),
            splash_text: "SpreadTech".to_string(),
            splash_ms: 3_000,
            status_log_interval_ms: 10_000,
        }
    }
}

/// ESP32 GPIOs that must not carry a regulator input or output: UART0
/// console (1, 3), boot strapping (0, 2, 5, 12, 15) and SPI flash (6-11).
pub const ESP32_RESERVED_PINS: &[i32] = &[0, 1, 2, 3, 5, 6, 7, 8, 9, 10, 11, 12, 15];

/// GPIO and ADC channel assignments. Pin numbers are opaque to the control
/// logic and only interpreted by the board implementation. The defaults are
/// the host/simulator wiring; ESP32 builds start from [`PinConfig::esp32`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PinConfig {
    pub enable_switch: i32,
    pub lower_button: i32,
    pub raise_button: i32,
    pub heat_pwm: i32,
    pub cool_pwm: i32,
    pub adc_channel: u8,
    pub inputs_active_low: bool,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            enable_switch: 2,
            lower_button: 4,
            raise_button: 5,
            heat_pwm: 26,
            cool_pwm: 1,
            adc_channel: 0,
            inputs_active_low: true,
        }
    }
}

impl PinConfig {
    pub fn esp32() -> Self {
        Self {
            enable_switch: 32,
            lower_button: 33,
            raise_button: 27,
            heat_pwm: 25,
            cool_pwm: 26,
            adc_channel: 0,
            inputs_active_low: true,
        }
    }

    fn assignments(&self) -> [(&'static str, i32); 5] {
        [
            ("enable switch", self.enable_switch),
            ("lower button", self.lower_button),
            ("raise button", self.raise_button),
            ("heat output", self.heat_pwm),
            ("cool output", self.cool_pwm),
        ]
    }

    /// Rejects the first input or output that lands on one of `reserved`.
    pub fn check_reserved(&self, reserved: &[i32]) -> Result<(), ConfigError> {
        match self
            .assignments()
            .into_iter()
            .find(|(_, pin)| reserved.contains(pin))
        {
            Some((role, pin)) => Err(ConfigError::ReservedPin { role, pin }),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BusConfig {
    pub sda_pin: i32,
    pub scl_pin: i32,
    pub baudrate_khz: u32,
    pub lcd_address: u8,
    pub adc_address: u8,
    pub pwm_frequency_hz: u32,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            sda_pin: 21,
            scl_pin: 22,
            baudrate_khz: 100,
            lcd_address: 0x27,
            adc_address: 0x4b,
            pwm_frequency_hz: 1_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub initial_temp_f: f32,
    pub ambient_temp_f: f32,
    /// Fraction of the gap to ambient closed per second.
    pub ambient_coupling_per_s: f32,
    pub heat_gain_f_per_s_per_pct: f32,
    pub cool_gain_f_per_s_per_pct: f32,
    /// Virtual seconds per wall-clock second on the host.
    pub time_scale: f32,
    pub switch_on_at_start: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            initial_temp_f: 72.0,
            ambient_temp_f: 72.0,
            ambient_coupling_per_s: 0.002,
            heat_gain_f_per_s_per_pct: 0.002,
            cool_gain_f_per_s_per_pct: 0.002,
            time_scale: 1.0,
            switch_on_at_start: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub regulator: RegulatorConfig,
    #[serde(default)]
    pub pins: PinConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

fn default_timezone() -> String {
    "America/Los_Angeles".to_string()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            regulator: RegulatorConfig::default(),
            pins: PinConfig::default(),
            bus: BusConfig::default(),
            timezone: default_timezone(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_json_slice(raw: &[u8]) -> Result<Self, ConfigError> {
        serde_json::from_slice(raw).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    pub fn sanitize(&mut self) {
        self.regulator.sanitize();
        self.simulation.sanitize();
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.regulator.validate()?;
        if self.pins.heat_pwm == self.pins.cool_pwm {
            return Err(ConfigError::SharedOutputPin(self.pins.heat_pwm));
        }
        Ok(())
    }
}

impl RegulatorConfig {
    pub fn sanitize(&mut self) {
        self.tick_interval_ms = self.tick_interval_ms.max(10);
        self.heat_power_percent = self.heat_power_percent.min(100);
        self.cool_power_percent = self.cool_power_percent.min(100);
        self.ramp.start_percent = self.ramp.start_percent.min(100);
        self.ramp.step_percent = self.ramp.step_percent.clamp(1, 100);
        self.status_log_interval_ms = self.status_log_interval_ms.max(self.tick_interval_ms);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let band = &self.band;
        if !band.is_ordered() {
            return Err(ConfigError::BandOrder {
                heat_temp_f: band.heat_temp_f,
                floor_f: band.floor_f,
                ceiling_f: band.ceiling_f,
                cool_temp_f: band.cool_temp_f,
            });
        }
        if band.heat_temp_f <= self.limits.min_heat_temp_f
            || band.cool_temp_f >= self.limits.max_cool_temp_f
        {
            return Err(ConfigError::BandOutsideLimits {
                heat_temp_f: band.heat_temp_f,
                cool_temp_f: band.cool_temp_f,
                min_f: self.limits.min_heat_temp_f,
                max_f: self.limits.max_cool_temp_f,
            });
        }
        Ok(())
    }
}

impl SimulationConfig {
    pub fn sanitize(&mut self) {
        if !self.time_scale.is_finite() || self.time_scale <= 0.0 {
            self.time_scale = 1.0;
        }
        self.ambient_coupling_per_s = self.ambient_coupling_per_s.clamp(0.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn defaults_match_board_wiring() {
        let config = RuntimeConfig::default();
        assert_eq!(config.regulator.tick_interval_ms, 500);
        assert_eq!(config.regulator.heat_power_percent, 15);
        assert_eq!(config.pins.heat_pwm, 26);
        assert_eq!(config.pins.cool_pwm, 1);
        assert_eq!(config.bus.lcd_address, 0x27);
        assert_eq!(config.bus.adc_address, 0x4b);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn ramp_levels_step_down_to_two() {
        let levels: Vec<u8> = RampConfig::default().levels().collect();
        assert_eq!(levels, vec![12, 10, 8, 6, 4, 2]);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let raw = br#"{"regulator":{"tick_interval_ms":250,"limit_policy":"HALT"}}"#;
        let config = RuntimeConfig::from_json_slice(raw).unwrap();

        assert_eq!(config.regulator.tick_interval_ms, 250);
        assert_eq!(config.regulator.limit_policy, RangeLimitPolicy::Halt);
        assert_eq!(config.regulator.heat_power_percent, 15);
        assert_eq!(config.pins, PinConfig::default());
        assert_eq!(config.timezone, "America/Los_Angeles");
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = RuntimeConfig::from_json_slice(b"{not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn sanitize_clamps_percentages_and_intervals() {
        let mut config = RuntimeConfig::default();
        config.regulator.tick_interval_ms = 0;
        config.regulator.heat_power_percent = 180;
        config.regulator.ramp.step_percent = 0;
        config.simulation.time_scale = -3.0;
        config.sanitize();

        assert_eq!(config.regulator.tick_interval_ms, 10);
        assert_eq!(config.regulator.heat_power_percent, 100);
        assert_eq!(config.regulator.ramp.step_percent, 1);
        assert_eq!(config.simulation.time_scale, 1.0);
    }

    #[test]
    fn validate_rejects_misordered_band() {
        let mut config = RuntimeConfig::default();
        config.regulator.band.floor_f = 63.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BandOrder { .. })
        ));
    }

    #[test]
    fn validate_rejects_band_past_limits() {
        let mut config = RuntimeConfig::default();
        config.regulator.band = HysteresisBand {
            heat_temp_f: 71.0,
            floor_f: 72.0,
            ceiling_f: 73.0,
            cool_temp_f: 75.0,
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BandOutsideLimits { .. })
        ));
    }

    #[test]
    fn host_wiring_collides_with_esp32_console_and_strapping_pins() {
        assert_eq!(
            PinConfig::default().check_reserved(ESP32_RESERVED_PINS),
            Err(ConfigError::ReservedPin {
                role: "enable switch",
                pin: 2,
            })
        );

        let pins = PinConfig {
            enable_switch: 32,
            lower_button: 33,
            raise_button: 27,
            ..PinConfig::default()
        };
        assert_eq!(
            pins.check_reserved(ESP32_RESERVED_PINS),
            Err(ConfigError::ReservedPin {
                role: "cool output",
                pin: 1,
            })
        );
    }

    #[test]
    fn esp32_wiring_avoids_reserved_and_bus_pins() {
        let pins = PinConfig::esp32();
        let bus = BusConfig::default();
        let mut reserved = ESP32_RESERVED_PINS.to_vec();
        reserved.extend([bus.sda_pin, bus.scl_pin]);

        assert_eq!(pins.check_reserved(&reserved), Ok(()));
        assert_ne!(pins.heat_pwm, pins.cool_pwm);
    }

    #[test]
    fn validate_rejects_shared_output_pin() {
        let mut config = RuntimeConfig::default();
        config.pins.cool_pwm = config.pins.heat_pwm;
        assert_eq!(config.validate(), Err(ConfigError::SharedOutputPin(26)));
    }
}
