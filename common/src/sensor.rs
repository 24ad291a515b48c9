//! NTC thermistor on the high side of a divider, sampled by an 8-bit ADC.
//!
//! The conversion is the simplified Beta equation with the calibration in
//! [`ThermistorConfig`]. Readings that would divide by zero or take the log
//! of zero are reported as [`SensorFault`]s instead of flowing into the
//! hysteresis comparisons as `inf`/`NaN`.

use crate::{config::ThermistorConfig, error::SensorFault, ports::AnalogInput};

const KELVIN_OFFSET: f32 = 273.15;

pub fn kelvin_to_fahrenheit(temp_k: f32) -> f32 {
    celsius_to_fahrenheit(temp_k - KELVIN_OFFSET)
}

pub fn celsius_to_fahrenheit(temp_c: f32) -> f32 {
    temp_c * 9.0 / 5.0 + 32.0
}

fn fahrenheit_to_kelvin(temp_f: f32) -> f32 {
    (temp_f - 32.0) * 5.0 / 9.0 + KELVIN_OFFSET
}

impl ThermistorConfig {
    pub fn sample_to_fahrenheit(&self, sample: u8) -> Result<f32, SensorFault> {
        if sample >= self.adc_full_scale {
            return Err(SensorFault::OpenCircuit { sample });
        }
        if sample == 0 {
            return Err(SensorFault::ShortCircuit);
        }

        let voltage = sample as f32 / self.adc_full_scale as f32 * self.reference_voltage;
        let resistance = self.fixed_resistor * voltage / (self.reference_voltage - voltage);
        let temp_k =
            1.0 / (1.0 / self.nominal_temp_k + (resistance / self.nominal_resistance).ln() / self.beta);
        let temp_f = kelvin_to_fahrenheit(temp_k);

        if !temp_f.is_finite() {
            return Err(SensorFault::NonFinite { sample });
        }
        if !(self.min_valid_temp_f..=self.max_valid_temp_f).contains(&temp_f) {
            return Err(SensorFault::OutOfRange { sample, temp_f });
        }
        Ok(temp_f)
    }

    /// Inverse of [`Self::sample_to_fahrenheit`], rounded to the nearest count.
    pub fn sample_for_temperature(&self, temp_f: f32) -> u8 {
        let full_scale = self.adc_full_scale as f32;
        let temp_k = fahrenheit_to_kelvin(temp_f);
        let resistance =
            self.nominal_resistance * (self.beta * (1.0 / temp_k - 1.0 / self.nominal_temp_k)).exp();
        let ratio = resistance / (self.fixed_resistor + resistance);
        if !ratio.is_finite() {
            return self.adc_full_scale;
        }
        (ratio * full_scale).round().clamp(0.0, full_scale) as u8
    }
}

#[derive(Debug, Clone)]
pub struct SensorReader {
    channel: u8,
    calibration: ThermistorConfig,
}

impl SensorReader {
    pub fn new(channel: u8, calibration: ThermistorConfig) -> Self {
        Self {
            channel,
            calibration,
        }
    }

    pub fn calibration(&self) -> &ThermistorConfig {
        &self.calibration
    }

    pub fn read_temperature<A: AnalogInput + ?Sized>(
        &self,
        adc: &mut A,
    ) -> Result<f32, SensorFault> {
        let sample = adc.read_raw_sample(self.channel)?;
        self.calibration.sample_to_fahrenheit(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSample(Result<u8, SensorFault>);

    impl AnalogInput for FixedSample {
        fn read_raw_sample(&mut self, _channel: u8) -> Result<u8, SensorFault> {
            self.0
        }
    }

    fn read(sample: u8) -> Result<f32, SensorFault> {
        SensorReader::new(0, ThermistorConfig::default()).read_temperature(&mut FixedSample(Ok(sample)))
    }

    #[test]
    fn sample_130_matches_reference_conversion() {
        // voltage ~1.682 V, resistance ~10.40
        let temp_f = read(130).unwrap();
        assert!((temp_f - 75.416).abs() < 0.01, "got {temp_f}");
    }

    #[test]
    fn higher_samples_read_colder() {
        let warm = read(138).unwrap();
        let cool = read(150).unwrap();
        assert!(warm > cool);
        assert!((warm - 70.395).abs() < 0.01, "got {warm}");
        assert!((cool - 62.931).abs() < 0.01, "got {cool}");
    }

    #[test]
    fn full_scale_sample_is_open_circuit() {
        assert_eq!(read(255), Err(SensorFault::OpenCircuit { sample: 255 }));
    }

    #[test]
    fn zero_sample_is_short_circuit() {
        assert_eq!(read(0), Err(SensorFault::ShortCircuit));
    }

    #[test]
    fn implausible_temperature_is_out_of_range() {
        // One count above zero resolves to well over 150F.
        assert!(matches!(read(1), Err(SensorFault::OutOfRange { sample: 1, .. })));
    }

    #[test]
    fn bus_failures_propagate() {
        let reader = SensorReader::new(3, ThermistorConfig::default());
        let result = reader.read_temperature(&mut FixedSample(Err(SensorFault::Bus { channel: 3 })));
        assert_eq!(result, Err(SensorFault::Bus { channel: 3 }));
    }

    #[test]
    fn inverse_conversion_lands_on_the_nearest_sample() {
        let calibration = ThermistorConfig::default();
        for sample in [100_u8, 130, 143, 150, 160] {
            let temp_f = calibration.sample_to_fahrenheit(sample).unwrap();
            assert_eq!(calibration.sample_for_temperature(temp_f), sample);
        }
    }
}
