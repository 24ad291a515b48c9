use std::{thread, time::Duration};

use anyhow::{anyhow, Context};
use esp_idf_hal::{
    delay::{FreeRtos, BLOCK},
    gpio::{AnyIOPin, AnyOutputPin, Input, PinDriver, Pull},
    i2c::{I2cConfig, I2cDriver, I2C0},
    ledc::{config::TimerConfig, LedcDriver, LedcTimerDriver, Resolution, LEDC},
    units::FromValueType,
};
use esp_idf_svc::{
    hal::prelude::Peripherals,
    log::EspLogger,
    nvs::{EspDefaultNvsPartition, EspNvs},
};
use log::{info, warn};

use peltier_common::{
    AnalogInput, Clock, ConfigError, Delay, DigitalInput, Display, DutyCycleOutput,
    HysteresisBand, Level, PinConfig, RangeLimits, Regulator, RegulatorConfig, RunExit,
    RuntimeConfig, SensorFault, ESP32_RESERVED_PINS,
};

use crate::lcd::CharacterLcd;

const NVS_NAMESPACE: &str = "regulator";
const NVS_RUNTIME_KEY: &str = "runtime_json";
const CONTROL_LOOP_STACK_BYTES: usize = 12 * 1024;

struct NvsStore {
    partition: EspDefaultNvsPartition,
}

struct EspBoard {
    i2c: I2cDriver<'static>,
    lcd: CharacterLcd,
    adc_address: u8,
    heat_pin: i32,
    cool_pin: i32,
    heat: LedcDriver<'static>,
    cool: LedcDriver<'static>,
    inputs: Vec<(i32, PinDriver<'static, AnyIOPin, Input>)>,
    inputs_active_low: bool,
}

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let nvs_store = NvsStore {
        partition: EspDefaultNvsPartition::take()?,
    };
    let mut runtime = nvs_store.load_runtime_config().unwrap_or_else(|err| {
        warn!("failed to load runtime config from NVS: {err:#}");
        default_runtime_config()
    });
    runtime.sanitize();

    let mut reserved = ESP32_RESERVED_PINS.to_vec();
    reserved.extend([runtime.bus.sda_pin, runtime.bus.scl_pin]);
    if let Err(err) = runtime.pins.check_reserved(&reserved) {
        warn!("{err}; falling back to the ESP32 pin defaults");
        runtime.pins = PinConfig::esp32();
    }
    match runtime.validate() {
        Ok(()) => {}
        Err(err @ ConfigError::SharedOutputPin(_)) => {
            return Err(err).context("invalid pin assignment");
        }
        Err(err) => {
            warn!("{err}; falling back to the default band");
            runtime.regulator.band = HysteresisBand::default();
            runtime.regulator.limits = RangeLimits::default();
        }
    }

    let Peripherals { i2c0, ledc, .. } = Peripherals::take()?;
    let board = EspBoard::new(i2c0, ledc, &runtime).context("board initialization failed")?;
    info!(
        "board ready: LCD 0x{:02x}, ADC 0x{:02x}, heat GPIO{}, cool GPIO{}",
        runtime.bus.lcd_address, runtime.bus.adc_address, runtime.pins.heat_pwm, runtime.pins.cool_pwm,
    );

    let control = spawn_control_loop(board, runtime.regulator, runtime.pins)?;
    match control.join() {
        Ok(RunExit::RangeLimit(limit)) => warn!("control loop halted, outputs off: {limit}"),
        Ok(RunExit::Stopped) => info!("control loop stopped"),
        Err(_) => return Err(anyhow!("control loop panicked")),
    }

    loop {
        thread::sleep(Duration::from_secs(60));
    }
}

fn spawn_control_loop(
    board: EspBoard,
    config: RegulatorConfig,
    pins: PinConfig,
) -> anyhow::Result<thread::JoinHandle<RunExit>> {
    thread::Builder::new()
        .name("control-loop".into())
        .stack_size(CONTROL_LOOP_STACK_BYTES)
        .spawn(move || {
            let mut regulator = Regulator::new(board, config, pins);
            regulator.start();
            regulator.run(|_| false)
        })
        .context("failed to spawn control loop thread")
}

fn default_runtime_config() -> RuntimeConfig {
    RuntimeConfig {
        pins: PinConfig::esp32(),
        ..RuntimeConfig::default()
    }
}

fn probe(i2c: &mut I2cDriver<'static>, address: u8, device: &str) -> anyhow::Result<()> {
    i2c.write(address, &[0], BLOCK)
        .with_context(|| format!("{device} not found at 0x{address:02x}"))?;
    info!("{device} found at 0x{address:02x}");
    Ok(())
}

/// ADS7830 command byte: single-ended input, internal reference off, converter on.
fn ads7830_command(channel: u8) -> u8 {
    let select = ((channel << 2) | (channel >> 1)) & 0x07;
    0x84 | (select << 4)
}

impl NvsStore {
    fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let nvs = EspNvs::new(self.partition.clone(), NVS_NAMESPACE, true)?;
        let mut buffer = vec![0_u8; 4096];

        match nvs.get_str(NVS_RUNTIME_KEY, &mut buffer)? {
            Some(value) => Ok(RuntimeConfig::from_json_slice(value.as_bytes())?),
            None => Ok(default_runtime_config()),
        }
    }
}

impl EspBoard {
    fn new(i2c0: I2C0, ledc: LEDC, runtime: &RuntimeConfig) -> anyhow::Result<Self> {
        let bus = &runtime.bus;
        let pins = &runtime.pins;

        let i2c_config = I2cConfig::new().baudrate(bus.baudrate_khz.kHz().into());
        let mut i2c = I2cDriver::new(
            i2c0,
            unsafe { AnyIOPin::new(bus.sda_pin) },
            unsafe { AnyIOPin::new(bus.scl_pin) },
            &i2c_config,
        )
        .context("failed to start I2C bus")?;
        probe(&mut i2c, bus.lcd_address, "LCD")?;
        probe(&mut i2c, bus.adc_address, "ADS7830")?;

        let mut lcd = CharacterLcd::new(bus.lcd_address);
        lcd.init(&mut i2c)?;

        // Shared by both channels for the whole program.
        let timer = Box::leak(Box::new(
            LedcTimerDriver::new(
                ledc.timer0,
                &TimerConfig::new()
                    .frequency(bus.pwm_frequency_hz.Hz().into())
                    .resolution(Resolution::Bits8),
            )
            .context("failed to configure PWM timer")?,
        ));
        let heat = LedcDriver::new(ledc.channel0, &*timer, unsafe {
            AnyOutputPin::new(pins.heat_pwm)
        })
        .with_context(|| format!("failed to attach heat PWM to GPIO{}", pins.heat_pwm))?;
        let cool = LedcDriver::new(ledc.channel1, &*timer, unsafe {
            AnyOutputPin::new(pins.cool_pwm)
        })
        .with_context(|| format!("failed to attach cool PWM to GPIO{}", pins.cool_pwm))?;

        let mut inputs = Vec::new();
        for pin in [pins.enable_switch, pins.lower_button, pins.raise_button] {
            let mut driver = PinDriver::input(unsafe { AnyIOPin::new(pin) })
                .with_context(|| format!("failed to configure GPIO{pin} as input"))?;
            if pins.inputs_active_low {
                driver.set_pull(Pull::Up)?;
            }
            inputs.push((pin, driver));
        }

        Ok(Self {
            i2c,
            lcd,
            adc_address: bus.adc_address,
            heat_pin: pins.heat_pwm,
            cool_pin: pins.cool_pwm,
            heat,
            cool,
            inputs,
            inputs_active_low: pins.inputs_active_low,
        })
    }
}

impl AnalogInput for EspBoard {
    fn read_raw_sample(&mut self, channel: u8) -> Result<u8, SensorFault> {
        let mut sample = [0_u8; 1];
        self.i2c
            .write_read(
                self.adc_address,
                &[ads7830_command(channel)],
                &mut sample,
                BLOCK,
            )
            .map_err(|err| {
                warn!("ADS7830 read on channel {channel} failed: {err}");
                SensorFault::Bus { channel }
            })?;
        Ok(sample[0])
    }
}

impl DigitalInput for EspBoard {
    fn read_level(&mut self, pin: i32) -> Level {
        match self.inputs.iter().find(|(input_pin, _)| *input_pin == pin) {
            Some((_, driver)) => Level::from_pin(driver.is_high(), self.inputs_active_low),
            None => Level::Inactive,
        }
    }
}

impl DutyCycleOutput for EspBoard {
    fn write_duty_cycle(&mut self, pin: i32, percent: u8) {
        let driver = if pin == self.heat_pin {
            &mut self.heat
        } else if pin == self.cool_pin {
            &mut self.cool
        } else {
            warn!("no PWM channel attached to GPIO{pin}");
            return;
        };
        let duty = driver.get_max_duty() * u32::from(percent.min(100)) / 100;
        if let Err(err) = driver.set_duty(duty) {
            warn!("failed to set GPIO{pin} duty to {percent}%: {err}");
        }
    }
}

impl Display for EspBoard {
    fn clear(&mut self) {
        if let Err(err) = self.lcd.clear(&mut self.i2c) {
            warn!("LCD clear failed: {err:#}");
        }
    }

    fn set_backlight(&mut self, on: bool) {
        if let Err(err) = self.lcd.set_backlight(&mut self.i2c, on) {
            warn!("LCD backlight failed: {err:#}");
        }
    }

    fn write_at(&mut self, col: u8, row: u8, text: &str) {
        if let Err(err) = self.lcd.write_at(&mut self.i2c, col, row, text) {
            warn!("LCD write failed: {err:#}");
        }
    }
}

impl Clock for EspBoard {
    // No RTC or network time on this board.
    fn local_time(&self) -> Option<chrono::NaiveTime> {
        None
    }
}

impl Delay for EspBoard {
    fn delay_ms(&mut self, ms: u64) {
        FreeRtos::delay_ms(u32::try_from(ms).unwrap_or(u32::MAX));
    }
}
