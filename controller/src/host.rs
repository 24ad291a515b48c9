use std::{
    io::{BufRead, ErrorKind},
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc, Mutex,
    },
    thread,
    time::Duration,
};

use anyhow::Context;
use chrono::{NaiveTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, warn};

use peltier_common::{
    AnalogInput, Clock, ConfigError, Delay, DigitalInput, Display, DutyCycleOutput,
    HysteresisBand, Level, PinConfig, RangeLimits, Regulator, RegulatorConfig, RegulatorStatus,
    RunExit, RuntimeConfig, SensorFault, SimBoard,
};

const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// State shared between the operator-facing tasks and the control thread.
#[derive(Debug, Default)]
struct Operator {
    switch_on: AtomicBool,
    lower_presses: AtomicU32,
    raise_presses: AtomicU32,
    status_requested: AtomicBool,
    stop: AtomicBool,
    plant: Mutex<PlantOverrides>,
}

#[derive(Debug, Default)]
struct PlantOverrides {
    temp_f: Option<f32>,
    ambient_f: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Command {
    On,
    Off,
    Lower,
    Raise,
    Temperature(f32),
    Ambient(f32),
    Status,
}

struct ConfigStore {
    runtime_path: PathBuf,
}

/// [`SimBoard`] driven in real time, with the switch and buttons fed from
/// the operator instead of fixed levels.
struct HostBoard {
    sim: SimBoard,
    pins: PinConfig,
    timezone: Option<Tz>,
    time_scale: f32,
    operator: Arc<Operator>,
    last_frame: [String; 2],
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = ConfigStore::new();
    let mut runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });
    if let Some(tick_ms) = std::env::var("REGULATOR_TICK_MS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
    {
        runtime.regulator.tick_interval_ms = tick_ms;
    }
    runtime.sanitize();
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

    let timezone = match runtime.timezone.parse::<Tz>() {
        Ok(tz) => Some(tz),
        Err(err) => {
            warn!("unknown timezone `{}`: {err}", runtime.timezone);
            None
        }
    };

    let operator = Arc::new(Operator::default());
    operator
        .switch_on
        .store(runtime.simulation.switch_on_at_start, Ordering::Release);

    let sim = SimBoard::new(
        &runtime.pins,
        runtime.regulator.thermistor.clone(),
        &runtime.simulation,
    );
    let board = HostBoard {
        sim,
        pins: runtime.pins.clone(),
        timezone,
        time_scale: runtime.simulation.time_scale,
        operator: operator.clone(),
        last_frame: Default::default(),
    };

    info!(
        "simulated regulator: tick={}ms, band {}F-{}F, time scale x{}",
        runtime.regulator.tick_interval_ms,
        runtime.regulator.band.floor_f,
        runtime.regulator.band.ceiling_f,
        runtime.simulation.time_scale,
    );

    spawn_operator_input(operator.clone())?;
    spawn_shutdown_signal(operator.clone());
    let control = spawn_control_loop(board, runtime.regulator, runtime.pins, operator);

    match control.await.context("control loop panicked")? {
        RunExit::Stopped => info!("control loop stopped"),
        RunExit::RangeLimit(limit) => warn!("control loop halted at range limit: {limit}"),
    }
    Ok(())
}

fn spawn_control_loop(
    board: HostBoard,
    config: RegulatorConfig,
    pins: PinConfig,
    operator: Arc<Operator>,
) -> tokio::task::JoinHandle<RunExit> {
    tokio::task::spawn_blocking(move || {
        let mut regulator = Regulator::new(board, config, pins);
        regulator.start();
        regulator.run(|regulator| {
            if operator.status_requested.swap(false, Ordering::AcqRel) {
                log_status(&regulator.status());
            }
            operator.stop.load(Ordering::Acquire)
        })
    })
}

// Blocking stdin lives on its own thread so it cannot hold up runtime shutdown.
fn spawn_operator_input(operator: Arc<Operator>) -> anyhow::Result<()> {
    thread::Builder::new()
        .name("operator-input".into())
        .spawn(move || {
            info!("commands: on, off, up, down, temp <F>, ambient <F>, status");
            for line in std::io::stdin().lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(err) => {
                        warn!("stdin read failed: {err}");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command(&line) {
                    Ok(command) => operator.apply(command),
                    Err(err) => warn!("{err:#}"),
                }
            }
        })
        .context("failed to spawn operator input thread")?;
    Ok(())
}

fn spawn_shutdown_signal(operator: Arc<Operator>) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("ctrl-c received, shutting down"),
            Err(err) => warn!("failed to listen for ctrl-c: {err}"),
        }
        operator.stop.store(true, Ordering::Release);
    });
}

fn parse_command(line: &str) -> anyhow::Result<Command> {
    let mut words = line.split_whitespace();
    let verb = words.next().context("empty command")?;
    let command = match verb {
        "on" => Command::On,
        "off" => Command::Off,
        "down" => Command::Lower,
        "up" => Command::Raise,
        "status" => Command::Status,
        "temp" | "ambient" => {
            let raw = words
                .next()
                .with_context(|| format!("`{verb}` needs a temperature in F"))?;
            let value: f32 = raw
                .parse()
                .with_context(|| format!("invalid temperature `{raw}`"))?;
            if !value.is_finite() {
                anyhow::bail!("invalid temperature `{raw}`");
            }
            if verb == "temp" {
                Command::Temperature(value)
            } else {
                Command::Ambient(value)
            }
        }
        other => anyhow::bail!(
            "unknown command `{other}` (on, off, up, down, temp <F>, ambient <F>, status)"
        ),
    };
    Ok(command)
}

fn log_status(status: &RegulatorStatus) {
    match serde_json::to_string(status) {
        Ok(json) => info!(target: "regulator::status", "{json}"),
        Err(err) => warn!("status serialization failed: {err}"),
    }
}

fn take_press(presses: &AtomicU32) -> bool {
    presses
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
            count.checked_sub(1)
        })
        .is_ok()
}

impl Operator {
    fn apply(&self, command: Command) {
        match command {
            Command::On => self.switch_on.store(true, Ordering::Release),
            Command::Off => self.switch_on.store(false, Ordering::Release),
            Command::Lower => {
                self.lower_presses.fetch_add(1, Ordering::AcqRel);
            }
            Command::Raise => {
                self.raise_presses.fetch_add(1, Ordering::AcqRel);
            }
            Command::Status => self.status_requested.store(true, Ordering::Release),
            Command::Temperature(temp_f) => self.with_plant(|plant| plant.temp_f = Some(temp_f)),
            Command::Ambient(ambient_f) => {
                self.with_plant(|plant| plant.ambient_f = Some(ambient_f))
            }
        }
        debug!("operator command {command:?}");
    }

    fn with_plant(&self, update: impl FnOnce(&mut PlantOverrides)) {
        match self.plant.lock() {
            Ok(mut plant) => update(&mut plant),
            Err(err) => warn!("plant overrides unavailable: {err}"),
        }
    }

    fn take_plant_overrides(&self) -> PlantOverrides {
        self.plant
            .lock()
            .map(|mut plant| std::mem::take(&mut *plant))
            .unwrap_or_default()
    }
}

impl ConfigStore {
    fn new() -> Self {
        let data_dir = std::env::var("REGULATOR_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.regulator"));

        Self {
            runtime_path: data_dir.join("runtime.json"),
        }
    }

    async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        match tokio::fs::read(&self.runtime_path).await {
            Ok(raw) => RuntimeConfig::from_json_slice(&raw)
                .with_context(|| format!("failed to parse {}", self.runtime_path.display())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }
}

impl HostBoard {
    fn apply_plant_overrides(&mut self) {
        let overrides = self.operator.take_plant_overrides();
        if let Some(temp_f) = overrides.temp_f {
            self.sim.set_temperature_f(temp_f);
        }
        if let Some(ambient_f) = overrides.ambient_f {
            self.sim.set_ambient_f(ambient_f);
        }
    }

    fn log_frame(&mut self) {
        let frame = [self.sim.line(0), self.sim.line(1)];
        if frame != self.last_frame {
            debug!(
                backlight = self.sim.backlight(),
                plant_f = self.sim.plant().temp_f,
                "lcd |{}|{}|",
                frame[0],
                frame[1]
            );
            self.last_frame = frame;
        }
    }
}

impl AnalogInput for HostBoard {
    fn read_raw_sample(&mut self, channel: u8) -> Result<u8, SensorFault> {
        self.apply_plant_overrides();
        self.sim.read_raw_sample(channel)
    }
}

impl DigitalInput for HostBoard {
    fn read_level(&mut self, pin: i32) -> Level {
        let active = if pin == self.pins.enable_switch {
            self.operator.switch_on.load(Ordering::Acquire)
        } else if pin == self.pins.lower_button {
            take_press(&self.operator.lower_presses)
        } else if pin == self.pins.raise_button {
            take_press(&self.operator.raise_presses)
        } else {
            return self.sim.read_level(pin);
        };
        if active {
            Level::Active
        } else {
            Level::Inactive
        }
    }
}

impl DutyCycleOutput for HostBoard {
    fn write_duty_cycle(&mut self, pin: i32, percent: u8) {
        if self.sim.duty(pin) != percent {
            debug!("GPIO{pin} duty {percent}%");
        }
        self.sim.write_duty_cycle(pin, percent);
    }
}

impl Display for HostBoard {
    fn clear(&mut self) {
        self.sim.clear();
    }

    fn set_backlight(&mut self, on: bool) {
        self.sim.set_backlight(on);
    }

    fn write_at(&mut self, col: u8, row: u8, text: &str) {
        self.sim.write_at(col, row, text);
    }
}

impl Clock for HostBoard {
    fn local_time(&self) -> Option<NaiveTime> {
        self.timezone
            .map(|tz| Utc::now().with_timezone(&tz).time())
    }
}

impl Delay for HostBoard {
    // Sleeps in slices so a stop request cuts a long ramp pause short.
    fn delay_ms(&mut self, ms: u64) {
        self.log_frame();
        let mut remaining =
            Duration::try_from_secs_f64(ms as f64 / 1000.0 / f64::from(self.time_scale))
                .unwrap_or(Duration::MAX);
        while !remaining.is_zero() && !self.operator.stop.load(Ordering::Acquire) {
            let slice = remaining.min(SLEEP_SLICE);
            thread::sleep(slice);
            remaining -= slice;
        }
        self.apply_plant_overrides();
        self.sim.delay_ms(ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host_board(operator: Arc<Operator>) -> HostBoard {
        HostBoard {
            sim: SimBoard::default(),
            pins: PinConfig::default(),
            timezone: None,
            time_scale: 1.0,
            operator,
            last_frame: Default::default(),
        }
    }

    #[test]
    fn parses_operator_commands() {
        assert_eq!(parse_command("on").unwrap(), Command::On);
        assert_eq!(parse_command(" down ").unwrap(), Command::Lower);
        assert_eq!(parse_command("up").unwrap(), Command::Raise);
        assert_eq!(
            parse_command("temp 63.5").unwrap(),
            Command::Temperature(63.5)
        );
        assert_eq!(parse_command("ambient 80").unwrap(), Command::Ambient(80.0));
    }

    #[test]
    fn rejects_malformed_commands() {
        assert!(parse_command("temp").is_err());
        assert!(parse_command("temp warm").is_err());
        assert!(parse_command("temp NaN").is_err());
        assert!(parse_command("heat").is_err());
    }

    #[test]
    fn each_button_press_is_seen_once() {
        let operator = Arc::new(Operator::default());
        let mut board = host_board(operator.clone());
        operator.apply(Command::Lower);
        operator.apply(Command::Lower);

        let lower = PinConfig::default().lower_button;
        assert_eq!(board.read_level(lower), Level::Active);
        assert_eq!(board.read_level(lower), Level::Active);
        assert_eq!(board.read_level(lower), Level::Inactive);
    }

    #[test]
    fn switch_follows_operator() {
        let operator = Arc::new(Operator::default());
        let mut board = host_board(operator.clone());
        let switch = PinConfig::default().enable_switch;

        assert_eq!(board.read_level(switch), Level::Inactive);
        operator.apply(Command::On);
        assert_eq!(board.read_level(switch), Level::Active);
    }

    #[test]
    fn temperature_override_reaches_the_plant() {
        let operator = Arc::new(Operator::default());
        let mut board = host_board(operator.clone());
        operator.apply(Command::Temperature(60.0));

        board.read_raw_sample(0).unwrap();

        assert_eq!(board.sim.plant().temp_f, 60.0);
    }
}
