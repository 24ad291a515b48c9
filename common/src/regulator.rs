use tracing::{debug, info, warn};

use crate::{
    actuator::{Channel, RampOutcome},
    config::{PinConfig, RangeLimitPolicy, RegulatorConfig},
    control::ControlEngine,
    error::{RangeLimitReached, SensorFault},
    ports::Board,
    range::{HysteresisBand, RangeDirection, RangeManager},
    screen::{self, StatusWord},
    sensor::SensorReader,
    types::{ActuatorStatus, ControlState, Mode, RegulatorStatus},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Enable switch off; both channels held at zero.
    Idle,
    Active {
        temp_f: f32,
        state: ControlState,
    },
    /// No usable reading; both channels forced off.
    SensorFault(SensorFault),
    /// A range button hit a limit under [`RangeLimitPolicy::Halt`].
    Halted(RangeLimitReached),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RunExit {
    Stopped,
    RangeLimit(RangeLimitReached),
}

/// The run loop: owns the board and every piece of control state, and is
/// the only writer of all of it.
pub struct Regulator<B: Board> {
    board: B,
    config: RegulatorConfig,
    pins: PinConfig,
    sensor: SensorReader,
    range: RangeManager,
    engine: ControlEngine,
    mode: Mode,
    status_word: StatusWord,
    last_temp_f: Option<f32>,
    last_fault: Option<SensorFault>,
}

impl<B: Board> Regulator<B> {
    pub fn new(board: B, config: RegulatorConfig, pins: PinConfig) -> Self {
        let sensor = SensorReader::new(pins.adc_channel, config.thermistor.clone());
        let range = RangeManager::new(config.band, config.limits.clone());
        let engine = ControlEngine::new(&config, &pins);
        Self {
            board,
            config,
            pins,
            sensor,
            range,
            engine,
            mode: Mode::Idle,
            status_word: StatusWord::Blank,
            last_temp_f: None,
            last_fault: None,
        }
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn band(&self) -> HysteresisBand {
        self.range.band()
    }

    pub fn actuator_status(&self) -> ActuatorStatus {
        self.engine.status()
    }

    pub fn status_word(&self) -> StatusWord {
        self.status_word
    }

    pub fn status(&self) -> RegulatorStatus {
        let status = self.engine.status();
        RegulatorStatus {
            mode: self.mode.as_str(),
            state: self.status_word.as_str(),
            current_temp_f: self.last_temp_f,
            band: self.range.band(),
            heating: status.is_heating(),
            cooling: status.is_cooling(),
            heat_percent: self.engine.driver().level(Channel::Heat),
            cool_percent: self.engine.driver().level(Channel::Cool),
            sensor_fault: self.last_fault.map(|fault| fault.to_string()),
        }
    }

    /// Power-on sequence: outputs off, splash, then a clean screen.
    pub fn start(&mut self) {
        self.engine.force_off(&mut self.board);
        self.board.set_backlight(true);
        self.board.clear();
        screen::show_splash(&mut self.board, &self.config.splash_text);
        self.board.delay_ms(self.config.splash_ms);
        self.board.clear();
        info!(
            "regulator started, band {}",
            screen::band_text(&self.range.band())
        );
    }

    pub fn tick(&mut self) -> TickOutcome {
        if !self.board.read_level(self.pins.enable_switch).is_active() {
            self.enter_idle();
            return TickOutcome::Idle;
        }
        if self.mode == Mode::Idle {
            info!("enable switch on, regulating");
            self.mode = Mode::Active;
        }
        self.board.set_backlight(true);

        let time = self.board.local_time();
        screen::show_time(&mut self.board, time);
        let reading = self.sensor.read_temperature(&mut self.board);
        match reading {
            Ok(temp_f) => screen::show_temperature(&mut self.board, temp_f),
            Err(_) => screen::show_sensor_fault(&mut self.board),
        }

        if let Err(limit) = self.poll_range_buttons() {
            self.engine.force_off(&mut self.board);
            return TickOutcome::Halted(limit);
        }
        let band = self.range.band();
        screen::show_band(&mut self.board, &band);

        let temp_f = match reading {
            Ok(temp_f) => temp_f,
            Err(fault) => {
                self.handle_fault(fault);
                return TickOutcome::SensorFault(fault);
            }
        };
        if self.last_fault.take().is_some() {
            info!("sensor recovered at {temp_f:.1}F");
        }
        self.last_temp_f = Some(temp_f);
        debug!("temperature {temp_f:.2}F");

        let state = self
            .engine
            .tick(&mut self.board, &self.sensor, temp_f, &band, |board, step| {
                screen::show_temperature(board, step.temp_f)
            });
        if state == ControlState::Steady {
            if let Some(RampOutcome::SensorFault { fault, .. }) = self.engine.last_ramp() {
                screen::show_sensor_fault(&mut self.board);
                self.handle_fault(fault);
                return TickOutcome::SensorFault(fault);
            }
        }
        match state {
            ControlState::Heating => self.status_word = StatusWord::Heating,
            ControlState::Cooling => self.status_word = StatusWord::Cooling,
            ControlState::Steady => self.status_word = StatusWord::Steady,
            ControlState::Idle | ControlState::Unchanged => {
                if self.status_word == StatusWord::Fault {
                    self.status_word = StatusWord::Blank;
                }
            }
        }
        screen::show_status(&mut self.board, self.status_word);

        TickOutcome::Active { temp_f, state }
    }

    /// Ticks until `stop` returns true or a range limit halts the loop.
    /// `stop` is polled before every tick and may inspect the regulator.
    pub fn run(&mut self, mut stop: impl FnMut(&Self) -> bool) -> RunExit {
        let interval_ms = self.config.tick_interval_ms;
        let mut since_status_ms = 0;

        loop {
            if stop(self) {
                self.shutdown();
                return RunExit::Stopped;
            }
            if let TickOutcome::Halted(limit) = self.tick() {
                warn!("control loop halted: {limit}");
                return RunExit::RangeLimit(limit);
            }

            self.board.delay_ms(interval_ms);
            since_status_ms += interval_ms;
            if since_status_ms >= self.config.status_log_interval_ms {
                since_status_ms = 0;
                self.log_status();
            }
        }
    }

    /// Outputs off and display dark.
    pub fn shutdown(&mut self) {
        self.engine.force_off(&mut self.board);
        self.board.set_backlight(false);
        self.board.clear();
        self.mode = Mode::Idle;
        self.status_word = StatusWord::Blank;
        info!("regulator stopped");
    }

    fn enter_idle(&mut self) {
        self.engine.force_off(&mut self.board);
        self.board.set_backlight(false);
        self.board.clear();
        self.status_word = StatusWord::Blank;
        self.last_fault = None;
        if self.mode == Mode::Active {
            info!("enable switch off, outputs de-energized");
            self.mode = Mode::Idle;
        }
    }

    /// Lower is checked before raise; both may fire in one tick.
    fn poll_range_buttons(&mut self) -> Result<(), RangeLimitReached> {
        let buttons = [
            (self.pins.lower_button, RangeDirection::Lower),
            (self.pins.raise_button, RangeDirection::Raise),
        ];
        for (pin, direction) in buttons {
            if !self.board.read_level(pin).is_active() {
                continue;
            }
            match self.range.adjust(direction) {
                Ok(band) => info!(
                    %direction,
                    "temperature range now {}",
                    screen::band_text(&band)
                ),
                Err(limit) => {
                    warn!("{limit}");
                    if self.config.limit_policy == RangeLimitPolicy::Halt {
                        return Err(limit);
                    }
                }
            }
        }
        Ok(())
    }

    fn handle_fault(&mut self, fault: SensorFault) {
        self.engine.force_off(&mut self.board);
        self.status_word = StatusWord::Fault;
        self.last_temp_f = None;
        screen::show_status(&mut self.board, self.status_word);
        if self.last_fault != Some(fault) {
            warn!("sensor fault, outputs off: {fault}");
        }
        self.last_fault = Some(fault);
    }

    fn log_status(&self) {
        match serde_json::to_string(&self.status()) {
            Ok(json) => info!(target: "regulator::status", "{json}"),
            Err(err) => warn!("failed to serialize status: {err}"),
        }
    }
}
