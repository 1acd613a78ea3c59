//! Cooperative core-0 main loop
//!
//! One iteration runs the services and backends in a fixed, observable
//! order: LEDs, players, storage, every output task, the app hook, every
//! input task. Outputs run before inputs so output hardware is primed
//! before inputs enqueue events for it. The feedback plane runs right after
//! the outputs so a host update received during the USB pump reaches the
//! inputs within the same iteration. Nothing here blocks; the only stalls
//! in the system are the flash write primitive and the post-mode-change
//! watchdog spin.

use crate::feedback;
use crate::interface::{Core1Task, Cx, InputInterface, OutputInterface};
use crate::leds::LedService;
use crate::log::*;
use crate::player::PlayerManager;
use crate::router::Router;
use crate::storage::{SettingsSector, SettingsService};
use crate::telemetry::TelemetrySink;

/// Loop stages in execution order, observable through the trace hook
#[derive(Clone, Copy, PartialEq, Eq, Debug, defmt::Format)]
pub enum Stage {
    Leds,
    Players,
    Storage,
    Output(usize),
    App,
    Input(usize),
}

/// The firmware application: services plus the enumerated interfaces
///
/// Explicit context instead of globals; `main` builds one of these and then
/// calls [`App::tick`] forever.
pub struct App<'a, S: SettingsSector> {
    pub router: Router,
    pub leds: LedService,
    pub players: PlayerManager,
    pub settings: SettingsService<S>,
    pub inputs: &'a mut [&'a mut dyn InputInterface],
    pub outputs: &'a mut [&'a mut dyn OutputInterface],
    /// Test instrumentation; `None` in firmware builds
    pub trace: Option<&'a mut dyn FnMut(Stage)>,
}

impl<'a, S: SettingsSector> App<'a, S> {
    pub fn new(
        settings: SettingsService<S>,
        inputs: &'a mut [&'a mut dyn InputInterface],
        outputs: &'a mut [&'a mut dyn OutputInterface],
    ) -> Self {
        Self {
            router: Router::new(),
            leds: LedService::new(),
            players: PlayerManager::new(),
            settings,
            inputs,
            outputs,
            trace: None,
        }
    }

    /// Initialize outputs (tap registration) and inputs, in that order
    pub fn init(&mut self, telemetry: &mut dyn TelemetrySink) {
        let Self {
            router,
            players,
            inputs,
            outputs,
            ..
        } = self;
        let mut cx = Cx {
            now_ms: 0,
            router,
            players,
            telemetry,
            save_active_profile: None,
        };
        for output in outputs.iter_mut() {
            info!("Output: {}", output.name());
            output.init(&mut cx);
        }
        for input in inputs.iter_mut() {
            info!("Input: {}", input.name());
            input.init(&mut cx);
        }
    }

    /// The single task allowed to own core 1
    ///
    /// At most one output may provide one; extra registrations lose and are
    /// reported, the first by enumeration order wins.
    pub fn core1_task(&self) -> Option<Core1Task> {
        let mut found = None;
        for output in self.outputs.iter() {
            match (found, output.core1_task()) {
                (None, Some(task)) => found = Some(task),
                (Some(_), Some(_)) => {
                    warn!("Output {} also wants core 1; ignoring", output.name());
                }
                _ => {}
            }
        }
        found
    }

    /// One cooperative iteration
    pub fn tick(
        &mut self,
        now_ms: u32,
        telemetry: &mut dyn TelemetrySink,
        app_task: impl FnOnce(&mut Cx),
    ) {
        let Self {
            router,
            leds,
            players,
            settings,
            inputs,
            outputs,
            trace,
        } = self;
        let mut emit = |stage: Stage| {
            if let Some(hook) = trace.as_mut() {
                hook(stage);
            }
        };
        let mut save_profile = None;

        emit(Stage::Leds);
        let usb_on = outputs.first().map(|o| o.is_ready()).unwrap_or(false);
        let profile = outputs.first().map(|o| o.active_profile()).unwrap_or(0);
        leds.tick(now_ms, usb_on, profile, players);

        emit(Stage::Players);
        players.task(now_ms);

        emit(Stage::Storage);
        settings.task();

        for (index, output) in outputs.iter_mut().enumerate() {
            emit(Stage::Output(index));
            let mut cx = Cx {
                now_ms,
                router: &mut *router,
                players: &mut *players,
                telemetry: &mut *telemetry,
                save_active_profile: None,
            };
            output.task(&mut cx);
            if cx.save_active_profile.is_some() {
                save_profile = cx.save_active_profile;
            }
        }

        // Feedback plane: active output is the first by contract
        if let Some(primary) = outputs.first_mut() {
            feedback::service(&mut **primary, inputs, leds);
        }

        emit(Stage::App);
        {
            let mut cx = Cx {
                now_ms,
                router: &mut *router,
                players: &mut *players,
                telemetry: &mut *telemetry,
                save_active_profile: None,
            };
            app_task(&mut cx);
        }

        for (index, input) in inputs.iter_mut().enumerate() {
            emit(Stage::Input(index));
            let mut cx = Cx {
                now_ms,
                router: &mut *router,
                players: &mut *players,
                telemetry: &mut *telemetry,
                save_active_profile: None,
            };
            input.task(&mut cx);
        }

        if let Some(index) = save_profile {
            settings.record_mut().active_profile_index = index;
            settings.queue_save();
        }
    }
}
