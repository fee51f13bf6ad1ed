use calloop::{LoopHandle, LoopSignal};

use crate::{
    actions::{PeerControl, SessionSettings},
    config::RuntimeConfig,
    debounce::DebounceHandle,
    display::Geometry,
    settings,
};

/// Everything the event loop can observe, reduced to one enum so dispatch
/// order is the loop's arrival order regardless of which source fired.
#[derive(Clone, Debug)]
pub enum ControllerEvent {
    GeometryChanged { width: u16, height: u16 },
    SettingsKeyChanged { key: String },
    DisplayLost,
}

/// The daemon's entire mutable state. Owned by the event loop and mutated
/// only from its thread.
pub struct Controller {
    pub loop_handle: LoopHandle<'static, Controller>,
    pub loop_signal: LoopSignal,
    pub config: RuntimeConfig,

    pub geometry: Geometry,
    pub geometry_timer: DebounceHandle<Controller>,
    pub scaling_timer: DebounceHandle<Controller>,

    pub settings: Box<dyn SessionSettings>,
    pub peer: Box<dyn PeerControl>,

    shutting_down: bool,
}

impl Controller {
    pub fn new(
        loop_handle: LoopHandle<'static, Controller>,
        loop_signal: LoopSignal,
        config: RuntimeConfig,
        initial_geometry: Geometry,
        settings: Box<dyn SessionSettings>,
        peer: Box<dyn PeerControl>,
    ) -> Self {
        Self {
            loop_handle,
            loop_signal,
            config,
            geometry: initial_geometry,
            geometry_timer: DebounceHandle::new(),
            scaling_timer: DebounceHandle::new(),
            settings,
            peer,
            shutting_down: false,
        }
    }

    pub fn run_startup_tasks(&mut self) {
        if let Err(err) = self.settings.set_icons_visible(true) {
            tracing::warn!("failed to show desktop icons at startup: {err}");
        }
    }

    pub fn handle_event(&mut self, event: ControllerEvent) {
        if self.shutting_down {
            return;
        }
        match event {
            ControllerEvent::GeometryChanged { width, height } => {
                self.on_geometry_event(Geometry { width, height });
            }
            ControllerEvent::SettingsKeyChanged { key } => {
                self.on_settings_key_changed(&key);
            }
            ControllerEvent::DisplayLost => {
                tracing::warn!(
                    "display server connection lost, resolution changes are no longer tracked"
                );
            }
        }
    }

    /// Resize events fire repeatedly during a mode change or drag; only the
    /// settled resolution matters, so each distinct sample restarts the
    /// trailing timer.
    fn on_geometry_event(&mut self, sample: Geometry) {
        if sample == self.geometry {
            tracing::trace!(?sample, "geometry unchanged, ignoring");
            return;
        }
        tracing::debug!(
            width = sample.width,
            height = sample.height,
            "display resolution changed"
        );
        self.geometry = sample;

        let delay = self.config.geometry_debounce;
        let armed = self.geometry_timer.arm(
            &self.loop_handle,
            delay,
            |controller| &mut controller.geometry_timer,
            |controller| controller.refresh_icons(),
        );
        if let Err(err) = armed {
            tracing::warn!("failed to schedule icon refresh: {err}");
        }
    }

    fn on_settings_key_changed(&mut self, key: &str) {
        if key != settings::SCALING_FACTOR_KEY && key != settings::DPI_KEY {
            tracing::trace!(key, "settings change not scaling-relevant, ignoring");
            return;
        }
        tracing::debug!(key, "scaling-relevant setting changed");

        let delay = self.config.scaling_debounce;
        let armed = self.scaling_timer.arm(
            &self.loop_handle,
            delay,
            |controller| &mut controller.scaling_timer,
            |controller| controller.apply_scaling_change(),
        );
        if let Err(err) = armed {
            tracing::warn!("failed to schedule scaling update: {err}");
        }
    }

    /// Cancels all pending timers before the loop winds down, so no callback
    /// runs once teardown has begun. Idempotent.
    pub fn shutdown(&mut self) {
        if self.shutting_down {
            return;
        }
        self.shutting_down = true;
        self.scaling_timer.cancel(&self.loop_handle);
        self.geometry_timer.cancel(&self.loop_handle);
        self.loop_signal.stop();
        tracing::info!("shutting down");
    }
}
