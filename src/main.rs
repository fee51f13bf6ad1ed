use calloop::{
    EventLoop, Interest, Mode, PostAction,
    generic::Generic,
    signals::{Signal, Signals},
};
use hidpid::{
    DaemonError, Result, config,
    display::DisplayLink,
    peer::PanelPeer,
    settings::{self, DesktopSettings, SettingsMonitor},
    state::{Controller, ControllerEvent},
};
use std::{backtrace::Backtrace, fs, path::PathBuf};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    init_backtrace_defaults();
    init_logging()?;
    std::panic::set_hook(Box::new(|panic_info| {
        let backtrace = Backtrace::force_capture();
        tracing::error!("panic: {panic_info}\n{backtrace}");
        eprintln!("panic: {panic_info}\n{backtrace}");
    }));

    let config = config::load_or_create_default()?;
    tracing::info!(
        geometry_debounce_ms = config.geometry_debounce.as_millis() as u64,
        scaling_debounce_ms = config.scaling_debounce.as_millis() as u64,
        wm_process = %config.wm_process,
        "configuration loaded"
    );

    let mut event_loop: EventLoop<Controller> =
        EventLoop::try_new().map_err(|e| DaemonError::EventLoop(e.to_string()))?;

    let display = DisplayLink::connect()?;
    let initial = display.current_geometry();
    tracing::info!(
        width = initial.width,
        height = initial.height,
        "connected to X server"
    );

    let peer = PanelPeer::new(config.panel_relaunch.clone(), config.wm_process.clone());
    let mut controller = Controller::new(
        event_loop.handle(),
        event_loop.get_signal(),
        config,
        initial,
        Box::new(DesktopSettings::new()),
        Box::new(peer),
    );

    let handle = event_loop.handle();

    // Events x11rb buffered during the connect handshake are already past
    // the fd; hand them to the engine before waiting on readability.
    for sample in display.drain_events()? {
        controller.handle_event(ControllerEvent::GeometryChanged {
            width: sample.width,
            height: sample.height,
        });
    }

    handle
        .insert_source(
            Generic::new(display, Interest::READ, Mode::Level),
            |_, display, controller| match display.drain_events() {
                Ok(samples) => {
                    for sample in samples {
                        controller.handle_event(ControllerEvent::GeometryChanged {
                            width: sample.width,
                            height: sample.height,
                        });
                    }
                    Ok(PostAction::Continue)
                }
                Err(err) => {
                    tracing::warn!("{err}");
                    controller.handle_event(ControllerEvent::DisplayLost);
                    Ok(PostAction::Remove)
                }
            },
        )
        .map_err(|err| DaemonError::EventLoop(format!("failed to register display source: {err}")))?;

    for schema in [settings::INTERFACE_SCHEMA, settings::FONT_SCHEMA] {
        let monitor = SettingsMonitor::spawn(schema)?;
        handle
            .insert_source(
                Generic::new(monitor, Interest::READ, Mode::Level),
                |_, monitor, controller| {
                    // Safety: the pipe fd is only read from, never closed or
                    // replaced.
                    let monitor = unsafe { monitor.get_mut() };
                    match monitor.drain() {
                        Ok(drained) => {
                            for key in drained.keys {
                                controller
                                    .handle_event(ControllerEvent::SettingsKeyChanged { key });
                            }
                            if drained.closed {
                                tracing::warn!(
                                    schema = monitor.schema(),
                                    "settings monitor exited"
                                );
                                Ok(PostAction::Remove)
                            } else {
                                Ok(PostAction::Continue)
                            }
                        }
                        Err(err) => {
                            tracing::warn!(
                                schema = monitor.schema(),
                                "settings monitor read failed: {err}"
                            );
                            Ok(PostAction::Remove)
                        }
                    }
                },
            )
            .map_err(|err| {
                DaemonError::EventLoop(format!(
                    "failed to register settings monitor for {schema}: {err}"
                ))
            })?;
    }

    let signals = Signals::new(&[Signal::SIGINT, Signal::SIGTERM]).map_err(|err| {
        DaemonError::EventLoop(format!("failed to register signal handlers: {err}"))
    })?;
    handle
        .insert_source(signals, |event, _, controller| {
            tracing::info!(signal = ?event.signal(), "received termination signal");
            controller.shutdown();
        })
        .map_err(|err| DaemonError::EventLoop(format!("failed to register signal source: {err}")))?;

    controller.run_startup_tasks();

    event_loop
        .run(None, &mut controller, |_| {})
        .map_err(|e| DaemonError::EventLoop(e.to_string()))?;

    // The loop can also stop without going through the signal handler;
    // make sure no timer outlives it either way.
    controller.shutdown();

    Ok(())
}

fn init_backtrace_defaults() {
    if std::env::var_os("RUST_BACKTRACE").is_none() {
        // Safety: called at startup before creating any threads.
        unsafe { std::env::set_var("RUST_BACKTRACE", "1") };
    }
    if std::env::var_os("RUST_LIB_BACKTRACE").is_none() {
        // Safety: called at startup before creating any threads.
        unsafe { std::env::set_var("RUST_LIB_BACKTRACE", "0") };
    }
}

const DEFAULT_LOG_FILTER: &str = "hidpid=debug";

fn init_logging() -> Result<()> {
    let log_dir = state_dir()?;
    fs::create_dir_all(&log_dir).map_err(|err| {
        DaemonError::Config(format!(
            "failed to create log directory {}: {err}",
            log_dir.display()
        ))
    })?;

    let file_appender = tracing_appender::rolling::never(&log_dir, "hidpid.log");
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(true)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_appender),
        )
        .init();

    let log_file = log_dir.join("hidpid.log");
    tracing::info!(path = %log_file.display(), "logging initialized");

    Ok(())
}

fn state_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os("XDG_STATE_HOME")
        && !dir.is_empty()
    {
        return Ok(PathBuf::from(dir).join("hidpid"));
    }
    let home = std::env::var_os("HOME")
        .ok_or_else(|| DaemonError::Config("neither XDG_STATE_HOME nor HOME is set".to_owned()))?;
    Ok(PathBuf::from(home).join(".local/state/hidpid"))
}
