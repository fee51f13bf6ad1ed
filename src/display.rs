use std::os::fd::{AsFd, BorrowedFd};

use x11rb::{
    connection::Connection,
    protocol::{
        Event,
        randr::{self, ConnectionExt as _},
    },
    rust_connection::RustConnection,
};

use crate::{DaemonError, Result};

/// Last observed display resolution, compared by value to drop no-op
/// notifications.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Geometry {
    pub width: u16,
    pub height: u16,
}

/// X server connection subscribed to RandR screen-change notifications.
/// Registered as a level-triggered fd source; `drain_events` must be called
/// until empty on every wakeup.
pub struct DisplayLink {
    conn: RustConnection,
    geometry: Geometry,
}

impl DisplayLink {
    pub fn connect() -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None).map_err(|err| {
            DaemonError::Display(format!("failed to connect to the X server: {err}"))
        })?;

        let screen = &conn.setup().roots[screen_num];
        let root = screen.root;
        let geometry = Geometry {
            width: screen.width_in_pixels,
            height: screen.height_in_pixels,
        };

        conn.randr_query_version(1, 5)
            .map_err(|err| DaemonError::Display(format!("RandR version query failed: {err}")))?
            .reply()
            .map_err(|err| DaemonError::Display(format!("RandR is not available: {err}")))?;
        conn.randr_select_input(root, randr::NotifyMask::SCREEN_CHANGE)
            .map_err(|err| {
                DaemonError::Display(format!("failed to subscribe to screen changes: {err}"))
            })?
            .check()
            .map_err(|err| {
                DaemonError::Display(format!("failed to subscribe to screen changes: {err}"))
            })?;
        conn.flush()
            .map_err(|err| DaemonError::Display(format!("failed to flush X requests: {err}")))?;

        Ok(Self { conn, geometry })
    }

    /// Resolution read synchronously at connect time, used to seed the
    /// engine before any notification arrives.
    pub fn current_geometry(&self) -> Geometry {
        self.geometry
    }

    /// Drains every queued X event, returning screen-change samples in
    /// arrival order. A connection error ends this source for good.
    pub fn drain_events(&self) -> Result<Vec<Geometry>> {
        let mut samples = Vec::new();
        loop {
            match self.conn.poll_for_event() {
                Ok(Some(Event::RandrScreenChangeNotify(event))) => samples.push(Geometry {
                    width: event.width,
                    height: event.height,
                }),
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(err) => {
                    return Err(DaemonError::Display(format!(
                        "lost X server connection: {err}"
                    )));
                }
            }
        }
        Ok(samples)
    }
}

impl AsFd for DisplayLink {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.conn.stream().as_fd()
    }
}
