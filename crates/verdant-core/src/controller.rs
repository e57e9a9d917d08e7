//! Mode and actuator controller for one cell.
//!
//! The mode goes `Loading → {Automatic, Manual}` and only changes after the
//! backend confirms it. In Automatic mode the controller listens to the live
//! channel and mirrors the actuator flags of each `metrics` event. In Manual
//! mode it stops listening and the four actuators accept commands.
//!
//! Every actuator has its own [`CommandState`]:
//!
//! ```text
//! Idle ──send──▶ Pending ──2xx──▶ Committed
//!                   │    └──2xx after leaving Manual──▶ Overridden
//!                   └──error──▶ RolledBack
//! ```
//!
//! The displayed position changes only on `Committed`. An acknowledgment
//! that arrives after the cell left Manual mode is recorded as `Overridden`
//! and leaves the mirrored live positions alone. A second command for
//! an actuator that is still `Pending` is rejected with
//! [`Error::CommandInFlight`]; commands for different actuators run
//! independently and are built from the last committed state.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use verdant_types::{Actuator, ActuatorState, CommandPayload, Mode, Switch};

use crate::channel::{ListenerId, RealtimeChannel};
use crate::error::{Error, Result};
use crate::traits::CellBackend;

/// Whether the cell's mode is known yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModeState {
    #[default]
    Loading,
    Ready(Mode),
}

impl ModeState {
    pub fn mode(&self) -> Option<Mode> {
        match self {
            ModeState::Loading => None,
            ModeState::Ready(mode) => Some(*mode),
        }
    }
}

impl fmt::Display for ModeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModeState::Loading => write!(f, "Loading"),
            ModeState::Ready(mode) => write!(f, "{}", mode),
        }
    }
}

/// Progress of the latest command for one actuator.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CommandState {
    /// No command sent since the controller was created.
    #[default]
    Idle,
    /// Sent, waiting for the backend.
    Pending { target: Switch },
    /// Acknowledged; the displayed position is `Switch`.
    Committed(Switch),
    /// Rejected or failed; the displayed position did not change.
    RolledBack { attempted: Switch, error: String },
    /// Accepted after the cell left Manual mode; the live channel owns the
    /// displayed position.
    Overridden { attempted: Switch },
}

impl CommandState {
    pub fn is_pending(&self) -> bool {
        matches!(self, CommandState::Pending { .. })
    }
}

#[derive(Debug, Default)]
struct ControlState {
    mode: ModeState,
    actuators: ActuatorState,
    commands: HashMap<Actuator, CommandState>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct Shared {
    state: Mutex<ControlState>,
    revision: watch::Sender<u64>,
}

impl Shared {
    fn update<R>(&self, f: impl FnOnce(&mut ControlState) -> R) -> R {
        let result = f(&mut lock(&self.state));
        self.revision.send_modify(|rev| *rev += 1);
        result
    }
}

/// Drives the mode and actuators of one cell.
pub struct CommandController<B: CellBackend> {
    backend: Arc<B>,
    channel: RealtimeChannel,
    cell_id: String,
    shared: Arc<Shared>,
    listener: Mutex<Option<ListenerId>>,
}

impl<B: CellBackend> fmt::Debug for CommandController<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandController")
            .field("cell_id", &self.cell_id)
            .field("state", &*lock(&self.shared.state))
            .finish_non_exhaustive()
    }
}

impl<B: CellBackend + 'static> CommandController<B> {
    /// Controller for `cell_id` in the `Loading` state. Call
    /// [`CommandController::load`] to fetch the mode.
    pub fn new(backend: Arc<B>, channel: RealtimeChannel, cell_id: impl Into<String>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            backend,
            channel,
            cell_id: cell_id.into(),
            shared: Arc::new(Shared {
                state: Mutex::new(ControlState::default()),
                revision,
            }),
            listener: Mutex::new(None),
        }
    }

    pub fn cell_id(&self) -> &str {
        &self.cell_id
    }

    pub fn mode_state(&self) -> ModeState {
        lock(&self.shared.state).mode
    }

    /// The mode, once loaded.
    pub fn mode(&self) -> Option<Mode> {
        self.mode_state().mode()
    }

    /// Displayed actuator positions.
    pub fn actuators(&self) -> ActuatorState {
        lock(&self.shared.state).actuators
    }

    /// Replace the displayed positions without sending anything.
    ///
    /// Used to restore known positions before the first command, since the
    /// backend does not report them. Ignored in Automatic mode, where the
    /// live channel owns the positions.
    pub fn assume_actuators(&self, actuators: ActuatorState) -> bool {
        self.shared.update(|state| {
            if state.mode.mode() == Some(Mode::Automatic) {
                return false;
            }
            state.actuators = actuators;
            true
        })
    }

    pub fn command_state(&self, actuator: Actuator) -> CommandState {
        lock(&self.shared.state)
            .commands
            .get(&actuator)
            .cloned()
            .unwrap_or_default()
    }

    /// Whether the live channel is currently mirrored into the actuators.
    pub fn is_listening(&self) -> bool {
        lock(&self.listener).is_some()
    }

    /// Receiver bumped on every state change.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.shared.revision.subscribe()
    }

    /// Fetch the mode from the backend.
    ///
    /// On failure the controller stays in `Loading` and rejects commands
    /// with [`Error::ModeUnknown`].
    pub async fn load(&self) -> Result<Mode> {
        let mode = self.backend.fetch_mode(&self.cell_id).await.inspect_err(|e| {
            warn!("Failed to fetch mode for cell {}: {}", self.cell_id, e);
        })?;
        self.shared.update(|state| state.mode = ModeState::Ready(mode));
        self.sync_listener(mode);
        debug!("Cell {} is in {} mode", self.cell_id, mode);
        Ok(mode)
    }

    /// Ask the backend to switch to `mode` and mirror it once confirmed.
    ///
    /// Returns `false` if the cell was already in `mode`.
    pub async fn set_mode(&self, mode: Mode) -> Result<bool> {
        let current = self.mode().ok_or(Error::ModeUnknown)?;
        if current == mode {
            return Ok(false);
        }
        self.backend
            .update_mode(&self.cell_id, mode)
            .await
            .inspect_err(|e| warn!("Failed to switch cell {} to {}: {}", self.cell_id, mode, e))?;
        self.shared.update(|state| state.mode = ModeState::Ready(mode));
        self.sync_listener(mode);
        info!("Cell {} switched to {} mode", self.cell_id, mode);
        Ok(true)
    }

    /// Switch to the opposite mode. Returns the new mode.
    pub async fn toggle_mode(&self) -> Result<Mode> {
        let target = self.mode().ok_or(Error::ModeUnknown)?.toggled();
        self.set_mode(target).await?;
        Ok(target)
    }

    /// Flip one actuator. Returns its new position.
    pub async fn toggle(&self, actuator: Actuator) -> Result<Switch> {
        let target = self.actuators().get(actuator).toggled();
        self.set_actuator(actuator, target).await?;
        Ok(target)
    }

    /// Send a command setting `actuator` to `switch`.
    ///
    /// The payload carries all four actuators with only `actuator` changed.
    /// The displayed state is updated only after the backend accepts it.
    pub async fn set_actuator(&self, actuator: Actuator, switch: Switch) -> Result<()> {
        let payload = self.begin_command(actuator, switch)?;
        debug!("Cell {}: {} → {} ({:?})", self.cell_id, actuator, switch, payload);

        match self.backend.send_command(&self.cell_id, &payload).await {
            Ok(()) => {
                let committed = self.shared.update(|state| {
                    if state.mode != ModeState::Ready(Mode::Manual) {
                        state
                            .commands
                            .insert(actuator, CommandState::Overridden { attempted: switch });
                        return false;
                    }
                    state.actuators.set(actuator, switch);
                    state.commands.insert(actuator, CommandState::Committed(switch));
                    true
                });
                if !committed {
                    debug!(
                        "Cell {}: {} acknowledged after leaving Manual mode",
                        self.cell_id, actuator
                    );
                }
                Ok(())
            }
            Err(e) => {
                warn!("Command {} {} for cell {} failed: {}", actuator, switch, self.cell_id, e);
                self.shared.update(|state| {
                    state.commands.insert(
                        actuator,
                        CommandState::RolledBack {
                            attempted: switch,
                            error: e.to_string(),
                        },
                    );
                });
                Err(e)
            }
        }
    }

    fn begin_command(&self, actuator: Actuator, switch: Switch) -> Result<CommandPayload> {
        self.shared.update(|state| {
            match state.mode {
                ModeState::Loading => return Err(Error::ModeUnknown),
                ModeState::Ready(Mode::Automatic) => {
                    return Err(Error::ModeLocked {
                        mode: Mode::Automatic,
                    });
                }
                ModeState::Ready(Mode::Manual) => {}
            }
            if state.commands.get(&actuator).is_some_and(CommandState::is_pending) {
                return Err(Error::CommandInFlight { actuator });
            }
            state
                .commands
                .insert(actuator, CommandState::Pending { target: switch });
            Ok(CommandPayload::for_change(&state.actuators, actuator, switch))
        })
    }

    /// Attach the live listener in Automatic mode, detach it otherwise.
    /// At most one listener exists per controller.
    fn sync_listener(&self, mode: Mode) {
        let mut listener = lock(&self.listener);
        match (mode, listener.is_some()) {
            (Mode::Automatic, false) => {
                let cell_id = self.cell_id.clone();
                let shared = Arc::clone(&self.shared);
                let id = self.channel.on_metric(move |event| {
                    if !event.concerns(&cell_id) {
                        return;
                    }
                    let mirrored = ActuatorState::from_live(&event.metric);
                    shared.update(|state| {
                        if state.mode == ModeState::Ready(Mode::Automatic) {
                            state.actuators = mirrored;
                        }
                    });
                });
                *listener = Some(id);
            }
            (Mode::Manual, true) => {
                if let Some(id) = listener.take() {
                    self.channel.off_metric(id);
                }
            }
            _ => {}
        }
    }

    /// Stop mirroring the live channel.
    pub fn close(&self) {
        if let Some(id) = lock(&self.listener).take() {
            self.channel.off_metric(id);
        }
    }
}

impl<B: CellBackend> Drop for CommandController<B> {
    fn drop(&mut self) {
        if let Some(id) = lock(&self.listener).take() {
            self.channel.off_metric(id);
        }
    }
}
