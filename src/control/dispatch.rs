// Routes intake messages to the current session
//
// `controller` attaches (and pre-empts), `release` detaches, everything else
// goes to the running session's command queue.

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::arbiter::ControllerArbiter;
use super::controllers::controller_for;
use super::session::{Session, SessionExit};
use crate::config::RobotConfig;
use crate::error::{ConfigError, HalError};
use crate::messages::{ControlMessage, ControllerKind, StatusReport};
use crate::sensors::SensorHandle;

struct ActiveSession {
    kind: ControllerKind,
    commands: mpsc::Sender<ControlMessage>,
    task: JoinHandle<SessionExit>,
}

pub struct Dispatcher {
    arbiter: ControllerArbiter,
    config: RobotConfig,
    sensors: SensorHandle,
    status: watch::Sender<StatusReport>,
    active: Option<ActiveSession>,
}

impl Dispatcher {
    pub fn new(
        arbiter: ControllerArbiter,
        config: RobotConfig,
        sensors: SensorHandle,
        status: watch::Sender<StatusReport>,
    ) -> Self {
        Self {
            arbiter,
            config,
            sensors,
            status,
            active: None,
        }
    }

    /// Kind of the running session, if any
    pub fn active(&self) -> Option<ControllerKind> {
        self.active.as_ref().map(|s| s.kind)
    }

    pub fn dispatch(&mut self, msg: ControlMessage) -> Result<(), ConfigError> {
        match msg {
            ControlMessage::Controller { kind } => self.attach(kind),
            ControlMessage::Release => {
                if let Err(e) = self.detach() {
                    warn!("Failed to stop motors on release: {}", e);
                }
                Ok(())
            }
            msg => {
                self.forward(msg);
                Ok(())
            }
        }
    }

    /// Start a session of `kind`, superseding the running one
    pub fn attach(&mut self, kind: ControllerKind) -> Result<(), ConfigError> {
        if self.active() == Some(kind) {
            debug!("Session {} already active", kind.as_str());
            return Ok(());
        }
        let controller = controller_for(kind, &self.config)?;

        let (tx, rx) = mpsc::channel(self.config.scheduler.command_queue);
        let handle = self.arbiter.attach(kind);
        if let Some(old) = self.active.take() {
            // Already superseded by the token; abort so it cannot linger
            old.task.abort();
        }

        let task = Session::new(
            handle,
            controller,
            rx,
            self.sensors.clone(),
            self.status.clone(),
            self.config.scheduler,
        )
        .spawn();

        self.active = Some(ActiveSession {
            kind,
            commands: tx,
            task,
        });
        Ok(())
    }

    /// End the running session. Motors are stopped before this returns.
    pub fn detach(&mut self) -> Result<(), HalError> {
        let Some(active) = self.active.take() else {
            debug!("Release with no active session");
            return Ok(());
        };
        let result = self.arbiter.revoke().map(|_| ());
        active.task.abort();
        self.status.send_replace(StatusReport::idle());
        result
    }

    /// Clear a session whose loop has ended on its own
    pub fn reap(&mut self) {
        if self.active.as_ref().is_some_and(|s| s.task.is_finished()) {
            if let Some(ended) = self.active.take() {
                info!("Session {} ended", ended.kind.as_str());
                self.status.send_replace(StatusReport::idle());
            }
        }
    }

    fn forward(&mut self, msg: ControlMessage) {
        let Some(active) = &self.active else {
            debug!("No active session, dropping {:?}", msg);
            return;
        };
        let kind = active.kind;
        match active.commands.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(msg)) => {
                warn!("Session {} queue full, dropping {:?}", kind.as_str(), msg)
            }
            Err(TrySendError::Closed(_)) => self.reap(),
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        if let Err(e) = self.detach() {
            warn!("Failed to stop motors on shutdown: {}", e);
        }
    }
}
