// Per-session control loop
//
// One tick: bounded wait for a command, supersession check, sensor snapshot,
// controller update, actuation, status, fixed delay. The SessionHandle is
// released on every exit path so the motors end stopped.

use std::time::Instant;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use super::arbiter::SessionHandle;
use super::controllers::Controller;
use super::state_machine::{Actuation, TickOutput};
use crate::config::SchedulerConfig;
use crate::error::HalError;
use crate::messages::{ControlMessage, StatusReport};
use crate::sensors::SensorHandle;

/// Result of the bounded command wait
enum Intake {
    Command(ControlMessage),
    Idle,
    Closed,
}

/// Why a session loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionExit {
    /// Another session took the drive
    Superseded,
    /// Command channel closed (detach)
    Closed,
}

pub struct Session {
    handle: SessionHandle,
    controller: Box<dyn Controller>,
    commands: mpsc::Receiver<ControlMessage>,
    sensors: SensorHandle,
    status: watch::Sender<StatusReport>,
    scheduler: SchedulerConfig,
    fault: Option<String>,
}

impl Session {
    pub fn new(
        handle: SessionHandle,
        controller: Box<dyn Controller>,
        commands: mpsc::Receiver<ControlMessage>,
        sensors: SensorHandle,
        status: watch::Sender<StatusReport>,
        scheduler: SchedulerConfig,
    ) -> Self {
        Self {
            handle,
            controller,
            commands,
            sensors,
            status,
            scheduler,
            fault: None,
        }
    }

    pub fn spawn(self) -> JoinHandle<SessionExit> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) -> SessionExit {
        let kind = self.handle.kind();
        let tick = self.scheduler.tick_for(kind);
        info!(
            "Session {} running: {}ms tick, {}ms intake wait",
            kind.as_str(),
            tick.as_millis(),
            self.scheduler.intake_timeout_ms
        );

        let exit = loop {
            // 1. Command intake (bounded wait, then drain what is queued)
            match self.intake().await {
                Intake::Command(msg) => {
                    let now = Instant::now();
                    self.controller.on_message(&msg, now);
                    while let Ok(msg) = self.commands.try_recv() {
                        self.controller.on_message(&msg, now);
                    }
                }
                Intake::Idle => {}
                Intake::Closed => break SessionExit::Closed,
            }

            // 2. Authority check
            if !self.handle.is_current() {
                break SessionExit::Superseded;
            }

            // 3. Controller update against the latest snapshot
            let snapshot = self.sensors.snapshot();
            let output = self.controller.update(Instant::now(), &snapshot);

            // 4. Actuate
            match self.apply(output) {
                Ok(true) => {}
                Ok(false) => break SessionExit::Superseded,
                Err(e) => self.on_fault(e),
            }

            // 5. Status on change
            self.publish_status();

            sleep(tick).await;
        };

        match exit {
            SessionExit::Superseded => info!("Session {} superseded", kind.as_str()),
            SessionExit::Closed => debug!("Session {} command channel closed", kind.as_str()),
        }
        if let Err(e) = self.handle.release() {
            warn!("Failed to stop motors ending {}: {}", kind.as_str(), e);
        }
        exit
    }

    async fn intake(&mut self) -> Intake {
        match timeout(self.scheduler.intake_timeout(), self.commands.recv()).await {
            Ok(Some(msg)) => Intake::Command(msg),
            Ok(None) => Intake::Closed,
            Err(_) => Intake::Idle,
        }
    }

    /// Write one tick's output. `Ok(false)` if superseded mid-tick.
    fn apply(&mut self, output: TickOutput) -> Result<bool, HalError> {
        self.handle.set_alert(output.alert);
        let written = match output.actuation {
            Actuation::Stop => self.handle.stop()?,
            Actuation::Drive(cmd) => self.handle.actuate(cmd)?.is_some(),
        };
        if written && self.fault.take().is_some() {
            info!("Motor output recovered");
        }
        Ok(written)
    }

    /// Actuator faults keep the session alive: log once, keep trying to stop
    fn on_fault(&mut self, e: HalError) {
        let reason = e.to_string();
        if self.fault.as_deref() != Some(reason.as_str()) {
            warn!("Motor write failed: {}", reason);
        }
        if let Err(e) = self.handle.stop() {
            debug!("Stop after fault also failed: {}", e);
        }
        self.fault = Some(reason);
    }

    fn publish_status(&self) {
        let mut report = self.controller.status();
        report.controller = Some(self.handle.kind());
        report.fault = self.fault.clone();

        self.status.send_if_modified(|current| {
            if *current == report {
                false
            } else {
                debug!("Status: {} / {}", report.mode, report.state);
                *current = report;
                true
            }
        });
    }
}
