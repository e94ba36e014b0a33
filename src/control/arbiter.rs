// Single-owner gate in front of the drive
//
// Every attach bumps a shared token. A session may only drive while its
// handle's token is the current one; attaching a new kind revokes the old
// session on the spot and stops the motors before the new one starts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};

use crate::drive::{AlertSink, DriveCommand, DriveMixer, MotorSink, WheelPower};
use crate::error::HalError;
use crate::messages::ControllerKind;

/// Token value meaning no session holds the drive
const NO_SESSION: u64 = 0;

/// Drive hardware owned by the arbiter
struct Actuator {
    mixer: DriveMixer,
    motors: Box<dyn MotorSink>,
    alert: Box<dyn AlertSink>,
    owner: Option<ControllerKind>,
}

impl Actuator {
    fn halt(&mut self) -> Result<(), HalError> {
        self.alert.set_alert(false);
        self.motors.stop()
    }
}

impl Drop for Actuator {
    fn drop(&mut self) {
        if let Err(e) = self.halt() {
            warn!("Failed to stop motors on shutdown: {}", e);
        }
    }
}

struct Shared {
    token: AtomicU64,
    next: AtomicU64,
    actuator: Mutex<Actuator>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Actuator> {
        // Poisoning is ignored; the actuator has no multi-step invariants
        self.actuator.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_current(&self, token: u64) -> bool {
        self.token.load(Ordering::Acquire) == token
    }
}

/// Admits at most one driving session at a time
#[derive(Clone)]
pub struct ControllerArbiter {
    shared: Arc<Shared>,
}

impl ControllerArbiter {
    pub fn new(mixer: DriveMixer, motors: Box<dyn MotorSink>, alert: Box<dyn AlertSink>) -> Self {
        Self {
            shared: Arc::new(Shared {
                token: AtomicU64::new(NO_SESSION),
                next: AtomicU64::new(NO_SESSION + 1),
                actuator: Mutex::new(Actuator {
                    mixer,
                    motors,
                    alert,
                    owner: None,
                }),
            }),
        }
    }

    /// Start a session of `kind`, superseding whichever session held the
    /// drive. Motors are stopped before the new handle is returned.
    pub fn attach(&self, kind: ControllerKind) -> SessionHandle {
        let token = self.shared.next.fetch_add(1, Ordering::Relaxed);
        let mut actuator = self.shared.lock();
        self.shared.token.store(token, Ordering::Release);

        match actuator.owner.replace(kind) {
            Some(prev) => info!("Session {} supersedes {}", kind.as_str(), prev.as_str()),
            None => info!("Session {} attached", kind.as_str()),
        }
        if let Err(e) = actuator.halt() {
            warn!("Failed to stop motors on attach: {}", e);
        }

        SessionHandle {
            token,
            kind,
            shared: Arc::clone(&self.shared),
            released: false,
        }
    }

    /// Revoke whichever session holds the drive and stop the motors.
    /// Returns the kind that was revoked.
    pub fn revoke(&self) -> Result<Option<ControllerKind>, HalError> {
        let mut actuator = self.shared.lock();
        self.shared.token.store(NO_SESSION, Ordering::Release);
        let prev = actuator.owner.take();
        if let Some(kind) = prev {
            info!("Session {} detached", kind.as_str());
        }
        actuator.halt()?;
        Ok(prev)
    }

    /// Kind of the session currently holding the drive
    pub fn current(&self) -> Option<ControllerKind> {
        self.shared.lock().owner
    }
}

/// Authority to drive, valid until superseded or released. Dropping the
/// handle releases it, so every exit path of a session leaves the motors
/// stopped.
pub struct SessionHandle {
    token: u64,
    kind: ControllerKind,
    shared: Arc<Shared>,
    released: bool,
}

impl SessionHandle {
    pub fn kind(&self) -> ControllerKind {
        self.kind
    }

    pub fn is_current(&self) -> bool {
        self.shared.is_current(self.token)
    }

    /// Mix and write one drive command. `Ok(None)` means the session has
    /// been superseded and nothing was written.
    pub fn actuate(&self, cmd: DriveCommand) -> Result<Option<WheelPower>, HalError> {
        let mut actuator = self.shared.lock();
        if !self.shared.is_current(self.token) {
            return Ok(None);
        }
        let power = actuator.mixer.mix(cmd);
        actuator.motors.set_wheel_power(power)?;
        Ok(Some(power))
    }

    /// Stop the motors. `Ok(false)` if superseded.
    pub fn stop(&self) -> Result<bool, HalError> {
        let mut actuator = self.shared.lock();
        if !self.shared.is_current(self.token) {
            return Ok(false);
        }
        actuator.motors.stop()?;
        Ok(true)
    }

    pub fn set_alert(&self, on: bool) {
        let mut actuator = self.shared.lock();
        if self.shared.is_current(self.token) {
            actuator.alert.set_alert(on);
        }
    }

    /// Give up the drive. Stops the motors if this session still held it.
    pub fn release(mut self) -> Result<(), HalError> {
        self.finish()
    }

    fn finish(&mut self) -> Result<(), HalError> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let mut actuator = self.shared.lock();
        if self
            .shared
            .token
            .compare_exchange(self.token, NO_SESSION, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // Superseded: whoever took over already stopped the motors
            return Ok(());
        }
        actuator.owner = None;
        info!("Session {} released", self.kind.as_str());
        actuator.halt()
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            warn!("Failed to stop motors releasing {}: {}", self.kind.as_str(), e);
        }
    }
}
