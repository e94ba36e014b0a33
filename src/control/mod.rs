// Control side: safety state machine, session controllers and the arbiter
// that decides which session may drive.

pub mod arbiter;
pub mod controllers;
pub mod dispatch;
pub mod line;
pub mod session;
pub mod state_machine;

pub use arbiter::{ControllerArbiter, SessionHandle};
pub use controllers::{Controller, controller_for};
pub use dispatch::Dispatcher;
pub use session::{Session, SessionExit};
pub use state_machine::{ControlState, SafetyStateMachine, TickOutput};
