// Zenoh bridge around the control core
//
// Commands arrive on TOPIC_CMD_CONTROL and are routed by the Dispatcher at
// DISPATCH_HZ. Sensor fusion runs as its own task. Mode/state changes go out
// on TOPIC_STATUS only when they change.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::interval;
use tracing::{info, warn};

use crate::config::{BRIDGE_BAUDRATE, DISPATCH_HZ, RobotConfig, TOPIC_CMD_CONTROL, TOPIC_STATUS};
use crate::control::{ControllerArbiter, Dispatcher};
use crate::drive::bridge::{BridgeLink, BridgeMotors, BridgeSensors};
use crate::drive::{DriveMixer, LogAlert, MotorSink, SimulatedMotors};
use crate::error::{Error, Result};
use crate::messages::{ControlMessage, StatusReport};
use crate::sensors::{NullSensors, SensorFusion, SensorHandle};

#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub config_path: PathBuf,
    /// Serial bridge device; `None` runs in simulation
    pub port: Option<String>,
    pub baudrate: u32,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("raspbot.json"),
            port: None,
            baudrate: BRIDGE_BAUDRATE,
        }
    }
}

fn transport(e: impl std::fmt::Display) -> Error {
    Error::Transport(e.to_string())
}

/// Open the hardware, or simulated stand-ins when no port is given
fn open_hardware(
    options: &RuntimeOptions,
    config: &RobotConfig,
) -> Result<(Box<dyn MotorSink>, SensorHandle)> {
    match &options.port {
        Some(port) => {
            let link = BridgeLink::open(port, options.baudrate)?;
            let sensor_link = link.try_clone()?;
            let (fusion, handle) =
                SensorFusion::new(BridgeSensors::new(sensor_link), config.fusion);
            fusion.spawn();
            info!("Motor control: ENABLED (bridge on {})", port);
            Ok((Box::new(BridgeMotors::new(link)), handle))
        }
        None => {
            warn!("No bridge port given, running in simulation");
            let (fusion, handle) = SensorFusion::new(NullSensors, config.fusion);
            fusion.spawn();
            Ok((Box::new(SimulatedMotors::new()), handle))
        }
    }
}

pub async fn run(options: RuntimeOptions) -> Result<()> {
    let config = RobotConfig::load(&options.config_path)?;
    config.validate()?;

    let (motors, sensors) = open_hardware(&options, &config)?;
    let arbiter = ControllerArbiter::new(
        DriveMixer::new(config.mixer),
        motors,
        Box::new(LogAlert::default()),
    );

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await.map_err(transport)?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session
        .declare_subscriber(TOPIC_CMD_CONTROL)
        .await
        .map_err(transport)?;
    let pub_status = session.declare_publisher(TOPIC_STATUS).await.map_err(transport)?;

    let (status_tx, mut status_rx) = watch::channel(StatusReport::idle());
    status_rx.mark_changed(); // announce the idle state once
    let mut dispatcher = Dispatcher::new(arbiter, config, sensors, status_tx);
    let mut tick = interval(Duration::from_millis(1000 / DISPATCH_HZ));

    info!("Runtime started: {}Hz dispatch", DISPATCH_HZ);
    info!("Subscribed to: {}", TOPIC_CMD_CONTROL);
    info!("Publishing to: {}", TOPIC_STATUS);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = &mut shutdown => {
                info!("Shutting down");
                break;
            }
        }

        // 1. Drain all pending commands (non-blocking), in arrival order
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match ControlMessage::parse(&payload) {
                Ok(msg) => {
                    if let Err(e) = dispatcher.dispatch(msg) {
                        warn!("Rejected controller attach: {}", e);
                    }
                }
                Err(e) => {
                    warn!("Dropping command: {}", e);
                }
            }
        }

        // 2. Notice sessions that ended by themselves
        dispatcher.reap();

        // 3. Publish status on change
        if status_rx.has_changed().unwrap_or(false) {
            let status_json = serde_json::to_string(&*status_rx.borrow_and_update())
                .map_err(transport)?;
            pub_status.put(status_json).await.map_err(transport)?;
        }
    }

    dispatcher.detach()?;
    Ok(())
}
