// Keyboard teleop: WASD drive, R/F speed, 1-6 switch controller, SPACE stop, Q quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use raspbot_runtime::config::TOPIC_CMD_CONTROL;
use raspbot_runtime::messages::{ControlMessage, ControllerKind};
use std::time::{Duration, Instant};
use tracing::info;

const SPEEDS: [f64; 3] = [40.0, 70.0, 100.0]; // speed limit, percent
const INPUT_TIMEOUT_MS: u64 = 100; // Release the stick after this much time with no input

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_CMD_CONTROL).await?;

    // Take the drive as a manual session
    send(
        &publisher,
        &ControlMessage::Controller {
            kind: ControllerKind::Manual,
        },
    )
    .await?;

    info!("Controls: WASD=drive, SPACE=stop, R/F=speed, 1-6=controller, Q=quit");
    info!("Speed: LOW");

    enable_raw_mode()?;
    let result = run_teleop(&publisher).await;
    disable_raw_mode()?;

    send(&publisher, &ControlMessage::Release).await?;
    result
}

async fn send(
    publisher: &zenoh::pubsub::Publisher<'_>,
    msg: &ControlMessage,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    publisher.put(serde_json::to_string(msg)?).await?;
    Ok(())
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;

    // Stick position
    let mut throttle = 0.0;
    let mut steering = 0.0;
    let mut last_movement_input = Instant::now();

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    KeyCode::Char('w') if pressed => {
                        throttle = 1.0;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        throttle = -1.0;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('a') if pressed => {
                        steering = -1.0;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('d') if pressed => {
                        steering = 1.0;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char(' ') if pressed => {
                        throttle = 0.0;
                        steering = 0.0;
                        send(publisher, &ControlMessage::Stop).await?;
                    }

                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(2);
                        print_speed(speed_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        print_speed(speed_idx);
                    }

                    KeyCode::Char(c @ '1'..='6') if pressed => {
                        let kind = controller_key(c);
                        info!("Controller: {}", kind.as_str());
                        send(publisher, &ControlMessage::Controller { kind }).await?;
                    }

                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            throttle = 0.0;
            steering = 0.0;
        }

        // Always publish at ~50Hz so the watchdog stays fed
        let msg = ControlMessage::Move {
            throttle,
            steering,
            speed: SPEEDS[speed_idx],
        };
        send(publisher, &msg).await?;
    }

    Ok(())
}

fn controller_key(c: char) -> ControllerKind {
    match c {
        '2' => ControllerKind::Avoid,
        '3' => ControllerKind::Autopilot,
        '4' => ControllerKind::Tracking,
        '5' => ControllerKind::Recognition,
        '6' => ControllerKind::Qr,
        _ => ControllerKind::Manual,
    }
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {}", label);
}
