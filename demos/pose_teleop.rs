// Keyboard teleop: A/D rotate, W/S elevate, E/Q extend, O/P pinch, 0 reset, Esc quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::Duration;
use tracing::{info, warn};

use arm_zenoh_runtime::config::{
    TOPIC_CMD_POSE, TOPIC_CMD_RESET, TOPIC_CMD_STATE, TOPIC_STATE_POSE,
};
use arm_zenoh_runtime::messages::{Pose, PoseUpdate, StateReply};

const ROTATE_STEP: f64 = 15.0; // degrees
const ELEVATE_STEP: f64 = 10.0; // degrees
const PERCENT_STEP: f64 = 10.0; // extend / pinch
const STATE_WAIT: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let pub_pose = session.declare_publisher(TOPIC_CMD_POSE).await?;
    let pub_reset = session.declare_publisher(TOPIC_CMD_RESET).await?;

    // Start from wherever the runtime thinks the arm is
    let sub_state = session.declare_subscriber(TOPIC_STATE_POSE).await?;
    session.put(TOPIC_CMD_STATE, "{}").await?;
    let start = match tokio::time::timeout(STATE_WAIT, sub_state.recv_async()).await {
        Ok(Ok(sample)) => {
            let reply: StateReply = serde_json::from_slice(&sample.payload().to_bytes())?;
            reply.state
        }
        _ => {
            warn!("No state reply from runtime, assuming zero pose");
            Pose::ZERO
        }
    };
    info!("Current pose: {:?}", start);

    info!("Controls: A/D=rotate, W/S=elevate, E/Q=extend, O/P=pinch, 0=reset, Esc=quit");

    enable_raw_mode()?;
    let result = run_teleop(start, &pub_pose, &pub_reset).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    start: Pose,
    pub_pose: &zenoh::pubsub::Publisher<'_>,
    pub_reset: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Local copy of the target, clamped to the ranges the UI allows
    let mut pose = start;

    loop {
        if !event::poll(Duration::from_millis(50))? {
            continue;
        }
        let Event::Key(KeyEvent { code, kind, .. }) = event::read()? else {
            continue;
        };
        if kind != KeyEventKind::Press {
            continue;
        }

        let before = pose;
        match code {
            KeyCode::Char('a') => pose.rotate = (pose.rotate - ROTATE_STEP).max(-180.0),
            KeyCode::Char('d') => pose.rotate = (pose.rotate + ROTATE_STEP).min(180.0),
            KeyCode::Char('s') => pose.elevate = (pose.elevate - ELEVATE_STEP).max(-90.0),
            KeyCode::Char('w') => pose.elevate = (pose.elevate + ELEVATE_STEP).min(90.0),
            KeyCode::Char('q') => pose.extend = (pose.extend - PERCENT_STEP).max(0.0),
            KeyCode::Char('e') => pose.extend = (pose.extend + PERCENT_STEP).min(100.0),
            KeyCode::Char('o') => pose.pinch = (pose.pinch - PERCENT_STEP).max(0.0),
            KeyCode::Char('p') => pose.pinch = (pose.pinch + PERCENT_STEP).min(100.0),
            KeyCode::Char('0') => {
                pose = Pose::ZERO;
                pub_reset.put("{}").await?;
                info!("Reset");
                continue;
            }
            KeyCode::Esc => break,
            _ => {}
        }

        if pose != before {
            let update = PoseUpdate::from(pose);
            pub_pose.put(serde_json::to_string(&update)?).await?;
            info!("Target: {:?}", pose);
        }
    }

    Ok(())
}
