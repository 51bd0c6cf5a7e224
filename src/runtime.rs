// Single-writer request loop
// All pose, reset, config, state and link requests go through one task that owns the
// controller, so serial command sequences never interleave.

use std::time::Duration;
use tokio::time::interval;
use tracing::{info, warn};

// local imports
use crate::config::{
    ArmConfig, LOOP_HZ, TOPIC_CMD_CONFIG, TOPIC_CMD_LINK, TOPIC_CMD_POSE, TOPIC_CMD_RESET,
    TOPIC_CMD_STATE, TOPIC_ERROR, TOPIC_HEALTH, TOPIC_STATE_POSE,
};
use crate::controller::Controller;
use crate::messages::{
    ConfigUpdate, ErrorReply, HealthReply, LinkCommand, PoseUpdate, ReplyStatus, StateReply,
    TransitionReport,
};

/// A decoded request from one of the command topics
#[derive(Debug, Clone, PartialEq)]
pub enum ArmRequest {
    SetPose(PoseUpdate),
    Reset,
    /// Report the current pose without moving
    QueryState,
    Configure(ConfigUpdate),
    Link(LinkCommand),
}

impl ArmRequest {
    /// Decode a payload by the topic it arrived on
    pub fn parse(topic: &str, payload: &[u8]) -> Result<Self, String> {
        match topic {
            TOPIC_CMD_POSE => serde_json::from_slice(payload)
                .map(ArmRequest::SetPose)
                .map_err(|e| format!("Invalid pose update: {}", e)),
            TOPIC_CMD_RESET => Ok(ArmRequest::Reset),
            TOPIC_CMD_STATE => Ok(ArmRequest::QueryState),
            TOPIC_CMD_CONFIG => serde_json::from_slice(payload)
                .map(ArmRequest::Configure)
                .map_err(|e| format!("Invalid config update: {}", e)),
            TOPIC_CMD_LINK => serde_json::from_slice(payload)
                .map(ArmRequest::Link)
                .map_err(|e| format!("Invalid link command: {}", e)),
            other => Err(format!("Unknown topic: {}", other)),
        }
    }
}

/// What to publish after handling a request
#[derive(Debug, Clone)]
pub enum Reply {
    State(StateReply),
    Health(HealthReply),
    Error(ErrorReply),
}

pub struct Runtime {
    controller: Controller,
}

impl Runtime {
    pub fn new(controller: Controller) -> Self {
        Self { controller }
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    /// Apply one request to the controller
    pub fn handle(&mut self, request: ArmRequest) -> Reply {
        info!("Received request: {:?}", &request);
        match request {
            ArmRequest::SetPose(update) => {
                let outcomes = self.controller.set_pose(&update);
                self.state_reply(outcomes)
            }
            ArmRequest::Reset => {
                let outcomes = self.controller.reset();
                self.state_reply(outcomes)
            }
            ArmRequest::QueryState => self.state_reply(TransitionReport::default()),
            ArmRequest::Configure(update) => match self.controller.apply_config(&update) {
                Ok(()) => self.state_reply(TransitionReport::default()),
                Err(e) => {
                    warn!("Rejected config update: {}", e);
                    error_reply(e.to_string())
                }
            },
            ArmRequest::Link(LinkCommand::Connect) => {
                if !self.controller.connect() {
                    warn!("Connect request failed");
                }
                Reply::Health(self.health())
            }
            ArmRequest::Link(LinkCommand::Disconnect) => {
                self.controller.disconnect();
                Reply::Health(self.health())
            }
        }
    }

    pub fn health(&self) -> HealthReply {
        HealthReply {
            status: ReplyStatus::Healthy,
            message: "Robot control runtime is running".to_string(),
            connected: self.controller.is_connected(),
            hardware_enabled: self.controller.config().hardware_enabled,
        }
    }

    fn state_reply(&self, outcomes: TransitionReport) -> Reply {
        Reply::State(StateReply {
            status: ReplyStatus::Success,
            state: self.controller.pose(),
            outcomes,
        })
    }
}

pub fn error_reply(message: String) -> Reply {
    Reply::Error(ErrorReply {
        status: ReplyStatus::Error,
        message,
    })
}

pub async fn run(config: ArmConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let controller = Controller::new(config)?;
    let mut runtime = Runtime::new(controller);

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let sub_pose = session.declare_subscriber(TOPIC_CMD_POSE).await?;
    let sub_reset = session.declare_subscriber(TOPIC_CMD_RESET).await?;
    let sub_config = session.declare_subscriber(TOPIC_CMD_CONFIG).await?;
    let sub_link = session.declare_subscriber(TOPIC_CMD_LINK).await?;
    let sub_state = session.declare_subscriber(TOPIC_CMD_STATE).await?;
    let pub_state = session.declare_publisher(TOPIC_STATE_POSE).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;
    let pub_error = session.declare_publisher(TOPIC_ERROR).await?;

    let subscribers = [
        (TOPIC_CMD_POSE, &sub_pose),
        (TOPIC_CMD_RESET, &sub_reset),
        (TOPIC_CMD_CONFIG, &sub_config),
        (TOPIC_CMD_LINK, &sub_link),
        (TOPIC_CMD_STATE, &sub_state),
    ];

    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));

    {
        let config = runtime.controller().config();
        info!(
            "Runtime started: {}Hz loop, port {} @ {} baud, feedrate {}, hardware {}",
            LOOP_HZ,
            config.port,
            config.baudrate,
            config.feedrate,
            if config.hardware_enabled { "enabled" } else { "disabled" }
        );
    }
    info!(
        "Subscribed to: {}, {}, {}, {}, {}",
        TOPIC_CMD_POSE, TOPIC_CMD_RESET, TOPIC_CMD_CONFIG, TOPIC_CMD_LINK, TOPIC_CMD_STATE
    );
    info!("Publishing to: {}, {}, {}", TOPIC_STATE_POSE, TOPIC_HEALTH, TOPIC_ERROR);

    // one signal future for the whole loop, so a ctrl-c during a transition is not lost
    let mut ctrl_c = std::pin::pin!(tokio::signal::ctrl_c());

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = &mut ctrl_c => {
                info!("Shutting down");
                break;
            }
        }

        // 1. Drain pending requests (non-blocking), in topic order
        let mut requests = Vec::new();
        for (topic, subscriber) in &subscribers {
            while let Ok(Some(sample)) = subscriber.try_recv() {
                let payload = sample.payload().to_bytes();
                requests.push(ArmRequest::parse(topic, &payload));
            }
        }

        // 2. Apply each one; serial I/O blocks this worker until it finishes
        for request in requests {
            let reply = match request {
                Ok(request) => tokio::task::block_in_place(|| runtime.handle(request)),
                Err(message) => {
                    warn!("{}", message);
                    error_reply(message)
                }
            };

            match reply {
                Reply::State(state) => pub_state.put(serde_json::to_string(&state)?).await?,
                Reply::Health(health) => pub_health.put(serde_json::to_string(&health)?).await?,
                Reply::Error(error) => pub_error.put(serde_json::to_string(&error)?).await?,
            }
        }

        // 3. Publish health
        let health_json = serde_json::to_string(&runtime.health())?;
        pub_health.put(health_json).await?;
    }

    runtime.controller.disconnect();
    Ok(())
}
