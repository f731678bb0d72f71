use std::time::Instant;

use anyhow::{anyhow, Result};
use log::{debug, error, info, warn};
use serde::Serialize;
use tether_agent::{ChannelDefinition, ChannelOptionsBuilder, TetherAgent};

use crate::{
    backend_config::BackendConfig,
    frame::{Frame, FrameMessage},
    status::FrameRejected,
    systems::{ControlMessage, PollOutcome, Systems},
};

pub struct Outputs {
    pub config_output: ChannelDefinition,
    pub status_output: ChannelDefinition,
    pub feedback_output: ChannelDefinition,
    pub frame_errors_output: ChannelDefinition,
    pub greeting_output: ChannelDefinition,
}

impl Outputs {
    pub fn new(tether_agent: &mut TetherAgent) -> Result<Outputs> {
        let config_output = ChannelOptionsBuilder::create_sender("provideConfig")
            .qos(Some(2))
            .retain(Some(true))
            .build(tether_agent)?;

        // Status snapshot, retained so late subscribers get the latest straight away
        let status_output = ChannelOptionsBuilder::create_sender("status")
            .qos(Some(1))
            .retain(Some(true))
            .build(tether_agent)?;

        // Per-frame feedback (annotations etc.)
        let feedback_output = ChannelOptionsBuilder::create_sender("frameFeedback")
            .qos(Some(0))
            .build(tether_agent)?;
        let frame_errors_output = ChannelOptionsBuilder::create_sender("frameErrors")
            .qos(Some(0))
            .build(tether_agent)?;

        // One-shot greetings must not get lost
        let greeting_output = ChannelOptionsBuilder::create_sender("newVisitor")
            .qos(Some(2))
            .build(tether_agent)?;

        Ok(Outputs {
            config_output,
            status_output,
            feedback_output,
            frame_errors_output,
            greeting_output,
        })
    }
}

pub struct Inputs {
    pub frames_input: ChannelDefinition,
    pub control_input: ChannelDefinition,
    pub reset_camera_input: ChannelDefinition,
    pub request_status_input: ChannelDefinition,
    pub save_config_input: ChannelDefinition,
}

impl Inputs {
    pub fn new(tether_agent: &mut TetherAgent) -> Result<Inputs> {
        let frames_input = ChannelOptionsBuilder::create_receiver("frames")
            .qos(Some(0))
            .build(tether_agent)?;
        let control_input = ChannelOptionsBuilder::create_receiver("control")
            .qos(Some(2))
            .build(tether_agent)?;
        let reset_camera_input = ChannelOptionsBuilder::create_receiver("resetCamera")
            .qos(Some(2))
            .build(tether_agent)?;
        let request_status_input = ChannelOptionsBuilder::create_receiver("requestStatus")
            .qos(Some(1))
            .build(tether_agent)?;
        let save_config_input = ChannelOptionsBuilder::create_receiver("saveConfig")
            .qos(Some(2))
            .build(tether_agent)?;

        Ok(Inputs {
            frames_input,
            control_input,
            reset_camera_input,
            request_status_input,
            save_config_input,
        })
    }
}

pub fn encode_and_send<T: Serialize>(
    tether_agent: &TetherAgent,
    channel: &ChannelDefinition,
    data: &T,
) -> Result<()> {
    let payload = rmp_serde::to_vec_named(data)?;
    tether_agent.send(channel, Some(&payload))?;
    Ok(())
}

pub fn publish_status(tether_agent: &TetherAgent, outputs: &Outputs, systems: &Systems) -> Result<()> {
    let snapshot = systems.status(Instant::now());
    debug!("Publish status: {:?}", snapshot);
    encode_and_send(tether_agent, &outputs.status_output, &snapshot)
}

/// Decode an incoming frame and queue it for the scheduler; frames that are
/// not what they claim to be are bounced back on the errors channel
pub fn handle_frame_message(
    payload: &[u8],
    systems: &mut Systems,
    tether_agent: &TetherAgent,
    outputs: &Outputs,
) -> Result<()> {
    let message: FrameMessage = match rmp_serde::from_slice(payload) {
        Ok(m) => m,
        Err(e) => {
            return reject_frame(tether_agent, outputs, format!("undecodable frame message: {e}"));
        }
    };
    match Frame::from_message(message, Instant::now()) {
        Ok(frame) => {
            systems.push_frame(frame);
            Ok(())
        }
        Err(e) => reject_frame(tether_agent, outputs, e.to_string()),
    }
}

fn reject_frame(tether_agent: &TetherAgent, outputs: &Outputs, reason: String) -> Result<()> {
    warn!("Rejected frame: {}", reason);
    encode_and_send(
        tether_agent,
        &outputs.frame_errors_output,
        &FrameRejected { reason },
    )
}

/// Returns true if the state changed, so that a fresh status can go out
pub fn handle_control_message(payload: &[u8], systems: &mut Systems) -> Result<bool> {
    match rmp_serde::from_slice::<ControlMessage>(payload) {
        Ok(ControlMessage { command }) => {
            info!("Control command: {:?}", command);
            Ok(systems.handle_control(command))
        }
        Err(e) => Err(anyhow!("Failed to parse control message: {}", e)),
    }
}

pub fn handle_save_message(
    payload: &[u8],
    config: &mut BackendConfig,
    systems: &mut Systems,
    tether_agent: &TetherAgent,
    outputs: &Outputs,
    config_file_path: &str,
) -> Result<()> {
    let previous_model_url = config.model_url.clone();
    match config.parse_remote_config(payload) {
        Ok(()) => {
            info!("Remote-provided config parsed OK; apply, save to disk and (re) publish");
            if config.model_url != previous_model_url {
                warn!("modelUrl changes only take effect after a restart");
            }
            systems.apply_config(config);
            config.save_and_republish(tether_agent, &outputs.config_output, config_file_path)
        }
        Err(e) => Err(anyhow!("Handle save-message failure: {e}")),
    }
}

pub fn publish_poll_outcome(
    outcome: &PollOutcome,
    tether_agent: &TetherAgent,
    outputs: &Outputs,
) -> Result<()> {
    match outcome {
        PollOutcome::Applied(applied) => {
            encode_and_send(tether_agent, &outputs.feedback_output, &applied.feedback)?;
            for greeting in applied.greetings.iter() {
                encode_and_send(tether_agent, &outputs.greeting_output, greeting)?;
            }
            Ok(())
        }
        PollOutcome::Discarded => Ok(()),
        PollOutcome::Failed(e) => {
            error!("Inference failed; frame dropped: {}", e);
            Ok(())
        }
    }
}
