use std::{
    thread,
    time::{Duration, Instant},
};

use clap::Parser;
use env_logger::Env;
use log::{debug, error, info, warn};
use tether_agent::TetherAgentOptionsBuilder;

use tether_visitor_analytics::{
    backend_config::load_config_from_file,
    backends::select_backend,
    systems::{Systems, TickOutcome},
    tether_interface::{
        encode_and_send, handle_control_message, handle_frame_message, handle_save_message,
        publish_poll_outcome, publish_status, Inputs, Outputs,
    },
};

mod cli;
use cli::Cli;

fn main() {
    let cli = Cli::parse();

    // Initialize the logger from the environment

    env_logger::Builder::from_env(Env::default().default_filter_or(&cli.log_level))
        .filter_module("paho_mqtt", log::LevelFilter::Warn)
        .filter_module("tether_agent", log::LevelFilter::Warn)
        .filter_module("ureq", log::LevelFilter::Warn)
        .init();

    debug!("Started; args: {:?}", cli);

    let mut tether_agent = TetherAgentOptionsBuilder::new(&cli.agent_role)
        .id(Some(&cli.agent_group))
        .host(Some(&cli.tether_host.to_string()))
        .username(cli.tether_username.as_deref())
        .password(cli.tether_password.as_deref())
        .build()
        .expect("failed to init and/or connect Tether Agent");

    let outputs = Outputs::new(&mut tether_agent).expect("failed to create output channels");
    let inputs = Inputs::new(&mut tether_agent).expect("failed to create input channels");

    let mut config = load_config_from_file(&cli.config_path).expect("failed to load config");
    if let Some(target_fps) = cli.target_fps {
        info!("Target FPS overridden from CLI: {}", target_fps);
        config.target_fps = target_fps;
        config.validate().expect("invalid --targetFps");
    }

    // Always publish on first start/load...
    encode_and_send(&tether_agent, &outputs.config_output, &config)
        .expect("failed to publish config");

    let backend = select_backend(&config).expect("failed to create perception backend");
    let mut systems =
        Systems::new(&config, backend, Instant::now()).expect("failed to start systems");

    let mut last_status_published = Instant::now();
    let mut capture_was_unavailable = false;

    loop {
        let mut work_done = false;
        let mut status_dirty = false;

        if let Some((topic, payload)) = tether_agent.check_messages() {
            work_done = true;

            if inputs.frames_input.matches(&topic) {
                if let Err(e) = handle_frame_message(&payload, &mut systems, &tether_agent, &outputs)
                {
                    error!("Failed to handle frame message: {}", e);
                }
            }

            if inputs.control_input.matches(&topic) {
                match handle_control_message(&payload, &mut systems) {
                    Ok(changed) => status_dirty |= changed,
                    Err(e) => warn!("{}", e),
                }
            }

            if inputs.reset_camera_input.matches(&topic) {
                systems.reset_camera(Instant::now());
                status_dirty = true;
            }

            if inputs.request_status_input.matches(&topic) {
                status_dirty = true;
            }

            if inputs.save_config_input.matches(&topic) {
                match handle_save_message(
                    &payload,
                    &mut config,
                    &mut systems,
                    &tether_agent,
                    &outputs,
                    &cli.config_path,
                ) {
                    Ok(()) => status_dirty = true,
                    Err(e) => error!("Config failed to update and save: {}", e),
                }
            }
        }

        let now = Instant::now();

        let tick_outcome = systems.tick(now);

        // Only worth a fresh status on the transition
        let capture_unavailable = matches!(tick_outcome, TickOutcome::CaptureUnavailable(_));
        if capture_unavailable != capture_was_unavailable {
            capture_was_unavailable = capture_unavailable;
            status_dirty = true;
        }

        match tick_outcome {
            TickOutcome::Idle | TickOutcome::CaptureUnavailable(_) => {}
            TickOutcome::Submitted(ticket) => {
                work_done = true;
                debug!("Frame submitted (generation {})", ticket.generation);
            }
            TickOutcome::Rejected(e) => {
                work_done = true;
                debug!("Tick rejected frame: {}", e);
            }
        }

        if let Some(outcome) = systems.poll(now) {
            work_done = true;
            if let Err(e) = publish_poll_outcome(&outcome, &tether_agent, &outputs) {
                error!("Failed to publish frame outcome: {}", e);
            }
        }

        if status_dirty || last_status_published.elapsed() >= config.status_interval() {
            work_done = true;
            if let Err(e) = publish_status(&tether_agent, &outputs, &systems) {
                error!("Failed to publish status: {}", e);
            }
            last_status_published = Instant::now();
        }

        if !work_done {
            thread::sleep(Duration::from_millis(1));
        }
    }
}
