use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::anyhow;
use clap::Parser;
use env_logger::Env;
use log::{debug, info, warn};

use fingertip_counter::camera::{FrameSource, SyntheticFrameSource};
use fingertip_counter::detector::ScriptedDetector;
use fingertip_counter::error::PipelineError;
use fingertip_counter::pipeline::{FramePipeline, SceneActor, UiMessage};
use fingertip_counter::scene::HeadlessScene;
use fingertip_counter::session_config::load_config_from_file;
use fingertip_counter::systems::interaction::InteractionMode;

use cli::Cli;
use recording::Recording;

mod cli;
mod recording;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize the logger from the environment

    env_logger::Builder::from_env(Env::default().default_filter_or(&cli.log_level)).init();

    debug!("Started; args: {:?}", cli);

    let mut config = load_config_from_file(&cli.config_path)?;
    if cli.raycast_drag {
        config.interaction_mode = InteractionMode::RaycastDrag;
    }
    config.validate()?;
    if cli.save_config {
        config.write_config_to_file(&cli.config_path)?;
    }

    let recording = Recording::load(&cli.recording_path)?;
    let interval = Duration::from_millis(cli.frame_interval_ms);

    let mut source =
        SyntheticFrameSource::new(config.video_format, recording.frames.len(), interval)
            .block_when_busy(cli.block_when_busy);
    let run_options = config.resolve_run_options(source.supports_person_segmentation());

    let detector = ScriptedDetector::new(recording.landmark_script());
    let (pipeline, ui_messages) = FramePipeline::start(&config, source.pixel_format(), detector)?;

    let scene = HeadlessScene::counter_scene(recording.viewport, recording.button);
    let actor = SceneActor::new(&config, scene)?;
    pipeline.update_viewport(recording.viewport);

    let frames = pipeline.frame_sender();
    let camera = thread::spawn(move || source.run(&run_options, frames));

    let ui = pipeline.ui_sender();
    let gestures = recording.gestures();
    let view = thread::spawn(move || {
        for (tap, drag) in gestures {
            if let Some(point) = drag {
                let _ = ui.send(UiMessage::Drag(point));
            }
            if tap {
                let _ = ui.send(UiMessage::Tap);
            }
            thread::sleep(interval);
        }
    });

    // Wait for the camera and view to finish, then let the pipeline drain;
    // meanwhile this thread acts as the render thread
    let supervisor = thread::spawn(move || finish_replay(camera, view, pipeline));

    let actor = actor.run(ui_messages)?;

    supervisor
        .join()
        .map_err(|_| anyhow!("supervisor thread panicked"))??;

    let interaction = actor.interaction();
    info!(
        "Replay finished: count = {}, state = {:?}, label = {:?}",
        interaction.count(),
        interaction.state(),
        actor.surface().text_of(&config.entities.label)
    );
    if let Some(pointer) = actor.surface().entity(interaction.entities().pointer) {
        info!("Pointer entity at {:?}", pointer.position());
    }

    Ok(())
}

/// Join the producers, then shut the pipeline down. A worker failure is
/// reported ahead of the camera's, which only sees the queue disconnect.
fn finish_replay(
    camera: JoinHandle<Result<(), PipelineError>>,
    view: JoinHandle<()>,
    pipeline: FramePipeline,
) -> anyhow::Result<()> {
    let camera_result = camera.join();
    if view.join().is_err() {
        warn!("View gesture thread panicked");
    }
    pipeline.shutdown()?;
    match camera_result {
        Ok(result) => Ok(result?),
        Err(_) => Err(anyhow!("camera thread panicked")),
    }
}
