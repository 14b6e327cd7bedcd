use log::{debug, info, warn};
use std::fs;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::{
    camera::RunOptions,
    scene::PlaneDetection,
    systems::{interaction::InteractionMode, smoothing::DEFAULT_SMOOTHING_RATE},
    tracking::{ImageResolution, LandmarkOrientation, INDEX_FINGER_TIP},
};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TrackingReset {
    /// Discard any existing world map when the session (re)starts
    ResetTracking,
    KeepExisting,
}

/// Names of the entities the interaction systems drive
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EntityNames {
    pub label: String,
    pub button: String,
    pub pointer: String,
}

impl Default for EntityNames {
    fn default() -> Self {
        EntityNames {
            label: String::from("label"),
            button: String::from("button"),
            pointer: String::from("pointer"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    /// Discrete press/unpress on the button, or continuous pointer
    /// placement on detected planes plus tap-to-count
    pub interaction_mode: InteractionMode,

    pub plane_detection: PlaneDetection,

    /// Only enabled if the frame source reports support for it
    pub request_person_segmentation: bool,

    pub tracking_reset: TrackingReset,

    /// Native resolution of the camera images; only the aspect ratio matters
    /// for mapping into the viewport
    pub video_format: ImageResolution,

    /// Which landmark drives the pointer
    pub fingertip_index: usize,

    pub landmark_orientation: LandmarkOrientation,

    /// Weight of each new sample in the low-pass filter
    /// (1.0 is no smoothing, 0 is invalid)
    pub smoothing_rate: f32,

    /// Also smooth the on-screen pointer used for press detection
    pub smooth_screen_pointer: bool,

    /// How many camera frames may wait for the worker before new ones are dropped
    pub frame_queue_capacity: usize,

    pub entities: EntityNames,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            interaction_mode: InteractionMode::OverlapPress,
            plane_detection: PlaneDetection::Horizontal,
            request_person_segmentation: true,
            tracking_reset: TrackingReset::ResetTracking,
            video_format: ImageResolution::new(1920, 1440),
            fingertip_index: INDEX_FINGER_TIP,
            landmark_orientation: LandmarkOrientation::RotatedPortrait,
            smoothing_rate: DEFAULT_SMOOTHING_RATE,
            smooth_screen_pointer: false,
            frame_queue_capacity: 1,
            entities: EntityNames::default(),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.smoothing_rate > 0. && self.smoothing_rate <= 1.) {
            return Err(anyhow!(
                "smoothingRate must be in the range (0, 1], got {}",
                self.smoothing_rate
            ));
        }
        if self.frame_queue_capacity == 0 {
            return Err(anyhow!("frameQueueCapacity must be at least 1"));
        }
        if self.video_format.width == 0 || self.video_format.height == 0 {
            return Err(anyhow!("videoFormat must have a non-zero size"));
        }
        Ok(())
    }

    /// Session options for the frame source, given what the device can do
    pub fn resolve_run_options(&self, supports_person_segmentation: bool) -> RunOptions {
        let person_segmentation = self.request_person_segmentation && supports_person_segmentation;
        if self.request_person_segmentation && !supports_person_segmentation {
            warn!("Person segmentation requested but not supported by this frame source");
        }
        RunOptions {
            plane_detection: self.plane_detection,
            person_segmentation,
            tracking_reset: self.tracking_reset,
        }
    }

    pub fn write_config_to_file(&self, config_file_path: &str) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(config_file_path, text)
            .map_err(|e| anyhow!("Error writing config to \"{}\": {}", config_file_path, e))?;
        info!("Wrote config to file: {:?}", config_file_path);
        Ok(())
    }
}

pub fn load_config_from_file(config_file_path: &str) -> Result<SessionConfig> {
    match fs::read_to_string(config_file_path) {
        Err(e) => {
            if e.kind() == std::io::ErrorKind::NotFound {
                warn!(
                    "Session config file not found at {}; using defaults",
                    &config_file_path
                );
                Ok(SessionConfig::default())
            } else {
                Err(anyhow!(
                    "Failed to load session config from \"{}\": {}",
                    config_file_path,
                    e
                ))
            }
        }
        Ok(s) => {
            info!("Loaded session config OK from \"{}\"", config_file_path);
            match serde_json::from_str::<SessionConfig>(&s) {
                Ok(loaded_config) => {
                    debug!("Config parsed data from file: {:?}", &loaded_config);
                    Ok(loaded_config)
                }
                Err(e) => Err(anyhow!("Failed to parse config data: {}", e)),
            }
        }
    }
}
