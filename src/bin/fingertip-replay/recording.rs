use std::fs;

use anyhow::{anyhow, Result};
use log::info;
use serde::{Deserialize, Serialize};

use fingertip_counter::tracking::{HandLandmarks, ScreenPoint, ScreenRect, Size};

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct RecordedFrame {
    /// None when no hand was detected in this frame
    #[serde(default)]
    pub landmarks: Option<HandLandmarks>,
    #[serde(default)]
    pub tap: bool,
    #[serde(default)]
    pub drag: Option<ScreenPoint>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Recording {
    pub viewport: Size,
    /// On-screen footprint of the button entity
    pub button: ScreenRect,
    pub frames: Vec<RecordedFrame>,
}

impl Recording {
    pub fn load(path: &str) -> Result<Recording> {
        let text = fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read recording \"{}\": {}", path, e))?;
        let recording: Recording = serde_json::from_str(&text)
            .map_err(|e| anyhow!("Failed to parse recording \"{}\": {}", path, e))?;
        info!(
            "Loaded recording with {} frames from \"{}\"",
            recording.frames.len(),
            path
        );
        Ok(recording)
    }

    /// What the detector "sees", one entry per camera frame
    pub fn landmark_script(&self) -> Vec<Option<HandLandmarks>> {
        self.frames.iter().map(|f| f.landmarks.clone()).collect()
    }

    /// Gestures on the view, indexed by frame
    pub fn gestures(&self) -> Vec<(bool, Option<ScreenPoint>)> {
        self.frames.iter().map(|f| (f.tap, f.drag)).collect()
    }
}
