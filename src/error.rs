use thiserror::Error;

use crate::{camera::PixelFormat, scene::EntityId};

/// Failures that stop the frame pipeline. None of these are retried: a
/// pixel-format mismatch or a broken detector is a configuration bug.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("cannot convert pixel format {found:?} into {required:?}")]
    UnsupportedPixelFormat {
        found: PixelFormat,
        required: PixelFormat,
    },

    #[error("malformed pixel buffer: {0}")]
    MalformedPixelBuffer(String),

    #[error("landmark detector failed: {0}")]
    Detector(String),

    #[error("pipeline channel disconnected")]
    Disconnected,

    #[error("failed to spawn {0} thread")]
    Spawn(&'static str),

    #[error("{0} thread panicked")]
    ThreadPanicked(&'static str),
}

/// Scene lookups which the loaded scene asset is expected to satisfy
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SceneError {
    #[error("scene has no entity named \"{0}\"")]
    MissingEntity(String),

    #[error("entity \"{entity}\" has no {component} component")]
    MissingComponent {
        entity: String,
        component: &'static str,
    },

    #[error("no entity with id {0:?}")]
    UnknownEntity(EntityId),
}
