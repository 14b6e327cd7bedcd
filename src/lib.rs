pub mod camera;
pub mod detector;
pub mod error;
pub mod geometry_utils;
pub mod pipeline;
pub mod scene;
pub mod session_config;
pub mod systems;
pub mod tracking;
