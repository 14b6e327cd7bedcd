pub mod interaction;
pub mod position_remapping;
pub mod smoothing;
