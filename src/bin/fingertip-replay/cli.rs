use clap::Parser;

// Some defaults; some of which can be overriden via CLI args
const CONFIG_FILE_PATH: &str = "./session.json";
const RECORDING_FILE_PATH: &str = "./recording.json";
const FRAME_INTERVAL_MS: u64 = 33;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Where to load the session config
    #[arg(long = "sessionConfigPath", default_value_t = String::from(CONFIG_FILE_PATH))]
    pub config_path: String,

    /// Recorded landmark frames (and gestures) to replay
    #[arg(long = "recordingPath", default_value_t = String::from(RECORDING_FILE_PATH))]
    pub recording_path: String,

    /// Use continuous pointer placement + tap counting, regardless of the config
    #[arg(long = "interaction.raycastDrag")]
    pub raycast_drag: bool,

    /// Milliseconds between synthetic camera frames
    #[arg(long = "frameInterval", default_value_t = FRAME_INTERVAL_MS)]
    pub frame_interval_ms: u64,

    /// By default, frames arriving while the worker is busy are dropped;
    /// enable (use) this flag to make the camera wait instead
    #[arg(long = "blockWhenBusy")]
    pub block_when_busy: bool,

    /// Write the effective config back to the config path before running
    #[arg(long = "saveConfig")]
    pub save_config: bool,

    #[arg(long = "loglevel", default_value_t = String::from("info"))]
    pub log_level: String,
}
