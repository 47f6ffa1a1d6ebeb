use signet_core::OutputSize;
use std::path::PathBuf;

/// CLI configuration, loaded from environment variables.
pub struct Config {
    /// V4L2 device path for the front (selfie) camera.
    pub front_device: String,
    /// V4L2 device path for the back (document) camera.
    pub back_device: String,
    /// Path to the SQLite session-metadata database.
    pub db_path: PathBuf,
    /// Aligned face output side (112 or 224).
    pub output_size: OutputSize,
}

impl Config {
    /// Load configuration from `SIGNET_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("signet");

        let db_path = std::env::var("SIGNET_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("sessions.db"));

        let output_size = match std::env::var("SIGNET_OUTPUT_SIZE").as_deref() {
            Ok("224") => OutputSize::Px224,
            _ => OutputSize::Px112,
        };

        Self {
            front_device: std::env::var("SIGNET_FRONT_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            back_device: std::env::var("SIGNET_BACK_DEVICE")
                .unwrap_or_else(|_| "/dev/video1".to_string()),
            db_path,
            output_size,
        }
    }
}
