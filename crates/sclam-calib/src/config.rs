//! YAML parameter file.
//!
//! ```yaml
//! general:
//!   use_viso: false
//!   data_folder: /data/run_01
//!   use_closed_form: true
//!   init_x: 0.25
//!   init_y: 0.0
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sclam_lie::Pose2D;

/// Stereo VO frame timestamps, one per line.
pub const VO_TIMES_FILE: &str = "votimes.txt";
/// Wheel odometry log.
pub const ODOMETRY_FILE: &str = "newodom.txt";
/// Precomputed camera trajectory, one 4x4 pose per VO frame.
pub const CAMERA_TRAJECTORY_FILE: &str = "CameraTrajectory.txt";

/// Errors raised while loading the parameter file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("failed to read parameter file: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid YAML or misses a required key
    #[error("failed to parse parameter file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Full calibration configuration loaded from YAML
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// General settings
    pub general: GeneralSection,
}

/// The `general` section of the parameter file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GeneralSection {
    /// Run the live stereo VO engine instead of reading `CameraTrajectory.txt`
    pub use_viso: bool,

    /// Folder holding the logs
    pub data_folder: PathBuf,

    /// Also run the closed form solver
    pub use_closed_form: bool,

    /// Initial x offset of the stereo rig in the robot frame (meters)
    pub init_x: f64,

    /// Initial y offset of the stereo rig in the robot frame (meters)
    pub init_y: f64,

    /// Levenberg-Marquardt iteration cap
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Largest accepted gap between the iterative and closed form estimates
    #[serde(default = "default_agreement_tolerance")]
    pub agreement_tolerance: f64,

    /// Smallest singular value ratio the closed form solver accepts
    #[serde(default = "default_condition_tolerance")]
    pub condition_tolerance: f64,
}

fn default_max_iterations() -> usize {
    10
}

fn default_agreement_tolerance() -> f64 {
    0.05
}

fn default_condition_tolerance() -> f64 {
    1e-8
}

impl CalibrationConfig {
    /// Load configuration from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Initial offset `(init_x, init_y, 0)`.
    pub fn init_offset(&self) -> Pose2D {
        Pose2D::from_xytheta(self.general.init_x, self.general.init_y, 0.0)
    }

    /// Path of the VO timestamp list.
    pub fn vo_times_path(&self) -> PathBuf {
        self.general.data_folder.join(VO_TIMES_FILE)
    }

    /// Path of the wheel odometry log.
    pub fn odometry_path(&self) -> PathBuf {
        self.general.data_folder.join(ODOMETRY_FILE)
    }

    /// Path of the precomputed camera trajectory.
    pub fn camera_trajectory_path(&self) -> PathBuf {
        self.general.data_folder.join(CAMERA_TRAJECTORY_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARAMS: &str = "\
general:
  use_viso: false
  data_folder: /data/run_01
  use_closed_form: true
  init_x: 0.25
  init_y: -0.5
";

    #[test]
    fn test_parse_with_defaults() {
        let config = CalibrationConfig::from_yaml(PARAMS).unwrap();
        assert!(!config.general.use_viso);
        assert!(config.general.use_closed_form);
        assert_eq!(config.general.init_x, 0.25);
        assert_eq!(config.general.init_y, -0.5);
        assert_eq!(config.general.max_iterations, 10);
        assert_eq!(config.general.agreement_tolerance, 0.05);
        assert_eq!(config.general.condition_tolerance, 1e-8);
        assert_eq!(
            config.odometry_path(),
            PathBuf::from("/data/run_01/newodom.txt")
        );
        assert_eq!(
            config.vo_times_path(),
            PathBuf::from("/data/run_01/votimes.txt")
        );
        assert_eq!(
            config.camera_trajectory_path(),
            PathBuf::from("/data/run_01/CameraTrajectory.txt")
        );
        assert_eq!(config.init_offset().to_vector(), [0.25, -0.5, 0.0]);
    }

    #[test]
    fn test_overrides() {
        let yaml = format!(
            "{PARAMS}  max_iterations: 25\n  agreement_tolerance: 0.01\n  condition_tolerance: 1.0e-6\n"
        );
        let config = CalibrationConfig::from_yaml(&yaml).unwrap();
        assert_eq!(config.general.max_iterations, 25);
        assert_eq!(config.general.agreement_tolerance, 0.01);
        assert_eq!(config.general.condition_tolerance, 1e-6);
    }

    #[test]
    fn test_missing_key_fails() {
        let yaml = "general:\n  use_viso: false\n";
        assert!(matches!(
            CalibrationConfig::from_yaml(yaml),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = CalibrationConfig::from_yaml(PARAMS).unwrap();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed = CalibrationConfig::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.general.data_folder, config.general.data_folder);
        assert_eq!(parsed.general.init_x, config.general.init_x);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            CalibrationConfig::load("/definitely/not/here/params.yaml"),
            Err(ConfigError::Io(_))
        ));
    }
}
