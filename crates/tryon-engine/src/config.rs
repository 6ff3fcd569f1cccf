use std::path::PathBuf;
use std::time::Duration;
use tryon_core::body_parts::BODY_PARTS_MODEL_FILE;
use tryon_core::face_mesh::FACE_MODEL_FILE;
use tryon_core::hand::HAND_MODEL_FILE;
use tryon_core::selfie::SELFIE_MODEL_FILE;

/// Fastest frame rate honored; above it the budget would round to zero.
pub const MAX_TARGET_FPS: u32 = 1000;

/// Engine configuration, loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    pub camera_width: u32,
    pub camera_height: u32,
    /// Frames per second the driver aims for; sets the frame budget.
    pub target_fps: u32,
    /// Box blur radius in pixels applied to hair masks. 0 disables feathering.
    pub blur_radius: u32,
    /// Hair mask alpha at or below this is left untouched.
    pub mask_threshold: u8,
    /// Nail beds at or below this confidence are not drawn.
    pub min_nail_confidence: f32,
    /// Frames of history per finger for nail smoothing.
    pub smoothing_window: usize,
    /// Where `capture` writes PNG files.
    pub capture_dir: PathBuf,
    /// Continuous detection failure before the status flips to not-detected.
    pub not_detected_after: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Config {
    /// Load configuration from `TRYON_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let model_dir = lookup("TRYON_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(tryon_core::default_model_dir);

        let capture_dir = lookup("TRYON_CAPTURE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                lookup("XDG_DATA_HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| {
                        let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
                        PathBuf::from(home).join(".local/share")
                    })
                    .join("tryon")
                    .join("captures")
            });

        Self {
            model_dir,
            camera_device: lookup("TRYON_CAMERA_DEVICE")
                .unwrap_or_else(|| "/dev/video0".to_string()),
            camera_width: parse(&lookup, "TRYON_CAMERA_WIDTH", 640),
            camera_height: parse(&lookup, "TRYON_CAMERA_HEIGHT", 480),
            target_fps: parse(&lookup, "TRYON_TARGET_FPS", 30).clamp(1, MAX_TARGET_FPS),
            blur_radius: parse(&lookup, "TRYON_BLUR_RADIUS", 5),
            mask_threshold: parse(&lookup, "TRYON_MASK_THRESHOLD", 10),
            min_nail_confidence: parse(&lookup, "TRYON_MIN_NAIL_CONFIDENCE", 0.3),
            smoothing_window: parse(&lookup, "TRYON_SMOOTHING_WINDOW", 5).max(1),
            capture_dir,
            not_detected_after: Duration::from_millis(parse(
                &lookup,
                "TRYON_NOT_DETECTED_AFTER_MS",
                3000,
            )),
        }
    }

    /// Minimum spacing between started frames. Never zero.
    pub fn frame_budget(&self) -> Duration {
        let fps = u64::from(self.target_fps.clamp(1, MAX_TARGET_FPS));
        Duration::from_millis((1000 / fps).max(1))
    }

    pub fn hand_model_path(&self) -> PathBuf {
        self.model_dir.join(HAND_MODEL_FILE)
    }

    pub fn face_model_path(&self) -> PathBuf {
        self.model_dir.join(FACE_MODEL_FILE)
    }

    pub fn selfie_model_path(&self) -> PathBuf {
        self.model_dir.join(SELFIE_MODEL_FILE)
    }

    pub fn body_parts_model_path(&self) -> PathBuf {
        self.model_dir.join(BODY_PARTS_MODEL_FILE)
    }
}

fn parse<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_with(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_with(&[("HOME", "/home/ada")]);
        assert_eq!(config.camera_device, "/dev/video0");
        assert_eq!(config.frame_budget(), Duration::from_millis(33));
        assert_eq!(config.blur_radius, 5);
        assert_eq!(config.mask_threshold, 10);
        assert_eq!(config.smoothing_window, 5);
        assert_eq!(config.not_detected_after, Duration::from_secs(3));
        assert_eq!(
            config.capture_dir,
            PathBuf::from("/home/ada/.local/share/tryon/captures")
        );
    }

    #[test]
    fn test_fps_above_a_thousand_keeps_a_nonzero_budget() {
        let config = config_with(&[("TRYON_TARGET_FPS", "2000")]);
        assert_eq!(config.target_fps, MAX_TARGET_FPS);
        assert_eq!(config.frame_budget(), Duration::from_millis(1));

        let built = Config {
            target_fps: u32::MAX,
            ..config
        };
        assert_eq!(built.frame_budget(), Duration::from_millis(1));
    }

    #[test]
    fn test_overrides_and_bad_values() {
        let config = config_with(&[
            ("TRYON_MODEL_DIR", "/opt/models"),
            ("TRYON_TARGET_FPS", "0"),
            ("TRYON_BLUR_RADIUS", "not-a-number"),
            ("TRYON_MIN_NAIL_CONFIDENCE", " 0.5 "),
            ("TRYON_MASK_THRESHOLD", "300"),
        ]);
        assert_eq!(config.target_fps, 1);
        assert_eq!(config.blur_radius, 5);
        assert_eq!(config.min_nail_confidence, 0.5);
        // Out of range for u8 falls back to the default.
        assert_eq!(config.mask_threshold, 10);
        assert_eq!(
            config.hand_model_path(),
            PathBuf::from("/opt/models/hand_landmark.onnx")
        );
    }
}
