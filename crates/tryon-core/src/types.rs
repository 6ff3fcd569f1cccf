use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Number of landmarks in a hand skeleton.
pub const HAND_LANDMARK_COUNT: usize = 21;
/// Number of landmarks in a face mesh.
pub const FACE_MESH_LANDMARK_COUNT: usize = 468;

/// Frame timestamp in milliseconds since the start of a video stream.
///
/// Detectors key their per-frame results on this value, so it must be strictly
/// increasing within one stream. Use [`FrameClock`] to produce it.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Timestamp(pub f64);

impl Timestamp {
    pub fn as_millis(self) -> f64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}ms", self.0)
    }
}

/// Produces strictly increasing [`Timestamp`]s from a monotonic clock.
pub struct FrameClock {
    origin: Instant,
    last: Option<f64>,
}

/// Bump applied when two clock reads land on the same value.
const CLOCK_EPSILON_MS: f64 = 0.001;

impl FrameClock {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(origin: Instant) -> Self {
        Self { origin, last: None }
    }

    /// Timestamp for the current instant.
    pub fn next(&mut self) -> Timestamp {
        self.at(Instant::now())
    }

    /// Timestamp for `instant`, never less than or equal to the previous one.
    pub fn at(&mut self, instant: Instant) -> Timestamp {
        let now = instant.saturating_duration_since(self.origin).as_secs_f64() * 1000.0;
        let value = match self.last {
            Some(prev) if now <= prev => prev + CLOCK_EPSILON_MS,
            _ => now,
        };
        self.last = Some(value);
        Timestamp(value)
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

/// A 2D point in canvas pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A detected keypoint, `x`/`y` normalized to [0, 1] relative to the frame.
///
/// `z` is relative depth in roughly the same scale as `x`; negative values are
/// closer to the camera.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub visibility: Option<f32>,
}

impl Landmark {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z, visibility: None }
    }

    /// Position in canvas pixels.
    pub fn to_pixel(&self, width: f32, height: f32) -> Point {
        Point::new(self.x * width, self.y * height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Handedness {
    Left,
    Right,
}

impl fmt::Display for Handedness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handedness::Left => f.write_str("Left"),
            Handedness::Right => f.write_str("Right"),
        }
    }
}

/// 21 hand landmarks in MediaPipe order: wrist, then thumb CMC..tip, then
/// MCP..tip for index, middle, ring and pinky.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandSkeleton {
    pub landmarks: [Landmark; HAND_LANDMARK_COUNT],
    pub handedness: Handedness,
    pub confidence: f32,
}

impl HandSkeleton {
    pub const WRIST: usize = 0;

    pub fn wrist(&self) -> &Landmark {
        &self.landmarks[Self::WRIST]
    }
}

/// Dense face mesh (468 landmarks) for a single face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceMesh {
    pub landmarks: Vec<Landmark>,
}

/// What a detector was looking for when it came back empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Subject {
    Hands,
    Face,
    Hair,
    Person,
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Hands => f.write_str("hands"),
            Subject::Face => f.write_str("face"),
            Subject::Hair => f.write_str("hair"),
            Subject::Person => f.write_str("person"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FingerType {
    Thumb,
    Index,
    Middle,
    Ring,
    Pinky,
}

impl FingerType {
    pub const ALL: [FingerType; 5] = [
        FingerType::Thumb,
        FingerType::Index,
        FingerType::Middle,
        FingerType::Ring,
        FingerType::Pinky,
    ];

    /// Finger for a 0-based index; out-of-range indices clamp to the pinky.
    pub fn from_index(index: usize) -> Self {
        Self::ALL[index.min(Self::ALL.len() - 1)]
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Oriented rectangle where a nail is rendered, in canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NailBed {
    pub center: Point,
    pub width: f32,
    pub height: f32,
    /// Radians; 0 means the nail's tip points up.
    pub rotation: f32,
    /// Finger bend, 0 = straight, 1 = fully folded.
    pub curvature: f32,
    pub finger: FingerType,
    pub confidence: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse a hex color, falling back to `default` on malformed input.
    pub fn parse_or(hex: &str, default: Rgb) -> Rgb {
        hex_to_rgb(hex).unwrap_or(default)
    }
}

/// Parse `#RRGGBB` (leading `#` optional, case-insensitive).
pub fn hex_to_rgb(hex: &str) -> Option<Rgb> {
    let digits = hex.trim().strip_prefix('#').unwrap_or(hex.trim());
    if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
    Some(Rgb::new(channel(0)?, channel(2)?, channel(4)?))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NailPattern {
    #[default]
    Solid,
    French,
    Glitter,
    Ombre,
}

/// Nail polish render settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NailSettings {
    pub color: Rgb,
    /// 0..=1
    pub opacity: f32,
    /// 0..=1
    pub glossiness: f32,
    pub pattern: NailPattern,
}

impl NailSettings {
    pub const DEFAULT_COLOR: Rgb = Rgb::new(236, 72, 153);
}

impl Default for NailSettings {
    fn default() -> Self {
        Self {
            color: Self::DEFAULT_COLOR,
            opacity: 0.85,
            glossiness: 0.7,
            pattern: NailPattern::Solid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlendMode {
    #[default]
    SourceOver,
    Multiply,
    Screen,
    Overlay,
}

/// Hair color render settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HairSettings {
    pub color: Rgb,
    /// 0..=1
    pub opacity: f32,
    /// 0..=2, 1 leaves saturation unchanged.
    pub saturation: f32,
    /// 0..=2, 1 leaves brightness unchanged.
    pub brightness: f32,
    /// Only used by the geometric estimate; mask recoloring blends linearly.
    pub blend_mode: BlendMode,
}

impl HairSettings {
    /// Color used when a hex string fails to parse.
    pub const FALLBACK_COLOR: Rgb = Rgb::new(0, 0, 0);
}

impl Default for HairSettings {
    fn default() -> Self {
        Self {
            color: Rgb::new(139, 92, 246),
            opacity: 0.5,
            saturation: 1.0,
            brightness: 1.0,
            blend_mode: BlendMode::Multiply,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_wrist_is_landmark_zero() {
        let mut landmarks = [Landmark::new(0.5, 0.5, 0.0); HAND_LANDMARK_COUNT];
        landmarks[HandSkeleton::WRIST] = Landmark::new(0.2, 0.9, -0.1);
        let hand = HandSkeleton {
            landmarks,
            handedness: Handedness::Left,
            confidence: 1.0,
        };
        assert_eq!(*hand.wrist(), Landmark::new(0.2, 0.9, -0.1));
        assert_eq!(Point::new(1.0, 2.0), Point { x: 1.0, y: 2.0 });
    }

    #[test]
    fn test_hex_to_rgb_crimson() {
        assert_eq!(hex_to_rgb("#DC143C"), Some(Rgb::new(220, 20, 60)));
    }

    #[test]
    fn test_hex_to_rgb_without_hash_and_lowercase() {
        assert_eq!(hex_to_rgb("8b5cf6"), Some(Rgb::new(139, 92, 246)));
    }

    #[test]
    fn test_hex_to_rgb_malformed() {
        assert_eq!(hex_to_rgb("#12345"), None);
        assert_eq!(hex_to_rgb("#GGGGGG"), None);
        assert_eq!(hex_to_rgb(""), None);
        assert_eq!(
            Rgb::parse_or("nope", NailSettings::DEFAULT_COLOR),
            NailSettings::DEFAULT_COLOR
        );
    }

    #[test]
    fn test_frame_clock_strictly_increasing() {
        let origin = Instant::now();
        let mut clock = FrameClock::starting_at(origin);
        let a = clock.at(origin + Duration::from_millis(10));
        let b = clock.at(origin + Duration::from_millis(10));
        let c = clock.at(origin + Duration::from_millis(5));
        assert!(b > a);
        assert!(c > b);
        assert!((a.as_millis() - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_finger_type_from_index_clamps() {
        assert_eq!(FingerType::from_index(0), FingerType::Thumb);
        assert_eq!(FingerType::from_index(4), FingerType::Pinky);
        assert_eq!(FingerType::from_index(9), FingerType::Pinky);
    }

    #[test]
    fn test_settings_serde_names() {
        let pattern = toml::Value::try_from(NailPattern::Glitter).unwrap();
        assert_eq!(pattern.as_str(), Some("glitter"));
        let mode = toml::Value::try_from(BlendMode::SourceOver).unwrap();
        assert_eq!(mode.as_str(), Some("source-over"));
    }
}
