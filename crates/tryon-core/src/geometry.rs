//! Nail bed derivation from hand landmarks.

use crate::types::{FingerType, HandSkeleton, Landmark, NailBed, Point};
use std::f32::consts::{FRAC_PI_2, PI};

/// Landmark indices per finger: base, first joint, second joint, tip.
pub const FINGER_LANDMARKS: [[usize; 4]; 5] = [
    [1, 2, 3, 4],
    [5, 6, 7, 8],
    [9, 10, 11, 12],
    [13, 14, 15, 16],
    [17, 18, 19, 20],
];

const NAIL_WIDTH_RATIO: f32 = 0.75;
const NAIL_HEIGHT_RATIO: f32 = 0.5;
const THUMB_HEIGHT_RATIO: f32 = 0.45;
/// Position of the nail center along the last segment, from the joint.
const NAIL_CENTER_RATIO: f32 = 0.7;
const MAX_DEPTH_PENALTY: f32 = 0.5;
const TILT_MIN: f32 = 0.5;

/// Derive the nail bed of one finger in canvas pixels.
///
/// `finger_index` 0 is the thumb, 4 the pinky; larger values clamp to the pinky.
/// Degenerate landmarks (coincident joints) never produce NaN or infinite fields.
pub fn calculate_nail_bed(
    hand: &HandSkeleton,
    finger_index: usize,
    frame_width: u32,
    frame_height: u32,
) -> NailBed {
    let finger = FingerType::from_index(finger_index);
    let [_, joint1, joint2, tip] = FINGER_LANDMARKS[finger.index()];
    let joint1 = &hand.landmarks[joint1];
    let joint2 = &hand.landmarks[joint2];
    let tip = &hand.landmarks[tip];

    let (w, h) = (frame_width as f32, frame_height as f32);
    let tip_px = tip.to_pixel(w, h);
    let joint_px = joint2.to_pixel(w, h);

    let dir_x = tip_px.x - joint_px.x;
    let dir_y = tip_px.y - joint_px.y;
    let rotation = dir_y.atan2(dir_x) + FRAC_PI_2;
    let segment = (dir_x * dir_x + dir_y * dir_y).sqrt();

    let height_ratio = if finger == FingerType::Thumb {
        THUMB_HEIGHT_RATIO
    } else {
        NAIL_HEIGHT_RATIO
    };

    let center = Point::new(
        joint_px.x + dir_x * NAIL_CENTER_RATIO,
        joint_px.y + dir_y * NAIL_CENTER_RATIO,
    );

    let curvature = finger_bend(joint1, joint2, tip).abs() / PI;

    let visibility = tip.visibility.unwrap_or(1.0);
    let confidence = visibility * (1.0 - tip.z.abs().min(MAX_DEPTH_PENALTY));

    NailBed {
        center,
        width: segment * NAIL_WIDTH_RATIO,
        height: segment * height_ratio,
        rotation,
        curvature,
        finger,
        confidence: finite_or_zero(confidence),
    }
}

/// Angle in radians between the segments `a→b` and `b→c`, 0 when either
/// segment has zero length.
pub fn finger_bend(a: &Landmark, b: &Landmark, c: &Landmark) -> f32 {
    let (v1x, v1y) = (b.x - a.x, b.y - a.y);
    let (v2x, v2y) = (c.x - b.x, c.y - b.y);
    let mag = (v1x * v1x + v1y * v1y).sqrt() * (v2x * v2x + v2y * v2y).sqrt();
    if mag.is_nan() || mag <= f32::EPSILON {
        return 0.0;
    }
    let cos = ((v1x * v2x + v1y * v2y) / mag).clamp(-1.0, 1.0);
    cos.acos()
}

/// Foreshorten a nail bed by the hand's tilt, estimated from wrist depth.
pub fn apply_perspective_correction(nail: &NailBed, hand: &HandSkeleton) -> NailBed {
    let tilt = finite_or_zero(1.0 - hand.wrist().z.abs() * 0.5).clamp(TILT_MIN, 1.0);
    NailBed {
        width: nail.width * tilt,
        height: nail.height * (0.8 + 0.2 * tilt),
        ..*nail
    }
}

/// All five perspective-corrected nail beds of one hand.
pub fn nail_beds_for_hand(hand: &HandSkeleton, frame_width: u32, frame_height: u32) -> Vec<NailBed> {
    (0..FingerType::ALL.len())
        .map(|i| {
            let bed = calculate_nail_bed(hand, i, frame_width, frame_height);
            apply_perspective_correction(&bed, hand)
        })
        .collect()
}

/// Smoothing key for a finger of a hand, e.g. `"Left_1"`.
pub fn finger_key(hand: &HandSkeleton, finger: FingerType) -> String {
    format!("{}_{}", hand.handedness, finger.index())
}

fn finite_or_zero(v: f32) -> f32 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Handedness;

    /// Open right hand, fingers pointing straight up, all in one plane.
    fn upright_hand() -> HandSkeleton {
        let mut landmarks = [Landmark::default(); 21];
        landmarks[0] = Landmark::new(0.5, 0.9, 0.0);
        for (f, quad) in FINGER_LANDMARKS.iter().enumerate() {
            let x = 0.3 + 0.1 * f as f32;
            for (j, &idx) in quad.iter().enumerate() {
                landmarks[idx] = Landmark::new(x, 0.7 - 0.1 * j as f32, 0.0);
            }
        }
        HandSkeleton {
            landmarks,
            handedness: Handedness::Right,
            confidence: 0.9,
        }
    }

    #[test]
    fn test_upright_index_finger() {
        let hand = upright_hand();
        let bed = calculate_nail_bed(&hand, 1, 100, 100);
        // Joint at y=50, tip at y=40: segment length 10 px.
        assert!(bed.rotation.abs() < 1e-5);
        assert!((bed.width - 7.5).abs() < 1e-4);
        assert!((bed.height - 5.0).abs() < 1e-4);
        assert!((bed.center.x - 40.0).abs() < 1e-4);
        assert!((bed.center.y - 43.0).abs() < 1e-4);
        assert!(bed.curvature.abs() < 1e-3);
        assert!((bed.confidence - 1.0).abs() < 1e-6);
        assert_eq!(bed.finger, FingerType::Index);
    }

    #[test]
    fn test_thumb_is_shorter() {
        let hand = upright_hand();
        let bed = calculate_nail_bed(&hand, 0, 100, 100);
        assert!((bed.height - 4.5).abs() < 1e-4);
    }

    #[test]
    fn test_pointing_right_rotates_quarter_turn() {
        let mut hand = upright_hand();
        hand.landmarks[7] = Landmark::new(0.5, 0.5, 0.0);
        hand.landmarks[8] = Landmark::new(0.6, 0.5, 0.0);
        let bed = calculate_nail_bed(&hand, 1, 100, 100);
        assert!((bed.rotation - FRAC_PI_2).abs() < 1e-5);
    }

    #[test]
    fn test_left_pointing_finger_smooths_along_axis() {
        use crate::smoother::NailBedSmoother;

        let mut smoother = NailBedSmoother::default();
        let mut out = None;
        for dy in [0.0001, -0.0001, 0.0001, -0.0001] {
            let mut hand = upright_hand();
            hand.landmarks[7] = Landmark::new(0.5, 0.5, 0.0);
            hand.landmarks[8] = Landmark::new(0.4, 0.5 + dy, 0.0);
            let bed = calculate_nail_bed(&hand, 1, 640, 480);
            out = Some(smoother.smooth(&finger_key(&hand, bed.finger), bed));
        }
        let rotation = out.unwrap().rotation;
        // Pointing left is -π/2 (or 3π/2): the nail's sine must stay near -1.
        assert!(rotation.sin() < -0.999, "rotation {rotation}");
    }

    #[test]
    fn test_nail_bed_is_deterministic() {
        let hand = upright_hand();
        for i in 0..5 {
            assert_eq!(
                calculate_nail_bed(&hand, i, 640, 480),
                calculate_nail_bed(&hand, i, 640, 480)
            );
        }
    }

    #[test]
    fn test_degenerate_finger_is_finite() {
        let mut hand = upright_hand();
        for idx in FINGER_LANDMARKS[2] {
            hand.landmarks[idx] = Landmark::new(0.5, 0.5, 0.0);
        }
        let bed = calculate_nail_bed(&hand, 2, 100, 100);
        for v in [
            bed.center.x,
            bed.center.y,
            bed.width,
            bed.height,
            bed.rotation,
            bed.curvature,
            bed.confidence,
        ] {
            assert!(v.is_finite());
        }
        assert_eq!(bed.width, 0.0);
        assert_eq!(bed.curvature, 0.0);
        assert_eq!(bed.rotation, FRAC_PI_2);
    }

    #[test]
    fn test_bend_right_angle() {
        let a = Landmark::new(0.0, 0.0, 0.0);
        let b = Landmark::new(1.0, 0.0, 0.0);
        let c = Landmark::new(1.0, 1.0, 0.0);
        assert!((finger_bend(&a, &b, &c) - FRAC_PI_2).abs() < 1e-5);
    }

    #[test]
    fn test_confidence_depth_penalty() {
        let mut hand = upright_hand();
        hand.landmarks[8].z = -0.2;
        hand.landmarks[8].visibility = Some(0.5);
        let bed = calculate_nail_bed(&hand, 1, 100, 100);
        assert!((bed.confidence - 0.4).abs() < 1e-5);

        hand.landmarks[8].z = 3.0;
        let bed = calculate_nail_bed(&hand, 1, 100, 100);
        assert!((bed.confidence - 0.25).abs() < 1e-5);
    }

    #[test]
    fn test_perspective_correction() {
        let mut hand = upright_hand();
        hand.landmarks[0].z = 0.4;
        let bed = calculate_nail_bed(&hand, 1, 100, 100);
        let corrected = apply_perspective_correction(&bed, &hand);
        // tilt = 0.8
        assert!((corrected.width - bed.width * 0.8).abs() < 1e-5);
        assert!((corrected.height - bed.height * 0.96).abs() < 1e-5);
        assert_eq!(corrected.center, bed.center);
    }

    #[test]
    fn test_perspective_tilt_is_clamped() {
        let mut hand = upright_hand();
        hand.landmarks[0].z = -5.0;
        let bed = calculate_nail_bed(&hand, 1, 100, 100);
        let corrected = apply_perspective_correction(&bed, &hand);
        assert!((corrected.width - bed.width * 0.5).abs() < 1e-5);
        assert!((corrected.height - bed.height * 0.9).abs() < 1e-5);
    }

    #[test]
    fn test_finger_key() {
        let hand = upright_hand();
        assert_eq!(finger_key(&hand, FingerType::Ring), "Right_3");
        assert_eq!(nail_beds_for_hand(&hand, 100, 100).len(), 5);
    }
}
