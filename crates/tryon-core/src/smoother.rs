//! Weighted moving-average smoothing of nail beds across frames.

use crate::types::{NailBed, Point};
use std::collections::{HashMap, VecDeque};
use std::f32::consts::TAU;

pub const DEFAULT_HISTORY: usize = 5;

/// Per-finger bounded history; newer samples weigh more (oldest 1, newest N).
pub struct NailBedSmoother {
    capacity: usize,
    history: HashMap<String, VecDeque<NailBed>>,
}

impl NailBedSmoother {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            history: HashMap::new(),
        }
    }

    /// Record `latest` under `key` and return the weighted average of the window.
    ///
    /// The finger type always comes from `latest`. Rotations are averaged on
    /// the branch nearest `latest.rotation`, so a finger jittering across the
    /// ±π seam does not average to the opposite direction.
    pub fn smooth(&mut self, key: &str, latest: NailBed) -> NailBed {
        let capacity = self.capacity;
        let window = self
            .history
            .entry(key.to_string())
            .or_insert_with(|| VecDeque::with_capacity(capacity));
        if window.len() >= capacity {
            window.pop_front();
        }
        window.push_back(latest);

        let mut total = 0.0f32;
        let mut acc = NailBed {
            center: Point::default(),
            width: 0.0,
            height: 0.0,
            rotation: 0.0,
            curvature: 0.0,
            finger: latest.finger,
            confidence: 0.0,
        };
        for (i, bed) in window.iter().enumerate() {
            let weight = (i + 1) as f32;
            total += weight;
            acc.center.x += bed.center.x * weight;
            acc.center.y += bed.center.y * weight;
            acc.width += bed.width * weight;
            acc.height += bed.height * weight;
            acc.rotation += unwrap_near(bed.rotation, latest.rotation) * weight;
            acc.curvature += bed.curvature * weight;
            acc.confidence += bed.confidence * weight;
        }

        NailBed {
            center: Point::new(acc.center.x / total, acc.center.y / total),
            width: acc.width / total,
            height: acc.height / total,
            rotation: acc.rotation / total,
            curvature: acc.curvature / total,
            finger: latest.finger,
            confidence: acc.confidence / total,
        }
    }

    /// Drop every finger's history.
    pub fn clear(&mut self) {
        self.history.clear();
    }

    pub fn history_len(&self, key: &str) -> usize {
        self.history.get(key).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

/// `angle` shifted by whole turns to lie within π of `reference`.
fn unwrap_near(angle: f32, reference: f32) -> f32 {
    angle + ((reference - angle) / TAU).round() * TAU
}

impl Default for NailBedSmoother {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY)
    }
}
