//! Picture-in-picture position shared between input handling and the render loop
//!
//! Both percentages live in one atomic word so a reader never sees an x from
//! one drag event paired with a y from another.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Bottom-right corner
pub const DEFAULT_PERCENT: f32 = 100.0;

#[derive(Debug, Clone)]
pub struct PipPosition {
    packed: Arc<AtomicU64>,
}

impl PipPosition {
    pub fn new() -> Self {
        Self::at(DEFAULT_PERCENT, DEFAULT_PERCENT)
    }

    pub fn at(x_percent: f32, y_percent: f32) -> Self {
        Self {
            packed: Arc::new(AtomicU64::new(pack(x_percent, y_percent))),
        }
    }

    /// Store a new position; out-of-range input is clamped into [0, 100]
    pub fn set(&self, x_percent: f32, y_percent: f32) {
        self.packed
            .store(pack(x_percent, y_percent), Ordering::Release);
    }

    pub fn get(&self) -> (f32, f32) {
        unpack(self.packed.load(Ordering::Acquire))
    }
}

impl Default for PipPosition {
    fn default() -> Self {
        Self::new()
    }
}

pub fn clamp_percent(value: f32) -> f32 {
    if value.is_nan() {
        DEFAULT_PERCENT
    } else {
        value.clamp(0.0, 100.0)
    }
}

fn pack(x: f32, y: f32) -> u64 {
    let x = clamp_percent(x).to_bits() as u64;
    let y = clamp_percent(y).to_bits() as u64;
    (x << 32) | y
}

fn unpack(packed: u64) -> (f32, f32) {
    let x = f32::from_bits((packed >> 32) as u32);
    let y = f32::from_bits(packed as u32);
    (x, y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_bottom_right() {
        assert_eq!(PipPosition::new().get(), (100.0, 100.0));
    }

    #[test]
    fn test_out_of_range_is_clamped() {
        let pip = PipPosition::new();
        pip.set(-40.0, 250.0);
        assert_eq!(pip.get(), (0.0, 100.0));

        pip.set(f32::NAN, f32::NEG_INFINITY);
        assert_eq!(pip.get(), (100.0, 0.0));

        pip.set(f32::INFINITY, 12.5);
        assert_eq!(pip.get(), (100.0, 12.5));
    }

    #[test]
    fn test_clones_share_state() {
        let ui = PipPosition::new();
        let render_loop = ui.clone();
        ui.set(25.0, 75.0);
        assert_eq!(render_loop.get(), (25.0, 75.0));
    }
}
