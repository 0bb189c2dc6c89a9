//! Where each source lands on the canvas

use crate::compositor::CompositorConfig;
use crate::frame::Rect;
use crate::pip::clamp_percent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// No active source: solid background
    Blank,
    /// Camera alone, full frame
    CameraOnly,
    /// Screen alone, full frame
    ScreenOnly,
    /// Screen full frame with the camera in a bordered overlay
    ScreenWithPip { pip: Rect },
}

/// PIP size for a camera of the given resolution
pub fn pip_size(config: &CompositorConfig, camera_width: u32, camera_height: u32) -> (u32, u32) {
    let scale = config.pip_scale.clamp(0.05, 1.0);
    let max_height = (config.height / 2).max(1);
    let mut width = ((config.width as f32 * scale).round() as u32).max(1);
    let mut height = if camera_width == 0 {
        max_height
    } else {
        ((width as u64 * camera_height as u64) / camera_width as u64) as u32
    };

    if height > max_height {
        // keep the camera aspect when the height cap applies
        height = max_height;
        if camera_height > 0 {
            width = ((height as u64 * camera_width as u64) / camera_height as u64) as u32;
        }
    }
    (width.clamp(1, config.width.max(1)), height.max(1))
}

/// Room the PIP can move on one axis between the two paddings
fn travel(canvas: u32, pip: u32, padding: u32) -> u32 {
    canvas.saturating_sub(pip.saturating_add(padding.saturating_mul(2)))
}

fn axis_offset(canvas: u32, pip: u32, padding: u32, percent: f32) -> u32 {
    let step = (travel(canvas, pip, padding) as f32 * clamp_percent(percent) / 100.0).round() as u32;
    let offset = padding.saturating_add(step);
    offset.min(canvas.saturating_sub(pip))
}

/// PIP rectangle for a position; always inside the canvas
pub fn pip_rect(config: &CompositorConfig, pip_width: u32, pip_height: u32, position: (f32, f32)) -> Rect {
    let width = pip_width.min(config.width);
    let height = pip_height.min(config.height);
    Rect::new(
        axis_offset(config.width, width, config.padding, position.0),
        axis_offset(config.height, height, config.padding, position.1),
        width,
        height,
    )
}

fn axis_percent(pointer: f32, canvas: u32, pip: u32, padding: u32) -> f32 {
    let travel = travel(canvas, pip, padding);
    if travel == 0 {
        return 0.0;
    }
    let offset = pointer - pip as f32 / 2.0 - padding as f32;
    clamp_percent(offset / travel as f32 * 100.0)
}

/// Position that puts the PIP centre under a pointer in canvas pixels
pub fn pointer_to_percent(
    config: &CompositorConfig,
    pip_width: u32,
    pip_height: u32,
    pointer_x: f32,
    pointer_y: f32,
) -> (f32, f32) {
    (
        axis_percent(pointer_x, config.width, pip_width, config.padding),
        axis_percent(pointer_y, config.height, pip_height, config.padding),
    )
}

/// Choose the layout from which sources have a frame this tick
pub fn compute_layout(
    config: &CompositorConfig,
    screen_active: bool,
    camera: Option<(u32, u32)>,
    position: (f32, f32),
) -> Layout {
    match (screen_active, camera) {
        (true, Some((cam_w, cam_h))) => {
            let (w, h) = pip_size(config, cam_w, cam_h);
            Layout::ScreenWithPip {
                pip: pip_rect(config, w, h, position),
            }
        }
        (true, None) => Layout::ScreenOnly,
        (false, Some(_)) => Layout::CameraOnly,
        (false, None) => Layout::Blank,
    }
}
