//! The 2D pan/zoom camera and the focus-transition filter.
//!
//! The camera maps world coordinates (the paint-group coordinate space of
//! the tree root) to normalized device coordinates. Panning moves the
//! world-space point shown at the viewport center; zooming scales world
//! units to pixels.

use std::time::Duration;

use crate::matrix::Matrix3;
use crate::rect::Rect;

#[derive(Clone, Debug)]
pub struct Camera {
    x: f32,
    y: f32,
    scale: f32,
    width: f32,
    height: f32,
}

impl Camera {
    pub fn new() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            scale: 1.0,
            width: 1.0,
            height: 1.0,
        }
    }

    /// Viewport size in pixels. Must be set before projecting.
    pub fn set_size(&mut self, width: f32, height: f32) {
        self.width = width.max(1.0);
        self.height = height.max(1.0);
    }

    /// The world-space point shown at the viewport center.
    pub fn set_origin(&mut self, x: f32, y: f32) {
        self.x = x;
        self.y = y;
    }

    pub fn set_scale(&mut self, scale: f32) {
        self.scale = scale.max(f32::MIN_POSITIVE);
    }

    pub fn x(&self) -> f32 {
        self.x
    }

    pub fn y(&self) -> f32 {
        self.y
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    /// Pan by a pixel delta (drag gesture).
    pub fn move_by(&mut self, dx_px: f32, dy_px: f32) {
        self.x -= dx_px / self.scale;
        self.y -= dy_px / self.scale;
    }

    /// Zoom by a factor while keeping the world point under the given
    /// viewport pixel stationary (scroll-wheel zoom).
    pub fn zoom_by(&mut self, factor: f32, px: f32, py: f32) {
        let (wx, wy) = self.unproject(px, py);
        self.set_scale(self.scale * factor);
        let (nx, ny) = self.unproject(px, py);
        self.x += wx - nx;
        self.y += wy - ny;
    }

    /// Viewport pixel to world point.
    pub fn unproject(&self, px: f32, py: f32) -> (f32, f32) {
        (
            self.x + (px - self.width / 2.0) / self.scale,
            self.y + (py - self.height / 2.0) / self.scale,
        )
    }

    /// World-to-NDC projection matrix.
    pub fn project(&self) -> Matrix3 {
        // world -> pixels: p = (w - origin) * scale + viewport/2
        // pixels -> NDC:   x/(w/2) - 1, 1 - y/(h/2)
        let sx = 2.0 * self.scale / self.width;
        let sy = -2.0 * self.scale / self.height;
        Matrix3 {
            data: [
                sx, 0.0, -self.x * sx, // row 0
                0.0, sy, -self.y * sy, // row 1
                0.0, 0.0, 1.0, // row 2
            ],
        }
    }

    /// The world-space rectangle currently visible.
    pub fn visible_rect(&self) -> Rect {
        let w = self.width / self.scale;
        let h = self.height / self.scale;
        Rect::new(self.x - w / 2.0, self.y - h / 2.0, w, h)
    }

    /// Visibility query used for paint-group culling.
    pub fn contains_any(&self, world_rect: &Rect) -> bool {
        self.visible_rect().intersects(world_rect)
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Hermite smoothstep over 0..=1.
pub fn smoothstep(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Animates the camera toward a focus target over a fixed duration.
///
/// Advanced with real frame deltas by the host loop; `animate` returns true
/// while the transition is still in flight so the caller keeps scheduling
/// frames.
#[derive(Clone, Debug)]
pub struct CameraFilter {
    from: (f32, f32, f32),
    target: (f32, f32, f32),
    duration: Duration,
    elapsed: Duration,
    active: bool,
}

impl CameraFilter {
    pub fn new(duration: Duration) -> Self {
        Self {
            from: (0.0, 0.0, 1.0),
            target: (0.0, 0.0, 1.0),
            duration,
            elapsed: Duration::ZERO,
            active: false,
        }
    }

    /// Begin a transition from the camera's current state to the target.
    pub fn focus(&mut self, camera: &Camera, x: f32, y: f32, scale: f32) {
        self.from = (camera.x(), camera.y(), camera.scale());
        self.target = (x, y, scale);
        self.elapsed = Duration::ZERO;
        self.active = true;
    }

    pub fn is_animating(&self) -> bool {
        self.active
    }

    /// Advance by `dt` and write the interpolated state into the camera.
    /// Returns true while more frames are needed.
    pub fn animate(&mut self, camera: &mut Camera, dt: Duration) -> bool {
        if !self.active {
            return false;
        }
        self.elapsed += dt;
        let t = if self.duration.is_zero() {
            1.0
        } else {
            (self.elapsed.as_secs_f32() / self.duration.as_secs_f32()).min(1.0)
        };
        let eased = smoothstep(t);
        camera.set_origin(
            lerp(self.from.0, self.target.0, eased),
            lerp(self.from.1, self.target.1, eased),
        );
        camera.set_scale(lerp(self.from.2, self.target.2, eased));
        if t >= 1.0 {
            self.active = false;
        }
        self.active
    }
}
