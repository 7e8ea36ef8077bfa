//! Camera model and the `FrameSource` trait for image-capture hardware.
//!
//! [`CameraModel`] is the coarse pinhole model used by the localization
//! pipeline: given a pixel and the forward distance to the target plane it
//! returns the lateral/vertical offset of that pixel in meters.  The visible
//! extent of the image at distance `d` is `±d·tan(fov/2)` on each axis, and
//! pixels are mapped linearly across it with the image centre on the optical
//! axis.
//!
//! # Example
//!
//! ```rust
//! use panelbot_hal::camera::CameraModel;
//! use panelbot_types::Pixel;
//!
//! let cam = CameraModel::new(std::f64::consts::FRAC_PI_2, std::f64::consts::FRAC_PI_2, 1920, 1080).unwrap();
//! let p = cam.back_project(Pixel::new(960.0, 540.0), 1.0);
//! assert!(p.y.abs() < 1e-9 && p.z.abs() < 1e-9);
//! ```

use image::RgbImage;
use nalgebra::{Matrix3x4, Vector3, Vector4};
use panelbot_types::{PanelError, Pixel, Vec3};
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Defaults
// ─────────────────────────────────────────────────────────────────────────────

/// Field of view of the arm camera on both axes (radians).
pub const DEFAULT_FOV: f64 = 1.5708;
pub const DEFAULT_WIDTH: u32 = 1920;
pub const DEFAULT_HEIGHT: u32 = 1080;

/// Intrinsic projection of the arm camera, row-major.
pub const DEFAULT_PROJECTION: [[f64; 4]; 3] = [
    [530.125732, 0.0, 318.753955, 0.0],
    [0.0, 532.849243, 231.863630, 0.0],
    [0.0, 0.0, 1.0, 0.0],
];

// ─────────────────────────────────────────────────────────────────────────────
// CameraModel
// ─────────────────────────────────────────────────────────────────────────────

/// Immutable field-of-view camera model.
///
/// Construct once at startup with [`CameraModel::new`] (or from a
/// [`CameraConfig`]); all methods are read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraModel {
    fov_h: f64,
    fov_v: f64,
    width: u32,
    height: u32,
    projection: Option<Matrix3x4<f64>>,
}

impl CameraModel {
    /// Create a model from horizontal/vertical field of view (radians) and
    /// resolution (pixels).
    ///
    /// # Errors
    ///
    /// Returns [`PanelError::InvalidCamera`] when a field of view is outside
    /// `(0, π)` or a resolution is zero.
    pub fn new(fov_h: f64, fov_v: f64, width: u32, height: u32) -> Result<Self, PanelError> {
        for (name, fov) in [("fov_h", fov_h), ("fov_v", fov_v)] {
            if !(fov > 0.0 && fov < std::f64::consts::PI) {
                return Err(PanelError::InvalidCamera(format!(
                    "{name} must lie in (0, π), got {fov}"
                )));
            }
        }
        if width == 0 || height == 0 {
            return Err(PanelError::InvalidCamera(format!(
                "resolution must be positive, got {width}x{height}"
            )));
        }
        Ok(Self {
            fov_h,
            fov_v,
            width,
            height,
            projection: None,
        })
    }

    /// Attach a 3×4 intrinsic projection matrix.
    pub fn with_projection(mut self, projection: Matrix3x4<f64>) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn fov_h(&self) -> f64 {
        self.fov_h
    }

    pub fn fov_v(&self) -> f64 {
        self.fov_v
    }

    /// Resolution as `(width, height)` in pixels.
    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn projection(&self) -> Option<&Matrix3x4<f64>> {
        self.projection.as_ref()
    }

    /// Half-width and half-height (meters) of the area visible at `standoff`.
    pub fn visible_half_extent(&self, standoff: f64) -> (f64, f64) {
        (
            standoff * (self.fov_h / 2.0).tan(),
            standoff * (self.fov_v / 2.0).tan(),
        )
    }

    /// Map `pixel` to a 3-D offset `(standoff, y, z)` relative to the camera.
    ///
    /// Columns left of centre give positive `y`, rows above centre give
    /// positive `z`.
    pub fn back_project(&self, pixel: Pixel, standoff: f64) -> Vec3 {
        let (half_w, half_h) = self.visible_half_extent(standoff);
        // Linear map of [0, W] onto [+half_w, -half_w].
        let y = (1.0 - pixel.x / self.width as f64) * (2.0 * half_w) - half_w;
        let z = (1.0 - pixel.y / self.height as f64) * (2.0 * half_h) - half_h;
        Vec3::new(standoff, y, z)
    }

    /// Project a point in the camera optical frame (z forward) through the
    /// intrinsic matrix.
    ///
    /// Returns `None` without a projection matrix or for points behind the
    /// camera.
    pub fn project(&self, point: Vector3<f64>) -> Option<Pixel> {
        let m = self.projection.as_ref()?;
        let p = m * Vector4::new(point.x, point.y, point.z, 1.0);
        if p.z <= f64::EPSILON {
            return None;
        }
        Some(Pixel::new(p.x / p.z, p.y / p.z))
    }
}

impl Default for CameraModel {
    fn default() -> Self {
        Self {
            fov_h: DEFAULT_FOV,
            fov_v: DEFAULT_FOV,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            projection: Some(Matrix3x4::from_fn(|r, c| DEFAULT_PROJECTION[r][c])),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CameraConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Serializable camera parameters, loaded from the `[camera]` config table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    #[serde(default = "default_fov")]
    pub fov_h: f64,
    #[serde(default = "default_fov")]
    pub fov_v: f64,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// Row-major 3×4 projection matrix; `None` disables [`CameraModel::project`].
    #[serde(default = "default_projection")]
    pub projection: Option<[[f64; 4]; 3]>,
}

fn default_fov() -> f64 {
    DEFAULT_FOV
}
fn default_width() -> u32 {
    DEFAULT_WIDTH
}
fn default_height() -> u32 {
    DEFAULT_HEIGHT
}
fn default_projection() -> Option<[[f64; 4]; 3]> {
    Some(DEFAULT_PROJECTION)
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_h: default_fov(),
            fov_v: default_fov(),
            width: default_width(),
            height: default_height(),
            projection: default_projection(),
        }
    }
}

impl CameraConfig {
    /// Validate and build the immutable [`CameraModel`].
    pub fn build(&self) -> Result<CameraModel, PanelError> {
        let model = CameraModel::new(self.fov_h, self.fov_v, self.width, self.height)?;
        Ok(match self.projection {
            Some(rows) => model.with_projection(Matrix3x4::from_fn(|r, c| rows[r][c])),
            None => model,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// FrameSource
// ─────────────────────────────────────────────────────────────────────────────

/// A camera or any other producer of RGB frames.
///
/// Each call to [`capture`][FrameSource::capture] yields one frame; the
/// perception step decides how many frames it consumes.
pub trait FrameSource: Send {
    /// Stable identifier for this source, e.g. `"arm_camera"`.
    fn id(&self) -> &str;

    /// Capture and return the next available frame.
    ///
    /// # Errors
    ///
    /// Returns [`PanelError::HardwareFault`] if no frame can be delivered.
    fn capture(&mut self) -> Result<RgbImage, PanelError>;
}
