//! Orientation math for camera preview and recording.
//!
//! Pure functions mapping sensor/device rotation to display and recording
//! orientations, plus the 2-D affine transform that letterboxes a rotated
//! preview buffer onto a view surface. No state, no hardware.

use clipcam_camera::Size;

// ============================================================================
// Rotation
// ============================================================================

/// The four device rotations, as signed multiples of 90 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    R0,
    R90,
    R180,
    R270,
}

impl Rotation {
    pub fn degrees(self) -> u16 {
        match self {
            Rotation::R0 => 0,
            Rotation::R90 => 90,
            Rotation::R180 => 180,
            Rotation::R270 => 270,
        }
    }

    /// Snap an arbitrary angle onto the rotation domain: normalized mod 360,
    /// then clamped to the nearest multiple of 90 (ties round upward).
    pub fn nearest(degrees: i32) -> Rotation {
        let normalized = degrees.rem_euclid(360);
        match ((normalized + 45) / 90) % 4 {
            0 => Rotation::R0,
            1 => Rotation::R90,
            2 => Rotation::R180,
            _ => Rotation::R270,
        }
    }

    /// Whether this rotation leaves the device in its natural (portrait)
    /// orientation.
    pub fn is_portrait(self) -> bool {
        matches!(self, Rotation::R0 | Rotation::R180)
    }
}

/// The screen orientation the host should lock to while recording, so the
/// clip's baked-in rotation hint stays consistent for the whole take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenOrientation {
    Portrait,
    Landscape,
    ReversePortrait,
    ReverseLandscape,
}

/// The orientation lock matching how the user is physically holding the
/// device at recording start.
pub fn activity_orientation_for(rotation: Rotation) -> ScreenOrientation {
    match rotation {
        Rotation::R0 => ScreenOrientation::Portrait,
        Rotation::R90 => ScreenOrientation::Landscape,
        Rotation::R180 => ScreenOrientation::ReversePortrait,
        Rotation::R270 => ScreenOrientation::ReverseLandscape,
    }
}

// ============================================================================
// Display Orientation
// ============================================================================

/// Degrees the preview/recording must be rotated so the image appears
/// upright, given the sensor mounting and the current device rotation.
///
/// Front sensors are mounted mirrored relative to back sensors, hence the
/// inverted rotation term and the final mirror.
pub fn display_orientation(sensor_degrees: u16, rotation: Rotation, is_front: bool) -> u16 {
    let sensor = (sensor_degrees % 360) as i32;
    let device = rotation.degrees() as i32;
    let degrees = if is_front {
        (360 - ((sensor + device) % 360)) % 360
    } else {
        (sensor - device + 360) % 360
    };
    degrees as u16
}

/// Mirror an orientation across the sensor axis.
pub fn mirror(degrees: u16) -> u16 {
    (360 - degrees % 360) % 360
}

/// Derived orientation facts for the currently open camera. Recomputed
/// whenever the active camera or device rotation changes; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrientationState {
    pub sensor_degrees: u16,
    pub device_rotation: Rotation,
    pub display_degrees: u16,
    pub is_front: bool,
}

impl OrientationState {
    pub fn derive(sensor_degrees: u16, device_rotation: Rotation, is_front: bool) -> Self {
        Self {
            sensor_degrees,
            device_rotation,
            display_degrees: display_orientation(sensor_degrees, device_rotation, is_front),
            is_front,
        }
    }
}

// ============================================================================
// Preview Transform
// ============================================================================

/// Row-major 2x3 affine transform: `[a, b, tx, c, d, ty]` mapping
/// `(x, y)` to `(a*x + b*y + tx, c*x + d*y + ty)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub m: [f32; 6],
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        m: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
    };

    /// Scale + translate mapping `src` onto `dst` exactly (fill, no aspect
    /// preservation).
    pub fn rect_to_rect(src: Rect, dst: Rect) -> Transform {
        let sx = dst.width / src.width;
        let sy = dst.height / src.height;
        Transform {
            m: [
                sx,
                0.0,
                dst.left - src.left * sx,
                0.0,
                sy,
                dst.top - src.top * sy,
            ],
        }
    }

    /// This transform followed by `next`.
    fn then(self, next: Transform) -> Transform {
        let [a1, b1, tx1, c1, d1, ty1] = self.m;
        let [a2, b2, tx2, c2, d2, ty2] = next.m;
        Transform {
            m: [
                a2 * a1 + b2 * c1,
                a2 * b1 + b2 * d1,
                a2 * tx1 + b2 * ty1 + tx2,
                c2 * a1 + d2 * c1,
                c2 * b1 + d2 * d1,
                c2 * tx1 + d2 * ty1 + ty2,
            ],
        }
    }

    /// Uniform scale about a pivot, applied after this transform.
    pub fn post_scale(self, scale: f32, px: f32, py: f32) -> Transform {
        self.then(Transform {
            m: [
                scale,
                0.0,
                px - scale * px,
                0.0,
                scale,
                py - scale * py,
            ],
        })
    }

    /// Clockwise rotation about a pivot, applied after this transform.
    pub fn post_rotate(self, degrees: f32, px: f32, py: f32) -> Transform {
        let radians = degrees.to_radians();
        let (sin, cos) = radians.sin_cos();
        self.then(Transform {
            m: [
                cos,
                -sin,
                px - cos * px + sin * py,
                sin,
                cos,
                py - sin * px - cos * py,
            ],
        })
    }

    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        let [a, b, tx, c, d, ty] = self.m;
        (a * x + b * y + tx, c * x + d * y + ty)
    }
}

/// Axis-aligned rectangle in view coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn center(&self) -> (f32, f32) {
        (self.left + self.width / 2.0, self.top + self.height / 2.0)
    }

    fn centered_on(mut self, cx: f32, cy: f32) -> Rect {
        self.left = cx - self.width / 2.0;
        self.top = cy - self.height / 2.0;
        self
    }
}

/// Transform that maps view coordinates so the preview buffer fully covers
/// the view at the given device rotation.
///
/// Identity at `R0`; a half turn about the view center at `R180`. At `R90`
/// and `R270` the buffer rect (dimensions swapped) is mapped onto the view,
/// scaled up to cover, and turned a quarter in the compensating direction.
pub fn preview_transform(view: Size, buffer: Size, rotation: Rotation) -> Transform {
    let view_rect = Rect::new(0.0, 0.0, view.width as f32, view.height as f32);
    let (cx, cy) = view_rect.center();

    match rotation {
        Rotation::R0 => Transform::IDENTITY,
        Rotation::R180 => Transform::IDENTITY.post_rotate(180.0, cx, cy),
        Rotation::R90 | Rotation::R270 => {
            let buffer_rect =
                Rect::new(0.0, 0.0, buffer.height as f32, buffer.width as f32).centered_on(cx, cy);
            let scale = f32::max(
                view.height as f32 / buffer.height as f32,
                view.width as f32 / buffer.width as f32,
            );
            let quarter = if rotation == Rotation::R90 { -90.0 } else { 90.0 };
            Transform::rect_to_rect(view_rect, buffer_rect)
                .post_scale(scale, cx, cy)
                .post_rotate(quarter, cx, cy)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-3;

    fn assert_close(actual: (f32, f32), expected: (f32, f32)) {
        assert!(
            (actual.0 - expected.0).abs() < EPSILON && (actual.1 - expected.1).abs() < EPSILON,
            "got {:?}, expected {:?}",
            actual,
            expected
        );
    }

    #[test]
    fn nearest_snaps_to_quarter_turns() {
        assert_eq!(Rotation::nearest(0), Rotation::R0);
        assert_eq!(Rotation::nearest(90), Rotation::R90);
        assert_eq!(Rotation::nearest(359), Rotation::R0);
        assert_eq!(Rotation::nearest(44), Rotation::R0);
        assert_eq!(Rotation::nearest(45), Rotation::R90); // ties round upward
        assert_eq!(Rotation::nearest(200), Rotation::R180);
        assert_eq!(Rotation::nearest(-90), Rotation::R270);
        assert_eq!(Rotation::nearest(450), Rotation::R90);
    }

    #[test]
    fn activity_orientation_tracks_holding_rotation() {
        assert_eq!(
            activity_orientation_for(Rotation::R0),
            ScreenOrientation::Portrait
        );
        assert_eq!(
            activity_orientation_for(Rotation::R90),
            ScreenOrientation::Landscape
        );
        assert_eq!(
            activity_orientation_for(Rotation::R180),
            ScreenOrientation::ReversePortrait
        );
        assert_eq!(
            activity_orientation_for(Rotation::R270),
            ScreenOrientation::ReverseLandscape
        );
    }

    #[test]
    fn back_camera_display_orientation() {
        assert_eq!(display_orientation(90, Rotation::R0, false), 90);
        assert_eq!(display_orientation(90, Rotation::R90, false), 0);
        assert_eq!(display_orientation(90, Rotation::R180, false), 270);
        assert_eq!(display_orientation(90, Rotation::R270, false), 180);
    }

    #[test]
    fn front_camera_display_orientation_is_mirrored() {
        assert_eq!(display_orientation(270, Rotation::R0, true), 90);
        assert_eq!(display_orientation(270, Rotation::R90, true), 0);
        assert_eq!(display_orientation(270, Rotation::R180, true), 270);
        assert_eq!(display_orientation(270, Rotation::R270, true), 180);
    }

    #[test]
    fn full_rotation_sweep_is_a_bijection() {
        // Sweeping the device through all four rotations must hit each of
        // the four display orientations exactly once, for either facing,
        // and a full 360 sweep lands back on the starting value.
        for sensor in [0u16, 90, 180, 270] {
            for front in [false, true] {
                let mut seen: Vec<u16> = [Rotation::R0, Rotation::R90, Rotation::R180, Rotation::R270]
                    .iter()
                    .map(|&r| display_orientation(sensor, r, front))
                    .collect();
                seen.sort_unstable();
                assert_eq!(seen, vec![0, 90, 180, 270], "sensor={sensor} front={front}");

                assert_eq!(
                    display_orientation(sensor, Rotation::nearest(0), front),
                    display_orientation(sensor, Rotation::nearest(360), front)
                );
            }
        }
    }

    #[test]
    fn mirror_reflects_within_domain() {
        assert_eq!(mirror(0), 0);
        assert_eq!(mirror(90), 270);
        assert_eq!(mirror(180), 180);
        assert_eq!(mirror(270), 90);
    }

    #[test]
    fn orientation_state_derives_display() {
        let state = OrientationState::derive(90, Rotation::R90, false);
        assert_eq!(state.display_degrees, 0);
        assert!(!state.is_front);
    }

    #[test]
    fn transform_identity_at_natural_rotation() {
        let t = preview_transform(Size::new(300, 400), Size::new(400, 300), Rotation::R0);
        assert_eq!(t, Transform::IDENTITY);
        assert_close(t.apply(120.0, 40.0), (120.0, 40.0));
    }

    #[test]
    fn transform_half_turn_about_center() {
        let t = preview_transform(Size::new(300, 400), Size::new(400, 300), Rotation::R180);
        assert_close(t.apply(0.0, 0.0), (300.0, 400.0));
        assert_close(t.apply(300.0, 400.0), (0.0, 0.0));
        assert_close(t.apply(150.0, 200.0), (150.0, 200.0));
    }

    #[test]
    fn transform_quarter_turns_fix_the_center() {
        let view = Size::new(300, 400);
        let buffer = Size::new(400, 300);
        for rotation in [Rotation::R90, Rotation::R270] {
            let t = preview_transform(view, buffer, rotation);
            assert_close(t.apply(150.0, 200.0), (150.0, 200.0));
        }
    }

    #[test]
    fn transform_quarter_turn_covers_view() {
        // view 300x400 with a 400x300 buffer: the swapped buffer rect equals
        // the view rect, so the transform reduces to scale 4/3 about the
        // center followed by the compensating quarter turn.
        let t = preview_transform(Size::new(300, 400), Size::new(400, 300), Rotation::R90);
        assert_close(t.apply(300.0, 400.0), (416.667, 0.0));
        assert_close(t.apply(0.0, 0.0), (-116.667, 400.0));

        let t = preview_transform(Size::new(300, 400), Size::new(400, 300), Rotation::R270);
        assert_close(t.apply(300.0, 400.0), (-116.667, 400.0));
    }

    #[test]
    fn rect_to_rect_fills_destination() {
        let t = Transform::rect_to_rect(
            Rect::new(0.0, 0.0, 100.0, 50.0),
            Rect::new(10.0, 20.0, 200.0, 100.0),
        );
        assert_close(t.apply(0.0, 0.0), (10.0, 20.0));
        assert_close(t.apply(100.0, 50.0), (210.0, 120.0));
    }
}
