use crate::types::{Uv, COLOR_HEIGHT, COLOR_PIXEL_COUNT, COLOR_WIDTH};

/// Discard points closer than this.
pub const MIN_Z: i16 = 100;
/// Discard points farther than this. The sensor itself reports up to 31999.
pub const MAX_Z: i16 = 20000;

/// Maps a depth pixel's UV coordinate to a linear index into the VGA color
/// buffer.
///
/// No clamping is done: coordinates outside `[0, 1]` give indices that are
/// negative or past the end of the buffer. Use [`color_index`] to get a
/// checked index. Arithmetic saturates, so extreme coordinates land on
/// `i64::MIN`/`i64::MAX` instead of wrapping back into the buffer.
pub fn uv_to_linear_index(uv: Uv) -> i64 {
    let x = (uv.u * COLOR_WIDTH as f32).floor() as i64;
    let y = (uv.v * COLOR_HEIGHT as f32).floor() as i64;
    y.saturating_mul(COLOR_WIDTH as i64).saturating_add(x)
}

/// Bounds-checked variant of [`uv_to_linear_index`]. Non-finite coordinates
/// never map to a pixel.
pub fn color_index(uv: Uv) -> Option<usize> {
    if !uv.u.is_finite() || !uv.v.is_finite() {
        return None;
    }
    let idx = uv_to_linear_index(uv);
    if (0..COLOR_PIXEL_COUNT as i64).contains(&idx) {
        Some(idx as usize)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthClass {
    Valid,
    TooNear,
    TooFar,
}

impl DepthClass {
    pub fn is_valid(self) -> bool {
        self == DepthClass::Valid
    }
}

/// Inclusive depth window outside of which samples are painted black.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthRange {
    pub min_z: i16,
    pub max_z: i16,
}

impl DepthRange {
    pub const fn new(min_z: i16, max_z: i16) -> Self {
        Self { min_z, max_z }
    }

    pub fn classify(&self, z: i16) -> DepthClass {
        if z > self.max_z {
            DepthClass::TooFar
        } else if z < self.min_z {
            DepthClass::TooNear
        } else {
            DepthClass::Valid
        }
    }

    pub fn contains(&self, z: i16) -> bool {
        self.classify(z).is_valid()
    }
}

impl Default for DepthRange {
    fn default() -> Self {
        Self::new(MIN_Z, MAX_Z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_maps_to_first_pixel() {
        assert_eq!(uv_to_linear_index(Uv::new(0.0, 0.0)), 0);
    }

    #[test]
    fn last_column_of_first_row() {
        assert_eq!(uv_to_linear_index(Uv::new(0.999, 0.0)), 639);
    }

    #[test]
    fn last_row_of_first_column() {
        assert_eq!(uv_to_linear_index(Uv::new(0.0, 0.999)), 640 * 479);
    }

    #[test]
    fn interior_coordinates_follow_floor_formula() {
        for &(u, v) in &[(0.25f32, 0.5f32), (0.1, 0.9), (0.73, 0.01), (0.5, 0.5)] {
            let expected = (u * 640.0).floor() as i64 + 640 * (v * 480.0).floor() as i64;
            assert_eq!(uv_to_linear_index(Uv::new(u, v)), expected);
        }
        assert_eq!(uv_to_linear_index(Uv::new(0.5, 0.5)), 320 + 640 * 240);
    }

    #[test]
    fn out_of_unit_square_is_not_clamped() {
        assert_eq!(uv_to_linear_index(Uv::new(-0.01, 0.0)), -7);
        assert_eq!(uv_to_linear_index(Uv::new(0.0, 1.0)), 640 * 480);
        assert_eq!(color_index(Uv::new(-0.01, 0.0)), None);
        assert_eq!(color_index(Uv::new(0.0, 1.0)), None);
        assert_eq!(color_index(Uv::new(1.0, 0.999)), None);
        assert_eq!(color_index(Uv::new(0.999, 0.999)), Some(COLOR_PIXEL_COUNT - 1));
    }

    #[test]
    fn extreme_coordinates_do_not_alias_onto_pixels() {
        assert_eq!(color_index(Uv::new(0.0, 1e16)), None);
        assert_eq!(color_index(Uv::new(0.0, -f32::MAX)), None);
        assert_eq!(color_index(Uv::new(f32::MAX, f32::MAX)), None);
        assert_eq!(color_index(Uv::new(-f32::MAX, 0.5)), None);
        assert_eq!(uv_to_linear_index(Uv::new(0.0, -f32::MAX)), i64::MIN);
        assert_eq!(uv_to_linear_index(Uv::new(0.0, f32::MAX)), i64::MAX);
    }

    #[test]
    fn non_finite_coordinates_are_unmapped() {
        assert_eq!(color_index(Uv::new(f32::NAN, 0.0)), None);
        assert_eq!(color_index(Uv::new(0.0, f32::NAN)), None);
        assert_eq!(color_index(Uv::new(f32::INFINITY, 0.0)), None);
        assert_eq!(color_index(Uv::new(0.0, f32::NEG_INFINITY)), None);
    }

    #[test]
    fn depth_range_boundaries_are_valid() {
        let range = DepthRange::default();
        assert_eq!(range.classify(100), DepthClass::Valid);
        assert_eq!(range.classify(20000), DepthClass::Valid);
        assert_eq!(range.classify(5000), DepthClass::Valid);
    }

    #[test]
    fn depth_outside_range_is_rejected() {
        let range = DepthRange::default();
        assert_eq!(range.classify(99), DepthClass::TooNear);
        assert_eq!(range.classify(0), DepthClass::TooNear);
        assert_eq!(range.classify(-5), DepthClass::TooNear);
        assert_eq!(range.classify(20001), DepthClass::TooFar);
        assert_eq!(range.classify(31999), DepthClass::TooFar);
        assert!(!range.contains(50));
    }
}
