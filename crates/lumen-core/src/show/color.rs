//! RGB colors and hue arithmetic

use serde::{Deserialize, Serialize};

/// 8-bit RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rgb {
    /// Red
    pub r: u8,
    /// Green
    pub g: u8,
    /// Blue
    pub b: u8,
}

impl Rgb {
    /// Full white
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);
    /// Idle appearance after a show stops
    pub const WARM_WHITE: Rgb = Rgb::new(255, 180, 100);

    /// Build a color from channel values
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Convert HSV (all components 0-1, hue wraps) to RGB
    pub fn from_hsv(h: f32, s: f32, v: f32) -> Self {
        let h = wrap_hue(h);
        let s = s.clamp(0.0, 1.0);
        let v = v.clamp(0.0, 1.0);

        if s <= 0.0 {
            let c = to_channel(v);
            return Self::new(c, c, c);
        }

        let sector = (h * 6.0).floor();
        let f = h * 6.0 - sector;
        let p = v * (1.0 - s);
        let q = v * (1.0 - s * f);
        let t = v * (1.0 - s * (1.0 - f));

        let (r, g, b) = match (sector as i32).rem_euclid(6) {
            0 => (v, t, p),
            1 => (q, v, p),
            2 => (p, v, t),
            3 => (p, q, v),
            4 => (t, p, v),
            _ => (v, p, q),
        };
        Self::new(to_channel(r), to_channel(g), to_channel(b))
    }

    /// Sum of absolute per-channel differences
    pub fn distance(&self, other: &Rgb) -> u32 {
        self.r.abs_diff(other.r) as u32
            + self.g.abs_diff(other.g) as u32
            + self.b.abs_diff(other.b) as u32
    }
}

fn to_channel(x: f32) -> u8 {
    (x * 255.0).clamp(0.0, 255.0) as u8
}

/// Wrap any hue into [0, 1)
pub fn wrap_hue(h: f32) -> f32 {
    if !h.is_finite() {
        return 0.0;
    }
    let w = h.rem_euclid(1.0);
    // rem_euclid can round up to exactly 1.0 for tiny negative inputs
    if w >= 1.0 {
        0.0
    } else {
        w
    }
}

/// Move `current` toward `target` by `rate` along the shorter way round the
/// hue circle.
pub fn approach_hue(current: f32, target: f32, rate: f32) -> f32 {
    let mut delta = wrap_hue(target) - wrap_hue(current);
    if delta > 0.5 {
        delta -= 1.0;
    } else if delta < -0.5 {
        delta += 1.0;
    }
    wrap_hue(current + delta * rate.clamp(0.0, 1.0))
}

/// Linear interpolation
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_primary_colors() {
        assert_eq!(Rgb::from_hsv(0.0, 1.0, 1.0), Rgb::new(255, 0, 0));
        assert_eq!(Rgb::from_hsv(1.0 / 3.0, 1.0, 1.0), Rgb::new(0, 255, 0));
        assert_eq!(Rgb::from_hsv(2.0 / 3.0, 1.0, 1.0), Rgb::new(0, 0, 255));
        assert_eq!(Rgb::from_hsv(0.3, 0.0, 1.0), Rgb::WHITE);
    }

    #[test]
    fn test_distance() {
        let a = Rgb::new(10, 20, 30);
        let b = Rgb::new(13, 18, 30);
        assert_eq!(a.distance(&b), 5);
        assert_eq!(Rgb::WHITE.distance(&Rgb::default()), 765);
    }

    #[test]
    fn test_approach_hue_takes_short_way() {
        let h = approach_hue(0.95, 0.05, 0.5);
        assert!((h - 0.0).abs() < 1e-4 || (h - 1.0).abs() < 1e-4);
        let h = approach_hue(0.2, 0.4, 0.5);
        assert!((h - 0.3).abs() < 1e-5);
    }

    proptest! {
        #[test]
        fn prop_wrap_hue_in_unit_range(h in -100.0f32..100.0) {
            let w = wrap_hue(h);
            prop_assert!((0.0..1.0).contains(&w));
        }

        #[test]
        fn prop_full_value_hits_255(h in -5.0f32..5.0, s in 0.0f32..=1.0) {
            let c = Rgb::from_hsv(h, s, 1.0);
            prop_assert_eq!(c.r.max(c.g).max(c.b), 255);
        }

        #[test]
        fn prop_distance_symmetric(a in any::<(u8, u8, u8)>(), b in any::<(u8, u8, u8)>()) {
            let a = Rgb::new(a.0, a.1, a.2);
            let b = Rgb::new(b.0, b.1, b.2);
            prop_assert_eq!(a.distance(&b), b.distance(&a));
            prop_assert_eq!(a.distance(&a), 0);
        }
    }
}
