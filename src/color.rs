use std::f32::consts::PI;

use super::*;

pub type Radiance = Vec3;
pub type Transmittance = f32;

/// Radiance gathered along a ray segment together with the fraction of
/// light that passes through it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub radiance: Radiance,
    pub transmittance: Transmittance,
}

impl Interval {
    /// Empty space: contributes nothing and hides nothing behind it.
    pub const TRANSPARENT: Self = Self {
        radiance: Vec3::ZERO,
        transmittance: 1.0,
    };

    pub fn new(radiance: Radiance, transmittance: Transmittance) -> Self {
        Self {
            radiance,
            transmittance,
        }
    }

    /// Composites `far` behind `self`. The operands are not interchangeable:
    /// `self` must be the segment nearer to the probe.
    pub fn over(self, far: Self) -> Self {
        Self {
            radiance: self.radiance + far.radiance * self.transmittance,
            transmittance: self.transmittance * far.transmittance,
        }
    }
}

impl From<Vec4> for Interval {
    fn from(value: Vec4) -> Self {
        Self::new(value.truncate(), value.w)
    }
}

impl From<Interval> for Vec4 {
    fn from(interval: Interval) -> Self {
        interval.radiance.extend(interval.transmittance)
    }
}

pub fn merge_intervals(near: Interval, far: Interval) -> Interval {
    near.over(far)
}

/// Linear to sRGB.
pub fn srgb_oetf(c: f32, fast_math: &FastMath) -> f32 {
    if c <= 0.0031308 {
        c * 12.92
    } else {
        1.055 * fast_math.powf(c, 1.0 / 2.4) - 0.055
    }
}

/// sRGB to linear.
pub fn srgb_eotf(c: f32, fast_math: &FastMath) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        fast_math.powf((c + 0.055) / 1.055, 2.4)
    }
}

fn map_rgb(value: Vec4, f: impl Fn(f32) -> f32) -> Vec4 {
    Vec4::new(f(value.x), f(value.y), f(value.z), value.w)
}

pub fn quantize_unorm8(c: f32) -> f32 {
    unorm8(c) as f32 / 255.0
}

pub fn unorm8(c: f32) -> u8 {
    (c.clamp(0.0, 1.0) * 255.0 + 0.5).floor() as u8
}

/// Hash of a pixel coordinate into `[0, 1)`.
pub fn rand(uv: Vec2) -> f32 {
    let dt = uv.dot(Vec2::new(12.9898, 78.233));
    let sn = dt - (dt / PI).floor() * PI;
    let value = sn.sin() * 43758.5453;
    value - value.floor()
}

pub const DITHER_SHIFT: Vec3 = Vec3::new(0.25 / 255.0, -0.25 / 255.0, 0.25 / 255.0);
/// Largest dither offset. Stays under half an 8-bit step so a channel that
/// already sits on a step, zero included, rounds back onto it.
pub const DITHER_LIMIT: f32 = 0.499 / 255.0;

/// Shifts each channel by just under half an 8-bit step at most,
/// differently per channel, so banding from quantization breaks up into
/// noise.
pub fn dither(color: Vec4, pixel: UVec2) -> Vec4 {
    let t = rand(pixel.as_vec2());
    let shift = (2.0 * DITHER_SHIFT)
        .lerp(-2.0 * DITHER_SHIFT, t)
        .clamp(Vec3::splat(-DITHER_LIMIT), Vec3::splat(DITHER_LIMIT));
    (color.truncate() + shift).extend(color.w)
}

/// How cascade buffers store intervals between passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorPolicy {
    /// Full-precision linear radiance everywhere. The transfer function is
    /// applied once, for display.
    #[default]
    Linear,
    /// Buffers hold sRGB-encoded values rounded to 8 bits, as if backed by
    /// an `RGBA8` texture. Reads decode to linear before merging.
    Quantized { dither: bool },
}

impl ColorPolicy {
    /// Turns a stored cascade value into a linear interval.
    pub fn decode(&self, stored: Vec4, fast_math: &FastMath) -> Vec4 {
        match self {
            Self::Linear => stored,
            Self::Quantized { .. } => map_rgb(stored, |c| srgb_eotf(c, fast_math)),
        }
    }

    /// Turns a linear interval into what gets written to a cascade buffer.
    pub fn encode(&self, linear: Vec4, pixel: UVec2, fast_math: &FastMath) -> Vec4 {
        match *self {
            Self::Linear => linear,
            Self::Quantized { dither: with_dither } => {
                let encoded = map_rgb(linear, |c| srgb_oetf(c, fast_math));
                let encoded = if with_dither {
                    dither(encoded, pixel)
                } else {
                    encoded
                };
                Vec4::from_array(encoded.to_array().map(quantize_unorm8))
            }
        }
    }

    /// sRGB display color for a stored value.
    pub fn to_display(&self, stored: Vec4) -> Vec3 {
        match self {
            Self::Linear => map_rgb(stored, |c| srgb_oetf(c, &FastMath::Exact)).truncate(),
            Self::Quantized { .. } => stored.truncate(),
        }
    }

    /// Linear radiance for a stored value, exactly decoded.
    pub fn to_linear(&self, stored: Vec4) -> Vec4 {
        self.decode(stored, &FastMath::Exact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merging_with_transparent_is_identity() {
        let intervals = [
            Interval::new(Vec3::new(0.3, 0.1, 0.9), 0.25),
            Interval::new(Vec3::ZERO, 0.0),
            Interval::new(Vec3::splat(4.0), 1.0),
        ];
        for interval in intervals {
            assert_eq!(merge_intervals(interval, Interval::TRANSPARENT), interval);
        }
    }

    #[test]
    fn near_occludes_far() {
        let near = Interval::new(Vec3::new(1.0, 0.0, 0.0), 0.5);
        let far = Interval::new(Vec3::new(0.0, 1.0, 0.0), 0.2);

        let merged = near.over(far);
        assert_eq!(merged.radiance, Vec3::new(1.0, 0.5, 0.0));
        assert_eq!(merged.transmittance, 0.1);

        let swapped = far.over(near);
        assert_ne!(swapped.radiance, merged.radiance);
    }

    #[test]
    fn opaque_near_hides_far() {
        let near = Interval::new(Vec3::splat(0.4), 0.0);
        let far = Interval::new(Vec3::splat(100.0), 1.0);
        assert_eq!(near.over(far), near);
    }

    #[test]
    fn transfer_functions_round_trip() {
        let exact = FastMath::Exact;
        for i in 0..=1000 {
            let c = i as f32 / 1000.0;
            let there_and_back = srgb_eotf(srgb_oetf(c, &exact), &exact);
            assert!((there_and_back - c).abs() < 1e-5, "{c} -> {there_and_back}");
            let back_and_there = srgb_oetf(srgb_eotf(c, &exact), &exact);
            assert!((back_and_there - c).abs() < 1e-5, "{c} -> {back_and_there}");
        }
    }

    #[test]
    fn transfer_functions_are_continuous_at_the_knee() {
        let exact = FastMath::Exact;
        let below = srgb_oetf(0.0031308, &exact);
        let above = srgb_oetf(0.0031309, &exact);
        assert!((above - below).abs() < 1e-4);
        assert!((srgb_eotf(0.04045, &exact) - srgb_eotf(0.040451, &exact)).abs() < 1e-5);
    }

    #[test]
    fn quantization_snaps_to_8_bit_steps() {
        assert_eq!(quantize_unorm8(0.0), 0.0);
        assert_eq!(quantize_unorm8(1.0), 1.0);
        assert_eq!(quantize_unorm8(2.0), 1.0);
        assert_eq!(quantize_unorm8(-1.0), 0.0);
        assert_eq!(quantize_unorm8(0.5), 128.0 / 255.0);
        for i in 0..=100 {
            let c = i as f32 / 100.0;
            assert!((quantize_unorm8(c) - c).abs() <= 0.5 / 255.0 + 1e-6);
        }
    }

    #[test]
    fn rand_stays_in_unit_range() {
        for y in 0..32 {
            for x in 0..32 {
                let value = rand(Vec2::new(x as f32, y as f32));
                assert!((0.0..=1.0).contains(&value));
            }
        }
    }

    #[test]
    fn dither_shift_is_bounded() {
        let color = Vec4::new(0.5, 0.5, 0.5, 0.7);
        for y in 0..16 {
            for x in 0..16 {
                let dithered = dither(color, UVec2::new(x, y));
                assert!((dithered.truncate() - color.truncate()).abs().max_element() < 0.5 / 255.0);
                assert_eq!(dithered.w, color.w);
            }
        }
    }

    #[test]
    fn dither_keeps_values_on_a_step() {
        // rand is exactly zero at the origin, which asks for the full shift.
        assert_eq!(rand(Vec2::ZERO), 0.0);
        let policy = ColorPolicy::Quantized { dither: true };
        for step in [0, 1, 37, 128, 254, 255] {
            let value = step as f32 / 255.0;
            let color = Vec4::new(value, value, value, 1.0);
            for y in 0..16 {
                for x in 0..16 {
                    let dithered = dither(color, UVec2::new(x, y));
                    let quantized = dithered.to_array().map(quantize_unorm8);
                    assert_eq!(Vec4::from_array(quantized), color, "{step} at {x} {y}");
                }
            }
        }
        for y in 0..16 {
            for x in 0..16 {
                let stored = policy.encode(Vec4::new(0.0, 0.0, 0.0, 1.0), UVec2::new(x, y), &FastMath::Exact);
                assert_eq!(stored, Vec4::new(0.0, 0.0, 0.0, 1.0), "{x} {y}");
            }
        }
    }

    #[test]
    fn quantized_policy_round_trips_within_a_step() {
        let policy = ColorPolicy::Quantized { dither: false };
        let exact = FastMath::Exact;
        let linear = Vec4::new(0.02, 0.2, 0.8, 0.5);
        let stored = policy.encode(linear, UVec2::ZERO, &exact);
        let decoded = policy.decode(stored, &exact);
        // One 8-bit step in sRGB space is at most ~1.3% of linear range near 1.
        assert!((decoded - linear).abs().max_element() < 0.01);
        assert_eq!(ColorPolicy::Linear.encode(linear, UVec2::ZERO, &exact), linear);
    }
}
