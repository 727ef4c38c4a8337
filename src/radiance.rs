use super::*;
use cascade::BRANCHES;
use trace::cast_ray;

#[cfg(feature = "gpu")]
mod gpu;
mod parallel;
mod scalar;

#[cfg(feature = "gpu")]
pub use gpu::GpuContext;
pub use parallel::ParallelPass;
pub use scalar::ScalarPass;
#[cfg(not(feature = "gpu"))]
pub use unsupported::GpuContext;

/// Inputs shared by every pixel of one cascade pass.
#[derive(Debug, Clone, Copy)]
pub struct Pass<'a> {
    pub scene: &'a RasterBuffer,
    pub settings: &'a CascadeSettings,
    pub level: u32,
    pub policy: ColorPolicy,
}

/// The value level `pass.level` stores at `pixel`: the interval cast along
/// the pixel's probe ray, merged with the four nearest probes one level up.
///
/// `far` is the level above, as stored under `pass.policy`.
pub fn compute_radiance(
    pass: &Pass,
    far: &RasterBuffer,
    pixel: UVec2,
    fast_math: &FastMath,
) -> Vec4 {
    let Pass {
        scene,
        settings,
        level,
        policy,
    } = *pass;

    let ray = settings.probe(pixel, level, fast_math);
    let near = cast_ray(scene, &ray, settings.interval(level));

    let samples = settings.bilinear_samples(ray.position, level);
    let radiance = samples
        .iter()
        .fold(Vec4::ZERO, |radiance, (next_probe, weight)| {
            let contribution = (0..BRANCHES).fold(Vec4::ZERO, |contribution, branch| {
                let next_facing = ray.location.facing * BRANCHES + branch;
                let texel = settings.bilinear_texel(next_probe, next_facing, level, far.size());
                let next = Interval::from(policy.decode(far.get_clamped(texel), fast_math));
                contribution + Vec4::from(near.over(next)) * weight
            });
            radiance + contribution / BRANCHES as f32
        });
    policy.encode(radiance, pixel, fast_math)
}

/// A CPU strategy for computing one full cascade pass.
pub trait CascadePass: Send + Sync {
    fn kind(&self) -> StrategyKind;
    /// Fills every pixel of `output` from `far`, the buffer of the level above.
    fn run_pass(&self, pass: &Pass, far: &RasterBuffer, output: &mut RasterBuffer);
}

#[cfg(not(feature = "gpu"))]
mod unsupported {
    use std::convert::Infallible;

    use super::*;

    /// Stand-in for the device context when built without the `gpu` feature.
    /// It can never be constructed.
    #[derive(Debug)]
    pub struct GpuContext {
        never: Infallible,
    }

    impl GpuContext {
        pub fn new(_size: UVec2, _settings: CascadeSettings, _policy: ColorPolicy) -> Result<Self> {
            Err(Error::Environment(
                "built without the `gpu` feature".to_string(),
            ))
        }
        pub fn size(&self) -> UVec2 {
            match self.never {}
        }
        pub fn render(&mut self, _scene: &RasterBuffer, _output: &mut RasterBuffer) -> Result<()> {
            match self.never {}
        }
    }
}
