use std::{
    any::Any,
    f32::consts::PI,
    panic::{catch_unwind, AssertUnwindSafe},
};

use luisa::lang::types::vector::{Vec2 as LVec2, Vec3 as LVec3, Vec4 as LVec4};
use luisa::runtime::Kernel;
use sefirot::prelude::*;

use super::*;
use trace::TRANSMITTANCE_CUTOFF;

type Texel = LVec4<f32>;

/// Device-side cascade pipeline. Owns the scene texture, the two cascade
/// textures passes alternate between, the output texture and the kernels.
/// Everything is released when the context drops.
pub struct GpuContext {
    size: UVec2,
    settings: CascadeSettings,
    scene: Tex2d<Texel>,
    cascades: [Tex2d<Texel>; 2],
    output: Tex2d<Texel>,
    staging: Buffer<f32>,
    staging_host: Vec<f32>,
    upload_kernel: Kernel<fn(Tex2d<Texel>)>,
    download_kernel: Kernel<fn(Tex2d<Texel>)>,
    clear_kernel: Kernel<fn(Tex2d<Texel>)>,
    pass_kernel: Kernel<fn(Tex2d<Texel>, Tex2d<Texel>, u32, LVec2<f32>)>,
}

fn environment_error(error: Box<dyn Any + Send>) -> Error {
    let message = error
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| error.downcast_ref::<&str>().map(|s| s.to_string()))
        .unwrap_or_else(|| "device error".to_string());
    Error::Environment(message)
}

impl GpuContext {
    /// Compiles the kernels and allocates textures for `size`. Fails with
    /// [`Error::Environment`] if no device can run them.
    pub fn new(size: UVec2, settings: CascadeSettings, policy: ColorPolicy) -> Result<Self> {
        catch_unwind(|| Self::create(size, settings, policy)).map_err(environment_error)
    }

    fn create(size: UVec2, settings: CascadeSettings, policy: ColorPolicy) -> Self {
        let [width, height] = size.to_array();
        let texture = || DEVICE.create_tex2d::<Texel>(PixelStorage::Float4, width, height, 1);
        let scene = texture();

        let staging = DEVICE.create_buffer::<f32>(4 * (width * height) as usize);
        let upload_kernel = DEVICE.create_kernel::<fn(Tex2d<Texel>)>(&track!(|texture| {
            let index = 4 * (dispatch_id().x + dispatch_id().y * width);
            let value = LVec4::expr(
                staging.read(index),
                staging.read(index + 1),
                staging.read(index + 2),
                staging.read(index + 3),
            );
            texture.write(dispatch_id().xy(), value);
        }));
        let download_kernel = DEVICE.create_kernel::<fn(Tex2d<Texel>)>(&track!(|texture| {
            let index = 4 * (dispatch_id().x + dispatch_id().y * width);
            let value = texture.read(dispatch_id().xy());
            staging.write(index, value.x);
            staging.write(index + 1, value.y);
            staging.write(index + 2, value.z);
            staging.write(index + 3, value.w);
        }));
        let clear_kernel = DEVICE.create_kernel::<fn(Tex2d<Texel>)>(&track!(|texture| {
            texture.write(dispatch_id().xy(), LVec4::splat_expr(0.0_f32));
        }));

        let scene_view = scene.view(0);
        let pass_kernel = DEVICE
            .create_kernel::<fn(Tex2d<Texel>, Tex2d<Texel>, u32, LVec2<f32>)>(&track!(
                |far, output, level, range| {
                    set_block_size([16, 16, 1]);
                    let size = LVec2::from([width, height]).expr().cast_i32();
                    let pixel = dispatch_id().xy();

                    let probe_size = settings.base_probe_size << level;
                    let next_probe_size = probe_size * 2;
                    let probe = pixel / probe_size;
                    let facing_coord = pixel % probe_size;
                    let facing = facing_coord.x + facing_coord.y * probe_size;
                    let facing_count = probe_size * probe_size;
                    let position = (probe.cast_f32() + 0.5) * probe_size.cast_f32();
                    let angle = (facing.cast_f32() + 0.5) / facing_count.cast_f32() * TAU;
                    let direction = LVec2::expr(angle.cos(), angle.sin());

                    let near = cast_interval(
                        &scene_view,
                        size,
                        position + direction * range.x,
                        position + direction * range.y,
                        32_u32 << level,
                    );

                    let base = position / next_probe_size.cast_f32() - 0.5;
                    let base_index = base.floor().cast_i32();
                    let fract = base - base.floor();
                    let max_origin = size.cast_f32() - next_probe_size.cast_f32();

                    let radiance = LVec4::splat_expr(0.0_f32).var();
                    for sample in 0_u32.expr()..4_u32.expr() {
                        let offset = LVec2::expr(sample & 1, sample >> 1);
                        let weights =
                            (offset == 1).select(fract, LVec2::splat_expr(1.0_f32) - fract);
                        let weight = weights.x * weights.y;

                        let origin = (base_index + offset.cast_i32()) * next_probe_size.cast_i32();
                        let origin = luisa::min(
                            luisa::max(origin.cast_f32(), LVec2::splat_expr(0.5_f32)),
                            max_origin,
                        );

                        let contribution = LVec4::splat_expr(0.0_f32).var();
                        for branch in 0_u32.expr()..BRANCHES.expr() {
                            let next_facing = facing * BRANCHES + branch;
                            let local = LVec2::expr(
                                next_facing % next_probe_size,
                                next_facing / next_probe_size,
                            );
                            let texel = origin.cast_i32() + local.cast_i32();
                            let texel =
                                luisa::min(luisa::max(texel, LVec2::splat_expr(0_i32)), size - 1);
                            let next = decode(policy, far.read(texel.cast_u32()));
                            *contribution += merge_intervals(near, next) * weight;
                        }
                        *radiance += contribution / BRANCHES as f32;
                    }
                    output.write(pixel, encode(policy, **radiance, pixel));
                }
            ));

        Self {
            size,
            settings,
            scene,
            cascades: [texture(), texture()],
            output: texture(),
            staging,
            staging_host: vec![0.0; 4 * (width * height) as usize],
            upload_kernel,
            download_kernel,
            clear_kernel,
            pass_kernel,
        }
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    /// Runs every level, coarsest first, and reads the finest level back into
    /// `output`. Commands on one stream execute in order, so a pass never
    /// starts before the previous pass's writes land.
    pub fn render(&mut self, scene: &RasterBuffer, output: &mut RasterBuffer) -> Result<()> {
        catch_unwind(AssertUnwindSafe(|| self.dispatch(scene, output))).map_err(environment_error)
    }

    fn dispatch(&mut self, scene: &RasterBuffer, output: &mut RasterBuffer) {
        let grid = [self.size.x, self.size.y, 1];
        for (staged, pixel) in self.staging_host.chunks_exact_mut(4).zip(scene.pixels()) {
            staged.copy_from_slice(&pixel.to_array());
        }
        self.staging.copy_from(&self.staging_host);

        let mut read = 0;
        let mut passes = vec![];
        for level in (0..self.settings.num_cascades).rev() {
            let range = LVec2::from(self.settings.interval(level));
            let target = if level == 0 {
                &self.output
            } else {
                &self.cascades[1 - read]
            };
            passes.push(
                self.pass_kernel
                    .dispatch_async(grid, &self.cascades[read], target, &level, &range)
                    .debug(format!("cascade level {}", level)),
            );
            read = 1 - read;
        }

        (
            self.upload_kernel.dispatch_async(grid, &self.scene),
            self.clear_kernel.dispatch_async(grid, &self.cascades[0]),
            passes.chain(),
            self.download_kernel.dispatch_async(grid, &self.output),
            self.staging.copy_to_async(&mut self.staging_host),
        )
            .chain()
            .execute();

        for (pixel, staged) in output
            .pixels_mut()
            .iter_mut()
            .zip(self.staging_host.chunks_exact(4))
        {
            *pixel = Vec4::from_slice(staged);
        }
    }
}

#[tracked]
fn cast_interval(
    scene: &Tex2dView<Texel>,
    size: Expr<LVec2<i32>>,
    start: Expr<LVec2<f32>>,
    end: Expr<LVec2<f32>>,
    steps: Expr<u32>,
) -> Expr<Texel> {
    let step = (end - start) / steps.cast_f32();
    let radiance = LVec3::splat_expr(0.0_f32).var();
    let transmittance = 1.0_f32.var();
    for i in 0_u32.expr()..steps {
        if transmittance <= TRANSMITTANCE_CUTOFF {
            break;
        }
        let coord = (start + step * i.cast_f32()).cast_i32();
        if (coord >= 0).all() && (coord < size).all() {
            let sample = scene.read(coord.cast_u32());
            *radiance += LVec3::expr(sample.x, sample.y, sample.z) * (transmittance * sample.w);
            *transmittance *= 1.0_f32.expr() - sample.w;
        }
    }
    let radiance = **radiance;
    LVec4::expr(radiance.x, radiance.y, radiance.z, **transmittance)
}

fn merge_intervals(near: Expr<Texel>, far: Expr<Texel>) -> Expr<Texel> {
    LVec4::expr(
        near.x + far.x * near.w,
        near.y + far.y * near.w,
        near.z + far.z * near.w,
        near.w * far.w,
    )
}

#[tracked]
fn srgb_oetf(c: Expr<f32>) -> Expr<f32> {
    if c <= 0.0031308 {
        c * 12.92
    } else {
        c.powf(1.0 / 2.4) * 1.055 - 0.055
    }
}

#[tracked]
fn srgb_eotf(c: Expr<f32>) -> Expr<f32> {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn quantize_unorm8(c: Expr<f32>) -> Expr<f32> {
    (c.clamp(0.0, 1.0) * 255.0 + 0.5).floor() / 255.0
}

fn rand(uv: Expr<LVec2<f32>>) -> Expr<f32> {
    let dt = uv.x * 12.9898 + uv.y * 78.233;
    let sn = dt - (dt / PI).floor() * PI;
    (sn.sin() * 43758.5453).fract()
}

fn decode(policy: ColorPolicy, stored: Expr<Texel>) -> Expr<Texel> {
    match policy {
        ColorPolicy::Linear => stored,
        ColorPolicy::Quantized { .. } => LVec4::expr(
            srgb_eotf(stored.x),
            srgb_eotf(stored.y),
            srgb_eotf(stored.z),
            stored.w,
        ),
    }
}

fn encode(policy: ColorPolicy, linear: Expr<Texel>, pixel: Expr<LVec2<u32>>) -> Expr<Texel> {
    match policy {
        ColorPolicy::Linear => linear,
        ColorPolicy::Quantized { dither } => {
            let mut encoded = LVec3::expr(
                srgb_oetf(linear.x),
                srgb_oetf(linear.y),
                srgb_oetf(linear.z),
            );
            if dither {
                // Same shift as `color::dither`, from +2s down to -2s, held
                // under half a step.
                let shift = LVec3::from(color::DITHER_SHIFT).expr();
                let shift = shift * (rand(pixel.cast_f32()) * -4.0 + 2.0);
                let shift = luisa::max(shift, LVec3::splat_expr(-color::DITHER_LIMIT));
                let shift = luisa::min(shift, LVec3::splat_expr(color::DITHER_LIMIT));
                encoded = encoded + shift;
            }
            LVec4::expr(
                quantize_unorm8(encoded.x),
                quantize_unorm8(encoded.y),
                quantize_unorm8(encoded.z),
                quantize_unorm8(linear.w),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Needs a device; skipped where none is available.
    #[test]
    fn matches_scalar_reference() {
        let size = UVec2::new(48, 32);
        let settings = CascadeSettings {
            base_probe_size: 1,
            base_interval_length: 0.2,
            num_cascades: 4,
        };
        let Ok(mut context) = GpuContext::new(size, settings, ColorPolicy::Linear) else {
            return;
        };
        let scene = RasterBuffer::from_fn(size.x, size.y, |p| {
            if (p.as_vec2() - Vec2::new(20.0, 14.0)).length() < 4.0 {
                Vec4::new(1.0, 0.5, 0.25, 1.0)
            } else {
                Vec4::ZERO
            }
        });

        let mut expected = RasterBuffer::new(size.x, size.y);
        let mut buffers = [RasterBuffer::new(size.x, size.y), RasterBuffer::new(size.x, size.y)];
        for level in (0..settings.num_cascades).rev() {
            let pass = Pass {
                scene: &scene,
                settings: &settings,
                level,
                policy: ColorPolicy::Linear,
            };
            let [far, near] = &mut buffers;
            let target = if level == 0 { &mut expected } else { near };
            ScalarPass.run_pass(&pass, far, target);
            buffers.swap(0, 1);
        }

        let mut actual = RasterBuffer::new(size.x, size.y);
        context.render(&scene, &mut actual).unwrap();
        // Device trigonometry can move a sample across a pixel edge, so allow
        // a handful of outliers.
        let outliers = actual
            .pixels()
            .iter()
            .zip(expected.pixels())
            .filter(|(a, b)| (**a - **b).abs().max_element() > 1e-3)
            .count();
        assert!(outliers * 100 < actual.len(), "{outliers}");
    }

    #[test]
    fn dithered_empty_scene_stays_dark() {
        let size = UVec2::new(32, 32);
        let settings = CascadeSettings {
            base_probe_size: 1,
            base_interval_length: 0.2,
            num_cascades: 4,
        };
        let policy = ColorPolicy::Quantized { dither: true };
        let Ok(mut context) = GpuContext::new(size, settings, policy) else {
            return;
        };
        let mut output = RasterBuffer::new(size.x, size.y);
        context.render(&RasterBuffer::new(size.x, size.y), &mut output).unwrap();
        assert!(output.pixels().iter().all(|p| p.truncate() == Vec3::ZERO));
    }
}
