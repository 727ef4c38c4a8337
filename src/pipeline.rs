use std::time::Instant;

use super::*;
use radiance::{CascadePass, GpuContext, ParallelPass, Pass, ScalarPass};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyKind {
    /// Single-threaded, exact math.
    Scalar,
    /// Tiled across the rayon thread pool.
    #[default]
    Parallel,
    /// Compute kernels on the default device. Needs the `gpu` feature.
    Gpu,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    pub strategy: StrategyKind,
    pub policy: ColorPolicy,
    /// Table trigonometry and approximate `pow` in the parallel strategy.
    /// The scalar strategy always uses exact math.
    pub fast_math: bool,
}

enum Backend {
    Cpu(Box<dyn CascadePass>),
    Gpu(GpuContext),
}

impl Backend {
    fn cpu(strategy: StrategyKind, fast_math: bool) -> Self {
        match strategy {
            StrategyKind::Scalar => Self::Cpu(Box::new(ScalarPass)),
            StrategyKind::Parallel | StrategyKind::Gpu => {
                Self::Cpu(Box::new(ParallelPass::new(FastMath::new(fast_math))))
            }
        }
    }

    fn new(size: UVec2, settings: CascadeSettings, options: PipelineOptions) -> Self {
        if options.strategy != StrategyKind::Gpu {
            return Self::cpu(options.strategy, options.fast_math);
        }
        match GpuContext::new(size, settings, options.policy) {
            Ok(context) => Self::Gpu(context),
            Err(error) => {
                log::warn!("GPU strategy unavailable, falling back to parallel: {error}");
                Self::cpu(StrategyKind::Parallel, options.fast_math)
            }
        }
    }

    fn kind(&self) -> StrategyKind {
        match self {
            Self::Cpu(strategy) => strategy.kind(),
            Self::Gpu(_) => StrategyKind::Gpu,
        }
    }
}

/// Runs every cascade level over a scene, coarsest first.
///
/// Owns the two intermediate cascade buffers. Level `N` reads the buffer
/// level `N + 1` wrote, and writes the other one; the finest level writes the
/// caller's output instead. Nothing but buffer contents carries over from one
/// render to the next.
pub struct Pipeline {
    size: UVec2,
    settings: CascadeSettings,
    options: PipelineOptions,
    backend: Backend,
    cascades: [RasterBuffer; 2],
}

fn cascade_buffers(size: UVec2) -> [RasterBuffer; 2] {
    [
        RasterBuffer::new(size.x, size.y),
        RasterBuffer::new(size.x, size.y),
    ]
}

impl Pipeline {
    pub fn new(size: UVec2, settings: CascadeSettings, options: PipelineOptions) -> Result<Self> {
        settings.validate(size)?;
        log::info!(
            "{}x{} pipeline: {} cascades, base probe size {}, base interval {}, {:?} policy",
            size.x,
            size.y,
            settings.num_cascades,
            settings.base_probe_size,
            settings.base_interval_length,
            options.policy,
        );
        let backend = Backend::new(size, settings, options);
        log::info!("Running the {:?} strategy", backend.kind());
        Ok(Self {
            size,
            settings,
            options,
            backend,
            cascades: cascade_buffers(size),
        })
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }
    pub fn settings(&self) -> &CascadeSettings {
        &self.settings
    }
    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }
    /// The strategy that actually runs, which differs from the requested
    /// one after a fallback.
    pub fn active_strategy(&self) -> StrategyKind {
        self.backend.kind()
    }

    /// Reallocates every buffer for `size`. The scene has to be regenerated at
    /// the new size by the caller.
    pub fn resize(&mut self, size: UVec2) -> Result<()> {
        self.settings.validate(size)?;
        log::debug!("Resizing pipeline to {}x{}", size.x, size.y);
        self.size = size;
        self.cascades = cascade_buffers(size);
        if let Backend::Gpu(_) = self.backend {
            self.backend = Backend::new(size, self.settings, self.options);
        }
        Ok(())
    }

    pub fn render(&mut self, scene: &RasterBuffer) -> Result<RasterBuffer> {
        let mut output = RasterBuffer::new(self.size.x, self.size.y);
        self.render_into(scene, &mut output)?;
        Ok(output)
    }

    pub fn render_into(&mut self, scene: &RasterBuffer, output: &mut RasterBuffer) -> Result<()> {
        for buffer in [scene, &*output] {
            if buffer.size() != self.size {
                return Err(ConfigError::SizeMismatch {
                    expected: self.size.to_array(),
                    found: buffer.size().to_array(),
                }
                .into());
            }
        }
        let start = Instant::now();

        let device_result = match &mut self.backend {
            Backend::Gpu(context) => Some(context.render(scene, output)),
            Backend::Cpu(_) => None,
        };
        match device_result {
            Some(Ok(())) => {
                log::debug!("GPU render took {:?}", start.elapsed());
                return Ok(());
            }
            Some(Err(error)) => {
                log::warn!("GPU render failed, falling back to parallel: {error}");
                self.backend = Backend::cpu(StrategyKind::Parallel, self.options.fast_math);
            }
            None => {}
        }

        if let Backend::Cpu(strategy) = &self.backend {
            self.cascades[0].fill(Vec4::ZERO);
            let mut read = 0;
            for level in (0..self.settings.num_cascades).rev() {
                let pass = Pass {
                    scene,
                    settings: &self.settings,
                    level,
                    policy: self.options.policy,
                };
                let [first, second] = &mut self.cascades;
                let (far, next) = if read == 0 {
                    (&*first, second)
                } else {
                    (&*second, first)
                };
                let target = if level == 0 { &mut *output } else { next };

                let pass_start = Instant::now();
                strategy.run_pass(&pass, far, target);
                log::debug!("Level {} took {:?}", level, pass_start.elapsed());
                read = 1 - read;
            }
            log::debug!("{:?} render took {:?}", strategy.kind(), start.elapsed());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(num_cascades: u32) -> CascadeSettings {
        CascadeSettings {
            base_probe_size: 1,
            base_interval_length: 0.2,
            num_cascades,
        }
    }

    #[test]
    fn configuration_errors_surface_before_rendering() {
        let options = PipelineOptions::default();
        assert!(matches!(
            Pipeline::new(UVec2::new(32, 32), settings(0), options),
            Err(Error::Config(ConfigError::NoCascades))
        ));
        assert!(matches!(
            Pipeline::new(UVec2::new(32, 0), settings(3), options),
            Err(Error::Config(ConfigError::EmptyResolution { .. }))
        ));
        assert!(matches!(
            Pipeline::new(UVec2::new(32, 16), settings(6), options),
            Err(Error::Config(ConfigError::ProbeTooLarge { probe_size: 32, .. }))
        ));
    }

    #[test]
    fn mismatched_buffers_are_rejected() {
        let mut pipeline =
            Pipeline::new(UVec2::new(16, 16), settings(3), PipelineOptions::default()).unwrap();
        let scene = RasterBuffer::new(16, 8);
        assert!(matches!(
            pipeline.render(&scene),
            Err(Error::Config(ConfigError::SizeMismatch {
                expected: [16, 16],
                found: [16, 8]
            }))
        ));
        let scene = RasterBuffer::new(16, 16);
        let mut output = RasterBuffer::new(8, 8);
        assert!(pipeline.render_into(&scene, &mut output).is_err());
    }

    #[test]
    fn failed_resize_keeps_the_old_size() {
        let mut pipeline =
            Pipeline::new(UVec2::new(64, 64), settings(6), PipelineOptions::default()).unwrap();
        assert!(pipeline.resize(UVec2::new(16, 16)).is_err());
        assert_eq!(pipeline.size(), UVec2::new(64, 64));
        pipeline.resize(UVec2::new(32, 40)).unwrap();
        assert_eq!(pipeline.render(&RasterBuffer::new(32, 40)).unwrap().size(), UVec2::new(32, 40));
    }

    #[test]
    fn requested_cpu_strategies_run_as_requested() {
        for strategy in [StrategyKind::Scalar, StrategyKind::Parallel] {
            let options = PipelineOptions {
                strategy,
                ..Default::default()
            };
            let pipeline = Pipeline::new(UVec2::new(16, 16), settings(2), options).unwrap();
            assert_eq!(pipeline.active_strategy(), strategy);
        }
    }

    #[cfg(not(feature = "gpu"))]
    #[test_log::test]
    fn gpu_falls_back_to_parallel() {
        let options = PipelineOptions {
            strategy: StrategyKind::Gpu,
            ..Default::default()
        };
        let mut pipeline = Pipeline::new(UVec2::new(16, 16), settings(3), options).unwrap();
        assert_eq!(pipeline.active_strategy(), StrategyKind::Parallel);
        assert_eq!(pipeline.options().strategy, StrategyKind::Gpu);
        let output = pipeline.render(&RasterBuffer::new(16, 16)).unwrap();
        assert!(output.pixels().iter().all(|p| *p == Vec4::ZERO));
    }
}
