use super::*;

/// Every probe direction at level `N` splits into this many directions at
/// level `N + 1`: probe size doubles per axis, so the count quadruples.
pub const BRANCHES: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeSettings {
    /// Probe size, in pixels per axis, at the finest level. Also the number
    /// of directions per axis stored by each finest probe.
    pub base_probe_size: u32,
    /// Radial unit that interval ranges are multiples of.
    pub base_interval_length: f32,
    pub num_cascades: u32,
}

impl Default for CascadeSettings {
    fn default() -> Self {
        Self {
            base_probe_size: 1,
            base_interval_length: 0.2,
            num_cascades: 8,
        }
    }
}

/// `0` for the finest level, `4^level` above it.
pub fn interval_scale(level: u32) -> f32 {
    if level == 0 {
        0.0
    } else {
        4.0_f32.powi(level as i32)
    }
}

/// Angle of a direction slot, centered in its bin so no slot lies on an axis.
pub fn facing_angle(facing: u32, facing_count: u32) -> f32 {
    TAU * ((facing as f32 + 0.5) / facing_count as f32)
}

impl CascadeSettings {
    pub fn probe_size(&self, level: u32) -> u32 {
        self.base_probe_size << level
    }
    pub fn facing_count(&self, level: u32) -> u32 {
        let probe_size = self.probe_size(level);
        probe_size * probe_size
    }
    /// Start and end distance of the rays cast at `level`. Each level picks
    /// up where the previous one stops.
    pub fn interval(&self, level: u32) -> Vec2 {
        self.base_interval_length * Vec2::new(interval_scale(level), interval_scale(level + 1))
    }

    /// Checks that the hierarchy fits in a buffer of `size` pixels.
    pub fn validate(&self, size: UVec2) -> Result<(), ConfigError> {
        if size.x == 0 || size.y == 0 {
            return Err(ConfigError::EmptyResolution {
                width: size.x,
                height: size.y,
            });
        }
        if self.num_cascades == 0 {
            return Err(ConfigError::NoCascades);
        }
        if self.base_probe_size == 0 {
            return Err(ConfigError::ZeroProbeSize);
        }
        if !(self.base_interval_length > 0.0) {
            return Err(ConfigError::NonPositiveInterval(self.base_interval_length));
        }
        let top = self.num_cascades - 1;
        let probe_size = (self.base_probe_size as u64)
            .checked_shl(top)
            .filter(|size| size >> top == self.base_probe_size as u64)
            .unwrap_or(u64::MAX);
        if probe_size > size.min_element() as u64 {
            return Err(ConfigError::ProbeTooLarge {
                probe_size,
                width: size.x,
                height: size.y,
            });
        }
        Ok(())
    }

    /// Resolves which probe and direction a pixel of the level's cascade
    /// buffer stores.
    pub fn probe(&self, pixel: UVec2, level: u32, fast_math: &FastMath) -> ProbeRay {
        let probe_size = self.probe_size(level);
        let location = RayLocation {
            probe: pixel / probe_size,
            facing: {
                let facing = pixel % probe_size;
                facing.x + facing.y * probe_size
            },
            level,
        };
        let facing_count = self.facing_count(level);
        ProbeRay {
            location,
            // Center of the probe's block of pixels.
            position: (location.probe.as_vec2() + 0.5) * probe_size as f32,
            facing_count,
            direction: fast_math.direction(facing_angle(location.facing, facing_count)),
        }
    }

    /// Where `probe_position` falls among the probes of the next level up.
    pub fn bilinear_samples(&self, probe_position: Vec2, level: u32) -> BilinearSamples {
        let next_probe_size = self.probe_size(level + 1) as f32;
        let base = probe_position / next_probe_size - 0.5;
        let floor = base.floor();
        BilinearSamples {
            base_index: floor.as_ivec2(),
            fract: base - floor,
        }
    }

    /// Texel of the level-`N + 1` buffer holding direction `facing` of the
    /// probe at `index`. Probe origins are clamped to `[0.5, size - probe
    /// size]` so edge probes reuse their inward neighbor instead of reading
    /// past the buffer.
    pub fn bilinear_texel(&self, index: IVec2, facing: u32, level: u32, size: UVec2) -> IVec2 {
        let next_probe_size = self.probe_size(level + 1);
        let origin = (index * next_probe_size as i32).as_vec2();
        let origin = origin
            .max(Vec2::splat(0.5))
            .min(size.as_vec2() - next_probe_size as f32);
        origin.as_ivec2()
            + IVec2::new(
                (facing % next_probe_size) as i32,
                (facing / next_probe_size) as i32,
            )
    }
}

/// A probe direction, addressed by its probe index and slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RayLocation {
    pub probe: UVec2,
    pub facing: u32,
    pub level: u32,
}

impl RayLocation {
    /// Inverse of [`CascadeSettings::probe`]: the buffer pixel storing this ray.
    pub fn pixel(&self, settings: &CascadeSettings) -> UVec2 {
        let probe_size = settings.probe_size(self.level);
        self.probe * probe_size + UVec2::new(self.facing % probe_size, self.facing / probe_size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeRay {
    pub location: RayLocation,
    pub position: Vec2,
    pub facing_count: u32,
    pub direction: Vec2,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BilinearSamples {
    pub base_index: IVec2,
    pub fract: Vec2,
}

impl BilinearSamples {
    pub const OFFSETS: [IVec2; 4] = [
        IVec2::new(0, 0),
        IVec2::new(1, 0),
        IVec2::new(0, 1),
        IVec2::new(1, 1),
    ];

    pub fn weights(&self) -> [f32; 4] {
        let fract = self.fract;
        [
            (1.0 - fract.x) * (1.0 - fract.y),
            fract.x * (1.0 - fract.y),
            (1.0 - fract.x) * fract.y,
            fract.x * fract.y,
        ]
    }

    pub fn sample(&self, index: usize) -> (IVec2, f32) {
        (self.base_index + Self::OFFSETS[index], self.weights()[index])
    }

    /// The four neighboring probes with their weights.
    pub fn iter(&self) -> impl Iterator<Item = (IVec2, f32)> + '_ {
        let weights = self.weights();
        Self::OFFSETS
            .into_iter()
            .zip(weights)
            .map(|(offset, weight)| (self.base_index + offset, weight))
    }
}
