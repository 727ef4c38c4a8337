use super::*;

/// Marches stop once this little light gets through.
pub const TRANSMITTANCE_CUTOFF: f32 = 0.001;

/// Samples taken per interval. Coarser levels cast longer intervals, so
/// they take more samples.
pub fn step_count(level: u32) -> u32 {
    32 << level
}

/// Front-to-back march over a scene segment. Yields the interval
/// accumulated so far after every sample.
///
/// Sample coordinates are truncated toward zero, not floored, and samples
/// outside the scene read as empty space.
#[derive(Debug, Clone)]
pub struct IntervalMarch<'a> {
    scene: &'a RasterBuffer,
    start: Vec2,
    step: Vec2,
    steps: u32,
    index: u32,
    accumulated: Interval,
}

impl<'a> IntervalMarch<'a> {
    pub fn new(scene: &'a RasterBuffer, start: Vec2, end: Vec2, level: u32) -> Self {
        let steps = step_count(level);
        Self {
            scene,
            start,
            step: (end - start) / steps as f32,
            steps,
            index: 0,
            accumulated: Interval::TRANSPARENT,
        }
    }
}

impl Iterator for IntervalMarch<'_> {
    type Item = Interval;

    fn next(&mut self) -> Option<Interval> {
        if self.index >= self.steps || self.accumulated.transmittance <= TRANSMITTANCE_CUTOFF {
            return None;
        }
        let coord = (self.start + self.step * self.index as f32).as_ivec2();
        self.index += 1;

        let sample = self.scene.get(coord);
        let Interval {
            radiance,
            transmittance,
        } = &mut self.accumulated;
        *radiance += sample.truncate() * (*transmittance * sample.w);
        *transmittance *= 1.0 - sample.w;
        Some(self.accumulated)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some((self.steps - self.index) as usize))
    }
}

/// Radiance and transmittance of the scene along `start..end`.
pub fn cast_interval(scene: &RasterBuffer, start: Vec2, end: Vec2, level: u32) -> Interval {
    IntervalMarch::new(scene, start, end, level)
        .last()
        .unwrap_or(Interval::TRANSPARENT)
}

/// Casts the level's interval along a probe ray.
pub fn cast_ray(scene: &RasterBuffer, ray: &ProbeRay, range: Vec2) -> Interval {
    cast_interval(
        scene,
        ray.position + ray.direction * range.x,
        ray.position + ray.direction * range.y,
        ray.location.level,
    )
}
