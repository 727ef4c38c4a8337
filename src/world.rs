use super::*;

/// A single round emitter, the scene the demo and tests light up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskScene {
    /// Defaults to the middle of the buffer.
    pub center: Option<[f32; 2]>,
    pub radius: f32,
    /// Any CSS color; the alpha channel is ignored.
    pub color: String,
    pub opacity: f32,
}

impl Default for DiskScene {
    fn default() -> Self {
        Self {
            center: None,
            radius: 7.5,
            color: "white".to_string(),
            opacity: 1.0,
        }
    }
}

impl DiskScene {
    pub fn center(&self, size: UVec2) -> Vec2 {
        self.center
            .map(Vec2::from)
            .unwrap_or_else(|| size.as_vec2() / 2.0)
    }

    /// Linear radiance of the emitter.
    pub fn radiance(&self) -> Result<Vec3> {
        let color = csscolorparser::parse(&self.color)?;
        let [r, g, b, _] = color.to_array();
        Ok(Vec3::new(r, g, b))
    }

    pub fn render(&self, size: UVec2) -> Result<RasterBuffer> {
        Ok(disk(
            size,
            self.center(size),
            self.radius,
            self.radiance()?.extend(self.opacity),
        ))
    }
}

/// Fills every pixel whose center lies strictly inside the circle with
/// `value`, leaving the rest empty.
pub fn disk(size: UVec2, center: Vec2, radius: f32, value: Vec4) -> RasterBuffer {
    RasterBuffer::from_fn(size.x, size.y, |pixel| {
        if (pixel.as_vec2() + 0.5).distance(center) < radius {
            value
        } else {
            Vec4::ZERO
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_disk_is_centered_and_opaque() {
        let scene = DiskScene::default().render(UVec2::new(64, 64)).unwrap();
        assert_eq!(scene.get(IVec2::new(32, 32)), Vec4::ONE);
        assert_eq!(scene.get(IVec2::new(31, 31)), Vec4::ONE);
        assert_eq!(scene.get(IVec2::new(32, 25)), Vec4::ONE);
        assert_eq!(scene.get(IVec2::new(32, 24)), Vec4::ZERO);
        assert_eq!(scene.get(IVec2::new(0, 0)), Vec4::ZERO);

        let lit = scene.pixels().iter().filter(|p| p.w > 0.0).count() as f32;
        let area = std::f32::consts::PI * 7.5 * 7.5;
        assert!((lit - area).abs() / area < 0.05, "{lit}");
    }

    #[test]
    fn colors_parse_from_css() {
        let scene = DiskScene {
            center: Some([4.0, 4.0]),
            radius: 2.0,
            color: "#ff8000".to_string(),
            opacity: 0.5,
        };
        let buffer = scene.render(UVec2::new(8, 8)).unwrap();
        let value = buffer.get(IVec2::new(4, 4));
        assert_eq!(value.x, 1.0);
        assert!((value.y - 128.0 / 255.0).abs() < 1e-6);
        assert_eq!(value.z, 0.0);
        assert_eq!(value.w, 0.5);

        let bad = DiskScene {
            color: "not a color".to_string(),
            ..Default::default()
        };
        assert!(matches!(bad.render(UVec2::new(8, 8)), Err(Error::Color(_))));
    }
}
