use super::*;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub resolution: [u32; 2],
    pub cascades: CascadeSettings,
    pub strategy: StrategyKind,
    pub color_policy: ColorPolicy,
    pub fast_math: bool,
    pub scene: DiskScene,
    /// Display image, written as PNG.
    pub output: String,
    /// Final float buffer, written as TIFF when set.
    pub raw_output: Option<String>,
}
impl Default for Settings {
    fn default() -> Self {
        Self {
            resolution: [512, 512],
            cascades: CascadeSettings::default(),
            strategy: StrategyKind::Parallel,
            color_policy: ColorPolicy::Linear,
            fast_math: false,
            scene: DiskScene::default(),
            output: "output.png".to_string(),
            raw_output: None,
        }
    }
}

impl Settings {
    /// Reads settings from a RON file. A missing file gives the defaults; a
    /// malformed one is an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match File::open(path) {
            Ok(file) => Ok(ron::de::from_reader(file)?),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No settings at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(error) => Err(error.into()),
        }
    }

    pub fn size(&self) -> UVec2 {
        UVec2::from(self.resolution)
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            strategy: self.strategy,
            policy: self.color_policy,
            fast_math: self.fast_math,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_settings_fill_in_defaults() {
        let settings: Settings = ron::from_str(
            "(resolution: (128, 64), cascades: (num_cascades: 4), color_policy: Quantized(dither: true))",
        )
        .unwrap();
        assert_eq!(settings.size(), UVec2::new(128, 64));
        assert_eq!(settings.cascades.num_cascades, 4);
        assert_eq!(settings.cascades.base_probe_size, 1);
        assert_eq!(settings.cascades.base_interval_length, 0.2);
        assert_eq!(settings.color_policy, ColorPolicy::Quantized { dither: true });
        assert_eq!(settings.strategy, StrategyKind::Parallel);
        assert_eq!(settings.scene, DiskScene::default());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let settings = Settings::load_or_default("settings/does-not-exist.ron").unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let path = std::env::temp_dir().join(format!("rc2d-settings-{}.ron", std::process::id()));
        std::fs::write(&path, "(resolution: oops)").unwrap();
        let result = Settings::load_or_default(&path);
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(Error::Settings(_))));
    }

    #[test]
    fn shipped_settings_parse() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("settings/default.ron");
        let settings = Settings::load_or_default(path).unwrap();
        assert_eq!(settings.cascades, CascadeSettings::default());
        assert!(settings.cascades.validate(settings.size()).is_ok());
    }
}
