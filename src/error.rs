use thiserror::Error;

/// Problems with the requested cascade layout, detected before any pass runs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("at least one cascade is required")]
    NoCascades,
    #[error("base probe size must be at least 1")]
    ZeroProbeSize,
    #[error("base interval length must be positive, got {0}")]
    NonPositiveInterval(f32),
    #[error("buffer dimensions must be positive, got {width}x{height}")]
    EmptyResolution { width: u32, height: u32 },
    #[error("probe size {probe_size} exceeds the {width}x{height} buffer")]
    ProbeTooLarge {
        probe_size: u64,
        width: u32,
        height: u32,
    },
    #[error("expected a {expected:?} buffer, found {found:?}")]
    SizeMismatch { expected: [u32; 2], found: [u32; 2] },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("execution environment unsupported: {0}")]
    Environment(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("failed to parse settings: {0}")]
    Settings(#[from] ron::error::SpannedError),
    #[error("invalid color: {0}")]
    Color(#[from] csscolorparser::ParseColorError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
