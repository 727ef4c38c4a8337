//! Two-dimensional global illumination with radiance cascades.
//!
//! A scene is a [`RasterBuffer`] of emitted radiance (rgb) and opacity (a).
//! The [`Pipeline`] runs one cascade pass per level, coarsest first, each
//! pass tracing a short interval per probe direction and merging it with the
//! four nearest probes of the level above. The finest pass yields the final
//! radiance buffer.

use std::{f32::consts::TAU, fs::File, path::Path};

use glam::{IVec2, UVec2, Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

pub mod buffer;
pub mod cascade;
pub mod color;
pub mod data;
pub mod error;
pub mod fastmath;
pub mod pipeline;
pub mod radiance;
pub mod trace;
pub mod world;

pub use buffer::RasterBuffer;
pub use cascade::{BilinearSamples, CascadeSettings, ProbeRay, RayLocation};
pub use color::{ColorPolicy, Interval};
pub use data::Settings;
pub use error::{ConfigError, Error, Result};
pub use fastmath::FastMath;
pub use pipeline::{Pipeline, PipelineOptions, StrategyKind};
pub use world::DiskScene;
