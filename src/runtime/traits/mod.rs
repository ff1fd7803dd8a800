// ABOUTME: Composable capability traits for container runtimes.
// ABOUTME: Defines ImageOps, ContainerOps, VolumeOps, LogOps, RuntimeInfo and FullRuntime.

mod container;
mod image;
mod logs;
mod runtime_info;
pub(crate) mod sealed;
mod shared_types;
mod volume;

pub use container::{ContainerError, ContainerFilters, ContainerOps, ContainerSummary, StdinWriter};
pub use image::{ImageError, ImageOps};
pub use logs::{LogError, LogLine, LogOps, LogOptions, LogStream, collect_logs};
pub use runtime_info::{RuntimeInfo, RuntimeInfoError};
pub use shared_types::*;
pub use volume::{VolumeError, VolumeOps};

/// Everything the upgrade engine needs from a runtime.
pub trait FullRuntime: ImageOps + ContainerOps + VolumeOps + LogOps + RuntimeInfo {}

impl<T> FullRuntime for T where T: ImageOps + ContainerOps + VolumeOps + LogOps + RuntimeInfo {}
