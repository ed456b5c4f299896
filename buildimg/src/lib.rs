pub mod builder;
pub mod cancel;
pub mod cli;
pub mod image;
pub mod output_format;
pub mod plan;
pub mod process;
pub mod runner;
pub mod target;

pub(crate) mod git;
pub(crate) mod version;

pub use builder::{Builder, BuilderOptions};
pub use cancel::Cancellation;
pub use image::ImageSpec;
pub use output_format::OutputFormat;
pub use plan::{plan_builds, BuildInvocation};
pub use runner::{CommandLine, Runner};
pub use target::Target;

pub type Result<T, E = Box<dyn std::error::Error + Send + Sync + 'static>> =
    std::result::Result<T, E>;
