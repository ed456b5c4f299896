use std::{path::Path, sync::Arc};

use clap::Parser;
use constcat::concat;
use log::warn;

use crate::{
    builder::{BuilderOptions, NAME_PREFIX},
    cancel::Cancellation,
    git,
    image::ImageSpec,
    output_format::OutputFormat,
    runner::{DryRunRunner, ProcessRunner, Runner},
    target::Target,
    version::VERSION,
    Result,
};

pub const DEFAULT_DOCKERFILE: &str = "./Dockerfile";

#[derive(Debug, Parser)]
#[command(version = VERSION, about)]
pub struct Cli {
    /// The image name, without the tag.
    name: String,

    /// A platform to build, e.g. `linux/amd64`. The image is pushed unless an output file is
    /// given, e.g. `linux/arm64:arm64.tar`. Can be repeated.
    #[arg(long = "target", value_name = "PLATFORM[:OUTPUT]")]
    targets: Vec<Target>,

    /// A build argument, e.g. `VERSION=1`. Can be repeated.
    #[arg(long = "build-arg", value_name = "KEY=VALUE")]
    build_args: Vec<String>,

    /// A label, e.g. `org.opencontainers.image.source=...`. Can be repeated.
    #[arg(long = "label", value_name = "KEY=VALUE")]
    labels: Vec<String>,

    /// A secret exposed to the build, e.g. `id=github-token,src=github-token.txt`. Can be
    /// repeated.
    #[arg(long = "secret", value_name = "SPEC")]
    secrets: Vec<String>,

    /// The build context directory [default: the directory of the Dockerfile]
    #[arg(long = "path")]
    path: Option<String>,

    #[arg(long = "dockerfile", default_value = DEFAULT_DOCKERFILE, help = "The Dockerfile to use for the build")]
    dockerfile: String,

    /// The image tag [default: the first 8 characters of the git commit hash]
    #[arg(long = "tag")]
    tag: Option<String>,

    #[arg(long = "builder", help = concat!("The name of the builder to create [default: \"", NAME_PREFIX, "\" followed by 16 random hex digits]"))]
    builder: Option<String>,

    /// The progress output of the build.
    #[arg(long = "progress", value_enum)]
    progress: Option<OutputFormat>,

    /// Print the docker commands instead of running them.
    #[arg(long = "dry-run", default_value_t)]
    dry_run: bool,
}

/// Returns the directory containing `dockerfile`, or `.` if it has none.
fn context_dir(dockerfile: &str) -> String {
    match Path::new(dockerfile).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_string_lossy().into_owned(),
        _ => ".".to_owned(),
    }
}

fn validate_targets(targets: &[Target]) -> Result<()> {
    if let Some(target) = targets.iter().find(|target| target.platform().is_empty()) {
        return Err(format!(
            "invalid target {:?}: the platform must not be empty",
            target.to_string()
        )
        .into());
    }
    if targets.is_empty() {
        warn!("No targets were given so nothing will be built. Pass `--target <PLATFORM>` to build an image.");
    }
    Ok(())
}

impl Cli {
    pub fn run(self) -> Result<()> {
        let cancellation = Cancellation::new();
        cancellation.cancel_on_ctrlc()?;

        let runner: Arc<dyn Runner> = if self.dry_run {
            Arc::new(DryRunRunner)
        } else {
            Arc::new(ProcessRunner::new())
        };

        let image = self.run_with(runner, &cancellation, git::short_commit_hash)?;

        println!("{image}");

        Ok(())
    }

    /// Creates the builder, builds every target through `runner` and removes the builder again.
    /// Returns the image reference. `commit_hash` is only called when no tag was given.
    pub fn run_with(
        self,
        runner: Arc<dyn Runner>,
        cancellation: &Cancellation,
        commit_hash: impl FnOnce() -> Result<String>,
    ) -> Result<String> {
        let Cli {
            name,
            targets,
            build_args,
            labels,
            secrets,
            path,
            dockerfile,
            tag,
            builder,
            progress,
            dry_run: _,
        } = self;

        validate_targets(&targets)?;

        let tag = match tag.filter(|tag| !tag.is_empty()) {
            Some(tag) => tag,
            None => commit_hash().map_err(|error| format!("git rev-parse: {error}"))?,
        };

        let image = ImageSpec {
            path: path.unwrap_or_else(|| context_dir(&dockerfile)),
            dockerfile,
            name: format!("{name}:{tag}"),
            targets,
            build_args,
            labels,
            secrets,
        };

        let mut options = BuilderOptions::new().runner(runner).progress(progress);
        if let Some(name) = builder {
            options = options.name(name);
        }
        let builder = options
            .start(cancellation)
            .map_err(|error| format!("start builder: {error}"))?;

        let result = builder.build(cancellation, &image);

        // Removes the builder whatever the outcome of the build, failures are only logged.
        drop(builder);

        result.map_err(|error| format!("build: {error}"))?;

        Ok(image.name)
    }
}
