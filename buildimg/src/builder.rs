use std::{
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
};

use log::{debug, info, warn};
use rand::RngCore;

use crate::{
    cancel::Cancellation,
    image::ImageSpec,
    output_format::OutputFormat,
    plan::{plan_builds, BuildInvocation},
    runner::{CommandLine, ProcessRunner, Runner},
    Result,
};

pub const NAME_PREFIX: &str = "buildimg-";

const DOCKER: &str = "docker";

/// Generates a builder name from 8 random bytes, e.g. `buildimg-3f9a0c1d2e4b5a69`.
pub fn random_name<R: RngCore + ?Sized>(rng: &mut R) -> String {
    let mut key = [0u8; 8];
    rng.fill_bytes(&mut key);
    format!("{NAME_PREFIX}{}", hex::encode(key))
}

fn docker_command<I, S>(current_dir: Option<PathBuf>, args: I) -> CommandLine
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    CommandLine::new(DOCKER, args).with_current_dir(current_dir)
}

/// Configures and starts a [`Builder`].
#[derive(Default)]
pub struct BuilderOptions {
    name: Option<String>,
    name_generator: Option<Box<dyn FnOnce() -> String>>,
    runner: Option<Arc<dyn Runner>>,
    progress: Option<OutputFormat>,
    working_dir: Option<PathBuf>,
}

impl BuilderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a fixed builder name. An empty name is ignored.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into()).filter(|name| !name.is_empty());
        self
    }

    /// Generates the builder name when no name was given, instead of [`random_name`].
    pub fn name_generator(mut self, generator: impl FnOnce() -> String + 'static) -> Self {
        self.name_generator = Some(Box::new(generator));
        self
    }

    /// Runs all commands through `runner` instead of a [`ProcessRunner`].
    pub fn runner(mut self, runner: Arc<dyn Runner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn progress(mut self, progress: Option<OutputFormat>) -> Self {
        self.progress = progress;
        self
    }

    /// The directory in which the builder is created and removed.
    pub fn working_dir(mut self, working_dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(working_dir.into());
        self
    }

    /// Creates the builder instance. Nothing needs to be cleaned up when this fails.
    pub fn start(self, cancellation: &Cancellation) -> Result<Builder> {
        let Self {
            name,
            name_generator,
            runner,
            progress,
            working_dir,
        } = self;

        let name = match (name, name_generator) {
            (Some(name), _) => name,
            (None, Some(generator)) => generator(),
            (None, None) => random_name(&mut rand::thread_rng()),
        };
        let runner = runner.unwrap_or_else(|| Arc::new(ProcessRunner::new()));

        info!("creating builder {name}...");
        runner.run(
            cancellation,
            &docker_command(
                working_dir.clone(),
                ["buildx", "create", "--name", name.as_str()],
            ),
        )?;

        Ok(Builder {
            name,
            runner,
            progress,
            working_dir,
            did_shutdown: Mutex::new(false),
        })
    }
}

/// An ephemeral buildx builder instance. The instance is removed by [`Builder::shutdown`], or
/// when the value is dropped.
pub struct Builder {
    name: String,
    runner: Arc<dyn Runner>,
    progress: Option<OutputFormat>,
    working_dir: Option<PathBuf>,
    did_shutdown: Mutex<bool>,
}

impl Builder {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_shut_down(&self) -> bool {
        *self.did_shutdown.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Builds every target of `image`, one invocation at a time. Stops at the first invocation
    /// that fails; the results of earlier invocations are left in place.
    pub fn build(&self, cancellation: &Cancellation, image: &ImageSpec) -> Result<()> {
        if self.is_shut_down() {
            return Err(format!(
                "builder {name} has already been shut down",
                name = self.name
            )
            .into());
        }

        let invocations = plan_builds(image);
        debug!(
            "building {name} in {count} invocation(s)",
            name = image.name,
            count = invocations.len()
        );

        for invocation in &invocations {
            let platforms = invocation.platforms().join(",");
            match invocation.dest() {
                Some(dest) => info!("building {platforms} into {dest}..."),
                None => info!("building {platforms} and pushing {name}...", name = image.name),
            }
            self.runner
                .run(cancellation, &self.build_command(image, invocation))?;
        }

        Ok(())
    }

    fn build_command(&self, image: &ImageSpec, invocation: &BuildInvocation) -> CommandLine {
        let mut args = vec![
            "buildx".to_owned(),
            "build".to_owned(),
            format!("--platform={}", invocation.platforms().join(",")),
            format!("--file={}", image.dockerfile),
            format!("--builder={}", self.name),
        ];

        if let Some(progress) = self.progress {
            args.push(format!("--progress={progress}"));
        }

        for (flag, values) in [
            ("--build-arg", &image.build_args),
            ("--label", &image.labels),
            ("--secret", &image.secrets),
        ] {
            for value in values {
                args.push(flag.to_owned());
                args.push(value.clone());
            }
        }

        match invocation.dest() {
            Some(dest) => {
                args.push("-o".to_owned());
                args.push(format!("type=docker,dest={dest}"));
            }
            None => args.push("--push".to_owned()),
        }

        args.push("-t".to_owned());
        args.push(image.name.clone());
        args.push(image.path.clone());

        // Paths in the arguments are relative to our own working directory.
        docker_command(None, args)
    }

    /// Removes the builder instance. Returns `Ok` without doing anything if that already
    /// happened. When removal fails the builder stays alive and a later call tries again.
    pub fn shutdown(&self, cancellation: &Cancellation) -> Result<()> {
        let mut did_shutdown = self
            .did_shutdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if *did_shutdown {
            return Ok(());
        }

        info!("removing builder {name}...", name = self.name);
        self.runner.run(
            cancellation,
            &docker_command(
                self.working_dir.clone(),
                ["buildx", "rm", self.name.as_str()],
            ),
        )?;

        *did_shutdown = true;
        Ok(())
    }
}

impl Drop for Builder {
    fn drop(&mut self) {
        // Use a fresh token so that the builder is removed even after an interrupt.
        if let Err(error) = self.shutdown(&Cancellation::new()) {
            warn!("failed to remove builder {name}: {error}", name = self.name);
        }
    }
}
