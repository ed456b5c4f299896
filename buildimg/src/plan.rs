use std::slice;

use crate::image::ImageSpec;

/// One `docker buildx build` invocation derived from an [`ImageSpec`].
///
/// Buildx can only produce a multi-platform manifest list when pushing to a registry, a local
/// export holds exactly one platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildInvocation<'a> {
    Export { platform: &'a str, dest: &'a str },
    Push { platforms: Vec<&'a str> },
}

impl<'a> BuildInvocation<'a> {
    pub fn platforms(&self) -> &[&'a str] {
        match self {
            BuildInvocation::Export { platform, .. } => slice::from_ref(platform),
            BuildInvocation::Push { platforms } => platforms,
        }
    }

    pub fn dest(&self) -> Option<&'a str> {
        match *self {
            BuildInvocation::Export { dest, .. } => Some(dest),
            BuildInvocation::Push { .. } => None,
        }
    }
}

/// Groups the targets of `image` into as few invocations as possible: one per export target, in
/// order, followed by a single invocation pushing all remaining platforms. Platforms are not
/// deduplicated across the two groups.
pub fn plan_builds(image: &ImageSpec) -> Vec<BuildInvocation<'_>> {
    let mut platforms_to_push = Vec::new();
    let mut invocations = Vec::new();

    for target in &image.targets {
        match target.output() {
            Some(dest) => invocations.push(BuildInvocation::Export {
                platform: target.platform(),
                dest,
            }),
            None => platforms_to_push.push(target.platform()),
        }
    }

    if !platforms_to_push.is_empty() {
        invocations.push(BuildInvocation::Push {
            platforms: platforms_to_push,
        });
    }

    invocations
}
