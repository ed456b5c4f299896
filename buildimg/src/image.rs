use crate::target::Target;

/// Everything needed to build one image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageSpec {
    /// The build context directory.
    pub path: String,
    pub dockerfile: String,
    /// The full image reference, including the tag.
    pub name: String,
    pub targets: Vec<Target>,
    pub build_args: Vec<String>,
    pub labels: Vec<String>,
    pub secrets: Vec<String>,
}

impl ImageSpec {
    pub fn new(
        path: impl Into<String>,
        dockerfile: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            dockerfile: dockerfile.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_targets<I: IntoIterator<Item = Target>>(mut self, targets: I) -> Self {
        self.targets.extend(targets);
        self
    }

    pub fn with_build_args<I: IntoIterator<Item = S>, S: Into<String>>(mut self, args: I) -> Self {
        self.build_args.extend(args.into_iter().map(S::into));
        self
    }

    pub fn with_labels<I: IntoIterator<Item = S>, S: Into<String>>(mut self, labels: I) -> Self {
        self.labels.extend(labels.into_iter().map(S::into));
        self
    }

    pub fn with_secrets<I: IntoIterator<Item = S>, S: Into<String>>(mut self, secrets: I) -> Self {
        self.secrets.extend(secrets.into_iter().map(S::into));
        self
    }
}
