use std::{convert::Infallible, fmt, str::FromStr};

/// A platform to build for, optionally exported to a local file instead of being pushed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    platform: String,
    output: Option<String>,
}

impl Target {
    /// Creates a target. An empty `output` is treated as no output.
    pub fn new(platform: impl Into<String>, output: Option<impl Into<String>>) -> Self {
        Self {
            platform: platform.into(),
            output: output.map(Into::into).filter(|output| !output.is_empty()),
        }
    }

    pub fn push(platform: impl Into<String>) -> Self {
        Self::new(platform, None::<String>)
    }

    pub fn export(platform: impl Into<String>, output: impl Into<String>) -> Self {
        Self::new(platform, Some(output))
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// The local destination the image is exported to, if any.
    pub fn output(&self) -> Option<&str> {
        self.output.as_deref()
    }

    /// Returns true if the result is pushed to a registry rather than exported locally.
    pub fn is_push(&self) -> bool {
        self.output.is_none()
    }
}

impl FromStr for Target {
    type Err = Infallible;

    /// Parses `platform` or `platform:output`, splitting on the first colon and trimming
    /// whitespace around both parts.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (platform, output) = match value.split_once(':') {
            Some((platform, output)) => (platform, Some(output.trim())),
            None => (value, None),
        };
        Ok(Self::new(platform.trim(), output))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.output {
            Some(output) => write!(f, "{}:{}", self.platform, output),
            None => f.write_str(&self.platform),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(value: &str) -> Target {
        value.parse().unwrap()
    }

    #[test]
    fn parses_platform_only() {
        let target = parse("linux/amd64");
        assert_eq!(target.platform(), "linux/amd64");
        assert_eq!(target.output(), None);
        assert!(target.is_push());
    }

    #[test]
    fn parses_platform_and_output() {
        let target = parse(" linux/arm64 : out.tar ");
        assert_eq!(target.platform(), "linux/arm64");
        assert_eq!(target.output(), Some("out.tar"));
        assert!(!target.is_push());
    }

    #[test]
    fn splits_on_first_colon_only() {
        let target = parse("linux/amd64:C:/images/amd64.tar");
        assert_eq!(target.platform(), "linux/amd64");
        assert_eq!(target.output(), Some("C:/images/amd64.tar"));
    }

    #[test]
    fn keeps_internal_whitespace() {
        let target = parse("  my platform :  my output.tar ");
        assert_eq!(target, Target::export("my platform", "my output.tar"));
    }

    #[test]
    fn empty_output_means_push() {
        assert_eq!(parse("linux/amd64:"), Target::push("linux/amd64"));
        assert_eq!(parse("linux/amd64 :   "), Target::push("linux/amd64"));
    }

    #[test]
    fn never_fails() {
        assert_eq!(parse(""), Target::push(""));
        assert_eq!(parse(":"), Target::push(""));
    }

    #[test]
    fn display_is_inverse_of_parse() {
        for value in ["linux/amd64", "linux/arm64:out.tar", "linux/arm/v7:a b.tar"] {
            assert_eq!(parse(value).to_string(), value);
        }
        assert_eq!(parse(" linux/arm64 : out.tar ").to_string(), "linux/arm64:out.tar");
    }
}
