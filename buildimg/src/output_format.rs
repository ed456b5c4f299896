use std::fmt;

use clap::ValueEnum;

/// The progress output of `docker buildx build`, see its `--progress` option.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    /// Raw JSON progress events.
    #[value(name = "rawjson")]
    RawJson,
    Plain,
    Auto,
    None,
    Tty,
    Quiet,
}

impl OutputFormat {
    pub const fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::RawJson => "rawjson",
            OutputFormat::Plain => "plain",
            OutputFormat::Auto => "auto",
            OutputFormat::None => "none",
            OutputFormat::Tty => "tty",
            OutputFormat::Quiet => "quiet",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(value: &str) -> Result<OutputFormat, String> {
        OutputFormat::from_str(value, false)
    }

    #[test]
    fn accepts_every_format() {
        for value in ["rawjson", "plain", "auto", "none", "tty", "quiet"] {
            assert_eq!(parse(value).unwrap().as_str(), value);
        }
        assert_eq!(OutputFormat::value_variants().len(), 6);
    }

    #[test]
    fn rejects_other_values() {
        for value in ["", "json", "PLAIN", " plain", "raw-json", "verbose"] {
            assert!(parse(value).is_err(), "{value:?} should be rejected");
        }
    }

    #[test]
    fn clap_names_match_display() {
        for format in OutputFormat::value_variants() {
            let value = format.to_possible_value().unwrap();
            assert_eq!(value.get_name(), format.to_string());
        }
    }
}
