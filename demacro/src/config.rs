use std::fmt;
use std::str::FromStr;

/// Width of the C `int` type on the translation target
///
/// Enumerators are `int`-typed, so an integral constant expression can only
/// become an enumerator if its value is representable at this width.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IntSize {
    /// 16-bit `int` (small embedded targets)
    Int16,
    /// 32-bit `int`
    #[default]
    Int32,
}

impl fmt::Display for IntSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntSize::Int16 => write!(f, "16"),
            IntSize::Int32 => write!(f, "32"),
        }
    }
}

impl FromStr for IntSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "16" => Ok(IntSize::Int16),
            "32" => Ok(IntSize::Int32),
            other => Err(format!("invalid int size `{other}`, expected 16 or 32")),
        }
    }
}

/// Configuration for macro translation
#[derive(Clone, Debug, Default)]
pub struct TranslationConfig {
    /// Width of `int` on the target, used by the enum fit check
    pub int_size: IntSize,
    /// Source-root prefix macros must be defined under to be considered.
    /// An empty prefix accepts every macro with a valid definition location.
    pub source_prefix: String,
    /// Program name written into the CSV report
    pub program_name: String,
}

impl TranslationConfig {
    /// Create a configuration with the defaults (32-bit int, no source
    /// prefix restriction)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the target int width
    #[must_use]
    pub fn with_int_size(mut self, int_size: IntSize) -> Self {
        self.int_size = int_size;
        self
    }

    /// Restrict translation to macros defined under the given path prefix
    #[must_use]
    pub fn with_source_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.source_prefix = prefix.into();
        self
    }

    /// Set the program name used in reports
    #[must_use]
    pub fn with_program_name<S: Into<String>>(mut self, name: S) -> Self {
        self.program_name = name.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_size_parses_both_widths() {
        assert_eq!("16".parse::<IntSize>(), Ok(IntSize::Int16));
        assert_eq!("32".parse::<IntSize>(), Ok(IntSize::Int32));
        assert!("64".parse::<IntSize>().is_err());
    }

    #[test]
    fn builder_chain() {
        let config = TranslationConfig::new()
            .with_int_size(IntSize::Int16)
            .with_source_prefix("src/")
            .with_program_name("demo");
        assert_eq!(config.int_size, IntSize::Int16);
        assert_eq!(config.source_prefix, "src/");
        assert_eq!(config.program_name, "demo");
    }
}
