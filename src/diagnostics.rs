//! Failure reporting for the camera's degraded paths.
//!
//! The camera never raises for a missing side channel or missing calibration;
//! it reports through a [`Reporter`] and returns a default. The reporter's
//! verbosity decides whether those reports reach the `log` facade, so a host
//! application can run the library silently.

use std::fmt;
use std::str::FromStr;

/// Log target used for all camera reports.
pub const TARGET: &str = "mynteye";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    /// Report nothing.
    Silent,
    /// Errors and warnings.
    Errors,
    /// Everything, including the descriptor dump after a flash read.
    Verbose,
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::Errors
    }
}

impl FromStr for Verbosity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "silent" | "off" | "0" => Ok(Verbosity::Silent),
            "errors" | "error" | "1" => Ok(Verbosity::Errors),
            "verbose" | "2" => Ok(Verbosity::Verbose),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reporter {
    verbosity: Verbosity,
}

impl Reporter {
    pub const fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    pub const fn silent() -> Self {
        Self::new(Verbosity::Silent)
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    pub fn error(&self, args: fmt::Arguments<'_>) {
        if self.verbosity >= Verbosity::Errors {
            log::error!(target: TARGET, "{}", args);
        }
    }

    pub fn warn(&self, args: fmt::Arguments<'_>) {
        if self.verbosity >= Verbosity::Errors {
            log::warn!(target: TARGET, "{}", args);
        }
    }

    pub fn info(&self, args: fmt::Arguments<'_>) {
        if self.verbosity >= Verbosity::Verbose {
            log::info!(target: TARGET, "{}", args);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_verbosity() {
        assert_eq!("silent".parse::<Verbosity>(), Ok(Verbosity::Silent));
        assert_eq!(" Verbose ".parse::<Verbosity>(), Ok(Verbosity::Verbose));
        assert_eq!("1".parse::<Verbosity>(), Ok(Verbosity::Errors));
        assert!("loud".parse::<Verbosity>().is_err());
    }

    #[test]
    fn test_ordering() {
        assert!(Verbosity::Silent < Verbosity::Errors);
        assert!(Verbosity::Errors < Verbosity::Verbose);
        assert_eq!(Reporter::default().verbosity(), Verbosity::Errors);
    }
}
