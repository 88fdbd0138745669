//! Secret references in configuration values.
//!
//! Feed header values may point at a secret instead of embedding it:
//!
//! - `env::VAR_NAME` reads `$VAR_NAME`
//! - `pass::path/in/store` runs `pass show path/in/store` and keeps the first line
//!
//! Anything else is used verbatim.

use std::process::Command;

/// A parsed configuration value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretRef<'a> {
    /// A literal value.
    Plain(&'a str),
    /// An environment variable name.
    Env(&'a str),
    /// A password-store entry.
    Pass(&'a str),
}

impl<'a> SecretRef<'a> {
    /// Classifies `value` by its prefix.
    pub fn parse(value: &'a str) -> Self {
        if let Some(var) = value.strip_prefix("env::") {
            Self::Env(var)
        } else if let Some(entry) = value.strip_prefix("pass::") {
            Self::Pass(entry)
        } else {
            Self::Plain(value)
        }
    }

    /// Returns `true` when the value must be looked up.
    pub fn is_reference(&self) -> bool {
        !matches!(self, Self::Plain(_))
    }

    /// Looks up the referenced secret.
    pub fn resolve(&self) -> Result<String, String> {
        match *self {
            Self::Plain(value) => Ok(value.to_string()),
            Self::Env(var) => {
                std::env::var(var).map_err(|_| format!("environment variable `{}` is not set", var))
            }
            Self::Pass(entry) => pass_show(entry),
        }
    }
}

/// Resolves a configuration value that may hold a secret reference.
pub fn resolve(value: &str) -> Result<String, String> {
    SecretRef::parse(value).resolve()
}

fn pass_show(entry: &str) -> Result<String, String> {
    let output = Command::new("pass")
        .args(["show", entry])
        .output()
        .map_err(|e| format!("cannot run `pass show {}`: {}", entry, e))?;

    if !output.status.success() {
        return Err(format!(
            "`pass show {}` exited with {}: {}",
            entry,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(str::to_string)
        .ok_or_else(|| format!("`pass show {}` printed nothing", entry))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_prefixes() {
        assert_eq!(SecretRef::parse("Bearer abc"), SecretRef::Plain("Bearer abc"));
        assert_eq!(SecretRef::parse("env::FEED_TOKEN"), SecretRef::Env("FEED_TOKEN"));
        assert_eq!(SecretRef::parse("pass::work/feed"), SecretRef::Pass("work/feed"));
        assert!(!SecretRef::parse("").is_reference());
        assert!(SecretRef::parse("env::X").is_reference());
    }

    #[test]
    fn test_plain_value_passes_through() {
        assert_eq!(resolve("Bearer abc").unwrap(), "Bearer abc");
        assert_eq!(resolve("env:single-colon").unwrap(), "env:single-colon");
    }

    #[test]
    fn test_env_reference() {
        unsafe {
            std::env::set_var("_ICSFEED_SECRET_TEST", "token-42");
        }
        assert_eq!(resolve("env::_ICSFEED_SECRET_TEST").unwrap(), "token-42");
        unsafe {
            std::env::remove_var("_ICSFEED_SECRET_TEST");
        }
    }

    #[test]
    fn test_missing_env_reference_errors() {
        let err = resolve("env::_ICSFEED_SECRET_NOT_SET_9876").unwrap_err();
        assert!(err.contains("not set"));
    }

    #[test]
    fn test_missing_pass_entry_errors() {
        assert!(resolve("pass::icsfeed/entry/that/does/not/exist/9876").is_err());
    }
}
