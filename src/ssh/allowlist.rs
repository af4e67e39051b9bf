//! Host allowlist consulted before any session is dialed.
//!
//! Patterns are flat globs: `*` matches any run of characters including
//! dots, so `10.0.*` admits `10.0.3.7` and `*.example.com` admits
//! `a.b.example.com`. Matching is case-sensitive and exact.

use glob::Pattern;

use crate::error::{ConfigError, SshError};

/// Compiled, immutable set of allowed host patterns
#[derive(Debug, Clone)]
pub struct HostAllowlist {
    patterns: Vec<Pattern>,
}

impl HostAllowlist {
    /// Compile a comma-separated pattern list such as `*.example.com,10.0.*`.
    pub fn compile(spec: &str) -> Result<Self, ConfigError> {
        if spec.is_empty() {
            return Err(ConfigError::EmptyAllowlist);
        }

        let patterns = spec
            .split(',')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .map(|segment| {
                Pattern::new(segment).map_err(|e| ConfigError::InvalidPattern {
                    pattern: segment.to_string(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if patterns.is_empty() {
            return Err(ConfigError::NoValidPatterns);
        }

        Ok(Self { patterns })
    }

    /// Accept `host` if any pattern matches it.
    pub fn check(&self, host: &str) -> Result<(), SshError> {
        if host.is_empty() {
            return Err(SshError::HostDenied(host.to_string()));
        }

        if self.patterns.iter().any(|pattern| pattern.matches(host)) {
            Ok(())
        } else {
            Err(SshError::HostDenied(host.to_string()))
        }
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// The compiled patterns in their original order.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(Pattern::as_str)
    }
}
