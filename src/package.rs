//! Package identities exchanged with the archive resolver.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// A requested package, parsed from a `name[:arch][=version]` token.
///
/// Immutable once parsed; the resolver sees [`PackageSpec::resolver_key`]
/// and, when present, the pinned version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSpec {
    pub name: String,
    /// Foreign architecture qualifier, e.g. `armhf` in `libfoo:armhf`.
    pub arch: Option<String>,
    /// Pinned version, e.g. `1.2-3` in `libfoo=1.2-3`.
    pub version: Option<String>,
}

impl PackageSpec {
    /// Parse a single `name[:arch][=version]` token.
    pub fn parse(token: &str) -> Result<Self> {
        let token = token.trim();
        let (name_arch, version) = match token.split_once('=') {
            Some((name_arch, version)) => (name_arch, Some(version.to_string())),
            None => (token, None),
        };
        let (name, arch) = match name_arch.split_once(':') {
            Some((name, arch)) => (name.to_string(), Some(arch.to_string())),
            None => (name_arch.to_string(), None),
        };
        if name.is_empty() {
            bail!("package spec '{token}' has no name");
        }
        Ok(Self { name, arch, version })
    }

    /// The token handed to the resolver: `name` or `name:arch`.
    pub fn resolver_key(&self) -> String {
        match &self.arch {
            Some(arch) => format!("{}:{arch}", self.name),
            None => self.name.clone(),
        }
    }
}

/// One concrete package+version the resolver selected for install.
///
/// Only a resolver session produces these; the pipeline never invents one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedChange {
    pub name: String,
    pub version: String,
    /// Download location of the binary archive.
    pub location: String,
    /// Archive size in bytes, as reported by the resolver.
    pub size: u64,
}

impl ResolvedChange {
    /// Human-readable description for reporting.
    pub fn describe(&self) -> String {
        format!("{}={}", self.name, self.version)
    }

    /// On-disk filename of the fetched archive, derived from the
    /// candidate's download location.
    pub fn archive_basename(&self) -> String {
        self.location
            .rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                // Epoch colons are not valid in filenames; apt escapes
                // them the same way.
                format!("{}_{}.deb", self.name, self.version.replace(':', "%3a"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_name() {
        let spec = PackageSpec::parse("hello").unwrap();
        assert_eq!(spec.name, "hello");
        assert_eq!(spec.arch, None);
        assert_eq!(spec.version, None);
        assert_eq!(spec.resolver_key(), "hello");
    }

    #[test]
    fn parses_pinned_version() {
        let spec = PackageSpec::parse("hello=2.10-1").unwrap();
        assert_eq!(spec.name, "hello");
        assert_eq!(spec.version.as_deref(), Some("2.10-1"));
    }

    #[test]
    fn parses_arch_qualifier() {
        let spec = PackageSpec::parse("libfoo:armhf").unwrap();
        assert_eq!(spec.name, "libfoo");
        assert_eq!(spec.arch.as_deref(), Some("armhf"));
        assert_eq!(spec.resolver_key(), "libfoo:armhf");
    }

    #[test]
    fn parses_arch_and_version() {
        let spec = PackageSpec::parse("libfoo:armhf=1.2-3ubuntu1").unwrap();
        assert_eq!(spec.name, "libfoo");
        assert_eq!(spec.arch.as_deref(), Some("armhf"));
        assert_eq!(spec.version.as_deref(), Some("1.2-3ubuntu1"));
    }

    #[test]
    fn rejects_empty_token() {
        assert!(PackageSpec::parse("").is_err());
        assert!(PackageSpec::parse("=1.0").is_err());
    }

    #[test]
    fn basename_comes_from_location() {
        let change = ResolvedChange {
            name: "hello".to_string(),
            version: "2.10-1".to_string(),
            location: "http://archive.ubuntu.com/pool/hello_2.10-1_amd64.deb".to_string(),
            size: 1024,
        };
        assert_eq!(change.archive_basename(), "hello_2.10-1_amd64.deb");
        assert_eq!(change.describe(), "hello=2.10-1");
    }

    #[test]
    fn basename_falls_back_to_identity() {
        let change = ResolvedChange {
            name: "hello".to_string(),
            version: "1:2.10-1".to_string(),
            location: String::new(),
            size: 0,
        };
        assert_eq!(change.archive_basename(), "hello_1%3a2.10-1.deb");
    }
}
