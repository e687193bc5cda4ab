//! Archive sources configuration and its cache fingerprint.
//!
//! An [`ArchiveConfig`] fully determines which packages and versions the
//! resolver can see: architecture, release codename, an optional custom
//! sources template and the geo-routing switch. The rendered sources text
//! is digested into the fingerprint that namespaces the package cache, so
//! two builds with the same effective sources share one pool.

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha384};
use std::fs;
use std::path::Path;

/// Default Ubuntu archive sources, before template substitution.
pub const DEFAULT_SOURCES: &str = "\
deb http://${prefix}.ubuntu.com/${suffix}/ ${release} main restricted
deb http://${prefix}.ubuntu.com/${suffix}/ ${release}-updates main restricted
deb http://${prefix}.ubuntu.com/${suffix}/ ${release} universe
deb http://${prefix}.ubuntu.com/${suffix}/ ${release}-updates universe
deb http://${prefix}.ubuntu.com/${suffix}/ ${release} multiverse
deb http://${prefix}.ubuntu.com/${suffix}/ ${release}-updates multiverse
deb http://${security}.ubuntu.com/${suffix} ${release}-security main restricted
deb http://${security}.ubuntu.com/${suffix} ${release}-security universe
deb http://${security}.ubuntu.com/${suffix} ${release}-security multiverse
";

const GEOIP_SERVER: &str = "http://geoip.ubuntu.com/lookup";

/// Effective archive view for one build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// dpkg architecture the staged packages are built for, e.g. `amd64`.
    pub deb_arch: String,
    /// Release codename, e.g. `xenial`.
    pub release: String,
    /// Custom sources-list template. The bundled default template is used
    /// when absent; the host's own sources are never consulted.
    #[serde(default)]
    pub sources: Option<String>,
    /// Route mirror hostnames through the GeoIP country lookup.
    #[serde(default)]
    pub use_geoip: bool,
}

impl ArchiveConfig {
    pub fn new(deb_arch: &str, release: &str) -> Self {
        Self {
            deb_arch: deb_arch.to_string(),
            release: release.to_string(),
            sources: None,
            use_geoip: false,
        }
    }

    /// Load a config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading archive config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing archive config {}", path.display()))
    }

    /// Render the effective sources list.
    ///
    /// Performs the GeoIP lookup when enabled for a primary-archive
    /// architecture; lookup failure degrades to the un-routed mirror.
    pub fn sources_list(&self) -> String {
        let country = if self.use_geoip && uses_primary_archive(&self.deb_arch) {
            geoip_country()
        } else {
            None
        };
        self.render(country.as_deref())
    }

    /// Pure variant of [`ArchiveConfig::sources_list`] with a known
    /// country code.
    pub fn render(&self, country: Option<&str>) -> String {
        let template = self.sources.as_deref().unwrap_or(DEFAULT_SOURCES);
        render_sources(template, &self.deb_arch, &self.release, country)
    }

    /// Digest of the rendered sources text; selects the cache namespace.
    ///
    /// A geo lookup that answers differently on a later run yields a
    /// different fingerprint. That is a cache miss, not a bug.
    pub fn fingerprint(&self) -> String {
        fingerprint_of(&self.sources_list())
    }
}

/// SHA-384 hex digest of a rendered sources text.
pub fn fingerprint_of(sources_text: &str) -> String {
    let mut hasher = Sha384::new();
    hasher.update(sources_text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Substitute the mirror template variables for one architecture.
///
/// amd64 and i386 live on the primary archive (optionally geo-routed);
/// everything else is served from ports.
pub fn render_sources(
    template: &str,
    deb_arch: &str,
    release: &str,
    country: Option<&str>,
) -> String {
    let (prefix, suffix, security) = if uses_primary_archive(deb_arch) {
        let prefix = match country {
            Some(cc) if !cc.is_empty() => format!("{cc}.archive"),
            _ => "archive".to_string(),
        };
        (prefix, "ubuntu", "security")
    } else {
        ("ports".to_string(), "ubuntu-ports", "ports")
    };

    template
        .replace("${prefix}", &prefix)
        .replace("${suffix}", suffix)
        .replace("${security}", security)
        .replace("${release}", release)
}

fn uses_primary_archive(deb_arch: &str) -> bool {
    matches!(deb_arch, "amd64" | "i386")
}

/// Country code from the GeoIP service, lowercased. Failures are warned
/// and reported as `None`.
fn geoip_country() -> Option<String> {
    match fetch_geoip_country() {
        Ok(country) => country,
        Err(e) => {
            eprintln!("  [WARN] GeoIP lookup failed ({e:#}), using default mirror");
            None
        }
    }
}

fn fetch_geoip_country() -> Result<Option<String>> {
    let body = reqwest::blocking::get(GEOIP_SERVER)
        .context("querying GeoIP server")?
        .text()
        .context("reading GeoIP response")?;
    let pattern = Regex::new(r"<CountryCode>([A-Za-z]+)</CountryCode>")?;
    Ok(pattern
        .captures(&body)
        .map(|captures| captures[1].to_lowercase()))
}
