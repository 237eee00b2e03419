//! Maps the host onto the operating system and architecture names used by
//! the published binary bundles.

use std::fmt;

/// Operating system and architecture labels of a binary bundle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Platform {
    os: String,
    arch: String,
}

impl Platform {
    /// Builds a platform from already-mapped bundle labels.
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// Platform of the running host.
    #[must_use]
    pub fn current() -> Self {
        Self::from_target(
            std::env::consts::OS,
            std::env::consts::ARCH,
            cfg!(target_env = "musl"),
        )
    }

    /// Maps Rust target names onto bundle labels.
    ///
    /// Unknown names pass through unchanged so the repository can answer
    /// with a precise "not found" rather than failing here.
    #[must_use]
    pub fn from_target(os: &str, arch: &str, musl: bool) -> Self {
        let os = match os {
            "macos" => "darwin",
            other => other,
        };
        let arch = match arch {
            "x86_64" => "amd64",
            "aarch64" => "arm64v8",
            "arm" => "arm32v7",
            "x86" => "i386",
            "powerpc64" => "ppc64le",
            other => other,
        };
        let arch = if musl && os == "linux" {
            format!("{arch}-alpine")
        } else {
            arch.to_owned()
        };
        Self::new(os, arch)
    }

    /// Bundle operating system label.
    #[must_use]
    pub fn os(&self) -> &str {
        &self.os
    }

    /// Bundle architecture label.
    #[must_use]
    pub fn arch(&self) -> &str {
        &self.arch
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}-{}", self.os, self.arch)
    }
}
