//! API version compatibility check against `SERVER_INFO`.
//!
//! Versions are compared component-wise after splitting on `.`. A differing
//! major version means core features may break; a differing minor version
//! means optional features may break; patch differences are ignored. The check
//! is advisory and never changes connection state.

use std::fmt;

use tracing::{error, warn};

/// Client API version this crate speaks.
pub const API_VERSION: &str = "1.0.0";

/// Result of comparing the client and server API versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionCompatibility {
    /// Same major and minor version.
    Compatible,
    /// Same major version, different minor version.
    MinorMismatch,
    /// Different major version.
    MajorMismatch,
}

/// A `major.minor.patch` version split into its components.
///
/// Components are kept as strings so that pre-release tags such as `2-beta`
/// still compare by equality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiVersion {
    major: String,
    minor: String,
    patch: String,
}

impl ApiVersion {
    /// Split a version string. Missing components compare as empty.
    pub fn parse(version: &str) -> Self {
        let mut parts = version.trim().splitn(3, '.');
        let mut next = || parts.next().unwrap_or_default().to_owned();
        Self {
            major: next(),
            minor: next(),
            patch: next(),
        }
    }

    /// Compare this (client) version against the server's.
    pub fn compatibility(&self, server: &ApiVersion) -> VersionCompatibility {
        if self.major != server.major {
            VersionCompatibility::MajorMismatch
        } else if self.minor != server.minor {
            VersionCompatibility::MinorMismatch
        } else {
            VersionCompatibility::Compatible
        }
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Compare versions and log the matching diagnostic.
pub fn check_api_version(ours: &str, server: &str) -> VersionCompatibility {
    let compatibility = ApiVersion::parse(ours).compatibility(&ApiVersion::parse(server));
    match compatibility {
        VersionCompatibility::MajorMismatch => error!(
            client = ours,
            server,
            "core api features may not work: client api version does not match the server's"
        ),
        VersionCompatibility::MinorMismatch => warn!(
            client = ours,
            server,
            "optional api features may not work: client api version does not match the server's"
        ),
        VersionCompatibility::Compatible => {}
    }
    compatibility
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_versions_are_compatible() {
        assert_eq!(
            check_api_version("1.0.0", "1.0.0"),
            VersionCompatibility::Compatible
        );
    }

    #[test]
    fn patch_difference_is_ignored() {
        assert_eq!(
            check_api_version("1.0.0", "1.0.7"),
            VersionCompatibility::Compatible
        );
    }

    #[test]
    fn minor_difference_is_soft() {
        assert_eq!(
            check_api_version("1.0.0", "1.3.0"),
            VersionCompatibility::MinorMismatch
        );
    }

    #[test]
    fn major_difference_is_hard() {
        assert_eq!(
            check_api_version("1.0.0", "2.0.0"),
            VersionCompatibility::MajorMismatch
        );
        // Major wins even when minor differs too.
        assert_eq!(
            check_api_version("1.4.0", "2.0.0"),
            VersionCompatibility::MajorMismatch
        );
    }

    #[test]
    fn short_versions_parse() {
        let v = ApiVersion::parse("3");
        assert_eq!(v.to_string(), "3..");
        assert_eq!(
            v.compatibility(&ApiVersion::parse("3.0")),
            VersionCompatibility::MinorMismatch
        );
    }
}
