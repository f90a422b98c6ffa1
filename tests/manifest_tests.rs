#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Manifest policy tests for the Nexus client.
//!
//! These tests verify that Cargo.toml keeps the agreed lint levels, feature
//! layout and MSRV. If any test fails, the manifest has drifted from project
//! policy.
//!
//! All checks are synchronous filesystem reads.

use std::path::PathBuf;

use toml::{Table, Value};

/// Returns the project root directory (where Cargo.toml lives).
fn project_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

/// Reads a file relative to the project root and returns its contents.
fn read_project_file(relative_path: &str) -> String {
    let path = project_root().join(relative_path);
    std::fs::read_to_string(&path).unwrap_or_else(|e| {
        panic!(
            "Failed to read '{}': {}. This file is required by project policy.",
            path.display(),
            e
        )
    })
}

/// Cargo.toml parsed as a TOML table.
fn manifest() -> Table {
    toml::from_str(&read_project_file("Cargo.toml")).expect("Cargo.toml must be valid TOML")
}

// ─────────────────────────────────────────────────────────────────────────────
// Module: panic_policy
// ─────────────────────────────────────────────────────────────────────────────

mod panic_policy {
    use super::*;

    const REQUIRED_DENY_LINTS: &[&str] = &[
        "unwrap_used",
        "expect_used",
        "panic",
        "todo",
        "unimplemented",
        "indexing_slicing",
    ];

    #[test]
    fn cargo_toml_denies_all_panic_prone_lints() {
        let manifest = manifest();
        let clippy = manifest
            .get("lints")
            .and_then(|lints| lints.get("clippy"))
            .expect("Cargo.toml is missing the [lints.clippy] section");

        for lint in REQUIRED_DENY_LINTS {
            assert_eq!(
                clippy.get(*lint).and_then(Value::as_str),
                Some("deny"),
                "Cargo.toml must set `{lint} = \"deny\"` in [lints.clippy] so \
                 library code stays panic-free."
            );
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Module: feature_policy
// ─────────────────────────────────────────────────────────────────────────────

mod feature_policy {
    use super::*;

    fn feature(name: &str) -> Vec<String> {
        manifest()["features"][name]
            .as_array()
            .unwrap_or_else(|| panic!("feature `{name}` must be declared"))
            .iter()
            .map(|v| v.as_str().unwrap().to_owned())
            .collect()
    }

    #[test]
    fn websocket_transport_is_on_by_default() {
        assert!(feature("default").contains(&"transport-websocket".to_owned()));
    }

    #[test]
    fn websocket_feature_pulls_in_runtime_and_optional_deps() {
        let websocket = feature("transport-websocket");
        for required in ["dep:tokio-tungstenite", "dep:futures-util", "tokio-runtime"] {
            assert!(
                websocket.contains(&required.to_owned()),
                "transport-websocket must enable `{required}`"
            );
        }
    }

    #[test]
    fn websocket_dependencies_are_optional() {
        let manifest = manifest();
        for dep in ["tokio-tungstenite", "futures-util"] {
            assert_eq!(
                manifest["dependencies"][dep]
                    .get("optional")
                    .and_then(Value::as_bool),
                Some(true),
                "`{dep}` must stay optional so the core builds without a transport"
            );
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Module: msrv_policy
// ─────────────────────────────────────────────────────────────────────────────

mod msrv_policy {
    use super::*;

    #[test]
    fn rust_version_is_declared() {
        let manifest = manifest();
        let version = manifest["package"]["rust-version"]
            .as_str()
            .expect("Cargo.toml must declare a rust-version");
        assert_eq!(
            version.split('.').count(),
            3,
            "rust-version '{version}' must be a full major.minor.patch version"
        );
    }

    #[test]
    fn readme_mentions_msrv() {
        let manifest = manifest();
        let version = manifest["package"]["rust-version"].as_str().unwrap();
        let short = version.trim_end_matches(".0");
        let readme = read_project_file("README.md");
        assert!(
            readme.contains(short),
            "README.md does not reference the MSRV '{short}' from Cargo.toml."
        );
    }
}
