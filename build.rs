use anyhow::{Context, Result};
use chrono::TimeZone;
use std::env;
use std::fs;
use std::process::Command;
use vergen_gitcl::{Emitter, GitclBuilder};

fn main() -> Result<()> {
    let gitcl = GitclBuilder::default()
        .describe(true, true, Some("[0-9]*"))
        .build()?;

    let gitcl_res = Emitter::default()
        .idempotent()
        .fail_on_error()
        .add_instructions(&gitcl)
        .and_then(|emitter| emitter.emit());

    if let Err(e) = gitcl_res {
        eprintln!("error occurred while generating instructions: {e:?}");
        Emitter::default().idempotent().fail_on_error().emit()?;
    }

    let now = match env::var("SOURCE_DATE_EPOCH") {
        Ok(val) => chrono::Utc
            .timestamp_opt(val.parse::<i64>()?, 0)
            .single()
            .context("SOURCE_DATE_EPOCH out of range")?,
        Err(_) => chrono::Utc::now(),
    };
    let timestamp = now.format("%Y-%m-%d %H:%M:%S UTC").to_string();
    println!("cargo:rustc-env=BUILD_TIMESTAMP={timestamp}");

    let subdec_version = subdec_version_from_metadata()
        .or_else(|_| subdec_version_fallback())
        .unwrap_or_else(|_| "unknown".to_string());
    println!("cargo:rustc-env=SUBDEC_VERSION={subdec_version}");

    let git = env::var("VERGEN_GIT_DESCRIBE").unwrap_or_else(|_| "unknown".to_string());
    println!(
        "cargo:rustc-env=SUBDECD_LONG_VERSION={} (git {git}, subdec {subdec_version}, built {timestamp})",
        env!("CARGO_PKG_VERSION")
    );

    println!("cargo:rerun-if-changed=subdec/Cargo.toml");

    Ok(())
}

/// Reads the library version from `cargo metadata`, covering both the
/// workspace member and a registry dependency.
fn subdec_version_from_metadata() -> Result<String> {
    let output = Command::new(env::var("CARGO").unwrap_or_else(|_| "cargo".to_string()))
        .args(["metadata", "--format-version", "1"])
        .output()?;

    if !output.status.success() {
        anyhow::bail!("cargo metadata failed");
    }

    let metadata: serde_json::Value = serde_json::from_slice(&output.stdout)?;

    let version = metadata["packages"]
        .as_array()
        .into_iter()
        .flatten()
        .find(|package| package["name"].as_str() == Some("subdec"))
        .and_then(|package| package["version"].as_str());

    match version {
        Some(version) => Ok(version.to_string()),
        None => anyhow::bail!("subdec package not found in metadata"),
    }
}

fn subdec_version_fallback() -> Result<String> {
    let toml_content = fs::read_to_string("subdec/Cargo.toml")?;

    toml_content
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("version") && line.contains('='))
        .and_then(|line| line.split_once('='))
        .map(|(_, value)| value.trim().trim_matches('"').trim_matches('\'').to_string())
        .context("Could not find version in subdec/Cargo.toml")
}
