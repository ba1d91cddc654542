use super::source_root;
use crate::checks::{find_benchmark, BenchmarkDescriptor};
use crate::error::{RegtestError, Result};
use crate::output::{output_data, print_success};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Serialize)]
struct Fetched {
    benchmark: String,
    path: PathBuf,
    downloaded: bool,
}

pub fn handle_fetch_command(benchmark: &str, source_path: Option<&Path>, format: &str) -> Result<i32> {
    let descriptor = find_benchmark(benchmark)?;
    let root = source_root(source_path)?;
    let (path, downloaded) = fetch(&descriptor, &root)?;

    if format == "pretty" {
        let action = if downloaded { "downloaded" } else { "already present" };
        print_success(&format!("{}: {} ({})", descriptor.name, path.display(), action));
    } else {
        output_data(
            &Fetched {
                benchmark: descriptor.name.clone(),
                path,
                downloaded,
            },
            format,
        )?;
    }
    Ok(0)
}

/// Make sure the benchmark archive is in the source cache.
///
/// Downloads only when the archive is absent. A declared checksum is verified
/// either way; a freshly downloaded archive that does not match is removed.
pub fn fetch(descriptor: &BenchmarkDescriptor, root: &Path) -> Result<(PathBuf, bool)> {
    let path = descriptor.source_path(root);
    if path.is_file() {
        debug!("{} already at {}", descriptor.name, path.display());
        verify(descriptor, &path)?;
        return Ok((path, false));
    }

    let url = descriptor.url.as_deref().ok_or_else(|| RegtestError::Download {
        url: String::new(),
        message: format!(
            "{} has no download location, place {} at {}",
            descriptor.name,
            descriptor.archive_name(),
            path.display()
        ),
    })?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| RegtestError::io(parent, e))?;
    }

    info!("downloading {} to {}", url, path.display());
    let bytes = download(url)?;
    fs::write(&path, &bytes).map_err(|e| RegtestError::io(&path, e))?;

    if let Err(e) = verify(descriptor, &path) {
        let _ = fs::remove_file(&path);
        return Err(e);
    }
    Ok((path, true))
}

fn download(url: &str) -> Result<Vec<u8>> {
    let failed = |message: String| RegtestError::Download {
        url: url.to_string(),
        message,
    };
    let client = reqwest::blocking::Client::new();
    let response = client.get(url).send().map_err(|e| failed(e.to_string()))?;
    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }
    let bytes = response.bytes().map_err(|e| failed(e.to_string()))?;
    Ok(bytes.to_vec())
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Compare the archive against the declared checksum, if there is one
fn verify(descriptor: &BenchmarkDescriptor, path: &Path) -> Result<()> {
    let Some(expected) = &descriptor.sha256 else {
        return Ok(());
    };
    let bytes = fs::read(path).map_err(|e| RegtestError::io(path, e))?;
    let actual = sha256_hex(&bytes);
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(RegtestError::Checksum {
            path: path.to_path_buf(),
            expected: expected.clone(),
            actual,
        });
    }
    debug!("{}: checksum ok", path.display());
    Ok(())
}
