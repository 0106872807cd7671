use std::{fs::File, path::{Path, PathBuf}, time::Duration};

use anyhow::{anyhow, Context, Result};
use reqwest::{blocking::Client, redirect::Policy};
use tempfile::TempDir;
use tracing::{info, warn};

/// Sidecar files that travel with a remote `.shp` (the `.prj` is optional).
const SHAPEFILE_SIDECARS: [(&str, bool); 3] = [("shx", true), ("dbf", true), ("prj", false)];

/// Download `url` into a fresh temporary directory, keeping the URL's file name so that
/// the container format can still be told from the extension. A `.shp` URL also fetches
/// its sidecars. The directory is removed when the returned guard is dropped.
pub(crate) fn download_to_temp(url: &str) -> Result<(TempDir, PathBuf)> {
    let base = url.split(['?', '#']).next().unwrap_or(url);
    let name = base.rsplit('/').next()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| anyhow!("cannot derive a file name from {url}"))?;

    let dir = tempfile::tempdir().context("create temp dir")?;
    let path = dir.path().join(name);

    let client = Client::builder()
        .user_agent(concat!("quartier/", env!("CARGO_PKG_VERSION")))
        .redirect(Policy::limited(10))
        .timeout(Duration::from_secs(300))
        .build()?;

    info!(%url, "downloading dataset");
    fetch(&client, url, &path)?;

    if let Some(stem) = base.strip_suffix(".shp") {
        for (ext, required) in SHAPEFILE_SIDECARS {
            let sidecar_url = format!("{stem}.{ext}");
            match fetch(&client, &sidecar_url, &path.with_extension(ext)) {
                Ok(()) => {}
                Err(e) if !required => warn!(url = %sidecar_url, "optional sidecar not fetched: {e:#}"),
                Err(e) => return Err(e),
            }
        }
    }

    Ok((dir, path))
}

/// GET `url` and stream the body into `path`.
fn fetch(client: &Client, url: &str, path: &Path) -> Result<()> {
    let mut resp = client.get(url).send()
        .with_context(|| format!("GET {url}"))?
        .error_for_status()
        .with_context(|| format!("GET {url} returned error status"))?;

    let mut sink = File::create(path)
        .with_context(|| format!("create {}", path.display()))?;
    std::io::copy(&mut resp, &mut sink)
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
