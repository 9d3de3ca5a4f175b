use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::fs;
use tracing::warn;

use crate::job::reconcile::MenuEntry;

/// Loads the persisted menu collection. Missing or unreadable state is not
/// fatal; the next cycle simply rebuilds from an empty collection.
pub async fn load_menu(path: &Path) -> Vec<MenuEntry> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(_) => return vec![],
    };
    match serde_json::from_slice(&bytes) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(path = %path.display(), error = ?err, "discarding unreadable menu state");
            vec![]
        }
    }
}

/// Full-file replace: write a sibling temp file, then rename over the
/// target. A crash mid-write leaves the old file intact, never a truncated
/// one.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    fs::write(&tmp, contents)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    fs::rename(&tmp, path)
        .await
        .with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}

/// Writes both menu artifacts: `menu.json` for consumers that fetch, and
/// `menu.js` assigning the same data to a global for direct script embeds.
pub async fn write_menu(dir: &Path, entries: &[MenuEntry]) -> Result<()> {
    fs::create_dir_all(dir).await?;
    write_atomic(&dir.join("menu.json"), &serde_json::to_vec_pretty(entries)?).await?;
    let embed = format!("var menu = {}", serde_json::to_string(entries)?);
    write_atomic(&dir.join("menu.js"), embed.as_bytes()).await?;
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RainReading {
    rain_value: f64,
}

pub async fn write_rain(dir: &Path, rain_value: f64) -> Result<()> {
    fs::create_dir_all(dir).await?;
    let reading = RainReading { rain_value };
    write_atomic(&dir.join("rain.json"), &serde_json::to_vec(&reading)?).await?;
    Ok(())
}
