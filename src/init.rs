use crate::config::Config;
use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub async fn ensure_directories(cfg: &Config) -> Result<()> {
    let dir: &Path = &cfg.output_dir;
    if !dir.exists() {
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create output dir {}", dir.display()))?;
        tracing::info!("Created directory: {}", dir.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_missing_output_dir() {
        let root = tempfile::tempdir().unwrap();
        let cfg = Config {
            output_dir: root.path().join("nested/output"),
            ..Config::default()
        };
        ensure_directories(&cfg).await.unwrap();
        assert!(cfg.output_dir.is_dir());
    }
}
