//! Per-machine model registry
//!
//! Holds the most recent `TrendFit` for each machine. Replacing a model is
//! a single map insert of a fresh `Arc`, so a reader sees either the old
//! fit or the new one. Fits can be persisted as JSON with a SHA-256
//! sidecar and reloaded at startup.

use super::TrendFit;
use anyhow::{Context, Result};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const MODEL_SUFFIX: &str = "_trend_model.json";
const CHECKSUM_EXTENSION: &str = "sha256";

pub struct ModelRegistry {
    models: DashMap<String, Arc<TrendFit>>,
    model_dir: Option<PathBuf>,
}

impl ModelRegistry {
    /// In-memory registry
    pub fn new() -> Self {
        Self {
            models: DashMap::new(),
            model_dir: None,
        }
    }

    /// Registry that also writes every installed model under `model_dir`
    pub fn with_persistence(model_dir: impl Into<PathBuf>) -> Result<Self> {
        let model_dir = model_dir.into();
        fs::create_dir_all(&model_dir)
            .with_context(|| format!("Failed to create model directory {:?}", model_dir))?;
        Ok(Self {
            models: DashMap::new(),
            model_dir: Some(model_dir),
        })
    }

    /// Latest model for a machine
    pub fn current(&self, machine_id: &str) -> Option<Arc<TrendFit>> {
        self.models.get(machine_id).map(|m| Arc::clone(m.value()))
    }

    /// Replace the machine's model, persisting it when configured
    pub fn install(&self, fit: TrendFit) -> Arc<TrendFit> {
        if let Some(dir) = &self.model_dir {
            if let Err(e) = save_model(dir, &fit) {
                warn!(
                    machine_id = %fit.machine_id,
                    error = %e,
                    "Failed to persist model, keeping it in memory only"
                );
            }
        }

        let fit = Arc::new(fit);
        self.models.insert(fit.machine_id.clone(), Arc::clone(&fit));
        debug!(machine_id = %fit.machine_id, samples = fit.samples, "Model installed");
        fit
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Load every valid persisted model; corrupt files are skipped
    pub fn load_persisted(&self) -> Result<usize> {
        let Some(dir) = &self.model_dir else {
            return Ok(0);
        };

        let mut loaded = 0;
        for entry in fs::read_dir(dir).with_context(|| format!("Failed to read {:?}", dir))? {
            let path = entry?.path();
            let is_model = path
                .file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.ends_with(MODEL_SUFFIX));
            if !is_model {
                continue;
            }

            match load_model(&path) {
                Ok(fit) => {
                    self.models.insert(fit.machine_id.clone(), Arc::new(fit));
                    loaded += 1;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable model file");
                }
            }
        }

        info!(dir = %dir.display(), loaded, "Loaded persisted models");
        Ok(loaded)
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Filesystem-safe form of a machine id
pub fn sanitize_machine_id(machine_id: &str) -> String {
    machine_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Compute SHA256 checksum of data
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn model_path(dir: &Path, machine_id: &str) -> PathBuf {
    dir.join(format!("{}{}", sanitize_machine_id(machine_id), MODEL_SUFFIX))
}

/// Model first, then its checksum, each through its own temp file. A crash
/// in between leaves a mismatched pair that `load_model` rejects.
fn save_model(dir: &Path, fit: &TrendFit) -> Result<()> {
    let path = model_path(dir, &fit.machine_id);
    let bytes = serde_json::to_vec_pretty(fit).context("Failed to serialize model")?;

    write_atomic(&path, &bytes).context("Failed to write model")?;
    write_atomic(
        &path.with_extension(CHECKSUM_EXTENSION),
        compute_checksum(&bytes).as_bytes(),
    )
    .context("Failed to write model checksum")?;
    Ok(())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    let mut file = File::create(&temp_path)
        .with_context(|| format!("Failed to create temp file {:?}", temp_path))?;
    file.write_all(bytes)?;
    file.sync_all()?;

    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename {:?} to {:?}", temp_path, path))?;
    Ok(())
}

fn load_model(path: &Path) -> Result<TrendFit> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    let expected = fs::read_to_string(path.with_extension(CHECKSUM_EXTENSION))
        .context("Missing model checksum")?;

    let computed = compute_checksum(&bytes);
    if computed != expected.trim() {
        anyhow::bail!("Checksum mismatch: expected {}, got {}", expected.trim(), computed);
    }

    serde_json::from_slice(&bytes).context("Failed to parse model")
}
