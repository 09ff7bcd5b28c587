//! The model/training descriptor a pipeline is generated for.

use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Everything the generators need to know about the model being trained and
/// where it is deployed.
pub trait ModelDescriptor {
    fn name(&self) -> &str;

    /// Make the trainer distribution available to the platform and return its
    /// remote location.
    fn upload_trainer_dist(&self) -> Result<String>;

    fn model_dir(&self) -> String;
    fn job_dir(&self) -> String;

    fn project_id(&self) -> &str;
    fn scale_tier(&self) -> &str;
    fn region(&self) -> &str;
    fn runtime_version(&self) -> &str;
    fn python_version(&self) -> &str;
    fn framework(&self) -> &str;
}

/// Descriptor read from the `[model]` table of a pipeline file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    pub project_id: String,
    /// Storage prefix for job output, e.g. `gs://my-bucket`.
    pub bucket: String,
    #[serde(default = "default_scale_tier")]
    pub scale_tier: String,
    #[serde(default = "default_region")]
    pub region: String,
    pub runtime_version: String,
    pub python_version: String,
    #[serde(default = "default_framework")]
    pub framework: String,
    /// Either a `gs://` location of an already uploaded trainer package or a
    /// local sdist path that gets copied under the job directory.
    pub package_uri: String,
    #[serde(default)]
    pub job_dir: Option<String>,
    #[serde(default)]
    pub model_dir: Option<String>,
}

fn default_scale_tier() -> String {
    "BASIC".to_string()
}

fn default_region() -> String {
    "us-central1".to_string()
}

fn default_framework() -> String {
    "tensorflow".to_string()
}

impl ModelConfig {
    /// Remote location of the trainer package: `package_uri` itself when it is
    /// already in cloud storage, otherwise `{job_dir}/dist/{file name}`.
    pub fn package_location(&self) -> Result<String> {
        if self.package_uri.starts_with("gs://") {
            return Ok(self.package_uri.clone());
        }
        let file_name = Path::new(&self.package_uri)
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("invalid trainer package path: {}", self.package_uri))?;
        Ok(format!("{}/dist/{}", self.job_dir(), file_name))
    }
}

impl ModelDescriptor for ModelConfig {
    fn name(&self) -> &str {
        &self.name
    }

    fn upload_trainer_dist(&self) -> Result<String> {
        let remote = self.package_location()?;
        if remote == self.package_uri {
            info!(uri = %remote, "trainer package already in cloud storage");
            return Ok(remote);
        }

        info!(local = %self.package_uri, %remote, "uploading trainer package");
        let status = Command::new("gsutil")
            .args(["cp", &self.package_uri, &remote])
            .status()
            .context("failed to spawn gsutil; install the Cloud SDK and ensure it is on PATH")?;
        if !status.success() {
            return Err(anyhow!("gsutil cp failed with status {status}"));
        }
        Ok(remote)
    }

    fn model_dir(&self) -> String {
        self.model_dir
            .clone()
            .unwrap_or_else(|| format!("{}/model", self.job_dir()))
    }

    fn job_dir(&self) -> String {
        self.job_dir.clone().unwrap_or_else(|| {
            format!("{}/{}", self.bucket.trim_end_matches('/'), self.name)
        })
    }

    fn project_id(&self) -> &str {
        &self.project_id
    }

    fn scale_tier(&self) -> &str {
        &self.scale_tier
    }

    fn region(&self) -> &str {
        &self.region
    }

    fn runtime_version(&self) -> &str {
        &self.runtime_version
    }

    fn python_version(&self) -> &str {
        &self.python_version
    }

    fn framework(&self) -> &str {
        &self.framework
    }
}
