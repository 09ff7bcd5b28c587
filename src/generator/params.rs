//! Parameter blobs for the AI Platform train and deploy steps.
//!
//! Field order of these structs is the key order of the emitted JSON.

use anyhow::Result;
use serde::Serialize;
use tracing::info;

use crate::descriptor::ModelDescriptor;
use crate::utils::to_json_indent4;

/// Python module the trainer package is started with.
pub const TRAINER_MODULE: &str = "trainer.task";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainParams {
    pub project_id: String,
    pub job_id_prefix: String,
    pub training_input: TrainingInput,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingInput {
    pub scale_tier: String,
    pub package_uris: Vec<String>,
    pub python_module: String,
    pub args: Vec<String>,
    pub job_dir: String,
    pub region: String,
    pub runtime_version: String,
    pub python_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeployParams {
    pub project_id: String,
    pub model_id: String,
    pub runtime_version: String,
    pub python_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_uri: Option<String>,
}

impl TrainParams {
    /// Uploads the trainer distribution through the descriptor, then
    /// assembles the training job request.
    pub fn from_model(model: &dyn ModelDescriptor, job_id: &str) -> Result<Self> {
        let package_uri = model.upload_trainer_dist()?;
        info!(%package_uri, "trainer package ready");
        Ok(Self {
            project_id: model.project_id().to_string(),
            job_id_prefix: format!("train_{job_id}"),
            training_input: TrainingInput {
                scale_tier: model.scale_tier().to_string(),
                package_uris: vec![package_uri],
                python_module: TRAINER_MODULE.to_string(),
                args: vec!["--model_dir".to_string(), model.model_dir()],
                job_dir: model.job_dir(),
                region: model.region().to_string(),
                runtime_version: model.runtime_version().to_string(),
                python_version: model.python_version().to_string(),
            },
        })
    }

    pub fn to_json(&self) -> Result<String> {
        to_json_indent4(self)
    }
}

impl DeployParams {
    /// TensorFlow models are found by the deploy step on its own; every other
    /// framework needs the model directory passed explicitly.
    pub fn from_model(model: &dyn ModelDescriptor) -> Self {
        let model_uri = (model.framework() != "tensorflow").then(|| model.model_dir());
        Self {
            project_id: model.project_id().to_string(),
            model_id: format!("{}_kfp", model.name()),
            runtime_version: model.runtime_version().to_string(),
            python_version: model.python_version().to_string(),
            model_uri,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        to_json_indent4(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::tests::census_model;

    #[test]
    fn test_train_params_json_layout() {
        let model = census_model();
        let json = TrainParams::from_model(&model, "census_200309_140507")
            .unwrap()
            .to_json()
            .unwrap();
        let expected = r#"{
    "project_id": "my-project",
    "job_id_prefix": "train_census_200309_140507",
    "training_input": {
        "scaleTier": "BASIC",
        "packageUris": [
            "gs://census-bucket/dist/trainer-0.1.tar.gz"
        ],
        "pythonModule": "trainer.task",
        "args": [
            "--model_dir",
            "gs://census-bucket/census/model"
        ],
        "jobDir": "gs://census-bucket/census",
        "region": "us-central1",
        "runtimeVersion": "1.15",
        "pythonVersion": "3.7"
    }
}"#;
        assert_eq!(json, expected);
    }

    #[test]
    fn test_deploy_params_tensorflow_omits_model_uri() {
        let model = census_model();
        let params = DeployParams::from_model(&model);
        assert_eq!(params.model_id, "census_kfp");
        assert_eq!(params.model_uri, None);
        assert!(!params.to_json().unwrap().contains("model_uri"));
    }

    #[test]
    fn test_deploy_params_sklearn_points_at_model_dir() {
        let mut model = census_model();
        model.framework = "sklearn".to_string();
        let json = DeployParams::from_model(&model).to_json().unwrap();
        let expected = r#"{
    "project_id": "my-project",
    "model_id": "census_kfp",
    "runtime_version": "1.15",
    "python_version": "3.7",
    "model_uri": "gs://census-bucket/census/model"
}"#;
        assert_eq!(json, expected);
    }
}
