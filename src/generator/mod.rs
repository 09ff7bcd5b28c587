//! Generator module — turns a built [`Pipeline`] into an orchestration script.
//!
//! # Submodules
//! - [`params`] — train/deploy parameter blobs read off the model descriptor
//! - [`render`] — template collaborator and the built-in KFP template
//!
//! # Entry points
//! - [`KfpPipeline`] — Kubeflow Pipelines generator
//! - [`generate`]    — KFP generation with the built-in templates

pub mod params;
pub mod render;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::pipeline::{Graph, Pipeline, PipelineGenerator};
use crate::utils::{GenerationResult, PIPELINE_OUTPUT_PATH};
use params::{DeployParams, TrainParams};
use render::{BuiltinTemplates, KFP_PIPELINE_TEMPLATE, TemplateContext, TemplateSet};

/// Kubeflow Pipelines generator.
///
/// Writes `orchestration/pipeline.py` below `output_root`, replacing any
/// previous script.
pub struct KfpPipeline<T: TemplateSet = BuiltinTemplates> {
    templates: T,
    output_root: PathBuf,
}

impl KfpPipeline {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self::with_templates(BuiltinTemplates, output_root)
    }
}

impl<T: TemplateSet> KfpPipeline<T> {
    pub fn with_templates(templates: T, output_root: impl Into<PathBuf>) -> Self {
        Self {
            templates,
            output_root: output_root.into(),
        }
    }

    pub fn output_path(&self) -> PathBuf {
        self.output_root.join(PIPELINE_OUTPUT_PATH)
    }

    /// Render the script without writing it. Uploads the trainer package.
    pub fn render(&self, pipeline: &Pipeline) -> Result<String> {
        self.render_graph(pipeline, pipeline.to_graph())
    }

    fn render_graph(&self, pipeline: &Pipeline, graph: Graph<'_>) -> Result<String> {
        let model = pipeline.model();
        let train_params = TrainParams::from_model(model, pipeline.job_id())?.to_json()?;
        let deploy_params = DeployParams::from_model(model).to_json()?;

        let ctx = TemplateContext {
            train_params,
            model_dir: model.model_dir(),
            deploy_params,
            components: graph.components,
            relations: graph.relations,
        };
        self.templates
            .render(KFP_PIPELINE_TEMPLATE, &ctx)
            .with_context(|| format!("failed to render template {KFP_PIPELINE_TEMPLATE}"))
    }
}

impl<T: TemplateSet> PipelineGenerator for KfpPipeline<T> {
    fn generate_pipeline(&self, pipeline: &Pipeline) -> Result<GenerationResult> {
        let graph = pipeline.to_graph();
        let (components, relations) = (graph.components.len(), graph.relations.len());
        let script = self.render_graph(pipeline, graph)?;

        let output_path = self.output_path();
        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create output dir {}", parent.display()))?;
        }
        fs::write(&output_path, script)
            .with_context(|| format!("failed to write {}", output_path.display()))?;

        info!(
            path = %output_path.display(),
            job_id = pipeline.job_id(),
            components,
            relations,
            "generated KFP pipeline"
        );
        Ok(GenerationResult {
            output_path,
            components,
            relations,
        })
    }
}

/// Generate the KFP script for `pipeline` under `output_root` with the
/// built-in templates.
pub fn generate(pipeline: &Pipeline, output_root: &Path) -> Result<GenerationResult> {
    KfpPipeline::new(output_root).generate_pipeline(pipeline)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use anyhow::anyhow;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    use super::*;
    use crate::descriptor::ModelDescriptor;
    use crate::descriptor::tests::census_model;

    fn census_pipeline() -> Pipeline {
        let created_at = NaiveDate::from_ymd_opt(2020, 3, 9)
            .unwrap()
            .and_hms_opt(14, 5, 7)
            .unwrap();
        let mut p = Pipeline::new(Box::new(census_model()), created_at);
        let train = p.add_train_component(None, Some(30)).unwrap();
        p.add_deploy_component(Some(train), None, None).unwrap();
        p
    }

    #[derive(Default)]
    struct RecordingTemplates {
        seen: RefCell<Vec<(String, usize, Vec<(i64, i64)>)>>,
    }

    impl TemplateSet for RecordingTemplates {
        fn render(&self, name: &str, ctx: &TemplateContext<'_>) -> Result<String> {
            let relations = ctx.relations.iter().map(|(p, c)| (p.0, c.0)).collect();
            self.seen
                .borrow_mut()
                .push((name.to_string(), ctx.components.len(), relations));
            Ok(format!("model_dir={}", ctx.model_dir))
        }
    }

    struct FailingTemplates;

    impl TemplateSet for FailingTemplates {
        fn render(&self, _name: &str, _ctx: &TemplateContext<'_>) -> Result<String> {
            Err(anyhow!("template exploded"))
        }
    }

    /// Descriptor whose trainer package can never be uploaded.
    struct UnreachableBucket(crate::descriptor::ModelConfig);

    impl ModelDescriptor for UnreachableBucket {
        fn name(&self) -> &str {
            self.0.name()
        }
        fn upload_trainer_dist(&self) -> Result<String> {
            Err(anyhow!("bucket gs://census-bucket is not reachable"))
        }
        fn model_dir(&self) -> String {
            self.0.model_dir()
        }
        fn job_dir(&self) -> String {
            self.0.job_dir()
        }
        fn project_id(&self) -> &str {
            self.0.project_id()
        }
        fn scale_tier(&self) -> &str {
            self.0.scale_tier()
        }
        fn region(&self) -> &str {
            self.0.region()
        }
        fn runtime_version(&self) -> &str {
            self.0.runtime_version()
        }
        fn python_version(&self) -> &str {
            self.0.python_version()
        }
        fn framework(&self) -> &str {
            self.0.framework()
        }
    }

    #[test]
    fn test_generate_writes_orchestration_script() {
        let tmp = tempdir().expect("tempdir");
        let result = generate(&census_pipeline(), tmp.path()).expect("generate");

        assert_eq!(result.output_path, tmp.path().join("orchestration/pipeline.py"));
        assert_eq!(result.components, 2);
        assert_eq!(result.relations, 2);
        let script = fs::read_to_string(&result.output_path).unwrap();
        assert!(script.contains("\"job_id_prefix\": \"train_census_200309_140507\""));
        assert!(script.contains("train_0 = mlengine_train_op("));
        assert!(script.contains("deploy_1.after(train_0)"));
    }

    #[test]
    fn test_generate_overwrites_previous_output() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join(PIPELINE_OUTPUT_PATH);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "stale contents that are much longer than the new script").unwrap();

        let generator = KfpPipeline::with_templates(RecordingTemplates::default(), tmp.path());
        generator.generate_pipeline(&census_pipeline()).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "model_dir=gs://census-bucket/census/model"
        );
    }

    #[test]
    fn test_template_receives_graph() {
        let tmp = tempdir().expect("tempdir");
        let templates = RecordingTemplates::default();
        let generator = KfpPipeline::with_templates(templates, tmp.path());
        generator.generate_pipeline(&census_pipeline()).unwrap();

        let seen = generator.templates.seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, KFP_PIPELINE_TEMPLATE);
        assert_eq!(seen[0].1, 2);
        assert_eq!(seen[0].2, vec![(-1, 0), (0, 1)]);
    }

    #[test]
    fn test_template_error_propagates_without_output() {
        let tmp = tempdir().expect("tempdir");
        let generator = KfpPipeline::with_templates(FailingTemplates, tmp.path());
        let err = generator.generate_pipeline(&census_pipeline()).unwrap_err();
        assert!(format!("{err:#}").contains("template exploded"));
        assert!(!generator.output_path().exists());
    }

    #[test]
    fn test_upload_failure_stops_before_write() {
        let tmp = tempdir().expect("tempdir");
        let mut p = Pipeline::new(
            Box::new(UnreachableBucket(census_model())),
            NaiveDate::from_ymd_opt(2020, 3, 9)
                .unwrap()
                .and_hms_opt(14, 5, 7)
                .unwrap(),
        );
        p.add_train_component(None, None).unwrap();

        let templates = RecordingTemplates::default();
        let generator = KfpPipeline::with_templates(templates, tmp.path());
        let err = generator.generate_pipeline(&p).unwrap_err();
        assert!(format!("{err:#}").contains("is not reachable"), "got: {err:#}");
        assert!(!generator.output_path().exists());
        assert!(!tmp.path().join("orchestration").exists());
        assert!(generator.templates.seen.borrow().is_empty());
    }
}
