//! Orchestration script rendering.
//!
//! Templates are looked up by name through a [`TemplateSet`]; the built-in set
//! renders Kubeflow Pipelines DSL scripts with plain `format!` composition.

use anyhow::{Result, anyhow};
use serde::Serialize;
use serde_json::Value;

use crate::component::{Component, ComponentId, Role};
use crate::pipeline::Relation;

/// Name of the Kubeflow Pipelines script template.
pub const KFP_PIPELINE_TEMPLATE: &str = "kfp_pipeline.py";

/// Values a pipeline template is rendered with.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateContext<'a> {
    pub train_params: String,
    pub model_dir: String,
    pub deploy_params: String,
    pub components: Vec<&'a Component>,
    pub relations: Vec<Relation>,
}

/// Source of named templates. Rendering must be deterministic for identical
/// contexts.
pub trait TemplateSet {
    fn render(&self, name: &str, ctx: &TemplateContext<'_>) -> Result<String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinTemplates;

impl TemplateSet for BuiltinTemplates {
    fn render(&self, name: &str, ctx: &TemplateContext<'_>) -> Result<String> {
        match name {
            KFP_PIPELINE_TEMPLATE => render_kfp_pipeline(ctx),
            other => Err(anyhow!("unknown template: {other}")),
        }
    }
}

const COMPONENT_BASE_URL: &str =
    "https://raw.githubusercontent.com/kubeflow/pipelines/1.0.0/components/gcp/ml_engine";

/// Render the full KFP script for the given context.
///
/// The parameter blobs are embedded as raw triple-quoted strings so their JSON
/// escapes reach `json.loads` untouched.
pub fn render_kfp_pipeline(ctx: &TemplateContext<'_>) -> Result<String> {
    let steps = ctx
        .components
        .iter()
        .map(|c| render_step(c))
        .collect::<Vec<_>>();
    let edges = render_edges(ctx)?;

    let mut body = steps.join("\n");
    if !edges.is_empty() {
        body.push('\n');
        body.push_str(&edges);
    }
    if body.is_empty() {
        body = "    pass\n".to_string();
    }

    Ok(format!(
        r#"# Generated by ai-pipeline. Changes are overwritten on the next run.
import json

import kfp
from kfp import components
from kfp import dsl

COMPONENT_URL = "{base}/{{}}/component.yaml"

mlengine_train_op = components.load_component_from_url(COMPONENT_URL.format("train"))
mlengine_deploy_op = components.load_component_from_url(COMPONENT_URL.format("deploy"))
mlengine_batch_predict_op = components.load_component_from_url(
    COMPONENT_URL.format("batch_predict"))

TRAIN_PARAMS = json.loads(r"""
{train_params}
""")
DEPLOY_PARAMS = json.loads(r"""
{deploy_params}
""")
MODEL_DIR = {model_dir}


@dsl.pipeline(
    name="ai-pipeline",
    description="Train, deploy and predict on AI Platform.")
def pipeline():
{body}

if __name__ == "__main__":
    kfp.compiler.Compiler().compile(pipeline, __file__ + ".tar.gz")
"#,
        base = COMPONENT_BASE_URL,
        train_params = ctx.train_params,
        deploy_params = ctx.deploy_params,
        model_dir = py_str(&ctx.model_dir),
        body = body,
    ))
}

/// Python variable holding the op of a step, e.g. `deploy_1`.
pub fn op_name(component: &Component) -> String {
    format!("{}_{}", component.role, component.id)
}

fn render_step(component: &Component) -> String {
    let mut args: Vec<String> = match component.role {
        Role::Train => vec![
            "project_id=TRAIN_PARAMS[\"project_id\"]".to_string(),
            "job_id_prefix=TRAIN_PARAMS[\"job_id_prefix\"]".to_string(),
            "training_input=json.dumps(TRAIN_PARAMS[\"training_input\"])".to_string(),
        ],
        Role::Deploy => {
            let model_uri = component
                .params
                .get("model_uri")
                .map(py_literal)
                .unwrap_or_else(|| "DEPLOY_PARAMS.get(\"model_uri\", MODEL_DIR)".to_string());
            vec![
                format!("model_uri={model_uri}"),
                "project_id=DEPLOY_PARAMS[\"project_id\"]".to_string(),
                "model_id=DEPLOY_PARAMS[\"model_id\"]".to_string(),
                "runtime_version=DEPLOY_PARAMS[\"runtime_version\"]".to_string(),
                "python_version=DEPLOY_PARAMS[\"python_version\"]".to_string(),
            ]
        }
        Role::Predict => {
            let model_id = component
                .params
                .get("model_id")
                .map(py_literal)
                .unwrap_or_else(|| "DEPLOY_PARAMS[\"model_id\"]".to_string());
            let model_path = match component.params.get("version_id") {
                Some(version) => format!(
                    "\"projects/{{}}/models/{{}}/versions/{{}}\".format(\
DEPLOY_PARAMS[\"project_id\"], {model_id}, {})",
                    py_literal(version)
                ),
                None => format!(
                    "\"projects/{{}}/models/{{}}\".format(DEPLOY_PARAMS[\"project_id\"], {model_id})"
                ),
            };
            vec![
                "project_id=DEPLOY_PARAMS[\"project_id\"]".to_string(),
                format!("model_path={model_path}"),
                "input_paths=json.dumps([TRAIN_PARAMS[\"training_input\"][\"jobDir\"] + \"/predict/input*\"])"
                    .to_string(),
                "input_data_format=\"JSON\"".to_string(),
                "output_path=TRAIN_PARAMS[\"training_input\"][\"jobDir\"] + \"/predict/output\""
                    .to_string(),
                "region=TRAIN_PARAMS[\"training_input\"][\"region\"]".to_string(),
            ]
        }
        // The root is never part of the flattened graph.
        Role::Start => return String::new(),
    };

    if let Some(wait) = component.params.get("wait_interval") {
        args.push(format!("wait_interval={}", py_literal(wait)));
    }

    let factory = match component.role {
        Role::Train => "mlengine_train_op",
        Role::Deploy => "mlengine_deploy_op",
        _ => "mlengine_batch_predict_op",
    };
    let args = args
        .iter()
        .map(|a| format!("        {a},\n"))
        .collect::<String>();
    format!("    {} = {factory}(\n{args}    )\n", op_name(component))
}

fn lookup<'a>(components: &[&'a Component], id: ComponentId) -> Result<&'a Component> {
    usize::try_from(id.0)
        .ok()
        .and_then(|idx| components.get(idx).copied())
        .ok_or_else(|| anyhow!("relation references unknown component {id}"))
}

fn render_edges(ctx: &TemplateContext<'_>) -> Result<String> {
    let mut out = String::new();
    for (parent, child) in &ctx.relations {
        let child = lookup(&ctx.components, *child)?;
        if parent.is_root() {
            continue;
        }
        let parent = lookup(&ctx.components, *parent)?;
        out.push_str(&format!("    {}.after({})\n", op_name(child), op_name(parent)));
    }
    Ok(out)
}

fn py_str(s: &str) -> String {
    // JSON string escapes are valid Python string escapes.
    Value::from(s).to_string()
}

/// Render a JSON parameter value as a Python expression.
pub fn py_literal(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => py_str(s),
        Value::Array(_) | Value::Object(_) => format!("json.loads({})", py_str(&value.to_string())),
    }
}
