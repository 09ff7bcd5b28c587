//! Pipeline builder.
//!
//! A [`Pipeline`] accumulates workflow steps under a synthetic root, numbers
//! them in creation order and flattens the resulting tree into a vertex/edge
//! [`Graph`] that generators render from.

use std::fmt;

use anyhow::{Result, anyhow};
use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::component::{Component, ComponentId, Params, Role, sparse_params};
use crate::descriptor::ModelDescriptor;
use crate::utils::{GenerationResult, JOB_TIMESTAMP_FORMAT};

/// Edge of the flattened graph in `(parent, child)` form.
pub type Relation = (ComponentId, ComponentId);

/// Flattened, borrowed view of a pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct Graph<'a> {
    /// Every step, indexed by its id. The root is not included.
    pub components: Vec<&'a Component>,
    pub relations: Vec<Relation>,
}

/// Target-specific rendering of a pipeline (one implementation per
/// orchestration engine).
pub trait PipelineGenerator {
    fn generate_pipeline(&self, pipeline: &Pipeline) -> Result<GenerationResult>;
}

pub struct Pipeline {
    model: Box<dyn ModelDescriptor>,
    structure: Component,
    components: Vec<Component>,
    job_id: String,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("model", &self.model.name())
            .field("job_id", &self.job_id)
            .field("structure", &self.structure)
            .field("components", &self.components)
            .finish()
    }
}

impl Pipeline {
    /// Create an empty pipeline. `created_at` feeds the job id.
    pub fn new(model: Box<dyn ModelDescriptor>, created_at: NaiveDateTime) -> Self {
        let job_id = format!(
            "{}_{}",
            model.name(),
            created_at.format(JOB_TIMESTAMP_FORMAT)
        );
        Self {
            model,
            structure: Component::root(),
            components: Vec::new(),
            job_id,
        }
    }

    /// Create an empty pipeline stamped with the local wall clock.
    pub fn started_now(model: Box<dyn ModelDescriptor>) -> Self {
        Self::new(model, Local::now().naive_local())
    }

    pub fn model(&self) -> &dyn ModelDescriptor {
        self.model.as_ref()
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Number of steps added so far; also the id the next step receives.
    pub fn size(&self) -> usize {
        self.components.len()
    }

    pub fn structure(&self) -> &Component {
        &self.structure
    }

    /// Look up a step (or the root) by id.
    pub fn component(&self, id: ComponentId) -> Option<&Component> {
        if id.is_root() {
            return Some(&self.structure);
        }
        usize::try_from(id.0)
            .ok()
            .and_then(|idx| self.components.get(idx))
    }

    pub fn add_train_component(
        &mut self,
        parent: Option<ComponentId>,
        wait_interval: Option<u64>,
    ) -> Result<ComponentId> {
        let params = sparse_params([("wait_interval", wait_interval.map(Value::from))]);
        self.add_component(Role::Train, parent, params)
    }

    pub fn add_deploy_component(
        &mut self,
        parent: Option<ComponentId>,
        model_uri: Option<String>,
        wait_interval: Option<u64>,
    ) -> Result<ComponentId> {
        let params = sparse_params([
            ("model_uri", model_uri.map(Value::from)),
            ("wait_interval", wait_interval.map(Value::from)),
        ]);
        self.add_component(Role::Deploy, parent, params)
    }

    /// `model` and `version` are stored as `model_id` and `version_id`.
    pub fn add_predict_component(
        &mut self,
        parent: Option<ComponentId>,
        model: Option<String>,
        version: Option<String>,
    ) -> Result<ComponentId> {
        let params = sparse_params([
            ("model_id", model.map(Value::from)),
            ("version_id", version.map(Value::from)),
        ]);
        self.add_component(Role::Predict, parent, params)
    }

    fn add_component(
        &mut self,
        role: Role,
        parent: Option<ComponentId>,
        params: Params,
    ) -> Result<ComponentId> {
        let parent = parent.unwrap_or(ComponentId::ROOT);
        let id = ComponentId(self.components.len() as i64);
        let parent_node = self
            .node_mut(parent)
            .ok_or_else(|| anyhow!("unknown parent component {parent}"))?;
        parent_node.add_child(id);
        self.components.push(Component::new(role, id, params));
        debug!(%role, %id, %parent, "added component");
        Ok(id)
    }

    fn node_mut(&mut self, id: ComponentId) -> Option<&mut Component> {
        if id.is_root() {
            return Some(&mut self.structure);
        }
        usize::try_from(id.0)
            .ok()
            .and_then(|idx| self.components.get_mut(idx))
    }

    // Children are always ids issued by this pipeline.
    fn node(&self, id: ComponentId) -> &Component {
        if id.is_root() {
            &self.structure
        } else {
            &self.components[id.0 as usize]
        }
    }

    /// Lines of the diagnostic dump: `"<id> [<child ids>]"` per step, in
    /// stack order (last-added sibling first).
    pub fn structure_lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.size());
        let mut next = vec![&self.structure];
        while let Some(comp) = next.pop() {
            if !comp.id.is_root() {
                let children = comp
                    .children
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                lines.push(format!("{} [{}]", comp.id, children));
            }
            next.extend(comp.children.iter().map(|c| self.node(*c)));
        }
        lines
    }

    pub fn print_structure(&self) {
        for line in self.structure_lines() {
            println!("{line}");
        }
    }

    /// Flatten the tree into id-indexed vertices and `(parent, child)` edges.
    ///
    /// Edges are listed in stack visit order, matching the legacy renderer:
    /// a node's own edges are emitted in insertion order, but later siblings
    /// are expanded before earlier ones.
    pub fn to_graph(&self) -> Graph<'_> {
        let mut relations = Vec::with_capacity(self.size());
        let mut next = vec![&self.structure];
        while let Some(comp) = next.pop() {
            next.extend(comp.children.iter().map(|c| self.node(*c)));
            relations.extend(comp.children.iter().map(|child| (comp.id, *child)));
        }
        Graph {
            components: self.components.iter().collect(),
            relations,
        }
    }
}
