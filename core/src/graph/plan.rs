//! Expands a node graph description into a batch tree.
//!
//! Frames requested for the targets are pushed upstream, consumer first,
//! through input offsets, frame masks, context variables and wedges. Each
//! (node, context) then chunks its required frames by batch size, and every
//! batch is wired to the input batches that hold the frames it consumes.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{BatchId, BatchTree, Context, Frame, FrameList, Node, NodeKind};
use crate::dispatch::NodeSettings;
use crate::error::PlanError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    #[default]
    Task,
    FarmPlugin,
    FrameMask,
    TaskList,
    TaskSwitch,
    Wedge,
    ContextVariables,
}

/// How a node turns its required frames into batches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameMode {
    /// Chunks of `batch_size` consecutive required frames.
    #[default]
    PerFrame,
    /// A single batch executed on the first required frame.
    Collapsed,
    /// A single batch with no frames.
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSpec {
    pub node: String,

    /// Added to every frame requested from this input.
    #[serde(default)]
    pub offset: Frame,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub name: String,

    #[serde(rename = "type", default)]
    pub node_type: NodeType,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default)]
    pub frames: FrameMode,

    #[serde(default)]
    pub inputs: Vec<InputSpec>,

    /// Frame list kept by a frame mask, e.g. `"16-20"`.
    #[serde(default)]
    pub mask: Option<String>,

    /// Variables a context-variables node sets for its inputs.
    #[serde(default)]
    pub variables: BTreeMap<String, String>,

    #[serde(default)]
    pub wedge_variable: Option<String>,

    #[serde(default)]
    pub wedge_values: Vec<String>,

    /// Input index a task switch follows.
    #[serde(default)]
    pub switch_index: usize,

    #[serde(default)]
    pub plugin: Option<String>,

    #[serde(default)]
    pub parameters: BTreeMap<String, String>,

    #[serde(default)]
    pub settings: Option<NodeSettings>,
}

fn default_batch_size() -> usize {
    1
}

impl NodeSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            node_type: NodeType::default(),
            batch_size: default_batch_size(),
            frames: FrameMode::default(),
            inputs: Vec::new(),
            mask: None,
            variables: BTreeMap::new(),
            wedge_variable: None,
            wedge_values: Vec::new(),
            switch_index: 0,
            plugin: None,
            parameters: BTreeMap::new(),
            settings: None,
        }
    }

    pub fn with_type(mut self, node_type: NodeType) -> Self {
        self.node_type = node_type;
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn frame_mode(mut self, mode: FrameMode) -> Self {
        self.frames = mode;
        self
    }

    pub fn input(self, node: impl Into<String>) -> Self {
        self.input_with_offset(node, 0)
    }

    pub fn input_with_offset(mut self, node: impl Into<String>, offset: Frame) -> Self {
        self.inputs.push(InputSpec {
            node: node.into(),
            offset,
        });
        self
    }

    pub fn settings(mut self, settings: NodeSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    fn kind(&self) -> Result<NodeKind, PlanError> {
        Ok(match self.node_type {
            NodeType::Task => NodeKind::Task,
            NodeType::FarmPlugin => NodeKind::FarmPlugin {
                plugin: self.plugin.clone().ok_or_else(|| PlanError::MissingField {
                    node: self.name.clone(),
                    field: "plugin",
                })?,
                parameters: self.parameters.clone(),
            },
            NodeType::FrameMask => NodeKind::FrameMask,
            NodeType::TaskList => NodeKind::TaskList,
            NodeType::TaskSwitch => NodeKind::TaskSwitch,
            NodeType::Wedge => NodeKind::Wedge,
            NodeType::ContextVariables => NodeKind::ContextVariables,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSpec {
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
}

impl GraphSpec {
    pub fn from_toml_str(input: &str) -> Result<Self, PlanError> {
        toml::from_str(input).map_err(|e| PlanError::Parse(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, PlanError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| PlanError::Parse(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn node(mut self, spec: NodeSpec) -> Self {
        self.nodes.push(spec);
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PlanRequest<'a> {
    pub targets: &'a [String],
    pub frames: &'a [Frame],
    pub context: &'a Context,
    /// Settings for nodes that do not carry their own.
    pub defaults: &'a NodeSettings,
}

#[derive(Debug, Clone)]
pub struct Plan {
    pub tree: BatchTree,
    /// Target batches in target then frame order.
    pub roots: Vec<BatchId>,
}

type Requirements = BTreeMap<Context, BTreeSet<Frame>>;

struct Planner<'a> {
    spec: &'a GraphSpec,
    index: HashMap<&'a str, usize>,
    masks: HashMap<usize, BTreeSet<Frame>>,
}

impl<'a> Planner<'a> {
    fn new(spec: &'a GraphSpec) -> Result<Self, PlanError> {
        let mut index = HashMap::new();
        for (i, node) in spec.nodes.iter().enumerate() {
            if index.insert(node.name.as_str(), i).is_some() {
                return Err(PlanError::DuplicateNode(node.name.clone()));
            }
        }

        let mut masks = HashMap::new();
        for (i, node) in spec.nodes.iter().enumerate() {
            if node.batch_size == 0 {
                return Err(PlanError::InvalidBatchSize {
                    node: node.name.clone(),
                });
            }
            for input in &node.inputs {
                if !index.contains_key(input.node.as_str()) {
                    return Err(PlanError::UnknownInput {
                        node: node.name.clone(),
                        input: input.node.clone(),
                    });
                }
            }
            let missing = |field| PlanError::MissingField {
                node: node.name.clone(),
                field,
            };
            match node.node_type {
                NodeType::FrameMask => {
                    let mask = node.mask.as_deref().ok_or_else(|| missing("mask"))?;
                    masks.insert(i, FrameList::parse(mask)?.into_vec().into_iter().collect());
                }
                NodeType::Wedge if node.wedge_variable.is_none() => {
                    return Err(missing("wedge_variable"));
                }
                _ => {}
            }
            node.kind()?;
        }

        Ok(Self { spec, index, masks })
    }

    fn lookup(&self, name: &str) -> Result<usize, PlanError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| PlanError::UnknownNode(name.to_string()))
    }

    /// Nodes reachable from `targets`, every consumer ahead of its inputs.
    fn consumer_order(&self, targets: &[usize]) -> Result<Vec<usize>, PlanError> {
        let mut order = Vec::new();
        let mut done = HashSet::new();
        let mut stack = Vec::new();
        for &target in targets {
            self.visit(target, &mut done, &mut stack, &mut order)?;
        }
        order.reverse();
        Ok(order)
    }

    fn visit(
        &self,
        node: usize,
        done: &mut HashSet<usize>,
        stack: &mut Vec<usize>,
        order: &mut Vec<usize>,
    ) -> Result<(), PlanError> {
        if done.contains(&node) {
            return Ok(());
        }
        if let Some(pos) = stack.iter().position(|n| *n == node) {
            let mut cycle: Vec<&str> = stack[pos..]
                .iter()
                .map(|i| self.spec.nodes[*i].name.as_str())
                .collect();
            cycle.push(&self.spec.nodes[node].name);
            return Err(PlanError::CircularGraph(cycle.join(" -> ")));
        }

        stack.push(node);
        for input in &self.spec.nodes[node].inputs {
            let input = self.lookup(&input.node)?;
            self.visit(input, done, stack, order)?;
        }
        stack.pop();

        done.insert(node);
        order.push(node);
        Ok(())
    }

    /// Frames each input must provide for `node` running over `frames`.
    fn requests(
        &self,
        node: usize,
        context: &Context,
        frames: &BTreeSet<Frame>,
    ) -> Vec<(usize, Context, BTreeSet<Frame>)> {
        let spec = &self.spec.nodes[node];
        let frames: BTreeSet<Frame> = match self.masks.get(&node) {
            Some(mask) => frames.intersection(mask).copied().collect(),
            None => frames.clone(),
        };
        if frames.is_empty() {
            return Vec::new();
        }

        let contexts: Vec<Context> = match (spec.node_type, spec.wedge_variable.as_ref()) {
            (NodeType::ContextVariables, _) => {
                let mut ctx = context.clone();
                ctx.extend(spec.variables.clone());
                vec![ctx]
            }
            (NodeType::Wedge, Some(variable)) => spec
                .wedge_values
                .iter()
                .map(|value| {
                    let mut ctx = context.clone();
                    ctx.insert(variable.clone(), value.clone());
                    ctx
                })
                .collect(),
            _ => vec![context.clone()],
        };

        let inputs: Vec<&InputSpec> = match spec.node_type {
            NodeType::TaskSwitch => spec.inputs.get(spec.switch_index).into_iter().collect(),
            _ => spec.inputs.iter().collect(),
        };

        let mut out = Vec::new();
        for input in inputs {
            let Some(&upstream) = self.index.get(input.node.as_str()) else {
                continue;
            };
            let shifted: BTreeSet<Frame> = frames.iter().map(|f| f + input.offset).collect();
            for ctx in &contexts {
                out.push((upstream, ctx.clone(), shifted.clone()));
            }
        }
        out
    }
}

struct PlannedBatch {
    id: BatchId,
    node: usize,
    context: Context,
    covers: BTreeSet<Frame>,
}

pub fn plan(spec: &GraphSpec, request: &PlanRequest<'_>) -> Result<Plan, PlanError> {
    let planner = Planner::new(spec)?;
    let targets = request
        .targets
        .iter()
        .map(|t| planner.lookup(t))
        .collect::<Result<Vec<_>, _>>()?;
    let order = planner.consumer_order(&targets)?;

    let mut required: Vec<Requirements> = vec![BTreeMap::new(); spec.nodes.len()];
    for &target in &targets {
        required[target]
            .entry(request.context.clone())
            .or_default()
            .extend(request.frames.iter().copied());
    }
    for &node in &order {
        let current = required[node].clone();
        for (ctx, frames) in &current {
            for (input, input_ctx, input_frames) in planner.requests(node, ctx, frames) {
                required[input]
                    .entry(input_ctx)
                    .or_default()
                    .extend(input_frames);
            }
        }
    }

    let mut tree = BatchTree::new();
    let mut lookup: HashMap<(usize, Context), BTreeMap<Frame, BatchId>> = HashMap::new();
    let mut planned: Vec<PlannedBatch> = Vec::new();

    for (i, node_spec) in spec.nodes.iter().enumerate() {
        if required[i].is_empty() {
            continue;
        }
        let kind = node_spec.kind()?;
        if kind.is_control() && node_spec.batch_size > 1 {
            tracing::warn!(
                target: "farmspool.plan",
                node = %node_spec.name,
                batch_size = node_spec.batch_size,
                "control nodes ignore batch size"
            );
        }
        let settings = node_spec
            .settings
            .clone()
            .unwrap_or_else(|| request.defaults.clone());
        let node_id = tree.add_node(Node {
            name: node_spec.name.clone(),
            kind,
            settings,
        });

        for (ctx, frames) in &required[i] {
            let ordered: Vec<Frame> = frames.iter().copied().collect();
            let chunks: Vec<(Vec<Frame>, BTreeSet<Frame>)> = match node_spec.frames {
                FrameMode::PerFrame => ordered
                    .chunks(node_spec.batch_size)
                    .map(|c| (c.to_vec(), c.iter().copied().collect()))
                    .collect(),
                FrameMode::Collapsed => {
                    vec![(ordered.first().copied().into_iter().collect(), frames.clone())]
                }
                FrameMode::None => vec![(Vec::new(), frames.clone())],
            };

            let entry = lookup.entry((i, ctx.clone())).or_default();
            for (emitted, covers) in chunks {
                let id = tree.add_batch(node_id, ctx.clone(), emitted);
                for frame in &covers {
                    entry.insert(*frame, id);
                }
                planned.push(PlannedBatch {
                    id,
                    node: i,
                    context: ctx.clone(),
                    covers,
                });
            }
        }
    }

    for batch in &planned {
        for (input, input_ctx, input_frames) in
            planner.requests(batch.node, &batch.context, &batch.covers)
        {
            let Some(frames) = lookup.get(&(input, input_ctx)) else {
                continue;
            };
            for frame in &input_frames {
                if let Some(upstream) = frames.get(frame) {
                    tree.add_preceding(batch.id, *upstream);
                }
            }
        }
    }

    let mut roots = Vec::new();
    for &target in &targets {
        if let Some(frames) = lookup.get(&(target, request.context.clone())) {
            for id in frames.values() {
                if !roots.contains(id) {
                    roots.push(*id);
                }
            }
        }
    }

    tracing::debug!(
        target: "farmspool.plan",
        nodes = tree.node_count(),
        batches = tree.batch_count(),
        roots = roots.len(),
        "planned batch tree"
    );

    Ok(Plan { tree, roots })
}
