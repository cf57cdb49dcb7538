use std::collections::BTreeMap;

use crate::dispatch::NodeSettings;

/// Closed set of node behaviours the compiler distinguishes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NodeKind {
    /// Runs through the generic graph executor plugin.
    #[default]
    Task,
    /// Names its own farm plugin and passes its parameters straight through.
    FarmPlugin {
        plugin: String,
        parameters: BTreeMap<String, String>,
    },
    FrameMask,
    TaskList,
    TaskSwitch,
    Wedge,
    ContextVariables,
}

impl NodeKind {
    /// Control nodes only shape the dependency topology and are never
    /// submitted to the farm.
    pub fn is_control(&self) -> bool {
        matches!(
            self,
            Self::FrameMask | Self::TaskList | Self::TaskSwitch | Self::Wedge | Self::ContextVariables
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::FarmPlugin { .. } => "farm_plugin",
            Self::FrameMask => "frame_mask",
            Self::TaskList => "task_list",
            Self::TaskSwitch => "task_switch",
            Self::Wedge => "wedge",
            Self::ContextVariables => "context_variables",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
    pub settings: NodeSettings,
}

impl Node {
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            settings: NodeSettings::default(),
        }
    }

    pub fn task(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::Task)
    }

    pub fn with_settings(mut self, settings: NodeSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn is_control(&self) -> bool {
        self.kind.is_control()
    }
}
