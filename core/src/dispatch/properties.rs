//! Farm job and plugin properties for a compiled job.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::job::{Job, PropertyMap, DEFAULT_PLUGIN};
use super::resolve::{DependencyPlan, DependencyType};
use crate::error::DispatchError;
use crate::graph::{Context, NodeKind};
use crate::release::ScriptDependency;

/// Plugin frame argument, expanded per task by the executor plugin.
pub const FRAME_TOKENS: &str = "<STARTFRAME>-<ENDFRAME>";

/// Dispatch-wide inputs to property composition.
#[derive(Debug, Clone, Copy)]
pub struct SubmissionContext<'a> {
    pub dispatch_name: &'a str,
    pub base_context: &'a Context,
    pub script_file: Option<&'a Path>,
    pub plugin_version: Option<&'a str>,
    pub dependency_script: Option<&'a str>,
    pub log_level_env: &'a str,
}

/// Everything a job carries to the farm.
#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    pub name: String,
    pub job_properties: PropertyMap,
    pub plugin_properties: PropertyMap,
    pub environment: BTreeMap<String, String>,
    pub farm_settings: PropertyMap,
    pub aux_files: Vec<PathBuf>,
}

/// Farm upstream inputs a job's dependency declaration refers to.
#[derive(Debug, Clone, Copy, Default)]
pub struct Upstream<'a> {
    /// Farm IDs in first-seen order.
    pub job_ids: &'a [String],
    /// Only read for script dependencies.
    pub edges: &'a [ScriptDependency],
}

pub fn job_name(dispatch_name: &str, node_name: &str) -> String {
    if dispatch_name.is_empty() {
        node_name.to_string()
    } else {
        format!("{dispatch_name}.{node_name}")
    }
}

pub fn bool_value(value: bool) -> String {
    if value { "True" } else { "False" }.to_string()
}

/// `"-key" "'value'"` pairs for context entries that differ from the
/// dispatch base context. Values are single-quoted string literals, which is
/// what the executor parses them as. Frame and UI entries are never passed.
pub fn context_arguments(context: &Context, base: &Context) -> String {
    context
        .iter()
        .filter(|(key, _)| key.as_str() != "frame" && !key.starts_with("ui:"))
        .filter(|(key, value)| base.get(*key) != Some(*value))
        .map(|(key, value)| {
            let literal = format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"));
            format!("\"-{key}\" \"{}\"", literal.replace('"', "\\\""))
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Layers, later wins: computed properties, per-dispatch farm settings,
/// explicit overrides, name override.
pub fn compose(
    job: &Job,
    ctx: &SubmissionContext<'_>,
    plan: &DependencyPlan,
    upstream: Upstream<'_>,
) -> Result<Composition, DispatchError> {
    let settings = job.settings();
    let frames = job.frames_string().ok_or_else(|| {
        DispatchError::consistency(format!("{} has tasks without frames", job.node_name()))
    })?;
    let chunk_size = job.chunk_size().unwrap_or(1);
    let mut name = job_name(ctx.dispatch_name, job.node_name());

    let mut props = PropertyMap::new();
    let mut set = |key: &str, value: String| {
        props.insert(key.to_string(), value);
    };
    set("Name", name.clone());
    set("Frames", frames);
    set("ChunkSize", chunk_size.to_string());
    set(
        "Plugin",
        match &job.node().kind {
            NodeKind::FarmPlugin { plugin, .. } => plugin.clone(),
            _ => DEFAULT_PLUGIN.to_string(),
        },
    );
    let batch_name = if settings.batch_name.is_empty() {
        ctx.dispatch_name
    } else {
        settings.batch_name.as_str()
    };
    for (key, value) in [
        ("BatchName", batch_name),
        ("Comment", settings.comment.as_str()),
        ("Department", settings.department.as_str()),
        ("Pool", settings.pool.as_str()),
        ("SecondaryPool", settings.secondary_pool.as_str()),
        ("Group", settings.group.as_str()),
        ("LimitGroups", settings.limit_groups.as_str()),
    ] {
        if !value.is_empty() {
            set(key, value.to_string());
        }
    }
    set("Priority", settings.priority.to_string());
    set("TaskTimeoutMinutes", settings.task_timeout_minutes.to_string());
    set("EnableAutoTimeout", bool_value(settings.enable_auto_timeout));
    set("ConcurrentTasks", settings.concurrent_tasks.to_string());
    set("MachineLimit", settings.machine_limit.to_string());
    if !settings.machine_list.is_empty() {
        let key = if settings.blacklist { "Blacklist" } else { "Whitelist" };
        set(key, settings.machine_list.clone());
    }
    set("OnJobComplete", settings.on_job_complete.clone());
    set(
        "InitialStatus",
        if settings.submit_suspended { "Suspended" } else { "Active" }.to_string(),
    );

    match plan.kind {
        DependencyType::None => {}
        DependencyType::JobToJob | DependencyType::FrameToFrame => {
            set("JobDependencies", upstream.job_ids.join(","));
            set("ResumeOnDeletedDependencies", bool_value(true));
            set(
                "IsFrameDependent",
                bool_value(plan.kind == DependencyType::FrameToFrame),
            );
            if let Some(offset) = plan.offset {
                set("FrameDependencyOffsetStart", offset.start.to_string());
                set("FrameDependencyOffsetEnd", offset.end.to_string());
            }
        }
        DependencyType::Scripted => {
            let script = ctx.dependency_script.ok_or_else(|| {
                DispatchError::Configuration(format!(
                    "{} needs script dependencies but no dependency script is configured",
                    job.node_name()
                ))
            })?;
            set("ScriptDependencies", script.to_string());
            set("IsFrameDependent", bool_value(true));
            for (i, edge) in upstream.edges.iter().enumerate() {
                set(&format!("ExtraInfoKeyValue{i}"), edge.to_string());
            }
        }
    }

    let mut environment = settings.environment.clone();
    environment.extend(settings.extra_environment.clone());
    environment
        .entry(ctx.log_level_env.to_string())
        .or_insert_with(|| settings.log_level.clone());
    for (i, (key, value)) in environment.iter().enumerate() {
        set(&format!("EnvironmentKeyValue{i}"), format!("{key}={value}"));
    }

    let mut farm_settings = settings.farm_settings.clone();
    farm_settings.extend(settings.extra_farm_settings.clone());
    props.extend(farm_settings.clone());
    if let Some(name_override) = settings.name_override.as_ref().filter(|n| !n.is_empty()) {
        name = name_override.clone();
        props.insert("Name".to_string(), name.clone());
    }

    let plugin_properties = match &job.node().kind {
        NodeKind::FarmPlugin { parameters, .. } => parameters.clone(),
        _ => {
            let mut plugin = PropertyMap::new();
            if let Some(file_name) = ctx.script_file.and_then(Path::file_name) {
                plugin.insert("Script".into(), file_name.to_string_lossy().into_owned());
            }
            if let Some(version) = ctx.plugin_version {
                plugin.insert("Version".into(), version.to_string());
            }
            plugin.insert("IgnoreScriptLoadErrors".into(), bool_value(false));
            plugin.insert("Nodes".into(), job.node_name().to_string());
            plugin.insert("Frames".into(), FRAME_TOKENS.to_string());
            if settings.threads > 0 {
                plugin.insert("Threads".into(), settings.threads.to_string());
            }
            let args = context_arguments(job.context(), ctx.base_context);
            if !args.is_empty() {
                plugin.insert("Context".into(), args);
            }
            plugin
        }
    };

    let mut aux_files: Vec<PathBuf> = ctx.script_file.map(Path::to_path_buf).into_iter().collect();
    for path in &settings.aux_files {
        if !aux_files.contains(path) {
            aux_files.push(path.clone());
        }
    }

    Ok(Composition {
        name,
        job_properties: props,
        plugin_properties,
        environment,
        farm_settings,
        aux_files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::resolve::FrameOffset;
    use crate::dispatch::{JobKey, NodeSettings};
    use crate::graph::{Node, NodeId};
    use pretty_assertions::assert_eq;

    fn base() -> Context {
        Context::from([("project".to_string(), "demo".to_string())])
    }

    fn submission<'a>(base: &'a Context, script: Option<&'a str>) -> SubmissionContext<'a> {
        SubmissionContext {
            dispatch_name: "shot010",
            base_context: base,
            script_file: Some(Path::new("/show/shot010.gfr")),
            plugin_version: Some("1.4"),
            dependency_script: script,
            log_level_env: "IECORE_LOG_LEVEL",
        }
    }

    fn render_job(settings: NodeSettings) -> Job {
        let mut context = base();
        context.insert("frame".into(), "1".into());
        context.insert("shot".into(), "010".into());
        let mut job = Job::new(
            JobKey(0),
            NodeId(0),
            Node::task("render").with_settings(settings),
            context,
        );
        job.add_batch(None, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]).unwrap();
        job.add_batch(None, &[11, 12, 13]).unwrap();
        job
    }

    #[test]
    fn test_base_properties() {
        let base = base();
        let job = render_job(NodeSettings {
            pool: "gpu".into(),
            threads: 8,
            ..Default::default()
        });
        let out = compose(&job, &submission(&base, None), &DependencyPlan::default(), Upstream::default())
            .unwrap();

        let props = &out.job_properties;
        assert_eq!(out.name, "shot010.render");
        assert_eq!(props["Name"], "shot010.render");
        assert_eq!(props["Frames"], "1-10,11-13");
        assert_eq!(props["ChunkSize"], "10");
        assert_eq!(props["Plugin"], DEFAULT_PLUGIN);
        assert_eq!(props["BatchName"], "shot010");
        assert_eq!(props["Pool"], "gpu");
        assert_eq!(props["Priority"], "50");
        assert_eq!(props["InitialStatus"], "Active");
        assert_eq!(props["EnvironmentKeyValue0"], "IECORE_LOG_LEVEL=INFO");
        assert!(!props.contains_key("Comment"));
        assert!(!props.contains_key("JobDependencies"));

        let plugin = &out.plugin_properties;
        assert_eq!(plugin["Script"], "shot010.gfr");
        assert_eq!(plugin["Version"], "1.4");
        assert_eq!(plugin["Nodes"], "render");
        assert_eq!(plugin["Frames"], FRAME_TOKENS);
        assert_eq!(plugin["Threads"], "8");
        assert_eq!(plugin["Context"], "\"-shot\" \"'010'\"");
        assert_eq!(out.aux_files, vec![PathBuf::from("/show/shot010.gfr")]);
    }

    #[test]
    fn test_context_values_are_quoted_literals() {
        let base = base();
        let context = Context::from([
            ("frame".to_string(), "4".to_string()),
            ("project".to_string(), "demo".to_string()),
            ("take".to_string(), "it's \"b\"".to_string()),
            ("ui:scene".to_string(), "x".to_string()),
        ]);
        assert_eq!(
            context_arguments(&context, &base),
            r#""-take" "'it\'s \"b\"'""#
        );
        assert_eq!(context_arguments(&base, &base), "");
    }

    #[test]
    fn test_frame_dependency_properties() {
        let base = base();
        let job = render_job(NodeSettings::default());
        let plan = DependencyPlan {
            kind: DependencyType::FrameToFrame,
            offset: Some(FrameOffset { start: 0, end: -2 }),
        };
        let ids = vec!["a1".to_string(), "b2".to_string()];
        let out = compose(
            &job,
            &submission(&base, None),
            &plan,
            Upstream {
                job_ids: &ids,
                edges: &[],
            },
        )
        .unwrap();

        let props = &out.job_properties;
        assert_eq!(props["JobDependencies"], "a1,b2");
        assert_eq!(props["ResumeOnDeletedDependencies"], "True");
        assert_eq!(props["IsFrameDependent"], "True");
        assert_eq!(props["FrameDependencyOffsetStart"], "0");
        assert_eq!(props["FrameDependencyOffsetEnd"], "-2");
    }

    #[test]
    fn test_job_dependency_is_not_frame_dependent() {
        let base = base();
        let job = render_job(NodeSettings::default());
        let plan = DependencyPlan {
            kind: DependencyType::JobToJob,
            offset: Some(FrameOffset::default()),
        };
        let ids = vec!["a1".to_string()];
        let upstream = Upstream {
            job_ids: &ids,
            edges: &[],
        };
        let out = compose(&job, &submission(&base, None), &plan, upstream).unwrap();
        assert_eq!(out.job_properties["JobDependencies"], "a1");
        assert_eq!(out.job_properties["IsFrameDependent"], "False");
        assert_eq!(out.job_properties["FrameDependencyOffsetStart"], "0");
        assert_eq!(out.job_properties["FrameDependencyOffsetEnd"], "0");
        assert!(!out.job_properties.contains_key("ScriptDependencies"));
    }

    #[test]
    fn test_script_dependency_properties() {
        let base = base();
        let job = render_job(NodeSettings::default());
        let plan = DependencyPlan {
            kind: DependencyType::Scripted,
            offset: None,
        };
        let edges = vec![
            ScriptDependency {
                task: 0,
                upstream_job: "a1".into(),
                upstream_task: 3,
            },
            ScriptDependency {
                task: 1,
                upstream_job: "a1".into(),
                upstream_task: 0,
            },
        ];
        let upstream = Upstream {
            job_ids: &[],
            edges: &edges,
        };

        let err = compose(&job, &submission(&base, None), &plan, upstream).unwrap_err();
        assert!(matches!(err, DispatchError::Configuration(_)));

        let out = compose(
            &job,
            &submission(&base, Some("/farm/release.py")),
            &plan,
            upstream,
        )
        .unwrap();
        let props = &out.job_properties;
        assert_eq!(props["ScriptDependencies"], "/farm/release.py");
        assert_eq!(props["ExtraInfoKeyValue0"], "0:a1=3");
        assert_eq!(props["ExtraInfoKeyValue1"], "1:a1=0");
        assert!(!props.contains_key("JobDependencies"));
    }

    #[test]
    fn test_settings_layering() {
        let base = base();
        let job = render_job(NodeSettings {
            farm_settings: BTreeMap::from([
                ("Pool".to_string(), "cpu".to_string()),
                ("Priority".to_string(), "10".to_string()),
            ]),
            extra_farm_settings: BTreeMap::from([("Priority".to_string(), "90".to_string())]),
            name_override: Some("hero_render".into()),
            environment: BTreeMap::from([("OCIO".to_string(), "/show/ocio".to_string())]),
            extra_environment: BTreeMap::from([("IECORE_LOG_LEVEL".to_string(), "DEBUG".to_string())]),
            machine_list: "w01,w02".into(),
            blacklist: true,
            ..Default::default()
        });
        let out = compose(&job, &submission(&base, None), &DependencyPlan::default(), Upstream::default())
            .unwrap();

        let props = &out.job_properties;
        assert_eq!(props["Pool"], "cpu");
        assert_eq!(props["Priority"], "90");
        assert_eq!(props["Name"], "hero_render");
        assert_eq!(out.name, "hero_render");
        assert_eq!(props["Blacklist"], "w01,w02");
        assert_eq!(props["EnvironmentKeyValue0"], "IECORE_LOG_LEVEL=DEBUG");
        assert_eq!(props["EnvironmentKeyValue1"], "OCIO=/show/ocio");
        assert!(!props.contains_key("EnvironmentKeyValue2"));
    }

    #[test]
    fn test_farm_plugin_nodes_pass_parameters() {
        let base = base();
        let mut job = Job::new(
            JobKey(0),
            NodeId(0),
            Node::new(
                "comp",
                NodeKind::FarmPlugin {
                    plugin: "Nuke".into(),
                    parameters: BTreeMap::from([("SceneFile".to_string(), "/show/comp.nk".to_string())]),
                },
            ),
            base.clone(),
        );
        job.add_batch(None, &[1, 2, 3]).unwrap();
        let out = compose(&job, &submission(&base, None), &DependencyPlan::default(), Upstream::default())
            .unwrap();

        assert_eq!(out.job_properties["Plugin"], "Nuke");
        assert_eq!(
            out.plugin_properties,
            PropertyMap::from([("SceneFile".to_string(), "/show/comp.nk".to_string())])
        );
    }

    #[test]
    fn test_placeholder_tasks_cannot_be_submitted() {
        let base = base();
        let mut job = Job::new(JobKey(0), NodeId(0), Node::task("noop"), base.clone());
        job.add_batch::<i64>(None, &[]).unwrap();
        let err = compose(&job, &submission(&base, None), &DependencyPlan::default(), Upstream::default())
            .unwrap_err();
        assert!(matches!(err, DispatchError::GraphConsistency(_)));
    }
}
