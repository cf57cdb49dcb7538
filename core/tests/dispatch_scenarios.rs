mod common;

use common::{dispatcher, extra_info, plan_frames, RecordingGateway};
use farmspool_core::dispatch::{DependencyMode, DependencyType, JobGraph, NodeSettings};
use farmspool_core::graph::{FrameMode, GraphSpec, NodeSpec, NodeType};
use pretty_assertions::assert_eq;

fn task_count(graph: &JobGraph, node: &str) -> usize {
    graph.job_named(node).unwrap().tasks().len()
}

fn dependency_count(graph: &JobGraph, node: &str) -> usize {
    graph.job_named(node).unwrap().dependencies().len()
}

#[tokio::test]
async fn chunked_chain_uses_frame_dependencies() {
    let spec = GraphSpec::default()
        .node(NodeSpec::new("n1").batch_size(10))
        .node(NodeSpec::new("n2").batch_size(13).input("n1"));
    let plan = plan_frames(&spec, &["n2"], "1-50");
    let gateway = RecordingGateway::new();
    let (graph, report) = dispatcher(gateway.clone())
        .dispatch(&plan.tree, &plan.roots)
        .await
        .unwrap();

    assert_eq!(task_count(&graph, "n1"), 5);
    assert_eq!(task_count(&graph, "n2"), 4);
    assert_eq!(dependency_count(&graph, "n2"), 8);

    let n2 = graph.job_named("n2").unwrap();
    assert_eq!(n2.dependency_type(), DependencyType::FrameToFrame);
    assert_eq!(n2.frame_offset(), None);

    let submitted = gateway.submission("shot010.n2");
    assert_eq!(submitted.job_properties["Frames"], "1-13,14-26,27-39,40-50");
    assert_eq!(submitted.job_properties["ChunkSize"], "13");
    assert_eq!(submitted.job_properties["JobDependencies"], "job-0");
    assert_eq!(submitted.job_properties["IsFrameDependent"], "True");
    assert!(!submitted.job_properties.contains_key("FrameDependencyOffsetStart"));

    assert_eq!(gateway.names(), vec!["shot010.n1", "shot010.n2"]);
    assert_eq!(report.submitted_count(), 2);
}

#[tokio::test]
async fn diamond_shares_its_ancestor() {
    let spec = GraphSpec::default()
        .node(NodeSpec::new("n1").batch_size(10))
        .node(NodeSpec::new("i1").batch_size(25).input("n1"))
        .node(NodeSpec::new("i2").input("n1"))
        .node(NodeSpec::new("n2").batch_size(13).input("i1").input("i2"));
    let plan = plan_frames(&spec, &["n2"], "1-50");
    let gateway = RecordingGateway::new();
    let (graph, _) = dispatcher(gateway.clone())
        .dispatch(&plan.tree, &plan.roots)
        .await
        .unwrap();

    assert_eq!(graph.len(), 4);
    assert_eq!(dependency_count(&graph, "i1"), 6);
    assert_eq!(dependency_count(&graph, "i2"), 50);
    assert_eq!(dependency_count(&graph, "n2"), 55);

    let i2 = graph.job_named("i2").unwrap();
    assert_eq!(i2.dependency_type(), DependencyType::FrameToFrame);
    let n2 = graph.job_named("n2").unwrap();
    assert_eq!(n2.dependency_type(), DependencyType::FrameToFrame);

    assert_eq!(gateway.submissions().len(), 4);
    assert_eq!(gateway.names()[0], "shot010.n1");
    assert_eq!(gateway.names()[3], "shot010.n2");
    assert_eq!(
        gateway.submission("shot010.n2").job_properties["JobDependencies"],
        "job-1,job-2"
    );
}

#[tokio::test]
async fn per_frame_chain_into_chunked_consumer() {
    let spec = GraphSpec::default()
        .node(NodeSpec::new("a"))
        .node(NodeSpec::new("b").input("a"))
        .node(NodeSpec::new("c").batch_size(13).input("b"));
    let plan = plan_frames(&spec, &["c"], "1-50");
    let gateway = RecordingGateway::new();
    let (graph, _) = dispatcher(gateway.clone())
        .dispatch(&plan.tree, &plan.roots)
        .await
        .unwrap();

    assert_eq!(task_count(&graph, "a"), 50);
    assert_eq!(task_count(&graph, "b"), 50);
    assert_eq!(task_count(&graph, "c"), 4);
    assert_eq!(dependency_count(&graph, "b"), 50);
    assert_eq!(dependency_count(&graph, "c"), 50);

    let b = graph.job_named("b").unwrap();
    assert_eq!(b.dependency_type(), DependencyType::FrameToFrame);
    let c = graph.job_named("c").unwrap();
    assert_eq!(c.dependency_type(), DependencyType::FrameToFrame);
    assert_eq!(c.frame_offset(), None);
}

#[tokio::test]
async fn constant_offset_is_declared() {
    let spec = GraphSpec::default()
        .node(NodeSpec::new("cache"))
        .node(NodeSpec::new("render").input_with_offset("cache", 100));
    let plan = plan_frames(&spec, &["render"], "1-10");
    let gateway = RecordingGateway::new();
    let (graph, _) = dispatcher(gateway.clone())
        .dispatch(&plan.tree, &plan.roots)
        .await
        .unwrap();

    assert_eq!(
        graph.job_named("cache").unwrap().frames_string().as_deref(),
        Some("101,102,103,104,105,106,107,108,109,110")
    );
    let render = gateway.submission("shot010.render");
    assert_eq!(render.job_properties["IsFrameDependent"], "True");
    assert_eq!(render.job_properties["FrameDependencyOffsetStart"], "100");
    assert_eq!(render.job_properties["FrameDependencyOffsetEnd"], "100");
}

#[tokio::test]
async fn irregular_edges_fall_back_to_script_dependencies() {
    let spec = GraphSpec::default()
        .node(NodeSpec::new("sim").batch_size(3))
        .node(NodeSpec::new("mesh").batch_size(2).input_with_offset("sim", 1));
    let plan = plan_frames(&spec, &["mesh"], "1-6");
    let gateway = RecordingGateway::new();
    let (graph, report) = dispatcher(gateway.clone())
        .dispatch(&plan.tree, &plan.roots)
        .await
        .unwrap();

    let mesh = graph.job_named("mesh").unwrap();
    assert_eq!(mesh.dependency_type(), DependencyType::Scripted);
    assert_eq!(report.submitted[1].dependency_type, DependencyType::Scripted);

    let submitted = gateway.submission("shot010.mesh");
    assert_eq!(submitted.job_properties["ScriptDependencies"], common::RELEASE_SCRIPT);
    assert!(!submitted.job_properties.contains_key("JobDependencies"));
    assert_eq!(
        extra_info(&submitted.job_properties),
        vec!["0:job-0=0", "1:job-0=0", "1:job-0=1", "2:job-0=1"]
    );
}

/// Same shape as the script fallback above, with the mode forced on `mesh`.
fn irregular_pair(mode: DependencyMode) -> GraphSpec {
    let settings = NodeSettings {
        dependency_mode: mode,
        ..NodeSettings::default()
    };
    GraphSpec::default()
        .node(NodeSpec::new("sim").batch_size(3))
        .node(
            NodeSpec::new("mesh")
                .batch_size(2)
                .input_with_offset("sim", 1)
                .settings(settings),
        )
}

#[tokio::test]
async fn explicit_job_mode_waits_for_the_whole_job() {
    let plan = plan_frames(&irregular_pair(DependencyMode::Job), &["mesh"], "1-6");
    let gateway = RecordingGateway::new();
    let (graph, _) = dispatcher(gateway.clone())
        .dispatch(&plan.tree, &plan.roots)
        .await
        .unwrap();

    let mesh = graph.job_named("mesh").unwrap();
    assert_eq!(mesh.dependency_type(), DependencyType::JobToJob);

    let submitted = gateway.submission("shot010.mesh");
    assert_eq!(submitted.job_properties["JobDependencies"], "job-0");
    assert_eq!(submitted.job_properties["IsFrameDependent"], "False");
    assert_eq!(submitted.job_properties["FrameDependencyOffsetStart"], "0");
    assert_eq!(submitted.job_properties["FrameDependencyOffsetEnd"], "0");
    assert!(!submitted.job_properties.contains_key("ScriptDependencies"));
    assert!(extra_info(&submitted.job_properties).is_empty());
}

#[tokio::test]
async fn explicit_frame_mode_never_falls_back_to_a_script() {
    let plan = plan_frames(&irregular_pair(DependencyMode::Frame), &["mesh"], "1-6");
    let gateway = RecordingGateway::new();
    let (graph, _) = dispatcher(gateway.clone())
        .dispatch(&plan.tree, &plan.roots)
        .await
        .unwrap();

    let mesh = graph.job_named("mesh").unwrap();
    assert_eq!(mesh.dependency_type(), DependencyType::FrameToFrame);

    let submitted = gateway.submission("shot010.mesh");
    assert_eq!(submitted.job_properties["JobDependencies"], "job-0");
    assert_eq!(submitted.job_properties["IsFrameDependent"], "True");
    assert_eq!(submitted.job_properties["FrameDependencyOffsetStart"], "0");
    assert_eq!(submitted.job_properties["FrameDependencyOffsetEnd"], "0");
    assert!(!submitted.job_properties.contains_key("ScriptDependencies"));
    assert!(extra_info(&submitted.job_properties).is_empty());
}

#[tokio::test]
async fn frameless_task_spans_gapped_upstream_ranges() {
    let spec = GraphSpec::default()
        .node(NodeSpec::new("cache").batch_size(3))
        .node(NodeSpec::new("publish").frame_mode(FrameMode::None).input("cache"));
    let plan = plan_frames(&spec, &["publish"], "1-3,7-9");
    let gateway = RecordingGateway::new();
    let (graph, _) = dispatcher(gateway.clone())
        .dispatch(&plan.tree, &plan.roots)
        .await
        .unwrap();

    let cache = gateway.submission("shot010.cache");
    assert_eq!(cache.job_properties["Frames"], "1-3,7-9");

    assert_eq!(task_count(&graph, "publish"), 1);
    assert_eq!(dependency_count(&graph, "publish"), 2);
    let publish = gateway.submission("shot010.publish");
    assert_eq!(publish.job_properties["Frames"], "1-9");
    assert_eq!(publish.job_properties["ChunkSize"], "9");

    // Frames 4-6 have no upstream task, so only a script can release it.
    assert_eq!(
        graph.job_named("publish").unwrap().dependency_type(),
        DependencyType::Scripted
    );
    assert_eq!(
        extra_info(&publish.job_properties),
        vec!["0:job-0=0", "0:job-0=1"]
    );
}

#[tokio::test]
async fn script_keys_are_identical_across_runs() {
    let spec = GraphSpec::default()
        .node(NodeSpec::new("sim").batch_size(4))
        .node(NodeSpec::new("mesh").batch_size(3).input_with_offset("sim", 2))
        .node(NodeSpec::new("render").batch_size(5).input("mesh").input("sim"));

    let mut runs = Vec::new();
    for _ in 0..3 {
        let plan = plan_frames(&spec, &["render"], "1-20");
        let gateway = RecordingGateway::new();
        dispatcher(gateway.clone())
            .dispatch(&plan.tree, &plan.roots)
            .await
            .unwrap();
        runs.push(
            gateway
                .submissions()
                .into_iter()
                .map(|s| s.job_properties)
                .collect::<Vec<_>>(),
        );
    }
    assert_eq!(runs[0], runs[1]);
    assert_eq!(runs[1], runs[2]);
}

#[tokio::test]
async fn frame_mask_limits_upstream_work() {
    let spec = GraphSpec::default()
        .node(NodeSpec::new("cache"))
        .node({
            let mut mask = NodeSpec::new("every_other").with_type(NodeType::FrameMask).input("cache");
            mask.mask = Some("1-9x2".to_string());
            mask
        })
        .node(NodeSpec::new("render").input("every_other"));
    let plan = plan_frames(&spec, &["render"], "1-10");
    let gateway = RecordingGateway::new();
    let (graph, report) = dispatcher(gateway.clone())
        .dispatch(&plan.tree, &plan.roots)
        .await
        .unwrap();

    assert_eq!(task_count(&graph, "cache"), 5);
    assert_eq!(task_count(&graph, "render"), 10);
    assert_eq!(dependency_count(&graph, "render"), 5);

    let render = graph.job_named("render").unwrap();
    assert_eq!(render.dependency_type(), DependencyType::FrameToFrame);
    assert_eq!(
        render.frame_offset().map(|o| (o.start, o.end)),
        Some((0, 0))
    );

    assert_eq!(gateway.names(), vec!["shot010.cache", "shot010.render"]);
    assert!(report.skipped.iter().any(|s| s.node == "every_other"));
}
