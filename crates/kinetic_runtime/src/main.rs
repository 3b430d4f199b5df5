// SPDX-License-Identifier: MIT OR Apache-2.0
//! `kinetic_demo` - headless Kinetic runtime demo.
//!
//! Builds two scenes through the command queue from a script task:
//! - a collapsing header whose translation follows scroll events through a
//!   diff-clamp and an interpolation
//! - a fade-in driven by a spring
//!
//! then ticks the engine at a simulated 60 Hz and logs every view update.
//! An engine config in RON may be passed as the first argument.

use kinetic_drivers::AnimationEnd;
use kinetic_graph::{AnimationId, NodeTag, ViewId};
use kinetic_runtime::{
    AnimatedModule, EngineConfig, EventMapping, FrameBatch, ManualDisplayLink, NodesManager,
};
use serde_json::json;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

type DemoResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

const FRAME_MS: f64 = 1000.0 / 60.0;
const FRAMES: u32 = 240;
const HEADER_HEIGHT: f64 = 56.0;

const SCROLL: NodeTag = NodeTag(1);
const HEADER_OFFSET: NodeTag = NodeTag(3);
const OPACITY: NodeTag = NodeTag(7);
const HEADER_VIEW: ViewId = ViewId(10);
const CARD_VIEW: ViewId = ViewId(11);
const SCROLL_VIEW: ViewId = ViewId(20);

fn main() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new("kinetic_runtime=debug,kinetic_graph=info")
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Kinetic demo v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run() {
        tracing::error!("Demo failed: {e}");
        std::process::exit(1);
    }
}

fn run() -> DemoResult {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()?;

    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::from_ron(&runtime.block_on(tokio::fs::read_to_string(&path))?)?,
        None => EngineConfig::default(),
    };

    let link = ManualDisplayLink::new();
    let view = |batch: FrameBatch| {
        for (view, props) in batch.updates {
            tracing::info!(frame = batch.frame, %view, ?props, "view update");
        }
    };
    let mut manager = NodesManager::new(config, view, link.clone());

    // The script side runs on another thread and only talks to the queue
    let module = manager.module();
    runtime.block_on(runtime.spawn(async move { build_scenes(&module) }))??;

    let events = manager.module();
    let mut now = 0.0;
    for frame in 0..FRAMES {
        if frame < 120 && frame % 4 == 0 {
            let y = f64::from(frame) * 1.5;
            events.handle_event(SCROLL_VIEW, "onScroll", json!({"contentOffset": {"y": y}}))?;
        }

        now += FRAME_MS;
        if link.is_running() {
            let report = manager.on_frame(now);
            if report.command_failures > 0 {
                tracing::error!(frame = report.frame, failed = report.command_failures, "scene commands failed");
            }
        }
    }

    tracing::info!(
        scroll = manager.value(SCROLL)?,
        header_offset = manager.value(HEADER_OFFSET)?,
        opacity = manager.value(OPACITY)?,
        idle = !link.is_running(),
        "demo finished"
    );
    Ok(())
}

fn build_scenes(module: &AnimatedModule) -> DemoResult {
    // Collapsing header: scroll -> diff-clamp -> interpolation -> transform
    module.create_node(SCROLL, json!({"type": "value", "value": 0}))?;
    module.create_node(NodeTag(2), json!({"type": "diffclamp", "min": 0, "max": HEADER_HEIGHT}))?;
    module.create_node(
        HEADER_OFFSET,
        json!({
            "type": "interpolation",
            "inputRange": [0, HEADER_HEIGHT],
            "outputRange": [0, -HEADER_HEIGHT],
            "extrapolate": "clamp",
        }),
    )?;
    module.create_node(
        NodeTag(4),
        json!({"type": "transform", "transforms": [
            {"type": "animated", "property": "translateY", "nodeTag": HEADER_OFFSET},
        ]}),
    )?;
    module.create_node(NodeTag(5), json!({"type": "style", "style": {"transform": 4}}))?;
    module.create_node(NodeTag(6), json!({"type": "props", "props": {"style": 5}}))?;
    module.connect(NodeTag(2), SCROLL)?;
    module.connect(HEADER_OFFSET, NodeTag(2))?;
    module.connect(NodeTag(4), HEADER_OFFSET)?;
    module.connect(NodeTag(5), NodeTag(4))?;
    module.connect(NodeTag(6), NodeTag(5))?;
    module.connect_to_view(NodeTag(6), HEADER_VIEW)?;
    module.add_event_binding(
        SCROLL_VIEW,
        "onScroll",
        vec![EventMapping::new("contentOffset.y", SCROLL)?],
    )?;

    // Card fade-in
    module.create_node(OPACITY, json!({"type": "value", "value": 0}))?;
    module.create_node(NodeTag(8), json!({"type": "props", "props": {"opacity": OPACITY}}))?;
    module.connect(NodeTag(8), OPACITY)?;
    module.connect_to_view(NodeTag(8), CARD_VIEW)?;
    module.start_animation(
        AnimationId(1),
        OPACITY,
        json!({"type": "spring", "toValue": 1, "stiffness": 120, "damping": 14, "mass": 1}),
        Some(Box::new(|end: AnimationEnd| {
            tracing::info!(animation = %end.animation_id, finished = end.finished, value = ?end.value, "fade-in ended");
        })),
    )?;
    Ok(())
}
