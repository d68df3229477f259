use std::time::Duration;

use garment_viewer::bundle::{encode, BundleEndian};
use garment_viewer::{
    AssetState, AttachResult, BackdropFallback, BackdropKind, HeadlessPresenter, LoadProgress, LoopState,
    MemorySource, StaticViewport, Viewer, ViewerConfig, ViewerError, ViewerTuning,
};
use tokio::time::Instant;

const CUBE: &str = "\
v -0.15 -0.15 -0.15
v 0.15 -0.15 -0.15
v 0.15 0.15 -0.15
v -0.15 0.15 -0.15
v -0.15 -0.15 0.15
v 0.15 -0.15 0.15
v 0.15 0.15 0.15
v -0.15 0.15 0.15
f 1 2 3
f 1 3 4
f 5 6 7
f 5 7 8
f 1 2 6
f 1 6 5
f 4 3 7
f 4 7 8
f 1 4 8
f 1 8 5
f 2 3 7
f 2 7 6
";

const TWO_PARTS: &str = "\
v 0 0 0
v 1 0 0
v 1 1 0
o front
f 1 2 3
o back
f 3 2 1
";

const SCENE: &str = "<scene><object><name>Street</name><type>plane</type>\
<scale>40 1 40</scale></object></scene>";

fn scene_bundle() -> Vec<u8> {
    encode(BundleEndian::Little, 1, &[], SCENE)
}

fn viewer(config: ViewerConfig, memory: &MemorySource) -> Viewer<MemorySource> {
    let tuning = ViewerTuning {
        candidate_timeout: Duration::from_millis(1000),
        ..ViewerTuning::default()
    };
    Viewer::with_tuning(config, memory.clone(), tuning).unwrap()
}

fn cube_config() -> ViewerConfig {
    ViewerConfig {
        target_size: 5.0,
        ..ViewerConfig::new("models/cube.obj")
    }
}

#[tokio::test(start_paused = true)]
async fn small_mesh_is_scaled_up_and_grounded() {
    let memory = MemorySource::new();
    memory.insert("models/cube.obj", CUBE);
    let mut viewer = viewer(cube_config(), &memory);
    assert!(!viewer.is_loaded());

    viewer.initialize(&StaticViewport::new(1280, 720)).unwrap();
    let (asset, backdrop) = viewer.wait_for_loads().await;
    assert_eq!(asset, Some(AttachResult::Attached));
    assert_eq!(backdrop, Some(AttachResult::Attached));

    assert!(viewer.is_loaded());
    assert_eq!(viewer.asset_state(), AssetState::Loaded);
    let bounds = viewer.asset_bounds().unwrap();
    assert!((bounds.size().max_element() - 5.0).abs() < 1e-3);
    assert!(bounds.min.y.abs() < 1e-4);
    assert!(bounds.center().x.abs() < 1e-4);
    assert_eq!(viewer.backdrop_kind(), Some(BackdropKind::Grid));

    let camera = viewer.camera();
    assert!(camera.position.z > bounds.max.z);
    assert!((camera.aspect - 1280.0 / 720.0).abs() < 1e-5);
}

#[tokio::test(start_paused = true)]
async fn missing_mesh_shows_placeholder() {
    let memory = MemorySource::new();
    let mut viewer = viewer(ViewerConfig::new("models/missing.obj"), &memory);
    viewer.initialize(&StaticViewport::new(800, 600)).unwrap();
    viewer.wait_for_loads().await;

    assert!(viewer.is_loaded());
    assert_eq!(viewer.asset_state(), AssetState::Failed);
    let size = viewer.asset_bounds().unwrap().size();
    assert!((size.y - 8.0).abs() < 1e-4);
    assert_eq!(viewer.stage().asset_colors(), vec![0xFF0000]);
}

#[tokio::test(start_paused = true)]
async fn missing_material_degrades_to_palette() {
    let memory = MemorySource::new();
    memory.insert("models/parts.obj", TWO_PARTS);
    let config = ViewerConfig {
        material_hint: Some("models/parts.mtl".into()),
        ..ViewerConfig::new("models/parts.obj")
    };
    let mut viewer = viewer(config, &memory);
    viewer.initialize(&StaticViewport::new(800, 600)).unwrap();
    viewer.wait_for_loads().await;

    assert_eq!(viewer.asset_state(), AssetState::Loaded);
    assert_eq!(viewer.stage().asset_colors(), vec![0xFF0000, 0x00FF00]);
    let requests = memory.requests();
    let material = requests.iter().position(|p| p == "models/parts.mtl").unwrap();
    let mesh = requests.iter().position(|p| p == "models/parts.obj").unwrap();
    assert!(material < mesh);
}

#[tokio::test(start_paused = true)]
async fn first_listed_scene_wins_over_faster_one() {
    let memory = MemorySource::new();
    memory
        .insert("models/cube.obj", CUBE)
        .insert_delayed("scenes/a.scene", scene_bundle(), Duration::from_millis(500))
        .insert_delayed("scenes/b.scene", scene_bundle(), Duration::from_millis(10))
        .insert("scenes/c.scene", scene_bundle());
    let config = ViewerConfig {
        backdrop_type: BackdropKind::LoadedScene,
        backdrop_candidates: vec![
            "scenes/a.scene".into(),
            "scenes/b.scene".into(),
            "scenes/c.scene".into(),
        ],
        ..cube_config()
    };
    let mut viewer = viewer(config, &memory);
    viewer.initialize(&StaticViewport::new(800, 600)).unwrap();
    viewer.wait_for_loads().await;

    assert_eq!(viewer.backdrop_kind(), Some(BackdropKind::LoadedScene));
    assert!(viewer.stage().backdrop_fallback().is_none());
    let requests = memory.requests();
    assert!(requests.iter().any(|p| p == "scenes/a.scene"));
    assert!(!requests.iter().any(|p| p == "scenes/b.scene"));
}

#[tokio::test(start_paused = true)]
async fn unreachable_scenes_fall_back_to_grid_after_each_timeout() {
    let memory = MemorySource::new();
    memory.insert("models/cube.obj", CUBE);
    let candidates: Vec<String> = ["a", "b", "c"]
        .iter()
        .map(|name| format!("https://unreachable.example/{name}.scene"))
        .collect();
    for candidate in &candidates {
        memory.insert_failure(candidate.clone(), Duration::from_secs(60));
    }
    let config = ViewerConfig {
        backdrop_type: BackdropKind::LoadedScene,
        backdrop_candidates: candidates,
        ..cube_config()
    };
    let mut viewer = viewer(config, &memory);

    let start = Instant::now();
    viewer.initialize(&StaticViewport::new(800, 600)).unwrap();
    viewer.wait_for_loads().await;
    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_millis(3000), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(3100), "{elapsed:?}");
    assert_eq!(viewer.backdrop_kind(), Some(BackdropKind::Grid));
    assert_eq!(
        viewer.stage().backdrop_fallback(),
        Some(BackdropFallback::BackdropUnavailable { attempts: 3 })
    );
}

#[tokio::test(start_paused = true)]
async fn load_finishing_after_dispose_is_discarded() {
    let memory = MemorySource::new();
    memory.insert_delayed("models/cube.obj", CUBE, Duration::from_millis(500));
    let mut viewer = viewer(cube_config(), &memory);
    viewer.initialize(&StaticViewport::new(800, 600)).unwrap();
    let task = viewer.take_asset_task().unwrap();

    assert!(viewer.dispose());
    assert_eq!(task.join().await, Some(AttachResult::Disposed));

    assert!(!viewer.is_loaded());
    assert!(viewer.stage().asset_state().is_none());
    assert_eq!(viewer.stage().live_resources(), 0);
    assert!(viewer.stage().snapshot().draws.is_empty());
}

#[tokio::test(start_paused = true)]
async fn dispose_is_idempotent_and_final() {
    let memory = MemorySource::new();
    memory.insert("models/cube.obj", CUBE);
    let mut viewer = viewer(cube_config(), &memory);
    viewer.initialize(&StaticViewport::new(800, 600)).unwrap();
    viewer.wait_for_loads().await;
    assert!(viewer.stage().live_resources() > 0);

    assert!(viewer.dispose());
    assert!(!viewer.dispose());
    assert_eq!(viewer.render_loop().state(), LoopState::Stopped);
    assert_eq!(viewer.stage().live_resources(), 0);

    let mut presenter = HeadlessPresenter::new();
    assert!(!viewer.frame(&mut presenter).unwrap());
    assert!(matches!(
        viewer.initialize(&StaticViewport::new(800, 600)),
        Err(ViewerError::Disposed)
    ));
    viewer.load_asset("models/cube.obj", None);
    assert!(viewer.take_asset_task().is_none());
}

#[tokio::test(start_paused = true)]
async fn reload_supersedes_slower_load() {
    let memory = MemorySource::new();
    memory
        .insert_delayed("models/slow.obj", CUBE, Duration::from_millis(800))
        .insert("models/fast.obj", TWO_PARTS);
    let mut viewer = viewer(ViewerConfig::new("models/slow.obj"), &memory);
    viewer.initialize(&StaticViewport::new(800, 600)).unwrap();
    let slow = viewer.take_asset_task().unwrap();

    viewer.load_asset("models/fast.obj", None);
    viewer.wait_for_loads().await;
    assert_eq!(slow.join().await, Some(AttachResult::Superseded));
    assert_eq!(viewer.stage().asset_path().as_deref(), Some("models/fast.obj"));
    assert_eq!(viewer.config().asset_path, "models/fast.obj");
}

#[tokio::test(start_paused = true)]
async fn initialize_rejects_bad_surfaces_and_double_init() {
    let memory = MemorySource::new();
    memory.insert("models/cube.obj", CUBE);
    let mut viewer = viewer(cube_config(), &memory);
    assert!(matches!(
        viewer.initialize(&StaticViewport::new(0, 600)),
        Err(ViewerError::Unavailable(_))
    ));
    viewer.initialize(&StaticViewport::new(800, 600)).unwrap();
    assert!(matches!(
        viewer.initialize(&StaticViewport::new(800, 600)),
        Err(ViewerError::AlreadyInitialized)
    ));
}

#[test]
fn invalid_config_is_rejected_up_front() {
    let config = ViewerConfig {
        target_size: 0.0,
        ..ViewerConfig::new("a.obj")
    };
    assert!(matches!(
        Viewer::new(config, MemorySource::new()),
        Err(ViewerError::InvalidConfig(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn recoloring_leaves_framing_alone() {
    let memory = MemorySource::new();
    memory.insert("models/parts.obj", TWO_PARTS);
    let mut viewer = viewer(ViewerConfig::new("models/parts.obj"), &memory);
    viewer.initialize(&StaticViewport::new(800, 600)).unwrap();
    viewer.wait_for_loads().await;
    let camera = viewer.camera();
    let bounds = viewer.asset_bounds();

    viewer.change_color(0x336699);
    assert_eq!(viewer.stage().asset_colors(), vec![0x336699, 0x336699]);
    viewer.cycle_colors();
    assert_eq!(viewer.stage().asset_colors(), vec![0xFF0000, 0xFF0000]);
    viewer.cycle_colors();
    assert_eq!(viewer.stage().asset_colors(), vec![0x00FF00, 0x00FF00]);
    assert_eq!(viewer.camera(), camera);
    assert_eq!(viewer.asset_bounds(), bounds);
}

#[tokio::test(start_paused = true)]
async fn switching_backdrops_does_not_leak() {
    let memory = MemorySource::new();
    memory.insert("models/cube.obj", CUBE);
    let mut viewer = viewer(cube_config(), &memory);
    viewer.initialize(&StaticViewport::new(800, 600)).unwrap();
    viewer.wait_for_loads().await;
    let baseline = viewer.stage().live_resources();

    for kind in [
        BackdropKind::Gradient,
        BackdropKind::Room,
        BackdropKind::Custom,
        BackdropKind::Gradient,
        BackdropKind::Grid,
    ] {
        viewer.change_backdrop(kind, None);
        viewer.wait_for_loads().await;
    }
    assert_eq!(viewer.backdrop_kind(), Some(BackdropKind::Grid));
    assert_eq!(viewer.stage().live_resources(), baseline);

    let mut presenter = HeadlessPresenter::new();
    viewer.frame(&mut presenter).unwrap();
    viewer.dispose();
    viewer.render_loop().finish(&mut presenter);
    assert_eq!(presenter.resident(), 0);
    assert!(presenter.is_shut_down());
}

#[tokio::test(start_paused = true)]
async fn rotation_runs_per_frame_and_reset_restores_view() {
    let memory = MemorySource::new();
    memory.insert("models/cube.obj", CUBE);
    let mut viewer = viewer(cube_config(), &memory);
    viewer.initialize(&StaticViewport::new(800, 600)).unwrap();
    viewer.wait_for_loads().await;
    let framed = viewer.camera();

    let mut presenter = HeadlessPresenter::new();
    for _ in 0..10 {
        viewer.frame(&mut presenter).unwrap();
    }
    assert!((viewer.stage().model_spin() - 0.05).abs() < 1e-5);

    assert!(!viewer.toggle_rotation());
    viewer.frame(&mut presenter).unwrap();
    assert!((viewer.stage().model_spin() - 0.05).abs() < 1e-5);

    viewer.resize(400, 400);
    assert_eq!(viewer.camera().aspect, 1.0);
    viewer.reset_view();
    assert_eq!(viewer.stage().model_spin(), 0.0);
    assert_eq!(viewer.camera().position, framed.position);
    assert_eq!(viewer.render_loop().state(), LoopState::Running);
}

#[tokio::test(start_paused = true)]
async fn headless_run_renders_requested_frames() {
    let memory = MemorySource::new();
    memory.insert("models/cube.obj", CUBE);
    let mut viewer = viewer(cube_config(), &memory);
    viewer.initialize(&StaticViewport::new(800, 600)).unwrap();
    viewer.wait_for_loads().await;

    let mut presenter = HeadlessPresenter::new();
    let stats = viewer.run(&mut presenter, Some(12)).await.unwrap();
    assert_eq!(stats.frames, 12);
    assert_eq!(presenter.frames(), 12);
    assert_eq!(presenter.last_draws(), 3);
    assert!(presenter.is_shut_down());
}

#[tokio::test(start_paused = true)]
async fn dispose_aborts_loads_in_flight() {
    let memory = MemorySource::new();
    memory.insert_delayed("models/cube.obj", CUBE, Duration::from_secs(20));
    let mut viewer = viewer(cube_config(), &memory);
    viewer.initialize(&StaticViewport::new(800, 600)).unwrap();

    let start = Instant::now();
    assert!(viewer.dispose());
    let task = viewer.take_asset_task().unwrap();
    assert_eq!(task.join().await, None);
    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(viewer.stage().live_resources(), 0);
}

#[tokio::test(start_paused = true)]
async fn progress_events_reach_the_host() {
    let memory = MemorySource::new();
    memory.insert("models/cube.obj", CUBE);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let mut viewer = viewer(cube_config(), &memory).with_progress(tx);
    viewer.initialize(&StaticViewport::new(800, 600)).unwrap();
    viewer.wait_for_loads().await;
    assert_eq!(viewer.asset_state(), AssetState::Loaded);

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert!(events.contains(&LoadProgress::Started {
        path: "models/cube.obj".into()
    }));
    let finished: Vec<_> = events
        .iter()
        .filter(|event| matches!(event, LoadProgress::Finished { .. }))
        .collect();
    assert_eq!(
        finished,
        vec![&LoadProgress::Finished {
            path: "models/cube.obj".into(),
            ok: true
        }]
    );
}
