use std::any::Any;
use std::env;
use std::fmt;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use pollster::block_on;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget};
use winit::keyboard::{Key, NamedKey as WinitNamedKey};
use winit::window::WindowBuilder;

use garment_viewer::{
    apply_command, print_summary, AssetOrigin, BackdropKind, HeadlessPresenter, KeyBindings,
    KeyCode, NamedKey, Renderer, StaticViewport, Viewer, ViewerConfig, ViewerTuning,
    ViewportProvider, WindowViewport,
};

const USAGE: &str = "Usage: garment-viewer [<asset.obj>] [--material <file.mtl>] \
[--asset-root <dir|url>] [--backdrop <grid|gradient|room|scene|custom>] \
[--backdrop-image <path>] [--candidate <path>]... [--target-size <n>] [--no-rotate] \
[--no-scale] [--config <viewer.json>] [--frames <n>] [--summary-only]";

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse(env::args().skip(1))?;
    let config = options.viewer_config()?;
    let tuning = ViewerTuning::default();
    let origin = AssetOrigin::from_root(&options.asset_root, tuning.primary_timeout)
        .context("invalid asset root")?;

    // Loads run on one worker thread; frames are produced on this one.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("garment-viewer-loader")
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let _guard = runtime.enter();

    let (progress_tx, mut progress_rx) = tokio::sync::mpsc::unbounded_channel();
    runtime.spawn(async move {
        while let Some(event) = progress_rx.recv().await {
            debug!("{event:?}");
        }
    });
    let viewer = Viewer::with_tuning(config, origin, tuning)?.with_progress(progress_tx);

    if options.summary_only {
        return runtime.block_on(run_headless(viewer, options.frames));
    }
    match open_window() {
        Ok((event_loop, window)) => run_interactive(viewer, event_loop, window),
        Err(err) => {
            eprintln!(
                "{err}. Falling back to --summary-only mode (set DISPLAY or install X11 libs to enable rendering)."
            );
            runtime.block_on(run_headless(viewer, options.frames))
        }
    }
}

async fn run_headless(mut viewer: Viewer<AssetOrigin>, frames: u64) -> Result<()> {
    viewer.initialize(&StaticViewport::new(1280, 720))?;
    viewer.wait_for_loads().await;
    let mut presenter = HeadlessPresenter::new();
    let stats = viewer.run(&mut presenter, Some(frames)).await?;
    info!("rendered {} headless frame(s)", stats.frames);
    print_summary(&viewer)?;
    viewer.dispose();
    Ok(())
}

fn open_window() -> Result<(EventLoop<()>, Arc<winit::window::Window>), WindowInitError> {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
    panic::set_hook(default_hook);
    let event_loop = event_loop
        .map_err(|panic| WindowInitError::from_panic("event loop", panic))?
        .map_err(|err| WindowInitError::from_error("event loop", err))?;
    let window = WindowBuilder::new()
        .with_title("Garment Viewer")
        .with_inner_size(LogicalSize::new(1280.0, 720.0))
        .build(&event_loop)
        .map_err(|err| WindowInitError::from_error("window", err))?;
    Ok((event_loop, Arc::new(window)))
}

fn run_interactive(
    mut viewer: Viewer<AssetOrigin>,
    event_loop: EventLoop<()>,
    window: Arc<winit::window::Window>,
) -> Result<()> {
    let renderer = block_on(Renderer::new(Arc::clone(&window)))
        .map_err(|err| anyhow!("viewer unavailable: {err:#}"))?;
    let size = window.inner_size();
    let viewport = Arc::new(WindowViewport::new(size.width, size.height));
    viewer.initialize(viewport.as_ref())?;

    let mut app = AppState {
        renderer,
        viewer,
        viewport,
        bindings: KeyBindings::default(),
        last_error: None,
    };

    event_loop.set_control_flow(ControlFlow::Poll);
    event_loop
        .run(|event, target| {
            if let Err(err) = app.process_event(event, target) {
                app.last_error = Some(err);
                target.exit();
            }
        })
        .context("event loop failed")?;

    app.shutdown()?;
    match app.last_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

struct AppState {
    renderer: Renderer,
    viewer: Viewer<AssetOrigin>,
    viewport: Arc<WindowViewport>,
    bindings: KeyBindings,
    last_error: Option<anyhow::Error>,
}

impl AppState {
    fn process_event(&mut self, event: Event<()>, target: &EventLoopWindowTarget<()>) -> Result<()> {
        match event {
            Event::WindowEvent { event, window_id } if window_id == self.renderer.window_id() => {
                match event {
                    WindowEvent::CloseRequested => target.exit(),
                    WindowEvent::Resized(size) => {
                        self.renderer.resize(size);
                        self.viewport.update(size.width, size.height);
                        let (width, height) = self.viewport.viewport_size();
                        self.viewer.resize(width, height);
                    }
                    WindowEvent::KeyboardInput { event, .. } => {
                        if !self.handle_keyboard(&event) {
                            target.exit();
                        }
                    }
                    WindowEvent::RedrawRequested => {
                        if !self.viewer.frame(&mut self.renderer)? {
                            target.exit();
                        }
                    }
                    _ => {}
                }
            }
            Event::AboutToWait => {
                self.renderer.window().request_redraw();
            }
            _ => {}
        }
        Ok(())
    }

    /// Returns `false` when the key asks to quit.
    fn handle_keyboard(&mut self, event: &KeyEvent) -> bool {
        if event.state != ElementState::Pressed || event.repeat {
            return true;
        }
        let Some(command) = map_key(&event.logical_key).and_then(|key| self.bindings.command_for(key))
        else {
            return true;
        };
        debug!("key command {command:?}");
        apply_command(&mut self.viewer, command)
    }

    fn shutdown(&mut self) -> Result<()> {
        self.viewer.render_loop().finish(&mut self.renderer);
        print_summary(&self.viewer)?;
        self.viewer.dispose();
        Ok(())
    }
}

fn map_key(key: &Key) -> Option<KeyCode> {
    match key {
        Key::Named(WinitNamedKey::Escape) => Some(KeyCode::Named(NamedKey::Escape)),
        Key::Named(WinitNamedKey::Space) => Some(KeyCode::Named(NamedKey::Space)),
        Key::Named(WinitNamedKey::ArrowRight) => Some(KeyCode::Named(NamedKey::Right)),
        Key::Character(text) => KeyCode::from_name(text.as_str()),
        _ => None,
    }
}

#[derive(Debug)]
struct WindowInitError {
    message: String,
}

impl WindowInitError {
    fn from_panic(stage: &str, panic: Box<dyn Any + Send>) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {}", panic_message(panic)),
        }
    }

    fn from_error(stage: &str, err: impl fmt::Display) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {err}"),
        }
    }
}

impl fmt::Display for WindowInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WindowInitError {}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(msg) => *msg,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(msg) => (*msg).to_string(),
            Err(_) => "unknown panic".into(),
        },
    }
}

#[derive(Debug, Default)]
struct CliOptions {
    asset: Option<String>,
    material: Option<String>,
    asset_root: String,
    backdrop: Option<BackdropKind>,
    backdrop_image: Option<String>,
    candidates: Vec<String>,
    target_size: Option<f32>,
    no_rotate: bool,
    no_scale: bool,
    config: Option<String>,
    frames: u64,
    summary_only: bool,
}

impl CliOptions {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut options = Self {
            asset_root: ".".into(),
            frames: 60,
            ..Self::default()
        };
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            let mut value = |flag: &str| {
                args.next()
                    .ok_or_else(|| anyhow!("{flag} expects a value\n{USAGE}"))
            };
            match arg.as_str() {
                "--material" => options.material = Some(value("--material")?),
                "--asset-root" => options.asset_root = value("--asset-root")?,
                "--backdrop" => {
                    let name = value("--backdrop")?;
                    let kind = BackdropKind::from_name(&name)
                        .ok_or_else(|| anyhow!("unknown backdrop {name}\n{USAGE}"))?;
                    options.backdrop = Some(kind);
                }
                "--backdrop-image" => options.backdrop_image = Some(value("--backdrop-image")?),
                "--candidate" => options.candidates.push(value("--candidate")?),
                "--target-size" => {
                    let raw = value("--target-size")?;
                    let size = raw
                        .parse::<f32>()
                        .with_context(|| format!("invalid --target-size {raw}"))?;
                    options.target_size = Some(size);
                }
                "--frames" => {
                    let raw = value("--frames")?;
                    options.frames = raw
                        .parse()
                        .with_context(|| format!("invalid --frames {raw}"))?;
                }
                "--config" => options.config = Some(value("--config")?),
                "--no-rotate" => options.no_rotate = true,
                "--no-scale" => options.no_scale = true,
                "--summary-only" => options.summary_only = true,
                "-h" | "--help" => return Err(anyhow!("{USAGE}")),
                other if other.starts_with("--") => {
                    return Err(anyhow!("Unknown argument: {other}\n{USAGE}"));
                }
                other => {
                    if options.asset.replace(other.to_string()).is_some() {
                        return Err(anyhow!("only one asset path may be given\n{USAGE}"));
                    }
                }
            }
        }
        Ok(options)
    }

    /// Configuration file (if any) overridden by command line flags.
    fn viewer_config(&self) -> Result<ViewerConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let json = fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {path}"))?;
                ViewerConfig::from_json(&json).with_context(|| format!("in {path}"))?
            }
            None => ViewerConfig::default(),
        };
        if let Some(asset) = &self.asset {
            config.asset_path = asset.clone();
        }
        if self.material.is_some() {
            config.material_hint = self.material.clone();
        }
        if let Some(kind) = self.backdrop {
            config.backdrop_type = kind;
        }
        if let Some(image) = &self.backdrop_image {
            config.custom_backdrop_path = Some(image.clone());
            if self.backdrop.is_none() {
                config.backdrop_type = BackdropKind::Custom;
            }
        }
        if !self.candidates.is_empty() {
            config.backdrop_candidates = self.candidates.clone();
        }
        if let Some(size) = self.target_size {
            config.target_size = size;
        }
        if self.no_rotate {
            config.auto_rotate = false;
        }
        if self.no_scale {
            config.auto_scale = false;
        }
        if config.asset_path.trim().is_empty() {
            return Err(anyhow!("no asset path given\n{USAGE}"));
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn flags_override_defaults() {
        let options = CliOptions::parse(args(&[
            "models/pant.obj",
            "--material",
            "models/pant.mtl",
            "--backdrop",
            "room",
            "--target-size",
            "5",
            "--no-rotate",
        ]))
        .unwrap();
        let config = options.viewer_config().unwrap();
        assert_eq!(config.asset_path, "models/pant.obj");
        assert_eq!(config.material_hint.as_deref(), Some("models/pant.mtl"));
        assert_eq!(config.backdrop_type, BackdropKind::Room);
        assert_eq!(config.target_size, 5.0);
        assert!(!config.auto_rotate);
        assert!(config.auto_scale);
    }

    #[test]
    fn backdrop_image_implies_custom() {
        let options =
            CliOptions::parse(args(&["a.obj", "--backdrop-image", "bg.png"])).unwrap();
        let config = options.viewer_config().unwrap();
        assert_eq!(config.backdrop_type, BackdropKind::Custom);
        assert_eq!(config.custom_backdrop_path.as_deref(), Some("bg.png"));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(CliOptions::parse(args(&["a.obj", "--bogus"])).is_err());
        assert!(CliOptions::parse(args(&["a.obj", "--frames"])).is_err());
        assert!(CliOptions::parse(args(&["a.obj", "b.obj"])).is_err());
        let options = CliOptions::parse(args(&["a.obj", "--target-size", "-1"])).unwrap();
        assert!(options.viewer_config().is_err());
        assert!(CliOptions::parse(args(&[])).unwrap().viewer_config().is_err());
    }
}
