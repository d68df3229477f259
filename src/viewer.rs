//! Public viewer surface: configuration, controls and lifecycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use log::{debug, error, info, warn};
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backdrop::BackdropComposer;
use crate::camera::{CameraFramer, CameraState};
use crate::config::{BackdropKind, BackdropParams, ViewerConfig, ViewerTuning};
use crate::error::ViewerError;
use crate::geometry::{normalize, Bounds, NormalizeOptions};
use crate::material::MaterialApplicator;
use crate::render_loop::{FrameStats, LoopState, Presenter, RenderLoop};
use crate::resolver::{placeholder_asset, AssetResolver, AssetState, LoadOutcome, LoadProgress, LoadedAsset};
use crate::source::AssetSource;
use crate::stage::{AttachResult, Stage};
use crate::viewport::ViewportProvider;

/// Handle to an in-flight asset or backdrop load.
#[derive(Debug)]
pub struct LoadTask(JoinHandle<AttachResult>);

impl LoadTask {
    pub fn is_finished(&self) -> bool {
        self.0.is_finished()
    }

    fn abort(&self) {
        self.0.abort();
    }

    /// Waits for the load and reports what happened to its result. `None`
    /// when the task died before attaching anything.
    pub async fn join(self) -> Option<AttachResult> {
        match self.0.await {
            Ok(result) => Some(result),
            Err(err) => {
                if err.is_panic() {
                    error!("load task panicked: {err}");
                }
                None
            }
        }
    }
}

/// A single-model viewer session.
///
/// Controls are fire-and-forget: loads run on the tokio runtime that was
/// current during [`Viewer::initialize`] and their results are attached to
/// the shared [`Stage`] only while the session is alive.
pub struct Viewer<S> {
    config: ViewerConfig,
    tuning: Arc<ViewerTuning>,
    resolver: AssetResolver<S>,
    applicator: MaterialApplicator,
    stage: Stage,
    render_loop: RenderLoop,
    session: CancellationToken,
    runtime: Option<Handle>,
    loaded: Arc<AtomicBool>,
    asset_task: Option<LoadTask>,
    backdrop_task: Option<LoadTask>,
}

impl<S: AssetSource> Viewer<S> {
    pub fn new(config: ViewerConfig, source: S) -> Result<Self, ViewerError> {
        Self::with_tuning(config, source, ViewerTuning::default())
    }

    pub fn with_tuning(
        config: ViewerConfig,
        source: S,
        tuning: ViewerTuning,
    ) -> Result<Self, ViewerError> {
        config.validate()?;
        let tuning = Arc::new(tuning);
        let stage = Stage::new(CameraFramer::from_tuning(&tuning));
        let session = CancellationToken::new();
        let render_loop = RenderLoop::new(
            stage.clone(),
            session.clone(),
            tuning.rotation_step,
            tuning.frame_interval,
            config.auto_rotate,
        );
        Ok(Self {
            resolver: AssetResolver::new(Arc::new(source), Arc::clone(&tuning)),
            applicator: MaterialApplicator::new(&tuning.palette),
            config,
            tuning,
            stage,
            render_loop,
            session,
            runtime: None,
            loaded: Arc::new(AtomicBool::new(false)),
            asset_task: None,
            backdrop_task: None,
        })
    }

    /// Routes load progress events to `sender`.
    pub fn with_progress(mut self, sender: UnboundedSender<LoadProgress>) -> Self {
        self.resolver = self.resolver.clone().with_progress(sender);
        self
    }

    /// Binds the viewer to a rendering surface and starts loading the
    /// configured asset and backdrop. Frames may be rendered right away.
    ///
    /// Must be called from within a tokio runtime.
    pub fn initialize(&mut self, surface: &dyn ViewportProvider) -> Result<(), ViewerError> {
        if self.session.is_cancelled() {
            return Err(ViewerError::Disposed);
        }
        if self.render_loop.state() != LoopState::Idle {
            return Err(ViewerError::AlreadyInitialized);
        }
        let runtime = Handle::try_current()
            .map_err(|err| ViewerError::Unavailable(format!("no async runtime: {err}")))?;
        let (width, height) = surface.viewport_size();
        if width == 0 || height == 0 {
            return Err(ViewerError::Unavailable(format!(
                "rendering surface has zero area ({width}x{height})"
            )));
        }

        self.render_loop.begin();
        self.runtime = Some(runtime);
        self.stage.resize(width, height);
        info!(
            "viewer initialized at {width}x{height} with {}",
            self.resolver.source().describe()
        );

        let path = self.config.asset_path.clone();
        let hint = self.config.material_hint.clone();
        self.load_asset(path, hint);
        self.change_backdrop(self.config.backdrop_type, None);
        Ok(())
    }

    fn runtime(&self, action: &str) -> Option<Handle> {
        if self.session.is_cancelled() {
            debug!("ignoring {action}: viewer disposed");
            return None;
        }
        let runtime = self.runtime.clone();
        if runtime.is_none() {
            warn!("ignoring {action}: viewer not initialized");
        }
        runtime
    }

    /// Loads a new primary asset, replacing the current one once ready. A
    /// load still in flight is superseded.
    pub fn load_asset(&mut self, path: impl Into<String>, material_hint: Option<String>) {
        let path = path.into();
        let Some(runtime) = self.runtime("load") else {
            return;
        };
        self.config.asset_path = path.clone();
        self.config.material_hint = material_hint.clone();

        let ticket = self.stage.begin_asset_load();
        let resolver = self.resolver.clone();
        let applicator = self.applicator.clone();
        let tuning = Arc::clone(&self.tuning);
        let stage = self.stage.clone();
        let loaded = Arc::clone(&self.loaded);
        let options = NormalizeOptions {
            auto_scale: self.config.auto_scale,
            target_size: self.config.target_size,
            min_extent: self.tuning.min_extent,
        };

        let handle = runtime.spawn(async move {
            let asset = prepare_asset(
                &resolver,
                &applicator,
                &tuning,
                &options,
                &path,
                material_hint.as_deref(),
            )
            .await;
            let placeholder = asset.is_placeholder();
            let result = stage.attach_asset(ticket, asset);
            match result {
                AttachResult::Attached => {
                    loaded.store(true, Ordering::Release);
                    if placeholder {
                        info!("placeholder shown for {path}");
                    } else {
                        info!("{path} attached");
                    }
                }
                AttachResult::Superseded => debug!("discarding superseded load of {path}"),
                AttachResult::Disposed => debug!("discarding load of {path}: viewer disposed"),
            }
            result
        });
        self.asset_task = Some(LoadTask(handle));
    }

    /// Builds and attaches another backdrop. `params` default to the ones
    /// derived from the configuration.
    pub fn change_backdrop(&mut self, kind: BackdropKind, params: Option<BackdropParams>) {
        let Some(runtime) = self.runtime("backdrop change") else {
            return;
        };
        let mut params = params.unwrap_or_else(|| self.config.backdrop_params());
        if params.candidates.is_empty() {
            params.candidates = self.config.backdrop_candidates.clone();
        }
        if params.image_path.is_none() {
            params.image_path = self.config.custom_backdrop_path.clone();
        }
        self.config.backdrop_type = kind;

        let ticket = self.stage.begin_backdrop_load();
        let composer = BackdropComposer::new(
            self.resolver.clone(),
            Arc::clone(&self.tuning),
            self.config.target_size,
        );
        let stage = self.stage.clone();
        let handle = runtime.spawn(async move {
            let instance = composer.build(kind, &params).await;
            let result = stage.attach_backdrop(ticket, instance);
            match result {
                AttachResult::Attached => debug!("{kind} backdrop attached"),
                AttachResult::Superseded => debug!("discarding superseded {kind} backdrop"),
                AttachResult::Disposed => debug!("discarding {kind} backdrop: viewer disposed"),
            }
            result
        });
        self.backdrop_task = Some(LoadTask(handle));
    }

    /// Shows `path` on an image panel behind the model.
    pub fn set_custom_backdrop(&mut self, path: impl Into<String>) {
        let path = path.into();
        self.config.custom_backdrop_path = Some(path.clone());
        self.change_backdrop(BackdropKind::Custom, Some(BackdropParams::image(path)));
    }

    /// Flips auto-rotation and returns the new setting.
    pub fn toggle_rotation(&mut self) -> bool {
        let enabled = self.render_loop.toggle_rotation();
        self.config.auto_rotate = enabled;
        debug!("rotation {}", if enabled { "enabled" } else { "disabled" });
        enabled
    }

    /// Recolors every palette-colored sub-mesh.
    pub fn change_color(&self, color: u32) {
        let applicator = &self.applicator;
        match self.stage.with_asset_mut(|h| applicator.change_color(h, color)) {
            Some(changed) => debug!("recolored {changed} sub-mesh(es) to #{color:06X}"),
            None => debug!("no asset to recolor"),
        }
    }

    /// Moves every palette-colored sub-mesh to the next palette entry.
    pub fn cycle_colors(&self) {
        let applicator = &self.applicator;
        if let Some(changed) = self.stage.with_asset_mut(|h| applicator.cycle(h)) {
            debug!("cycled {changed} sub-mesh color(s)");
        }
    }

    pub fn reset_view(&self) {
        self.stage.reset_view();
    }

    pub fn resize(&self, width: u32, height: u32) {
        self.stage.resize(width, height);
    }

    /// Whether the asset (or its placeholder) is on stage.
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire) && !self.session.is_cancelled()
    }

    pub fn is_disposed(&self) -> bool {
        self.session.is_cancelled()
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn tuning(&self) -> &ViewerTuning {
        &self.tuning
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    pub fn render_loop(&self) -> &RenderLoop {
        &self.render_loop
    }

    pub fn camera(&self) -> CameraState {
        self.stage.camera()
    }

    pub fn asset_state(&self) -> AssetState {
        self.stage.asset_state().unwrap_or(AssetState::Pending)
    }

    pub fn asset_bounds(&self) -> Option<Bounds> {
        self.stage.asset_bounds()
    }

    pub fn backdrop_kind(&self) -> Option<BackdropKind> {
        self.stage.backdrop_kind()
    }

    pub fn rotation_enabled(&self) -> bool {
        self.render_loop.rotation_enabled()
    }

    /// Takes the handle of the latest asset load.
    pub fn take_asset_task(&mut self) -> Option<LoadTask> {
        self.asset_task.take()
    }

    pub fn take_backdrop_task(&mut self) -> Option<LoadTask> {
        self.backdrop_task.take()
    }

    /// Waits for the latest asset and backdrop loads to finish.
    pub async fn wait_for_loads(&mut self) -> (Option<AttachResult>, Option<AttachResult>) {
        let asset = match self.asset_task.take() {
            Some(task) => task.join().await,
            None => None,
        };
        let backdrop = match self.backdrop_task.take() {
            Some(task) => task.join().await,
            None => None,
        };
        (asset, backdrop)
    }

    /// Renders a single frame.
    pub fn frame<P: Presenter + ?Sized>(&self, presenter: &mut P) -> Result<bool> {
        self.render_loop.tick(presenter)
    }

    /// Renders on the frame interval until disposed or `max_frames` frames
    /// were shown.
    pub async fn run<P: Presenter + ?Sized>(
        &self,
        presenter: &mut P,
        max_frames: Option<u64>,
    ) -> Result<FrameStats> {
        self.render_loop.run(presenter, max_frames).await
    }

    /// Tears the session down: stops the loop, releases everything on stage
    /// and makes later load results no-ops. Returns `false` when already
    /// disposed.
    pub fn dispose(&mut self) -> bool {
        if self.session.is_cancelled() && self.stage.is_disposed() {
            return false;
        }
        self.session.cancel();
        self.abort_loads();
        self.render_loop.stop();
        self.stage.dispose();
        self.loaded.store(false, Ordering::Release);
        info!("viewer disposed");
        true
    }

    fn abort_loads(&self) {
        for task in [&self.asset_task, &self.backdrop_task].into_iter().flatten() {
            task.abort();
        }
    }
}

impl<S> Drop for Viewer<S> {
    fn drop(&mut self) {
        self.session.cancel();
        for task in [&self.asset_task, &self.backdrop_task].into_iter().flatten() {
            task.abort();
        }
        self.render_loop.stop();
        self.stage.dispose();
    }
}

/// Resolves, colors and normalizes the primary asset. Anything that goes
/// wrong ends in a placeholder, never an error.
async fn prepare_asset<S: AssetSource>(
    resolver: &AssetResolver<S>,
    applicator: &MaterialApplicator,
    tuning: &ViewerTuning,
    options: &NormalizeOptions,
    path: &str,
    material_hint: Option<&str>,
) -> LoadedAsset {
    let mut asset = match resolver.load_primary(path, material_hint).await {
        LoadOutcome::Success(asset) | LoadOutcome::Degraded(asset, _) => asset,
        LoadOutcome::Failed(reason) => {
            warn!("substituting placeholder: {reason}");
            placeholder_asset(path, tuning)
        }
    };

    let report = applicator.apply(&mut asset.hierarchy, asset.materials.as_ref());
    if !report.missing.is_empty() {
        warn!(
            "{path}: material(s) {} not in library, using palette colors",
            report.missing.join(", ")
        );
    }

    let normalize_options = placeholder_options(&asset, options);
    match normalize(&mut asset.hierarchy, &normalize_options) {
        Ok(normalization) => asset.bounds = normalization.bounds,
        Err(err) => {
            warn!("{path}: {err}; substituting placeholder");
            asset = placeholder_asset(path, tuning);
            let options = placeholder_options(&asset, options);
            if let Ok(normalization) = normalize(&mut asset.hierarchy, &options) {
                asset.bounds = normalization.bounds;
            }
        }
    }
    asset
}

/// Placeholders keep their authored size; they are only grounded and
/// centered.
fn placeholder_options(asset: &LoadedAsset, options: &NormalizeOptions) -> NormalizeOptions {
    NormalizeOptions {
        auto_scale: options.auto_scale && !asset.is_placeholder(),
        ..*options
    }
}
