use std::collections::HashSet;
use std::io::{self, Write};

use anyhow::Result;
use glam::Vec3;

use crate::input::{next_backdrop, ViewerCommand};
use crate::render_loop::Presenter;
use crate::resources::ResourceId;
use crate::source::AssetSource;
use crate::stage::FrameSnapshot;
use crate::viewer::Viewer;

/// Presenter that keeps track of what a GPU backend would hold, without
/// drawing anything.
#[derive(Debug, Default)]
pub struct HeadlessPresenter {
    frames: u64,
    last_draws: usize,
    resident: HashSet<ResourceId>,
    released: usize,
    shut_down: bool,
}

impl HeadlessPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn last_draws(&self) -> usize {
        self.last_draws
    }

    /// Resources uploaded and not yet released.
    pub fn resident(&self) -> usize {
        self.resident.len()
    }

    pub fn released(&self) -> usize {
        self.released
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }
}

impl Presenter for HeadlessPresenter {
    fn present(&mut self, frame: &FrameSnapshot) -> Result<()> {
        self.frames += 1;
        self.last_draws = frame.draws.len();
        for draw in &frame.draws {
            self.resident.extend(draw.mesh_id);
            self.resident
                .extend(draw.texture.as_ref().and_then(|slot| slot.resource));
        }
        Ok(())
    }

    fn release(&mut self, resources: &[ResourceId]) {
        for id in resources {
            self.resident.remove(id);
        }
        self.released += resources.len();
    }

    fn shutdown(&mut self) {
        self.resident.clear();
        self.shut_down = true;
    }
}

/// Applies a keyboard command. Returns `false` when the viewer should close.
pub fn apply_command<S: AssetSource>(viewer: &mut Viewer<S>, command: ViewerCommand) -> bool {
    match command {
        ViewerCommand::ToggleRotation => {
            viewer.toggle_rotation();
        }
        ViewerCommand::CycleColors => viewer.cycle_colors(),
        ViewerCommand::ResetView => viewer.reset_view(),
        ViewerCommand::Backdrop(kind) => viewer.change_backdrop(kind, None),
        ViewerCommand::NextBackdrop => {
            let next = next_backdrop(viewer.backdrop_kind());
            viewer.change_backdrop(next, None);
        }
        ViewerCommand::Quit => return false,
    }
    true
}

fn fmt_vec(v: Vec3) -> String {
    format!("({:.2}, {:.2}, {:.2})", v.x, v.y, v.z)
}

/// Human readable description of what is on stage.
pub fn summary_lines<S: AssetSource>(viewer: &Viewer<S>) -> Vec<String> {
    let stage = viewer.stage();
    let mut lines = Vec::new();
    let path = stage.asset_path().unwrap_or_else(|| "<none>".into());
    lines.push(format!("Asset: {path} ({:?})", viewer.asset_state()));
    if let Some(bounds) = viewer.asset_bounds() {
        lines.push(format!(
            "Bounds: min={} max={} size={}",
            fmt_vec(bounds.min),
            fmt_vec(bounds.max),
            fmt_vec(bounds.size())
        ));
    }
    let colors = stage.asset_colors();
    if !colors.is_empty() {
        let colors: Vec<String> = colors.iter().map(|c| format!("#{c:06X}")).collect();
        lines.push(format!("Colors: {}", colors.join(", ")));
    }
    let camera = viewer.camera();
    lines.push(format!(
        "Camera: position={} look_at={} fov={:.1}",
        fmt_vec(camera.position),
        fmt_vec(camera.look_at),
        camera.field_of_view
    ));
    match (stage.backdrop_kind(), stage.backdrop_fallback()) {
        (Some(kind), Some(reason)) => lines.push(format!("Backdrop: {kind} (fallback: {reason})")),
        (Some(kind), None) => lines.push(format!("Backdrop: {kind}")),
        (None, _) => lines.push("Backdrop: <none>".into()),
    }
    let stats = viewer.render_loop().stats();
    lines.push(format!(
        "Frames: {} rotation={} spin={:.3}",
        stats.frames,
        if viewer.rotation_enabled() { "on" } else { "off" },
        stage.model_spin()
    ));
    lines
}

pub fn print_summary<S: AssetSource>(viewer: &Viewer<S>) -> io::Result<()> {
    let mut out = io::stdout().lock();
    for line in summary_lines(viewer) {
        writeln!(out, "{line}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraFramer;
    use crate::config::ViewerTuning;
    use crate::render_loop::RenderLoop;
    use crate::resolver::placeholder_asset;
    use crate::stage::Stage;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    #[test]
    fn headless_presenter_tracks_residency() {
        let stage = Stage::new(CameraFramer::default());
        let render_loop = RenderLoop::new(
            stage.clone(),
            CancellationToken::new(),
            0.005,
            Duration::from_millis(16),
            true,
        );
        let ticket = stage.begin_asset_load();
        stage.attach_asset(ticket, placeholder_asset("a.obj", &ViewerTuning::default()));

        let mut presenter = HeadlessPresenter::new();
        render_loop.tick(&mut presenter).unwrap();
        assert_eq!(presenter.resident(), 1);
        assert_eq!(presenter.last_draws(), 1);

        let ticket = stage.begin_asset_load();
        stage.attach_asset(ticket, placeholder_asset("b.obj", &ViewerTuning::default()));
        render_loop.tick(&mut presenter).unwrap();
        assert_eq!(presenter.resident(), 1);
        assert_eq!(presenter.released(), 1);

        stage.dispose();
        render_loop.finish(&mut presenter);
        assert!(presenter.is_shut_down());
        assert_eq!(presenter.resident(), 0);
        assert_eq!(presenter.frames(), 2);
    }
}
