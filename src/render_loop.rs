//! Per-frame update and present cycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::{debug, info};
use parking_lot::RwLock;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::resources::ResourceId;
use crate::stage::{FrameSnapshot, Stage};

/// Lifecycle of the render loop. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopState {
    #[default]
    Idle,
    Initializing,
    Running,
    Stopped,
}

/// Backend that turns frame snapshots into pixels.
pub trait Presenter {
    fn present(&mut self, frame: &FrameSnapshot) -> Result<()>;

    /// Frees backend objects for resources the stage no longer holds.
    fn release(&mut self, resources: &[ResourceId]);

    /// Called once when the loop stops.
    fn shutdown(&mut self);
}

impl<P: Presenter + ?Sized> Presenter for Box<P> {
    fn present(&mut self, frame: &FrameSnapshot) -> Result<()> {
        (**self).present(frame)
    }

    fn release(&mut self, resources: &[ResourceId]) {
        (**self).release(resources)
    }

    fn shutdown(&mut self) {
        (**self).shutdown()
    }
}

/// Counters kept by the loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frames: u64,
    pub draws: u64,
    pub released: u64,
}

struct LoopShared {
    state: RwLock<LoopState>,
    stats: RwLock<FrameStats>,
    rotation: AtomicBool,
    finished: AtomicBool,
}

/// Drives the stage one frame at a time.
///
/// Handles are cheap to clone and share the same state, so the viewer can
/// toggle rotation or stop the loop while another thread owns the presenter.
pub struct RenderLoop {
    stage: Stage,
    shared: Arc<LoopShared>,
    cancel: CancellationToken,
    rotation_step: f32,
    frame_interval: Duration,
}

impl Clone for RenderLoop {
    fn clone(&self) -> Self {
        Self {
            stage: self.stage.clone(),
            shared: Arc::clone(&self.shared),
            cancel: self.cancel.clone(),
            rotation_step: self.rotation_step,
            frame_interval: self.frame_interval,
        }
    }
}

impl RenderLoop {
    pub fn new(
        stage: Stage,
        cancel: CancellationToken,
        rotation_step: f32,
        frame_interval: Duration,
        auto_rotate: bool,
    ) -> Self {
        Self {
            stage,
            shared: Arc::new(LoopShared {
                state: RwLock::new(LoopState::Idle),
                stats: RwLock::new(FrameStats::default()),
                rotation: AtomicBool::new(auto_rotate),
                finished: AtomicBool::new(false),
            }),
            cancel,
            rotation_step,
            frame_interval,
        }
    }

    pub fn state(&self) -> LoopState {
        *self.shared.state.read()
    }

    pub fn stats(&self) -> FrameStats {
        *self.shared.stats.read()
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    /// `Idle -> Initializing`. Returns `false` from any other state.
    pub fn begin(&self) -> bool {
        let mut state = self.shared.state.write();
        if *state != LoopState::Idle {
            return false;
        }
        *state = LoopState::Initializing;
        debug!("render loop initializing");
        true
    }

    pub fn rotation_enabled(&self) -> bool {
        self.shared.rotation.load(Ordering::Relaxed)
    }

    /// Flips auto-rotation and returns the new setting.
    pub fn toggle_rotation(&self) -> bool {
        !self.shared.rotation.fetch_xor(true, Ordering::Relaxed)
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == LoopState::Stopped || self.cancel.is_cancelled()
    }

    /// Moves to `Stopped` from any state and cancels the frame schedule.
    /// Returns `false` if the loop was already stopped.
    pub fn stop(&self) -> bool {
        let mut state = self.shared.state.write();
        self.cancel.cancel();
        if *state == LoopState::Stopped {
            return false;
        }
        info!("render loop stopping (was {:?})", *state);
        *state = LoopState::Stopped;
        true
    }

    /// Advances animation and presents one frame. Returns `Ok(false)` once
    /// the loop has stopped.
    pub fn tick<P: Presenter + ?Sized>(&self, presenter: &mut P) -> Result<bool> {
        {
            let mut state = self.shared.state.write();
            if self.cancel.is_cancelled() {
                *state = LoopState::Stopped;
            }
            match *state {
                LoopState::Stopped => return Ok(false),
                LoopState::Idle | LoopState::Initializing => *state = LoopState::Running,
                LoopState::Running => {}
            }
        }

        self.stage.advance(self.rotation_enabled(), self.rotation_step);
        let released = self.stage.drain_released();
        if !released.is_empty() {
            presenter.release(&released);
        }
        let frame = self.stage.snapshot();
        presenter.present(&frame)?;

        let mut stats = self.shared.stats.write();
        stats.frames += 1;
        stats.draws += frame.draws.len() as u64;
        stats.released += released.len() as u64;
        Ok(true)
    }

    /// Frees what the stage released and shuts the presenter down. Only the
    /// first call does anything.
    pub fn finish<P: Presenter + ?Sized>(&self, presenter: &mut P) {
        self.stop();
        if self.shared.finished.swap(true, Ordering::AcqRel) {
            return;
        }
        let released = self.stage.drain_released();
        if !released.is_empty() {
            presenter.release(&released);
            self.shared.stats.write().released += released.len() as u64;
        }
        presenter.shutdown();
        debug!("render loop finished after {} frame(s)", self.stats().frames);
    }

    /// Runs frames on a fixed interval until stopped, `max_frames` is
    /// reached or the presenter fails, then finishes.
    pub async fn run<P: Presenter + ?Sized>(
        &self,
        presenter: &mut P,
        max_frames: Option<u64>,
    ) -> Result<FrameStats> {
        let mut interval = tokio::time::interval(self.frame_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut produced = 0u64;
        let result = loop {
            if max_frames.is_some_and(|max| produced >= max) {
                break Ok(());
            }
            tokio::select! {
                _ = self.cancel.cancelled() => break Ok(()),
                _ = interval.tick() => {}
            }
            match self.tick(presenter) {
                Ok(true) => produced += 1,
                Ok(false) => break Ok(()),
                Err(err) => break Err(err),
            }
        };
        self.finish(presenter);
        result.map(|()| self.stats())
    }
}
