use std::sync::Arc;

use parking_lot::RwLock;

/// Rendering surface whose client size the viewer queries at init and on
/// resize.
pub trait ViewportProvider: Send + Sync {
    fn viewport_size(&self) -> (u32, u32);

    fn aspect(&self) -> f32 {
        let (width, height) = self.viewport_size();
        if height == 0 {
            1.0
        } else {
            width as f32 / height as f32
        }
    }
}

/// Surface with a fixed size, used headless and in tests.
#[derive(Debug, Clone, Copy)]
pub struct StaticViewport {
    pub width: u32,
    pub height: u32,
}

impl StaticViewport {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl ViewportProvider for StaticViewport {
    fn viewport_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Surface size tracked from window resize events.
#[derive(Debug)]
pub struct WindowViewport {
    size: RwLock<(u32, u32)>,
}

impl WindowViewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: RwLock::new((width, height)),
        }
    }

    /// Records a new size. Minimized windows report zero and are clamped.
    pub fn update(&self, width: u32, height: u32) {
        *self.size.write() = (width.max(1), height.max(1));
    }
}

impl ViewportProvider for WindowViewport {
    fn viewport_size(&self) -> (u32, u32) {
        *self.size.read()
    }
}

impl<T> ViewportProvider for Arc<T>
where
    T: ViewportProvider + ?Sized,
{
    fn viewport_size(&self) -> (u32, u32) {
        (**self).viewport_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_viewport_clamps_minimized_sizes() {
        let viewport = WindowViewport::new(1280, 720);
        assert_eq!(viewport.viewport_size(), (1280, 720));
        viewport.update(0, 0);
        assert_eq!(viewport.viewport_size(), (1, 1));
    }

    #[test]
    fn aspect_handles_zero_height() {
        assert_eq!(StaticViewport::new(800, 0).aspect(), 1.0);
        let shared: Arc<dyn ViewportProvider> = Arc::new(StaticViewport::new(1600, 800));
        assert_eq!(shared.aspect(), 2.0);
    }
}
