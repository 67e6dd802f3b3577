//! Per-render-session statistics.
//!
//! A `RenderStats` is created by the caller and threaded through the
//! render walk — state is never shared across windows or sessions, so
//! parallel tests and multi-window hosts don't contaminate each other.

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Paint groups drawn from freezer fragments.
    pub cached_renders: u32,
    /// Paint groups drawn live.
    pub immediate_renders: u32,
    /// Paint groups skipped as fully offscreen.
    pub culled_groups: u32,
}

impl RenderStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn total_groups(&self) -> u32 {
        self.cached_renders + self.immediate_renders + self.culled_groups
    }
}
