//! Per-subgroup GPU resource registry.
//!
//! Each paint subgroup owns one `PaintContext`: a typed store for the
//! artist's GPU objects plus the bounding rectangle accumulated while
//! members paint. Resources are keyed by their concrete type, so an
//! artist fetches exactly the struct it stored during `setup`.

use std::any::{Any, TypeId};
use std::collections::HashMap;

use crate::rect::Rect;

#[derive(Default)]
pub struct PaintContext {
    resources: HashMap<TypeId, Box<dyn Any>>,
    bounds: Rect,
}

impl PaintContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T: Any>(&mut self, resource: T) {
        self.resources.insert(TypeId::of::<T>(), Box::new(resource));
    }

    pub fn get<T: Any>(&self) -> Option<&T> {
        self.resources
            .get(&TypeId::of::<T>())
            .and_then(|b| b.downcast_ref())
    }

    pub fn get_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.resources
            .get_mut(&TypeId::of::<T>())
            .and_then(|b| b.downcast_mut())
    }

    /// Grow the accumulated bounds to include a painted rect
    /// (group-local coordinates).
    pub fn include_bounds(&mut self, rect: &Rect) {
        self.bounds.include(rect);
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }
}
