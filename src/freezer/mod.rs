//! The texture-atlas cache for zoomed-out paint groups.
//!
//! Freezing a paint group pre-renders its content into slot textures at
//! a fixed downsample scale. When the group is later rendered below the
//! cache-activation scale, one textured quad per fragment replaces the
//! group's entire live draw-call stream. Above that scale the group
//! always renders live, so freezing never costs visual fidelity.
//!
//! Ownership: the `Freezer` owns per-window rows, rows own slots, slots
//! own their GPU texture. A `FrozenNode` (held by a value's
//! [`FreezerCache`]) owns its fragments, which reference slot regions.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::camera::Camera;
use crate::node::GraphNode;
use crate::matrix::Matrix3;
use crate::paint::artist::{DrawPass, RenderArgs};
use crate::paint::group::{PaintGroup, SIMPLE_RENDER_SCALE};
use crate::rect::Rect;
use crate::window::{GpuHandle, ShaderCache, WindowContext, WindowId};

/// Downsample factor for cached content: one texel per hundred world
/// units. Matches the cache-activation scale, so a cached texel maps to
/// at most one screen pixel.
pub const FREEZER_TEXTURE_SCALE: f32 = 0.01;

/// Square texel size of one freezer slot texture.
const SLOT_TEXTURE_SIZE: u32 = 512;

/// Cache capability of a node value.
pub trait Freezable {
    fn cache(&self) -> &FreezerCache;
}

/// Where a fragment landed: which row, slot, and texel region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FragmentAllocation {
    pub high_aspect: bool,
    pub slot: usize,
    pub x: u32,
    pub y: u32,
    /// Window epoch at allocation time; a mismatch means the slot
    /// texture died with a lost context.
    pub epoch: u32,
}

/// One slot texture. Created lazily the first time a fragment renders
/// into it, dropped wholesale on context loss.
struct FreezerSlot {
    texture: Option<wgpu::Texture>,
    view: Option<wgpu::TextureView>,
}

impl FreezerSlot {
    fn ensure_view(&mut self, gpu: &GpuHandle) -> wgpu::TextureView {
        if self.view.is_none() {
            let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("Freezer Slot Texture"),
                size: wgpu::Extent3d {
                    width: SLOT_TEXTURE_SIZE,
                    height: SLOT_TEXTURE_SIZE,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: gpu.format,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            });
            self.view = Some(texture.create_view(&wgpu::TextureViewDescriptor::default()));
            self.texture = Some(texture);
        }
        self.view.clone().unwrap()
    }
}

/// A shelf bin-packer over a growable list of slot textures.
///
/// Row-first rows advance x along a horizontal shelf and wrap y; they
/// hold high-aspect (wide) fragments. Column-first rows advance y along
/// a vertical shelf and wrap x; they hold low-aspect (tall) fragments.
pub struct FreezerRow {
    column_first: bool,
    slots: Vec<FreezerSlot>,
    cursor_x: u32,
    cursor_y: u32,
    /// Extent of the current shelf along the wrap axis.
    shelf: u32,
}

impl FreezerRow {
    pub fn new(column_first: bool) -> Self {
        Self {
            column_first,
            slots: Vec::new(),
            cursor_x: 0,
            cursor_y: 0,
            shelf: 0,
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Allocate a `w` x `h` texel region. Panics if the fragment cannot
    /// ever fit a slot texture — that is a configuration error, not a
    /// packing failure.
    pub fn allocate(&mut self, w: u32, h: u32) -> (usize, u32, u32) {
        assert!(
            w <= SLOT_TEXTURE_SIZE && h <= SLOT_TEXTURE_SIZE,
            "freezer fragment {}x{} exceeds the {} texel slot size",
            w,
            h,
            SLOT_TEXTURE_SIZE
        );
        if self.slots.is_empty() {
            self.push_slot();
        }

        if self.column_first {
            // Advance y within a vertical shelf, wrap x by shelf width.
            if self.cursor_y + h > SLOT_TEXTURE_SIZE {
                self.cursor_x += self.shelf;
                self.cursor_y = 0;
                self.shelf = 0;
            }
            if self.cursor_x + w > SLOT_TEXTURE_SIZE {
                self.push_slot();
            }
            let at = (self.slots.len() - 1, self.cursor_x, self.cursor_y);
            self.cursor_y += h;
            self.shelf = self.shelf.max(w);
            at
        } else {
            // Advance x within a horizontal shelf, wrap y by shelf
            // height.
            if self.cursor_x + w > SLOT_TEXTURE_SIZE {
                self.cursor_y += self.shelf;
                self.cursor_x = 0;
                self.shelf = 0;
            }
            if self.cursor_y + h > SLOT_TEXTURE_SIZE {
                self.push_slot();
            }
            let at = (self.slots.len() - 1, self.cursor_x, self.cursor_y);
            self.cursor_x += w;
            self.shelf = self.shelf.max(h);
            at
        }
    }

    fn push_slot(&mut self) {
        self.slots.push(FreezerSlot {
            texture: None,
            view: None,
        });
        self.cursor_x = 0;
        self.cursor_y = 0;
        self.shelf = 0;
    }

    fn drop_textures(&mut self) {
        for slot in &mut self.slots {
            slot.texture = None;
            slot.view = None;
        }
    }
}

struct FreezerWindow {
    /// Row-first shelf packing for wide fragments.
    high_aspect: FreezerRow,
    /// Column-first shelf packing for tall fragments.
    low_aspect: FreezerRow,
    epoch: u32,
}

impl FreezerWindow {
    fn new() -> Self {
        Self {
            high_aspect: FreezerRow::new(false),
            low_aspect: FreezerRow::new(true),
            epoch: 0,
        }
    }
}

/// The world-wide cache manager: per-window slot rows plus the shared
/// offscreen camera used for all fragment renders.
pub struct Freezer {
    windows: RefCell<HashMap<WindowId, FreezerWindow>>,
    camera: RefCell<Camera>,
}

impl Default for Freezer {
    fn default() -> Self {
        Self::new()
    }
}

impl Freezer {
    pub fn new() -> Self {
        Self {
            windows: RefCell::new(HashMap::new()),
            camera: RefCell::new(Camera::new()),
        }
    }

    /// Freeze a paint-group root. Panics when the node does not root a
    /// paint group — caching a partial coordinate space is meaningless.
    pub fn freeze(&self, node: &dyn GraphNode) {
        assert!(
            node.local_paint_group(),
            "freezing a node that is not a paint-group root"
        );
        let value = node.value().expect("freezing a node with no value");
        let freezable = value
            .as_freezable()
            .expect("freezing a node whose value is not freezable");
        freezable.cache().freeze();
    }

    pub fn thaw(&self, node: &dyn GraphNode) {
        if let Some(value) = node.value() {
            if let Some(freezable) = value.as_freezable() {
                freezable.cache().thaw();
            }
        }
    }

    /// Current epoch for a window; fragments allocated under an older
    /// epoch are invalid.
    pub(crate) fn epoch(&self, window_id: WindowId) -> u32 {
        self.windows
            .borrow()
            .get(&window_id)
            .map(|w| w.epoch)
            .unwrap_or(0)
    }

    pub(crate) fn allocate(
        &self,
        window_id: WindowId,
        w: u32,
        h: u32,
    ) -> FragmentAllocation {
        let mut windows = self.windows.borrow_mut();
        let entry = windows.entry(window_id).or_insert_with(FreezerWindow::new);
        // Choose the row by the fragment's own aspect, not the node's.
        let high_aspect = w >= h;
        let row = if high_aspect {
            &mut entry.high_aspect
        } else {
            &mut entry.low_aspect
        };
        let (slot, x, y) = row.allocate(w, h);
        FragmentAllocation {
            high_aspect,
            slot,
            x,
            y,
            epoch: entry.epoch,
        }
    }

    pub(crate) fn slot_view(
        &self,
        window_id: WindowId,
        allocation: &FragmentAllocation,
        gpu: &GpuHandle,
    ) -> wgpu::TextureView {
        let mut windows = self.windows.borrow_mut();
        let entry = windows.entry(window_id).or_insert_with(FreezerWindow::new);
        let row = if allocation.high_aspect {
            &mut entry.high_aspect
        } else {
            &mut entry.low_aspect
        };
        row.slots[allocation.slot].ensure_view(gpu)
    }

    /// Context change for one window. Loss invalidates every slot and,
    /// via the epoch bump, every fragment allocated in them; restore
    /// recreates textures lazily on the next cache paint.
    pub fn context_changed(&self, window_id: WindowId, lost: bool) {
        if !lost {
            return;
        }
        let mut windows = self.windows.borrow_mut();
        if let Some(entry) = windows.get_mut(&window_id) {
            entry.epoch = entry.epoch.wrapping_add(1);
            entry.high_aspect = FreezerRow::new(false);
            entry.low_aspect = FreezerRow::new(true);
            log::debug!("freezer slots invalidated for window {}", window_id);
        }
    }

    fn with_camera<R>(&self, f: impl FnOnce(&mut Camera) -> R) -> R {
        f(&mut self.camera.borrow_mut())
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct FragmentVertex {
    /// Group-local position.
    position: [f32; 2],
    /// UV into the slot texture.
    tex: [f32; 2],
}

const SHADER_SOURCE: &str = r#"
struct Uniforms {
    world: mat4x4<f32>,
}

@group(0) @binding(0) var<uniform> uniforms: Uniforms;
@group(0) @binding(1) var cache_texture: texture_2d<f32>;
@group(0) @binding(2) var cache_sampler: sampler;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) tex: vec2<f32>,
}

@vertex
fn vs_main(@location(0) position: vec2<f32>, @location(1) tex: vec2<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = uniforms.world * vec4<f32>(position, 0.0, 1.0);
    out.tex = tex;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(cache_texture, cache_sampler, in.tex);
}
"#;

impl ShaderCache {
    pub(crate) fn textured_pipeline(
        &mut self,
        gpu: &GpuHandle,
    ) -> &(wgpu::RenderPipeline, wgpu::BindGroupLayout) {
        self.textured.get_or_insert_with(|| {
            let shader = gpu
                .device
                .create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some("Freezer Fragment Shader"),
                    source: wgpu::ShaderSource::Wgsl(SHADER_SOURCE.into()),
                });

            let bind_group_layout =
                gpu.device
                    .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                        label: Some("Freezer Bind Group Layout"),
                        entries: &[
                            wgpu::BindGroupLayoutEntry {
                                binding: 0,
                                visibility: wgpu::ShaderStages::VERTEX,
                                ty: wgpu::BindingType::Buffer {
                                    ty: wgpu::BufferBindingType::Uniform,
                                    has_dynamic_offset: false,
                                    min_binding_size: None,
                                },
                                count: None,
                            },
                            wgpu::BindGroupLayoutEntry {
                                binding: 1,
                                visibility: wgpu::ShaderStages::FRAGMENT,
                                ty: wgpu::BindingType::Texture {
                                    sample_type: wgpu::TextureSampleType::Float {
                                        filterable: true,
                                    },
                                    view_dimension: wgpu::TextureViewDimension::D2,
                                    multisampled: false,
                                },
                                count: None,
                            },
                            wgpu::BindGroupLayoutEntry {
                                binding: 2,
                                visibility: wgpu::ShaderStages::FRAGMENT,
                                ty: wgpu::BindingType::Sampler(
                                    wgpu::SamplerBindingType::Filtering,
                                ),
                                count: None,
                            },
                        ],
                    });

            let layout = gpu
                .device
                .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("Freezer Pipeline Layout"),
                    bind_group_layouts: &[&bind_group_layout],
                    immediate_size: 0,
                });

            let pipeline = gpu
                .device
                .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some("Freezer Pipeline"),
                    layout: Some(&layout),
                    vertex: wgpu::VertexState {
                        module: &shader,
                        entry_point: Some("vs_main"),
                        buffers: &[wgpu::VertexBufferLayout {
                            array_stride: std::mem::size_of::<FragmentVertex>()
                                as wgpu::BufferAddress,
                            step_mode: wgpu::VertexStepMode::Vertex,
                            attributes: &[
                                wgpu::VertexAttribute {
                                    offset: 0,
                                    shader_location: 0,
                                    format: wgpu::VertexFormat::Float32x2,
                                },
                                wgpu::VertexAttribute {
                                    offset: std::mem::size_of::<[f32; 2]>()
                                        as wgpu::BufferAddress,
                                    shader_location: 1,
                                    format: wgpu::VertexFormat::Float32x2,
                                },
                            ],
                        }],
                        compilation_options: wgpu::PipelineCompilationOptions::default(),
                    },
                    fragment: Some(wgpu::FragmentState {
                        module: &shader,
                        entry_point: Some("fs_main"),
                        targets: &[Some(wgpu::ColorTargetState {
                            format: gpu.format,
                            blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                            write_mask: wgpu::ColorWrites::ALL,
                        })],
                        compilation_options: wgpu::PipelineCompilationOptions::default(),
                    }),
                    primitive: wgpu::PrimitiveState::default(),
                    depth_stencil: None,
                    multisample: wgpu::MultisampleState::default(),
                    multiview_mask: None,
                    cache: None,
                });

            (pipeline, bind_group_layout)
        })
    }
}

/// One texture tile of a frozen node's content.
pub struct FrozenNodeFragment {
    /// Destination rect in the paint group's coordinate space.
    world_rect: Rect,
    tex_w: u32,
    tex_h: u32,
    allocation: FragmentAllocation,
    /// Textured-quad vertex buffer, built lazily on first cached render.
    buffer: Option<wgpu::Buffer>,
}

impl FrozenNodeFragment {
    pub fn world_rect(&self) -> Rect {
        self.world_rect
    }

    pub fn allocation(&self) -> &FragmentAllocation {
        &self.allocation
    }
}

/// The cached representation of one paint group.
pub struct FrozenNode {
    /// Content bounds in group-local coordinates, computed once per
    /// validation from the group's accumulated paint bounds.
    bounds: Option<Rect>,
    fragments: Vec<FrozenNodeFragment>,
    uniform: Option<wgpu::Buffer>,
    painted: bool,
    epoch: u32,
}

impl FrozenNode {
    fn new() -> Self {
        Self {
            bounds: None,
            fragments: Vec::new(),
            uniform: None,
            painted: false,
            epoch: 0,
        }
    }

    pub fn fragments(&self) -> &[FrozenNodeFragment] {
        &self.fragments
    }

    pub fn is_painted(&self) -> bool {
        self.painted
    }

    /// Drop cached content; the next cached render re-tiles and
    /// re-renders.
    fn invalidate(&mut self) {
        self.fragments.clear();
        self.bounds = None;
        self.painted = false;
    }

    /// Tile the group's bounds into fragments, pack them into slots, and
    /// render each through the freezer's offscreen camera.
    fn paint(&mut self, group: &mut PaintGroup, window: &WindowContext, freezer: &Freezer) {
        let epoch = freezer.epoch(window.id());
        if self.painted && self.epoch == epoch {
            return;
        }
        self.fragments.clear();

        let bounds = *self.bounds.get_or_insert_with(|| group.bounds());
        if bounds.is_empty() {
            self.painted = true;
            self.epoch = epoch;
            return;
        }

        // World units covered by one full slot at the freezer scale.
        let max_world = SLOT_TEXTURE_SIZE as f32 / FREEZER_TEXTURE_SCALE;
        let cols = (bounds.width / max_world).ceil().max(1.0) as u32;
        let rows = (bounds.height / max_world).ceil().max(1.0) as u32;

        for row in 0..rows {
            for col in 0..cols {
                let x0 = bounds.x + col as f32 * max_world;
                let y0 = bounds.y + row as f32 * max_world;
                let world_rect = Rect::new(
                    x0,
                    y0,
                    (bounds.right() - x0).min(max_world),
                    (bounds.bottom() - y0).min(max_world),
                );
                let tex_w = ((world_rect.width * FREEZER_TEXTURE_SCALE).ceil() as u32).max(1);
                let tex_h = ((world_rect.height * FREEZER_TEXTURE_SCALE).ceil() as u32).max(1);
                let allocation = freezer.allocate(window.id(), tex_w, tex_h);
                let mut fragment = FrozenNodeFragment {
                    world_rect,
                    tex_w,
                    tex_h,
                    allocation,
                    buffer: None,
                };
                Self::render_fragment(group, window, freezer, &mut fragment);
                self.fragments.push(fragment);
            }
        }

        self.painted = true;
        self.epoch = epoch;
        log::debug!(
            "froze group into {} fragment(s) covering {:?}",
            self.fragments.len(),
            bounds
        );
    }

    /// Render one fragment's world sub-rectangle into its slot region.
    fn render_fragment(
        group: &mut PaintGroup,
        window: &WindowContext,
        freezer: &Freezer,
        fragment: &mut FrozenNodeFragment,
    ) {
        let Some(gpu) = window.gpu() else {
            return;
        };
        let view = freezer.slot_view(window.id(), &fragment.allocation, gpu);

        // Frame the throwaway camera exactly on this fragment's world
        // sub-rectangle at the freezer scale.
        let world = freezer.with_camera(|camera| {
            camera.set_size(fragment.tex_w as f32, fragment.tex_h as f32);
            camera.set_scale(FREEZER_TEXTURE_SCALE);
            camera.set_origin(
                fragment.world_rect.x + fragment.world_rect.width / 2.0,
                fragment.world_rect.y + fragment.world_rect.height / 2.0,
            );
            camera.project()
        });

        let camera = freezer.camera.borrow();
        let args = RenderArgs {
            world,
            scale: FREEZER_TEXTURE_SCALE,
            force_simple: FREEZER_TEXTURE_SCALE < SIMPLE_RENDER_SCALE,
            camera: &camera,
            window,
        };

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Freezer Fragment Encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Freezer Fragment Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        // Other fragments share this slot; never clear it.
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            let a = &fragment.allocation;
            pass.set_viewport(
                a.x as f32,
                a.y as f32,
                fragment.tex_w as f32,
                fragment.tex_h as f32,
                0.0,
                1.0,
            );
            pass.set_scissor_rect(a.x, a.y, fragment.tex_w, fragment.tex_h);
            let mut draw_pass = DrawPass::new(&mut pass);
            group.render_direct(&args, &mut draw_pass);
        }
        gpu.queue.submit(std::iter::once(encoder.finish()));
    }

    /// Draw every fragment as a textured quad under the group's world
    /// transform.
    fn render(
        &mut self,
        window: &WindowContext,
        freezer: &Freezer,
        world: &Matrix3,
        pass: &mut DrawPass<'_, '_>,
    ) {
        let Some(gpu) = window.gpu() else {
            return;
        };

        let uniform = self.uniform.get_or_insert_with(|| {
            gpu.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Freezer Uniform Buffer"),
                size: 64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        });
        gpu.queue
            .write_buffer(uniform, 0, bytemuck::cast_slice(&world.to_gpu()));

        let sampler = gpu.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Freezer Sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        for fragment in &mut self.fragments {
            let buffer = fragment.buffer.get_or_insert_with(|| {
                let r = fragment.world_rect;
                let a = &fragment.allocation;
                let u0 = a.x as f32 / SLOT_TEXTURE_SIZE as f32;
                let v0 = a.y as f32 / SLOT_TEXTURE_SIZE as f32;
                let u1 = (a.x + fragment.tex_w) as f32 / SLOT_TEXTURE_SIZE as f32;
                let v1 = (a.y + fragment.tex_h) as f32 / SLOT_TEXTURE_SIZE as f32;
                let v = |px: f32, py: f32, tu: f32, tv: f32| FragmentVertex {
                    position: [px, py],
                    tex: [tu, tv],
                };
                let vertices = [
                    v(r.x, r.y, u0, v0),
                    v(r.x, r.bottom(), u0, v1),
                    v(r.right(), r.y, u1, v0),
                    v(r.right(), r.y, u1, v0),
                    v(r.x, r.bottom(), u0, v1),
                    v(r.right(), r.bottom(), u1, v1),
                ];
                let buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("Freezer Fragment Quad"),
                    size: std::mem::size_of_val(&vertices) as wgpu::BufferAddress,
                    usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });
                gpu.queue
                    .write_buffer(&buffer, 0, bytemuck::cast_slice(&vertices));
                buffer
            });

            let view = freezer.slot_view(window.id(), &fragment.allocation, gpu);
            let mut shaders = window.shaders();
            let (pipeline, layout) = shaders.textured_pipeline(gpu);
            let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Freezer Fragment Bind Group"),
                layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: self.uniform.as_ref().unwrap().as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(&sampler),
                    },
                ],
            });

            let Some(raw) = pass.raw() else {
                return;
            };
            raw.set_pipeline(pipeline);
            raw.set_bind_group(0, &bind_group, &[]);
            raw.set_vertex_buffer(0, buffer.slice(..));
            raw.draw(0..6, 0..1);
        }
    }
}

/// Per-freezable-value cache handle: owns the [`FrozenNode`] while the
/// value is frozen.
#[derive(Default)]
pub struct FreezerCache {
    frozen: RefCell<Option<FrozenNode>>,
}

impl FreezerCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.borrow().is_some()
    }

    pub(crate) fn freeze(&self) {
        let mut frozen = self.frozen.borrow_mut();
        if frozen.is_none() {
            *frozen = Some(FrozenNode::new());
        }
    }

    /// Dispose all cached fragments and fall back to live rendering.
    pub fn thaw(&self) {
        *self.frozen.borrow_mut() = None;
    }

    /// Content under the frozen node changed; cached fragments are
    /// stale.
    pub fn invalidate(&self) {
        if let Some(frozen) = self.frozen.borrow_mut().as_mut() {
            frozen.invalidate();
        }
    }

    /// Access the cached node, if frozen (for inspection/tests).
    pub fn with_frozen<R>(&self, f: impl FnOnce(&FrozenNode) -> R) -> Option<R> {
        self.frozen.borrow().as_ref().map(f)
    }

    pub(crate) fn paint_if_needed(
        &self,
        group: &mut PaintGroup,
        window: &WindowContext,
        freezer: &Freezer,
    ) {
        if let Some(frozen) = self.frozen.borrow_mut().as_mut() {
            frozen.paint(group, window, freezer);
        }
    }

    pub(crate) fn render(
        &self,
        window: &WindowContext,
        freezer: &Freezer,
        world: &Matrix3,
        pass: &mut DrawPass<'_, '_>,
    ) {
        if let Some(frozen) = self.frozen.borrow_mut().as_mut() {
            frozen.render(window, freezer, world, pass);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_overlap(rects: &[(u32, u32, u32, u32)]) -> bool {
        for (i, a) in rects.iter().enumerate() {
            for b in rects.iter().skip(i + 1) {
                let disjoint =
                    a.0 + a.2 <= b.0 || b.0 + b.2 <= a.0 || a.1 + a.3 <= b.1 || b.1 + b.3 <= a.1;
                if !disjoint {
                    return false;
                }
            }
        }
        true
    }

    #[test]
    fn test_row_first_allocations_do_not_overlap() {
        let mut row = FreezerRow::new(false);
        let mut per_slot: std::collections::HashMap<usize, Vec<(u32, u32, u32, u32)>> =
            std::collections::HashMap::new();
        let sizes = [
            (200, 60),
            (300, 80),
            (100, 40),
            (512, 100),
            (60, 60),
            (400, 90),
            (250, 30),
        ];
        for (w, h) in sizes {
            let (slot, x, y) = row.allocate(w, h);
            per_slot.entry(slot).or_default().push((x, y, w, h));
        }
        for rects in per_slot.values() {
            assert!(no_overlap(rects));
        }
    }

    #[test]
    fn test_column_first_allocations_do_not_overlap() {
        let mut row = FreezerRow::new(true);
        let mut per_slot: std::collections::HashMap<usize, Vec<(u32, u32, u32, u32)>> =
            std::collections::HashMap::new();
        for i in 0..40 {
            let w = 40 + (i % 5) * 30;
            let h = 100 + (i % 7) * 50;
            let (slot, x, y) = row.allocate(w, h);
            per_slot.entry(slot).or_default().push((x, y, w, h));
        }
        for rects in per_slot.values() {
            assert!(no_overlap(rects));
        }
    }

    #[test]
    fn test_full_row_overflows_to_new_slot() {
        let mut row = FreezerRow::new(false);
        for _ in 0..10 {
            row.allocate(512, 512);
        }
        assert_eq!(row.slot_count(), 10);
    }

    #[test]
    #[should_panic(expected = "exceeds the 512 texel slot size")]
    fn test_oversized_fragment_panics() {
        let mut row = FreezerRow::new(false);
        row.allocate(513, 10);
    }

    #[test]
    fn test_allocations_stay_inside_slot() {
        let mut row = FreezerRow::new(false);
        for i in 0..100 {
            let w = 30 + (i % 11) * 40;
            let h = 20 + (i % 6) * 35;
            let (_, x, y) = row.allocate(w, h);
            assert!(x + w <= SLOT_TEXTURE_SIZE);
            assert!(y + h <= SLOT_TEXTURE_SIZE);
        }
    }

    #[test]
    fn test_freezer_routes_by_fragment_aspect() {
        let freezer = Freezer::new();
        let wide = freezer.allocate(1, 300, 100);
        let tall = freezer.allocate(1, 100, 300);
        assert!(wide.high_aspect);
        assert!(!tall.high_aspect);
    }

    #[test]
    fn test_context_loss_bumps_epoch() {
        let freezer = Freezer::new();
        let a = freezer.allocate(1, 100, 100);
        assert_eq!(a.epoch, 0);
        freezer.context_changed(1, true);
        let b = freezer.allocate(1, 100, 100);
        assert_eq!(b.epoch, 1);
    }
}
