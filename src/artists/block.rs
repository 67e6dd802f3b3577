//! Blocks: rounded-rectangle nodes with optional labels.
//!
//! `Block` is the stock [`Painted`] value — an SDF rounded rect with a
//! border, centered on its node, plus an optional editable [`Label`]
//! drawn through the subgroup's glyph painters. `BlockArtist` is its
//! rendering strategy; all blocks share one instance per thread so a
//! run of blocks collapses into a single subgroup.

use std::cell::RefCell;
use std::rc::Rc;

use crate::color::Color;
use crate::freezer::{Freezable, FreezerCache};
use crate::label::Label;
use crate::node::{Interaction, Interactive, NodePlacement, Painted};
use crate::paint::artist::{Artist, DrawPass, RenderArgs};
use crate::paint::counts::DraftCounts;
use crate::paint::context::PaintContext;
use crate::paint::glyph_painter::GlyphPainter;
use crate::rect::Rect;
use crate::window::{GpuHandle, ShaderCache, WindowContext};

#[derive(Clone, Copy, Debug)]
pub struct BlockStyle {
    pub color: Color,
    pub border_color: Color,
    pub border_thickness: f32,
    pub corner_radius: f32,
    pub text_color: Color,
}

impl Default for BlockStyle {
    fn default() -> Self {
        Self {
            color: Color::rgb(0.8, 0.8, 0.9),
            border_color: Color::rgb(0.4, 0.4, 0.5),
            border_thickness: 2.0,
            corner_radius: 8.0,
            text_color: Color::BLACK,
        }
    }
}

pub struct Block {
    style: BlockStyle,
    width: f32,
    height: f32,
    label: RefCell<Option<Label>>,
    interaction: Interaction,
    freezer_cache: FreezerCache,
}

impl Block {
    pub fn new(width: f32, height: f32, style: BlockStyle) -> Self {
        Self {
            style,
            width,
            height,
            label: RefCell::new(None),
            interaction: Interaction::new(),
            freezer_cache: FreezerCache::new(),
        }
    }

    pub fn style(&self) -> &BlockStyle {
        &self.style
    }

    pub fn size(&self) -> (f32, f32) {
        (self.width, self.height)
    }

    pub fn set_label(&self, label: Option<Label>) {
        *self.label.borrow_mut() = label;
    }

    pub fn with_label<R>(&self, f: impl FnOnce(&mut Label) -> R) -> Option<R> {
        self.label.borrow_mut().as_mut().map(f)
    }
}

impl Painted for Block {
    fn draft(&self, counts: &mut DraftCounts) {
        counts.add_blocks(1);
        if let Some(label) = &*self.label.borrow() {
            label.draft(counts);
        }
    }

    fn paint(
        &self,
        ctx: &mut PaintContext,
        placement: &NodePlacement,
        window: &WindowContext,
    ) -> bool {
        let rect = Rect::new(
            placement.x - self.width * placement.scale / 2.0,
            placement.y - self.height * placement.scale / 2.0,
            self.width * placement.scale,
            self.height * placement.scale,
        );
        ctx.include_bounds(&rect);

        let resources = ctx
            .get_mut::<BlockResources>()
            .expect("block painted without BlockArtist setup");
        resources.push_block(&rect, &self.style, placement.scale);

        if let Some(label) = &*self.label.borrow() {
            let painter = resources.painter_for(window, label.font());
            let (lw, lh) = label.size();
            let lx = placement.x - lw * placement.scale / 2.0;
            let ly = placement.y - lh * placement.scale / 2.0;
            label.paint(
                painter,
                window,
                lx,
                ly,
                placement.scale,
                self.style.text_color,
                Color::TRANSPARENT,
            );
        }
        false
    }

    fn artist(&self) -> Rc<dyn Artist> {
        BlockArtist::shared()
    }

    fn as_freezable(&self) -> Option<&dyn Freezable> {
        Some(self)
    }

    fn as_interactive(&self) -> Option<&dyn Interactive> {
        Some(self)
    }
}

impl Freezable for Block {
    fn cache(&self) -> &FreezerCache {
        &self.freezer_cache
    }
}

impl Interactive for Block {
    fn interact(&self) -> &Interaction {
        &self.interaction
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct BlockVertex {
    position: [f32; 2],
    /// Block rect in group-local coordinates: [x0, y0, x1, y1].
    rect: [f32; 4],
    color: [f32; 4],
    border_color: [f32; 4],
    /// [corner_radius, border_thickness, 0, 0] in group-local units.
    params: [f32; 4],
}

impl BlockVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<BlockVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 6]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 10]>() as wgpu::BufferAddress,
                    shader_location: 3,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 14]>() as wgpu::BufferAddress,
                    shader_location: 4,
                    format: wgpu::VertexFormat::Float32x4,
                },
            ],
        }
    }
}

const SHADER_SOURCE: &str = r#"
struct Uniforms {
    world: mat4x4<f32>,
}

@group(0) @binding(0) var<uniform> uniforms: Uniforms;

struct VertexInput {
    @location(0) position: vec2<f32>,
    @location(1) rect: vec4<f32>,
    @location(2) color: vec4<f32>,
    @location(3) border_color: vec4<f32>,
    @location(4) params: vec4<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) local: vec2<f32>,
    @location(1) rect: vec4<f32>,
    @location(2) color: vec4<f32>,
    @location(3) border_color: vec4<f32>,
    @location(4) params: vec4<f32>,
}

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = uniforms.world * vec4<f32>(in.position, 0.0, 1.0);
    out.local = in.position;
    out.rect = in.rect;
    out.color = in.color;
    out.border_color = in.border_color;
    out.params = in.params;
    return out;
}

fn sd_rounded_box(p: vec2<f32>, b: vec2<f32>, r: f32) -> f32 {
    let q = abs(p) - b + r;
    return min(max(q.x, q.y), 0.0) + length(max(q, vec2<f32>(0.0, 0.0))) - r;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let center = (in.rect.xy + in.rect.zw) * 0.5;
    let half_size = (in.rect.zw - in.rect.xy) * 0.5;
    let radius = min(in.params.x, min(half_size.x, half_size.y));
    let border = in.params.y;

    let dist = sd_rounded_box(in.local - center, half_size, radius);
    let aa = fwidth(dist);

    let shape_alpha = 1.0 - smoothstep(-aa, aa, dist);
    if (border <= 0.0) {
        return vec4<f32>(in.color.rgb, in.color.a * shape_alpha);
    }

    let fill_alpha = 1.0 - smoothstep(-aa, aa, dist + border);
    let border_alpha = max(shape_alpha - fill_alpha, 0.0);
    let fill = vec4<f32>(in.color.rgb, in.color.a * fill_alpha);
    let edge = vec4<f32>(in.border_color.rgb, in.border_color.a * border_alpha);
    let out_a = edge.a + fill.a * (1.0 - edge.a);
    if (out_a <= 0.0) {
        return vec4<f32>(0.0, 0.0, 0.0, 0.0);
    }
    let out_rgb = (edge.rgb * edge.a + fill.rgb * fill.a * (1.0 - edge.a)) / out_a;
    return vec4<f32>(out_rgb, out_a);
}
"#;

impl ShaderCache {
    pub(crate) fn block_pipeline(&mut self, gpu: &GpuHandle) -> &wgpu::RenderPipeline {
        self.block.get_or_insert_with(|| {
            let shader = gpu
                .device
                .create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some("Block Shader"),
                    source: wgpu::ShaderSource::Wgsl(SHADER_SOURCE.into()),
                });

            let bind_group_layout =
                gpu.device
                    .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                        label: Some("Block Bind Group Layout"),
                        entries: &[wgpu::BindGroupLayoutEntry {
                            binding: 0,
                            visibility: wgpu::ShaderStages::VERTEX,
                            ty: wgpu::BindingType::Buffer {
                                ty: wgpu::BufferBindingType::Uniform,
                                has_dynamic_offset: false,
                                min_binding_size: None,
                            },
                            count: None,
                        }],
                    });

            let layout = gpu
                .device
                .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("Block Pipeline Layout"),
                    bind_group_layouts: &[&bind_group_layout],
                    immediate_size: 0,
                });

            gpu.device
                .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some("Block Pipeline"),
                    layout: Some(&layout),
                    vertex: wgpu::VertexState {
                        module: &shader,
                        entry_point: Some("vs_main"),
                        buffers: &[BlockVertex::desc()],
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
                })
        })
    }
}

/// The block subgroup's GPU resources: one vertex buffer sized to the
/// drafted block count, plus one glyph painter per label font.
pub struct BlockResources {
    capacity: usize,
    written: usize,
    staging: Vec<BlockVertex>,
    uploaded: bool,
    buffer: Option<wgpu::Buffer>,
    uniform: Option<wgpu::Buffer>,
    counts: DraftCounts,
    glyph_painters: Vec<GlyphPainter>,
    generation: u32,
}

impl BlockResources {
    pub fn blocks_written(&self) -> usize {
        self.written
    }

    fn push_block(&mut self, rect: &Rect, style: &BlockStyle, scale: f32) {
        assert!(
            self.written < self.capacity,
            "block buffer overflow: {} blocks declared",
            self.capacity
        );
        let (x0, y0, x1, y1) = (rect.x, rect.y, rect.right(), rect.bottom());
        let color = style.color.to_array();
        let border_color = style.border_color.to_array();
        let params = [
            style.corner_radius * scale,
            style.border_thickness * scale,
            0.0,
            0.0,
        ];
        let rect4 = [x0, y0, x1, y1];
        let v = |px: f32, py: f32| BlockVertex {
            position: [px, py],
            rect: rect4,
            color,
            border_color,
            params,
        };
        self.staging.extend_from_slice(&[
            v(x0, y0),
            v(x0, y1),
            v(x1, y0),
            v(x1, y0),
            v(x0, y1),
            v(x1, y1),
        ]);
        self.written += 1;
        self.uploaded = false;
    }

    fn painter_for(
        &mut self,
        window: &WindowContext,
        font: &Rc<crate::font::Font>,
    ) -> &mut GlyphPainter {
        let found = self
            .glyph_painters
            .iter()
            .position(|p| Rc::ptr_eq(p.font(), font));
        let index = match found {
            Some(i) => i,
            None => {
                let mut painter = GlyphPainter::new(font.clone());
                painter.init_buffers(window, &self.counts);
                self.glyph_painters.push(painter);
                self.glyph_painters.len() - 1
            }
        };
        &mut self.glyph_painters[index]
    }
}

/// The block rendering strategy. Stateless; shared per thread.
pub struct BlockArtist;

thread_local! {
    static SHARED_BLOCK_ARTIST: Rc<BlockArtist> = Rc::new(BlockArtist);
}

impl BlockArtist {
    pub fn shared() -> Rc<dyn Artist> {
        SHARED_BLOCK_ARTIST.with(|a| a.clone() as Rc<dyn Artist>)
    }
}

impl Artist for BlockArtist {
    fn setup(&self, window: &WindowContext, ctx: &mut PaintContext, counts: &DraftCounts) {
        let capacity = counts.blocks();
        let buffer = window.gpu().map(|gpu| {
            gpu.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Block Vertex Buffer"),
                size: (capacity * 6 * std::mem::size_of::<BlockVertex>()) as wgpu::BufferAddress,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        });
        // Glyph buffers are sized from these counts too; painters are
        // created lazily per label font during paint.
        ctx.set(BlockResources {
            capacity,
            written: 0,
            staging: Vec::with_capacity(capacity * 6),
            uploaded: false,
            buffer,
            uniform: None,
            counts: counts.clone(),
            glyph_painters: Vec::new(),
            generation: window.generation(),
        });
    }

    fn render(&self, args: &RenderArgs<'_>, ctx: &mut PaintContext, pass: &mut DrawPass<'_, '_>) {
        let window = args.window;
        let Some(resources) = ctx.get_mut::<BlockResources>() else {
            return;
        };
        if resources.generation != window.generation() {
            // Context restored under us; buffers are stale and the group
            // repaints before anything meaningful can be drawn.
            return;
        }

        if let Some(gpu) = window.gpu() {
            if let (Some(buffer), false) = (&resources.buffer, resources.uploaded) {
                gpu.queue
                    .write_buffer(buffer, 0, bytemuck::cast_slice(&resources.staging));
                resources.uploaded = true;
            }

            let uniform = resources.uniform.get_or_insert_with(|| {
                gpu.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("Block Uniform Buffer"),
                    size: 64,
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                })
            });
            gpu.queue
                .write_buffer(uniform, 0, bytemuck::cast_slice(&args.world.to_gpu()));

            if let (Some(buffer), Some(raw)) = (&resources.buffer, pass.raw()) {
                let mut shaders = window.shaders();
                let pipeline = shaders.block_pipeline(gpu);
                let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Block Bind Group"),
                    layout: &pipeline.get_bind_group_layout(0),
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: resources.uniform.as_ref().unwrap().as_entire_binding(),
                    }],
                });
                raw.set_pipeline(pipeline);
                raw.set_bind_group(0, &bind_group, &[]);
                raw.set_vertex_buffer(0, buffer.slice(..));
                raw.draw(0..(resources.written * 6) as u32, 0..1);
            }
        }

        // Labels are invisible at this scale; skip their draw calls
        // entirely when the renderer asks for the simple path.
        if !args.force_simple {
            for painter in &mut resources.glyph_painters {
                painter.render(args, pass);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::node::Painted;

    #[test]
    fn test_shared_artist_identity() {
        let a = BlockArtist::shared();
        let b = BlockArtist::shared();
        assert!(Rc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_block_drafts_itself_and_label() {
        let font = Rc::new(crate::font::testing::fixed_font());
        let block = Block::new(100.0, 40.0, BlockStyle::default());
        let mut label = crate::label::Label::new(font);
        label.set_text("hi");
        block.set_label(Some(label));

        let mut counts = DraftCounts::default();
        block.draft(&mut counts);
        assert_eq!(counts.blocks(), 1);
        assert_eq!(counts.glyphs(0), 2);
    }

    #[test]
    #[should_panic(expected = "block buffer overflow")]
    fn test_block_overflow_panics() {
        let window = crate::window::WindowContext::headless(1, 4096);
        let mut ctx = PaintContext::new();
        let mut counts = DraftCounts::default();
        counts.add_blocks(1);
        BlockArtist.setup(&window, &mut ctx, &counts);

        let resources = ctx.get_mut::<BlockResources>().unwrap();
        let style = BlockStyle::default();
        let rect = Rect::new(0.0, 0.0, 10.0, 10.0);
        resources.push_block(&rect, &style, 1.0);
        resources.push_block(&rect, &style, 1.0);
    }
}
