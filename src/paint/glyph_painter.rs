//! Batched glyph quad rendering.
//!
//! One GPU vertex buffer per referenced atlas page, sized exactly to the
//! glyph count declared during draft (6 vertices per quad). Quads are
//! staged CPU-side and flushed in batches via `queue.write_buffer`, so a
//! long label costs a handful of uploads rather than one per glyph.

use std::collections::HashMap;
use std::rc::Rc;

use crate::color::Color;
use crate::font::{atlas_cols, Font, GlyphData, GLYPH_PAGE_SIZE};
use crate::paint::artist::{DrawPass, RenderArgs};
use crate::paint::counts::DraftCounts;
use crate::window::{GpuHandle, ShaderCache, WindowContext};

/// Staged glyphs per flush batch.
const STAGING_GLYPHS: usize = 64;

const VERTICES_PER_GLYPH: usize = 6;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GlyphVertex {
    /// Group-local position.
    pub position: [f32; 2],
    /// Texel coordinates into the window's atlas texture.
    pub tex: [f32; 2],
    pub color: [f32; 4],
    pub background: [f32; 4],
}

impl GlyphVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<GlyphVertex>() as wgpu::BufferAddress,
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
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 4]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 8]>() as wgpu::BufferAddress,
                    shader_location: 3,
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
@group(0) @binding(1) var atlas: texture_2d<f32>;
@group(0) @binding(2) var atlas_sampler: sampler;

struct VertexInput {
    @location(0) position: vec2<f32>,
    @location(1) tex: vec2<f32>,
    @location(2) color: vec4<f32>,
    @location(3) background: vec4<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) tex: vec2<f32>,
    @location(1) color: vec4<f32>,
    @location(2) background: vec4<f32>,
}

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = uniforms.world * vec4<f32>(in.position, 0.0, 1.0);
    out.tex = in.tex;
    out.color = in.color;
    out.background = in.background;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    // Texel coords divided by the live texture size, so quads stay
    // valid when the atlas texture grows another page row.
    let dims = vec2<f32>(textureDimensions(atlas));
    let coverage = textureSample(atlas, atlas_sampler, in.tex / dims).r;
    return mix(in.background, in.color, coverage);
}
"#;

impl ShaderCache {
    pub(crate) fn glyph_pipeline(
        &mut self,
        gpu: &GpuHandle,
    ) -> &(wgpu::RenderPipeline, wgpu::BindGroupLayout) {
        self.glyph.get_or_insert_with(|| {
            let shader = gpu
                .device
                .create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some("Glyph Shader"),
                    source: wgpu::ShaderSource::Wgsl(SHADER_SOURCE.into()),
                });

            let bind_group_layout =
                gpu.device
                    .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                        label: Some("Glyph Bind Group Layout"),
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
                    label: Some("Glyph Pipeline Layout"),
                    bind_group_layouts: &[&bind_group_layout],
                    immediate_size: 0,
                });

            let pipeline = gpu
                .device
                .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some("Glyph Pipeline"),
                    layout: Some(&layout),
                    vertex: wgpu::VertexState {
                        module: &shader,
                        entry_point: Some("vs_main"),
                        buffers: &[GlyphVertex::desc()],
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

/// Buffers for one atlas page referenced by this painter.
struct GlyphPageRenderer {
    capacity: usize,
    written: usize,
    /// Glyphs already flushed to the GPU buffer.
    flushed: usize,
    staging: Vec<GlyphVertex>,
    buffer: Option<wgpu::Buffer>,
}

impl GlyphPageRenderer {
    fn flush(&mut self, gpu: &GpuHandle) {
        if self.staging.is_empty() {
            return;
        }
        if let Some(buffer) = &self.buffer {
            let stride = std::mem::size_of::<GlyphVertex>() * VERTICES_PER_GLYPH;
            let offset = (self.flushed * stride) as wgpu::BufferAddress;
            gpu.queue
                .write_buffer(buffer, offset, bytemuck::cast_slice(&self.staging));
        }
        self.flushed += self.staging.len() / VERTICES_PER_GLYPH;
        self.staging.clear();
    }
}

pub struct GlyphPainter {
    font: Rc<Font>,
    pages: HashMap<usize, GlyphPageRenderer>,
    uniform: Option<wgpu::Buffer>,
    generation: u32,
}

impl GlyphPainter {
    pub fn new(font: Rc<Font>) -> Self {
        Self {
            font,
            pages: HashMap::new(),
            uniform: None,
            generation: 0,
        }
    }

    pub fn font(&self) -> &Rc<Font> {
        &self.font
    }

    /// Number of glyphs drawn since the buffers were initialized.
    pub fn glyphs_written(&self) -> usize {
        self.pages.values().map(|p| p.written).sum()
    }

    /// (Re)allocate one vertex buffer per referenced page, sized exactly
    /// for the declared glyph count. A page whose declared count matches
    /// its existing buffer keeps the buffer untouched.
    pub fn init_buffers(&mut self, window: &WindowContext, counts: &DraftCounts) {
        if self.generation != window.generation() {
            // Context was restored since last use; nothing GPU-side
            // survives.
            self.pages.clear();
            self.uniform = None;
            self.generation = window.generation();
        }

        let stride = std::mem::size_of::<GlyphVertex>() * VERTICES_PER_GLYPH;
        let mut pages = HashMap::new();
        for (page, count) in counts.glyph_pages() {
            let reuse = self
                .pages
                .remove(&page)
                .filter(|p| p.capacity == count && p.buffer.is_some());
            let renderer = match reuse {
                Some(mut p) => {
                    p.written = 0;
                    p.flushed = 0;
                    p.staging.clear();
                    p
                }
                None => GlyphPageRenderer {
                    capacity: count,
                    written: 0,
                    flushed: 0,
                    staging: Vec::with_capacity(STAGING_GLYPHS * VERTICES_PER_GLYPH),
                    buffer: window.gpu().map(|gpu| {
                        gpu.device.create_buffer(&wgpu::BufferDescriptor {
                            label: Some("Glyph Vertex Buffer"),
                            size: (count * stride) as wgpu::BufferAddress,
                            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                            mapped_at_creation: false,
                        })
                    }),
                },
            };
            pages.insert(page, renderer);
        }
        self.pages = pages;
    }

    /// Stage one glyph quad at a group-local position.
    ///
    /// Panics when a page receives more glyphs than were declared for it
    /// — that is a counting bug in some value's `draft`, never a runtime
    /// condition.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_glyph(
        &mut self,
        window: &WindowContext,
        glyph: &GlyphData,
        x: f32,
        y: f32,
        font_scale: f32,
        color: Color,
        background: Color,
    ) {
        let ascent = self.font.ascent();
        let page = self
            .pages
            .get_mut(&glyph.page)
            .unwrap_or_else(|| panic!("glyph page {} was not declared during draft", glyph.page));
        assert!(
            page.written < page.capacity,
            "glyph buffer overflow on page {}: {} glyphs declared",
            glyph.page,
            page.capacity
        );

        let cols = atlas_cols(window);
        let tile_x = (glyph.page as u32 % cols * GLYPH_PAGE_SIZE) as f32;
        let tile_y = (glyph.page as u32 / cols * GLYPH_PAGE_SIZE) as f32;
        let tx0 = tile_x + glyph.x as f32;
        let ty0 = tile_y + glyph.y as f32;
        let tx1 = tx0 + glyph.width as f32;
        let ty1 = ty0 + glyph.height as f32;

        // Align the glyph cell on the line's baseline.
        let top = y + (ascent - glyph.ascent) * font_scale;
        let w = glyph.width as f32 * font_scale;
        let h = glyph.height as f32 * font_scale;

        let color = color.to_array();
        let background = background.to_array();
        let v = |px: f32, py: f32, tx: f32, ty: f32| GlyphVertex {
            position: [px, py],
            tex: [tx, ty],
            color,
            background,
        };
        page.staging.extend_from_slice(&[
            v(x, top, tx0, ty0),
            v(x, top + h, tx0, ty1),
            v(x + w, top, tx1, ty0),
            v(x + w, top, tx1, ty0),
            v(x, top + h, tx0, ty1),
            v(x + w, top + h, tx1, ty1),
        ]);
        page.written += 1;

        if page.staging.len() >= STAGING_GLYPHS * VERTICES_PER_GLYPH {
            if let Some(gpu) = window.gpu() {
                page.flush(gpu);
            }
        }
    }

    /// Flush any partially-filled staging batches to the GPU.
    pub fn flush(&mut self, window: &WindowContext) {
        let Some(gpu) = window.gpu() else {
            return;
        };
        for page in self.pages.values_mut() {
            page.flush(gpu);
        }
    }

    /// Upload the atlas and draw every staged glyph.
    pub fn render(&mut self, args: &RenderArgs<'_>, pass: &mut DrawPass<'_, '_>) {
        let window = args.window;
        self.font.update(window);
        self.flush(window);

        let Some(gpu) = window.gpu() else {
            return;
        };
        let Some(view) = self.font.texture_view(window.id()) else {
            return;
        };

        let uniform = self.uniform.get_or_insert_with(|| {
            gpu.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Glyph Uniform Buffer"),
                size: 64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        });
        gpu.queue
            .write_buffer(uniform, 0, bytemuck::cast_slice(&args.world.to_gpu()));

        let sampler = gpu.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Glyph Sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let mut shaders = window.shaders();
        let (pipeline, layout) = shaders.glyph_pipeline(gpu);
        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Glyph Bind Group"),
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

        let Some(pass) = pass.raw() else {
            return;
        };
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        for page in self.pages.values() {
            let (Some(buffer), true) = (&page.buffer, page.flushed > 0) else {
                continue;
            };
            pass.set_vertex_buffer(0, buffer.slice(..));
            pass.draw(0..(page.flushed * VERTICES_PER_GLYPH) as u32, 0..1);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::font::testing::fixed_font;
    use crate::window::WindowContext;

    fn painter_with_capacity(per_page: usize) -> (GlyphPainter, WindowContext, Rc<Font>) {
        let font = Rc::new(fixed_font());
        let mut painter = GlyphPainter::new(font.clone());
        let window = WindowContext::headless(1, 4096);
        let mut counts = DraftCounts::default();
        counts.add_glyphs(0, per_page);
        painter.init_buffers(&window, &counts);
        (painter, window, font)
    }

    #[test]
    fn test_draw_glyph_counts_against_capacity() {
        let (mut painter, window, font) = painter_with_capacity(2);
        let g = font.glyph("a");
        painter.draw_glyph(&window, &g, 0.0, 0.0, 1.0, Color::BLACK, Color::TRANSPARENT);
        painter.draw_glyph(&window, &g, 10.0, 0.0, 1.0, Color::BLACK, Color::TRANSPARENT);
        assert_eq!(painter.glyphs_written(), 2);
    }

    #[test]
    #[should_panic(expected = "glyph buffer overflow")]
    fn test_overflow_past_declared_count_panics() {
        let (mut painter, window, font) = painter_with_capacity(1);
        let g = font.glyph("a");
        painter.draw_glyph(&window, &g, 0.0, 0.0, 1.0, Color::BLACK, Color::TRANSPARENT);
        painter.draw_glyph(&window, &g, 10.0, 0.0, 1.0, Color::BLACK, Color::TRANSPARENT);
    }

    #[test]
    #[should_panic(expected = "was not declared during draft")]
    fn test_undeclared_page_panics() {
        let (mut painter, window, font) = painter_with_capacity(1);
        // Push glyphs onto a second page, which was never drafted.
        for i in 0..2000 {
            font.glyph(&format!("p{}", i));
        }
        let far = font.glyph("p1999");
        assert!(far.page > 0);
        painter.draw_glyph(&window, &far, 0.0, 0.0, 1.0, Color::BLACK, Color::TRANSPARENT);
    }
}
