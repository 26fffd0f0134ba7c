use std::sync::Arc;
use std::time::Instant;

use glam::Vec2;
use sprig::{mocha, BatchRenderer, BatchStats, Camera, Color, Font, Quad, RendererConfig};
use sprig_text::{Backend, Rasterizer};
use sprig_wgpu::WgpuBackend;
use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, MouseScrollDelta, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

const PANGRAM: &str = "The quick brown fox jumps over the lazy dog.";

/// Font path from the first argument, falling back to `SPRIG_FONT`.
fn font_path() -> Option<String> {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("SPRIG_FONT").ok())
}

/// `SPRIG_RASTERIZER=swash` switches away from the default rasterizer.
fn rasterizer_backend() -> Backend {
    match std::env::var("SPRIG_RASTERIZER").as_deref() {
        Ok("swash") => Backend::Swash,
        Ok("fontdue") | Err(_) => Backend::Fontdue,
        Ok(other) => {
            log::warn!("Unknown rasterizer {other:?}, using fontdue");
            Backend::Fontdue
        }
    }
}

fn load_font() -> Option<Font<Rasterizer>> {
    let Some(path) = font_path() else {
        log::warn!("No font given (pass a path or set SPRIG_FONT); text is disabled");
        return None;
    };

    let data = match std::fs::read(&path) {
        Ok(data) => data,
        Err(err) => {
            log::error!("Failed to read font {path}: {err}");
            return None;
        }
    };

    let backend = rasterizer_backend();
    match sprig_text::load_font_with(backend, data, Default::default()) {
        Ok(font) => {
            log::info!("✓ Loaded font {path} with {backend:?}");
            Some(font)
        }
        Err(err) => {
            log::error!("{err}");
            None
        }
    }
}

struct GpuState {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    config: wgpu::SurfaceConfiguration,
    queue: wgpu::Queue,
    renderer: BatchRenderer<WgpuBackend>,
    font: Option<Font<Rasterizer>>,
    camera: Camera,
    start: Instant,
    last_stats: BatchStats,
    show_atlas: bool,
}

impl GpuState {
    async fn new(window: Arc<Window>) -> Self {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let surface = instance.create_surface(window.clone()).unwrap();

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .unwrap();

        log::info!("✓ Using GPU: {}", adapter.get_info().name);

        // Texture binding arrays need the adapter's limits, not the defaults.
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Device"),
                required_features: WgpuBackend::required_features(),
                required_limits: adapter.limits(),
                memory_hints: wgpu::MemoryHints::default(),
                experimental_features: wgpu::ExperimentalFeatures::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .unwrap();

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .unwrap_or(surface_caps.formats[0]);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let backend = WgpuBackend::new(&device, &queue, surface_format);
        let renderer = BatchRenderer::new(backend, RendererConfig::default());
        log::info!("✓ Renderer initialized");

        Self {
            surface,
            device,
            config,
            queue,
            renderer,
            font: load_font(),
            camera: Camera::new(size.width, size.height),
            start: Instant::now(),
            last_stats: BatchStats::default(),
            show_atlas: false,
        }
    }

    fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.device, &self.config);

            // Keep the world scale while the window changes shape.
            let zoom_ratio = self.camera.zoom / self.camera.screen_size.y.max(1) as f32;
            self.camera.resize(new_size.width, new_size.height);
            self.camera.zoom = new_size.height as f32 * zoom_ratio;
        }
    }

    fn zoom(&mut self, steps: f32) {
        self.camera.zoom = (self.camera.zoom * 0.9f32.powf(steps)).clamp(10.0, 100_000.0);
    }

    /// Screen-space camera: origin top-left, Y down, one unit per pixel.
    fn ui_camera(&self) -> Camera {
        let mut camera = Camera::new(self.config.width, self.config.height).with_invert_y(true);
        camera.position = camera.screen_size.as_vec2() * 0.5;
        camera
    }

    fn draw_world(&mut self) {
        let t = self.start.elapsed().as_secs_f32();
        let palette = [
            mocha::RED,
            mocha::PEACH,
            mocha::YELLOW,
            mocha::GREEN,
            mocha::TEAL,
            mocha::BLUE,
            mocha::LAVENDER,
            mocha::MAUVE,
        ];

        self.renderer.begin(self.camera);

        // Enough quads to spill over several sub-batches.
        for y in -40i32..40 {
            for x in -60..60 {
                let index = (x + y).rem_euclid(palette.len() as i32) as usize;
                let color = palette[index].with_alpha(0.35);
                self.renderer.draw_quad(
                    Quad::new(Vec2::new(x as f32 * 12.0, y as f32 * 12.0), Vec2::splat(9.0))
                        .with_color(color),
                );
            }
        }

        self.renderer.draw_quad(
            Quad::new(Vec2::ZERO, Vec2::splat(160.0))
                .with_rotation(t)
                .with_color(mocha::MAUVE),
        );
        self.renderer.draw_quad_outline(
            Quad::new(Vec2::ZERO, Vec2::splat(160.0))
                .with_rotation(-t)
                .with_color(mocha::TEXT),
        );
        self.renderer
            .draw_line_angle(Vec2::ZERO, t * 0.5, 240.0, mocha::YELLOW);

        if let Some(font) = &mut self.font {
            font.set_active_size(self.renderer.gpu_mut(), 48);
            sprig::draw_text(
                &mut self.renderer,
                font,
                "sprig",
                Vec2::ZERO,
                Vec2::new(0.0, -140.0),
                mocha::TEXT,
            );
        }

        self.renderer.end();
        self.last_stats = self.renderer.stats();
    }

    fn draw_ui(&mut self) {
        let ui_camera = self.ui_camera();
        let stats = self.last_stats;

        self.renderer.begin(ui_camera);

        if let Some(font) = &mut self.font {
            let top_left = Vec2::new(-1.0, -1.0);
            let mut y = 16.0;
            for size in [16, 32, 64] {
                font.set_active_size(self.renderer.gpu_mut(), size);
                sprig::draw_text(
                    &mut self.renderer,
                    font,
                    PANGRAM,
                    top_left,
                    Vec2::new(16.0, y),
                    Color::WHITE,
                );
                y += font.get_metrics().line_height() + font.get_metrics().line_gap;
            }

            font.set_active_size(self.renderer.gpu_mut(), 16);
            let summary = format!(
                "world: {} draws, {} quads, {} texture slots  [A] atlas  [wheel] zoom",
                stats.draw_calls, stats.quads, stats.texture_slots
            );
            sprig::draw_text(
                &mut self.renderer,
                font,
                &summary,
                Vec2::new(-1.0, 1.0),
                Vec2::new(16.0, self.config.height as f32 - 16.0),
                mocha::OVERLAY0,
            );

            if self.show_atlas {
                font.set_active_size(self.renderer.gpu_mut(), 64);
                let side = (self.config.height as f32 * 0.5).min(512.0);
                font.debug_draw_atlas(
                    &mut self.renderer,
                    Vec2::new(self.config.width as f32 - side - 16.0, 16.0),
                    Vec2::splat(side),
                );
            }
        }

        self.renderer.end();
    }

    fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        self.draw_world();
        self.draw_ui();

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        {
            let base = mocha::BASE;
            let _clear_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Clear Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: base.r as f64,
                            g: base.g as f64,
                            b: base.b as f64,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }

        self.renderer.gpu_mut().render(&mut encoder, &view);

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}

#[derive(Default)]
struct App {
    window: Option<Arc<Window>>,
    gpu_state: Option<GpuState>,
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            let window_attributes = Window::default_attributes()
                .with_title("sprig")
                .with_inner_size(winit::dpi::LogicalSize::new(1280, 720));

            let window = Arc::new(event_loop.create_window(window_attributes).unwrap());
            self.window = Some(window.clone());
            self.gpu_state = Some(pollster::block_on(GpuState::new(window)));
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested
            | WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        ..
                    },
                ..
            } => event_loop.exit(),

            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::KeyA),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => {
                if let Some(gpu_state) = &mut self.gpu_state {
                    gpu_state.show_atlas = !gpu_state.show_atlas;
                    log::debug!("atlas overlay: {}", gpu_state.show_atlas);
                }
            }

            WindowEvent::MouseWheel { delta, .. } => {
                if let Some(gpu_state) = &mut self.gpu_state {
                    let steps = match delta {
                        MouseScrollDelta::LineDelta(_, y) => y,
                        MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 40.0,
                    };
                    gpu_state.zoom(steps);
                }
            }

            WindowEvent::Resized(physical_size) => {
                if let Some(gpu_state) = &mut self.gpu_state {
                    gpu_state.resize(physical_size);
                }
            }

            WindowEvent::RedrawRequested => {
                if let Some(gpu_state) = &mut self.gpu_state {
                    match gpu_state.render() {
                        Ok(()) => {}
                        Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                            let size = winit::dpi::PhysicalSize::new(
                                gpu_state.config.width,
                                gpu_state.config.height,
                            );
                            gpu_state.resize(size);
                        }
                        Err(wgpu::SurfaceError::OutOfMemory) => event_loop.exit(),
                        Err(e) => log::warn!("Surface error: {e:?}"),
                    }
                }
            }

            _ => {}
        }

        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

fn main() {
    // Initialize logger (RUST_LOG=debug for verbose output)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting sprig demo...");

    let event_loop = EventLoop::new().unwrap();
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::default();
    event_loop.run_app(&mut app).unwrap();
}
