// Application window and event loop
//
// Single-threaded UI/render driver: owns the window, the GPU context,
// and the scene items. GStreamer's threads never touch any of this;
// they only post user events through the event loop proxy, and
// everything is applied here on the next redraw.

use anyhow::{anyhow, Context};
use glam::{Quat, Vec3};
use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop, EventLoopProxy},
    keyboard::{Key, NamedKey},
    window::{Window, WindowAttributes, WindowId},
};

use crate::config::{AppConfig, ObjectConfig};
use crate::material::CropRect;
use crate::player::{Player, PlayerEvent, PlayerState};
use crate::scene::{Arcball, Camera, Compositor, ItemRenderer, RenderResources, VideoItem};

const MESH_TYPES: &[&str] = &["quad", "cube", "sphere", "torus"];

/// How far the arrow keys jump through the stream.
const SEEK_STEP_MS: i64 = 10_000;

/// Events posted from GStreamer threads to wake the event loop.
#[derive(Debug, Clone, Copy)]
pub enum UserEvent {
    /// A new video frame is waiting in some player's sink.
    FrameAvailable,
    /// A player queued a notification; poll it on the next redraw.
    PlayerNotification,
}

struct GpuState {
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    device: wgpu::Device,
    queue: wgpu::Queue,
    resources: RenderResources,
    compositor: Compositor,
}

struct SceneObject {
    item: VideoItem,
    renderer: ItemRenderer,
    subtitles_enabled: bool,
}

pub struct App {
    config_path: std::path::PathBuf,
    config: AppConfig,
    proxy: EventLoopProxy<UserEvent>,
    window: Option<Arc<Window>>,
    gpu: Option<GpuState>,
    objects: Vec<SceneObject>,
    camera: Camera,
    arcball: Arcball,
    cursor: (f64, f64),
    dragging: bool,
}

impl App {
    pub fn run(config_path: std::path::PathBuf, config: AppConfig) -> anyhow::Result<()> {
        let event_loop = EventLoop::<UserEvent>::with_user_event()
            .build()
            .context("Failed to create event loop")?;
        event_loop.set_control_flow(ControlFlow::Wait);

        let proxy = event_loop.create_proxy();

        let mut camera = Camera::default();
        camera.set_fov(60.0);
        camera.set_z_range(0.1, 100.0);
        camera.set_position(Vec3::new(0.0, 0.0, 3.5));

        let mut app = App {
            config_path,
            config,
            proxy,
            window: None,
            gpu: None,
            objects: Vec::new(),
            camera,
            arcball: Arcball::new(),
            cursor: (0.0, 0.0),
            dragging: false,
        };

        event_loop.run_app(&mut app).context("Event loop failed")?;
        Ok(())
    }

    fn init_gpu(&mut self, window: Arc<Window>) -> anyhow::Result<GpuState> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let surface = instance
            .create_surface(window.clone())
            .context("Failed to create surface")?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .map_err(|e| anyhow!("Failed to request adapter: {}", e))?;
        log::info!("Using GPU adapter: {:?}", adapter.get_info().name);

        // Native NV12 uploads need the feature; request it when the
        // adapter has it so the direct strategy can probe positively.
        let mut features = wgpu::Features::empty();
        if adapter.features().contains(wgpu::Features::TEXTURE_FORMAT_NV12) {
            features |= wgpu::Features::TEXTURE_FORMAT_NV12;
        }

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Main Device"),
            required_features: features,
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::MemoryUsage,
            experimental_features: wgpu::ExperimentalFeatures::disabled(),
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| anyhow!("Failed to create device: {}", e))?;

        let capabilities = surface.get_capabilities(&adapter);
        let format = capabilities
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .unwrap_or(capabilities.formats[0]);

        let size = window.inner_size();
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let resources = RenderResources::new(&device);
        let compositor = Compositor::new(&device, format);

        Ok(GpuState {
            surface,
            surface_config,
            device,
            queue,
            resources,
            compositor,
        })
    }

    /// Builds one scene object per configured video object.
    fn create_objects(&mut self) -> anyhow::Result<()> {
        let Some(gpu) = &self.gpu else {
            return Ok(());
        };
        let size = self
            .window
            .as_ref()
            .map(|w| w.inner_size())
            .unwrap_or(PhysicalSize::new(1, 1));

        for object_config in self.config.objects.clone() {
            let frame_proxy = self.proxy.clone();
            let mut player = Player::new(move || {
                let _ = frame_proxy.send_event(UserEvent::FrameAvailable);
            })
            .context("Failed to create player")?;

            let wake_proxy = self.proxy.clone();
            player.set_wake(move || {
                let _ = wake_proxy.send_event(UserEvent::PlayerNotification);
            });

            player.set_sink_formats(gpu.resources.provider().supported_formats());
            player.set_subtitles_enabled(object_config.subtitles_enabled);
            player.set_url(&object_config.url);

            let mut item = VideoItem::new(player, object_config.mesh_type.clone());
            let [w, x, y, z] = object_config.rotation;
            item.transform.rotation = Quat::from_xyzw(x, y, z, w).normalize();
            item.transform.scale = object_config.scale;
            let [cx, cy, cw, ch] = object_config.crop_rectangle;
            item.crop = CropRect {
                x: cx,
                y: cy,
                width: cw,
                height: ch,
            };
            item.texture_rotation = object_config.texture_rotation;

            if let Err(e) = item.player.play() {
                log::error!("Failed to start playback of {}: {}", object_config.url, e);
            }

            let mut renderer = ItemRenderer::new(&gpu.device, &gpu.resources);
            renderer.set_target_size(&gpu.device, size.width, size.height);

            self.objects.push(SceneObject {
                item,
                renderer,
                subtitles_enabled: object_config.subtitles_enabled,
            });
        }
        Ok(())
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        let Some(gpu) = &mut self.gpu else {
            return;
        };
        gpu.surface_config.width = size.width.max(1);
        gpu.surface_config.height = size.height.max(1);
        gpu.surface.configure(&gpu.device, &gpu.surface_config);

        self.camera
            .set_aspect(gpu.surface_config.width as f32 / gpu.surface_config.height as f32);
        self.arcball.set_viewport(size.width, size.height);
        for object in &mut self.objects {
            object
                .renderer
                .set_target_size(&gpu.device, size.width, size.height);
        }
    }

    fn poll_players(&mut self) {
        for object in &mut self.objects {
            for event in object.item.player.poll_events() {
                match event {
                    PlayerEvent::EndOfStream => {
                        log::info!("Playback finished: {:?}", object.item.player.url());
                    }
                    PlayerEvent::StateChanged(state) => {
                        log::debug!("Player state changed: {:?}", state);
                    }
                    PlayerEvent::SubtitleChanged(text) => {
                        if object.subtitles_enabled && !text.is_empty() {
                            log::info!("Subtitle: {}", text);
                        }
                    }
                    PlayerEvent::Buffering(percent) => {
                        log::debug!("Buffering: {}%", percent);
                    }
                    PlayerEvent::PositionUpdated(position_ms) => {
                        log::trace!("Position: {} ms", position_ms);
                    }
                    PlayerEvent::DurationChanged(duration_ms) => {
                        log::info!("Duration: {} ms", duration_ms);
                    }
                    PlayerEvent::SeekableChanged(seekable) => {
                        log::info!(
                            "Stream is {}",
                            if seekable { "seekable" } else { "not seekable" }
                        );
                    }
                    PlayerEvent::UrlChanged => {}
                }
            }
        }
    }

    fn redraw(&mut self) {
        self.poll_players();

        let Some(gpu) = &mut self.gpu else {
            return;
        };

        for object in &mut self.objects {
            object.renderer.synchronize(&object.item, &self.camera);
        }

        let surface_texture = match gpu.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                gpu.surface.configure(&gpu.device, &gpu.surface_config);
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
                return;
            }
            Err(e) => {
                log::error!("Failed to acquire surface texture: {}", e);
                return;
            }
        };
        let surface_view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        let mut needs_retry = false;
        for object in &mut self.objects {
            needs_retry |= object.renderer.render(
                &gpu.device,
                &gpu.queue,
                &mut encoder,
                &mut gpu.resources,
                &mut object.item.player,
            );
        }

        let outputs: Vec<&wgpu::TextureView> = self
            .objects
            .iter()
            .filter_map(|object| object.renderer.output())
            .collect();
        gpu.compositor
            .composite(&gpu.device, &mut encoder, &surface_view, &outputs);

        gpu.queue.submit(std::iter::once(encoder.finish()));
        surface_texture.present();

        if needs_retry {
            if let Some(window) = &self.window {
                window.request_redraw();
            }
        }
    }

    fn handle_key(&mut self, key: Key) {
        match key {
            Key::Named(NamedKey::Space) => {
                for object in &mut self.objects {
                    let player = &mut object.item.player;
                    let result = match player.state() {
                        PlayerState::Playing => player.pause(),
                        _ => player.play(),
                    };
                    if let Err(e) = result {
                        log::error!("Playback control failed: {}", e);
                    }
                }
            }
            Key::Named(NamedKey::ArrowLeft) => self.seek_all(-SEEK_STEP_MS),
            Key::Named(NamedKey::ArrowRight) => self.seek_all(SEEK_STEP_MS),
            Key::Character(c) if c == "m" => {
                for object in &mut self.objects {
                    let current = MESH_TYPES
                        .iter()
                        .position(|t| *t == object.item.mesh_type)
                        .unwrap_or(0);
                    let next = MESH_TYPES[(current + 1) % MESH_TYPES.len()];
                    object.item.mesh_type = next.to_string();
                }
                self.request_redraw();
            }
            _ => {}
        }
    }

    /// Steps every seekable stream by `step_ms` relative to its current
    /// position.
    fn seek_all(&mut self, step_ms: i64) {
        for object in &mut self.objects {
            let player = &mut object.item.player;
            if !player.is_seekable() {
                continue;
            }
            let position = player.position();
            if position < 0 {
                continue;
            }
            let target = seek_target(position, step_ms, player.duration());
            if let Err(e) = player.seek(target) {
                log::error!("Seek failed: {}", e);
            }
        }
    }

    fn request_redraw(&self) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    /// Writes the current object states back to the config file.
    fn save_config(&mut self) {
        self.config.objects = self
            .objects
            .iter()
            .map(|object| {
                let rotation = object.item.transform.rotation;
                let crop = object.item.crop;
                ObjectConfig {
                    url: object.item.player.url().unwrap_or_default().to_string(),
                    mesh_type: object.item.mesh_type.clone(),
                    scale: object.item.transform.scale,
                    rotation: [rotation.w, rotation.x, rotation.y, rotation.z],
                    crop_rectangle: [crop.x, crop.y, crop.width, crop.height],
                    texture_rotation: object.item.texture_rotation,
                    subtitles_enabled: object.subtitles_enabled,
                }
            })
            .collect();

        if let Err(e) = self.config.save(&self.config_path) {
            log::error!("Failed to save configuration: {}", e);
        }
    }
}

impl ApplicationHandler<UserEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attrs = WindowAttributes::default()
            .with_title("vidmesh")
            .with_inner_size(PhysicalSize::new(1280u32, 720u32));
        let window = match event_loop.create_window(window_attrs) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        match self.init_gpu(window.clone()) {
            Ok(gpu) => self.gpu = Some(gpu),
            Err(e) => {
                log::error!("Failed to initialize GPU: {:#}", e);
                event_loop.exit();
                return;
            }
        }

        let size = window.inner_size();
        self.window = Some(window);
        if let Err(e) = self.create_objects() {
            log::error!("Failed to create scene objects: {:#}", e);
            event_loop.exit();
            return;
        }
        self.resize(size);
        self.request_redraw();
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                self.save_config();
                // Stop playback before the GPU context goes away;
                // objects drop after the event loop exits.
                for object in &mut self.objects {
                    object.item.player.stop();
                }
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                self.resize(size);
                self.request_redraw();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state.is_pressed() {
                    self.handle_key(event.logical_key);
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = (position.x, position.y);
                if self.dragging {
                    let rotation = self.arcball.drag(position.x, position.y);
                    for object in &mut self.objects {
                        object.item.transform.rotation = rotation;
                    }
                    self.request_redraw();
                }
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => match state {
                ElementState::Pressed => {
                    let base = self
                        .objects
                        .first()
                        .map(|object| object.item.transform.rotation)
                        .unwrap_or(Quat::IDENTITY);
                    self.arcball.press(self.cursor.0, self.cursor.1, base);
                    self.dragging = true;
                }
                ElementState::Released => {
                    self.dragging = false;
                }
            },
            WindowEvent::RedrawRequested => {
                self.redraw();
            }
            _ => {}
        }
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, _event: UserEvent) {
        // Both frame-available and player notifications are handled by
        // redrawing: the redraw polls events and pulls pending frames.
        self.request_redraw();
    }
}

/// Target position for a relative seek, clamped to the stream bounds.
/// An unknown duration (-1) leaves the upper end unclamped; the engine
/// clamps overshooting seeks itself.
fn seek_target(position_ms: i64, step_ms: i64, duration_ms: i64) -> i64 {
    let target = (position_ms + step_ms).max(0);
    if duration_ms >= 0 {
        target.min(duration_ms)
    } else {
        target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seek_target_steps_relative() {
        assert_eq!(seek_target(30_000, SEEK_STEP_MS, 120_000), 40_000);
        assert_eq!(seek_target(30_000, -SEEK_STEP_MS, 120_000), 20_000);
    }

    #[test]
    fn test_seek_target_clamps_to_start() {
        assert_eq!(seek_target(3_000, -SEEK_STEP_MS, 120_000), 0);
    }

    #[test]
    fn test_seek_target_clamps_to_duration() {
        assert_eq!(seek_target(115_000, SEEK_STEP_MS, 120_000), 120_000);
    }

    #[test]
    fn test_seek_target_with_unknown_duration() {
        assert_eq!(seek_target(115_000, SEEK_STEP_MS, -1), 125_000);
    }
}
