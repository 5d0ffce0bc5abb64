// =============================================================================
// MESH RENDERER - Real-time Vulkan renderer for a textured mesh
// =============================================================================
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  main loop (events, camera, frame, FPS title, shader reload)    │
// │    └── MeshRenderer (mesh, texture, descriptors, uniforms)      │
// │    └── Renderer (frame state machine, pipeline)                 │
// │          └── Swapchain (images, views, framebuffers, sync)      │
// │                └── VulkanDevice (instance, queues, allocator)   │
// └─────────────────────────────────────────────────────────────────┘
//
// FRAME FLOW:
// 1. Pump window events, move the camera
// 2. start_frame: wait for the slot's fence, acquire an image
// 3. Write the slot's camera uniform, record the mesh draw
// 4. end_frame: submit, present, rebuild the swapchain if needed
//
// =============================================================================

mod backend;
mod camera;
mod config;
mod mesh;
mod scene;
mod shader_watch;
mod texture;
mod window;

use anyhow::{Context, Result};
use backend::{Renderer, VulkanDevice};
use camera::Camera;
use config::Config;
use scene::MeshRenderer;
use shader_watch::ShaderWatcher;
use std::fs::OpenOptions;
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use window::{Window, WindowSurface};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> ExitCode {
    // Load configuration from config.toml
    let (config, load_error) = Config::load();

    init_logging(&config);
    if let Some(e) = load_error {
        log::warn!("Failed to load config.toml: {:#}. Using defaults.", e);
    }
    log::info!("Starting mesh renderer");
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.fullscreen { "fullscreen" } else { "windowed" }
    );
    log::info!(
        "Present mode: {}, frames in flight: {}",
        config.graphics.present_mode,
        config.frames_in_flight()
    );

    match run(&config) {
        Ok(()) => {
            log::info!("Clean shutdown");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("Fatal error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Initialize logging, optionally into `debug.log_file` instead of stderr.
/// RUST_LOG still overrides the configured level.
fn init_logging(config: &Config) {
    use env_logger::{Builder, Env, Target};
    use log::LevelFilter;

    let level = config
        .debug
        .log_level
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::Info);

    let mut builder = Builder::new();
    builder.filter_level(level);
    builder.parse_env(Env::default());

    if config.debug.log_to_file {
        match OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&config.debug.log_file)
        {
            Ok(mut file) => {
                let _ = writeln!(file, "=== Mesh Renderer Log ===");
                let _ = writeln!(file, "Started: {:?}", std::time::SystemTime::now());
                let _ = writeln!(file);
                builder.target(Target::Pipe(Box::new(file)));
            }
            Err(e) => eprintln!("Cannot open log file {}: {}", config.debug.log_file, e),
        }
    }

    builder.init();
}

// =============================================================================
// APPLICATION
// =============================================================================

fn run(config: &Config) -> Result<()> {
    let mut window = Window::new(&config.window)?;
    let device = VulkanDevice::new(&config.device_config(), &window)?;

    let mut scene = MeshRenderer::new(Arc::clone(&device), &config.scene, config.frames_in_flight())?;
    let mut renderer = Renderer::new(
        Arc::clone(&device),
        &mut window,
        config.renderer_config(),
        scene.pipeline_builder(&config.shaders),
    )
    .context("Failed to create renderer")?;

    let watcher = if config.debug.hot_reload_shaders {
        match ShaderWatcher::new(&[
            config.shaders.vertex.as_path(),
            config.shaders.fragment.as_path(),
        ]) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                log::warn!("Shader hot reload disabled: {:#}", e);
                None
            }
        }
    } else {
        None
    };

    let mut camera = Camera::from_config(&config.scene);
    let mut fps = FpsCounter::new(&config.window.title, config.debug.show_fps);
    let mut last_frame = Instant::now();

    log::info!("Entering main loop");

    while !window.should_close() {
        window.poll_events();
        if window.should_close() {
            break;
        }

        let now = Instant::now();
        let dt = now.duration_since(last_frame).as_secs_f32();
        last_frame = now;

        camera.update(&mut window, dt);

        if let Some(watcher) = &watcher {
            if watcher.poll_changed() {
                log::info!("Shader change detected, rebuilding pipeline");
                if let Err(e) = renderer.rebuild_pipeline() {
                    log::error!("Pipeline rebuild failed, keeping the previous one: {}", e);
                }
            }
        }

        if draw_frame(&mut renderer, &mut scene, &camera, &mut window)? {
            fps.frame(&window);
        }
    }

    log::info!("Cleaning up Vulkan resources...");
    device.wait_idle()?;

    // Pipeline references the scene's layout; the device must outlive both
    drop(renderer);
    drop(scene);
    drop(device);

    log::info!("Cleanup complete");
    Ok(())
}

/// Returns false when no frame was rendered this tick
fn draw_frame(
    renderer: &mut Renderer<VulkanDevice>,
    scene: &mut MeshRenderer,
    camera: &Camera,
    window: &mut Window,
) -> Result<bool> {
    let Some(cmd) = renderer.start_frame(window)? else {
        return Ok(false);
    };

    scene.update_uniform(renderer.frame_index(), &camera.uniform(renderer.extent()))?;

    renderer.begin_render_pass(cmd)?;
    scene.record(renderer, cmd)?;
    renderer.end_render_pass(cmd)?;

    renderer.end_frame(window)?;
    Ok(true)
}

// =============================================================================
// FPS TRACKING
// =============================================================================

struct FpsCounter {
    title: String,
    enabled: bool,
    frame_count: u32,
    last_update: Instant,
}

impl FpsCounter {
    fn new(title: &str, enabled: bool) -> Self {
        Self {
            title: title.to_string(),
            enabled,
            frame_count: 0,
            last_update: Instant::now(),
        }
    }

    fn frame(&mut self, window: &Window) {
        if !self.enabled {
            return;
        }

        self.frame_count += 1;
        let elapsed = self.last_update.elapsed().as_secs_f32();
        if elapsed >= 1.0 {
            let fps = self.frame_count as f32 / elapsed;
            let frame_ms = elapsed * 1000.0 / self.frame_count as f32;
            window.set_title(&format!("{} - {:.0} FPS ({:.2}ms)", self.title, fps, frame_ms));
            self.frame_count = 0;
            self.last_update = Instant::now();
        }
    }
}
