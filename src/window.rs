// Window and input
//
// The window is driven by pumping the winit event loop instead of handing it
// control, so the frame loop stays in main and the renderer can block in
// `wait_events` while the window is minimized.

use anyhow::{bail, Context, Result};
use ash::vk;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::collections::HashSet;
use std::ffi::c_char;
use std::time::Duration;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{DeviceEvent, DeviceId, ElementState, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    platform::pump_events::{EventLoopExtPumpEvents, PumpStatus},
    window::{Fullscreen, WindowAttributes, WindowId},
};

use crate::config::WindowConfig;

/// What the frame lifecycle needs from a window
pub trait WindowSurface {
    /// Drawable size in pixels; zero while minimized
    fn extent(&self) -> vk::Extent2D;
    fn should_close(&self) -> bool;
    fn was_resized(&self) -> bool;
    fn reset_resized_flag(&mut self);
    /// Blocks until at least one event has been processed
    fn wait_events(&mut self);
}

/// Held keys/buttons and mouse motion accumulated since the last query
pub trait InputState {
    fn key_held(&self, key: KeyCode) -> bool;
    fn mouse_button_held(&self, button: MouseButton) -> bool;
    fn take_mouse_delta(&mut self) -> (f64, f64);
}

struct WindowState {
    attributes: WindowAttributes,
    window: Option<winit::window::Window>,
    create_error: Option<winit::error::OsError>,
    extent: vk::Extent2D,
    resized: bool,
    close_requested: bool,
    fullscreen: bool,
    keys: HashSet<KeyCode>,
    buttons: HashSet<MouseButton>,
    mouse_delta: (f64, f64),
}

impl WindowState {
    fn new(attributes: WindowAttributes, fullscreen: bool) -> Self {
        Self {
            attributes,
            window: None,
            create_error: None,
            extent: vk::Extent2D::default(),
            resized: false,
            close_requested: false,
            fullscreen,
            keys: HashSet::new(),
            buttons: HashSet::new(),
            mouse_delta: (0.0, 0.0),
        }
    }

    fn on_resize(&mut self, size: PhysicalSize<u32>) {
        self.extent = vk::Extent2D {
            width: size.width,
            height: size.height,
        };
        self.resized = true;
    }

    fn on_key(&mut self, key: KeyCode, pressed: bool, repeat: bool) {
        if !pressed {
            self.keys.remove(&key);
            return;
        }
        self.keys.insert(key);
        if repeat {
            return;
        }
        match key {
            KeyCode::Escape => {
                log::info!("ESC pressed, exiting...");
                self.close_requested = true;
            }
            KeyCode::F11 => self.toggle_fullscreen(),
            _ => {}
        }
    }

    fn on_mouse_button(&mut self, button: MouseButton, pressed: bool) {
        if pressed {
            self.buttons.insert(button);
        } else {
            self.buttons.remove(&button);
        }
    }

    fn toggle_fullscreen(&mut self) {
        self.fullscreen = !self.fullscreen;
        if let Some(window) = &self.window {
            if self.fullscreen {
                window.set_fullscreen(Some(Fullscreen::Borderless(None)));
                log::info!("Entered fullscreen mode");
            } else {
                window.set_fullscreen(None);
                log::info!("Exited fullscreen mode");
            }
        }
    }
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        match event_loop.create_window(self.attributes.clone()) {
            Ok(window) => {
                let size = window.inner_size();
                self.extent = vk::Extent2D {
                    width: size.width,
                    height: size.height,
                };
                self.window = Some(window);
            }
            Err(e) => {
                self.create_error = Some(e);
                self.close_requested = true;
            }
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.close_requested = true;
            }
            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                self.on_resize(size);
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    self.on_key(key, event.state == ElementState::Pressed, event.repeat);
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                self.on_mouse_button(button, state == ElementState::Pressed);
            }
            WindowEvent::Focused(false) => {
                self.keys.clear();
                self.buttons.clear();
            }
            _ => {}
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _id: DeviceId, event: DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
            self.mouse_delta.0 += dx;
            self.mouse_delta.1 += dy;
        }
    }
}

pub struct Window {
    event_loop: EventLoop<()>,
    state: WindowState,
}

impl Window {
    pub fn new(config: &WindowConfig) -> Result<Self> {
        let event_loop = EventLoop::new().context("Failed to create event loop")?;

        let mut attributes = WindowAttributes::default()
            .with_title(&config.title)
            .with_inner_size(PhysicalSize::new(config.width, config.height))
            .with_resizable(true);
        if config.fullscreen {
            attributes = attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let mut window = Self {
            event_loop,
            state: WindowState::new(attributes, config.fullscreen),
        };

        // The window itself is created from `resumed`
        while window.state.window.is_none() {
            let status = window
                .event_loop
                .pump_app_events(Some(Duration::from_millis(16)), &mut window.state);
            if let Some(e) = window.state.create_error.take() {
                return Err(e).context("Failed to create window");
            }
            if let PumpStatus::Exit(code) = status {
                bail!("Event loop exited with code {code} before the window was created");
            }
        }

        Ok(window)
    }

    /// Process pending events without blocking
    pub fn poll_events(&mut self) {
        let status = self
            .event_loop
            .pump_app_events(Some(Duration::ZERO), &mut self.state);
        if let PumpStatus::Exit(_) = status {
            self.state.close_requested = true;
        }
    }

    pub fn set_title(&self, title: &str) {
        if let Some(window) = &self.state.window {
            window.set_title(title);
        }
    }

    fn winit_window(&self) -> Result<&winit::window::Window> {
        self.state.window.as_ref().context("Window not created")
    }

    /// Instance extensions the platform needs to present to this window
    pub fn required_extensions(&self) -> Result<&'static [*const c_char]> {
        let display = self.winit_window()?.raw_display_handle();
        ash_window::enumerate_required_extensions(display)
            .context("Failed to query surface extensions")
    }

    pub fn create_surface(
        &self,
        entry: &ash::Entry,
        instance: &ash::Instance,
    ) -> Result<vk::SurfaceKHR> {
        let window = self.winit_window()?;
        let surface = unsafe {
            ash_window::create_surface(
                entry,
                instance,
                window.raw_display_handle(),
                window.raw_window_handle(),
                None,
            )
        }
        .context("Failed to create window surface")?;
        Ok(surface)
    }
}

impl WindowSurface for Window {
    fn extent(&self) -> vk::Extent2D {
        self.state.extent
    }

    fn should_close(&self) -> bool {
        self.state.close_requested
    }

    fn was_resized(&self) -> bool {
        self.state.resized
    }

    fn reset_resized_flag(&mut self) {
        self.state.resized = false;
    }

    fn wait_events(&mut self) {
        let status = self.event_loop.pump_app_events(None, &mut self.state);
        if let PumpStatus::Exit(_) = status {
            self.state.close_requested = true;
        }
    }
}

impl InputState for Window {
    fn key_held(&self, key: KeyCode) -> bool {
        self.state.keys.contains(&key)
    }

    fn mouse_button_held(&self, button: MouseButton) -> bool {
        self.state.buttons.contains(&button)
    }

    fn take_mouse_delta(&mut self) -> (f64, f64) {
        std::mem::take(&mut self.state.mouse_delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> WindowState {
        WindowState::new(WindowAttributes::default(), false)
    }

    #[test]
    fn resize_updates_extent_and_flag() {
        let mut s = state();
        s.on_resize(PhysicalSize::new(1024, 0));
        assert_eq!((s.extent.width, s.extent.height), (1024, 0));
        assert!(s.resized);
    }

    #[test]
    fn keys_are_held_until_released() {
        let mut s = state();
        s.on_key(KeyCode::KeyW, true, false);
        s.on_key(KeyCode::KeyW, true, true);
        assert!(s.keys.contains(&KeyCode::KeyW));
        s.on_key(KeyCode::KeyW, false, false);
        assert!(!s.keys.contains(&KeyCode::KeyW));
        assert!(!s.close_requested);
    }

    #[test]
    fn escape_requests_close() {
        let mut s = state();
        s.on_key(KeyCode::Escape, true, false);
        assert!(s.close_requested);
    }

    #[test]
    fn f11_toggles_fullscreen_flag_without_a_window() {
        let mut s = state();
        s.on_key(KeyCode::F11, true, false);
        assert!(s.fullscreen);
        // Auto-repeat does not toggle again
        s.on_key(KeyCode::F11, true, true);
        assert!(s.fullscreen);
        s.on_key(KeyCode::F11, false, false);
        s.on_key(KeyCode::F11, true, false);
        assert!(!s.fullscreen);
    }

    #[test]
    fn mouse_buttons_track_press_state() {
        let mut s = state();
        s.on_mouse_button(MouseButton::Right, true);
        assert!(s.buttons.contains(&MouseButton::Right));
        s.on_mouse_button(MouseButton::Right, false);
        assert!(s.buttons.is_empty());
    }
}
