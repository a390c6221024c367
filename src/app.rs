//! The application shell.
//!
//! [`run`] opens a window (or binds to a canvas on the web), sets up the GPU
//! [`Context`] and a [`Gallery`] sized to it, and then drives everything from the
//! winit event loop:
//!
//! 1. window events are translated into [`InputEvent`]s and dispatched
//! 2. on every redraw the gallery advances by the elapsed time
//! 3. the scene graph is drawn and the next redraw is requested
//!
//! On native targets a tokio runtime is entered around each frame so pending
//! loads can reach the file system.

use std::sync::Arc;

use instant::Instant;
use winit::{
    application::ApplicationHandler,
    event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy},
    keyboard::{Key as WinitKey, NamedKey},
    window::Window,
};

use crate::{
    context::Context,
    error::Result,
    gallery::{Container, Gallery, PickCallback},
    input::{EventDispatcher, InputEvent, Key, SharedDispatcher},
    lightbox::{SystemLightbox, show_picked},
    options::{GalleryOptions, NodeData},
    render::Renderer,
};

#[cfg(target_arch = "wasm32")]
use crate::error::GalleryError;

/// Pixels of a precise scroll that make up one wheel notch.
const PIXELS_PER_NOTCH: f32 = 100.0;

type Setup = Box<dyn FnOnce(&mut Gallery)>;

#[derive(Debug, Clone)]
pub struct AppOptions {
    pub gallery: GalleryOptions,
    pub title: String,
    /// Id of the canvas element the gallery renders into on the web.
    pub container_id: String,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            gallery: GalleryOptions::default(),
            title: "Gallery".into(),
            container_id: "canvas".into(),
        }
    }
}

pub(crate) struct AppState {
    ctx: Context,
    renderer: Renderer,
    gallery: Gallery,
}

impl AppState {
    async fn new(
        window: Arc<Window>,
        options: GalleryOptions,
        dispatcher: SharedDispatcher,
        on_pick: PickCallback,
        setup: Setup,
    ) -> Result<Self> {
        let ctx = Context::new(window).await?;
        let renderer = Renderer::new(&ctx);
        let container = Container::new(ctx.config.width, ctx.config.height, dispatcher);
        let mut gallery = Gallery::new(container, options, on_pick)?;
        setup(&mut gallery);
        Ok(Self {
            ctx,
            renderer,
            gallery,
        })
    }

    fn resize(&mut self, width: u32, height: u32, dispatcher: &SharedDispatcher) {
        if width == 0 || height == 0 {
            return;
        }
        self.ctx.resize(width, height);
        dispatcher
            .borrow_mut()
            .dispatch(&InputEvent::Resized { width, height });
    }
}

pub(crate) enum AppEvent {
    #[allow(dead_code)]
    Initialized(Result<AppState>),
}

pub struct App {
    #[cfg(not(target_arch = "wasm32"))]
    async_runtime: tokio::runtime::Runtime,
    #[allow(dead_code)]
    proxy: EventLoopProxy<AppEvent>,
    dispatcher: SharedDispatcher,
    // taken on the first resume
    startup: Option<(AppOptions, PickCallback, Setup)>,
    state: Option<AppState>,
    pointer: (f32, f32),
    last_time: Instant,
}

impl App {
    fn new(
        event_loop: &EventLoop<AppEvent>,
        options: AppOptions,
        on_pick: PickCallback,
        setup: Setup,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            #[cfg(not(target_arch = "wasm32"))]
            async_runtime: tokio::runtime::Runtime::new()?,
            proxy: event_loop.create_proxy(),
            dispatcher: EventDispatcher::shared(),
            startup: Some((options, on_pick, setup)),
            state: None,
            pointer: (0.0, 0.0),
            last_time: Instant::now(),
        })
    }

    fn initialized(&mut self, event_loop: &ActiveEventLoop, state: Result<AppState>) {
        match state {
            Ok(mut state) => {
                let size = state.ctx.window.inner_size();
                state.resize(size.width, size.height, &self.dispatcher);
                state.ctx.window.request_redraw();
                self.last_time = Instant::now();
                self.state = Some(state);
            }
            Err(e) => {
                log::error!("Unable to start the gallery: {e}");
                event_loop.exit();
            }
        }
    }

    fn dispatch(&self, event: InputEvent) {
        self.dispatcher.borrow_mut().dispatch(&event);
    }
}

impl ApplicationHandler<AppEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let Some((options, on_pick, setup)) = self.startup.take() else {
            return;
        };

        #[allow(unused_mut)]
        let mut window_attributes = Window::default_attributes().with_title(options.title.clone());

        #[cfg(target_arch = "wasm32")]
        {
            use wasm_bindgen::JsCast;
            use winit::platform::web::WindowAttributesExtWebSys;

            let canvas = wgpu::web_sys::window()
                .and_then(|window| window.document())
                .and_then(|document| document.get_element_by_id(&options.container_id));
            let Some(canvas) = canvas else {
                log::error!("{}", GalleryError::MissingContainer(options.container_id));
                event_loop.exit();
                return;
            };
            window_attributes = window_attributes.with_canvas(Some(canvas.unchecked_into()));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Unable to create a window: {e}");
                event_loop.exit();
                return;
            }
        };

        let init_future = AppState::new(
            window,
            options.gallery,
            self.dispatcher.clone(),
            on_pick,
            setup,
        );

        #[cfg(not(target_arch = "wasm32"))]
        {
            let state = self.async_runtime.block_on(init_future);
            self.initialized(event_loop, state);
        }

        #[cfg(target_arch = "wasm32")]
        {
            let proxy = self.proxy.clone();
            wasm_bindgen_futures::spawn_local(async move {
                let state = init_future.await;
                if proxy.send_event(AppEvent::Initialized(state)).is_err() {
                    log::error!("event loop closed before the gallery was ready");
                }
            });
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: AppEvent) {
        match event {
            // This is the message from our wasm `spawn_local`
            AppEvent::Initialized(state) => self.initialized(event_loop, state),
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        if self.state.is_none() {
            if matches!(event, WindowEvent::CloseRequested) {
                event_loop.exit();
            }
            return;
        }

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                if let Some(state) = &mut self.state {
                    state.resize(size.width, size.height, &self.dispatcher);
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.pointer = (position.x as f32, position.y as f32);
                let (x, y) = self.pointer;
                self.dispatch(InputEvent::PointerMove { x, y });
            }
            WindowEvent::MouseInput {
                state: button_state,
                button: MouseButton::Left,
                ..
            } => {
                let (x, y) = self.pointer;
                self.dispatch(match button_state {
                    ElementState::Pressed => InputEvent::PointerDown { x, y },
                    ElementState::Released => InputEvent::PointerUp { x, y },
                });
            }
            WindowEvent::MouseWheel { delta, .. } => {
                self.dispatch(InputEvent::Wheel {
                    delta: wheel_notches(delta),
                });
            }
            WindowEvent::KeyboardInput { event, .. } => {
                self.dispatch(InputEvent::Key {
                    key: translate_key(&event.logical_key),
                    pressed: event.state.is_pressed(),
                });
            }
            WindowEvent::RedrawRequested => {
                let dt = self.last_time.elapsed();
                self.last_time = Instant::now();
                let Some(state) = &mut self.state else {
                    return;
                };
                {
                    #[cfg(not(target_arch = "wasm32"))]
                    let _guard = self.async_runtime.enter();
                    state.gallery.frame(dt);
                }
                match state
                    .renderer
                    .render(&state.ctx, state.gallery.graph(), state.gallery.camera())
                {
                    Ok(()) => {}
                    // Reconfigure the surface if it's lost or outdated
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                        let size = state.ctx.window.inner_size();
                        state.resize(size.width, size.height, &self.dispatcher);
                    }
                    Err(e) => {
                        log::error!("Unable to render {}", e);
                    }
                }
                state.ctx.window.request_redraw();
            }
            _ => {}
        }
    }
}

/// Map a winit key to the keys the gallery understands.
pub fn translate_key(key: &WinitKey) -> Key {
    match key {
        WinitKey::Character(s) => s.chars().next().map(Key::Char).unwrap_or(Key::Other),
        WinitKey::Named(NamedKey::ArrowUp) => Key::ArrowUp,
        WinitKey::Named(NamedKey::ArrowDown) => Key::ArrowDown,
        WinitKey::Named(NamedKey::ArrowLeft) => Key::ArrowLeft,
        WinitKey::Named(NamedKey::ArrowRight) => Key::ArrowRight,
        WinitKey::Named(NamedKey::Escape) => Key::Escape,
        _ => Key::Other,
    }
}

/// Wheel notches, positive when scrolling away from the user.
pub fn wheel_notches(delta: MouseScrollDelta) -> f32 {
    match delta {
        MouseScrollDelta::LineDelta(_, y) => y,
        MouseScrollDelta::PixelDelta(position) => position.y as f32 / PIXELS_PER_NOTCH,
    }
}

/// Open the gallery in a window and show picked pictures in the system lightbox.
pub fn run(options: AppOptions, setup: impl FnOnce(&mut Gallery) + 'static) -> anyhow::Result<()> {
    let mut lightbox = SystemLightbox::new(&options.gallery.asset_root);
    run_with(options, move |data| show_picked(&mut lightbox, data), setup)
}

/// Like [`run`], with a custom pick handler.
pub fn run_with(
    options: AppOptions,
    on_pick: impl FnMut(&NodeData) + 'static,
    setup: impl FnOnce(&mut Gallery) + 'static,
) -> anyhow::Result<()> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        if let Err(e) = env_logger::try_init() {
            println!("Warning: Could not initialize logger: {}", e);
        };
    }

    #[cfg(target_arch = "wasm32")]
    {
        console_log::init_with_level(log::Level::Info)?;
    }

    let event_loop: EventLoop<AppEvent> = EventLoop::with_user_event().build()?;
    let mut app = App::new(&event_loop, options, Box::new(on_pick), Box::new(setup))?;
    event_loop.run_app(&mut app)?;

    Ok(())
}
