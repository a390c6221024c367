//! The gallery controller.
//!
//! A [`Gallery`] owns the scene graph, the camera and everything that moves it.
//! Loads are started with [`Gallery::load_gallery`], [`Gallery::load_robot`] and
//! [`Gallery::load_items`]; each returns a [`Pending`] handle right away while the
//! actual work is polled from [`Gallery::frame`]. Nothing blocks a frame, so the
//! scene stays interactive while assets are still arriving.
//!
//! ```ignore
//! let dispatcher = EventDispatcher::shared();
//! let container = Container::new(800, 600, dispatcher.clone());
//! let mut gallery = Gallery::new(container, GalleryOptions::default(), |data| {
//!     log::info!("picked {}", data.id());
//! })?;
//! let room = gallery.load_gallery("room1/msg.gltf", Position::new(0.0, -10.0, 0.0), 10.0, |_| {});
//! loop {
//!     gallery.frame(Duration::from_millis(16));
//! }
//! ```

use std::{
    cell::RefCell,
    collections::{HashMap, VecDeque},
    future::Future,
    pin::Pin,
    rc::Rc,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use cgmath::{EuclideanSpace, Point3, Transform, Vector3};
use futures::{
    FutureExt, StreamExt,
    channel::oneshot,
    future::LocalBoxFuture,
    stream::FuturesUnordered,
};
use image::RgbaImage;

use crate::{
    camera::{Camera, orbit::OrbitControls},
    collision::{Triangle, octree::Octree},
    data_structures::{
        geometry::{MeshData, fit_within},
        instance::Instance,
        scene_graph::{NodeId, SceneGraph},
        skin::update_skins,
    },
    error::{GalleryError, Result},
    gizmo::{TransformGizmo, TransformRecord},
    input::{EventKind, InputEvent, Key, Listener, MovementKeys, SharedDispatcher},
    options::{GalleryOptions, ItemData, NavigationMode, NodeData, Position},
    pick::{self, ClickTracker},
    player::Player,
    resources::{AssetLoaders, AssetSource, LoadProgress, LoadedModel, animation::AnimationClip},
};

/// The id the robot entity is tagged with.
pub const ROBOT_ID: &str = "robot";

pub type PickCallback = Box<dyn FnMut(&NodeData)>;
pub type AnimateCallback = Box<dyn FnMut(Duration, &mut SceneGraph)>;

/// Finishes a load against the scene. Produced by a completed load future.
type Attach = Box<dyn FnOnce(&mut Scene)>;

/// The surface a gallery draws into and receives input from.
#[derive(Debug, Clone)]
pub struct Container {
    /// Physical pixels.
    pub width: u32,
    pub height: u32,
    pub dispatcher: SharedDispatcher,
}

impl Container {
    pub fn new(width: u32, height: u32, dispatcher: SharedDispatcher) -> Self {
        Self {
            width,
            height,
            dispatcher,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RobotParams {
    pub url: String,
    pub position: Position,
    pub scale: f32,
    /// Euler XYZ, radians.
    pub rotation: Position,
    /// Whether clicking the robot reports it. Off unless asked for.
    pub pickable: bool,
}

impl RobotParams {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            position: Position::default(),
            scale: 1.0,
            rotation: Position::default(),
            pickable: false,
        }
    }
}

/// A robot that made it into the scene, with its clips retargeted at the scene's nodes.
#[derive(Debug, Clone)]
pub struct RobotHandle {
    pub node: NodeId,
    pub animations: Vec<AnimationClip>,
}

/// The eventual result of a load.
///
/// Dropping a `Pending` only discards the result; the load still completes and
/// its node is still added. Dropping the gallery resolves every outstanding
/// `Pending` with [`GalleryError::Cancelled`].
#[must_use = "a Pending does nothing unless awaited or polled, the load itself runs regardless"]
#[derive(Debug)]
pub struct Pending<T> {
    url: String,
    receiver: oneshot::Receiver<Result<T>>,
}

impl<T> Pending<T> {
    fn new(url: &str, receiver: oneshot::Receiver<Result<T>>) -> Self {
        Self {
            url: url.to_string(),
            receiver,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// The result if the load has finished, without waiting for it.
    pub fn try_take(&mut self) -> Option<Result<T>> {
        match self.receiver.try_recv() {
            Ok(result) => result,
            Err(oneshot::Canceled) => Some(Err(GalleryError::Cancelled(self.url.clone()))),
        }
    }
}

impl<T> Future for Pending<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.receiver.poll_unpin(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(oneshot::Canceled)) => {
                Poll::Ready(Err(GalleryError::Cancelled(self.url.clone())))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Length of the world axes shown in debug mode.
const AXES_LENGTH: f32 = 1000.0;
/// Length of the handle drawn on the node attached to the gizmo.
const HANDLE_LENGTH: f32 = 1.0;

/// World axes and the gizmo handle, added in debug mode. Neither is pickable
/// nor solid.
#[derive(Debug, Clone, Copy)]
struct DebugHelpers {
    handle: NodeId,
}

impl DebugHelpers {
    fn add(graph: &mut SceneGraph) -> Self {
        let root = graph.root();
        graph.add_mesh_node(
            root,
            "axes",
            Instance::new(),
            MeshData::axes(AXES_LENGTH, 0.05),
        );
        let handle = graph.add_mesh_node(
            root,
            "gizmo",
            Instance::new(),
            MeshData::axes(HANDLE_LENGTH, 0.03),
        );
        graph.node_mut(handle).visible = false;
        Self { handle }
    }

    /// Put the handle on `attached`, in its local frame, or hide it.
    fn follow(&self, graph: &mut SceneGraph, attached: Option<NodeId>) {
        let placement = attached
            .filter(|&node| graph.contains(node))
            .map(|node| graph.world_instance(node));
        let handle = graph.node_mut(self.handle);
        handle.visible = placement.is_some();
        if let Some(world) = placement {
            handle.local.position = world.position;
            handle.local.rotation = world.rotation;
        }
    }
}

/// The parts of the gallery a finished load writes to.
struct Scene {
    graph: SceneGraph,
    pickables: Vec<NodeId>,
    world: Octree,
    collide: bool,
}

impl Scene {
    /// Graft `model` below a new node placed at `placement`.
    fn attach_model(
        &mut self,
        name: &str,
        model: &LoadedModel,
        placement: Instance,
        data: Option<NodeData>,
        pickable: bool,
        collide: bool,
    ) -> (NodeId, HashMap<NodeId, NodeId>) {
        let root = self.graph.add_node(self.graph.root(), name, placement);
        self.graph.node_mut(root).data = data;
        let mapping = self.graph.graft(root, &model.graph);
        if pickable {
            self.pickables.push(root);
        }
        if collide && self.collide {
            let triangles = world_triangles(&self.graph, root);
            log::debug!("{name} adds {} triangles to the collision index", triangles.len());
            self.world.add_triangles(triangles);
            self.world.build();
        }
        log::info!("{name} added with {} nodes", mapping.len());
        (root, mapping)
    }

    fn attach_item(
        &mut self,
        item: ItemData,
        picture: Arc<RgbaImage>,
        max_size: f32,
        depth: f32,
    ) -> NodeId {
        let (width, height) = fit_within(picture.width(), picture.height(), max_size);
        let mesh = MeshData::picture_box(width, height, depth, picture);
        let mut placement = Instance::new()
            .with_position(item.position)
            .with_euler(item.rotation);
        placement.scale = item.scale.into();
        let id = self.graph.add_mesh_node(self.graph.root(), &item.id, placement, mesh);
        self.graph.node_mut(id).data = Some(NodeData::Item(item));
        self.pickables.push(id);
        id
    }
}

/// World space triangles of every mesh at or below `root`.
fn world_triangles(graph: &SceneGraph, root: NodeId) -> Vec<Triangle> {
    graph
        .descendants(root)
        .into_iter()
        .filter_map(|id| graph.node(id).mesh.as_ref().map(|mesh| (id, mesh)))
        .flat_map(|(id, mesh)| {
            let world = graph.world_matrix(id);
            mesh.triangles()
                .map(move |t| {
                    let [a, b, c] = t.map(|p| world.transform_point(Point3::from_vec(p)).to_vec());
                    Triangle::new(a, b, c)
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

pub struct Gallery {
    options: GalleryOptions,
    width: u32,
    height: u32,
    camera: Camera,
    controls: OrbitControls,
    /// Only in walking mode.
    player: Option<Player>,
    scene: Scene,
    gizmo: TransformGizmo,
    helpers: Option<DebugHelpers>,
    clicks: ClickTracker,
    // last pointer position while a button is held
    drag_from: Option<(f32, f32)>,
    on_pick: PickCallback,
    animations: Vec<AnimateCallback>,
    loaders: Rc<AssetLoaders>,
    loads: FuturesUnordered<LocalBoxFuture<'static, Attach>>,
    input: Rc<RefCell<VecDeque<InputEvent>>>,
    _listeners: Vec<Listener>,
}

impl Gallery {
    pub fn new(
        container: Container,
        options: GalleryOptions,
        on_pick: impl FnMut(&NodeData) + 'static,
    ) -> Result<Self> {
        let Container {
            width,
            height,
            dispatcher,
        } = container;
        if width == 0 || height == 0 {
            return Err(GalleryError::InvalidContainer { width, height });
        }

        let eye: Point3<f32> = options.camera_position.into();
        let look_at: Point3<f32> = options.camera_look_at.into();
        let mut camera = Camera::new(eye, look_at, width, height);
        let mut controls = OrbitControls::new(options.controls.clone());
        controls.set_look_at(eye, look_at);
        controls.apply(&mut camera);

        let player = (options.mode == NavigationMode::Walking)
            .then(|| Player::new(eye, options.player.clone()));

        let input = Rc::new(RefCell::new(VecDeque::new()));
        let kinds = [
            EventKind::Pointer,
            EventKind::Wheel,
            EventKind::Keyboard,
            EventKind::Resized,
        ];
        let listeners = kinds
            .into_iter()
            .map(|kind| {
                let queue = input.clone();
                Listener::register(&dispatcher, kind, move |event| {
                    queue.borrow_mut().push_back(*event);
                    false
                })
            })
            .collect();

        log::info!("gallery {width}x{height} in {:?} mode", options.mode);
        let source = AssetSource::new(options.asset_root.clone());
        let loaders = Rc::new(AssetLoaders::new(source));
        let mut graph = SceneGraph::new("gallery");
        let helpers = options.debug.then(|| DebugHelpers::add(&mut graph));
        Ok(Self {
            scene: Scene {
                graph,
                pickables: Vec::new(),
                world: Octree::new(),
                collide: player.is_some(),
            },
            options,
            width,
            height,
            camera,
            controls,
            player,
            gizmo: TransformGizmo::new(),
            helpers,
            clicks: ClickTracker::new(),
            drag_from: None,
            on_pick: Box::new(on_pick),
            animations: Vec::new(),
            loaders,
            loads: FuturesUnordered::new(),
            input,
            _listeners: listeners,
        })
    }

    /// Load a room model, place it and make it clickable. In walking mode its
    /// geometry also becomes solid.
    pub fn load_gallery(
        &mut self,
        url: &str,
        position: Position,
        scale: f32,
        on_progress: impl FnMut(LoadProgress) + 'static,
    ) -> Pending<NodeId> {
        let placement = Instance::new().with_position(position).with_uniform_scale(scale);
        self.load_model(url, on_progress, move |scene, name, model| {
            scene.attach_model(name, model, placement, None, true, true).0
        })
    }

    /// Load an animated figure. It is tagged with [`ROBOT_ID`] and clickable only
    /// when `params.pickable` is set.
    pub fn load_robot(
        &mut self,
        params: RobotParams,
        on_progress: impl FnMut(LoadProgress) + 'static,
    ) -> Pending<RobotHandle> {
        let placement = Instance::new()
            .with_position(params.position)
            .with_uniform_scale(params.scale)
            .with_euler(params.rotation);
        let pickable = params.pickable;
        self.load_model(&params.url, on_progress, move |scene, name, model| {
            let data = Some(NodeData::Entity {
                id: ROBOT_ID.to_string(),
            });
            let (node, mapping) = scene.attach_model(name, model, placement, data, pickable, false);
            RobotHandle {
                node,
                animations: model
                .animations
                .iter()
                .map(|clip| clip.remap(&mapping))
                .collect(),
            }
        })
    }

    fn load_model<T: 'static>(
        &mut self,
        url: &str,
        mut on_progress: impl FnMut(LoadProgress) + 'static,
        attach: impl FnOnce(&mut Scene, &str, &LoadedModel) -> T + 'static,
    ) -> Pending<T> {
        let (sender, receiver) = oneshot::channel();
        let loaders = self.loaders.clone();
        let url = url.to_string();
        let pending = Pending::new(&url, receiver);
        self.loads.push(
            async move {
                let loaded = loaders.load_model(&url, &mut on_progress).await;
                Box::new(move |scene: &mut Scene| {
                    let result = loaded.map(|model| attach(scene, url.as_str(), model.as_ref()));
                    if let Err(e) = &result {
                        log::error!("{e}");
                    }
                    let _ = sender.send(result);
                }) as Attach
            }
            .boxed_local(),
        );
        pending
    }

    /// Hang framed pictures. Each item loads on its own; they appear in whatever
    /// order their images arrive.
    pub fn load_items(&mut self, items: Vec<ItemData>) -> Vec<Pending<NodeId>> {
        let max_size = self.options.item_max_size;
        let depth = self.options.item_depth;
        items
            .into_iter()
            .map(|item| {
                let (sender, receiver) = oneshot::channel();
                let pending = Pending::new(&item.url, receiver);
                let loaders = self.loaders.clone();
                self.loads.push(
                    async move {
                        let picture = loaders.load_picture(&item.url).await;
                        Box::new(move |scene: &mut Scene| {
                            let result = picture
                                .map(|picture| scene.attach_item(item, picture, max_size, depth));
                            if let Err(e) = &result {
                                log::error!("{e}");
                            }
                            let _ = sender.send(result);
                        }) as Attach
                    }
                    .boxed_local(),
                );
                pending
            })
            .collect()
    }

    /// Run `callback` every frame, after the camera has moved.
    pub fn add_animate(&mut self, callback: impl FnMut(Duration, &mut SceneGraph) + 'static) {
        self.animations.push(Box::new(callback));
    }

    /// Advance the gallery by `dt`.
    pub fn frame(&mut self, dt: Duration) {
        self.poll_loads();

        let events: Vec<InputEvent> = self.input.borrow_mut().drain(..).collect();
        for event in events {
            self.handle_event(event);
        }

        let seconds = dt.as_secs_f32();
        self.controls.update(seconds);
        self.controls.apply(&mut self.camera);
        if let Some(player) = &mut self.player {
            let eye = player.update(seconds, self.camera.direction, &self.scene.world);
            self.controls.move_to(eye);
            self.camera.eye = eye;
        }

        for animate in &mut self.animations {
            animate(dt, &mut self.scene.graph);
        }
        // callbacks may move joints without a mixer
        update_skins(&mut self.scene.graph);
        if let Some(helpers) = &self.helpers {
            helpers.follow(&mut self.scene.graph, self.gizmo.attached());
        }
    }

    fn poll_loads(&mut self) {
        // Loads are re-polled every frame, so nobody needs to be woken.
        let waker = futures::task::noop_waker();
        let mut cx = Context::from_waker(&waker);
        while let Poll::Ready(Some(attach)) = self.loads.poll_next_unpin(&mut cx) {
            attach(&mut self.scene);
        }
    }

    fn handle_event(&mut self, event: InputEvent) {
        match event {
            InputEvent::PointerDown { x, y } => self.pointer_down(x, y),
            InputEvent::PointerMove { x, y } => self.pointer_move(x, y),
            InputEvent::PointerUp { x, y } => self.pointer_up(x, y),
            InputEvent::Wheel { delta } => self.controls.wheel(delta),
            InputEvent::Key { key, pressed } => self.key(key, pressed),
            InputEvent::Resized { width, height } => self.resize(width, height),
        }
    }

    fn pointer_down(&mut self, x: f32, y: f32) {
        self.clicks.press(x, y);
        self.drag_from = Some((x, y));
        if let Some(player) = &mut self.player {
            player.pointer_down();
        }
        if self.options.debug && self.gizmo.attached().is_some() {
            let ndc = pick::pointer_to_ndc(x, y, self.width, self.height);
            let ray = self.camera.ray_from_ndc(ndc);
            let hit = pick::raycast(&self.scene.graph, &self.scene.pickables, &ray)
                .into_iter()
                .next();
            if let Some(hit) = hit {
                if self.gizmo.begin_drag(&self.scene.graph, hit.node, x, y) {
                    self.controls.enabled = false;
                }
            }
        }
    }

    fn pointer_move(&mut self, x: f32, y: f32) {
        if self.gizmo.is_dragging() {
            self.gizmo
                .drag_to(&mut self.scene.graph, &self.camera, self.height, x, y);
        } else if let Some((last_x, last_y)) = self.drag_from {
            self.controls.rotate(x - last_x, y - last_y, self.height as f32);
        }
        if self.drag_from.is_some() {
            self.drag_from = Some((x, y));
        }
    }

    fn pointer_up(&mut self, x: f32, y: f32) {
        self.drag_from = None;
        if self.gizmo.end_drag() {
            self.controls.enabled = true;
        }
        if let Some((x, y)) = self.clicks.release(x, y) {
            self.pick(x, y);
        }
    }

    fn key(&mut self, key: Key, pressed: bool) {
        if pressed && self.options.debug {
            self.gizmo.handle_key(&key);
        }
        if let (Some(player), Some(keys)) = (&mut self.player, MovementKeys::from_key(&key)) {
            player.set_key(keys, pressed);
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.width = width;
        self.height = height;
        self.camera.resize(width, height);
    }

    fn pick(&mut self, x: f32, y: f32) {
        let ray = self.camera.ray_from_ndc(pick::pointer_to_ndc(x, y, self.width, self.height));
        let Some(hit) = pick::raycast(&self.scene.graph, &self.scene.pickables, &ray)
            .into_iter()
            .next()
        else {
            log::trace!("click at ({x}, {y}) hit nothing");
            return;
        };

        let graph = &self.scene.graph;
        if self.options.teleport_node.as_deref() == Some(graph.node(hit.node).name.as_str()) {
            let target = pick::teleport_target(hit.point, self.options.eye_height);
            log::debug!("teleporting to {target:?}");
            self.teleport(target);
        }

        let graph = &self.scene.graph;
        let Some(tagged) = pick::find_tagged(graph, hit.node) else {
            log::trace!("{} carries no data", graph.node(hit.node).name);
            return;
        };
        if self.options.debug {
            self.gizmo.attach(tagged);
            TransformRecord::of(graph, tagged).log();
        } else if let Some(data) = &graph.node(tagged).data {
            (self.on_pick)(data);
        }
    }

    /// Move the viewer to `eye` keeping the view direction.
    pub fn teleport(&mut self, eye: Point3<f32>) {
        self.controls.move_to(eye);
        if let Some(player) = &mut self.player {
            player.teleport(eye);
        }
        self.controls.apply(&mut self.camera);
        self.camera.eye = eye;
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn graph(&self) -> &SceneGraph {
        &self.scene.graph
    }

    pub fn graph_mut(&mut self) -> &mut SceneGraph {
        &mut self.scene.graph
    }

    /// Roots whose meshes are hit-tested on click, in the order they were added.
    pub fn pickables(&self) -> &[NodeId] {
        &self.scene.pickables
    }

    pub fn collision_world(&self) -> &Octree {
        &self.scene.world
    }

    pub fn player(&self) -> Option<&Player> {
        self.player.as_ref()
    }

    pub fn gizmo(&self) -> &TransformGizmo {
        &self.gizmo
    }

    pub fn options(&self) -> &GalleryOptions {
        &self.options
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Loads that have not been attached yet.
    pub fn pending_loads(&self) -> usize {
        self.loads.len()
    }

    /// Where a world point ends up on screen, in pixels. `None` behind the camera.
    pub fn project(&self, point: Point3<f32>) -> Option<(f32, f32)> {
        let clip = self.camera.view_projection() * point.to_homogeneous();
        if clip.w <= 0.0 {
            return None;
        }
        let ndc = Vector3::new(clip.x, clip.y, clip.z) / clip.w;
        Some((
            (ndc.x + 1.0) / 2.0 * self.width as f32,
            (1.0 - ndc.y) / 2.0 * self.height as f32,
        ))
    }
}

impl Drop for Gallery {
    fn drop(&mut self) {
        if !self.loads.is_empty() {
            log::debug!("cancelling {} outstanding loads", self.loads.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, io::Cursor};

    use base64::Engine;
    use cgmath::InnerSpace;

    use super::*;
    use crate::input::EventDispatcher;

    fn picture_uri(width: u32, height: u32) -> String {
        let mut png = Vec::new();
        RgbaImage::from_pixel(width, height, image::Rgba([200, 30, 30, 255]))
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(png)
        )
    }

    fn item(id: &str, z: f32) -> ItemData {
        ItemData {
            url: picture_uri(4, 2),
            id: id.to_string(),
            position: Position::new(0.0, 0.0, z),
            scale: Position::new(1.0, 1.0, 1.0),
            rotation: Position::default(),
        }
    }

    fn gallery(options: GalleryOptions) -> (Gallery, SharedDispatcher, Rc<RefCell<Vec<NodeData>>>) {
        let dispatcher = EventDispatcher::shared();
        let picked = Rc::new(RefCell::new(Vec::new()));
        let sink = picked.clone();
        let container = Container::new(800, 600, dispatcher.clone());
        let gallery = Gallery::new(container, options, move |data| {
            sink.borrow_mut().push(data.clone())
        })
        .unwrap();
        (gallery, dispatcher, picked)
    }

    fn click(dispatcher: &SharedDispatcher, x: f32, y: f32, up_x: f32, up_y: f32) {
        let mut dispatcher = dispatcher.borrow_mut();
        dispatcher.dispatch(&InputEvent::PointerDown { x, y });
        dispatcher.dispatch(&InputEvent::PointerUp { x: up_x, y: up_y });
    }

    #[test]
    fn empty_containers_are_rejected() {
        let result = Gallery::new(
            Container::new(0, 600, EventDispatcher::shared()),
            GalleryOptions::default(),
            |_| {},
        );
        assert!(matches!(
            result,
            Err(GalleryError::InvalidContainer { width: 0, height: 600 })
        ));
    }

    #[test]
    fn camera_starts_at_the_configured_pose() {
        let options = GalleryOptions {
            camera_position: Position::new(0.0, 1.5, 0.0),
            camera_look_at: Position::new(2.0, 1.5, 2.0),
            ..Default::default()
        };
        let (gallery, _, _) = gallery(options);
        let camera = gallery.camera();
        assert!((camera.eye - Point3::new(0.0, 1.5, 0.0)).magnitude() < 1e-4);
        let expected = Vector3::new(1.0, 0.0, 1.0).normalize();
        assert!((camera.direction - expected).magnitude() < 1e-3);
    }

    #[test]
    fn clicking_an_item_reports_its_data() {
        let (mut gallery, dispatcher, picked) = gallery(GalleryOptions::default());
        let expected = item("1", -10.0);
        let mut pending = gallery.load_items(vec![expected.clone()]);
        gallery.frame(Duration::from_millis(16));
        let node = pending[0].try_take().unwrap().unwrap();
        assert_eq!(gallery.pickables(), &[node]);

        click(&dispatcher, 400.0, 300.0, 401.0, 302.0);
        gallery.frame(Duration::from_millis(16));
        assert_eq!(picked.borrow().as_slice(), &[NodeData::Item(expected)]);
    }

    #[test]
    fn drags_do_not_pick() {
        let (mut gallery, dispatcher, picked) = gallery(GalleryOptions::default());
        let _ = gallery.load_items(vec![item("1", -10.0)]);
        gallery.frame(Duration::from_millis(16));

        click(&dispatcher, 400.0, 300.0, 404.0, 300.0);
        gallery.frame(Duration::from_millis(16));
        assert!(picked.borrow().is_empty());
    }

    #[test]
    fn the_nearest_item_wins() {
        let (mut gallery, dispatcher, picked) = gallery(GalleryOptions::default());
        let _ = gallery.load_items(vec![item("far", -30.0), item("near", -10.0)]);
        gallery.frame(Duration::from_millis(16));

        click(&dispatcher, 400.0, 300.0, 400.0, 300.0);
        gallery.frame(Duration::from_millis(16));
        assert_eq!(picked.borrow().len(), 1);
        assert_eq!(picked.borrow()[0].id(), "near");
    }

    #[test]
    fn debug_mode_attaches_the_gizmo_instead() {
        let options = GalleryOptions {
            debug: true,
            ..Default::default()
        };
        let (mut gallery, dispatcher, picked) = gallery(options);
        let mut pending = gallery.load_items(vec![item("1", -10.0)]);
        gallery.frame(Duration::from_millis(16));
        let node = pending[0].try_take().unwrap().unwrap();

        click(&dispatcher, 400.0, 300.0, 400.0, 300.0);
        gallery.frame(Duration::from_millis(16));
        assert!(picked.borrow().is_empty());
        assert_eq!(gallery.gizmo().attached(), Some(node));
    }

    #[test]
    fn debug_helpers_follow_the_attached_node() {
        let options = GalleryOptions {
            debug: true,
            ..Default::default()
        };
        let (mut gallery, dispatcher, _) = gallery(options);
        let _ = gallery.load_items(vec![item("1", -10.0)]);
        gallery.frame(Duration::from_millis(16));

        let graph = gallery.graph();
        let axes = graph.find_by_name("axes").unwrap();
        let handle = graph.find_by_name("gizmo").unwrap();
        assert!(graph.is_visible(axes));
        assert!(!graph.is_visible(handle));
        assert!(!gallery.pickables().contains(&axes));

        click(&dispatcher, 400.0, 300.0, 400.0, 300.0);
        gallery.frame(Duration::from_millis(16));
        let graph = gallery.graph();
        assert!(graph.is_visible(handle));
        let at = graph.node(handle).local.position;
        assert!((at - Vector3::new(0.0, 0.0, -10.0)).magnitude() < 1e-4);

        dispatcher.borrow_mut().dispatch(&InputEvent::Key {
            key: Key::Escape,
            pressed: true,
        });
        gallery.frame(Duration::from_millis(16));
        assert_eq!(gallery.gizmo().attached(), None);
        assert!(!gallery.graph().is_visible(handle));
    }

    #[test]
    fn no_helpers_outside_debug_mode() {
        let (gallery, _, _) = gallery(GalleryOptions::default());
        assert!(gallery.graph().find_by_name("axes").is_none());
        assert_eq!(gallery.graph().len(), 1);
    }

    #[test]
    fn failed_pictures_resolve_to_errors() {
        let (mut gallery, _, _) = gallery(GalleryOptions::default());
        let mut broken = item("1", -10.0);
        broken.url = "data:image/png;base64,AAAA".to_string();
        let mut pending = gallery.load_items(vec![broken]);
        gallery.frame(Duration::from_millis(16));
        assert!(
            matches!(pending[0].try_take(), Some(Err(GalleryError::Parse { .. })))
        );
        assert!(gallery.pickables().is_empty());
    }

    #[test]
    fn animate_callbacks_run_every_frame() {
        let (mut gallery, _, _) = gallery(GalleryOptions::default());
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        gallery.add_animate(move |dt, _graph| {
            assert_eq!(dt, Duration::from_millis(16));
            counter.set(counter.get() + 1);
        });
        gallery.frame(Duration::from_millis(16));
        gallery.frame(Duration::from_millis(16));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn dropping_the_gallery_unregisters_and_cancels() {
        let (mut gallery, dispatcher, _) = gallery(GalleryOptions::default());
        assert_eq!(dispatcher.borrow_mut().callback_count(), 4);
        let mut pending =
            gallery.load_gallery("rooms/never.gltf", Position::default(), 1.0, |_| {});
        assert_eq!(gallery.pending_loads(), 1);

        drop(gallery);
        assert_eq!(dispatcher.borrow_mut().callback_count(), 0);
        assert_eq!(
            pending.try_take(),
            Some(Err(GalleryError::Cancelled("rooms/never.gltf".to_string())))
        );
    }

    #[test]
    fn resize_updates_the_aspect() {
        let (mut gallery, dispatcher, _) = gallery(GalleryOptions::default());
        dispatcher
            .borrow_mut()
            .dispatch(&InputEvent::Resized { width: 1000, height: 500 });
        gallery.frame(Duration::from_millis(16));
        assert_eq!(gallery.size(), (1000, 500));
        assert_eq!(gallery.camera().aspect, 2.0);
    }

    #[test]
    fn walking_keeps_the_eye_on_the_capsule() {
        let options = GalleryOptions {
            mode: NavigationMode::Walking,
            camera_position: Position::new(0.0, 1.5, 0.0),
            camera_look_at: Position::new(0.0, 1.5, -1.0),
            ..Default::default()
        };
        let (mut gallery, dispatcher, _) = gallery(options);
        dispatcher.borrow_mut().dispatch(&InputEvent::Key {
            key: Key::Char('w'),
            pressed: true,
        });
        for _ in 0..10 {
            gallery.frame(Duration::from_millis(16));
        }
        let player = gallery.player().unwrap();
        assert!(player.is_moving());
        assert_eq!(gallery.camera().eye, player.eye());
        // nothing to collide with, so the player walks straight ahead
        assert!(gallery.camera().eye.z < 0.0);
        assert!((gallery.camera().eye.y - 1.5).abs() < 1e-4);
    }
}
