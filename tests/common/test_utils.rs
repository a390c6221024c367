use std::{cell::RefCell, path::Path, rc::Rc, time::Duration};

use tempfile::TempDir;
use vr_gallery::{
    Container, EventDispatcher, Gallery, GalleryOptions, InputEvent, NodeData, Position,
    input::SharedDispatcher,
};

pub const WIDTH: u32 = 800;
pub const HEIGHT: u32 = 600;
pub const FRAME: Duration = Duration::from_millis(16);

/// A 40x40 room once loaded at scale 10: a floor named like the teleport floor and
/// one wall at z = 20 facing the origin.
pub const ROOM_OBJ: &str = "\
o meishu01
v -2 0 -2
v 2 0 -2
v 2 0 2
v -2 0 2
f 1 3 2
f 1 4 3
o wall
v -2 0 2
v 2 0 2
v 2 2 2
v -2 2 2
f 5 7 6
f 5 8 7
";

pub fn asset_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("room.obj"), ROOM_OBJ).unwrap();
    std::fs::create_dir(dir.path().join("pictures")).unwrap();
    image::RgbaImage::from_pixel(4, 4, image::Rgba([200, 30, 30, 255]))
        .save(dir.path().join("pictures/red.png"))
        .unwrap();
    dir
}

pub fn options(root: &Path) -> GalleryOptions {
    GalleryOptions {
        camera_position: Position::new(0.0, 1.5, 0.0),
        camera_look_at: Position::new(0.0, 1.5, 1.0),
        asset_root: root.to_path_buf(),
        ..Default::default()
    }
}

pub struct Harness {
    pub dispatcher: SharedDispatcher,
    pub gallery: Gallery,
    pub picked: Rc<RefCell<Vec<NodeData>>>,
}

impl Harness {
    pub fn new(options: GalleryOptions) -> Self {
        let dispatcher = EventDispatcher::shared();
        let picked = Rc::new(RefCell::new(Vec::new()));
        let sink = picked.clone();
        let gallery = Gallery::new(
            Container::new(WIDTH, HEIGHT, dispatcher.clone()),
            options,
            move |data| sink.borrow_mut().push(data.clone()),
        )
        .unwrap();
        Self {
            dispatcher,
            gallery,
            picked,
        }
    }

    /// Run frames until every load has been attached.
    pub async fn settle(&mut self) {
        for _ in 0..500 {
            self.gallery.frame(FRAME);
            if self.gallery.pending_loads() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("loads did not finish");
    }

    pub fn send(&mut self, event: InputEvent) {
        self.dispatcher.borrow_mut().dispatch(&event);
    }

    pub fn click(&mut self, (x, y): (f32, f32)) {
        self.send(InputEvent::PointerDown { x, y });
        self.send(InputEvent::PointerUp { x, y });
        self.gallery.frame(FRAME);
    }
}
