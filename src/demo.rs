//! The bundled demo: a room, a walking robot and a single picture.

use crate::{
    app::{self, AppOptions},
    gallery::{Gallery, RobotParams},
    options::{GalleryOptions, ItemData, Position},
    resources::animation::AnimationMixer,
};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

pub fn options() -> AppOptions {
    AppOptions {
        gallery: GalleryOptions {
            debug: true,
            camera_position: Position::new(0.0, 1.5, 0.0),
            camera_look_at: Position::new(2.0, 1.5, 2.0),
            ..Default::default()
        },
        title: "Gallery demo".into(),
        ..Default::default()
    }
}

pub fn items() -> Vec<ItemData> {
    vec![ItemData {
        url: "pictures2/1.jpg".into(),
        id: "1".into(),
        position: Position::new(50.784, 5.1687, 48.832),
        scale: Position::new(1.0, 1.0, 1.0),
        rotation: Position::default(),
    }]
}

pub fn setup(gallery: &mut Gallery) {
    let room_position = Position::new(0.0, -10.0, 0.0);
    let _room = gallery.load_gallery("room1/msg.gltf", room_position, 10.0, |progress| {
        log::debug!("room: {}/{:?} bytes", progress.loaded, progress.total);
    });

    let mut robot = gallery.load_robot(
        RobotParams {
            position: Position::new(0.0, -5.0, 0.0),
            scale: 3.0,
            ..RobotParams::new("robot/robot.glb")
        },
        |_| {},
    );
    // Start the first clip once the robot is in.
    let mut mixer: Option<AnimationMixer> = None;
    gallery.add_animate(move |dt, graph| {
        if mixer.is_none() {
            match robot.try_take() {
                Some(Ok(handle)) => {
                    let mut fresh = AnimationMixer::new();
                    if let Some(clip) = handle.animations.first() {
                        fresh.clip_action(clip).set_duration(5.0).play();
                    }
                    mixer = Some(fresh);
                }
                Some(Err(_)) => mixer = Some(AnimationMixer::new()),
                None => {}
            }
        }
        if let Some(mixer) = &mut mixer {
            mixer.update(dt.as_secs_f32(), graph);
        }
    });

    let _pictures = gallery.load_items(items());
}

pub fn run() -> anyhow::Result<()> {
    app::run(options(), setup)
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn run_web() -> Result<(), JsValue> {
    run().map_err(|e| JsValue::from_str(&e.to_string()))
}
