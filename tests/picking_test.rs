use cgmath::{MetricSpace, Point3};
use vr_gallery::{ItemData, NodeData, Position};

mod common;

use common::test_utils::{Harness, asset_dir, options};

fn red_picture() -> ItemData {
    ItemData {
        url: "pictures/red.png".into(),
        id: "red".into(),
        position: Position::new(0.0, 5.0, 15.0),
        scale: Position::new(1.0, 1.0, 1.0),
        rotation: Position::default(),
    }
}

#[tokio::test]
async fn clicking_a_picture_reports_it_once() {
    let dir = asset_dir();
    let mut h = Harness::new(options(dir.path()));
    let room = h.gallery.load_gallery("room.obj", Position::default(), 10.0, |_| {});
    let pictures = h.gallery.load_items(vec![red_picture()]);
    h.settle().await;
    assert!(room.await.is_ok());
    for picture in pictures {
        assert!(picture.await.is_ok());
    }

    let target = h.gallery.project(Point3::new(0.0, 5.0, 15.0)).unwrap();
    h.click(target);

    let picked = h.picked.borrow();
    assert_eq!(picked.len(), 1);
    assert_eq!(picked[0], NodeData::Item(red_picture()));
}

#[tokio::test]
async fn clicking_the_floor_teleports_without_reporting() {
    let dir = asset_dir();
    let mut h = Harness::new(options(dir.path()));
    let _room = h.gallery.load_gallery("room.obj", Position::default(), 10.0, |_| {});
    h.settle().await;

    let target = h.gallery.project(Point3::new(0.0, 0.0, 10.0)).unwrap();
    h.click(target);

    let eye = h.gallery.camera().eye;
    assert!(
        eye.distance(Point3::new(0.0, 1.5, 10.0)) < 0.1,
        "eye at {eye:?}"
    );
    assert!(h.picked.borrow().is_empty());
}

#[tokio::test]
async fn clicking_the_wall_does_nothing() {
    let dir = asset_dir();
    let mut h = Harness::new(options(dir.path()));
    let _room = h.gallery.load_gallery("room.obj", Position::default(), 10.0, |_| {});
    h.settle().await;

    let target = h.gallery.project(Point3::new(3.0, 6.0, 20.0)).unwrap();
    h.click(target);

    assert!(
        h.gallery.camera().eye.distance(Point3::new(0.0, 1.5, 0.0)) < 1e-3
    );
    assert!(h.picked.borrow().is_empty());
}
