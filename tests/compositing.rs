use image::{Rgba, RgbaImage};

use imagine::components::anchor::{AnchorSet, HitTolerance};
use imagine::components::layers::{BlurStyle, ShapeStyle};
use imagine::{Color, Document, Layer, LayerKind, LayerType, Point, RasterImage};

const RED: Color = Color::rgba(255, 0, 0, 255);
const BLUE: Color = Color::rgba(0, 0, 255, 255);

fn black(w: u32, h: u32) -> Document {
    Document::new(RasterImage::from_rgba(RgbaImage::from_pixel(w, h, Rgba([0, 0, 0, 255]))))
}

fn gradient(w: u32, h: u32) -> Document {
    let pixels = RgbaImage::from_fn(w, h, |x, y| Rgba([(x * 7 % 256) as u8, (y * 3 % 256) as u8, ((x + y) % 256) as u8, 255]));
    Document::new(RasterImage::from_rgba(pixels))
}

fn solid_rect(fill: Color, a: (f32, f32), b: (f32, f32)) -> Layer {
    let style = ShapeStyle { width: 0.0, stroke: Color::TRANSPARENT, fill };
    Layer::rect(LayerKind::Rectangle(style), Point::new(a.0, a.1), Point::new(b.0, b.1))
}

fn blur(a: (f32, f32), b: (f32, f32)) -> Layer {
    let style = BlurStyle { box_radius: 0.0, gaussian: 10.0 };
    Layer::rect(LayerKind::Blur(style), Point::new(a.0, a.1), Point::new(b.0, b.1))
}

fn assert_positions(doc: &Document) {
    for (i, layer) in doc.layers().iter().enumerate() {
        assert_eq!(layer.position(), i);
    }
}

#[test]
fn positions_follow_stack_after_every_edit() {
    let mut doc = black(50, 50);
    let ids: Vec<_> = (0..5).map(|i| doc.add_layer(solid_rect(RED, (i as f32, 0.0), (10.0, 10.0)))).collect();
    assert_positions(&doc);
    doc.move_layer(ids[0], -2).unwrap();
    assert_positions(&doc);
    doc.move_layer(ids[4], 3).unwrap();
    assert_positions(&doc);
    doc.delete_layer(ids[2]).unwrap();
    assert_positions(&doc);
    doc.undo();
    assert_positions(&doc);
    doc.rollback(10);
    assert_positions(&doc);
}

#[test]
fn crop_moves_layer_into_new_coordinates() {
    let mut doc = black(100, 100);
    let id = doc.add_layer(solid_rect(RED, (10.0, 10.0), (50.0, 50.0)));
    assert!(doc.crop(5.0, 5.0, 60.0, 60.0));
    let anchors = doc.layer(id).unwrap().geometry().anchors();
    assert_eq!(anchors.position(0), Some(Point::new(5.0, 5.0)));
    assert_eq!(anchors.position(1), Some(Point::new(45.0, 45.0)));
    assert_eq!((doc.width(), doc.height()), (55, 55));
}

#[test]
fn quarter_turn_undo_is_byte_identical() {
    let mut doc = gradient(37, 21);
    let before = doc.image().pixels().clone();
    doc.rotate(90.0);
    assert_eq!((doc.width(), doc.height()), (21, 37));
    assert!(doc.undo());
    assert_eq!(doc.image().pixels(), &before);
}

#[test]
fn later_layer_paints_on_top() {
    let mut doc = black(60, 60);
    let a = doc.add_layer(solid_rect(RED, (10.0, 10.0), (40.0, 40.0)));
    let b = doc.add_layer(solid_rect(BLUE, (20.0, 20.0), (50.0, 50.0)));
    assert_eq!(doc.layer(a).unwrap().position(), 1);
    assert_eq!(doc.layer(b).unwrap().position(), 0);

    let out = doc.flatten();
    for y in 20..40 {
        for x in 20..40 {
            assert_eq!(*out.get_pixel(x, y), Rgba([0, 0, 255, 255]));
        }
    }
    assert_eq!(*out.get_pixel(15, 15), Rgba([255, 0, 0, 255]));
}

#[test]
fn blur_sees_only_layers_beneath_it() {
    // blur added first sits below the rectangle
    let mut doc = black(60, 60);
    doc.add_layer(blur((10.0, 10.0), (50.0, 50.0)));
    doc.add_layer(solid_rect(RED, (20.0, 20.0), (40.0, 40.0)));
    let out = doc.flatten();
    assert_eq!(*out.get_pixel(15, 30), Rgba([0, 0, 0, 255]));

    let mut doc = black(60, 60);
    doc.add_layer(solid_rect(RED, (20.0, 20.0), (40.0, 40.0)));
    doc.add_layer(blur((10.0, 10.0), (50.0, 50.0)));
    let out = doc.flatten();
    assert!(out.get_pixel(15, 30)[0] > 0);
    // outside the blur region nothing changes
    assert_eq!(*out.get_pixel(5, 30), Rgba([0, 0, 0, 255]));
}

#[test]
fn linked_anchors_keep_their_offset() {
    let mut set = AnchorSet::new(2);
    set.set_position(0, 10.0, 10.0);
    set.set_position(1, 30.0, 25.0);
    set.link(0, 1);

    let tol = HitTolerance::new(8.0, 100.0);
    assert_eq!(set.grab(10.0, 10.0, tol), Some(0));
    set.drag(13.0, 17.0);
    set.release(14.0, 18.0);
    assert_eq!(set.position(0), Some(Point::new(14.0, 18.0)));
    assert_eq!(set.position(1), Some(Point::new(34.0, 33.0)));
}

#[test]
fn incomplete_layers_render_nothing() {
    let mut doc = gradient(40, 40);
    let base = doc.image().pixels().clone();
    for t in LayerType::ALL {
        let mut layer = Layer::with_type(t, doc.config());
        if layer.geometry().anchors().len() > 1 {
            // one anchor set, the rest left unset
            layer.geometry_mut().place(0, Point::new(5.0, 5.0));
        }
        doc.add_layer(layer);
    }
    assert_eq!(doc.flatten(), base);
}

#[test]
fn rectangle_is_confined_to_its_bounds() {
    let mut doc = gradient(200, 200);
    let base = doc.image().pixels().clone();
    let mut layer = Layer::with_type(LayerType::Rectangle, doc.config());
    layer.set_property("fill_color", imagine::PropertyValue::Color(RED)).unwrap();
    layer.set_property("stroke_color", imagine::PropertyValue::Color(Color::TRANSPARENT)).unwrap();
    layer.geometry_mut().place(0, Point::new(20.0, 20.0));
    layer.geometry_mut().place(1, Point::new(80.0, 80.0));
    doc.add_layer(layer);

    let out = doc.flatten();
    for (x, y, px) in out.enumerate_pixels() {
        let inside = (20..80).contains(&x) && (20..80).contains(&y);
        if inside {
            assert_eq!(*px, Rgba([255, 0, 0, 255]), "({x},{y})");
        } else {
            assert_eq!(px, base.get_pixel(x, y), "({x},{y})");
        }
    }
}

#[test]
fn blur_follows_content_moved_beneath_it() {
    let mut doc = black(100, 60);
    let rect = doc.add_layer(solid_rect(RED, (20.0, 20.0), (40.0, 40.0)));
    doc.add_layer(blur((0.0, 0.0), (100.0, 60.0)));
    let before = doc.flatten();

    doc.layer_mut(rect).unwrap().translate(15.0, 0.0);
    let after = doc.flatten();

    // the rect now covers x=35..55
    assert!(after.get_pixel(50, 30)[0] > before.get_pixel(50, 30)[0] + 100);
    assert!(after.get_pixel(25, 30)[0] < before.get_pixel(25, 30)[0]);
    assert!(!doc.layers()[0].needs_recompute());
}
