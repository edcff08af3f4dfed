use proptest::prelude::*;

use spritefe::canvas::{Point, RasterBuffer, Size, Surface};
use spritefe::components::layers::{Frame, Layer};
use spritefe::error::DocError;
use spritefe::ops::shapes::{flood_fill, line_points, shift_wrapped};
use spritefe::registry::ClassRegistry;
use spritefe::sprite::SpriteImage;

fn image(w: u32, h: u32, layers: usize, frames: usize) -> SpriteImage {
    let mut img = SpriteImage::new("laws", Size::new(w, h)).unwrap();
    for i in 0..layers {
        img.append_layer(Layer::pixel(&format!("L{}", i)).unwrap()).unwrap();
    }
    for i in 0..frames {
        img.append_frame(Frame::new(&format!("F{}", i), 100).unwrap()).unwrap();
    }
    img
}

fn ids(img: &SpriteImage) -> (String, String) {
    (img.layers()[0].id(), img.frames()[0].id())
}

fn pixels(img: &mut SpriteImage, layer: &str, frame: &str) -> Vec<i32> {
    img.get_pixel_surface(layer, frame)
        .unwrap()
        .clone_data()
        .data()
        .to_vec()
}

#[test]
fn lazy_buffers_are_independent_per_frame() {
    let mut img = image(10, 10, 1, 1);
    let second = img.add_empty_frame().unwrap();
    let (layer, first) = ids(&img);

    img.get_pixel_surface(&layer, &first)
        .unwrap()
        .set_pixel(Point::new(0, 0), 8)
        .unwrap();

    let surface = img.get_pixel_surface(&layer, &first).unwrap();
    assert_eq!(surface.get_pixel(Point::new(0, 0)).unwrap(), 8);
    let surface = img.get_pixel_surface(&layer, &second.id()).unwrap();
    assert_eq!(surface.get_pixel(Point::new(0, 0)).unwrap(), -1);
}

#[test]
fn surface_bounds_are_checked() {
    let (w, h) = (6, 4);
    let mut img = image(w, h, 1, 1);
    let (layer, frame) = ids(&img);
    let mut surface = img.get_pixel_surface(&layer, &frame).unwrap();

    for p in [Point::new(-1, 0), Point::new(w as i32, 0)] {
        assert!(matches!(surface.get_pixel(p), Err(DocError::OutOfBounds { .. })));
        assert!(matches!(surface.set_pixel(p, 1), Err(DocError::OutOfBounds { .. })));
    }
    for p in [Point::new(0, 0), Point::new(w as i32 - 1, h as i32 - 1)] {
        surface.set_pixel(p, 2).unwrap();
        assert_eq!(surface.get_pixel(p).unwrap(), 2);
    }
}

#[test]
fn flood_fill_covers_uniform_grid() {
    let mut buffer = RasterBuffer::filled(Size::new(5, 5), 0);
    flood_fill(&mut buffer, Point::new(0, 0), 1).unwrap();
    assert!(buffer.data().iter().all(|&v| v == 1));
    assert_eq!(buffer.data().len(), 25);
}

#[test]
fn flood_fill_stops_at_region_border() {
    let mut buffer = RasterBuffer::filled(Size::new(5, 5), 0);
    for y in 0..5 {
        buffer.set_pixel(Point::new(2, y), 7).unwrap();
    }
    flood_fill(&mut buffer, Point::new(0, 0), 1).unwrap();
    assert_eq!(buffer.get_pixel(Point::new(1, 4)).unwrap(), 1);
    assert_eq!(buffer.get_pixel(Point::new(2, 2)).unwrap(), 7);
    assert_eq!(buffer.get_pixel(Point::new(3, 0)).unwrap(), 0);
}

#[test]
fn line_is_endpoint_order_independent() {
    let (a, b) = (Point::new(0, 0), Point::new(5, 2));
    let mut forward = line_points(a, b);
    let mut backward = line_points(b, a);
    forward.sort_by_key(|p| (p.x, p.y));
    backward.sort_by_key(|p| (p.x, p.y));
    assert_eq!(forward, backward);
    assert!(forward.contains(&a) && forward.contains(&b));
}

#[test]
fn history_truncation_after_undo() {
    let mut img = image(8, 1, 1, 1);
    let (layer, frame) = ids(&img);
    let key = img.pixel_key(&layer, &frame).unwrap();
    let n = 5;
    for x in 0..n {
        let mut surface = img.get_pixel_surface(&layer, &frame).unwrap();
        let before = surface.clone_data();
        surface.set_pixel(Point::new(x, 0), x + 1).unwrap();
        img.commit_change(&key, before, "px").unwrap();
    }
    assert_eq!(img.history().position(), n as isize - 1);

    let k = 2;
    for _ in 0..k {
        img.undo().unwrap();
    }
    let mut surface = img.get_pixel_surface(&layer, &frame).unwrap();
    let before = surface.clone_data();
    surface.set_pixel(Point::new(7, 0), 9).unwrap();
    img.commit_change(&key, before, "new").unwrap();

    assert_eq!(img.history().len(), (n - k) as usize + 1);
    assert_eq!(img.history().position(), (n - k) as isize);
    assert_eq!(img.redo().unwrap(), None);
    assert_eq!(pixels(&mut img, &layer, &frame)[4], -1);
}

#[test]
fn serialized_image_round_trips() {
    let reg = ClassRegistry::with_builtin_classes().unwrap();
    let mut img = image(3, 2, 2, 3);
    img.layers()[1].set_opacity(0.5).unwrap();
    img.frames()[2].set_duration(250).unwrap();
    let keys = img.pixel_keys();
    for (i, key) in keys.iter().enumerate() {
        let mut surface = img.get_pixel_surface(&key.layer, &key.frame).unwrap();
        surface.set_pixel(Point::new(i as i32 % 3, 1), i as i32).unwrap();
    }

    let json = img.serialize(&reg, false).unwrap();
    let mut back = SpriteImage::deserialize(&reg, &json).unwrap();

    assert_eq!(back.size(), img.size());
    assert_eq!(back.layers()[1].opacity(), 0.5);
    assert_eq!(back.frames()[2].duration(), 250);
    for key in keys {
        assert_eq!(
            pixels(&mut back, &key.layer, &key.frame),
            pixels(&mut img, &key.layer, &key.frame)
        );
    }
}

proptest! {
    #[test]
    fn shift_then_unshift_is_identity(
        w in 1u32..9,
        h in 1u32..9,
        dx in -40i32..40,
        dy in -40i32..40,
        seed in proptest::collection::vec(-1i32..16, 64),
    ) {
        let data: Vec<i32> = (0..(w * h) as usize).map(|i| seed[i % seed.len()]).collect();
        let buffer = RasterBuffer::from_raw(Size::new(w, h), data).unwrap();
        let shifted = shift_wrapped(&buffer, dx, dy).unwrap();
        let back = shift_wrapped(&shifted, -dx, -dy).unwrap();
        prop_assert_eq!(back, buffer);
    }

    #[test]
    fn undo_redo_reproduce_every_state(
        edits in proptest::collection::vec((0i32..6, 0i32..4, 0i32..16), 1..12),
    ) {
        let mut img = image(6, 4, 1, 1);
        let (layer, frame) = ids(&img);
        let key = img.pixel_key(&layer, &frame).unwrap();

        let mut states = vec![pixels(&mut img, &layer, &frame)];
        for (x, y, c) in &edits {
            let mut surface = img.get_pixel_surface(&layer, &frame).unwrap();
            let before = surface.clone_data();
            surface.set_pixel(Point::new(*x, *y), *c).unwrap();
            if img.commit_change(&key, before, "edit").unwrap() {
                states.push(pixels(&mut img, &layer, &frame));
            }
        }
        let applied = states.len() - 1;
        prop_assert_eq!(img.history().len(), applied);

        for i in (0..applied).rev() {
            img.undo().unwrap();
            prop_assert_eq!(&pixels(&mut img, &layer, &frame), &states[i]);
        }
        prop_assert_eq!(img.history().position(), -1);

        for state in states.iter().skip(1) {
            img.redo().unwrap();
            prop_assert_eq!(&pixels(&mut img, &layer, &frame), state);
        }
        prop_assert_eq!(img.history().position(), applied as isize - 1);
    }
}
