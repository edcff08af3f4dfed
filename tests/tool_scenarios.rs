use spritefe::canvas::{Bounds, Point, Size, Surface};
use spritefe::components::colors::Palette;
use spritefe::components::layers::{Frame, Layer};
use spritefe::components::tools::{Key, Overlay, Tool, ToolContext, ToolKind, Toolbox};
use spritefe::error::DocError;
use spritefe::settings::{EditorSettings, FreehandCommit};
use spritefe::sprite::SpriteImage;

struct Scene {
    image: SpriteImage,
    palette: Palette,
    layer: String,
    frame: String,
}

impl Scene {
    fn new(w: u32, h: u32) -> Self {
        let mut image = SpriteImage::new("scene", Size::new(w, h)).unwrap();
        let layer = Layer::pixel("Ink").unwrap();
        let frame = Frame::new("F1", 100).unwrap();
        image.append_layer(layer.clone()).unwrap();
        image.append_frame(frame.clone()).unwrap();
        Self {
            image,
            palette: Palette::default_palette().unwrap(),
            layer: layer.id(),
            frame: frame.id(),
        }
    }

    fn pixel(&mut self, x: i32, y: i32) -> i32 {
        self.image
            .get_pixel_surface(&self.layer, &self.frame)
            .unwrap()
            .get_pixel(Point::new(x, y))
            .unwrap()
    }

    fn drag(&mut self, tool: &mut Tool, color: i32, path: &[(i32, i32)]) {
        let mut ctx = ToolContext::new(&mut self.image, &self.palette)
            .with_layer(Some(self.layer.as_str()))
            .with_frame(Some(self.frame.as_str()))
            .with_color(color);
        let (first, rest) = path.split_first().unwrap();
        tool.mouse_down(&mut ctx, Point::new(first.0, first.1)).unwrap();
        for &(x, y) in rest {
            tool.mouse_move(&mut ctx, Point::new(x, y)).unwrap();
        }
        let &(x, y) = path.last().unwrap();
        tool.mouse_up(&mut ctx, Point::new(x, y)).unwrap();
    }
}

#[test]
fn pencil_commit_policies() {
    let path = [(0, 0), (3, 0), (3, 2)];

    let mut scene = Scene::new(8, 8);
    let mut pencil = Tool::new(ToolKind::Pencil, &EditorSettings::default()).unwrap();
    scene.drag(&mut pencil, 4, &path);
    assert_eq!(scene.image.history().len(), 3);
    assert_eq!(scene.pixel(2, 0), 4);

    let settings = EditorSettings {
        freehand_commit: FreehandCommit::PerGesture,
        ..EditorSettings::default()
    };
    let mut scene = Scene::new(8, 8);
    let mut pencil = Tool::new(ToolKind::Pencil, &settings).unwrap();
    scene.drag(&mut pencil, 4, &path);
    assert_eq!(scene.image.history().len(), 1);
    assert_eq!(scene.pixel(3, 1), 4);

    scene.image.undo().unwrap();
    assert_eq!(scene.pixel(3, 1), -1);
    assert_eq!(scene.pixel(0, 0), -1);
}

#[test]
fn shape_tools_write_only_on_release() {
    let mut scene = Scene::new(8, 8);
    let mut line = Tool::new(ToolKind::Line, &EditorSettings::default()).unwrap();
    {
        let mut ctx = ToolContext::new(&mut scene.image, &scene.palette)
            .with_layer(Some(scene.layer.as_str()))
            .with_frame(Some(scene.frame.as_str()))
            .with_color(2);
        line.mouse_down(&mut ctx, Point::new(0, 0)).unwrap();
        line.mouse_move(&mut ctx, Point::new(5, 2)).unwrap();
        let overlays = line.overlays(&ctx, None);
        assert!(matches!(&overlays[0], Overlay::ShapePreview { points, .. } if points.len() == 6));
        assert!(ctx.image().history().is_empty());
        line.mouse_up(&mut ctx, Point::new(5, 2)).unwrap();
    }
    assert_eq!(scene.image.history().len(), 1);
    assert_eq!(scene.pixel(5, 2), 2);
    assert_eq!(scene.pixel(0, 0), 2);
}

#[test]
fn tools_without_active_layer_do_nothing() {
    let mut scene = Scene::new(4, 4);
    let settings = EditorSettings::default();
    for &kind in ToolKind::all() {
        let mut tool = Tool::new(kind, &settings).unwrap();
        let mut ctx = ToolContext::new(&mut scene.image, &scene.palette)
            .with_frame(Some(scene.frame.as_str()))
            .with_color(1);
        tool.mouse_down(&mut ctx, Point::new(1, 1)).unwrap();
        tool.mouse_move(&mut ctx, Point::new(2, 2)).unwrap();
        tool.mouse_up(&mut ctx, Point::new(2, 2)).unwrap();
        tool.key_down(&mut ctx, Key::Right).unwrap();
    }
    assert!(scene.image.history().is_empty());
    assert!(scene.image.buffers().is_empty());
}

#[test]
fn drawing_on_object_layer_is_an_error() {
    let mut scene = Scene::new(4, 4);
    let objects = Layer::object("Labels").unwrap();
    scene.image.append_layer(objects.clone()).unwrap();
    let object_id = objects.id();
    let mut pencil = Tool::new(ToolKind::Pencil, &EditorSettings::default()).unwrap();
    let mut ctx = ToolContext::new(&mut scene.image, &scene.palette)
        .with_layer(Some(object_id.as_str()))
        .with_frame(Some(scene.frame.as_str()));
    assert!(matches!(
        pencil.mouse_down(&mut ctx, Point::new(0, 0)),
        Err(DocError::UnsupportedLayerKind(_))
    ));
}

#[test]
fn fill_then_shift_with_arrow_key() {
    let mut scene = Scene::new(4, 3);
    scene
        .image
        .get_pixel_surface(&scene.layer, &scene.frame)
        .unwrap()
        .set_pixel(Point::new(3, 0), 5)
        .unwrap();

    let settings = EditorSettings::default();
    let mut shift = Tool::new(ToolKind::Shift, &settings).unwrap();
    {
        let mut ctx = ToolContext::new(&mut scene.image, &scene.palette)
            .with_layer(Some(scene.layer.as_str()))
            .with_frame(Some(scene.frame.as_str()));
        shift.key_down(&mut ctx, Key::Right).unwrap();
    }
    assert_eq!(scene.pixel(0, 0), 5);
    assert_eq!(scene.pixel(3, 0), -1);
    assert_eq!(scene.image.history().undo_description().as_deref(), Some("Shift"));

    let mut fill = Tool::new(ToolKind::Fill, &settings).unwrap();
    scene.drag(&mut fill, 9, &[(2, 2)]);
    assert_eq!(scene.pixel(1, 1), 9);
    assert_eq!(scene.pixel(0, 0), 5);
    assert_eq!(scene.image.history().len(), 2);
}

#[test]
fn select_delete_and_escape() {
    let mut scene = Scene::new(4, 4);
    scene
        .image
        .get_pixel_surface(&scene.layer, &scene.frame)
        .unwrap()
        .fill_all(3);

    let mut select = Tool::new(ToolKind::Select, &EditorSettings::default()).unwrap();
    let mut ctx = ToolContext::new(&mut scene.image, &scene.palette)
        .with_layer(Some(scene.layer.as_str()))
        .with_frame(Some(scene.frame.as_str()));
    select.mouse_down(&mut ctx, Point::new(2, 2)).unwrap();
    select.mouse_up(&mut ctx, Point::new(1, 1)).unwrap();
    assert_eq!(ctx.selection(), Some(Bounds::from_corners(Point::new(2, 2), Point::new(1, 1))));

    select.key_down(&mut ctx, Key::Delete).unwrap();
    select.key_down(&mut ctx, Key::Escape).unwrap();
    assert_eq!(ctx.selection(), None);
    drop(ctx);

    assert_eq!(scene.pixel(1, 1), -1);
    assert_eq!(scene.pixel(2, 2), -1);
    assert_eq!(scene.pixel(0, 0), 3);
    assert_eq!(scene.image.history().len(), 1);
}

#[test]
fn move_tool_drops_pixels_as_one_record() {
    let mut scene = Scene::new(6, 6);
    {
        let mut surface = scene.image.get_pixel_surface(&scene.layer, &scene.frame).unwrap();
        surface.set_pixel(Point::new(1, 1), 7).unwrap();
        surface.set_pixel(Point::new(4, 4), 2).unwrap();
    }
    let selection = Bounds::from_corners(Point::new(0, 0), Point::new(1, 1));
    let mut tool = Tool::new(ToolKind::Move, &EditorSettings::default()).unwrap();
    {
        let mut ctx = ToolContext::new(&mut scene.image, &scene.palette)
            .with_layer(Some(scene.layer.as_str()))
            .with_frame(Some(scene.frame.as_str()))
            .with_selection(Some(selection));
        tool.mouse_down(&mut ctx, Point::new(1, 1)).unwrap();
        tool.mouse_move(&mut ctx, Point::new(3, 2)).unwrap();
        assert!(
            tool.overlays(&ctx, None)
                .iter()
                .any(|o| matches!(o, Overlay::FloatingPixels { .. }))
        );
        tool.mouse_up(&mut ctx, Point::new(4, 4)).unwrap();
        assert_eq!(ctx.selection_rect().map(|r| r.min()), Some(Point::new(3, 3)));
    }
    assert_eq!(scene.pixel(1, 1), -1);
    assert_eq!(scene.pixel(4, 4), 7);
    assert_eq!(scene.image.history().len(), 1);
}

#[test]
fn toolbox_switch_drops_unfinished_gesture() {
    let mut scene = Scene::new(4, 4);
    let mut toolbox = Toolbox::new(&EditorSettings::default()).unwrap();
    {
        let mut ctx = ToolContext::new(&mut scene.image, &scene.palette)
            .with_layer(Some(scene.layer.as_str()))
            .with_frame(Some(scene.frame.as_str()));
        toolbox.change_tool(ToolKind::Rect, &mut ctx).unwrap();
        toolbox.active_mut().mouse_down(&mut ctx, Point::new(0, 0)).unwrap();
        assert!(toolbox.active().is_active());
        toolbox.change_tool(ToolKind::Pencil, &mut ctx).unwrap();
    }
    assert!(!toolbox.tool(ToolKind::Rect).is_active());
    assert_eq!(toolbox.active_kind(), ToolKind::Pencil);
    assert!(scene.image.history().is_empty());
}

#[test]
fn switching_tools_mid_drag_keeps_history_in_step() {
    for commit in [FreehandCommit::PerSample, FreehandCommit::PerGesture] {
        let mut scene = Scene::new(4, 2);
        let settings = EditorSettings {
            freehand_commit: commit,
            ..EditorSettings::default()
        };
        let mut toolbox = Toolbox::new(&settings).unwrap();
        {
            let mut ctx = ToolContext::new(&mut scene.image, &scene.palette)
                .with_layer(Some(scene.layer.as_str()))
                .with_frame(Some(scene.frame.as_str()))
                .with_color(3);
            toolbox.active_mut().mouse_down(&mut ctx, Point::new(0, 0)).unwrap();
            toolbox.active_mut().mouse_move(&mut ctx, Point::new(3, 0)).unwrap();
            toolbox.change_tool(ToolKind::Shift, &mut ctx).unwrap();
            toolbox.active_mut().mouse_down(&mut ctx, Point::new(0, 0)).unwrap();
            toolbox.active_mut().mouse_move(&mut ctx, Point::new(0, 1)).unwrap();
            toolbox.change_tool(ToolKind::Pencil, &mut ctx).unwrap();
        }
        let live = scene
            .image
            .get_pixel_surface(&scene.layer, &scene.frame)
            .unwrap()
            .clone_data();
        assert_eq!(scene.pixel(2, 1), 3);
        assert_eq!(scene.pixel(2, 0), -1);

        while scene.image.undo().unwrap().is_some() {}
        assert_eq!(scene.pixel(0, 0), -1);
        assert_eq!(scene.pixel(0, 1), -1);
        while scene.image.redo().unwrap().is_some() {}
        let replayed = scene
            .image
            .get_pixel_surface(&scene.layer, &scene.frame)
            .unwrap()
            .clone_data();
        assert_eq!(replayed, live);
    }
}
