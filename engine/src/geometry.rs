use crate::{BBox, Point};

pub const MIN_SCALE: f64 = 0.2;
pub const MAX_SCALE: f64 = 10.0;
pub const ZOOM_STEP: f64 = 0.2;
/// Smallest box side a drag may produce.
pub const DRAG_MIN_SIZE: f64 = 2.0;
/// Smallest box side after clamping into the image.
pub const CLAMP_MIN_SIZE: f64 = 4.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImageSize {
    pub width: f64,
    pub height: f64,
}

impl ImageSize {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Ratio between the canvas's CSS box and the image's native size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CssScale {
    pub sx: f64,
    pub sy: f64,
}

impl Default for CssScale {
    fn default() -> Self {
        Self { sx: 1.0, sy: 1.0 }
    }
}

impl CssScale {
    pub fn from_sizes(rect_width: f64, rect_height: f64, image: ImageSize) -> Self {
        if rect_width <= 0.0 || rect_height <= 0.0 || image.width <= 0.0 || image.height <= 0.0 {
            return Self::default();
        }
        Self {
            sx: rect_width / image.width,
            sy: rect_height / image.height,
        }
    }
}

/// Snapshot of the canvas element taken when an event arrives.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub rect_left: f64,
    pub rect_top: f64,
    pub rect_width: f64,
    pub rect_height: f64,
    pub canvas_width: f64,
    pub canvas_height: f64,
    pub dpr: f64,
    pub image: ImageSize,
}

impl Viewport {
    pub fn css_scale(&self) -> CssScale {
        CssScale::from_sizes(self.rect_width, self.rect_height, self.image)
    }

    pub fn screen_point(&self, client: Point) -> Point {
        Point::new(client.x - self.rect_left, client.y - self.rect_top)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct View {
    pub pan: Point,
    pub scale: f64,
}

impl Default for View {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl View {
    pub const IDENTITY: View = View {
        pan: Point::new(0.0, 0.0),
        scale: 1.0,
    };

    pub fn new(pan: Point, scale: f64) -> Self {
        Self {
            pan,
            scale: clamp_scale(scale),
        }
    }

    pub fn screen_to_image(&self, screen: Point, css: CssScale) -> Point {
        Point::new(
            screen.x / (css.sx * self.scale) - self.pan.x,
            screen.y / (css.sy * self.scale) - self.pan.y,
        )
    }

    pub fn image_to_screen(&self, image: Point, css: CssScale) -> Point {
        Point::new(
            (image.x + self.pan.x) * css.sx * self.scale,
            (image.y + self.pan.y) * css.sy * self.scale,
        )
    }

    /// Same scale, pan chosen so `target` sits at the centre of the canvas box.
    pub fn centered_on(&self, target: Point, rect_width: f64, rect_height: f64, css: CssScale) -> View {
        View {
            pan: Point::new(
                rect_width / (2.0 * css.sx * self.scale) - target.x,
                rect_height / (2.0 * css.sy * self.scale) - target.y,
            ),
            scale: self.scale,
        }
    }

    /// Pan relative to `origin` by a pointer delta measured in CSS pixels.
    pub fn panned_from(&self, origin: Point, client_delta: Point, css: CssScale) -> View {
        View {
            pan: Point::new(
                origin.x + client_delta.x / (css.sx * self.scale),
                origin.y + client_delta.y / (css.sy * self.scale),
            ),
            scale: self.scale,
        }
    }

    /// One wheel notch of zoom that keeps the image point under `cursor` fixed.
    pub fn zoomed_at(&self, cursor: Point, delta_y: f64, css: CssScale) -> View {
        if delta_y == 0.0 || !delta_y.is_finite() {
            return *self;
        }
        let anchor = self.screen_to_image(cursor, css);
        let step = if delta_y > 0.0 { -ZOOM_STEP } else { ZOOM_STEP };
        let scale = clamp_scale(self.scale + step);
        View {
            pan: Point::new(
                cursor.x / (css.sx * scale) - anchor.x,
                cursor.y / (css.sy * scale) - anchor.y,
            ),
            scale,
        }
    }

    /// `setTransform` arguments mapping image space onto the backing store.
    pub fn canvas_transform(&self, dpr: f64) -> [f64; 6] {
        let k = dpr * self.scale;
        [k, 0.0, 0.0, k, k * self.pan.x, k * self.pan.y]
    }

    /// Length of `px` backing-store pixels expressed in image pixels.
    pub fn canvas_px_to_image(&self, px: f64, dpr: f64) -> f64 {
        let k = dpr * self.scale;
        if k <= 0.0 {
            px
        } else {
            px / k
        }
    }
}

pub fn clamp_scale(scale: f64) -> f64 {
    if !scale.is_finite() {
        return 1.0;
    }
    scale.clamp(MIN_SCALE, MAX_SCALE)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Corner {
    pub const ALL: [Corner; 4] = [
        Corner::TopLeft,
        Corner::TopRight,
        Corner::BottomLeft,
        Corner::BottomRight,
    ];

    pub fn position(self, bbox: &BBox) -> Point {
        match self {
            Corner::TopLeft => Point::new(bbox.x, bbox.y),
            Corner::TopRight => Point::new(bbox.right(), bbox.y),
            Corner::BottomLeft => Point::new(bbox.x, bbox.bottom()),
            Corner::BottomRight => Point::new(bbox.right(), bbox.bottom()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Edge {
    North,
    East,
    South,
    West,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handle {
    Corner(Corner),
    Edge(Edge),
}

impl Handle {
    fn moves_left(self) -> bool {
        matches!(
            self,
            Handle::Corner(Corner::TopLeft | Corner::BottomLeft) | Handle::Edge(Edge::West)
        )
    }

    fn moves_right(self) -> bool {
        matches!(
            self,
            Handle::Corner(Corner::TopRight | Corner::BottomRight) | Handle::Edge(Edge::East)
        )
    }

    fn moves_top(self) -> bool {
        matches!(
            self,
            Handle::Corner(Corner::TopLeft | Corner::TopRight) | Handle::Edge(Edge::North)
        )
    }

    fn moves_bottom(self) -> bool {
        matches!(
            self,
            Handle::Corner(Corner::BottomLeft | Corner::BottomRight) | Handle::Edge(Edge::South)
        )
    }
}

/// Moves only the sides of `origin` that `handle` grabs, so dragging past the
/// opposite side flips the box instead of inverting it.
pub fn resize_with_handle(origin: BBox, handle: Handle, to: Point) -> BBox {
    let mut x0 = origin.x;
    let mut y0 = origin.y;
    let mut x1 = origin.right();
    let mut y1 = origin.bottom();
    if handle.moves_left() {
        x0 = to.x;
    }
    if handle.moves_right() {
        x1 = to.x;
    }
    if handle.moves_top() {
        y0 = to.y;
    }
    if handle.moves_bottom() {
        y1 = to.y;
    }
    BBox {
        x: x0.min(x1).round(),
        y: y0.min(y1).round(),
        w: (x1 - x0).abs().round().max(DRAG_MIN_SIZE),
        h: (y1 - y0).abs().round().max(DRAG_MIN_SIZE),
    }
}

pub fn translate_box(origin: BBox, start: Point, current: Point) -> BBox {
    BBox {
        x: (origin.x + current.x - start.x).round(),
        y: (origin.y + current.y - start.y).round(),
        w: origin.w,
        h: origin.h,
    }
}

pub fn clamp_bbox_to_image(bbox: BBox, image: ImageSize) -> BBox {
    let w = bbox.w.min(image.width).max(CLAMP_MIN_SIZE);
    let h = bbox.h.min(image.height).max(CLAMP_MIN_SIZE);
    BBox {
        x: bbox.x.max(0.0).min(image.width - w),
        y: bbox.y.max(0.0).min(image.height - h),
        w,
        h,
    }
}

pub fn clamp_point_to_image(point: Point, image: ImageSize) -> Point {
    Point::new(
        point.x.max(0.0).min(image.width - 1.0),
        point.y.max(0.0).min(image.height - 1.0),
    )
}

/// Shift a box by whole pixels; with an image size the box stays inside it.
pub fn nudge_box(bbox: BBox, dx: f64, dy: f64, image: Option<ImageSize>) -> BBox {
    let mut x = bbox.x + dx;
    let mut y = bbox.y + dy;
    if let Some(image) = image {
        x = x.max(0.0).min(image.width - bbox.w);
        y = y.max(0.0).min(image.height - bbox.h);
    }
    BBox { x, y, ..bbox }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < EPSILON
    }

    fn approx_point(a: Point, b: Point) -> bool {
        approx_eq(a.x, b.x) && approx_eq(a.y, b.y)
    }

    #[test]
    fn css_scale_guards_zero_rect() {
        let image = ImageSize::new(100.0, 50.0);
        assert_eq!(CssScale::from_sizes(0.0, 20.0, image), CssScale::default());
        assert_eq!(
            CssScale::from_sizes(200.0, 25.0, image),
            CssScale { sx: 2.0, sy: 0.5 }
        );
    }

    #[test]
    fn round_trip_over_scales_and_pans() {
        let css = CssScale { sx: 0.75, sy: 1.25 };
        let pans = [
            Point::new(0.0, 0.0),
            Point::new(-120.5, 33.0),
            Point::new(400.0, -7.25),
        ];
        let mut scale = MIN_SCALE;
        while scale <= MAX_SCALE {
            for pan in pans {
                let view = View::new(pan, scale);
                let screen = Point::new(317.0, 42.5);
                let image = view.screen_to_image(screen, css);
                let back = view.image_to_screen(image, css);
                assert!((back.x - screen.x).abs() < 1e-6, "scale {scale} pan {pan:?}");
                assert!((back.y - screen.y).abs() < 1e-6, "scale {scale} pan {pan:?}");
            }
            scale += 0.35;
        }
    }

    #[test]
    fn identity_click_maps_straight_through() {
        let view = View::IDENTITY;
        let image = view.screen_to_image(Point::new(100.0, 100.0), CssScale::default());
        assert!(approx_point(image, Point::new(100.0, 100.0)));
    }

    #[test]
    fn zoom_keeps_cursor_point_fixed() {
        let css = CssScale { sx: 0.5, sy: 0.5 };
        let cursor = Point::new(140.0, 90.0);
        let mut view = View::new(Point::new(-30.0, 12.0), 1.0);
        for delta in [-1.0, -1.0, 3.0, -100.0, 1.0] {
            let before = view.screen_to_image(cursor, css);
            view = view.zoomed_at(cursor, delta, css);
            let after = view.screen_to_image(cursor, css);
            assert!((before.x - after.x).abs() < 1e-9);
            assert!((before.y - after.y).abs() < 1e-9);
        }
    }

    #[test]
    fn zoom_clamps_to_range() {
        let css = CssScale::default();
        let cursor = Point::new(10.0, 10.0);
        let mut view = View::IDENTITY;
        for _ in 0..100 {
            view = view.zoomed_at(cursor, -1.0, css);
        }
        assert!(approx_eq(view.scale, MAX_SCALE));
        for _ in 0..100 {
            view = view.zoomed_at(cursor, 1.0, css);
        }
        assert!(approx_eq(view.scale, MIN_SCALE));
    }

    #[test]
    fn zoom_ignores_zero_delta() {
        let view = View::new(Point::new(3.0, 4.0), 2.0);
        assert_eq!(view.zoomed_at(Point::new(1.0, 1.0), 0.0, CssScale::default()), view);
    }

    #[test]
    fn centered_on_puts_target_in_middle() {
        let css = CssScale { sx: 0.8, sy: 0.8 };
        let view = View::new(Point::new(5.0, 5.0), 2.0);
        let target = Point::new(300.0, 200.0);
        let centered = view.centered_on(target, 640.0, 480.0, css);
        let screen = centered.image_to_screen(target, css);
        assert!(approx_point(screen, Point::new(320.0, 240.0)));
        assert!(approx_eq(centered.scale, 2.0));
    }

    #[test]
    fn pan_divides_by_scale() {
        let css = CssScale { sx: 2.0, sy: 2.0 };
        let view = View::new(Point::new(0.0, 0.0), 2.0);
        let panned = view.panned_from(Point::new(10.0, 10.0), Point::new(40.0, -8.0), css);
        assert!(approx_point(panned.pan, Point::new(20.0, 8.0)));
    }

    #[test]
    fn corner_resize_scenario() {
        let origin = BBox::new(10.0, 10.0, 50.0, 50.0);
        let resized = resize_with_handle(
            origin,
            Handle::Corner(Corner::BottomRight),
            Point::new(70.0, 70.0),
        );
        assert_eq!(resized, BBox::new(10.0, 10.0, 60.0, 60.0));
    }

    #[test]
    fn corner_resize_never_below_minimum() {
        let origin = BBox::new(10.0, 10.0, 50.0, 50.0);
        for corner in Corner::ALL {
            let grabbed = corner.position(&origin);
            let opposite = match corner {
                Corner::TopLeft => Corner::BottomRight,
                Corner::TopRight => Corner::BottomLeft,
                Corner::BottomLeft => Corner::TopRight,
                Corner::BottomRight => Corner::TopLeft,
            }
            .position(&origin);
            for t in [0.0, 0.5, 0.99, 1.0, 1.01, 1.5] {
                let to = Point::new(
                    grabbed.x + (opposite.x - grabbed.x) * t,
                    grabbed.y + (opposite.y - grabbed.y) * t,
                );
                let resized = resize_with_handle(origin, Handle::Corner(corner), to);
                assert!(resized.w >= DRAG_MIN_SIZE, "{corner:?} t={t}");
                assert!(resized.h >= DRAG_MIN_SIZE, "{corner:?} t={t}");
            }
        }
    }

    #[test]
    fn edge_resize_moves_one_side() {
        let origin = BBox::new(10.0, 10.0, 50.0, 50.0);
        let north = resize_with_handle(origin, Handle::Edge(Edge::North), Point::new(999.0, 0.0));
        assert_eq!(north, BBox::new(10.0, 0.0, 50.0, 60.0));
        let west = resize_with_handle(origin, Handle::Edge(Edge::West), Point::new(80.0, -5.0));
        assert_eq!(west, BBox::new(60.0, 10.0, 20.0, 50.0));
    }

    #[test]
    fn translate_rounds() {
        let moved = translate_box(
            BBox::new(10.0, 10.0, 5.0, 5.0),
            Point::new(0.0, 0.0),
            Point::new(2.4, -3.6),
        );
        assert_eq!(moved, BBox::new(12.0, 6.0, 5.0, 5.0));
    }

    #[test]
    fn clamp_invariants_hold() {
        let image = ImageSize::new(64.0, 48.0);
        let boxes = [
            BBox::new(-10.0, -10.0, 5.0, 5.0),
            BBox::new(60.0, 40.0, 30.0, 30.0),
            BBox::new(10.0, 10.0, 0.0, 1.0),
            BBox::new(0.0, 0.0, 500.0, 500.0),
            BBox::new(63.0, 47.0, 4.0, 4.0),
        ];
        for bbox in boxes {
            let clamped = clamp_bbox_to_image(bbox, image);
            assert!(clamped.x >= 0.0 && clamped.y >= 0.0, "{bbox:?}");
            assert!(clamped.right() <= image.width, "{bbox:?}");
            assert!(clamped.bottom() <= image.height, "{bbox:?}");
            assert!(clamped.w >= CLAMP_MIN_SIZE && clamped.h >= CLAMP_MIN_SIZE, "{bbox:?}");
        }
    }

    #[test]
    fn click_point_clamps_to_last_pixel() {
        let image = ImageSize::new(1000.0, 800.0);
        assert_eq!(
            clamp_point_to_image(Point::new(1000.0, -3.0), image),
            Point::new(999.0, 0.0)
        );
        assert_eq!(
            clamp_point_to_image(Point::new(100.0, 100.0), image),
            Point::new(100.0, 100.0)
        );
    }

    #[test]
    fn nudge_stays_inside_image() {
        let image = ImageSize::new(100.0, 100.0);
        let bbox = BBox::new(95.0, 0.0, 5.0, 5.0);
        assert_eq!(nudge_box(bbox, 10.0, -10.0, Some(image)), bbox);
        assert_eq!(
            nudge_box(bbox, -1.0, 1.0, Some(image)),
            BBox::new(94.0, 1.0, 5.0, 5.0)
        );
        assert_eq!(
            nudge_box(bbox, 10.0, 0.0, None),
            BBox::new(105.0, 0.0, 5.0, 5.0)
        );
    }

    #[test]
    fn transform_scales_pan() {
        let view = View::new(Point::new(3.0, -2.0), 2.0);
        assert_eq!(view.canvas_transform(1.5), [3.0, 0.0, 0.0, 3.0, 9.0, -6.0]);
        assert!(approx_eq(view.canvas_px_to_image(12.0, 1.5), 4.0));
    }
}
