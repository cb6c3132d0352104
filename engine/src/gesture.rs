use std::mem;

use crate::geometry::{resize_with_handle, translate_box, Handle, Viewport, View};
use crate::hit_test::{annotation_at, hit_test, Cursor, Hit, Scene, Target, Tolerances};
use crate::{BBox, Point};

/// Squared client-pixel distance after which a press stops being a click.
pub const CLICK_SLOP_SQ: f64 = 9.0;
pub const MANUAL_MIN_SIZE: f64 = 2.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Button {
    Primary,
    Middle,
    Secondary,
    Other,
}

impl Button {
    pub fn from_code(code: i16) -> Self {
        match code {
            0 => Button::Primary,
            1 => Button::Middle,
            2 => Button::Secondary,
            _ => Button::Other,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub meta: bool,
    pub alt: bool,
}

impl Modifiers {
    pub fn command(&self) -> bool {
        self.ctrl || self.meta
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointerInput {
    pub client: Point,
    pub button: Button,
    pub modifiers: Modifiers,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WheelInput {
    pub client: Point,
    pub delta_y: f64,
    pub ctrl: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct KeyInput {
    pub key: String,
    pub code: String,
    pub modifiers: Modifiers,
    /// Focus is in an input, textarea or select.
    pub in_text_field: bool,
}

/// Editor facts the keyboard shortcuts depend on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KeyContext {
    pub candidate_selected: bool,
    pub annotation_selected: bool,
    pub edit_mode: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct KeyOutcome {
    pub intents: Vec<Intent>,
    pub prevent_default: bool,
}

/// What the canvas asks the editor to do.
#[derive(Clone, Debug, PartialEq)]
pub enum Intent {
    DetectAt(Point),
    SelectAnnotation(String),
    CreateManualBox(BBox),
    ManualCreateActive(bool),
    SetAnnotationBBox { id: String, bbox: BBox },
    SetCandidateBBox { id: String, bbox: BBox },
    EditStarted(String),
    EditEnded(String),
    SelectVertex(usize),
    VertexDragStarted,
    MoveVertex { index: usize, point: Point },
    VertexDragEnded,
    DebugPointer { screen: Point, image: Point },
    NudgeCandidate { dx: f64, dy: f64 },
    Confirm,
    Reject,
    NextCandidate,
    Segment,
    DeleteSelectedAnnotation,
    Escape,
    Undo,
    Redo,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum GestureSession {
    #[default]
    Idle,
    Panning {
        client_start: Point,
        pan_origin: Point,
    },
    CreatingManualBox {
        start: Point,
        current: Point,
    },
    MovingBox {
        target: Target,
        origin: BBox,
        start: Point,
    },
    ResizingBox {
        target: Target,
        handle: Handle,
        origin: BBox,
    },
    DraggingVertex {
        index: usize,
    },
    PendingClick {
        client_start: Point,
        moved: bool,
    },
}

impl GestureSession {
    pub fn is_dragging(&self) -> bool {
        !matches!(self, GestureSession::Idle | GestureSession::PendingClick { .. })
    }
}

/// Owns the pan/zoom view and the in-flight pointer gesture.
///
/// `live` follows the pointer on every event; `committed` is what the last
/// frame rendered and only catches up through [`take_pending_view`].
///
/// [`take_pending_view`]: InteractionController::take_pending_view
#[derive(Debug, Default)]
pub struct InteractionController {
    live: View,
    committed: View,
    pending_view: bool,
    session: GestureSession,
    space_held: bool,
    hover: Option<Cursor>,
}

impl InteractionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_view(&self) -> View {
        self.live
    }

    pub fn committed_view(&self) -> View {
        self.committed
    }

    pub fn session(&self) -> &GestureSession {
        &self.session
    }

    pub fn space_held(&self) -> bool {
        self.space_held
    }

    pub fn is_dragging(&self) -> bool {
        self.session.is_dragging()
    }

    pub fn manual_preview(&self) -> Option<BBox> {
        match self.session {
            GestureSession::CreatingManualBox { start, current } => {
                Some(BBox::from_corners(start, current))
            }
            _ => None,
        }
    }

    pub fn cursor(&self, has_image: bool) -> Cursor {
        match &self.session {
            GestureSession::Panning { .. } | GestureSession::MovingBox { .. } => Cursor::Grabbing,
            GestureSession::ResizingBox { handle, .. } => handle.cursor(),
            GestureSession::CreatingManualBox { .. } => Cursor::Crosshair,
            GestureSession::DraggingVertex { .. } => Cursor::Move,
            _ if self.space_held => Cursor::Grab,
            _ => match self.hover {
                Some(cursor) => cursor,
                None if has_image => Cursor::Crosshair,
                None => Cursor::Default,
            },
        }
    }

    /// New image: identity view, no gesture.
    pub fn reset(&mut self) {
        self.live = View::IDENTITY;
        self.committed = View::IDENTITY;
        self.pending_view = false;
        self.session = GestureSession::Idle;
        self.hover = None;
    }

    pub fn reset_view(&mut self) {
        self.set_live(View::IDENTITY);
    }

    pub fn pan_to(&mut self, target: Point, viewport: &Viewport) {
        let view = self.live.centered_on(
            target,
            viewport.rect_width,
            viewport.rect_height,
            viewport.css_scale(),
        );
        self.set_live(view);
    }

    /// The live view, once, if it changed since the last frame.
    pub fn take_pending_view(&mut self) -> Option<View> {
        if !self.pending_view {
            return None;
        }
        self.pending_view = false;
        self.committed = self.live;
        Some(self.live)
    }

    fn set_live(&mut self, view: View) {
        self.live = view;
        self.pending_view = true;
    }

    fn image_point(&self, client: Point, viewport: &Viewport) -> (Point, Point) {
        let screen = viewport.screen_point(client);
        let image = self.live.screen_to_image(screen, viewport.css_scale());
        (screen, image)
    }

    fn tolerances(&self, viewport: &Viewport) -> Tolerances {
        Tolerances::for_canvas(viewport.canvas_width, viewport.canvas_height)
            .in_image_space(&self.live, viewport.dpr)
    }

    pub fn pointer_down(
        &mut self,
        input: &PointerInput,
        viewport: &Viewport,
        scene: &Scene,
    ) -> Vec<Intent> {
        if input.button == Button::Middle || self.space_held {
            self.session = GestureSession::Panning {
                client_start: input.client,
                pan_origin: self.live.pan,
            };
            return Vec::new();
        }
        if input.button != Button::Primary {
            self.session = GestureSession::Idle;
            return Vec::new();
        }

        let (_, image) = self.image_point(input.client, viewport);
        if input.modifiers.shift && !scene.edit_mode {
            self.session = GestureSession::CreatingManualBox {
                start: image,
                current: image,
            };
            return vec![Intent::ManualCreateActive(true)];
        }

        let mut intents = Vec::new();
        self.session = match hit_test(scene, image, &self.tolerances(viewport)) {
            Some(Hit::Resize {
                target,
                handle,
                origin,
                select,
            }) => {
                if let Target::Annotation(id) = &target {
                    if select {
                        intents.push(Intent::SelectAnnotation(id.clone()));
                    }
                    intents.push(Intent::EditStarted(id.clone()));
                }
                GestureSession::ResizingBox {
                    target,
                    handle,
                    origin,
                }
            }
            Some(Hit::Move { target, origin }) => {
                if let Target::Annotation(id) = &target {
                    intents.push(Intent::EditStarted(id.clone()));
                }
                GestureSession::MovingBox {
                    target,
                    origin,
                    start: image,
                }
            }
            Some(Hit::Vertex(index)) => {
                intents.push(Intent::SelectVertex(index));
                intents.push(Intent::VertexDragStarted);
                GestureSession::DraggingVertex { index }
            }
            None => GestureSession::PendingClick {
                client_start: input.client,
                moved: false,
            },
        };
        intents
    }

    pub fn pointer_move(
        &mut self,
        input: &PointerInput,
        viewport: &Viewport,
        scene: &Scene,
    ) -> Vec<Intent> {
        let (_, image) = self.image_point(input.client, viewport);
        match &mut self.session {
            GestureSession::Panning {
                client_start,
                pan_origin,
            } => {
                let delta = Point::new(
                    input.client.x - client_start.x,
                    input.client.y - client_start.y,
                );
                let view = self
                    .live
                    .panned_from(*pan_origin, delta, viewport.css_scale());
                self.set_live(view);
                Vec::new()
            }
            GestureSession::CreatingManualBox { current, .. } => {
                *current = image;
                Vec::new()
            }
            GestureSession::MovingBox {
                target,
                origin,
                start,
            } => vec![bbox_intent(target, translate_box(*origin, *start, image))],
            GestureSession::ResizingBox {
                target,
                handle,
                origin,
            } => vec![bbox_intent(target, resize_with_handle(*origin, *handle, image))],
            GestureSession::DraggingVertex { index } => vec![Intent::MoveVertex {
                index: *index,
                point: image,
            }],
            GestureSession::PendingClick {
                client_start,
                moved,
            } => {
                if input.client.distance_sq(*client_start) > CLICK_SLOP_SQ {
                    *moved = true;
                }
                Vec::new()
            }
            GestureSession::Idle => {
                self.hover = hit_test(scene, image, &self.tolerances(viewport)).map(|hit| hit.cursor());
                Vec::new()
            }
        }
    }

    /// `input` is `None` when the pointer left the canvas; that ends any
    /// gesture but never produces a click.
    pub fn pointer_up(
        &mut self,
        input: Option<&PointerInput>,
        viewport: &Viewport,
        scene: &Scene,
    ) -> Vec<Intent> {
        match mem::take(&mut self.session) {
            GestureSession::Idle | GestureSession::Panning { .. } => Vec::new(),
            GestureSession::MovingBox { target, .. } | GestureSession::ResizingBox { target, .. } => {
                match target {
                    Target::Annotation(id) => vec![Intent::EditEnded(id)],
                    Target::Candidate(_) => Vec::new(),
                }
            }
            GestureSession::CreatingManualBox { start, current } => {
                let bbox = BBox::from_corners(start, current);
                if bbox.w >= MANUAL_MIN_SIZE && bbox.h >= MANUAL_MIN_SIZE {
                    vec![
                        Intent::CreateManualBox(bbox.rounded()),
                        Intent::ManualCreateActive(false),
                    ]
                } else {
                    vec![Intent::ManualCreateActive(false)]
                }
            }
            GestureSession::DraggingVertex { .. } => vec![Intent::VertexDragEnded],
            GestureSession::PendingClick { moved, .. } => {
                let Some(input) = input else {
                    return Vec::new();
                };
                if moved || self.space_held || scene.edit_mode {
                    return Vec::new();
                }
                let (screen, image) = self.image_point(input.client, viewport);
                let mut intents = vec![Intent::DebugPointer { screen, image }];
                match annotation_at(scene.annotations, image) {
                    Some(hit) => intents.push(Intent::SelectAnnotation(hit.id.clone())),
                    None => intents.push(Intent::DetectAt(image)),
                }
                intents
            }
        }
    }

    pub fn pointer_leave(&mut self, viewport: &Viewport, scene: &Scene) -> Vec<Intent> {
        self.hover = None;
        self.pointer_up(None, viewport, scene)
    }

    /// Space + double-click resets pan and zoom.
    pub fn double_click(&mut self) -> bool {
        if !self.space_held {
            return false;
        }
        self.reset_view();
        true
    }

    /// Returns whether the browser's default scroll must be suppressed.
    pub fn wheel(&mut self, input: &WheelInput, viewport: &Viewport) -> bool {
        if !input.ctrl {
            return self.space_held;
        }
        let screen = viewport.screen_point(input.client);
        let view = self
            .live
            .zoomed_at(screen, input.delta_y, viewport.css_scale());
        self.set_live(view);
        true
    }

    pub fn key_down(&mut self, input: &KeyInput, ctx: &KeyContext) -> KeyOutcome {
        if input.code == "Space" {
            self.space_held = true;
            return KeyOutcome {
                intents: Vec::new(),
                prevent_default: !input.in_text_field,
            };
        }
        if input.in_text_field {
            return KeyOutcome::default();
        }

        let key = input.key.as_str();
        let command = input.modifiers.command();
        let intent = if command && key.eq_ignore_ascii_case("z") {
            Some(if input.modifiers.shift {
                Intent::Redo
            } else {
                Intent::Undo
            })
        } else if command && key.eq_ignore_ascii_case("y") {
            Some(Intent::Redo)
        } else if ctx.candidate_selected {
            candidate_shortcut(key, input.modifiers.shift, ctx.edit_mode)
        } else if matches!(key, "Delete" | "Backspace") && ctx.annotation_selected {
            Some(Intent::DeleteSelectedAnnotation)
        } else if key == "Escape" {
            return KeyOutcome {
                intents: vec![Intent::Escape],
                prevent_default: false,
            };
        } else {
            None
        };

        match intent {
            Some(intent) => KeyOutcome {
                intents: vec![intent],
                prevent_default: true,
            },
            None => KeyOutcome::default(),
        }
    }

    pub fn key_up(&mut self, input: &KeyInput) {
        if input.code == "Space" {
            self.space_held = false;
        }
    }
}

fn bbox_intent(target: &Target, bbox: BBox) -> Intent {
    match target {
        Target::Annotation(id) => Intent::SetAnnotationBBox {
            id: id.clone(),
            bbox,
        },
        Target::Candidate(id) => Intent::SetCandidateBBox {
            id: id.clone(),
            bbox,
        },
    }
}

fn candidate_shortcut(key: &str, shift: bool, edit_mode: bool) -> Option<Intent> {
    let step = if shift { 10.0 } else { 1.0 };
    let nudge = |dx: f64, dy: f64| (!edit_mode).then_some(Intent::NudgeCandidate { dx, dy });
    match key {
        "ArrowLeft" => nudge(-step, 0.0),
        "ArrowRight" => nudge(step, 0.0),
        "ArrowUp" => nudge(0.0, -step),
        "ArrowDown" => nudge(0.0, step),
        "Enter" => Some(Intent::Confirm),
        "Delete" | "Backspace" => Some(Intent::Reject),
        "n" | "N" => Some(Intent::NextCandidate),
        "s" | "S" => Some(Intent::Segment),
        "Escape" => Some(Intent::Escape),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Corner, ImageSize};
    use crate::{Annotation, Candidate, Source};

    fn viewport() -> Viewport {
        Viewport {
            rect_left: 0.0,
            rect_top: 0.0,
            rect_width: 1000.0,
            rect_height: 800.0,
            canvas_width: 1000.0,
            canvas_height: 800.0,
            dpr: 1.0,
            image: ImageSize::new(1000.0, 800.0),
        }
    }

    fn annotation(id: &str, bbox: BBox) -> Annotation {
        Annotation {
            id: id.into(),
            class_name: "part".into(),
            bbox,
            source: Source::Template,
            created_at: String::new(),
            score: None,
            seg_polygon: None,
            original_seg_polygon: None,
            seg_method: None,
        }
    }

    fn empty_scene<'a>(annotations: &'a [Annotation], candidates: &'a [Candidate]) -> Scene<'a> {
        Scene {
            annotations,
            candidates,
            selected_annotation: None,
            selected_candidate: None,
            edit_mode: false,
            edit_polygon: None,
        }
    }

    fn primary(x: f64, y: f64) -> PointerInput {
        PointerInput {
            client: Point::new(x, y),
            button: Button::Primary,
            modifiers: Modifiers::default(),
        }
    }

    fn shifted(x: f64, y: f64) -> PointerInput {
        PointerInput {
            modifiers: Modifiers {
                shift: true,
                ..Modifiers::default()
            },
            ..primary(x, y)
        }
    }

    fn key(key: &str) -> KeyInput {
        KeyInput {
            key: key.into(),
            code: String::new(),
            modifiers: Modifiers::default(),
            in_text_field: false,
        }
    }

    fn space() -> KeyInput {
        KeyInput {
            key: " ".into(),
            code: "Space".into(),
            modifiers: Modifiers::default(),
            in_text_field: false,
        }
    }

    #[test]
    fn click_detects_at_image_point() {
        let mut controller = InteractionController::new();
        let vp = viewport();
        let scene = empty_scene(&[], &[]);
        assert!(controller.pointer_down(&primary(100.0, 100.0), &vp, &scene).is_empty());
        let intents = controller.pointer_up(Some(&primary(100.0, 100.0)), &vp, &scene);
        assert_eq!(intents.last(), Some(&Intent::DetectAt(Point::new(100.0, 100.0))));
        assert_eq!(controller.session(), &GestureSession::Idle);
    }

    #[test]
    fn click_inside_annotation_selects_smallest() {
        let annotations = vec![
            annotation("a", BBox::new(100.0, 100.0, 100.0, 100.0)),
            annotation("b", BBox::new(50.0, 50.0, 300.0, 300.0)),
            annotation("c", BBox::new(120.0, 120.0, 50.0, 50.0)),
        ];
        let mut controller = InteractionController::new();
        let vp = viewport();
        let scene = empty_scene(&annotations, &[]);
        assert!(controller.pointer_down(&primary(140.0, 140.0), &vp, &scene).is_empty());
        let intents = controller.pointer_up(Some(&primary(140.0, 140.0)), &vp, &scene);
        assert_eq!(intents.last(), Some(&Intent::SelectAnnotation("c".into())));
    }

    #[test]
    fn moved_press_is_not_a_click() {
        let mut controller = InteractionController::new();
        let vp = viewport();
        let scene = empty_scene(&[], &[]);
        controller.pointer_down(&primary(100.0, 100.0), &vp, &scene);
        controller.pointer_move(&primary(104.0, 100.0), &vp, &scene);
        let intents = controller.pointer_up(Some(&primary(100.0, 100.0)), &vp, &scene);
        assert!(intents.is_empty());
    }

    #[test]
    fn small_jitter_still_clicks() {
        let mut controller = InteractionController::new();
        let vp = viewport();
        let scene = empty_scene(&[], &[]);
        controller.pointer_down(&primary(100.0, 100.0), &vp, &scene);
        controller.pointer_move(&primary(102.0, 102.0), &vp, &scene);
        let intents = controller.pointer_up(Some(&primary(102.0, 102.0)), &vp, &scene);
        assert_eq!(intents.last(), Some(&Intent::DetectAt(Point::new(102.0, 102.0))));
    }

    #[test]
    fn leave_never_clicks() {
        let mut controller = InteractionController::new();
        let vp = viewport();
        let scene = empty_scene(&[], &[]);
        controller.pointer_down(&primary(100.0, 100.0), &vp, &scene);
        assert!(controller.pointer_leave(&vp, &scene).is_empty());
    }

    #[test]
    fn corner_drag_resizes_annotation_in_session() {
        let annotations = vec![annotation("a", BBox::new(10.0, 10.0, 50.0, 50.0))];
        let mut controller = InteractionController::new();
        let vp = viewport();
        let scene = Scene {
            selected_annotation: Some("a"),
            ..empty_scene(&annotations, &[])
        };
        let down = controller.pointer_down(&primary(60.0, 60.0), &vp, &scene);
        assert_eq!(down, vec![Intent::EditStarted("a".into())]);
        assert!(matches!(
            controller.session(),
            GestureSession::ResizingBox {
                handle: Handle::Corner(Corner::BottomRight),
                ..
            }
        ));

        let moved = controller.pointer_move(&primary(70.0, 70.0), &vp, &scene);
        assert_eq!(
            moved,
            vec![Intent::SetAnnotationBBox {
                id: "a".into(),
                bbox: BBox::new(10.0, 10.0, 60.0, 60.0),
            }]
        );
        let up = controller.pointer_up(Some(&primary(70.0, 70.0)), &vp, &scene);
        assert_eq!(up, vec![Intent::EditEnded("a".into())]);
    }

    #[test]
    fn unselected_corner_selects_before_editing() {
        let annotations = vec![annotation("a", BBox::new(10.0, 10.0, 50.0, 50.0))];
        let mut controller = InteractionController::new();
        let scene = empty_scene(&annotations, &[]);
        let down = controller.pointer_down(&primary(10.0, 10.0), &viewport(), &scene);
        assert_eq!(
            down,
            vec![
                Intent::SelectAnnotation("a".into()),
                Intent::EditStarted("a".into()),
            ]
        );
    }

    #[test]
    fn interior_drag_moves_by_rounded_delta() {
        let annotations = vec![annotation("a", BBox::new(10.0, 10.0, 50.0, 50.0))];
        let mut controller = InteractionController::new();
        let vp = viewport();
        let scene = Scene {
            selected_annotation: Some("a"),
            ..empty_scene(&annotations, &[])
        };
        controller.pointer_down(&primary(30.0, 30.0), &vp, &scene);
        let moved = controller.pointer_move(&primary(35.4, 24.6), &vp, &scene);
        assert_eq!(
            moved,
            vec![Intent::SetAnnotationBBox {
                id: "a".into(),
                bbox: BBox::new(15.0, 5.0, 50.0, 50.0),
            }]
        );
    }

    #[test]
    fn shift_drag_creates_rounded_manual_box() {
        let mut controller = InteractionController::new();
        let vp = viewport();
        let scene = empty_scene(&[], &[]);
        let down = controller.pointer_down(&shifted(10.2, 10.0), &vp, &scene);
        assert_eq!(down, vec![Intent::ManualCreateActive(true)]);
        controller.pointer_move(&shifted(40.6, 30.0), &vp, &scene);
        assert!(controller.manual_preview().is_some());
        assert!(controller.is_dragging());
        let up = controller.pointer_up(Some(&shifted(40.6, 30.0)), &vp, &scene);
        assert_eq!(
            up,
            vec![
                Intent::CreateManualBox(BBox::new(10.0, 10.0, 30.0, 20.0)),
                Intent::ManualCreateActive(false),
            ]
        );
        assert!(controller.manual_preview().is_none());
    }

    #[test]
    fn tiny_manual_box_is_discarded() {
        let mut controller = InteractionController::new();
        let vp = viewport();
        let scene = empty_scene(&[], &[]);
        controller.pointer_down(&shifted(10.0, 10.0), &vp, &scene);
        controller.pointer_move(&shifted(11.0, 30.0), &vp, &scene);
        let up = controller.pointer_up(Some(&shifted(11.0, 30.0)), &vp, &scene);
        assert_eq!(up, vec![Intent::ManualCreateActive(false)]);
    }

    #[test]
    fn middle_drag_pans_live_view_until_flush() {
        let mut controller = InteractionController::new();
        let vp = viewport();
        let scene = empty_scene(&[], &[]);
        let middle = |x, y| PointerInput {
            button: Button::Middle,
            ..primary(x, y)
        };
        controller.pointer_down(&middle(100.0, 100.0), &vp, &scene);
        controller.pointer_move(&middle(130.0, 90.0), &vp, &scene);
        assert_eq!(controller.live_view().pan, Point::new(30.0, -10.0));
        assert_eq!(controller.committed_view(), View::IDENTITY);
        assert_eq!(controller.cursor(true), Cursor::Grabbing);

        let flushed = controller.take_pending_view();
        assert_eq!(flushed.map(|v| v.pan), Some(Point::new(30.0, -10.0)));
        assert_eq!(controller.committed_view(), controller.live_view());
        assert_eq!(controller.take_pending_view(), None);

        let up = controller.pointer_up(Some(&middle(130.0, 90.0)), &vp, &scene);
        assert!(up.is_empty());
    }

    #[test]
    fn space_turns_primary_into_pan_and_enables_reset() {
        let mut controller = InteractionController::new();
        let vp = viewport();
        let scene = empty_scene(&[], &[]);
        assert!(!controller.double_click());

        let outcome = controller.key_down(&space(), &KeyContext::default());
        assert!(outcome.prevent_default);
        assert_eq!(controller.cursor(true), Cursor::Grab);

        controller.pointer_down(&primary(0.0, 0.0), &vp, &scene);
        controller.pointer_move(&primary(50.0, 0.0), &vp, &scene);
        assert!(controller.pointer_up(Some(&primary(50.0, 0.0)), &vp, &scene).is_empty());
        assert_ne!(controller.live_view(), View::IDENTITY);

        assert!(controller.double_click());
        assert_eq!(controller.live_view(), View::IDENTITY);

        controller.key_up(&space());
        assert!(!controller.space_held());
    }

    #[test]
    fn wheel_needs_ctrl_to_zoom() {
        let mut controller = InteractionController::new();
        let vp = viewport();
        let plain = WheelInput {
            client: Point::new(200.0, 100.0),
            delta_y: -100.0,
            ctrl: false,
        };
        assert!(!controller.wheel(&plain, &vp));
        assert_eq!(controller.live_view(), View::IDENTITY);

        controller.key_down(&space(), &KeyContext::default());
        assert!(controller.wheel(&plain, &vp));
        assert_eq!(controller.live_view(), View::IDENTITY);

        let zoom = WheelInput { ctrl: true, ..plain };
        assert!(controller.wheel(&zoom, &vp));
        let view = controller.live_view();
        assert!((view.scale - 1.2).abs() < 1e-9);
        let anchor = view.screen_to_image(Point::new(200.0, 100.0), vp.css_scale());
        assert!((anchor.x - 200.0).abs() < 1e-9 && (anchor.y - 100.0).abs() < 1e-9);
    }

    #[test]
    fn pan_to_centres_target() {
        let mut controller = InteractionController::new();
        let vp = viewport();
        controller.pan_to(Point::new(100.0, 100.0), &vp);
        let screen = controller
            .live_view()
            .image_to_screen(Point::new(100.0, 100.0), vp.css_scale());
        assert_eq!(screen, Point::new(500.0, 400.0));
        assert!(controller.take_pending_view().is_some());
    }

    #[test]
    fn candidate_shortcuts() {
        let mut controller = InteractionController::new();
        let ctx = KeyContext {
            candidate_selected: true,
            ..KeyContext::default()
        };
        let cases = [
            ("Enter", Intent::Confirm),
            ("Delete", Intent::Reject),
            ("Backspace", Intent::Reject),
            ("n", Intent::NextCandidate),
            ("S", Intent::Segment),
            ("ArrowLeft", Intent::NudgeCandidate { dx: -1.0, dy: 0.0 }),
        ];
        for (name, expected) in cases {
            let outcome = controller.key_down(&key(name), &ctx);
            assert_eq!(outcome.intents, vec![expected], "{name}");
            assert!(outcome.prevent_default, "{name}");
        }

        let mut big_step = key("ArrowDown");
        big_step.modifiers.shift = true;
        assert_eq!(
            controller.key_down(&big_step, &ctx).intents,
            vec![Intent::NudgeCandidate { dx: 0.0, dy: 10.0 }]
        );

        let editing = KeyContext {
            edit_mode: true,
            ..ctx
        };
        assert!(controller.key_down(&key("ArrowUp"), &editing).intents.is_empty());
    }

    #[test]
    fn delete_targets_annotation_only_without_candidate() {
        let mut controller = InteractionController::new();
        let ctx = KeyContext {
            annotation_selected: true,
            ..KeyContext::default()
        };
        assert_eq!(
            controller.key_down(&key("Delete"), &ctx).intents,
            vec![Intent::DeleteSelectedAnnotation]
        );
        let both = KeyContext {
            candidate_selected: true,
            ..ctx
        };
        assert_eq!(
            controller.key_down(&key("Delete"), &both).intents,
            vec![Intent::Reject]
        );
    }

    #[test]
    fn undo_redo_chords() {
        let mut controller = InteractionController::new();
        let mut undo = key("z");
        undo.modifiers.ctrl = true;
        assert_eq!(
            controller.key_down(&undo, &KeyContext::default()).intents,
            vec![Intent::Undo]
        );
        let mut redo = key("Z");
        redo.modifiers.meta = true;
        redo.modifiers.shift = true;
        assert_eq!(
            controller.key_down(&redo, &KeyContext::default()).intents,
            vec![Intent::Redo]
        );
        let mut redo_y = key("y");
        redo_y.modifiers.ctrl = true;
        assert_eq!(
            controller.key_down(&redo_y, &KeyContext::default()).intents,
            vec![Intent::Redo]
        );
    }

    #[test]
    fn text_fields_swallow_shortcuts() {
        let mut controller = InteractionController::new();
        let mut enter = key("Enter");
        enter.in_text_field = true;
        let ctx = KeyContext {
            candidate_selected: true,
            ..KeyContext::default()
        };
        assert_eq!(controller.key_down(&enter, &ctx), KeyOutcome::default());

        let mut typed_space = space();
        typed_space.in_text_field = true;
        assert!(!controller.key_down(&typed_space, &ctx).prevent_default);
    }

    #[test]
    fn vertex_drag_in_edit_mode() {
        let polygon = vec![
            Point::new(10.0, 10.0),
            Point::new(90.0, 10.0),
            Point::new(50.0, 80.0),
        ];
        let mut controller = InteractionController::new();
        let vp = viewport();
        let scene = Scene {
            edit_mode: true,
            edit_polygon: Some(&polygon),
            ..empty_scene(&[], &[])
        };
        let down = controller.pointer_down(&primary(91.0, 11.0), &vp, &scene);
        assert_eq!(down, vec![Intent::SelectVertex(1), Intent::VertexDragStarted]);
        let moved = controller.pointer_move(&primary(95.0, 5.0), &vp, &scene);
        assert_eq!(
            moved,
            vec![Intent::MoveVertex {
                index: 1,
                point: Point::new(95.0, 5.0),
            }]
        );
        assert_eq!(
            controller.pointer_up(Some(&primary(95.0, 5.0)), &vp, &scene),
            vec![Intent::VertexDragEnded]
        );
    }

    #[test]
    fn edit_mode_clicks_do_nothing() {
        let mut controller = InteractionController::new();
        let vp = viewport();
        let scene = Scene {
            edit_mode: true,
            ..empty_scene(&[], &[])
        };
        controller.pointer_down(&primary(300.0, 300.0), &vp, &scene);
        assert!(controller.pointer_up(Some(&primary(300.0, 300.0)), &vp, &scene).is_empty());
    }
}
