use crate::geometry::{Corner, Edge, Handle, View};
use crate::{Annotation, BBox, Candidate, Point};

pub const VERTEX_RADIUS: f64 = 8.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cursor {
    Default,
    Crosshair,
    Grab,
    Grabbing,
    Move,
    NwseResize,
    NeswResize,
    NsResize,
    EwResize,
}

impl Cursor {
    pub fn as_css(self) -> &'static str {
        match self {
            Cursor::Default => "default",
            Cursor::Crosshair => "crosshair",
            Cursor::Grab => "grab",
            Cursor::Grabbing => "grabbing",
            Cursor::Move => "move",
            Cursor::NwseResize => "nwse-resize",
            Cursor::NeswResize => "nesw-resize",
            Cursor::NsResize => "ns-resize",
            Cursor::EwResize => "ew-resize",
        }
    }
}

impl Handle {
    pub fn cursor(self) -> Cursor {
        match self {
            Handle::Corner(Corner::TopLeft | Corner::BottomRight) => Cursor::NwseResize,
            Handle::Corner(Corner::TopRight | Corner::BottomLeft) => Cursor::NeswResize,
            Handle::Edge(Edge::North | Edge::South) => Cursor::NsResize,
            Handle::Edge(Edge::East | Edge::West) => Cursor::EwResize,
        }
    }
}

/// Pick radii. `corner` and `edge` start in backing-store pixels and are
/// converted with [`Tolerances::in_image_space`]; `vertex` is always image px.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tolerances {
    pub corner: f64,
    pub edge: f64,
    pub vertex: f64,
}

impl Tolerances {
    pub fn for_canvas(canvas_width: f64, canvas_height: f64) -> Self {
        let short_side = canvas_width.min(canvas_height);
        Self {
            corner: (short_side * 0.01).round().max(10.0),
            edge: (short_side * 0.006).round().max(6.0),
            vertex: VERTEX_RADIUS,
        }
    }

    pub fn in_image_space(self, view: &View, dpr: f64) -> Self {
        Self {
            corner: view.canvas_px_to_image(self.corner, dpr),
            edge: view.canvas_px_to_image(self.edge, dpr),
            vertex: self.vertex,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    Annotation(String),
    Candidate(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Hit {
    /// `select` is set when the grabbed annotation was not selected yet.
    Resize {
        target: Target,
        handle: Handle,
        origin: BBox,
        select: bool,
    },
    Move {
        target: Target,
        origin: BBox,
    },
    Vertex(usize),
}

impl Hit {
    pub fn cursor(&self) -> Cursor {
        match self {
            Hit::Resize { handle, .. } => handle.cursor(),
            Hit::Move { .. } | Hit::Vertex(_) => Cursor::Move,
        }
    }
}

/// Everything hit-testing looks at, borrowed from the editor.
#[derive(Clone, Copy, Debug)]
pub struct Scene<'a> {
    pub annotations: &'a [Annotation],
    pub candidates: &'a [Candidate],
    pub selected_annotation: Option<&'a str>,
    pub selected_candidate: Option<&'a str>,
    pub edit_mode: bool,
    /// Present only while vertices are shown for editing.
    pub edit_polygon: Option<&'a [Point]>,
}

impl<'a> Scene<'a> {
    pub fn selected_annotation(&self) -> Option<&'a Annotation> {
        let id = self.selected_annotation?;
        self.annotations.iter().find(|a| a.id == id)
    }

    pub fn selected_candidate(&self) -> Option<&'a Candidate> {
        let id = self.selected_candidate?;
        self.candidates.iter().find(|c| c.id == id)
    }
}

pub fn corner_at(bbox: &BBox, point: Point, tolerance: f64) -> Option<Corner> {
    let limit = tolerance * tolerance;
    Corner::ALL
        .into_iter()
        .find(|corner| corner.position(bbox).distance_sq(point) <= limit)
}

pub fn edge_at(bbox: &BBox, point: Point, tolerance: f64) -> Option<Edge> {
    let within_y = point.y >= bbox.y && point.y <= bbox.bottom();
    let within_x = point.x >= bbox.x && point.x <= bbox.right();
    if within_y && (point.x - bbox.x).abs() <= tolerance {
        return Some(Edge::West);
    }
    if within_y && (point.x - bbox.right()).abs() <= tolerance {
        return Some(Edge::East);
    }
    if within_x && (point.y - bbox.y).abs() <= tolerance {
        return Some(Edge::North);
    }
    if within_x && (point.y - bbox.bottom()).abs() <= tolerance {
        return Some(Edge::South);
    }
    None
}

pub fn vertex_at(polygon: &[Point], point: Point, radius: f64) -> Option<usize> {
    let limit = radius * radius;
    polygon.iter().position(|p| p.distance_sq(point) <= limit)
}

/// Smallest-area annotation whose box contains `point`; earlier wins on ties.
pub fn annotation_at(annotations: &[Annotation], point: Point) -> Option<&Annotation> {
    annotations
        .iter()
        .filter(|a| a.bbox.contains(point))
        .min_by(|a, b| a.bbox.area().total_cmp(&b.bbox.area()))
}

/// Classify a pointer-down at image-space `point`. `None` means a click.
pub fn hit_test(scene: &Scene, point: Point, tol: &Tolerances) -> Option<Hit> {
    if scene.edit_mode {
        return scene
            .edit_polygon
            .and_then(|polygon| vertex_at(polygon, point, tol.vertex))
            .map(Hit::Vertex);
    }

    let selected_ann = scene.selected_annotation();
    let selected_cand = scene.selected_candidate();

    if let Some(ann) = selected_ann {
        if let Some(corner) = corner_at(&ann.bbox, point, tol.corner) {
            return Some(Hit::Resize {
                target: Target::Annotation(ann.id.clone()),
                handle: Handle::Corner(corner),
                origin: ann.bbox,
                select: false,
            });
        }
    } else if let Some(cand) = selected_cand {
        if let Some(corner) = corner_at(&cand.bbox, point, tol.corner) {
            return Some(Hit::Resize {
                target: Target::Candidate(cand.id.clone()),
                handle: Handle::Corner(corner),
                origin: cand.bbox,
                select: false,
            });
        }
    }

    if let Some(ann) = selected_ann {
        if let Some(edge) = edge_at(&ann.bbox, point, tol.edge) {
            return Some(Hit::Resize {
                target: Target::Annotation(ann.id.clone()),
                handle: Handle::Edge(edge),
                origin: ann.bbox,
                select: false,
            });
        }
        if ann.bbox.contains(point) {
            return Some(Hit::Move {
                target: Target::Annotation(ann.id.clone()),
                origin: ann.bbox,
            });
        }
    } else {
        let grabbed = scene
            .annotations
            .iter()
            .filter_map(|a| corner_at(&a.bbox, point, tol.corner).map(|corner| (a, corner)))
            .min_by(|(a, _), (b, _)| a.bbox.area().total_cmp(&b.bbox.area()));
        if let Some((ann, corner)) = grabbed {
            return Some(Hit::Resize {
                target: Target::Annotation(ann.id.clone()),
                handle: Handle::Corner(corner),
                origin: ann.bbox,
                select: true,
            });
        }
    }

    if let Some(cand) = selected_cand.filter(|c| c.missing_class()) {
        if edge_at(&cand.bbox, point, tol.edge).is_some() {
            return Some(Hit::Move {
                target: Target::Candidate(cand.id.clone()),
                origin: cand.bbox,
            });
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Source;

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

    fn tolerances() -> Tolerances {
        Tolerances {
            corner: 4.0,
            edge: 2.0,
            vertex: VERTEX_RADIUS,
        }
    }

    fn scene_of<'a>(annotations: &'a [Annotation], candidates: &'a [Candidate]) -> Scene<'a> {
        Scene {
            annotations,
            candidates,
            selected_annotation: None,
            selected_candidate: None,
            edit_mode: false,
            edit_polygon: None,
        }
    }

    #[test]
    fn tolerance_floor_and_growth() {
        let small = Tolerances::for_canvas(640.0, 480.0);
        assert_eq!(small.corner, 10.0);
        assert_eq!(small.edge, 6.0);
        let large = Tolerances::for_canvas(4000.0, 3000.0);
        assert_eq!(large.corner, 30.0);
        assert_eq!(large.edge, 18.0);
    }

    #[test]
    fn tolerance_shrinks_when_zoomed_in() {
        let view = View::new(Point::new(0.0, 0.0), 4.0);
        let tol = Tolerances::for_canvas(1000.0, 1000.0).in_image_space(&view, 2.0);
        assert_eq!(tol.corner, 10.0 / 8.0);
        assert_eq!(tol.vertex, VERTEX_RADIUS);
    }

    #[test]
    fn smallest_containing_annotation_is_selected() {
        let annotations = vec![
            annotation("a", BBox::new(0.0, 0.0, 10.0, 10.0)),
            annotation("b", BBox::new(0.0, 0.0, 20.0, 20.0)),
            annotation("c", BBox::new(2.0, 2.0, 5.0, 5.0)),
        ];
        let hit = annotation_at(&annotations, Point::new(3.0, 3.0)).map(|a| a.id.as_str());
        assert_eq!(hit, Some("c"));
        assert!(annotation_at(&annotations, Point::new(30.0, 30.0)).is_none());
    }

    #[test]
    fn selected_corner_beats_edge_and_interior() {
        let annotations = vec![annotation("a", BBox::new(10.0, 10.0, 50.0, 50.0))];
        let mut scene = scene_of(&annotations, &[]);
        scene.selected_annotation = Some("a");
        let tol = tolerances();

        let corner = hit_test(&scene, Point::new(59.0, 61.0), &tol);
        assert!(matches!(
            corner,
            Some(Hit::Resize {
                handle: Handle::Corner(Corner::BottomRight),
                select: false,
                ..
            })
        ));

        let edge = hit_test(&scene, Point::new(35.0, 11.0), &tol);
        assert!(matches!(
            edge,
            Some(Hit::Resize {
                handle: Handle::Edge(Edge::North),
                ..
            })
        ));

        let inside = hit_test(&scene, Point::new(35.0, 35.0), &tol);
        assert_eq!(
            inside,
            Some(Hit::Move {
                target: Target::Annotation("a".into()),
                origin: BBox::new(10.0, 10.0, 50.0, 50.0),
            })
        );

        assert_eq!(hit_test(&scene, Point::new(200.0, 200.0), &tol), None);
    }

    #[test]
    fn unselected_corner_prefers_smallest_box() {
        let annotations = vec![
            annotation("big", BBox::new(0.0, 0.0, 100.0, 100.0)),
            annotation("small", BBox::new(0.0, 0.0, 10.0, 10.0)),
        ];
        let scene = scene_of(&annotations, &[]);
        let hit = hit_test(&scene, Point::new(1.0, 1.0), &tolerances());
        assert_eq!(
            hit,
            Some(Hit::Resize {
                target: Target::Annotation("small".into()),
                handle: Handle::Corner(Corner::TopLeft),
                origin: BBox::new(0.0, 0.0, 10.0, 10.0),
                select: true,
            })
        );
    }

    #[test]
    fn any_annotation_corner_ignored_once_one_is_selected() {
        let annotations = vec![
            annotation("a", BBox::new(0.0, 0.0, 10.0, 10.0)),
            annotation("b", BBox::new(100.0, 100.0, 10.0, 10.0)),
        ];
        let mut scene = scene_of(&annotations, &[]);
        scene.selected_annotation = Some("a");
        assert_eq!(hit_test(&scene, Point::new(100.0, 100.0), &tolerances()), None);
    }

    #[test]
    fn selected_candidate_corner_resizes_candidate() {
        let candidates = vec![Candidate::manual("m".into(), BBox::new(10.0, 10.0, 20.0, 20.0))];
        let mut scene = scene_of(&[], &candidates);
        scene.selected_candidate = Some("m");
        let hit = hit_test(&scene, Point::new(30.0, 10.0), &tolerances());
        assert!(matches!(
            hit,
            Some(Hit::Resize {
                target: Target::Candidate(_),
                handle: Handle::Corner(Corner::TopRight),
                ..
            })
        ));
    }

    #[test]
    fn unlabeled_manual_candidate_moves_by_edge() {
        let mut candidates = vec![Candidate::manual("m".into(), BBox::new(10.0, 10.0, 40.0, 40.0))];
        let mut scene = scene_of(&[], &candidates);
        scene.selected_candidate = Some("m");
        let hit = hit_test(&scene, Point::new(10.5, 30.0), &tolerances());
        assert!(matches!(hit, Some(Hit::Move { target: Target::Candidate(_), .. })));

        candidates[0].class_name = "bolt".into();
        let mut scene = scene_of(&[], &candidates);
        scene.selected_candidate = Some("m");
        assert_eq!(hit_test(&scene, Point::new(10.5, 30.0), &tolerances()), None);
    }

    #[test]
    fn edit_mode_only_sees_vertices() {
        let annotations = vec![annotation("a", BBox::new(0.0, 0.0, 50.0, 50.0))];
        let polygon = vec![
            Point::new(0.0, 0.0),
            Point::new(40.0, 0.0),
            Point::new(40.0, 40.0),
        ];
        let mut scene = scene_of(&annotations, &[]);
        scene.selected_annotation = Some("a");
        scene.edit_mode = true;
        assert_eq!(hit_test(&scene, Point::new(1.0, 1.0), &tolerances()), None);

        scene.edit_polygon = Some(&polygon);
        assert_eq!(
            hit_test(&scene, Point::new(45.0, 45.0), &tolerances()),
            Some(Hit::Vertex(2))
        );
        assert_eq!(hit_test(&scene, Point::new(20.0, 20.0), &tolerances()), None);
    }

    #[test]
    fn cursors_follow_handles() {
        assert_eq!(Handle::Corner(Corner::TopLeft).cursor().as_css(), "nwse-resize");
        assert_eq!(Handle::Corner(Corner::BottomLeft).cursor().as_css(), "nesw-resize");
        assert_eq!(Handle::Edge(Edge::South).cursor().as_css(), "ns-resize");
        assert_eq!(Handle::Edge(Edge::West).cursor().as_css(), "ew-resize");
    }
}
