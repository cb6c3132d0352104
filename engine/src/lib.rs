use serde::{Deserialize, Serialize};

pub mod api;
pub mod editor;
pub mod error;
pub mod geometry;
pub mod gesture;
pub mod hit_test;
pub mod history;
pub mod palette;
pub mod polygon;
pub mod settings;
pub mod split;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn distance_sq(self, other: Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

/// Axis-aligned box in image pixels, origin top-left.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Default)]
pub struct BBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl BBox {
    pub const fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// Normalized box spanning two arbitrary corner points.
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
            w: (b.x - a.x).abs(),
            h: (b.y - a.y).abs(),
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.h
    }

    pub fn area(&self) -> f64 {
        self.w * self.h
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    /// Inclusive containment, edges count as inside.
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x && point.x <= self.right() && point.y >= self.y && point.y <= self.bottom()
    }

    pub fn rounded(&self) -> Self {
        Self {
            x: self.x.round(),
            y: self.y.round(),
            w: self.w.round(),
            h: self.h.round(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    #[default]
    Template,
    Manual,
    Sam,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SegMethod {
    Sam,
    Fallback,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Candidate {
    pub id: String,
    pub class_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub bbox: BBox,
    #[serde(default)]
    pub source: Source,
    #[serde(rename = "segPolygon", default, skip_serializing_if = "Option::is_none")]
    pub seg_polygon: Option<Vec<Point>>,
    #[serde(rename = "segMethod", default, skip_serializing_if = "Option::is_none")]
    pub seg_method: Option<SegMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
}

impl Candidate {
    pub fn manual(id: String, bbox: BBox) -> Self {
        Self {
            id,
            class_name: String::new(),
            score: None,
            bbox,
            source: Source::Manual,
            seg_polygon: None,
            seg_method: None,
            template: None,
            scale: None,
        }
    }

    pub fn is_manual(&self) -> bool {
        self.source == Source::Manual
    }

    /// A manual proposal cannot be confirmed or used as a click target until
    /// it has a class.
    pub fn missing_class(&self) -> bool {
        self.is_manual() && self.class_name.is_empty()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Annotation {
    #[serde(default)]
    pub id: String,
    pub class_name: String,
    pub bbox: BBox,
    #[serde(default)]
    pub source: Source,
    #[serde(default)]
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(rename = "segPolygon", default, skip_serializing_if = "Option::is_none")]
    pub seg_polygon: Option<Vec<Point>>,
    #[serde(
        rename = "originalSegPolygon",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub original_seg_polygon: Option<Vec<Point>>,
    #[serde(rename = "segMethod", default, skip_serializing_if = "Option::is_none")]
    pub seg_method: Option<SegMethod>,
}

impl Annotation {
    /// Geometry equality: box and polygon, ignoring class and provenance.
    pub fn same_shape(&self, other: &Annotation) -> bool {
        self.bbox == other.bbox && self.seg_polygon == other.seg_polygon
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bbox_from_corners_normalizes() {
        let bbox = BBox::from_corners(Point::new(30.0, 5.0), Point::new(10.0, 25.0));
        assert_eq!(bbox, BBox::new(10.0, 5.0, 20.0, 20.0));
    }

    #[test]
    fn bbox_contains_edges() {
        let bbox = BBox::new(10.0, 10.0, 5.0, 5.0);
        assert!(bbox.contains(Point::new(10.0, 15.0)));
        assert!(bbox.contains(Point::new(15.0, 10.0)));
        assert!(!bbox.contains(Point::new(15.1, 10.0)));
    }

    #[test]
    fn annotation_wire_names() {
        let annotation = Annotation {
            id: "a".into(),
            class_name: "bolt".into(),
            bbox: BBox::new(1.0, 2.0, 3.0, 4.0),
            source: Source::Sam,
            created_at: "2024-01-01T00:00:00.000Z".into(),
            score: Some(0.5),
            seg_polygon: Some(vec![Point::new(1.0, 2.0)]),
            original_seg_polygon: None,
            seg_method: Some(SegMethod::Fallback),
        };
        let json = serde_json::to_value(&annotation).unwrap();
        assert_eq!(json["source"], "sam");
        assert_eq!(json["segMethod"], "fallback");
        assert!(json.get("segPolygon").is_some());
        assert!(json.get("originalSegPolygon").is_none());
    }

    #[test]
    fn loaded_annotation_defaults() {
        let text = r#"{"class_name":"nut","bbox":{"x":0,"y":0,"w":4,"h":4}}"#;
        let annotation: Annotation = serde_json::from_str(text).unwrap();
        assert!(annotation.id.is_empty());
        assert_eq!(annotation.source, Source::Template);
        assert!(annotation.seg_polygon.is_none());
    }
}
