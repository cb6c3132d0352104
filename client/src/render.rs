use std::f64::consts::PI;

use wasm_bindgen::JsValue;
use web_sys::CanvasRenderingContext2d;

use clicklabel_engine::geometry::View;
use clicklabel_engine::{BBox, Point};

use crate::state::State;

const BACKDROP: &str = "#d0d0d0";
const EDIT_POLYGON: &str = "#1a73e8";
const MANUAL_PREVIEW_STROKE: &str = "#ff9800";
const MANUAL_PREVIEW_FILL: &str = "rgba(255, 152, 0, 0.15)";
const PENDING_MANUAL_STROKE: &str = "#ff6f00";
const PENDING_MANUAL_FILL: &str = "rgba(255, 183, 77, 0.15)";
const DEBUG_ROI: &str = "#00bfa5";
const DEBUG_OUTER: &str = "#ffb300";
const DEBUG_TIGHT: &str = "#2962ff";
const DEBUG_CLICK: &str = "#d81b60";
const DEBUG_SCREEN_CROSS: &str = "#ff1744";
const DEBUG_IMAGE_CROSS: &str = "#1e88e5";
const LABEL_FONT: &str = "\"IBM Plex Sans\", system-ui, sans-serif";
const VERTEX_DRAW_RADIUS: f64 = 5.0;

/// Stroke width unit for a backing store of this size.
pub fn base_line(canvas_width: f64, canvas_height: f64) -> f64 {
    (canvas_width.min(canvas_height) * 0.0007).max(0.35)
}

/// Top-left of a label drawn above `bbox`, kept on the image.
pub fn label_origin(bbox: &BBox, label_height: f64) -> Point {
    Point::new(bbox.x.max(0.0), (bbox.y - label_height - 2.0).max(0.0))
}

/// Squares of side `size` sitting just outside each corner.
pub fn corner_markers(bbox: &BBox, size: f64) -> [BBox; 4] {
    [
        BBox::new(bbox.x - size, bbox.y - size, size, size),
        BBox::new(bbox.right(), bbox.y - size, size, size),
        BBox::new(bbox.x - size, bbox.bottom(), size, size),
        BBox::new(bbox.right(), bbox.bottom(), size, size),
    ]
}

struct Pen<'a> {
    ctx: &'a CanvasRenderingContext2d,
    base: f64,
    line_scale: f64,
}

struct BoxStyle<'a> {
    color: &'a str,
    width: f64,
    dashed: bool,
    alpha: f64,
    fill_alpha: f64,
}

impl Pen<'_> {
    fn dash(&self, dashed: bool) {
        let pattern = if dashed {
            js_sys::Array::of2(&JsValue::from_f64(6.0), &JsValue::from_f64(4.0))
        } else {
            js_sys::Array::new()
        };
        let _ = self.ctx.set_line_dash(&pattern);
    }

    fn bbox(&self, bbox: &BBox, style: BoxStyle) {
        let ctx = self.ctx;
        ctx.save();
        ctx.set_global_alpha(style.alpha);
        ctx.set_stroke_style_str(style.color);
        ctx.set_line_width(style.width / self.line_scale);
        self.dash(style.dashed);
        if style.fill_alpha > 0.0 {
            ctx.set_global_alpha(style.fill_alpha);
            ctx.set_fill_style_str(style.color);
            ctx.fill_rect(bbox.x, bbox.y, bbox.w, bbox.h);
            ctx.set_global_alpha(style.alpha);
        }
        ctx.stroke_rect(bbox.x, bbox.y, bbox.w, bbox.h);
        ctx.restore();
    }

    fn polygon(&self, points: &[Point], color: &str, width: f64, alpha: f64) {
        let Some((first, rest)) = points.split_first() else {
            return;
        };
        let ctx = self.ctx;
        ctx.save();
        ctx.set_global_alpha(alpha);
        ctx.set_stroke_style_str(color);
        ctx.set_line_width(width);
        self.dash(false);
        ctx.begin_path();
        ctx.move_to(first.x, first.y);
        for point in rest {
            ctx.line_to(point.x, point.y);
        }
        ctx.close_path();
        ctx.stroke();
        ctx.restore();
    }

    fn label(&self, bbox: &BBox, text: &str, color: &str, alpha: f64, size: f64) {
        let ctx = self.ctx;
        ctx.save();
        ctx.set_global_alpha(alpha);
        ctx.set_font(&format!("{}px {LABEL_FONT}", (12.0 * size).round()));
        let padding = 4.0;
        let text_width = ctx.measure_text(text).map(|m| m.width()).unwrap_or(0.0);
        let width = (text_width + padding * 2.0).ceil();
        let height = (16.0 * size).round();
        let origin = label_origin(bbox, height);
        ctx.set_fill_style_str("#ffffff");
        ctx.set_global_alpha(alpha * 0.9);
        ctx.fill_rect(origin.x, origin.y, width, height);
        ctx.set_stroke_style_str(color);
        ctx.set_line_width(1.0);
        self.dash(false);
        ctx.stroke_rect(origin.x, origin.y, width, height);
        ctx.set_global_alpha(alpha);
        ctx.set_fill_style_str(color);
        let _ = ctx.fill_text(text, origin.x + padding, origin.y + (12.0 * size).round());
        ctx.restore();
    }

    fn markers(&self, bbox: &BBox, color: &str) {
        let size = (self.base * 2.2).round().max(4.0);
        self.ctx.save();
        self.ctx.set_fill_style_str(color);
        for marker in corner_markers(bbox, size) {
            self.ctx.fill_rect(marker.x, marker.y, marker.w, marker.h);
        }
        self.ctx.restore();
    }

    fn vertices(&self, points: &[Point], color: &str, selected: Option<usize>) {
        let ctx = self.ctx;
        for (index, point) in points.iter().enumerate() {
            ctx.save();
            let fill = if selected == Some(index) { "#ffffff" } else { color };
            ctx.set_fill_style_str(fill);
            ctx.set_stroke_style_str(color);
            ctx.set_line_width(2.0);
            ctx.begin_path();
            let _ = ctx.arc(point.x, point.y, VERTEX_DRAW_RADIUS, 0.0, PI * 2.0);
            ctx.fill();
            ctx.stroke();
            ctx.restore();
        }
    }

    fn region(&self, bbox: &BBox, stroke: &str, fill: &str) {
        let ctx = self.ctx;
        ctx.save();
        ctx.set_stroke_style_str(stroke);
        ctx.set_fill_style_str(fill);
        ctx.set_line_width(self.base * 1.6 / self.line_scale);
        self.dash(true);
        ctx.stroke_rect(bbox.x, bbox.y, bbox.w, bbox.h);
        ctx.fill_rect(bbox.x, bbox.y, bbox.w, bbox.h);
        ctx.restore();
    }

    fn cross(&self, center: Point, half: f64, color: &str, width: f64) {
        let ctx = self.ctx;
        ctx.save();
        ctx.set_stroke_style_str(color);
        ctx.set_line_width(width);
        self.dash(false);
        ctx.begin_path();
        ctx.move_to(center.x - half, center.y);
        ctx.line_to(center.x + half, center.y);
        ctx.move_to(center.x, center.y - half);
        ctx.line_to(center.x, center.y + half);
        ctx.stroke();
        ctx.restore();
    }
}

fn apply_view(ctx: &CanvasRenderingContext2d, view: &View, dpr: f64) {
    let [a, b, c, d, e, f] = view.canvas_transform(dpr);
    let _ = ctx.set_transform(a, b, c, d, e, f);
}

/// Full repaint. `blink` is the alpha of the annotation under an edit
/// session, when one is running.
pub fn redraw(state: &State, blink: Option<f64>, dpr: f64) {
    let ctx = &state.ctx;
    let canvas_width = f64::from(state.canvas.width());
    let canvas_height = f64::from(state.canvas.height());
    let _ = ctx.set_transform(1.0, 0.0, 0.0, 1.0, 0.0, 0.0);
    ctx.clear_rect(0.0, 0.0, canvas_width, canvas_height);
    let Some(image) = &state.image else {
        return;
    };
    ctx.set_fill_style_str(BACKDROP);
    ctx.fill_rect(0.0, 0.0, canvas_width, canvas_height);

    let view = state.controller.live_view();
    apply_view(ctx, &view, dpr);
    let _ = ctx.draw_image_with_html_image_element(image, 0.0, 0.0);

    let editor = &state.editor;
    let pen = Pen {
        ctx,
        base: base_line(canvas_width, canvas_height),
        line_scale: view.scale.max(1.0),
    };
    let base = pen.base;
    let dragging = state.controller.is_dragging();
    let visibility = editor.visibility();

    if visibility.candidates {
        let selected = editor.selected_candidate_id();
        for candidate in editor.candidates() {
            let is_selected = selected == Some(candidate.id.as_str());
            let color = editor.color_for(&candidate.class_name);
            let alpha = if is_selected { 0.95 } else { 0.6 };
            pen.bbox(
                &candidate.bbox,
                BoxStyle {
                    color,
                    width: if is_selected { base * 2.0 } else { base * 0.8 },
                    dashed: !is_selected,
                    alpha,
                    fill_alpha: 0.0,
                },
            );
            if !dragging {
                if let Some(polygon) = &candidate.seg_polygon {
                    let width = if is_selected { base * 1.6 } else { base * 1.1 };
                    pen.polygon(polygon, color, width, alpha);
                }
                let text = if candidate.class_name.is_empty() && candidate.is_manual() {
                    "manual"
                } else {
                    candidate.class_name.as_str()
                };
                if !text.is_empty() {
                    pen.label(&candidate.bbox, text, color, alpha, 1.0);
                }
            }
            if is_selected {
                pen.markers(&candidate.bbox, color);
            }
        }
    }

    if visibility.annotations {
        let selected = editor.selected_annotation_id();
        let highlighted = editor.highlighted();
        let edit_mode = editor.seg_edit().active;
        let blink_alpha = blink.unwrap_or(1.0);
        for annotation in editor.shown_annotations().iter() {
            let is_selected = selected == Some(annotation.id.as_str());
            let color = editor.color_for(&annotation.class_name);
            let alpha = if is_selected { blink_alpha } else { 1.0 };
            pen.bbox(
                &annotation.bbox,
                BoxStyle {
                    color,
                    width: if is_selected { base * 2.0 } else { base * 1.2 },
                    dashed: is_selected && edit_mode,
                    alpha,
                    fill_alpha: 0.1,
                },
            );
            if dragging {
                continue;
            }
            if let Some(polygon) = &annotation.seg_polygon {
                let width = if is_selected { base * 2.6 } else { base * 2.0 };
                pen.polygon(polygon, color, width, alpha);
            }
            let size = if highlighted == Some(annotation.id.as_str()) {
                1.6
            } else {
                1.0
            };
            pen.label(&annotation.bbox, &annotation.class_name, color, 1.0, size);
        }
    }

    let seg = editor.seg_edit();
    if !dragging && seg.active {
        if let Some(polygon) = editor
            .selected_annotation()
            .and_then(|a| a.seg_polygon.as_deref())
            .filter(|p| !p.is_empty())
        {
            pen.polygon(polygon, EDIT_POLYGON, base * 2.4, 1.0);
            if seg.show_vertices {
                pen.vertices(polygon, EDIT_POLYGON, seg.selected_vertex);
            }
        }
    }

    if let Some(preview) = state.controller.manual_preview() {
        pen.region(&preview, MANUAL_PREVIEW_STROKE, MANUAL_PREVIEW_FILL);
    }
    if let Some(pending) = editor.pending_manual() {
        pen.region(&pending, PENDING_MANUAL_STROKE, PENDING_MANUAL_FILL);
    }

    if visibility.debug {
        draw_debug(state, &pen, &view, dpr);
    }
    let _ = ctx.set_transform(1.0, 0.0, 0.0, 1.0, 0.0, 0.0);
}

fn draw_debug(state: &State, pen: &Pen, view: &View, dpr: f64) {
    let base = pen.base;
    let editor = &state.editor;
    if let Some(debug) = editor.detect_debug() {
        if let Some(roi) = debug.roi_bbox {
            pen.bbox(
                &roi.to_bbox(),
                BoxStyle {
                    color: DEBUG_ROI,
                    width: base * 1.6,
                    dashed: true,
                    alpha: 0.9,
                    fill_alpha: 0.0,
                },
            );
        }
        if let Some(outer) = debug.outer_bbox {
            pen.bbox(
                &outer,
                BoxStyle {
                    color: DEBUG_OUTER,
                    width: base * 1.4,
                    dashed: true,
                    alpha: 0.9,
                    fill_alpha: 0.0,
                },
            );
        }
        if let Some(tight) = debug.tight_bbox {
            pen.bbox(
                &tight,
                BoxStyle {
                    color: DEBUG_TIGHT,
                    width: base * 1.8,
                    dashed: false,
                    alpha: 0.95,
                    fill_alpha: 0.0,
                },
            );
        }
    }
    let clicked = editor
        .detect_debug()
        .and_then(|debug| debug.clicked_image_xy)
        .or_else(|| editor.last_click());
    if let Some(point) = clicked {
        let ctx = pen.ctx;
        ctx.save();
        ctx.set_stroke_style_str(DEBUG_CLICK);
        ctx.set_line_width((base * 1.4).max(1.0));
        ctx.begin_path();
        let _ = ctx.arc(point.x, point.y, (base * 2.2).max(3.0), 0.0, PI * 2.0);
        ctx.stroke();
        ctx.restore();
    }

    if let Some((screen, image)) = editor.debug_pointer() {
        let _ = pen.ctx.set_transform(1.0, 0.0, 0.0, 1.0, 0.0, 0.0);
        pen.cross(
            Point::new(screen.x * dpr, screen.y * dpr),
            8.0 * dpr,
            DEBUG_SCREEN_CROSS,
            (base * 1.4).max(1.0),
        );
        apply_view(pen.ctx, view, dpr);
        pen.cross(image, 6.0, DEBUG_IMAGE_CROSS, (base * 1.6).max(1.0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_line_has_a_floor() {
        assert_eq!(base_line(100.0, 80.0), 0.35);
        assert!((base_line(4000.0, 3000.0) - 2.1).abs() < 1e-9);
    }

    #[test]
    fn label_sits_above_and_inside() {
        let origin = label_origin(&BBox::new(40.0, 50.0, 10.0, 10.0), 16.0);
        assert_eq!(origin, Point::new(40.0, 32.0));
        let origin = label_origin(&BBox::new(-3.0, 5.0, 10.0, 10.0), 16.0);
        assert_eq!(origin, Point::new(0.0, 0.0));
    }

    #[test]
    fn markers_hug_the_corners_from_outside() {
        let markers = corner_markers(&BBox::new(10.0, 20.0, 30.0, 40.0), 4.0);
        assert_eq!(markers[0], BBox::new(6.0, 16.0, 4.0, 4.0));
        assert_eq!(markers[1], BBox::new(40.0, 16.0, 4.0, 4.0));
        assert_eq!(markers[2], BBox::new(6.0, 60.0, 4.0, 4.0));
        assert_eq!(markers[3], BBox::new(40.0, 60.0, 4.0, 4.0));
    }
}
