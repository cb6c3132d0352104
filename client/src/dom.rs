use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    Document, Element, Event, HtmlCanvasElement, HtmlElement, HtmlInputElement,
    HtmlSelectElement, KeyboardEvent, MouseEvent, WheelEvent, Window,
};

use clicklabel_engine::geometry::{ImageSize, Viewport};
use clicklabel_engine::gesture::{Button, KeyInput, Modifiers, PointerInput, WheelInput};
use clicklabel_engine::hit_test::Cursor;
use clicklabel_engine::Point;

pub fn get_element<T: JsCast>(document: &Document, id: &str) -> Result<T, JsValue> {
    let element = document
        .get_element_by_id(id)
        .ok_or_else(|| JsValue::from_str(&format!("Missing element: {id}")))?;
    element
        .dyn_into::<T>()
        .map_err(|_| JsValue::from_str(&format!("Invalid element type: {id}")))
}

/// Handles to every element the app updates after start-up.
pub struct Ui {
    pub canvas: HtmlCanvasElement,
    pub canvas_hint: Element,
    pub banner: Element,
    pub banner_text: Element,
    pub notice: Element,
    pub busy: Element,
    pub template_select: HtmlSelectElement,
    pub dataset_select: HtmlSelectElement,
    pub dataset_name: HtmlInputElement,
    pub dataset_stats: Element,
    pub import_files: HtmlInputElement,
    pub image_list: HtmlElement,
    pub candidate_list: HtmlElement,
    pub candidate_class: HtmlSelectElement,
    pub annotation_list: HtmlElement,
    pub class_color: HtmlInputElement,
    pub class_filter: HtmlSelectElement,
    pub manual_panel: Element,
    pub manual_class: HtmlSelectElement,
    pub undo_button: Element,
    pub redo_button: Element,
    pub confirm_button: Element,
    pub reject_button: Element,
    pub segment_button: Element,
    pub delete_checked: Element,
    pub seg_edit_button: Element,
    pub seg_vertices_button: Element,
    pub seg_undo_button: Element,
    pub auto_run: Element,
    pub auto_undo: Element,
    pub auto_progress: HtmlElement,
    pub auto_summary: Element,
    pub params_dirty: Element,
    pub toggle_candidates: Element,
    pub toggle_annotations: Element,
    pub toggle_debug: Element,
    pub export_preview: Element,
    pub export_dirs: Element,
    pub debug_info: Element,
    pub hints: Element,
}

impl Ui {
    pub fn lookup(document: &Document) -> Result<Self, JsValue> {
        Ok(Self {
            canvas: get_element(document, "canvas")?,
            canvas_hint: get_element(document, "canvasHint")?,
            banner: get_element(document, "banner")?,
            banner_text: get_element(document, "bannerText")?,
            notice: get_element(document, "notice")?,
            busy: get_element(document, "busy")?,
            template_select: get_element(document, "templateSelect")?,
            dataset_select: get_element(document, "datasetSelect")?,
            dataset_name: get_element(document, "datasetName")?,
            dataset_stats: get_element(document, "datasetStats")?,
            import_files: get_element(document, "importFiles")?,
            image_list: get_element(document, "imageList")?,
            candidate_list: get_element(document, "candidateList")?,
            candidate_class: get_element(document, "candidateClass")?,
            annotation_list: get_element(document, "annotationList")?,
            class_color: get_element(document, "classColor")?,
            class_filter: get_element(document, "classFilter")?,
            manual_panel: get_element(document, "manualPanel")?,
            manual_class: get_element(document, "manualClass")?,
            undo_button: get_element(document, "undoButton")?,
            redo_button: get_element(document, "redoButton")?,
            confirm_button: get_element(document, "confirmButton")?,
            reject_button: get_element(document, "rejectButton")?,
            segment_button: get_element(document, "segmentButton")?,
            delete_checked: get_element(document, "deleteCheckedButton")?,
            seg_edit_button: get_element(document, "segEditButton")?,
            seg_vertices_button: get_element(document, "segVerticesButton")?,
            seg_undo_button: get_element(document, "segUndoButton")?,
            auto_run: get_element(document, "autoRunButton")?,
            auto_undo: get_element(document, "autoUndoButton")?,
            auto_progress: get_element(document, "autoProgress")?,
            auto_summary: get_element(document, "autoSummary")?,
            params_dirty: get_element(document, "paramsDirty")?,
            toggle_candidates: get_element(document, "toggleCandidates")?,
            toggle_annotations: get_element(document, "toggleAnnotations")?,
            toggle_debug: get_element(document, "toggleDebug")?,
            export_preview: get_element(document, "exportPreview")?,
            export_dirs: get_element(document, "exportDirs")?,
            debug_info: get_element(document, "debugInfo")?,
            hints: get_element(document, "hints")?,
        })
    }
}

pub fn set_pressed(element: &Element, active: bool) {
    let pressed = if active { "true" } else { "false" };
    let _ = element.set_attribute("aria-pressed", pressed);
}

pub fn set_disabled(element: &Element, disabled: bool) {
    if disabled {
        let _ = element.set_attribute("disabled", "");
    } else {
        let _ = element.remove_attribute("disabled");
    }
}

pub fn set_hidden(element: &Element, hidden: bool) {
    if hidden {
        let _ = element.set_attribute("hidden", "");
    } else {
        let _ = element.remove_attribute("hidden");
    }
}

pub fn set_text(element: &Element, text: &str) {
    element.set_text_content(Some(text));
}

pub fn set_cursor(canvas: &HtmlCanvasElement, cursor: Cursor) {
    let _ = canvas.style().set_property("cursor", cursor.as_css());
}

/// Backing store at device resolution; the CSS box keeps the image's aspect.
pub fn size_canvas_to_image(window: &Window, canvas: &HtmlCanvasElement, image: ImageSize) {
    let dpr = window.device_pixel_ratio();
    canvas.set_width((image.width * dpr).round() as u32);
    canvas.set_height((image.height * dpr).round() as u32);
    let style = canvas.style();
    let _ = style.set_property("width", &format!("{}px", image.width));
    let _ = style.set_property("aspect-ratio", &format!("{} / {}", image.width, image.height));
}

pub fn viewport(window: &Window, canvas: &HtmlCanvasElement, image: ImageSize) -> Option<Viewport> {
    let rect = canvas.get_bounding_client_rect();
    if rect.width() <= 0.0 || rect.height() <= 0.0 {
        return None;
    }
    Some(Viewport {
        rect_left: rect.left(),
        rect_top: rect.top(),
        rect_width: rect.width(),
        rect_height: rect.height(),
        canvas_width: f64::from(canvas.width()),
        canvas_height: f64::from(canvas.height()),
        dpr: window.device_pixel_ratio(),
        image,
    })
}

pub fn pointer_input(event: &MouseEvent) -> PointerInput {
    PointerInput {
        client: Point::new(f64::from(event.client_x()), f64::from(event.client_y())),
        button: Button::from_code(event.button()),
        modifiers: Modifiers {
            shift: event.shift_key(),
            ctrl: event.ctrl_key(),
            meta: event.meta_key(),
            alt: event.alt_key(),
        },
    }
}

pub fn wheel_input(event: &WheelEvent) -> WheelInput {
    WheelInput {
        client: Point::new(f64::from(event.client_x()), f64::from(event.client_y())),
        delta_y: event.delta_y(),
        ctrl: event.ctrl_key() || event.meta_key(),
    }
}

pub fn key_input(event: &KeyboardEvent) -> KeyInput {
    KeyInput {
        key: event.key(),
        code: event.code(),
        modifiers: Modifiers {
            shift: event.shift_key(),
            ctrl: event.ctrl_key(),
            meta: event.meta_key(),
            alt: event.alt_key(),
        },
        in_text_field: in_text_field(event),
    }
}

fn in_text_field(event: &Event) -> bool {
    let Some(element) = event
        .target()
        .and_then(|target| target.dyn_into::<Element>().ok())
    else {
        return false;
    };
    if matches!(element.tag_name().as_str(), "INPUT" | "TEXTAREA" | "SELECT") {
        return true;
    }
    element
        .dyn_ref::<HtmlElement>()
        .is_some_and(HtmlElement::is_content_editable)
}
