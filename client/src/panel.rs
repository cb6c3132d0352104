use wasm_bindgen::JsCast;
use web_sys::{
    Document, Element, Event, HtmlElement, HtmlInputElement, HtmlOptionElement, HtmlSelectElement,
};

use clicklabel_engine::api::DatasetInfo;
use clicklabel_engine::editor::Editor;
use clicklabel_engine::Source;

/// A click on anything carrying `data-action`, resolved by walking up from
/// the event target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PanelAction {
    SelectCandidate(String),
    Confirm,
    Reject,
    NextCandidate,
    Segment,
    SelectAnnotation(String),
    ToggleChecked(String),
    CheckAll(bool),
    DeleteChecked,
    DeleteAnnotation,
    Undo,
    Redo,
    SegEdit,
    SegVertices,
    SegUndo,
    SegReset,
    SegSimplify,
    CancelManual,
    AutoRun,
    AutoUndo,
    ToggleCandidates,
    ToggleAnnotations,
    ToggleDebug,
    ResetView,
    OpenImage(String),
    CreateDataset,
    DeleteDataset,
    Refresh,
    SaveParams,
    Export,
    DismissBanner,
    HideHints,
}

impl PanelAction {
    fn parse(action: &str, id: Option<String>) -> Option<Self> {
        let with_id = |make: fn(String) -> PanelAction| id.clone().map(make);
        Some(match action {
            "select-candidate" => return with_id(PanelAction::SelectCandidate),
            "select-annotation" => return with_id(PanelAction::SelectAnnotation),
            "toggle-checked" => return with_id(PanelAction::ToggleChecked),
            "open-image" => return with_id(PanelAction::OpenImage),
            "confirm" => PanelAction::Confirm,
            "reject" => PanelAction::Reject,
            "next-candidate" => PanelAction::NextCandidate,
            "segment" => PanelAction::Segment,
            "check-all" => PanelAction::CheckAll(true),
            "uncheck-all" => PanelAction::CheckAll(false),
            "delete-checked" => PanelAction::DeleteChecked,
            "delete-annotation" => PanelAction::DeleteAnnotation,
            "undo" => PanelAction::Undo,
            "redo" => PanelAction::Redo,
            "seg-edit" => PanelAction::SegEdit,
            "seg-vertices" => PanelAction::SegVertices,
            "seg-undo" => PanelAction::SegUndo,
            "seg-reset" => PanelAction::SegReset,
            "seg-simplify" => PanelAction::SegSimplify,
            "cancel-manual" => PanelAction::CancelManual,
            "auto-run" => PanelAction::AutoRun,
            "auto-undo" => PanelAction::AutoUndo,
            "toggle-candidates" => PanelAction::ToggleCandidates,
            "toggle-annotations" => PanelAction::ToggleAnnotations,
            "toggle-debug" => PanelAction::ToggleDebug,
            "reset-view" => PanelAction::ResetView,
            "create-dataset" => PanelAction::CreateDataset,
            "delete-dataset" => PanelAction::DeleteDataset,
            "refresh" => PanelAction::Refresh,
            "save-params" => PanelAction::SaveParams,
            "export" => PanelAction::Export,
            "dismiss-banner" => PanelAction::DismissBanner,
            "hide-hints" => PanelAction::HideHints,
            _ => return None,
        })
    }
}

pub fn panel_action_from_event(event: &Event) -> Option<PanelAction> {
    let mut current = event
        .target()
        .and_then(|target| target.dyn_into::<Element>().ok());
    while let Some(element) = current {
        if element.has_attribute("disabled") {
            return None;
        }
        if let Some(action) = element.get_attribute("data-action") {
            return PanelAction::parse(&action, element.get_attribute("data-id"));
        }
        current = element.parent_element();
    }
    None
}

/// An `<input>` or `<select>` tagged with `data-setting` changed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SettingChange {
    pub name: String,
    pub value: String,
    pub checked: bool,
}

pub fn setting_from_event(event: &Event) -> Option<SettingChange> {
    let element = event.target()?.dyn_into::<Element>().ok()?;
    let name = element.get_attribute("data-setting")?;
    if let Some(input) = element.dyn_ref::<HtmlInputElement>() {
        return Some(SettingChange {
            name,
            value: input.value(),
            checked: input.checked(),
        });
    }
    let select = element.dyn_ref::<HtmlSelectElement>()?;
    Some(SettingChange {
        name,
        value: select.value(),
        checked: false,
    })
}

fn element(document: &Document, tag: &str, class: &str) -> Option<HtmlElement> {
    let element = document.create_element(tag).ok()?.dyn_into::<HtmlElement>().ok()?;
    if !class.is_empty() {
        let _ = element.set_attribute("class", class);
    }
    Some(element)
}

fn swatch(document: &Document, color: &str) -> Option<HtmlElement> {
    let swatch = element(document, "span", "swatch")?;
    let _ = swatch.style().set_property("background", color);
    Some(swatch)
}

fn empty_note(document: &Document, list: &HtmlElement, text: &str) {
    if let Some(note) = element(document, "div", "empty") {
        note.set_text_content(Some(text));
        let _ = list.append_child(&note);
    }
}

pub fn render_candidates(document: &Document, list: &HtmlElement, editor: &Editor) {
    list.set_inner_html("");
    let candidates = editor.candidates();
    if candidates.is_empty() {
        empty_note(document, list, "No candidates yet. Click the image to detect.");
        return;
    }
    let selected = editor.selected_candidate_id();
    for (index, candidate) in candidates.iter().enumerate() {
        let class = if selected == Some(candidate.id.as_str()) {
            "item selected"
        } else {
            "item"
        };
        let Some(item) = element(document, "div", class) else {
            continue;
        };
        let _ = item.set_attribute("data-action", "select-candidate");
        let _ = item.set_attribute("data-id", &candidate.id);

        if let Some(title) = element(document, "div", "item-title") {
            if let Some(swatch) = swatch(document, editor.color_for(&candidate.class_name)) {
                let _ = title.append_child(&swatch);
            }
            let name = if candidate.missing_class() {
                "manual (pick a class)"
            } else {
                candidate.class_name.as_str()
            };
            let _ = title.insert_adjacent_text("beforeend", &format!("{}. {name}", index + 1));
            let _ = item.append_child(&title);
        }

        let mut details = Vec::new();
        if let Some(score) = candidate.score {
            details.push(format!("score: {score:.4}"));
        }
        if let Some(template) = candidate.template.as_deref().filter(|t| !t.is_empty()) {
            details.push(format!("template: {template}"));
        }
        if let Some(scale) = candidate.scale {
            details.push(format!("scale: {scale:.3}"));
        }
        let b = candidate.bbox;
        details.push(format!("bbox: ({}, {}, {}, {})", b.x, b.y, b.w, b.h));
        if let Some(polygon) = &candidate.seg_polygon {
            let method = candidate
                .seg_method
                .map(|m| format!(" via {m:?}").to_lowercase())
                .unwrap_or_default();
            details.push(format!("polygon: {} points{method}", polygon.len()));
        }
        for line in details {
            if let Some(detail) = element(document, "div", "item-detail") {
                detail.set_text_content(Some(&line));
                let _ = item.append_child(&detail);
            }
        }
        let _ = list.append_child(&item);
    }
}

fn source_label(source: Source) -> &'static str {
    match source {
        Source::Template => "template",
        Source::Manual => "manual",
        Source::Sam => "sam",
    }
}

pub fn render_annotations(document: &Document, list: &HtmlElement, editor: &Editor) {
    list.set_inner_html("");
    let shown = editor.shown_annotations();
    if shown.is_empty() {
        empty_note(document, list, "No annotations.");
        return;
    }
    let selected = editor.selected_annotation_id();
    let highlighted = editor.highlighted();
    for annotation in shown.iter() {
        let id = annotation.id.as_str();
        let class = match (selected == Some(id), highlighted == Some(id)) {
            (_, true) => "item selected highlighted",
            (true, false) => "item selected",
            _ => "item",
        };
        let Some(row) = element(document, "div", class) else {
            continue;
        };

        if let Some(check) = element(document, "input", "item-check") {
            let _ = check.set_attribute("type", "checkbox");
            let _ = check.set_attribute("data-action", "toggle-checked");
            let _ = check.set_attribute("data-id", id);
            if let Some(input) = check.dyn_ref::<HtmlInputElement>() {
                input.set_checked(editor.is_checked(id));
            }
            let _ = row.append_child(&check);
        }

        if let Some(label) = element(document, "span", "item-title") {
            let _ = label.set_attribute("data-action", "select-annotation");
            let _ = label.set_attribute("data-id", id);
            if let Some(swatch) = swatch(document, editor.color_for(&annotation.class_name)) {
                let _ = label.append_child(&swatch);
            }
            let mut text = format!("{} ({})", annotation.class_name, source_label(annotation.source));
            if annotation.seg_polygon.is_some() {
                text.push_str(" + polygon");
            }
            let _ = label.insert_adjacent_text("beforeend", &text);
            let _ = row.append_child(&label);
        }
        let _ = list.append_child(&row);
    }
}

pub fn render_images(
    document: &Document,
    list: &HtmlElement,
    dataset: Option<&DatasetInfo>,
    current: Option<&str>,
) {
    list.set_inner_html("");
    let Some(dataset) = dataset else {
        empty_note(document, list, "Choose a dataset project.");
        return;
    };
    if dataset.images.is_empty() {
        empty_note(document, list, "No images imported yet.");
        return;
    }
    for entry in &dataset.images {
        let key = entry.key();
        let class = if current == Some(key) {
            "image-entry active"
        } else {
            "image-entry"
        };
        let Some(button) = element(document, "button", class) else {
            continue;
        };
        let _ = button.set_attribute("type", "button");
        let _ = button.set_attribute("data-action", "open-image");
        let _ = button.set_attribute("data-id", key);
        button.set_text_content(Some(key));
        let _ = list.append_child(&button);
    }
}

/// Rebuilds the options only when the list itself changed, so an open
/// dropdown is not reset by unrelated redraws.
pub fn fill_select(
    select: &HtmlSelectElement,
    options: &[String],
    selected: Option<&str>,
    placeholder: Option<&str>,
) {
    let signature = options.join("\u{1f}");
    if select.get_attribute("data-options").as_deref() != Some(signature.as_str()) {
        select.set_inner_html("");
        if let Some(placeholder) = placeholder {
            if let Ok(option) = HtmlOptionElement::new_with_text_and_value(placeholder, "") {
                let _ = select.append_child(&option);
            }
        }
        for value in options {
            if let Ok(option) = HtmlOptionElement::new_with_text_and_value(value, value) {
                let _ = select.append_child(&option);
            }
        }
        let _ = select.set_attribute("data-options", &signature);
    }
    select.set_value(selected.unwrap_or(""));
}

/// `<option>`s of a `<datalist>`.
pub fn fill_datalist(document: &Document, list: &Element, values: &[String]) {
    list.set_inner_html("");
    for value in values {
        if let Ok(option) = document.create_element("option") {
            let _ = option.set_attribute("value", value);
            let _ = list.append_child(&option);
        }
    }
}
