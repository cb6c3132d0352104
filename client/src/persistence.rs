use std::collections::BTreeMap;

use gloo::storage::{LocalStorage, Storage};
use serde::de::DeserializeOwned;
use serde::Serialize;

use clicklabel_engine::settings::{
    auto_params_key, class_filter_key, color_map_key, detect_params_key, parse_or_default,
    AutoParams, ClassFilter, ColorMap, DetectParams, ViewState, EXPORT_DIR_HISTORY_KEY,
    HIDE_HINTS_KEY, TEMPLATE_BY_DATASET_KEY, VIEW_STATE_KEY,
};

/// Missing or malformed entries read back as the default.
fn load<T: DeserializeOwned + Default>(key: &str) -> T {
    let raw = LocalStorage::raw().get_item(key).ok().flatten();
    parse_or_default(raw.as_deref())
}

fn save<T: Serialize>(key: &str, value: &T) {
    if let Err(err) = LocalStorage::set(key, value) {
        log::warn!("could not persist {key}: {err}");
    }
}

pub struct ProjectSettings {
    pub detect: DetectParams,
    pub auto: AutoParams,
    pub colors: ColorMap,
}

pub fn load_project_settings(project: &str) -> ProjectSettings {
    ProjectSettings {
        detect: load(&detect_params_key(project)),
        auto: load(&auto_params_key(project)),
        colors: load(&color_map_key(project)),
    }
}

pub fn save_color_map(project: &str, colors: &ColorMap) {
    save(&color_map_key(project), colors);
}

pub fn save_detect_params(project: &str, params: &DetectParams) {
    save(&detect_params_key(project), params);
}

pub fn save_auto_params(project: &str, params: &AutoParams) {
    save(&auto_params_key(project), params);
}

pub fn load_view_state() -> ViewState {
    load(VIEW_STATE_KEY)
}

pub fn save_view_state(view: &ViewState) {
    save(VIEW_STATE_KEY, view);
}

pub fn load_class_filter(dataset: &str) -> ClassFilter {
    load(&class_filter_key(dataset))
}

pub fn save_class_filter(dataset: &str, filter: &ClassFilter) {
    save(&class_filter_key(dataset), filter);
}

/// Template project last used with each dataset project.
pub fn load_template_by_dataset() -> BTreeMap<String, String> {
    load(TEMPLATE_BY_DATASET_KEY)
}

pub fn save_template_by_dataset(map: &BTreeMap<String, String>) {
    save(TEMPLATE_BY_DATASET_KEY, map);
}

pub fn load_export_dirs() -> Vec<String> {
    load(EXPORT_DIR_HISTORY_KEY)
}

pub fn save_export_dirs(dirs: &[String]) {
    save(EXPORT_DIR_HISTORY_KEY, &dirs);
}

pub fn load_hide_hints() -> bool {
    load(HIDE_HINTS_KEY)
}

pub fn save_hide_hints(hidden: bool) {
    save(HIDE_HINTS_KEY, &hidden);
}
