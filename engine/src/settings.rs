use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::api::DEFAULT_API_BASE;
use crate::Annotation;

pub const KEY_PREFIX: &str = "clicklabel.";
pub const VIEW_STATE_KEY: &str = "clicklabel.viewState.v1";
pub const TEMPLATE_BY_DATASET_KEY: &str = "clicklabel.templateByDataset";
pub const EXPORT_DIR_HISTORY_KEY: &str = "clicklabel.exportDirHistory";
pub const HIDE_HINTS_KEY: &str = "clicklabel.hideHints";
pub const EXPORT_DIR_HISTORY_LEN: usize = 8;
pub const DEFAULT_SIMPLIFY_EPS: f64 = 2.0;

/// class name -> `#rrggbb`
pub type ColorMap = BTreeMap<String, String>;

pub fn color_map_key(project: &str) -> String {
    format!("{KEY_PREFIX}colorMap.{project}")
}

pub fn detect_params_key(project: &str) -> String {
    format!("{KEY_PREFIX}advanced.{project}")
}

pub fn auto_params_key(project: &str) -> String {
    format!("{KEY_PREFIX}auto.{project}")
}

pub fn class_filter_key(dataset: &str) -> String {
    format!("{KEY_PREFIX}classFilter.{dataset}")
}

/// Decode a stored blob, falling back to defaults when it is missing or
/// does not parse.
pub fn parse_or_default<T: DeserializeOwned + Default>(raw: Option<&str>) -> T {
    let Some(text) = raw else {
        return T::default();
    };
    match serde_json::from_str(text) {
        Ok(value) => value,
        Err(err) => {
            log::debug!("discarding stored settings: {err}");
            T::default()
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExcludeMode {
    #[default]
    SameClass,
    AnyClass,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AutoMethod {
    #[default]
    Combined,
    ScaledTemplates,
}

/// Detection parameters remembered per template project.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DetectParams {
    pub roi_size: u32,
    pub topk: u32,
    pub scale_min: f64,
    pub scale_max: f64,
    pub scale_steps: u32,
    pub exclude_enabled: bool,
    pub exclude_mode: ExcludeMode,
    pub exclude_center: bool,
    pub exclude_iou_threshold: f64,
    pub refine_contour: bool,
}

impl Default for DetectParams {
    fn default() -> Self {
        Self {
            roi_size: 200,
            topk: 3,
            scale_min: 0.5,
            scale_max: 1.5,
            scale_steps: 12,
            exclude_enabled: true,
            exclude_mode: ExcludeMode::SameClass,
            exclude_center: true,
            exclude_iou_threshold: 0.6,
            refine_contour: false,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct AutoParams {
    #[serde(rename = "autoThreshold")]
    pub threshold: f64,
    #[serde(rename = "autoMethod")]
    pub method: AutoMethod,
    #[serde(rename = "autoClassFilter")]
    pub class_filter: Vec<String>,
    #[serde(rename = "autoStride")]
    pub stride: Option<u32>,
}

impl Default for AutoParams {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            method: AutoMethod::Combined,
            class_filter: Vec::new(),
            stride: None,
        }
    }
}

impl AutoParams {
    pub fn clipped_threshold(&self) -> f64 {
        if self.threshold.is_nan() {
            return 0.0;
        }
        self.threshold.clamp(0.0, 1.0)
    }

    pub fn effective_stride(&self) -> Option<u32> {
        self.stride.filter(|stride| *stride > 0)
    }

    pub fn effective_class_filter(&self) -> Option<Vec<String>> {
        (!self.class_filter.is_empty()).then(|| self.class_filter.clone())
    }
}

/// One `data-setting` form control as read from the page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldInput<'a> {
    pub value: &'a str,
    pub checked: bool,
}

/// Current value of a bound form control: text for inputs and selects,
/// a flag for checkboxes.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Text(String),
    Checked(bool),
}

fn parse_u32(value: &str) -> Option<u32> {
    value.trim().parse().ok()
}

fn parse_f64(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

impl ExcludeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ExcludeMode::SameClass => "same_class",
            ExcludeMode::AnyClass => "any_class",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "same_class" => Some(ExcludeMode::SameClass),
            "any_class" => Some(ExcludeMode::AnyClass),
            _ => None,
        }
    }
}

impl AutoMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            AutoMethod::Combined => "combined",
            AutoMethod::ScaledTemplates => "scaled_templates",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "combined" => Some(AutoMethod::Combined),
            "scaled_templates" => Some(AutoMethod::ScaledTemplates),
            _ => None,
        }
    }
}

impl DetectParams {
    pub fn field(&self, name: &str) -> Option<FieldValue> {
        Some(match name {
            "roi-size" => FieldValue::Text(self.roi_size.to_string()),
            "topk" => FieldValue::Text(self.topk.to_string()),
            "scale-min" => FieldValue::Text(self.scale_min.to_string()),
            "scale-max" => FieldValue::Text(self.scale_max.to_string()),
            "scale-steps" => FieldValue::Text(self.scale_steps.to_string()),
            "exclude-enabled" => FieldValue::Checked(self.exclude_enabled),
            "exclude-mode" => FieldValue::Text(self.exclude_mode.as_str().into()),
            "exclude-center" => FieldValue::Checked(self.exclude_center),
            "exclude-iou" => FieldValue::Text(self.exclude_iou_threshold.to_string()),
            "refine-contour" => FieldValue::Checked(self.refine_contour),
            _ => return None,
        })
    }

    /// Returns whether `name` is a detection field and the value parsed.
    pub fn set_field(&mut self, name: &str, input: &FieldInput) -> bool {
        let value = input.value;
        match name {
            "roi-size" => parse_u32(value).map(|v| self.roi_size = v.max(1)).is_some(),
            "topk" => parse_u32(value).map(|v| self.topk = v.max(1)).is_some(),
            "scale-min" => parse_f64(value).map(|v| self.scale_min = v).is_some(),
            "scale-max" => parse_f64(value).map(|v| self.scale_max = v).is_some(),
            "scale-steps" => parse_u32(value).map(|v| self.scale_steps = v.max(1)).is_some(),
            "exclude-enabled" => {
                self.exclude_enabled = input.checked;
                true
            }
            "exclude-mode" => ExcludeMode::parse(value)
                .map(|v| self.exclude_mode = v)
                .is_some(),
            "exclude-center" => {
                self.exclude_center = input.checked;
                true
            }
            "exclude-iou" => parse_f64(value)
                .map(|v| self.exclude_iou_threshold = v.clamp(0.0, 1.0))
                .is_some(),
            "refine-contour" => {
                self.refine_contour = input.checked;
                true
            }
            _ => false,
        }
    }
}

impl AutoParams {
    pub fn field(&self, name: &str) -> Option<FieldValue> {
        Some(match name {
            "auto-threshold" => FieldValue::Text(self.threshold.to_string()),
            "auto-method" => FieldValue::Text(self.method.as_str().into()),
            "auto-stride" => {
                FieldValue::Text(self.stride.map(|s| s.to_string()).unwrap_or_default())
            }
            "auto-classes" => FieldValue::Text(self.class_filter.join(", ")),
            _ => return None,
        })
    }

    pub fn set_field(&mut self, name: &str, input: &FieldInput) -> bool {
        let value = input.value;
        match name {
            "auto-threshold" => parse_f64(value).map(|v| self.threshold = v).is_some(),
            "auto-method" => AutoMethod::parse(value).map(|v| self.method = v).is_some(),
            "auto-stride" => {
                if value.trim().is_empty() {
                    self.stride = None;
                    return true;
                }
                parse_u32(value).map(|v| self.stride = Some(v)).is_some()
            }
            "auto-classes" => {
                self.class_filter = value
                    .split(',')
                    .map(str::trim)
                    .filter(|class| !class.is_empty())
                    .map(str::to_string)
                    .collect();
                true
            }
            _ => false,
        }
    }
}

/// Which screen the app was last showing.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
#[serde(tag = "view", rename_all = "lowercase")]
pub enum ViewState {
    #[default]
    Home,
    Project {
        #[serde(rename = "projectName")]
        project_name: String,
        #[serde(rename = "imageKey", default, skip_serializing_if = "Option::is_none")]
        image_key: Option<String>,
    },
}

/// Class shown in the annotation list; `None` shows every class.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
#[serde(default)]
pub struct ClassFilter {
    pub class_name: Option<String>,
}

impl ClassFilter {
    pub fn matches(&self, annotation: &Annotation) -> bool {
        match &self.class_name {
            Some(class_name) => &annotation.class_name == class_name,
            None => true,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    #[default]
    BBox,
    Seg,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExportSettings {
    pub kind: DatasetKind,
    pub split_train: u32,
    pub split_val: u32,
    pub split_test: u32,
    pub seed: u32,
    pub include_negatives: bool,
    pub output_dir: String,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            kind: DatasetKind::BBox,
            split_train: 7,
            split_val: 2,
            split_test: 1,
            seed: 42,
            include_negatives: true,
            output_dir: String::new(),
        }
    }
}

impl ExportSettings {
    pub fn field(&self, name: &str) -> Option<FieldValue> {
        Some(match name {
            "export-kind" => FieldValue::Text(
                match self.kind {
                    DatasetKind::BBox => "bbox",
                    DatasetKind::Seg => "seg",
                }
                .into(),
            ),
            "split-train" => FieldValue::Text(self.split_train.to_string()),
            "split-val" => FieldValue::Text(self.split_val.to_string()),
            "split-test" => FieldValue::Text(self.split_test.to_string()),
            "seed" => FieldValue::Text(self.seed.to_string()),
            "include-negatives" => FieldValue::Checked(self.include_negatives),
            "export-dir" => FieldValue::Text(self.output_dir.clone()),
            _ => return None,
        })
    }

    pub fn set_field(&mut self, name: &str, input: &FieldInput) -> bool {
        let value = input.value;
        match name {
            "export-kind" => match value {
                "bbox" => {
                    self.kind = DatasetKind::BBox;
                    true
                }
                "seg" => {
                    self.kind = DatasetKind::Seg;
                    true
                }
                _ => false,
            },
            "split-train" => parse_u32(value).map(|v| self.split_train = v).is_some(),
            "split-val" => parse_u32(value).map(|v| self.split_val = v).is_some(),
            "split-test" => parse_u32(value).map(|v| self.split_test = v).is_some(),
            "seed" => parse_u32(value).map(|v| self.seed = v).is_some(),
            "include-negatives" => {
                self.include_negatives = input.checked;
                true
            }
            "export-dir" => {
                self.output_dir = value.trim().to_string();
                true
            }
            _ => false,
        }
    }

    pub fn ratios(&self) -> [u32; 3] {
        [self.split_train, self.split_val, self.split_test]
    }

    /// Problems that block an export, in display order.
    pub fn validation_errors(&self) -> Vec<&'static str> {
        let mut errors = Vec::new();
        if self.split_train + self.split_val + self.split_test == 0 {
            errors.push("split ratios must not all be zero");
        }
        if self.output_dir.trim().is_empty() {
            errors.push("output directory is required");
        }
        errors
    }
}

/// Most-recent-first, deduplicated, bounded.
pub fn remember_export_dir(history: &mut Vec<String>, dir: &str) {
    let cleaned = dir.trim();
    if cleaned.is_empty() {
        return;
    }
    history.retain(|item| item != cleaned);
    history.insert(0, cleaned.to_string());
    history.truncate(EXPORT_DIR_HISTORY_LEN);
}

/// Settings read from the page URL (`?api=...&debug=1`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_base: String,
    pub debug: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            debug: false,
        }
    }
}

impl ClientConfig {
    pub fn from_query(search: &str) -> Self {
        let mut config = Self::default();
        if let Some(api) = query_param(search, "api").filter(|v| !v.trim().is_empty()) {
            config.api_base = api.trim().trim_end_matches('/').to_string();
        }
        if let Some(debug) = query_param(search, "debug") {
            config.debug = matches!(debug.as_str(), "1" | "true" | "yes" | "");
        }
        config
    }
}

fn query_param(search: &str, key: &str) -> Option<String> {
    let query = search.trim_start_matches('?');
    query.split('&').find_map(|pair| {
        let mut it = pair.splitn(2, '=');
        let name = it.next()?;
        let value = it.next().unwrap_or("");
        (name == key).then(|| url_decode(value))
    })
}

fn url_decode(value: &str) -> String {
    let value = value.replace('+', " ");
    percent_encoding::percent_decode_str(&value)
        .decode_utf8_lossy()
        .to_string()
}
