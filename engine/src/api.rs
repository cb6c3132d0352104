//! Request and response shapes of the detection service, plus the endpoint
//! table used to build URLs.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

use crate::settings::{AutoMethod, ExcludeMode};
use crate::{Annotation, BBox, Point, SegMethod};

pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000";

/// Characters `encodeURIComponent` leaves alone.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, COMPONENT).to_string()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Endpoint {
    DetectPoint,
    SegmentCandidate,
    AutoAnnotate,
    Templates,
    Projects,
    DatasetProjects,
    CreateDatasetProject,
    DeleteDatasetProject(String),
    Dataset(String),
    DatasetImport,
    DatasetSelect,
    DatasetImage { project: String, file: String },
    SaveAnnotations,
    LoadAnnotations { project_name: String, image_key: String },
    ExportBBox,
    ExportSeg,
}

impl Endpoint {
    pub fn method(&self) -> Method {
        match self {
            Endpoint::Templates
            | Endpoint::Projects
            | Endpoint::DatasetProjects
            | Endpoint::Dataset(_)
            | Endpoint::DatasetImage { .. }
            | Endpoint::LoadAnnotations { .. } => Method::Get,
            Endpoint::DeleteDatasetProject(_) => Method::Delete,
            _ => Method::Post,
        }
    }

    pub fn path(&self) -> String {
        match self {
            Endpoint::DetectPoint => "/detect/point".into(),
            Endpoint::SegmentCandidate => "/segment/candidate".into(),
            Endpoint::AutoAnnotate => "/annotate/auto".into(),
            Endpoint::Templates => "/templates".into(),
            Endpoint::Projects => "/projects".into(),
            Endpoint::DatasetProjects | Endpoint::CreateDatasetProject => {
                "/dataset/projects".into()
            }
            Endpoint::DeleteDatasetProject(name) => {
                format!("/dataset/projects/{}", encode_component(name))
            }
            Endpoint::Dataset(name) => format!("/dataset/{}", encode_component(name)),
            Endpoint::DatasetImport => "/dataset/import".into(),
            Endpoint::DatasetSelect => "/dataset/select".into(),
            Endpoint::DatasetImage { project, file } => format!(
                "/dataset/{}/image/{}",
                encode_component(project),
                encode_component(file)
            ),
            Endpoint::SaveAnnotations => "/annotations/save".into(),
            Endpoint::LoadAnnotations {
                project_name,
                image_key,
            } => format!(
                "/annotations/load?project_name={}&image_key={}",
                encode_component(project_name),
                encode_component(image_key)
            ),
            Endpoint::ExportBBox => "/export/dataset/bbox".into(),
            Endpoint::ExportSeg => "/export/dataset/seg".into(),
        }
    }

    pub fn url(&self, base: &str) -> String {
        format!("{}{}", base.trim_end_matches('/'), self.path())
    }

    /// Banner text when the service gives no message of its own.
    pub fn fallback_message(&self) -> &'static str {
        match self {
            Endpoint::DetectPoint => "Detect failed",
            Endpoint::SegmentCandidate => "Segmentation failed",
            Endpoint::AutoAnnotate => "Auto annotate failed",
            Endpoint::Templates => "Templates fetch failed",
            Endpoint::Projects => "Projects fetch failed",
            Endpoint::DatasetProjects => "Project list failed",
            Endpoint::CreateDatasetProject => "Project create failed",
            Endpoint::DeleteDatasetProject(_) => "Project delete failed",
            Endpoint::Dataset(_) => "Dataset fetch failed",
            Endpoint::DatasetImport => "Dataset import failed",
            Endpoint::DatasetSelect => "Dataset select failed",
            Endpoint::DatasetImage { .. } => "Image load failed",
            Endpoint::SaveAnnotations => "Save annotations failed",
            Endpoint::LoadAnnotations { .. } => "Load annotations failed",
            Endpoint::ExportBBox | Endpoint::ExportSeg => "Dataset export failed",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ConfirmedAnnotation {
    pub class_name: String,
    pub bbox: BBox,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DetectPointRequest {
    pub image_id: String,
    pub project: String,
    pub x: f64,
    pub y: f64,
    pub roi_size: u32,
    pub scale_min: f64,
    pub scale_max: f64,
    pub scale_steps: u32,
    pub topk: u32,
    pub confirmed_boxes: Vec<BBox>,
    pub refine_contour: bool,
    pub confirmed_annotations: Vec<ConfirmedAnnotation>,
    pub exclude_enabled: bool,
    pub exclude_mode: ExcludeMode,
    pub exclude_center: bool,
    pub exclude_iou_threshold: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DetectResult {
    pub class_name: String,
    #[serde(default)]
    pub score: f64,
    pub bbox: BBox,
    #[serde(default)]
    pub template_name: String,
    #[serde(default)]
    pub scale: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contour: Option<Vec<Point>>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct RoiBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl RoiBox {
    pub fn to_bbox(self) -> BBox {
        BBox::from_corners(Point::new(self.x1, self.y1), Point::new(self.x2, self.y2))
    }
}

/// Diagnostic geometry some detectors attach; drawn by the debug overlay.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(default)]
pub struct DetectDebug {
    pub clicked_image_xy: Option<Point>,
    pub roi_bbox: Option<RoiBox>,
    pub outer_bbox: Option<BBox>,
    pub tight_bbox: Option<BBox>,
    pub match_score: Option<f64>,
    pub match_mode: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct DetectPointResponse {
    #[serde(default)]
    pub results: Vec<DetectResult>,
    #[serde(default)]
    pub debug: Option<DetectDebug>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SegmentCandidateRequest {
    pub image_id: String,
    pub bbox: BBox,
    pub click: Option<Point>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expand: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simplify_eps: Option<f64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SegmentMeta {
    #[serde(default)]
    pub device: String,
    pub method: SegMethod,
    #[serde(default)]
    pub area: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(default)]
pub struct SegmentCandidateResponse {
    pub ok: bool,
    pub polygon: Option<Vec<Point>>,
    pub bbox: Option<BBox>,
    pub meta: Option<SegmentMeta>,
    pub error: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AutoAnnotateRequest {
    pub image_id: String,
    pub project: String,
    pub threshold: f64,
    pub method: AutoMethod,
    pub roi_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_filter: Option<Vec<String>>,
    pub scale_min: f64,
    pub scale_max: f64,
    pub scale_steps: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stride: Option<u32>,
    pub project_name: String,
    pub image_key: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CreatedAnnotation {
    pub class_name: String,
    pub bbox: BBox,
    #[serde(default)]
    pub score: Option<f64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(default)]
pub struct AutoAnnotateResponse {
    pub added_count: u32,
    pub rejected_count: u32,
    pub threshold: f64,
    pub created_annotations: Option<Vec<CreatedAnnotation>>,
    pub preview_image_url: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TemplateClass {
    pub class_name: String,
    #[serde(default)]
    pub count: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ProjectTemplates {
    pub name: String,
    #[serde(default)]
    pub classes: Vec<TemplateClass>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DatasetImageEntry {
    #[serde(default)]
    pub original_filename: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub internal_id: String,
    #[serde(default)]
    pub import_order: u32,
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
}

impl DatasetImageEntry {
    /// Key used for annotation storage and image URLs.
    pub fn key(&self) -> &str {
        if self.original_filename.is_empty() {
            self.filename.as_deref().unwrap_or("")
        } else {
            &self.original_filename
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(default)]
pub struct DatasetInfo {
    pub project_name: String,
    pub images: Vec<DatasetImageEntry>,
    pub total_images: u32,
    pub annotated_images: u32,
    pub bbox_count: u32,
    pub seg_count: u32,
    pub updated_at: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ProjectNameRequest {
    pub project_name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(default)]
pub struct DatasetImportResponse {
    pub project_name: String,
    pub count: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SelectImageRequest {
    pub project_name: String,
    pub filename: String,
}

/// Server-side handle and native size of the image being annotated.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ImageInfo {
    pub image_id: String,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SaveAnnotationsRequest {
    pub project_name: String,
    pub image_key: String,
    pub annotations: Vec<Annotation>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(default)]
pub struct LoadAnnotationsResponse {
    pub ok: bool,
    pub annotations: Vec<Annotation>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(default)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ExportDatasetRequest {
    pub project_name: String,
    pub project: String,
    pub split_train: u32,
    pub split_val: u32,
    pub split_test: u32,
    pub seed: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_negatives: Option<bool>,
    pub output_dir: String,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct SplitCounts {
    pub train: u32,
    pub val: u32,
    pub test: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(default)]
pub struct ExportResponse {
    pub ok: bool,
    pub output_dir: Option<String>,
    pub export_id: Option<String>,
    pub counts: Option<SplitCounts>,
    pub error: Option<String>,
}
