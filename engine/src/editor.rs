use std::borrow::Cow;
use std::collections::BTreeSet;

use crate::api::{
    AutoAnnotateRequest, AutoAnnotateResponse, ConfirmedAnnotation, DetectDebug,
    DetectPointRequest, DetectPointResponse, ImageInfo, LoadAnnotationsResponse,
    SaveAnnotationsRequest, SegmentCandidateRequest, SegmentCandidateResponse,
};
use crate::error::{ApiError, EditorError};
use crate::geometry::{clamp_bbox_to_image, clamp_point_to_image, nudge_box, ImageSize};
use crate::gesture::Intent;
use crate::history::{EditSession, History};
use crate::hit_test::Scene;
use crate::palette;
use crate::polygon::{clamp_to_image, simplify_polygon};
use crate::settings::{AutoParams, ClassFilter, ColorMap, DetectParams, DEFAULT_SIMPLIFY_EPS};
use crate::split::Mulberry32;
use crate::{Annotation, BBox, Candidate, Point, Source};

pub const HIGHLIGHT_MS: u32 = 1500;
pub const AUTO_PROGRESS_INTERVAL_MS: u32 = 400;
const AUTO_PROGRESS_STEP: u8 = 5;
const AUTO_PROGRESS_CAP: u8 = 90;

/// Identifies the image an async request was started for. Replies carrying
/// a ticket from an earlier image are dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ticket {
    generation: u64,
    target: Option<String>,
}

impl Ticket {
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }
}

#[derive(Debug)]
pub struct PendingRequest<T> {
    pub ticket: Ticket,
    pub body: T,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatasetImage {
    pub project_name: String,
    pub image_key: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LoadedImage {
    pub image_id: String,
    pub size: ImageSize,
    pub dataset: Option<DatasetImage>,
}

impl LoadedImage {
    pub fn from_info(info: &ImageInfo, dataset: Option<DatasetImage>) -> Self {
        Self {
            image_id: info.image_id.clone(),
            size: ImageSize::new(info.width, info.height),
            dataset,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Banner {
    pub error: Option<String>,
    pub notice: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Visibility {
    pub candidates: bool,
    pub annotations: bool,
    pub debug: bool,
}

impl Default for Visibility {
    fn default() -> Self {
        Self {
            candidates: true,
            annotations: true,
            debug: false,
        }
    }
}

/// Polygon editing of the selected annotation.
#[derive(Clone, Debug, PartialEq)]
pub struct SegEdit {
    pub active: bool,
    pub show_vertices: bool,
    pub selected_vertex: Option<usize>,
    undo: Vec<Vec<Point>>,
}

impl Default for SegEdit {
    fn default() -> Self {
        Self {
            active: false,
            show_vertices: true,
            selected_vertex: None,
            undo: Vec::new(),
        }
    }
}

impl SegEdit {
    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    fn leave(&mut self) {
        self.active = false;
        self.selected_vertex = None;
        self.undo.clear();
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AutoSummary {
    pub added: u32,
    pub rejected: u32,
    pub threshold: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AutoState {
    pub running: bool,
    pub progress: u8,
    pub summary: Option<AutoSummary>,
    last_added: Vec<String>,
}

impl AutoState {
    pub fn can_undo(&self) -> bool {
        !self.last_added.is_empty()
    }
}

#[derive(Debug, PartialEq)]
pub enum AutoOutcome {
    Stale,
    Failed,
    Appended(usize),
    /// The service stored its results itself; fetch the list again.
    ReloadNeeded(Ticket),
}

/// Follow-up work for the caller after routing an intent.
#[derive(Debug)]
pub enum Effect {
    None,
    Detect(PendingRequest<DetectPointRequest>),
    Segment(PendingRequest<SegmentCandidateRequest>),
    /// An annotation was selected; pan to `center` unless a drag is running.
    Focus { id: String, center: Point },
}

/// Owns everything the canvas and the side panels show for one image.
#[derive(Debug)]
pub struct Editor {
    id_prefix: String,
    next_id: u64,
    rng: Mulberry32,
    generation: u64,

    image: Option<LoadedImage>,
    project: Option<String>,
    pub detect_params: DetectParams,
    detect_baseline: DetectParams,
    pub auto_params: AutoParams,
    auto_baseline: AutoParams,
    pub simplify_eps: f64,

    candidates: Vec<Candidate>,
    selected_candidate: Option<String>,
    annotations: Vec<Annotation>,
    selected_annotation: Option<String>,
    checked: BTreeSet<String>,
    class_filter: ClassFilter,
    history: History,
    edit_session: Option<EditSession>,
    highlighted: Option<String>,

    manual_create_active: bool,
    pending_manual: Option<BBox>,
    seg: SegEdit,

    last_click: Option<Point>,
    detect_debug: Option<DetectDebug>,
    debug_pointer: Option<(Point, Point)>,
    visibility: Visibility,
    busy: bool,
    auto: AutoState,

    colors: ColorMap,
    colors_changed: bool,
    banner: Banner,
    dirty: bool,
    save_pending: bool,
}

impl Editor {
    pub fn new(id_prefix: impl Into<String>, seed: u32) -> Self {
        Self {
            id_prefix: id_prefix.into(),
            next_id: 0,
            rng: Mulberry32::new(seed),
            generation: 0,
            image: None,
            project: None,
            detect_params: DetectParams::default(),
            detect_baseline: DetectParams::default(),
            auto_params: AutoParams::default(),
            auto_baseline: AutoParams::default(),
            simplify_eps: DEFAULT_SIMPLIFY_EPS,
            candidates: Vec::new(),
            selected_candidate: None,
            annotations: Vec::new(),
            selected_annotation: None,
            checked: BTreeSet::new(),
            class_filter: ClassFilter::default(),
            history: History::new(),
            edit_session: None,
            highlighted: None,
            manual_create_active: false,
            pending_manual: None,
            seg: SegEdit::default(),
            last_click: None,
            detect_debug: None,
            debug_pointer: None,
            visibility: Visibility::default(),
            busy: false,
            auto: AutoState::default(),
            colors: ColorMap::new(),
            colors_changed: false,
            banner: Banner::default(),
            dirty: true,
            save_pending: false,
        }
    }

    fn make_id(&mut self) -> String {
        self.next_id += 1;
        format!("{}-{}", self.id_prefix, self.next_id)
    }

    fn ticket(&self, target: Option<String>) -> Ticket {
        Ticket {
            generation: self.generation,
            target,
        }
    }

    fn is_current(&self, ticket: &Ticket, what: &str) -> bool {
        if ticket.generation == self.generation {
            return true;
        }
        log::debug!(
            "dropping stale {what} reply (generation {} != {})",
            ticket.generation,
            self.generation
        );
        false
    }

    fn touch(&mut self) {
        self.dirty = true;
    }

    fn annotations_changed(&mut self) {
        self.dirty = true;
        self.save_pending = true;
        let ids: BTreeSet<&str> = self.annotations.iter().map(|a| a.id.as_str()).collect();
        self.checked.retain(|id| ids.contains(id.as_str()));
        if let Some(selected) = &self.selected_annotation {
            if !ids.contains(selected.as_str()) {
                self.selected_annotation = None;
                self.seg.leave();
            }
        }
        if let Some(highlighted) = &self.highlighted {
            if !ids.contains(highlighted.as_str()) {
                self.highlighted = None;
            }
        }
    }

    fn ensure_colors(&mut self, classes: Vec<String>) {
        let rng = &mut self.rng;
        if palette::assign_missing(
            &mut self.colors,
            classes.iter().map(String::as_str),
            || rng.next_f64(),
        ) {
            self.colors_changed = true;
        }
    }

    fn snapshot(&mut self) {
        self.history.push(self.annotations.clone());
    }

    fn normalize(&mut self, items: Vec<Annotation>, now: &str) -> Vec<Annotation> {
        items
            .into_iter()
            .map(|mut annotation| {
                if annotation.id.is_empty() {
                    annotation.id = self.make_id();
                }
                if annotation.created_at.is_empty() {
                    annotation.created_at = now.to_string();
                }
                annotation
            })
            .collect()
    }

    // ---- image & project ------------------------------------------------

    /// Switch to another image. Everything tied to the previous image is
    /// dropped and in-flight replies for it become stale.
    pub fn load_image(&mut self, image: LoadedImage, annotations: Vec<Annotation>, now: &str) {
        log::info!(
            "loading image {} ({}x{}, {} annotations)",
            image.image_id,
            image.size.width,
            image.size.height,
            annotations.len()
        );
        self.generation += 1;
        self.image = Some(image);
        self.annotations = self.normalize(annotations, now);
        self.candidates.clear();
        self.selected_candidate = None;
        self.selected_annotation = None;
        self.checked.clear();
        self.history.clear();
        self.edit_session = None;
        self.highlighted = None;
        self.manual_create_active = false;
        self.pending_manual = None;
        self.seg = SegEdit::default();
        self.last_click = None;
        self.detect_debug = None;
        self.debug_pointer = None;
        self.busy = false;
        self.auto = AutoState::default();
        self.banner = Banner::default();
        self.save_pending = false;
        let classes = self.annotations.iter().map(|a| a.class_name.clone()).collect();
        self.ensure_colors(classes);
        self.touch();
    }

    /// Template project plus the settings remembered for it.
    pub fn select_project(
        &mut self,
        project: Option<String>,
        detect: DetectParams,
        auto: AutoParams,
        colors: ColorMap,
    ) {
        self.project = project.filter(|name| !name.is_empty());
        self.detect_baseline = detect.clone();
        self.detect_params = detect;
        self.auto_baseline = auto.clone();
        self.auto_params = auto;
        self.colors = colors;
        self.colors_changed = false;
        let classes = self
            .annotations
            .iter()
            .map(|a| a.class_name.clone())
            .chain(self.candidates.iter().map(|c| c.class_name.clone()))
            .collect();
        self.ensure_colors(classes);
        self.touch();
    }

    pub fn image(&self) -> Option<&LoadedImage> {
        self.image.as_ref()
    }

    pub fn image_size(&self) -> Option<ImageSize> {
        self.image.as_ref().map(|image| image.size)
    }

    pub fn project(&self) -> Option<&str> {
        self.project.as_deref()
    }

    pub fn detect_params_changed(&self) -> bool {
        self.detect_params != self.detect_baseline
    }

    pub fn mark_detect_params_saved(&mut self) {
        self.detect_baseline = self.detect_params.clone();
    }

    pub fn auto_params_changed(&self) -> bool {
        self.auto_params != self.auto_baseline
    }

    // ---- detection ------------------------------------------------------

    fn manual_class_missing(&self) -> bool {
        self.selected_candidate()
            .is_some_and(Candidate::missing_class)
    }

    pub fn begin_detect(
        &mut self,
        point: Point,
    ) -> Result<PendingRequest<DetectPointRequest>, EditorError> {
        if self.manual_create_active || self.pending_manual.is_some() {
            return Err(EditorError::ManualBoxActive);
        }
        if self.manual_class_missing() {
            return Err(EditorError::MissingClass);
        }
        let image = self.image.as_ref().ok_or(EditorError::NoImage)?;
        let project = self.project.clone().ok_or(EditorError::NoProject)?;
        let point = clamp_point_to_image(point, image.size);
        let params = &self.detect_params;
        let body = DetectPointRequest {
            image_id: image.image_id.clone(),
            project,
            x: point.x,
            y: point.y,
            roi_size: params.roi_size,
            scale_min: params.scale_min,
            scale_max: params.scale_max,
            scale_steps: params.scale_steps,
            topk: params.topk,
            confirmed_boxes: self.annotations.iter().map(|a| a.bbox).collect(),
            refine_contour: params.refine_contour,
            confirmed_annotations: self
                .annotations
                .iter()
                .map(|a| ConfirmedAnnotation {
                    class_name: a.class_name.clone(),
                    bbox: a.bbox,
                })
                .collect(),
            exclude_enabled: params.exclude_enabled,
            exclude_mode: params.exclude_mode,
            exclude_center: params.exclude_center,
            exclude_iou_threshold: params.exclude_iou_threshold,
        };
        self.banner = Banner::default();
        self.last_click = Some(point);
        self.busy = true;
        self.touch();
        Ok(PendingRequest {
            ticket: self.ticket(None),
            body,
        })
    }

    /// Returns false when the reply was for an earlier image.
    pub fn finish_detect(
        &mut self,
        ticket: &Ticket,
        result: Result<DetectPointResponse, ApiError>,
    ) -> bool {
        if !self.is_current(ticket, "detect") {
            return false;
        }
        self.busy = false;
        self.touch();
        match result {
            Ok(response) => {
                self.detect_debug = response.debug;
                let mut candidates = Vec::with_capacity(response.results.len());
                for result in response.results {
                    candidates.push(Candidate {
                        id: self.make_id(),
                        class_name: result.class_name,
                        score: Some(result.score),
                        bbox: result.bbox,
                        source: Source::Template,
                        seg_polygon: None,
                        seg_method: None,
                        template: Some(result.template_name),
                        scale: Some(result.scale),
                    });
                }
                log::debug!("detect returned {} candidates", candidates.len());
                self.selected_candidate = candidates.first().map(|c| c.id.clone());
                let classes = candidates.iter().map(|c| c.class_name.clone()).collect();
                self.candidates = candidates;
                self.ensure_colors(classes);
            }
            Err(err) => {
                log::warn!("detect failed: {err}");
                self.banner.error = Some(err.banner_text("Detect failed"));
                self.detect_debug = None;
            }
        }
        true
    }

    // ---- candidates -----------------------------------------------------

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn selected_candidate_id(&self) -> Option<&str> {
        self.selected_candidate.as_deref()
    }

    pub fn selected_candidate(&self) -> Option<&Candidate> {
        let id = self.selected_candidate.as_deref()?;
        self.candidates.iter().find(|c| c.id == id)
    }

    fn selected_candidate_index(&self) -> Option<usize> {
        let id = self.selected_candidate.as_deref()?;
        self.candidates.iter().position(|c| c.id == id)
    }

    pub fn select_candidate(&mut self, id: &str) {
        if self.candidates.iter().any(|c| c.id == id) {
            self.selected_candidate = Some(id.to_string());
            self.touch();
        }
    }

    pub fn clear_candidate_selection(&mut self) {
        self.selected_candidate = None;
        self.touch();
    }

    pub fn next_candidate(&mut self) {
        if self.candidates.is_empty() {
            return;
        }
        let next = self
            .selected_candidate_index()
            .map_or(0, |index| (index + 1) % self.candidates.len());
        self.selected_candidate = Some(self.candidates[next].id.clone());
        self.touch();
    }

    /// Removes the selected candidate and returns the index it had.
    fn take_selected_candidate(&mut self) -> Option<(usize, Candidate)> {
        let index = self.selected_candidate_index()?;
        Some((index, self.candidates.remove(index)))
    }

    /// Discards the selected candidate; its neighbour becomes selected.
    pub fn reject_candidate(&mut self) -> Result<(), EditorError> {
        let (index, _) = self
            .take_selected_candidate()
            .ok_or(EditorError::NoCandidate)?;
        self.selected_candidate = self
            .candidates
            .get(index)
            .or_else(|| self.candidates.last())
            .map(|c| c.id.clone());
        self.touch();
        Ok(())
    }

    /// Promotes the selected candidate to an annotation and moves on to the
    /// next one, wrapping to the first.
    pub fn confirm_candidate(&mut self, now: &str) -> Result<String, EditorError> {
        let candidate = self
            .selected_candidate()
            .cloned()
            .ok_or(EditorError::NoCandidate)?;
        if candidate.missing_class() {
            self.banner.error = Some("Choose a class for the manual candidate".into());
            self.touch();
            return Err(EditorError::MissingClass);
        }

        self.snapshot();
        let source = if candidate.is_manual() {
            Source::Manual
        } else if candidate.seg_polygon.is_some() {
            Source::Sam
        } else {
            Source::Template
        };
        let score = candidate
            .score
            .or_else(|| candidate.is_manual().then_some(1.0));
        let id = self.make_id();
        self.annotations.push(Annotation {
            id: id.clone(),
            class_name: candidate.class_name.clone(),
            bbox: candidate.bbox,
            source,
            created_at: now.to_string(),
            score,
            original_seg_polygon: candidate.seg_polygon.clone(),
            seg_polygon: candidate.seg_polygon,
            seg_method: candidate.seg_method,
        });
        self.banner.notice = Some(format!("{} confirmed", candidate.class_name));

        if let Some((index, _)) = self.take_selected_candidate() {
            self.selected_candidate = self
                .candidates
                .get(index)
                .or_else(|| self.candidates.first())
                .map(|c| c.id.clone());
        }
        self.annotations_changed();
        Ok(id)
    }

    pub fn nudge_selected_candidate(&mut self, dx: f64, dy: f64) {
        let size = self.image_size();
        let Some(index) = self.selected_candidate_index() else {
            return;
        };
        let candidate = &mut self.candidates[index];
        candidate.bbox = nudge_box(candidate.bbox, dx, dy, size);
        self.touch();
    }

    pub fn set_candidate_bbox(&mut self, id: &str, bbox: BBox) {
        if let Some(candidate) = self.candidates.iter_mut().find(|c| c.id == id) {
            candidate.bbox = bbox;
            self.touch();
        }
    }

    /// Class for a manual candidate; detection stays blocked until one is set.
    pub fn set_candidate_class(&mut self, class_name: &str) -> Result<(), EditorError> {
        let index = self
            .selected_candidate_index()
            .ok_or(EditorError::NoCandidate)?;
        self.candidates[index].class_name = class_name.to_string();
        self.ensure_colors(vec![class_name.to_string()]);
        self.touch();
        Ok(())
    }

    /// Offers a drawn box as a manual candidate instead of asking for its
    /// class right away.
    pub fn propose_manual_candidate(&mut self, bbox: BBox) -> String {
        let id = self.make_id();
        self.candidates.push(Candidate::manual(id.clone(), bbox));
        self.selected_candidate = Some(id.clone());
        self.pending_manual = None;
        self.touch();
        id
    }

    // ---- segmentation ---------------------------------------------------

    pub fn begin_segment(
        &mut self,
    ) -> Result<PendingRequest<SegmentCandidateRequest>, EditorError> {
        let candidate = self.selected_candidate().ok_or(EditorError::NoCandidate)?;
        let image = self.image.as_ref().ok_or(EditorError::NoImage)?;
        let body = SegmentCandidateRequest {
            image_id: image.image_id.clone(),
            bbox: candidate.bbox,
            click: self.last_click,
            expand: None,
            simplify_eps: None,
        };
        let ticket = self.ticket(Some(candidate.id.clone()));
        self.banner = Banner::default();
        self.busy = true;
        self.touch();
        Ok(PendingRequest { ticket, body })
    }

    pub fn finish_segment(
        &mut self,
        ticket: &Ticket,
        result: Result<SegmentCandidateResponse, ApiError>,
    ) -> bool {
        if !self.is_current(ticket, "segment") {
            return false;
        }
        self.busy = false;
        self.touch();
        let response = match result {
            Ok(response) => response,
            Err(err) => {
                log::warn!("segmentation failed: {err}");
                self.banner.error = Some(err.banner_text("Segmentation failed"));
                return true;
            }
        };
        let polygon = match response.polygon {
            Some(polygon) if response.ok => polygon,
            _ => {
                let message = response
                    .error
                    .filter(|text| !text.trim().is_empty())
                    .unwrap_or_else(|| "Segmentation failed".into());
                self.banner.error = Some(message);
                return true;
            }
        };
        let polygon = match self.image_size() {
            Some(size) => clamp_to_image(&polygon, size),
            None => polygon,
        };
        let polygon = simplify_polygon(&polygon, self.simplify_eps);
        let target = ticket.target();
        match self
            .candidates
            .iter_mut()
            .find(|c| Some(c.id.as_str()) == target)
        {
            Some(candidate) => {
                candidate.seg_polygon = Some(polygon);
                candidate.seg_method = response.meta.map(|meta| meta.method);
            }
            None => log::debug!("segmented candidate is gone, dropping polygon"),
        }
        true
    }

    // ---- manual boxes ---------------------------------------------------

    pub fn set_manual_create_active(&mut self, active: bool) {
        self.manual_create_active = active;
        self.touch();
    }

    pub fn manual_create_active(&self) -> bool {
        self.manual_create_active
    }

    /// A drawn box waiting for its class.
    pub fn set_pending_manual(&mut self, bbox: BBox) {
        self.pending_manual = Some(bbox);
        self.selected_candidate = None;
        self.selected_annotation = None;
        self.seg.leave();
        self.touch();
    }

    pub fn pending_manual(&self) -> Option<BBox> {
        self.pending_manual
    }

    pub fn cancel_pending_manual(&mut self) {
        if self.pending_manual.take().is_some() {
            self.touch();
        }
    }

    pub fn assign_manual_class(&mut self, class_name: &str, now: &str) -> Result<String, EditorError> {
        if class_name.is_empty() {
            return Err(EditorError::MissingClass);
        }
        let bbox = self.pending_manual.ok_or(EditorError::NoPendingBox)?;
        let bbox = match self.image_size() {
            Some(size) => clamp_bbox_to_image(bbox, size),
            None => bbox,
        };
        self.snapshot();
        let id = self.make_id();
        self.annotations.push(Annotation {
            id: id.clone(),
            class_name: class_name.to_string(),
            bbox,
            source: Source::Manual,
            created_at: now.to_string(),
            score: None,
            seg_polygon: None,
            original_seg_polygon: None,
            seg_method: None,
        });
        self.ensure_colors(vec![class_name.to_string()]);
        self.pending_manual = None;
        self.annotations_changed();
        Ok(id)
    }

    // ---- annotations ----------------------------------------------------

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    /// Annotations passing the class filter.
    pub fn shown_annotations(&self) -> Cow<'_, [Annotation]> {
        if self.class_filter.class_name.is_none() {
            return Cow::Borrowed(&self.annotations);
        }
        Cow::Owned(
            self.annotations
                .iter()
                .filter(|a| self.class_filter.matches(a))
                .cloned()
                .collect(),
        )
    }

    pub fn class_filter(&self) -> &ClassFilter {
        &self.class_filter
    }

    pub fn set_class_filter(&mut self, filter: ClassFilter) {
        self.class_filter = filter;
        let still_shown = self
            .selected_annotation()
            .is_some_and(|a| self.class_filter.matches(a));
        if !still_shown {
            self.selected_annotation = None;
            self.seg.leave();
        }
        self.touch();
    }

    pub fn selected_annotation_id(&self) -> Option<&str> {
        self.selected_annotation.as_deref()
    }

    pub fn selected_annotation(&self) -> Option<&Annotation> {
        let id = self.selected_annotation.as_deref()?;
        self.annotations.iter().find(|a| a.id == id)
    }

    fn selected_annotation_mut(&mut self) -> Option<&mut Annotation> {
        let id = self.selected_annotation.as_deref()?;
        self.annotations.iter_mut().find(|a| a.id == id)
    }

    /// Returns the centre of the annotation so the view can follow it.
    pub fn select_annotation(&mut self, id: &str) -> Option<Point> {
        let center = self.annotations.iter().find(|a| a.id == id)?.bbox.center();
        self.selected_annotation = Some(id.to_string());
        self.seg.leave();
        self.seg.show_vertices = true;
        self.highlighted = Some(id.to_string());
        self.touch();
        Some(center)
    }

    pub fn highlighted(&self) -> Option<&str> {
        self.highlighted.as_deref()
    }

    /// Ends the highlight started by selecting `id`, unless a later selection
    /// replaced it.
    pub fn clear_highlight(&mut self, id: &str) {
        if self.highlighted.as_deref() == Some(id) {
            self.highlighted = None;
            self.touch();
        }
    }

    pub fn delete_selected_annotation(&mut self) -> Result<(), EditorError> {
        let id = self
            .selected_annotation
            .clone()
            .ok_or(EditorError::NoAnnotation)?;
        if !self.annotations.iter().any(|a| a.id == id) {
            return Err(EditorError::NoAnnotation);
        }
        self.snapshot();
        self.annotations.retain(|a| a.id != id);
        self.selected_annotation = None;
        self.seg.leave();
        self.annotations_changed();
        Ok(())
    }

    pub fn set_annotation_bbox(&mut self, id: &str, bbox: BBox) {
        let size = self.image_size();
        if let Some(annotation) = self.annotations.iter_mut().find(|a| a.id == id) {
            annotation.bbox = match size {
                Some(size) => clamp_bbox_to_image(bbox, size),
                None => bbox,
            };
            self.touch();
        }
    }

    pub fn is_checked(&self, id: &str) -> bool {
        self.checked.contains(id)
    }

    pub fn checked_count(&self) -> usize {
        self.checked.len()
    }

    pub fn toggle_checked(&mut self, id: &str) {
        if !self.checked.remove(id) && self.annotations.iter().any(|a| a.id == id) {
            self.checked.insert(id.to_string());
        }
        self.touch();
    }

    /// Checks every shown annotation, or clears all checks.
    pub fn check_all(&mut self, checked: bool) {
        self.checked = if checked {
            self.annotations
                .iter()
                .filter(|a| self.class_filter.matches(a))
                .map(|a| a.id.clone())
                .collect()
        } else {
            BTreeSet::new()
        };
        self.touch();
    }

    /// Bulk delete; returns how many annotations went away.
    pub fn delete_checked(&mut self) -> usize {
        if self.checked.is_empty() {
            return 0;
        }
        self.snapshot();
        let before = self.annotations.len();
        let checked = std::mem::take(&mut self.checked);
        self.annotations.retain(|a| !checked.contains(&a.id));
        let removed = before - self.annotations.len();
        log::debug!("bulk delete removed {removed} annotations");
        self.annotations_changed();
        removed
    }

    // ---- polygon editing ------------------------------------------------

    pub fn seg_edit(&self) -> &SegEdit {
        &self.seg
    }

    pub fn toggle_seg_edit(&mut self) -> Result<bool, EditorError> {
        let has_polygon = self
            .selected_annotation()
            .ok_or(EditorError::NoAnnotation)?
            .seg_polygon
            .is_some();
        if !has_polygon {
            return Err(EditorError::NoPolygon);
        }
        self.seg.active = !self.seg.active;
        self.seg.selected_vertex = None;
        self.touch();
        Ok(self.seg.active)
    }

    pub fn toggle_vertices(&mut self) {
        self.seg.show_vertices = !self.seg.show_vertices;
        self.touch();
    }

    pub fn select_vertex(&mut self, index: usize) {
        self.seg.selected_vertex = Some(index);
        self.touch();
    }

    /// Remembers the polygon for step-wise undo and opens an edit session.
    pub fn begin_vertex_drag(&mut self) {
        let Some(annotation) = self.selected_annotation() else {
            return;
        };
        let Some(polygon) = annotation.seg_polygon.clone() else {
            return;
        };
        let id = annotation.id.clone();
        self.seg.undo.push(polygon);
        self.begin_edit_session(&id);
    }

    pub fn move_vertex(&mut self, index: usize, point: Point) {
        let size = self.image_size();
        let Some(annotation) = self.selected_annotation_mut() else {
            return;
        };
        let Some(vertex) = annotation
            .seg_polygon
            .as_mut()
            .and_then(|polygon| polygon.get_mut(index))
        else {
            return;
        };
        *vertex = match size {
            Some(size) => Point::new(
                point.x.max(0.0).min(size.width),
                point.y.max(0.0).min(size.height),
            ),
            None => point,
        };
        self.touch();
    }

    pub fn end_vertex_drag(&mut self) {
        self.end_edit_session();
    }

    /// Steps the selected polygon back one vertex drag.
    pub fn seg_undo(&mut self) -> bool {
        if self.selected_annotation().is_none() {
            return false;
        }
        let Some(previous) = self.seg.undo.pop() else {
            return false;
        };
        if let Some(annotation) = self.selected_annotation_mut() {
            annotation.seg_polygon = Some(previous);
        }
        self.annotations_changed();
        true
    }

    /// Back to the polygon as it was when segmented.
    pub fn seg_reset(&mut self) -> Result<(), EditorError> {
        let original = self
            .selected_annotation()
            .ok_or(EditorError::NoAnnotation)?
            .original_seg_polygon
            .clone()
            .ok_or(EditorError::NoPolygon)?;
        self.replace_selected_polygon(original);
        self.seg.undo.clear();
        Ok(())
    }

    pub fn seg_simplify(&mut self) -> Result<(), EditorError> {
        let polygon = self
            .selected_annotation()
            .ok_or(EditorError::NoAnnotation)?
            .seg_polygon
            .clone()
            .ok_or(EditorError::NoPolygon)?;
        let polygon = match self.image_size() {
            Some(size) => clamp_to_image(&polygon, size),
            None => polygon,
        };
        let simplified = simplify_polygon(&polygon, self.simplify_eps);
        self.replace_selected_polygon(simplified);
        Ok(())
    }

    fn replace_selected_polygon(&mut self, polygon: Vec<Point>) {
        let unchanged = self
            .selected_annotation()
            .is_some_and(|a| a.seg_polygon.as_deref() == Some(polygon.as_slice()));
        if unchanged {
            return;
        }
        self.snapshot();
        if let Some(annotation) = self.selected_annotation_mut() {
            annotation.seg_polygon = Some(polygon);
        }
        self.seg.selected_vertex = None;
        self.annotations_changed();
    }

    // ---- ledger ---------------------------------------------------------

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo(&mut self) -> bool {
        if !self.history.undo(&mut self.annotations) {
            return false;
        }
        self.annotations_changed();
        true
    }

    pub fn redo(&mut self) -> bool {
        if !self.history.redo(&mut self.annotations) {
            return false;
        }
        self.annotations_changed();
        true
    }

    pub fn edit_session_active(&self) -> bool {
        self.edit_session.is_some()
    }

    pub fn begin_edit_session(&mut self, id: &str) {
        if self.edit_session.is_some() {
            return;
        }
        self.edit_session = Some(EditSession::begin(id, &self.annotations));
        self.touch();
    }

    pub fn end_edit_session(&mut self) {
        let Some(session) = self.edit_session.take() else {
            return;
        };
        if session.commit(&mut self.history, &mut self.annotations) {
            self.annotations_changed();
        } else {
            self.touch();
        }
    }

    // ---- auto-annotate --------------------------------------------------

    pub fn auto_state(&self) -> &AutoState {
        &self.auto
    }

    pub fn begin_auto_annotate(
        &mut self,
    ) -> Result<PendingRequest<AutoAnnotateRequest>, EditorError> {
        let request = self.auto_request();
        let body = match request {
            Ok(body) => body,
            Err(err) => {
                self.banner.error = Some(err.to_string());
                self.touch();
                return Err(err);
            }
        };
        self.banner.error = None;
        self.auto.running = true;
        self.auto.progress = 0;
        self.auto.summary = None;
        self.auto.last_added.clear();
        self.touch();
        Ok(PendingRequest {
            ticket: self.ticket(None),
            body,
        })
    }

    fn auto_request(&self) -> Result<AutoAnnotateRequest, EditorError> {
        let image = self.image.as_ref().ok_or(EditorError::NoImage)?;
        let dataset = image.dataset.as_ref().ok_or(EditorError::NoDatasetImage)?;
        let project = self.project.clone().ok_or(EditorError::NoProject)?;
        let detect = &self.detect_params;
        Ok(AutoAnnotateRequest {
            image_id: image.image_id.clone(),
            project,
            threshold: self.auto_params.clipped_threshold(),
            method: self.auto_params.method,
            roi_size: detect.roi_size,
            class_filter: self.auto_params.effective_class_filter(),
            scale_min: detect.scale_min,
            scale_max: detect.scale_max,
            scale_steps: detect.scale_steps,
            stride: self.auto_params.effective_stride(),
            project_name: dataset.project_name.clone(),
            image_key: dataset.image_key.clone(),
        })
    }

    /// One step of the simulated progress bar; false once the run is over.
    pub fn tick_auto_progress(&mut self) -> bool {
        if !self.auto.running {
            return false;
        }
        self.auto.progress = (self.auto.progress + AUTO_PROGRESS_STEP).min(AUTO_PROGRESS_CAP);
        self.touch();
        true
    }

    pub fn finish_auto_annotate(
        &mut self,
        ticket: &Ticket,
        result: Result<AutoAnnotateResponse, ApiError>,
        now: &str,
    ) -> AutoOutcome {
        if !self.is_current(ticket, "auto-annotate") {
            return AutoOutcome::Stale;
        }
        self.auto.running = false;
        self.auto.progress = 100;
        self.touch();
        let response = match result {
            Ok(response) => response,
            Err(err) => {
                log::warn!("auto-annotate failed: {err}");
                self.banner.error = Some(err.banner_text("Auto annotate failed"));
                return AutoOutcome::Failed;
            }
        };
        self.auto.summary = Some(AutoSummary {
            added: response.added_count,
            rejected: response.rejected_count,
            threshold: response.threshold,
        });
        self.auto_baseline = self.auto_params.clone();

        let created = response.created_annotations.unwrap_or_default();
        if created.is_empty() {
            return AutoOutcome::ReloadNeeded(ticket.clone());
        }
        self.snapshot();
        let mut added = Vec::with_capacity(created.len());
        for item in created {
            let id = self.make_id();
            added.push(id.clone());
            self.annotations.push(Annotation {
                id,
                class_name: item.class_name,
                bbox: item.bbox,
                source: Source::Template,
                created_at: now.to_string(),
                score: item.score,
                seg_polygon: None,
                original_seg_polygon: None,
                seg_method: None,
            });
        }
        let count = added.len();
        log::info!("auto-annotate added {count} annotations");
        self.auto.last_added = added;
        let classes = self.annotations.iter().map(|a| a.class_name.clone()).collect();
        self.ensure_colors(classes);
        self.annotations_changed();
        AutoOutcome::Appended(count)
    }

    /// Replaces the list with what the service has stored for this image.
    pub fn finish_reload(
        &mut self,
        ticket: &Ticket,
        result: Result<LoadAnnotationsResponse, ApiError>,
        now: &str,
    ) -> bool {
        if !self.is_current(ticket, "reload") {
            return false;
        }
        match result {
            Ok(response) => {
                self.annotations = self.normalize(response.annotations, now);
                let classes = self.annotations.iter().map(|a| a.class_name.clone()).collect();
                self.ensure_colors(classes);
                self.annotations_changed();
                // Already stored on the service side.
                self.save_pending = false;
            }
            Err(err) => {
                log::warn!("reloading annotations failed: {err}");
                self.banner.error = Some(err.banner_text("Load annotations failed"));
                self.touch();
            }
        }
        true
    }

    /// Rolls back the most recent auto-annotate batch.
    pub fn undo_auto_annotate(&mut self) -> bool {
        if self.auto.last_added.is_empty() {
            return false;
        }
        self.snapshot();
        let added: BTreeSet<String> = self.auto.last_added.drain(..).collect();
        self.annotations.retain(|a| !added.contains(&a.id));
        self.banner.notice = Some("Removed the last auto-annotate batch".into());
        self.annotations_changed();
        true
    }

    // ---- display state --------------------------------------------------

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn toggle_candidates(&mut self) {
        self.visibility.candidates = !self.visibility.candidates;
        self.touch();
    }

    pub fn toggle_annotations(&mut self) {
        self.visibility.annotations = !self.visibility.annotations;
        self.touch();
    }

    pub fn toggle_debug(&mut self) {
        self.visibility.debug = !self.visibility.debug;
        if !self.visibility.debug {
            self.debug_pointer = None;
        }
        self.touch();
    }

    pub fn detect_debug(&self) -> Option<&DetectDebug> {
        self.detect_debug.as_ref()
    }

    pub fn last_click(&self) -> Option<Point> {
        self.last_click
    }

    /// Screen and image coordinates of the last click, while debugging.
    pub fn debug_pointer(&self) -> Option<(Point, Point)> {
        self.debug_pointer
    }

    pub fn busy(&self) -> bool {
        self.busy
    }

    pub fn banner(&self) -> &Banner {
        &self.banner
    }

    pub fn dismiss_banner(&mut self) {
        self.banner = Banner::default();
        self.touch();
    }

    pub fn report(&mut self, message: impl Into<String>) {
        self.banner.error = Some(message.into());
        self.touch();
    }

    pub fn notify(&mut self, message: impl Into<String>) {
        self.banner.notice = Some(message.into());
        self.touch();
    }

    pub fn colors(&self) -> &ColorMap {
        &self.colors
    }

    pub fn color_for(&self, class_name: &str) -> &str {
        palette::color_for(&self.colors, class_name)
    }

    pub fn set_color(&mut self, class_name: &str, color: &str) {
        self.colors.insert(class_name.to_string(), color.to_string());
        self.colors_changed = true;
        self.touch();
    }

    /// The colour map, once, after it gained entries.
    pub fn take_color_update(&mut self) -> Option<ColorMap> {
        if !std::mem::take(&mut self.colors_changed) {
            return None;
        }
        Some(self.colors.clone())
    }

    /// Whether anything visible changed since the last call.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// The current list for the dataset image, once per change.
    pub fn take_save_request(&mut self) -> Option<SaveAnnotationsRequest> {
        if !std::mem::take(&mut self.save_pending) {
            return None;
        }
        let dataset = self.image.as_ref()?.dataset.as_ref()?;
        Some(SaveAnnotationsRequest {
            project_name: dataset.project_name.clone(),
            image_key: dataset.image_key.clone(),
            annotations: self.annotations.clone(),
        })
    }

    /// Escape: drop both selections and any box waiting for a class.
    pub fn escape(&mut self) {
        self.selected_candidate = None;
        self.selected_annotation = None;
        self.pending_manual = None;
        self.seg.leave();
        self.touch();
    }

    /// What hit-testing needs, over the given (possibly filtered) list.
    pub fn scene<'a>(&'a self, annotations: &'a [Annotation]) -> Scene<'a> {
        let edit_polygon = if self.seg.active && self.seg.show_vertices {
            self.selected_annotation()
                .and_then(|a| a.seg_polygon.as_deref())
        } else {
            None
        };
        Scene {
            annotations,
            candidates: &self.candidates,
            selected_annotation: self.selected_annotation.as_deref(),
            selected_candidate: self.selected_candidate.as_deref(),
            edit_mode: self.seg.active,
            edit_polygon,
        }
    }

    /// Routes one canvas or keyboard intent.
    pub fn apply(&mut self, intent: Intent, now: &str) -> Effect {
        match intent {
            Intent::DetectAt(point) => match self.begin_detect(point) {
                Ok(request) => return Effect::Detect(request),
                Err(err) => log::debug!("click ignored: {err}"),
            },
            Intent::SelectAnnotation(id) => {
                if let Some(center) = self.select_annotation(&id) {
                    return Effect::Focus { id, center };
                }
            }
            Intent::CreateManualBox(bbox) => self.set_pending_manual(bbox),
            Intent::ManualCreateActive(active) => self.set_manual_create_active(active),
            Intent::SetAnnotationBBox { id, bbox } => self.set_annotation_bbox(&id, bbox),
            Intent::SetCandidateBBox { id, bbox } => self.set_candidate_bbox(&id, bbox),
            Intent::EditStarted(id) => self.begin_edit_session(&id),
            Intent::EditEnded(_) => self.end_edit_session(),
            Intent::SelectVertex(index) => self.select_vertex(index),
            Intent::VertexDragStarted => self.begin_vertex_drag(),
            Intent::MoveVertex { index, point } => self.move_vertex(index, point),
            Intent::VertexDragEnded => self.end_vertex_drag(),
            Intent::DebugPointer { screen, image } => {
                if self.visibility.debug {
                    self.debug_pointer = Some((screen, image));
                    self.touch();
                }
            }
            Intent::NudgeCandidate { dx, dy } => self.nudge_selected_candidate(dx, dy),
            Intent::Confirm => {
                if let Err(err) = self.confirm_candidate(now) {
                    log::debug!("confirm skipped: {err}");
                }
            }
            Intent::Reject => {
                if let Err(err) = self.reject_candidate() {
                    log::debug!("reject skipped: {err}");
                }
            }
            Intent::NextCandidate => self.next_candidate(),
            Intent::Segment => match self.begin_segment() {
                Ok(request) => return Effect::Segment(request),
                Err(err) => log::debug!("segment skipped: {err}"),
            },
            Intent::DeleteSelectedAnnotation => {
                if let Err(err) = self.delete_selected_annotation() {
                    log::debug!("delete skipped: {err}");
                }
            }
            Intent::Escape => self.escape(),
            Intent::Undo => {
                self.undo();
            }
            Intent::Redo => {
                self.redo();
            }
        }
        Effect::None
    }
}
