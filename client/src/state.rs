use std::collections::{BTreeMap, BTreeSet};

use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, HtmlImageElement, Window};

use clicklabel_engine::api::{DatasetInfo, ProjectTemplates};
use clicklabel_engine::editor::Editor;
use clicklabel_engine::geometry::Viewport;
use clicklabel_engine::gesture::{InteractionController, KeyContext};
use clicklabel_engine::settings::{ClientConfig, ExportSettings};

use crate::dom;

pub struct State {
    pub canvas: HtmlCanvasElement,
    pub ctx: CanvasRenderingContext2d,
    pub image: Option<HtmlImageElement>,
    pub editor: Editor,
    pub controller: InteractionController,
    pub config: ClientConfig,
    pub templates: Vec<ProjectTemplates>,
    pub datasets: Vec<String>,
    pub dataset: Option<DatasetInfo>,
    pub template_by_dataset: BTreeMap<String, String>,
    pub export: ExportSettings,
    pub export_dirs: Vec<String>,
    pub exporting: bool,
    pub hide_hints: bool,
    /// Bumped on every image switch so a slow image load can tell it lost.
    pub image_request: u64,
}

impl State {
    pub fn viewport(&self, window: &Window) -> Option<Viewport> {
        let size = self.editor.image_size()?;
        dom::viewport(window, &self.canvas, size)
    }

    pub fn key_context(&self) -> KeyContext {
        KeyContext {
            candidate_selected: self.editor.selected_candidate_id().is_some(),
            annotation_selected: self.editor.selected_annotation_id().is_some(),
            edit_mode: self.editor.seg_edit().active,
        }
    }

    pub fn dataset_name(&self) -> Option<&str> {
        self.dataset.as_ref().map(|d| d.project_name.as_str())
    }

    pub fn current_image_key(&self) -> Option<&str> {
        self.editor
            .image()
            .and_then(|image| image.dataset.as_ref())
            .map(|dataset| dataset.image_key.as_str())
    }

    /// Classes offered when naming a box: the template project's classes,
    /// then any class already used on this image.
    pub fn class_options(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut options = Vec::new();
        let template_classes = self
            .editor
            .project()
            .and_then(|name| self.templates.iter().find(|t| t.name == name))
            .into_iter()
            .flat_map(|t| t.classes.iter().map(|c| c.class_name.as_str()));
        let used = self.editor.annotations().iter().map(|a| a.class_name.as_str());
        for class_name in template_classes.chain(used) {
            if !class_name.is_empty() && seen.insert(class_name) {
                options.push(class_name.to_string());
            }
        }
        options
    }

    pub fn image_keys(&self) -> Vec<String> {
        self.dataset
            .as_ref()
            .map(|d| d.images.iter().map(|i| i.key().to_string()).collect())
            .unwrap_or_default()
    }
}
