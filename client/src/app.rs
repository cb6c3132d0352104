use std::cell::RefCell;
use std::rc::Rc;

use gloo::events::{EventListener, EventListenerOptions};
use gloo::timers::callback::{Interval, Timeout};
use js_sys::Reflect;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::spawn_local;
use web_sys::{
    CanvasRenderingContext2d, Document, Element, Event, FormData, HtmlInputElement,
    HtmlSelectElement, KeyboardEvent, MouseEvent, WheelEvent, Window,
};

use clicklabel_engine::api::{
    AutoAnnotateResponse, DatasetImportResponse, DatasetInfo, DetectPointRequest,
    DetectPointResponse, Endpoint, ExportDatasetRequest, ExportResponse, ImageInfo,
    LoadAnnotationsResponse, OkResponse, ProjectNameRequest, ProjectTemplates,
    SaveAnnotationsRequest, SegmentCandidateRequest, SegmentCandidateResponse, SelectImageRequest,
};
use clicklabel_engine::editor::{
    AutoOutcome, DatasetImage, Editor, Effect, LoadedImage, PendingRequest, Ticket,
    AUTO_PROGRESS_INTERVAL_MS, HIGHLIGHT_MS,
};
use clicklabel_engine::error::EditorError;
use clicklabel_engine::gesture::{Button, InteractionController, Intent};
use clicklabel_engine::settings::{
    remember_export_dir, ClassFilter, ClientConfig, DatasetKind, ExportSettings, FieldInput,
    FieldValue, ViewState,
};
use clicklabel_engine::split::preview_split;
use clicklabel_engine::Point;

use crate::dom::{self, set_disabled, set_hidden, set_pressed, set_text, Ui};
use crate::frame::{Blink, FrameScheduler};
use crate::net::{self, Api};
use crate::panel::{
    fill_datalist, fill_select, panel_action_from_event, render_annotations, render_candidates,
    render_images, setting_from_event, PanelAction, SettingChange,
};
use crate::persistence;
use crate::render::redraw;
use crate::state::State;
use crate::util::{make_session_prefix, now_iso, random_u32};

thread_local! {
    static APP: RefCell<Option<Rc<App>>> = const { RefCell::new(None) };
}

fn ready_state(document: &Document) -> Option<String> {
    Reflect::get(document.as_ref(), &JsValue::from_str("readyState"))
        .ok()?
        .as_string()
}

#[wasm_bindgen(start)]
pub fn run() -> Result<(), JsValue> {
    console_error_panic_hook::set_once();

    let window = web_sys::window().ok_or_else(|| JsValue::from_str("Missing window"))?;
    let document = window
        .document()
        .ok_or_else(|| JsValue::from_str("Missing document"))?;
    if ready_state(&document).as_deref() == Some("complete") {
        return start_app();
    }

    let onload = Closure::<dyn FnMut(Event)>::new(move |_| {
        if let Err(err) = start_app() {
            web_sys::console::error_1(&err);
        }
    });
    window.add_event_listener_with_callback("load", onload.as_ref().unchecked_ref())?;
    onload.forget();

    Ok(())
}

fn start_app() -> Result<(), JsValue> {
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("Missing window"))?;
    let document = window
        .document()
        .ok_or_else(|| JsValue::from_str("Missing document"))?;
    let config = ClientConfig::from_query(&window.location().search().unwrap_or_default());
    let level = if config.debug {
        log::Level::Debug
    } else {
        log::Level::Info
    };
    if console_log::init_with_level(level).is_err() {
        web_sys::console::warn_1(&"logger was already installed".into());
    }

    let ui = Ui::lookup(&document)?;
    let ctx = ui
        .canvas
        .get_context("2d")?
        .ok_or_else(|| JsValue::from_str("Missing 2d context"))?
        .dyn_into::<CanvasRenderingContext2d>()?;

    let state = State {
        canvas: ui.canvas.clone(),
        ctx,
        image: None,
        editor: Editor::new(make_session_prefix(), random_u32()),
        controller: InteractionController::new(),
        config: config.clone(),
        templates: Vec::new(),
        datasets: Vec::new(),
        dataset: None,
        template_by_dataset: persistence::load_template_by_dataset(),
        export: ExportSettings::default(),
        export_dirs: persistence::load_export_dirs(),
        exporting: false,
        hide_hints: persistence::load_hide_hints(),
        image_request: 0,
    };

    let app = Rc::new(App {
        window,
        document,
        ui,
        api: Api::new(config.api_base.clone()),
        state: RefCell::new(state),
        frame: FrameScheduler::default(),
        blink: Blink::default(),
        auto_timer: RefCell::new(None),
        highlight_timer: RefCell::new(None),
        listeners: RefCell::new(Vec::new()),
    });
    app.install_listeners();
    app.sync_setting_inputs();
    app.schedule(true);
    app.bootstrap();
    APP.with(|slot| *slot.borrow_mut() = Some(app));

    log::info!("clicklabel ready, service at {}", config.api_base);
    Ok(())
}

pub struct App {
    window: Window,
    document: Document,
    ui: Ui,
    api: Api,
    state: RefCell<State>,
    frame: FrameScheduler,
    blink: Blink,
    auto_timer: RefCell<Option<Interval>>,
    highlight_timer: RefCell<Option<Timeout>>,
    listeners: RefCell<Vec<EventListener>>,
}

impl App {
    fn install_listeners(self: &Rc<Self>) {
        let mut listeners = Vec::new();
        let canvas = self.ui.canvas.clone();

        let app = Rc::clone(self);
        listeners.push(EventListener::new(&canvas, "pointerdown", move |event| {
            if let Some(event) = event.dyn_ref::<MouseEvent>() {
                app.on_pointer_down(event);
            }
        }));
        let app = Rc::clone(self);
        listeners.push(EventListener::new(&canvas, "pointermove", move |event| {
            if let Some(event) = event.dyn_ref::<MouseEvent>() {
                app.on_pointer_move(event);
            }
        }));
        let app = Rc::clone(self);
        listeners.push(EventListener::new(&canvas, "pointerup", move |event| {
            if let Some(event) = event.dyn_ref::<MouseEvent>() {
                app.on_pointer_up(Some(event));
            }
        }));
        for name in ["pointerleave", "pointercancel"] {
            let app = Rc::clone(self);
            listeners.push(EventListener::new(&canvas, name, move |_| {
                app.on_pointer_up(None);
            }));
        }
        let app = Rc::clone(self);
        listeners.push(EventListener::new(&canvas, "dblclick", move |_| {
            if app.state.borrow_mut().controller.double_click() {
                app.schedule(false);
            }
        }));
        let app = Rc::clone(self);
        listeners.push(EventListener::new_with_options(
            &canvas,
            "wheel",
            EventListenerOptions::enable_prevent_default(),
            move |event| {
                if let Some(event) = event.dyn_ref::<WheelEvent>() {
                    app.on_wheel(event);
                }
            },
        ));

        let app = Rc::clone(self);
        listeners.push(EventListener::new_with_options(
            &self.window,
            "keydown",
            EventListenerOptions::enable_prevent_default(),
            move |event| {
                if let Some(event) = event.dyn_ref::<KeyboardEvent>() {
                    app.on_key_down(event);
                }
            },
        ));
        let app = Rc::clone(self);
        listeners.push(EventListener::new(&self.window, "keyup", move |event| {
            if let Some(event) = event.dyn_ref::<KeyboardEvent>() {
                let input = dom::key_input(event);
                app.state.borrow_mut().controller.key_up(&input);
                app.schedule(false);
            }
        }));
        let app = Rc::clone(self);
        listeners.push(EventListener::new(&self.window, "resize", move |_| {
            app.schedule(false);
        }));

        let app = Rc::clone(self);
        listeners.push(EventListener::new(&self.document, "click", move |event| {
            if let Some(action) = panel_action_from_event(event) {
                app.on_action(action);
            }
        }));
        let app = Rc::clone(self);
        listeners.push(EventListener::new(&self.document, "change", move |event| {
            if let Some(change) = setting_from_event(event) {
                app.on_setting(change);
            }
        }));

        self.listeners.borrow_mut().extend(listeners);
    }

    fn schedule(self: &Rc<Self>, panels: bool) {
        let app = Rc::clone(self);
        self.frame.request(panels, move || app.on_frame());
    }

    fn on_frame(self: &Rc<Self>) {
        let panels_requested = self.frame.begin();
        let mut state = self.state.borrow_mut();
        state.controller.take_pending_view();
        let panels = state.editor.take_dirty() || panels_requested;

        let editing =
            state.editor.edit_session_active() && state.editor.selected_annotation_id().is_some();
        if editing && !self.blink.is_running() {
            let app = Rc::clone(self);
            self.blink.start(move || {
                app.blink.advance();
                app.schedule(false);
            });
        } else if !editing {
            self.blink.stop();
        }

        redraw(&state, self.blink.alpha(), self.window.device_pixel_ratio());
        dom::set_cursor(&state.canvas, state.controller.cursor(state.image.is_some()));
        if panels {
            self.render_panels(&state);
        }

        let save = state.editor.take_save_request();
        let colors = state.editor.take_color_update();
        let project = state.editor.project().map(str::to_string);
        drop(state);

        if let Some(request) = save {
            self.save_annotations(request);
        }
        if let (Some(colors), Some(project)) = (colors, project) {
            persistence::save_color_map(&project, &colors);
        }
    }

    // ---- canvas input ---------------------------------------------------

    fn on_pointer_down(self: &Rc<Self>, event: &MouseEvent) {
        let input = dom::pointer_input(event);
        if input.button == Button::Middle {
            event.prevent_default();
        }
        let intents = {
            let mut state = self.state.borrow_mut();
            let Some(viewport) = state.viewport(&self.window) else {
                return;
            };
            let State {
                editor, controller, ..
            } = &mut *state;
            let shown = editor.shown_annotations();
            let scene = editor.scene(&shown);
            controller.pointer_down(&input, &viewport, &scene)
        };
        self.dispatch(intents);
        self.schedule(false);
    }

    fn on_pointer_move(self: &Rc<Self>, event: &MouseEvent) {
        let input = dom::pointer_input(event);
        let (intents, dragging) = {
            let mut state = self.state.borrow_mut();
            let Some(viewport) = state.viewport(&self.window) else {
                return;
            };
            let State {
                editor, controller, ..
            } = &mut *state;
            let shown = editor.shown_annotations();
            let scene = editor.scene(&shown);
            let intents = controller.pointer_move(&input, &viewport, &scene);
            dom::set_cursor(&self.ui.canvas, controller.cursor(true));
            (intents, controller.is_dragging())
        };
        self.dispatch(intents);
        if dragging {
            self.schedule(false);
        }
    }

    /// `None` when the pointer left the canvas or the gesture was cancelled.
    fn on_pointer_up(self: &Rc<Self>, event: Option<&MouseEvent>) {
        let input = event.map(dom::pointer_input);
        let intents = {
            let mut state = self.state.borrow_mut();
            let Some(viewport) = state.viewport(&self.window) else {
                return;
            };
            let State {
                editor, controller, ..
            } = &mut *state;
            let shown = editor.shown_annotations();
            let scene = editor.scene(&shown);
            match &input {
                Some(input) => controller.pointer_up(Some(input), &viewport, &scene),
                None => controller.pointer_leave(&viewport, &scene),
            }
        };
        self.dispatch(intents);
        self.schedule(false);
    }

    fn on_wheel(self: &Rc<Self>, event: &WheelEvent) {
        let input = dom::wheel_input(event);
        let handled = {
            let mut state = self.state.borrow_mut();
            let Some(viewport) = state.viewport(&self.window) else {
                return;
            };
            state.controller.wheel(&input, &viewport)
        };
        if handled {
            event.prevent_default();
            self.schedule(false);
        }
    }

    fn on_key_down(self: &Rc<Self>, event: &KeyboardEvent) {
        let input = dom::key_input(event);
        let outcome = {
            let mut state = self.state.borrow_mut();
            let context = state.key_context();
            state.controller.key_down(&input, &context)
        };
        if outcome.prevent_default {
            event.prevent_default();
        }
        self.dispatch(outcome.intents);
        self.schedule(false);
    }

    /// Applies intents in order, then runs whatever they asked for.
    fn dispatch(self: &Rc<Self>, intents: Vec<Intent>) {
        if intents.is_empty() {
            return;
        }
        let now = now_iso();
        let effects: Vec<Effect> = {
            let mut state = self.state.borrow_mut();
            intents
                .into_iter()
                .map(|intent| state.editor.apply(intent, &now))
                .collect()
        };
        for effect in effects {
            self.handle_effect(effect);
        }
        self.schedule(true);
    }

    fn handle_effect(self: &Rc<Self>, effect: Effect) {
        match effect {
            Effect::None => {}
            Effect::Detect(request) => self.detect(request),
            Effect::Segment(request) => self.segment(request),
            Effect::Focus { id, center } => self.focus(id, center),
        }
    }

    /// Centre the view on a selected annotation and flash its label.
    fn focus(self: &Rc<Self>, id: String, center: Point) {
        {
            let mut state = self.state.borrow_mut();
            if !state.controller.is_dragging() {
                if let Some(viewport) = state.viewport(&self.window) {
                    state.controller.pan_to(center, &viewport);
                }
            }
        }
        let app = Rc::clone(self);
        let timeout = Timeout::new(HIGHLIGHT_MS, move || {
            app.state.borrow_mut().editor.clear_highlight(&id);
            app.schedule(true);
        });
        // Replacing drops, and so cancels, the previous flash.
        self.highlight_timer.replace(Some(timeout));
    }

    // ---- service calls --------------------------------------------------

    fn report(self: &Rc<Self>, message: impl Into<String>) {
        self.state.borrow_mut().editor.report(message);
        self.schedule(true);
    }

    fn detect(self: &Rc<Self>, request: PendingRequest<DetectPointRequest>) {
        let app = Rc::clone(self);
        spawn_local(async move {
            let result = app
                .api
                .send::<_, DetectPointResponse>(&Endpoint::DetectPoint, &request.body)
                .await;
            app.state
                .borrow_mut()
                .editor
                .finish_detect(&request.ticket, result);
            app.schedule(true);
        });
    }

    fn segment(self: &Rc<Self>, request: PendingRequest<SegmentCandidateRequest>) {
        let app = Rc::clone(self);
        spawn_local(async move {
            let result = app
                .api
                .send::<_, SegmentCandidateResponse>(&Endpoint::SegmentCandidate, &request.body)
                .await;
            app.state
                .borrow_mut()
                .editor
                .finish_segment(&request.ticket, result);
            app.schedule(true);
        });
    }

    fn run_auto_annotate(self: &Rc<Self>) {
        let begun = self.state.borrow_mut().editor.begin_auto_annotate();
        let request = match begun {
            Ok(request) => request,
            Err(err) => {
                log::info!("auto-annotate not started: {err}");
                self.schedule(true);
                return;
            }
        };

        let ticker = Rc::clone(self);
        let interval = Interval::new(AUTO_PROGRESS_INTERVAL_MS, move || {
            let running = ticker.state.borrow_mut().editor.tick_auto_progress();
            if running {
                ticker.schedule(true);
            }
        });
        self.auto_timer.replace(Some(interval));
        self.schedule(true);

        let app = Rc::clone(self);
        spawn_local(async move {
            let result = app
                .api
                .send::<_, AutoAnnotateResponse>(&Endpoint::AutoAnnotate, &request.body)
                .await;
            drop(app.auto_timer.borrow_mut().take());
            let outcome = app.state.borrow_mut().editor.finish_auto_annotate(
                &request.ticket,
                result,
                &now_iso(),
            );
            match outcome {
                AutoOutcome::Stale | AutoOutcome::Failed => {}
                AutoOutcome::Appended(count) => {
                    log::debug!("auto-annotate appended {count}");
                    app.persist_auto_params();
                }
                AutoOutcome::ReloadNeeded(ticket) => {
                    app.persist_auto_params();
                    app.reload_annotations(ticket).await;
                }
            }
            app.schedule(true);
        });
    }

    fn persist_auto_params(&self) {
        let state = self.state.borrow();
        if let Some(project) = state.editor.project() {
            persistence::save_auto_params(project, &state.editor.auto_params);
        }
    }

    async fn reload_annotations(self: &Rc<Self>, ticket: Ticket) {
        let dataset = {
            let state = self.state.borrow();
            state.editor.image().and_then(|image| image.dataset.clone())
        };
        let Some(dataset) = dataset else {
            return;
        };
        let endpoint = Endpoint::LoadAnnotations {
            project_name: dataset.project_name,
            image_key: dataset.image_key,
        };
        let result = self.api.get::<LoadAnnotationsResponse>(&endpoint).await;
        self.state
            .borrow_mut()
            .editor
            .finish_reload(&ticket, result, &now_iso());
    }

    fn save_annotations(self: &Rc<Self>, request: SaveAnnotationsRequest) {
        let app = Rc::clone(self);
        spawn_local(async move {
            match app
                .api
                .send::<_, OkResponse>(&Endpoint::SaveAnnotations, &request)
                .await
            {
                Ok(_) => log::debug!(
                    "saved {} annotations for {}",
                    request.annotations.len(),
                    request.image_key
                ),
                Err(err) => log::warn!("saving annotations for {} failed: {err}", request.image_key),
            }
        });
    }

    // ---- projects & datasets --------------------------------------------

    fn bootstrap(self: &Rc<Self>) {
        let app = Rc::clone(self);
        spawn_local(async move {
            app.load_templates().await;
            app.load_dataset_projects().await;
            if let ViewState::Project {
                project_name,
                image_key,
            } = persistence::load_view_state()
            {
                let known = app.state.borrow().datasets.contains(&project_name);
                if known {
                    app.open_dataset(project_name, image_key).await;
                }
            }
            app.schedule(true);
        });
    }

    async fn load_templates(self: &Rc<Self>) {
        let templates = match self.api.get::<Vec<ProjectTemplates>>(&Endpoint::Templates).await {
            Ok(templates) => templates,
            Err(err) => {
                log::warn!("template listing failed, falling back to project names: {err}");
                match self.api.get::<Vec<String>>(&Endpoint::Projects).await {
                    Ok(names) => names
                        .into_iter()
                        .map(|name| ProjectTemplates {
                            name,
                            classes: Vec::new(),
                        })
                        .collect(),
                    Err(err) => {
                        self.report(err.banner_text(Endpoint::Projects.fallback_message()));
                        return;
                    }
                }
            }
        };
        log::debug!("{} template projects", templates.len());
        let first = templates.first().map(|t| t.name.clone());
        let current = {
            let mut state = self.state.borrow_mut();
            state.templates = templates;
            state.editor.project().map(str::to_string)
        };
        if current.is_none() {
            self.select_project(first);
        }
    }

    fn select_project(self: &Rc<Self>, name: Option<String>) {
        let settings = name.as_deref().map(persistence::load_project_settings);
        {
            let mut state = self.state.borrow_mut();
            match settings {
                Some(settings) => state.editor.select_project(
                    name.clone(),
                    settings.detect,
                    settings.auto,
                    settings.colors,
                ),
                None => state.editor.select_project(
                    None,
                    Default::default(),
                    Default::default(),
                    Default::default(),
                ),
            }
            let dataset = state.dataset_name().map(str::to_string);
            if let (Some(dataset), Some(name)) = (dataset, name) {
                state.template_by_dataset.insert(dataset, name);
                persistence::save_template_by_dataset(&state.template_by_dataset);
            }
        }
        self.sync_setting_inputs();
        self.schedule(true);
    }

    async fn load_dataset_projects(self: &Rc<Self>) {
        match self.api.get::<Vec<DatasetInfo>>(&Endpoint::DatasetProjects).await {
            Ok(projects) => {
                self.state.borrow_mut().datasets =
                    projects.into_iter().map(|p| p.project_name).collect();
            }
            Err(err) => {
                self.report(err.banner_text(Endpoint::DatasetProjects.fallback_message()));
            }
        }
        self.schedule(true);
    }

    async fn refresh_dataset(self: &Rc<Self>, name: &str) -> bool {
        let endpoint = Endpoint::Dataset(name.to_string());
        match self.api.get::<DatasetInfo>(&endpoint).await {
            Ok(info) => {
                self.state.borrow_mut().dataset = Some(info);
                self.schedule(true);
                true
            }
            Err(err) => {
                self.report(err.banner_text(endpoint.fallback_message()));
                false
            }
        }
    }

    async fn open_dataset(self: &Rc<Self>, name: String, image_key: Option<String>) {
        if !self.refresh_dataset(&name).await {
            return;
        }
        let template = {
            let mut state = self.state.borrow_mut();
            state
                .editor
                .set_class_filter(persistence::load_class_filter(&name));
            state
                .template_by_dataset
                .get(&name)
                .filter(|template| state.templates.iter().any(|t| &t.name == *template))
                .cloned()
        };
        persistence::save_view_state(&ViewState::Project {
            project_name: name.clone(),
            image_key: image_key.clone(),
        });
        if template.is_some() {
            self.select_project(template);
        }
        let image_key =
            image_key.filter(|key| self.state.borrow().image_keys().iter().any(|k| k == key));
        if let Some(key) = image_key {
            self.open_image(key).await;
        }
        self.schedule(true);
    }

    fn close_dataset(self: &Rc<Self>) {
        self.state.borrow_mut().dataset = None;
        persistence::save_view_state(&ViewState::Home);
        self.schedule(true);
    }

    async fn open_image(self: &Rc<Self>, key: String) {
        let (project_name, request_id) = {
            let mut state = self.state.borrow_mut();
            let Some(name) = state.dataset_name().map(str::to_string) else {
                return;
            };
            state.image_request += 1;
            (name, state.image_request)
        };
        log::info!("opening {key} from {project_name}");

        let body = SelectImageRequest {
            project_name: project_name.clone(),
            filename: key.clone(),
        };
        let info = match self
            .api
            .send::<_, ImageInfo>(&Endpoint::DatasetSelect, &body)
            .await
        {
            Ok(info) => info,
            Err(err) => {
                self.report(err.banner_text(Endpoint::DatasetSelect.fallback_message()));
                return;
            }
        };
        let stored = Endpoint::LoadAnnotations {
            project_name: project_name.clone(),
            image_key: key.clone(),
        };
        let annotations = match self.api.get::<LoadAnnotationsResponse>(&stored).await {
            Ok(response) => response.annotations,
            Err(err) => {
                log::warn!("no stored annotations for {key}: {err}");
                Vec::new()
            }
        };
        let element = match net::load_image(&self.api.image_url(&project_name, &key)).await {
            Ok(element) => element,
            Err(err) => {
                log::warn!("image {key} did not load: {err:?}");
                self.report(
                    Endpoint::DatasetImage {
                        project: project_name,
                        file: key,
                    }
                    .fallback_message(),
                );
                return;
            }
        };

        {
            let mut state = self.state.borrow_mut();
            if state.image_request != request_id {
                log::debug!("image {key} was superseded while loading");
                return;
            }
            let image = LoadedImage::from_info(
                &info,
                Some(DatasetImage {
                    project_name: project_name.clone(),
                    image_key: key.clone(),
                }),
            );
            dom::size_canvas_to_image(&self.window, &state.canvas, image.size);
            state.editor.load_image(image, annotations, &now_iso());
            state.controller.reset();
            state.image = Some(element);
        }
        persistence::save_view_state(&ViewState::Project {
            project_name,
            image_key: Some(key),
        });
        self.schedule(true);
    }

    async fn create_dataset(self: &Rc<Self>) {
        let name = self.ui.dataset_name.value().trim().to_string();
        if name.is_empty() {
            self.report("Enter a project name");
            return;
        }
        let body = ProjectNameRequest {
            project_name: name,
        };
        match self
            .api
            .send::<_, DatasetInfo>(&Endpoint::CreateDatasetProject, &body)
            .await
        {
            Ok(info) => {
                self.ui.dataset_name.set_value("");
                self.load_dataset_projects().await;
                self.open_dataset(info.project_name, None).await;
            }
            Err(err) => {
                self.report(err.banner_text(Endpoint::CreateDatasetProject.fallback_message()))
            }
        }
    }

    async fn delete_dataset(self: &Rc<Self>) {
        let Some(name) = self.state.borrow().dataset_name().map(str::to_string) else {
            return;
        };
        let confirmed = self
            .window
            .confirm_with_message(&format!("Delete dataset project \"{name}\"?"))
            .unwrap_or(false);
        if !confirmed {
            return;
        }
        let endpoint = Endpoint::DeleteDatasetProject(name.clone());
        match self.api.get::<OkResponse>(&endpoint).await {
            Ok(_) => {
                log::info!("deleted dataset project {name}");
                self.close_dataset();
                self.load_dataset_projects().await;
            }
            Err(err) => self.report(err.banner_text(endpoint.fallback_message())),
        }
    }

    async fn import_images(self: &Rc<Self>) {
        let Some(files) = self.ui.import_files.files() else {
            return;
        };
        if files.length() == 0 {
            return;
        }
        let project = self.state.borrow().dataset_name().map(str::to_string);
        let Some(project) = project else {
            self.report("Choose a dataset project first");
            return;
        };
        let Ok(form) = FormData::new() else {
            return;
        };
        let _ = form.append_with_str("project_name", &project);
        for index in 0..files.length() {
            if let Some(file) = files.get(index) {
                let _ = form.append_with_blob_and_filename("files", &file, &file.name());
            }
        }
        self.ui.import_files.set_value("");

        match self
            .api
            .upload::<DatasetImportResponse>(&Endpoint::DatasetImport, form)
            .await
        {
            Ok(response) => {
                self.state
                    .borrow_mut()
                    .editor
                    .notify(format!("Imported {} images", response.count));
                self.refresh_dataset(&project).await;
            }
            Err(err) => self.report(err.banner_text(Endpoint::DatasetImport.fallback_message())),
        }
    }

    async fn export_dataset(self: &Rc<Self>) {
        let prepared = {
            let mut state = self.state.borrow_mut();
            prepare_export(&mut state)
        };
        let (request, kind) = match prepared {
            Ok(prepared) => prepared,
            Err(message) => {
                self.report(message);
                return;
            }
        };
        self.schedule(true);

        let endpoint = match kind {
            DatasetKind::BBox => Endpoint::ExportBBox,
            DatasetKind::Seg => Endpoint::ExportSeg,
        };
        let result = self.api.send::<_, ExportResponse>(&endpoint, &request).await;
        {
            let mut state = self.state.borrow_mut();
            state.exporting = false;
            match result {
                Ok(response) if response.ok => {
                    remember_export_dir(&mut state.export_dirs, &request.output_dir);
                    persistence::save_export_dirs(&state.export_dirs);
                    let counts = response.counts.unwrap_or_default();
                    let dir = response.output_dir.unwrap_or(request.output_dir);
                    log::info!("exported {} to {dir}", request.project_name);
                    state.editor.notify(format!(
                        "Exported to {dir} (train {}, val {}, test {})",
                        counts.train, counts.val, counts.test
                    ));
                }
                Ok(response) => {
                    let message = response
                        .error
                        .filter(|text| !text.trim().is_empty())
                        .unwrap_or_else(|| endpoint.fallback_message().to_string());
                    state.editor.report(message);
                }
                Err(err) => state
                    .editor
                    .report(err.banner_text(endpoint.fallback_message())),
            }
        }
        self.schedule(true);
    }

    // ---- panel input ----------------------------------------------------

    fn on_action(self: &Rc<Self>, action: PanelAction) {
        log::debug!("panel action {action:?}");
        let app = Rc::clone(self);
        match action {
            PanelAction::AutoRun => self.run_auto_annotate(),
            PanelAction::OpenImage(key) => spawn_local(async move { app.open_image(key).await }),
            PanelAction::CreateDataset => spawn_local(async move { app.create_dataset().await }),
            PanelAction::DeleteDataset => spawn_local(async move { app.delete_dataset().await }),
            PanelAction::Export => spawn_local(async move { app.export_dataset().await }),
            PanelAction::Refresh => spawn_local(async move {
                app.load_templates().await;
                app.load_dataset_projects().await;
                let dataset = app.state.borrow().dataset_name().map(str::to_string);
                if let Some(name) = dataset {
                    app.refresh_dataset(&name).await;
                }
            }),
            other => self.apply_action(other),
        }
    }

    fn apply_action(self: &Rc<Self>, action: PanelAction) {
        let now = now_iso();
        let mut effect = Effect::None;
        {
            let mut state = self.state.borrow_mut();
            let state = &mut *state;
            let editor = &mut state.editor;
            let outcome: Result<(), EditorError> = match action {
                PanelAction::SelectCandidate(id) => {
                    editor.select_candidate(&id);
                    Ok(())
                }
                PanelAction::Confirm => editor.confirm_candidate(&now).map(|_| ()),
                PanelAction::Reject => editor.reject_candidate(),
                PanelAction::NextCandidate => {
                    editor.next_candidate();
                    Ok(())
                }
                PanelAction::Segment => editor.begin_segment().map(|request| {
                    effect = Effect::Segment(request);
                }),
                PanelAction::SelectAnnotation(id) => {
                    effect = editor.apply(Intent::SelectAnnotation(id), &now);
                    Ok(())
                }
                PanelAction::ToggleChecked(id) => {
                    editor.toggle_checked(&id);
                    Ok(())
                }
                PanelAction::CheckAll(checked) => {
                    editor.check_all(checked);
                    Ok(())
                }
                PanelAction::DeleteChecked => {
                    let removed = editor.delete_checked();
                    log::info!("deleted {removed} checked annotations");
                    Ok(())
                }
                PanelAction::DeleteAnnotation => editor.delete_selected_annotation(),
                PanelAction::Undo => editor.undo().then_some(()).ok_or(EditorError::NothingToUndo),
                PanelAction::Redo => {
                    editor.redo();
                    Ok(())
                }
                PanelAction::SegEdit => editor.toggle_seg_edit().map(|_| ()),
                PanelAction::SegVertices => {
                    editor.toggle_vertices();
                    Ok(())
                }
                PanelAction::SegUndo => {
                    editor.seg_undo();
                    Ok(())
                }
                PanelAction::SegReset => editor.seg_reset(),
                PanelAction::SegSimplify => editor.seg_simplify(),
                PanelAction::CancelManual => {
                    editor.cancel_pending_manual();
                    Ok(())
                }
                PanelAction::AutoUndo => {
                    editor.undo_auto_annotate();
                    Ok(())
                }
                PanelAction::ToggleCandidates => {
                    editor.toggle_candidates();
                    Ok(())
                }
                PanelAction::ToggleAnnotations => {
                    editor.toggle_annotations();
                    Ok(())
                }
                PanelAction::ToggleDebug => {
                    editor.toggle_debug();
                    Ok(())
                }
                PanelAction::ResetView => {
                    state.controller.reset_view();
                    Ok(())
                }
                PanelAction::SaveParams => {
                    if let Some(project) = editor.project() {
                        persistence::save_detect_params(project, &editor.detect_params);
                    }
                    editor.mark_detect_params_saved();
                    Ok(())
                }
                PanelAction::DismissBanner => {
                    editor.dismiss_banner();
                    Ok(())
                }
                PanelAction::HideHints => {
                    state.hide_hints = true;
                    persistence::save_hide_hints(true);
                    Ok(())
                }
                PanelAction::AutoRun
                | PanelAction::OpenImage(_)
                | PanelAction::CreateDataset
                | PanelAction::DeleteDataset
                | PanelAction::Export
                | PanelAction::Refresh => Ok(()),
            };
            if let Err(err) = outcome {
                match err {
                    EditorError::NothingToUndo => log::debug!("{err}"),
                    _ => state.editor.report(err.to_string()),
                }
            }
        }
        self.handle_effect(effect);
        self.schedule(true);
    }

    fn on_setting(self: &Rc<Self>, change: SettingChange) {
        let value = change.value.trim().to_string();
        match change.name.as_str() {
            "template" => return self.select_project(Some(value).filter(|v| !v.is_empty())),
            "dataset" => {
                if value.is_empty() {
                    return self.close_dataset();
                }
                let app = Rc::clone(self);
                return spawn_local(async move { app.open_dataset(value, None).await });
            }
            "import" => {
                let app = Rc::clone(self);
                return spawn_local(async move { app.import_images().await });
            }
            _ => {}
        }

        {
            let mut state = self.state.borrow_mut();
            let state = &mut *state;
            let editor = &mut state.editor;
            match change.name.as_str() {
                "manual-class" if !value.is_empty() => {
                    if let Err(err) = editor.assign_manual_class(&value, &now_iso()) {
                        editor.report(err.to_string());
                    }
                }
                "candidate-class" if !value.is_empty() => {
                    if let Err(err) = editor.set_candidate_class(&value) {
                        editor.report(err.to_string());
                    }
                }
                "class-filter" => {
                    let filter = ClassFilter {
                        class_name: Some(value).filter(|v| !v.is_empty()),
                    };
                    if let Some(dataset) = state.dataset.as_ref() {
                        persistence::save_class_filter(&dataset.project_name, &filter);
                    }
                    editor.set_class_filter(filter);
                }
                "class-color" => {
                    let class_name = editor.selected_annotation().map(|a| a.class_name.clone());
                    if let Some(class_name) = class_name {
                        editor.set_color(&class_name, &value);
                    }
                }
                "simplify-eps" => match value.parse::<f64>() {
                    Ok(eps) if eps.is_finite() && eps >= 0.0 => editor.simplify_eps = eps,
                    _ => log::debug!("ignoring simplify epsilon {value:?}"),
                },
                name => {
                    let input = FieldInput {
                        value: &change.value,
                        checked: change.checked,
                    };
                    let handled = editor.detect_params.set_field(name, &input)
                        || editor.auto_params.set_field(name, &input)
                        || state.export.set_field(name, &input);
                    if !handled {
                        log::debug!("ignoring setting {name}={:?}", change.value);
                    }
                }
            }
        }
        self.schedule(true);
    }

    /// Pushes the current parameter values into every `data-setting` control.
    fn sync_setting_inputs(&self) {
        let Ok(nodes) = self.document.query_selector_all("[data-setting]") else {
            return;
        };
        let state = self.state.borrow();
        for index in 0..nodes.length() {
            let Some(element) = nodes
                .item(index)
                .and_then(|node| node.dyn_into::<Element>().ok())
            else {
                continue;
            };
            let Some(name) = element.get_attribute("data-setting") else {
                continue;
            };
            let value = state
                .editor
                .detect_params
                .field(&name)
                .or_else(|| state.editor.auto_params.field(&name))
                .or_else(|| state.export.field(&name))
                .or_else(|| {
                    (name == "simplify-eps")
                        .then(|| FieldValue::Text(state.editor.simplify_eps.to_string()))
                });
            match value {
                Some(FieldValue::Text(text)) => {
                    if let Some(input) = element.dyn_ref::<HtmlInputElement>() {
                        input.set_value(&text);
                    } else if let Some(select) = element.dyn_ref::<HtmlSelectElement>() {
                        select.set_value(&text);
                    }
                }
                Some(FieldValue::Checked(checked)) => {
                    if let Some(input) = element.dyn_ref::<HtmlInputElement>() {
                        input.set_checked(checked);
                    }
                }
                None => {}
            }
        }
    }

    // ---- panels ---------------------------------------------------------

    fn render_panels(&self, state: &State) {
        let ui = &self.ui;
        let document = &self.document;
        let editor = &state.editor;

        let banner = editor.banner();
        set_hidden(&ui.banner, banner.error.is_none());
        set_text(&ui.banner_text, banner.error.as_deref().unwrap_or(""));
        set_hidden(&ui.notice, banner.notice.is_none());
        set_text(&ui.notice, banner.notice.as_deref().unwrap_or(""));
        set_hidden(&ui.busy, !editor.busy() && !state.exporting);
        set_hidden(&ui.canvas_hint, state.image.is_some());
        set_hidden(&ui.hints, state.hide_hints);

        let project_names: Vec<String> = state.templates.iter().map(|t| t.name.clone()).collect();
        fill_select(
            &ui.template_select,
            &project_names,
            editor.project(),
            Some("Template project"),
        );
        fill_select(
            &ui.dataset_select,
            &state.datasets,
            state.dataset_name(),
            Some("Dataset project"),
        );
        match &state.dataset {
            Some(info) => set_text(
                &ui.dataset_stats,
                &format!(
                    "{} images, {} annotated, {} boxes, {} polygons",
                    info.total_images, info.annotated_images, info.bbox_count, info.seg_count
                ),
            ),
            None => set_text(&ui.dataset_stats, ""),
        }
        render_images(
            document,
            &ui.image_list,
            state.dataset.as_ref(),
            state.current_image_key(),
        );

        let class_options = state.class_options();
        render_candidates(document, &ui.candidate_list, editor);
        let manual = editor.selected_candidate().filter(|c| c.is_manual());
        set_hidden(&ui.candidate_class, manual.is_none());
        if let Some(candidate) = manual {
            fill_select(
                &ui.candidate_class,
                &class_options,
                Some(candidate.class_name.as_str()).filter(|c| !c.is_empty()),
                Some("Pick a class"),
            );
        }
        let has_candidate = editor.selected_candidate_id().is_some();
        set_disabled(&ui.confirm_button, !has_candidate);
        set_disabled(&ui.reject_button, !has_candidate);
        set_disabled(&ui.segment_button, !has_candidate || editor.busy());

        render_annotations(document, &ui.annotation_list, editor);
        let mut used: Vec<String> = editor
            .annotations()
            .iter()
            .map(|a| a.class_name.clone())
            .collect();
        used.sort();
        used.dedup();
        fill_select(
            &ui.class_filter,
            &used,
            editor.class_filter().class_name.as_deref(),
            Some("All classes"),
        );
        let selected = editor.selected_annotation();
        set_hidden(&ui.class_color, selected.is_none());
        if let Some(annotation) = selected {
            ui.class_color
                .set_value(editor.color_for(&annotation.class_name));
        }
        set_disabled(&ui.delete_checked, editor.checked_count() == 0);
        set_disabled(&ui.undo_button, !editor.can_undo());
        set_disabled(&ui.redo_button, !editor.can_redo());

        set_hidden(&ui.manual_panel, editor.pending_manual().is_none());
        if editor.pending_manual().is_some() {
            fill_select(&ui.manual_class, &class_options, None, Some("Choose class"));
        }

        let seg = editor.seg_edit();
        let has_polygon = selected.is_some_and(|a| a.seg_polygon.is_some());
        set_disabled(&ui.seg_edit_button, !has_polygon);
        set_pressed(&ui.seg_edit_button, seg.active);
        set_disabled(&ui.seg_vertices_button, !seg.active);
        set_pressed(&ui.seg_vertices_button, seg.show_vertices);
        set_disabled(&ui.seg_undo_button, seg.undo_depth() == 0);

        let auto = editor.auto_state();
        let has_dataset_image = editor
            .image()
            .is_some_and(|image| image.dataset.is_some());
        set_disabled(&ui.auto_run, auto.running || !has_dataset_image);
        set_disabled(&ui.auto_undo, !auto.can_undo());
        let _ = ui
            .auto_progress
            .style()
            .set_property("width", &format!("{}%", auto.progress));
        set_hidden(&ui.auto_progress, !auto.running && auto.progress == 0);
        let summary = auto.summary.as_ref().map(|s| {
            format!(
                "Added {}, rejected {} (threshold {:.2})",
                s.added, s.rejected, s.threshold
            )
        });
        set_text(&ui.auto_summary, summary.as_deref().unwrap_or(""));
        set_hidden(
            &ui.params_dirty,
            !editor.detect_params_changed() && !editor.auto_params_changed(),
        );

        let visibility = editor.visibility();
        set_pressed(&ui.toggle_candidates, visibility.candidates);
        set_pressed(&ui.toggle_annotations, visibility.annotations);
        set_pressed(&ui.toggle_debug, visibility.debug);

        let keys = state.image_keys();
        let preview = preview_split(&keys, state.export.ratios(), state.export.seed);
        let mut text = format!(
            "train {} / val {} / test {}",
            preview.counts.train, preview.counts.val, preview.counts.test
        );
        for problem in state.export.validation_errors() {
            text.push_str(" · ");
            text.push_str(problem);
        }
        set_text(&ui.export_preview, &text);
        fill_datalist(document, &ui.export_dirs, &state.export_dirs);

        set_hidden(&ui.debug_info, !visibility.debug);
        if visibility.debug {
            let mut lines = vec![format!("service {}", state.config.api_base)];
            if let Some((screen, image)) = editor.debug_pointer() {
                lines.push(format!(
                    "screen ({:.1}, {:.1}) image ({:.1}, {:.1})",
                    screen.x, screen.y, image.x, image.y
                ));
            }
            if let Some(debug) = editor.detect_debug() {
                if let Some(score) = debug.match_score {
                    let mode = debug.match_mode.as_deref().unwrap_or("?");
                    lines.push(format!("match {score:.3} ({mode})"));
                }
            }
            let view = state.controller.live_view();
            lines.push(format!(
                "scale {:.2} pan ({:.1}, {:.1})",
                view.scale, view.pan.x, view.pan.y
            ));
            set_text(&ui.debug_info, &lines.join("\n"));
        }
    }
}

/// Validates the export form and marks the export as running.
fn prepare_export(state: &mut State) -> Result<(ExportDatasetRequest, DatasetKind), String> {
    if state.exporting {
        return Err("An export is already running".into());
    }
    let problems = state.export.validation_errors();
    if !problems.is_empty() {
        return Err(problems.join("; "));
    }
    let project_name = state
        .dataset_name()
        .ok_or("Choose a dataset project first")?
        .to_string();
    let project = state
        .editor
        .project()
        .ok_or_else(|| EditorError::NoProject.to_string())?
        .to_string();
    let export = &state.export;
    let request = ExportDatasetRequest {
        project_name,
        project,
        split_train: export.split_train,
        split_val: export.split_val,
        split_test: export.split_test,
        seed: export.seed,
        include_negatives: Some(export.include_negatives),
        output_dir: export.output_dir.clone(),
    };
    let kind = export.kind;
    state.exporting = true;
    Ok((request, kind))
}
