//! Main egui application for the webflasher installer wizard

use std::cell::RefCell;
use std::rc::Rc;

use eframe::egui;
use futures::channel::mpsc;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{spawn_local, JsFuture};

use webflasher_core::error::{truncate_for_status, FlowError};
use webflasher_core::flow::{ConnectOutcome, FlashFlow, FlowPhase, FlowProgress, FlowState};
use webflasher_core::manifest::{FirmwareAsset, Manifest, ManifestResolver};

use crate::loader::EspLoader;
use crate::net::{BrowserClock, BrowserFetcher, LocalStorageStore};
use crate::serial::WebSerialPicker;

/// Characters of an error shown in the status log; full text goes to the
/// console.
const STATUS_LIMIT: usize = 120;

type InstallerFlow = FlashFlow<WebSerialPicker, EspLoader>;

/// Application state
pub struct WebflasherApp {
    /// The installer flow. Taken out while an async transition runs; every
    /// triggering control is disabled for that duration.
    flow: Rc<RefCell<Option<InstallerFlow>>>,
    /// State mirrored out of async tasks for rendering.
    shared: Rc<RefCell<Shared>>,
    /// Combo-box highlight; the flow holds the authoritative selection.
    selected_index: Option<usize>,
    file_tx: mpsc::UnboundedSender<LoadedFile>,
    file_rx: mpsc::UnboundedReceiver<LoadedFile>,
}

/// A file delivered by the upload dialog.
struct LoadedFile {
    name: String,
    data: Vec<u8>,
}

#[derive(Default)]
struct Shared {
    busy: bool,
    manifest: Option<Manifest>,
    manifest_error: Option<String>,
    phase: Option<FlowPhase>,
    percent: u8,
    status: StatusLog,
}

/// Async transition requested by a button this frame.
enum AsyncAction {
    Connect,
    Cancel,
    Flash,
    Restart,
}

/// Status log
struct StatusLog {
    messages: Vec<(LogLevel, String)>,
    max_messages: usize,
}

#[derive(Clone, Copy)]
enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl Default for StatusLog {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            max_messages: 100,
        }
    }
}

impl StatusLog {
    fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.messages.push((level, message.into()));
        if self.messages.len() > self.max_messages {
            self.messages.remove(0);
        }
    }

    fn info(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    fn success(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Success, message);
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message);
    }

    fn error(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }
}

/// Forwards flow progress into the shared render state.
struct SharedProgress {
    shared: Rc<RefCell<Shared>>,
    ctx: egui::Context,
}

impl FlowProgress for SharedProgress {
    fn phase(&mut self, phase: FlowPhase) {
        self.shared.borrow_mut().phase = Some(phase);
        self.ctx.request_repaint();
    }

    fn percent(&mut self, percent: u8) {
        self.shared.borrow_mut().percent = percent;
        self.ctx.request_repaint();
    }
}

fn phase_label(phase: FlowPhase) -> &'static str {
    match phase {
        FlowPhase::Acquiring => "Downloading firmware",
        FlowPhase::Erasing => "Erasing flash",
        FlowPhase::Writing => "Writing firmware",
        FlowPhase::Finishing => "Finishing",
    }
}

impl WebflasherApp {
    /// Create a new application
    pub fn new(cc: &eframe::CreationContext<'_>) -> Self {
        let (file_tx, file_rx) = mpsc::unbounded();
        let app = Self {
            flow: Rc::new(RefCell::new(Some(FlashFlow::new(WebSerialPicker, EspLoader)))),
            shared: Rc::new(RefCell::new(Shared::default())),
            selected_index: None,
            file_tx,
            file_rx,
        };

        if !WebSerialPicker::is_supported() {
            app.shared
                .borrow_mut()
                .status
                .warn("This browser does not support WebSerial; use Chrome or Edge");
        }

        app.spawn_manifest_load(cc.egui_ctx.clone());
        app
    }

    fn spawn_manifest_load(&self, ctx: egui::Context) {
        let shared = self.shared.clone();
        spawn_local(async move {
            let mut resolver = ManifestResolver::new(LocalStorageStore::new(), BrowserClock);
            let mut fetcher = BrowserFetcher;
            match resolver.load(&mut fetcher).await {
                Ok(manifest) => {
                    let mut sh = shared.borrow_mut();
                    sh.status
                        .info(format!("Firmware catalog {} loaded", manifest.tag_name));
                    sh.manifest = Some(manifest);
                }
                Err(e) => {
                    log::error!("manifest load failed: {}", e);
                    let mut sh = shared.borrow_mut();
                    sh.manifest_error = Some(truncate_for_status(&e.to_string(), STATUS_LIMIT));
                    sh.status
                        .warn("Firmware catalog unavailable - upload a .bin file instead");
                }
            }
            ctx.request_repaint();
        });
    }

    fn drain_files(&mut self) {
        while let Ok(Some(file)) = self.file_rx.try_next() {
            let mut flow_opt = self.flow.borrow_mut();
            let mut sh = self.shared.borrow_mut();
            match flow_opt.as_mut() {
                Some(flow) => match flow.select_local(&file.name, file.data) {
                    Ok(()) => {
                        self.selected_index = None;
                        sh.status.info(format!("Loaded {}", file.name));
                    }
                    Err(e) => sh.status.warn(e.to_string()),
                },
                None => sh.status.warn("Busy - try loading the file again shortly"),
            }
        }
    }

    fn dispatch(&mut self, action: AsyncAction, ctx: &egui::Context) {
        match action {
            AsyncAction::Connect => self.spawn_connect(ctx),
            AsyncAction::Cancel => self.spawn_cancel(ctx),
            AsyncAction::Flash => self.spawn_flash(ctx),
            AsyncAction::Restart => self.spawn_restart(ctx),
        }
    }

    fn spawn_connect(&mut self, ctx: &egui::Context) {
        let Some(mut flow) = self.flow.borrow_mut().take() else {
            return;
        };
        let shared = self.shared.clone();
        let cell = self.flow.clone();
        shared.borrow_mut().busy = true;
        let ctx = ctx.clone();
        spawn_local(async move {
            let result = flow.begin_connect().await;
            {
                let mut sh = shared.borrow_mut();
                match result {
                    Ok(ConnectOutcome::Connected(identity)) => {
                        sh.status.success(format!("Connected: {}", identity.chip));
                    }
                    Ok(ConnectOutcome::Declined) => {
                        sh.status.info("Port selection cancelled");
                    }
                    Err(e) => {
                        log::error!("connect failed: {}", e);
                        sh.status
                            .error(truncate_for_status(&e.to_string(), STATUS_LIMIT));
                    }
                }
                sh.busy = false;
            }
            *cell.borrow_mut() = Some(flow);
            ctx.request_repaint();
        });
    }

    fn spawn_cancel(&mut self, ctx: &egui::Context) {
        let Some(mut flow) = self.flow.borrow_mut().take() else {
            return;
        };
        let shared = self.shared.clone();
        let cell = self.flow.clone();
        shared.borrow_mut().busy = true;
        let ctx = ctx.clone();
        spawn_local(async move {
            let result = flow.cancel().await;
            {
                let mut sh = shared.borrow_mut();
                match result {
                    Ok(()) => sh.status.info("Cancelled"),
                    Err(e) => sh.status.warn(e.to_string()),
                }
                sh.busy = false;
            }
            *cell.borrow_mut() = Some(flow);
            ctx.request_repaint();
        });
    }

    fn spawn_flash(&mut self, ctx: &egui::Context) {
        let Some(mut flow) = self.flow.borrow_mut().take() else {
            return;
        };
        let shared = self.shared.clone();
        let cell = self.flow.clone();
        {
            let mut sh = shared.borrow_mut();
            sh.busy = true;
            sh.phase = Some(FlowPhase::Acquiring);
            sh.percent = 0;
        }
        let ctx = ctx.clone();
        spawn_local(async move {
            let mut fetcher = BrowserFetcher;
            let mut progress = SharedProgress {
                shared: shared.clone(),
                ctx: ctx.clone(),
            };
            let result = flow.confirm_and_flash(&mut fetcher, &mut progress).await;
            {
                let mut sh = shared.borrow_mut();
                match result {
                    Ok(()) => sh.status.success("Firmware installed"),
                    Err(e) => {
                        log::error!("flash failed: {}", e);
                        sh.status
                            .error(truncate_for_status(&e.to_string(), STATUS_LIMIT));
                        if matches!(e, FlowError::FirmwareDownloadFailed(_)) {
                            sh.status.warn("Try uploading the firmware file manually");
                        }
                    }
                }
                sh.busy = false;
                sh.phase = None;
            }
            *cell.borrow_mut() = Some(flow);
            ctx.request_repaint();
        });
    }

    fn spawn_restart(&mut self, ctx: &egui::Context) {
        let Some(mut flow) = self.flow.borrow_mut().take() else {
            return;
        };
        self.selected_index = None;
        let shared = self.shared.clone();
        let cell = self.flow.clone();
        shared.borrow_mut().busy = true;
        let ctx = ctx.clone();
        spawn_local(async move {
            let result = flow.restart().await;
            {
                let mut sh = shared.borrow_mut();
                if let Err(e) = result {
                    sh.status.warn(e.to_string());
                }
                sh.busy = false;
                sh.percent = 0;
            }
            *cell.borrow_mut() = Some(flow);
            ctx.request_repaint();
        });
    }
}

impl eframe::App for WebflasherApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_files();

        // Request repaint while transitions are in flight
        if self.shared.borrow().busy {
            ctx.request_repaint();
        }

        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("webflasher");
                ui.separator();
                ui.label("Firmware Installer");
            });
        });

        egui::TopBottomPanel::bottom("status")
            .min_height(120.0)
            .show(ctx, |ui| {
                self.ui_status(ui);
            });

        let mut pending: Option<AsyncAction> = None;
        egui::CentralPanel::default().show(ctx, |ui| {
            let flow_cell = self.flow.clone();
            let mut flow_opt = flow_cell.borrow_mut();
            match flow_opt.as_mut() {
                None => self.ui_busy(ui),
                Some(flow) => {
                    let state = flow.state().clone();
                    match state {
                        FlowState::Idle => self.ui_select(ui, flow, &mut pending),
                        FlowState::DeviceInfoShown => self.ui_confirm(ui, flow, &mut pending),
                        FlowState::Completed => self.ui_completed(ui, &mut pending),
                        FlowState::Failed(message) => self.ui_failed(ui, &message, &mut pending),
                        // Only observable mid-transition, which parks the flow.
                        FlowState::PortRequested | FlowState::Flashing => self.ui_busy(ui),
                    }
                }
            }
        });

        if let Some(action) = pending {
            self.dispatch(action, ctx);
        }
    }
}

impl WebflasherApp {
    fn ui_select(
        &mut self,
        ui: &mut egui::Ui,
        flow: &mut InstallerFlow,
        pending: &mut Option<AsyncAction>,
    ) {
        ui.heading("Select firmware");
        ui.add_space(5.0);

        let mut newly_selected: Option<FirmwareAsset> = None;
        {
            let sh = self.shared.borrow();
            match (&sh.manifest, &sh.manifest_error) {
                (Some(manifest), _) => {
                    ui.label(format!(
                        "Release {} · published {}",
                        manifest.tag_name, manifest.published_at
                    ));
                    ui.add_space(5.0);

                    let before = self.selected_index;
                    let current = self
                        .selected_index
                        .and_then(|i| manifest.assets.get(i))
                        .map(FirmwareAsset::label)
                        .unwrap_or("Choose a board...");
                    egui::ComboBox::from_id_salt("firmware_asset")
                        .selected_text(current.to_string())
                        .show_ui(ui, |ui| {
                            for (i, asset) in manifest.assets.iter().enumerate() {
                                ui.selectable_value(
                                    &mut self.selected_index,
                                    Some(i),
                                    asset.label(),
                                );
                            }
                        });
                    if self.selected_index != before {
                        newly_selected = self
                            .selected_index
                            .and_then(|i| manifest.assets.get(i))
                            .cloned();
                    }
                }
                (None, Some(error)) => {
                    ui.colored_label(egui::Color32::YELLOW, "Firmware catalog unavailable");
                    ui.label(error);
                }
                (None, None) => {
                    ui.horizontal(|ui| {
                        ui.spinner();
                        ui.label("Loading firmware catalog...");
                    });
                }
            }
        }
        if let Some(asset) = newly_selected {
            if let Err(e) = flow.select_release(asset) {
                self.shared.borrow_mut().status.warn(e.to_string());
            }
        }

        ui.add_space(10.0);
        if ui.button("Upload .bin file...").clicked() {
            open_file_dialog(self.file_tx.clone());
        }

        if let Some(source) = flow.selected() {
            ui.add_space(5.0);
            ui.label(format!("Selected: {}", source.label()));
        }

        ui.add_space(10.0);
        ui.add_enabled_ui(flow.selected().is_some(), |ui| {
            if ui.button("Connect device").clicked() {
                *pending = Some(AsyncAction::Connect);
            }
        });
    }

    fn ui_confirm(
        &mut self,
        ui: &mut egui::Ui,
        flow: &mut InstallerFlow,
        pending: &mut Option<AsyncAction>,
    ) {
        ui.heading("Confirm installation");
        ui.add_space(5.0);

        if let Some(identity) = flow.identity() {
            ui.label(format!("Chip: {}", identity.chip));
            if let Some(mac) = &identity.mac {
                ui.label(format!("MAC: {}", mac));
            }
        }
        if let Some(source) = flow.selected() {
            ui.label(format!("Firmware: {}", source.label()));
        }

        ui.add_space(5.0);
        ui.colored_label(
            egui::Color32::YELLOW,
            "Installing replaces the firmware on the device. This cannot be \
             interrupted once started.",
        );

        ui.add_space(10.0);
        ui.horizontal(|ui| {
            if ui.button("Install").clicked() {
                *pending = Some(AsyncAction::Flash);
            }
            if ui.button("Cancel").clicked() {
                *pending = Some(AsyncAction::Cancel);
            }
        });
    }

    fn ui_busy(&self, ui: &mut egui::Ui) {
        let sh = self.shared.borrow();
        match sh.phase {
            Some(phase) => {
                ui.heading("Installing");
                ui.add_space(5.0);
                ui.label(phase_label(phase));
                ui.add_space(5.0);
                ui.add(egui::ProgressBar::new(sh.percent as f32 / 100.0).show_percentage());
            }
            None => {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label("Waiting for the device...");
                });
            }
        }
    }

    fn ui_completed(&self, ui: &mut egui::Ui, pending: &mut Option<AsyncAction>) {
        ui.heading("Done");
        ui.add_space(5.0);
        ui.colored_label(egui::Color32::GREEN, "Firmware installed successfully");
        ui.add(egui::ProgressBar::new(1.0).show_percentage());
        ui.add_space(10.0);
        if ui.button("Flash another device").clicked() {
            *pending = Some(AsyncAction::Restart);
        }
    }

    fn ui_failed(&self, ui: &mut egui::Ui, message: &str, pending: &mut Option<AsyncAction>) {
        ui.heading("Installation failed");
        ui.add_space(5.0);
        ui.colored_label(
            egui::Color32::RED,
            truncate_for_status(message, STATUS_LIMIT),
        );
        ui.label("If the download keeps failing, upload the .bin file manually.");
        ui.add_space(10.0);
        if ui.button("Start over").clicked() {
            *pending = Some(AsyncAction::Restart);
        }
    }

    fn ui_status(&self, ui: &mut egui::Ui) {
        ui.heading("Status");
        ui.separator();

        let sh = self.shared.borrow();
        egui::ScrollArea::vertical()
            .auto_shrink([false, false])
            .stick_to_bottom(true)
            .show(ui, |ui| {
                for (level, msg) in &sh.status.messages {
                    let color = match level {
                        LogLevel::Info => egui::Color32::WHITE,
                        LogLevel::Success => egui::Color32::GREEN,
                        LogLevel::Warning => egui::Color32::YELLOW,
                        LogLevel::Error => egui::Color32::RED,
                    };
                    ui.colored_label(color, msg);
                }
            });
    }
}

/// Open a hidden file input and deliver the chosen file over `tx`.
fn open_file_dialog(tx: mpsc::UnboundedSender<LoadedFile>) {
    let Some(document) = web_sys::window().and_then(|w| w.document()) else {
        return;
    };
    let Ok(element) = document.create_element("input") else {
        return;
    };
    let Ok(input) = element.dyn_into::<web_sys::HtmlInputElement>() else {
        return;
    };
    input.set_type("file");
    input.set_accept(".bin");

    let onchange = Closure::<dyn FnMut(web_sys::Event)>::new(move |event: web_sys::Event| {
        let Some(input) = event
            .target()
            .and_then(|t| t.dyn_into::<web_sys::HtmlInputElement>().ok())
        else {
            return;
        };
        let Some(file) = input.files().and_then(|list| list.get(0)) else {
            return;
        };
        let name = file.name();
        let tx = tx.clone();
        spawn_local(async move {
            match JsFuture::from(file.array_buffer()).await {
                Ok(buffer) => {
                    let data = js_sys::Uint8Array::new(&buffer).to_vec();
                    let _ = tx.unbounded_send(LoadedFile { name, data });
                }
                Err(e) => log::error!("file read failed: {:?}", e),
            }
        });
    });
    input.set_onchange(Some(onchange.as_ref().unchecked_ref()));
    // The input element and its handler live until the page unloads.
    onchange.forget();
    input.click();
}
