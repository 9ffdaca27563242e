use crate::app::AppState;
use chrono::{DateTime, Local};
use driftbox::expansion::ExpansionState;
use driftbox::folder::format_size;
use driftbox::hierarchy::FolderHierarchy;
use driftbox::tree::ROOT_LABEL;
use eframe::egui;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::runtime::Runtime;

#[derive(Clone)]
struct UploadRecord {
    file_name: String,
    destination: String,
    size: u64,
    timestamp: DateTime<Local>,
    success: bool,
}

pub struct UploadTab {
    state: Arc<Mutex<AppState>>,
    runtime: Arc<Runtime>,
    hierarchy: FolderHierarchy,
    pending_hierarchy: Arc<Mutex<Option<FolderHierarchy>>>,
    pending_selection: Arc<Mutex<Option<String>>>,
    /// Deep-link target to reveal once the next forest arrives
    reveal_on_install: Option<String>,
    folders_loading: Arc<Mutex<bool>>,
    needs_refresh: bool,
    selected_folder: Option<String>,
    selected_file: Option<PathBuf>,
    new_folder_name: String,
    upload_in_progress: Arc<Mutex<bool>>,
    upload_progress: Arc<Mutex<f32>>,
    recent_uploads: Arc<Mutex<Vec<UploadRecord>>>,
}

impl UploadTab {
    pub fn new(state: Arc<Mutex<AppState>>, runtime: Arc<Runtime>) -> Self {
        Self {
            state,
            runtime,
            hierarchy: FolderHierarchy::default(),
            pending_hierarchy: Arc::new(Mutex::new(None)),
            pending_selection: Arc::new(Mutex::new(None)),
            reveal_on_install: None,
            folders_loading: Arc::new(Mutex::new(false)),
            needs_refresh: true,
            selected_folder: None,
            selected_file: None,
            new_folder_name: String::new(),
            upload_in_progress: Arc::new(Mutex::new(false)),
            upload_progress: Arc::new(Mutex::new(0.0)),
            recent_uploads: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn show(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        ui.heading("Upload Files to DriftBox");
        ui.separator();

        let (is_connected, upload_target) = {
            let mut state = self.state.lock().unwrap();
            (state.is_connected, state.upload_target.take())
        };

        if !is_connected {
            ui.colored_label(egui::Color32::YELLOW, "⚠️ Please log in on the Connection tab first");
            self.needs_refresh = true;
            return;
        }

        if let Some(fresh) = self.pending_hierarchy.lock().unwrap().take() {
            self.hierarchy.install(fresh);
            if let Some(target) = self.reveal_on_install.take() {
                self.hierarchy.expansion.expand_ancestors_of(&target, &self.hierarchy.forest);
            }
        }
        if let Some(id) = self.pending_selection.lock().unwrap().take() {
            self.selected_folder = Some(id);
        }

        if let Some(target) = upload_target {
            // An empty target means the root folder
            self.selected_folder = Some(target).filter(|t| !t.is_empty());
            if let Some(id) = &self.selected_folder {
                self.hierarchy.expansion.expand_ancestors_of(id, &self.hierarchy.forest);
                self.reveal_on_install = Some(id.clone());
            }
            self.needs_refresh = true;
        }

        if self.needs_refresh && !*self.folders_loading.lock().unwrap() {
            self.needs_refresh = false;
            self.refresh_folders(ctx);
        }

        ctx.input(|i| {
            if let Some(path) = i.raw.dropped_files.iter().find_map(|f| f.path.clone()) {
                self.selected_file = Some(path);
            }
        });

        self.show_destination_picker(ui, ctx);

        ui.add_space(10.0);
        ui.separator();

        self.show_file_picker(ui, ctx);

        ui.add_space(20.0);
        ui.separator();

        self.show_recent_uploads(ui, ctx);
    }

    fn show_destination_picker(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        ui.horizontal(|ui| {
            ui.strong("Select Destination Folder");
            if self.selected_folder.is_some() {
                ui.label(format!("(Selected: {})", self.destination_label()));
            }

            if *self.folders_loading.lock().unwrap() {
                ui.spinner();
                ctx.request_repaint_after(std::time::Duration::from_millis(100));
            } else if ui.button("🔄 Refresh").clicked() {
                self.refresh_folders(ctx);
            }
        });

        if !self.hierarchy.is_complete() {
            ui.colored_label(
                egui::Color32::YELLOW,
                format!(
                    "⚠️ {} folder listings failed, some subfolders may be missing",
                    self.hierarchy.failures.len()
                ),
            );
        }

        egui::ScrollArea::vertical()
            .id_salt("folder_tree")
            .max_height(280.0)
            .show(ui, |ui| {
                if ui
                    .selectable_label(self.selected_folder.is_none(), format!("📂 {}", ROOT_LABEL))
                    .clicked()
                {
                    self.selected_folder = None;
                }

                self.show_folder_tree(ui);
            });

        ui.horizontal(|ui| {
            ui.label("New folder:");
            ui.text_edit_singleline(&mut self.new_folder_name);
            let can_create = !self.new_folder_name.trim().is_empty();
            if ui
                .add_enabled(can_create, egui::Button::new("➕ Create in selected"))
                .clicked()
            {
                self.create_folder(ctx);
            }
        });
    }

    fn show_folder_tree(&mut self, ui: &mut egui::Ui) {
        let mut toggled: Option<String> = None;
        let mut picked: Option<String> = None;

        for (level, node) in self.hierarchy.visible_rows() {
            ui.horizontal(|ui| {
                ui.add_space(level as f32 * 18.0);

                if node.has_children {
                    let arrow = if self.hierarchy.expansion.is_expanded(&node.id) {
                        "▾"
                    } else {
                        "▸"
                    };
                    if ui.small_button(arrow).clicked() {
                        toggled = Some(node.id.clone());
                    }
                } else {
                    ui.add_space(18.0);
                }

                let is_selected = self.selected_folder.as_deref() == Some(node.id.as_str());
                if ui
                    .selectable_label(is_selected, format!("📁 {}", node.name))
                    .on_hover_text(node.full_path.as_str())
                    .clicked()
                {
                    picked = Some(node.id.clone());
                }
            });
        }

        if let Some(id) = toggled {
            self.hierarchy.expansion.toggle(&id);
        }
        if let Some(id) = picked {
            self.selected_folder = Some(id);
        }
    }

    fn show_file_picker(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        ui.horizontal(|ui| {
            ui.label("Select File:");
            if ui.button("📁 Browse...").clicked() {
                if let Some(path) = rfd::FileDialog::new().pick_file() {
                    self.selected_file = Some(path);
                }
            }

            match &self.selected_file {
                Some(path) => ui.label(format!("Selected: {}", path.display())),
                None => ui.weak("or drop a file onto this window"),
            };
        });

        ui.add_space(10.0);

        let is_uploading = *self.upload_in_progress.lock().unwrap();
        if is_uploading {
            let progress = *self.upload_progress.lock().unwrap();
            ui.add(egui::ProgressBar::new(progress).show_percentage());
            ui.label(format!("Uploading to {}...", self.destination_label()));
            ctx.request_repaint_after(std::time::Duration::from_millis(100));
        } else {
            let can_upload = self.selected_file.is_some();
            if ui
                .add_enabled(can_upload, egui::Button::new(format!("⬆️ Upload to {}", self.destination_label())))
                .clicked()
            {
                self.start_upload(ctx);
            }
        }
    }

    fn show_recent_uploads(&mut self, ui: &mut egui::Ui, _ctx: &egui::Context) {
        ui.horizontal(|ui| {
            ui.heading("Recent Uploads");
            let has_uploads = !self.recent_uploads.lock().unwrap().is_empty();
            if has_uploads && ui.button("Clear History").clicked() {
                self.recent_uploads.lock().unwrap().clear();
            }
        });

        egui::ScrollArea::vertical()
            .id_salt("recent_uploads")
            .max_height(200.0)
            .show(ui, |ui| {
                let recent = self.recent_uploads.lock().unwrap().clone();
                if recent.is_empty() {
                    ui.label("No recent uploads yet");
                    return;
                }

                egui::Grid::new("recent_uploads_grid")
                    .num_columns(5)
                    .striped(true)
                    .spacing([20.0, 4.0])
                    .show(ui, |ui| {
                        ui.strong("Time");
                        ui.strong("File");
                        ui.strong("Folder");
                        ui.strong("Size");
                        ui.strong("Status");
                        ui.end_row();

                        for upload in recent.iter().rev().take(25) {
                            ui.label(upload.timestamp.format("%H:%M:%S").to_string());
                            ui.label(&upload.file_name);
                            ui.label(&upload.destination);
                            ui.label(format_size(upload.size));
                            if upload.success {
                                ui.colored_label(egui::Color32::GREEN, "✓ Success");
                            } else {
                                ui.colored_label(egui::Color32::RED, "✗ Failed");
                            }
                            ui.end_row();
                        }
                    });
            });
    }

    fn destination_label(&self) -> String {
        self.hierarchy.display_name(self.selected_folder.as_deref())
    }

    fn refresh_folders(&mut self, ctx: &egui::Context) {
        let Some(client) = self.state.lock().unwrap().client.clone() else {
            return;
        };

        {
            let mut loading = self.folders_loading.lock().unwrap();
            if *loading {
                return;
            }
            *loading = true;
        }

        let pending = self.pending_hierarchy.clone();
        let loading = self.folders_loading.clone();
        let ctx = ctx.clone();

        self.runtime.spawn(async move {
            let hierarchy = FolderHierarchy::load(client.as_ref(), ExpansionState::new(), None).await;
            *pending.lock().unwrap() = Some(hierarchy);
            *loading.lock().unwrap() = false;
            ctx.request_repaint();
        });
    }

    fn create_folder(&mut self, ctx: &egui::Context) {
        let Some(client) = self.state.lock().unwrap().client.clone() else {
            return;
        };

        {
            let mut loading = self.folders_loading.lock().unwrap();
            if *loading {
                return;
            }
            *loading = true;
        }

        let name = std::mem::take(&mut self.new_folder_name).trim().to_string();
        let parent = self.selected_folder.clone();
        let state = self.state.clone();
        let pending = self.pending_hierarchy.clone();
        let pending_selection = self.pending_selection.clone();
        let loading = self.folders_loading.clone();
        let ctx = ctx.clone();

        self.runtime.spawn(async move {
            match client.create_folder(&name, parent.as_deref()).await {
                Ok(folder) => {
                    state.lock().unwrap().status_message = format!("✓ Created folder {}", folder.name);
                    // Reload with the new folder revealed and selected
                    let hierarchy =
                        FolderHierarchy::load(client.as_ref(), ExpansionState::new(), Some(&folder.id))
                            .await;
                    *pending.lock().unwrap() = Some(hierarchy);
                    *pending_selection.lock().unwrap() = Some(folder.id);
                }
                Err(e) => {
                    state.lock().unwrap().status_message = format!("✗ Could not create folder: {}", e);
                }
            }
            *loading.lock().unwrap() = false;
            ctx.request_repaint();
        });
    }

    fn start_upload(&mut self, ctx: &egui::Context) {
        let Some(file_path) = self.selected_file.clone() else {
            return;
        };

        {
            let mut uploading = self.upload_in_progress.lock().unwrap();
            if *uploading {
                return;
            }
            *uploading = true;
        }

        *self.upload_progress.lock().unwrap() = 0.0;

        let state = self.state.clone();
        let runtime = self.runtime.clone();
        let folder_id = self.selected_folder.clone();
        let destination = self.destination_label();
        let ctx = ctx.clone();
        let upload_in_progress = self.upload_in_progress.clone();
        let upload_progress = self.upload_progress.clone();
        let recent_uploads = self.recent_uploads.clone();
        let file_name = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file")
            .to_string();
        let size = std::fs::metadata(&file_path).map(|m| m.len()).unwrap_or(0);

        std::thread::spawn(move || {
            runtime.block_on(async {
                *upload_progress.lock().unwrap() = 0.2;
                ctx.request_repaint();

                let result = async {
                    let client = state.lock().unwrap().client.clone()
                        .ok_or_else(|| anyhow::anyhow!("Not logged in"))?;

                    *upload_progress.lock().unwrap() = 0.5;
                    ctx.request_repaint();

                    client.upload_file(&file_path, folder_id.as_deref()).await?;

                    // Storage usage changes with every upload
                    let storage = client.storage_info().await.ok();

                    *upload_progress.lock().unwrap() = 1.0;
                    ctx.request_repaint();

                    Ok::<_, anyhow::Error>(storage)
                }
                .await;

                recent_uploads.lock().unwrap().push(UploadRecord {
                    file_name: file_name.clone(),
                    destination: destination.clone(),
                    size,
                    timestamp: Local::now(),
                    success: result.is_ok(),
                });

                {
                    let mut state = state.lock().unwrap();
                    match result {
                        Ok(storage) => {
                            if storage.is_some() {
                                state.storage = storage;
                            }
                            state.status_message =
                                format!("✓ Uploaded {} to {}", file_name, destination);
                        }
                        Err(e) => {
                            state.status_message = format!("✗ Upload failed: {}", e);
                        }
                    }
                }

                *upload_in_progress.lock().unwrap() = false;
                ctx.request_repaint();
            });
        });
    }
}
