use crate::app::AppState;
use driftbox::folder::{format_size, FileRecord, FolderRecord};
use driftbox::tree::{compare_names, ROOT_LABEL};
use eframe::egui;
use std::sync::{Arc, Mutex};
use tokio::runtime::Runtime;

#[derive(Clone, Default)]
struct FolderView {
    folders: Vec<FolderRecord>,
    files: Vec<FileRecord>,
    loading: bool,
    error: Option<String>,
    last_refresh: Option<std::time::Instant>,
}

enum FileAction {
    Open(FolderRecord),
    Download(FileRecord),
    ToggleFavorite(String),
    Delete(String),
}

pub struct FilesTab {
    state: Arc<Mutex<AppState>>,
    runtime: Arc<Runtime>,
    view: Arc<Mutex<FolderView>>,
    /// (id, name) from the outermost folder to the current one
    breadcrumb: Vec<(String, String)>,
    filter_text: String,
    favorites_only: bool,
    needs_refresh: bool,
}

impl FilesTab {
    pub fn new(state: Arc<Mutex<AppState>>, runtime: Arc<Runtime>) -> Self {
        Self {
            state,
            runtime,
            view: Arc::new(Mutex::new(FolderView::default())),
            breadcrumb: Vec::new(),
            filter_text: String::new(),
            favorites_only: false,
            needs_refresh: true,
        }
    }

    fn current_folder(&self) -> Option<String> {
        self.breadcrumb.last().map(|(id, _)| id.clone())
    }

    pub fn show(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        ui.heading("My Files");
        ui.separator();

        let is_connected = self.state.lock().unwrap().is_connected;

        if !is_connected {
            ui.colored_label(egui::Color32::YELLOW, "⚠️ Please log in on the Connection tab first");
            self.needs_refresh = true;
            return;
        }

        if self.needs_refresh && !self.view.lock().unwrap().loading {
            self.needs_refresh = false;
            self.refresh(ctx);
        }

        let view = self.view.lock().unwrap().clone();

        ui.horizontal(|ui| {
            if ui.link(ROOT_LABEL).clicked() {
                self.breadcrumb.clear();
                self.needs_refresh = true;
            }
            let mut cut: Option<usize> = None;
            for (index, (_, name)) in self.breadcrumb.iter().enumerate() {
                ui.label("/");
                if ui.link(name).clicked() {
                    cut = Some(index + 1);
                }
            }
            if let Some(len) = cut {
                self.breadcrumb.truncate(len);
                self.needs_refresh = true;
            }
        });

        ui.horizontal(|ui| {
            ui.label("Search:");
            ui.text_edit_singleline(&mut self.filter_text);

            if ui.checkbox(&mut self.favorites_only, "★ Favorites only").changed() {
                self.needs_refresh = true;
            }

            if view.loading {
                ui.spinner();
                ui.label("Loading...");
                ctx.request_repaint_after(std::time::Duration::from_millis(100));
            } else if ui.button("🔄 Refresh").clicked() {
                self.refresh(ctx);
            }

            if ui.button("⬆️ Upload here").clicked() {
                let target = self.current_folder().unwrap_or_default();
                self.state.lock().unwrap().upload_target = Some(target);
            }

            if let Some(instant) = view.last_refresh {
                ui.label(format!("(updated {} seconds ago)", instant.elapsed().as_secs()));
            }
        });

        if let Some(error) = &view.error {
            ui.colored_label(egui::Color32::RED, format!("Error: {}", error));
        }

        ui.add_space(10.0);

        let filter = self.filter_text.to_lowercase();
        let mut folders: Vec<&FolderRecord> = view
            .folders
            .iter()
            .filter(|f| filter.is_empty() || f.name.to_lowercase().contains(&filter))
            .collect();
        folders.sort_by(|a, b| compare_names(&a.name, &b.name));
        let files: Vec<&FileRecord> = view
            .files
            .iter()
            .filter(|f| filter.is_empty() || f.display_name().to_lowercase().contains(&filter))
            .collect();

        ui.label(format!("{} folders, {} files", folders.len(), files.len()));
        ui.separator();

        let mut actions = Vec::new();

        egui::ScrollArea::vertical().show(ui, |ui| {
            if folders.is_empty() && files.is_empty() && !view.loading {
                ui.label("This folder is empty");
                return;
            }

            egui::Grid::new("files_grid")
                .striped(true)
                .num_columns(3)
                .spacing([40.0, 4.0])
                .show(ui, |ui| {
                    ui.strong("Name");
                    ui.strong("Size");
                    ui.strong("Actions");
                    ui.end_row();

                    for folder in &folders {
                        if ui.link(format!("📁 {}", folder.name)).clicked() {
                            actions.push(FileAction::Open((*folder).clone()));
                        }
                        ui.label("");
                        ui.label("");
                        ui.end_row();
                    }

                    for file in &files {
                        ui.label(format!("📄 {}", file.display_name()));
                        ui.label(format_size(file.size.max(0) as u64));
                        ui.horizontal(|ui| {
                            if ui.small_button("⬇️").on_hover_text("Download").clicked() {
                                actions.push(FileAction::Download((*file).clone()));
                            }
                            let star = if file.is_favorite { "★" } else { "☆" };
                            if ui.small_button(star).on_hover_text("Toggle favorite").clicked() {
                                actions.push(FileAction::ToggleFavorite(file.id.clone()));
                            }
                            if ui.small_button("🗑️").on_hover_text("Delete").clicked() {
                                actions.push(FileAction::Delete(file.id.clone()));
                            }
                        });
                        ui.end_row();
                    }
                });
        });

        for action in actions {
            match action {
                FileAction::Open(folder) => {
                    self.breadcrumb.push((folder.id, folder.name));
                    self.favorites_only = false;
                    self.needs_refresh = true;
                }
                FileAction::Download(file) => self.download_file(file, ctx),
                FileAction::ToggleFavorite(id) => self.toggle_favorite(id, ctx),
                FileAction::Delete(id) => self.delete_file(id, ctx),
            }
        }
    }

    fn refresh(&mut self, ctx: &egui::Context) {
        {
            let mut view = self.view.lock().unwrap();
            if view.loading {
                return;
            }
            view.loading = true;
            view.error = None;
        }

        let app_state = self.state.clone();
        let view = self.view.clone();
        let folder_id = self.current_folder();
        let favorites_only = self.favorites_only;
        let ctx = ctx.clone();

        self.runtime.spawn(async move {
            let client = app_state.lock().unwrap().client.clone();

            let result = async {
                let client = client.ok_or_else(|| anyhow::anyhow!("Not logged in"))?;
                if favorites_only {
                    Ok::<_, anyhow::Error>((Vec::new(), client.favorites().await?))
                } else {
                    let folders = client.list_folders(folder_id.as_deref()).await?;
                    let files = client.list_files(folder_id.as_deref()).await?;
                    Ok((folders, files))
                }
            }
            .await;

            {
                let mut view = view.lock().unwrap();
                match result {
                    Ok((folders, files)) => {
                        view.folders = folders;
                        view.files = files;
                        view.last_refresh = Some(std::time::Instant::now());
                        app_state.lock().unwrap().status_message =
                            format!("Loaded {} folders, {} files", view.folders.len(), view.files.len());
                    }
                    Err(e) => {
                        view.error = Some(e.to_string());
                        app_state.lock().unwrap().status_message = format!("Failed to list files: {}", e);
                    }
                }
                view.loading = false;
            }

            ctx.request_repaint();
        });
    }

    fn download_file(&mut self, file: FileRecord, ctx: &egui::Context) {
        let Some(dest) = rfd::FileDialog::new()
            .set_file_name(file.display_name())
            .save_file()
        else {
            return;
        };

        let app_state = self.state.clone();
        let ctx = ctx.clone();

        app_state.lock().unwrap().status_message = format!("Downloading {}...", file.display_name());

        self.runtime.spawn(async move {
            let client = app_state.lock().unwrap().client.clone();
            let Some(client) = client else {
                return;
            };

            let message = match client.download_file(&file.id, &dest).await {
                Ok(written) => format!("✓ Saved {} ({})", dest.display(), format_size(written)),
                Err(e) => format!("✗ Failed to download {}: {}", file.display_name(), e),
            };
            app_state.lock().unwrap().status_message = message;

            ctx.request_repaint();
        });
    }

    fn toggle_favorite(&mut self, file_id: String, ctx: &egui::Context) {
        let app_state = self.state.clone();
        let view = self.view.clone();
        let ctx = ctx.clone();

        self.runtime.spawn(async move {
            let client = app_state.lock().unwrap().client.clone();
            let Some(client) = client else {
                return;
            };

            match client.toggle_favorite(&file_id).await {
                Ok(is_favorite) => {
                    let mut view = view.lock().unwrap();
                    if let Some(file) = view.files.iter_mut().find(|f| f.id == file_id) {
                        file.is_favorite = is_favorite;
                    }
                }
                Err(e) => {
                    app_state.lock().unwrap().status_message = format!("✗ Failed to update favorite: {}", e);
                }
            }

            ctx.request_repaint();
        });
    }

    fn delete_file(&mut self, file_id: String, ctx: &egui::Context) {
        let app_state = self.state.clone();
        let view = self.view.clone();
        let ctx = ctx.clone();

        {
            let mut app = app_state.lock().unwrap();
            app.status_message = format!("Deleting {}...", file_id);
        }

        self.runtime.spawn(async move {
            let client = app_state.lock().unwrap().client.clone();
            let Some(client) = client else {
                return;
            };

            match client.delete_file(&file_id).await {
                Ok(()) => {
                    view.lock().unwrap().files.retain(|f| f.id != file_id);
                    let storage = client.storage_info().await.ok();

                    let mut app = app_state.lock().unwrap();
                    if storage.is_some() {
                        app.storage = storage;
                    }
                    app.status_message = "✓ File deleted".to_string();
                }
                Err(e) => {
                    app_state.lock().unwrap().status_message = format!("✗ Failed to delete: {}", e);
                }
            }

            ctx.request_repaint();
        });
    }
}
