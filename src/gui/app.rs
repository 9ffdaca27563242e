use super::tabs::{ConfigTab, FilesTab, UploadTab};
use driftbox::{api_client::DriftClient, config::Config, folder::StorageInfo};
use eframe::egui;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::runtime::Runtime;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Where the session is persisted between runs
    pub config_path: Option<PathBuf>,
    pub client: Option<Arc<DriftClient>>,
    pub is_connected: bool,
    pub storage: Option<StorageInfo>,
    /// Folder the upload tab should preselect, set from the files tab
    pub upload_target: Option<String>,
    pub status_message: String,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            config: Config::load().unwrap_or_default(),
            config_path: Config::default_path(),
            client: None,
            is_connected: false,
            storage: None,
            upload_target: None,
            status_message: "Ready".to_string(),
        }
    }
}

impl AppState {
    /// Save the config where the next start loads it from
    pub fn persist_config(&self) -> anyhow::Result<Option<PathBuf>> {
        let Some(path) = &self.config_path else {
            return Ok(None);
        };
        self.config.save_to_file(path)?;
        Ok(Some(path.clone()))
    }
}

#[derive(PartialEq)]
enum Tab {
    Config,
    Upload,
    Files,
}

pub struct DriftApp {
    state: Arc<Mutex<AppState>>,
    #[allow(dead_code)]
    runtime: Arc<Runtime>,
    active_tab: Tab,
    config_tab: ConfigTab,
    upload_tab: UploadTab,
    files_tab: FilesTab,
}

impl DriftApp {
    pub fn new(_cc: &eframe::CreationContext<'_>) -> Self {
        let state = Arc::new(Mutex::new(AppState::default()));
        let runtime = Arc::new(Runtime::new().expect("Failed to create Tokio runtime"));

        Self {
            state: state.clone(),
            runtime: runtime.clone(),
            active_tab: Tab::Config,
            config_tab: ConfigTab::new(state.clone(), runtime.clone()),
            upload_tab: UploadTab::new(state.clone(), runtime.clone()),
            files_tab: FilesTab::new(state.clone(), runtime.clone()),
        }
    }
}

impl eframe::App for DriftApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("☁ DriftBox");
                ui.separator();

                let state = self.state.lock().unwrap();
                if state.is_connected {
                    ui.colored_label(egui::Color32::GREEN, "● Connected");
                } else {
                    ui.colored_label(egui::Color32::RED, "● Disconnected");
                }

                if let Some(email) = &state.config.session.email {
                    ui.separator();
                    ui.label(format!("👤 {}", email));
                }

                if let Some(storage) = &state.storage {
                    ui.separator();
                    ui.add(
                        egui::ProgressBar::new((storage.usage_percent() / 100.0) as f32)
                            .desired_width(120.0)
                            .text(format!("{:.1}% used", storage.usage_percent())),
                    );
                }
            });
        });

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                let status = self.state.lock().unwrap().status_message.clone();
                ui.label(format!("Status: {}", status));
            });
        });

        egui::SidePanel::left("side_panel")
            .default_width(150.0)
            .show(ctx, |ui| {
                ui.vertical(|ui| {
                    ui.heading("Navigation");
                    ui.separator();

                    ui.selectable_value(&mut self.active_tab, Tab::Config, "⚙️ Connection");
                    ui.selectable_value(&mut self.active_tab, Tab::Upload, "⬆️ Upload");
                    ui.selectable_value(&mut self.active_tab, Tab::Files, "📂 Files");
                });
            });

        // "Upload here" in the files tab hands over to the upload tab
        if self.active_tab == Tab::Files && self.state.lock().unwrap().upload_target.is_some() {
            self.active_tab = Tab::Upload;
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            match self.active_tab {
                Tab::Config => self.config_tab.show(ui, ctx),
                Tab::Upload => self.upload_tab.show(ui, ctx),
                Tab::Files => self.files_tab.show(ui, ctx),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_at(path: Option<PathBuf>) -> AppState {
        AppState {
            config: Config::default(),
            config_path: path,
            client: None,
            is_connected: false,
            storage: None,
            upload_target: None,
            status_message: String::new(),
        }
    }

    #[test]
    fn test_persist_config_writes_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("driftbox").join("config.json");

        let mut state = state_at(Some(path.clone()));
        state.config.set_session("jwt".to_string(), "a@b.c", "ayush");
        assert_eq!(state.persist_config().unwrap(), Some(path.clone()));

        let saved = Config::load_from(&path).unwrap();
        assert_eq!(saved.api.token.as_deref(), Some("jwt"));
        assert_eq!(saved.session.email.as_deref(), Some("a@b.c"));
    }

    #[test]
    fn test_persist_config_without_path_is_noop() {
        let state = state_at(None);
        assert_eq!(state.persist_config().unwrap(), None);
    }
}
