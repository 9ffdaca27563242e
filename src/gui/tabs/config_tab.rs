use crate::app::AppState;
use driftbox::api_client::DriftClient;
use driftbox::config::Config;
use eframe::egui;
use std::sync::{Arc, Mutex};
use tokio::runtime::Runtime;

pub struct ConfigTab {
    state: Arc<Mutex<AppState>>,
    runtime: Arc<Runtime>,
    base_url: String,
    email: String,
    password: String,
    show_password: bool,
    test_in_progress: Arc<Mutex<bool>>,
}

impl ConfigTab {
    pub fn new(state: Arc<Mutex<AppState>>, runtime: Arc<Runtime>) -> Self {
        let config = state.lock().unwrap().config.clone();

        Self {
            state,
            runtime,
            base_url: config.api.base_url,
            email: config.session.email.unwrap_or_default(),
            password: String::new(),
            show_password: false,
            test_in_progress: Arc::new(Mutex::new(false)),
        }
    }

    pub fn show(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        ui.heading("Connection");
        ui.separator();

        egui::Grid::new("connection_grid")
            .num_columns(2)
            .spacing([20.0, 8.0])
            .show(ui, |ui| {
                ui.label("API URL:");
                ui.text_edit_singleline(&mut self.base_url);
                ui.end_row();

                ui.label("Email:");
                ui.text_edit_singleline(&mut self.email);
                ui.end_row();

                ui.label("Password:");
                ui.horizontal(|ui| {
                    ui.add(egui::TextEdit::singleline(&mut self.password).password(!self.show_password));
                    ui.checkbox(&mut self.show_password, "Show");
                });
                ui.end_row();
            });

        ui.add_space(20.0);

        let has_token = self.state.lock().unwrap().config.api.token.is_some();

        ui.horizontal(|ui| {
            let can_login = !self.email.is_empty() && !self.password.is_empty();
            if ui.add_enabled(can_login, egui::Button::new("🔑 Log In")).clicked() {
                self.login(ctx);
            }

            if ui.add_enabled(has_token, egui::Button::new("🔌 Use Saved Session")).clicked() {
                self.test_connection(ctx);
            }

            ui.separator();

            if ui.button("💾 Save Config").clicked() {
                self.save_config();
            }

            if ui.button("📂 Load Config").clicked() {
                self.load_config();
            }

            if ui.add_enabled(has_token, egui::Button::new("🚪 Log Out")).clicked() {
                self.logout();
            }
        });

        if *self.test_in_progress.lock().unwrap() {
            ui.add_space(10.0);
            ui.horizontal(|ui| {
                ui.spinner();
                ui.label("Contacting server...");
            });
        }
    }

    fn login(&mut self, ctx: &egui::Context) {
        {
            let mut in_progress = self.test_in_progress.lock().unwrap();
            if *in_progress {
                return;
            }
            *in_progress = true;
        }

        let test_in_progress = self.test_in_progress.clone();
        let state = self.state.clone();
        let base_url = self.base_url.trim().to_string();
        let email = self.email.trim().to_string();
        let password = std::mem::take(&mut self.password);
        let ctx = ctx.clone();

        self.runtime.spawn(async move {
            let result = async {
                let client = DriftClient::new(&base_url, None)?;
                let login = client.login(&email, &password).await?;
                let client = client.with_token(login.token.clone());
                let storage = client.storage_info().await.ok();
                Ok::<_, anyhow::Error>((client, login, storage))
            }
            .await;

            {
                let mut app_state = state.lock().unwrap();
                match result {
                    Ok((client, login, storage)) => {
                        app_state.config.api.base_url = base_url;
                        app_state.config.set_session(login.token, &email, &login.user.name);
                        app_state.client = Some(Arc::new(client));
                        app_state.is_connected = true;
                        app_state.storage = storage;
                        let saved = app_state.persist_config();
                        app_state.status_message = match saved {
                            Ok(_) => format!("✓ Logged in as {}", email),
                            Err(e) => format!("✓ Logged in as {} (session not saved: {})", email, e),
                        };
                    }
                    Err(e) => {
                        app_state.is_connected = false;
                        app_state.status_message = format!("✗ Login failed: {}", e);
                    }
                }
            }

            *test_in_progress.lock().unwrap() = false;
            ctx.request_repaint();
        });
    }

    fn test_connection(&mut self, ctx: &egui::Context) {
        {
            let mut in_progress = self.test_in_progress.lock().unwrap();
            if *in_progress {
                return;
            }
            *in_progress = true;
        }

        let test_in_progress = self.test_in_progress.clone();
        let state = self.state.clone();

        {
            let mut app_state = state.lock().unwrap();
            app_state.config.api.base_url = self.base_url.trim().to_string();
        }

        let ctx = ctx.clone();
        self.runtime.spawn(async move {
            let config = state.lock().unwrap().config.clone();

            let result = async {
                let client = DriftClient::new(&config.api.base_url, config.api.token.clone())?;
                let storage = client.storage_info().await?;
                Ok::<_, anyhow::Error>((client, storage))
            }
            .await;

            {
                let mut app_state = state.lock().unwrap();
                match result {
                    Ok((client, storage)) => {
                        app_state.client = Some(Arc::new(client));
                        app_state.is_connected = true;
                        app_state.storage = Some(storage);
                        app_state.status_message = "Successfully connected to DriftBox!".to_string();
                    }
                    Err(e) => {
                        app_state.is_connected = false;
                        app_state.status_message = format!("Connection failed: {}", e);
                    }
                }
            }

            *test_in_progress.lock().unwrap() = false;
            ctx.request_repaint();
        });
    }

    fn logout(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.config.clear_session();
        state.client = None;
        state.is_connected = false;
        state.storage = None;
        let saved = state.persist_config();
        state.status_message = match saved {
            Ok(_) => "Logged out".to_string(),
            Err(e) => format!("Logged out (failed to update saved session: {})", e),
        };
    }

    fn save_config(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.config.api.base_url = self.base_url.trim().to_string();

        let default_name = Config::default_path()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "config.json".to_string());
        let mut dialog = rfd::FileDialog::new()
            .add_filter("JSON", &["json"])
            .set_file_name(default_name);
        if let Some(dir) = Config::default_path().and_then(|p| p.parent().map(|d| d.to_path_buf())) {
            dialog = dialog.set_directory(dir);
        }

        if let Some(path) = dialog.save_file() {
            if let Err(e) = state.config.save_to_file(&path) {
                state.status_message = format!("Failed to save config: {}", e);
            } else {
                state.status_message = format!("Config saved to {:?}", path);
            }
        }
    }

    fn load_config(&mut self) {
        if let Some(path) = rfd::FileDialog::new()
            .add_filter("JSON", &["json"])
            .pick_file()
        {
            match Config::from_file(&path) {
                Ok(config) => {
                    self.base_url = config.api.base_url.clone();
                    self.email = config.session.email.clone().unwrap_or_default();

                    let mut state = self.state.lock().unwrap();
                    state.config = config;
                    state.client = None;
                    state.is_connected = false;
                    state.status_message = format!("Config loaded from {:?}", path);
                }
                Err(e) => {
                    let mut state = self.state.lock().unwrap();
                    state.status_message = format!("Failed to load config: {}", e);
                }
            }
        }
    }
}
