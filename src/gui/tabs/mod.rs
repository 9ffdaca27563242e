mod config_tab;
mod files_tab;
mod upload_tab;

pub use config_tab::ConfigTab;
pub use files_tab::FilesTab;
pub use upload_tab::UploadTab;
