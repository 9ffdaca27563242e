use crate::fetcher::FolderLister;
use crate::folder::{FileRecord, FolderRecord, StorageInfo};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{multipart, Client, Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    #[serde(default)]
    pub user: UserInfo,
}

// The server encodes empty lists as `null`
#[derive(Deserialize)]
struct FoldersBody {
    #[serde(default)]
    folders: Option<Vec<FolderRecord>>,
}

#[derive(Deserialize)]
struct FolderBody {
    folder: FolderRecord,
}

#[derive(Deserialize)]
struct FilesBody {
    #[serde(default)]
    files: Option<Vec<FileRecord>>,
}

#[derive(Deserialize)]
struct FileBody {
    file: FileRecord,
}

#[derive(Deserialize)]
struct FavoriteBody {
    is_favorite: bool,
}

#[derive(Deserialize)]
struct StorageBody {
    #[serde(default)]
    storage: Option<StorageInfo>,
}

#[derive(Serialize)]
struct CreateFolderRequest<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_id: Option<&'a str>,
}

/// Where to fetch a file from when the proxied download is unavailable
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DownloadLink {
    pub download_url: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub expires_in: Option<String>,
}

impl DownloadLink {
    pub fn is_signed(&self) -> bool {
        self.method == "signed_url"
    }
}

#[derive(Deserialize)]
struct MessageBody {
    #[serde(default)]
    message: String,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    username: &'a str,
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// HTTP client for the DriftBox REST API
#[derive(Debug, Clone)]
pub struct DriftClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl DriftClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        // Keep a trailing slash so `join` appends instead of replacing
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url = Url::parse(&normalized)
            .with_context(|| format!("Invalid API URL: {}", base_url))?;

        Ok(Self {
            client: Client::new(),
            base_url,
            token: token.filter(|t| !t.is_empty()),
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self
            .base_url
            .join(path)
            .with_context(|| format!("Failed to build URL for {}", path))?;
        debug!("{} {}", method, url);

        let builder = self.client.request(method, url);
        Ok(match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }

    async fn send(builder: RequestBuilder, action: &str) -> Result<Response> {
        let response = builder
            .send()
            .await
            .with_context(|| format!("Failed to {}", action))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "DriftBox {} failed with status {}: {}",
                action,
                status,
                error_text
            ));
        }

        Ok(response)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse> {
        let builder = self
            .request(Method::POST, "login")?
            .json(&LoginRequest { email, password });
        let response = Self::send(builder, "login").await?;

        let login: LoginResponse = response
            .json()
            .await
            .context("Failed to parse login response")?;
        info!("Logged in as {}", login.user.email);
        Ok(login)
    }

    /// Create an account; returns the server's confirmation message
    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<String> {
        let builder = self.request(Method::POST, "register")?.json(&RegisterRequest {
            username,
            email,
            password,
        });
        let response = Self::send(builder, "register").await?;

        let body: MessageBody = response
            .json()
            .await
            .context("Failed to parse register response")?;
        info!("Registered {}", email);
        Ok(body.message)
    }

    pub async fn list_folders(&self, parent_id: Option<&str>) -> Result<Vec<FolderRecord>> {
        let mut builder = self.request(Method::GET, "api/folders")?;
        if let Some(parent) = parent_id {
            builder = builder.query(&[("parent_id", parent)]);
        }
        let response = Self::send(builder, "list folders").await?;

        let body: FoldersBody = response
            .json()
            .await
            .context("Failed to parse folder listing")?;
        Ok(body.folders.unwrap_or_default())
    }

    pub async fn create_folder(&self, name: &str, parent_id: Option<&str>) -> Result<FolderRecord> {
        if name.trim().is_empty() {
            return Err(anyhow!("Folder name cannot be empty"));
        }

        let builder = self
            .request(Method::POST, "api/folders")?
            .json(&CreateFolderRequest { name, parent_id });
        let response = Self::send(builder, "create folder").await?;

        let body: FolderBody = response
            .json()
            .await
            .context("Failed to parse created folder")?;
        Ok(body.folder)
    }

    pub async fn delete_folder(&self, folder_id: &str) -> Result<()> {
        let builder = self.request(Method::DELETE, &format!("api/folders/{}", folder_id))?;
        Self::send(builder, "delete folder").await?;
        Ok(())
    }

    pub async fn list_files(&self, folder_id: Option<&str>) -> Result<Vec<FileRecord>> {
        let mut builder = self.request(Method::GET, "api/files")?;
        if let Some(folder) = folder_id {
            builder = builder.query(&[("folder_id", folder)]);
        }
        let response = Self::send(builder, "list files").await?;

        let body: FilesBody = response
            .json()
            .await
            .context("Failed to parse file listing")?;
        Ok(body.files.unwrap_or_default())
    }

    pub async fn upload_file(&self, file_path: &Path, folder_id: Option<&str>) -> Result<FileRecord> {
        let data = tokio::fs::read(file_path)
            .await
            .with_context(|| format!("Failed to read {}", file_path.display()))?;
        let file_name = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file")
            .to_string();

        self.upload_bytes(&file_name, Bytes::from(data), folder_id).await
    }

    pub async fn upload_bytes(
        &self,
        file_name: &str,
        data: Bytes,
        folder_id: Option<&str>,
    ) -> Result<FileRecord> {
        info!("Uploading {} ({} bytes)", file_name, data.len());

        let length = data.len() as u64;
        let part = multipart::Part::stream_with_length(data, length).file_name(file_name.to_string());
        let mut form = multipart::Form::new().part("file", part);
        if let Some(folder) = folder_id.filter(|f| !f.is_empty()) {
            form = form.text("folder_id", folder.to_string());
        }

        let builder = self.request(Method::POST, "api/files/upload")?.multipart(form);
        let response = Self::send(builder, "upload file").await?;

        let body: FileBody = response
            .json()
            .await
            .context("Failed to parse upload response")?;
        Ok(body.file)
    }

    pub async fn delete_file(&self, file_id: &str) -> Result<()> {
        let builder = self.request(Method::DELETE, &format!("api/files/{}", file_id))?;
        Self::send(builder, "delete file").await?;
        Ok(())
    }

    /// Ask the server for a download link instead of the proxied body
    pub async fn download_link(&self, file_id: &str) -> Result<DownloadLink> {
        let builder = self
            .request(Method::GET, &format!("api/files/{}/download", file_id))?
            .query(&[("redirect", "true")]);
        let response = Self::send(builder, "get download link").await?;

        response
            .json()
            .await
            .context("Failed to parse download link")
    }

    /// Download a file to `dest`, returning the number of bytes written.
    ///
    /// The body is streamed through the API first. When that fails, a signed
    /// storage URL is requested and fetched directly.
    pub async fn download_file(&self, file_id: &str, dest: &Path) -> Result<u64> {
        let builder = self.request(Method::GET, &format!("api/files/{}/download", file_id))?;
        let response = match Self::send(builder, "download file").await {
            Ok(response) => response,
            Err(proxy_error) => {
                warn!("Direct download of {} failed, trying signed URL: {}", file_id, proxy_error);

                let link = self.download_link(file_id).await?;
                if !link.is_signed() {
                    return Err(proxy_error);
                }
                let url = self
                    .base_url
                    .join(&link.download_url)
                    .with_context(|| format!("Invalid download URL: {}", link.download_url))?;
                // Signed URLs carry their own credentials
                Self::send(self.client.get(url), "download file from signed URL").await?
            }
        };

        let written = write_body(response, dest).await?;
        info!("Downloaded {} to {} ({} bytes)", file_id, dest.display(), written);
        Ok(written)
    }

    /// Flip the favorite flag of a file, returning the new state
    pub async fn toggle_favorite(&self, file_id: &str) -> Result<bool> {
        let builder = self.request(
            Method::POST,
            &format!("api/files/toggle-favorite/{}", file_id),
        )?;
        let response = Self::send(builder, "toggle favorite").await?;

        let body: FavoriteBody = response
            .json()
            .await
            .context("Failed to parse favorite response")?;
        Ok(body.is_favorite)
    }

    pub async fn favorites(&self) -> Result<Vec<FileRecord>> {
        let builder = self.request(Method::GET, "api/files/favorites")?;
        let response = Self::send(builder, "list favorites").await?;

        let body: FilesBody = response
            .json()
            .await
            .context("Failed to parse favorites")?;
        Ok(body.files.unwrap_or_default())
    }

    pub async fn storage_info(&self) -> Result<StorageInfo> {
        let builder = self.request(Method::GET, "api/storage")?;
        let response = Self::send(builder, "get storage info").await?;

        let body: StorageBody = response
            .json()
            .await
            .context("Failed to parse storage info")?;
        Ok(body.storage.unwrap_or_default())
    }
}

async fn write_body(mut response: Response, dest: &Path) -> Result<u64> {
    let mut file = tokio::fs::File::create(dest)
        .await
        .with_context(|| format!("Failed to create {}", dest.display()))?;

    let mut written = 0u64;
    while let Some(chunk) = response
        .chunk()
        .await
        .context("Failed to read download body")?
    {
        file.write_all(&chunk)
            .await
            .with_context(|| format!("Failed to write {}", dest.display()))?;
        written += chunk.len() as u64;
    }
    file.flush().await.context("Failed to flush download")?;

    Ok(written)
}

#[async_trait]
impl FolderLister for DriftClient {
    async fn list_folders(&self, parent_id: Option<&str>) -> Result<Vec<FolderRecord>> {
        DriftClient::list_folders(self, parent_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::fetch_all_folders;
    use crate::tree;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> DriftClient {
        DriftClient::new(&server.uri(), Some("secret-token".to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_list_root_folders_sends_bearer_token() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/folders"))
            .and(query_param_is_missing("parent_id"))
            .and(header("authorization", "Bearer secret-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "folders": [{"id": "1", "name": "Docs", "user_id": "u1", "path": "/Docs"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let folders = client.list_folders(None).await.unwrap();
        assert_eq!(folders.len(), 1);
        assert_eq!(folders[0].name, "Docs");
        assert!(folders[0].is_root());
    }

    #[tokio::test]
    async fn test_list_child_folders_null_body() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/folders"))
            .and(query_param("parent_id", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "folders": null })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        assert!(client.list_folders(Some("abc")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/folders"))
            .respond_with(ResponseTemplate::new(500).set_body_string("Could not retrieve folders"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.list_folders(None).await.unwrap_err().to_string();
        assert!(err.contains("500"));
        assert!(err.contains("Could not retrieve folders"));
    }

    #[tokio::test]
    async fn test_fetch_all_folders_over_http() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/folders"))
            .and(query_param_is_missing("parent_id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "folders": [{"id": "1", "name": "Docs"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/folders"))
            .and(query_param("parent_id", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "folders": [{"id": "2", "name": "2024", "parent_id": "1"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/folders"))
            .and(query_param("parent_id", "2"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let report = fetch_all_folders(&client).await;
        assert_eq!(report.failed_parents().collect::<Vec<_>>(), vec!["2"]);

        let forest = tree::assemble(&report.records);
        assert_eq!(tree::find(&forest, "2").unwrap().full_path, "Docs / 2024");
    }

    #[tokio::test]
    async fn test_create_folder_under_parent() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/folders"))
            .and(body_json(json!({"name": "Jan", "parent_id": "2"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "message": "Folder created successfully",
                "folder": {"id": "3", "name": "Jan", "parent_id": "2"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let folder = client.create_folder("Jan", Some("2")).await.unwrap();
        assert_eq!(folder.id, "3");
        assert_eq!(folder.parent_id.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_create_folder_rejects_blank_name() {
        let client = DriftClient::new("http://localhost:8000", None).unwrap();
        assert!(client.create_folder("  ", None).await.is_err());
    }

    #[tokio::test]
    async fn test_login_returns_token() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/login"))
            .and(body_json(json!({"email": "a@b.c", "password": "pw"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token": "jwt",
                "user": {"id": "u1", "name": "ayush", "email": "a@b.c"}
            })))
            .mount(&server)
            .await;

        let client = DriftClient::new(&server.uri(), None).unwrap();
        assert!(!client.is_authenticated());
        let login = client.login("a@b.c", "pw").await.unwrap();
        assert_eq!(login.token, "jwt");
        assert_eq!(login.user.name, "ayush");
        assert!(client.with_token(login.token).is_authenticated());
    }

    #[tokio::test]
    async fn test_upload_bytes_to_folder() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/files/upload"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "message": "File uploaded successfully",
                "file": {
                    "id": "f1",
                    "name": "notes.txt",
                    "original_name": "notes.txt",
                    "size": 5,
                    "folder_id": "2"
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let file = client
            .upload_bytes("notes.txt", Bytes::from_static(b"hello"), Some("2"))
            .await
            .unwrap();
        assert_eq!(file.folder_id.as_deref(), Some("2"));
        assert_eq!(file.size, 5);
    }

    #[tokio::test]
    async fn test_toggle_favorite_and_storage() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/files/toggle-favorite/f1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": "File favorite status updated",
                "is_favorite": true
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/storage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "storage": {"used_space": 512, "max_space": 1024, "file_count": 3, "folder_count": 2},
                "usage_percentage": 50.0
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        assert!(client.toggle_favorite("f1").await.unwrap());

        let storage = client.storage_info().await.unwrap();
        assert_eq!(storage.file_count, 3);
        assert_eq!(storage.usage_percent(), 50.0);
    }

    #[tokio::test]
    async fn test_register_sends_username() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/register"))
            .and(body_json(json!({"username": "ayush", "email": "a@b.c", "password": "pw"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "message": "User registered successfully"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = DriftClient::new(&server.uri(), None).unwrap();
        let message = client.register("ayush", "a@b.c", "pw").await.unwrap();
        assert_eq!(message, "User registered successfully");
    }

    #[tokio::test]
    async fn test_download_streams_to_file() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/files/f1/download"))
            .and(query_param_is_missing("redirect"))
            .and(header("authorization", "Bearer secret-token"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello drift".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("notes.txt");

        let client = client_for(&server).await;
        let written = client.download_file("f1", &dest).await.unwrap();
        assert_eq!(written, 11);
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello drift");
    }

    #[tokio::test]
    async fn test_download_falls_back_to_signed_url() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/files/f1/download"))
            .and(query_param_is_missing("redirect"))
            .respond_with(ResponseTemplate::new(500).set_body_string("Could not download file"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/files/f1/download"))
            .and(query_param("redirect", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "download_url": format!("{}/bucket/f1?sig=abc", server.uri()),
                "expires_in": "1 hour",
                "method": "signed_url"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/bucket/f1"))
            .and(query_param("sig", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"signed".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("f1.bin");

        let client = client_for(&server).await;
        assert_eq!(client.download_file("f1", &dest).await.unwrap(), 6);
        assert_eq!(std::fs::read(&dest).unwrap(), b"signed");
    }

    #[tokio::test]
    async fn test_download_proxy_link_keeps_original_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/files/f1/download"))
            .and(query_param_is_missing("redirect"))
            .respond_with(ResponseTemplate::new(500).set_body_string("Could not download file"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/files/f1/download"))
            .and(query_param("redirect", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "download_url": "/api/files/f1/download",
                "method": "proxy"
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = client_for(&server).await;
        let err = client
            .download_file("f1", &dir.path().join("f1.bin"))
            .await
            .unwrap_err()
            .to_string();
        assert!(err.contains("Could not download file"));
    }

    #[test]
    fn test_base_url_keeps_path_prefix() {
        let client = DriftClient::new("https://example.com/drift", None).unwrap();
        assert_eq!(
            client.base_url().join("api/folders").unwrap().as_str(),
            "https://example.com/drift/api/folders"
        );
    }
}
