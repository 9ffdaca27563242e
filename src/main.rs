use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use driftbox::api_client::DriftClient;
use driftbox::config::Config;
use driftbox::expansion::ExpansionState;
use driftbox::folder::format_size;
use driftbox::hierarchy::FolderHierarchy;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "driftbox")]
#[command(about = "Browse folders and upload files to DriftBox cloud storage", long_about = None)]
struct Cli {
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Login {
        #[arg(help = "Account email")]
        email: String,

        #[arg(short, long, help = "Password (read from stdin when omitted)")]
        password: Option<String>,
    },

    Register {
        #[arg(help = "Display name")]
        username: String,

        #[arg(help = "Account email")]
        email: String,

        #[arg(short, long, help = "Password (read from stdin when omitted)")]
        password: Option<String>,
    },

    Logout,

    Tree {
        #[arg(short, long, help = "Expand every folder")]
        expand_all: bool,

        #[arg(short, long, value_name = "FOLDER_ID", help = "Expand the ancestors of this folder")]
        reveal: Option<String>,
    },

    Mkdir {
        #[arg(help = "Folder name")]
        name: String,

        #[arg(short, long, value_name = "FOLDER_ID", help = "Parent folder")]
        parent: Option<String>,
    },

    Rmdir {
        #[arg(help = "Folder id")]
        id: String,
    },

    Files {
        #[arg(short, long, value_name = "FOLDER_ID", help = "List files of this folder")]
        folder: Option<String>,
    },

    Upload {
        #[arg(help = "Local file path")]
        file: PathBuf,

        #[arg(short, long, value_name = "FOLDER_ID", help = "Destination folder (root when omitted)")]
        folder: Option<String>,
    },

    Download {
        #[arg(help = "File id")]
        id: String,

        #[arg(short, long, value_name = "PATH", help = "Output file (defaults to the file id)")]
        output: Option<PathBuf>,
    },

    Favorites,

    Star {
        #[arg(help = "File id")]
        id: String,
    },

    Storage,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let config_path = cli.config.clone().or_else(Config::default_path);
    let mut config = if let Some(path) = &cli.config {
        Config::load_from(path)?
    } else {
        Config::load()?
    };

    let client = DriftClient::new(&config.api.base_url, config.api.token.clone())?;

    match cli.command {
        Commands::Register { username, email, password } => {
            let password = match password {
                Some(p) => p,
                None => read_password(&email)?,
            };

            let message = client.register(&username, &email, &password).await?;
            info!("{}", message);
        }

        Commands::Login { email, password } => {
            let password = match password {
                Some(p) => p,
                None => read_password(&email)?,
            };

            let login = client.login(&email, &password).await?;
            config.set_session(login.token, &login.user.email, &login.user.name);

            let path = config_path.ok_or_else(|| anyhow!("No config directory available"))?;
            config.save_to_file(&path)?;
            info!("Session saved to {}", path.display());
        }

        Commands::Logout => {
            config.clear_session();
            if let Some(path) = config_path {
                config.save_to_file(&path)?;
            }
            info!("Logged out");
        }

        Commands::Tree { expand_all, reveal } => {
            let mut hierarchy =
                FolderHierarchy::load(&client, ExpansionState::new(), reveal.as_deref()).await;
            if expand_all {
                hierarchy.expansion.expand_all(&hierarchy.forest);
            }

            for failure in &hierarchy.failures {
                warn!(
                    "Listing for {} failed: {}",
                    failure.parent_id.as_deref().unwrap_or("root"),
                    failure.message
                );
            }

            println!("{}", driftbox::tree::ROOT_LABEL);
            for (level, node) in hierarchy.visible_rows() {
                let marker = if !node.has_children {
                    " "
                } else if hierarchy.expansion.is_expanded(&node.id) {
                    "▾"
                } else {
                    "▸"
                };
                println!("{}{} {}  [{}]", "  ".repeat(level + 1), marker, node.name, node.id);
            }

            if let Some(id) = reveal {
                println!("\nSelected: {}", hierarchy.display_name(Some(&id)));
            }
        }

        Commands::Mkdir { name, parent } => {
            let folder = client.create_folder(&name, parent.as_deref()).await?;
            info!("Created folder {} ({})", folder.name, folder.id);
        }

        Commands::Rmdir { id } => {
            client.delete_folder(&id).await?;
            info!("Deleted folder {}", id);
        }

        Commands::Files { folder } => {
            let files = client.list_files(folder.as_deref()).await?;

            if files.is_empty() {
                println!("No files found");
            } else {
                for file in files {
                    println!(
                        "  {} {}  {}  [{}]",
                        if file.is_favorite { "★" } else { " " },
                        file.display_name(),
                        format_size(file.size.max(0) as u64),
                        file.id
                    );
                }
            }
        }

        Commands::Upload { file, folder } => {
            let destination = match folder.as_deref() {
                Some(id) => FolderHierarchy::load(&client, ExpansionState::new(), Some(id))
                    .await
                    .display_name(Some(id)),
                None => driftbox::tree::ROOT_LABEL.to_string(),
            };

            info!("Uploading {} to {}", file.display(), destination);
            let uploaded = client.upload_file(&file, folder.as_deref()).await?;
            info!("Successfully uploaded {} ({})", uploaded.display_name(), uploaded.id);
        }

        Commands::Download { id, output } => {
            let output = output.unwrap_or_else(|| PathBuf::from(&id));
            let written = client.download_file(&id, &output).await?;
            info!(
                "Saved {} ({})",
                output.display(),
                format_size(written)
            );
        }

        Commands::Favorites => {
            let files = client.favorites().await?;

            if files.is_empty() {
                println!("No favorite files");
            } else {
                for file in files {
                    println!("  ★ {}  [{}]", file.display_name(), file.id);
                }
            }
        }

        Commands::Star { id } => {
            let is_favorite = client.toggle_favorite(&id).await?;
            info!(
                "File {} {}",
                id,
                if is_favorite { "added to favorites" } else { "removed from favorites" }
            );
        }

        Commands::Storage => {
            let storage = client.storage_info().await?;
            println!(
                "Used {} of {} ({:.1}%)",
                format_size(storage.used_space.max(0) as u64),
                format_size(storage.max_space.max(0) as u64),
                storage.usage_percent()
            );
            println!("Files: {}  Folders: {}", storage.file_count, storage.folder_count);
        }
    }

    Ok(())
}

fn read_password(email: &str) -> Result<String> {
    println!("Password for {}:", email);
    let mut input = String::new();
    std::io::stdin()
        .read_line(&mut input)
        .context("Failed to read password")?;
    Ok(input.trim_end().to_string())
}
