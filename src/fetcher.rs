use crate::folder::FolderRecord;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Source of folder listings, one level per call.
///
/// `None` lists root folders; `Some(id)` lists the direct children of `id`.
#[async_trait]
pub trait FolderLister: Send + Sync {
    async fn list_folders(&self, parent_id: Option<&str>) -> Result<Vec<FolderRecord>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderFetchFailure {
    /// `None` when the root listing itself failed
    pub parent_id: Option<String>,
    pub message: String,
}

/// Everything gathered by [`fetch_all_folders`], plus the listings that failed.
#[derive(Debug, Clone, Default)]
pub struct FetchReport {
    pub records: Vec<FolderRecord>,
    pub failures: Vec<FolderFetchFailure>,
}

impl FetchReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn root_failed(&self) -> bool {
        self.failures.iter().any(|f| f.parent_id.is_none())
    }

    pub fn failed_parents(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().filter_map(|f| f.parent_id.as_deref())
    }

    pub fn into_records(self) -> Vec<FolderRecord> {
        self.records
    }
}

/// Collect every folder reachable from the root, one level at a time.
///
/// A failed child listing leaves that folder without children and is
/// recorded in the report; the rest of the traversal carries on. Never
/// returns an error.
pub async fn fetch_all_folders<L>(lister: &L) -> FetchReport
where
    L: FolderLister + ?Sized,
{
    let mut report = FetchReport::default();

    let roots = match lister.list_folders(None).await {
        Ok(roots) => roots,
        Err(e) => {
            warn!("Failed to list root folders: {:#}", e);
            report.failures.push(FolderFetchFailure {
                parent_id: None,
                message: format!("{:#}", e),
            });
            return report;
        }
    };

    let mut visited: HashSet<String> = HashSet::new();
    let mut level: Vec<String> = Vec::new();
    for folder in roots {
        if visited.insert(folder.id.clone()) {
            level.push(folder.id.clone());
            report.records.push(folder);
        }
    }

    let mut depth = 0usize;
    while !level.is_empty() {
        debug!("Fetching {} folders at depth {}", level.len(), depth);
        let mut next_level = Vec::new();

        for parent_id in &level {
            match lister.list_folders(Some(parent_id)).await {
                Ok(children) => {
                    for child in children {
                        if visited.insert(child.id.clone()) {
                            next_level.push(child.id.clone());
                            report.records.push(child);
                        } else {
                            debug!("Folder {} already fetched, skipping", child.id);
                        }
                    }
                }
                Err(e) => {
                    warn!("No subfolders for {}: {:#}", parent_id, e);
                    report.failures.push(FolderFetchFailure {
                        parent_id: Some(parent_id.clone()),
                        message: format!("{:#}", e),
                    });
                }
            }
        }

        level = next_level;
        depth += 1;
    }

    info!(
        "Fetched {} folders ({} failed listings)",
        report.records.len(),
        report.failures.len()
    );
    report
}
