use crate::expansion::ExpansionState;
use crate::fetcher::{fetch_all_folders, FolderFetchFailure, FolderLister};
use crate::folder::{FolderNode, FolderRecord};
use crate::tree;
use tracing::info;

/// A freshly assembled forest together with the expansion state that
/// goes with it.
#[derive(Debug, Default)]
pub struct FolderHierarchy {
    pub forest: Vec<FolderNode>,
    pub expansion: ExpansionState,
    pub failures: Vec<FolderFetchFailure>,
}

impl FolderHierarchy {
    /// Fetch every folder, rebuild the forest and carry `expansion` over.
    ///
    /// When `reveal` names a folder, its ancestors are expanded so the
    /// folder is visible.
    pub async fn load<L>(lister: &L, expansion: ExpansionState, reveal: Option<&str>) -> Self
    where
        L: FolderLister + ?Sized,
    {
        let report = fetch_all_folders(lister).await;
        let failures = report.failures.clone();
        Self::from_records(&report.into_records(), expansion, reveal, failures)
    }

    pub fn from_records(
        records: &[FolderRecord],
        mut expansion: ExpansionState,
        reveal: Option<&str>,
        failures: Vec<FolderFetchFailure>,
    ) -> Self {
        let forest = tree::assemble(records);
        expansion.retain_known(&forest);
        if let Some(id) = reveal.filter(|id| !id.is_empty()) {
            expansion.expand_ancestors_of(id, &forest);
        }

        info!(
            "Folder hierarchy ready: {} folders, {} roots",
            tree::node_count(&forest),
            forest.len()
        );

        Self {
            forest,
            expansion,
            failures,
        }
    }

    /// Take the forest and failures of a freshly loaded hierarchy while
    /// keeping this hierarchy's expansion state.
    ///
    /// Toggles made while `fresh` was loading live only in `self`, so the
    /// expansion of `fresh` contributes just the folders its load revealed.
    pub fn install(&mut self, fresh: FolderHierarchy) {
        let FolderHierarchy {
            forest,
            expansion,
            failures,
        } = fresh;

        self.expansion.retain_known(&forest);
        self.expansion.extend(&expansion);
        self.forest = forest;
        self.failures = failures;
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn find(&self, id: &str) -> Option<&FolderNode> {
        tree::find(&self.forest, id)
    }

    pub fn display_name(&self, selected: Option<&str>) -> String {
        tree::display_name(&self.forest, selected)
    }

    pub fn visible_rows(&self) -> Vec<(usize, &FolderNode)> {
        self.expansion.visible_rows(&self.forest)
    }
}
