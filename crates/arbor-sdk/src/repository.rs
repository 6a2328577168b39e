use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use arbor_merge::{merge_trees, Resolutions};
use arbor_refs::{branch_ref_name, compare_and_swap_ref, validate_branch_name, BranchInfo};
use arbor_store::{Commit, EntryKind, EntryMode, ObjectStore};
use arbor_tree::{count_leaves, list, remove, resolve, upsert_with_mode, RepoPath, TreeState};
use arbor_types::ObjectId;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::commit::{CommitOptions, FileWrite, MergeResult, RemoveResult, WriteResult};
use crate::config::RepositoryConfig;
use crate::content::{decode, DirEntry, Encoding, FileContent};
use crate::error::{Error, Result};

/// Which branch a read-side operation looks at.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum RefSpec {
    /// The configured default branch.
    #[default]
    Current,
    Branch(String),
}

impl From<&str> for RefSpec {
    fn from(name: &str) -> Self {
        Self::Branch(name.to_string())
    }
}

impl From<String> for RefSpec {
    fn from(name: String) -> Self {
        Self::Branch(name)
    }
}

/// A branch tip as read at the start of an operation.
struct Tip {
    reference: String,
    commit: ObjectId,
}

/// High-level Arbor repository API over a shared object store.
///
/// Cloning is cheap; clones share the store.
#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn ObjectStore>,
    config: RepositoryConfig,
}

impl Repository {
    /// Open a repository over `store` without touching it.
    pub fn open(store: Arc<dyn ObjectStore>, config: RepositoryConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::InvalidInput(e.to_string()))?;
        Ok(Self { store, config })
    }

    /// Open a repository, creating the default branch with an initial commit
    /// on the empty tree if it does not exist yet.
    pub async fn init(store: Arc<dyn ObjectStore>, config: RepositoryConfig) -> Result<Self> {
        let repo = Self::open(store, config)?;
        repo.ensure_default_branch()
            .await
            .map_err(|e| e.during("init"))?;
        Ok(repo)
    }

    async fn ensure_default_branch(&self) -> Result<()> {
        let reference = branch_ref_name(&self.config.default_branch);
        if self.store.read_ref(&reference).await?.is_some() {
            return Ok(());
        }
        let tree = self.store.empty_tree().await?;
        let signature = self.config.signature();
        let commit = self
            .store
            .write_commit(&Commit {
                tree,
                parents: vec![],
                author: signature.clone(),
                committer: signature,
                message: "Initial commit".into(),
            })
            .await?;
        compare_and_swap_ref(self.store.as_ref(), &reference, None, commit).await?;
        info!(
            branch = %self.config.default_branch,
            commit = %commit.short_hex(),
            "repository initialized"
        );
        Ok(())
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    // ---- Content operations ----

    /// Write one file to `branch` and commit.
    pub async fn add_file(
        &self,
        branch: &str,
        path: &str,
        content: impl Into<Vec<u8>>,
        options: CommitOptions,
    ) -> Result<WriteResult> {
        self.write_files(branch, vec![FileWrite::new(path, content)], options)
            .await
            .map_err(|e| e.during("add_file"))
    }

    /// Write several files to `branch` in a single commit.
    pub async fn add_files(
        &self,
        branch: &str,
        files: Vec<FileWrite>,
        options: CommitOptions,
    ) -> Result<WriteResult> {
        self.write_files(branch, files, options)
            .await
            .map_err(|e| e.during("add_files"))
    }

    async fn write_files(
        &self,
        branch: &str,
        files: Vec<FileWrite>,
        options: CommitOptions,
    ) -> Result<WriteResult> {
        if files.is_empty() {
            return Err(Error::InvalidInput("no files to write".into()));
        }
        let mut seen = HashSet::with_capacity(files.len());
        let mut paths = Vec::with_capacity(files.len());
        let mut modes = Vec::with_capacity(files.len());
        let mut contents = Vec::with_capacity(files.len());
        for file in files {
            let path = RepoPath::parse(&file.path)?;
            if !seen.insert(path.clone()) {
                return Err(Error::InvalidInput(format!("duplicate path {path} in batch")));
            }
            paths.push(path);
            modes.push(if file.executable {
                EntryMode::Executable
            } else {
                EntryMode::Regular
            });
            contents.push(file.content);
        }

        let tip = self.branch_tip(branch).await?;
        let mut root = self.root_of(&tip.commit).await?;
        let blobs = self.write_blobs(contents).await?;

        for ((path, blob), mode) in paths.iter().zip(&blobs).zip(modes) {
            let id = upsert_with_mode(self.store.as_ref(), &root, path, *blob, mode).await?;
            root = TreeState::NonEmpty(id);
        }
        let tree = root.commit_tree(self.store.as_ref()).await?;

        let message = options.message_or(|| match paths.as_slice() {
            [single] => format!("Add {single}"),
            many => format!("Add {} files", many.len()),
        });
        let commit = self
            .commit_and_advance(&tip, vec![tip.commit], tree, message, &options)
            .await?;
        info!(branch, commit = %commit.short_hex(), files = blobs.len(), "files written");
        Ok(WriteResult {
            commit,
            tree,
            blobs,
        })
    }

    /// Write blobs in parallel, at most `blob_write_concurrency` at a time.
    /// Ids come back in input order.
    async fn write_blobs(&self, contents: Vec<Vec<u8>>) -> Result<Vec<ObjectId>> {
        let limit = self.config.blob_write_concurrency.max(1);
        let mut ids: Vec<Option<ObjectId>> = vec![None; contents.len()];
        let mut tasks = JoinSet::new();

        for (index, data) in contents.into_iter().enumerate() {
            if tasks.len() >= limit {
                if let Some(joined) = tasks.join_next().await {
                    record_blob(joined, &mut ids)?;
                }
            }
            let store = Arc::clone(&self.store);
            tasks.spawn(async move { (index, store.write_blob(&data).await) });
        }
        while let Some(joined) = tasks.join_next().await {
            record_blob(joined, &mut ids)?;
        }

        debug!(count = ids.len(), "blobs written");
        ids.into_iter()
            .map(|id| id.ok_or_else(|| Error::failed("blob write task vanished")))
            .collect()
    }

    /// Remove a file or a whole directory from `branch` and commit.
    pub async fn remove_path(
        &self,
        branch: &str,
        path: &str,
        options: CommitOptions,
    ) -> Result<RemoveResult> {
        self.remove_all(branch, &[path], options)
            .await
            .map_err(|e| e.during("remove_path"))
    }

    /// Remove several paths from `branch` in a single commit.
    ///
    /// Fails without advancing the branch if any path is missing, including
    /// when an earlier path in the batch already emptied the repository.
    pub async fn remove_paths(
        &self,
        branch: &str,
        paths: &[&str],
        options: CommitOptions,
    ) -> Result<RemoveResult> {
        self.remove_all(branch, paths, options)
            .await
            .map_err(|e| e.during("remove_paths"))
    }

    async fn remove_all(
        &self,
        branch: &str,
        raw_paths: &[&str],
        options: CommitOptions,
    ) -> Result<RemoveResult> {
        if raw_paths.is_empty() {
            return Err(Error::InvalidInput("no paths to remove".into()));
        }
        let paths = raw_paths
            .iter()
            .map(|raw| RepoPath::parse_directory(raw))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let tip = self.branch_tip(branch).await?;
        let mut root = self.root_of(&tip.commit).await?;
        let store = self.store.as_ref();

        let mut removed = 0u64;
        for path in &paths {
            let target = resolve(store, &root, path.segments()).await?;
            removed += match target.kind {
                EntryKind::Blob => 1,
                EntryKind::Tree => count_leaves(store, &TreeState::NonEmpty(target.object_id)).await?,
            };
            root = remove(store, &root, path).await?;
        }
        let tree = root.commit_tree(store).await?;

        let message = options.message_or(|| match paths.as_slice() {
            [single] => format!("Remove {single}"),
            many => format!("Remove {} paths", many.len()),
        });
        let commit = self
            .commit_and_advance(&tip, vec![tip.commit], tree, message, &options)
            .await?;
        info!(branch, commit = %commit.short_hex(), removed, "paths removed");
        Ok(RemoveResult {
            commit,
            tree: root.id(),
            removed,
        })
    }

    /// Read the file at `path` on `reference`.
    pub async fn read_file(
        &self,
        reference: impl Into<RefSpec>,
        path: &str,
        encoding: Encoding,
    ) -> Result<FileContent> {
        self.read_blob_at(&reference.into(), path, encoding)
            .await
            .map_err(|e| e.during("read_file"))
    }

    async fn read_blob_at(
        &self,
        reference: &RefSpec,
        raw_path: &str,
        encoding: Encoding,
    ) -> Result<FileContent> {
        let path = RepoPath::parse(raw_path)?;
        let commit = self.resolve_spec(reference).await?;
        let root = self.root_of(&commit).await?;
        let entry = resolve(self.store.as_ref(), &root, path.segments()).await?;
        if entry.kind == EntryKind::Tree {
            return Err(Error::InvalidInput(format!("{path} is a directory")));
        }
        let data = self.store.read_blob(&entry.object_id).await?;
        let content = decode(
            &path.to_string(),
            data,
            encoding,
            self.config.binary_detection_limit,
        )?;
        Ok(FileContent {
            content,
            mode: entry.mode,
            object_id: entry.object_id,
        })
    }

    /// List `folder` (the root when `None`) on `reference`, directories
    /// first, then by name.
    pub async fn list_directory(
        &self,
        reference: impl Into<RefSpec>,
        folder: Option<&str>,
    ) -> Result<Vec<DirEntry>> {
        self.list_at(&reference.into(), folder)
            .await
            .map_err(|e| e.during("list_directory"))
    }

    async fn list_at(&self, reference: &RefSpec, folder: Option<&str>) -> Result<Vec<DirEntry>> {
        let prefix = match folder {
            Some(raw) if !raw.trim_matches('/').is_empty() => Some(RepoPath::parse(raw)?),
            _ => None,
        };
        let segments = prefix.as_ref().map(RepoPath::segments).unwrap_or_default();

        let commit = self.resolve_spec(reference).await?;
        let root = self.root_of(&commit).await?;
        let entries = list(self.store.as_ref(), &root, segments).await?;

        let mut listing = entries
            .into_iter()
            .map(|entry| -> Result<DirEntry> {
                let path = match &prefix {
                    Some(prefix) => prefix.join(&entry.name)?.to_string(),
                    None => entry.name.clone(),
                };
                Ok(DirEntry {
                    path,
                    kind: entry.kind(),
                    mode: entry.mode,
                    object_id: entry.object_id,
                    name: entry.name,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        listing.sort_by(|a, b| {
            (a.kind != EntryKind::Tree, &a.name).cmp(&(b.kind != EntryKind::Tree, &b.name))
        });
        Ok(listing)
    }

    // ---- Branch operations ----

    /// Create branch `name` at the tip of `source` (the default branch when
    /// `None`).
    pub async fn create_branch(
        &self,
        name: &str,
        source: Option<RefSpec>,
        force: bool,
    ) -> Result<BranchInfo> {
        self.branch_from(name, &source.unwrap_or_default(), force)
            .await
            .map_err(|e| e.during("create_branch"))
    }

    async fn branch_from(&self, name: &str, source: &RefSpec, force: bool) -> Result<BranchInfo> {
        let target = self.resolve_spec(source).await?;
        Ok(arbor_refs::create_branch(self.store.as_ref(), name, target, force).await?)
    }

    /// Delete branch `name`. The default branch cannot be removed.
    pub async fn remove_branch(&self, name: &str) -> Result<()> {
        if name == self.config.default_branch {
            return Err(Error::InvalidReference {
                name: name.to_string(),
                reason: "the default branch cannot be removed".into(),
            });
        }
        arbor_refs::delete_branch(self.store.as_ref(), name)
            .await
            .map_err(|e| Error::from(e).during("remove_branch"))
    }

    pub async fn list_branches(&self) -> Result<Vec<BranchInfo>> {
        arbor_refs::list_branches(self.store.as_ref())
            .await
            .map_err(|e| Error::from(e).during("list_branches"))
    }

    /// Current tip of `reference`.
    pub async fn head(&self, reference: impl Into<RefSpec>) -> Result<ObjectId> {
        let reference = reference.into();
        self.resolve_spec(&reference)
            .await
            .map_err(|e| e.during("head"))
    }

    pub async fn read_commit(&self, id: &ObjectId) -> Result<Commit> {
        self.store
            .read_commit(id)
            .await
            .map_err(|e| Error::from(e).during("read_commit"))
    }

    // ---- Merge ----

    /// Merge `source` into `destination`.
    ///
    /// Without `resolutions`, any conflict fails with
    /// [`Error::MergeConflict`] and nothing is committed. With a map, paths
    /// it covers take the supplied content; conflicts it misses are returned
    /// in [`MergeResult::conflicts`] and left out of the committed tree.
    pub async fn merge(
        &self,
        source: &str,
        destination: &str,
        resolutions: Option<BTreeMap<String, Vec<u8>>>,
        options: CommitOptions,
    ) -> Result<MergeResult> {
        self.merge_branches(source, destination, resolutions, options)
            .await
            .map_err(|e| e.during("merge"))
    }

    async fn merge_branches(
        &self,
        source: &str,
        destination: &str,
        resolutions: Option<BTreeMap<String, Vec<u8>>>,
        options: CommitOptions,
    ) -> Result<MergeResult> {
        let resolutions = resolutions.map(normalize_resolutions).transpose()?;
        let ours = self.branch_tip(destination).await?;
        let theirs = self.branch_tip(source).await?;
        let store = self.store.as_ref();

        let base = store
            .find_merge_base(&ours.commit, &theirs.commit)
            .await?
            .ok_or_else(|| {
                Error::failed(format!("{source} and {destination} share no history"))
            })?;

        let ours_tree = store.read_commit(&ours.commit).await?.tree;
        if base == theirs.commit {
            debug!(source, destination, "already up to date");
            return Ok(MergeResult {
                commit: ours.commit,
                tree: ours_tree,
                conflicts: None,
                up_to_date: true,
            });
        }
        let base_tree = store.read_commit(&base).await?.tree;
        let theirs_tree = store.read_commit(&theirs.commit).await?.tree;

        let outcome = merge_trees(
            store,
            Some(base_tree),
            Some(ours_tree),
            Some(theirs_tree),
            resolutions.as_ref(),
        )
        .await?;
        let tree = outcome.tree.commit_tree(store).await?;

        let message = options.message_or(|| format!("Merge {source} into {destination}"));
        let commit = self
            .commit_and_advance(&ours, vec![ours.commit, theirs.commit], tree, message, &options)
            .await?;
        info!(
            source,
            destination,
            commit = %commit.short_hex(),
            conflicts = outcome.conflicts.len(),
            "branches merged"
        );
        Ok(MergeResult {
            commit,
            tree,
            conflicts: (!outcome.conflicts.is_empty()).then_some(outcome.conflicts),
            up_to_date: false,
        })
    }

    // ---- Helpers ----

    async fn branch_tip(&self, branch: &str) -> Result<Tip> {
        validate_branch_name(branch)?;
        let reference = branch_ref_name(branch);
        let commit = self
            .store
            .read_ref(&reference)
            .await?
            .ok_or_else(|| Error::NotFound {
                what: format!("branch {branch}"),
            })?;
        Ok(Tip { reference, commit })
    }

    async fn resolve_spec(&self, spec: &RefSpec) -> Result<ObjectId> {
        let branch = match spec {
            RefSpec::Current => self.config.default_branch.as_str(),
            RefSpec::Branch(name) => name.as_str(),
        };
        Ok(self.branch_tip(branch).await?.commit)
    }

    async fn root_of(&self, commit: &ObjectId) -> Result<TreeState> {
        let tree = self.store.read_commit(commit).await?.tree;
        Ok(TreeState::load(self.store.as_ref(), tree).await?)
    }

    /// Write a commit and move the tip's reference to it, failing if the
    /// reference no longer points at `tip.commit`.
    async fn commit_and_advance(
        &self,
        tip: &Tip,
        parents: Vec<ObjectId>,
        tree: ObjectId,
        message: String,
        options: &CommitOptions,
    ) -> Result<ObjectId> {
        let committer = self.config.signature();
        let author = options.author.clone().unwrap_or_else(|| committer.clone());
        let commit = self
            .store
            .write_commit(&Commit {
                tree,
                parents,
                author,
                committer,
                message,
            })
            .await?;
        compare_and_swap_ref(self.store.as_ref(), &tip.reference, Some(tip.commit), commit).await?;
        Ok(commit)
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("default_branch", &self.config.default_branch)
            .finish_non_exhaustive()
    }
}

fn record_blob(
    joined: std::result::Result<(usize, arbor_store::StoreResult<ObjectId>), tokio::task::JoinError>,
    ids: &mut [Option<ObjectId>],
) -> Result<()> {
    let (index, written) = joined.map_err(|e| Error::failed(format!("blob write task: {e}")))?;
    ids[index] = Some(written?);
    Ok(())
}

fn normalize_resolutions(raw: BTreeMap<String, Vec<u8>>) -> Result<Resolutions> {
    raw.into_iter()
        .map(|(path, content)| Ok((RepoPath::parse(&path)?.to_string(), content)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_store::{
        GcOptions, GcReport, InMemoryObjectStore, Maintenance, Signature, StoreError, StoreResult,
        Tree,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use crate::content::Content;

    async fn repo() -> (Arc<InMemoryObjectStore>, Repository) {
        let store = Arc::new(InMemoryObjectStore::new());
        let repo = Repository::init(store.clone(), RepositoryConfig::default())
            .await
            .unwrap();
        (store, repo)
    }

    fn opts() -> CommitOptions {
        CommitOptions::default()
    }

    async fn text(repo: &Repository, reference: &str, path: &str) -> String {
        let file = repo.read_file(reference, path, Encoding::Text).await.unwrap();
        match file.content {
            Content::Text(s) => s,
            Content::Raw(_) => panic!("expected text"),
        }
    }

    async fn names(repo: &Repository, reference: &str, folder: Option<&str>) -> Vec<String> {
        repo.list_directory(reference, folder)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect()
    }

    #[tokio::test]
    async fn init_creates_default_branch_once() {
        let (store, repo) = repo().await;
        let first = repo.head(RefSpec::Current).await.unwrap();
        let commit = repo.read_commit(&first).await.unwrap();
        assert!(commit.parents.is_empty());
        assert_eq!(commit.tree, store.empty_tree().await.unwrap());

        let again = Repository::init(store.clone(), RepositoryConfig::default())
            .await
            .unwrap();
        assert_eq!(again.head(RefSpec::Current).await.unwrap(), first);
        assert!(repo.list_directory(RefSpec::Current, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn open_rejects_invalid_config() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
        let config = RepositoryConfig {
            blob_write_concurrency: 0,
            ..Default::default()
        };
        assert!(matches!(
            Repository::open(store, config).unwrap_err(),
            Error::InvalidInput(_)
        ));
    }

    #[tokio::test]
    async fn add_and_read_file() {
        let (_, repo) = repo().await;
        let before = repo.head("main").await.unwrap();
        let result = repo
            .add_file("main", "docs/guide.md", "# Guide", opts())
            .await
            .unwrap();

        assert_eq!(repo.head("main").await.unwrap(), result.commit);
        let commit = repo.read_commit(&result.commit).await.unwrap();
        assert_eq!(commit.parents, vec![before]);
        assert_eq!(commit.tree, result.tree);
        assert_eq!(commit.message, "Add docs/guide.md");

        let file = repo.read_file("main", "/docs//guide.md", Encoding::Auto).await.unwrap();
        assert_eq!(file.content, Content::Text("# Guide".into()));
        assert_eq!(file.mode, EntryMode::Regular);
        assert_eq!(file.object_id, result.blobs[0]);
    }

    #[tokio::test]
    async fn add_files_batch_keeps_blob_order() {
        let store = Arc::new(InMemoryObjectStore::new());
        let config = RepositoryConfig {
            blob_write_concurrency: 2,
            ..Default::default()
        };
        let repo = Repository::init(store.clone(), config).await.unwrap();

        let files: Vec<FileWrite> = (0..7)
            .map(|i| FileWrite::new(format!("batch/f{i}.txt"), format!("content {i}")))
            .collect();
        let result = repo.add_files("main", files, opts()).await.unwrap();
        assert_eq!(result.blobs.len(), 7);
        for (i, blob) in result.blobs.iter().enumerate() {
            assert_eq!(store.read_blob(blob).await.unwrap(), format!("content {i}").into_bytes());
        }
        assert_eq!(names(&repo, "main", Some("batch")).await.len(), 7);
        let commit = repo.read_commit(&result.commit).await.unwrap();
        assert_eq!(commit.message, "Add 7 files");
    }

    #[tokio::test]
    async fn add_files_rejects_duplicates_and_bad_paths() {
        let (_, repo) = repo().await;
        let tip = repo.head("main").await.unwrap();

        let dupes = vec![FileWrite::new("a/b.txt", "1"), FileWrite::new("/a//b.txt", "2")];
        assert!(matches!(
            repo.add_files("main", dupes, opts()).await.unwrap_err(),
            Error::InvalidInput(_)
        ));
        assert!(matches!(
            repo.add_file("main", "a/../b", "x", opts()).await.unwrap_err(),
            Error::InvalidPath { .. }
        ));
        assert!(matches!(
            repo.add_files("main", vec![], opts()).await.unwrap_err(),
            Error::InvalidInput(_)
        ));
        assert_eq!(repo.head("main").await.unwrap(), tip);
    }

    #[tokio::test]
    async fn add_to_missing_branch_is_not_found() {
        let (_, repo) = repo().await;
        assert!(matches!(
            repo.add_file("nope", "a.txt", "x", opts()).await.unwrap_err(),
            Error::NotFound { .. }
        ));
        assert!(matches!(
            repo.add_file("bad..name", "a.txt", "x", opts()).await.unwrap_err(),
            Error::InvalidReference { .. }
        ));
    }

    #[tokio::test]
    async fn executable_files_and_custom_options() {
        let (_, repo) = repo().await;
        let author = Signature::now("Ada", "ada@example.com");
        let options = CommitOptions::new()
            .with_message("add tooling")
            .with_author(author.clone());
        let result = repo
            .add_files("main", vec![FileWrite::new("bin/run", "#!/bin/sh").executable()], options)
            .await
            .unwrap();

        let commit = repo.read_commit(&result.commit).await.unwrap();
        assert_eq!(commit.message, "add tooling");
        assert_eq!(commit.author, author);
        assert_eq!(commit.committer.name, "Arbor");

        let file = repo.read_file("main", "bin/run", Encoding::Raw).await.unwrap();
        assert_eq!(file.mode, EntryMode::Executable);
    }

    #[tokio::test]
    async fn scenario_nested_add_list_and_remove() {
        let (_, repo) = repo().await;
        repo.add_file("main", "README.md", "readme", opts()).await.unwrap();
        let readme_only = repo.read_commit(&repo.head("main").await.unwrap()).await.unwrap().tree;

        repo.add_file("main", "src/a.txt", "x", opts()).await.unwrap();
        repo.add_file("main", "src/b.txt", "y", opts()).await.unwrap();

        let root = repo.list_directory("main", None).await.unwrap();
        assert_eq!(root[0].name, "src");
        assert_eq!(root[0].kind, EntryKind::Tree);
        assert_eq!(root[1].name, "README.md");
        assert_eq!(names(&repo, "main", Some("src")).await, vec!["a.txt", "b.txt"]);
        let src = repo.list_directory("main", Some("src")).await.unwrap();
        assert_eq!(src[1].path, "src/b.txt");

        repo.remove_path("main", "src/a.txt", opts()).await.unwrap();
        let result = repo.remove_path("main", "src/b.txt", opts()).await.unwrap();
        assert_eq!(result.removed, 1);
        assert_eq!(result.tree, Some(readme_only));
        assert_eq!(names(&repo, "main", None).await, vec!["README.md"]);
    }

    #[tokio::test]
    async fn remove_directory_counts_files() {
        let (_, repo) = repo().await;
        let files = vec![
            FileWrite::new("keep.txt", "k"),
            FileWrite::new("lib/a.rs", "a"),
            FileWrite::new("lib/inner/b.rs", "b"),
            FileWrite::new("lib/inner/c.rs", "c"),
        ];
        repo.add_files("main", files, opts()).await.unwrap();

        let result = repo.remove_path("main", "lib", opts()).await.unwrap();
        assert_eq!(result.removed, 3);
        assert_eq!(names(&repo, "main", None).await, vec!["keep.txt"]);
        let commit = repo.read_commit(&result.commit).await.unwrap();
        assert_eq!(commit.message, "Remove lib");
    }

    #[tokio::test]
    async fn removing_last_file_commits_empty_tree() {
        let (store, repo) = repo().await;
        repo.add_file("main", "only/file.txt", "x", opts()).await.unwrap();

        let result = repo.remove_path("main", "only/file.txt", opts()).await.unwrap();
        assert_eq!(result.tree, None);
        let commit = repo.read_commit(&result.commit).await.unwrap();
        assert_eq!(commit.tree, store.empty_tree().await.unwrap());
        assert!(repo.list_directory("main", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_batch_fails_fast_once_empty() {
        let (_, repo) = repo().await;
        repo.add_file("main", "a.txt", "a", opts()).await.unwrap();
        let tip = repo.head("main").await.unwrap();

        let err = repo
            .remove_paths("main", &["a.txt", "b.txt"], opts())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        assert_eq!(repo.head("main").await.unwrap(), tip);
    }

    #[tokio::test]
    async fn remove_rejects_root_and_missing_paths() {
        let (_, repo) = repo().await;
        repo.add_file("main", "a.txt", "a", opts()).await.unwrap();
        assert!(matches!(
            repo.remove_path("main", "/", opts()).await.unwrap_err(),
            Error::InvalidPath { .. }
        ));
        assert!(matches!(
            repo.remove_path("main", "a.txt/x", opts()).await.unwrap_err(),
            Error::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn read_file_encodings() {
        let (_, repo) = repo().await;
        repo.add_file("main", "img.bin", vec![0x89, b'P', 0, 1], opts())
            .await
            .unwrap();

        let auto = repo.read_file(RefSpec::Current, "img.bin", Encoding::Auto).await.unwrap();
        assert_eq!(auto.content, Content::Raw(vec![0x89, b'P', 0, 1]));
        assert!(matches!(
            repo.read_file("main", "img.bin", Encoding::Text).await.unwrap_err(),
            Error::BinaryFile { .. }
        ));
        assert!(matches!(
            repo.read_file("main", "missing.txt", Encoding::Auto).await.unwrap_err(),
            Error::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn read_and_list_reject_wrong_kinds() {
        let (_, repo) = repo().await;
        repo.add_file("main", "dir/file.txt", "x", opts()).await.unwrap();
        assert!(matches!(
            repo.read_file("main", "dir", Encoding::Auto).await.unwrap_err(),
            Error::InvalidInput(_)
        ));
        assert!(matches!(
            repo.list_directory("main", Some("dir/file.txt")).await.unwrap_err(),
            Error::InvalidInput(_)
        ));
        assert_eq!(names(&repo, "main", Some("/")).await, vec!["dir"]);
    }

    #[tokio::test]
    async fn branch_lifecycle() {
        let (_, repo) = repo().await;
        repo.add_file("main", "a.txt", "a", opts()).await.unwrap();
        let main_tip = repo.head("main").await.unwrap();

        let info = repo.create_branch("feature", None, false).await.unwrap();
        assert_eq!(info.commit, main_tip);
        assert!(matches!(
            repo.create_branch("feature", None, false).await.unwrap_err(),
            Error::AlreadyExists { .. }
        ));

        repo.add_file("feature", "b.txt", "b", opts()).await.unwrap();
        let from_feature = repo
            .create_branch("topic", Some("feature".into()), false)
            .await
            .unwrap();
        assert_eq!(from_feature.commit, repo.head("feature").await.unwrap());
        // Forcing moves the branch back to main.
        let moved = repo
            .create_branch("topic", Some(RefSpec::Current), true)
            .await
            .unwrap();
        assert_eq!(moved.commit, main_tip);

        let listed: Vec<String> = repo
            .list_branches()
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(listed, vec!["feature", "main", "topic"]);

        repo.remove_branch("topic").await.unwrap();
        assert!(matches!(
            repo.remove_branch("topic").await.unwrap_err(),
            Error::NotFound { .. }
        ));
        assert!(matches!(
            repo.remove_branch("main").await.unwrap_err(),
            Error::InvalidReference { .. }
        ));
    }

    #[tokio::test]
    async fn merge_clean_creates_two_parent_commit() {
        let (_, repo) = repo().await;
        repo.add_file("main", "shared.txt", "base", opts()).await.unwrap();
        repo.create_branch("feature", None, false).await.unwrap();
        repo.add_file("feature", "feature.txt", "f", opts()).await.unwrap();
        repo.add_file("main", "main.txt", "m", opts()).await.unwrap();
        let ours = repo.head("main").await.unwrap();
        let theirs = repo.head("feature").await.unwrap();

        let result = repo.merge("feature", "main", None, opts()).await.unwrap();
        assert!(!result.up_to_date);
        assert!(result.conflicts.is_none());
        let commit = repo.read_commit(&result.commit).await.unwrap();
        assert_eq!(commit.parents, vec![ours, theirs]);
        assert_eq!(commit.message, "Merge feature into main");
        assert_eq!(
            names(&repo, "main", None).await,
            vec!["feature.txt", "main.txt", "shared.txt"]
        );
    }

    #[tokio::test]
    async fn merge_from_ancestor_is_up_to_date() {
        let (_, repo) = repo().await;
        repo.create_branch("old", None, false).await.unwrap();
        repo.add_file("main", "new.txt", "n", opts()).await.unwrap();
        let tip = repo.head("main").await.unwrap();

        let result = repo.merge("old", "main", None, opts()).await.unwrap();
        assert!(result.up_to_date);
        assert_eq!(result.commit, tip);
        assert_eq!(repo.head("main").await.unwrap(), tip);
    }

    async fn diverge(repo: &Repository) {
        repo.add_file("main", "conf.txt", "base", opts()).await.unwrap();
        repo.create_branch("feature", None, false).await.unwrap();
        repo.add_file("feature", "conf.txt", "theirs", opts()).await.unwrap();
        repo.add_file("main", "conf.txt", "ours", opts()).await.unwrap();
    }

    #[tokio::test]
    async fn merge_conflict_without_resolutions_advances_nothing() {
        let (_, repo) = repo().await;
        diverge(&repo).await;
        let tip = repo.head("main").await.unwrap();

        match repo.merge("feature", "main", None, opts()).await.unwrap_err() {
            Error::MergeConflict { paths } => assert_eq!(paths, vec!["conf.txt"]),
            other => panic!("expected MergeConflict, got {other:?}"),
        }
        assert_eq!(repo.head("main").await.unwrap(), tip);
    }

    #[tokio::test]
    async fn merge_with_resolution_uses_supplied_bytes() {
        let (_, repo) = repo().await;
        diverge(&repo).await;

        let mut resolutions = BTreeMap::new();
        resolutions.insert("/conf.txt".to_string(), b"resolved".to_vec());
        let result = repo
            .merge("feature", "main", Some(resolutions), opts())
            .await
            .unwrap();
        assert!(result.conflicts.is_none());
        assert_eq!(text(&repo, "main", "conf.txt").await, "resolved");
    }

    #[tokio::test]
    async fn merge_with_partial_resolutions_reports_leftovers() {
        let (_, repo) = repo().await;
        diverge(&repo).await;
        repo.add_file("main", "other.txt", "o1", opts()).await.unwrap();
        repo.add_file("feature", "other.txt", "o2", opts()).await.unwrap();

        let mut resolutions = BTreeMap::new();
        resolutions.insert("conf.txt".to_string(), b"merged".to_vec());
        let result = repo
            .merge("feature", "main", Some(resolutions), opts())
            .await
            .unwrap();
        assert_eq!(result.conflicts, Some(vec!["other.txt".to_string()]));
        assert_eq!(text(&repo, "main", "conf.txt").await, "merged");
    }

    #[tokio::test]
    async fn merge_rejects_bad_resolution_paths() {
        let (_, repo) = repo().await;
        diverge(&repo).await;
        let mut resolutions = BTreeMap::new();
        resolutions.insert("../conf.txt".to_string(), b"x".to_vec());
        assert!(matches!(
            repo.merge("feature", "main", Some(resolutions), opts()).await.unwrap_err(),
            Error::InvalidPath { .. }
        ));
    }

    #[tokio::test]
    async fn merge_disjoint_histories_fails() {
        let (store, repo) = repo().await;
        let tree = store.empty_tree().await.unwrap();
        let sig = Signature::now("Other", "other@example.com");
        let orphan = store
            .write_commit(&Commit {
                tree,
                parents: vec![],
                author: sig.clone(),
                committer: sig,
                message: "unrelated root".into(),
            })
            .await
            .unwrap();
        store.write_ref("refs/heads/orphan", orphan, false).await.unwrap();

        match repo.merge("orphan", "main", None, opts()).await.unwrap_err() {
            Error::OperationFailed { operation, .. } => assert_eq!(operation, "merge"),
            other => panic!("expected OperationFailed, got {other:?}"),
        }
    }

    /// Advances `refs/heads/main` behind the caller's back the first time a
    /// commit is written, as a concurrent writer would.
    struct RacingStore {
        inner: InMemoryObjectStore,
        raced: AtomicBool,
    }

    #[async_trait]
    impl ObjectStore for RacingStore {
        async fn read_blob(&self, id: &ObjectId) -> StoreResult<Vec<u8>> {
            self.inner.read_blob(id).await
        }
        async fn write_blob(&self, data: &[u8]) -> StoreResult<ObjectId> {
            self.inner.write_blob(data).await
        }
        async fn read_tree(&self, id: &ObjectId) -> StoreResult<Tree> {
            self.inner.read_tree(id).await
        }
        async fn write_tree(&self, tree: &Tree) -> StoreResult<ObjectId> {
            self.inner.write_tree(tree).await
        }
        async fn empty_tree(&self) -> StoreResult<ObjectId> {
            self.inner.empty_tree().await
        }
        async fn read_commit(&self, id: &ObjectId) -> StoreResult<Commit> {
            self.inner.read_commit(id).await
        }
        async fn write_commit(&self, commit: &Commit) -> StoreResult<ObjectId> {
            let id = self.inner.write_commit(commit).await?;
            if !commit.parents.is_empty() && !self.raced.swap(true, Ordering::SeqCst) {
                let mut rival = commit.clone();
                rival.message = "rival".into();
                let rival = self.inner.write_commit(&rival).await?;
                self.inner.write_ref("refs/heads/main", rival, true).await?;
            }
            Ok(id)
        }
        async fn resolve_ref(&self, name: &str) -> StoreResult<ObjectId> {
            self.inner.resolve_ref(name).await
        }
        async fn write_ref(&self, name: &str, id: ObjectId, force: bool) -> StoreResult<()> {
            self.inner.write_ref(name, id, force).await
        }
        async fn update_ref(
            &self,
            name: &str,
            expected: Option<ObjectId>,
            new: ObjectId,
        ) -> StoreResult<()> {
            self.inner.update_ref(name, expected, new).await
        }
        async fn delete_ref(&self, name: &str) -> StoreResult<()> {
            self.inner.delete_ref(name).await
        }
        async fn list_refs(&self, prefix: &str) -> StoreResult<Vec<(String, ObjectId)>> {
            self.inner.list_refs(prefix).await
        }
        async fn find_merge_base(
            &self,
            a: &ObjectId,
            b: &ObjectId,
        ) -> StoreResult<Option<ObjectId>> {
            self.inner.find_merge_base(a, b).await
        }
    }

    #[tokio::test]
    async fn concurrent_writer_wins_and_loser_fails() {
        let store = Arc::new(RacingStore {
            inner: InMemoryObjectStore::new(),
            raced: AtomicBool::new(false),
        });
        let repo = Repository::init(store.clone(), RepositoryConfig::default())
            .await
            .unwrap();
        let started = repo.head("main").await.unwrap();

        let err = repo.add_file("main", "a.txt", "mine", opts()).await.unwrap_err();
        match err {
            Error::ConcurrencyConflict {
                reference,
                expected,
                actual,
            } => {
                assert_eq!(reference, "refs/heads/main");
                assert_eq!(expected, Some(started));
                assert_ne!(actual, Some(started));
                let rival = repo.head("main").await.unwrap();
                assert_eq!(actual, Some(rival));
                assert_eq!(repo.read_commit(&rival).await.unwrap().message, "rival");
            }
            other => panic!("expected ConcurrencyConflict, got {other:?}"),
        }

        // A retry against the new tip succeeds.
        repo.add_file("main", "a.txt", "mine", opts()).await.unwrap();
        assert_eq!(text(&repo, "main", "a.txt").await, "mine");
    }

    /// Fails every blob write.
    struct BrokenBlobs(InMemoryObjectStore);

    #[async_trait]
    impl ObjectStore for BrokenBlobs {
        async fn read_blob(&self, id: &ObjectId) -> StoreResult<Vec<u8>> {
            self.0.read_blob(id).await
        }
        async fn write_blob(&self, _data: &[u8]) -> StoreResult<ObjectId> {
            Err(StoreError::Backend("disk full".into()))
        }
        async fn read_tree(&self, id: &ObjectId) -> StoreResult<Tree> {
            self.0.read_tree(id).await
        }
        async fn write_tree(&self, tree: &Tree) -> StoreResult<ObjectId> {
            self.0.write_tree(tree).await
        }
        async fn empty_tree(&self) -> StoreResult<ObjectId> {
            self.0.empty_tree().await
        }
        async fn read_commit(&self, id: &ObjectId) -> StoreResult<Commit> {
            self.0.read_commit(id).await
        }
        async fn write_commit(&self, commit: &Commit) -> StoreResult<ObjectId> {
            self.0.write_commit(commit).await
        }
        async fn resolve_ref(&self, name: &str) -> StoreResult<ObjectId> {
            self.0.resolve_ref(name).await
        }
        async fn write_ref(&self, name: &str, id: ObjectId, force: bool) -> StoreResult<()> {
            self.0.write_ref(name, id, force).await
        }
        async fn update_ref(
            &self,
            name: &str,
            expected: Option<ObjectId>,
            new: ObjectId,
        ) -> StoreResult<()> {
            self.0.update_ref(name, expected, new).await
        }
        async fn delete_ref(&self, name: &str) -> StoreResult<()> {
            self.0.delete_ref(name).await
        }
        async fn list_refs(&self, prefix: &str) -> StoreResult<Vec<(String, ObjectId)>> {
            self.0.list_refs(prefix).await
        }
        async fn find_merge_base(
            &self,
            a: &ObjectId,
            b: &ObjectId,
        ) -> StoreResult<Option<ObjectId>> {
            self.0.find_merge_base(a, b).await
        }
    }

    #[tokio::test]
    async fn store_failures_are_tagged_with_the_operation() {
        let store = Arc::new(BrokenBlobs(InMemoryObjectStore::new()));
        let repo = Repository::init(store, RepositoryConfig::default())
            .await
            .unwrap();
        let tip = repo.head("main").await.unwrap();

        match repo.add_file("main", "a.txt", "x", opts()).await.unwrap_err() {
            Error::OperationFailed { operation, message } => {
                assert_eq!(operation, "add_file");
                assert!(message.contains("disk full"));
            }
            other => panic!("expected OperationFailed, got {other:?}"),
        }
        assert_eq!(repo.head("main").await.unwrap(), tip);
    }

    /// Runs a default garbage collection right before every commit write,
    /// after the operation's blobs and trees are already stored.
    struct CollectsBeforeCommit(InMemoryObjectStore);

    #[async_trait]
    impl ObjectStore for CollectsBeforeCommit {
        async fn read_blob(&self, id: &ObjectId) -> StoreResult<Vec<u8>> {
            self.0.read_blob(id).await
        }
        async fn write_blob(&self, data: &[u8]) -> StoreResult<ObjectId> {
            self.0.write_blob(data).await
        }
        async fn read_tree(&self, id: &ObjectId) -> StoreResult<Tree> {
            self.0.read_tree(id).await
        }
        async fn write_tree(&self, tree: &Tree) -> StoreResult<ObjectId> {
            self.0.write_tree(tree).await
        }
        async fn empty_tree(&self) -> StoreResult<ObjectId> {
            self.0.empty_tree().await
        }
        async fn read_commit(&self, id: &ObjectId) -> StoreResult<Commit> {
            self.0.read_commit(id).await
        }
        async fn write_commit(&self, commit: &Commit) -> StoreResult<ObjectId> {
            self.0.collect_garbage().await?;
            self.0.write_commit(commit).await
        }
        async fn resolve_ref(&self, name: &str) -> StoreResult<ObjectId> {
            self.0.resolve_ref(name).await
        }
        async fn write_ref(&self, name: &str, id: ObjectId, force: bool) -> StoreResult<()> {
            self.0.write_ref(name, id, force).await
        }
        async fn update_ref(
            &self,
            name: &str,
            expected: Option<ObjectId>,
            new: ObjectId,
        ) -> StoreResult<()> {
            self.0.update_ref(name, expected, new).await
        }
        async fn delete_ref(&self, name: &str) -> StoreResult<()> {
            self.0.delete_ref(name).await
        }
        async fn list_refs(&self, prefix: &str) -> StoreResult<Vec<(String, ObjectId)>> {
            self.0.list_refs(prefix).await
        }
        async fn find_merge_base(
            &self,
            a: &ObjectId,
            b: &ObjectId,
        ) -> StoreResult<Option<ObjectId>> {
            self.0.find_merge_base(a, b).await
        }
    }

    #[tokio::test]
    async fn collection_during_a_write_keeps_the_new_snapshot() {
        let store = Arc::new(CollectsBeforeCommit(InMemoryObjectStore::new()));
        let repo = Repository::init(store, RepositoryConfig::default())
            .await
            .unwrap();

        repo.add_files(
            "main",
            vec![
                FileWrite::new("src/lib.rs", "pub fn lib() {}"),
                FileWrite::new("README.md", "# arbor"),
            ],
            opts(),
        )
        .await
        .unwrap();

        assert_eq!(text(&repo, "main", "src/lib.rs").await, "pub fn lib() {}");
        assert_eq!(text(&repo, "main", "README.md").await, "# arbor");
        let listing = repo.list_directory("main", Some("src")).await.unwrap();
        assert_eq!(listing[0].path, "src/lib.rs");
    }

    #[tokio::test]
    async fn abandoned_commits_are_collectable() {
        let (store, repo) = repo().await;
        repo.add_file("main", "a.txt", "a", opts()).await.unwrap();
        repo.create_branch("scratch", None, false).await.unwrap();
        repo.add_file("scratch", "tmp.txt", "scratch data", opts()).await.unwrap();
        repo.remove_branch("scratch").await.unwrap();

        let report: GcReport = store
            .collect_garbage_with(GcOptions {
                grace: Duration::ZERO,
            })
            .await
            .unwrap();
        assert!(report.did_collect());
        assert_eq!(text(&repo, "main", "a.txt").await, "a");
        assert!(matches!(
            repo.read_file("scratch", "tmp.txt", Encoding::Auto).await.unwrap_err(),
            Error::NotFound { .. }
        ));
    }
}
