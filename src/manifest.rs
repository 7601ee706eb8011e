use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Build-time known paths that are served cache-first.
#[derive(Debug, Clone, Default)]
pub struct StaticAssetManifest {
    paths: Vec<String>,
    index: HashSet<String>,
}

impl StaticAssetManifest {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut manifest = Self::default();
        for path in paths {
            manifest.push(path.as_ref());
        }
        manifest
    }

    /// Configured paths followed by every file under `static_dir`, in sorted order.
    ///
    /// Symlinks are followed. File names are percent-encoded segment by segment,
    /// so they match the request paths a client sends for them.
    pub async fn load(configured: &[String], static_dir: Option<&Path>) -> io::Result<Self> {
        let mut manifest = Self::new(configured);
        if let Some(dir) = static_dir {
            let root = dir.to_path_buf();
            let files = tokio::task::spawn_blocking(move || walk_files(&root))
                .await
                .map_err(io::Error::other)??;
            for file in files {
                let relative = file.strip_prefix(dir).unwrap_or(&file);
                let path = relative
                    .components()
                    .map(|c| urlencoding::encode(&c.as_os_str().to_string_lossy()).into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                manifest.push(&path);
            }
        }
        Ok(manifest)
    }

    fn push(&mut self, raw: &str) {
        let raw = raw.trim();
        if raw.is_empty() {
            return;
        }
        let path = if raw.starts_with('/') {
            raw.to_string()
        } else {
            format!("/{}", raw)
        };
        if self.index.insert(path.clone()) {
            self.paths.push(path);
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index.contains(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

fn walk_files(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}
