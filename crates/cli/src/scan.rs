use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

/// Finds Rust sources under the given paths
pub struct SourceScanner {
    roots: Vec<PathBuf>,
}

impl SourceScanner {
    pub fn new(roots: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            roots: roots.into_iter().collect(),
        }
    }

    /// Scan for `.rs` files (.gitignore aware), sorted and deduplicated
    pub fn scan(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();

        for root in &self.roots {
            if root.is_file() {
                files.push(root.clone());
                continue;
            }

            let mut builder = WalkBuilder::new(root);
            builder
                .hidden(true)
                .git_ignore(true)
                .git_global(true)
                .git_exclude(true);
            builder.filter_entry(|entry| !Self::is_build_output(entry.path()));

            for result in builder.build() {
                match result {
                    Ok(entry) => {
                        let Some(file_type) = entry.file_type() else {
                            continue;
                        };
                        if file_type.is_file() && Self::is_rust_source(entry.path()) {
                            files.push(entry.path().to_path_buf());
                        }
                    }
                    Err(e) => log::warn!("Failed to read entry: {e}"),
                }
            }
        }

        files.sort();
        files.dedup();
        log::info!("Found {} Rust source files", files.len());
        files
    }

    fn is_rust_source(path: &Path) -> bool {
        path.extension().and_then(|ext| ext.to_str()) == Some("rs")
    }

    fn is_build_output(path: &Path) -> bool {
        path.file_name().and_then(|name| name.to_str()) == Some("target")
    }
}
