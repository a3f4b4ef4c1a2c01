use std::path::{Path, PathBuf};

/// Resolves paths written in an assignment file against that file's directory.
#[derive(Clone)]
pub struct PathResolver {
    base_dir: PathBuf,
}

impl PathResolver {
    pub fn new(config_path: &Path) -> Self {
        let base_dir = config_path
            .parent()
            .unwrap_or(Path::new("."))
            .to_path_buf();
        Self { base_dir }
    }

    pub fn resolve_opt(&self, p: &mut Option<PathBuf>) {
        let Some(path) = p.as_mut() else { return };
        if path.as_os_str().is_empty() || path.is_absolute() {
            return;
        }
        *path = self.join_clean(path);
    }

    /// Inverse of [`PathResolver::resolve_opt`] for paths under the base
    /// directory, so a saved assignment stays relocatable.
    pub fn relativize_opt(&self, p: &mut Option<PathBuf>) {
        let Some(path) = p.as_mut() else { return };
        if self.base_dir.as_os_str().is_empty() {
            return;
        }
        if let Ok(rel) = path.strip_prefix(&self.base_dir) {
            *path = rel.to_path_buf();
        }
    }

    fn join_clean(&self, rel: &Path) -> PathBuf {
        let joined = self.base_dir.join(rel);

        let mut out = PathBuf::new();
        for c in joined.components() {
            use std::path::Component::*;
            match c {
                CurDir => {}
                ParentDir => {
                    out.pop();
                }
                RootDir | Prefix(_) | Normal(_) => out.push(c.as_os_str()),
            }
        }
        out
    }
}
