/// Host/container path translation
///
/// Folder paths are stored as the agent sees them (host form). When the server runs in a
/// container with the tree bind-mounted elsewhere, every file read goes through
/// [`PathMapper::to_container_path`] and every watcher event goes back through
/// [`PathMapper::to_host_path`].
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct PathMapper {
    /// (host prefix, container prefix), longest host prefix first
    mappings: Vec<(PathBuf, PathBuf)>,
}

impl PathMapper {
    /// Parse `host:container` pairs. Malformed entries are logged and skipped.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut mappings = Vec::new();

        for pair in pairs {
            let pair = pair.as_ref();
            let parts: Vec<&str> = pair.split(':').collect();
            if parts.len() != 2 {
                tracing::warn!("Invalid path mapping format, skipping: {:?}", pair);
                continue;
            }

            let host = parts[0].trim();
            let container = parts[1].trim();
            if host.is_empty() || container.is_empty() {
                tracing::warn!("Empty path in mapping, skipping: {:?}", pair);
                continue;
            }

            tracing::info!("Registered path mapping {} -> {}", host, container);
            mappings.push((PathBuf::from(host), PathBuf::from(container)));
        }

        mappings.sort_by_key(|(host, _)| std::cmp::Reverse(host.as_os_str().len()));
        Self { mappings }
    }

    /// Parse the comma-separated form used by `CODE_INDEX_PATH_MAPPINGS`
    pub fn from_env_value(value: &str) -> Self {
        Self::from_pairs(value.split(',').filter(|s| !s.trim().is_empty()))
    }

    pub fn has_mappings(&self) -> bool {
        !self.mappings.is_empty()
    }

    pub fn mappings(&self) -> &[(PathBuf, PathBuf)] {
        &self.mappings
    }

    /// Translate a host path to where this process can read it
    pub fn to_container_path(&self, host_path: &Path) -> PathBuf {
        Self::translate(host_path, self.mappings.iter().map(|(h, c)| (h, c)))
    }

    /// Translate a locally observed path back to its stored host form
    pub fn to_host_path(&self, container_path: &Path) -> PathBuf {
        let mut reverse: Vec<(&PathBuf, &PathBuf)> =
            self.mappings.iter().map(|(h, c)| (c, h)).collect();
        reverse.sort_by_key(|(c, _)| std::cmp::Reverse(c.as_os_str().len()));
        Self::translate(container_path, reverse.into_iter())
    }

    /// True when no mappings exist, or the path lies under a mapped container prefix
    pub fn validate_container_path(&self, container_path: &Path) -> bool {
        !self.has_mappings()
            || self
                .mappings
                .iter()
                .any(|(_, container)| container_path.starts_with(container))
    }

    fn translate<'a>(
        path: &Path,
        candidates: impl Iterator<Item = (&'a PathBuf, &'a PathBuf)>,
    ) -> PathBuf {
        for (from, to) in candidates {
            if let Ok(rest) = path.strip_prefix(from) {
                let mapped = if rest.as_os_str().is_empty() {
                    to.clone()
                } else {
                    to.join(rest)
                };
                tracing::trace!("Mapped {} -> {}", path.display(), mapped.display());
                return mapped;
            }
        }
        path.to_path_buf()
    }
}
