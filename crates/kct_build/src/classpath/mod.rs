pub mod locator;

use crate::config::{ArchiveSelection, SupportingArchives};
use crate::toolchain;
use crate::BuildError;
use locator::SupportingArchive;
use once_cell::sync::OnceCell;
use std::collections::{BTreeMap, HashSet};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable holding extra host classpath entries.
pub const HOST_CLASSPATH_ENV: &str = "KCT_HOST_CLASSPATH";

/// Source of the host classpath that supporting archives are searched in and
/// that `inherit_classpath` appends.
pub trait ClasspathResolver {
    /// Every entry visible to the host, without duplicates.
    fn host_classpath(&self) -> &[PathBuf];

    fn locate(&self, archive: SupportingArchive) -> Option<PathBuf> {
        archive.locate_in(self.host_classpath())
    }
}

/// A fixed list of candidates, mostly for tests.
#[derive(Debug, Clone, Default)]
pub struct FixedClasspath {
    entries: Vec<PathBuf>,
}

impl FixedClasspath {
    pub fn new<I, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            entries: dedup_preserving_order(entries.into_iter().map(Into::into)),
        }
    }
}

impl ClasspathResolver for FixedClasspath {
    fn host_classpath(&self) -> &[PathBuf] {
        &self.entries
    }
}

/// The classpath of this process's environment: `CLASSPATH`,
/// `KCT_HOST_CLASSPATH`, and the archives shipped in the Kotlin toolchain's
/// `lib/` directory. Enumerated on first use.
#[derive(Debug, Default)]
pub struct HostClasspath {
    kotlin_home: Option<PathBuf>,
    entries: OnceCell<Vec<PathBuf>>,
}

impl HostClasspath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use this Kotlin distribution instead of discovering one.
    pub fn with_kotlin_home(kotlin_home: impl Into<PathBuf>) -> Self {
        Self {
            kotlin_home: Some(kotlin_home.into()),
            entries: OnceCell::new(),
        }
    }

    fn enumerate(&self) -> Vec<PathBuf> {
        let mut entries = Vec::new();

        for var in ["CLASSPATH", HOST_CLASSPATH_ENV] {
            if let Some(value) = env::var_os(var) {
                entries.extend(
                    env::split_paths(&value).filter(|path| !path.as_os_str().is_empty()),
                );
            }
        }

        let kotlin_home = self.kotlin_home.clone().or_else(|| {
            toolchain::discover_kotlinc()
                .ok()
                .map(|toolchain| toolchain.kotlin_home)
        });
        if let Some(home) = kotlin_home {
            entries.extend(list_archives(&home.join("lib")));
        }

        let entries = dedup_preserving_order(entries.into_iter().filter(|path| path.exists()));
        debug!(entries = entries.len(), "enumerated host classpath");
        entries
    }
}

impl ClasspathResolver for HostClasspath {
    fn host_classpath(&self) -> &[PathBuf] {
        self.entries.get_or_init(|| self.enumerate())
    }
}

fn list_archives(dir: &Path) -> Vec<PathBuf> {
    let Ok(read_dir) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut archives: Vec<PathBuf> = read_dir
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("jar"))
                .unwrap_or(false)
        })
        .collect();
    archives.sort();
    archives
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Absolute paths with later duplicates dropped.
fn dedup_preserving_order<I>(entries: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
{
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .map(|entry| absolutize(&entry))
        .filter(|entry| seen.insert(entry.clone()))
        .collect()
}

/// Supporting archives after applying each [`ArchiveSelection`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedArchives {
    found: BTreeMap<SupportingArchive, PathBuf>,
    missing: Vec<SupportingArchive>,
}

impl ResolvedArchives {
    pub fn resolve(
        selection: &SupportingArchives,
        resolver: &dyn ClasspathResolver,
        jdk_home: Option<&Path>,
    ) -> Self {
        let mut resolved = Self::default();

        for archive in SupportingArchive::ALL {
            let path = match archive.selection(selection) {
                ArchiveSelection::Skip => continue,
                ArchiveSelection::Use(path) => Some(absolutize(path)),
                ArchiveSelection::Discover => resolver
                    .locate(archive)
                    .or_else(|| fallback_location(archive, jdk_home)),
            };

            match path {
                Some(path) => {
                    debug!(%archive, path = %path.display(), "resolved supporting archive");
                    resolved.found.insert(archive, path);
                }
                None => resolved.missing.push(archive),
            }
        }

        resolved
    }

    pub fn get(&self, archive: SupportingArchive) -> Option<&Path> {
        self.found.get(&archive).map(PathBuf::as_path)
    }

    /// Archives that were to be discovered but are not on the host classpath.
    pub fn missing(&self) -> &[SupportingArchive] {
        &self.missing
    }

    /// Found archives that belong on the compile classpath, in classpath order.
    pub fn classpath_entries(&self) -> Vec<PathBuf> {
        SupportingArchive::ALL
            .into_iter()
            .filter(|archive| archive.on_classpath())
            .filter_map(|archive| self.found.get(&archive).cloned())
            .collect()
    }
}

fn fallback_location(archive: SupportingArchive, jdk_home: Option<&Path>) -> Option<PathBuf> {
    match (archive, jdk_home) {
        (SupportingArchive::Tools, Some(home)) => {
            let candidate = home.join("lib").join("tools.jar");
            candidate.is_file().then_some(candidate)
        }
        _ => None,
    }
}

/// The compile classpath: explicit entries, then supporting archives, then
/// (optionally) the inherited host classpath. Earlier entries win.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedClasspath {
    entries: Vec<PathBuf>,
}

impl ResolvedClasspath {
    pub fn build(
        explicit: &[PathBuf],
        supporting: Vec<PathBuf>,
        inherited: Option<&[PathBuf]>,
    ) -> Self {
        let inherited = inherited.unwrap_or_default().iter().cloned();
        Self {
            entries: dedup_preserving_order(
                explicit.iter().cloned().chain(supporting).chain(inherited),
            ),
        }
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Join with the platform path separator.
    pub fn join(&self) -> Result<String, BuildError> {
        if let Some(bad) = self
            .entries
            .iter()
            .find(|entry| env::join_paths([entry.as_path()]).is_err())
        {
            return Err(BuildError::InvalidClasspathEntry { path: bad.clone() });
        }

        env::join_paths(&self.entries)
            .map(|joined| joined.to_string_lossy().into_owned())
            .map_err(|_| BuildError::InvalidClasspathEntry {
                path: PathBuf::new(),
            })
    }
}
