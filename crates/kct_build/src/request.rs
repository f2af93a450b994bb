use crate::config::CompilerOptions;
use crate::services::ServiceBinding;
use crate::BuildError;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Service interface annotation processors are registered under.
pub(crate) const PROCESSOR_SERVICE: &str = "javax.annotation.processing.Processor";

/// A source file that only exists in memory until it is staged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    path: PathBuf,
    contents: String,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
        }
    }

    pub fn kotlin(name: &str, contents: impl Into<String>) -> Self {
        Self::new(with_extension(name, "kt"), contents)
    }

    pub fn java(name: &str, contents: impl Into<String>) -> Self {
        Self::new(with_extension(name, "java"), contents)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contents(&self) -> &str {
        &self.contents
    }

    /// Reject absolute paths and anything that climbs out of the sources tree.
    pub fn validate(&self) -> Result<(), BuildError> {
        let mut depth = 0usize;
        for component in self.path.components() {
            match component {
                Component::Normal(_) => depth += 1,
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(BuildError::InvalidSourcePath {
                        path: self.path.clone(),
                    });
                }
            }
        }

        if depth == 0 {
            return Err(BuildError::InvalidSourcePath {
                path: self.path.clone(),
            });
        }
        Ok(())
    }

    /// Write the file under `sources_dir`, creating parent directories.
    pub fn stage(&self, sources_dir: &Path) -> Result<PathBuf, BuildError> {
        self.validate()?;
        let target = sources_dir.join(&self.path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|error| BuildError::io(parent, error))?;
        }
        fs::write(&target, &self.contents).map_err(|error| BuildError::io(&target, error))?;
        Ok(target)
    }
}

fn with_extension(name: &str, extension: &str) -> PathBuf {
    let path = PathBuf::from(name);
    if path.extension().is_some() {
        path
    } else {
        path.with_extension(extension)
    }
}

/// Fixed file layout below a request's working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceLayout {
    root: PathBuf,
}

impl WorkspaceLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sources_dir(&self) -> PathBuf {
        self.root.join("sources")
    }

    pub fn classes_dir(&self) -> PathBuf {
        self.root.join("classes")
    }

    pub fn services_jar(&self) -> PathBuf {
        self.root.join("services.jar")
    }

    pub fn kapt_dir(&self) -> PathBuf {
        self.root.join("kapt")
    }

    pub fn kapt_sources_dir(&self) -> PathBuf {
        self.kapt_dir().join("sources")
    }

    pub fn kapt_stubs_dir(&self) -> PathBuf {
        self.kapt_dir().join("stubs")
    }

    pub fn kapt_classes_dir(&self) -> PathBuf {
        self.kapt_dir().join("classes")
    }
}

/// Everything needed for one compilation.
///
/// Two requests sharing a working directory must not run at the same time;
/// the staged sources, class output and services archive live at fixed paths
/// below it.
#[derive(Debug, Clone)]
pub struct CompilationRequest {
    layout: WorkspaceLayout,
    sources: Vec<SourceFile>,
    services: Vec<ServiceBinding>,
    options: CompilerOptions,
}

impl CompilationRequest {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            layout: WorkspaceLayout::new(working_dir),
            sources: Vec::new(),
            services: Vec::new(),
            options: CompilerOptions::default(),
        }
    }

    pub fn with_source(mut self, source: SourceFile) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_sources<I>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = SourceFile>,
    {
        self.sources.extend(sources);
        self
    }

    pub fn with_service(mut self, binding: ServiceBinding) -> Self {
        self.services.push(binding);
        self
    }

    pub fn with_options(mut self, options: CompilerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn working_dir(&self) -> &Path {
        self.layout.root()
    }

    pub fn layout(&self) -> &WorkspaceLayout {
        &self.layout
    }

    pub fn sources(&self) -> &[SourceFile] {
        &self.sources
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Explicit bindings followed by one processor binding per configured
    /// annotation processor.
    pub fn service_bindings(&self) -> Vec<ServiceBinding> {
        let processors = self
            .options
            .annotation_processors
            .iter()
            .map(|processor| ServiceBinding::new(PROCESSOR_SERVICE, processor.as_str()));

        self.services.iter().cloned().chain(processors).collect()
    }

    pub fn has_services(&self) -> bool {
        !self.services.is_empty() || !self.options.annotation_processors.is_empty()
    }
}
