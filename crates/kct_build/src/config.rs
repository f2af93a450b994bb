use crate::BuildError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Every compiler-behavior knob of a compilation request.
///
/// Loadable from a TOML profile; omitted keys keep their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerOptions {
    /// Print advisories and pass `-verbose` to the compiler.
    pub verbose: bool,
    /// Append the whole host classpath after the explicit and supporting entries.
    pub inherit_classpath: bool,
    /// JDK the compiler resolves JDK classes from. `None` compiles with `-no-jdk`.
    pub jdk_home: Option<PathBuf>,
    pub jvm_target: Option<JvmTarget>,
    pub module_name: Option<String>,
    pub language_version: Option<String>,
    pub api_version: Option<String>,
    pub suppress_warnings: bool,
    pub all_warnings_as_errors: bool,
    pub report_output_files: bool,
    pub report_performance: bool,
    pub skip_runtime_version_check: bool,
    pub load_builtins_from_dependencies: bool,
    pub java_parameters: bool,
    /// kapt `correctErrorTypes`.
    pub correct_error_types: bool,
    /// Explicit classpath entries; they win over everything resolved later.
    pub classpaths: Vec<PathBuf>,
    /// Extra positional arguments, placed after the staged sources.
    pub free_args: Vec<String>,
    /// Compiler plugins loaded in addition to kapt.
    pub plugin_classpaths: Vec<PathBuf>,
    /// Raw `plugin:<id>:<key>=<value>` strings for `plugin_classpaths`.
    pub plugin_options: Vec<String>,
    /// Processor options (`-A` equivalents) handed to kapt.
    pub kapt_options: BTreeMap<String, String>,
    /// javac options handed to the javac instance kapt runs.
    pub kapt_javac_arguments: BTreeMap<String, String>,
    /// Fully-qualified annotation processor class names.
    pub annotation_processors: Vec<String>,
    /// Where the processor classes live, appended to kapt's `apclasspath`.
    pub processor_classpath: Vec<PathBuf>,
    pub archives: SupportingArchives,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            verbose: true,
            inherit_classpath: false,
            jdk_home: None,
            jvm_target: None,
            module_name: None,
            language_version: None,
            api_version: None,
            suppress_warnings: false,
            all_warnings_as_errors: false,
            report_output_files: false,
            report_performance: false,
            skip_runtime_version_check: false,
            load_builtins_from_dependencies: false,
            java_parameters: false,
            correct_error_types: true,
            classpaths: Vec::new(),
            free_args: Vec::new(),
            plugin_classpaths: Vec::new(),
            plugin_options: Vec::new(),
            kapt_options: BTreeMap::new(),
            kapt_javac_arguments: BTreeMap::new(),
            annotation_processors: Vec::new(),
            processor_classpath: Vec::new(),
            archives: SupportingArchives::default(),
        }
    }
}

impl CompilerOptions {
    pub fn from_toml_str(source: &str) -> Result<Self, BuildError> {
        toml::from_str(source)
            .map_err(|error| BuildError::Config(format!("invalid compiler profile: {error}")))
    }

    /// Load a TOML profile. Relative paths inside it are resolved against the
    /// profile's directory.
    pub fn load(path: &Path) -> Result<Self, BuildError> {
        let source = std::fs::read_to_string(path).map_err(|error| BuildError::io(path, error))?;
        let mut options = Self::from_toml_str(&source)?;
        if let Some(base) = path.parent() {
            options.rebase_paths(base);
        }
        Ok(options)
    }

    fn rebase_paths(&mut self, base: &Path) {
        let rebase = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };

        if let Some(home) = self.jdk_home.as_mut() {
            rebase(home);
        }
        self.classpaths.iter_mut().for_each(rebase);
        self.plugin_classpaths.iter_mut().for_each(rebase);
        self.processor_classpath.iter_mut().for_each(rebase);
        self.archives.for_each_explicit_mut(rebase);
    }

    pub fn quiet(mut self) -> Self {
        self.verbose = false;
        self
    }

    pub fn with_jdk_home(mut self, jdk_home: impl Into<PathBuf>) -> Self {
        self.jdk_home = Some(jdk_home.into());
        self
    }

    pub fn with_jvm_target(mut self, target: JvmTarget) -> Self {
        self.jvm_target = Some(target);
        self
    }

    pub fn with_classpath(mut self, entry: impl Into<PathBuf>) -> Self {
        self.classpaths.push(entry.into());
        self
    }

    pub fn with_inherited_classpath(mut self) -> Self {
        self.inherit_classpath = true;
        self
    }

    pub fn with_annotation_processor(mut self, class_name: impl Into<String>) -> Self {
        self.annotation_processors.push(class_name.into());
        self
    }

    pub fn with_kapt_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.kapt_options.insert(key.into(), value.into());
        self
    }

    pub fn with_archives(mut self, archives: SupportingArchives) -> Self {
        self.archives = archives;
        self
    }
}

/// `-jvm-target` value, stored as the Java release number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct JvmTarget(u8);

impl JvmTarget {
    pub const JVM_1_8: JvmTarget = JvmTarget(8);
    pub const JVM_11: JvmTarget = JvmTarget(11);
    pub const JVM_17: JvmTarget = JvmTarget(17);
    pub const JVM_21: JvmTarget = JvmTarget(21);

    const OLDEST: u8 = 6;
    const NEWEST: u8 = 25;

    pub fn release(self) -> u8 {
        self.0
    }

    pub fn from_release(release: u8) -> Option<Self> {
        (Self::OLDEST..=Self::NEWEST)
            .contains(&release)
            .then_some(JvmTarget(release))
    }
}

impl fmt::Display for JvmTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 <= 8 {
            write!(f, "1.{}", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl FromStr for JvmTarget {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let digits = trimmed.strip_prefix("1.").unwrap_or(trimmed);
        digits
            .parse::<u8>()
            .ok()
            .and_then(JvmTarget::from_release)
            .ok_or_else(|| format!("unsupported JVM target '{trimmed}'"))
    }
}

impl TryFrom<String> for JvmTarget {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// How one supporting archive is obtained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveSelection {
    /// Search the host classpath on first use.
    #[default]
    Discover,
    /// Use this file as-is.
    Use(PathBuf),
    /// Leave the archive out.
    Skip,
}

impl ArchiveSelection {
    /// The configured file, when one was given.
    pub fn explicit(&self) -> Option<&Path> {
        match self {
            ArchiveSelection::Use(path) => Some(path),
            ArchiveSelection::Discover | ArchiveSelection::Skip => None,
        }
    }
}

/// Selection for every supporting archive the composer knows about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SupportingArchives {
    pub stdlib: ArchiveSelection,
    pub stdlib_jdk: ArchiveSelection,
    pub stdlib_common: ArchiveSelection,
    pub reflect: ArchiveSelection,
    pub script_runtime: ArchiveSelection,
    pub kapt: ArchiveSelection,
    pub tools: ArchiveSelection,
}

impl SupportingArchives {
    /// Nothing is discovered; every archive has to be supplied explicitly.
    pub fn none() -> Self {
        Self {
            stdlib: ArchiveSelection::Skip,
            stdlib_jdk: ArchiveSelection::Skip,
            stdlib_common: ArchiveSelection::Skip,
            reflect: ArchiveSelection::Skip,
            script_runtime: ArchiveSelection::Skip,
            kapt: ArchiveSelection::Skip,
            tools: ArchiveSelection::Skip,
        }
    }

    fn for_each_explicit_mut(&mut self, mut apply: impl FnMut(&mut PathBuf)) {
        for selection in [
            &mut self.stdlib,
            &mut self.stdlib_jdk,
            &mut self.stdlib_common,
            &mut self.reflect,
            &mut self.script_runtime,
            &mut self.kapt,
            &mut self.tools,
        ] {
            if let ArchiveSelection::Use(path) = selection {
                apply(path);
            }
        }
    }
}
