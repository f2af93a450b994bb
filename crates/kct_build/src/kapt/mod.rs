pub mod encoding;

use crate::BuildError;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Compiler plugin id of kapt (annotation processing via javac).
pub const KAPT_PLUGIN_ID: &str = "org.jetbrains.kotlin.kapt3";

/// kapt always runs stub generation followed by annotation processing.
const APT_MODE: &str = "stubsAndApt";

/// The option names kapt understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KaptOption {
    Sources,
    Classes,
    Stubs,
    ApClasspath,
    CorrectErrorTypes,
    AptMode,
    ApOptions,
    JavacArguments,
    Processors,
    IncrementalData,
    IncludeCompileClasspath,
    MapDiagnosticLocations,
    UseLightAnalysis,
    ShowProcessorTimings,
    StrictMode,
    InfoAsWarnings,
    Verbose,
}

impl KaptOption {
    const ALL: [KaptOption; 17] = [
        KaptOption::Sources,
        KaptOption::Classes,
        KaptOption::Stubs,
        KaptOption::ApClasspath,
        KaptOption::CorrectErrorTypes,
        KaptOption::AptMode,
        KaptOption::ApOptions,
        KaptOption::JavacArguments,
        KaptOption::Processors,
        KaptOption::IncrementalData,
        KaptOption::IncludeCompileClasspath,
        KaptOption::MapDiagnosticLocations,
        KaptOption::UseLightAnalysis,
        KaptOption::ShowProcessorTimings,
        KaptOption::StrictMode,
        KaptOption::InfoAsWarnings,
        KaptOption::Verbose,
    ];

    pub fn name(self) -> &'static str {
        match self {
            KaptOption::Sources => "sources",
            KaptOption::Classes => "classes",
            KaptOption::Stubs => "stubs",
            KaptOption::ApClasspath => "apclasspath",
            KaptOption::CorrectErrorTypes => "correctErrorTypes",
            KaptOption::AptMode => "aptMode",
            KaptOption::ApOptions => "apoptions",
            KaptOption::JavacArguments => "javacArguments",
            KaptOption::Processors => "processors",
            KaptOption::IncrementalData => "incrementalData",
            KaptOption::IncludeCompileClasspath => "includeCompileClasspath",
            KaptOption::MapDiagnosticLocations => "mapDiagnosticLocations",
            KaptOption::UseLightAnalysis => "useLightAnalysis",
            KaptOption::ShowProcessorTimings => "showProcessorTimings",
            KaptOption::StrictMode => "strictMode",
            KaptOption::InfoAsWarnings => "infoAsWarnings",
            KaptOption::Verbose => "verbose",
        }
    }
}

impl FromStr for KaptOption {
    type Err = ();

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        KaptOption::ALL
            .into_iter()
            .find(|option| option.name() == name)
            .ok_or(())
    }
}

/// One `-P plugin:<id>:<key>=<value>` compiler argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginOption {
    plugin_id: String,
    key: String,
    value: String,
}

impl PluginOption {
    pub fn new(
        plugin_id: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, BuildError> {
        let option = Self {
            plugin_id: plugin_id.into(),
            key: key.into(),
            value: value.into(),
        };
        option.validate()?;
        Ok(option)
    }

    pub fn kapt(key: KaptOption, value: impl Into<String>) -> Self {
        Self {
            plugin_id: KAPT_PLUGIN_ID.to_string(),
            key: key.name().to_string(),
            value: value.into(),
        }
    }

    fn kapt_path(key: KaptOption, path: &Path) -> Self {
        Self::kapt(key, path.to_string_lossy())
    }

    /// Parse the `plugin:<id>:<key>=<value>` form.
    pub fn parse(raw: &str) -> Result<Self, BuildError> {
        let invalid = |reason: &str| BuildError::InvalidPluginOption {
            option: raw.to_string(),
            reason: reason.to_string(),
        };

        let body = raw
            .strip_prefix("plugin:")
            .ok_or_else(|| invalid("expected the form plugin:<id>:<key>=<value>"))?;
        let (plugin_id, assignment) = body
            .split_once(':')
            .ok_or_else(|| invalid("missing ':' between plugin id and option"))?;
        let (key, value) = assignment
            .split_once('=')
            .ok_or_else(|| invalid("missing '=' between option name and value"))?;

        Self::new(plugin_id, key, value)
    }

    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    fn validate(&self) -> Result<(), BuildError> {
        let invalid = |reason: String| BuildError::InvalidPluginOption {
            option: self.to_string(),
            reason,
        };

        if self.plugin_id.is_empty() || self.plugin_id.contains(':') {
            return Err(invalid(format!("malformed plugin id '{}'", self.plugin_id)));
        }
        if self.key.is_empty() || self.key.contains(|ch: char| ch == '=' || ch == ':') {
            return Err(invalid(format!("malformed option name '{}'", self.key)));
        }
        if self.plugin_id == KAPT_PLUGIN_ID && self.key.parse::<KaptOption>().is_err() {
            return Err(invalid(format!("kapt has no option named '{}'", self.key)));
        }
        Ok(())
    }
}

impl fmt::Display for PluginOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "plugin:{}:{}={}", self.plugin_id, self.key, self.value)
    }
}

/// Everything the kapt plugin wiring depends on.
#[derive(Debug, Clone)]
pub struct KaptInputs<'a> {
    pub kapt_jar: Option<&'a Path>,
    pub tools_jar: Option<&'a Path>,
    pub sources_dir: PathBuf,
    pub classes_dir: PathBuf,
    pub stubs_dir: PathBuf,
    pub services_jar: PathBuf,
    pub processor_classpath: &'a [PathBuf],
    pub correct_error_types: bool,
    pub ap_options: &'a BTreeMap<String, String>,
    pub javac_arguments: &'a BTreeMap<String, String>,
}

/// Plugin classpath entries and plugin options that enable kapt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KaptConfig {
    pub plugin_classpaths: Vec<PathBuf>,
    pub options: Vec<PluginOption>,
}

impl KaptConfig {
    /// Build the kapt wiring. Fails before anything touches the disk when the
    /// kapt archive is unavailable.
    pub fn configure(inputs: &KaptInputs<'_>) -> Result<Self, BuildError> {
        let kapt_jar = inputs.kapt_jar.ok_or(BuildError::MissingKaptArchive)?;

        let mut plugin_classpaths = vec![kapt_jar.to_path_buf()];
        if let Some(tools_jar) = inputs.tools_jar {
            plugin_classpaths.push(tools_jar.to_path_buf());
        }

        let mut options = vec![
            PluginOption::kapt_path(KaptOption::Sources, &inputs.sources_dir),
            PluginOption::kapt_path(KaptOption::Classes, &inputs.classes_dir),
            PluginOption::kapt_path(KaptOption::Stubs, &inputs.stubs_dir),
            PluginOption::kapt_path(KaptOption::ApClasspath, &inputs.services_jar),
        ];
        options.extend(
            inputs
                .processor_classpath
                .iter()
                .map(|entry| PluginOption::kapt_path(KaptOption::ApClasspath, entry)),
        );
        options.push(PluginOption::kapt(
            KaptOption::CorrectErrorTypes,
            inputs.correct_error_types.to_string(),
        ));
        options.push(PluginOption::kapt(KaptOption::AptMode, APT_MODE));

        if !inputs.ap_options.is_empty() {
            options.push(PluginOption::kapt(
                KaptOption::ApOptions,
                encoding::encode_options(inputs.ap_options)?,
            ));
        }
        if !inputs.javac_arguments.is_empty() {
            options.push(PluginOption::kapt(
                KaptOption::JavacArguments,
                encoding::encode_options(inputs.javac_arguments)?,
            ));
        }

        Ok(Self {
            plugin_classpaths,
            options,
        })
    }
}
