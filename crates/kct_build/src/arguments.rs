use crate::classpath::ResolvedClasspath;
use crate::config::JvmTarget;
use crate::kapt::{KaptConfig, PluginOption};
use crate::request::CompilationRequest;
use crate::BuildError;
use std::fs;
use std::path::{Path, PathBuf};

/// Compiler-ready arguments. Rendered with [`CompositeArguments::to_command_line`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompositeArguments {
    /// Staged sources followed by caller-supplied free arguments.
    pub free_args: Vec<String>,
    pub destination: PathBuf,
    /// Already joined with the platform path separator.
    pub classpath: String,
    pub jdk_home: Option<PathBuf>,
    pub no_jdk: bool,
    pub no_stdlib: bool,
    pub no_reflect: bool,
    pub jvm_target: Option<JvmTarget>,
    pub verbose: bool,
    pub suppress_warnings: bool,
    pub all_warnings_as_errors: bool,
    pub report_output_files: bool,
    pub report_performance: bool,
    pub skip_runtime_version_check: bool,
    pub load_builtins_from_dependencies: bool,
    pub module_name: Option<String>,
    pub language_version: Option<String>,
    pub api_version: Option<String>,
    pub java_parameters: bool,
    pub plugin_classpaths: Vec<PathBuf>,
    pub plugin_options: Vec<PluginOption>,
}

impl CompositeArguments {
    pub fn to_command_line(&self) -> Vec<String> {
        let mut args = vec!["-d".to_string(), path_arg(&self.destination)];

        if !self.classpath.is_empty() {
            args.push("-classpath".into());
            args.push(self.classpath.clone());
        }

        match &self.jdk_home {
            Some(home) => {
                args.push("-jdk-home".into());
                args.push(path_arg(home));
            }
            None if self.no_jdk => args.push("-no-jdk".into()),
            None => {}
        }

        let switches = [
            (self.no_stdlib, "-no-stdlib"),
            (self.no_reflect, "-no-reflect"),
        ];
        push_switches(&mut args, &switches);

        if let Some(target) = self.jvm_target {
            args.push("-jvm-target".into());
            args.push(target.to_string());
        }

        let switches = [
            (self.verbose, "-verbose"),
            (self.suppress_warnings, "-nowarn"),
            (self.all_warnings_as_errors, "-Werror"),
            (self.report_output_files, "-Xreport-output-files"),
            (self.report_performance, "-Xreport-perf"),
            (self.skip_runtime_version_check, "-Xskip-runtime-version-check"),
            (self.load_builtins_from_dependencies, "-Xload-builtins-from-dependencies"),
        ];
        push_switches(&mut args, &switches);

        let values = [
            ("-module-name", &self.module_name),
            ("-language-version", &self.language_version),
            ("-api-version", &self.api_version),
        ];
        for (flag, value) in values {
            if let Some(value) = value {
                args.push(flag.into());
                args.push(value.clone());
            }
        }

        if self.java_parameters {
            args.push("-java-parameters".into());
        }

        if !self.plugin_classpaths.is_empty() {
            let joined = self
                .plugin_classpaths
                .iter()
                .map(|path| path_arg(path))
                .collect::<Vec<_>>()
                .join(",");
            args.push(format!("-Xplugin={joined}"));
        }
        for option in &self.plugin_options {
            args.push("-P".into());
            args.push(option.to_string());
        }

        args.extend(self.free_args.iter().cloned());
        args
    }
}

fn push_switches(args: &mut Vec<String>, switches: &[(bool, &str)]) {
    args.extend(
        switches
            .iter()
            .filter(|(enabled, _)| *enabled)
            .map(|(_, flag)| flag.to_string()),
    );
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Composed arguments plus the advisories raised while composing them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composition {
    pub arguments: CompositeArguments,
    /// Only populated when the request is verbose.
    pub advisories: Vec<String>,
}

/// Merge a request, its resolved classpath and the kapt wiring into one
/// argument object. Reads the staged sources directory; writes nothing.
pub fn compose(
    request: &CompilationRequest,
    classpath: &ResolvedClasspath,
    kapt: Option<&KaptConfig>,
) -> Result<Composition, BuildError> {
    let options = request.options();
    let layout = request.layout();
    let mut advisories = Vec::new();

    let mut free_args: Vec<String> = staged_sources(&layout.sources_dir())?
        .iter()
        .map(|path| path_arg(path))
        .collect();
    free_args.extend(options.free_args.iter().cloned());

    let mut plugin_classpaths = options.plugin_classpaths.clone();
    let mut plugin_options = parse_plugin_options(&options.plugin_options)?;
    if request.has_services() {
        let kapt = kapt.ok_or(BuildError::MissingKaptArchive)?;
        plugin_classpaths.extend(kapt.plugin_classpaths.iter().cloned());
        plugin_options.extend(kapt.options.iter().cloned());
    } else {
        advisories.push(
            "No services were given. Not including kapt in the compiler's plugins.".into(),
        );
    }

    let jdk_home = options.jdk_home.clone();
    if jdk_home.is_none() {
        advisories.push(
            "No JDK home was given. Passing -no-jdk; JDK classes must come from the classpath."
                .into(),
        );
    }

    if !options.verbose {
        advisories.clear();
    }

    let arguments = CompositeArguments {
        free_args,
        destination: layout.classes_dir(),
        classpath: classpath.join()?,
        no_jdk: jdk_home.is_none(),
        jdk_home,
        no_stdlib: true,
        no_reflect: true,
        jvm_target: options.jvm_target,
        verbose: options.verbose,
        suppress_warnings: options.suppress_warnings,
        all_warnings_as_errors: options.all_warnings_as_errors,
        report_output_files: options.report_output_files,
        report_performance: options.report_performance,
        skip_runtime_version_check: options.skip_runtime_version_check,
        load_builtins_from_dependencies: options.load_builtins_from_dependencies,
        module_name: options.module_name.clone(),
        language_version: options.language_version.clone(),
        api_version: options.api_version.clone(),
        java_parameters: options.java_parameters,
        plugin_classpaths,
        plugin_options,
    };

    Ok(Composition {
        arguments,
        advisories,
    })
}

pub(crate) fn parse_plugin_options(raw: &[String]) -> Result<Vec<PluginOption>, BuildError> {
    raw.iter().map(|option| PluginOption::parse(option)).collect()
}

/// Every regular file below `dir`, sorted. A missing directory has no sources.
fn staged_sources(dir: &Path) -> Result<Vec<PathBuf>, BuildError> {
    let mut files = Vec::new();
    if dir.is_dir() {
        collect_files(dir, &mut files)?;
    }
    files.sort();
    Ok(files)
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), BuildError> {
    let entries = fs::read_dir(dir).map_err(|error| BuildError::io(dir, error))?;
    for entry in entries {
        let path = entry.map_err(|error| BuildError::io(dir, error))?.path();
        if path.is_dir() {
            collect_files(&path, files)?;
        } else if path.is_file() {
            files.push(path);
        }
    }
    Ok(())
}
