// kct_build - Kotlin compiler invocation for compile tests
//!
//! Stages virtual sources into a working directory, resolves the supporting
//! Kotlin archives, wires the kapt plugin for annotation processors, composes
//! the compiler arguments and runs one compilation, returning the compiler's
//! exit classification together with the captured diagnostics.

mod arguments;
mod classpath;
mod config;
mod kapt;
mod request;
mod runner;
mod services;
mod toolchain;

pub use arguments::{compose, Composition, CompositeArguments};
pub use classpath::locator::{locate, SupportingArchive};
pub use classpath::{
    ClasspathResolver, FixedClasspath, HostClasspath, ResolvedArchives, ResolvedClasspath,
    HOST_CLASSPATH_ENV,
};
pub use config::{ArchiveSelection, CompilerOptions, JvmTarget, SupportingArchives};
pub use kapt::encoding::{decode_options, encode_options};
pub use kapt::{KaptConfig, KaptInputs, KaptOption, PluginOption, KAPT_PLUGIN_ID};
pub use request::{CompilationRequest, SourceFile, WorkspaceLayout};
pub use runner::diagnostics::{
    DiagnosticsTee, FailureContext, FailureRule, FailureRules, LegacyToolsJarRule,
};
pub use runner::{
    Compilation, CompilationResult, CompilerBackend, ExitCode, Invocation, InvocationState,
    ProcessCompiler,
};
pub use services::{package_services, validate_binary_name, ServiceBinding, SERVICES_PREFIX};
pub use toolchain::{detect_java_home, discover_kotlinc, KotlinToolchain};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(
        "Annotation processing was requested but no kotlin-annotation-processing archive is available. \
         Put it on the host classpath or select it explicitly."
    )]
    MissingKaptArchive,
    #[error("{role} '{name}' is not a resolvable fully-qualified class name")]
    UnresolvableIdentity { role: &'static str, name: String },
    #[error("Source path '{path}' escapes the staging directory")]
    InvalidSourcePath { path: PathBuf },
    #[error("Invalid plugin option '{option}': {reason}")]
    InvalidPluginOption { option: String, reason: String },
    #[error("Cannot encode option '{key}': {reason}")]
    OptionEncoding { key: String, reason: String },
    #[error("Classpath entry '{path}' contains the platform path separator")]
    InvalidClasspathEntry { path: PathBuf },
    #[error("IO error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write archive '{path}': {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("Kotlin compiler not found: {0}")]
    CompilerNotFound(String),
    #[error("Failed to launch compiler '{command}': {source}")]
    CompilerSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to forward compiler diagnostics: {0}")]
    Diagnostics(#[source] std::io::Error),
    #[error("Invocation is {actual:?}, expected {expected:?}")]
    InvalidState {
        expected: InvocationState,
        actual: InvocationState,
    },
}

impl BuildError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BuildError::Io {
            path: path.into(),
            source,
        }
    }

    /// True for errors raised by validating the request before anything is
    /// written to disk.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            BuildError::Config(_)
                | BuildError::MissingKaptArchive
                | BuildError::UnresolvableIdentity { .. }
                | BuildError::InvalidSourcePath { .. }
                | BuildError::InvalidPluginOption { .. }
                | BuildError::OptionEncoding { .. }
                | BuildError::InvalidClasspathEntry { .. }
        )
    }
}

#[cfg(test)]
mod tests;
