// kct CLI - run one compile-test compilation outside the test suite
use anyhow::{Context, Result};
use clap::Parser;
use std::env;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use kct_build::{
    detect_java_home, discover_kotlinc, ClasspathResolver, Compilation, CompilationRequest,
    CompilerOptions, ExitCode, HostClasspath, KotlinToolchain, ProcessCompiler, SourceFile,
    SupportingArchive,
};

#[derive(Parser)]
#[command(name = "kct")]
#[command(about = "Kotlin compile-test runner")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand)]
pub enum Commands {
    /// Compile source files the way a compile test would
    Compile(CompileArgs),
    /// Show the discovered Kotlin toolchain and supporting archives
    Toolchain {
        /// Kotlin distribution to inspect instead of discovering one
        #[arg(long)]
        kotlin_home: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct CompileArgs {
    /// Source files, relative to --source-root
    #[arg(required = true)]
    pub sources: Vec<PathBuf>,
    /// TOML profile with compiler options
    #[arg(long)]
    pub profile: Option<PathBuf>,
    /// Directory for staged sources, classes and services.jar
    #[arg(long)]
    pub working_dir: Option<PathBuf>,
    /// kotlinc launcher to use instead of discovering one
    #[arg(long)]
    pub kotlinc: Option<PathBuf>,
    /// Extra classpath entry (repeatable)
    #[arg(long)]
    pub classpath: Vec<PathBuf>,
    /// Annotation processor class name (repeatable)
    #[arg(long = "processor")]
    pub processors: Vec<String>,
    /// Annotation processor classpath entry (repeatable)
    #[arg(long)]
    pub processor_path: Vec<PathBuf>,
    #[arg(long, default_value = ".")]
    pub source_root: PathBuf,
    /// JDK home; defaults to the profile's, then JAVA_HOME
    #[arg(long)]
    pub jdk_home: Option<PathBuf>,
    /// Suppress advisories and compiler verbosity
    #[arg(long)]
    pub quiet: bool,
}

/// Turn command-line arguments into a compilation request.
pub fn build_request(args: &CompileArgs, working_dir: &Path) -> Result<CompilationRequest> {
    let mut options = match &args.profile {
        Some(profile) => CompilerOptions::load(profile)
            .with_context(|| format!("Failed to load profile {}", profile.display()))?,
        None => CompilerOptions::default(),
    };

    options.classpaths.extend(args.classpath.iter().cloned());
    options.annotation_processors.extend(args.processors.iter().cloned());
    options.processor_classpath.extend(args.processor_path.iter().cloned());
    if let Some(jdk_home) = &args.jdk_home {
        options.jdk_home = Some(jdk_home.clone());
    } else if options.jdk_home.is_none() {
        options.jdk_home = detect_java_home();
    }
    if args.quiet {
        options = options.quiet();
    }

    let mut request = CompilationRequest::new(working_dir).with_options(options);
    for source in &args.sources {
        let on_disk = args.source_root.join(source);
        let contents = fs::read_to_string(&on_disk)
            .with_context(|| format!("Failed to read source {}", on_disk.display()))?;
        request = request.with_source(SourceFile::new(source.clone(), contents));
    }
    Ok(request)
}

fn toolchain_for(kotlinc: Option<&Path>) -> Result<KotlinToolchain> {
    match kotlinc {
        Some(path) => {
            let kotlin_home = path
                .parent()
                .and_then(Path::parent)
                .with_context(|| format!("Cannot derive KOTLIN_HOME from {}", path.display()))?;
            Ok(KotlinToolchain {
                kotlinc_path: path.to_path_buf(),
                kotlin_home: kotlin_home.to_path_buf(),
            })
        }
        None => Ok(discover_kotlinc()?),
    }
}

/// Run one compilation with diagnostics on stdout.
pub fn run_compile(args: &CompileArgs) -> Result<ExitCode> {
    let working_dir = args
        .working_dir
        .clone()
        .unwrap_or_else(|| env::temp_dir().join(format!("kct-{}", std::process::id())));
    let request = build_request(args, &working_dir)?;
    let toolchain = toolchain_for(args.kotlinc.as_deref())?;
    debug!(
        kotlinc = %toolchain.kotlinc_path.display(),
        working_dir = %working_dir.display(),
        "compiling"
    );

    let compilation = Compilation::new(request, ProcessCompiler::from_toolchain(&toolchain))
        .with_resolver(HostClasspath::with_kotlin_home(&toolchain.kotlin_home));
    let result = compilation.run().context("Compilation could not be run")?;

    println!(
        "{:?}: classes in {}",
        result.exit_code,
        result.output_directory.display()
    );
    Ok(result.exit_code)
}

/// Human-readable summary of the toolchain and the archives found in it.
pub fn describe_toolchain(kotlin_home: Option<&Path>) -> Result<String> {
    let toolchain = match kotlin_home {
        Some(home) => KotlinToolchain::from_home(home)?,
        None => discover_kotlinc()?,
    };
    let version = toolchain
        .version()
        .unwrap_or_else(|error| format!("unknown ({error})"));

    let mut summary = String::new();
    writeln!(summary, "kotlinc:     {}", toolchain.kotlinc_path.display())?;
    writeln!(summary, "kotlin home: {}", toolchain.kotlin_home.display())?;
    writeln!(summary, "version:     {version}")?;
    match detect_java_home() {
        Some(java_home) => writeln!(summary, "java home:   {}", java_home.display())?,
        None => writeln!(summary, "java home:   (not found)")?,
    }

    let host = HostClasspath::with_kotlin_home(&toolchain.kotlin_home);
    for archive in SupportingArchive::ALL {
        match host.locate(archive) {
            Some(path) => writeln!(summary, "  {archive}: {}", path.display())?,
            None => writeln!(summary, "  {archive}: (missing)")?,
        }
    }
    Ok(summary)
}
