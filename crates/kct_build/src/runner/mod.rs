pub mod diagnostics;

use crate::arguments::{self, Composition};
use crate::classpath::locator::SupportingArchive;
use crate::classpath::{ClasspathResolver, HostClasspath, ResolvedArchives, ResolvedClasspath};
use crate::kapt::{KaptConfig, KaptInputs};
use crate::request::CompilationRequest;
use crate::toolchain::{self, KotlinToolchain};
use crate::BuildError;
use diagnostics::{DiagnosticsTee, FailureContext, FailureRule, FailureRules};
use once_cell::sync::OnceCell;
use std::ffi::OsString;
use std::fs;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use tracing::{debug, info, warn};

/// Main class of the JVM compiler inside `kotlin-compiler.jar`.
const K2JVM_COMPILER: &str = "org.jetbrains.kotlin.cli.jvm.K2JVMCompiler";

/// How the compiler run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Ok,
    CompilationError,
    InternalError,
    ScriptExecutionError,
    /// Any other status, or none when the process was killed by a signal.
    Failure(Option<i32>),
}

impl ExitCode {
    pub fn from_code(code: Option<i32>) -> Self {
        match code {
            Some(0) => ExitCode::Ok,
            Some(1) => ExitCode::CompilationError,
            Some(2) => ExitCode::InternalError,
            Some(3) => ExitCode::ScriptExecutionError,
            other => ExitCode::Failure(other),
        }
    }

    pub fn from_status(status: ExitStatus) -> Self {
        Self::from_code(status.code())
    }

    pub fn is_success(self) -> bool {
        self == ExitCode::Ok
    }

    /// Process status a CLI should exit with to mirror this result.
    pub fn process_code(self) -> i32 {
        match self {
            ExitCode::Ok => 0,
            ExitCode::CompilationError => 1,
            ExitCode::InternalError => 2,
            ExitCode::ScriptExecutionError => 3,
            ExitCode::Failure(code) => code.unwrap_or(-1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationResult {
    pub exit_code: ExitCode,
    /// `<workingDir>/classes`
    pub output_directory: PathBuf,
    /// Everything the compiler printed, as forwarded to the caller's stream.
    pub messages: String,
    /// Warnings raised by failure rules.
    pub warnings: Vec<String>,
}

/// The compiler entry point. Compiler-reported failures are an [`ExitCode`],
/// never an `Err`.
pub trait CompilerBackend {
    fn execute(&self, args: &[String], diagnostics: &mut dyn Write) -> Result<ExitCode, BuildError>;
}

/// Runs the compiler as a child process and blocks until it exits.
#[derive(Debug, Clone)]
pub struct ProcessCompiler {
    program: PathBuf,
    leading_args: Vec<OsString>,
}

impl ProcessCompiler {
    /// Launch through the `kotlinc` script.
    pub fn kotlinc(path: impl Into<PathBuf>) -> Self {
        Self {
            program: path.into(),
            leading_args: Vec::new(),
        }
    }

    /// Launch `K2JVMCompiler` from `kotlin-compiler.jar` on the given `java`.
    pub fn jvm(java: impl Into<PathBuf>, compiler_jar: &Path) -> Self {
        Self {
            program: java.into(),
            leading_args: vec![
                OsString::from("-cp"),
                compiler_jar.as_os_str().to_os_string(),
                OsString::from(K2JVM_COMPILER),
            ],
        }
    }

    pub fn from_toolchain(toolchain: &KotlinToolchain) -> Self {
        Self::kotlinc(toolchain.kotlinc_path.clone())
    }

    pub fn discover() -> Result<Self, BuildError> {
        toolchain::discover_kotlinc().map(|toolchain| Self::from_toolchain(&toolchain))
    }

    fn describe(&self) -> String {
        self.program.display().to_string()
    }
}

impl CompilerBackend for ProcessCompiler {
    fn execute(
        &self,
        args: &[String],
        diagnostics: &mut dyn Write,
    ) -> Result<ExitCode, BuildError> {
        debug!(program = %self.program.display(), args = args.len(), "launching compiler");

        let spawn_error = |error| BuildError::CompilerSpawn {
            command: self.describe(),
            source: error,
        };

        let mut child = Command::new(&self.program)
            .args(&self.leading_args)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_error)?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let forwarded = thread::scope(|scope| {
            let (sender, receiver) = mpsc::channel::<Vec<u8>>();
            if let Some(stdout) = stdout {
                let sender = sender.clone();
                scope.spawn(move || forward_lines(stdout, sender));
            }
            if let Some(stderr) = stderr {
                let sender = sender.clone();
                scope.spawn(move || forward_lines(stderr, sender));
            }
            drop(sender);

            // Keep draining after a failed write so the compiler never blocks
            // on a full pipe.
            let mut result = Ok(());
            for line in receiver {
                if result.is_ok() {
                    result = diagnostics.write_all(&line);
                }
            }
            result.and_then(|()| diagnostics.flush())
        });

        let status = child.wait().map_err(spawn_error)?;
        forwarded.map_err(BuildError::Diagnostics)?;

        let exit_code = ExitCode::from_status(status);
        debug!(?exit_code, "compiler exited");
        Ok(exit_code)
    }
}

fn forward_lines(stream: impl Read, sender: mpsc::Sender<Vec<u8>>) {
    let mut reader = BufReader::new(stream);
    loop {
        let mut line = Vec::new();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                if sender.send(line).is_err() {
                    break;
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    Unstarted,
    Staged,
    Running,
    Completed,
}

/// Unstarted → Staged → Running → Completed, each step exactly once.
#[derive(Debug)]
pub struct Invocation {
    state: InvocationState,
}

impl Default for Invocation {
    fn default() -> Self {
        Self::new()
    }
}

impl Invocation {
    pub fn new() -> Self {
        Self {
            state: InvocationState::Unstarted,
        }
    }

    pub fn state(&self) -> InvocationState {
        self.state
    }

    fn advance(
        &mut self,
        expected: InvocationState,
        next: InvocationState,
    ) -> Result<(), BuildError> {
        if self.state != expected {
            return Err(BuildError::InvalidState {
                expected,
                actual: self.state,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Write every source of `request` below its sources directory.
    pub fn stage(&mut self, request: &CompilationRequest) -> Result<Vec<PathBuf>, BuildError> {
        self.advance(InvocationState::Unstarted, InvocationState::Staged)?;

        let sources_dir = request.layout().sources_dir();
        fs::create_dir_all(&sources_dir).map_err(|error| BuildError::io(&sources_dir, error))?;
        let staged = request
            .sources()
            .iter()
            .map(|source| source.stage(&sources_dir))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(count = staged.len(), dir = %sources_dir.display(), "staged sources");
        Ok(staged)
    }

    /// Hand `args` to the compiler. A launch failure leaves the invocation
    /// in `Running`.
    pub fn execute(
        &mut self,
        backend: &dyn CompilerBackend,
        args: &[String],
        diagnostics: &mut dyn Write,
    ) -> Result<ExitCode, BuildError> {
        self.advance(InvocationState::Staged, InvocationState::Running)?;
        let exit_code = backend.execute(args, diagnostics)?;
        self.advance(InvocationState::Running, InvocationState::Completed)?;
        Ok(exit_code)
    }
}

/// One compilation request bound to a compiler backend.
///
/// Supporting archives are resolved on first use and memoized. Running the
/// same compilation again rewrites its working directory.
pub struct Compilation {
    request: CompilationRequest,
    resolver: Box<dyn ClasspathResolver>,
    archives: OnceCell<ResolvedArchives>,
    backend: Box<dyn CompilerBackend>,
    rules: FailureRules,
}

impl Compilation {
    pub fn new(request: CompilationRequest, backend: impl CompilerBackend + 'static) -> Self {
        Self {
            request,
            resolver: Box::new(HostClasspath::new()),
            archives: OnceCell::new(),
            backend: Box::new(backend),
            rules: FailureRules::default(),
        }
    }

    pub fn with_resolver(mut self, resolver: impl ClasspathResolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self.archives = OnceCell::new();
        self
    }

    pub fn with_rule(mut self, rule: impl FailureRule + 'static) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_rules(mut self, rules: FailureRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn request(&self) -> &CompilationRequest {
        &self.request
    }

    pub fn supporting_archives(&self) -> &ResolvedArchives {
        self.archives.get_or_init(|| {
            let options = self.request.options();
            ResolvedArchives::resolve(
                &options.archives,
                self.resolver.as_ref(),
                options.jdk_home.as_deref(),
            )
        })
    }

    pub fn resolved_classpath(&self) -> ResolvedClasspath {
        let options = self.request.options();
        let inherited = options
            .inherit_classpath
            .then(|| self.resolver.host_classpath());
        ResolvedClasspath::build(
            &options.classpaths,
            self.supporting_archives().classpath_entries(),
            inherited,
        )
    }

    /// kapt wiring, or `None` when the request has no services.
    pub fn kapt_config(&self) -> Result<Option<KaptConfig>, BuildError> {
        if !self.request.has_services() {
            return Ok(None);
        }

        let options = self.request.options();
        let layout = self.request.layout();
        let archives = self.supporting_archives();
        let inputs = KaptInputs {
            kapt_jar: archives.get(SupportingArchive::Kapt),
            tools_jar: archives.get(SupportingArchive::Tools),
            sources_dir: layout.kapt_sources_dir(),
            classes_dir: layout.kapt_classes_dir(),
            stubs_dir: layout.kapt_stubs_dir(),
            services_jar: layout.services_jar(),
            processor_classpath: &options.processor_classpath,
            correct_error_types: options.correct_error_types,
            ap_options: &options.kapt_options,
            javac_arguments: &options.kapt_javac_arguments,
        };
        KaptConfig::configure(&inputs).map(Some)
    }

    /// Compose arguments from whatever is currently staged.
    pub fn compose(&self) -> Result<Composition, BuildError> {
        let kapt = self.kapt_config()?;
        arguments::compose(&self.request, &self.resolved_classpath(), kapt.as_ref())
    }

    /// Run with diagnostics forwarded to stdout.
    pub fn run(&self) -> Result<CompilationResult, BuildError> {
        let stdout = io::stdout();
        let mut lock = stdout.lock();
        self.run_with_output(&mut lock)
    }

    pub fn run_with_output(&self, output: &mut dyn Write) -> Result<CompilationResult, BuildError> {
        let options = self.request.options();
        let layout = self.request.layout();

        // Everything that can be rejected is rejected before touching the disk.
        for source in self.request.sources() {
            source.validate()?;
        }
        let bindings = self.request.service_bindings();
        for binding in &bindings {
            binding.validate()?;
        }
        arguments::parse_plugin_options(&options.plugin_options)?;
        let kapt = self.kapt_config()?;
        let classpath = self.resolved_classpath();
        classpath.join()?;

        let mut invocation = Invocation::new();
        invocation.stage(&self.request)?;

        let classes_dir = layout.classes_dir();
        fs::create_dir_all(&classes_dir).map_err(|error| BuildError::io(&classes_dir, error))?;
        if !bindings.is_empty() {
            crate::services::package_services(&bindings, &layout.services_jar())?;
        }

        let composition = arguments::compose(&self.request, &classpath, kapt.as_ref())?;
        if options.verbose {
            // kapt and tools.jar only matter when annotation processing runs.
            let relevant = self
                .supporting_archives()
                .missing()
                .iter()
                .filter(|archive| archive.on_classpath() || self.request.has_services());
            for archive in relevant {
                let advisory = format!("Searched host classpath for {archive} and found no match");
                log_advisory(output, &advisory)?;
            }
        }
        for advisory in &composition.advisories {
            log_advisory(output, advisory)?;
        }

        let command_line = composition.arguments.to_command_line();
        info!(
            working_dir = %layout.root().display(),
            sources = self.request.sources().len(),
            "running compiler"
        );

        let mut tee = DiagnosticsTee::new(output);
        let exit_code = invocation.execute(self.backend.as_ref(), &command_line, &mut tee)?;
        let messages = tee.captured();

        let warnings = self.rules.apply(&FailureContext {
            exit_code,
            diagnostics: &messages,
            inherit_classpath: options.inherit_classpath,
        });
        for warning in &warnings {
            warn!("{warning}");
            writeln!(output, "warning: {warning}").map_err(BuildError::Diagnostics)?;
        }

        Ok(CompilationResult {
            exit_code,
            output_directory: classes_dir,
            messages,
            warnings,
        })
    }
}

fn log_advisory(output: &mut dyn Write, advisory: &str) -> Result<(), BuildError> {
    info!("{advisory}");
    writeln!(output, "logging: {advisory}").map_err(BuildError::Diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classpath::FixedClasspath;
    use crate::config::CompilerOptions;
    use crate::request::SourceFile;
    use crate::services::ServiceBinding;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Records the arguments it was given and replays canned output.
    #[derive(Clone)]
    struct ScriptedBackend {
        output: &'static str,
        exit_code: ExitCode,
        seen: Rc<RefCell<Vec<Vec<String>>>>,
    }

    impl ScriptedBackend {
        fn new(output: &'static str, exit_code: ExitCode) -> Self {
            Self {
                output,
                exit_code,
                seen: Rc::default(),
            }
        }
    }

    impl CompilerBackend for ScriptedBackend {
        fn execute(
            &self,
            args: &[String],
            diagnostics: &mut dyn Write,
        ) -> Result<ExitCode, BuildError> {
            self.seen.borrow_mut().push(args.to_vec());
            diagnostics
                .write_all(self.output.as_bytes())
                .map_err(BuildError::Diagnostics)?;
            Ok(self.exit_code)
        }
    }

    fn request(dir: &Path) -> CompilationRequest {
        CompilationRequest::new(dir).with_source(SourceFile::kotlin("Main", "fun main() {}\n"))
    }

    #[test]
    fn exit_codes_follow_compiler_status() {
        assert_eq!(ExitCode::from_code(Some(0)), ExitCode::Ok);
        assert_eq!(ExitCode::from_code(Some(1)), ExitCode::CompilationError);
        assert_eq!(ExitCode::from_code(Some(2)), ExitCode::InternalError);
        assert_eq!(ExitCode::from_code(Some(3)), ExitCode::ScriptExecutionError);
        assert_eq!(ExitCode::from_code(Some(137)), ExitCode::Failure(Some(137)));
        assert_eq!(ExitCode::from_code(None), ExitCode::Failure(None));
        assert_eq!(ExitCode::Failure(None).process_code(), -1);
    }

    #[test]
    fn invocation_rejects_out_of_order_steps() {
        let dir = tempfile::tempdir().expect("temp dir");
        let backend = ScriptedBackend::new("", ExitCode::Ok);
        let mut invocation = Invocation::new();

        let error = invocation
            .execute(&backend, &[], &mut io::sink())
            .expect_err("cannot run before staging");
        assert!(matches!(
            error,
            BuildError::InvalidState {
                expected: InvocationState::Staged,
                actual: InvocationState::Unstarted,
            }
        ));

        invocation.stage(&request(dir.path())).unwrap();
        assert_eq!(invocation.state(), InvocationState::Staged);
        assert!(invocation.stage(&request(dir.path())).is_err());

        invocation.execute(&backend, &[], &mut io::sink()).unwrap();
        assert_eq!(invocation.state(), InvocationState::Completed);
    }

    #[test]
    fn run_forwards_messages_and_advisories() {
        let dir = tempfile::tempdir().expect("temp dir");
        let backend = ScriptedBackend::new(
            "e: Main.kt:1:5 Unresolved reference: foo\n",
            ExitCode::CompilationError,
        );
        let compilation = Compilation::new(request(dir.path()), backend.clone())
            .with_resolver(FixedClasspath::default());

        let mut output = Vec::new();
        let result = compilation.run_with_output(&mut output).unwrap();
        let printed = String::from_utf8(output).unwrap();

        assert_eq!(result.exit_code, ExitCode::CompilationError);
        assert_eq!(result.messages, "e: Main.kt:1:5 Unresolved reference: foo\n");
        assert_eq!(result.output_directory, dir.path().join("classes"));
        assert!(result.warnings.is_empty());
        assert!(printed.contains("logging: No services were given."));
        assert!(printed.contains("logging: Searched host classpath for kotlin-stdlib"));
        assert!(!printed.contains("for kotlin-annotation-processing"));
        assert!(!printed.contains("for tools.jar"));
        assert!(printed.ends_with("e: Main.kt:1:5 Unresolved reference: foo\n"));

        let seen = backend.seen.borrow();
        assert_eq!(seen.len(), 1);
        let main = dir.path().join("sources/Main.kt");
        assert_eq!(seen[0].last().map(String::as_str), main.to_str());
    }

    #[test]
    fn processing_runs_report_missing_plugin_archives() {
        let dir = tempfile::tempdir().expect("temp dir");
        let request = request(dir.path())
            .with_service(ServiceBinding::new("com.example.Api", "com.example.ApiImpl"));
        let compilation = Compilation::new(request, ScriptedBackend::new("", ExitCode::Ok))
            .with_resolver(FixedClasspath::new(["/lib/kotlin-annotation-processing.jar"]));

        let mut output = Vec::new();
        let result = compilation.run_with_output(&mut output).unwrap();
        let printed = String::from_utf8(output).unwrap();

        assert_eq!(result.exit_code, ExitCode::Ok);
        assert!(printed.contains("logging: Searched host classpath for tools.jar"));
        assert!(!printed.contains("for kotlin-annotation-processing"));
    }

    #[test]
    fn known_failure_adds_warning_without_changing_exit_code() {
        let dir = tempfile::tempdir().expect("temp dir");
        let backend = ScriptedBackend::new(
            "exception: java.lang.IllegalArgumentException: No enum constant com.sun.tools.javac.main.Option.BOOT_CLASS_PATH\n",
            ExitCode::InternalError,
        );
        let request = request(dir.path())
            .with_options(CompilerOptions::default().quiet().with_inherited_classpath());
        let compilation =
            Compilation::new(request, backend).with_resolver(FixedClasspath::default());

        let mut output = Vec::new();
        let result = compilation.run_with_output(&mut output).unwrap();
        let printed = String::from_utf8(output).unwrap();

        assert_eq!(result.exit_code, ExitCode::InternalError);
        assert_eq!(result.warnings.len(), 1);
        assert!(printed.contains("warning: The compiler reported an internal error"));
        assert!(printed.contains("host classpath is inherited"));
        assert!(!printed.contains("logging:"));
    }

    #[test]
    fn failure_rules_can_be_replaced() {
        let dir = tempfile::tempdir().expect("temp dir");
        let backend = ScriptedBackend::new(
            "No enum constant com.sun.tools.javac.main.Option.BOOT_CLASS_PATH\n",
            ExitCode::InternalError,
        );
        let compilation = Compilation::new(request(dir.path()), backend)
            .with_resolver(FixedClasspath::default())
            .with_rules(FailureRules::empty());

        let result = compilation.run_with_output(&mut io::sink()).unwrap();
        assert_eq!(result.exit_code, ExitCode::InternalError);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn supporting_archives_resolve_once() {
        struct CountingResolver {
            entries: Vec<PathBuf>,
            calls: Rc<RefCell<usize>>,
        }
        impl ClasspathResolver for CountingResolver {
            fn host_classpath(&self) -> &[PathBuf] {
                *self.calls.borrow_mut() += 1;
                &self.entries
            }
        }

        let calls = Rc::new(RefCell::new(0));
        let resolver = CountingResolver {
            entries: vec![PathBuf::from("/host/kotlin-stdlib.jar")],
            calls: Rc::clone(&calls),
        };
        let compilation = Compilation::new(
            CompilationRequest::new("/work"),
            ScriptedBackend::new("", ExitCode::Ok),
        )
        .with_resolver(resolver);

        assert_eq!(*calls.borrow(), 0);
        let first = compilation.supporting_archives().classpath_entries();
        let after_first = *calls.borrow();
        let second = compilation.supporting_archives().classpath_entries();

        assert_eq!(first, vec![PathBuf::from("/host/kotlin-stdlib.jar")]);
        assert_eq!(first, second);
        assert_eq!(*calls.borrow(), after_first);
    }

    #[cfg(unix)]
    #[test]
    fn process_compiler_reports_missing_program() {
        let compiler = ProcessCompiler::kotlinc("/nonexistent/kct/kotlinc");
        let error = compiler
            .execute(&[], &mut io::sink())
            .expect_err("missing compiler must not run");
        assert!(matches!(error, BuildError::CompilerSpawn { .. }));
    }
}
