use crate::config::{ArchiveSelection, SupportingArchives};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};

/// Optional `-1.9.22`, `-2.0.0-RC1` style suffix.
const VERSION: &str = r"(-[0-9]+(\.[0-9]+)*(-[A-Za-z0-9.]+)?)?";

static STDLIB: Lazy<Regex> = Lazy::new(|| archive_regex(r"(kotlin-stdlib|kotlin-runtime)"));
static STDLIB_JDK: Lazy<Regex> = Lazy::new(|| archive_regex(r"kotlin-stdlib-jdk[0-9]+"));
static STDLIB_COMMON: Lazy<Regex> = Lazy::new(|| archive_regex(r"kotlin-stdlib-common"));
static REFLECT: Lazy<Regex> = Lazy::new(|| archive_regex(r"kotlin-reflect"));
static SCRIPT_RUNTIME: Lazy<Regex> = Lazy::new(|| archive_regex(r"kotlin-script-runtime"));
static KAPT: Lazy<Regex> =
    Lazy::new(|| archive_regex(r"kotlin-annotation-processing(-embeddable)?"));
static TOOLS: Lazy<Regex> = Lazy::new(|| archive_regex(r"tools"));

fn archive_regex(stem: &str) -> Regex {
    Regex::new(&format!(r"^{stem}{VERSION}\.jar$")).expect("archive pattern is a valid regex")
}

/// Archives the composer may need besides the caller's own classpath.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SupportingArchive {
    Stdlib,
    StdlibCommon,
    StdlibJdk,
    Reflect,
    ScriptRuntime,
    /// The kapt compiler plugin.
    Kapt,
    /// JDK 8 `tools.jar`, which kapt needs for javac internals.
    Tools,
}

impl SupportingArchive {
    /// Classpath archives in the order they are placed on the classpath,
    /// followed by the plugin archives.
    pub const ALL: [SupportingArchive; 7] = [
        SupportingArchive::Stdlib,
        SupportingArchive::StdlibCommon,
        SupportingArchive::StdlibJdk,
        SupportingArchive::Reflect,
        SupportingArchive::ScriptRuntime,
        SupportingArchive::Kapt,
        SupportingArchive::Tools,
    ];

    pub fn pattern(self) -> &'static Regex {
        match self {
            SupportingArchive::Stdlib => &STDLIB,
            SupportingArchive::StdlibCommon => &STDLIB_COMMON,
            SupportingArchive::StdlibJdk => &STDLIB_JDK,
            SupportingArchive::Reflect => &REFLECT,
            SupportingArchive::ScriptRuntime => &SCRIPT_RUNTIME,
            SupportingArchive::Kapt => &KAPT,
            SupportingArchive::Tools => &TOOLS,
        }
    }

    /// Whether the archive belongs on the compile classpath, as opposed to the
    /// plugin classpath.
    pub fn on_classpath(self) -> bool {
        !matches!(self, SupportingArchive::Kapt | SupportingArchive::Tools)
    }

    pub fn selection(self, archives: &SupportingArchives) -> &ArchiveSelection {
        match self {
            SupportingArchive::Stdlib => &archives.stdlib,
            SupportingArchive::StdlibCommon => &archives.stdlib_common,
            SupportingArchive::StdlibJdk => &archives.stdlib_jdk,
            SupportingArchive::Reflect => &archives.reflect,
            SupportingArchive::ScriptRuntime => &archives.script_runtime,
            SupportingArchive::Kapt => &archives.kapt,
            SupportingArchive::Tools => &archives.tools,
        }
    }

    pub fn locate_in(self, candidates: &[PathBuf]) -> Option<PathBuf> {
        locate(candidates, self.pattern())
    }
}

impl fmt::Display for SupportingArchive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SupportingArchive::Stdlib => "kotlin-stdlib",
            SupportingArchive::StdlibCommon => "kotlin-stdlib-common",
            SupportingArchive::StdlibJdk => "kotlin-stdlib-jdk",
            SupportingArchive::Reflect => "kotlin-reflect",
            SupportingArchive::ScriptRuntime => "kotlin-script-runtime",
            SupportingArchive::Kapt => "kotlin-annotation-processing",
            SupportingArchive::Tools => "tools.jar",
        };
        f.write_str(label)
    }
}

/// First candidate whose file name matches `pattern`.
///
/// Only the name is checked; the archive's contents are never opened.
pub fn locate(candidates: &[PathBuf], pattern: &Regex) -> Option<PathBuf> {
    candidates
        .iter()
        .find(|candidate| file_name_matches(candidate, pattern))
        .cloned()
}

fn file_name_matches(path: &Path, pattern: &Regex) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| pattern.is_match(name))
        .unwrap_or(false)
}
