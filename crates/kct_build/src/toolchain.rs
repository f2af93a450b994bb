use crate::BuildError;
use std::env;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// A Kotlin compiler distribution (`bin/kotlinc`, `lib/*.jar`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KotlinToolchain {
    pub kotlinc_path: PathBuf,
    pub kotlin_home: PathBuf,
}

impl KotlinToolchain {
    /// Toolchain rooted at an explicit distribution directory.
    pub fn from_home(kotlin_home: impl Into<PathBuf>) -> Result<Self, BuildError> {
        let kotlin_home = kotlin_home.into();
        let kotlinc_path = kotlinc_from_home(&kotlin_home).ok_or_else(|| {
            BuildError::CompilerNotFound(format!(
                "'{}' does not contain bin/{}",
                kotlin_home.display(),
                kotlinc_executable()
            ))
        })?;
        Ok(Self {
            kotlinc_path,
            kotlin_home,
        })
    }

    pub fn lib_dir(&self) -> PathBuf {
        self.kotlin_home.join("lib")
    }

    /// `lib/kotlin-compiler.jar`, for launching the compiler on a JVM directly.
    pub fn compiler_jar(&self) -> PathBuf {
        self.lib_dir().join("kotlin-compiler.jar")
    }

    /// Run `kotlinc -version` and extract the compiler version.
    pub fn version(&self) -> Result<String, BuildError> {
        let output = Command::new(&self.kotlinc_path)
            .arg("-version")
            .output()
            .map_err(|error| BuildError::CompilerSpawn {
                command: format!("{} -version", self.kotlinc_path.display()),
                source: error,
            })?;

        let mut version_output = String::from_utf8_lossy(&output.stderr).to_string();
        if version_output.trim().is_empty() {
            version_output = String::from_utf8_lossy(&output.stdout).to_string();
        }

        parse_kotlinc_version(&version_output)
            .map(str::to_string)
            .ok_or_else(|| {
                BuildError::CompilerNotFound(format!(
                    "unrecognised version output from '{}': {}",
                    self.kotlinc_path.display(),
                    version_output.trim()
                ))
            })
    }
}

pub fn discover_kotlinc() -> Result<KotlinToolchain, BuildError> {
    let kotlinc_path = find_kotlinc().ok_or_else(|| {
        BuildError::CompilerNotFound(
            "Unable to locate 'kotlinc'. Set KOTLIN_HOME or put kotlinc on PATH.".into(),
        )
    })?;

    let kotlin_home = kotlin_home_from_kotlinc(&kotlinc_path).ok_or_else(|| {
        BuildError::CompilerNotFound(format!(
            "Failed to derive KOTLIN_HOME from '{}'",
            kotlinc_path.display()
        ))
    })?;

    Ok(KotlinToolchain {
        kotlinc_path,
        kotlin_home,
    })
}

fn find_kotlinc() -> Option<PathBuf> {
    find_kotlinc_from_env()
        .or_else(find_kotlinc_in_path)
        .or_else(search_known_installations)
}

fn find_kotlinc_from_env() -> Option<PathBuf> {
    let home = env::var_os("KOTLIN_HOME")?;
    kotlinc_from_home(Path::new(&home))
}

fn find_kotlinc_in_path() -> Option<PathBuf> {
    let found = which::which(kotlinc_executable()).ok()?;
    // Package managers link bin/kotlinc into a shared bin directory.
    Some(fs::canonicalize(&found).unwrap_or(found))
}

fn search_known_installations() -> Option<PathBuf> {
    known_kotlin_roots()
        .iter()
        .find_map(|root| search_root_for_kotlinc(root))
}

fn known_kotlin_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();

    if let Some(home) = env::var_os("HOME").or_else(|| env::var_os("USERPROFILE")) {
        roots.push(
            PathBuf::from(home)
                .join(".sdkman")
                .join("candidates")
                .join("kotlin")
                .join("current"),
        );
    }

    #[cfg(target_os = "windows")]
    {
        roots.push(PathBuf::from(r"C:\kotlinc"));
        if let Some(dir) = env::var_os("ProgramFiles").map(PathBuf::from) {
            roots.push(dir.join("kotlinc"));
            roots.push(dir.join("JetBrains"));
        }
    }

    #[cfg(target_os = "macos")]
    {
        roots.push(PathBuf::from("/opt/homebrew/opt/kotlin/libexec"));
        roots.push(PathBuf::from("/usr/local/opt/kotlin/libexec"));
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    {
        roots.push(PathBuf::from("/usr/share/kotlin"));
        roots.push(PathBuf::from("/usr/lib/kotlin"));
        roots.push(PathBuf::from("/opt/kotlinc"));
        roots.push(PathBuf::from("/opt/kotlin"));
        roots.push(PathBuf::from("/snap/kotlin/current"));
    }

    roots
}

fn search_root_for_kotlinc(root: &Path) -> Option<PathBuf> {
    if !root.is_dir() {
        return None;
    }

    if let Some(kotlinc) = kotlinc_from_home(root) {
        return Some(kotlinc);
    }

    let entries = fs::read_dir(root).ok()?;
    entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .find_map(|candidate| kotlinc_from_home(&candidate))
}

fn kotlinc_from_home(home: &Path) -> Option<PathBuf> {
    let exe_name = kotlinc_executable();

    let candidate = home.join("bin").join(exe_name);
    if candidate.is_file() {
        return Some(candidate);
    }

    if home.ends_with("bin") {
        let candidate = home.join(exe_name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    if home.file_name() == Some(OsStr::new(exe_name)) && home.is_file() {
        return Some(home.to_path_buf());
    }

    None
}

fn kotlin_home_from_kotlinc(kotlinc_path: &Path) -> Option<PathBuf> {
    let bin_dir = kotlinc_path.parent()?;
    let home = bin_dir.parent()?;
    home.join("lib").is_dir().then(|| home.to_path_buf())
}

/// `info: kotlinc-jvm 1.9.22 (JRE 17.0.9+9)` -> `1.9.22`
fn parse_kotlinc_version(output: &str) -> Option<&str> {
    output.lines().find_map(|line| {
        let (_, rest) = line.split_once("kotlinc-jvm ")?;
        let token = rest.split_whitespace().next()?;
        token
            .starts_with(|ch: char| ch.is_ascii_digit())
            .then_some(token)
    })
}

/// JDK home from `JAVA_HOME`/`JDK_HOME`, else the JDK owning `java` on `PATH`.
pub fn detect_java_home() -> Option<PathBuf> {
    for var in ["JAVA_HOME", "JDK_HOME"] {
        if let Some(value) = env::var_os(var) {
            let home = PathBuf::from(value);
            if home.join("bin").join(java_executable()).is_file() {
                return Some(home);
            }
        }
    }

    let java = which::which(java_executable()).ok()?;
    let java = fs::canonicalize(&java).unwrap_or(java);
    let home = java.parent()?.parent()?;
    home.join("lib").is_dir().then(|| home.to_path_buf())
}

pub(crate) fn java_executable() -> &'static str {
    if cfg!(windows) { "java.exe" } else { "java" }
}

fn kotlinc_executable() -> &'static str {
    if cfg!(windows) { "kotlinc.bat" } else { "kotlinc" }
}
