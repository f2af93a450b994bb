use super::ExitCode;
use std::io::{self, Write};

/// Forwards compiler output to the caller's stream and keeps a copy.
pub struct DiagnosticsTee<'a> {
    sink: &'a mut dyn Write,
    captured: Vec<u8>,
}

impl<'a> DiagnosticsTee<'a> {
    pub fn new(sink: &'a mut dyn Write) -> Self {
        Self {
            sink,
            captured: Vec::new(),
        }
    }

    pub fn captured(&self) -> String {
        String::from_utf8_lossy(&self.captured).into_owned()
    }
}

impl Write for DiagnosticsTee<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sink.write_all(buf)?;
        self.captured.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}

/// What a [`FailureRule`] gets to look at once the compiler has returned.
#[derive(Debug, Clone, Copy)]
pub struct FailureContext<'a> {
    pub exit_code: ExitCode,
    /// Everything the compiler printed.
    pub diagnostics: &'a str,
    pub inherit_classpath: bool,
}

/// Recognises a known failure from its diagnostics and explains it.
///
/// Rules only add warnings; they never change the exit classification.
pub trait FailureRule {
    fn inspect(&self, context: &FailureContext<'_>) -> Option<String>;
}

/// Internal error raised when a JDK 8 `tools.jar` meets the javac of JDK 9+.
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyToolsJarRule;

impl LegacyToolsJarRule {
    pub const SIGNATURE: &'static str =
        "No enum constant com.sun.tools.javac.main.Option.BOOT_CLASS_PATH";
}

impl FailureRule for LegacyToolsJarRule {
    fn inspect(&self, context: &FailureContext<'_>) -> Option<String> {
        if context.exit_code != ExitCode::InternalError
            || !context.diagnostics.contains(Self::SIGNATURE)
        {
            return None;
        }

        let mut warning = String::from(
            "The compiler reported an internal error that is most likely caused by a tools.jar \
             from JDK 8 or earlier being used together with JDK 9 or later.",
        );
        if context.inherit_classpath {
            warning.push_str(
                " The host classpath is inherited: make sure it does not contain a tools.jar \
                 or an unwanted JDK.",
            );
        }
        Some(warning)
    }
}

/// Ordered set of failure rules applied after every compilation.
pub struct FailureRules {
    rules: Vec<Box<dyn FailureRule>>,
}

impl FailureRules {
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn push(&mut self, rule: impl FailureRule + 'static) {
        self.rules.push(Box::new(rule));
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn apply(&self, context: &FailureContext<'_>) -> Vec<String> {
        self.rules
            .iter()
            .filter_map(|rule| rule.inspect(context))
            .collect()
    }
}

impl Default for FailureRules {
    fn default() -> Self {
        let mut rules = Self::empty();
        rules.push(LegacyToolsJarRule);
        rules
    }
}
