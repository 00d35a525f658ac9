use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// One finding of a pipeline run, naming the declarations involved
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub subjects: Vec<String>,
    pub reason: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{}: {}", label, self.reason)
    }
}

/// Warnings collected along the pipeline, and the error that stopped it
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    pub warnings: Vec<Diagnostic>,
    pub errors: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, subjects: Vec<String>, reason: impl Into<String>) {
        self.warnings.push(Diagnostic {
            severity: Severity::Warning,
            subjects,
            reason: reason.into(),
        });
    }

    pub fn error(&mut self, subjects: Vec<String>, reason: impl Into<String>) {
        self.errors.push(Diagnostic {
            severity: Severity::Error,
            subjects,
            reason: reason.into(),
        });
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty() && self.errors.is_empty()
    }
}
