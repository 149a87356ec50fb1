#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// An equation atom matched none of the leaf grammar rules.
    MalformedLeaf,
    /// Neither the literal variable nor a checkbox column exists.
    UnresolvedVariable,
    /// A question id has no column in the respondent table.
    AbsentQuestion,
    /// A banner column matched zero respondents.
    EmptyBase,
}

impl IssueKind {
    #[must_use]
    pub fn severity(self) -> Severity {
        match self {
            Self::MalformedLeaf | Self::UnresolvedVariable | Self::AbsentQuestion => {
                Severity::Warning
            }
            Self::EmptyBase => Severity::Info,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: IssueKind,
    pub subject: String,
    pub detail: String,
}

impl Diagnostic {
    pub fn new(kind: IssueKind, subject: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            subject: subject.into(),
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn severity(&self) -> Severity {
        self.kind.severity()
    }

    #[must_use]
    pub fn render_plain(&self) -> String {
        let level = match self.severity() {
            Severity::Info => "info",
            Severity::Warning => "warning",
        };
        format!("{level}[{:?}] {}: {}", self.kind, self.subject, self.detail)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_plain())
    }
}

/// Append-only record of everything evaluation degraded around.
///
/// Identical diagnostics are kept once, in first-seen order.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticLedger {
    records: Vec<Diagnostic>,
}

impl DiagnosticLedger {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        if !self.records.contains(&diagnostic) {
            self.records.push(diagnostic);
        }
    }

    pub fn record(
        &mut self,
        kind: IssueKind,
        subject: impl Into<String>,
        detail: impl Into<String>,
    ) {
        self.push(Diagnostic::new(kind, subject, detail));
    }

    #[must_use]
    pub fn records(&self) -> &[Diagnostic] {
        &self.records
    }

    pub fn of_kind(&self, kind: IssueKind) -> impl Iterator<Item = &Diagnostic> {
        self.records.iter().filter(move |d| d.kind == kind)
    }

    #[must_use]
    pub fn has_warnings(&self) -> bool {
        self.records
            .iter()
            .any(|d| d.severity() == Severity::Warning)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }
}
