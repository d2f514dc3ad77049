use std::fmt;
use thiserror::Error;

use crate::core::deploy::DeployFailure;
use crate::core::topology::TopologyError;

/// Core error types for podfw
#[derive(Debug, Error)]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Caller-supplied policy data failed validation; carries every issue found
    #[error("{0}")]
    Validation(ValidationReport),

    /// The document could not be assembled from the validated policy
    #[error("Assembly error: {0}")]
    Assembly(String),

    /// Node topology could not be resolved
    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),

    /// A remote step failed on one of the nodes
    #[error("{0}")]
    Deploy(Box<DeployFailure>),

    /// Internal logic error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Exit status when a node could not be reached at all
pub const EXIT_UNREACHABLE: u8 = 3;

impl Error {
    /// Process exit status for this error
    pub fn exit_status(&self) -> u8 {
        match self {
            Self::Deploy(failure) if failure.is_channel() => EXIT_UNREACHABLE,
            _ => 1,
        }
    }
}

impl From<Box<DeployFailure>> for Error {
    fn from(failure: Box<DeployFailure>) -> Self {
        Self::Deploy(failure)
    }
}

impl From<ValidationReport> for Error {
    fn from(report: ValidationReport) -> Self {
        Self::Validation(report)
    }
}

/// Category of a single validation issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
pub enum IssueKind {
    /// Structural or semantic defect in one object
    #[strum(serialize = "invalid")]
    Invalid,
    /// Two sets share a name
    #[strum(serialize = "duplicate")]
    Duplicate,
    /// A rule references a set that is missing or of the wrong type
    #[strum(serialize = "cross-reference")]
    CrossReference,
}

/// One defect found while validating a policy batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Which object the issue belongs to, e.g. `rule[2]` or `set "web"`
    pub subject: String,
    pub kind: IssueKind,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(subject: impl Into<String>, kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.subject, self.kind, self.message)
    }
}

/// Every issue found in one validation pass, in discovery order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    /// Records every message from a single object validator against `subject`.
    pub fn extend_invalid(&mut self, subject: &str, messages: Vec<String>) {
        self.issues.extend(
            messages
                .into_iter()
                .map(|message| ValidationIssue::new(subject, IssueKind::Invalid, message)),
        );
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn count(&self, kind: IssueKind) -> usize {
        self.issues.iter().filter(|i| i.kind == kind).count()
    }

    /// Converts into `Err` when any issue was recorded.
    pub fn into_result(self) -> std::result::Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Policy validation failed with {} issue(s):", self.issues.len())?;
        for issue in &self.issues {
            writeln!(f, "  - {issue}")?;
        }
        Ok(())
    }
}

/// Represents a translated error with helpful context
#[derive(Debug, Clone)]
pub struct ErrorTranslation {
    pub user_message: String,
    pub suggestions: Vec<String>,
    pub help_url: Option<String>,
}

impl ErrorTranslation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            user_message: message.into(),
            suggestions: Vec::new(),
            help_url: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_help(mut self, url: impl Into<String>) -> Self {
        self.help_url = Some(url.into());
        self
    }
}

/// Database of remote nftables error patterns and their translations
pub struct NftablesErrorPattern;

impl NftablesErrorPattern {
    /// Matches remote stderr against known patterns and returns an operator-facing translation.
    pub fn match_error(msg: &str) -> ErrorTranslation {
        let lower = msg.to_lowercase();

        // Namespace missing on the node
        if lower.contains("cannot open network namespace") {
            return ErrorTranslation::new("Network namespace does not exist on this node")
                .with_suggestion("List namespaces on the node: ip netns list")
                .with_suggestion("Create the namespace before building its firewall")
                .with_help("https://man7.org/linux/man-pages/man8/ip-netns.8.html");
        }

        if lower.contains("permission denied") || lower.contains("operation not permitted") {
            return ErrorTranslation::new("Insufficient permissions to modify firewall rules")
                .with_suggestion("The remote user needs root or CAP_NET_ADMIN inside the namespace")
                .with_suggestion("Check the ssh_user setting in the podfw config")
                .with_help("https://wiki.nftables.org/wiki-nftables/index.php/Quick_reference-nftables_in_10_minutes");
        }

        if lower.contains("no such file") || lower.contains("command not found") {
            return ErrorTranslation::new("nftables or the staged config is missing on this node")
                .with_suggestion("Install nftables on the node: apt install nftables")
                .with_suggestion("Check that the temp_dir setting points at a writable directory")
                .with_help("https://wiki.nftables.org/wiki-nftables/index.php/Main_Page");
        }

        if lower.contains("could not process rule") || lower.contains("syntax error") {
            return ErrorTranslation::new("Invalid firewall rule syntax")
                .with_suggestion("Render the document locally with `podfw render` and inspect the failing line")
                .with_suggestion("Verify port numbers are between 1 and 65535")
                .with_suggestion("Ensure IP addresses and network masks are valid")
                .with_help(
                    "https://wiki.nftables.org/wiki-nftables/index.php/Simple_rule_management",
                );
        }

        if lower.contains("table") && lower.contains("does not exist") {
            return ErrorTranslation::new("Firewall table does not exist")
                .with_suggestion("The table may have been scrubbed already")
                .with_suggestion("Run a build to create the table")
                .with_help("https://wiki.nftables.org/wiki-nftables/index.php/Configuring_tables");
        }

        if lower.contains("set") && lower.contains("does not exist") {
            return ErrorTranslation::new("Referenced set is not declared in the table")
                .with_suggestion("Every @name used by a rule must be supplied in the sets list");
        }

        if lower.contains("interval") && lower.contains("overlap") {
            return ErrorTranslation::new("Set elements overlap")
                .with_suggestion("Remove elements already covered by a wider network or port range");
        }

        if lower.contains("resource busy") || lower.contains("device or resource busy") {
            return ErrorTranslation::new("Firewall resource is busy")
                .with_suggestion("Another process may be modifying the same table")
                .with_suggestion("Wait a moment and retry the build");
        }

        if lower.contains("netlink") {
            return ErrorTranslation::new("Communication error with kernel netlink interface")
                .with_suggestion("Check kernel modules on the node: lsmod | grep nf_tables")
                .with_suggestion("Load nf_tables module: modprobe nf_tables")
                .with_help("https://wiki.nftables.org/wiki-nftables/index.php/Troubleshooting");
        }

        // Generic fallback
        ErrorTranslation::new(format!("Firewall error: {msg}"))
            .with_suggestion("Check the detailed error output above")
            .with_help("https://wiki.nftables.org/wiki-nftables/index.php/Troubleshooting")
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_namespace() {
        let translation =
            NftablesErrorPattern::match_error("Cannot open network namespace \"ns1\": No such file");
        assert!(translation.user_message.contains("namespace"));
        assert!(translation.suggestions.iter().any(|s| s.contains("ip netns")));
    }

    #[test]
    fn test_syntax_error() {
        let translation = NftablesErrorPattern::match_error("could not process rule: syntax error");
        assert!(translation.user_message.contains("Invalid"));
        assert!(
            translation
                .suggestions
                .iter()
                .any(|s| s.contains("podfw render"))
        );
    }

    #[test]
    fn test_netlink_error() {
        let translation = NftablesErrorPattern::match_error("netlink error occurred");
        assert!(translation.user_message.contains("netlink"));
        assert!(translation.help_url.is_some());
    }

    #[test]
    fn test_generic_fallback_keeps_message() {
        let translation = NftablesErrorPattern::match_error("something odd");
        assert!(translation.user_message.contains("something odd"));
    }

    #[test]
    fn test_report_counts_by_kind() {
        let mut report = ValidationReport::new();
        report.extend_invalid("rule[0]", vec!["a".into(), "b".into()]);
        report.push(ValidationIssue::new(
            "rule[1]",
            IssueKind::CrossReference,
            "web not found in the supplied sets",
        ));

        assert_eq!(report.len(), 3);
        assert_eq!(report.count(IssueKind::Invalid), 2);
        assert_eq!(report.count(IssueKind::CrossReference), 1);

        let text = report.to_string();
        assert!(text.contains("3 issue(s)"));
        assert!(text.contains("rule[1] (cross-reference): web not found"));
        assert!(report.into_result().is_err());
    }

    #[test]
    fn test_empty_report_is_ok() {
        assert!(ValidationReport::new().into_result().is_ok());
    }
}
