//! Two-node deployment of a table document
//!
//! A build runs the same step sequence on the enabled node and then on the
//! disabled node:
//!
//! ```text
//! Idle -> WritingConfig -> ValidatingSyntax -> ResolvingExistingTable
//!      -> [Flushing, only if the table exists] -> Applying -> CleaningUp -> Done
//! ```
//!
//! Any failing step moves the node to `Failed` and stops the whole
//! operation. The candidate is syntax-checked before the running table is
//! touched, so a bad document never replaces a good one. Nothing is retried
//! and nothing is rolled back.
//!
//! Every successful step is appended to a [`StepLog`] together with its raw
//! remote output. The log is passed by value from the first node into the
//! second, so a failure on the disabled node still reports what succeeded on
//! the enabled one.
//!
//! Scrub (resolve, then delete if present) and read (list the table) use the
//! same node order and command plan.

use std::collections::BTreeMap;
use std::fmt::{self, Write};
use std::path::Path;
use tracing::{error, info, warn};

use crate::core::assemble::Document;
use crate::core::error::{NftablesErrorPattern, Result};
use crate::core::policy::Target;
use crate::core::topology::{Node, Topology};
use crate::core::verify::parse_nft_errors;
use crate::remote::{ChannelFailure, CommandOutput, RemoteExecutor, shell_quote};
use crate::utils::line_diff;

const HEREDOC_MARKER: &str = "PODFW_EOF";

/// Remote step of an operation
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr, strum::EnumIter,
)]
#[strum(serialize_all = "kebab-case")]
pub enum Step {
    WritingConfig,
    ValidatingSyntax,
    ResolvingExistingTable,
    Flushing,
    Applying,
    CleaningUp,
    ReadingTable,
}

/// Operation run against the node pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Operation {
    Build,
    Scrub,
    Read,
}

impl Operation {
    pub const fn first_step(self) -> Step {
        match self {
            Operation::Build => Step::WritingConfig,
            Operation::Scrub => Step::ResolvingExistingTable,
            Operation::Read => Step::ReadingTable,
        }
    }

    /// Step that follows a successful `step`, or `None` when the node is done.
    ///
    /// `table_exists` is the outcome of [`Step::ResolvingExistingTable`].
    pub const fn next_step(self, step: Step, table_exists: bool) -> Option<Step> {
        match (self, step) {
            (Operation::Build, Step::WritingConfig) => Some(Step::ValidatingSyntax),
            (Operation::Build, Step::ValidatingSyntax) => Some(Step::ResolvingExistingTable),
            (Operation::Build | Operation::Scrub, Step::ResolvingExistingTable) if table_exists => {
                Some(Step::Flushing)
            }
            (Operation::Build, Step::ResolvingExistingTable | Step::Flushing) => {
                Some(Step::Applying)
            }
            (Operation::Build, Step::Applying) => Some(Step::CleaningUp),
            _ => None,
        }
    }
}

/// Shell commands for one target, shared by both nodes
#[derive(Debug, Clone)]
pub struct CommandPlan<'a> {
    target: &'a Target,
    document: Option<&'a Document>,
    config_path: String,
}

impl<'a> CommandPlan<'a> {
    /// `document` is only needed by operations that write one.
    pub fn new(target: &'a Target, temp_dir: &Path, document: Option<&'a Document>) -> Self {
        let config_path = temp_dir
            .join(format!("podfw_{}_{}.nft", target.namespace, target.table))
            .display()
            .to_string();
        Self {
            target,
            document,
            config_path,
        }
    }

    /// Node-local path the candidate document is staged at
    pub fn config_path(&self) -> &str {
        &self.config_path
    }

    fn nft(&self) -> String {
        format!("ip netns exec {} nft", self.target.namespace)
    }

    pub fn command(&self, step: Step) -> String {
        let path = shell_quote(&self.config_path);
        let table = &self.target.table;

        match step {
            Step::WritingConfig => {
                let text = self.document.map_or("", Document::as_str);
                let newline = if text.ends_with('\n') { "" } else { "\n" };
                format!("cat > {path} <<'{HEREDOC_MARKER}'\n{text}{newline}{HEREDOC_MARKER}\n")
            }
            Step::ValidatingSyntax => format!("{} --check --file {path}", self.nft()),
            Step::ResolvingExistingTable => format!(
                "{} list tables | grep -qxF {}",
                self.nft(),
                shell_quote(&format!("table inet {table}"))
            ),
            Step::Flushing => format!("{} delete table inet {table}", self.nft()),
            Step::Applying => format!("{} --file {path}", self.nft()),
            Step::CleaningUp => format!("rm --force {path}"),
            Step::ReadingTable => format!("{} list table inet {table}", self.nft()),
        }
    }
}

/// One successful step on one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    pub node: Node,
    pub step: Step,
    pub output: CommandOutput,
}

/// Successful steps of one operation across both nodes, in execution order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepLog {
    records: Vec<StepRecord>,
}

impl StepLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, node: &Node, step: Step, output: CommandOutput) {
        self.records.push(StepRecord {
            node: node.clone(),
            step,
            output,
        });
    }

    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of times `step` succeeded, on any node
    pub fn count(&self, step: Step) -> usize {
        self.records.iter().filter(|r| r.step == step).count()
    }

    pub fn for_node<'a>(&'a self, host: &'a str) -> impl Iterator<Item = &'a StepRecord> + 'a {
        self.records.iter().filter(move |r| r.node.host == host)
    }

    /// Distinct nodes in the order they first appear
    pub fn nodes(&self) -> Vec<&Node> {
        let mut nodes: Vec<&Node> = Vec::new();
        for record in &self.records {
            if !nodes.contains(&&record.node) {
                nodes.push(&record.node);
            }
        }
        nodes
    }
}

/// How a step failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// The node could not be reached
    Channel(ChannelFailure),
    /// The command ran and exited with an unexpected status
    Payload(CommandOutput),
}

/// A failed step, with everything needed for manual recovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployFailure {
    pub operation: Operation,
    pub node: Node,
    pub step: Step,
    pub kind: FailureKind,
    /// Topology source the node addresses came from
    pub config_source: String,
    /// Steps that succeeded before the failure, on every node
    pub log: StepLog,
}

impl DeployFailure {
    pub fn is_channel(&self) -> bool {
        matches!(self.kind, FailureKind::Channel(_))
    }
}

fn write_stream(out: &mut fmt::Formatter<'_>, label: &str, text: &str) -> fmt::Result {
    let text = text.trim_end();
    if text.is_empty() {
        writeln!(out, "{label}: (empty)")
    } else {
        writeln!(out, "{label}:")?;
        for line in text.lines() {
            writeln!(out, "    {line}")?;
        }
        Ok(())
    }
}

impl fmt::Display for DeployFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} failed on {} node {} at step {}",
            self.operation, self.node.role, self.node.host, self.step
        )?;
        writeln!(f, "Config file: {}", self.config_source)?;
        writeln!(f, "PodNet: {}", self.node)?;

        match &self.kind {
            FailureKind::Channel(channel) => {
                match channel.code {
                    Some(code) => writeln!(f, "Channel error (code {code}): {}", channel.message)?,
                    None => writeln!(f, "Channel error: {}", channel.message)?,
                }
            }
            FailureKind::Payload(output) => {
                writeln!(f, "Payload exit code: {}", output.exit_code)?;
                write_stream(f, "STDOUT", &output.stdout)?;
                write_stream(f, "STDERR", &output.stderr)?;

                let errors = parse_nft_errors(&output.stderr);
                if !errors.is_empty() {
                    let translation = NftablesErrorPattern::match_error(&errors.join("\n"));
                    writeln!(f, "Hint: {}", translation.user_message)?;
                    for suggestion in &translation.suggestions {
                        writeln!(f, "  - {suggestion}")?;
                    }
                    if let Some(url) = &translation.help_url {
                        writeln!(f, "  See: {url}")?;
                    }
                }
            }
        }

        writeln!(f, "Successful steps:")?;
        if self.log.is_empty() {
            writeln!(f, "  (none)")?;
        }
        for node in self.log.nodes() {
            writeln!(f, "  {node}:")?;
            for record in self.log.for_node(&node.host) {
                let mut line = format!("    - {} (exit {})", record.step, record.output.exit_code);
                let stdout = record.output.stdout.trim();
                if !stdout.is_empty() {
                    let _ = write!(line, " stdout: {}", stdout.lines().next().unwrap_or_default());
                }
                writeln!(f, "{line}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for DeployFailure {}

/// Successful build or scrub across both nodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOutcome {
    pub message: String,
    pub log: StepLog,
}

/// Result of reading the table from both nodes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadReport {
    /// True only if both nodes returned the table
    pub success: bool,
    /// Table listing keyed by node host
    pub data: BTreeMap<String, String>,
    pub messages: Vec<String>,
}

impl ReadReport {
    /// Line diff from the enabled node's table to the disabled node's.
    ///
    /// `None` if either node is missing from the report or both are identical.
    pub fn diff(&self, topology: &Topology) -> Option<String> {
        let enabled = self.data.get(&topology.enabled.host)?;
        let disabled = self.data.get(&topology.disabled.host)?;
        line_diff(enabled, disabled)
    }
}

/// Runs operations against the node pair of a [`Topology`]
pub struct HaDeployer<'a> {
    executor: &'a dyn RemoteExecutor,
    topology: &'a Topology,
    temp_dir: &'a Path,
}

impl<'a> HaDeployer<'a> {
    pub fn new(executor: &'a dyn RemoteExecutor, topology: &'a Topology, temp_dir: &'a Path) -> Self {
        Self {
            executor,
            topology,
            temp_dir,
        }
    }

    fn failure(
        &self,
        operation: Operation,
        node: &Node,
        step: Step,
        kind: FailureKind,
        log: StepLog,
    ) -> Box<DeployFailure> {
        Box::new(DeployFailure {
            operation,
            node: node.clone(),
            step,
            kind,
            config_source: self.topology.source.clone(),
            log,
        })
    }

    /// Drives one node through `operation`'s steps, appending to `log`.
    async fn run_steps(
        &self,
        operation: Operation,
        node: &Node,
        plan: &CommandPlan<'_>,
        mut log: StepLog,
    ) -> std::result::Result<StepLog, Box<DeployFailure>> {
        let mut step = Some(operation.first_step());
        let mut table_exists = false;

        while let Some(current) = step {
            info!(%operation, node = %node, step = %current, "Running step");

            let output = match self.executor.run(node, &plan.command(current)).await {
                Ok(output) => output,
                Err(channel) => {
                    error!(%operation, node = %node, step = %current, "{}", channel);
                    return Err(self.failure(
                        operation,
                        node,
                        current,
                        FailureKind::Channel(channel),
                        log,
                    ));
                }
            };

            let succeeded = match (current, output.exit_code) {
                (Step::ResolvingExistingTable, 0) => {
                    table_exists = true;
                    true
                }
                (Step::ResolvingExistingTable, 1) => {
                    table_exists = false;
                    true
                }
                (_, code) => code == 0,
            };

            if !succeeded {
                error!(
                    %operation,
                    node = %node,
                    step = %current,
                    exit_code = output.exit_code,
                    stderr = %output.stderr.trim(),
                    "Step failed"
                );
                return Err(self.failure(
                    operation,
                    node,
                    current,
                    FailureKind::Payload(output),
                    log,
                ));
            }

            log.record(node, current, output);
            step = operation.next_step(current, table_exists);
        }

        Ok(log)
    }

    /// Deploys `document` to one node.
    ///
    /// `seed` carries the steps already completed on earlier nodes; the
    /// returned log extends it.
    ///
    /// # Errors
    ///
    /// Returns the failure diagnostic, including every step logged so far.
    pub async fn deploy(
        &self,
        node: &Node,
        document: &Document,
        target: &Target,
        seed: StepLog,
    ) -> std::result::Result<StepLog, Box<DeployFailure>> {
        let plan = CommandPlan::new(target, self.temp_dir, Some(document));
        self.run_steps(Operation::Build, node, &plan, seed).await
    }

    /// Builds the table on the enabled node, then on the disabled node.
    ///
    /// The disabled node is never contacted if the enabled node fails.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Deploy`] with the first failure.
    pub async fn build(&self, document: &Document, target: &Target) -> Result<DeployOutcome> {
        info!(
            table = %target.table,
            namespace = %target.namespace,
            checksum = %document.checksum(),
            "Building firewall on {} then {}",
            self.topology.enabled,
            self.topology.disabled
        );

        let log = self
            .deploy(&self.topology.enabled, document, target, StepLog::new())
            .await?;
        let log = self
            .deploy(&self.topology.disabled, document, target, log)
            .await?;

        Ok(DeployOutcome {
            message: format!(
                "Successfully built table {} in namespace {} on enabled node {} and disabled node {}",
                target.table, target.namespace, self.topology.enabled.host, self.topology.disabled.host
            ),
            log,
        })
    }

    /// Deletes the table on both nodes where it exists.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Deploy`] with the first failure.
    pub async fn scrub(&self, target: &Target) -> Result<DeployOutcome> {
        info!(table = %target.table, namespace = %target.namespace, "Scrubbing firewall");

        let plan = CommandPlan::new(target, self.temp_dir, None);
        let mut log = StepLog::new();
        for node in self.topology.nodes() {
            log = self.run_steps(Operation::Scrub, node, &plan, log).await?;
        }

        Ok(DeployOutcome {
            message: format!(
                "Successfully scrubbed table {} in namespace {} on enabled node {} and disabled node {}",
                target.table, target.namespace, self.topology.enabled.host, self.topology.disabled.host
            ),
            log,
        })
    }

    /// Lists the table on both nodes. Never modifies anything and always
    /// tries both nodes.
    pub async fn read(&self, target: &Target) -> ReadReport {
        let plan = CommandPlan::new(target, self.temp_dir, None);
        let command = plan.command(Step::ReadingTable);
        let mut report = ReadReport {
            success: true,
            ..ReadReport::default()
        };

        for node in self.topology.nodes() {
            match self.executor.run(node, &command).await {
                Ok(output) if output.success() => {
                    report.messages.push(format!(
                        "Read table {} in namespace {} from {node}",
                        target.table, target.namespace
                    ));
                    report.data.insert(node.host.clone(), output.stdout);
                }
                Ok(output) => {
                    warn!(node = %node, exit_code = output.exit_code, "Table read failed");
                    report.success = false;
                    report.messages.push(format!(
                        "Failed to read table {} in namespace {} from {node}: exit code {}: {}",
                        target.table,
                        target.namespace,
                        output.exit_code,
                        output.stderr.trim()
                    ));
                }
                Err(channel) => {
                    warn!(node = %node, "{}", channel);
                    report.success = false;
                    report.messages.push(format!(
                        "Failed to read table {} in namespace {} from {node}: {channel}",
                        target.table, target.namespace
                    ));
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::topology::NodeRole;

    fn target() -> Target {
        Target::new("ns1100", "fw", 0)
    }

    #[test]
    fn test_build_step_sequence() {
        let op = Operation::Build;
        let mut steps = vec![op.first_step()];
        while let Some(next) = op.next_step(*steps.last().unwrap(), false) {
            steps.push(next);
        }
        assert_eq!(
            steps,
            vec![
                Step::WritingConfig,
                Step::ValidatingSyntax,
                Step::ResolvingExistingTable,
                Step::Applying,
                Step::CleaningUp
            ]
        );

        assert_eq!(
            op.next_step(Step::ResolvingExistingTable, true),
            Some(Step::Flushing)
        );
        assert_eq!(op.next_step(Step::Flushing, true), Some(Step::Applying));
    }

    #[test]
    fn test_scrub_step_sequence() {
        let op = Operation::Scrub;
        assert_eq!(op.first_step(), Step::ResolvingExistingTable);
        assert_eq!(op.next_step(Step::ResolvingExistingTable, false), None);
        assert_eq!(
            op.next_step(Step::ResolvingExistingTable, true),
            Some(Step::Flushing)
        );
        assert_eq!(op.next_step(Step::Flushing, true), None);
    }

    #[test]
    fn test_command_plan() {
        let target = target();
        let plan = CommandPlan::new(&target, Path::new("/tmp"), None);

        assert_eq!(plan.config_path(), "/tmp/podfw_ns1100_fw.nft");
        assert_eq!(
            plan.command(Step::ValidatingSyntax),
            "ip netns exec ns1100 nft --check --file '/tmp/podfw_ns1100_fw.nft'"
        );
        assert_eq!(
            plan.command(Step::ResolvingExistingTable),
            "ip netns exec ns1100 nft list tables | grep -qxF 'table inet fw'"
        );
        assert_eq!(
            plan.command(Step::Flushing),
            "ip netns exec ns1100 nft delete table inet fw"
        );
        assert_eq!(
            plan.command(Step::Applying),
            "ip netns exec ns1100 nft --file '/tmp/podfw_ns1100_fw.nft'"
        );
        assert_eq!(
            plan.command(Step::CleaningUp),
            "rm --force '/tmp/podfw_ns1100_fw.nft'"
        );
        assert_eq!(
            plan.command(Step::ReadingTable),
            "ip netns exec ns1100 nft list table inet fw"
        );
    }

    #[test]
    fn test_step_names() {
        assert_eq!(Step::ResolvingExistingTable.to_string(), "resolving-existing-table");
        assert_eq!(Operation::Scrub.to_string(), "scrub");
    }

    #[test]
    fn test_step_log_groups_by_node() {
        let a = Node::new("a", NodeRole::Enabled);
        let b = Node::new("b", NodeRole::Disabled);
        let mut log = StepLog::new();
        log.record(&a, Step::WritingConfig, CommandOutput::default());
        log.record(&a, Step::Applying, CommandOutput::default());
        log.record(&b, Step::WritingConfig, CommandOutput::default());

        assert_eq!(log.nodes(), vec![&a, &b]);
        assert_eq!(log.for_node("a").count(), 2);
        assert_eq!(log.count(Step::WritingConfig), 2);
        assert_eq!(log.count(Step::Flushing), 0);
    }

    #[test]
    fn test_failure_diagnostic() {
        let a = Node::new("a", NodeRole::Enabled);
        let b = Node::new("b", NodeRole::Disabled);
        let mut log = StepLog::new();
        log.record(&a, Step::Applying, CommandOutput::new(0, "", ""));

        let failure = DeployFailure {
            operation: Operation::Build,
            node: b.clone(),
            step: Step::ValidatingSyntax,
            kind: FailureKind::Payload(CommandOutput::new(
                1,
                "",
                "Error: syntax error, unexpected junk\n",
            )),
            config_source: "/opt/robot/config.json".into(),
            log,
        };

        let text = failure.to_string();
        assert!(text.starts_with("build failed on disabled node b at step validating-syntax"));
        assert!(text.contains("Config file: /opt/robot/config.json"));
        assert!(text.contains("Payload exit code: 1"));
        assert!(text.contains("    Error: syntax error, unexpected junk"));
        assert!(text.contains("Hint: Invalid firewall rule syntax"));
        assert!(text.contains("  a (enabled):\n    - applying (exit 0)"));
        assert!(!failure.is_channel());
    }

    #[test]
    fn test_channel_failure_diagnostic() {
        let failure = DeployFailure {
            operation: Operation::Scrub,
            node: Node::new("a", NodeRole::Enabled),
            step: Step::ResolvingExistingTable,
            kind: FailureKind::Channel(ChannelFailure::new("a", Some(255), "Connection refused")),
            config_source: "cfg".into(),
            log: StepLog::new(),
        };
        let text = failure.to_string();
        assert!(text.contains("Channel error (code 255): Connection refused"));
        assert!(text.contains("Successful steps:\n  (none)"));
        assert!(failure.is_channel());
    }
}
