//! Shared test utilities for core module tests
//!
//! Provides common test helpers to avoid duplication across test suites.
//! This module is only compiled in test mode.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Mutex;

use crate::core::policy::{PolicySpec, Target};
use crate::core::topology::{Node, Topology};
use crate::remote::{ChannelFailure, CommandOutput, RemoteExecutor};

/// Mutex for tests that need exclusive access to environment variables.
///
/// A tokio mutex, so the guard can be held across `.await`.
///
/// # Example
///
/// ```ignore
/// let _guard = ENV_VAR_MUTEX.lock().await;
/// unsafe { std::env::set_var("PODFW_NFT_COMMAND", "true") };
/// // ... test with custom env state ...
/// unsafe { std::env::remove_var("PODFW_NFT_COMMAND") };
/// ```
pub static ENV_VAR_MUTEX: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

pub const ENABLED_HOST: &str = "2a02:2078:3::10:0:2";
pub const DISABLED_HOST: &str = "2a02:2078:3::10:0:3";

pub fn test_topology() -> Topology {
    Topology::new("/opt/robot/config.json", ENABLED_HOST, DISABLED_HOST)
}

pub fn test_target() -> Target {
    Target::new("ns1100", "fw", 0)
}

/// Untyped rule object with the common fields filled in.
///
/// `iiface`/`oiface` of `None` leave that side unattached.
pub fn rule_json(protocol: &str, iiface: Option<&str>, oiface: Option<&str>) -> Value {
    json!({
        "version": 4,
        "source": ["any"],
        "destination": ["any"],
        "protocol": protocol,
        "port": [],
        "action": "accept",
        "log": false,
        "iiface": iiface,
        "oiface": oiface,
        "order": 0,
    })
}

pub fn policy_spec(rules: Vec<Value>, sets: Vec<Value>, nats: Vec<Value>) -> PolicySpec {
    PolicySpec {
        rules,
        sets,
        nats,
        ..PolicySpec::default()
    }
}

enum Reply {
    Output(CommandOutput),
    Channel(String),
}

struct Script {
    host: String,
    needle: String,
    reply: Reply,
}

/// [`RemoteExecutor`] that records every call and answers from a script.
///
/// Replies are matched by host and a substring of the command; the first
/// match wins. Unmatched commands exit 0, except the table lookup which
/// exits 1 (table absent).
#[derive(Default)]
pub struct ScriptedExecutor {
    scripts: Vec<Script>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers commands on `host` containing `needle` with `output`.
    pub fn reply(mut self, host: &str, needle: &str, output: CommandOutput) -> Self {
        self.scripts.push(Script {
            host: host.to_string(),
            needle: needle.to_string(),
            reply: Reply::Output(output),
        });
        self
    }

    /// Makes commands on `host` containing `needle` fail to reach the node.
    pub fn unreachable(mut self, host: &str, needle: &str, message: &str) -> Self {
        self.scripts.push(Script {
            host: host.to_string(),
            needle: needle.to_string(),
            reply: Reply::Channel(message.to_string()),
        });
        self
    }

    /// Reports the table as present on `host`.
    pub fn table_exists(self, host: &str) -> Self {
        self.reply(host, "list tables", CommandOutput::new(0, "", ""))
    }

    /// Every `(host, command)` received so far, in order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, host: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|(h, _)| h == host)
            .map(|(_, command)| command)
            .collect()
    }
}

#[async_trait]
impl RemoteExecutor for ScriptedExecutor {
    async fn run(&self, node: &Node, command: &str) -> Result<CommandOutput, ChannelFailure> {
        self.calls
            .lock()
            .unwrap()
            .push((node.host.clone(), command.to_string()));

        let script = self
            .scripts
            .iter()
            .find(|s| s.host == node.host && command.contains(&s.needle));

        match script.map(|s| &s.reply) {
            Some(Reply::Output(output)) => Ok(output.clone()),
            Some(Reply::Channel(message)) => {
                Err(ChannelFailure::new(&node.host, Some(255), message.clone()))
            }
            None if command.contains("list tables") => Ok(CommandOutput::new(1, "", "")),
            None => Ok(CommandOutput::new(0, "", "")),
        }
    }
}
