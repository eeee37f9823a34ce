//! Approval-requester capability and its implementations.

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout};
use tool_primitives::{ExecutionContext, ToolArguments, ToolDescriptor};
use tracing::warn;

const MAX_ARGUMENT_CHARS: usize = 50;
const TRUNCATED_CHARS: usize = 47;

/// Answer returned by an approval requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Approval {
    /// Allow this one call.
    Approve,
    /// Allow and remember for the rest of the session.
    ApproveAndRemember,
    /// Reject the call.
    Deny,
}

impl Approval {
    /// Returns true for either approval variant.
    #[must_use]
    pub fn is_approved(self) -> bool {
        !matches!(self, Self::Deny)
    }
}

/// Which approval path is being taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalSeverity {
    /// ELEVATED tools under `prompt` mode.
    Standard,
    /// SYSTEM tools, regardless of mode.
    Strict,
}

/// Everything a requester needs to present a call for approval.
#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    /// Tool being called.
    pub descriptor: Arc<ToolDescriptor>,
    /// Arguments of the call.
    pub arguments: ToolArguments,
    /// Context of the call.
    pub context: ExecutionContext,
    /// Approval path.
    pub severity: ApprovalSeverity,
}

/// Asks someone (or something) whether a tool call may proceed.
#[async_trait]
pub trait ApprovalRequester: Send + Sync {
    /// Returns the answer for the supplied request.
    async fn ask(&self, request: &ApprovalRequest) -> Approval;
}

/// Requester that replays scripted answers, for tests.
#[derive(Debug)]
pub struct ScriptedApprover {
    answers: Mutex<VecDeque<Approval>>,
    fallback: Approval,
    delay: Option<Duration>,
    asked: Mutex<Vec<(String, ApprovalSeverity)>>,
}

impl ScriptedApprover {
    /// Replays `answers` in order, then denies.
    #[must_use]
    pub fn new<I>(answers: I) -> Self
    where
        I: IntoIterator<Item = Approval>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            fallback: Approval::Deny,
            delay: None,
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Always answers with `answer`.
    #[must_use]
    pub fn always(answer: Approval) -> Self {
        Self {
            fallback: answer,
            ..Self::new([])
        }
    }

    /// Waits before answering, to widen race windows in tests.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of times the requester was asked.
    #[must_use]
    pub fn ask_count(&self) -> usize {
        self.asked.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Tool names and severities in the order they were asked about.
    #[must_use]
    pub fn asked(&self) -> Vec<(String, ApprovalSeverity)> {
        self.asked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ApprovalRequester for ScriptedApprover {
    async fn ask(&self, request: &ApprovalRequest) -> Approval {
        self.asked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((request.descriptor.name().to_owned(), request.severity));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.answers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(self.fallback)
    }
}

/// Interactive requester that prompts on a text terminal.
///
/// Prompts are serialized so concurrent calls never interleave. Anything other
/// than an explicit yes, including end of input and I/O errors, denies.
pub struct TerminalApprover<R, W> {
    io: tokio::sync::Mutex<(R, W)>,
}

impl<R, W> std::fmt::Debug for TerminalApprover<R, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalApprover").finish_non_exhaustive()
    }
}

impl TerminalApprover<BufReader<Stdin>, Stdout> {
    /// Prompts on the process's stdin and stdout.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> TerminalApprover<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Prompts on the supplied reader and writer.
    #[must_use]
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            io: tokio::sync::Mutex::new((reader, writer)),
        }
    }

    /// Returns the reader and writer.
    pub fn into_inner(self) -> (R, W) {
        self.io.into_inner()
    }
}

#[async_trait]
impl<R, W> ApprovalRequester for TerminalApprover<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn ask(&self, request: &ApprovalRequest) -> Approval {
        let mut io = self.io.lock().await;
        let (reader, writer) = &mut *io;

        let prompt = render_prompt(request);
        if let Err(err) = async {
            writer.write_all(prompt.as_bytes()).await?;
            writer.flush().await
        }
        .await
        {
            warn!(tool = %request.descriptor.name(), error = %err, "approval prompt failed; denying");
            return Approval::Deny;
        }

        let mut line = String::new();
        match reader.read_line(&mut line).await {
            Ok(0) => Approval::Deny,
            Ok(_) => parse_answer(&line, request.severity),
            Err(err) => {
                warn!(tool = %request.descriptor.name(), error = %err, "approval input failed; denying");
                Approval::Deny
            }
        }
    }
}

fn parse_answer(line: &str, severity: ApprovalSeverity) -> Approval {
    match (line.trim().to_ascii_lowercase().as_str(), severity) {
        ("y" | "yes", _) => Approval::Approve,
        ("always", ApprovalSeverity::Standard) | ("permanent", ApprovalSeverity::Strict) => {
            Approval::ApproveAndRemember
        }
        _ => Approval::Deny,
    }
}

fn render_prompt(request: &ApprovalRequest) -> String {
    let descriptor = &request.descriptor;
    let mut prompt = String::new();
    let _ = match request.severity {
        ApprovalSeverity::Standard => writeln!(
            prompt,
            "Permission requested for tool: {}",
            descriptor.name()
        ),
        ApprovalSeverity::Strict => writeln!(prompt, "SYSTEM TOOL: {}", descriptor.name()),
    };
    let _ = writeln!(prompt, "Description: {}", descriptor.description());
    let _ = writeln!(prompt, "Arguments: {}", format_arguments(&request.arguments));

    match request.severity {
        ApprovalSeverity::Standard => {
            if let Some(warning) = destructive_warning(descriptor.name(), &request.arguments) {
                let _ = writeln!(prompt, "Warning: {warning}");
            }
            prompt.push_str("Allow this tool execution? [y/N/always]: ");
        }
        ApprovalSeverity::Strict => {
            prompt.push_str("Warning: this is a system-level operation that may affect your computer\n");
            prompt.push_str("Allow this system tool? [y/N/permanent]: ");
        }
    }
    prompt
}

fn format_arguments(arguments: &ToolArguments) -> String {
    if arguments.is_empty() {
        return "(no arguments)".to_owned();
    }
    arguments
        .iter()
        .map(|(key, value)| match value {
            Value::String(text) if text.chars().count() > MAX_ARGUMENT_CHARS => {
                let head: String = text.chars().take(TRUNCATED_CHARS).collect();
                format!("{key}={:?}", format!("{head}..."))
            }
            other => format!("{key}={other}"),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

const DANGEROUS_COMMAND_WORDS: [&str; 12] = [
    "rm", "del", "delete", "format", "shutdown", "reboot", "sudo", "chmod", "chown", "fdisk",
    "mkfs", "dd",
];

/// Returns a warning when a call looks like it could destroy data.
///
/// Matches on the tool name: file writes and deletions always warn, command
/// runners warn when the command contains a dangerous word and database tools
/// warn on `DELETE` or `DROP` queries.
#[must_use]
pub fn destructive_warning(tool: &str, arguments: &ToolArguments) -> Option<&'static str> {
    let tool = tool.to_ascii_lowercase();
    let text = |name: &str| {
        arguments
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned()
    };

    if tool.contains("write_file") {
        Some("this operation may overwrite files")
    } else if tool.contains("delete_file") {
        Some("this operation permanently deletes files")
    } else if tool.contains("run_command") {
        let command = text("command").to_ascii_lowercase();
        DANGEROUS_COMMAND_WORDS
            .iter()
            .any(|word| command.contains(word))
            .then_some("this command may modify files or system state")
    } else if tool.contains("modify_database") {
        let query = text("query").to_ascii_uppercase();
        (query.contains("DELETE") || query.contains("DROP"))
            .then_some("this query may remove data")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use tool_primitives::PermissionLevel;

    fn request(name: &str, arguments: Value, severity: ApprovalSeverity) -> ApprovalRequest {
        ApprovalRequest {
            descriptor: Arc::new(
                ToolDescriptor::builder(name)
                    .description("Writes a file")
                    .permission(PermissionLevel::Elevated)
                    .build()
                    .unwrap(),
            ),
            arguments: arguments.as_object().cloned().unwrap(),
            context: ExecutionContext::new(),
            severity,
        }
    }

    async fn answer(input: &str, severity: ApprovalSeverity) -> (Approval, String) {
        let approver = TerminalApprover::new(input.as_bytes(), Vec::new());
        let decision = approver
            .ask(&request("write_file", json!({"path": "a.txt"}), severity))
            .await;
        let (_, output) = approver.into_inner();
        (decision, String::from_utf8(output).unwrap())
    }

    #[tokio::test]
    async fn terminal_parses_standard_answers() {
        assert_eq!(answer("y\n", ApprovalSeverity::Standard).await.0, Approval::Approve);
        assert_eq!(answer("YES\n", ApprovalSeverity::Standard).await.0, Approval::Approve);
        assert_eq!(
            answer("always\n", ApprovalSeverity::Standard).await.0,
            Approval::ApproveAndRemember
        );
        assert_eq!(answer("permanent\n", ApprovalSeverity::Standard).await.0, Approval::Deny);
        assert_eq!(answer("n\n", ApprovalSeverity::Standard).await.0, Approval::Deny);
        assert_eq!(answer("", ApprovalSeverity::Standard).await.0, Approval::Deny);
    }

    #[tokio::test]
    async fn terminal_strict_path_uses_permanent() {
        let (decision, prompt) = answer("permanent\n", ApprovalSeverity::Strict).await;
        assert_eq!(decision, Approval::ApproveAndRemember);
        assert!(prompt.contains("SYSTEM TOOL: write_file"));
        assert!(prompt.contains("[y/N/permanent]"));
        assert_eq!(answer("always\n", ApprovalSeverity::Strict).await.0, Approval::Deny);
    }

    #[tokio::test]
    async fn prompt_shows_arguments_and_warning() {
        let (_, prompt) = answer("n\n", ApprovalSeverity::Standard).await;
        assert!(prompt.contains("Permission requested for tool: write_file"));
        assert!(prompt.contains("path=\"a.txt\""));
        assert!(prompt.contains("Warning: this operation may overwrite files"));
    }

    #[test]
    fn long_string_arguments_are_truncated() {
        let long = "x".repeat(60);
        let formatted = format_arguments(json!({ "content": long }).as_object().unwrap());
        let expected = format!("content=\"{}...\"", "x".repeat(47));
        assert_eq!(formatted, expected);
        assert_eq!(format_arguments(&ToolArguments::new()), "(no arguments)");
    }

    #[test]
    fn destructive_heuristics() {
        let args = |value: Value| value.as_object().cloned().unwrap();
        assert!(destructive_warning("delete_file", &args(json!({}))).is_some());
        assert!(destructive_warning("run_command", &args(json!({"command": "sudo rm -rf /"}))).is_some());
        assert!(destructive_warning("run_command", &args(json!({"command": "ls"}))).is_none());
        assert!(
            destructive_warning("modify_database", &args(json!({"query": "drop table users"})))
                .is_some()
        );
        assert!(destructive_warning("read_file", &args(json!({}))).is_none());
    }

    #[tokio::test]
    async fn scripted_answers_then_fallback() {
        let approver = ScriptedApprover::new([Approval::Approve]);
        let req = request("write_file", json!({}), ApprovalSeverity::Standard);
        assert_eq!(approver.ask(&req).await, Approval::Approve);
        assert_eq!(approver.ask(&req).await, Approval::Deny);
        assert_eq!(approver.ask_count(), 2);
        assert_eq!(approver.asked()[0], ("write_file".to_owned(), ApprovalSeverity::Standard));

        let always = ScriptedApprover::always(Approval::ApproveAndRemember);
        assert_eq!(always.ask(&req).await, Approval::ApproveAndRemember);
    }
}
