//! Local syntax check of an assembled document
//!
//! Runs the document through `nft --check` on the operator's machine before
//! anything is sent to the nodes. Needs `nft` installed locally but no
//! privileges and no network namespace.
use crate::core::assemble::Document;
use crate::core::error::{Error, Result};
use tracing::{info, warn};

/// Result of a document verification
#[derive(Debug, Clone)]
pub struct VerifyResult {
    pub success: bool,
    pub errors: Vec<String>,
}

impl VerifyResult {
    /// Creates a successful verification result
    pub fn success() -> Self {
        Self {
            success: true,
            errors: Vec::new(),
        }
    }

    /// Creates a failed verification result with errors
    pub fn failure(errors: Vec<String>) -> Self {
        Self {
            success: false,
            errors,
        }
    }
}

/// nft binary used for local checks, overridable for tests
fn nft_program() -> String {
    std::env::var("PODFW_NFT_COMMAND").unwrap_or_else(|_| "nft".to_string())
}

/// Checks `document` with `nft --check --file -` without applying it.
///
/// # Errors
///
/// Returns `Err` if:
/// - nft cannot be spawned
/// - Communication with the nft process fails
pub async fn verify_document(document: &Document) -> Result<VerifyResult> {
    let program = nft_program();
    info!(table = document.table(), "Verifying document via {} --check", program);

    let mut child = tokio::process::Command::new(&program)
        .args(["--check", "--file", "-"])
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::Internal(format!("Failed to spawn {program}: {e}")))?;

    if let Some(mut stdin) = child.stdin.take() {
        use tokio::io::AsyncWriteExt;
        // A checker that exits early closes the pipe; its exit status still decides.
        if let Err(e) = stdin.write_all(document.as_str().as_bytes()).await
            && e.kind() != std::io::ErrorKind::BrokenPipe
        {
            return Err(Error::Internal(format!("Failed to write to nft stdin: {e}")));
        }
    }

    let output = child.wait_with_output().await?;

    if output.status.success() {
        info!("Document verification passed");
        Ok(VerifyResult::success())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!("Document verification failed: {}", stderr.trim());

        let mut errors = parse_nft_errors(&stderr);
        if errors.is_empty() {
            errors.push(format!("nft exited with {}", output.status));
        }
        Ok(VerifyResult::failure(errors))
    }
}

/// Parses nft error output into user-friendly messages
///
/// Attempts to extract meaningful error information from nft's
/// stderr output, falling back to raw output if parsing fails.
pub(crate) fn parse_nft_errors(stderr: &str) -> Vec<String> {
    // JSON error format (nft --json)
    if let Ok(json_err) = serde_json::from_str::<serde_json::Value>(stderr)
        && let Some(errors) = json_err.get("errors").and_then(|e| e.as_array())
    {
        return errors
            .iter()
            .filter_map(|e| e.get("message").and_then(|m| m.as_str()))
            .map(String::from)
            .collect();
    }

    stderr
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            line.trim()
                .trim_start_matches("Error: ")
                .trim_start_matches("nft: ")
                .to_string()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_helpers::ENV_VAR_MUTEX;

    #[test]
    fn test_parse_nft_errors_plain_text() {
        let stderr = "Error: syntax error, unexpected $end\nError: invalid expression\n";
        let errors = parse_nft_errors(stderr);

        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0], "syntax error, unexpected $end");
        assert_eq!(errors[1], "invalid expression");
    }

    #[test]
    fn test_parse_nft_errors_empty() {
        assert!(parse_nft_errors("").is_empty());
        assert!(parse_nft_errors("  \n").is_empty());
    }

    #[test]
    fn test_parse_nft_errors_with_nft_prefix() {
        let errors = parse_nft_errors("nft: syntax error\n");
        assert_eq!(errors, vec!["syntax error"]);
    }

    #[test]
    fn test_parse_nft_errors_json() {
        let errors = parse_nft_errors(r#"{"errors":[{"message":"set web does not exist"}]}"#);
        assert_eq!(errors, vec!["set web does not exist"]);
    }

    #[tokio::test]
    async fn test_verify_document_uses_exit_status() {
        let document = Document::new("fw", "table inet fw {\n}\n".to_string());
        let _guard = ENV_VAR_MUTEX.lock().await;

        // SAFETY: serialized by ENV_VAR_MUTEX
        unsafe { std::env::set_var("PODFW_NFT_COMMAND", "true") };
        let passed = verify_document(&document).await.unwrap();
        assert!(passed.success);

        unsafe { std::env::set_var("PODFW_NFT_COMMAND", "false") };
        let failed = verify_document(&document).await.unwrap();
        assert!(!failed.success);
        assert_eq!(failed.errors.len(), 1);

        unsafe { std::env::remove_var("PODFW_NFT_COMMAND") };
    }
}
