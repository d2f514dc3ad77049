//! Utility functions for directory management
//!
//! Follows the XDG Base Directory specification:
//!
//! - Data: `~/.local/share/podfw/` - persisted settings (`config.json`)
//! - State: `~/.local/state/podfw/` - audit log
//!
//! # Example
//!
//! ```
//! use podfw::utils::{get_data_dir, ensure_dirs};
//!
//! ensure_dirs().expect("Failed to create directories");
//!
//! if let Some(data_path) = get_data_dir() {
//!     // Load configuration from data_path
//! }
//! ```

use directories::ProjectDirs;
use std::path::PathBuf;

pub fn get_data_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "podfw", "podfw").map(|pd| pd.data_dir().to_path_buf())
}

pub fn get_state_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "podfw", "podfw")
        .and_then(|pd| pd.state_dir().map(std::path::Path::to_path_buf))
}

pub fn ensure_dirs() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::fs::DirBuilder;
        use std::os::unix::fs::DirBuilderExt;

        let mut builder = DirBuilder::new();
        builder.mode(0o700); // User read/write/execute only
        builder.recursive(true);

        if let Some(dir) = get_data_dir() {
            builder.create(dir)?;
        }
        if let Some(dir) = get_state_dir() {
            builder.create(dir)?;
        }
    }

    #[cfg(not(unix))]
    {
        if let Some(dir) = get_data_dir() {
            std::fs::create_dir_all(dir)?;
        }
        if let Some(dir) = get_state_dir() {
            std::fs::create_dir_all(dir)?;
        }
    }

    Ok(())
}

/// Line diff with `- `/`+ `/`  ` markers, or `None` when both texts are equal.
pub fn line_diff(old_text: &str, new_text: &str) -> Option<String> {
    use std::fmt::Write;

    if old_text == new_text {
        return None;
    }

    let diff = similar::TextDiff::from_lines(old_text, new_text);
    let mut result = String::new();

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            similar::ChangeTag::Delete => "- ",
            similar::ChangeTag::Insert => "+ ",
            similar::ChangeTag::Equal => "  ",
        };
        let _ = write!(result, "{sign}{change}");
    }

    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_diff_equal() {
        assert!(line_diff("a\nb\n", "a\nb\n").is_none());
    }

    #[test]
    fn test_line_diff_marks_changes() {
        let diff = line_diff("a\nb\n", "a\nc\n").unwrap();
        assert!(diff.contains("  a\n"));
        assert!(diff.contains("- b\n"));
        assert!(diff.contains("+ c\n"));
    }
}
