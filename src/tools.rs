//! File tools the relay can run on behalf of the assistant.
//!
//! The assistant requests a tool by embedding a JSON object in its reply,
//! e.g. `{"tool": "list_directory", "path": "src"}`. Every path is resolved
//! against a single allowed root; anything escaping it is refused.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolInvocation {
    ReadFile { path: String },
    ListDirectory { path: String },
}

/// Extract a tool invocation embedded in an assistant reply, if any.
///
/// The object may be surrounded by prose; the first `{"tool"` occurrence is
/// parsed as a standalone JSON value.
pub fn parse_invocation(reply: &str) -> Option<ToolInvocation> {
    let start = reply.find("{\"tool\"")?;
    let mut stream =
        serde_json::Deserializer::from_str(&reply[start..]).into_iter::<serde_json::Value>();
    let value = stream.next()?.ok()?;

    let tool = value.get("tool")?.as_str()?;
    let path = value
        .get("path")
        .and_then(|p| p.as_str())
        .unwrap_or(".")
        .to_string();

    match tool {
        "read_file" => Some(ToolInvocation::ReadFile { path }),
        "list_directory" => Some(ToolInvocation::ListDirectory { path }),
        _ => None,
    }
}

pub struct FileTools {
    root: PathBuf,
}

impl FileTools {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root
            .as_ref()
            .canonicalize()
            .with_context(|| format!("invalid tool root: {}", root.as_ref().display()))?;
        Ok(Self { root })
    }

    pub fn execute(&self, invocation: &ToolInvocation) -> Result<String> {
        match invocation {
            ToolInvocation::ReadFile { path } => self.read_file(path),
            ToolInvocation::ListDirectory { path } => self.list_directory(path),
        }
    }

    /// List a directory as one `[DIR] name` or `[FILE] name` entry per line.
    pub fn list_directory(&self, path: &str) -> Result<String> {
        let dir = self.resolve(path)?;
        let mut entries: Vec<(bool, String)> = Vec::new();
        for entry in std::fs::read_dir(&dir)
            .with_context(|| format!("cannot list {}", dir.display()))?
        {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            entries.push((entry.file_type()?.is_dir(), name));
        }
        entries.sort_by(|a, b| a.1.cmp(&b.1));

        let formatted: Vec<String> = entries
            .into_iter()
            .map(|(is_dir, name)| {
                if is_dir {
                    format!("[DIR] {}", name)
                } else {
                    format!("[FILE] {}", name)
                }
            })
            .collect();
        Ok(formatted.join("\n"))
    }

    /// Read a file, prefixed with the header the panel recognizes as a
    /// file-content card: `Contenu du fichier <name>:`.
    pub fn read_file(&self, path: &str) -> Result<String> {
        let file = self.resolve(path)?;
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string());
        let contents = std::fs::read_to_string(&file)
            .with_context(|| format!("cannot read {}", file.display()))?;
        Ok(format!("Contenu du fichier {}:\n{}", name, contents))
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let joined = if Path::new(path).is_absolute() {
            PathBuf::from(path)
        } else {
            self.root.join(path)
        };
        let resolved = joined
            .canonicalize()
            .with_context(|| format!("no such path: {}", path))?;
        if !resolved.starts_with(&self.root) {
            return Err(anyhow!("path {} is outside the allowed directory", path));
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn sandbox() -> (tempfile::TempDir, FileTools) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "hello").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let tools = FileTools::new(dir.path()).unwrap();
        (dir, tools)
    }

    #[test]
    fn test_list_directory_format() {
        let (_dir, tools) = sandbox();
        let listing = tools.list_directory(".").unwrap();
        assert_eq!(listing, "[FILE] a.txt\n[DIR] sub");
    }

    #[test]
    fn test_read_file_format() {
        let (_dir, tools) = sandbox();
        let content = tools.read_file("a.txt").unwrap();
        assert_eq!(content, "Contenu du fichier a.txt:\nhello");
    }

    #[test]
    fn test_escaping_the_root_is_refused() {
        let (_dir, tools) = sandbox();
        assert!(tools.read_file("../../etc/hostname").is_err());
        assert!(tools.list_directory("/").is_err());
    }

    #[test]
    fn test_parse_invocation_plain() {
        let inv = parse_invocation(r#"{"tool": "read_file", "path": "src/main.rs"}"#);
        assert_eq!(
            inv,
            Some(ToolInvocation::ReadFile {
                path: "src/main.rs".to_string()
            })
        );
    }

    #[test]
    fn test_parse_invocation_embedded_in_prose() {
        let reply = r#"Je vais lister le dossier. {"tool": "list_directory", "path": "."} Un instant."#;
        assert_eq!(
            parse_invocation(reply),
            Some(ToolInvocation::ListDirectory {
                path: ".".to_string()
            })
        );
    }

    #[test]
    fn test_parse_invocation_ignores_unknown_tools() {
        assert_eq!(parse_invocation(r#"{"tool": "delete_everything"}"#), None);
        assert_eq!(parse_invocation("no tool call here"), None);
    }
}
