//! Script loader for scanning Lua scripts from the file system.

use std::fs;
use std::path::{Path, PathBuf};

use super::types::{ScanResult, Script};
use crate::Result;

/// Header metadata parsed from leading Lua comments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptMetadata {
    /// Explicit id (@id).
    pub id: Option<String>,
    /// Enabled flag (@enabled).
    pub enabled: Option<bool>,
}

/// Loader for scanning Lua scripts from the file system.
pub struct ScriptLoader {
    /// Base directory for scripts.
    scripts_dir: PathBuf,
}

impl ScriptLoader {
    /// Create a new ScriptLoader with the given scripts directory.
    pub fn new<P: AsRef<Path>>(scripts_dir: P) -> Self {
        Self {
            scripts_dir: scripts_dir.as_ref().to_path_buf(),
        }
    }

    /// Scan the scripts directory recursively for `.lua` files.
    ///
    /// Scripts come back in path order so reloads are deterministic. A
    /// missing directory yields an empty result; unreadable files are
    /// reported in `errors` and skipped.
    pub fn scan(&self) -> ScanResult {
        let mut result = ScanResult::default();
        if self.scripts_dir.exists() {
            self.scan_directory(&self.scripts_dir, &mut result);
        }
        result
    }

    fn scan_directory(&self, dir: &Path, result: &mut ScanResult) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                result
                    .errors
                    .push((dir.display().to_string(), e.to_string()));
                return;
            }
        };

        let mut paths: Vec<PathBuf> = entries.flatten().map(|entry| entry.path()).collect();
        paths.sort();

        for path in paths {
            if path.is_dir() {
                self.scan_directory(&path, result);
            } else if path.extension().is_some_and(|ext| ext == "lua") {
                match self.read_script(&path) {
                    Ok(script) => result.scripts.push(script),
                    Err(e) => result
                        .errors
                        .push((path.display().to_string(), e.to_string())),
                }
            }
        }
    }

    fn read_script(&self, path: &Path) -> Result<Script> {
        let code = fs::read_to_string(path)?;
        let metadata = Self::parse_metadata(&code);
        let id = metadata.id.unwrap_or_else(|| self.script_id(path));

        Ok(Script {
            id,
            code,
            enabled: metadata.enabled.unwrap_or(true),
        })
    }

    /// Id derived from the path relative to the scripts directory, without
    /// extension, using `/` separators.
    fn script_id(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.scripts_dir).unwrap_or(path);
        let rel = rel.with_extension("");
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Parse metadata from leading Lua comments.
    ///
    /// ```lua
    /// -- @id orders
    /// -- @enabled false
    /// ```
    pub fn parse_metadata(content: &str) -> ScriptMetadata {
        let mut metadata = ScriptMetadata::default();

        for line in content.lines() {
            let line = line.trim();
            if !line.starts_with("--") {
                // Stop at first non-comment line
                if !line.is_empty() {
                    break;
                }
                continue;
            }

            let comment = line.trim_start_matches("--").trim();

            if let Some(value) = comment.strip_prefix("@id ") {
                let value = value.trim();
                if !value.is_empty() {
                    metadata.id = Some(value.to_string());
                }
            } else if let Some(value) = comment.strip_prefix("@enabled ") {
                metadata.enabled = value.trim().parse().ok();
            }
        }

        metadata
    }

    /// Get the scripts directory path.
    pub fn scripts_dir(&self) -> &Path {
        &self.scripts_dir
    }

    /// Create the scripts directory if it doesn't exist.
    pub fn ensure_scripts_dir(&self) -> Result<()> {
        if !self.scripts_dir.exists() {
            fs::create_dir_all(&self.scripts_dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_metadata_full() {
        let content = r#"-- @id orders
-- @enabled false

chrollo.stomp.onMessage(function(ctx) end)
"#;

        let metadata = ScriptLoader::parse_metadata(content);
        assert_eq!(metadata.id, Some("orders".to_string()));
        assert_eq!(metadata.enabled, Some(false));
    }

    #[test]
    fn test_parse_metadata_stops_at_code() {
        let content = r#"local x = 1
-- @enabled false
"#;
        let metadata = ScriptLoader::parse_metadata(content);
        assert!(metadata.enabled.is_none());
    }

    #[test]
    fn test_parse_metadata_invalid_flag() {
        let metadata = ScriptLoader::parse_metadata("-- @enabled maybe\n");
        assert!(metadata.enabled.is_none());
    }

    #[test]
    fn test_scan_missing_directory() {
        let dir = tempdir().unwrap();
        let loader = ScriptLoader::new(dir.path().join("nope"));

        let result = loader.scan();
        assert!(result.scripts.is_empty());
        assert!(!result.has_errors());
    }

    #[test]
    fn test_scan_sorted_recursive() {
        let dir = tempdir().unwrap();
        let sub = dir.path().join("auth");
        fs::create_dir(&sub).unwrap();

        fs::write(dir.path().join("b.lua"), "x = 2").unwrap();
        fs::write(dir.path().join("a.lua"), "x = 1").unwrap();
        fs::write(sub.join("token.lua"), "-- @enabled false\nx = 3").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let result = ScriptLoader::new(dir.path()).scan();

        let ids: Vec<&str> = result.scripts.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "auth/token", "b"]);
        assert!(!result.scripts[1].enabled);
        assert_eq!(result.enabled().count(), 2);
    }

    #[test]
    fn test_scan_uses_explicit_id() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("file.lua"), "-- @id custom\n").unwrap();

        let result = ScriptLoader::new(dir.path()).scan();
        assert_eq!(result.scripts[0].id, "custom");
    }

    #[test]
    fn test_ensure_scripts_dir() {
        let dir = tempdir().unwrap();
        let scripts_dir = dir.path().join("scripts").join("nested");

        let loader = ScriptLoader::new(&scripts_dir);
        assert!(!loader.scripts_dir().exists());

        loader.ensure_scripts_dir().unwrap();
        assert!(loader.scripts_dir().exists());
    }
}
