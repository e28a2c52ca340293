//! Staging of uploaded suite files before a run.

use serde::Deserialize;
use std::io;
use std::path::{Path, PathBuf};

/// A suite file received from a client.
#[derive(Debug, Clone, Deserialize)]
pub struct Upload {
    pub name: String,
    pub content: String,
}

/// Write each upload into `dir` under its base name and return the written paths,
/// in upload order. Directory components in the name are discarded.
pub fn stage_uploads(dir: &Path, uploads: &[Upload]) -> io::Result<Vec<PathBuf>> {
    if uploads.is_empty() {
        return Ok(Vec::new());
    }
    std::fs::create_dir_all(dir)?;

    let mut staged = Vec::with_capacity(uploads.len());
    for upload in uploads {
        let file_name = Path::new(&upload.name)
            .file_name()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("invalid upload name '{}'", upload.name),
                )
            })?;
        let path = dir.join(file_name);
        std::fs::write(&path, upload.content.as_bytes())?;
        tracing::debug!(path = %path.display(), bytes = upload.content.len(), "staged upload");
        staged.push(path);
    }
    Ok(staged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_uploads_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("uploads");
        let uploads = vec![
            Upload {
                name: "login.robot".to_string(),
                content: "*** Test Cases ***\nLogin\n    Log    hi\n".to_string(),
            },
            Upload {
                name: "../../escape/logout.robot".to_string(),
                content: "x".to_string(),
            },
        ];

        let paths = stage_uploads(&staging, &uploads).unwrap();

        assert_eq!(paths, vec![staging.join("login.robot"), staging.join("logout.robot")]);
        assert_eq!(
            std::fs::read_to_string(&paths[0]).unwrap(),
            "*** Test Cases ***\nLogin\n    Log    hi\n"
        );
        assert!(!dir.path().join("escape").exists());
    }

    #[test]
    fn test_stage_uploads_rejects_nameless() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = vec![Upload {
            name: "..".to_string(),
            content: String::new(),
        }];
        let err = stage_uploads(dir.path(), &uploads).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_stage_no_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("never-created");
        assert!(stage_uploads(&staging, &[]).unwrap().is_empty());
        assert!(!staging.exists());
    }
}
