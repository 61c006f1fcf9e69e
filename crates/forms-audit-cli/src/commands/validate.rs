//! `validate`: check message files against the audit message schema.

use anyhow::Context;
use forms_audit_service::{AuditError, MessageMapper};
use std::fs;
use std::path::{Path, PathBuf};

/// Validation result for one file.
#[derive(Debug)]
pub struct FileReport {
    pub path: PathBuf,
    pub problems: Vec<String>,
}

impl FileReport {
    pub fn is_valid(&self) -> bool {
        self.problems.is_empty()
    }
}

pub fn run(files: &[PathBuf]) -> anyhow::Result<()> {
    let mapper = MessageMapper::new()?;
    let mut invalid = 0;

    for file in files {
        let report = check_file(&mapper, file)?;
        if report.is_valid() {
            println!("✓ {}", report.path.display());
        } else {
            invalid += 1;
            println!("✗ {}", report.path.display());
            for problem in &report.problems {
                println!("  - {problem}");
            }
        }
    }

    if invalid > 0 {
        anyhow::bail!("{} of {} files failed validation", invalid, files.len());
    }
    Ok(())
}

/// Validate a single message file, collecting every violation.
pub fn check_file(mapper: &MessageMapper, path: &Path) -> anyhow::Result<FileReport> {
    let body =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;

    let problems = match mapper.parse_body(&body) {
        Ok(_) => Vec::new(),
        Err(AuditError::Validation(errors)) => errors.iter().map(|v| v.to_string()).collect(),
        Err(e) => vec![e.to_string()],
    };

    Ok(FileReport {
        path: path.to_path_buf(),
        problems,
    })
}
