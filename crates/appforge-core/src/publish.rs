use crate::constants::publish;
use crate::error::{AppForgeError, PublishStage};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Captured result of running the publish script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptRun {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStatus {
    /// Script execution disabled
    Skipped,
    /// The script ran; check `success` for its exit status
    Completed(ScriptRun),
    /// The script could not be prepared or spawned
    Failed { stage: PublishStage, message: String },
}

/// What `publish` did. The artifact write always happened if a report exists;
/// the push step is reported separately and never undoes the write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub artifact_path: PathBuf,
    pub script_path: Option<PathBuf>,
    pub script_created: bool,
    pub script: ScriptStatus,
}

impl PublishReport {
    pub fn is_success(&self) -> bool {
        match self.script {
            ScriptStatus::Skipped => true,
            ScriptStatus::Completed(ref run) => run.success,
            ScriptStatus::Failed { .. } => false,
        }
    }

    /// The push failure, if any, as a typed error.
    pub fn script_error(&self) -> Option<AppForgeError> {
        match self.script {
            ScriptStatus::Skipped => None,
            ScriptStatus::Completed(ref run) if run.success => None,
            ScriptStatus::Completed(ref run) => Some(AppForgeError::publish(
                PublishStage::RunScript,
                format!(
                    "script exited with {}: {}",
                    run.exit_code
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "signal".into()),
                    run.stderr.trim()
                ),
            )),
            ScriptStatus::Failed { stage, ref message } => {
                Some(AppForgeError::publish(stage, message.clone()))
            }
        }
    }
}

/// Writes the approved artifact and pushes it with a generated git script.
#[derive(Debug, Clone)]
pub struct Publisher {
    workdir: PathBuf,
    artifact_file: String,
    script_file: String,
    run_script: bool,
}

impl Publisher {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            artifact_file: publish::ARTIFACT_FILE.to_string(),
            script_file: publish::SCRIPT_FILE.to_string(),
            run_script: true,
        }
    }

    pub fn with_artifact_file(mut self, name: impl Into<String>) -> Self {
        self.artifact_file = name.into();
        self
    }

    pub fn with_script_file(mut self, name: impl Into<String>) -> Self {
        self.script_file = name.into();
        self
    }

    /// Disable the push step; the artifact is still written.
    pub fn with_run_script(mut self, run: bool) -> Self {
        self.run_script = run;
        self
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.workdir.join(&self.artifact_file)
    }

    pub fn script_path(&self) -> PathBuf {
        self.workdir.join(&self.script_file)
    }

    /// Write the artifact, then prepare and run the push script.
    /// Only a failed write is an error.
    pub async fn publish(&self, html_text: &str) -> Result<PublishReport, AppForgeError> {
        let artifact_path = self.write_artifact(html_text).await?;
        tracing::info!(path = %artifact_path.display(), bytes = html_text.len(), "artifact written");

        if !self.run_script {
            return Ok(PublishReport {
                artifact_path,
                script_path: None,
                script_created: false,
                script: ScriptStatus::Skipped,
            });
        }

        let (script_path, script_created) = match self.ensure_script().await {
            Ok(prepared) => prepared,
            Err(e) => {
                tracing::error!(error = %e, "could not prepare publish script");
                return Ok(PublishReport {
                    artifact_path,
                    script_path: None,
                    script_created: false,
                    script: ScriptStatus::Failed {
                        stage: PublishStage::PrepareScript,
                        message: e.to_string(),
                    },
                });
            }
        };

        let script = match self.run_script().await {
            Ok(run) => {
                if run.success {
                    tracing::info!("publish script succeeded");
                } else {
                    tracing::warn!(exit_code = ?run.exit_code, stderr = %run.stderr.trim(), "publish script failed");
                }
                ScriptStatus::Completed(run)
            }
            Err(e) => {
                tracing::error!(error = %e, "could not run publish script");
                ScriptStatus::Failed {
                    stage: PublishStage::RunScript,
                    message: e.to_string(),
                }
            }
        };

        Ok(PublishReport {
            artifact_path,
            script_path: Some(script_path),
            script_created,
            script,
        })
    }

    /// Overwrite the artifact file with `html_text`, verbatim.
    pub async fn write_artifact(&self, html_text: &str) -> Result<PathBuf, AppForgeError> {
        let path = self.artifact_path();
        tokio::fs::write(&path, html_text).await.map_err(|e| {
            AppForgeError::publish(
                PublishStage::WriteArtifact,
                format!("{}: {e}", path.display()),
            )
        })?;
        Ok(path)
    }

    /// Create the push script from the template unless it already exists,
    /// then make it executable. Returns the path and whether it was created.
    pub async fn ensure_script(&self) -> Result<(PathBuf, bool), AppForgeError> {
        let path = self.script_path();
        let prepare_err = |e: std::io::Error| {
            AppForgeError::publish(PublishStage::PrepareScript, format!("{}: {e}", path.display()))
        };

        let created = if tokio::fs::try_exists(&path).await.map_err(prepare_err)? {
            false
        } else {
            tokio::fs::write(&path, SCRIPT_TEMPLATE)
                .await
                .map_err(prepare_err)?;
            tracing::info!(path = %path.display(), "publish script created");
            true
        };

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(publish::SCRIPT_MODE);
            tokio::fs::set_permissions(&path, permissions)
                .await
                .map_err(prepare_err)?;
        }

        Ok((path, created))
    }

    /// Run `bash <script> <artifact>` in the working directory.
    pub async fn run_script(&self) -> Result<ScriptRun, AppForgeError> {
        let output = Command::new(publish::SHELL)
            .arg(&self.script_file)
            .arg(&self.artifact_file)
            .current_dir(&self.workdir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                AppForgeError::publish(PublishStage::RunScript, format!("Failed to run script: {e}"))
            })?;

        Ok(ScriptRun {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
        })
    }
}

/// Commits the artifact and pushes it when a remote is configured.
pub const SCRIPT_TEMPLATE: &str = r#"#!/bin/bash
ARTIFACT="${1:-index.html}"
echo "Publishing $ARTIFACT to the git repository..."

if [ ! -d ".git" ]; then
    git init
    git config user.name "appforge"
    git config user.email "appforge@localhost"
fi

if [ ! -f "$ARTIFACT" ]; then
    echo "Error: $ARTIFACT not found." >&2
    exit 1
fi

git add "$ARTIFACT"
git commit -m "feat: Add generated HTML application - $(date '+%Y-%m-%d %H:%M:%S')"

if git remote get-url origin >/dev/null 2>&1; then
    git push origin main 2>/dev/null || git push origin master 2>/dev/null || {
        echo "Push failed. The artifact is committed locally."
    }
else
    echo "No remote repository configured."
    echo "Configure one with: git remote add origin <REPOSITORY_URL>"
fi

echo "Done."
"#;
