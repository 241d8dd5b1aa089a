//! Drives the converter and validator as child processes.
//!
//! Output is read line by line from both pipes at once and handed to an
//! [`OutputSink`] as it arrives; the collected lines are classified once the
//! process exits.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;

use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::db::records::{ArtifactStatusUpdate, JobStatusUpdate, WorkStatus};
use crate::db::ProjectStore;
use crate::error::ForgeError;
use crate::sanitize::redact_path;

use super::classify::{classify, ConversionOutcome};
use super::command::{validate_args, ConvertInvocation, ConverterSettings};
use super::error::ConversionError;
use super::plan::ConversionTask;
use super::sink::OutputSink;

/// Result of running one task, keyed so out-of-order completion maps back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskReport {
    pub task_id: Uuid,
    pub artifact_id: Uuid,
    pub draft_id: String,
    pub outcome: ConversionOutcome,
    /// True when the validator accepted the output.
    pub validated: bool,
    pub output_size: Option<u64>,
}

impl TaskReport {
    fn new(task: &ConversionTask, outcome: ConversionOutcome) -> Self {
        Self {
            task_id: task.task_id,
            artifact_id: task.artifact_id,
            draft_id: task.draft_id.clone(),
            outcome,
            validated: false,
            output_size: None,
        }
    }
}

pub struct ConversionRunner {
    settings: ConverterSettings,
}

impl ConversionRunner {
    pub fn new(settings: ConverterSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ConverterSettings {
        &self.settings
    }

    /// Runs the converter for one task. Failures reported by the converter
    /// come back as an outcome; `Err` means it could not be run at all.
    pub async fn convert(
        &self,
        task: &ConversionTask,
        sink: &dyn OutputSink,
        cancel: &CancellationToken,
    ) -> Result<ConversionOutcome, ConversionError> {
        let args = ConvertInvocation::for_task(task, self.settings.catalog.as_deref()).to_args()?;

        if let Some(parent) = task.xliff_abs_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ConversionError::PrepareOutput {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        // A file left by an earlier run must not pass as this run's output.
        match tokio::fs::remove_file(&task.xliff_abs_path).await {
            Ok(()) => tracing::debug!(file = %redact_path(&task.xliff_abs_path), "Removed previous output"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(ConversionError::PrepareOutput {
                    path: task.xliff_abs_path.clone(),
                    source,
                })
            }
        }

        execute(&self.settings.converter_program, args, task.task_id, sink, cancel).await
    }

    /// Runs the validator against a produced XLIFF file.
    pub async fn validate(
        &self,
        task_id: Uuid,
        xliff_path: &Path,
        sink: &dyn OutputSink,
        cancel: &CancellationToken,
    ) -> Result<ConversionOutcome, ConversionError> {
        let program = self
            .settings
            .validator_program
            .as_deref()
            .ok_or(ConversionError::NotConfigured("validator"))?;
        let args = validate_args(xliff_path, self.settings.catalog.as_deref())?;
        execute(program, args, task_id, sink, cancel).await
    }

    /// Converts, then validates the output when enabled. Never retries.
    pub async fn run_task(
        &self,
        task: &ConversionTask,
        sink: &dyn OutputSink,
        cancel: &CancellationToken,
    ) -> TaskReport {
        let span = tracing::info_span!(
            "conversion",
            task_id = %task.task_id,
            pair = %task.language_pair(),
            file = %redact_path(&task.source_path),
        );

        async move {
            let mut report = TaskReport::new(task, self.run_converter(task, sink, cancel).await);

            if report.outcome.is_success() {
                match tokio::fs::metadata(&task.xliff_abs_path).await {
                    Ok(meta) => report.output_size = Some(meta.len()),
                    Err(_) => {
                        report.outcome = ConversionOutcome::UnknownFailure {
                            message: "converter reported success but wrote no output".to_string(),
                        };
                    }
                }
            }

            if report.outcome.is_success()
                && self.settings.validate_output
                && self.settings.validator_program.is_some()
            {
                report.outcome = match self
                    .validate(task.task_id, &task.xliff_abs_path, sink, cancel)
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        tracing::error!(error = %e, "Validator could not run");
                        ConversionOutcome::from_error(&e)
                    }
                };
                report.validated = report.outcome.is_success();
            }

            match &report.outcome {
                ConversionOutcome::Success => {
                    tracing::info!(bytes = report.output_size, validated = report.validated, "Conversion completed")
                }
                ConversionOutcome::KnownFailure { kind, message } => {
                    tracing::warn!(kind = %kind, "Conversion failed: {}", message)
                }
                ConversionOutcome::UnknownFailure { message } => {
                    tracing::error!(needs_review = true, "Conversion failed: {}", message)
                }
                ConversionOutcome::Cancelled => tracing::info!("Conversion cancelled"),
            }

            report
        }
        .instrument(span)
        .await
    }

    async fn run_converter(
        &self,
        task: &ConversionTask,
        sink: &dyn OutputSink,
        cancel: &CancellationToken,
    ) -> ConversionOutcome {
        match self.convert(task, sink, cancel).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "Converter could not run");
                ConversionOutcome::from_error(&e)
            }
        }
    }

    /// Runs tasks with at most `limit` processes at a time; `1` runs them in
    /// order. Reports arrive in completion order.
    pub async fn run_plan(
        &self,
        tasks: &[ConversionTask],
        limit: usize,
        sink: &dyn OutputSink,
        cancel: &CancellationToken,
    ) -> Vec<TaskReport> {
        stream::iter(tasks)
            .map(|task| self.run_task(task, sink, cancel))
            .buffer_unordered(limit.max(1))
            .collect()
            .await
    }

    /// Runs a task and records its lifecycle on the artifact and job rows.
    ///
    /// A failed or cancelled job is re-queued first; a completed one is
    /// rejected by the store's transition check.
    pub async fn record_task(
        &self,
        store: &ProjectStore,
        task: &ConversionTask,
        sink: &dyn OutputSink,
        cancel: &CancellationToken,
    ) -> Result<TaskReport, ForgeError> {
        if let Some(job) = store.find_job(task.artifact_id, &task.job_type).await? {
            if matches!(job.status, WorkStatus::Failed | WorkStatus::Cancelled) {
                write_status(store, task, WorkStatus::Pending, None, None).await?;
            }
        }

        if cancel.is_cancelled() {
            let report = TaskReport::new(task, ConversionOutcome::Cancelled);
            write_status(store, task, WorkStatus::Cancelled, None, report.outcome.error_log()).await?;
            return Ok(report);
        }

        write_status(store, task, WorkStatus::Running, None, None).await?;
        let report = self.run_task(task, sink, cancel).await;

        let status = match &report.outcome {
            ConversionOutcome::Success => WorkStatus::Completed,
            ConversionOutcome::Cancelled => WorkStatus::Cancelled,
            _ => WorkStatus::Failed,
        };
        let size = report.output_size.and_then(|s| i64::try_from(s).ok());
        write_status(store, task, status, size, report.outcome.error_log()).await?;

        Ok(report)
    }

    /// `record_task` over a plan with bounded concurrency.
    pub async fn record_plan(
        &self,
        store: &ProjectStore,
        tasks: &[ConversionTask],
        limit: usize,
        sink: &dyn OutputSink,
        cancel: &CancellationToken,
    ) -> Result<Vec<TaskReport>, ForgeError> {
        let results: Vec<Result<TaskReport, ForgeError>> = stream::iter(tasks)
            .map(|task| self.record_task(store, task, sink, cancel))
            .buffer_unordered(limit.max(1))
            .collect()
            .await;
        results.into_iter().collect()
    }
}

async fn write_status(
    store: &ProjectStore,
    task: &ConversionTask,
    status: WorkStatus,
    size_bytes: Option<i64>,
    error_log: Option<String>,
) -> Result<(), ForgeError> {
    store
        .update_artifact_status(&ArtifactStatusUpdate {
            artifact_id: task.artifact_id,
            status,
            size_bytes,
            segment_count: None,
            token_count: None,
        })
        .await?;
    store
        .update_job_status(&JobStatusUpdate {
            artifact_id: task.artifact_id,
            job_type: task.job_type.clone(),
            status,
            error_log,
        })
        .await?;
    Ok(())
}

/// Spawns `program`, streams both pipes to `sink`, and classifies the result.
/// Cancellation kills the process.
async fn execute(
    program: &Path,
    args: Vec<OsString>,
    task_id: Uuid,
    sink: &dyn OutputSink,
    cancel: &CancellationToken,
) -> Result<ConversionOutcome, ConversionError> {
    if cancel.is_cancelled() {
        return Ok(ConversionOutcome::Cancelled);
    }

    let mut child = Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ConversionError::Spawn {
            program: program.to_path_buf(),
            source,
        })?;

    tracing::debug!(program = %redact_path(program), pid = child.id(), "Spawned process");

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let read_stdout = async {
        match stdout {
            Some(stdout) => drain_lines(stdout, |line| sink.on_stdout_line(task_id, line)).await,
            None => Vec::new(),
        }
    };

    let read_stderr = async {
        match stderr {
            Some(stderr) => drain_lines(stderr, |line| sink.on_stderr_line(task_id, line)).await,
            None => Vec::new(),
        }
    };

    let finished = tokio::select! {
        result = async {
            let (out, err) = tokio::join!(read_stdout, read_stderr);
            let status = child.wait().await;
            (out, err, status)
        } => Some(result),
        _ = cancel.cancelled() => None,
    };

    let Some((stdout_lines, stderr_lines, status)) = finished else {
        if let Err(e) = child.kill().await {
            tracing::warn!(error = %e, "Failed to kill cancelled process");
        }
        return Ok(ConversionOutcome::Cancelled);
    };

    let status = status.map_err(ConversionError::Wait)?;
    Ok(classify(status.code(), &stdout_lines, &stderr_lines))
}

/// Reads `reader` to EOF, one line at a time. Bytes that are not UTF-8 are
/// replaced rather than ending the read, so the child never sees a closed
/// pipe while it is still writing.
async fn drain_lines<R, F>(reader: R, mut on_line: F) -> Vec<String>
where
    R: AsyncRead + Unpin,
    F: FnMut(&str),
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut collected = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']).to_string();
                on_line(&line);
                collected.push(line);
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                // Keep the pipe open until the child is done with it.
                tracing::warn!(error = %e, "Failed to read process output; discarding the rest");
                if let Err(e) = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await {
                    tracing::debug!(error = %e, "Discarding process output failed");
                }
                break;
            }
        }
    }

    collected
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::conversion::classify::FailureKind;
    use crate::conversion::command::XliffVersion;
    use crate::conversion::sink::{BroadcastSink, NoopSink, OutputStream};
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn task(dir: &Path) -> ConversionTask {
        let source = dir.join("brochure.docx");
        std::fs::write(&source, b"doc").unwrap();
        ConversionTask {
            task_id: Uuid::new_v4(),
            draft_id: "draft-1".into(),
            project_id: Uuid::new_v4(),
            file_id: Uuid::new_v4(),
            artifact_id: Uuid::new_v4(),
            job_type: "xliff_conversion".into(),
            source_lang: "en-US".into(),
            target_lang: "de-DE".into(),
            source_path: source,
            xliff_rel_path: "Translations/en-US_de-DE/brochure.xlf".into(),
            xliff_abs_path: dir.join("Translations/en-US_de-DE/brochure.xlf"),
            xliff_version: XliffVersion::V2_1,
            paragraph: true,
            embed: true,
            format: None,
        }
    }

    // Writes to the path following -xliff.
    const WRITE_OUTPUT: &str = r#"out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "-xliff" ]; then out="$2"; fi
  shift
done
echo "Converting"
echo "<xliff/>" > "$out""#;

    fn runner(converter: PathBuf) -> ConversionRunner {
        ConversionRunner::new(ConverterSettings {
            converter_program: converter,
            validator_program: None,
            catalog: None,
            validate_output: false,
        })
    }

    #[tokio::test]
    async fn test_successful_conversion_streams_output() {
        let dir = TempDir::new().unwrap();
        let converter = script(dir.path(), "convert.sh", WRITE_OUTPUT);
        let task = task(dir.path());
        let sink = BroadcastSink::new(16);
        let mut rx = sink.subscribe();

        let report = runner(converter)
            .run_task(&task, &sink, &CancellationToken::new())
            .await;

        assert_eq!(report.outcome, ConversionOutcome::Success);
        assert_eq!(report.output_size, Some(9));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.stream, OutputStream::Stdout);
        assert_eq!(event.line, "Converting");
    }

    #[tokio::test]
    async fn test_known_failure_from_stderr() {
        let dir = TempDir::new().unwrap();
        let converter = script(dir.path(), "convert.sh", "echo 'Missing -srcLang parameter' >&2\nexit 1");
        let report = runner(converter)
            .run_task(&task(dir.path()), &NoopSink, &CancellationToken::new())
            .await;
        assert!(matches!(
            report.outcome,
            ConversionOutcome::KnownFailure {
                kind: FailureKind::MissingArgument,
                ..
            }
        ));
        assert_eq!(report.output_size, None);
    }

    #[tokio::test]
    async fn test_success_without_output_is_unknown_failure() {
        let dir = TempDir::new().unwrap();
        let converter = script(dir.path(), "convert.sh", "exit 0");
        let report = runner(converter)
            .run_task(&task(dir.path()), &NoopSink, &CancellationToken::new())
            .await;
        assert!(matches!(report.outcome, ConversionOutcome::UnknownFailure { .. }));
    }

    #[tokio::test]
    async fn test_validator_failure_overrides_success() {
        let dir = TempDir::new().unwrap();
        let converter = script(dir.path(), "convert.sh", WRITE_OUTPUT);
        let validator = script(
            dir.path(),
            "validate.sh",
            "echo 'SAXParseException: XML document structures must start and end within the same entity.' >&2\nexit 1",
        );
        let runner = ConversionRunner::new(ConverterSettings {
            converter_program: converter,
            validator_program: Some(validator),
            catalog: None,
            validate_output: true,
        });

        let report = runner
            .run_task(&task(dir.path()), &NoopSink, &CancellationToken::new())
            .await;
        assert!(matches!(
            report.outcome,
            ConversionOutcome::KnownFailure {
                kind: FailureKind::MalformedXml,
                ..
            }
        ));
        assert!(!report.validated);
    }

    #[tokio::test]
    async fn test_missing_program_is_missing_resources() {
        let dir = TempDir::new().unwrap();
        let report = runner(dir.path().join("no-such-converter"))
            .run_task(&task(dir.path()), &NoopSink, &CancellationToken::new())
            .await;
        assert!(matches!(
            report.outcome,
            ConversionOutcome::KnownFailure {
                kind: FailureKind::MissingResources,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_cancellation_kills_running_process() {
        let dir = TempDir::new().unwrap();
        let converter = script(dir.path(), "convert.sh", "echo started\nsleep 30");
        let runner = runner(converter);
        let task = task(dir.path());
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let outcome = runner.convert(&task, &NoopSink, &cancel).await.unwrap();
        assert_eq!(outcome, ConversionOutcome::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_run_plan_reports_every_task() {
        let dir = TempDir::new().unwrap();
        let converter = script(dir.path(), "convert.sh", WRITE_OUTPUT);
        let runner = runner(converter);
        let mut tasks = Vec::new();
        for target in ["de-DE", "fr-FR", "ja-JP"] {
            let mut t = task(dir.path());
            t.target_lang = target.to_string();
            t.xliff_abs_path = dir.path().join(format!("Translations/en-US_{target}/brochure.xlf"));
            tasks.push(t);
        }

        let reports = runner
            .run_plan(&tasks, 2, &NoopSink, &CancellationToken::new())
            .await;
        assert_eq!(reports.len(), 3);
        for t in &tasks {
            let report = reports.iter().find(|r| r.task_id == t.task_id).unwrap();
            assert!(report.outcome.is_success());
        }
    }

    #[tokio::test]
    async fn test_non_utf8_output_does_not_end_the_read() {
        let dir = TempDir::new().unwrap();
        let converter = script(
            dir.path(),
            "convert.sh",
            "printf 'Datei \\374ber\\n' >&2\necho 'Missing -srcLang parameter' >&2\nexit 1",
        );
        let sink = BroadcastSink::new(16);
        let mut rx = sink.subscribe();

        let report = runner(converter)
            .run_task(&task(dir.path()), &sink, &CancellationToken::new())
            .await;

        assert_eq!(
            report.outcome,
            ConversionOutcome::KnownFailure {
                kind: FailureKind::MissingArgument,
                message: "Missing -srcLang parameter".to_string(),
            }
        );
        let first = rx.recv().await.unwrap();
        assert_eq!(first.stream, OutputStream::Stderr);
        assert_eq!(first.line, "Datei \u{fffd}ber");
    }

    #[tokio::test]
    async fn test_long_output_after_invalid_byte_still_succeeds() {
        let dir = TempDir::new().unwrap();
        let body = format!(
            "{WRITE_OUTPUT}\nprintf '\\377\\n' >&2\ni=0\nwhile [ $i -lt 4000 ]; do echo \"WARNING: segment $i skipped\" >&2; i=$((i+1)); done\nexit 0"
        );
        let converter = script(dir.path(), "convert.sh", &body);

        let report = runner(converter)
            .run_task(&task(dir.path()), &NoopSink, &CancellationToken::new())
            .await;

        assert_eq!(report.outcome, ConversionOutcome::Success);
    }

    #[tokio::test]
    async fn test_stale_output_is_not_mistaken_for_success() {
        let dir = TempDir::new().unwrap();
        let task = task(dir.path());
        std::fs::create_dir_all(task.xliff_abs_path.parent().unwrap()).unwrap();
        std::fs::write(&task.xliff_abs_path, b"<xliff/> from an earlier run").unwrap();
        let converter = script(dir.path(), "convert.sh", "exit 0");

        let report = runner(converter)
            .run_task(&task, &NoopSink, &CancellationToken::new())
            .await;

        assert!(matches!(report.outcome, ConversionOutcome::UnknownFailure { .. }));
        assert!(!task.xliff_abs_path.exists());
    }

    #[tokio::test]
    async fn test_drain_lines_replaces_invalid_bytes() {
        let input: &[u8] = b"ok\r\nbad \xff byte\nlast";
        let mut seen = Vec::new();
        let lines = drain_lines(input, |line| seen.push(line.to_string())).await;
        assert_eq!(lines, vec!["ok", "bad \u{fffd} byte", "last"]);
        assert_eq!(seen, lines);
    }
}
