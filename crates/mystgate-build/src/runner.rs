//! Builder subprocess execution.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use crate::BuildError;
use crate::coordinator::BuildSettings;
use crate::inject;

/// A single build of one project.
pub(crate) struct BuildJob {
    pub(crate) root: PathBuf,
    pub(crate) base_url: String,
    pub(crate) settings: Arc<BuildSettings>,
}

impl BuildJob {
    fn program(&self) -> &str {
        self.settings.command.first().map_or("builder", String::as_str)
    }
}

/// Last `capacity` output lines.
struct OutputTail {
    lines: VecDeque<String>,
    capacity: usize,
}

impl OutputTail {
    fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    fn push(&mut self, line: String) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    fn join(&self) -> String {
        self.lines
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Run the builder for `job`, reporting each non-empty output line.
///
/// stdout and stderr are consumed concurrently and merged in arrival order.
/// After a zero exit the entry file must exist, and the optional fragment
/// is injected into the produced HTML.
pub(crate) async fn execute(
    job: &BuildJob,
    mut on_line: impl FnMut(&str),
) -> Result<(), BuildError> {
    let settings = &job.settings;
    let program = job.program().to_owned();

    let mut child = Command::new(&program)
        .args(settings.command.iter().skip(1))
        .current_dir(&job.root)
        .env(&settings.base_url_env, &job.base_url)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| BuildError::Spawn {
            program: program.clone(),
            source,
        })?;

    let mut stdout = child.stdout.take().map(LineReader::new);
    let mut stderr = child.stderr.take().map(LineReader::new);

    let mut tail = OutputTail::new(settings.log_lines);

    loop {
        let line = tokio::select! {
            line = next_line(&mut stdout), if stdout.is_some() => line,
            line = next_line(&mut stderr), if stderr.is_some() => line,
            else => break,
        };
        if let Some(line) = line {
            let line = line.trim_end();
            if !line.is_empty() {
                on_line(line);
                tail.push(line.to_owned());
            }
        }
    }

    let status = child.wait().await?;
    if !status.success() {
        return Err(BuildError::Failed {
            program,
            status: describe_status(status),
            output: tail.join(),
        });
    }

    let output_dir = job.root.join(&settings.output_dir);
    let entry = output_dir.join(&settings.entry_file);
    if !tokio::fs::try_exists(&entry).await.unwrap_or(false) {
        return Err(BuildError::MissingEntry(entry));
    }

    if let Some(fragment) = settings.inject.clone() {
        let injected =
            tokio::task::spawn_blocking(move || inject::inject_fragment(&output_dir, &fragment))
                .await
                .map_err(|e| BuildError::Aborted(e.to_string()))??;
        tracing::debug!(root = %job.root.display(), files = injected, "Injected rebuild button");
    }

    Ok(())
}

/// Builder output pipe read line by line.
///
/// Partial lines survive a cancelled read in `buf`, so the reader can sit in
/// a `select!` loop without losing output.
struct LineReader<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            buf: Vec::new(),
        }
    }

    /// Next line, decoded lossily, or `None` at EOF.
    async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        let read = self.reader.read_until(b'\n', &mut self.buf).await?;
        if read == 0 && self.buf.is_empty() {
            return Ok(None);
        }
        let line = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        Ok(Some(line))
    }
}

/// Read the next line from an optional stream, closing it on EOF.
///
/// Non-UTF-8 output is replaced rather than treated as an error, so the pipe
/// keeps being drained and the builder never sees a closed pipe.
async fn next_line<R>(stream: &mut Option<LineReader<R>>) -> Option<String>
where
    R: AsyncRead + Unpin,
{
    let reader = stream.as_mut()?;
    loop {
        match reader.next_line().await {
            Ok(Some(line)) => return Some(line),
            Ok(None) => {
                *stream = None;
                return None;
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => {
                tracing::warn!(error = %e, "Stopped reading builder output");
                *stream = None;
                return None;
            }
        }
    }
}

fn describe_status(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {code}"),
        None => status.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sh_job(root: &std::path::Path, script: &str) -> BuildJob {
        BuildJob {
            root: root.to_path_buf(),
            base_url: "/user/alice/myst/docs".to_owned(),
            settings: Arc::new(BuildSettings {
                command: vec!["sh".to_owned(), "-c".to_owned(), script.to_owned()],
                ..BuildSettings::default()
            }),
        }
    }

    #[test]
    fn test_output_tail_keeps_last_lines() {
        let mut tail = OutputTail::new(2);
        tail.push("one".to_owned());
        tail.push("two".to_owned());
        tail.push("three".to_owned());
        assert_eq!(tail.join(), "two\nthree");
    }

    #[tokio::test]
    async fn test_execute_success_reports_lines() {
        let dir = tempfile::tempdir().unwrap();
        let job = sh_job(
            dir.path(),
            "echo starting; echo; echo warn >&2; \
             mkdir -p _build/html && echo '<body></body>' > _build/html/index.html",
        );

        let mut lines = Vec::new();
        execute(&job, |line| lines.push(line.to_owned()))
            .await
            .unwrap();

        lines.sort();
        assert_eq!(lines, vec!["starting", "warn"]);
    }

    #[tokio::test]
    async fn test_line_reader_decodes_lossily() {
        let mut reader = LineReader::new(&b"caf\xe9\nlast"[..]);

        assert_eq!(
            reader.next_line().await.unwrap().as_deref(),
            Some("caf\u{FFFD}\n")
        );
        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("last"));
        assert_eq!(reader.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_execute_tolerates_non_utf8_output() {
        let dir = tempfile::tempdir().unwrap();
        let job = sh_job(
            dir.path(),
            "printf 'caf\\351\\n'; i=0; while [ $i -lt 2000 ]; do echo line$i; i=$((i+1)); done; \
             mkdir -p _build/html && echo '<body></body>' > _build/html/index.html",
        );

        let mut lines = Vec::new();
        execute(&job, |line| lines.push(line.to_owned()))
            .await
            .unwrap();

        assert_eq!(lines.len(), 2001);
        assert_eq!(lines[0], "caf\u{FFFD}");
        assert_eq!(lines[2000], "line1999");
    }

    #[tokio::test]
    async fn test_execute_failure_keeps_non_utf8_tail() {
        let dir = tempfile::tempdir().unwrap();
        let job = sh_job(dir.path(), "printf 'bad \\351 byte\\n' >&2; echo 'template error'; exit 2");

        let err = execute(&job, |_| {}).await.unwrap_err();

        let message = err.to_string();
        assert!(message.contains("bad \u{FFFD} byte"), "{message}");
        assert!(message.contains("template error"), "{message}");
    }

    #[tokio::test]
    async fn test_execute_passes_base_url_and_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let job = sh_job(
            dir.path(),
            "mkdir -p _build/html && printf '%s' \"$BASE_URL\" > _build/html/index.html",
        );

        execute(&job, |_| {}).await.unwrap();

        let written = std::fs::read_to_string(dir.path().join("_build/html/index.html")).unwrap();
        assert_eq!(written, "/user/alice/myst/docs");
    }

    #[tokio::test]
    async fn test_execute_failure_carries_output() {
        let dir = tempfile::tempdir().unwrap();
        let job = sh_job(dir.path(), "echo compiling; echo 'template error' >&2; exit 2");

        let err = execute(&job, |_| {}).await.unwrap_err();

        let message = err.to_string();
        assert!(message.contains("exit code 2"), "{message}");
        assert!(message.contains("template error"), "{message}");
    }

    #[tokio::test]
    async fn test_execute_failure_keeps_only_tail() {
        let dir = tempfile::tempdir().unwrap();
        let mut job = sh_job(dir.path(), "for i in 1 2 3 4 5; do echo line$i; done; exit 1");
        job.settings = Arc::new(BuildSettings {
            log_lines: 2,
            ..(*job.settings).clone()
        });

        let err = execute(&job, |_| {}).await.unwrap_err();

        match err {
            BuildError::Failed { output, .. } => assert_eq!(output, "line4\nline5"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_execute_missing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let job = sh_job(dir.path(), "echo done");

        let err = execute(&job, |_| {}).await.unwrap_err();

        assert!(matches!(err, BuildError::MissingEntry(_)));
    }

    #[tokio::test]
    async fn test_execute_spawn_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut job = sh_job(dir.path(), "");
        job.settings = Arc::new(BuildSettings {
            command: vec!["mystgate-no-such-builder".to_owned()],
            ..BuildSettings::default()
        });

        let err = execute(&job, |_| {}).await.unwrap_err();

        assert!(matches!(err, BuildError::Spawn { .. }));
        assert!(err.to_string().contains("mystgate-no-such-builder"));
    }

    #[tokio::test]
    async fn test_execute_injects_fragment() {
        let dir = tempfile::tempdir().unwrap();
        let mut job = sh_job(
            dir.path(),
            "mkdir -p _build/html && echo '<html><body>hi</body></html>' > _build/html/index.html",
        );
        job.settings = Arc::new(BuildSettings {
            inject: Some("<!--x-->".to_owned()),
            ..(*job.settings).clone()
        });

        execute(&job, |_| {}).await.unwrap();

        let html = std::fs::read_to_string(dir.path().join("_build/html/index.html")).unwrap();
        assert_eq!(html, "<html><body>hi<!--x--></body></html>\n");
    }

    #[tokio::test]
    async fn test_execute_inject_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut job = sh_job(
            dir.path(),
            "mkdir -p _build/html && echo '<body></body>' > _build/html/index.html \
             && echo '<div></div>' > _build/html/embed.html",
        );
        job.settings = Arc::new(BuildSettings {
            inject: Some("<!--x-->".to_owned()),
            ..(*job.settings).clone()
        });

        let err = execute(&job, |_| {}).await.unwrap_err();

        assert!(matches!(err, BuildError::MissingBodyTag(_)));
    }
}
