//! Single-shot execution of the external translator tool.
//! Each call spawns a fresh process, feeds it a stdin payload, collects both
//! output streams and enforces a terminate-then-kill deadline.

use std::io;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How long a terminated process gets to exit before the kill signal.
pub const KILL_GRACE: Duration = Duration::from_millis(1200);

/// Fully-specified invocation of the external tool.
#[derive(Debug, Clone)]
pub struct ExecPlan {
    pub program: String,
    pub args: Vec<String>,
    pub stdin_payload: String,
}

/// Outcome of one subprocess run.
#[derive(Debug)]
pub struct ProcessResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub spawn_error: Option<io::ErrorKind>,
}

/// Run the plan to completion, bounded by `deadline`.
///
/// On timeout or cancellation the process first receives a graceful
/// terminate signal; if it is still alive after `grace` it is killed
/// outright. Both signals end with `timed_out = true` in the result.
pub async fn run_process(
    plan: ExecPlan,
    deadline: Duration,
    grace: Duration,
    cancel: &CancellationToken,
) -> ProcessResult {
    let mut child = match Command::new(&plan.program)
        .args(&plan.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            warn!(program = %plan.program, error = %e, "failed to spawn external tool");
            return ProcessResult {
                exit_code: 1,
                stdout: String::new(),
                stderr: e.to_string(),
                timed_out: false,
                spawn_error: Some(e.kind()),
            };
        }
    };

    if let Some(mut stdin) = child.stdin.take() {
        let payload = plan.stdin_payload;
        tokio::spawn(async move {
            // The tool may exit before consuming everything; that is fine.
            let _ = stdin.write_all(payload.as_bytes()).await;
            let _ = stdin.shutdown().await;
        });
    }

    let stdout_task = read_stream(child.stdout.take());
    let stderr_task = read_stream(child.stderr.take());

    let mut timed_out = false;
    let exit_code = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => status.code().unwrap_or(1),
            Err(e) => {
                warn!(error = %e, "wait on external tool failed");
                1
            }
        },
        _ = sleep(deadline) => {
            timed_out = true;
            escalate(&mut child, grace).await
        }
        _ = cancel.cancelled() => {
            timed_out = true;
            escalate(&mut child, grace).await
        }
    };

    // A cut-short run may never deliver EOF (a leaked grandchild can keep the
    // pipes open), so the drain is bounded there.
    let stdout = drain(stdout_task, timed_out).await;
    let stderr = drain(stderr_task, timed_out).await;

    ProcessResult {
        exit_code,
        stdout,
        stderr,
        timed_out,
        spawn_error: None,
    }
}

fn read_stream<R>(stream: Option<R>) -> JoinHandle<String>
where
    R: AsyncReadExt + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut stream) = stream {
            let _ = stream.read_to_end(&mut buf).await;
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

async fn drain(task: JoinHandle<String>, bounded: bool) -> String {
    if bounded {
        match timeout(Duration::from_millis(250), task).await {
            Ok(Ok(text)) => text,
            _ => String::new(),
        }
    } else {
        task.await.unwrap_or_default()
    }
}

async fn escalate(child: &mut Child, grace: Duration) -> i32 {
    terminate(child);
    if let Ok(Ok(status)) = timeout(grace, child.wait()).await {
        debug!("external tool exited after terminate signal");
        return status.code().unwrap_or(1);
    }
    if let Err(e) = child.kill().await {
        warn!(error = %e, "failed to kill external tool");
    }
    match child.wait().await {
        Ok(status) => status.code().unwrap_or(1),
        Err(_) => 1,
    }
}

#[cfg(unix)]
fn terminate(child: &Child) {
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as i32, libc::SIGTERM);
        }
    }
}

#[cfg(not(unix))]
fn terminate(_child: &Child) {}
