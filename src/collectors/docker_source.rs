use crate::collectors::log_source::{LineSource, SourceLine, StreamSource};
use crate::error::CollectorError;
use log::{debug, info, warn};
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// How long a terminated child gets to exit before it is killed
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// Line source streaming a container's logs through `docker logs -f`
///
/// Starts at the tail of the log (`--tail 0`) so only requests made after
/// the watcher started are seen. stdout and stderr are merged, matching
/// nginx's split of access log and error log.
pub struct DockerLogSource {
    container: String,
    child: Option<Child>,
    lines: StreamSource,
}

impl DockerLogSource {
    /// Spawn `docker logs -f --tail 0 <container>`
    ///
    /// # Errors
    ///
    /// Returns `CollectorError::SubprocessSpawn` if docker cannot be started.
    pub fn spawn(container: &str) -> Result<Self, CollectorError> {
        Self::spawn_command(
            Command::new("docker").args(["logs", "-f", "--tail", "0", container]),
            container,
        )
    }

    /// Spawn an arbitrary command as the log stream
    fn spawn_command(command: &mut Command, container: &str) -> Result<Self, CollectorError> {
        debug!("Spawning log stream for container {}", container);

        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CollectorError::SubprocessSpawn(format!("docker logs: {}", e)))?;

        let mut readers: Vec<Box<dyn Read + Send>> = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(Box::new(stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(Box::new(stderr));
        }

        info!("Streaming logs from container {}", container);
        Ok(Self {
            container: container.to_string(),
            child: Some(child),
            lines: StreamSource::from_readers(readers),
        })
    }

    /// Ask the child to exit, then kill it if it does not within the grace period
    fn terminate(child: &mut Child) -> Result<(), CollectorError> {
        if child.try_wait()?.is_some() {
            return Ok(());
        }

        #[cfg(unix)]
        {
            // SAFETY: kill(2) has no memory-safety preconditions; the pid
            // belongs to a child we have not yet reaped.
            let result = unsafe { libc::kill(child.id() as libc::pid_t, libc::SIGTERM) };
            if result != 0 {
                warn!(
                    "Failed to send SIGTERM to log stream: {}",
                    std::io::Error::last_os_error()
                );
            }

            let deadline = Instant::now() + TERMINATE_GRACE;
            while Instant::now() < deadline {
                if child.try_wait()?.is_some() {
                    return Ok(());
                }
                thread::sleep(Duration::from_millis(50));
            }
            warn!("Log stream did not exit after SIGTERM, killing it");
        }

        if let Err(e) = child.kill() {
            warn!("Failed to kill log stream subprocess: {}", e);
        }
        child.wait()?;
        Ok(())
    }
}

impl LineSource for DockerLogSource {
    fn poll_line(&mut self, wait: Duration) -> Result<SourceLine, CollectorError> {
        match self.lines.poll_line(wait)? {
            SourceLine::EndOfStream => {
                // Both pipes closed; find out whether docker exited cleanly
                let Some(mut child) = self.child.take() else {
                    return Ok(SourceLine::EndOfStream);
                };
                let status = child.wait()?;
                if status.success() {
                    info!("Log stream for {} ended", self.container);
                    Ok(SourceLine::EndOfStream)
                } else {
                    Err(CollectorError::SubprocessTerminated(format!(
                        "docker logs for {} exited with {}",
                        self.container, status
                    )))
                }
            }
            other => Ok(other),
        }
    }

    fn close(&mut self) -> Result<(), CollectorError> {
        if let Some(mut child) = self.child.take() {
            debug!("Stopping log stream for container {}", self.container);
            Self::terminate(&mut child)?;
        }
        self.lines.close()
    }
}

impl Drop for DockerLogSource {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to stop log stream: {}", e);
        }
    }
}
