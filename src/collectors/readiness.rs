use crate::error::{CollectorError, ReadinessError};
use log::{debug, error, info};
use std::process::{Command, Output, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Check whether the log source can be streamed yet
#[cfg_attr(test, mockall::automock)]
pub trait ReadinessCheck {
    /// Check once; errors count as "not ready"
    fn is_ready(&self) -> Result<bool, CollectorError>;

    /// Human-readable name of what is being checked
    fn target(&self) -> String;
}

/// Check that asks the docker daemon whether a container is running
pub struct DockerContainerCheck {
    container: String,
    timeout: Duration,
}

impl DockerContainerCheck {
    /// Create a check for the named container with a 2 second per-check timeout
    pub fn new(container: String) -> Self {
        Self {
            container,
            timeout: Duration::from_secs(2),
        }
    }
}

impl ReadinessCheck for DockerContainerCheck {
    fn is_ready(&self) -> Result<bool, CollectorError> {
        let output = run_with_timeout(
            Command::new("docker").args(["inspect", "-f", "{{.State.Running}}", self.container.as_str()]),
            self.timeout,
        )?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(output.status.success() && stdout.to_lowercase().contains("true"))
    }

    fn target(&self) -> String {
        format!("container '{}'", self.container)
    }
}

/// Run a command to completion, killing it if it outlives `timeout`
fn run_with_timeout(command: &mut Command, timeout: Duration) -> Result<Output, CollectorError> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| CollectorError::SubprocessSpawn(e.to_string()))?;

    let deadline = Instant::now() + timeout;
    loop {
        if child.try_wait()?.is_some() {
            return Ok(child.wait_with_output()?);
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(CollectorError::SubprocessTerminated(format!(
                "check did not finish within {:?}",
                timeout
            )));
        }
        thread::sleep(Duration::from_millis(20));
    }
}

/// Poll `check` until it reports ready
///
/// Makes at most `attempts` checks, `interval` apart. Gives up early with
/// `ReadinessError::Interrupted` once `running` is cleared.
pub fn wait_until_ready(
    check: &dyn ReadinessCheck,
    attempts: u32,
    interval: Duration,
    running: &AtomicBool,
) -> Result<(), ReadinessError> {
    info!("Waiting for {} to be running...", check.target());

    for attempt in 1..=attempts {
        if !running.load(Ordering::SeqCst) {
            return Err(ReadinessError::Interrupted);
        }

        match check.is_ready() {
            Ok(true) => {
                info!("{} is running", check.target());
                return Ok(());
            }
            Ok(false) => debug!("{} not ready (attempt {}/{})", check.target(), attempt, attempts),
            Err(e) => debug!(
                "Readiness check failed (attempt {}/{}): {}",
                attempt, attempts, e
            ),
        }

        if attempt < attempts {
            thread::sleep(interval);
        }
    }

    error!("Timed out waiting for {}", check.target());
    Err(ReadinessError::Timeout { attempts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::Sequence;

    fn mock_check() -> MockReadinessCheck {
        let mut check = MockReadinessCheck::new();
        check
            .expect_target()
            .returning(|| "container 'nginx_proxy'".to_string());
        check
    }

    #[test]
    fn test_ready_on_first_attempt() {
        let mut check = mock_check();
        check.expect_is_ready().times(1).returning(|| Ok(true));

        let running = AtomicBool::new(true);
        assert!(wait_until_ready(&check, 5, Duration::ZERO, &running).is_ok());
    }

    #[test]
    fn test_ready_after_failures() {
        let mut check = mock_check();
        let mut seq = Sequence::new();
        check
            .expect_is_ready()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|| Ok(false));
        check
            .expect_is_ready()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Err(CollectorError::SubprocessSpawn("docker missing".to_string())));
        check
            .expect_is_ready()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(true));

        let running = AtomicBool::new(true);
        assert!(wait_until_ready(&check, 10, Duration::ZERO, &running).is_ok());
    }

    #[test]
    fn test_times_out_after_bounded_attempts() {
        let mut check = mock_check();
        check.expect_is_ready().times(3).returning(|| Ok(false));

        let running = AtomicBool::new(true);
        let result = wait_until_ready(&check, 3, Duration::ZERO, &running);

        assert!(matches!(result, Err(ReadinessError::Timeout { attempts: 3 })));
    }

    #[test]
    fn test_interrupted_by_shutdown() {
        let mut check = mock_check();
        check.expect_is_ready().times(0);

        let running = AtomicBool::new(false);
        let result = wait_until_ready(&check, 3, Duration::ZERO, &running);

        assert!(matches!(result, Err(ReadinessError::Interrupted)));
    }

    #[test]
    #[cfg(unix)]
    fn test_run_with_timeout_kills_slow_command() {
        let result = run_with_timeout(
            Command::new("sleep").arg("5"),
            Duration::from_millis(100),
        );

        assert!(matches!(
            result,
            Err(CollectorError::SubprocessTerminated(_))
        ));
    }

    #[test]
    #[cfg(unix)]
    fn test_run_with_timeout_collects_output() {
        let output = run_with_timeout(
            Command::new("echo").arg("true"),
            Duration::from_secs(2),
        )
        .unwrap();

        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "true");
    }
}
