use crate::sys::{peer_pid, send_signal};
use crate::{RestartError, RestartOutcome, Restarter};
use ctk_options::RestartMode;
use std::fs;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Reloads a running engine with `SIGHUP`.
///
/// The engine is found through its pid file when one is configured and
/// present, otherwise through the peer credentials of its API socket. After
/// signalling, the socket is polled until it accepts connections again or
/// the timeout runs out.
#[derive(Debug, Clone)]
pub struct SignalRestarter {
    socket: PathBuf,
    pid_file: Option<PathBuf>,
    timeout: Duration,
    poll_interval: Duration,
}

impl SignalRestarter {
    pub fn new(socket: &Path, pid_file: Option<PathBuf>, timeout: Duration) -> Self {
        Self {
            socket: socket.to_path_buf(),
            pid_file,
            timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn locate_pid(&self) -> Result<i32, RestartError> {
        if let Some(pid_file) = &self.pid_file {
            match fs::read_to_string(pid_file) {
                Ok(content) => {
                    return content
                        .trim()
                        .parse::<i32>()
                        .ok()
                        .filter(|pid| *pid > 0)
                        .ok_or_else(|| RestartError::InvalidPidFile {
                            path: pid_file.clone(),
                            content: content.trim().to_owned(),
                        });
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(
                        "pid file {} not found, asking the socket instead",
                        pid_file.display()
                    );
                }
                Err(e) => return Err(RestartError::Io(e)),
            }
        }

        let stream =
            UnixStream::connect(&self.socket).map_err(|source| RestartError::EngineNotRunning {
                socket: self.socket.clone(),
                source,
            })?;
        peer_pid(&stream).map_err(|source| RestartError::EngineNotRunning {
            socket: self.socket.clone(),
            source,
        })
    }

    fn wait_for_socket(&self) -> Result<Duration, RestartError> {
        let start = Instant::now();
        loop {
            if UnixStream::connect(&self.socket).is_ok() {
                return Ok(start.elapsed());
            }
            let waited = start.elapsed();
            if waited >= self.timeout {
                return Err(RestartError::Timeout {
                    socket: self.socket.clone(),
                    waited,
                });
            }
            std::thread::sleep(self.poll_interval.min(self.timeout - waited));
        }
    }
}

impl Restarter for SignalRestarter {
    fn mode(&self) -> RestartMode {
        RestartMode::Signal
    }

    fn restart(&self) -> Result<RestartOutcome, RestartError> {
        let pid = self.locate_pid()?;
        info!("sending SIGHUP to engine pid {pid}");
        send_signal(pid, libc::SIGHUP).map_err(|source| RestartError::SignalFailed { pid, source })?;

        let waited = self.wait_for_socket()?;
        info!(
            "engine socket {} responsive after {waited:?}",
            self.socket.display()
        );
        Ok(RestartOutcome::Restarted)
    }
}
