//! Command execution against the shell channel
//!
//! Only one command is ever in flight: [`CommandExecutor::send_command`] holds an
//! async lock for the whole round-trip, including the directory follow-up of a
//! `cd`. The blocking write-and-wait runs on a `spawn_blocking` worker that
//! reports back exactly once through a oneshot channel.

use regex::Regex;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, error, info, warn};

use super::Session;
use super::output::{self, PromptMatch, default_completion_pattern};
use super::signal::{CancelToken, ShutdownSignal};
use crate::transport::{ExpectOutcome, Transport, TransportError};
use crate::ui::{Renderer, SemanticColor};

/// Timeout used when none is given or the given limits are inconsistent
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Extra time the worker gets before it is cancelled
pub const DEFAULT_GRACE: Duration = Duration::from_millis(500);

/// Upper bound on reads when draining the channel
const MAX_DRAIN_READS: usize = 256;

/// One command to send
#[derive(Debug, Clone)]
pub struct CommandRequest {
    command: String,
    expect: Option<Regex>,
    timeout: Duration,
    min_wait: Duration,
    display: bool,
}

impl CommandRequest {
    /// Displayed request with the default pattern and timeout.
    /// Trailing whitespace and one trailing `\` are dropped.
    pub fn new(command: &str) -> Self {
        let command = command.trim_end();
        let command = command.strip_suffix('\\').unwrap_or(command);

        Self {
            command: command.to_string(),
            expect: None,
            timeout: DEFAULT_TIMEOUT,
            min_wait: Duration::ZERO,
            display: true,
        }
    }

    /// Capture the output instead of showing it
    pub fn silent(mut self) -> Self {
        self.display = false;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_min_wait(mut self, min_wait: Duration) -> Self {
        self.min_wait = min_wait;
        self
    }

    /// Wait for `pattern` instead of a prompt or question
    pub fn expecting(mut self, pattern: Regex) -> Self {
        self.expect = Some(pattern);
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn is_displayed(&self) -> bool {
        self.display
    }

    /// Effective `(timeout, min_wait)`; a minimum wait that is not shorter
    /// than the timeout resets both to the defaults
    pub fn limits(&self) -> (Duration, Duration) {
        if self.min_wait >= self.timeout {
            (DEFAULT_TIMEOUT, Duration::ZERO)
        } else {
            (self.timeout, self.min_wait)
        }
    }

    /// Completion pattern
    pub fn pattern(&self) -> &Regex {
        self.expect.as_ref().unwrap_or_else(|| default_completion_pattern())
    }
}

/// How a command ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    /// The completion pattern was seen
    Matched,
    /// The timeout elapsed first; output holds what was read
    TimedOut,
    /// The transport failed
    Failed,
    /// The worker was cancelled before reporting
    Cancelled,
}

/// Outcome of one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub success: bool,
    /// Normalized output of a silent request; empty when it was displayed
    pub output: String,
    pub status: CommandStatus,
}

impl CommandResult {
    fn new(status: CommandStatus, output: String) -> Self {
        Self {
            success: status == CommandStatus::Matched,
            output,
            status,
        }
    }

    /// Result for a command that was never sent
    pub fn not_sent() -> Self {
        Self::new(CommandStatus::Failed, String::new())
    }
}

/// Sends commands over one transport, one at a time
#[derive(Clone)]
pub struct CommandExecutor {
    transport: Arc<StdMutex<Box<dyn Transport>>>,
    /// Held for a whole round-trip
    in_flight: Arc<Mutex<()>>,
    renderer: Arc<dyn Renderer>,
    shutdown: ShutdownSignal,
    grace: Duration,
    default_timeout: Duration,
    default_min_wait: Duration,
}

impl CommandExecutor {
    pub fn new(
        transport: Box<dyn Transport>,
        renderer: Arc<dyn Renderer>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            transport: Arc::new(StdMutex::new(transport)),
            in_flight: Arc::new(Mutex::new(())),
            renderer,
            shutdown,
            grace: DEFAULT_GRACE,
            default_timeout: DEFAULT_TIMEOUT,
            default_min_wait: Duration::ZERO,
        }
    }

    /// Limits applied by [`CommandExecutor::request`]
    pub fn with_defaults(mut self, timeout: Duration, min_wait: Duration, grace: Duration) -> Self {
        self.default_timeout = timeout;
        self.default_min_wait = min_wait;
        self.grace = grace;
        self
    }

    /// Request carrying the configured limits
    pub fn request(&self, command: &str) -> CommandRequest {
        CommandRequest::new(command)
            .with_timeout(self.default_timeout)
            .with_min_wait(self.default_min_wait)
    }

    /// Send one command and wait for it to complete.
    ///
    /// A command starting with `cd ` is followed by a silent `pwd` that
    /// updates the session's working directory; the caller gets the `cd`
    /// result.
    pub async fn send_command(&self, session: &mut Session, request: CommandRequest) -> CommandResult {
        let _in_flight = self.in_flight.lock().await;

        let result = self.execute(session, &request).await;

        if request.command().starts_with("cd ")
            && matches!(result.status, CommandStatus::Matched | CommandStatus::TimedOut)
        {
            self.follow_directory(session).await;
        }

        result
    }

    async fn execute(&self, session: &mut Session, request: &CommandRequest) -> CommandResult {
        let (timeout, min_wait) = request.limits();
        let started = Instant::now();
        debug!("Sending command: {}", request.command());

        let (status, raw) = match self
            .round_trip(request.command(), request.pattern().clone(), timeout)
            .await
        {
            Some(Ok(outcome)) if outcome.matched => (CommandStatus::Matched, outcome.buffer),
            Some(Ok(outcome)) if self.shutdown.is_triggered() => {
                (CommandStatus::Cancelled, outcome.buffer)
            }
            Some(Ok(outcome)) => {
                info!("Command '{}' timed out after {:?}", request.command(), timeout);
                (CommandStatus::TimedOut, outcome.buffer)
            }
            Some(Err(e)) => {
                if e.is_fatal() {
                    error!("Channel lost while running '{}': {}", request.command(), e);
                    self.shutdown.trigger("remote channel closed");
                } else {
                    warn!("Transport error while running '{}': {}", request.command(), e);
                }
                (CommandStatus::Failed, String::new())
            }
            None => (CommandStatus::Cancelled, String::new()),
        };

        let normalized = output::normalize(&raw, request.command());
        match &normalized.prompt {
            Some(PromptMatch::ShellPrompt(token)) => {
                if token.chars().count() > 1 {
                    session.prompt = Some(token.clone());
                }
                session.question_pending = false;
            }
            Some(PromptMatch::Question(_)) => session.question_pending = true,
            None => {}
        }

        // Output goes to the screen or into the result, never both
        let output = if request.is_displayed() {
            self.render(&normalized.text, status, timeout);
            String::new()
        } else {
            normalized.text
        };

        let elapsed = started.elapsed();
        if elapsed < min_wait {
            tokio::time::sleep(min_wait - elapsed).await;
        }

        CommandResult::new(status, output)
    }

    async fn round_trip(
        &self,
        command: &str,
        pattern: Regex,
        timeout: Duration,
    ) -> Option<Result<ExpectOutcome, TransportError>> {
        let (done_tx, done_rx) = oneshot::channel();
        let cancel = self.shutdown.cancel_token();
        let worker_cancel = cancel.clone();
        let transport = self.transport.clone();
        let command = command.to_string();

        tokio::task::spawn_blocking(move || {
            let result = run_worker(&transport, &command, &pattern, timeout, &worker_cancel);
            let _ = done_tx.send(result);
        });

        let mut done_rx = done_rx;
        match tokio::time::timeout(timeout + self.grace, &mut done_rx).await {
            Ok(Ok(result)) => return Some(result),
            Ok(Err(_)) => {
                error!("Command worker ended without reporting");
                return None;
            }
            Err(_) => {
                warn!("Command worker did not report in time, cancelling");
                cancel.cancel();
            }
        }

        // A cancelled worker still reports what it read so far
        match tokio::time::timeout(self.grace, done_rx).await {
            Ok(Ok(result)) => Some(result),
            _ => {
                error!("Command worker did not stop after cancellation");
                None
            }
        }
    }

    fn render(&self, text: &str, status: CommandStatus, timeout: Duration) {
        if !text.is_empty() {
            self.renderer.render_output(text);
        }

        match status {
            CommandStatus::Matched => {}
            CommandStatus::TimedOut => self.renderer.emit(
                &format!(
                    "No prompt after {}s; the command may still be running.",
                    timeout.as_secs()
                ),
                SemanticColor::Warning,
                true,
            ),
            CommandStatus::Failed => {
                self.renderer
                    .emit("The command could not be sent.", SemanticColor::Error, true)
            }
            CommandStatus::Cancelled => {
                self.renderer
                    .emit("The command was cancelled.", SemanticColor::Warning, true)
            }
        }
    }

    async fn follow_directory(&self, session: &mut Session) {
        let request = self.request("pwd").silent();
        let result = self.execute(session, &request).await;
        if !result.success {
            debug!("Directory query after cd did not complete");
            return;
        }

        match parse_directory_reply(&result.output) {
            Some(directory) => {
                debug!("Remote directory is now {}", directory);
                session.remote_directory = Some(directory);
            }
            None => debug!("Ignoring directory reply: {:?}", result.output),
        }
    }

    /// Whether the channel is still usable
    pub fn is_open(&self) -> bool {
        match self.transport.try_lock() {
            Ok(transport) => transport.is_open(),
            // A worker holds it, so the channel was usable a moment ago
            Err(_) => true,
        }
    }

    /// Close the channel once no command is in flight
    pub async fn close(&self) {
        let _in_flight = self.in_flight.lock().await;
        let transport = self.transport.clone();

        let closed = tokio::task::spawn_blocking(move || {
            let mut transport = transport.lock().unwrap_or_else(|p| p.into_inner());
            transport.close()
        })
        .await;

        match closed {
            Ok(Ok(())) => debug!("Channel closed"),
            Ok(Err(e)) => warn!("Error while closing channel: {}", e),
            Err(e) => warn!("Close task failed: {}", e),
        }
    }
}

/// Blocking part of a round-trip
fn run_worker(
    transport: &StdMutex<Box<dyn Transport>>,
    command: &str,
    pattern: &Regex,
    timeout: Duration,
    cancel: &CancelToken,
) -> Result<ExpectOutcome, TransportError> {
    let mut transport = transport.lock().unwrap_or_else(|p| p.into_inner());
    let transport = transport.as_mut();

    let stale = drain(transport)?;
    if !stale.is_empty() {
        debug!("Discarded {} bytes of stale output", stale.len());
    }
    transport.flush()?;

    transport.write_line(command)?;
    transport.flush()?;

    let mut outcome = transport.expect(pattern, timeout, cancel)?;
    outcome.buffer.push_str(&drain(transport)?);
    Ok(outcome)
}

/// Read whatever is already waiting on the channel
fn drain(transport: &mut dyn Transport) -> Result<String, TransportError> {
    let mut text = String::new();
    for _ in 0..MAX_DRAIN_READS {
        if !transport.data_available()? {
            break;
        }
        text.push_str(&transport.read()?);
    }
    Ok(text)
}

/// Directory from a `pwd` reply: the last non-empty line, without a trailing
/// `$`, when it is an absolute path
pub fn parse_directory_reply(output: &str) -> Option<String> {
    let line = output.lines().map(str::trim).rfind(|line| !line.is_empty())?;
    let line = line.strip_suffix('$').unwrap_or(line).trim_end();

    line.starts_with('/').then(|| line.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use crate::transport::mock::MockReply;
    use crate::ui::CaptureRenderer;

    fn executor(transport: MockTransport) -> (CommandExecutor, Arc<CaptureRenderer>) {
        let renderer = Arc::new(CaptureRenderer::new());
        let executor = CommandExecutor::new(Box::new(transport), renderer.clone(), ShutdownSignal::new());
        (executor, renderer)
    }

    #[test]
    fn test_request_trims_command() {
        assert_eq!(CommandRequest::new("ls -l \\").command(), "ls -l ");
        assert_eq!(CommandRequest::new("uptime   ").command(), "uptime");
        assert_eq!(CommandRequest::new("echo a\\\\").command(), "echo a\\");
    }

    #[test]
    fn test_inconsistent_limits_reset() {
        let request = CommandRequest::new("sleep 5")
            .with_timeout(Duration::from_secs(3))
            .with_min_wait(Duration::from_secs(4));
        assert_eq!(request.limits(), (DEFAULT_TIMEOUT, Duration::ZERO));

        let request = CommandRequest::new("sleep 5")
            .with_timeout(Duration::from_secs(30))
            .with_min_wait(Duration::from_secs(4));
        assert_eq!(request.limits(), (Duration::from_secs(30), Duration::from_secs(4)));
    }

    #[test]
    fn test_parse_directory_reply() {
        assert_eq!(parse_directory_reply("/etc\n").as_deref(), Some("/etc"));
        assert_eq!(parse_directory_reply("/home/deploy$").as_deref(), Some("/home/deploy"));
        assert_eq!(parse_directory_reply("motd\n/var/log").as_deref(), Some("/var/log"));
        assert_eq!(parse_directory_reply("bash: pwd: not found"), None);
        assert_eq!(parse_directory_reply(""), None);
    }

    #[tokio::test]
    async fn test_displayed_output_is_not_captured() {
        let transport = MockTransport::builder()
            .respond("uptime", "10:01:02 up 3 days\r\n")
            .build();
        let (executor, renderer) = executor(transport);
        let mut session = Session::new("web01", 22, "root");

        let result = executor.send_command(&mut session, CommandRequest::new("uptime")).await;

        assert!(result.success);
        assert_eq!(result.status, CommandStatus::Matched);
        assert!(result.output.is_empty());
        assert_eq!(renderer.text(), "10:01:02 up 3 days\n");
        assert_eq!(session.prompt.as_deref(), Some("[root@web01 ~]#"));
    }

    #[tokio::test]
    async fn test_silent_command_is_not_rendered() {
        let transport = MockTransport::builder().respond("hostname", "web01\r\n").build();
        let (executor, renderer) = executor(transport);
        let mut session = Session::new("web01", 22, "root");

        let result = executor
            .send_command(&mut session, CommandRequest::new("hostname").silent())
            .await;

        assert_eq!(result.output, "web01");
        assert!(renderer.text().is_empty());
    }

    #[tokio::test]
    async fn test_question_sets_pending_flag() {
        let transport = MockTransport::builder()
            .respond_with("yum remove httpd", MockReply::hang("Is this ok [y/N]?: "))
            .build();
        let (executor, renderer) = executor(transport);
        let mut session = Session::new("web01", 22, "root");

        let result = executor
            .send_command(&mut session, CommandRequest::new("yum remove httpd"))
            .await;

        assert!(result.success);
        assert!(session.question_pending);
        assert!(renderer.text().ends_with("?: "));
    }

    #[tokio::test]
    async fn test_stale_output_is_discarded() {
        let transport = MockTransport::builder().respond("id", "uid=0(root)\r\n").build();
        transport.handle().inject("Last login: yesterday\r\n");
        let (executor, _renderer) = executor(transport);
        let mut session = Session::new("web01", 22, "root");

        let result = executor
            .send_command(&mut session, CommandRequest::new("id").silent())
            .await;
        assert_eq!(result.output, "uid=0(root)");
    }
}
