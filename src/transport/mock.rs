//! Mock implementations of the transport and connector
//! Used for testing without a reachable SSH server

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::{ConnectError, ConnectTarget, Connector, Transport, TransportError};

/// Scripted reply to one command line
#[derive(Debug, Clone)]
pub struct MockReply {
    /// Output produced by the command
    pub output: String,
    /// Delay before the output becomes readable
    pub delay: Duration,
    /// Whether the shell prompt follows the output
    pub prompt: bool,
    /// Whether the channel dies after the command is written
    pub close: bool,
}

impl MockReply {
    /// Output followed by the prompt
    pub fn output(text: impl Into<String>) -> Self {
        Self {
            output: text.into(),
            delay: Duration::ZERO,
            prompt: true,
            close: false,
        }
    }

    /// Output that never returns to the prompt
    pub fn hang(text: impl Into<String>) -> Self {
        Self {
            prompt: false,
            ..Self::output(text)
        }
    }

    /// The channel closes once the command is written
    pub fn closed() -> Self {
        Self {
            close: true,
            prompt: false,
            ..Self::output("")
        }
    }

    /// Delay the output
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Observable events recorded by the mock
#[derive(Debug, Clone)]
pub enum MockEvent {
    /// A line was written
    Write { line: String, at: Instant },
    /// Output for a written line became readable
    Ready { line: String, at: Instant },
    /// Buffered data was read
    Read { text: String },
    /// The channel was closed locally
    Close,
}

#[derive(Debug)]
struct MockState {
    prompt: String,
    echo: bool,
    replies: HashMap<String, VecDeque<MockReply>>,
    fallback: MockReply,
    pending: VecDeque<(Instant, String, String)>,
    events: Vec<MockEvent>,
    open: bool,
}

/// Handle for inspecting a mock transport after it was moved into a session
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every line written so far
    pub fn written_lines(&self) -> Vec<String> {
        self.lock()
            .events
            .iter()
            .filter_map(|event| match event {
                MockEvent::Write { line, .. } => Some(line.clone()),
                _ => None,
            })
            .collect()
    }

    /// Full event log
    pub fn events(&self) -> Vec<MockEvent> {
        self.lock().events.clone()
    }

    /// Queue unsolicited output, as a remote banner or a late message would be
    pub fn inject(&self, text: impl Into<String>) {
        let mut state = self.lock();
        state
            .pending
            .push_back((Instant::now(), String::new(), text.into()));
    }

    /// Whether the channel is still open
    pub fn is_open(&self) -> bool {
        self.lock().open
    }
}

/// Builder for scripted transports
#[derive(Debug, Clone)]
pub struct MockTransportBuilder {
    prompt: String,
    echo: bool,
    banner: Option<String>,
    replies: HashMap<String, VecDeque<MockReply>>,
    fallback: MockReply,
}

impl MockTransportBuilder {
    /// Prompt printed after every completed command
    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Whether written lines are echoed back, as a PTY does
    pub fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Output waiting on the channel before the first command
    pub fn banner(mut self, banner: impl Into<String>) -> Self {
        self.banner = Some(banner.into());
        self
    }

    /// Reply to `command` with `output` followed by the prompt
    pub fn respond(self, command: &str, output: &str) -> Self {
        self.respond_with(command, MockReply::output(output))
    }

    /// Reply to `command` with a custom reply. Calling this repeatedly for
    /// the same command queues replies; the last one repeats.
    pub fn respond_with(mut self, command: &str, reply: MockReply) -> Self {
        self.replies
            .entry(command.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    /// Reply used for commands without a scripted reply
    pub fn fallback(mut self, reply: MockReply) -> Self {
        self.fallback = reply;
        self
    }

    /// Build the transport
    pub fn build(self) -> MockTransport {
        let mut pending = VecDeque::new();
        if let Some(banner) = self.banner {
            pending.push_back((Instant::now(), String::new(), banner));
        }

        MockTransport {
            state: Arc::new(Mutex::new(MockState {
                prompt: self.prompt,
                echo: self.echo,
                replies: self.replies,
                fallback: self.fallback,
                pending,
                events: Vec::new(),
                open: true,
            })),
        }
    }
}

/// Scripted in-memory transport
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Start scripting a transport with a bracketed bash prompt and echo on
    pub fn builder() -> MockTransportBuilder {
        MockTransportBuilder {
            prompt: "[root@web01 ~]# ".to_string(),
            echo: true,
            banner: None,
            replies: HashMap::new(),
            fallback: MockReply::output(""),
        }
    }

    /// Inspection handle sharing this transport's state
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: self.state.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Transport for MockTransport {
    fn write_line(&mut self, line: &str) -> Result<(), TransportError> {
        let mut state = self.lock();
        if !state.open {
            return Err(TransportError::Closed);
        }

        let now = Instant::now();
        state.events.push(MockEvent::Write {
            line: line.to_string(),
            at: now,
        });

        let reply = match state.replies.get_mut(line) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        }
        .unwrap_or_else(|| state.fallback.clone());

        if reply.close {
            state.open = false;
            return Ok(());
        }

        let mut text = String::new();
        if state.echo {
            text.push_str(line);
            text.push_str("\r\n");
        }
        text.push_str(&reply.output);
        if reply.prompt {
            text.push_str(&state.prompt);
        }

        state
            .pending
            .push_back((now + reply.delay, line.to_string(), text));
        Ok(())
    }

    fn data_available(&mut self) -> Result<bool, TransportError> {
        let state = self.lock();
        let now = Instant::now();
        Ok(state
            .pending
            .front()
            .map(|(ready_at, _, _)| *ready_at <= now)
            .unwrap_or(false))
    }

    fn read(&mut self) -> Result<String, TransportError> {
        let mut state = self.lock();
        let now = Instant::now();
        let mut text = String::new();

        while let Some((ready_at, _, _)) = state.pending.front() {
            if *ready_at > now {
                break;
            }
            if let Some((ready_at, line, chunk)) = state.pending.pop_front() {
                if !line.is_empty() {
                    state.events.push(MockEvent::Ready { line, at: ready_at });
                }
                text.push_str(&chunk);
            }
        }

        if !text.is_empty() {
            state.events.push(MockEvent::Read { text: text.clone() });
        }
        Ok(text)
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.lock().open
    }

    fn close(&mut self) -> Result<(), TransportError> {
        let mut state = self.lock();
        if state.open {
            state.open = false;
            state.events.push(MockEvent::Close);
        }
        Ok(())
    }
}

/// Connector handing out scripted transports
pub struct MockConnector {
    builder: MockTransportBuilder,
    password: Option<String>,
    attempts: Arc<Mutex<Vec<ConnectTarget>>>,
    last: Arc<Mutex<Option<MockHandle>>>,
}

impl MockConnector {
    /// Accept any credential and hand out transports built from `builder`
    pub fn new(builder: MockTransportBuilder) -> Self {
        Self {
            builder,
            password: None,
            attempts: Arc::new(Mutex::new(Vec::new())),
            last: Arc::new(Mutex::new(None)),
        }
    }

    /// Only accept this password
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Every connection attempt so far
    pub fn attempts(&self) -> Vec<ConnectTarget> {
        self.attempts
            .lock()
            .map(|attempts| attempts.clone())
            .unwrap_or_default()
    }

    /// Handle to the most recently created transport
    pub fn last_transport(&self) -> Option<MockHandle> {
        self.last.lock().ok().and_then(|last| last.clone())
    }
}

impl Connector for MockConnector {
    fn connect(&self, target: &ConnectTarget) -> Result<Box<dyn Transport>, ConnectError> {
        if let Ok(mut attempts) = self.attempts.lock() {
            attempts.push(target.clone());
        }

        if let Some(expected) = &self.password {
            if &target.password != expected {
                return Err(ConnectError::AuthRejected {
                    user: target.username.clone(),
                });
            }
        }

        let transport = self.builder.clone().build();
        if let Ok(mut last) = self.last.lock() {
            *last = Some(transport.handle());
        }
        Ok(Box::new(transport))
    }
}
