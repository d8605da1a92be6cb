//! Command executor tests against a scripted transport

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use linux_commander::session::{
    CommandExecutor, CommandRequest, CommandStatus, Session, ShutdownSignal,
};
use linux_commander::transport::{MockTransport, Transport, TransportError};
use linux_commander::transport::mock::{MockEvent, MockReply};
use linux_commander::ui::CaptureRenderer;

fn executor(transport: MockTransport, shutdown: ShutdownSignal) -> (CommandExecutor, Arc<CaptureRenderer>) {
    let renderer = Arc::new(CaptureRenderer::new());
    let executor = CommandExecutor::new(Box::new(transport), renderer.clone(), shutdown)
        .with_defaults(Duration::from_secs(5), Duration::ZERO, Duration::from_millis(500));
    (executor, renderer)
}

#[tokio::test]
async fn test_timeout_keeps_partial_output() {
    let transport = MockTransport::builder()
        .respond_with("tail -f /var/log/messages", MockReply::hang("line one\r\nline two\r\n"))
        .build();
    let (executor, renderer) = executor(transport, ShutdownSignal::new());
    let mut session = Session::new("web01", 22, "root");

    let request = executor
        .request("tail -f /var/log/messages")
        .with_timeout(Duration::from_secs(1))
        .silent();
    let result = executor.send_command(&mut session, request).await;

    assert!(!result.success);
    assert_eq!(result.status, CommandStatus::TimedOut);
    assert!(result.output.contains("line one"));
    assert!(result.output.contains("line two"));
    assert!(renderer.text().is_empty());
}

#[tokio::test]
async fn test_displayed_timeout_is_reported() {
    let transport = MockTransport::builder()
        .respond_with("tail -f /var/log/messages", MockReply::hang("line one\r\n"))
        .build();
    let (executor, renderer) = executor(transport, ShutdownSignal::new());
    let mut session = Session::new("web01", 22, "root");

    let request = executor
        .request("tail -f /var/log/messages")
        .with_timeout(Duration::from_secs(1));
    let result = executor.send_command(&mut session, request).await;

    assert_eq!(result.status, CommandStatus::TimedOut);
    assert!(result.output.is_empty());
    assert!(renderer.text().contains("line one"));
    assert!(renderer.text().contains("No prompt after 1s"));
}

/// Shell running something like `yes`: output is always waiting
#[derive(Clone, Default)]
struct EndlessShell {
    written: Arc<Mutex<Vec<String>>>,
}

impl Transport for EndlessShell {
    fn write_line(&mut self, line: &str) -> Result<(), TransportError> {
        self.written.lock().unwrap().push(line.to_string());
        Ok(())
    }

    fn data_available(&mut self) -> Result<bool, TransportError> {
        Ok(true)
    }

    fn read(&mut self) -> Result<String, TransportError> {
        Ok("y\n".to_string())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn is_open(&self) -> bool {
        true
    }

    fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_endless_output_times_out_and_frees_channel() {
    let shell = EndlessShell::default();
    let written = shell.written.clone();
    let renderer = Arc::new(CaptureRenderer::new());
    let executor = CommandExecutor::new(Box::new(shell), renderer, ShutdownSignal::new())
        .with_defaults(Duration::from_millis(300), Duration::ZERO, Duration::from_millis(100));
    let mut session = Session::new("web01", 22, "root");

    let outcome = tokio::time::timeout(Duration::from_secs(10), async {
        let first = executor
            .send_command(&mut session, executor.request("yes").silent())
            .await;
        let second = executor
            .send_command(&mut session, executor.request("uptime").silent())
            .await;
        (first, second)
    })
    .await;

    let (first, second) = outcome.expect("commands should end at their timeout");
    assert_eq!(first.status, CommandStatus::TimedOut);
    assert!(first.output.contains('y'));
    assert_eq!(second.status, CommandStatus::TimedOut);
    assert_eq!(*written.lock().unwrap(), vec!["yes", "uptime"]);
}

#[tokio::test]
async fn test_concurrent_commands_run_one_at_a_time() {
    let transport = MockTransport::builder()
        .respond_with("sleep 1", MockReply::output("").after(Duration::from_millis(300)))
        .respond("uptime", "up 3 days\r\n")
        .build();
    let handle = transport.handle();
    let (executor, _renderer) = executor(transport, ShutdownSignal::new());

    let first = {
        let executor = executor.clone();
        tokio::spawn(async move {
            let mut session = Session::new("web01", 22, "root");
            executor.send_command(&mut session, CommandRequest::new("sleep 1")).await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut session = Session::new("web01", 22, "root");
    let second = executor.send_command(&mut session, CommandRequest::new("uptime")).await;
    let first = first.await.unwrap();

    assert!(first.success);
    assert!(second.success);

    let events = handle.events();
    let ready_sleep = events.iter().find_map(|e| match e {
        MockEvent::Ready { line, at } if line == "sleep 1" => Some(*at),
        _ => None,
    });
    let write_uptime = events.iter().find_map(|e| match e {
        MockEvent::Write { line, at } if line == "uptime" => Some(*at),
        _ => None,
    });
    assert!(write_uptime.unwrap() >= ready_sleep.unwrap());
}

#[tokio::test]
async fn test_cd_updates_remote_directory() {
    let transport = MockTransport::builder()
        .respond("cd /etc/nginx", "")
        .respond("pwd", "/etc/nginx\r\n")
        .build();
    let handle = transport.handle();
    let (executor, renderer) = executor(transport, ShutdownSignal::new());
    let mut session = Session::new("web01", 22, "root");

    let result = executor
        .send_command(&mut session, CommandRequest::new("cd /etc/nginx"))
        .await;

    assert!(result.success);
    assert_eq!(session.remote_directory.as_deref(), Some("/etc/nginx"));
    assert_eq!(handle.written_lines(), vec!["cd /etc/nginx", "pwd"]);
    assert!(!renderer.text().contains("/etc/nginx\n"));
}

#[tokio::test]
async fn test_failed_directory_query_keeps_directory() {
    let transport = MockTransport::builder()
        .respond("cd /opt/app", "")
        .respond_with("pwd", MockReply::hang(""))
        .build();
    let handle = transport.handle();
    let renderer = Arc::new(CaptureRenderer::new());
    let executor = CommandExecutor::new(Box::new(transport), renderer, ShutdownSignal::new())
        .with_defaults(Duration::from_secs(1), Duration::ZERO, Duration::from_millis(200));
    let mut session = Session::new("web01", 22, "root");
    session.remote_directory = Some("/root".to_string());

    let result = executor
        .send_command(&mut session, executor.request("cd /opt/app"))
        .await;

    assert!(result.success);
    assert_eq!(handle.written_lines(), vec!["cd /opt/app", "pwd"]);
    assert_eq!(session.remote_directory.as_deref(), Some("/root"));
}

#[tokio::test]
async fn test_min_wait_delays_without_changing_result() {
    let transport = MockTransport::builder().respond("hostname", "web01\r\n").build();
    let (executor, _renderer) = executor(transport, ShutdownSignal::new());
    let mut session = Session::new("web01", 22, "root");

    let started = Instant::now();
    let request = executor
        .request("hostname")
        .with_min_wait(Duration::from_millis(400))
        .silent();
    let result = executor.send_command(&mut session, request).await;

    assert!(started.elapsed() >= Duration::from_millis(400));
    assert!(result.success);
    assert_eq!(result.output, "web01");
}

#[tokio::test]
async fn test_closed_channel_triggers_shutdown() {
    let transport = MockTransport::builder()
        .respond_with("reboot", MockReply::closed())
        .build();
    let shutdown = ShutdownSignal::new();
    let (executor, renderer) = executor(transport, shutdown.clone());
    let mut session = Session::new("web01", 22, "root");

    let result = executor.send_command(&mut session, CommandRequest::new("reboot")).await;

    assert_eq!(result.status, CommandStatus::Failed);
    assert!(shutdown.is_triggered());
    assert!(!executor.is_open());
    assert!(renderer.text().contains("could not be sent"));
}
