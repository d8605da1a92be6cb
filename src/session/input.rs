//! Line input for the command loop
//!
//! A dedicated thread reads one line per request. Nothing is read while no
//! request is outstanding, so password prompts can own the terminal between
//! commands.

use std::io::BufRead;
use std::sync::mpsc as std_mpsc;
use tokio::sync::oneshot;
use tracing::debug;

type LineReply = oneshot::Sender<Option<String>>;

/// Reads input lines on request
pub struct InputReader {
    requests: std_mpsc::Sender<LineReply>,
}

impl InputReader {
    /// Read from the process's standard input
    pub fn stdin() -> Self {
        Self::spawn(|| {
            let mut line = String::new();
            match std::io::stdin().read_line(&mut line) {
                Ok(0) | Err(_) => None,
                Ok(_) => Some(line),
            }
        })
    }

    /// Read from any buffered source, one line per request
    pub fn from_reader<R: BufRead + Send + 'static>(mut reader: R) -> Self {
        Self::spawn(move || {
            let mut line = String::new();
            match reader.read_line(&mut line) {
                Ok(0) | Err(_) => None,
                Ok(_) => Some(line),
            }
        })
    }

    /// Serve the given lines, then report end of input
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let text: String = lines
            .into_iter()
            .map(|line| format!("{}\n", line.into()))
            .collect();
        Self::from_reader(std::io::Cursor::new(text.into_bytes()))
    }

    fn spawn<F>(mut read: F) -> Self
    where
        F: FnMut() -> Option<String> + Send + 'static,
    {
        let (requests, pending) = std_mpsc::channel::<LineReply>();

        std::thread::spawn(move || {
            while let Ok(reply) = pending.recv() {
                let line = read().map(|l| l.trim_end_matches(['\r', '\n']).to_string());
                let finished = line.is_none();
                let _ = reply.send(line);
                if finished {
                    break;
                }
            }
            debug!("Input reader finished");
        });

        Self { requests }
    }

    /// Next line; `None` once input has ended
    pub async fn next_line(&mut self) -> Option<String> {
        let (reply, line) = oneshot::channel();
        self.requests.send(reply).ok()?;
        line.await.ok().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lines_then_end() {
        let mut reader = InputReader::from_lines(["dir", "exit"]);

        assert_eq!(reader.next_line().await.as_deref(), Some("dir"));
        assert_eq!(reader.next_line().await.as_deref(), Some("exit"));
        assert_eq!(reader.next_line().await, None);
        assert_eq!(reader.next_line().await, None);
    }
}
