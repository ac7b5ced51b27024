use crate::error::CollectorError;
use log::{debug, warn};
use std::io::{BufRead, BufReader, Read};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Lines a source may read ahead of the consumer before its readers block
pub const LINE_BUFFER: usize = 1024;

/// Result of a single pull from a line source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLine {
    /// One complete line, without its trailing newline
    Line(String),
    /// Nothing arrived within the requested wait
    Idle,
    /// The source is exhausted and will never yield another line
    EndOfStream,
}

/// Pull-based provider of an in-order sequence of log lines
///
/// The watcher calls `poll_line` with a short wait so it can notice a
/// shutdown request between lines without the source having to know
/// about it.
pub trait LineSource: Send {
    /// Wait up to `wait` for the next line
    fn poll_line(&mut self, wait: Duration) -> Result<SourceLine, CollectorError>;

    /// Release the underlying resource
    ///
    /// Must be safe to call more than once.
    fn close(&mut self) -> Result<(), CollectorError>;
}

/// Line source fed by one or more readers on background threads
///
/// Each reader gets its own thread which splits the byte stream into lines
/// and forwards them over a channel. Lines from different readers are
/// interleaved in the order they are read. The source reports end of stream
/// once every reader has hit EOF.
pub struct StreamSource {
    receiver: Option<Receiver<Result<String, std::io::Error>>>,
    reader_threads: Vec<JoinHandle<()>>,
}

impl StreamSource {
    /// Create a source reading from a single reader
    ///
    /// # Example
    ///
    /// ```
    /// use std::io::Cursor;
    /// use std::time::Duration;
    /// use poolwatch::collectors::{LineSource, SourceLine, StreamSource};
    ///
    /// let mut source = StreamSource::from_reader(Cursor::new("first\n"));
    /// let line = source.poll_line(Duration::from_secs(1)).unwrap();
    /// assert_eq!(line, SourceLine::Line("first".to_string()));
    /// ```
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: Read + Send + 'static,
    {
        Self::from_readers(vec![Box::new(reader)])
    }

    /// Create a source merging several readers, e.g. a child's stdout and stderr
    pub fn from_readers(readers: Vec<Box<dyn Read + Send>>) -> Self {
        Self::with_buffer(readers, LINE_BUFFER)
    }

    /// Create a source whose readers stay at most `buffer` lines ahead
    ///
    /// Reader threads block once the buffer is full, so a slow consumer
    /// pushes back on the underlying pipe instead of queueing lines.
    pub fn with_buffer(readers: Vec<Box<dyn Read + Send>>, buffer: usize) -> Self {
        let (sender, receiver) = mpsc::sync_channel(buffer);

        let reader_threads = readers
            .into_iter()
            .map(|reader| {
                let sender = sender.clone();
                thread::spawn(move || Self::reader_thread(reader, sender))
            })
            .collect();

        Self {
            receiver: Some(receiver),
            reader_threads,
        }
    }

    /// Split a byte stream into lines and forward them until EOF
    fn reader_thread(
        reader: Box<dyn Read + Send>,
        sender: SyncSender<Result<String, std::io::Error>>,
    ) {
        let mut reader = BufReader::new(reader);
        let mut buffer = Vec::new();

        loop {
            buffer.clear();
            match reader.read_until(b'\n', &mut buffer) {
                Ok(0) => {
                    debug!("Line reader reached end of input");
                    break;
                }
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buffer);
                    let line = line.trim_end_matches(['\n', '\r']).to_string();
                    if sender.send(Ok(line)).is_err() {
                        // Receiver dropped, source was closed
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    let _ = sender.send(Err(e));
                    break;
                }
            }
        }
    }
}

impl LineSource for StreamSource {
    fn poll_line(&mut self, wait: Duration) -> Result<SourceLine, CollectorError> {
        let Some(receiver) = self.receiver.as_ref() else {
            return Ok(SourceLine::EndOfStream);
        };

        match receiver.recv_timeout(wait) {
            Ok(Ok(line)) => Ok(SourceLine::Line(line)),
            Ok(Err(e)) => Err(CollectorError::IoError(e)),
            Err(RecvTimeoutError::Timeout) => Ok(SourceLine::Idle),
            Err(RecvTimeoutError::Disconnected) => Ok(SourceLine::EndOfStream),
        }
    }

    fn close(&mut self) -> Result<(), CollectorError> {
        // Dropping the receiver makes every reader thread stop at its next line
        self.receiver.take();

        // Readers blocked on a pipe that never closes (stdin) are left detached
        let threads = std::mem::take(&mut self.reader_threads);
        let unfinished = threads.iter().filter(|h| !h.is_finished()).count();
        for handle in threads.into_iter().filter(|h| h.is_finished()) {
            if handle.join().is_err() {
                warn!("Line reader thread panicked");
            }
        }
        if unfinished > 0 {
            debug!("{} line reader thread(s) still blocked on input", unfinished);
        }

        Ok(())
    }
}

impl Drop for StreamSource {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const WAIT: Duration = Duration::from_secs(2);

    fn drain(source: &mut StreamSource) -> Vec<String> {
        let mut lines = Vec::new();
        loop {
            match source.poll_line(WAIT).unwrap() {
                SourceLine::Line(line) => lines.push(line),
                SourceLine::Idle => continue,
                SourceLine::EndOfStream => break,
            }
        }
        lines
    }

    #[test]
    fn test_stream_source_yields_lines_in_order() {
        let mut source = StreamSource::from_reader(Cursor::new("one\ntwo\r\nthree"));

        assert_eq!(drain(&mut source), vec!["one", "two", "three"]);
    }

    #[test]
    fn test_stream_source_end_of_stream_is_sticky() {
        let mut source = StreamSource::from_reader(Cursor::new(""));

        assert_eq!(source.poll_line(WAIT).unwrap(), SourceLine::EndOfStream);
        assert_eq!(source.poll_line(WAIT).unwrap(), SourceLine::EndOfStream);
    }

    #[test]
    fn test_stream_source_merges_readers() {
        let mut source = StreamSource::from_readers(vec![
            Box::new(Cursor::new("a1\na2\n")),
            Box::new(Cursor::new("b1\n")),
        ]);

        let mut lines = drain(&mut source);
        lines.sort();
        assert_eq!(lines, vec!["a1", "a2", "b1"]);
    }

    #[test]
    fn test_stream_source_invalid_utf8_is_lossy() {
        let bytes: Vec<u8> = vec![b'o', b'k', 0xFF, b'\n'];
        let mut source = StreamSource::from_reader(Cursor::new(bytes));

        let lines = drain(&mut source);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("ok"));
    }

    #[test]
    #[cfg(unix)]
    fn test_stream_source_idle_while_pipe_open() {
        let (reader, _writer) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut source = StreamSource::from_reader(reader);

        assert_eq!(
            source.poll_line(Duration::from_millis(50)).unwrap(),
            SourceLine::Idle
        );
    }

    /// Reader producing `total` one-line chunks, counting how many were read
    struct CountingReader {
        produced: Arc<AtomicUsize>,
        total: usize,
    }

    impl Read for CountingReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.produced.load(Ordering::SeqCst) >= self.total || buf.len() < 2 {
                return Ok(0);
            }
            self.produced.fetch_add(1, Ordering::SeqCst);
            buf[..2].copy_from_slice(b"x\n");
            Ok(2)
        }
    }

    #[test]
    fn test_stream_source_readers_stay_within_buffer() {
        let produced = Arc::new(AtomicUsize::new(0));
        let reader = CountingReader {
            produced: Arc::clone(&produced),
            total: 200_000,
        };
        let mut source = StreamSource::with_buffer(vec![Box::new(reader)], 16);

        assert_eq!(
            source.poll_line(WAIT).unwrap(),
            SourceLine::Line("x".to_string())
        );
        std::thread::sleep(Duration::from_millis(200));

        // Buffered lines, plus one blocked in send and one being read
        let read_ahead = produced.load(Ordering::SeqCst);
        assert!(read_ahead <= 1 + 16 + 2, "reader ran ahead by {}", read_ahead);
    }

    #[test]
    fn test_stream_source_close_is_idempotent() {
        let mut source = StreamSource::from_reader(Cursor::new("line\n"));

        assert!(source.close().is_ok());
        assert!(source.close().is_ok());
        assert_eq!(source.poll_line(WAIT).unwrap(), SourceLine::EndOfStream);
    }
}
