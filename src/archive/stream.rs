use crate::config::DiffConfig;

use crossbeam_channel::{bounded, Receiver, Sender};
use std::io::{self, Read, Write};
use std::thread::{self, JoinHandle};
use tracing::warn;

type Chunk = io::Result<Vec<u8>>;
type CloseHook = Box<dyn FnOnce() + Send>;

/// A lazily produced archive.
///
/// Bytes are generated by a writer thread and handed over in fixed-size chunks
/// through a bounded channel. Closing the stream (explicitly or by dropping it)
/// stops the writer, waits for it, then runs the close hook exactly once.
pub struct ArchiveStream {
    rx: Option<Receiver<Chunk>>,
    current: Vec<u8>,
    pos: usize,
    writer: Option<JoinHandle<()>>,
    on_close: Option<CloseHook>,
}

impl ArchiveStream {
    /// Starts `produce` on a writer thread feeding this stream.
    pub(crate) fn spawn<F>(config: &DiffConfig, produce: F) -> io::Result<Self>
    where
        F: FnOnce(&mut ChunkSink) -> io::Result<()> + Send + 'static,
    {
        let (tx, rx) = bounded::<Chunk>(config.max_inflight.max(1));
        let chunk_size = config.chunk_size.max(1);

        let writer = thread::Builder::new()
            .name("layerdiff-export".into())
            .spawn(move || {
                let mut sink = ChunkSink::new(tx.clone(), chunk_size);
                let result = produce(&mut sink).and_then(|_| sink.flush());
                if let Err(e) = result {
                    // A closed reader is not an error worth reporting.
                    if e.kind() != io::ErrorKind::BrokenPipe {
                        let _ = tx.send(Err(e));
                    }
                }
            })?;

        Ok(Self {
            rx: Some(rx),
            current: Vec::new(),
            pos: 0,
            writer: Some(writer),
            on_close: None,
        })
    }

    /// Registers a hook that runs once the stream is closed.
    ///
    /// Hooks registered earlier run first.
    pub fn on_close<F>(mut self, hook: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_close = Some(match self.on_close.take() {
            Some(previous) => Box::new(move || {
                previous();
                hook();
            }),
            None => Box::new(hook),
        });
        self
    }

    /// Stops the writer and runs the close hook. Further calls are no-ops.
    pub fn close(&mut self) {
        self.rx = None;
        if let Some(writer) = self.writer.take() {
            if writer.join().is_err() {
                warn!("archive writer panicked");
            }
        }
        if let Some(hook) = self.on_close.take() {
            hook();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.rx.is_none() && self.writer.is_none() && self.on_close.is_none()
    }

    /// Called when the writer hung up: a clean exit is end of stream, a panic is an error.
    fn finish_writer(&mut self) -> io::Result<()> {
        self.rx = None;
        match self.writer.take() {
            Some(writer) => writer
                .join()
                .map_err(|_| io::Error::new(io::ErrorKind::Other, "archive writer panicked")),
            None => Ok(()),
        }
    }
}

impl Read for ArchiveStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.pos < self.current.len() {
                let n = buf.len().min(self.current.len() - self.pos);
                buf[..n].copy_from_slice(&self.current[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }

            let Some(rx) = &self.rx else { return Ok(0) };
            match rx.recv() {
                Ok(Ok(chunk)) => {
                    self.current = chunk;
                    self.pos = 0;
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    self.finish_writer()?;
                    return Ok(0);
                }
            }
        }
    }
}

impl Drop for ArchiveStream {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ArchiveStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveStream")
            .field("closed", &self.is_closed())
            .field("buffered", &(self.current.len() - self.pos))
            .finish()
    }
}

/// Buffers writes and forwards them as chunks of at least `chunk_size` bytes.
pub(crate) struct ChunkSink {
    tx: Sender<Chunk>,
    buf: Vec<u8>,
    chunk_size: usize,
}

impl ChunkSink {
    fn new(tx: Sender<Chunk>, chunk_size: usize) -> Self {
        Self { tx, buf: Vec::with_capacity(chunk_size), chunk_size }
    }

    fn send_buffer(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = std::mem::replace(&mut self.buf, Vec::with_capacity(self.chunk_size));
        self.tx
            .send(Ok(chunk))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "archive reader closed"))
    }
}

impl Write for ChunkSink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        if self.buf.len() >= self.chunk_size {
            self.send_buffer()?;
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_buffer()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn small_config() -> DiffConfig {
        DiffConfig { chunk_size: 4, max_inflight: 1, ..DiffConfig::default() }
    }

    #[test]
    fn test_reads_everything_in_order() {
        let data: Vec<u8> = (0..100u8).collect();
        let expected = data.clone();
        let mut stream = ArchiveStream::spawn(&small_config(), move |sink| sink.write_all(&data)).unwrap();

        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_close_hook_runs_once_after_early_close() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut stream = ArchiveStream::spawn(&small_config(), |sink| {
            for _ in 0..1000 {
                sink.write_all(b"abcdefgh")?;
            }
            Ok(())
        })
        .unwrap()
        .on_close(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let mut first = [0u8; 3];
        stream.read_exact(&mut first).unwrap();
        stream.close();
        stream.close();
        drop(stream);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_writer_error_surfaces_on_read() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut stream = ArchiveStream::spawn(&small_config(), |sink| {
            sink.write_all(b"ok")?;
            Err(io::Error::new(io::ErrorKind::NotFound, "entry vanished"))
        })
        .unwrap()
        .on_close(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let mut out = Vec::new();
        let err = stream.read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        drop(stream);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
