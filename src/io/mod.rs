//! # Buffered Input
//!
//! Byte source for the demuxer: regular files (optionally several,
//! binary-concatenated), stdin, a bound UDP socket, or a single accepted
//! TCP sender. On top of the backend it provides the small rewind window
//! the sync-byte hunt needs, the `past`/`total_past` position counters,
//! and live-stream semantics where "no data right now" means "sleep a
//! second and try again" instead of end of file.

use crate::config::{InputSource, Options};
use crate::error::{Result, TsCapError};
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::{TcpListener, UdpSocket};

/// Bytes of look-back [`BufferedInput::seek_back`] guarantees across
/// reads.
pub const REWIND_WINDOW: usize = 8;

enum Backend {
    Reader(Box<dyn AsyncRead + Unpin + Send>),
    Udp {
        socket: UdpSocket,
        datagram: Vec<u8>,
        offset: usize,
    },
}

/// Buffered, rewindable input over one of the supported backends.
pub struct BufferedInput {
    backend: Backend,
    /// Remaining files for binary concat, in order
    queue: VecDeque<PathBuf>,
    binary_concat: bool,
    /// Seconds of read famine tolerated; 0 = none, -1 = forever
    live_timeout_s: i32,

    /// Bytes returned by `seek_back`, served before the backend
    pushback: VecDeque<u8>,
    /// Tail of the bytes most recently handed out, newest last
    history: VecDeque<u8>,

    past: u64,
    total_past: u64,
    eof: bool,
    /// Crossed into the next file outside binary-concat mode; the caller
    /// must reset its clock state
    file_boundary: bool,
}

impl BufferedInput {
    /// Opens the input described by the options. For `Files`, the first
    /// file is opened immediately and the rest queue up for binary
    /// concat. For `Tcp`, this blocks until a sender connects.
    pub async fn open(opts: &Options) -> Result<Self> {
        let (backend, queue) = match &opts.input {
            InputSource::Files(files) => {
                let mut queue: VecDeque<PathBuf> = files.iter().cloned().collect();
                let first = queue
                    .pop_front()
                    .ok_or_else(|| TsCapError::InvalidData("no input files".into()))?;
                info!("opening {}", first.display());
                let file = tokio::fs::File::open(&first).await?;
                (Backend::Reader(Box::new(file)), queue)
            }
            InputSource::Stdin => (
                Backend::Reader(Box::new(tokio::io::stdin())),
                VecDeque::new(),
            ),
            InputSource::Udp { bind } => {
                let socket = UdpSocket::bind(bind.as_str()).await?;
                info!("listening for UDP datagrams on {}", bind);
                (
                    Backend::Udp {
                        socket,
                        datagram: Vec::new(),
                        offset: 0,
                    },
                    VecDeque::new(),
                )
            }
            InputSource::Tcp { port } => {
                let listener = TcpListener::bind(("0.0.0.0", *port)).await?;
                info!("waiting for a TCP sender on port {}", port);
                let (stream, peer) = listener.accept().await?;
                info!("accepted connection from {}", peer);
                (Backend::Reader(Box::new(stream)), VecDeque::new())
            }
        };

        Ok(Self {
            backend,
            queue,
            binary_concat: opts.binary_concat,
            live_timeout_s: opts.live_stream_timeout_s,
            pushback: VecDeque::new(),
            history: VecDeque::with_capacity(REWIND_WINDOW),
            past: 0,
            total_past: 0,
            eof: false,
            file_boundary: false,
        })
    }

    /// Builds an input over an arbitrary reader (tests, RCWT replay).
    pub fn from_reader(reader: Box<dyn AsyncRead + Unpin + Send>) -> Self {
        Self {
            backend: Backend::Reader(reader),
            queue: VecDeque::new(),
            binary_concat: false,
            live_timeout_s: 0,
            pushback: VecDeque::new(),
            history: VecDeque::with_capacity(REWIND_WINDOW),
            past: 0,
            total_past: 0,
            eof: false,
            file_boundary: false,
        }
    }

    /// Bytes consumed from the current file.
    pub fn current_past(&self) -> u64 {
        self.past
    }

    /// Bytes consumed from previous files in concat mode.
    pub fn total_past(&self) -> u64 {
        self.total_past
    }

    /// Whether the input is exhausted for good.
    pub fn at_eof(&self) -> bool {
        self.eof && self.pushback.is_empty()
    }

    /// True once after crossing into the next input file outside
    /// binary-concat mode; callers reset their timing state on it.
    pub fn take_file_boundary(&mut self) -> bool {
        std::mem::take(&mut self.file_boundary)
    }

    /// Returns the last `n` handed-out bytes to the front of the stream.
    /// At most [`REWIND_WINDOW`] bytes are available; asking for more is
    /// an error.
    pub fn seek_back(&mut self, n: usize) -> Result<()> {
        if n > self.history.len() {
            return Err(TsCapError::Bug(format!(
                "seek_back({}) exceeds the {}-byte window",
                n,
                self.history.len()
            )));
        }
        for _ in 0..n {
            if let Some(b) = self.history.pop_back() {
                self.pushback.push_front(b);
            }
        }
        self.past = self.past.saturating_sub(n as u64);
        Ok(())
    }

    /// Best-effort read: fills `buf` from the pushback window and the
    /// backend, returning the number of bytes delivered. Zero means end
    /// of input (after live-stream retries and concat switching).
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut filled = 0;
        while filled < buf.len() {
            if let Some(b) = self.pushback.pop_front() {
                buf[filled] = b;
                filled += 1;
                self.record(b);
                continue;
            }
            break;
        }
        if filled > 0 {
            self.past += filled as u64;
            return Ok(filled);
        }

        let mut famine_s = 0u64;
        loop {
            if self.eof {
                return Ok(0);
            }
            let n = self.backend_read(buf).await?;
            if n > 0 {
                for &b in &buf[..n] {
                    self.record(b);
                }
                self.past += n as u64;
                return Ok(n);
            }

            // backend is dry: next file, live retry, or the end
            if self.switch_to_next_file().await? {
                if !self.binary_concat {
                    // inputs edited apart: the clock restarts per file
                    self.file_boundary = true;
                }
                continue;
            }
            match self.live_timeout_s {
                0 => {
                    self.eof = true;
                    return Ok(0);
                }
                -1 => {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                timeout => {
                    if famine_s >= timeout as u64 {
                        info!("live stream idle for {}s, ending input", timeout);
                        self.eof = true;
                        return Ok(0);
                    }
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    famine_s += 1;
                }
            }
        }
    }

    /// Reads exactly `buf.len()` bytes unless the input ends first;
    /// returns how many were delivered.
    pub async fn read_exact_or_eof(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    /// Discards `n` bytes from the stream.
    pub async fn skip(&mut self, mut n: usize) -> Result<()> {
        let mut scratch = [0u8; 512];
        while n > 0 {
            let take = n.min(scratch.len());
            let got = self.read(&mut scratch[..take]).await?;
            if got == 0 {
                break;
            }
            n -= got;
        }
        Ok(())
    }

    /// Advances to the next queued input file. Returns false when none is
    /// left. A file that fails to open logs a warning and is skipped.
    pub async fn switch_to_next_file(&mut self) -> Result<bool> {
        loop {
            let Some(next) = self.queue.pop_front() else {
                return Ok(false);
            };
            match tokio::fs::File::open(&next).await {
                Ok(file) => {
                    info!("switching to {}", next.display());
                    self.total_past += self.past;
                    self.past = 0;
                    self.backend = Backend::Reader(Box::new(file));
                    return Ok(true);
                }
                Err(e) => {
                    warn!("cannot open {}: {}, skipping", next.display(), e);
                }
            }
        }
    }

    fn record(&mut self, b: u8) {
        if self.history.len() == REWIND_WINDOW {
            self.history.pop_front();
        }
        self.history.push_back(b);
    }

    async fn backend_read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match &mut self.backend {
            Backend::Reader(reader) => Ok(reader.read(buf).await?),
            Backend::Udp {
                socket,
                datagram,
                offset,
            } => {
                if *offset >= datagram.len() {
                    datagram.resize(65536, 0);
                    let timeout = Duration::from_secs(1);
                    match tokio::time::timeout(timeout, socket.recv(datagram)).await {
                        Ok(Ok(n)) => {
                            datagram.truncate(n);
                            *offset = 0;
                            debug!("received {}-byte datagram", n);
                        }
                        Ok(Err(e)) => return Err(TsCapError::Io(e)),
                        Err(_) => {
                            datagram.clear();
                            *offset = 0;
                            return Ok(0); // famine; caller decides
                        }
                    }
                }
                let n = (datagram.len() - *offset).min(buf.len());
                buf[..n].copy_from_slice(&datagram[*offset..*offset + n]);
                *offset += n;
                Ok(n)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::runtime::Runtime;

    fn input_over(bytes: Vec<u8>) -> BufferedInput {
        BufferedInput::from_reader(Box::new(Cursor::new(bytes)))
    }

    #[test]
    fn reads_and_counts() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let mut input = input_over(vec![1, 2, 3, 4, 5]);
            let mut buf = [0u8; 3];
            assert_eq!(input.read_exact_or_eof(&mut buf).await.unwrap(), 3);
            assert_eq!(buf, [1, 2, 3]);
            assert_eq!(input.current_past(), 3);

            let mut rest = [0u8; 8];
            assert_eq!(input.read_exact_or_eof(&mut rest).await.unwrap(), 2);
            assert!(input.at_eof());
        });
    }

    #[test]
    fn seek_back_replays_bytes() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let mut input = input_over(vec![10, 20, 30, 40]);
            let mut buf = [0u8; 4];
            input.read_exact_or_eof(&mut buf).await.unwrap();

            input.seek_back(2).unwrap();
            assert_eq!(input.current_past(), 2);
            let mut again = [0u8; 2];
            input.read_exact_or_eof(&mut again).await.unwrap();
            assert_eq!(again, [30, 40]);
            assert_eq!(input.current_past(), 4);
        });
    }

    #[test]
    fn seek_back_is_bounded() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let mut input = input_over((0..32).collect());
            let mut buf = [0u8; 32];
            input.read_exact_or_eof(&mut buf).await.unwrap();
            assert!(input.seek_back(REWIND_WINDOW).is_ok());
            let mut replay = [0u8; 8];
            input.read_exact_or_eof(&mut replay).await.unwrap();
            assert_eq!(replay, [24, 25, 26, 27, 28, 29, 30, 31]);
            assert!(input.seek_back(REWIND_WINDOW + 1).is_err());
        });
    }

    #[test]
    fn skip_discards() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let mut input = input_over((0..100).collect());
            input.skip(90).await.unwrap();
            let mut buf = [0u8; 4];
            input.read_exact_or_eof(&mut buf).await.unwrap();
            assert_eq!(buf, [90, 91, 92, 93]);
        });
    }

    #[test]
    fn concat_switches_files() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let dir = std::env::temp_dir().join("tscap-io-test");
            let _ = std::fs::create_dir_all(&dir);
            let a = dir.join("a.bin");
            let b = dir.join("b.bin");
            std::fs::write(&a, [1u8, 2]).unwrap();
            std::fs::write(&b, [3u8, 4]).unwrap();

            let opts = Options {
                input: InputSource::Files(vec![a.clone(), b.clone()]),
                binary_concat: true,
                ..Options::default()
            };
            let mut input = BufferedInput::open(&opts).await.unwrap();
            let mut buf = [0u8; 4];
            assert_eq!(input.read_exact_or_eof(&mut buf).await.unwrap(), 4);
            assert_eq!(buf, [1, 2, 3, 4]);
            assert_eq!(input.total_past(), 2);
            assert_eq!(input.current_past(), 2);

            let _ = std::fs::remove_file(a);
            let _ = std::fs::remove_file(b);
        });
    }
}
