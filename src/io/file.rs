//! File backend.

use crate::core::{Buffer, Encoding, StreamOptions};
use crate::error::{Error, IoError, Result};
use crate::io::{Backend, Capabilities, Direction, Seekable, Sink, Source, Transfer, sys};
use crate::stream::Stream;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::os::fd::{AsFd, BorrowedFd};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Parsed `fopen`-style mode string such as `"r"`, `"wb"` or `"a+"`.
///
/// # Examples
///
/// ```
/// use unified_io::io::OpenMode;
///
/// let mode: OpenMode = "r+b".parse().unwrap();
/// assert!(mode.read && mode.write);
/// assert_eq!(mode.binary, Some(true));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenMode {
    /// Open for reading.
    pub read: bool,
    /// Open for writing.
    pub write: bool,
    /// Writes go to the end of the file.
    pub append: bool,
    /// Truncate on open.
    pub truncate: bool,
    /// Create the file if missing.
    pub create: bool,
    /// Fail if the file exists.
    pub exclusive: bool,
    /// `Some(true)` for `b`, `Some(false)` for `t`, `None` if unspecified.
    pub binary: Option<bool>,
}

impl FromStr for OpenMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut mode = Self::default();
        let mut primary = None;
        for c in s.chars() {
            match c {
                'r' | 'w' | 'a' | 'x' if primary.is_none() => primary = Some(c),
                '+' if !mode.read || !mode.write => {
                    mode.read = true;
                    mode.write = true;
                }
                'b' if mode.binary.is_none() => mode.binary = Some(true),
                't' if mode.binary.is_none() => mode.binary = Some(false),
                _ => return Err(Error::invalid(format!("invalid mode: {s:?}"))),
            }
        }
        match primary {
            Some('r') => mode.read = true,
            Some('w') => {
                mode.write = true;
                mode.create = true;
                mode.truncate = true;
            }
            Some('a') => {
                mode.write = true;
                mode.create = true;
                mode.append = true;
            }
            Some('x') => {
                mode.write = true;
                mode.exclusive = true;
            }
            _ => return Err(Error::invalid(format!("invalid mode: {s:?}"))),
        }
        Ok(mode)
    }
}

impl OpenMode {
    fn options(self) -> OpenOptions {
        let mut options = OpenOptions::new();
        options
            .read(self.read)
            .write(self.write && !self.append)
            .append(self.append)
            .truncate(self.truncate)
            .create(self.create);
        if self.exclusive {
            options.create_new(true);
        }
        options
    }
}

/// File opened through the OS.
#[derive(Debug)]
pub struct FileBackend {
    file: Option<File>,
    path: String,
    caps: Capabilities,
    read_open: bool,
    write_open: bool,
}

impl FileBackend {
    /// Opens `path` with `mode`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::FileNotFound`] or [`IoError::OpenFailed`].
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> Result<Self> {
        let path_ref = path.as_ref();
        let path_str = path_ref.to_string_lossy().to_string();

        let mut file = mode.options().open(path_ref).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                IoError::FileNotFound {
                    path: path_str.clone(),
                }
            } else {
                IoError::OpenFailed {
                    path: path_str.clone(),
                    reason: e.to_string(),
                }
            }
        })?;
        let seekable = file.stream_position().is_ok();

        Ok(Self::from_parts(
            file,
            path_str,
            Capabilities {
                readable: mode.read,
                writable: mode.write,
                seekable,
            },
        ))
    }

    /// Wraps an already open file.
    #[must_use]
    pub fn from_file(mut file: File, name: impl Into<String>, readable: bool, writable: bool) -> Self {
        let seekable = file.stream_position().is_ok();
        Self::from_parts(
            file,
            name.into(),
            Capabilities {
                readable,
                writable,
                seekable,
            },
        )
    }

    const fn from_parts(file: File, path: String, caps: Capabilities) -> Self {
        Self {
            file: Some(file),
            path,
            caps,
            read_open: caps.readable,
            write_open: caps.writable,
        }
    }

    /// Path the file was opened with.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    fn file(&mut self) -> Result<&mut File> {
        self.file.as_mut().ok_or(Error::Closed)
    }
}

impl Backend for FileBackend {
    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn close(&mut self, direction: Direction) -> Result<()> {
        if direction != Direction::Read && self.write_open {
            self.write_open = false;
            if let Some(file) = self.file.as_mut() {
                file.flush()?;
            }
        }
        if direction != Direction::Write {
            self.read_open = false;
        }
        // One handle serves both sides; release it with the last one
        if !self.read_open && !self.write_open {
            self.file = None;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file {}", self.path)
    }

    fn fd(&self) -> Option<BorrowedFd<'_>> {
        self.file.as_ref().map(AsFd::as_fd)
    }
}

impl Source for FileBackend {
    fn underflow(&mut self, buf: &mut [u8], wait: Option<Duration>) -> Result<Transfer> {
        if !self.read_open {
            return Err(Error::Closed);
        }
        let file = self.file.as_ref().ok_or(Error::Closed)?;
        sys::read_ready(file, buf, wait)
    }
}

impl Sink for FileBackend {
    fn overflow(&mut self, data: &[u8], _wait: Option<Duration>) -> Result<()> {
        if !self.write_open {
            return Err(Error::Closed);
        }
        let file = self.file()?;
        file.write_all(data)?;
        file.flush()?;
        Ok(())
    }

    fn writer(&self) -> Result<Box<dyn Write + Send>> {
        let file = self.file.as_ref().ok_or(Error::Closed)?;
        Ok(Box::new(file.try_clone()?))
    }
}

impl Seekable for FileBackend {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        if !self.caps.seekable {
            return Err(Error::Unsupported { operation: "seek" });
        }
        Ok(self.file()?.seek(pos)?)
    }

    fn tell(&mut self) -> Result<u64> {
        if !self.caps.seekable {
            return Err(Error::Unsupported { operation: "tell" });
        }
        Ok(self.file()?.stream_position()?)
    }
}

impl<U: Buffer> Stream<FileBackend, U> {
    /// Opens a file stream with the default encoding and options.
    ///
    /// A `b` in `mode` requires a binary buffer and a `t` a text buffer.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use unified_io::{FileStream, RawBuffer};
    ///
    /// let mut file = FileStream::<RawBuffer>::open("notes.txt", "rb").unwrap();
    /// let first = file.read_line(false).unwrap();
    /// ```
    pub fn open<P: AsRef<Path>>(path: P, mode: &str) -> Result<Self> {
        Self::open_with(path, mode, Encoding::default(), StreamOptions::default())
    }

    /// Opens a file stream with explicit encoding and options.
    pub fn open_with<P: AsRef<Path>>(
        path: P,
        mode: &str,
        encoding: Encoding,
        options: StreamOptions,
    ) -> Result<Self> {
        let mode: OpenMode = mode.parse()?;
        if mode.binary.is_some_and(|binary| binary != U::BINARY) {
            return Err(Error::invalid(format!(
                "mode {mode:?} does not match a {} buffer",
                if U::BINARY { "binary" } else { "text" }
            )));
        }
        let backend = FileBackend::open(path, mode)?;
        tracing::debug!(path = backend.path(), ?mode, %encoding, "opened file");
        Ok(Self::with_backend(backend, U::with_encoding(encoding), options))
    }
}
