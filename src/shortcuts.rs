//! One-call helpers that open a file, perform a single operation and close it.
//!
//! The plain functions work on text in the default encoding; the `*_bin`
//! variants work on raw bytes.
//!
//! # Examples
//!
//! ```no_run
//! use unified_io::shortcuts;
//!
//! shortcuts::write_lines("names.txt", ["alice", "bob"]).unwrap();
//! shortcuts::append_line("names.txt", "carol").unwrap();
//! assert_eq!(shortcuts::read_lines("names.txt").unwrap(), ["alice", "bob", "carol"]);
//! ```

use crate::core::{Buffer, Delimiter, Payload, RawBuffer, TextBuffer};
use crate::error::Result;
use crate::io::FileBackend;
use crate::stream::Stream;
use std::path::Path;

fn with_file<U, T, F>(path: &Path, mode: &str, op: F) -> Result<T>
where
    U: Buffer,
    F: FnOnce(&mut Stream<FileBackend, U>) -> Result<T>,
{
    let mut file = Stream::<FileBackend, U>::open(path, mode)?;
    let res = op(&mut file);
    let closed = file.close();
    let value = res?;
    closed?;
    Ok(value)
}

/// Reads a whole text file.
pub fn read(path: impl AsRef<Path>) -> Result<String> {
    with_file::<TextBuffer, _, _>(path.as_ref(), "r", |f| f.read_to_end())
}

/// Reads the first line of a text file, without its separator.
pub fn read_line(path: impl AsRef<Path>) -> Result<String> {
    with_file::<TextBuffer, _, _>(path.as_ref(), "r", |f| f.read_line(false))
}

/// Reads a text file as lines, without separators.
pub fn read_lines(path: impl AsRef<Path>) -> Result<Vec<String>> {
    with_file::<TextBuffer, _, _>(path.as_ref(), "r", |f| {
        Ok(TextBuffer::split_lines(f.read_to_end()?, false))
    })
}

/// Reads a text file up to `delimiter`.
pub fn read_until<'d>(path: impl AsRef<Path>, delimiter: impl Into<Delimiter<'d>>) -> Result<String> {
    with_file::<TextBuffer, _, _>(path.as_ref(), "r", |f| f.read_until(delimiter))
}

/// Replaces a file's contents with `payload`.
pub fn write<P: Payload + ?Sized>(path: impl AsRef<Path>, payload: &P) -> Result<()> {
    with_file::<TextBuffer, _, _>(path.as_ref(), "w", |f| f.write(payload).map(drop))
}

/// Replaces a file's contents with `payload` and a line separator.
pub fn write_line<P: Payload + ?Sized>(path: impl AsRef<Path>, payload: &P) -> Result<()> {
    with_file::<TextBuffer, _, _>(path.as_ref(), "w", |f| f.write_line(payload).map(drop))
}

/// Replaces a file's contents with one line per item.
pub fn write_lines<I>(path: impl AsRef<Path>, lines: I) -> Result<()>
where
    I: IntoIterator,
    I::Item: Payload,
{
    with_file::<TextBuffer, _, _>(path.as_ref(), "w", |f| f.write_lines(lines).map(drop))
}

/// Appends `payload` to a file, creating it if missing.
pub fn append<P: Payload + ?Sized>(path: impl AsRef<Path>, payload: &P) -> Result<()> {
    with_file::<TextBuffer, _, _>(path.as_ref(), "a", |f| f.write(payload).map(drop))
}

/// Appends `payload` and a line separator.
pub fn append_line<P: Payload + ?Sized>(path: impl AsRef<Path>, payload: &P) -> Result<()> {
    with_file::<TextBuffer, _, _>(path.as_ref(), "a", |f| f.write_line(payload).map(drop))
}

/// Appends one line per item.
pub fn append_lines<I>(path: impl AsRef<Path>, lines: I) -> Result<()>
where
    I: IntoIterator,
    I::Item: Payload,
{
    with_file::<TextBuffer, _, _>(path.as_ref(), "a", |f| f.write_lines(lines).map(drop))
}

/// Reads a whole file as bytes.
pub fn read_bin(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    with_file::<RawBuffer, _, _>(path.as_ref(), "rb", |f| f.read_to_end())
}

/// Reads the first line of a file as bytes.
pub fn read_bin_line(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    with_file::<RawBuffer, _, _>(path.as_ref(), "rb", |f| f.read_line(false))
}

/// Reads a file as byte lines.
pub fn read_bin_lines(path: impl AsRef<Path>) -> Result<Vec<Vec<u8>>> {
    with_file::<RawBuffer, _, _>(path.as_ref(), "rb", |f| {
        Ok(RawBuffer::split_lines(f.read_to_end()?, false))
    })
}

/// Reads a file as bytes up to `delimiter`.
pub fn read_bin_until<'d>(
    path: impl AsRef<Path>,
    delimiter: impl Into<Delimiter<'d>>,
) -> Result<Vec<u8>> {
    with_file::<RawBuffer, _, _>(path.as_ref(), "rb", |f| f.read_until(delimiter))
}

/// Replaces a file's contents with `payload` as bytes.
pub fn write_bin<P: Payload + ?Sized>(path: impl AsRef<Path>, payload: &P) -> Result<()> {
    with_file::<RawBuffer, _, _>(path.as_ref(), "wb", |f| f.write(payload).map(drop))
}

/// Replaces a file's contents with `payload` and a line separator.
pub fn write_bin_line<P: Payload + ?Sized>(path: impl AsRef<Path>, payload: &P) -> Result<()> {
    with_file::<RawBuffer, _, _>(path.as_ref(), "wb", |f| f.write_line(payload).map(drop))
}

/// Replaces a file's contents with one line per item.
pub fn write_bin_lines<I>(path: impl AsRef<Path>, lines: I) -> Result<()>
where
    I: IntoIterator,
    I::Item: Payload,
{
    with_file::<RawBuffer, _, _>(path.as_ref(), "wb", |f| f.write_lines(lines).map(drop))
}

/// Appends `payload` as bytes.
pub fn append_bin<P: Payload + ?Sized>(path: impl AsRef<Path>, payload: &P) -> Result<()> {
    with_file::<RawBuffer, _, _>(path.as_ref(), "ab", |f| f.write(payload).map(drop))
}

/// Appends `payload` and a line separator.
pub fn append_bin_line<P: Payload + ?Sized>(path: impl AsRef<Path>, payload: &P) -> Result<()> {
    with_file::<RawBuffer, _, _>(path.as_ref(), "ab", |f| f.write_line(payload).map(drop))
}

/// Appends one line per item.
pub fn append_bin_lines<I>(path: impl AsRef<Path>, lines: I) -> Result<()>
where
    I: IntoIterator,
    I::Item: Payload,
{
    with_file::<RawBuffer, _, _>(path.as_ref(), "ab", |f| f.write_lines(lines).map(drop))
}
