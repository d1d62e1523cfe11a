//! The `git cat-file --batch` / `--batch-check` request/response protocol.
//!
//! One long-lived child serves many lookups. Each request is `<name>\n`;
//! each response is a header `<sha> <type> <size>\n`, then (for `--batch`)
//! exactly `size` content bytes and a trailing `\n`, or `<name> missing\n`.
//! A response must be consumed in full before the next request is written,
//! otherwise every later read on the session is misaligned.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout};

use amitrace_core::{AmitraceError, GitConfig};

use crate::command::GitCommand;
use crate::object::ObjectType;
use crate::oid::ObjectId;

/// Upper bound on the buffer reserved up front for object content.
const MAX_PREALLOC: u64 = 1 << 20;

/// Which flavour of session to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchKind {
    /// `--batch`: header plus content.
    Content,
    /// `--batch-check`: header only.
    Check,
}

impl BatchKind {
    fn flag(self) -> &'static str {
        match self {
            BatchKind::Content => "--batch",
            BatchKind::Check => "--batch-check",
        }
    }
}

/// A parsed response header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchHeader {
    pub id: ObjectId,
    pub kind: ObjectType,
    pub size: u64,
}

/// Read one response header.
///
/// A lone `\n` left over from a previous response is skipped once. A
/// `missing` (or `ambiguous`) answer and a header without the expected
/// fields both yield [`AmitraceError::NotExist`].
///
/// # Examples
///
/// ```
/// use std::io::Cursor;
/// use amitrace_git::batch::read_batch_line;
///
/// let mut rd = Cursor::new(b"deadbeef missing\n".to_vec());
/// assert!(read_batch_line(&mut rd).unwrap_err().is_not_exist());
///
/// let mut rd = Cursor::new(b"4b825dc642cb6eb9a060e54bf8d69288fbee4904 tree 0\n".to_vec());
/// let header = read_batch_line(&mut rd).unwrap();
/// assert_eq!(header.size, 0);
/// ```
pub fn read_batch_line<R: BufRead + ?Sized>(reader: &mut R) -> Result<BatchHeader, AmitraceError> {
    let mut raw = Vec::new();
    if reader.read_until(b'\n', &mut raw)? == 0 {
        return Err(closed());
    }
    if raw == b"\n" {
        raw.clear();
        if reader.read_until(b'\n', &mut raw)? == 0 {
            return Err(closed());
        }
    }
    // Trailing bytes after `missing` may be anything.
    let line = String::from_utf8_lossy(&raw);
    let line = line.trim_end_matches('\n');

    let Some((name, rest)) = line.split_once(' ') else {
        return Err(AmitraceError::not_exist(line));
    };
    let Some((kind, size)) = rest.split_once(' ') else {
        return Err(AmitraceError::not_exist(name));
    };
    if matches!(kind, "missing" | "ambiguous") {
        return Err(AmitraceError::not_exist(name));
    }

    let id = ObjectId::from_hex(name).map_err(|_| AmitraceError::not_exist(name))?;
    let kind: ObjectType = kind.parse()?;
    let size = size
        .trim()
        .parse()
        .map_err(|_| AmitraceError::Decode(format!("bad object size in batch header: {line}")))?;
    Ok(BatchHeader { id, kind, size })
}

/// Skip `n` content bytes and the trailing newline.
pub fn discard<R: BufRead + ?Sized>(reader: &mut R, n: u64) -> Result<(), AmitraceError> {
    let copied = io::copy(&mut (&mut *reader).take(n + 1), &mut io::sink())?;
    if copied != n + 1 {
        return Err(closed());
    }
    Ok(())
}

/// Read `size` content bytes and the trailing newline.
///
/// The advertised size only bounds the read; the buffer grows as bytes
/// actually arrive.
pub fn read_content<R: BufRead + ?Sized>(reader: &mut R, size: u64) -> Result<Vec<u8>, AmitraceError> {
    let mut buf = Vec::with_capacity(size.min(MAX_PREALLOC) as usize);
    (&mut *reader).take(size).read_to_end(&mut buf)?;
    if buf.len() as u64 != size {
        return Err(closed());
    }
    discard(reader, 0)?;
    Ok(buf)
}

fn closed() -> AmitraceError {
    AmitraceError::Io(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        "cat-file batch session closed",
    ))
}

/// A live `cat-file` child.
///
/// Dropping the session closes stdin, kills the child and reaps it.
#[derive(Debug)]
pub struct BatchSession {
    kind: BatchKind,
    child: Child,
    stdin: Option<ChildStdin>,
    reader: BufReader<ChildStdout>,
    description: String,
}

impl BatchSession {
    /// Spawn `git cat-file --batch[-check]` in `repo_dir`.
    pub fn open(config: &GitConfig, repo_dir: &Path, kind: BatchKind) -> Result<Self, AmitraceError> {
        let piped = GitCommand::new(config, &["cat-file", kind.flag()]).spawn_piped(repo_dir)?;
        Ok(Self {
            kind,
            child: piped.child,
            stdin: Some(piped.stdin),
            reader: BufReader::with_capacity(32 * 1024, piped.stdout),
            description: piped.description,
        })
    }

    pub fn kind(&self) -> BatchKind {
        self.kind
    }

    /// Whether unread response bytes are sitting in the buffer.
    pub fn has_buffered(&self) -> bool {
        !self.reader.buffer().is_empty()
    }

    /// Write a request and read its header.
    ///
    /// `name` is an object id or any revision expression (`HEAD:path`).
    pub fn request(&mut self, name: &str) -> Result<BatchHeader, AmitraceError> {
        if name.is_empty() || name.contains('\n') {
            return Err(AmitraceError::BrokenCommand {
                arg: name.to_string(),
                reason: "batch request must be a single non-empty line".into(),
            });
        }
        tracing::trace!(target: "amitrace::batch", session = %self.description, name, "request");
        let stdin = self.stdin.as_mut().ok_or_else(closed)?;
        stdin.write_all(name.as_bytes())?;
        stdin.write_all(b"\n")?;
        stdin.flush()?;
        read_batch_line(&mut self.reader)
    }

    /// Read the content that follows `header`, including the trailing newline.
    pub fn read_content(&mut self, header: &BatchHeader) -> Result<Vec<u8>, AmitraceError> {
        self.ensure_content()?;
        read_content(&mut self.reader, header.size)
    }

    /// Stream the content that follows `header`.
    pub fn blob_reader(&mut self, header: &BatchHeader) -> Result<BlobReader<'_>, AmitraceError> {
        self.ensure_content()?;
        Ok(BlobReader {
            reader: &mut self.reader,
            remaining: header.size,
        })
    }

    /// Skip the content that follows `header`.
    pub fn skip_content(&mut self, header: &BatchHeader) -> Result<(), AmitraceError> {
        match self.kind {
            BatchKind::Content => discard(&mut self.reader, header.size),
            BatchKind::Check => Ok(()),
        }
    }

    fn ensure_content(&self) -> Result<(), AmitraceError> {
        match self.kind {
            BatchKind::Content => Ok(()),
            BatchKind::Check => Err(AmitraceError::Git(
                "cat-file --batch-check does not return object content".into(),
            )),
        }
    }

    /// Stop the child. Pending reads on it fail afterwards.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        drop(self.stdin.take());
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for BatchSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Reads one object's content from a batch session.
///
/// Whatever has not been read when this is dropped (plus the trailing
/// newline) is discarded, so the session stays aligned.
pub struct BlobReader<'a> {
    reader: &'a mut BufReader<ChildStdout>,
    remaining: u64,
}

impl BlobReader<'_> {
    /// Bytes left to read.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl Read for BlobReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Ok(0);
        }
        let max = buf.len().min(self.remaining as usize);
        let n = self.reader.read(&mut buf[..max])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "batch session closed mid-object",
            ));
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}

impl Drop for BlobReader<'_> {
    fn drop(&mut self) {
        if let Err(err) = discard(self.reader, self.remaining) {
            tracing::warn!(target: "amitrace::batch", %err, "failed to discard blob remainder");
        }
    }
}

/// Count lines in a stream; a final line without `\n` still counts.
pub fn count_lines<R: Read>(mut reader: R) -> Result<usize, AmitraceError> {
    let mut buf = [0u8; 32 * 1024];
    let mut count = 0;
    let mut last = None;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        count += buf[..n].iter().filter(|&&b| b == b'\n').count();
        last = Some(buf[n - 1]);
    }
    if matches!(last, Some(b) if b != b'\n') {
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const TREE: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

    #[test]
    fn parses_header() {
        let mut rd = Cursor::new(format!("{TREE} blob 12\n").into_bytes());
        let h = read_batch_line(&mut rd).unwrap();
        assert_eq!(h.id, ObjectId::EMPTY_TREE);
        assert_eq!(h.kind, ObjectType::Blob);
        assert_eq!(h.size, 12);
    }

    #[test]
    fn skips_single_leading_newline() {
        let mut rd = Cursor::new(format!("\n{TREE} commit 3\n").into_bytes());
        assert_eq!(read_batch_line(&mut rd).unwrap().kind, ObjectType::Commit);
    }

    #[test]
    fn missing_with_trailing_garbage_is_not_exist() {
        for raw in [
            "HEAD:nope missing\n",
            "abc missing \u{0}\u{1}junk\n",
            "nospace\n",
            "name ambiguous\n",
        ] {
            let mut rd = Cursor::new(raw.as_bytes().to_vec());
            let err = read_batch_line(&mut rd).unwrap_err();
            assert!(err.is_not_exist(), "{raw:?} gave {err:?}");
        }
    }

    #[test]
    fn missing_with_invalid_utf8_is_not_exist() {
        let cases: [&[u8]; 6] = [
            b"deadbeef missing \xff\xfe\n",
            b"deadbeef missing \x80\xbf\x80\n",
            b"deadbeef missing \x00\xff\x00junk\n",
            b"deadbeef missing \xff",
            b"\xff\xfe missing\n",
            b"\xc3 missing\n",
        ];
        for raw in cases {
            let mut rd = Cursor::new(raw.to_vec());
            let err = read_batch_line(&mut rd).unwrap_err();
            assert!(err.is_not_exist(), "{raw:?} gave {err:?}");
        }
    }

    #[test]
    fn oversized_header_does_not_reserve_its_size() {
        let mut rd = Cursor::new(b"tiny\n".to_vec());
        let err = read_content(&mut rd, u64::MAX / 2).unwrap_err();
        assert!(matches!(err, AmitraceError::Io(_)), "{err:?}");

        let mut rd = Cursor::new(b"tiny\nNEXT".to_vec());
        assert_eq!(read_content(&mut rd, 4).unwrap(), b"tiny");
    }

    #[test]
    fn eof_is_an_io_error() {
        let mut rd = Cursor::new(Vec::new());
        assert!(matches!(read_batch_line(&mut rd), Err(AmitraceError::Io(_))));
    }

    #[test]
    fn discard_consumes_trailing_newline() {
        let mut rd = Cursor::new(b"hello\nNEXT".to_vec());
        discard(&mut rd, 5).unwrap();
        let mut rest = String::new();
        rd.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "NEXT");
    }

    #[test]
    fn count_lines_handles_missing_final_newline() {
        assert_eq!(count_lines(&b"a\nb\nc"[..]).unwrap(), 3);
        assert_eq!(count_lines(&b"a\nb\n"[..]).unwrap(), 2);
        assert_eq!(count_lines(&b""[..]).unwrap(), 0);
    }
}
