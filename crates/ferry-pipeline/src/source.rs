//! Streaming newline-delimited JSON snapshot reader.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};

use crate::PipelineError;

/// One line read from a snapshot.
#[derive(Debug)]
pub struct SourceLine<R> {
    /// 1-based record number (blank lines are not counted).
    pub ordinal: usize,
    /// 1-based line number in the file.
    pub line_number: usize,
    /// The parsed record, or why the line was rejected.
    pub record: Result<R, String>,
}

/// A single-pass reader over a snapshot file, one record per line.
pub struct RecordSource<R> {
    path: PathBuf,
    reader: Box<dyn AsyncBufRead + Send + Unpin>,
    buf: Vec<u8>,
    line_number: usize,
    ordinal: usize,
    _record: PhantomData<fn() -> R>,
}

impl<R: DeserializeOwned> RecordSource<R> {
    /// Open a snapshot for reading.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .await
            .map_err(|source| PipelineError::Open {
                path: path.clone(),
                source,
            })?;

        Ok(Self::from_reader(path, file))
    }

    /// Read records from any byte stream. `path` only labels diagnostics.
    pub fn from_reader(
        path: impl Into<PathBuf>,
        reader: impl AsyncRead + Send + Unpin + 'static,
    ) -> Self {
        Self {
            path: path.into(),
            reader: Box::new(BufReader::new(reader)),
            buf: Vec::new(),
            line_number: 0,
            ordinal: 0,
            _record: PhantomData,
        }
    }

    /// Read the next record. `Ok(None)` at end of file.
    ///
    /// A line that is not UTF-8 or does not match the record shape is
    /// returned with an `Err` record rather than failing the stream; only IO
    /// errors fail.
    pub async fn next(&mut self) -> Result<Option<SourceLine<R>>, PipelineError> {
        loop {
            self.buf.clear();
            if self.reader.read_until(b'\n', &mut self.buf).await? == 0 {
                return Ok(None);
            }
            self.line_number += 1;

            let record = match std::str::from_utf8(&self.buf) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    serde_json::from_str(trimmed).map_err(|e| e.to_string())
                }
                Err(e) => Err(format!("line is not valid UTF-8: {e}")),
            };
            self.ordinal += 1;

            return Ok(Some(SourceLine {
                ordinal: self.ordinal,
                line_number: self.line_number,
                record,
            }));
        }
    }

    /// The file being read.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ExportedOrganization;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncReadExt, ReadBuf};

    /// A reader whose every read fails.
    struct FailingReader;

    impl AsyncRead for FailingReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            Poll::Ready(Err(std::io::Error::other("device went away")))
        }
    }

    fn snapshot(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_reads_in_file_order_and_rejects_bad_lines() {
        let file = snapshot(concat!(
            "{\"object\":\"organization\",\"id\":\"org_1\",\"name\":\"Acme\"}\n",
            "\n",
            "not json\n",
            "{\"object\":\"organization\"}\n",
            "{\"object\":\"organization\",\"id\":\"org_2\"}",
        ));

        let mut source = RecordSource::<ExportedOrganization>::open(file.path())
            .await
            .unwrap();

        let first = source.next().await.unwrap().unwrap();
        assert_eq!(first.ordinal, 1);
        assert_eq!(first.record.unwrap().id, "org_1");

        let garbage = source.next().await.unwrap().unwrap();
        assert_eq!(garbage.ordinal, 2);
        assert_eq!(garbage.line_number, 3);
        assert!(garbage.record.is_err());

        let missing_id = source.next().await.unwrap().unwrap();
        assert!(missing_id.record.unwrap_err().contains("id"));

        let last = source.next().await.unwrap().unwrap();
        assert_eq!(last.ordinal, 4);
        assert_eq!(last.line_number, 5);
        assert_eq!(last.record.unwrap().id, "org_2");

        assert!(source.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_is_rejected_alone() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{\"object\":\"organization\",\"id\":\"org_a\"}\n").unwrap();
        file.write_all(b"{\"object\":\"organization\",\"id\":\"org_\xE9\"}\n").unwrap();
        file.write_all(b"{\"object\":\"organization\",\"id\":\"org_c\"}\n").unwrap();

        let mut source = RecordSource::<ExportedOrganization>::open(file.path())
            .await
            .unwrap();

        assert_eq!(source.next().await.unwrap().unwrap().record.unwrap().id, "org_a");

        let bad = source.next().await.unwrap().unwrap();
        assert_eq!(bad.ordinal, 2);
        assert_eq!(bad.line_number, 2);
        assert!(bad.record.unwrap_err().contains("UTF-8"));

        let last = source.next().await.unwrap().unwrap();
        assert_eq!(last.ordinal, 3);
        assert_eq!(last.record.unwrap().id, "org_c");
        assert!(source.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_error_fails_the_stream() {
        let reader = (&b"{\"object\":\"organization\",\"id\":\"org_a\"}\n"[..])
            .chain(FailingReader);
        let mut source = RecordSource::<ExportedOrganization>::from_reader("orgs.ndjson", reader);

        assert_eq!(source.next().await.unwrap().unwrap().record.unwrap().id, "org_a");
        assert!(matches!(source.next().await, Err(PipelineError::Io(_))));
    }

    #[tokio::test]
    async fn test_open_missing_file() {
        let result = RecordSource::<ExportedOrganization>::open("/nonexistent/orgs.ndjson").await;
        assert!(matches!(result, Err(PipelineError::Open { .. })));
    }
}
