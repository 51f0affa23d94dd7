//! Newline-delimited JSON updates from any async reader (stdin for live, a file for replay).

use super::{decode_line, RouteUpdate, UpdateSource};
use crate::error::FeedError;
use async_trait::async_trait;
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

pub struct JsonLinesSource<R> {
    reader: R,
    line: String,
    line_no: u64,
    skipped: u64,
}

impl<R: AsyncBufRead + Unpin + Send> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            line_no: 0,
            skipped: 0,
        }
    }

    /// Lines that failed to decode so far.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl JsonLinesSource<BufReader<tokio::io::Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl JsonLinesSource<BufReader<tokio::fs::File>> {
    pub async fn open(path: &Path) -> Result<Self, FeedError> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Self::new(BufReader::new(file)))
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> UpdateSource for JsonLinesSource<R> {
    async fn next_update(&mut self) -> Result<Option<RouteUpdate>, FeedError> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line).await? == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            let line = self.line.trim();
            if line.is_empty() {
                continue;
            }
            match decode_line(line) {
                Ok(Some(update)) => return Ok(Some(update)),
                Ok(None) => debug!(line = self.line_no, "non-announcement skipped"),
                Err(e) => {
                    self.skipped += 1;
                    warn!(line = self.line_no, error = %e, "undecodable feed line skipped");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_until_end_of_stream() {
        let data = b"{\"prefix\":\"p\",\"path\":\"1 2\",\"timestamp\":1}\n\ngarbage\n{\"prefix\":\"p\",\"path\":\"1 3\",\"timestamp\":2}\n";
        let mut src = JsonLinesSource::new(&data[..]);
        assert_eq!(src.next_update().await.unwrap().unwrap().origin(), "2");
        assert_eq!(src.next_update().await.unwrap().unwrap().origin(), "3");
        assert!(src.next_update().await.unwrap().is_none());
        assert_eq!(src.skipped(), 1);
    }
}
