//! Frame replay input
//!
//! Hex-encoded frames, one per line. Blank lines and `#` comments are
//! skipped; whitespace and `:` separators inside a line are ignored.

use crate::workers::WorkerPool;
use anyhow::{bail, Context};
use serde::Serialize;
use std::path::PathBuf;
use std::str::FromStr;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

/// Where frames are read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameSource {
    /// Standard input
    Stdin,
    /// A file of hex lines
    File(PathBuf),
}

impl FromStr for FrameSource {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "-" => FrameSource::Stdin,
            path => FrameSource::File(PathBuf::from(path)),
        })
    }
}

/// Counts from one replay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FeedSummary {
    /// Lines read
    pub lines: u64,
    /// Frames handed to the workers
    pub frames: u64,
    /// Lines that were not valid hex
    pub rejected: u64,
}

/// Decode one input line; `None` for blank lines and comments
pub fn decode_line(line: &str) -> Option<Result<Vec<u8>, hex::FromHexError>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let digits: String = line
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    Some(hex::decode(digits))
}

/// Read every frame from `source` into the pool
pub async fn feed_source(source: &FrameSource, pool: &WorkerPool) -> anyhow::Result<FeedSummary> {
    match source {
        FrameSource::Stdin => feed(BufReader::new(tokio::io::stdin()), pool).await,
        FrameSource::File(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("opening frame file {}", path.display()))?;
            feed(BufReader::new(file), pool).await
        }
    }
}

/// Read hex lines from `reader` until end of input
pub async fn feed<R>(reader: R, pool: &WorkerPool) -> anyhow::Result<FeedSummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut summary = FeedSummary::default();
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await.context("reading frames")? {
        summary.lines += 1;
        let frame = match decode_line(&line) {
            None => continue,
            Some(Ok(frame)) => frame,
            Some(Err(err)) => {
                summary.rejected += 1;
                warn!(line = summary.lines, %err, "skipping undecodable frame");
                continue;
            }
        };

        if pool.submit(frame).await.is_err() {
            bail!("worker pool closed");
        }
        summary.frames += 1;
    }

    debug!(?summary, "frame input exhausted");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use depwall_dataplane::{DecisionEngine, FrameBuilder};
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    #[test]
    fn test_decode_line() {
        assert_eq!(decode_line("   "), None);
        assert_eq!(decode_line("# comment"), None);
        assert_eq!(decode_line("0a0B ff").unwrap().unwrap(), vec![0x0a, 0x0b, 0xff]);
        assert_eq!(decode_line("de:ad:be:ef").unwrap().unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        assert!(decode_line("abc").unwrap().is_err());
        assert!(decode_line("zz").unwrap().is_err());
    }

    #[test]
    fn test_frame_source_from_str() {
        assert_eq!("-".parse::<FrameSource>().unwrap(), FrameSource::Stdin);
        assert_eq!(
            "frames.hex".parse::<FrameSource>().unwrap(),
            FrameSource::File(PathBuf::from("frames.hex"))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_feed_counts_lines() {
        let engine = Arc::new(DecisionEngine::default());
        let a = Ipv4Addr::new(10, 0, 0, 1);
        let b = Ipv4Addr::new(10, 0, 0, 2);
        engine.dependencies().add(a, b, true).unwrap();

        let frame = hex::encode(FrameBuilder::tcp(a, b, 1234, 80).build());
        let mut input = String::from("# replay\n\n");
        for _ in 0..50 {
            input.push_str(&frame);
            input.push('\n');
        }
        input.push_str("not-hex\n");

        // Queue smaller than the input forces the waiting path
        let pool = WorkerPool::spawn(Arc::clone(&engine), 2, 4).unwrap();
        let summary = feed(input.as_bytes(), &pool).await.unwrap();
        let reports = pool.join();

        assert_eq!(summary, FeedSummary { lines: 53, frames: 50, rejected: 1 });
        assert_eq!(reports.iter().map(|r| r.passed).sum::<u64>(), 50);
        assert_eq!(engine.stats().snapshot().allowed, 50);
    }

    #[tokio::test]
    async fn test_feed_waits_on_current_thread_runtime() {
        let engine = Arc::new(DecisionEngine::default());
        let frame = hex::encode(
            FrameBuilder::udp(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2), 53, 53)
                .build(),
        );
        let mut input = String::new();
        for _ in 0..20_000 {
            input.push_str(&frame);
            input.push('\n');
        }

        let pool = WorkerPool::spawn(Arc::clone(&engine), 1, 1).unwrap();
        let summary = feed(input.as_bytes(), &pool).await.unwrap();
        let reports = pool.join();

        assert_eq!(summary.frames, 20_000);
        assert_eq!(reports[0].frames, 20_000);
        assert_eq!(engine.stats().snapshot().dropped, 20_000);
    }
}
