// ABOUTME: Bounded capture of child process output streams
// ABOUTME: Keeps at most a fixed number of bytes and drains the rest so the child never blocks

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

const CHUNK_SIZE: usize = 8 * 1024;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct Captured {
    pub text: String,
    pub truncated: bool,
}

/// Read `reader` to EOF, keeping the first `limit` bytes.
pub(crate) async fn read_capped<R>(mut reader: R, limit: usize) -> Captured
where
    R: AsyncRead + Unpin,
{
    let mut kept = Vec::with_capacity(limit.min(CHUNK_SIZE));
    let mut chunk = [0u8; CHUNK_SIZE];
    let mut truncated = false;

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                let room = limit.saturating_sub(kept.len());
                if n > room {
                    kept.extend_from_slice(&chunk[..room]);
                    truncated = true;
                } else {
                    kept.extend_from_slice(&chunk[..n]);
                }
            }
            Err(e) => {
                debug!("Output stream read failed: {}", e);
                break;
            }
        }
    }

    Captured {
        text: String::from_utf8_lossy(&kept).into_owned(),
        truncated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_short_output_is_kept_whole() {
        let captured = read_capped(&b"hello\n"[..], 64).await;
        assert_eq!(captured.text, "hello\n");
        assert!(!captured.truncated);
    }

    #[tokio::test]
    async fn test_output_over_limit_is_truncated() {
        let data = vec![b'x'; 20_000];
        let captured = read_capped(&data[..], 100).await;
        assert_eq!(captured.text.len(), 100);
        assert!(captured.truncated);
    }

    #[tokio::test]
    async fn test_exact_limit_is_not_truncated() {
        let captured = read_capped(&b"abcd"[..], 4).await;
        assert_eq!(captured.text, "abcd");
        assert!(!captured.truncated);
    }
}
