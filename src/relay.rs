/// 单方向字节转发
///
/// 与 `tokio::io::copy` 不同，出错时仍然返回已经转发的字节数，
/// 使调用方能够在任一方向结束后继续执行半关闭流程
use std::fmt;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// 转发缓冲区大小
pub const COPY_BUFFER_SIZE: usize = 16 * 1024;

/// 转发方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// 本地 -> 远端
    Upstream,
    /// 远端 -> 本地
    Downstream,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upstream => write!(f, "local -> remote"),
            Direction::Downstream => write!(f, "remote -> local"),
        }
    }
}

/// 单方向转发的结果
#[derive(Debug)]
pub struct CopyOutcome {
    pub direction: Direction,
    /// 已成功写入目标的字节数
    pub bytes: u64,
    /// 非 None 表示该方向因错误而结束
    pub error: Option<io::Error>,
}

impl CopyOutcome {
    pub fn is_clean(&self) -> bool {
        self.error.is_none()
    }
}

/// 从 `reader` 读取直到 EOF 或出错，并写入 `writer`
///
/// 不设置空闲超时；对端既不发送也不关闭时会一直等待。
/// 不关闭 `writer`，半关闭由调用方负责。
pub async fn copy_counted<R, W>(
    reader: &mut R,
    writer: &mut W,
    direction: Direction,
    mut on_chunk: impl FnMut(u64),
) -> CopyOutcome
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut bytes = 0u64;

    let error = loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break None,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => break Some(e),
        };

        if let Err(e) = writer.write_all(&buf[..n]).await {
            break Some(e);
        }
        bytes += n as u64;
        on_chunk(n as u64);
    };

    // TLS 写端需要 flush 才会把缓冲的记录真正发出
    let error = match error {
        None => writer.flush().await.err(),
        e => e,
    };

    CopyOutcome {
        direction,
        bytes,
        error,
    }
}
