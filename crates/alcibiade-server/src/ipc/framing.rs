use alcibiade_proto::ProtoError;
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Read one `[u32 len][u8 opcode][payload]` frame. Returns the whole frame,
/// length prefix included, or `None` on a clean EOF at a frame boundary.
pub async fn read_frame<R: AsyncRead + Unpin>(
    r: &mut R,
    max_frame: usize,
    buf: &mut BytesMut,
) -> Result<Option<BytesMut>, ProtoError> {
    if !fill(r, buf, 4).await? {
        return Ok(None);
    }
    let mut len_bytes = &buf[..4];
    let len = len_bytes.get_u32_le() as usize;

    if len == 0 {
        return Err(ProtoError::InvalidFrame("empty frame".into()));
    }
    if len > max_frame {
        return Err(ProtoError::FrameTooLarge(len));
    }

    let total = 4 + len;
    if !fill(r, buf, total).await? {
        return Err(ProtoError::InvalidFrame("connection closed mid-frame".into()));
    }
    Ok(Some(buf.split_to(total)))
}

/// Read until `buf` holds `want` bytes. False on EOF before any byte of a new frame.
async fn fill<R: AsyncRead + Unpin>(r: &mut R, buf: &mut BytesMut, want: usize) -> Result<bool, ProtoError> {
    while buf.len() < want {
        let n = r.read_buf(buf).await?;
        if n == 0 {
            if buf.is_empty() {
                return Ok(false);
            }
            return Err(ProtoError::InvalidFrame("connection closed mid-frame".into()));
        }
    }
    Ok(true)
}
