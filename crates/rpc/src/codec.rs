//! Length-prefixed postcard framing.
//!
//! Each frame is a little-endian `u32` byte length followed by the postcard
//! encoding of one value.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Result, RpcError};

/// Default upper bound on a single frame's payload.
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Encodes `value` and writes it as one frame. Does not flush.
pub async fn write_frame<W, T>(writer: &mut W, value: &T, max_frame_len: usize) -> Result<()>
where
	W: AsyncWrite + Unpin,
	T: Serialize,
{
	let buf = postcard::to_allocvec(value)?;
	let len = u32::try_from(buf.len())
		.ok()
		.filter(|_| buf.len() <= max_frame_len)
		.ok_or(RpcError::FrameTooLarge {
			len: buf.len(),
			max: max_frame_len,
		})?;
	writer.write_u32_le(len).await?;
	writer.write_all(&buf).await?;
	Ok(())
}

/// Reads one frame and decodes it.
///
/// Returns `None` on a clean end of stream at a frame boundary. A stream that
/// ends mid-frame is an [`RpcError::Io`] with `UnexpectedEof`.
pub async fn read_frame<R, T>(reader: &mut R, max_frame_len: usize) -> Result<Option<T>>
where
	R: AsyncRead + Unpin,
	T: DeserializeOwned,
{
	let mut prefix = [0u8; 4];
	let n = reader.read(&mut prefix).await?;
	if n == 0 {
		return Ok(None);
	}
	reader.read_exact(&mut prefix[n..]).await?;

	let len = u32::from_le_bytes(prefix) as usize;
	if len > max_frame_len {
		return Err(RpcError::FrameTooLarge {
			len,
			max: max_frame_len,
		});
	}
	let mut buf = vec![0u8; len];
	reader.read_exact(&mut buf).await?;
	Ok(Some(postcard::from_bytes(&buf)?))
}

#[cfg(test)]
mod tests {
	use std::io;

	use serde::Deserialize;

	use super::*;
	use crate::{Envelope, MessageId};

	#[derive(Debug, PartialEq, Serialize, Deserialize)]
	enum Body {
		Range { offset: u64, bytes: u32 },
		Data(Vec<u8>),
	}

	#[tokio::test]
	async fn frames_are_length_prefixed_and_sequential() -> Result<()> {
		let (mut client, mut server) = tokio::io::duplex(256);
		let first = Envelope {
			message_id: MessageId(0),
			in_reply_to: None,
			body: Body::Range { offset: 16, bytes: 4 },
		};
		let second = Envelope {
			message_id: MessageId(1),
			in_reply_to: Some(MessageId(7)),
			body: Body::Data(vec![1, 2]),
		};
		write_frame(&mut client, &first, DEFAULT_MAX_FRAME_LEN).await?;
		write_frame(&mut client, &second, DEFAULT_MAX_FRAME_LEN).await?;
		drop(client);

		let decoded: Option<Envelope<Body>> = read_frame(&mut server, DEFAULT_MAX_FRAME_LEN).await?;
		assert_eq!(decoded, Some(first));
		let decoded: Option<Envelope<Body>> = read_frame(&mut server, DEFAULT_MAX_FRAME_LEN).await?;
		assert_eq!(decoded, Some(second));
		let eof: Option<Envelope<Body>> = read_frame(&mut server, DEFAULT_MAX_FRAME_LEN).await?;
		assert_eq!(eof, None);
		Ok(())
	}

	#[tokio::test]
	async fn oversized_announcement_is_rejected_before_reading_payload() {
		let (mut client, mut server) = tokio::io::duplex(64);
		client.write_u32_le(1024).await.expect("write prefix");

		let err = read_frame::<_, Body>(&mut server, 512).await.expect_err("too large");
		assert!(matches!(err, RpcError::FrameTooLarge { len: 1024, max: 512 }));
	}

	#[tokio::test]
	async fn oversized_value_is_not_written() {
		let (mut client, _server) = tokio::io::duplex(64);
		let err = write_frame(&mut client, &Body::Data(vec![0; 64]), 16).await.expect_err("too large");
		assert!(matches!(err, RpcError::FrameTooLarge { max: 16, .. }));
	}

	#[tokio::test]
	async fn truncated_frame_is_an_io_error() {
		let (mut client, mut server) = tokio::io::duplex(64);
		client.write_u32_le(10).await.expect("write prefix");
		client.write_all(&[1, 2, 3]).await.expect("write partial payload");
		drop(client);

		let err = read_frame::<_, Body>(&mut server, DEFAULT_MAX_FRAME_LEN).await.expect_err("truncated");
		assert!(matches!(err, RpcError::Io(ref e) if e.kind() == io::ErrorKind::UnexpectedEof));
	}

	#[tokio::test]
	async fn undecodable_payload_is_a_codec_error() {
		let (mut client, mut server) = tokio::io::duplex(64);
		client.write_u32_le(1).await.expect("write prefix");
		client.write_all(&[0xFF]).await.expect("write payload");

		let err = read_frame::<_, Body>(&mut server, DEFAULT_MAX_FRAME_LEN).await.expect_err("bad variant");
		assert!(matches!(err, RpcError::Codec(_)));
	}
}
