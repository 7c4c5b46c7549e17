//! Big-endian, length-prefixed wire primitives shared by every message
//! layout in `protocol.rs`. All reads await; a short read surfaces as
//! [`crate::Error::TransportClosed`] rather than a generic I/O error.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{map_read_err, map_write_err, Result};

pub async fn read_u8<R: AsyncRead + Unpin>(r: &mut R) -> Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf).await.map_err(map_read_err)?;
    Ok(buf[0])
}

pub async fn read_u16<R: AsyncRead + Unpin>(r: &mut R) -> Result<u16> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf).await.map_err(map_read_err)?;
    Ok(u16::from_be_bytes(buf))
}

pub async fn read_u32<R: AsyncRead + Unpin>(r: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).await.map_err(map_read_err)?;
    Ok(u32::from_be_bytes(buf))
}

pub async fn read_i32<R: AsyncRead + Unpin>(r: &mut R) -> Result<i32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).await.map_err(map_read_err)?;
    Ok(i32::from_be_bytes(buf))
}

pub async fn read_exact_vec<R: AsyncRead + Unpin>(r: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf).await.map_err(map_read_err)?;
    Ok(buf)
}

pub async fn skip<R: AsyncRead + Unpin>(r: &mut R, len: usize) -> Result<()> {
    read_exact_vec(r, len).await?;
    Ok(())
}

/// Reads a u32-length-prefixed byte string and decodes it as Latin-1
/// (every byte value maps to the Unicode code point of the same number,
/// per RFB 3.8's use of Latin-1 for all protocol strings).
pub async fn read_latin1_string<R: AsyncRead + Unpin>(r: &mut R) -> Result<String> {
    let length = read_u32(r).await? as usize;
    let bytes = read_exact_vec(r, length).await?;
    Ok(bytes.iter().map(|&b| b as char).collect())
}

pub async fn write_u8<W: AsyncWrite + Unpin>(w: &mut W, value: u8) -> Result<()> {
    w.write_all(&[value]).await.map_err(map_write_err)
}

pub async fn write_u16<W: AsyncWrite + Unpin>(w: &mut W, value: u16) -> Result<()> {
    w.write_all(&value.to_be_bytes()).await.map_err(map_write_err)
}

pub async fn write_u32<W: AsyncWrite + Unpin>(w: &mut W, value: u32) -> Result<()> {
    w.write_all(&value.to_be_bytes()).await.map_err(map_write_err)
}

pub async fn write_i32<W: AsyncWrite + Unpin>(w: &mut W, value: i32) -> Result<()> {
    w.write_all(&value.to_be_bytes()).await.map_err(map_write_err)
}

/// Writes a string as a u32-length-prefixed Latin-1 byte string, truncating
/// each character to its low byte (mirrors `read_latin1_string`).
pub async fn write_latin1_string<W: AsyncWrite + Unpin>(w: &mut W, text: &str) -> Result<()> {
    let bytes: Vec<u8> = text.chars().map(|c| c as u8).collect();
    write_u32(w, bytes.len() as u32).await?;
    w.write_all(&bytes).await.map_err(map_write_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_integers() {
        let mut buf = Vec::new();
        write_u16(&mut buf, 0x1234).await.unwrap();
        write_u32(&mut buf, 0xdead_beef).await.unwrap();
        write_i32(&mut buf, -1).await.unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        assert_eq!(read_u16(&mut cursor).await.unwrap(), 0x1234);
        assert_eq!(read_u32(&mut cursor).await.unwrap(), 0xdead_beef);
        assert_eq!(read_i32(&mut cursor).await.unwrap(), -1);
    }

    #[tokio::test]
    async fn round_trips_latin1_string() {
        let mut buf = Vec::new();
        write_latin1_string(&mut buf, "blocked").await.unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        assert_eq!(read_latin1_string(&mut cursor).await.unwrap(), "blocked");
    }

    #[tokio::test]
    async fn short_read_is_transport_closed() {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        match read_u8(&mut cursor).await {
            Err(crate::Error::TransportClosed) => (),
            other => panic!("expected TransportClosed, got {other:?}"),
        }
    }

    /// Same property as `short_read_is_transport_closed`, but driven over a
    /// scripted mock transport instead of a plain `Cursor`, to exercise the
    /// read path the way a half-closed socket would actually behave.
    #[tokio::test]
    async fn short_read_over_mock_transport_is_transport_closed() {
        let mut mock = tokio_test::io::Builder::new().read(&[0x12]).build();
        assert_eq!(read_u8(&mut mock).await.unwrap(), 0x12);

        let mut empty_mock = tokio_test::io::Builder::new().build();
        match read_u16(&mut empty_mock).await {
            Err(crate::Error::TransportClosed) => (),
            other => panic!("expected TransportClosed, got {other:?}"),
        }
    }

    /// Writing after the peer half of the transport is gone must surface as
    /// `TransportClosed`, not a generic `Io` error (spec §7).
    #[tokio::test]
    async fn write_after_peer_drop_is_transport_closed() {
        let (mut ours, theirs) = tokio::io::duplex(1);
        drop(theirs);

        // The peer is gone; repeated writes eventually hit a broken pipe
        // once the duplex's internal buffer (capacity 1) fills up.
        let mut result = Ok(());
        for _ in 0..4 {
            result = write_u8(&mut ours, 0xAB).await;
            if result.is_err() {
                break;
            }
        }
        match result {
            Err(crate::Error::TransportClosed) => (),
            other => panic!("expected TransportClosed, got {other:?}"),
        }
    }
}
