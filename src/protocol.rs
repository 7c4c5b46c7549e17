//! Wire-format structures for RFB 3.8, trimmed to the subset this client
//! speaks: security types {None, VNC, Apple ARD}, and encodings {Raw, zlib}.
//!
//! This mirrors the shape of the teacher's `protocol.rs` (one type per
//! message, a `Message`-style read/write pair) but the read/write sides are
//! async free functions over `wire.rs` rather than a `Message` trait, since
//! the codec now runs over `tokio::io` instead of `std::io`.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::error::{map_write_err, Error, Result};
use crate::wire;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolVersion {
    pub major: u16,
    pub minor: u16,
}

impl ProtocolVersion {
    pub const RFB_3_8: ProtocolVersion = ProtocolVersion { major: 3, minor: 8 };

    pub async fn read_from<R: AsyncRead + Unpin>(r: &mut R) -> Result<ProtocolVersion> {
        let buf = wire::read_exact_vec(r, 12).await?;
        let text = std::str::from_utf8(&buf)
            .map_err(|_| Error::ProtocolError("protocol version is not ASCII"))?;
        let (major, minor) = Self::parse(text)
            .ok_or(Error::ProtocolError("malformed protocol version line"))?;
        Ok(ProtocolVersion { major, minor })
    }

    fn parse(text: &str) -> Option<(u16, u16)> {
        let rest = text.strip_prefix("RFB ")?;
        let rest = rest.strip_suffix('\n')?;
        let (major, minor) = rest.split_once('.')?;
        Some((major.parse().ok()?, minor.parse().ok()?))
    }

    pub async fn write_to<W: AsyncWrite + Unpin>(&self, w: &mut W) -> Result<()> {
        let line = format!("RFB {:03}.{:03}\n", self.major, self.minor);
        w.write_all(line.as_bytes()).await.map_err(map_write_err)
    }
}

/// Security types the server can offer, as read during negotiation. Types
/// this client does not implement still parse (as `Unknown`) so the
/// negotiation list can be inspected, but can never be selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityType {
    None,
    VncAuthentication,
    AppleRemoteDesktop,
    Unknown(u8),
}

impl SecurityType {
    pub fn from_byte(byte: u8) -> SecurityType {
        match byte {
            1 => SecurityType::None,
            2 => SecurityType::VncAuthentication,
            30 => SecurityType::AppleRemoteDesktop,
            n => SecurityType::Unknown(n),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            SecurityType::None => 1,
            SecurityType::VncAuthentication => 2,
            SecurityType::AppleRemoteDesktop => 30,
            SecurityType::Unknown(n) => n,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityResult {
    Succeeded,
    Failed,
}

impl SecurityResult {
    pub async fn read_from<R: AsyncRead + Unpin>(r: &mut R) -> Result<SecurityResult> {
        match wire::read_u32(r).await? {
            0 => Ok(SecurityResult::Succeeded),
            1 => Ok(SecurityResult::Failed),
            _ => Err(Error::ProtocolError("malformed SecurityResult")),
        }
    }
}

/// The client's canonical pixel format: 32bpp true-color, little-endian,
/// R at shift 0, G at shift 8, B at shift 16 (per spec §3). Also used to
/// parse whatever format the server declares in ServerInit, since the
/// wire layout is shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormat {
    pub bits_per_pixel: u8,
    pub depth: u8,
    pub big_endian: bool,
    pub true_colour: bool,
    pub red_max: u16,
    pub green_max: u16,
    pub blue_max: u16,
    pub red_shift: u8,
    pub green_shift: u8,
    pub blue_shift: u8,
}

impl PixelFormat {
    /// The format this client always requests via `SetPixelFormat`.
    pub const CANONICAL: PixelFormat = PixelFormat {
        bits_per_pixel: 32,
        depth: 24,
        big_endian: false,
        true_colour: true,
        red_max: 255,
        green_max: 255,
        blue_max: 255,
        red_shift: 0,
        green_shift: 8,
        blue_shift: 16,
    };

    pub async fn read_from<R: AsyncRead + Unpin>(r: &mut R) -> Result<PixelFormat> {
        let bits_per_pixel = wire::read_u8(r).await?;
        let depth = wire::read_u8(r).await?;
        let big_endian = wire::read_u8(r).await? != 0;
        let true_colour = wire::read_u8(r).await? != 0;
        let red_max = wire::read_u16(r).await?;
        let green_max = wire::read_u16(r).await?;
        let blue_max = wire::read_u16(r).await?;
        let red_shift = wire::read_u8(r).await?;
        let green_shift = wire::read_u8(r).await?;
        let blue_shift = wire::read_u8(r).await?;
        wire::skip(r, 3).await?;
        Ok(PixelFormat {
            bits_per_pixel,
            depth,
            big_endian,
            true_colour,
            red_max,
            green_max,
            blue_max,
            red_shift,
            green_shift,
            blue_shift,
        })
    }

    pub async fn write_to<W: AsyncWrite + Unpin>(&self, w: &mut W) -> Result<()> {
        wire::write_u8(w, self.bits_per_pixel).await?;
        wire::write_u8(w, self.depth).await?;
        wire::write_u8(w, self.big_endian as u8).await?;
        wire::write_u8(w, self.true_colour as u8).await?;
        wire::write_u16(w, self.red_max).await?;
        wire::write_u16(w, self.green_max).await?;
        wire::write_u16(w, self.blue_max).await?;
        wire::write_u8(w, self.red_shift).await?;
        wire::write_u8(w, self.green_shift).await?;
        wire::write_u8(w, self.blue_shift).await?;
        w.write_all(&[0u8; 3]).await.map_err(map_write_err)
    }
}

#[derive(Debug, Clone)]
pub struct ServerInit {
    pub framebuffer_width: u16,
    pub framebuffer_height: u16,
    pub pixel_format: PixelFormat,
    pub name: String,
}

impl ServerInit {
    pub async fn read_from<R: AsyncRead + Unpin>(r: &mut R) -> Result<ServerInit> {
        let framebuffer_width = wire::read_u16(r).await?;
        let framebuffer_height = wire::read_u16(r).await?;
        let pixel_format = PixelFormat::read_from(r).await?;
        let name = wire::read_latin1_string(r).await?;
        Ok(ServerInit {
            framebuffer_width,
            framebuffer_height,
            pixel_format,
            name,
        })
    }
}

/// Rectangle encodings this client can decode. Anything else is rejected
/// with [`Error::ProtocolError`] at dispatch time (Non-goal: no other
/// encodings).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Raw,
    Zlib,
}

impl Encoding {
    pub const WIRE_RAW: i32 = 0;
    pub const WIRE_ZLIB: i32 = 6;

    pub fn from_i32(value: i32) -> Option<Encoding> {
        match value {
            Self::WIRE_RAW => Some(Encoding::Raw),
            Self::WIRE_ZLIB => Some(Encoding::Zlib),
            _ => None,
        }
    }

    pub fn to_i32(self) -> i32 {
        match self {
            Encoding::Raw => Self::WIRE_RAW,
            Encoding::Zlib => Self::WIRE_ZLIB,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RectangleHeader {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
    pub encoding: i32,
}

impl RectangleHeader {
    pub async fn read_from<R: AsyncRead + Unpin>(r: &mut R) -> Result<RectangleHeader> {
        Ok(RectangleHeader {
            x: wire::read_u16(r).await?,
            y: wire::read_u16(r).await?,
            width: wire::read_u16(r).await?,
            height: wire::read_u16(r).await?,
            encoding: wire::read_i32(r).await?,
        })
    }
}

/// Server-to-client message type tags (spec §4.6).
pub mod s2c {
    pub const FRAMEBUFFER_UPDATE: u8 = 0;
    pub const SET_COLOUR_MAP_ENTRIES: u8 = 1;
    pub const BELL: u8 = 2;
    pub const SERVER_CUT_TEXT: u8 = 3;
}

/// Client-to-server message type tags (spec §4.7).
pub mod c2s {
    pub const SET_PIXEL_FORMAT: u8 = 0;
    pub const SET_ENCODINGS: u8 = 2;
    pub const FRAMEBUFFER_UPDATE_REQUEST: u8 = 3;
    pub const KEY_EVENT: u8 = 4;
    pub const POINTER_EVENT: u8 = 5;
    pub const CLIENT_CUT_TEXT: u8 = 6;
}

pub async fn write_set_pixel_format<W: AsyncWrite + Unpin>(
    w: &mut W,
    format: &PixelFormat,
) -> Result<()> {
    wire::write_u8(w, c2s::SET_PIXEL_FORMAT).await?;
    w.write_all(&[0u8; 3]).await.map_err(map_write_err)?;
    format.write_to(w).await
}

pub async fn write_set_encodings<W: AsyncWrite + Unpin>(
    w: &mut W,
    encodings: &[Encoding],
) -> Result<()> {
    wire::write_u8(w, c2s::SET_ENCODINGS).await?;
    w.write_all(&[0u8; 1]).await.map_err(map_write_err)?;
    wire::write_u16(w, encodings.len() as u16).await?;
    for encoding in encodings {
        wire::write_i32(w, encoding.to_i32()).await?;
    }
    Ok(())
}

pub async fn write_framebuffer_update_request<W: AsyncWrite + Unpin>(
    w: &mut W,
    incremental: bool,
    x: u16,
    y: u16,
    width: u16,
    height: u16,
) -> Result<()> {
    wire::write_u8(w, c2s::FRAMEBUFFER_UPDATE_REQUEST).await?;
    wire::write_u8(w, incremental as u8).await?;
    wire::write_u16(w, x).await?;
    wire::write_u16(w, y).await?;
    wire::write_u16(w, width).await?;
    wire::write_u16(w, height).await?;
    Ok(())
}

pub async fn write_key_event<W: AsyncWrite + Unpin>(
    w: &mut W,
    down: bool,
    keysym: u32,
) -> Result<()> {
    wire::write_u8(w, c2s::KEY_EVENT).await?;
    wire::write_u8(w, down as u8).await?;
    w.write_all(&[0u8; 2]).await.map_err(map_write_err)?;
    wire::write_u32(w, keysym).await?;
    Ok(())
}

pub async fn write_pointer_event<W: AsyncWrite + Unpin>(
    w: &mut W,
    button_mask: u8,
    x: u16,
    y: u16,
) -> Result<()> {
    wire::write_u8(w, c2s::POINTER_EVENT).await?;
    wire::write_u8(w, button_mask).await?;
    wire::write_u16(w, x).await?;
    wire::write_u16(w, y).await?;
    Ok(())
}

pub async fn write_client_cut_text<W: AsyncWrite + Unpin>(w: &mut W, text: &str) -> Result<()> {
    wire::write_u8(w, c2s::CLIENT_CUT_TEXT).await?;
    w.write_all(&[0u8; 3]).await.map_err(map_write_err)?;
    wire::write_latin1_string(w, text).await
}
