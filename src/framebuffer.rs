//! The decoded pixel buffer and the Raw/zlib rectangle decoder (spec §3,
//! §4.5).

use flate2::{Decompress, FlushDecompress};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};
use crate::protocol::{Encoding, PixelFormat, RectangleHeader};
use crate::wire;

/// The client-side mirror of the server's screen: RGBA bytes plus a
/// parallel "written" mask used by screen detection (spec §3, §4.8).
pub struct Framebuffer {
    width: u16,
    height: u16,
    pixels: Vec<u8>,
    written: Vec<bool>,
}

impl Framebuffer {
    pub fn new(width: u16, height: u16) -> Framebuffer {
        let area = width as usize * height as usize;
        Framebuffer {
            width,
            height,
            pixels: vec![0u8; area * 4],
            written: vec![false; area],
        }
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    /// Returns a copy of the H×W×4 RGBA buffer (spec §6 `as_rgba`).
    pub fn as_rgba(&self) -> Vec<u8> {
        self.pixels.clone()
    }

    pub fn written_mask(&self) -> &[bool] {
        &self.written
    }

    /// Blits already-decoded RGBA `data` (exactly `w*h*4` bytes, in the
    /// client's canonical pixel format) into the framebuffer at `(x, y)`
    /// and marks those pixels written.
    fn blit(&mut self, x: u16, y: u16, w: u16, h: u16, data: &[u8]) -> Result<()> {
        if data.len() != w as usize * h as usize * 4 {
            return Err(Error::ProtocolError("rectangle data length does not match its dimensions"));
        }
        for row in 0..h {
            let dst_y = y as usize + row as usize;
            if dst_y >= self.height as usize {
                return Err(Error::ProtocolError("rectangle exceeds framebuffer height"));
            }
            for col in 0..w {
                let dst_x = x as usize + col as usize;
                if dst_x >= self.width as usize {
                    return Err(Error::ProtocolError("rectangle exceeds framebuffer width"));
                }
                let src_off = (row as usize * w as usize + col as usize) * 4;
                let dst_off = (dst_y * self.width as usize + dst_x) * 4;
                self.pixels[dst_off..dst_off + 4].copy_from_slice(&data[src_off..src_off + 4]);
                self.written[dst_y * self.width as usize + dst_x] = true;
            }
        }
        Ok(())
    }
}

/// Reorders raw wire bytes for one pixel into RGBA memory order, honoring
/// the server's declared channel shifts/masks (spec §3 invariant: "the
/// decoder performs channel reordering").
fn swizzle_pixel(raw: &[u8], format: &PixelFormat) -> [u8; 4] {
    let value: u32 = if format.big_endian {
        u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]])
    } else {
        u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])
    };
    let channel = |shift: u8, max: u16| -> u8 {
        let mask = max as u32;
        let v = (value >> shift) & mask;
        if mask == 0 {
            0
        } else {
            ((v * 255) / mask) as u8
        }
    };
    [
        channel(format.red_shift, format.red_max),
        channel(format.green_shift, format.green_max),
        channel(format.blue_shift, format.blue_max),
        255,
    ]
}

/// Converts `w*h` raw wire pixels (4 bytes each, in `format`) into `w*h*4`
/// RGBA bytes.
fn decode_raw_pixels(raw: &[u8], format: &PixelFormat) -> Vec<u8> {
    raw.chunks_exact(4).flat_map(|px| swizzle_pixel(px, format)).collect()
}

/// Persistent inflate state for zlib-encoded rectangles (spec §3
/// `ZlibStream`, §4.5, §8 law 4): the server's deflate stream runs for the
/// whole session, so history from one rectangle carries into the next.
pub struct ZlibStream {
    inflate: Decompress,
}

impl ZlibStream {
    pub fn new() -> ZlibStream {
        ZlibStream { inflate: Decompress::new(true) }
    }

    fn decompress(&mut self, compressed: &[u8], expected_len: usize) -> Result<Vec<u8>> {
        let mut out = vec![0u8; expected_len];
        let before_in = self.inflate.total_in();
        let before_out = self.inflate.total_out();
        self.inflate
            .decompress(compressed, &mut out, FlushDecompress::Sync)
            .map_err(|_| Error::ProtocolError("zlib rectangle failed to decompress"))?;
        let produced = (self.inflate.total_out() - before_out) as usize;
        let consumed = (self.inflate.total_in() - before_in) as usize;
        if produced != expected_len || consumed != compressed.len() {
            return Err(Error::ProtocolError("zlib rectangle decompressed to unexpected length"));
        }
        Ok(out)
    }
}

impl Default for ZlibStream {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads one rectangle's body (already past its header) and blits it into
/// `framebuffer`, per spec §4.5.
pub async fn decode_rectangle<R: AsyncRead + Unpin>(
    reader: &mut R,
    header: &RectangleHeader,
    format: &PixelFormat,
    zlib: &mut ZlibStream,
    framebuffer: &mut Framebuffer,
) -> Result<()> {
    let pixel_count = header.width as usize * header.height as usize;
    let raw_len = pixel_count * 4;

    let encoding = Encoding::from_i32(header.encoding).ok_or(Error::ProtocolError("unknown rectangle encoding"))?;
    let rgba = match encoding {
        Encoding::Raw => {
            let raw = wire::read_exact_vec(reader, raw_len).await?;
            decode_raw_pixels(&raw, format)
        }
        Encoding::Zlib => {
            let compressed_len = wire::read_u32(reader).await? as usize;
            let compressed = wire::read_exact_vec(reader, compressed_len).await?;
            let raw = zlib.decompress(&compressed, raw_len)?;
            decode_raw_pixels(&raw, format)
        }
    };

    framebuffer.blit(header.x, header.y, header.width, header.height, &rgba)
}
