//! The reader task: dispatches server-to-client messages to the
//! framebuffer, clipboard, and bell handlers (spec §4.6).

use log::{debug, trace};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};
use crate::framebuffer::{decode_rectangle, Framebuffer, ZlibStream};
use crate::protocol::{s2c, PixelFormat, RectangleHeader};
use crate::wire;

/// Side effects the message loop surfaces to the session beyond framebuffer
/// and clipboard state (both of which it mutates directly).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Bell,
}

/// Everything the reader task needs exclusive access to while the session
/// is alive. Borrowed by [`crate::session::Session::read`] from the
/// `Mutex`-guarded framebuffer/clipboard for the duration of the read, so
/// concurrent observers never see a placeholder in their place.
pub struct ReaderState<'a> {
    pub framebuffer: &'a mut Framebuffer,
    pub zlib: &'a mut ZlibStream,
    pub pixel_format: PixelFormat,
    pub clipboard: &'a mut String,
}

/// Reads and dispatches exactly one server-to-client message (spec §6
/// `read()`, manual drive mode; also the body of the task spawned for
/// ongoing operation). Returns the event the caller should be told about,
/// if any.
pub async fn read_one<R: AsyncRead + Unpin>(reader: &mut R, state: &mut ReaderState<'_>) -> Result<Option<Event>> {
    let message_type = wire::read_u8(reader).await?;
    trace!("<- message type {}", message_type);
    match message_type {
        s2c::FRAMEBUFFER_UPDATE => {
            read_framebuffer_update(reader, state).await?;
            Ok(None)
        }
        s2c::SET_COLOUR_MAP_ENTRIES => {
            read_and_ignore_colour_map(reader).await?;
            Ok(None)
        }
        s2c::BELL => {
            debug!("<- Bell");
            Ok(Some(Event::Bell))
        }
        s2c::SERVER_CUT_TEXT => {
            wire::skip(reader, 3).await?;
            state.clipboard = wire::read_latin1_string(reader).await?;
            debug!("<- ServerCutText({:?})", state.clipboard);
            Ok(None)
        }
        _ => Err(Error::ProtocolError("unknown server-to-client message type")),
    }
}

async fn read_framebuffer_update<R: AsyncRead + Unpin>(reader: &mut R, state: &mut ReaderState<'_>) -> Result<()> {
    wire::skip(reader, 1).await?;
    let rect_count = wire::read_u16(reader).await?;
    debug!("<- FramebufferUpdate({} rects)", rect_count);
    for _ in 0..rect_count {
        let header = RectangleHeader::read_from(reader).await?;
        decode_rectangle(reader, &header, &state.pixel_format, state.zlib, state.framebuffer).await?;
    }
    Ok(())
}

/// True-color is always forced via `SetPixelFormat`, so colour-map entries
/// are never meaningful; read past them to stay in sync with the stream.
async fn read_and_ignore_colour_map<R: AsyncRead + Unpin>(reader: &mut R) -> Result<()> {
    wire::skip(reader, 1).await?;
    let _first_colour = wire::read_u16(reader).await?;
    let count = wire::read_u16(reader).await?;
    wire::skip(reader, count as usize * 6).await
}
