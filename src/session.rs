//! The top-level session surface: `connect`, and the keyboard/mouse/video/
//! clipboard handles it exposes (spec §6).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::framebuffer::{Framebuffer, ZlibStream};
use crate::handshake::{self, Credentials};
use crate::input::keyboard::{Keyboard, KeyboardState};
use crate::input::mouse::{Mouse, MouseState};
use crate::message_loop::{self, Event, ReaderState};
use crate::protocol::{write_client_cut_text, write_framebuffer_update_request, PixelFormat};
use crate::screen::{self, Screen};

/// Default RFB TCP port (spec §6).
pub const DEFAULT_PORT: u16 = 5900;

/// Anything that can carry the RFB byte stream both ways: a plain
/// `TcpStream` is the common case, but an SSH-tunneled or otherwise
/// wrapped stream works equally well.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

type BoxedTransport = Box<dyn Transport>;
type OpenFuture = Pin<Box<dyn Future<Output = Result<BoxedTransport>> + Send>>;

/// A transport factory (spec §6 "Transport factory" collaborator):
/// `(host, port) -> transport`. The default is plain TCP; callers that need
/// an SSH tunnel or similar supply their own to [`connect`].
pub trait Opener: Send + Sync {
    fn open(&self, host: &str, port: u16) -> OpenFuture;
}

impl<F, Fut> Opener for F
where
    F: Fn(&str, u16) -> Fut + Send + Sync,
    Fut: Future<Output = Result<BoxedTransport>> + Send + 'static,
{
    fn open(&self, host: &str, port: u16) -> OpenFuture {
        Box::pin(self(host, port))
    }
}

async fn dial_tcp(host: &str, port: u16) -> Result<BoxedTransport> {
    let stream = TcpStream::connect((host, port)).await?;
    Ok(Box::new(stream))
}

/// A [`Session`] over the boxed transport [`connect`] produces.
pub type TcpSession = Session<ReadHalf<BoxedTransport>, WriteHalf<BoxedTransport>>;

/// Dials `host:port` (via `opener`, or plain TCP if `None`), authenticates
/// with `credentials`, and runs the handshake to completion (spec §6
/// `connect(host, port, username, password, opener)`).
pub async fn connect(
    host: &str,
    port: u16,
    credentials: Credentials,
    opener: Option<&dyn Opener>,
) -> Result<TcpSession> {
    let transport = match opener {
        Some(opener) => opener.open(host, port).await?,
        None => dial_tcp(host, port).await?,
    };
    let (reader, writer) = tokio::io::split(transport);
    connect_transport(reader, writer, credentials).await
}

/// State shared between the reader ([`Session::read`]) and the handles
/// returned by [`Session::keyboard`]/[`Session::mouse`]/[`Session::video`]/
/// [`Session::clipboard`]. Framebuffer and clipboard are written only by
/// the reader; everything else may read them at any time (spec §5).
struct Shared<W> {
    writer: Mutex<W>,
    framebuffer: Mutex<Framebuffer>,
    clipboard: Mutex<String>,
    keyboard_state: Mutex<KeyboardState>,
    mouse_state: Mutex<MouseState>,
}

/// An authenticated, handshaken RFB connection (spec §3 `Session`, §6).
///
/// `R`/`W` are the split halves of whatever transport `connect` was given;
/// the read half is exclusively owned here, so only one call to
/// [`Session::read`] can be in flight at a time — the "single reader"
/// invariant of spec §5 falls directly out of Rust's borrow rules rather
/// than needing a runtime check.
///
/// There is no `async Drop` in Rust, so teardown (spec §5: release held
/// keys/buttons, flush, close transport) is the explicit [`Session::close`]
/// method rather than an implicit scope exit; callers that skip it still
/// get the transport closed when `W` is dropped, just without the
/// best-effort key/button release.
pub struct Session<R, W> {
    reader: R,
    zlib: ZlibStream,
    pixel_format: PixelFormat,
    width: u16,
    height: u16,
    name: String,
    shared: Arc<Shared<W>>,
}

/// Runs the handshake over already-split transport halves. [`connect`] is
/// the usual entry point; this is the lower-level constructor it calls,
/// exposed directly for callers that already have a split stream (e.g. one
/// obtained from a custom tunnel setup rather than an [`Opener`]).
pub async fn connect_transport<R, W>(mut reader: R, mut writer: W, credentials: Credentials) -> Result<Session<R, W>>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let handshake = handshake::run(&mut reader, &mut writer, &credentials).await?;

    Ok(Session {
        reader,
        zlib: ZlibStream::new(),
        pixel_format: PixelFormat::CANONICAL,
        width: handshake.framebuffer_width,
        height: handshake.framebuffer_height,
        name: handshake.name,
        shared: Arc::new(Shared {
            writer: Mutex::new(writer),
            framebuffer: Mutex::new(Framebuffer::new(handshake.framebuffer_width, handshake.framebuffer_height)),
            clipboard: Mutex::new(String::new()),
            keyboard_state: Mutex::new(KeyboardState::default()),
            mouse_state: Mutex::new(MouseState::default()),
        }),
    })
}

impl<R, W> Session<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn keyboard(&self) -> Keyboard<'_, W> {
        Keyboard::new(&self.shared.writer, &self.shared.keyboard_state)
    }

    pub fn mouse(&self) -> Mouse<'_, W> {
        Mouse::new(&self.shared.writer, &self.shared.mouse_state)
    }

    pub fn video(&self) -> Video<'_, R, W> {
        Video { session: self }
    }

    pub fn clipboard(&self) -> Clipboard<'_, W> {
        Clipboard { shared: &self.shared }
    }

    /// Advances the message loop by reading and dispatching exactly one
    /// server-to-client message (spec §4.6, §6 `read()`). Callers drive
    /// this in a loop — directly, or from a spawned task holding the
    /// `Session` by value — to keep the connection alive.
    ///
    /// Holds the framebuffer and clipboard locks for the whole read, which
    /// can await arbitrarily long on the next message's bytes: a concurrent
    /// `video().as_rgba()`/`detect_screens()` blocks until the read
    /// completes rather than observing a half-updated or placeholder state
    /// (spec §5).
    pub async fn read(&mut self) -> Result<Option<Event>> {
        let mut framebuffer = self.shared.framebuffer.lock().await;
        let mut clipboard = self.shared.clipboard.lock().await;

        let mut reader_state = ReaderState {
            framebuffer: &mut *framebuffer,
            zlib: &mut self.zlib,
            pixel_format: self.pixel_format,
            clipboard: &mut *clipboard,
        };

        message_loop::read_one(&mut self.reader, &mut reader_state).await
    }

    /// Releases every currently-held key and mouse button (best-effort,
    /// ignoring write failures) and closes the transport's write half
    /// (spec §5 teardown).
    pub async fn close(mut self) -> Result<()> {
        let held_keys: Vec<_> = self.shared.keyboard_state.lock().await.held().to_vec();
        for keysym in held_keys.into_iter().rev() {
            let _ = crate::protocol::write_key_event(&mut *self.shared.writer.lock().await, false, keysym.0).await;
        }
        let mask = self.shared.mouse_state.lock().await.button_mask;
        if mask != 0 {
            let (x, y) = {
                let mouse = self.shared.mouse_state.lock().await;
                (mouse.x, mouse.y)
            };
            let _ = crate::protocol::write_pointer_event(&mut *self.shared.writer.lock().await, 0, x, y).await;
        }

        let mut writer = self.shared.writer.lock().await;
        writer.flush().await.map_err(crate::error::map_write_err)?;
        writer.shutdown().await.map_err(crate::error::map_write_err)?;
        Ok(())
    }
}

/// Framebuffer access and refresh requests (spec §6 `video`).
pub struct Video<'a, R, W> {
    session: &'a Session<R, W>,
}

impl<'a, R, W> Video<'a, R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Returns a snapshot of the H×W×4 RGBA framebuffer.
    pub async fn as_rgba(&self) -> Vec<u8> {
        self.session.shared.framebuffer.lock().await.as_rgba()
    }

    /// Detected sub-screens in the current framebuffer (spec §4.8).
    pub async fn detect_screens(&self) -> Vec<Screen> {
        let framebuffer = self.session.shared.framebuffer.lock().await;
        screen::detect_screens(framebuffer.written_mask(), framebuffer.width(), framebuffer.height())
    }

    /// Requests a framebuffer update for the whole screen (or only the
    /// changed area, if `incremental`).
    pub async fn refresh(&self, incremental: bool) -> Result<()> {
        let mut writer = self.session.shared.writer.lock().await;
        write_framebuffer_update_request(&mut *writer, incremental, 0, 0, self.session.width, self.session.height)
            .await
    }
}

/// Clipboard access (spec §6 `clipboard`).
pub struct Clipboard<'a, W> {
    shared: &'a Shared<W>,
}

impl<'a, W: AsyncWrite + Unpin> Clipboard<'a, W> {
    /// The last server cut-text received, if any.
    pub async fn text(&self) -> String {
        self.shared.clipboard.lock().await.clone()
    }

    /// Sends `text` to the server as `ClientCutText`.
    pub async fn write(&self, text: &str) -> Result<()> {
        let mut writer = self.shared.writer.lock().await;
        write_client_cut_text(&mut *writer, text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    /// Runs the handshake over an in-memory duplex pair scripted to offer
    /// only `SecurityType::None`, then checks the resulting Session's
    /// ServerInit fields and that SetPixelFormat/SetEncodings were sent.
    #[tokio::test]
    async fn connect_performs_handshake_over_duplex_transport() {
        let (client_io, mut server_io) = duplex(4096);
        let (client_reader, client_writer) = tokio::io::split(client_io);

        let server_task = tokio::spawn(async move {
            use tokio::io::{AsyncReadExt, AsyncWriteExt};

            server_io.write_all(b"RFB 003.008\n").await.unwrap();
            let mut version = [0u8; 12];
            server_io.read_exact(&mut version).await.unwrap();

            server_io.write_all(&[1u8, 1]).await.unwrap(); // one security type: None
            let mut chosen = [0u8; 1];
            server_io.read_exact(&mut chosen).await.unwrap();
            assert_eq!(chosen[0], 1);

            server_io.write_all(&20u16.to_be_bytes()).await.unwrap(); // width
            server_io.write_all(&10u16.to_be_bytes()).await.unwrap(); // height
            let mut format = Vec::new();
            PixelFormat::CANONICAL.write_to(&mut format).await.unwrap();
            server_io.write_all(&format).await.unwrap();
            server_io.write_all(&5u32.to_be_bytes()).await.unwrap();
            server_io.write_all(b"mybox").await.unwrap();

            // Drain SetPixelFormat + SetEncodings so the client side doesn't block.
            let mut drain = [0u8; 256];
            let _ = server_io.read(&mut drain).await;
        });

        let session = connect_transport(client_reader, client_writer, Credentials::default()).await.unwrap();
        assert_eq!(session.name(), "mybox");
        assert_eq!(session.width(), 20);
        assert_eq!(session.height(), 10);

        server_task.await.unwrap();
    }
}
