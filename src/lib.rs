//! An async client implementation of the RFB (VNC) protocol: handshake and
//! authentication (VNC-auth and Apple Remote Desktop), the framebuffer
//! update decoder (Raw and zlib), keyboard/mouse input, clipboard, and
//! multi-head screen detection.
//!
//! Entry point: [`connect`], which performs the handshake over a
//! caller-supplied transport and returns a [`Session`].

pub mod crypto;
mod error;
mod framebuffer;
mod handshake;
mod input;
mod keysym;
mod message_loop;
mod protocol;
mod screen;
mod session;
mod wire;

pub use error::{Error, Result};
pub use framebuffer::Framebuffer;
pub use handshake::Credentials;
pub use input::keyboard::{Keyboard, KeyboardState};
pub use input::mouse::{self as mouse, Mouse, MouseState};
pub use keysym::Keysym;
pub use message_loop::Event;
pub use protocol::PixelFormat;
pub use screen::Screen;
pub use session::{connect, connect_transport, Clipboard, Opener, Session, TcpSession, Transport, Video, DEFAULT_PORT};
