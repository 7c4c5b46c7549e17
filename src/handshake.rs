//! The connection-setup state machine: protocol version, security
//! negotiation, authentication, and `ClientInit`/`ServerInit` (spec §4.4).
//!
//! Everything here runs once, before the message loop starts, and any
//! failure is returned synchronously from [`crate::session::connect`].

use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::crypto::{apple, des};
use crate::error::{map_write_err, Error, Result};
use crate::protocol::{Encoding, PixelFormat, ProtocolVersion, SecurityResult, SecurityType, ServerInit};
use crate::wire;

/// Credentials supplied to [`crate::session::connect`]. VNC-auth uses
/// `password` alone; Apple ARD auth uses both `username` and `password`.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// The outcome of a successful handshake: the negotiated `ServerInit`
/// fields, ready for the message loop to start consuming updates.
pub struct Handshake {
    pub framebuffer_width: u16,
    pub framebuffer_height: u16,
    pub name: String,
}

/// Drives the full handshake to completion over `reader`/`writer`.
pub async fn run<R, W>(reader: &mut R, writer: &mut W, credentials: &Credentials) -> Result<Handshake>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    negotiate_version(reader, writer).await?;
    let security_type = negotiate_security(reader, writer, credentials).await?;
    authenticate(reader, writer, security_type, credentials).await?;

    writer.write_all(&[1u8]).await.map_err(map_write_err)?; // ClientInit: shared-flag

    let server_init = ServerInit::read_from(reader).await?;

    crate::protocol::write_set_pixel_format(writer, &PixelFormat::CANONICAL).await?;
    crate::protocol::write_set_encodings(writer, &[Encoding::Zlib, Encoding::Raw]).await?;

    Ok(Handshake {
        framebuffer_width: server_init.framebuffer_width,
        framebuffer_height: server_init.framebuffer_height,
        name: server_init.name,
    })
}

async fn negotiate_version<R, W>(reader: &mut R, writer: &mut W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let server_version = ProtocolVersion::read_from(reader).await?;
    debug!("<- {:?}", server_version);
    debug!("-> {:?}", ProtocolVersion::RFB_3_8);
    ProtocolVersion::RFB_3_8.write_to(writer).await
}

async fn negotiate_security<R, W>(
    reader: &mut R,
    writer: &mut W,
    credentials: &Credentials,
) -> Result<SecurityType>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let count = wire::read_u8(reader).await?;
    if count == 0 {
        let reason = wire::read_latin1_string(reader).await?;
        debug!("<- HandshakeRejected({:?})", reason);
        return Err(Error::HandshakeRejected(reason));
    }

    let mut offered = Vec::with_capacity(count as usize);
    for _ in 0..count {
        offered.push(SecurityType::from_byte(wire::read_u8(reader).await?));
    }
    debug!("<- {:?}", offered);

    let selected = select_security_type(&offered, credentials)?;
    debug!("-> {:?}", selected);
    wire::write_u8(writer, selected.to_byte()).await?;
    Ok(selected)
}

fn select_security_type(offered: &[SecurityType], credentials: &Credentials) -> Result<SecurityType> {
    if credentials.username.is_some() {
        return offered
            .iter()
            .copied()
            .find(|t| matches!(t, SecurityType::AppleRemoteDesktop))
            .ok_or(Error::AuthUnsupported);
    }
    if credentials.password.is_some() {
        if let Some(t) = offered.iter().copied().find(|t| matches!(t, SecurityType::VncAuthentication)) {
            return Ok(t);
        }
    }
    offered
        .iter()
        .copied()
        .find(|t| matches!(t, SecurityType::None))
        .ok_or(Error::AuthUnsupported)
}

async fn authenticate<R, W>(
    reader: &mut R,
    writer: &mut W,
    security_type: SecurityType,
    credentials: &Credentials,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    match security_type {
        SecurityType::None => Ok(()),
        SecurityType::VncAuthentication => {
            let password = credentials.password.as_deref().unwrap_or("");
            let challenge = wire::read_exact_vec(reader, 16).await?;
            let challenge: [u8; 16] = challenge
                .try_into()
                .map_err(|_| Error::ProtocolError("VNC-auth challenge must be 16 bytes"))?;
            let response = des::respond_to_challenge(password, &challenge);
            writer.write_all(&response).await.map_err(map_write_err)?;
            check_security_result(reader).await
        }
        SecurityType::AppleRemoteDesktop => {
            let username = credentials.username.as_deref().unwrap_or("");
            let password = credentials.password.as_deref().unwrap_or("");
            apple_authenticate(reader, writer, username, password).await
        }
        SecurityType::Unknown(_) => Err(Error::AuthUnsupported),
    }
}

async fn check_security_result<R: AsyncRead + Unpin>(reader: &mut R) -> Result<()> {
    match SecurityResult::read_from(reader).await? {
        SecurityResult::Succeeded => Ok(()),
        SecurityResult::Failed => {
            let reason = wire::read_latin1_string(reader).await?;
            Err(Error::AuthFailed(reason))
        }
    }
}

/// Apple Remote Desktop (security type 30). Wire shape, per spec §4.2: two
/// unknown/reserved bytes, u16 generator, u16 key length (always
/// [`apple::KEY_LENGTH`]), `key_length` bytes of DH prime, `key_length`
/// bytes of server public key. The client answers with its 128-byte
/// encrypted credentials block followed by its own public key. There is no
/// explicit success/failure reply; a rejected login manifests as the
/// server closing the transport.
async fn apple_authenticate<R, W>(reader: &mut R, writer: &mut W, username: &str, password: &str) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    wire::skip(reader, 2).await?;
    let generator = wire::read_u16(reader).await?;
    let key_length = wire::read_u16(reader).await? as usize;
    if key_length != apple::KEY_LENGTH {
        return Err(Error::ProtocolError("unexpected Apple auth key length"));
    }
    let prime = wire::read_exact_vec(reader, key_length).await?;
    let server_public = wire::read_exact_vec(reader, key_length).await?;

    let keypair = apple::KeyPair::generate(generator, &prime)?;
    let aes_key = keypair.shared_key(&prime, &server_public)?;
    let credentials = apple::encrypt_credentials(&aes_key, username, password);

    writer.write_all(&credentials).await.map_err(map_write_err)?;
    writer.write_all(&keypair.public).await.map_err(map_write_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types(bytes: &[u8]) -> Vec<SecurityType> {
        bytes.iter().copied().map(SecurityType::from_byte).collect()
    }

    #[test]
    fn picks_vnc_auth_when_password_given() {
        let offered = types(&[1, 2]);
        let creds = Credentials { username: None, password: Some("pw".into()) };
        assert_eq!(select_security_type(&offered, &creds).unwrap(), SecurityType::VncAuthentication);
    }

    #[test]
    fn picks_none_when_no_credentials() {
        let offered = types(&[1, 2]);
        let creds = Credentials::default();
        assert_eq!(select_security_type(&offered, &creds).unwrap(), SecurityType::None);
    }

    #[test]
    fn requires_apple_auth_when_username_given() {
        let offered = types(&[1, 2]);
        let creds = Credentials { username: Some("alice".into()), password: Some("pw".into()) };
        assert!(matches!(select_security_type(&offered, &creds), Err(Error::AuthUnsupported)));
    }

    #[test]
    fn username_selects_apple_auth_when_offered() {
        let offered = types(&[1, 2, 30]);
        let creds = Credentials { username: Some("alice".into()), password: Some("pw".into()) };
        assert_eq!(
            select_security_type(&offered, &creds).unwrap(),
            SecurityType::AppleRemoteDesktop
        );
    }

    #[tokio::test]
    async fn s1_vnc_auth_success() {
        // Server offers {2}, then sends a 16-byte all-zero challenge and a
        // SecurityResult of "succeeded".
        let mut server_to_client: Vec<u8> = Vec::new();
        server_to_client.extend_from_slice(&[0u8; 16]); // challenge
        server_to_client.extend_from_slice(&0u32.to_be_bytes()); // SecurityResult::Succeeded

        let mut reader = std::io::Cursor::new(server_to_client);
        let mut writer = Vec::new();
        let credentials = Credentials { username: None, password: Some("password".into()) };

        authenticate(&mut reader, &mut writer, SecurityType::VncAuthentication, &credentials)
            .await
            .unwrap();

        let expected = des::respond_to_challenge("password", &[0u8; 16]);
        assert_eq!(writer, expected);
    }

    #[tokio::test]
    async fn s2_vnc_auth_failure_carries_reason() {
        let mut server_to_client: Vec<u8> = Vec::new();
        server_to_client.extend_from_slice(&[0u8; 16]);
        server_to_client.extend_from_slice(&1u32.to_be_bytes()); // SecurityResult::Failed
        server_to_client.extend_from_slice(&4u32.to_be_bytes());
        server_to_client.extend_from_slice(b"nope");

        let mut reader = std::io::Cursor::new(server_to_client);
        let mut writer = Vec::new();
        let credentials = Credentials { username: None, password: Some("password".into()) };

        let err = authenticate(&mut reader, &mut writer, SecurityType::VncAuthentication, &credentials)
            .await
            .unwrap_err();
        match err {
            Error::AuthFailed(reason) => assert_eq!(reason, "nope"),
            other => panic!("expected AuthFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn s3_handshake_rejected_with_reason() {
        let mut server_to_client: Vec<u8> = Vec::new();
        server_to_client.push(0); // security count = 0
        server_to_client.extend_from_slice(&7u32.to_be_bytes());
        server_to_client.extend_from_slice(b"blocked");

        let mut reader = std::io::Cursor::new(server_to_client);
        let mut writer = Vec::new();
        let credentials = Credentials::default();

        let err = negotiate_security(&mut reader, &mut writer, &credentials).await.unwrap_err();
        match err {
            Error::HandshakeRejected(reason) => assert_eq!(reason, "blocked"),
            other => panic!("expected HandshakeRejected, got {other:?}"),
        }
    }
}
