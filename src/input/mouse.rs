//! Mouse/pointer event surface: `move`, clicks, scroll, `hold` (spec §4.7).

use tokio::io::AsyncWrite;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::protocol::write_pointer_event;

pub const LEFT: u8 = 1;
pub const MIDDLE: u8 = 2;
pub const RIGHT: u8 = 4;
pub const SCROLL_UP: u8 = 8;
pub const SCROLL_DOWN: u8 = 16;

/// Current pointer position and button-mask (spec §3 `MouseState`).
#[derive(Debug, Clone, Copy, Default)]
pub struct MouseState {
    pub x: u16,
    pub y: u16,
    pub button_mask: u8,
}

/// Mouse operations over a shared write half and mouse state (spec §4.7).
pub struct Mouse<'a, W> {
    writer: &'a Mutex<W>,
    state: &'a Mutex<MouseState>,
}

impl<'a, W: AsyncWrite + Unpin> Mouse<'a, W> {
    pub fn new(writer: &'a Mutex<W>, state: &'a Mutex<MouseState>) -> Mouse<'a, W> {
        Mouse { writer, state }
    }

    /// Moves to `(x, y)`, keeping the current button mask.
    pub async fn move_to(&self, x: u16, y: u16) -> Result<()> {
        let mask = self.state.lock().await.button_mask;
        self.send(mask, x, y).await?;
        let mut state = self.state.lock().await;
        state.x = x;
        state.y = y;
        Ok(())
    }

    /// Presses then releases `button` at the current position.
    pub async fn click(&self, button: u8) -> Result<()> {
        self.press(button).await?;
        self.release(button).await
    }

    pub async fn middle_click(&self) -> Result<()> {
        self.click(MIDDLE).await
    }

    pub async fn right_click(&self) -> Result<()> {
        self.click(RIGHT).await
    }

    pub async fn scroll_up(&self) -> Result<()> {
        self.click(SCROLL_UP).await
    }

    pub async fn scroll_down(&self) -> Result<()> {
        self.click(SCROLL_DOWN).await
    }

    /// Scoped button mask update: sets `buttons` in the mask, runs `body`,
    /// then clears them — even if `body` returns an error (spec §8 law 2).
    pub async fn hold<F, Fut, T>(&self, buttons: u8, body: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        self.press(buttons).await?;
        let result = body().await;
        self.release(buttons).await?;
        result
    }

    async fn press(&self, buttons: u8) -> Result<()> {
        let (mask, x, y) = {
            let state = self.state.lock().await;
            (state.button_mask | buttons, state.x, state.y)
        };
        self.send(mask, x, y).await?;
        self.state.lock().await.button_mask = mask;
        Ok(())
    }

    async fn release(&self, buttons: u8) -> Result<()> {
        let (mask, x, y) = {
            let state = self.state.lock().await;
            (state.button_mask & !buttons, state.x, state.y)
        };
        self.send(mask, x, y).await?;
        self.state.lock().await.button_mask = mask;
        Ok(())
    }

    async fn send(&self, mask: u8, x: u16, y: u16) -> Result<()> {
        let mut writer = self.writer.lock().await;
        write_pointer_event(&mut *writer, mask, x, y).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_events(buf: &[u8]) -> Vec<(u8, u16, u16)> {
        buf.chunks_exact(6).map(|c| (c[1], u16::from_be_bytes([c[2], c[3]]), u16::from_be_bytes([c[4], c[5]]))).collect()
    }

    #[tokio::test]
    async fn click_presses_then_releases() {
        let writer = Mutex::new(Vec::<u8>::new());
        let state = Mutex::new(MouseState::default());
        let mouse = Mouse::new(&writer, &state);

        mouse.click(LEFT).await.unwrap();

        let buf = writer.into_inner();
        let events = parse_events(&buf);
        assert_eq!(events, vec![(LEFT, 0, 0), (0, 0, 0)]);
        assert_eq!(state.into_inner().button_mask, 0);
    }

    #[tokio::test]
    async fn hold_clears_mask_on_error() {
        let writer = Mutex::new(Vec::<u8>::new());
        let state = Mutex::new(MouseState::default());
        let mouse = Mouse::new(&writer, &state);

        let result: Result<()> = mouse
            .hold(RIGHT, || async { Err(crate::error::Error::ProtocolError("boom")) })
            .await;

        assert!(result.is_err());
        assert_eq!(state.into_inner().button_mask, 0);
    }

    #[tokio::test]
    async fn move_preserves_held_buttons() {
        let writer = Mutex::new(Vec::<u8>::new());
        let state = Mutex::new(MouseState::default());
        let mouse = Mouse::new(&writer, &state);

        mouse
            .hold(LEFT, || async {
                mouse.move_to(10, 20).await
            })
            .await
            .unwrap();

        let buf = writer.into_inner();
        let events = parse_events(&buf);
        assert_eq!(events, vec![(LEFT, 0, 0), (LEFT, 10, 20), (0, 10, 20)]);
    }
}
