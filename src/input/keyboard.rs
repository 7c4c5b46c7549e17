//! Keyboard event surface: `press`, `write`, `hold` (spec §4.7).

use tokio::io::AsyncWrite;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::keysym::{self, CharKey, Keysym};
use crate::protocol::write_key_event;

/// The ordered set of currently-held keysyms (spec §3 `KeyboardState`).
/// Order matters for release: holds must be released in reverse press
/// order, the same discipline any RAII stack unwind gives you for free.
#[derive(Debug, Default)]
pub struct KeyboardState {
    held: Vec<Keysym>,
}

impl KeyboardState {
    pub fn held(&self) -> &[Keysym] {
        &self.held
    }

    pub fn is_held(&self, keysym: Keysym) -> bool {
        self.held.contains(&keysym)
    }
}

/// A scoped press: on drop, releases every keysym it pressed, in reverse
/// order, regardless of how the scope is left (spec §4.7, §8 law 2).
///
/// Async Rust has no async `Drop`, so release is a method the caller must
/// invoke (directly, or via [`Keyboard::hold`] which does so across both
/// the success and error paths of its closure).
pub struct Hold<'a, W> {
    writer: &'a Mutex<W>,
    state: &'a Mutex<KeyboardState>,
    pressed: Vec<Keysym>,
}

impl<'a, W: AsyncWrite + Unpin> Hold<'a, W> {
    async fn release_all(&mut self) -> Result<()> {
        let mut writer = self.writer.lock().await;
        let mut state = self.state.lock().await;
        while let Some(keysym) = self.pressed.pop() {
            write_key_event(&mut *writer, false, keysym.0).await?;
            state.held.retain(|&k| k != keysym);
        }
        Ok(())
    }
}

/// Keyboard operations over a shared write half and keyboard state (spec
/// §4.7). Held by [`crate::session::Session`].
pub struct Keyboard<'a, W> {
    writer: &'a Mutex<W>,
    state: &'a Mutex<KeyboardState>,
}

impl<'a, W: AsyncWrite + Unpin> Keyboard<'a, W> {
    pub fn new(writer: &'a Mutex<W>, state: &'a Mutex<KeyboardState>) -> Keyboard<'a, W> {
        Keyboard { writer, state }
    }

    /// Presses each named key and releases them, in reverse order, once
    /// all have been pressed.
    pub async fn press(&self, names: &[&str]) -> Result<()> {
        let mut hold = self.begin_hold(names).await?;
        hold.release_all().await
    }

    /// Decomposes `text` into keysyms, bracketing characters that need
    /// Shift with a Shift press/release unless Shift is already held
    /// (spec §4.3, §8 law 1, §8 S4).
    pub async fn write(&self, text: &str) -> Result<()> {
        for c in text.chars() {
            let CharKey { keysym, needs_shift } = match keysym::char_key(c) {
                Some(k) => k,
                None => continue,
            };
            let shift_already_held = {
                let state = self.state.lock().await;
                state.is_held(keysym::SHIFT_L) || state.is_held(keysym::SHIFT_R)
            };
            let bracket = needs_shift && !shift_already_held;

            if bracket {
                self.press_one(keysym::SHIFT_L).await?;
            }
            self.press_one(keysym).await?;
            self.release_one(keysym).await?;
            if bracket {
                self.release_one(keysym::SHIFT_L).await?;
            }
        }
        Ok(())
    }

    /// Scoped press: presses every named key, runs `body`, then releases
    /// all of them in reverse order — even if `body` returns an error.
    pub async fn hold<F, Fut, T>(&self, names: &[&str], body: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut hold = self.begin_hold(names).await?;
        let result = body().await;
        hold.release_all().await?;
        result
    }

    async fn begin_hold(&self, names: &[&str]) -> Result<Hold<'_, W>> {
        let mut pressed = Vec::with_capacity(names.len());
        for &name in names {
            let keysym = match keysym::by_name(name) {
                Some(keysym) => keysym,
                None => {
                    let mut hold = Hold { writer: self.writer, state: self.state, pressed };
                    hold.release_all().await?;
                    return Err(crate::error::Error::ProtocolError("unknown key name"));
                }
            };
            if let Err(err) = self.press_one(keysym).await {
                let mut hold = Hold { writer: self.writer, state: self.state, pressed };
                hold.release_all().await?;
                return Err(err);
            }
            pressed.push(keysym);
        }
        Ok(Hold { writer: self.writer, state: self.state, pressed })
    }

    async fn press_one(&self, keysym: Keysym) -> Result<()> {
        let mut writer = self.writer.lock().await;
        write_key_event(&mut *writer, true, keysym.0).await?;
        let mut state = self.state.lock().await;
        state.held.push(keysym);
        Ok(())
    }

    async fn release_one(&self, keysym: Keysym) -> Result<()> {
        let mut writer = self.writer.lock().await;
        write_key_event(&mut *writer, false, keysym.0).await?;
        let mut state = self.state.lock().await;
        state.held.retain(|&k| k != keysym);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn s4_write_hi_bang_emits_expected_sequence() {
        let writer = Mutex::new(Vec::<u8>::new());
        let state = Mutex::new(KeyboardState::default());
        let keyboard = Keyboard::new(&writer, &state);

        keyboard.write("Hi!").await.unwrap();

        let buf = writer.into_inner();
        let mut events = Vec::new();
        let mut i = 0;
        while i < buf.len() {
            assert_eq!(buf[i], 4); // KeyEvent tag
            let down = buf[i + 1] != 0;
            let keysym = u32::from_be_bytes([buf[i + 4], buf[i + 5], buf[i + 6], buf[i + 7]]);
            events.push((down, keysym));
            i += 8;
        }

        let expected = vec![
            (true, keysym::SHIFT_L.0),
            (true, 'h' as u32),
            (false, 'h' as u32),
            (false, keysym::SHIFT_L.0),
            (true, 'i' as u32),
            (false, 'i' as u32),
            (true, keysym::SHIFT_L.0),
            (true, '1' as u32),
            (false, '1' as u32),
            (false, keysym::SHIFT_L.0),
        ];
        assert_eq!(events, expected);
        assert!(state.into_inner().held.is_empty());
    }

    #[tokio::test]
    async fn hold_releases_on_error_path() {
        let writer = Mutex::new(Vec::<u8>::new());
        let state = Mutex::new(KeyboardState::default());
        let keyboard = Keyboard::new(&writer, &state);

        let result: Result<()> = keyboard
            .hold(&["ctrl"], || async { Err(crate::error::Error::ProtocolError("boom")) })
            .await;

        assert!(result.is_err());
        assert!(state.into_inner().held.is_empty());
    }

    #[tokio::test]
    async fn write_does_not_double_bracket_when_shift_already_held() {
        let writer = Mutex::new(Vec::<u8>::new());
        let state = Mutex::new(KeyboardState::default());
        let keyboard = Keyboard::new(&writer, &state);

        keyboard
            .hold(&["shift"], || async {
                keyboard.write("H").await
            })
            .await
            .unwrap();

        let buf = writer.into_inner();
        // press Shift, press 'h', release 'h', release Shift — no nested Shift pair.
        assert_eq!(buf.len(), 4 * 8);
    }
}
