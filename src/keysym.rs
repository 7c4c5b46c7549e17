//! X11 keysym lookup table and text decomposition (spec §4.3).
//!
//! Keysym values below `0x100` coincide with Latin-1 code points, which is
//! why ASCII characters map directly onto their own code point (the same
//! correspondence `signal-slot-kmsvnc`'s `keysym_to_linux_key` walks in
//! reverse, from keysym back to a Linux key code).

/// A symbolic, named key that isn't a printable character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keysym(pub u32);

pub const SHIFT_L: Keysym = Keysym(0xffe1);
pub const SHIFT_R: Keysym = Keysym(0xffe2);
pub const CONTROL_L: Keysym = Keysym(0xffe3);
pub const CONTROL_R: Keysym = Keysym(0xffe4);
pub const ALT_L: Keysym = Keysym(0xffe9);
pub const ALT_R: Keysym = Keysym(0xffea);
pub const SUPER_L: Keysym = Keysym(0xffeb);
pub const SUPER_R: Keysym = Keysym(0xffec);

pub const BACKSPACE: Keysym = Keysym(0xff08);
pub const TAB: Keysym = Keysym(0xff09);
pub const RETURN: Keysym = Keysym(0xff0d);
pub const ESCAPE: Keysym = Keysym(0xff1b);
pub const DELETE: Keysym = Keysym(0xffff);
pub const INSERT: Keysym = Keysym(0xff63);
pub const HOME: Keysym = Keysym(0xff50);
pub const END: Keysym = Keysym(0xff57);
pub const PAGE_UP: Keysym = Keysym(0xff55);
pub const PAGE_DOWN: Keysym = Keysym(0xff56);
pub const LEFT: Keysym = Keysym(0xff51);
pub const UP: Keysym = Keysym(0xff52);
pub const RIGHT: Keysym = Keysym(0xff53);
pub const DOWN: Keysym = Keysym(0xff54);
pub const CAPS_LOCK: Keysym = Keysym(0xffe5);

/// Looks up a keysym by symbolic name, case-insensitively (`"Ctrl"`,
/// `"shift"`, `"Return"`, `"F1"`.."F12", `"Left"`, `"Right"`, ...).
pub fn by_name(name: &str) -> Option<Keysym> {
    let lower = name.to_ascii_lowercase();
    if let Some(rest) = lower.strip_prefix('f') {
        if let Ok(n @ 1..=35) = rest.parse::<u32>() {
            return Some(Keysym(0xffbe + (n - 1)));
        }
    }
    Some(match lower.as_str() {
        "shift" | "shift_l" => SHIFT_L,
        "shift_r" => SHIFT_R,
        "ctrl" | "control" | "control_l" => CONTROL_L,
        "control_r" => CONTROL_R,
        "alt" | "alt_l" => ALT_L,
        "alt_r" => ALT_R,
        "super" | "super_l" | "win" | "cmd" | "meta" | "meta_l" => SUPER_L,
        "super_r" | "meta_r" => SUPER_R,
        "backspace" => BACKSPACE,
        "tab" => TAB,
        "return" | "enter" => RETURN,
        "escape" | "esc" => ESCAPE,
        "delete" | "del" => DELETE,
        "insert" | "ins" => INSERT,
        "home" => HOME,
        "end" => END,
        "pageup" | "page_up" | "prior" => PAGE_UP,
        "pagedown" | "page_down" | "next" => PAGE_DOWN,
        "left" => LEFT,
        "up" => UP,
        "right" => RIGHT,
        "down" => DOWN,
        "capslock" | "caps_lock" => CAPS_LOCK,
        "space" => Keysym(0x0020),
        _ => return char_keysym(lower.chars().next().filter(|_| lower.chars().count() == 1)?),
    })
}

/// One step of `write(text)`'s decomposition: the keysym to press, and
/// whether it requires bracketing with Shift first (spec §4.3, §8 law 1).
pub struct CharKey {
    pub keysym: Keysym,
    pub needs_shift: bool,
}

/// Decomposes a single character into the keysym that produces it and
/// whether Shift must be held down first, on a US keyboard layout.
pub fn char_key(c: char) -> Option<CharKey> {
    let needs_shift = c.is_ascii_uppercase() || SHIFTED_SYMBOLS.iter().any(|&(s, _)| s == c);
    let base = if c.is_ascii_uppercase() {
        c.to_ascii_lowercase()
    } else if let Some(&(_, unshifted)) = SHIFTED_SYMBOLS.iter().find(|&&(s, _)| s == c) {
        unshifted
    } else {
        c
    };
    char_keysym(Some(base)).map(|keysym| CharKey { keysym, needs_shift })
}

/// Unshifted-character keysym: for code points in the Latin-1 range, the
/// keysym *is* the code point (RFB/X11 invariant); nothing else is mapped.
fn char_keysym(c: Option<char>) -> Option<Keysym> {
    let c = c?;
    if (c as u32) < 0x100 {
        Some(Keysym(c as u32))
    } else {
        None
    }
}

/// US-layout shifted symbol -> unshifted base key it shares a keycap with.
const SHIFTED_SYMBOLS: &[(char, char)] = &[
    ('!', '1'), ('@', '2'), ('#', '3'), ('$', '4'), ('%', '5'),
    ('^', '6'), ('&', '7'), ('*', '8'), ('(', '9'), (')', '0'),
    ('_', '-'), ('+', '='), ('{', '['), ('}', ']'), ('|', '\\'),
    (':', ';'), ('"', '\''), ('~', '`'), ('<', ','), ('>', '.'),
    ('?', '/'),
];
