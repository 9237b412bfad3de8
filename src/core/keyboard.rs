//! 键盘状态
//!
//! 把原始的按键按下/抬起通知（虚拟键码 + lParam 标志位）归约为一张 256 项的
//! 按下/抬起状态表。Shift/Ctrl/Alt 会根据扩展键标志额外更新左/右变体。

use tracing::trace;

use super::keycodes::Key;

/// 按键状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyState {
    Down,
    #[default]
    Up,
}

/// 键盘消息的 lParam 标志位
///
/// | 位     | 含义                     |
/// |--------|--------------------------|
/// | 0-15   | 重复次数                 |
/// | 16-23  | 扫描码                   |
/// | 24     | 扩展键                   |
/// | 29     | 上下文码（Alt 按下）     |
/// | 30     | 之前的状态（1 = 按下）   |
/// | 31     | 转换状态（1 = 正在抬起） |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyFlags(u32);

impl KeyFlags {
    const EXTENDED: u32 = 1 << 24;
    const CONTEXT: u32 = 1 << 29;
    const PREVIOUS_DOWN: u32 = 1 << 30;
    const TRANSITION: u32 = 1 << 31;

    /// 从原始 lParam 解析（仅低 32 位有意义）
    pub fn from_lparam(l_param: isize) -> Self {
        Self(l_param as u32)
    }

    /// 原始位
    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn repeat_count(&self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    pub fn scan_code(&self) -> u8 {
        ((self.0 >> 16) & 0xFF) as u8
    }

    /// 右侧 Shift/Ctrl/Alt 等扩展键
    pub fn is_extended(&self) -> bool {
        self.0 & Self::EXTENDED != 0
    }

    pub fn context_code(&self) -> bool {
        self.0 & Self::CONTEXT != 0
    }

    pub fn was_down(&self) -> bool {
        self.0 & Self::PREVIOUS_DOWN != 0
    }

    /// 转换状态对应的按键状态
    pub fn transition_state(&self) -> KeyState {
        if self.0 & Self::TRANSITION != 0 {
            KeyState::Up
        } else {
            KeyState::Down
        }
    }

    pub fn with_extended(self, extended: bool) -> Self {
        self.set(Self::EXTENDED, extended)
    }

    pub fn with_transition(self, state: KeyState) -> Self {
        let up = state == KeyState::Up;
        self.set(Self::TRANSITION, up).set(Self::PREVIOUS_DOWN, up)
    }

    fn set(self, mask: u32, on: bool) -> Self {
        if on {
            Self(self.0 | mask)
        } else {
            Self(self.0 & !mask)
        }
    }
}

/// 256 项按键状态表
#[derive(Debug, Clone)]
pub struct Keyboard {
    key_states: [KeyState; 256],
}

impl Default for Keyboard {
    fn default() -> Self {
        Self::new()
    }
}

impl Keyboard {
    pub fn new() -> Self {
        Self {
            key_states: [KeyState::Up; 256],
        }
    }

    pub fn update_key(&mut self, key: Key, state: KeyState) {
        self.key_states[key.index()] = state;
    }

    pub fn state(&self, key: Key) -> KeyState {
        self.key_states[key.index()]
    }

    pub fn is_down(&self, key: Key) -> bool {
        self.state(key) == KeyState::Down
    }

    /// 处理一条按键消息
    ///
    /// 状态由转换位决定。泛型修饰键（Shift/Ctrl/Alt）同时更新由扩展键位
    /// 区分出的左/右变体。
    pub fn process_key_event(&mut self, key: Key, flags: KeyFlags) {
        let state = flags.transition_state();

        let side = match key {
            Key::SHIFT => Some(if flags.is_extended() { Key::RSHIFT } else { Key::LSHIFT }),
            Key::CONTROL => Some(if flags.is_extended() { Key::RCONTROL } else { Key::LCONTROL }),
            Key::ALT => Some(if flags.is_extended() { Key::RALT } else { Key::LALT }),
            _ => None,
        };

        if let Some(side) = side {
            self.update_key(side, state);
        }

        self.update_key(key, state);

        trace!(key = %key, ?state, repeat = flags.repeat_count(), "Key event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_start_up() {
        let keyboard = Keyboard::new();
        assert!((0..=255u8).all(|code| !keyboard.is_down(Key(code))));
    }

    #[test]
    fn test_key_down_then_up() {
        let mut keyboard = Keyboard::new();
        let down = KeyFlags::default().with_transition(KeyState::Down);
        let up = KeyFlags::default().with_transition(KeyState::Up);

        keyboard.process_key_event(Key::W, down);
        assert!(keyboard.is_down(Key::W));

        keyboard.process_key_event(Key::W, up);
        assert!(!keyboard.is_down(Key::W));
    }

    #[test]
    fn test_modifiers_split_by_extended_bit() {
        let mut keyboard = Keyboard::new();
        let down = KeyFlags::default().with_transition(KeyState::Down);

        keyboard.process_key_event(Key::CONTROL, down.with_extended(true));
        assert!(keyboard.is_down(Key::CONTROL));
        assert!(keyboard.is_down(Key::RCONTROL));
        assert!(!keyboard.is_down(Key::LCONTROL));

        keyboard.process_key_event(Key::SHIFT, down);
        assert!(keyboard.is_down(Key::LSHIFT));
        assert!(!keyboard.is_down(Key::RSHIFT));

        keyboard.process_key_event(Key::ALT, down.with_extended(true));
        assert!(keyboard.is_down(Key::RALT));
        assert!(!keyboard.is_down(Key::LALT));

        let up = KeyFlags::default().with_transition(KeyState::Up).with_extended(true);
        keyboard.process_key_event(Key::CONTROL, up);
        assert!(!keyboard.is_down(Key::CONTROL));
        assert!(!keyboard.is_down(Key::RCONTROL));
    }

    #[test]
    fn test_non_modifier_does_not_touch_sides() {
        let mut keyboard = Keyboard::new();
        let down = KeyFlags::default().with_extended(true);

        keyboard.process_key_event(Key::RIGHT, down);
        assert!(keyboard.is_down(Key::RIGHT));
        assert!(!keyboard.is_down(Key::RSHIFT));
        assert!(!keyboard.is_down(Key::RCONTROL));
        assert!(!keyboard.is_down(Key::RALT));
    }

    #[test]
    fn test_lparam_decoding() {
        // WM_KEYUP for right Ctrl: repeat 1, scan code 0x1D, extended, previous down, transition
        let raw: u32 = 1 | (0x1D << 16) | (1 << 24) | (1 << 30) | (1 << 31);
        let flags = KeyFlags::from_lparam(raw as i32 as isize);

        assert_eq!(flags.repeat_count(), 1);
        assert_eq!(flags.scan_code(), 0x1D);
        assert!(flags.is_extended());
        assert!(!flags.context_code());
        assert!(flags.was_down());
        assert_eq!(flags.transition_state(), KeyState::Up);
        assert_eq!(flags.bits(), raw);
    }
}
