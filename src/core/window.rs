//! 窗口与消息转发
//!
//! 窗口由 winit 创建和驱动。键盘消息需要原始的 lParam 标志位（扩展键、转换状态），
//! winit 的键盘事件不携带这些信息，因此在 Windows 上通过 winit 的消息钩子
//! 截获 `WM_KEYDOWN` / `WM_KEYUP` / `WM_SYSKEYDOWN` / `WM_SYSKEYUP`，
//! 解码成 `WindowMessage` 发送到一个 channel，由窗口的所有者（`Engine`）
//! 通过 `WindowEventSink` 处理。

use std::sync::mpsc::{Receiver, Sender};

use tracing::{debug, trace};
use winit::dpi::LogicalSize;
use winit::event_loop::EventLoop;
use winit::window::{Window, WindowBuilder};

use super::config::Config;
use super::error::{EngineError, Result};
use super::keyboard::KeyFlags;
use super::keycodes::Key;

const WM_KEYDOWN: u32 = 0x0100;
const WM_KEYUP: u32 = 0x0101;
const WM_SYSKEYDOWN: u32 = 0x0104;
const WM_SYSKEYUP: u32 = 0x0105;

/// 窗口事件的接收方
pub trait WindowEventSink {
    fn on_key_down(&mut self, key: Key, flags: KeyFlags);
    fn on_key_up(&mut self, key: Key, flags: KeyFlags);
    fn on_close(&mut self);
}

/// 转发给窗口所有者的消息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowMessage {
    KeyDown { key: Key, flags: KeyFlags },
    KeyUp { key: Key, flags: KeyFlags },
    Close,
}

impl WindowMessage {
    /// 解码原始窗口消息，非键盘消息返回 `None`
    pub fn from_raw(message: u32, w_param: usize, l_param: isize) -> Option<Self> {
        let key = Key((w_param & 0xFF) as u8);
        let flags = KeyFlags::from_lparam(l_param);

        match message {
            WM_KEYDOWN | WM_SYSKEYDOWN => Some(WindowMessage::KeyDown { key, flags }),
            WM_KEYUP | WM_SYSKEYUP => Some(WindowMessage::KeyUp { key, flags }),
            _ => None,
        }
    }

    pub fn dispatch<S: WindowEventSink + ?Sized>(self, sink: &mut S) {
        match self {
            WindowMessage::KeyDown { key, flags } => sink.on_key_down(key, flags),
            WindowMessage::KeyUp { key, flags } => sink.on_key_up(key, flags),
            WindowMessage::Close => sink.on_close(),
        }
    }
}

/// 把 channel 中积压的消息全部分发给 `sink`，返回处理的数量
pub fn drain_messages<S: WindowEventSink + ?Sized>(receiver: &Receiver<WindowMessage>, sink: &mut S) -> usize {
    let mut count = 0;
    for message in receiver.try_iter() {
        trace!(?message, "Dispatching window message");
        message.dispatch(sink);
        count += 1;
    }
    count
}

/// 创建事件循环，并在 Windows 上安装键盘消息钩子
pub fn create_event_loop(sender: Sender<WindowMessage>) -> Result<EventLoop<()>> {
    #[cfg_attr(not(target_os = "windows"), allow(unused_mut))]
    let mut builder = winit::event_loop::EventLoopBuilder::<()>::new();

    #[cfg(target_os = "windows")]
    {
        use winit::platform::windows::EventLoopBuilderExtWindows;
        use windows::Win32::UI::WindowsAndMessaging::MSG;

        builder.with_msg_hook(move |raw| {
            // SAFETY: winit 传入的是指向当前 MSG 的有效指针
            let msg = unsafe { &*(raw as *const MSG) };
            if let Some(message) = WindowMessage::from_raw(msg.message, msg.wParam.0, msg.lParam.0) {
                // 接收方已经销毁时丢弃消息
                let _ = sender.send(message);
            }
            false
        });
    }

    #[cfg(not(target_os = "windows"))]
    drop(sender);

    builder
        .build()
        .map_err(|e| EngineError::Window(format!("Failed to create event loop: {}", e)))
}

/// 按配置创建窗口
pub fn create_window(event_loop: &EventLoop<()>, config: &Config) -> Result<Window> {
    let width = config.window.width;
    let height = config.window.height;

    let window = WindowBuilder::new()
        .with_title(format!("{} [{}]", config.window.title, config.graphics.backend.name()))
        .with_inner_size(LogicalSize::new(width, height))
        .build(event_loop)
        .map_err(|e| EngineError::Window(format!("Failed to create window: {}", e)))?;

    debug!(width, height, "Window created");
    Ok(window)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::keyboard::{KeyState, Keyboard};
    use std::sync::mpsc;

    #[derive(Default)]
    struct Recorder {
        keyboard: Keyboard,
        closed: bool,
    }

    impl WindowEventSink for Recorder {
        fn on_key_down(&mut self, key: Key, flags: KeyFlags) {
            self.keyboard.process_key_event(key, flags);
        }

        fn on_key_up(&mut self, key: Key, flags: KeyFlags) {
            self.keyboard.process_key_event(key, flags);
        }

        fn on_close(&mut self) {
            self.closed = true;
        }
    }

    #[test]
    fn test_decode_key_messages() {
        let up_flags = KeyFlags::default().with_transition(KeyState::Up);

        assert_eq!(
            WindowMessage::from_raw(WM_KEYDOWN, Key::A.0 as usize, 1),
            Some(WindowMessage::KeyDown {
                key: Key::A,
                flags: KeyFlags::from_lparam(1),
            })
        );
        assert_eq!(
            WindowMessage::from_raw(WM_SYSKEYUP, Key::ALT.0 as usize, up_flags.bits() as i32 as isize),
            Some(WindowMessage::KeyUp {
                key: Key::ALT,
                flags: up_flags,
            })
        );
        // WM_CHAR
        assert_eq!(WindowMessage::from_raw(0x0102, 0x41, 0), None);
    }

    #[test]
    fn test_drain_dispatches_in_order() {
        let (sender, receiver) = mpsc::channel();
        let mut sink = Recorder::default();
        let extended_down = KeyFlags::default().with_extended(true);

        sender
            .send(WindowMessage::KeyDown {
                key: Key::SHIFT,
                flags: extended_down,
            })
            .unwrap();
        sender.send(WindowMessage::Close).unwrap();

        assert_eq!(drain_messages(&receiver, &mut sink), 2);
        assert!(sink.keyboard.is_down(Key::RSHIFT));
        assert!(sink.closed);
        assert_eq!(drain_messages(&receiver, &mut sink), 0);
    }
}
