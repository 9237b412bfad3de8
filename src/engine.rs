//! 引擎
//!
//! `Engine` 拥有设备、命令队列、命令列表、交换链和场景绘制，按顺序驱动每一帧，
//! 并作为窗口事件的接收方维护键盘状态。同一时刻只能存在一个引擎，
//! 构造时需要传入 `InstanceGuard`。
//!
//! Drop 时先 flush 命令队列，确保 GPU 不再引用任何将被释放的资源。

use tracing::debug;

use crate::core::error::Result;
use crate::core::instance::InstanceGuard;
use crate::core::keyboard::{KeyFlags, Keyboard};
use crate::core::keycodes::Key;
use crate::core::window::WindowEventSink;
use crate::gfx::backend::{GpuDevice, PresentSurface, QueueKind};
use crate::gfx::headless::{HeadlessDevice, HeadlessOptions, HeadlessScenePass, HeadlessSurface};
use crate::renderer::frame::{FrameLoop, FramePass, FrameReport};
use crate::renderer::sync::CommandQueue;
use crate::{engine_error, engine_info, engine_warn};

/// 软件后端上的引擎
pub type HeadlessEngine = Engine<HeadlessDevice, HeadlessSurface, HeadlessScenePass>;

pub struct Engine<D: GpuDevice, S, P> {
    queue: CommandQueue<D>,
    command_list: D::CommandList,
    surface: S,
    pass: P,
    frame_loop: FrameLoop,
    keyboard: Keyboard,
    close_requested: bool,
    device: D,
    _guard: InstanceGuard,
}

impl<D, S, P> Engine<D, S, P>
where
    D: GpuDevice,
    S: PresentSurface<Resource = D::Resource>,
    P: FramePass<D::CommandList, S>,
{
    pub fn from_parts(
        guard: InstanceGuard,
        device: D,
        queue: CommandQueue<D>,
        command_list: D::CommandList,
        surface: S,
        pass: P,
        vsync: bool,
    ) -> Self {
        engine_info!(
            back_buffers = surface.buffer_count(),
            vsync,
            "Engine created"
        );

        Self {
            queue,
            command_list,
            surface,
            pass,
            frame_loop: FrameLoop::new(vsync),
            keyboard: Keyboard::new(),
            close_requested: false,
            device,
            _guard: guard,
        }
    }

    /// 渲染一帧
    pub fn update(&mut self) -> Result<FrameReport> {
        let result = self.frame_loop.run_frame(
            &mut self.queue,
            &mut self.command_list,
            &self.surface,
            &mut self.pass,
        );

        if let Err(e) = &result {
            engine_warn!(
                frame = self.frame_loop.frame_number(),
                device_lost = e.is_device_lost(),
                unflushed = self.frame_loop.has_unflushed_submission(),
                "Frame skipped"
            );
        }
        result
    }
}

impl<D: GpuDevice, S, P> Engine<D, S, P> {
    pub fn keyboard(&self) -> &Keyboard {
        &self.keyboard
    }

    /// 窗口是否请求关闭
    pub fn close_requested(&self) -> bool {
        self.close_requested
    }

    /// 已完成的帧数
    pub fn frame_number(&self) -> u64 {
        self.frame_loop.frame_number()
    }

    pub fn queue(&self) -> &CommandQueue<D> {
        &self.queue
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn pass(&self) -> &P {
        &self.pass
    }

    /// 等待所有已提交的 GPU 工作完成
    pub fn flush(&mut self) -> Result<()> {
        self.queue.flush().map(|_| ())
    }
}

impl HeadlessEngine {
    /// 在软件后端上组装引擎
    pub fn headless(guard: InstanceGuard, options: HeadlessOptions, vsync: bool) -> Result<Self> {
        let device = HeadlessDevice::new(options);
        let queue = CommandQueue::create(&device, QueueKind::Direct)?;
        let command_list = device.create_command_list(QueueKind::Direct)?;
        let surface = device.create_surface();

        Ok(Self::from_parts(
            guard,
            device,
            queue,
            command_list,
            surface,
            HeadlessScenePass::new(),
            vsync,
        ))
    }
}

impl<D: GpuDevice, S, P> WindowEventSink for Engine<D, S, P> {
    fn on_key_down(&mut self, key: Key, flags: KeyFlags) {
        self.keyboard.process_key_event(key, flags);
    }

    fn on_key_up(&mut self, key: Key, flags: KeyFlags) {
        self.keyboard.process_key_event(key, flags);
    }

    fn on_close(&mut self) {
        debug!("Close requested");
        self.close_requested = true;
    }
}

impl<D: GpuDevice, S, P> Drop for Engine<D, S, P> {
    fn drop(&mut self) {
        match self.queue.flush() {
            Ok(value) => engine_info!(fence_value = value.value(), "Engine shut down"),
            Err(e) => engine_error!(error = %e, "Failed to flush command queue during shutdown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::instance::test_lock;
    use crate::core::keyboard::KeyState;
    use crate::gfx::headless::ExecutionMode;

    #[test]
    fn test_headless_engine_renders_frames() {
        let _lock = test_lock();
        let guard = InstanceGuard::acquire().unwrap();
        let mut engine = HeadlessEngine::headless(guard, HeadlessOptions::default(), false).unwrap();

        for expected in 0..3 {
            let report = engine.update().unwrap();
            assert_eq!(report.frame_number, expected);
            assert_eq!(report.back_buffer_index, expected as usize);
        }
        assert_eq!(engine.frame_number(), 3);
        assert_eq!(engine.device().timeline().presents(), 3);
        assert!(engine.device().timeline().last_clear_color().is_some());
    }

    #[test]
    fn test_drop_flushes_and_releases_guard() {
        let _lock = test_lock();
        let guard = InstanceGuard::acquire().unwrap();
        let engine = HeadlessEngine::headless(
            guard,
            HeadlessOptions {
                execution: ExecutionMode::Immediate,
                ..Default::default()
            },
            false,
        )
        .unwrap();

        let mut engine = engine;
        let report = engine.update().unwrap();
        let timeline = engine.device().timeline();

        drop(engine);
        assert!(!InstanceGuard::is_held());
        assert_eq!(timeline.pending(), 0);
        assert_eq!(timeline.submissions(), 1);
        assert_eq!(report.fence_value.value(), 1);
    }

    #[test]
    fn test_engine_tracks_keyboard_and_close() {
        let _lock = test_lock();
        let guard = InstanceGuard::acquire().unwrap();
        let mut engine = HeadlessEngine::headless(guard, HeadlessOptions::default(), false).unwrap();

        engine.on_key_down(Key::CONTROL, KeyFlags::default().with_extended(true));
        assert!(engine.keyboard().is_down(Key::RCONTROL));

        engine.on_key_up(
            Key::CONTROL,
            KeyFlags::default().with_extended(true).with_transition(KeyState::Up),
        );
        assert!(!engine.keyboard().is_down(Key::RCONTROL));

        assert!(!engine.close_requested());
        engine.on_close();
        assert!(engine.close_requested());
    }
}
