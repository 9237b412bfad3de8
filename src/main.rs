//! mksv - 旋转三角形
//!
//! ```bash
//! # DirectX 12（默认，仅 Windows）
//! cargo run
//!
//! # 软件后端，渲染 10 帧后退出
//! cargo run -- --headless --frames 10
//! ```
//!
//! # 退出码
//!
//! - `0`：正常退出
//! - `-1`：引擎创建失败
//! - `-2`：窗口创建失败
//! - `-3`：顶点数据上传失败
//! - `-4`：配置无效

use anyhow::Context;
use tracing::info;

use mksv::app_error;
use mksv::core::config::GraphicsBackend;
use mksv::core::{log, Config, InstanceGuard};
use mksv::gfx::headless::HeadlessOptions;
use mksv::HeadlessEngine;

const EXIT_SUCCESS: i32 = 0;
const EXIT_ENGINE_CREATION: i32 = -1;
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
const EXIT_WINDOW_CREATION: i32 = -2;
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
const EXIT_DATA_UPLOAD: i32 = -3;
const EXIT_INVALID_CONFIG: i32 = -4;

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    let mut config = Config::from_file_or_default("config.toml");
    config.apply_args(std::env::args().skip(1));

    if let Err(e) = log::init_logger(
        config.logging.level,
        config.logging.file_output,
        Some(config.logging.log_file.as_str()),
    ) {
        eprintln!("{}", e);
    }

    if let Err(e) = config.validate() {
        app_error!(error = %e, "Invalid configuration");
        return EXIT_INVALID_CONFIG;
    }

    info!(
        backend = config.graphics.backend.name(),
        width = config.window.width,
        height = config.window.height,
        vsync = config.graphics.vsync,
        "Starting mksv"
    );

    match config.graphics.backend {
        GraphicsBackend::Headless => run_headless(&config),
        GraphicsBackend::Dx12 => run_dx12(&config),
    }
}

fn create_headless_engine(config: &Config) -> anyhow::Result<HeadlessEngine> {
    let guard = InstanceGuard::acquire().context("Failed to acquire engine instance")?;
    HeadlessEngine::headless(guard, HeadlessOptions::default(), config.graphics.vsync)
        .context("Failed to create headless engine")
}

fn run_headless(config: &Config) -> i32 {
    let mut engine = match create_headless_engine(config) {
        Ok(engine) => engine,
        Err(e) => {
            app_error!(error = %format!("{:#}", e), "Error creating the engine instance");
            return EXIT_ENGINE_CREATION;
        }
    };

    for _ in 0..config.graphics.headless_frames {
        match engine.update() {
            Ok(report) => info!(
                frame = report.frame_number,
                back_buffer = report.back_buffer_index,
                fence_value = report.fence_value.value(),
                "Frame rendered"
            ),
            Err(e) => {
                app_error!(error = %e, "Frame failed");
                if e.is_device_lost() {
                    break;
                }
            }
        }
    }

    info!(frames = engine.frame_number(), "Headless run finished");
    EXIT_SUCCESS
}

#[cfg(target_os = "windows")]
fn run_dx12(config: &Config) -> i32 {
    use std::sync::mpsc;

    use mksv::core::window::{self, WindowMessage};
    use mksv::gfx::dx12::Dx12Setup;
    use winit::event::{Event, WindowEvent};
    use winit::event_loop::ControlFlow;

    let (sender, receiver) = mpsc::channel();

    let created = window::create_event_loop(sender).and_then(|event_loop| {
        let window = window::create_window(&event_loop, config)?;
        Ok((event_loop, window))
    });
    let (event_loop, window) = match created.context("Failed to create window") {
        Ok(created) => created,
        Err(e) => {
            app_error!(error = %format!("{:#}", e), "Error creating the window");
            return EXIT_WINDOW_CREATION;
        }
    };

    let setup = InstanceGuard::acquire()
        .context("Failed to acquire engine instance")
        .and_then(|guard| {
            let setup = Dx12Setup::create(&window, config).context("Failed to initialize DirectX 12")?;
            Ok((guard, setup))
        });
    let (guard, setup) = match setup {
        Ok(setup) => setup,
        Err(e) => {
            app_error!(error = %format!("{:#}", e), "Error creating the engine instance");
            return EXIT_ENGINE_CREATION;
        }
    };

    let mut engine = match setup.upload(guard, config.graphics.vsync) {
        Ok(engine) => engine,
        Err(e) => {
            app_error!(error = %e, "Failed to upload data to GPU");
            return EXIT_DATA_UPLOAD;
        }
    };

    let result = event_loop.run(|event, elwt| {
        elwt.set_control_flow(ControlFlow::Poll);

        match event {
            Event::WindowEvent {
                event: WindowEvent::CloseRequested,
                ..
            } => WindowMessage::Close.dispatch(&mut engine),
            Event::AboutToWait => {
                window::drain_messages(&receiver, &mut engine);
                if engine.close_requested() {
                    elwt.exit();
                    return;
                }

                if let Err(e) = engine.update() {
                    app_error!(error = %e, "Frame failed");
                    if e.is_device_lost() {
                        elwt.exit();
                    }
                }
            }
            _ => {}
        }
    });

    info!(frames = engine.frame_number(), "Event loop finished");
    drop(engine);
    drop(window);

    match result {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            app_error!(error = %e, "Event loop error");
            EXIT_ENGINE_CREATION
        }
    }
}

#[cfg(not(target_os = "windows"))]
fn run_dx12(_config: &Config) -> i32 {
    app_error!("DX12 backend is only available on Windows");
    EXIT_ENGINE_CREATION
}
