//! DirectX 12 场景绘制和引擎组装

use std::ffi::c_void;

use windows::Win32::Foundation::RECT;
use windows::Win32::Graphics::Direct3D::D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST;
use windows::Win32::Graphics::Direct3D12::D3D12_VIEWPORT;
use winit::window::Window;

use super::context::Dx12Context;
use super::pipeline::{upload_vertex_buffer, TrianglePipeline, VertexBuffer, TRANSFORM_CONSTANTS};
use super::queue::Dx12CommandList;
use super::swapchain::Dx12SwapChain;
use crate::core::config::Config;
use crate::core::error::Result;
use crate::core::instance::InstanceGuard;
use crate::engine::Engine;
use crate::gfx::backend::{GpuDevice, QueueKind};
use crate::renderer::frame::{FrameContext, FramePass};
use crate::renderer::scene::SceneClock;
use crate::renderer::shaders::ShaderBlobs;
use crate::renderer::sync::CommandQueue;
use crate::renderer::vertex::TRIANGLE;

pub type Dx12Engine = Engine<Dx12Context, Dx12SwapChain, TrianglePass>;

/// 清屏并绘制旋转的三角形
pub struct TrianglePass {
    pipeline: TrianglePipeline,
    vertex_buffer: VertexBuffer,
    viewport: D3D12_VIEWPORT,
    scissor: RECT,
    clock: SceneClock,
}

impl TrianglePass {
    pub fn new(pipeline: TrianglePipeline, vertex_buffer: VertexBuffer, width: u32, height: u32) -> Self {
        Self {
            pipeline,
            vertex_buffer,
            viewport: D3D12_VIEWPORT {
                TopLeftX: 0.0,
                TopLeftY: 0.0,
                Width: width as f32,
                Height: height as f32,
                MinDepth: 0.0,
                MaxDepth: 1.0,
            },
            scissor: RECT {
                left: 0,
                top: 0,
                right: width as i32,
                bottom: height as i32,
            },
            clock: SceneClock::new(),
        }
    }
}

impl FramePass<Dx12CommandList, Dx12SwapChain> for TrianglePass {
    fn record(&mut self, list: &mut Dx12CommandList, surface: &Dx12SwapChain, frame: &FrameContext) -> Result<()> {
        self.clock.advance(frame.delta_seconds);

        let rtv = surface.rtv_handle(frame.back_buffer_index);
        let clear_color = self.clock.clear_color();
        let constants = self.clock.transform_constants();
        let raw = list.raw();

        unsafe {
            raw.ClearRenderTargetView(rtv, &clear_color, None);

            raw.SetGraphicsRootSignature(&self.pipeline.root_signature);
            raw.SetPipelineState(&self.pipeline.pipeline_state);
            raw.RSSetViewports(&[self.viewport]);
            raw.RSSetScissorRects(&[self.scissor]);
            raw.OMSetRenderTargets(1, Some(&rtv), false, None);

            raw.IASetPrimitiveTopology(D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST);
            raw.IASetVertexBuffers(0, Some(&[self.vertex_buffer.view]));
            raw.SetGraphicsRoot32BitConstants(0, TRANSFORM_CONSTANTS, constants.as_ptr() as *const c_void, 0);
            raw.DrawInstanced(self.vertex_buffer.vertex_count, 1, 0, 0);
        }
        Ok(())
    }
}

/// 设备、队列、交换链和管线已创建，顶点数据尚未上传
pub struct Dx12Setup {
    context: Dx12Context,
    queue: CommandQueue<Dx12Context>,
    command_list: Dx12CommandList,
    swap_chain: Dx12SwapChain,
    pipeline: TrianglePipeline,
}

impl Dx12Setup {
    pub fn create(window: &Window, config: &Config) -> Result<Self> {
        let context = Dx12Context::new(config.graphics.debug_layer)?;
        let queue = CommandQueue::create(&context, QueueKind::Direct)?;
        let command_list = context.create_command_list(QueueKind::Direct)?;
        let swap_chain = Dx12SwapChain::new(&context, queue.queue(), window)?;

        let shaders = ShaderBlobs::load(&config.graphics.shader_dir)?;
        let pipeline = TrianglePipeline::new(&context, &shaders)?;

        Ok(Self {
            context,
            queue,
            command_list,
            swap_chain,
            pipeline,
        })
    }

    /// 上传三角形顶点并组装引擎
    pub fn upload(mut self, guard: InstanceGuard, vsync: bool) -> Result<Dx12Engine> {
        let vertex_buffer =
            upload_vertex_buffer(&self.context, &mut self.queue, &mut self.command_list, &TRIANGLE)?;

        let pass = TrianglePass::new(
            self.pipeline,
            vertex_buffer,
            self.swap_chain.width(),
            self.swap_chain.height(),
        );

        Ok(Engine::from_parts(
            guard,
            self.context,
            self.queue,
            self.command_list,
            self.swap_chain,
            pass,
            vsync,
        ))
    }
}
