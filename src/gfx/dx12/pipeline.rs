//! 根签名、管线状态和顶点缓冲区上传

use std::ffi::c_void;
use std::mem;

use tracing::{debug, info};
use windows::core::s;
use windows::Win32::Graphics::Direct3D::*;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;

use super::context::Dx12Context;
use super::helpers::{blob_message, buffer_resource_desc, call_failed, heap_properties, status};
use super::queue::Dx12CommandList;
use super::swapchain::BACK_BUFFER_FORMAT;
use crate::core::error::{GraphicsError, Result, StatusCode};
use crate::gfx::backend::{GpuCommandList, ResourceState};
use crate::renderer::shaders::ShaderBlobs;
use crate::renderer::sync::CommandQueue;
use crate::renderer::vertex::Vertex;

/// 模型矩阵占用的根常量数量
pub const TRANSFORM_CONSTANTS: u32 = 16;

/// 三角形管线
pub struct TrianglePipeline {
    pub root_signature: ID3D12RootSignature,
    pub pipeline_state: ID3D12PipelineState,
}

impl TrianglePipeline {
    pub fn new(context: &Dx12Context, shaders: &ShaderBlobs) -> Result<Self> {
        let root_signature = create_root_signature(context.device())?;
        let pipeline_state = create_pipeline_state(context.device(), &root_signature, shaders)?;
        debug!("Triangle pipeline created");

        Ok(Self {
            root_signature,
            pipeline_state,
        })
    }
}

/// 一个 b0 上的 16 个 32 位根常量，仅顶点着色器可见
fn create_root_signature(device: &ID3D12Device) -> Result<ID3D12RootSignature> {
    let parameters = [D3D12_ROOT_PARAMETER {
        ParameterType: D3D12_ROOT_PARAMETER_TYPE_32BIT_CONSTANTS,
        Anonymous: D3D12_ROOT_PARAMETER_0 {
            Constants: D3D12_ROOT_CONSTANTS {
                ShaderRegister: 0,
                RegisterSpace: 0,
                Num32BitValues: TRANSFORM_CONSTANTS,
            },
        },
        ShaderVisibility: D3D12_SHADER_VISIBILITY_VERTEX,
    }];

    let desc = D3D12_ROOT_SIGNATURE_DESC {
        NumParameters: parameters.len() as u32,
        pParameters: parameters.as_ptr(),
        NumStaticSamplers: 0,
        pStaticSamplers: std::ptr::null(),
        Flags: D3D12_ROOT_SIGNATURE_FLAG_ALLOW_INPUT_ASSEMBLER_INPUT_LAYOUT,
    };

    let mut signature: Option<ID3DBlob> = None;
    let mut error: Option<ID3DBlob> = None;
    let serialized = unsafe {
        D3D12SerializeRootSignature(
            &desc,
            D3D_ROOT_SIGNATURE_VERSION_1,
            &mut signature,
            Some(&mut error as *mut _),
        )
    };

    if let Err(e) = serialized {
        let message = error.as_ref().map(blob_message).unwrap_or_default();
        return Err(GraphicsError::RootSignature {
            code: status(&e),
            message,
        }
        .into());
    }

    let signature = signature.ok_or_else(|| GraphicsError::RootSignature {
        code: StatusCode::E_FAIL,
        message: "serializer returned no blob".to_string(),
    })?;

    let bytes = unsafe {
        std::slice::from_raw_parts(signature.GetBufferPointer() as *const u8, signature.GetBufferSize())
    };
    unsafe { device.CreateRootSignature(0, bytes) }.map_err(call_failed("CreateRootSignature"))
}

fn create_pipeline_state(
    device: &ID3D12Device,
    root_signature: &ID3D12RootSignature,
    shaders: &ShaderBlobs,
) -> Result<ID3D12PipelineState> {
    let input_element_descs = [
        D3D12_INPUT_ELEMENT_DESC {
            SemanticName: s!("POSITION"),
            SemanticIndex: 0,
            Format: DXGI_FORMAT_R32G32B32_FLOAT,
            InputSlot: 0,
            AlignedByteOffset: 0,
            InputSlotClass: D3D12_INPUT_CLASSIFICATION_PER_VERTEX_DATA,
            InstanceDataStepRate: 0,
        },
        D3D12_INPUT_ELEMENT_DESC {
            SemanticName: s!("COLOR"),
            SemanticIndex: 0,
            Format: DXGI_FORMAT_R32G32B32_FLOAT,
            InputSlot: 0,
            AlignedByteOffset: Vertex::COLOR_OFFSET,
            InputSlotClass: D3D12_INPUT_CLASSIFICATION_PER_VERTEX_DATA,
            InstanceDataStepRate: 0,
        },
    ];

    let mut desc = D3D12_GRAPHICS_PIPELINE_STATE_DESC::default();
    // SAFETY: 借用根签名，不增加引用计数；desc 只在本函数内使用
    desc.pRootSignature = unsafe { mem::transmute_copy(root_signature) };
    desc.VS = D3D12_SHADER_BYTECODE {
        pShaderBytecode: shaders.vertex.as_ptr() as *const c_void,
        BytecodeLength: shaders.vertex.len(),
    };
    desc.PS = D3D12_SHADER_BYTECODE {
        pShaderBytecode: shaders.pixel.as_ptr() as *const c_void,
        BytecodeLength: shaders.pixel.len(),
    };

    let mut blend = D3D12_BLEND_DESC::default();
    blend.RenderTarget[0] = D3D12_RENDER_TARGET_BLEND_DESC {
        BlendEnable: false.into(),
        LogicOpEnable: false.into(),
        RenderTargetWriteMask: D3D12_COLOR_WRITE_ENABLE_ALL.0 as u8,
        ..Default::default()
    };
    desc.BlendState = blend;

    desc.RasterizerState = D3D12_RASTERIZER_DESC {
        FillMode: D3D12_FILL_MODE_SOLID,
        CullMode: D3D12_CULL_MODE_NONE,
        DepthClipEnable: true.into(),
        ..Default::default()
    };
    desc.DepthStencilState = D3D12_DEPTH_STENCIL_DESC {
        DepthEnable: false.into(),
        StencilEnable: false.into(),
        ..Default::default()
    };
    desc.SampleMask = u32::MAX;
    desc.InputLayout = D3D12_INPUT_LAYOUT_DESC {
        pInputElementDescs: input_element_descs.as_ptr(),
        NumElements: input_element_descs.len() as u32,
    };
    desc.PrimitiveTopologyType = D3D12_PRIMITIVE_TOPOLOGY_TYPE_TRIANGLE;
    desc.NumRenderTargets = 1;
    desc.RTVFormats[0] = BACK_BUFFER_FORMAT;
    desc.SampleDesc.Count = 1;

    unsafe { device.CreateGraphicsPipelineState(&desc) }.map_err(call_failed("CreateGraphicsPipelineState"))
}

/// 默认堆上的顶点缓冲区
pub struct VertexBuffer {
    pub resource: ID3D12Resource,
    pub view: D3D12_VERTEX_BUFFER_VIEW,
    pub vertex_count: u32,
}

/// 经由上传堆把顶点复制到默认堆，完成后 flush 队列
pub fn upload_vertex_buffer(
    context: &Dx12Context,
    queue: &mut CommandQueue<Dx12Context>,
    command_list: &mut Dx12CommandList,
    vertices: &[Vertex],
) -> Result<VertexBuffer> {
    let bytes: &[u8] = bytemuck::cast_slice(vertices);
    let size = bytes.len() as u64;
    let device = context.device();

    let vertex_buffer = create_buffer(
        device,
        D3D12_HEAP_TYPE_DEFAULT,
        size,
        D3D12_RESOURCE_STATE_COPY_DEST,
    )?;
    let upload_buffer = create_buffer(
        device,
        D3D12_HEAP_TYPE_UPLOAD,
        size,
        D3D12_RESOURCE_STATE_GENERIC_READ,
    )?;

    let mut mapped: *mut c_void = std::ptr::null_mut();
    unsafe { upload_buffer.Map(0, None, Some(&mut mapped)) }.map_err(call_failed("Map"))?;
    // SAFETY: Map 成功后 mapped 指向至少 size 字节的可写内存
    unsafe {
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), mapped as *mut u8, bytes.len());
        upload_buffer.Unmap(0, None);
    }

    command_list.reset()?;
    unsafe { command_list.raw().CopyResource(&vertex_buffer, &upload_buffer) };
    command_list.transition(
        &vertex_buffer,
        ResourceState::CopyDest,
        ResourceState::VertexAndConstantBuffer,
    );
    command_list.close()?;

    queue.execute(command_list);
    let fence_value = queue.flush()?;

    info!(bytes = size, fence_value = fence_value.value(), "Vertex buffer uploaded");

    let view = D3D12_VERTEX_BUFFER_VIEW {
        BufferLocation: unsafe { vertex_buffer.GetGPUVirtualAddress() },
        SizeInBytes: size as u32,
        StrideInBytes: Vertex::STRIDE,
    };

    Ok(VertexBuffer {
        resource: vertex_buffer,
        view,
        vertex_count: vertices.len() as u32,
    })
}

fn create_buffer(
    device: &ID3D12Device,
    heap_type: D3D12_HEAP_TYPE,
    size: u64,
    initial_state: D3D12_RESOURCE_STATES,
) -> Result<ID3D12Resource> {
    let heap = heap_properties(heap_type);
    let desc = buffer_resource_desc(size);

    let mut resource: Option<ID3D12Resource> = None;
    unsafe {
        device.CreateCommittedResource(
            &heap,
            D3D12_HEAP_FLAG_CREATE_NOT_ZEROED,
            &desc,
            initial_state,
            None,
            &mut resource,
        )
    }
    .map_err(call_failed("CreateCommittedResource"))?;

    resource.ok_or_else(|| GraphicsError::device_call("CreateCommittedResource", StatusCode::E_FAIL).into())
}
