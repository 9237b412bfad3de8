//! D3D12 结构体构造辅助函数

use std::mem::{self, ManuallyDrop};

use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;

use crate::core::error::{EngineError, GraphicsError, StatusCode};
use crate::gfx::backend::{QueueKind, ResourceState};

/// windows-rs 错误中的 HRESULT
pub fn status(error: &windows::core::Error) -> StatusCode {
    StatusCode(error.code().0)
}

/// 把 windows-rs 错误映射为带调用名的 `DeviceCallFailed`
pub fn call_failed(call: &'static str) -> impl FnOnce(windows::core::Error) -> EngineError {
    move |error| GraphicsError::device_call(call, status(&error)).into()
}

pub fn resource_state(state: ResourceState) -> D3D12_RESOURCE_STATES {
    match state {
        ResourceState::Present => D3D12_RESOURCE_STATE_PRESENT,
        ResourceState::RenderTarget => D3D12_RESOURCE_STATE_RENDER_TARGET,
        ResourceState::CopyDest => D3D12_RESOURCE_STATE_COPY_DEST,
        ResourceState::VertexAndConstantBuffer => D3D12_RESOURCE_STATE_VERTEX_AND_CONSTANT_BUFFER,
        ResourceState::GenericRead => D3D12_RESOURCE_STATE_GENERIC_READ,
    }
}

pub fn command_list_type(kind: QueueKind) -> D3D12_COMMAND_LIST_TYPE {
    match kind {
        QueueKind::Direct => D3D12_COMMAND_LIST_TYPE_DIRECT,
        QueueKind::Compute => D3D12_COMMAND_LIST_TYPE_COMPUTE,
        QueueKind::Copy => D3D12_COMMAND_LIST_TYPE_COPY,
    }
}

/// 整个资源的转换屏障
///
/// 屏障借用 `resource` 而不增加引用计数，必须在 `resource` 存活期间提交。
pub fn transition_barrier(
    resource: &ID3D12Resource,
    before: ResourceState,
    after: ResourceState,
) -> D3D12_RESOURCE_BARRIER {
    D3D12_RESOURCE_BARRIER {
        Type: D3D12_RESOURCE_BARRIER_TYPE_TRANSITION,
        Flags: D3D12_RESOURCE_BARRIER_FLAG_NONE,
        Anonymous: D3D12_RESOURCE_BARRIER_0 {
            Transition: ManuallyDrop::new(D3D12_RESOURCE_TRANSITION_BARRIER {
                // SAFETY: 与 Option<ID3D12Resource> 布局相同，ManuallyDrop 保证不会 Release
                pResource: unsafe { mem::transmute_copy(resource) },
                Subresource: D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES,
                StateBefore: resource_state(before),
                StateAfter: resource_state(after),
            }),
        },
    }
}

pub fn heap_properties(heap_type: D3D12_HEAP_TYPE) -> D3D12_HEAP_PROPERTIES {
    D3D12_HEAP_PROPERTIES {
        Type: heap_type,
        CPUPageProperty: D3D12_CPU_PAGE_PROPERTY_UNKNOWN,
        MemoryPoolPreference: D3D12_MEMORY_POOL_UNKNOWN,
        CreationNodeMask: 1,
        VisibleNodeMask: 1,
    }
}

pub fn buffer_resource_desc(size: u64) -> D3D12_RESOURCE_DESC {
    D3D12_RESOURCE_DESC {
        Dimension: D3D12_RESOURCE_DIMENSION_BUFFER,
        Alignment: 0,
        Width: size,
        Height: 1,
        DepthOrArraySize: 1,
        MipLevels: 1,
        Format: DXGI_FORMAT_UNKNOWN,
        SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
        Layout: D3D12_TEXTURE_LAYOUT_ROW_MAJOR,
        Flags: D3D12_RESOURCE_FLAG_NONE,
    }
}

/// D3D blob 中的诊断文本
pub fn blob_message(blob: &windows::Win32::Graphics::Direct3D::ID3DBlob) -> String {
    // SAFETY: 指针和长度来自同一个 blob
    let bytes = unsafe {
        std::slice::from_raw_parts(blob.GetBufferPointer() as *const u8, blob.GetBufferSize())
    };
    String::from_utf8_lossy(bytes).trim_end_matches('\0').trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_mapping() {
        assert_eq!(resource_state(ResourceState::Present), D3D12_RESOURCE_STATE_PRESENT);
        assert_eq!(resource_state(ResourceState::RenderTarget), D3D12_RESOURCE_STATE_RENDER_TARGET);
        assert_eq!(command_list_type(QueueKind::Copy), D3D12_COMMAND_LIST_TYPE_COPY);
    }

    #[test]
    fn test_buffer_desc() {
        let desc = buffer_resource_desc(72);
        assert_eq!(desc.Width, 72);
        assert_eq!(desc.Dimension, D3D12_RESOURCE_DIMENSION_BUFFER);
        assert_eq!(heap_properties(D3D12_HEAP_TYPE_UPLOAD).Type, D3D12_HEAP_TYPE_UPLOAD);
    }
}
