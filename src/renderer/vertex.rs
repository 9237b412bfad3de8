//! 顶点数据定义
//!
//! # 设计说明
//!
//! - 使用 `#[repr(C)]` 确保内存布局与 HLSL 输入布局一致
//! - 实现 `Pod` 和 `Zeroable` trait 以支持零拷贝上传到 GPU

use bytemuck::{Pod, Zeroable};

/// 顶点结构体
///
/// # 内存布局
///
/// - `position`：偏移 0，3 个 f32（输入语义 `POSITION`）
/// - `color`：偏移 12，3 个 f32（输入语义 `COLOR`）
///
/// 总大小：24 字节
#[repr(C)]
#[derive(Default, Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
}

impl Vertex {
    /// 顶点步长（字节）
    pub const STRIDE: u32 = std::mem::size_of::<Vertex>() as u32;

    /// `color` 字段的字节偏移
    pub const COLOR_OFFSET: u32 = std::mem::size_of::<[f32; 3]>() as u32;

    pub const fn new(position: [f32; 3], color: [f32; 3]) -> Self {
        Self { position, color }
    }
}

/// 场景中唯一的三角形（顶部红、右下蓝、左下绿）
pub const TRIANGLE: [Vertex; 3] = [
    Vertex::new([0.0, 0.5, 0.0], [1.0, 0.0, 0.0]),
    Vertex::new([0.43, -0.25, 0.0], [0.0, 0.0, 1.0]),
    Vertex::new([-0.43, -0.25, 0.0], [0.0, 1.0, 0.0]),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_layout() {
        assert_eq!(Vertex::STRIDE, 24);
        assert_eq!(Vertex::COLOR_OFFSET, 12);
        assert_eq!(bytemuck::cast_slice::<Vertex, u8>(&TRIANGLE).len(), 72);
    }

    #[test]
    fn test_triangle_colors() {
        assert_eq!(TRIANGLE[0].color, [1.0, 0.0, 0.0]);
        assert_eq!(TRIANGLE[1].color, [0.0, 0.0, 1.0]);
        assert_eq!(TRIANGLE[2].color, [0.0, 1.0, 0.0]);
        assert!(TRIANGLE.iter().all(|v| v.position[2] == 0.0));
    }
}
