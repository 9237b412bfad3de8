//! 场景动画时钟
//!
//! 唯一的场景状态是一个在 [0, 2π) 内循环的时间值，驱动清屏颜色和三角形旋转。

use std::f32::consts::TAU;

use nalgebra::{Matrix4, Vector3};

/// 循环时间
#[derive(Debug, Clone, Copy, Default)]
pub struct SceneClock {
    time: f32,
}

impl SceneClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    /// 前进 `delta_seconds` 秒，超过 2π 时回绕
    pub fn advance(&mut self, delta_seconds: f32) {
        self.time += delta_seconds;
        if self.time >= TAU {
            self.time %= TAU;
        }
    }

    /// 清屏颜色，RGB 三个通道相位不同的正弦
    pub fn clear_color(&self) -> [f32; 4] {
        let t = self.time;
        [
            0.5 + 0.5 * (t + 1.0).sin(),
            0.5 + 0.5 * (t + 3.0).sin(),
            0.5 + 0.5 * (t + 6.0).sin(),
            1.0,
        ]
    }

    /// 绕 Z 轴旋转的模型矩阵
    pub fn model_matrix(&self) -> Matrix4<f32> {
        Matrix4::new_rotation(Vector3::z() * self.time)
    }

    /// 作为 16 个根常量上传的模型矩阵（列主序）
    pub fn transform_constants(&self) -> [f32; 16] {
        let mut constants = [0.0; 16];
        constants.copy_from_slice(self.model_matrix().as_slice());
        constants
    }
}
