//! 预编译着色器加载
//!
//! 顶点和像素着色器以 `.cso` 二进制形式放在着色器目录中
//! （由 `shaders/*.hlsl` 离线编译而来）。缺少任何一个都是致命错误。

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::core::error::{GraphicsError, Result};

pub const VERTEX_SHADER_FILE: &str = "VertexShader.cso";
pub const PIXEL_SHADER_FILE: &str = "PixelShader.cso";

/// 着色器字节码
#[derive(Debug, Clone)]
pub struct ShaderBlobs {
    pub vertex: Vec<u8>,
    pub pixel: Vec<u8>,
}

impl ShaderBlobs {
    /// 从目录加载两个着色器
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let vertex = read_blob(dir.join(VERTEX_SHADER_FILE))?;
        let pixel = read_blob(dir.join(PIXEL_SHADER_FILE))?;

        info!(
            dir = %dir.display(),
            vertex_bytes = vertex.len(),
            pixel_bytes = pixel.len(),
            "Shaders loaded"
        );
        Ok(Self { vertex, pixel })
    }
}

fn read_blob(path: PathBuf) -> Result<Vec<u8>> {
    if !path.is_file() {
        return Err(GraphicsError::ShaderNotFound(path).into());
    }
    Ok(fs::read(&path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::EngineError;

    #[test]
    fn test_load_both_shaders() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(VERTEX_SHADER_FILE), [1u8, 2, 3]).unwrap();
        fs::write(dir.path().join(PIXEL_SHADER_FILE), [4u8]).unwrap();

        let blobs = ShaderBlobs::load(dir.path()).unwrap();
        assert_eq!(blobs.vertex, vec![1, 2, 3]);
        assert_eq!(blobs.pixel, vec![4]);
    }

    #[test]
    fn test_missing_shader_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(VERTEX_SHADER_FILE), [1u8]).unwrap();

        match ShaderBlobs::load(dir.path()) {
            Err(EngineError::Graphics(GraphicsError::ShaderNotFound(path))) => {
                assert!(path.ends_with(PIXEL_SHADER_FILE));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
