// ============================================================
// Layer 2 — Backend Selection
// ============================================================
// The use cases are generic over the Burn backend. This enum is
// the runtime switch the CLI hands them:
//
//   wgpu    — GPU through WebGPU (default, as for training)
//   ndarray — pure-Rust CPU backend, no GPU driver needed
//
// Each use case matches on it once and calls its generic
// execute::<B>() with the concrete backend type.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Wgpu,
    NdArray,
}

pub type WgpuBackend    = burn::backend::Wgpu;
pub type NdArrayBackend = burn::backend::NdArray;

pub fn wgpu_device() -> burn::backend::wgpu::WgpuDevice {
    burn::backend::wgpu::WgpuDevice::default()
}

pub fn ndarray_device() -> burn::backend::ndarray::NdArrayDevice {
    burn::backend::ndarray::NdArrayDevice::Cpu
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wgpu"            => Ok(BackendKind::Wgpu),
            "ndarray" | "cpu" => Ok(BackendKind::NdArray),
            other => Err(format!("unknown backend '{other}' (expected wgpu or ndarray)")),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Wgpu    => write!(f, "wgpu"),
            BackendKind::NdArray => write!(f, "ndarray"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display_agree() {
        for kind in [BackendKind::Wgpu, BackendKind::NdArray] {
            assert_eq!(kind.to_string().parse::<BackendKind>(), Ok(kind));
        }
        assert_eq!("CPU".parse::<BackendKind>(), Ok(BackendKind::NdArray));
        assert!("cuda".parse::<BackendKind>().is_err());
    }
}
