// SPDX-License-Identifier: MPL-2.0

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Settings for one [`Session`](crate::Session).
///
/// Frontends build this however they like, typically by deserializing their own settings file,
/// and pass it to [`Session::init_core`](crate::Session::init_core).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The backend [`Session::init_graphics`](crate::Session::init_graphics) starts.
    pub backend: BackendKind,
    /// The name of the dispatch thread.
    pub thread_name: String,
    /// Extra `tracing` filter directives, such as `latte_gpu=trace`.
    pub log_directives: Vec<String>,
    /// How many recent retirements [`Session::retired`](crate::Session::retired) holds.
    pub retire_history: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::Vulkan,
            thread_name: String::from("latte-gpu"),
            log_directives: Vec::new(),
            retire_history: crate::gpu::retire::DEFAULT_HISTORY,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Vulkan,
    OpenGl,
    Dx12,
    /// Validates and discards everything; needs no graphics hardware.
    Null,
}

impl BackendKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Vulkan => "vulkan",
            Self::OpenGl => "opengl",
            Self::Dx12 => "dx12",
            Self::Null => "null",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownBackend(pub String);

impl fmt::Display for UnknownBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown backend '{}' (expected vulkan, opengl, dx12 or null)",
            self.0,
        )
    }
}

impl std::error::Error for UnknownBackend {}

impl FromStr for BackendKind {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vulkan" | "vk" => Ok(Self::Vulkan),
            "opengl" | "gl" => Ok(Self::OpenGl),
            "dx12" | "d3d12" => Ok(Self::Dx12),
            "null" | "none" => Ok(Self::Null),
            _ => Err(UnknownBackend(s.to_string())),
        }
    }
}
