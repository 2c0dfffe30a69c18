//! Simulated mobile-OS kernel transport.
//!
//! - [`ipc`]: the shared region wire layout, its codecs and the region namespaces.
//! - [`runtime`]: kernel proxies (in-process and worker-backed), the worker loop and sessions.

pub use mmos_ipc as ipc;
pub use mmos_runtime as runtime;

pub use mmos_ipc::{Command, InputEvent, KeyKind, Layer, Modifiers, PointerKind};
pub use mmos_runtime::{
    DemoKernel, ExecutionMode, Kernel, KernelProxy, Pacing, RuntimeConfig, RuntimeError, Session,
};
