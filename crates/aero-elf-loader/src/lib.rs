//! The ELF Loader: segment/section/stack setup, argv/envp
//! layout, and constructor/finalizer table walking, driven against an
//! already-constructed [`aero_cpu_core::Executor`].
//!
//! The dependency direction is one-way: this crate depends on
//! `aero-cpu-core` to drive it, never the reverse — there are no
//! back-pointers from executor to loader.

mod error;
mod loader;

pub use error::{LoaderError, LoaderWarning};
pub use loader::{load, unload};
