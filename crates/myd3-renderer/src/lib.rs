//! GLSL rendering backend: image loading, shader program cache, and the
//! per-frame draw orchestration for lit interactions, the depth pre-pass,
//! and ambient shader-stage passes.
//!
//! The GPU is reached exclusively through the [`qgl::Qgl`] seam; the
//! windowing layer that resolves the real function pointers lives outside
//! this crate.

pub mod qgl;
pub mod gl_local;
pub mod gl_image;
pub mod gl_program;
pub mod gl_draw;
