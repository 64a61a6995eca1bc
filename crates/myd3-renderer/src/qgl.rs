// qgl.rs -- GL constants and the driver call seam
//
// The renderer never touches the GPU directly; every call goes through the
// `Qgl` trait. The windowing/context layer resolves the real function
// pointers and provides the production implementation. `NullDriver` stands
// in when no context exists, and `TraceDriver` records the full call stream
// (the r_logFile idea) and doubles as the test harness.

use myd3_common::q_shared::{Mat4, Plane, Vec4};

// ==============================
// GL constants (only the subset the backend issues)
// ==============================

pub type GLenum = u32;

// comparison funcs
pub const GL_LESS: GLenum = 0x0201;
pub const GL_EQUAL: GLenum = 0x0202;
pub const GL_LEQUAL: GLenum = 0x0203;
pub const GL_GREATER: GLenum = 0x0204;
pub const GL_ALWAYS: GLenum = 0x0207;

// blending factors
pub const GL_ZERO: GLenum = 0;
pub const GL_ONE: GLenum = 1;
pub const GL_SRC_COLOR: GLenum = 0x0300;
pub const GL_ONE_MINUS_SRC_COLOR: GLenum = 0x0301;
pub const GL_SRC_ALPHA: GLenum = 0x0302;
pub const GL_ONE_MINUS_SRC_ALPHA: GLenum = 0x0303;
pub const GL_DST_ALPHA: GLenum = 0x0304;
pub const GL_ONE_MINUS_DST_ALPHA: GLenum = 0x0305;
pub const GL_DST_COLOR: GLenum = 0x0306;
pub const GL_ONE_MINUS_DST_COLOR: GLenum = 0x0307;
pub const GL_SRC_ALPHA_SATURATE: GLenum = 0x0308;

// caps
pub const GL_CULL_FACE: GLenum = 0x0B44;
pub const GL_ALPHA_TEST: GLenum = 0x0BC0;
pub const GL_POLYGON_OFFSET_FILL: GLenum = 0x8037;

// face culling
pub const GL_FRONT: GLenum = 0x0404;
pub const GL_BACK: GLenum = 0x0405;

// texture targets
pub const GL_TEXTURE_2D: GLenum = 0x0DE1;
pub const GL_TEXTURE_CUBE_MAP: GLenum = 0x8513;

// attribute data types
pub const GL_UNSIGNED_BYTE: GLenum = 0x1401;
pub const GL_FLOAT: GLenum = 0x1406;

/// Which half of a single-source program blob is being compiled.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

/// The raw GL call surface used by the backend. Object handles are plain
/// `u32` with 0 meaning "none", uniform locations are `i32` with -1 meaning
/// "absent", exactly as the driver reports them.
pub trait Qgl {
    // shader objects
    fn create_shader(&mut self, stage: ShaderStage) -> u32;
    fn shader_source(&mut self, shader: u32, parts: &[&str]);
    fn compile_shader(&mut self, shader: u32) -> bool;
    fn shader_info_log(&mut self, shader: u32) -> String;
    fn delete_shader(&mut self, shader: u32);

    // program objects
    fn create_program(&mut self) -> u32;
    fn attach_shader(&mut self, program: u32, shader: u32);
    fn link_program(&mut self, program: u32) -> bool;
    fn program_info_log(&mut self, program: u32) -> String;
    fn delete_program(&mut self, program: u32);
    fn use_program(&mut self, program: u32);
    fn uniform_location(&mut self, program: u32, name: &str) -> i32;

    // uniform uploads (callers skip locations < 0)
    fn uniform1i(&mut self, location: i32, value: i32);
    fn uniform4fv(&mut self, location: i32, value: &Vec4);
    fn uniform_matrix4fv(&mut self, location: i32, value: &Mat4);

    // textures
    fn active_texture(&mut self, unit: u32);
    fn bind_texture(&mut self, target: GLenum, texnum: u32);

    // fixed state
    fn enable(&mut self, cap: GLenum);
    fn disable(&mut self, cap: GLenum);
    fn blend_func(&mut self, src: GLenum, dst: GLenum);
    fn depth_func(&mut self, func: GLenum);
    fn depth_mask(&mut self, enable: bool);
    fn depth_range(&mut self, near: f64, far: f64);
    fn cull_face(&mut self, mode: GLenum);
    fn alpha_func(&mut self, func: GLenum, reference: f32);
    fn stencil_func(&mut self, func: GLenum, reference: i32, mask: u32);
    fn clear_stencil(&mut self);
    fn scissor(&mut self, x: i32, y: i32, w: i32, h: i32);
    fn polygon_offset(&mut self, factor: f32, units: f32);
    fn tex_gen_plane(&mut self, plane: &Plane);

    // vertex attributes and draws
    fn enable_vertex_attrib_array(&mut self, index: u32);
    fn disable_vertex_attrib_array(&mut self, index: u32);
    fn vertex_attrib_pointer(
        &mut self,
        index: u32,
        size: i32,
        ty: GLenum,
        normalized: bool,
        stride: i32,
        offset: usize,
    );
    fn draw_elements(&mut self, num_indexes: i32, index_offset: usize);
}

// ==============================
// NullDriver
// ==============================

/// Driver used before a GL context exists; every call resolves to a no-op,
/// shader objects are never created and uniforms never resolve.
#[derive(Default)]
pub struct NullDriver;

impl Qgl for NullDriver {
    fn create_shader(&mut self, _stage: ShaderStage) -> u32 {
        0
    }
    fn shader_source(&mut self, _shader: u32, _parts: &[&str]) {}
    fn compile_shader(&mut self, _shader: u32) -> bool {
        false
    }
    fn shader_info_log(&mut self, _shader: u32) -> String {
        String::new()
    }
    fn delete_shader(&mut self, _shader: u32) {}
    fn create_program(&mut self) -> u32 {
        0
    }
    fn attach_shader(&mut self, _program: u32, _shader: u32) {}
    fn link_program(&mut self, _program: u32) -> bool {
        false
    }
    fn program_info_log(&mut self, _program: u32) -> String {
        String::new()
    }
    fn delete_program(&mut self, _program: u32) {}
    fn use_program(&mut self, _program: u32) {}
    fn uniform_location(&mut self, _program: u32, _name: &str) -> i32 {
        -1
    }
    fn uniform1i(&mut self, _location: i32, _value: i32) {}
    fn uniform4fv(&mut self, _location: i32, _value: &Vec4) {}
    fn uniform_matrix4fv(&mut self, _location: i32, _value: &Mat4) {}
    fn active_texture(&mut self, _unit: u32) {}
    fn bind_texture(&mut self, _target: GLenum, _texnum: u32) {}
    fn enable(&mut self, _cap: GLenum) {}
    fn disable(&mut self, _cap: GLenum) {}
    fn blend_func(&mut self, _src: GLenum, _dst: GLenum) {}
    fn depth_func(&mut self, _func: GLenum) {}
    fn depth_mask(&mut self, _enable: bool) {}
    fn depth_range(&mut self, _near: f64, _far: f64) {}
    fn cull_face(&mut self, _mode: GLenum) {}
    fn alpha_func(&mut self, _func: GLenum, _reference: f32) {}
    fn stencil_func(&mut self, _func: GLenum, _reference: i32, _mask: u32) {}
    fn clear_stencil(&mut self) {}
    fn scissor(&mut self, _x: i32, _y: i32, _w: i32, _h: i32) {}
    fn polygon_offset(&mut self, _factor: f32, _units: f32) {}
    fn tex_gen_plane(&mut self, _plane: &Plane) {}
    fn enable_vertex_attrib_array(&mut self, _index: u32) {}
    fn disable_vertex_attrib_array(&mut self, _index: u32) {}
    fn vertex_attrib_pointer(
        &mut self,
        _index: u32,
        _size: i32,
        _ty: GLenum,
        _normalized: bool,
        _stride: i32,
        _offset: usize,
    ) {
    }
    fn draw_elements(&mut self, _num_indexes: i32, _index_offset: usize) {}
}

// ==============================
// TraceDriver
// ==============================

/// One recorded GL call.
#[derive(Clone, PartialEq, Debug)]
pub enum TraceCall {
    CreateShader(ShaderStage, u32),
    CompileShader(u32, bool),
    DeleteShader(u32),
    CreateProgram(u32),
    AttachShader(u32, u32),
    LinkProgram(u32, bool),
    DeleteProgram(u32),
    UseProgram(u32),
    Uniform1i(i32, i32),
    Uniform4fv(i32, Vec4),
    UniformMatrix4fv(i32, Mat4),
    ActiveTexture(u32),
    BindTexture(GLenum, u32),
    Enable(GLenum),
    Disable(GLenum),
    BlendFunc(GLenum, GLenum),
    DepthFunc(GLenum),
    DepthMask(bool),
    DepthRange(f64, f64),
    CullFace(GLenum),
    AlphaFunc(GLenum, f32),
    StencilFunc(GLenum, i32, u32),
    ClearStencil,
    Scissor(i32, i32, i32, i32),
    PolygonOffset(f32, f32),
    TexGenPlane(Plane),
    EnableVertexAttribArray(u32),
    DisableVertexAttribArray(u32),
    VertexAttribPointer(u32, usize),
    DrawElements(i32, usize),
}

/// A driver that records every issued call. Compile/link outcomes and the
/// set of uniforms a "program" exposes are configurable, so callers can
/// exercise failure paths without a GPU.
#[derive(Default)]
pub struct TraceDriver {
    pub calls: Vec<TraceCall>,
    pub fail_vertex_compile: bool,
    pub fail_fragment_compile: bool,
    pub fail_link: bool,
    /// Returned from shader/program info log queries.
    pub info_log: String,
    /// Uniform names that resolve to -1 on every program.
    pub missing_uniforms: Vec<String>,
    /// (program, name) -> assigned location.
    pub uniform_locations: std::collections::HashMap<(u32, String), i32>,
    next_object: u32,
    next_location: i32,
    shader_stages: std::collections::HashMap<u32, ShaderStage>,
}

impl TraceDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Location previously handed out for `name` on `program`, or -1.
    pub fn location(&self, program: u32, name: &str) -> i32 {
        self.uniform_locations
            .get(&(program, name.to_string()))
            .copied()
            .unwrap_or(-1)
    }

    /// Every recorded `UniformMatrix4fv` upload to `location`, in order.
    pub fn mat4_uploads(&self, location: i32) -> Vec<Mat4> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                TraceCall::UniformMatrix4fv(loc, m) if *loc == location => Some(*m),
                _ => None,
            })
            .collect()
    }

    /// Every recorded `Uniform4fv` upload to `location`, in order.
    pub fn vec4_uploads(&self, location: i32) -> Vec<Vec4> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                TraceCall::Uniform4fv(loc, v) if *loc == location => Some(*v),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&TraceCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    fn alloc_object(&mut self) -> u32 {
        self.next_object += 1;
        self.next_object
    }
}

impl Qgl for TraceDriver {
    fn create_shader(&mut self, stage: ShaderStage) -> u32 {
        let id = self.alloc_object();
        self.shader_stages.insert(id, stage);
        self.calls.push(TraceCall::CreateShader(stage, id));
        id
    }
    fn shader_source(&mut self, _shader: u32, _parts: &[&str]) {}
    fn compile_shader(&mut self, shader: u32) -> bool {
        let ok = match self.shader_stages.get(&shader) {
            Some(ShaderStage::Vertex) => !self.fail_vertex_compile,
            Some(ShaderStage::Fragment) => !self.fail_fragment_compile,
            None => false,
        };
        self.calls.push(TraceCall::CompileShader(shader, ok));
        ok
    }
    fn shader_info_log(&mut self, _shader: u32) -> String {
        self.info_log.clone()
    }
    fn delete_shader(&mut self, shader: u32) {
        self.calls.push(TraceCall::DeleteShader(shader));
    }
    fn create_program(&mut self) -> u32 {
        let id = self.alloc_object();
        self.calls.push(TraceCall::CreateProgram(id));
        id
    }
    fn attach_shader(&mut self, program: u32, shader: u32) {
        self.calls.push(TraceCall::AttachShader(program, shader));
    }
    fn link_program(&mut self, program: u32) -> bool {
        let ok = !self.fail_link;
        self.calls.push(TraceCall::LinkProgram(program, ok));
        ok
    }
    fn program_info_log(&mut self, _program: u32) -> String {
        self.info_log.clone()
    }
    fn delete_program(&mut self, program: u32) {
        self.calls.push(TraceCall::DeleteProgram(program));
    }
    fn use_program(&mut self, program: u32) {
        self.calls.push(TraceCall::UseProgram(program));
    }
    fn uniform_location(&mut self, program: u32, name: &str) -> i32 {
        if self.missing_uniforms.iter().any(|m| m == name) {
            return -1;
        }
        let key = (program, name.to_string());
        if let Some(&loc) = self.uniform_locations.get(&key) {
            return loc;
        }
        let loc = self.next_location;
        self.next_location += 1;
        self.uniform_locations.insert(key, loc);
        loc
    }
    fn uniform1i(&mut self, location: i32, value: i32) {
        self.calls.push(TraceCall::Uniform1i(location, value));
    }
    fn uniform4fv(&mut self, location: i32, value: &Vec4) {
        self.calls.push(TraceCall::Uniform4fv(location, *value));
    }
    fn uniform_matrix4fv(&mut self, location: i32, value: &Mat4) {
        self.calls.push(TraceCall::UniformMatrix4fv(location, *value));
    }
    fn active_texture(&mut self, unit: u32) {
        self.calls.push(TraceCall::ActiveTexture(unit));
    }
    fn bind_texture(&mut self, target: GLenum, texnum: u32) {
        self.calls.push(TraceCall::BindTexture(target, texnum));
    }
    fn enable(&mut self, cap: GLenum) {
        self.calls.push(TraceCall::Enable(cap));
    }
    fn disable(&mut self, cap: GLenum) {
        self.calls.push(TraceCall::Disable(cap));
    }
    fn blend_func(&mut self, src: GLenum, dst: GLenum) {
        self.calls.push(TraceCall::BlendFunc(src, dst));
    }
    fn depth_func(&mut self, func: GLenum) {
        self.calls.push(TraceCall::DepthFunc(func));
    }
    fn depth_mask(&mut self, enable: bool) {
        self.calls.push(TraceCall::DepthMask(enable));
    }
    fn depth_range(&mut self, near: f64, far: f64) {
        self.calls.push(TraceCall::DepthRange(near, far));
    }
    fn cull_face(&mut self, mode: GLenum) {
        self.calls.push(TraceCall::CullFace(mode));
    }
    fn alpha_func(&mut self, func: GLenum, reference: f32) {
        self.calls.push(TraceCall::AlphaFunc(func, reference));
    }
    fn stencil_func(&mut self, func: GLenum, reference: i32, mask: u32) {
        self.calls.push(TraceCall::StencilFunc(func, reference, mask));
    }
    fn clear_stencil(&mut self) {
        self.calls.push(TraceCall::ClearStencil);
    }
    fn scissor(&mut self, x: i32, y: i32, w: i32, h: i32) {
        self.calls.push(TraceCall::Scissor(x, y, w, h));
    }
    fn polygon_offset(&mut self, factor: f32, units: f32) {
        self.calls.push(TraceCall::PolygonOffset(factor, units));
    }
    fn tex_gen_plane(&mut self, plane: &Plane) {
        self.calls.push(TraceCall::TexGenPlane(*plane));
    }
    fn enable_vertex_attrib_array(&mut self, index: u32) {
        self.calls.push(TraceCall::EnableVertexAttribArray(index));
    }
    fn disable_vertex_attrib_array(&mut self, index: u32) {
        self.calls.push(TraceCall::DisableVertexAttribArray(index));
    }
    fn vertex_attrib_pointer(
        &mut self,
        index: u32,
        _size: i32,
        _ty: GLenum,
        _normalized: bool,
        _stride: i32,
        offset: usize,
    ) {
        self.calls.push(TraceCall::VertexAttribPointer(index, offset));
    }
    fn draw_elements(&mut self, num_indexes: i32, index_offset: usize) {
        self.calls.push(TraceCall::DrawElements(num_indexes, index_offset));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_driver_never_creates_objects() {
        let mut gl = NullDriver;
        assert_eq!(gl.create_shader(ShaderStage::Vertex), 0);
        assert_eq!(gl.create_program(), 0);
        assert_eq!(gl.uniform_location(1, "gMVP"), -1);
    }

    #[test]
    fn test_trace_driver_locations_are_stable() {
        let mut gl = TraceDriver::new();
        let a = gl.uniform_location(7, "gMVP");
        let b = gl.uniform_location(7, "gColorMod");
        assert_ne!(a, b);
        assert_eq!(gl.uniform_location(7, "gMVP"), a);
        assert_eq!(gl.location(7, "gMVP"), a);
    }

    #[test]
    fn test_trace_driver_missing_uniforms_resolve_absent() {
        let mut gl = TraceDriver::new();
        gl.missing_uniforms.push("gModel".to_string());
        assert_eq!(gl.uniform_location(3, "gModel"), -1);
    }
}
