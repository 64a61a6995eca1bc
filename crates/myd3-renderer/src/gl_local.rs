// gl_local.rs -- renderer local definitions
//
// Data consumed by the draw orchestrator: render-state bits, the tracked GL
// state machine, vertex layout, and the per-view descriptors the front end
// hands across (surfaces, lights, materials, stages).

use std::rc::Rc;

use myd3_common::cvar::CvarContext;
use myd3_common::q_shared::{Mat4, Plane, Vec4};

use crate::qgl::*;

// ============================================================================
// Render state bits
//
// One word describes the blend/depth configuration of a draw; GlState diffs
// against the previously issued word so redundant driver calls are skipped.
// ============================================================================

pub const GLS_SRCBLEND_ONE: u64 = 0x00000000;
pub const GLS_SRCBLEND_ZERO: u64 = 0x00000001;
pub const GLS_SRCBLEND_DST_COLOR: u64 = 0x00000002;
pub const GLS_SRCBLEND_ONE_MINUS_DST_COLOR: u64 = 0x00000003;
pub const GLS_SRCBLEND_SRC_ALPHA: u64 = 0x00000004;
pub const GLS_SRCBLEND_ONE_MINUS_SRC_ALPHA: u64 = 0x00000005;
pub const GLS_SRCBLEND_DST_ALPHA: u64 = 0x00000006;
pub const GLS_SRCBLEND_ONE_MINUS_DST_ALPHA: u64 = 0x00000007;
pub const GLS_SRCBLEND_ALPHA_SATURATE: u64 = 0x00000008;
pub const GLS_SRCBLEND_BITS: u64 = 0x0000000f;

pub const GLS_DSTBLEND_ZERO: u64 = 0x00000000;
pub const GLS_DSTBLEND_ONE: u64 = 0x00000020;
pub const GLS_DSTBLEND_SRC_COLOR: u64 = 0x00000030;
pub const GLS_DSTBLEND_ONE_MINUS_SRC_COLOR: u64 = 0x00000040;
pub const GLS_DSTBLEND_SRC_ALPHA: u64 = 0x00000050;
pub const GLS_DSTBLEND_ONE_MINUS_SRC_ALPHA: u64 = 0x00000060;
pub const GLS_DSTBLEND_DST_ALPHA: u64 = 0x00000070;
pub const GLS_DSTBLEND_ONE_MINUS_DST_ALPHA: u64 = 0x00000080;
pub const GLS_DSTBLEND_BITS: u64 = 0x000000f0;

/// Set when depth writes are disabled for the draw.
pub const GLS_DEPTHMASK: u64 = 0x00000100;

pub const GLS_DEPTHFUNC_LESS: u64 = 0x00000000;
pub const GLS_DEPTHFUNC_ALWAYS: u64 = 0x00010000;
pub const GLS_DEPTHFUNC_EQUAL: u64 = 0x00020000;
pub const GLS_DEPTHFUNC_BITS: u64 = 0x00030000;

// ============================================================================
// Vertex layout
// ============================================================================

// fixed attribute slots shared by every program
pub const VA_POS: u32 = 0;
pub const VA_UV: u32 = 1;
pub const VA_NORMAL: u32 = 2;
pub const VA_TANGENT: u32 = 3;
pub const VA_BINORMAL: u32 = 4;
pub const VA_COLOR: u32 = 5;

/// The ambient vertex format cached by the geometry manager.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DrawVert {
    pub xyz: [f32; 3],
    pub st: [f32; 2],
    pub normal: [f32; 3],
    pub tangents: [[f32; 3]; 2],
    pub color: [u8; 4],
}

/// Opaque handle into the vertex cache (external collaborator).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct VertCacheHandle(pub u32);

// ============================================================================
// Texture objects
// ============================================================================

/// Handle to an uploaded texture.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Image {
    pub texnum: u32,
    pub target: GLenum,
}

impl Image {
    pub fn new_2d(texnum: u32) -> Self {
        Self {
            texnum,
            target: GL_TEXTURE_2D,
        }
    }

    pub fn new_cube(texnum: u32) -> Self {
        Self {
            texnum,
            target: GL_TEXTURE_CUBE_MAP,
        }
    }

    pub fn bind<G: Qgl + ?Sized>(&self, gl: &mut G) {
        gl.bind_texture(self.target, self.texnum);
    }

    /// Unbinds whatever is on the active unit.
    pub fn bind_null<G: Qgl + ?Sized>(gl: &mut G) {
        gl.bind_texture(GL_TEXTURE_2D, 0);
    }
}

/// Textures owned by the image manager that the backend binds by role.
#[derive(Clone, Copy, Debug)]
pub struct BuiltinImages {
    pub white: Image,
    /// Normalization cube map for the surface-to-light vector.
    pub normal_cube_map: Image,
    /// Hemisphere variant used for ambient lights.
    pub ambient_normal_map: Image,
    /// Specular power lookup table.
    pub specular_table: Image,
}

// ============================================================================
// Materials and stages
// ============================================================================

bitflags::bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    pub struct MaterialFlags: u32 {
        const POLYGON_OFFSET = 1 << 0;
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum MaterialCoverage {
    #[default]
    Opaque,
    /// Alpha tested; holes punched per stage.
    Perforated,
    Translucent,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum MaterialSort {
    /// Mirrors/portals; the depth pass darkens rather than overwrites.
    Subview,
    #[default]
    Opaque,
    Translucent,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum CullType {
    #[default]
    FrontSided,
    BackSided,
    TwoSided,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum StageLighting {
    #[default]
    Ambient,
    Bump,
    Diffuse,
    Specular,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum VertexColorMode {
    #[default]
    Ignore,
    Modulate,
    InverseModulate,
}

pub const MAX_VERTEX_PARMS: usize = 4;
pub const MAX_FRAGMENT_IMAGES: usize = 4;

/// A stage carrying its own GPU program, declared in the material with
/// per-stage vector parameters and extra image bindings.
#[derive(Clone, Debug)]
pub struct NewStage {
    /// Program identity from `ProgramCache::find_or_register`.
    pub program: i32,
    /// Up to MAX_VERTEX_PARMS register quads, evaluated per draw.
    pub vertex_parms: Vec<[usize; 4]>,
    /// Up to MAX_FRAGMENT_IMAGES images bound to sequential units.
    pub images: Vec<Option<Image>>,
}

/// One layer of a material. Register indices refer to the surface's
/// pre-evaluated `shader_registers` array.
#[derive(Clone, Debug, Default)]
pub struct Stage {
    pub condition_register: usize,
    pub color_registers: [usize; 4],
    pub has_alpha_test: bool,
    pub alpha_test_register: usize,
    pub lighting: StageLighting,
    pub draw_state_bits: u64,
    pub vertex_color: VertexColorMode,
    /// Stage image, already resolved by the front end (may be animated).
    pub texture: Option<Image>,
    pub new_stage: Option<NewStage>,
}

/// Material descriptor, parsed elsewhere and consumed read-only here.
#[derive(Clone, Debug, Default)]
pub struct Material {
    pub name: String,
    pub stages: Vec<Stage>,
    pub coverage: MaterialCoverage,
    pub sort: MaterialSort,
    pub flags: MaterialFlags,
    pub polygon_offset: f32,
    pub cull: CullType,
    // light material classification
    pub fog_light: bool,
    pub blend_light: bool,
    pub ambient_light: bool,
    pub portal_sky: bool,
}

impl Material {
    pub fn is_drawn(&self) -> bool {
        !self.stages.is_empty()
    }

    pub fn has_ambient(&self) -> bool {
        self.stages
            .iter()
            .any(|s| s.lighting == StageLighting::Ambient)
    }

    pub fn test_flag(&self, flag: MaterialFlags) -> bool {
        self.flags.contains(flag)
    }
}

// ============================================================================
// Per-view descriptors
// ============================================================================

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct ScreenRect {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl ScreenRect {
    pub fn width(&self) -> i32 {
        self.x2 + 1 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 + 1 - self.y1
    }
}

/// The model space a surface is drawn in. `id` is stable for a frame and is
/// what the backend compares to coalesce space-dependent state changes.
#[derive(Clone, Debug)]
pub struct SpaceTransform {
    pub id: u32,
    pub model_matrix: Mat4,
    pub model_view_matrix: Mat4,
    pub weapon_depth_hack: bool,
    /// Pulls the model this far towards the viewer in clip space; decals and
    /// other coplanar models use it to win the depth test.
    pub model_depth_hack: f32,
}

impl Default for SpaceTransform {
    fn default() -> Self {
        Self {
            id: 0,
            model_matrix: myd3_common::q_shared::MAT4_IDENTITY,
            model_view_matrix: myd3_common::q_shared::MAT4_IDENTITY,
            weapon_depth_hack: false,
            model_depth_hack: 0.0,
        }
    }
}

/// Geometry counters for one surface; the actual buffers live in the vertex
/// cache. Deforms may zero `num_indexes` to disable themselves.
#[derive(Clone, Copy, Debug, Default)]
pub struct SurfaceTriangles {
    pub num_indexes: i32,
    pub ambient_cache: Option<VertCacheHandle>,
    /// Byte offset of the surface's indexes in the bound index buffer.
    pub index_offset: usize,
}

/// One drawable surface as prepared by the front end.
#[derive(Clone, Debug)]
pub struct DrawSurf {
    pub geo: SurfaceTriangles,
    pub space: SpaceTransform,
    pub material: Rc<Material>,
    pub scissor: ScreenRect,
    /// Pre-evaluated material expression registers.
    pub shader_registers: Vec<f32>,
}

/// One visible light with its shadow and interaction surface lists. List
/// order is established by the front end and must be preserved.
#[derive(Clone, Debug)]
pub struct ViewLight {
    pub light_material: Rc<Material>,
    pub scissor: ScreenRect,
    pub global_shadows: Vec<DrawSurf>,
    pub local_shadows: Vec<DrawSurf>,
    pub local_interactions: Vec<DrawSurf>,
    pub global_interactions: Vec<DrawSurf>,
    pub translucent_interactions: Vec<DrawSurf>,
}

impl ViewLight {
    pub fn has_interactions(&self) -> bool {
        !self.local_interactions.is_empty()
            || !self.global_interactions.is_empty()
            || !self.translucent_interactions.is_empty()
    }
}

/// Everything the backend needs to know about the view being rendered.
#[derive(Clone, Debug, Default)]
pub struct ViewDef {
    pub viewport: ScreenRect,
    pub projection_matrix: Mat4,
    /// Mirror/portal clip planes (at most one is used).
    pub clip_planes: Vec<Plane>,
    pub lights: Vec<ViewLight>,
}

/// Fully resolved inputs for one interaction draw call. Built by the
/// external interaction fan-out for each light/surface layer pair and
/// discarded after the draw.
pub struct DrawInteraction<'a> {
    pub surf: &'a DrawSurf,
    pub model_view_proj: Mat4,
    pub local_light_origin: Vec4,
    pub local_view_origin: Vec4,
    /// S, T, Q projection rows plus the falloff S row.
    pub light_projection: [Vec4; 4],
    pub bump_matrix: [Vec4; 2],
    pub diffuse_matrix: [Vec4; 2],
    pub specular_matrix: [Vec4; 2],
    pub vertex_color: VertexColorMode,
    pub diffuse_color: Vec4,
    pub specular_color: Vec4,
    pub bump_image: Image,
    pub light_falloff_image: Image,
    pub light_image: Image,
    pub diffuse_image: Image,
    pub specular_image: Image,
}

// ============================================================================
// Tracked GL state
// ============================================================================

/// The subset of mutable context state the backend routes through one place
/// so redundant changes can be dropped and teardown stays symmetric.
pub struct GlState {
    gls_bits: u64,
    current_tmu: Option<u32>,
    face_culling: Option<CullType>,
    pub current_space_id: Option<u32>,
    pub current_scissor: ScreenRect,
}

impl Default for GlState {
    fn default() -> Self {
        Self {
            // force the first set_state to issue everything
            gls_bits: u64::MAX,
            current_tmu: None,
            face_culling: None,
            current_space_id: None,
            current_scissor: ScreenRect::default(),
        }
    }
}

impl GlState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues the driver calls needed to move from the previous state word
    /// to `bits`.
    pub fn set_state<G: Qgl + ?Sized>(&mut self, gl: &mut G, bits: u64) {
        let diff = bits ^ self.gls_bits;
        if diff == 0 {
            return;
        }

        if diff & (GLS_SRCBLEND_BITS | GLS_DSTBLEND_BITS) != 0 {
            let src = match bits & GLS_SRCBLEND_BITS {
                GLS_SRCBLEND_ZERO => GL_ZERO,
                GLS_SRCBLEND_DST_COLOR => GL_DST_COLOR,
                GLS_SRCBLEND_ONE_MINUS_DST_COLOR => GL_ONE_MINUS_DST_COLOR,
                GLS_SRCBLEND_SRC_ALPHA => GL_SRC_ALPHA,
                GLS_SRCBLEND_ONE_MINUS_SRC_ALPHA => GL_ONE_MINUS_SRC_ALPHA,
                GLS_SRCBLEND_DST_ALPHA => GL_DST_ALPHA,
                GLS_SRCBLEND_ONE_MINUS_DST_ALPHA => GL_ONE_MINUS_DST_ALPHA,
                GLS_SRCBLEND_ALPHA_SATURATE => GL_SRC_ALPHA_SATURATE,
                _ => GL_ONE,
            };
            let dst = match bits & GLS_DSTBLEND_BITS {
                GLS_DSTBLEND_ONE => GL_ONE,
                GLS_DSTBLEND_SRC_COLOR => GL_SRC_COLOR,
                GLS_DSTBLEND_ONE_MINUS_SRC_COLOR => GL_ONE_MINUS_SRC_COLOR,
                GLS_DSTBLEND_SRC_ALPHA => GL_SRC_ALPHA,
                GLS_DSTBLEND_ONE_MINUS_SRC_ALPHA => GL_ONE_MINUS_SRC_ALPHA,
                GLS_DSTBLEND_DST_ALPHA => GL_DST_ALPHA,
                GLS_DSTBLEND_ONE_MINUS_DST_ALPHA => GL_ONE_MINUS_DST_ALPHA,
                _ => GL_ZERO,
            };
            gl.blend_func(src, dst);
        }

        if diff & GLS_DEPTHFUNC_BITS != 0 {
            let func = match bits & GLS_DEPTHFUNC_BITS {
                GLS_DEPTHFUNC_EQUAL => GL_EQUAL,
                GLS_DEPTHFUNC_ALWAYS => GL_ALWAYS,
                _ => GL_LEQUAL,
            };
            gl.depth_func(func);
        }

        if diff & GLS_DEPTHMASK != 0 {
            gl.depth_mask(bits & GLS_DEPTHMASK == 0);
        }

        self.gls_bits = bits;
    }

    /// Switches the active texture unit if it isn't already current.
    pub fn select_texture<G: Qgl + ?Sized>(&mut self, gl: &mut G, unit: u32) {
        if self.current_tmu == Some(unit) {
            return;
        }
        self.current_tmu = Some(unit);
        gl.active_texture(unit);
    }

    /// Forgets the cached unit and re-selects unit 0 unconditionally.
    pub fn reset_texture<G: Qgl + ?Sized>(&mut self, gl: &mut G) {
        self.current_tmu = None;
        self.select_texture(gl, 0);
    }

    /// Face culling with redundant-change suppression.
    pub fn cull<G: Qgl + ?Sized>(&mut self, gl: &mut G, cull: CullType) {
        if self.face_culling == Some(cull) {
            return;
        }
        match cull {
            CullType::TwoSided => gl.disable(GL_CULL_FACE),
            CullType::FrontSided => {
                if self.face_culling.is_none() || self.face_culling == Some(CullType::TwoSided) {
                    gl.enable(GL_CULL_FACE);
                }
                gl.cull_face(GL_BACK);
            }
            CullType::BackSided => {
                if self.face_culling.is_none() || self.face_culling == Some(CullType::TwoSided) {
                    gl.enable(GL_CULL_FACE);
                }
                gl.cull_face(GL_FRONT);
            }
        }
        self.face_culling = Some(cull);
    }
}

// ============================================================================
// Render configuration and counters
// ============================================================================

/// Snapshot of the renderer cvars consumed per frame.
#[derive(Clone, Copy, Debug)]
pub struct RenderConfig {
    pub use_scissor: bool,
    pub skip_translucent: bool,
    pub skip_new_ambient: bool,
    pub image_round_down: bool,
    pub offset_factor: f32,
    pub offset_units: f32,
    pub over_bright: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            use_scissor: true,
            skip_translucent: false,
            skip_new_ambient: false,
            image_round_down: true,
            offset_factor: -1.0,
            offset_units: -2.0,
            over_bright: 1.0,
        }
    }
}

impl RenderConfig {
    /// Registers the renderer cvars with their defaults.
    pub fn register_cvars(cvars: &mut CvarContext) {
        cvars.get_or_create("r_useScissor", "1");
        cvars.get_or_create("r_skipTranslucent", "0");
        cvars.get_or_create("r_skipNewAmbient", "0");
        cvars.get_or_create("image_roundDown", "1");
        cvars.get_or_create("r_offsetFactor", "-1");
        cvars.get_or_create("r_offsetUnits", "-2");
        cvars.get_or_create("r_overBright", "1");
    }

    pub fn from_cvars(cvars: &CvarContext) -> Self {
        Self {
            use_scissor: cvars.variable_value("r_useScissor") != 0.0,
            skip_translucent: cvars.variable_value("r_skipTranslucent") != 0.0,
            skip_new_ambient: cvars.variable_value("r_skipNewAmbient") != 0.0,
            image_round_down: cvars.variable_value("image_roundDown") != 0.0,
            offset_factor: cvars.variable_value("r_offsetFactor"),
            offset_units: cvars.variable_value("r_offsetUnits"),
            over_bright: cvars.variable_value("r_overBright").max(1.0),
        }
    }
}

/// Per-frame draw statistics.
#[derive(Clone, Copy, Debug, Default)]
pub struct PerfCounters {
    pub draw_calls: u32,
    pub draw_indexes: u32,
}

impl PerfCounters {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
