// gl_program.rs -- GLSL program registry
//
// One source blob per program serves both stages: the compiler injects a
// version directive plus a stage macro ahead of the user text, so the blob
// selects its half with #ifdef. Compiles fail open, a program that stops
// compiling keeps its last working handle.

use std::collections::HashMap;

use myd3_common::common::{com_error, ERR_FATAL};
use myd3_common::files::FsContext;

use crate::qgl::{Qgl, ShaderStage};

/// No program requested.
pub const PROG_NONE: i32 = -1;

// built-in program identities
pub const GLPROG_INTERACTION: i32 = 1;
pub const GLPROG_DEPTH_PASS: i32 = 2;
pub const GLPROG_UNLIT_PASS: i32 = 3;
/// First identity handed to material-referenced programs.
pub const GLPROG_USER: i32 = 40;

pub const MAX_GLPROGS: usize = 256;

const PROG_DIR: &str = "glprogs";

// ============================================================================
// Uniform slots
//
// The closed set of named inputs a program may reference. Each program
// resolves every slot at link time; absent slots hold -1 and uploads to
// them are silently skipped.
// ============================================================================

macro_rules! uniform_enum {
    ($vis:vis enum $name:ident { $($variant:ident => $glsl:literal),+ $(,)? }) => {
        #[derive(Clone, Copy, PartialEq, Eq, Debug)]
        #[repr(usize)]
        $vis enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];
            pub const COUNT: usize = $name::ALL.len();

            pub fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $glsl),+
                }
            }
        }
    };
}

uniform_enum! {
    pub enum VertexUniform {
        Mvp => "gMVP",
        Model => "gModel",
        LightOrigin => "gLightOrigin",
        ViewOrigin => "gViewOrigin",
        LightProjectS => "gLightProject_S",
        LightProjectT => "gLightProject_T",
        LightProjectQ => "gLightProject_Q",
        LightFalloffS => "gLightFalloff_S",
        BumpMatrixS => "gBumpMatrix_S",
        BumpMatrixT => "gBumpMatrix_T",
        DiffuseMatrixS => "gDiffuseMatrix_S",
        DiffuseMatrixT => "gDiffuseMatrix_T",
        SpecularMatrixS => "gSpecularMatrix_S",
        SpecularMatrixT => "gSpecularMatrix_T",
        ColorMod => "gColorMod",
        ColorAdd => "gColorAdd",
        VertexParm0 => "gVertexParm0",
        VertexParm1 => "gVertexParm1",
        VertexParm2 => "gVertexParm2",
        VertexParm3 => "gVertexParm3",
    }
}

uniform_enum! {
    pub enum FragmentUniform {
        TexCubeMap => "gTexCubeMap",
        TexBumpMap => "gTexBumpMap",
        TexLightFalloff => "gTexLightFalloff",
        TexLight => "gTexLight",
        TexDiffuse => "gTexDiffuse",
        TexSpecular => "gTexSpecular",
        TexSpecularLut => "gTexSpecularLUT",
        DiffuseModifier => "gDiffuseModifier",
        SpecularModifier => "gSpecularModifier",
        LocalLightOrigin => "gLocalLightOrigin",
        LocalViewOrigin => "gLocalViewOrigin",
        FragmentMap0 => "gFragmentMap0",
        FragmentMap1 => "gFragmentMap1",
        FragmentMap2 => "gFragmentMap2",
        FragmentMap3 => "gFragmentMap3",
        ScreenCorrectionFactor => "gScreenCorrectionFactor",
        WindowCoord => "gWindowCoord",
    }
}

impl VertexUniform {
    /// The i-th custom vector parameter slot.
    pub fn vertex_parm(i: usize) -> VertexUniform {
        VertexUniform::ALL[VertexUniform::VertexParm0 as usize + i]
    }
}

impl FragmentUniform {
    /// The i-th custom image sampler slot.
    pub fn fragment_map(i: usize) -> FragmentUniform {
        FragmentUniform::ALL[FragmentUniform::FragmentMap0 as usize + i]
    }
}

// ============================================================================
// Registry
// ============================================================================

/// One registered program. `handle` is 0 until the first successful link.
#[derive(Clone, Debug)]
pub struct GlslProgram {
    pub ident: i32,
    /// Source file name under the program directory.
    pub name: String,
    pub handle: u32,
    vertex_uniforms: [i32; VertexUniform::COUNT],
    fragment_uniforms: [i32; FragmentUniform::COUNT],
}

impl GlslProgram {
    fn new(ident: i32, name: &str) -> Self {
        Self {
            ident,
            name: name.to_string(),
            handle: 0,
            vertex_uniforms: [-1; VertexUniform::COUNT],
            fragment_uniforms: [-1; FragmentUniform::COUNT],
        }
    }

    /// Resolved location of a vertex uniform, -1 when absent.
    pub fn vu(&self, u: VertexUniform) -> i32 {
        self.vertex_uniforms[u as usize]
    }

    /// Resolved location of a fragment uniform, -1 when absent.
    pub fn fu(&self, u: FragmentUniform) -> i32 {
        self.fragment_uniforms[u as usize]
    }
}

fn name_stem(name: &str) -> String {
    let stem = match name.rfind('.') {
        Some(dot) => &name[..dot],
        None => name,
    };
    stem.to_ascii_lowercase()
}

/// Owns every compiled program and the name/identity indexes over them.
pub struct ProgramCache {
    progs: Vec<GlslProgram>,
    by_name: HashMap<String, usize>,
    by_ident: HashMap<i32, usize>,
    next_user_ident: i32,
}

impl Default for ProgramCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramCache {
    /// Creates the registry with the built-in programs registered but not
    /// yet compiled; call [`ProgramCache::reload_all`] once a context is up.
    pub fn new() -> Self {
        let mut cache = Self {
            progs: Vec::new(),
            by_name: HashMap::new(),
            by_ident: HashMap::new(),
            next_user_ident: GLPROG_USER,
        };
        cache.register(GLPROG_INTERACTION, "interaction.glsl");
        cache.register(GLPROG_DEPTH_PASS, "depth_pass.glsl");
        cache.register(GLPROG_UNLIT_PASS, "unlit_pass.glsl");
        cache
    }

    fn register(&mut self, ident: i32, name: &str) -> usize {
        if self.progs.len() >= MAX_GLPROGS {
            com_error(ERR_FATAL, &format!("program registry full on {}", name));
        }
        let index = self.progs.len();
        self.progs.push(GlslProgram::new(ident, name));
        self.by_name.insert(name_stem(name), index);
        self.by_ident.insert(ident, index);
        index
    }

    pub fn prog(&self, index: usize) -> &GlslProgram {
        &self.progs[index]
    }

    pub fn len(&self) -> usize {
        self.progs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.progs.is_empty()
    }

    /// Compiles and links one registry entry from its source file.
    ///
    /// Any failure leaves the entry untouched, so a previously working
    /// handle keeps rendering. The old handle is destroyed only after the
    /// replacement links.
    pub fn load_program<G: Qgl + ?Sized>(&mut self, gl: &mut G, fs: &FsContext, index: usize) {
        let prog = &mut self.progs[index];
        let path = format!("{}/{}", PROG_DIR, prog.name);
        let Some(raw) = fs.load_file(&path) else {
            log::warn!("couldn't load {}", path);
            return;
        };
        let source = String::from_utf8_lossy(&raw);

        let Some(vertex) = compile_stage(gl, ShaderStage::Vertex, &prog.name, &source) else {
            return;
        };
        let Some(fragment) = compile_stage(gl, ShaderStage::Fragment, &prog.name, &source) else {
            gl.delete_shader(vertex);
            return;
        };

        let program = gl.create_program();
        gl.attach_shader(program, vertex);
        gl.attach_shader(program, fragment);
        let linked = gl.link_program(program);
        let link_log = gl.program_info_log(program);
        if !link_log.is_empty() {
            log::warn!("{} link: {}", prog.name, link_log);
        }
        gl.delete_shader(vertex);
        gl.delete_shader(fragment);
        if !linked {
            gl.delete_program(program);
            return;
        }

        if prog.handle != 0 {
            gl.delete_program(prog.handle);
        }
        prog.handle = program;

        for u in VertexUniform::ALL {
            prog.vertex_uniforms[*u as usize] = gl.uniform_location(program, u.name());
        }
        for u in FragmentUniform::ALL {
            prog.fragment_uniforms[*u as usize] = gl.uniform_location(program, u.name());
        }
        log::info!("loaded program {}", prog.name);
    }

    /// Returns the stable identity for a program name, registering and
    /// compiling it on first sight. Lookup is case-insensitive and ignores
    /// any extension. Registry exhaustion is a content error and fatal.
    pub fn find_or_register<G: Qgl + ?Sized>(
        &mut self,
        gl: &mut G,
        fs: &FsContext,
        name: &str,
    ) -> i32 {
        let stem = name_stem(name);
        if let Some(&index) = self.by_name.get(&stem) {
            return self.progs[index].ident;
        }

        let ident = self.next_user_ident;
        self.next_user_ident += 1;
        let index = self.register(ident, &format!("{}.glsl", stem));
        self.load_program(gl, fs, index);
        ident
    }

    /// Binds the program for `ident` and returns its registry slot, used to
    /// index the uniform tables for the draws that follow. Unknown or
    /// negative identities, and entries that never linked, bind none.
    pub fn bind<G: Qgl + ?Sized>(&self, gl: &mut G, ident: i32) -> Option<usize> {
        if ident < 0 {
            gl.use_program(0);
            return None;
        }
        match self.by_ident.get(&ident) {
            Some(&index) if self.progs[index].handle != 0 => {
                gl.use_program(self.progs[index].handle);
                Some(index)
            }
            _ => {
                gl.use_program(0);
                None
            }
        }
    }

    /// Recompiles every registered program in registration order. Entries
    /// fail or succeed independently.
    pub fn reload_all<G: Qgl + ?Sized>(&mut self, gl: &mut G, fs: &FsContext) {
        log::info!("reloading glsl programs");
        for index in 0..self.progs.len() {
            self.load_program(gl, fs, index);
        }
    }
}

fn compile_stage<G: Qgl + ?Sized>(
    gl: &mut G,
    stage: ShaderStage,
    name: &str,
    source: &str,
) -> Option<u32> {
    let define = match stage {
        ShaderStage::Vertex => "#define VERTEX_SHADER\n",
        ShaderStage::Fragment => "#define FRAGMENT_SHADER\n",
    };
    let shader = gl.create_shader(stage);
    gl.shader_source(shader, &["#version 330\n", define, source]);
    let ok = gl.compile_shader(shader);
    let info = gl.shader_info_log(shader);
    if !info.is_empty() {
        log::warn!("{} {:?}: {}", name, stage, info);
    }
    if !ok {
        gl.delete_shader(shader);
        return None;
    }
    Some(shader)
}
