// gl_draw.rs -- per-frame draw orchestration
//
// Three externally ordered passes over the view: the lit interaction pass
// (per light: stencil shadows interleaved with additive lit surfaces), the
// depth pre-pass, and the ambient shader-stage pass. The GPU context is
// shared mutable state, so every pass that enables something disables it
// again on every exit path.

use std::mem::{offset_of, size_of};

use myd3_common::files::FsContext;
use myd3_common::q_shared::{global_plane_to_local, mat4_mul, Mat4, Vec4};

use crate::gl_image::ceil_power_of_two;
use crate::gl_local::*;
use crate::gl_program::{
    FragmentUniform, GlslProgram, ProgramCache, VertexUniform, GLPROG_DEPTH_PASS,
    GLPROG_INTERACTION, GLPROG_UNLIT_PASS,
};
use crate::qgl::*;

/// Geometry buffer manager seam: resolves a cache handle to the byte offset
/// of its vertex block in the currently bound vertex buffer.
pub trait VertexCache {
    fn position(&self, handle: VertCacheHandle) -> usize;
}

/// Shadow and interaction fan-out seam. The orchestrator owns pass ordering
/// and GPU state; this collaborator owns the shadow volume algorithm and the
/// expansion of one surface into per-layer interactions.
pub trait InteractionSource<G: Qgl> {
    /// Renders stencil shadow volumes for `shadows` (may be empty).
    fn stencil_shadow_pass(&mut self, gl: &mut G, shadows: &[DrawSurf]);

    /// Expands `surf` under `light` into zero or more resolved interactions,
    /// invoking `draw` once per layer. A surface with several interaction
    /// layers is drawn several times with different colors and images.
    fn for_each_interaction(
        &mut self,
        surf: &DrawSurf,
        light: &ViewLight,
        draw: &mut dyn FnMut(&DrawInteraction),
    );
}

const STENCIL_REF: i32 = 128;
const STENCIL_MASK: u32 = 255;

fn set_uniform1i<G: Qgl + ?Sized>(gl: &mut G, loc: i32, value: i32) {
    if loc >= 0 {
        gl.uniform1i(loc, value);
    }
}

fn set_uniform_vec4<G: Qgl + ?Sized>(gl: &mut G, loc: i32, v: &Vec4) {
    if loc >= 0 {
        gl.uniform4fv(loc, v);
    }
}

fn set_uniform_mat4<G: Qgl + ?Sized>(gl: &mut G, loc: i32, m: &Mat4) {
    if loc >= 0 {
        gl.uniform_matrix4fv(loc, m);
    }
}

fn draw_elements_with_counters<G: Qgl + ?Sized>(
    gl: &mut G,
    pc: &mut PerfCounters,
    tri: &SurfaceTriangles,
) {
    gl.draw_elements(tri.num_indexes, tri.index_offset);
    pc.draw_calls += 1;
    pc.draw_indexes += tri.num_indexes as u32;
}

// the six fixed attribute pointers of the full DrawVert layout
fn set_draw_vert_pointers<G: Qgl + ?Sized>(gl: &mut G, base: usize) {
    let stride = size_of::<DrawVert>() as i32;
    gl.vertex_attrib_pointer(VA_POS, 3, GL_FLOAT, false, stride, base + offset_of!(DrawVert, xyz));
    gl.vertex_attrib_pointer(VA_UV, 2, GL_FLOAT, false, stride, base + offset_of!(DrawVert, st));
    gl.vertex_attrib_pointer(
        VA_NORMAL,
        3,
        GL_FLOAT,
        false,
        stride,
        base + offset_of!(DrawVert, normal),
    );
    gl.vertex_attrib_pointer(
        VA_TANGENT,
        3,
        GL_FLOAT,
        false,
        stride,
        base + offset_of!(DrawVert, tangents),
    );
    gl.vertex_attrib_pointer(
        VA_BINORMAL,
        3,
        GL_FLOAT,
        false,
        stride,
        base + offset_of!(DrawVert, tangents) + size_of::<[f32; 3]>(),
    );
    gl.vertex_attrib_pointer(
        VA_COLOR,
        4,
        GL_UNSIGNED_BYTE,
        true,
        stride,
        base + offset_of!(DrawVert, color),
    );
}

const ALL_ATTRIBS: [u32; 6] = [VA_POS, VA_UV, VA_NORMAL, VA_TANGENT, VA_BINORMAL, VA_COLOR];

fn scissor_to_viewport<G: Qgl + ?Sized>(gl: &mut G, view: &ViewDef, rect: &ScreenRect) {
    gl.scissor(
        view.viewport.x1 + rect.x1,
        view.viewport.y1 + rect.y1,
        rect.width(),
        rect.height(),
    );
}

/// The rendering backend. Owns the driver seam, the program registry and
/// the tracked GPU state, and executes the per-view pass sequence.
pub struct BackEnd<G: Qgl> {
    pub gl: G,
    pub programs: ProgramCache,
    pub config: RenderConfig,
    pub images: BuiltinImages,
    pub state: GlState,
    pub pc: PerfCounters,
    depth_func: u64,
}

impl<G: Qgl> BackEnd<G> {
    pub fn new(gl: G, images: BuiltinImages) -> Self {
        Self {
            gl,
            programs: ProgramCache::new(),
            config: RenderConfig::default(),
            images,
            state: GlState::new(),
            pc: PerfCounters::default(),
            depth_func: GLS_DEPTHFUNC_LESS,
        }
    }

    /// Recompiles every registered program; the handler behind the
    /// operator-facing reload command.
    pub fn reload_glsl_programs(&mut self, fs: &FsContext) {
        self.programs.reload_all(&mut self.gl, fs);
    }

    // ========================================================================
    // Interaction pass
    // ========================================================================

    /// Adds and shadows every light in the view. Per light: global shadows,
    /// local interactions, local shadows, global interactions; that pairing
    /// matches the shadow volume algorithm and is not reorderable.
    /// Translucent interactions come last with an equal depth test, they
    /// were depth-written by the opaque pass already.
    pub fn draw_interactions<V, S>(&mut self, view: &ViewDef, cache: &V, source: &mut S)
    where
        V: VertexCache,
        S: InteractionSource<G>,
    {
        self.state.select_texture(&mut self.gl, 0);

        for light in &view.lights {
            // fog and blend lights are handled by a separate pass
            if light.light_material.fog_light || light.light_material.blend_light {
                continue;
            }
            if !light.has_interactions() {
                continue;
            }

            if !light.global_shadows.is_empty() || !light.local_shadows.is_empty() {
                self.state.current_scissor = light.scissor;
                if self.config.use_scissor {
                    scissor_to_viewport(&mut self.gl, view, &light.scissor);
                }
                self.gl.clear_stencil();
            } else {
                // no shadows, so no need to read or write the stencil buffer
                self.gl.stencil_func(GL_ALWAYS, STENCIL_REF, STENCIL_MASK);
            }

            source.stencil_shadow_pass(&mut self.gl, &light.global_shadows);
            self.create_draw_interactions(light, &light.local_interactions, cache, source);
            source.stencil_shadow_pass(&mut self.gl, &light.local_shadows);
            self.create_draw_interactions(light, &light.global_interactions, cache, source);

            if self.config.skip_translucent {
                continue;
            }

            // translucent surfaces never get stencil shadowed
            self.gl.stencil_func(GL_ALWAYS, STENCIL_REF, STENCIL_MASK);

            self.depth_func = GLS_DEPTHFUNC_EQUAL;
            self.create_draw_interactions(light, &light.translucent_interactions, cache, source);
            self.depth_func = GLS_DEPTHFUNC_LESS;
        }

        self.gl.stencil_func(GL_ALWAYS, STENCIL_REF, STENCIL_MASK);
        self.state.select_texture(&mut self.gl, 0);
    }

    /// Draws one interaction surface list with the built-in interaction
    /// program. Light-constant state (samplers, normalization cube map,
    /// specular table, attribute arrays) is set once, then each surface
    /// fans out into per-layer draws.
    pub fn create_draw_interactions<V, S>(
        &mut self,
        light: &ViewLight,
        surfs: &[DrawSurf],
        cache: &V,
        source: &mut S,
    ) where
        V: VertexCache,
        S: InteractionSource<G>,
    {
        if surfs.is_empty() {
            return;
        }

        let Self {
            gl,
            programs,
            images,
            state,
            pc,
            depth_func,
            ..
        } = self;

        state.set_state(gl, GLS_SRCBLEND_ONE | GLS_DSTBLEND_ONE | GLS_DEPTHMASK | *depth_func);

        let Some(prog_index) = programs.bind(gl, GLPROG_INTERACTION) else {
            return;
        };
        let prog = programs.prog(prog_index);

        // samplers bind to their own uniform index, assigned once per light
        for u in FragmentUniform::ALL {
            if *u as usize <= FragmentUniform::TexSpecularLut as usize {
                set_uniform1i(gl, prog.fu(*u), *u as i32);
            }
        }

        for attrib in ALL_ATTRIBS {
            gl.enable_vertex_attrib_array(attrib);
        }

        // texture 0 normalizes the vector towards the light
        state.select_texture(gl, FragmentUniform::TexCubeMap as u32);
        if light.light_material.ambient_light {
            images.ambient_normal_map.bind(gl);
        } else {
            images.normal_cube_map.bind(gl);
        }

        state.select_texture(gl, FragmentUniform::TexSpecularLut as u32);
        images.specular_table.bind(gl);

        for surf in surfs {
            let Some(handle) = surf.geo.ambient_cache else {
                log::warn!("create_draw_interactions: no ambient cache on {}", surf.material.name);
                continue;
            };
            set_draw_vert_pointers(gl, cache.position(handle));

            source.for_each_interaction(surf, light, &mut |din| {
                draw_interaction_inner(gl, state, pc, prog, din);
            });
        }

        for attrib in ALL_ATTRIBS {
            gl.disable_vertex_attrib_array(attrib);
        }

        for u in [
            FragmentUniform::TexSpecularLut,
            FragmentUniform::TexSpecular,
            FragmentUniform::TexDiffuse,
            FragmentUniform::TexLight,
            FragmentUniform::TexLightFalloff,
            FragmentUniform::TexBumpMap,
        ] {
            state.select_texture(gl, u as u32);
            Image::bind_null(gl);
        }

        state.reset_texture(gl);
        gl.use_program(0);
    }

    /// Uploads the per-draw uniforms and textures for one resolved
    /// interaction, then issues the draw. The interaction program must be
    /// bound at `prog_index`.
    pub fn draw_interaction(&mut self, prog_index: usize, din: &DrawInteraction) {
        let Self {
            gl,
            programs,
            state,
            pc,
            ..
        } = self;
        draw_interaction_inner(gl, state, pc, programs.prog(prog_index), din);
    }

    // ========================================================================
    // Depth pre-pass
    // ========================================================================

    /// Lays down depth for the opaque and perforated surfaces in `surfs`.
    pub fn fill_depth_buffer<V: VertexCache>(
        &mut self,
        view: &ViewDef,
        cache: &V,
        surfs: &[DrawSurf],
    ) {
        self.state.current_space_id = None;
        self.state.set_state(&mut self.gl, GLS_DEPTHFUNC_LESS);
        for surf in surfs {
            self.fill_depth_buffer_surf(view, cache, surf);
        }
    }

    fn fill_depth_buffer_surf<V: VertexCache>(
        &mut self,
        view: &ViewDef,
        cache: &V,
        surf: &DrawSurf,
    ) {
        let Self {
            gl,
            programs,
            config,
            images,
            state,
            pc,
            ..
        } = self;

        let material = &surf.material;
        let tri = &surf.geo;

        // mirror views clip against a plane expressed in each model's space
        if state.current_space_id != Some(surf.space.id) {
            if let Some(clip) = view.clip_planes.first() {
                state.select_texture(gl, 1);
                let mut plane = global_plane_to_local(&surf.space.model_matrix, clip);
                plane[3] += 0.5; // the notch is in the middle
                gl.tex_gen_plane(&plane);
                state.select_texture(gl, 0);
            }
            state.current_space_id = Some(surf.space.id);
        }

        if !material.is_drawn() {
            return;
        }

        // some deforms may disable themselves by setting num_indexes to 0
        if tri.num_indexes == 0 {
            return;
        }

        // translucent surfaces neither write nor test depth
        if material.coverage == MaterialCoverage::Translucent {
            return;
        }

        let Some(handle) = tri.ambient_cache else {
            log::warn!("fill_depth_buffer: no ambient cache on {}", material.name);
            return;
        };

        let regs = &surf.shader_registers;

        // if every stage is conditioned off, don't do anything
        if material
            .stages
            .iter()
            .all(|s| regs[s.condition_register] == 0.0)
        {
            return;
        }

        let Some(prog_index) = programs.bind(gl, GLPROG_DEPTH_PASS) else {
            return;
        };
        let prog = programs.prog(prog_index);

        let mvp = mat4_mul(&view.projection_matrix, &surf.space.model_view_matrix);
        set_uniform_mat4(gl, prog.vu(VertexUniform::Mvp), &mvp);
        set_uniform1i(gl, prog.fu(FragmentUniform::TexDiffuse), 0);

        if material.test_flag(MaterialFlags::POLYGON_OFFSET) {
            gl.enable(GL_POLYGON_OFFSET_FILL);
            gl.polygon_offset(config.offset_factor, config.offset_units * material.polygon_offset);
        }

        // subviews down-modulate what is already in the color buffer
        let mut color: Vec4 = if material.sort == MaterialSort::Subview {
            state.set_state(gl, GLS_SRCBLEND_DST_COLOR | GLS_DSTBLEND_ZERO | GLS_DEPTHFUNC_LESS);
            let c = 1.0 / config.over_bright;
            [c, c, c, 1.0]
        } else {
            [0.0, 0.0, 0.0, 1.0]
        };

        gl.enable_vertex_attrib_array(VA_POS);
        gl.enable_vertex_attrib_array(VA_UV);

        let base = cache.position(handle);
        let stride = size_of::<DrawVert>() as i32;
        gl.vertex_attrib_pointer(VA_POS, 3, GL_FLOAT, false, stride, base + offset_of!(DrawVert, xyz));
        gl.vertex_attrib_pointer(VA_UV, 2, GL_FLOAT, false, stride, base + offset_of!(DrawVert, st));

        let mut draw_solid = material.coverage == MaterialCoverage::Opaque;

        if material.coverage == MaterialCoverage::Perforated {
            // perforated surfaces may have multiple alpha tested stages
            let mut did_draw = false;

            gl.enable(GL_ALPHA_TEST);
            for stage in &material.stages {
                if !stage.has_alpha_test {
                    continue;
                }
                if regs[stage.condition_register] == 0.0 {
                    continue;
                }

                // skip the entire stage if alpha would be black
                color[3] = regs[stage.color_registers[3]];
                if color[3] <= 0.0 {
                    continue;
                }
                did_draw = true;

                set_uniform_vec4(gl, prog.fu(FragmentUniform::DiffuseModifier), &color);
                gl.alpha_func(GL_GREATER, regs[stage.alpha_test_register]);

                if let Some(texture) = &stage.texture {
                    texture.bind(gl);
                }

                draw_elements_with_counters(gl, pc, tri);
            }
            gl.disable(GL_ALPHA_TEST);

            // if no alpha tested stage drew anything, fall back to opaque
            if !did_draw {
                color[3] = 1.0;
                draw_solid = true;
            }
        }

        if draw_solid {
            set_uniform_vec4(gl, prog.fu(FragmentUniform::DiffuseModifier), &color);
            images.white.bind(gl);
            draw_elements_with_counters(gl, pc, tri);
        }

        gl.use_program(0);
        gl.disable_vertex_attrib_array(VA_POS);
        gl.disable_vertex_attrib_array(VA_UV);

        if material.test_flag(MaterialFlags::POLYGON_OFFSET) {
            gl.disable(GL_POLYGON_OFFSET_FILL);
        }

        if material.sort == MaterialSort::Subview {
            state.set_state(gl, GLS_DEPTHFUNC_LESS);
        }
    }

    // ========================================================================
    // Ambient shader-stage pass
    // ========================================================================

    /// Draws the ambient (unlit) stages of every surface in `surfs`. Also
    /// used for generated 2D rendering.
    pub fn render_shader_passes<V: VertexCache>(
        &mut self,
        view: &ViewDef,
        cache: &V,
        surfs: &[DrawSurf],
    ) {
        self.state.current_space_id = None;
        for surf in surfs {
            self.render_shader_passes_surf(view, cache, surf);
        }
    }

    fn render_shader_passes_surf<V: VertexCache>(
        &mut self,
        view: &ViewDef,
        cache: &V,
        surf: &DrawSurf,
    ) {
        let Self {
            gl,
            programs,
            config,
            state,
            pc,
            ..
        } = self;

        let material = &surf.material;
        let tri = &surf.geo;

        if !material.has_ambient() {
            return;
        }
        if material.portal_sky {
            return;
        }

        let space_changed = state.current_space_id != Some(surf.space.id);

        if config.use_scissor && state.current_scissor != surf.scissor {
            state.current_scissor = surf.scissor;
            scissor_to_viewport(gl, view, &surf.scissor);
        }

        if tri.num_indexes == 0 {
            return;
        }
        let Some(handle) = tri.ambient_cache else {
            log::warn!("render_shader_passes: no ambient cache on {}", material.name);
            return;
        };

        let Some(prog_index) = programs.bind(gl, GLPROG_UNLIT_PASS) else {
            return;
        };

        let regs = &surf.shader_registers;

        state.cull(gl, material.cull);

        if material.test_flag(MaterialFlags::POLYGON_OFFSET) {
            gl.enable(GL_POLYGON_OFFSET_FILL);
            gl.polygon_offset(config.offset_factor, config.offset_units * material.polygon_offset);
        }

        if surf.space.weapon_depth_hack {
            gl.depth_range(0.0, 0.5);
        }

        for attrib in ALL_ATTRIBS {
            gl.enable_vertex_attrib_array(attrib);
        }
        set_draw_vert_pointers(gl, cache.position(handle));

        // decals and other coplanar models are pulled towards the viewer in
        // clip space so they win the depth test against the surface they sit on
        let mut projection = view.projection_matrix;
        projection[14] -= surf.space.model_depth_hack;
        let mvp = mat4_mul(&projection, &surf.space.model_view_matrix);
        let unlit = programs.prog(prog_index);
        // uniforms persist per program object, so the shared transform only
        // needs re-uploading when the space changed
        if space_changed {
            set_uniform_mat4(gl, unlit.vu(VertexUniform::Mvp), &mvp);
            state.current_space_id = Some(surf.space.id);
        }
        set_uniform1i(gl, unlit.fu(FragmentUniform::TexDiffuse), 0);

        for stage in &material.stages {
            if regs[stage.condition_register] == 0.0 {
                continue;
            }
            // skip the stages involved in lighting
            if stage.lighting != StageLighting::Ambient {
                continue;
            }
            let blend_bits = stage.draw_state_bits & (GLS_SRCBLEND_BITS | GLS_DSTBLEND_BITS);
            // (GL_ZERO, GL_ONE) stages exist only for alpha masks
            if blend_bits == (GLS_SRCBLEND_ZERO | GLS_DSTBLEND_ONE) {
                continue;
            }

            if let Some(new_stage) = &stage.new_stage {
                if config.skip_new_ambient {
                    continue;
                }
                render_new_stage(
                    gl, programs, state, pc, view, surf, regs, stage, new_stage, &mvp,
                );
                continue;
            }

            // old style stages modulate by nothing and add the stage color
            let color_add: Vec4 = [
                regs[stage.color_registers[0]],
                regs[stage.color_registers[1]],
                regs[stage.color_registers[2]],
                regs[stage.color_registers[3]],
            ];

            // skip the entire stage if an add would be black
            if blend_bits == (GLS_SRCBLEND_ONE | GLS_DSTBLEND_ONE)
                && color_add[0] <= 0.0
                && color_add[1] <= 0.0
                && color_add[2] <= 0.0
            {
                continue;
            }
            // skip the entire stage if a blend would be completely transparent
            if blend_bits == (GLS_SRCBLEND_SRC_ALPHA | GLS_DSTBLEND_ONE_MINUS_SRC_ALPHA)
                && color_add[3] <= 0.0
            {
                continue;
            }

            set_uniform_vec4(gl, unlit.vu(VertexUniform::ColorMod), &[0.0, 0.0, 0.0, 0.0]);
            set_uniform_vec4(gl, unlit.vu(VertexUniform::ColorAdd), &color_add);

            if let Some(texture) = &stage.texture {
                texture.bind(gl);
            }

            state.set_state(gl, stage.draw_state_bits);
            draw_elements_with_counters(gl, pc, tri);
        }

        if material.test_flag(MaterialFlags::POLYGON_OFFSET) {
            gl.disable(GL_POLYGON_OFFSET_FILL);
        }
        if surf.space.weapon_depth_hack {
            gl.depth_range(0.0, 1.0);
        }

        gl.use_program(0);
        for attrib in ALL_ATTRIBS {
            gl.disable_vertex_attrib_array(attrib);
        }
    }
}

fn draw_interaction_inner<G: Qgl + ?Sized>(
    gl: &mut G,
    state: &mut GlState,
    pc: &mut PerfCounters,
    prog: &GlslProgram,
    din: &DrawInteraction,
) {
    set_uniform_mat4(gl, prog.vu(VertexUniform::Mvp), &din.model_view_proj);

    set_uniform_vec4(gl, prog.vu(VertexUniform::LightOrigin), &din.local_light_origin);
    set_uniform_vec4(gl, prog.vu(VertexUniform::ViewOrigin), &din.local_view_origin);
    set_uniform_vec4(gl, prog.vu(VertexUniform::LightProjectS), &din.light_projection[0]);
    set_uniform_vec4(gl, prog.vu(VertexUniform::LightProjectT), &din.light_projection[1]);
    set_uniform_vec4(gl, prog.vu(VertexUniform::LightProjectQ), &din.light_projection[2]);
    set_uniform_vec4(gl, prog.vu(VertexUniform::LightFalloffS), &din.light_projection[3]);
    set_uniform_vec4(gl, prog.vu(VertexUniform::BumpMatrixS), &din.bump_matrix[0]);
    set_uniform_vec4(gl, prog.vu(VertexUniform::BumpMatrixT), &din.bump_matrix[1]);
    set_uniform_vec4(gl, prog.vu(VertexUniform::DiffuseMatrixS), &din.diffuse_matrix[0]);
    set_uniform_vec4(gl, prog.vu(VertexUniform::DiffuseMatrixT), &din.diffuse_matrix[1]);
    set_uniform_vec4(gl, prog.vu(VertexUniform::SpecularMatrixS), &din.specular_matrix[0]);
    set_uniform_vec4(gl, prog.vu(VertexUniform::SpecularMatrixT), &din.specular_matrix[1]);

    const ZERO: Vec4 = [0.0, 0.0, 0.0, 0.0];
    const ONE: Vec4 = [1.0, 1.0, 1.0, 1.0];
    const NEG_ONE: Vec4 = [-1.0, -1.0, -1.0, -1.0];

    let (color_mod, color_add) = match din.vertex_color {
        VertexColorMode::Ignore => (&ZERO, &ONE),
        VertexColorMode::Modulate => (&ONE, &ZERO),
        VertexColorMode::InverseModulate => (&NEG_ONE, &ONE),
    };
    set_uniform_vec4(gl, prog.vu(VertexUniform::ColorMod), color_mod);
    set_uniform_vec4(gl, prog.vu(VertexUniform::ColorAdd), color_add);

    set_uniform_vec4(gl, prog.fu(FragmentUniform::DiffuseModifier), &din.diffuse_color);
    set_uniform_vec4(gl, prog.fu(FragmentUniform::SpecularModifier), &din.specular_color);
    set_uniform_vec4(gl, prog.fu(FragmentUniform::LocalLightOrigin), &din.local_light_origin);
    set_uniform_vec4(gl, prog.fu(FragmentUniform::LocalViewOrigin), &din.local_view_origin);

    // five per-draw textures on their fixed units
    state.select_texture(gl, FragmentUniform::TexBumpMap as u32);
    din.bump_image.bind(gl);
    state.select_texture(gl, FragmentUniform::TexLightFalloff as u32);
    din.light_falloff_image.bind(gl);
    state.select_texture(gl, FragmentUniform::TexLight as u32);
    din.light_image.bind(gl);
    state.select_texture(gl, FragmentUniform::TexDiffuse as u32);
    din.diffuse_image.bind(gl);
    state.select_texture(gl, FragmentUniform::TexSpecular as u32);
    din.specular_image.bind(gl);

    draw_elements_with_counters(gl, pc, &din.surf.geo);
}

/// One custom-program ambient stage. The program switch invalidates the
/// shared uniforms, so the transform is re-uploaded; every image bound
/// above unit 0 is unbound again and the unlit program restored before the
/// next stage runs.
#[allow(clippy::too_many_arguments)]
fn render_new_stage<G: Qgl + ?Sized>(
    gl: &mut G,
    programs: &ProgramCache,
    state: &mut GlState,
    pc: &mut PerfCounters,
    view: &ViewDef,
    surf: &DrawSurf,
    regs: &[f32],
    stage: &Stage,
    new_stage: &NewStage,
    mvp: &Mat4,
) {
    let Some(prog_index) = programs.bind(gl, new_stage.program) else {
        return;
    };
    let prog = programs.prog(prog_index);

    set_uniform_mat4(gl, prog.vu(VertexUniform::Mvp), mvp);

    for (i, parm_regs) in new_stage.vertex_parms.iter().take(MAX_VERTEX_PARMS).enumerate() {
        let parm: Vec4 = [
            regs[parm_regs[0]],
            regs[parm_regs[1]],
            regs[parm_regs[2]],
            regs[parm_regs[3]],
        ];
        set_uniform_vec4(gl, prog.vu(VertexUniform::vertex_parm(i)), &parm);
    }

    for (i, image) in new_stage.images.iter().take(MAX_FRAGMENT_IMAGES).enumerate() {
        if let Some(image) = image {
            state.select_texture(gl, i as u32);
            image.bind(gl);
            set_uniform1i(gl, prog.fu(FragmentUniform::fragment_map(i)), i as i32);
        }
    }

    // post-process style programs sample the current render, which lives in
    // the power-of-two padded corner of its texture
    let w = view.viewport.width().max(1) as f32;
    let h = view.viewport.height().max(1) as f32;
    let pot_w = ceil_power_of_two(w as u32) as f32;
    let pot_h = ceil_power_of_two(h as u32) as f32;
    set_uniform_vec4(
        gl,
        prog.fu(FragmentUniform::ScreenCorrectionFactor),
        &[w / pot_w, h / pot_h, 1.0, 1.0],
    );
    set_uniform_vec4(
        gl,
        prog.fu(FragmentUniform::WindowCoord),
        &[1.0 / w, 1.0 / h, 0.0, 0.0],
    );

    state.set_state(gl, stage.draw_state_bits);
    draw_elements_with_counters(gl, pc, &surf.geo);

    for (i, image) in new_stage.images.iter().take(MAX_FRAGMENT_IMAGES).enumerate() {
        if i > 0 && image.is_some() {
            state.select_texture(gl, i as u32);
            Image::bind_null(gl);
        }
    }
    state.select_texture(gl, 0);

    programs.bind(gl, GLPROG_UNLIT_PASS);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gl_program::{GLPROG_INTERACTION, PROG_NONE};
    use crate::qgl::{TraceCall, TraceDriver};
    use myd3_common::files::FsContext;
    use myd3_common::q_shared::MAT4_IDENTITY;
    use std::rc::Rc;

    struct FixedCache;

    impl VertexCache for FixedCache {
        fn position(&self, handle: VertCacheHandle) -> usize {
            handle.0 as usize * size_of::<DrawVert>()
        }
    }

    #[derive(Clone, Copy, PartialEq, Debug)]
    enum Event {
        Shadows(usize),
        Interaction,
    }

    /// Records pass ordering and expands each surface into one interaction.
    #[derive(Default)]
    struct TestSource {
        events: Vec<Event>,
    }

    impl InteractionSource<TraceDriver> for TestSource {
        fn stencil_shadow_pass(&mut self, _gl: &mut TraceDriver, shadows: &[DrawSurf]) {
            if !shadows.is_empty() {
                self.events.push(Event::Shadows(shadows.len()));
            }
        }

        fn for_each_interaction(
            &mut self,
            surf: &DrawSurf,
            _light: &ViewLight,
            draw: &mut dyn FnMut(&DrawInteraction),
        ) {
            self.events.push(Event::Interaction);
            draw(&test_interaction(surf));
        }
    }

    fn test_interaction(surf: &DrawSurf) -> DrawInteraction<'_> {
        DrawInteraction {
            surf,
            model_view_proj: MAT4_IDENTITY,
            local_light_origin: [1.0, 2.0, 3.0, 1.0],
            local_view_origin: [4.0, 5.0, 6.0, 1.0],
            light_projection: [[0.0; 4]; 4],
            bump_matrix: [[0.0; 4]; 2],
            diffuse_matrix: [[0.0; 4]; 2],
            specular_matrix: [[0.0; 4]; 2],
            vertex_color: VertexColorMode::Ignore,
            diffuse_color: [1.0; 4],
            specular_color: [1.0; 4],
            bump_image: Image::new_2d(11),
            light_falloff_image: Image::new_2d(12),
            light_image: Image::new_2d(13),
            diffuse_image: Image::new_2d(14),
            specular_image: Image::new_2d(15),
        }
    }

    fn builtin_images() -> BuiltinImages {
        BuiltinImages {
            white: Image::new_2d(90),
            normal_cube_map: Image::new_cube(91),
            ambient_normal_map: Image::new_cube(92),
            specular_table: Image::new_2d(93),
        }
    }

    fn prog_ctx(tag: &str) -> FsContext {
        let dir = std::env::temp_dir().join(format!("myd3_draw_{}_{}", tag, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let ctx = FsContext::new(dir);
        for name in ["interaction.glsl", "depth_pass.glsl", "unlit_pass.glsl"] {
            ctx.write_file(&format!("glprogs/{}", name), b"void main() {}\n").unwrap();
        }
        ctx
    }

    fn test_backend(tag: &str) -> BackEnd<TraceDriver> {
        let ctx = prog_ctx(tag);
        let mut be = BackEnd::new(TraceDriver::new(), builtin_images());
        be.programs.reload_all(&mut be.gl, &ctx);
        be
    }

    fn ambient_stage(texnum: u32) -> Stage {
        Stage {
            condition_register: 1,
            color_registers: [1, 1, 1, 1],
            lighting: StageLighting::Ambient,
            draw_state_bits: GLS_SRCBLEND_ONE | GLS_DSTBLEND_ONE,
            texture: Some(Image::new_2d(texnum)),
            ..Stage::default()
        }
    }

    fn surf_with_material(material: Material) -> DrawSurf {
        DrawSurf {
            geo: SurfaceTriangles {
                num_indexes: 36,
                ambient_cache: Some(VertCacheHandle(2)),
                index_offset: 72,
            },
            space: SpaceTransform::default(),
            material: Rc::new(material),
            scissor: ScreenRect { x1: 0, y1: 0, x2: 639, y2: 479 },
            // register 0 is constant off, register 1 constant on
            shader_registers: vec![0.0, 1.0, 0.5, 0.25],
        }
    }

    fn lit_material() -> Material {
        Material {
            name: "lit".to_string(),
            stages: vec![ambient_stage(40)],
            ..Material::default()
        }
    }

    fn view_with_light(light: ViewLight) -> ViewDef {
        ViewDef {
            viewport: ScreenRect { x1: 0, y1: 0, x2: 639, y2: 479 },
            projection_matrix: MAT4_IDENTITY,
            clip_planes: Vec::new(),
            lights: vec![light],
        }
    }

    fn light_with(
        shadows: usize,
        interactions: usize,
        translucent: usize,
        material: Material,
    ) -> ViewLight {
        let surfs: Vec<DrawSurf> =
            (0..interactions).map(|_| surf_with_material(lit_material())).collect();
        ViewLight {
            light_material: Rc::new(material),
            scissor: ScreenRect { x1: 10, y1: 20, x2: 109, y2: 219 },
            global_shadows: (0..shadows).map(|_| surf_with_material(lit_material())).collect(),
            local_shadows: Vec::new(),
            local_interactions: surfs.clone(),
            global_interactions: surfs,
            translucent_interactions: (0..translucent)
                .map(|_| surf_with_material(lit_material()))
                .collect(),
        }
    }

    #[test]
    fn test_draw_interaction_vertex_color_modes() {
        let mut be = test_backend("vcolor");
        let idx = be.programs.bind(&mut be.gl, GLPROG_INTERACTION).unwrap();
        let handle = be.programs.prog(idx).handle;
        let mod_loc = be.gl.location(handle, "gColorMod");
        let add_loc = be.gl.location(handle, "gColorAdd");

        let surf = surf_with_material(lit_material());
        let mut din = test_interaction(&surf);
        din.vertex_color = VertexColorMode::Modulate;
        be.draw_interaction(idx, &din);
        din.vertex_color = VertexColorMode::InverseModulate;
        be.draw_interaction(idx, &din);

        assert_eq!(be.gl.vec4_uploads(mod_loc), vec![[1.0; 4], [-1.0; 4]]);
        assert_eq!(be.gl.vec4_uploads(add_loc), vec![[0.0; 4], [1.0; 4]]);
        assert_eq!(be.pc.draw_calls, 2);
        assert_eq!(be.pc.draw_indexes, 72);
    }

    #[test]
    fn test_create_draw_interactions_symmetric_teardown() {
        let mut be = test_backend("teardown");
        let light = light_with(0, 1, 0, Material::default());
        let mut source = TestSource::default();
        be.create_draw_interactions(&light, &light.local_interactions, &FixedCache, &mut source);

        let enables = be.gl.count(|c| matches!(c, TraceCall::EnableVertexAttribArray(_)));
        let disables = be.gl.count(|c| matches!(c, TraceCall::DisableVertexAttribArray(_)));
        assert_eq!(enables, 6);
        assert_eq!(disables, 6);
        // every used unit was unbound, then the program released
        assert_eq!(be.gl.count(|c| matches!(c, TraceCall::BindTexture(_, 0))), 6);
        assert_eq!(be.gl.calls.last(), Some(&TraceCall::UseProgram(0)));
        // standard light uses the directional normalization cube map
        assert!(be.gl.calls.contains(&TraceCall::BindTexture(GL_TEXTURE_CUBE_MAP, 91)));
    }

    #[test]
    fn test_create_draw_interactions_ambient_light_cube_map() {
        let mut be = test_backend("ambientcube");
        let light = light_with(
            0,
            1,
            0,
            Material {
                ambient_light: true,
                ..Material::default()
            },
        );
        let mut source = TestSource::default();
        be.create_draw_interactions(&light, &light.local_interactions, &FixedCache, &mut source);
        assert!(be.gl.calls.contains(&TraceCall::BindTexture(GL_TEXTURE_CUBE_MAP, 92)));
    }

    #[test]
    fn test_draw_interactions_orders_shadows_and_surfaces() {
        let mut be = test_backend("order");
        let mut light = light_with(2, 1, 1, Material::default());
        light.local_shadows = vec![surf_with_material(lit_material())];
        let view = view_with_light(light);
        let mut source = TestSource::default();
        be.draw_interactions(&view, &FixedCache, &mut source);

        assert_eq!(
            source.events,
            vec![
                Event::Shadows(2),
                Event::Interaction,
                Event::Shadows(1),
                Event::Interaction,
                Event::Interaction,
            ]
        );
        // shadowing light: scissored stencil clear, no pass-through func first
        assert!(be.gl.calls.contains(&TraceCall::ClearStencil));
        assert!(be.gl.calls.contains(&TraceCall::Scissor(10, 20, 100, 200)));
    }

    #[test]
    fn test_draw_interactions_translucent_depth_func() {
        let mut be = test_backend("transdepth");
        let view = view_with_light(light_with(0, 1, 1, Material::default()));
        let mut source = TestSource::default();
        be.draw_interactions(&view, &FixedCache, &mut source);

        // opaque interactions test less-than, translucent equal
        assert!(be.gl.calls.contains(&TraceCall::DepthFunc(GL_LEQUAL)));
        assert!(be.gl.calls.contains(&TraceCall::DepthFunc(GL_EQUAL)));
    }

    #[test]
    fn test_draw_interactions_skips_fog_blend_and_empty_lights() {
        let mut be = test_backend("skiplights");
        let mut lights = vec![
            light_with(1, 1, 0, Material { fog_light: true, ..Material::default() }),
            light_with(1, 1, 0, Material { blend_light: true, ..Material::default() }),
            light_with(1, 0, 0, Material::default()),
        ];
        // third light has shadows but no interactions at all
        lights[2].translucent_interactions.clear();
        let mut view = view_with_light(lights.remove(0));
        view.lights.extend(lights);

        let mut source = TestSource::default();
        be.draw_interactions(&view, &FixedCache, &mut source);
        assert!(source.events.is_empty());
        assert_eq!(be.pc.draw_calls, 0);
    }

    #[test]
    fn test_draw_interactions_no_shadows_uses_passthrough_stencil() {
        let mut be = test_backend("noshadow");
        let view = view_with_light(light_with(0, 1, 0, Material::default()));
        let mut source = TestSource::default();
        be.draw_interactions(&view, &FixedCache, &mut source);

        assert!(!be.gl.calls.contains(&TraceCall::ClearStencil));
        assert!(be.gl.calls.contains(&TraceCall::StencilFunc(GL_ALWAYS, 128, 255)));
    }

    #[test]
    fn test_skip_translucent_config() {
        let mut be = test_backend("skiptrans");
        be.config.skip_translucent = true;
        let view = view_with_light(light_with(0, 0, 2, Material::default()));
        let mut source = TestSource::default();
        be.draw_interactions(&view, &FixedCache, &mut source);
        assert!(source.events.is_empty());
    }

    #[test]
    fn test_fill_depth_buffer_opaque_draws_solid_black() {
        let mut be = test_backend("depthsolid");
        let surf = surf_with_material(lit_material());
        let view = view_with_light(light_with(0, 0, 0, Material::default()));
        be.fill_depth_buffer(&view, &FixedCache, std::slice::from_ref(&surf));

        assert_eq!(be.pc.draw_calls, 1);
        // the white image backs the solid path
        assert!(be.gl.calls.contains(&TraceCall::BindTexture(GL_TEXTURE_2D, 90)));
    }

    #[test]
    fn test_fill_depth_buffer_skips_translucent_and_conditioned_off() {
        let mut be = test_backend("depthskip");
        let view = view_with_light(light_with(0, 0, 0, Material::default()));

        let translucent = surf_with_material(Material {
            coverage: MaterialCoverage::Translucent,
            ..lit_material()
        });
        let mut conditioned_off = lit_material();
        conditioned_off.stages[0].condition_register = 0;
        let off = surf_with_material(conditioned_off);

        be.fill_depth_buffer(&view, &FixedCache, &[translucent, off]);
        assert_eq!(be.pc.draw_calls, 0);
    }

    #[test]
    fn test_fill_depth_buffer_transparent_perforated_falls_back_solid() {
        let mut be = test_backend("perffallback");
        let mut material = lit_material();
        material.coverage = MaterialCoverage::Perforated;
        material.stages[0].has_alpha_test = true;
        // alpha register evaluates to zero
        material.stages[0].color_registers[3] = 0;
        let surf = surf_with_material(material);
        let view = view_with_light(light_with(0, 0, 0, Material::default()));

        be.fill_depth_buffer(&view, &FixedCache, std::slice::from_ref(&surf));

        // no alpha tested draw happened, only the solid fallback
        assert_eq!(be.pc.draw_calls, 1);
        assert!(!be.gl.calls.contains(&TraceCall::BindTexture(GL_TEXTURE_2D, 40)));
        assert!(be.gl.calls.contains(&TraceCall::BindTexture(GL_TEXTURE_2D, 90)));
    }

    #[test]
    fn test_fill_depth_buffer_perforated_alpha_stage() {
        let mut be = test_backend("perf");
        let mut material = lit_material();
        material.coverage = MaterialCoverage::Perforated;
        material.stages[0].has_alpha_test = true;
        material.stages[0].alpha_test_register = 2;
        let surf = surf_with_material(material);
        let view = view_with_light(light_with(0, 0, 0, Material::default()));

        be.fill_depth_buffer(&view, &FixedCache, std::slice::from_ref(&surf));

        assert_eq!(be.pc.draw_calls, 1);
        assert!(be.gl.calls.contains(&TraceCall::AlphaFunc(GL_GREATER, 0.5)));
        assert!(be.gl.calls.contains(&TraceCall::Enable(GL_ALPHA_TEST)));
        assert!(be.gl.calls.contains(&TraceCall::Disable(GL_ALPHA_TEST)));
        // the stage texture, not the white fallback
        assert!(be.gl.calls.contains(&TraceCall::BindTexture(GL_TEXTURE_2D, 40)));
        assert!(!be.gl.calls.contains(&TraceCall::BindTexture(GL_TEXTURE_2D, 90)));
    }

    #[test]
    fn test_fill_depth_buffer_subview_darkens() {
        let mut be = test_backend("subview");
        be.config.over_bright = 2.0;
        let material = Material {
            sort: MaterialSort::Subview,
            ..lit_material()
        };
        let surf = surf_with_material(material);
        let view = view_with_light(light_with(0, 0, 0, Material::default()));

        be.fill_depth_buffer(&view, &FixedCache, std::slice::from_ref(&surf));

        assert!(be.gl.calls.contains(&TraceCall::BlendFunc(GL_DST_COLOR, GL_ZERO)));
        let idx = be.programs.bind(&mut be.gl, crate::gl_program::GLPROG_DEPTH_PASS).unwrap();
        let loc = be.gl.location(be.programs.prog(idx).handle, "gDiffuseModifier");
        assert_eq!(be.gl.vec4_uploads(loc), vec![[0.5, 0.5, 0.5, 1.0]]);
    }

    #[test]
    fn test_fill_depth_buffer_clip_plane_coalesces_by_space() {
        let mut be = test_backend("clipplane");
        let mut view = view_with_light(light_with(0, 0, 0, Material::default()));
        view.clip_planes = vec![[0.0, 0.0, 1.0, 0.0]];

        let mut a = surf_with_material(lit_material());
        a.space.id = 7;
        let b = a.clone();
        let mut c = surf_with_material(lit_material());
        c.space.id = 8;

        be.fill_depth_buffer(&view, &FixedCache, &[a, b, c]);
        assert_eq!(be.gl.count(|call| matches!(call, TraceCall::TexGenPlane(_))), 2);
    }

    #[test]
    fn test_render_shader_passes_ordinary_stage() {
        let mut be = test_backend("ambient");
        let surf = surf_with_material(lit_material());
        let view = view_with_light(light_with(0, 0, 0, Material::default()));

        be.render_shader_passes(&view, &FixedCache, std::slice::from_ref(&surf));

        assert_eq!(be.pc.draw_calls, 1);
        assert!(be.gl.calls.contains(&TraceCall::BindTexture(GL_TEXTURE_2D, 40)));
        assert!(be.gl.calls.contains(&TraceCall::BlendFunc(GL_ONE, GL_ONE)));
        assert_eq!(be.gl.calls.last(), Some(&TraceCall::DisableVertexAttribArray(VA_COLOR)));
    }

    #[test]
    fn test_render_shader_passes_skips_black_additive_stage() {
        let mut be = test_backend("blackadd");
        let mut material = lit_material();
        // additive stage whose color registers all evaluate to zero
        material.stages[0].color_registers = [0, 0, 0, 0];
        let surf = surf_with_material(material);
        let view = view_with_light(light_with(0, 0, 0, Material::default()));

        be.render_shader_passes(&view, &FixedCache, std::slice::from_ref(&surf));
        assert_eq!(be.pc.draw_calls, 0);
    }

    #[test]
    fn test_render_shader_passes_skips_lighting_and_mask_stages() {
        let mut be = test_backend("maskstage");
        let mut material = lit_material();
        material.stages.push(Stage {
            lighting: StageLighting::Diffuse,
            ..ambient_stage(41)
        });
        material.stages.push(Stage {
            draw_state_bits: GLS_SRCBLEND_ZERO | GLS_DSTBLEND_ONE,
            ..ambient_stage(42)
        });
        let surf = surf_with_material(material);
        let view = view_with_light(light_with(0, 0, 0, Material::default()));

        be.render_shader_passes(&view, &FixedCache, std::slice::from_ref(&surf));
        assert_eq!(be.pc.draw_calls, 1);
    }

    #[test]
    fn test_render_shader_passes_weapon_depth_hack() {
        let mut be = test_backend("depthhack");
        let mut surf = surf_with_material(lit_material());
        surf.space.weapon_depth_hack = true;
        let view = view_with_light(light_with(0, 0, 0, Material::default()));

        be.render_shader_passes(&view, &FixedCache, std::slice::from_ref(&surf));
        assert!(be.gl.calls.contains(&TraceCall::DepthRange(0.0, 0.5)));
        assert!(be.gl.calls.contains(&TraceCall::DepthRange(0.0, 1.0)));
    }

    #[test]
    fn test_render_shader_passes_model_depth_hack_offsets_projection() {
        let mut be = test_backend("modelhack");
        let mut surf = surf_with_material(lit_material());
        surf.space.model_depth_hack = 0.25;
        let view = view_with_light(light_with(0, 0, 0, Material::default()));

        be.render_shader_passes(&view, &FixedCache, std::slice::from_ref(&surf));

        // no depth range change, only the clip space z translation moves
        assert!(!be.gl.calls.contains(&TraceCall::DepthRange(0.0, 0.5)));
        let idx = be.programs.bind(&mut be.gl, GLPROG_UNLIT_PASS).unwrap();
        let loc = be.gl.location(be.programs.prog(idx).handle, "gMVP");
        let uploads = be.gl.mat4_uploads(loc);
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0][14], -0.25);
    }

    #[test]
    fn test_render_shader_passes_new_stage_program() {
        let ctx = prog_ctx("newstage");
        ctx.write_file("glprogs/heathaze.glsl", b"void main() {}\n").unwrap();
        let mut be = BackEnd::new(TraceDriver::new(), builtin_images());
        be.programs.reload_all(&mut be.gl, &ctx);
        let ident = be.programs.find_or_register(&mut be.gl, &ctx, "heathaze");

        let mut material = lit_material();
        material.stages[0].new_stage = Some(NewStage {
            program: ident,
            vertex_parms: vec![[2, 2, 3, 1]],
            images: vec![Some(Image::new_2d(50)), Some(Image::new_2d(51))],
        });
        let surf = surf_with_material(material);
        let view = view_with_light(light_with(0, 0, 0, Material::default()));

        be.render_shader_passes(&view, &FixedCache, std::slice::from_ref(&surf));

        assert_eq!(be.pc.draw_calls, 1);
        let idx = be.programs.bind(&mut be.gl, ident).unwrap();
        let prog_handle = be.programs.prog(idx).handle;
        let parm_loc = be.gl.location(prog_handle, "gVertexParm0");
        assert_eq!(be.gl.vec4_uploads(parm_loc), vec![[0.5, 0.5, 0.25, 1.0]]);
        // viewport is 640x480, padded render target is 1024x512
        let correction_loc = be.gl.location(prog_handle, "gScreenCorrectionFactor");
        assert_eq!(be.gl.vec4_uploads(correction_loc), vec![[640.0 / 1024.0, 480.0 / 512.0, 1.0, 1.0]]);
        // both custom images bound, the one above unit 0 unbound again
        assert!(be.gl.calls.contains(&TraceCall::BindTexture(GL_TEXTURE_2D, 50)));
        assert!(be.gl.calls.contains(&TraceCall::BindTexture(GL_TEXTURE_2D, 51)));
        assert!(be.gl.calls.contains(&TraceCall::BindTexture(GL_TEXTURE_2D, 0)));
    }

    #[test]
    fn test_render_shader_passes_skip_new_ambient() {
        let ctx = prog_ctx("skipnew");
        ctx.write_file("glprogs/heathaze.glsl", b"void main() {}\n").unwrap();
        let mut be = BackEnd::new(TraceDriver::new(), builtin_images());
        be.programs.reload_all(&mut be.gl, &ctx);
        let ident = be.programs.find_or_register(&mut be.gl, &ctx, "heathaze");
        be.config.skip_new_ambient = true;

        let mut material = lit_material();
        material.stages[0].new_stage = Some(NewStage {
            program: ident,
            vertex_parms: Vec::new(),
            images: Vec::new(),
        });
        let surf = surf_with_material(material);
        let view = view_with_light(light_with(0, 0, 0, Material::default()));

        be.render_shader_passes(&view, &FixedCache, std::slice::from_ref(&surf));
        assert_eq!(be.pc.draw_calls, 0);
    }

    #[test]
    fn test_render_shader_passes_unresolved_program_aborts_surface_only() {
        let ctx = prog_ctx("noprog");
        // unlit program source removed: binding fails, frame survives
        std::fs::remove_file(ctx.basedir.join("glprogs/unlit_pass.glsl")).unwrap();
        let mut be = BackEnd::new(TraceDriver::new(), builtin_images());
        be.programs.reload_all(&mut be.gl, &ctx);

        let surf = surf_with_material(lit_material());
        let view = view_with_light(light_with(0, 0, 0, Material::default()));
        be.render_shader_passes(&view, &FixedCache, std::slice::from_ref(&surf));

        assert_eq!(be.pc.draw_calls, 0);
        // no attribute array was left enabled by the early return
        assert_eq!(be.gl.count(|c| matches!(c, TraceCall::EnableVertexAttribArray(_))), 0);
        assert_eq!(be.programs.bind(&mut be.gl, PROG_NONE), None);
    }

    #[test]
    fn test_render_shader_passes_transform_coalesces_by_space() {
        let mut be = test_backend("spacecoalesce");
        let a = surf_with_material(lit_material());
        let b = a.clone();
        let mut c = surf_with_material(lit_material());
        c.space.id = 9;
        let view = view_with_light(light_with(0, 0, 0, Material::default()));

        be.render_shader_passes(&view, &FixedCache, &[a, b, c]);

        let idx = be.programs.bind(&mut be.gl, GLPROG_UNLIT_PASS).unwrap();
        let loc = be.gl.location(be.programs.prog(idx).handle, "gMVP");
        assert_eq!(
            be.gl.count(|call| matches!(call, TraceCall::UniformMatrix4fv(l, _) if *l == loc)),
            2
        );
    }

    #[test]
    fn test_render_shader_passes_scissor_coalesces() {
        let mut be = test_backend("scissor");
        let a = surf_with_material(lit_material());
        let b = a.clone();
        let mut c = surf_with_material(lit_material());
        c.scissor = ScreenRect { x1: 5, y1: 5, x2: 104, y2: 104 };
        let view = view_with_light(light_with(0, 0, 0, Material::default()));

        be.render_shader_passes(&view, &FixedCache, &[a, b, c]);
        assert_eq!(be.gl.count(|call| matches!(call, TraceCall::Scissor(..))), 2);
    }
}
