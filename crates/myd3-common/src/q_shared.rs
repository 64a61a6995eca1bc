// q_shared.rs -- math types shared between the engine and the renderer

pub type Vec3 = [f32; 3];
pub type Vec4 = [f32; 4];

/// 4x4 matrix, column major, translation in elements 12..15.
pub type Mat4 = [f32; 16];

/// Plane as (normal, distance): dot(normal, p) + d = 0.
pub type Plane = [f32; 4];

pub const MAT4_IDENTITY: Mat4 = [
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 1.0, 0.0,
    0.0, 0.0, 0.0, 1.0,
];

/// c = a * b, column major.
pub fn mat4_mul(a: &Mat4, b: &Mat4) -> Mat4 {
    let mut c = [0.0f32; 16];
    for col in 0..4 {
        for row in 0..4 {
            let mut sum = 0.0;
            for k in 0..4 {
                sum += a[k * 4 + row] * b[col * 4 + k];
            }
            c[col * 4 + row] = sum;
        }
    }
    c
}

/// Transforms a plane from world space into the local space of a model
/// matrix. The rotation columns are assumed orthonormal, so the normal is
/// rotated by the transpose and the distance picks up the translation.
pub fn global_plane_to_local(model_matrix: &Mat4, plane: &Plane) -> Plane {
    let mut out = [0.0f32; 4];
    for axis in 0..3 {
        out[axis] = plane[0] * model_matrix[axis * 4]
            + plane[1] * model_matrix[axis * 4 + 1]
            + plane[2] * model_matrix[axis * 4 + 2];
    }
    out[3] = plane[3]
        + plane[0] * model_matrix[12]
        + plane[1] * model_matrix[13]
        + plane[2] * model_matrix[14];
    out
}
