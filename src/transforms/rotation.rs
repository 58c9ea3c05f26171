//! Small fixed-size matrix helpers for building orientation transforms.
//!
//! Matrices are plain row-major arrays, the same representation used for
//! affines elsewhere in the crate. All values are stack-local.

/// Row-major 3x3 matrix.
pub type Mat3 = [[f64; 3]; 3];

/// Row-major 4x4 homogeneous matrix.
pub type Mat4 = [[f64; 4]; 4];

/// Rotation of `theta` radians about the X axis.
pub fn rotation_x(theta: f64) -> Mat3 {
    let (s, c) = theta.sin_cos();
    [[1.0, 0.0, 0.0], [0.0, c, -s], [0.0, s, c]]
}

/// Rotation of `theta` radians about the Y axis.
pub fn rotation_y(theta: f64) -> Mat3 {
    let (s, c) = theta.sin_cos();
    [[c, 0.0, s], [0.0, 1.0, 0.0], [-s, 0.0, c]]
}

/// Rotation of `theta` radians about the Z axis.
pub fn rotation_z(theta: f64) -> Mat3 {
    let (s, c) = theta.sin_cos();
    [[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]]
}

/// Matrix product `a * b`.
pub fn mul3(a: &Mat3, b: &Mat3) -> Mat3 {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = (0..3).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

/// Transpose of a 3x3 matrix.
pub fn transpose3(m: &Mat3) -> Mat3 {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in m.iter().enumerate() {
        for (j, &value) in row.iter().enumerate() {
            out[j][i] = value;
        }
    }
    out
}

/// Embed a rotation in a homogeneous transform with zero translation.
pub fn extend_to_mat4(m: &Mat3) -> Mat4 {
    let mut out = [[0.0; 4]; 4];
    for (dst, src) in out.iter_mut().zip(m.iter()) {
        dst[..3].copy_from_slice(src);
    }
    out[3][3] = 1.0;
    out
}

/// Determinant of the 3x3 matrix whose rows are `r0`, `r1`, `r2`.
pub fn determinant3(r0: &[f64; 3], r1: &[f64; 3], r2: &[f64; 3]) -> f64 {
    r0[0] * (r1[1] * r2[2] - r1[2] * r2[1]) - r0[1] * (r1[0] * r2[2] - r1[2] * r2[0])
        + r0[2] * (r1[0] * r2[1] - r1[1] * r2[0])
}

/// Solve `sum_k c_k * rows[k] = rhs` for `c` with Cramer's rule.
///
/// Returns `None` when `|det(rows)|` is below `epsilon`.
pub fn solve_cramer(rows: &[[f64; 3]; 3], rhs: &[f64; 3], epsilon: f64) -> Option<[f64; 3]> {
    let [r0, r1, r2] = rows;
    let denom = determinant3(r0, r1, r2);
    if !denom.is_finite() || denom.abs() < epsilon {
        return None;
    }
    Some([
        determinant3(rhs, r1, r2) / denom,
        determinant3(r0, rhs, r2) / denom,
        determinant3(r0, r1, rhs) / denom,
    ])
}
