//! Built-in WGSL kernels.
//!
//! Every compute kernel shares one binding contract:
//!
//! | binding | resource                                   |
//! |---------|--------------------------------------------|
//! | 0       | `var<uniform> params: SimParams`           |
//! | 1       | `var<storage, read> pos_in: array<vec4<f32>>` |
//! | 2       | `var<storage, read_write> pos_out: array<vec4<f32>>` |
//!
//! Kernels run one invocation per particle with `@workgroup_size(64)`, read
//! neighbours from `pos_in` and write only their own slot of `pos_out`.
//! Entry points are `integrate` and, for strategies that relax constraints,
//! `constrain`.
//!
//! The numeric constants are shared with the CPU reference solver in
//! [`crate::cpu`] so both produce the same arithmetic.

use crate::grid::Neighborhood;

/// Invocations per workgroup for every compute kernel.
pub const WORKGROUP_SIZE: u32 = 64;

/// Y decrement applied to free particles each step when gravity is on.
pub const GRAVITY_STEP: f32 = 0.001;

/// Blend factor toward the neighbour average in the PBD kernel.
pub const RELAXATION: f32 = 0.05;

/// Fraction of the length error corrected per edge by the Mass-Spring kernel.
pub const STIFFNESS: f32 = 0.1;

/// Entry point for the integration sweep.
pub const INTEGRATE_ENTRY: &str = "integrate";

/// Entry point for constraint-only sweeps.
pub const CONSTRAIN_ENTRY: &str = "constrain";

/// Number of workgroups covering `particle_count` particles.
pub fn workgroup_count(particle_count: u32) -> u32 {
    particle_count.div_ceil(WORKGROUP_SIZE)
}

fn common_header() -> String {
    format!(
        r#"struct SimParams {{
    time: f32,
    gravity_enabled: f32,
    grid_size: f32,
    spacing: f32,
    iterations: f32,
    drive_index: f32,
    amplitude: f32,
    frequency: f32,
}};

@group(0) @binding(0)
var<uniform> params: SimParams;

@group(0) @binding(1)
var<storage, read> pos_in: array<vec4<f32>>;

@group(0) @binding(2)
var<storage, read_write> pos_out: array<vec4<f32>>;

const GRAVITY_STEP: f32 = {gravity:?};
const TAU: f32 = 6.2831853;

fn grid_n() -> u32 {{
    return u32(params.grid_size);
}}

fn rest_position(col: i32, row: i32) -> vec3<f32> {{
    let mid = params.grid_size * 0.5;
    return vec3<f32>(
        (f32(col) - mid) * params.spacing,
        (mid - f32(row)) * params.spacing,
        0.0,
    );
}}

// Pinned particles are copied through unchanged, except the driven one.
fn pinned_output(idx: u32, p: vec4<f32>) -> vec4<f32> {{
    if (params.drive_index >= 0.0 && u32(params.drive_index) == idx) {{
        let n = grid_n();
        let rest = rest_position(i32(idx % n), i32(idx / n));
        let offset = params.amplitude * sin(TAU * params.frequency * params.time);
        return vec4<f32>(rest + vec3<f32>(0.0, 0.0, offset), p.w);
    }}
    return p;
}}
"#,
        gravity = GRAVITY_STEP,
    )
}

/// PBD-style kernel: blend each free particle's displacement toward the mean
/// displacement of its (up to 8) grid neighbours.
pub fn pbd_kernel() -> String {
    format!(
        r#"{header}
const RELAXATION: f32 = {relaxation:?};

@compute @workgroup_size({workgroup})
fn integrate(@builtin(global_invocation_id) global_id: vec3<u32>) {{
    let n = grid_n();
    let idx = global_id.x;
    if (idx >= n * n) {{
        return;
    }}

    let p = pos_in[idx];
    if (p.w > 0.5) {{
        pos_out[idx] = pinned_output(idx, p);
        return;
    }}

    let side = i32(n);
    let col = i32(idx % n);
    let row = i32(idx / n);
    let rest = rest_position(col, row);

    var d = p.xyz - rest;
    if (params.gravity_enabled > 0.5) {{
        d.y = d.y - GRAVITY_STEP;
    }}

    var sum = vec3<f32>(0.0);
    var count = 0.0;
    for (var dy = -1; dy <= 1; dy = dy + 1) {{
        for (var dx = -1; dx <= 1; dx = dx + 1) {{
            let c = col + dx;
            let r = row + dy;
            if ((dx == 0 && dy == 0) || c < 0 || r < 0 || c >= side || r >= side) {{
                continue;
            }}
            let j = u32(r * side + c);
            sum = sum + (pos_in[j].xyz - rest_position(c, r));
            count = count + 1.0;
        }}
    }}
    if (count > 0.0) {{
        d = mix(d, sum / count, vec3<f32>(RELAXATION));
    }}

    pos_out[idx] = vec4<f32>(rest + d, p.w);
}}
"#,
        header = common_header(),
        relaxation = RELAXATION,
        workgroup = WORKGROUP_SIZE,
    )
}

/// Mass-Spring kernel: correct each free particle along its incident edges
/// toward their rest lengths. `integrate` also applies gravity, `constrain`
/// only relaxes.
pub fn mass_spring_kernel(neighborhood: Neighborhood) -> String {
    format!(
        r#"{header}
const STIFFNESS: f32 = {stiffness:?};
const USE_SHEAR: bool = {shear};
const SQRT_2: f32 = 1.4142135;

fn spring_correction(idx: u32, col: i32, row: i32, side: i32) -> vec3<f32> {{
    let p = pos_in[idx].xyz;
    var correction = vec3<f32>(0.0);
    for (var dy = -1; dy <= 1; dy = dy + 1) {{
        for (var dx = -1; dx <= 1; dx = dx + 1) {{
            let diagonal = dx != 0 && dy != 0;
            let c = col + dx;
            let r = row + dy;
            if ((dx == 0 && dy == 0) || (diagonal && !USE_SHEAR) || c < 0 || r < 0 || c >= side || r >= side) {{
                continue;
            }}
            let q = pos_in[u32(r * side + c)];
            let delta = q.xyz - p;
            let dist = length(delta);
            if (dist < 1e-6) {{
                continue;
            }}
            var rest = params.spacing;
            if (diagonal) {{
                rest = params.spacing * SQRT_2;
            }}
            // A pinned neighbour cannot move, so this side takes the whole correction.
            let weight = select(0.5, 1.0, q.w > 0.5);
            correction = correction + delta * ((dist - rest) / dist * STIFFNESS * weight);
        }}
    }}
    return correction;
}}

@compute @workgroup_size({workgroup})
fn integrate(@builtin(global_invocation_id) global_id: vec3<u32>) {{
    let n = grid_n();
    let idx = global_id.x;
    if (idx >= n * n) {{
        return;
    }}

    let p = pos_in[idx];
    if (p.w > 0.5) {{
        pos_out[idx] = pinned_output(idx, p);
        return;
    }}

    var moved = p.xyz;
    if (params.gravity_enabled > 0.5) {{
        moved.y = moved.y - GRAVITY_STEP;
    }}
    moved = moved + spring_correction(idx, i32(idx % n), i32(idx / n), i32(n));
    pos_out[idx] = vec4<f32>(moved, p.w);
}}

@compute @workgroup_size({workgroup})
fn constrain(@builtin(global_invocation_id) global_id: vec3<u32>) {{
    let n = grid_n();
    let idx = global_id.x;
    if (idx >= n * n) {{
        return;
    }}

    let p = pos_in[idx];
    if (p.w > 0.5) {{
        pos_out[idx] = pinned_output(idx, p);
        return;
    }}

    let correction = spring_correction(idx, i32(idx % n), i32(idx / n), i32(n));
    pos_out[idx] = vec4<f32>(p.xyz + correction, p.w);
}}
"#,
        header = common_header(),
        stiffness = STIFFNESS,
        shear = neighborhood.includes_shear(),
        workgroup = WORKGROUP_SIZE,
    )
}

/// Vertex + fragment program drawing the cloth from a position buffer.
///
/// Reads one `vec4<f32>` per vertex (see [`crate::layout`]); the pinned flag
/// tints the vertex so anchors are visible.
pub fn render_shader() -> String {
    r#"struct Camera {
    view_proj: mat4x4<f32>,
};

@group(0) @binding(0)
var<uniform> camera: Camera;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) color: vec3<f32>,
};

const CLOTH_COLOR: vec3<f32> = vec3<f32>(0.35, 0.55, 0.85);
const PINNED_COLOR: vec3<f32> = vec3<f32>(0.95, 0.35, 0.25);

@vertex
fn vs_main(@location(0) particle: vec4<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = camera.view_proj * vec4<f32>(particle.xyz, 1.0);
    out.color = select(CLOTH_COLOR, PINNED_COLOR, particle.w > 0.5);
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return vec4<f32>(in.color, 1.0);
}
"#
    .to_string()
}
