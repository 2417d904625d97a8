//! WGSL sources for the fluid, particle simulation and particle render passes.
//!
//! The fluid kernels mirror [`crate::fluid`] and the particle step mirrors
//! [`crate::particles::particle_step_kernel`] so the CPU reference path and
//! the GPU agree.

use crate::particles::{COLOR_KEYS, COLOR_SLOTS, FOLLOW_RATE, SWIRL_STEP};
use crate::section::SectionKey;

/// Fragment entry points of [`FLUID_SHADER`], in pass order.
pub const FLUID_ENTRY_POINTS: [&str; 7] = [
    "fs_pointer_velocity",
    "fs_pointer_density",
    "fs_advect_velocity",
    "fs_advect_density",
    "fs_divergence",
    "fs_pressure",
    "fs_gradient_subtract",
];

/// All fluid passes share one bind group layout:
/// uniforms, two source textures and a linear clamp sampler.
pub const FLUID_SHADER: &str = r#"
struct FluidUniforms {
    pointer: vec2<f32>,
    delta: vec2<f32>,
    ink: vec3<f32>,
    timestep: f32,
    rdx: vec2<f32>,
    aspect: f32,
    mouse_radius: f32,
    fade: f32,
    velocity_diffusion: f32,
    density_diffusion: f32,
    gradient_amount: f32,
    field_limit: f32,
};

@group(0) @binding(0) var<uniform> u: FluidUniforms;
@group(0) @binding(1) var tex_a: texture_2d<f32>;
@group(0) @binding(2) var tex_b: texture_2d<f32>;
@group(0) @binding(3) var field_sampler: sampler;

const EPSILON: f32 = 1.1920929e-7;
const DENSITY_SPLAT_CAP: f32 = 0.02;

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> @builtin(position) vec4<f32> {
    var positions = array<vec2<f32>, 3>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(3.0, -1.0),
        vec2<f32>(-1.0, 3.0),
    );
    return vec4<f32>(positions[vertex_index], 0.0, 1.0);
}

fn limit(v: vec4<f32>) -> vec4<f32> {
    // NaN is the only value not equal to itself.
    let finite = select(v, vec4<f32>(0.0), v != v);
    return clamp(finite, vec4<f32>(-u.field_limit), vec4<f32>(u.field_limit));
}

fn splat_offset(uv: vec2<f32>) -> vec2<f32> {
    return (uv - (u.pointer + 1.0) * 0.5) * vec2<f32>(u.aspect, 1.0);
}

fn clamped(t: texture_2d<f32>, uv: vec2<f32>) -> f32 {
    return textureSample(t, field_sampler, clamp(uv, vec2<f32>(0.0), vec2<f32>(1.0))).x;
}

@fragment
fn fs_pointer_velocity(@builtin(position) frag: vec4<f32>) -> @location(0) vec4<f32> {
    let uv = frag.xy * u.rdx;
    let old = textureSample(tex_a, field_sampler, uv);
    let p = splat_offset(uv);
    let splat = exp(1.0 - dot(p, p) / u.mouse_radius) * vec3<f32>(u.delta, 0.0);
    return limit(vec4<f32>(old.xyz * u.fade + splat, 1.0));
}

@fragment
fn fs_pointer_density(@builtin(position) frag: vec4<f32>) -> @location(0) vec4<f32> {
    let uv = frag.xy * u.rdx;
    let old = textureSample(tex_a, field_sampler, uv);
    let p = splat_offset(uv);
    let speed = max(abs(u.delta.x), abs(u.delta.y));
    let delta_radius = u.mouse_radius * speed * 10.0;
    let profile = min(exp(1.0 - dot(p, p) / max(delta_radius, EPSILON)), DENSITY_SPLAT_CAP);
    let splat = select(vec3<f32>(0.0), profile * u.ink, delta_radius > EPSILON);
    return limit(vec4<f32>(old.xyz * u.fade + splat, 1.0));
}

// tex_a is the advected quantity, tex_b the velocity.
fn advect(uv: vec2<f32>, diffusion: f32) -> vec4<f32> {
    let velocity = textureSample(tex_b, field_sampler, uv).xy;
    let from_uv = uv - u.timestep * u.rdx * velocity;
    let moved = textureSample(tex_a, field_sampler, from_uv).xyz;
    return limit(vec4<f32>(moved * diffusion, 1.0));
}

@fragment
fn fs_advect_velocity(@builtin(position) frag: vec4<f32>) -> @location(0) vec4<f32> {
    return advect(frag.xy * u.rdx, u.velocity_diffusion);
}

@fragment
fn fs_advect_density(@builtin(position) frag: vec4<f32>) -> @location(0) vec4<f32> {
    return advect(frag.xy * u.rdx, u.density_diffusion);
}

@fragment
fn fs_divergence(@builtin(position) frag: vec4<f32>) -> @location(0) vec4<f32> {
    let uv = frag.xy * u.rdx;
    let l = textureSample(tex_a, field_sampler, uv - vec2<f32>(u.rdx.x, 0.0)).x;
    let r = textureSample(tex_a, field_sampler, uv + vec2<f32>(u.rdx.x, 0.0)).x;
    let t = textureSample(tex_a, field_sampler, uv + vec2<f32>(0.0, u.rdx.y)).y;
    let b = textureSample(tex_a, field_sampler, uv - vec2<f32>(0.0, u.rdx.y)).y;
    return vec4<f32>((r - l + t - b) * 0.5, 0.0, 0.0, 1.0);
}

// tex_a is the previous pressure, tex_b the divergence.
@fragment
fn fs_pressure(@builtin(position) frag: vec4<f32>) -> @location(0) vec4<f32> {
    let uv = frag.xy * u.rdx;
    let l = clamped(tex_a, uv - vec2<f32>(u.rdx.x, 0.0));
    let r = clamped(tex_a, uv + vec2<f32>(u.rdx.x, 0.0));
    let t = clamped(tex_a, uv + vec2<f32>(0.0, u.rdx.y));
    let b = clamped(tex_a, uv - vec2<f32>(0.0, u.rdx.y));
    let div = textureSample(tex_b, field_sampler, uv).x;
    return limit(vec4<f32>((l + r + b + t - div) * 0.25, 0.0, 0.0, 1.0));
}

// tex_a is the velocity, tex_b the pressure.
@fragment
fn fs_gradient_subtract(@builtin(position) frag: vec4<f32>) -> @location(0) vec4<f32> {
    let uv = frag.xy * u.rdx;
    let l = clamped(tex_b, uv - vec2<f32>(u.rdx.x, 0.0));
    let r = clamped(tex_b, uv + vec2<f32>(u.rdx.x, 0.0));
    let t = clamped(tex_b, uv + vec2<f32>(0.0, u.rdx.y));
    let b = clamped(tex_b, uv - vec2<f32>(0.0, u.rdx.y));
    let v = textureSample(tex_a, field_sampler, uv).xy - vec2<f32>(r - l, t - b) * u.gradient_amount;
    return limit(vec4<f32>(v, 0.0, 1.0));
}
"#;

const FULLSCREEN_VERTEX: &str = r#"
@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> @builtin(position) vec4<f32> {
    var positions = array<vec2<f32>, 3>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(3.0, -1.0),
        vec2<f32>(-1.0, 3.0),
    );
    return vec4<f32>(positions[vertex_index], 0.0, 1.0);
}
"#;

/// Decode one VAT sample, picking the sampler by the slot's bit in
/// `nearest_mask`.
const VAT_SAMPLING: &str = r#"
fn vat_uv(tex: texture_2d<f32>, index: u32, current_frame: f32, total_frames: f32) -> vec2<f32> {
    let width = f32(textureDimensions(tex).x);
    return vec2<f32>((f32(index) + 0.5) / width, current_frame / max(total_frames, 1.0));
}

fn sample_slot(tex: texture_2d<f32>, uv: vec2<f32>, slot: u32, nearest_mask: u32) -> vec3<f32> {
    let smooth_rgb = textureSampleLevel(tex, linear_sampler, uv, 0.0).rgb;
    let nearest_rgb = textureSampleLevel(tex, nearest_sampler, uv, 0.0).rgb;
    return select(smooth_rgb, nearest_rgb, ((nearest_mask >> slot) & 1u) == 1u);
}
"#;

/// Texture binding declarations for one VAT per key in group 1.
fn vat_bindings(prefix: &str, count: usize) -> String {
    (0..count)
        .map(|i| format!("@group(1) @binding({i}) var {prefix}_{i}: texture_2d<f32>;\n"))
        .collect()
}

/// Build the particle simulation shader.
///
/// One fragment per particle texel: blend the bound position VATs by their
/// section weights, follow the blend, swirl with whatever weight is left
/// and drift with the fluid velocity under the particle.
pub fn particle_sim_shader() -> String {
    let bindings = vat_bindings("vat", SectionKey::COUNT);
    let blend: String = SectionKey::ALL
        .iter()
        .map(|key| {
            let i = key.index();
            format!(
                "    // {name}\n    \
                 w = weight({i}u);\n    \
                 goal += w * ((sample_slot(vat_{i}, vat_uv(vat_{i}, index, u.current_frame, u.total_frames), {i}u, u.nearest_mask) - 0.5) * u.vat_scale);\n    \
                 total += w;\n",
                name = key.name(),
            )
        })
        .collect();

    format!(
        r#"
struct SimUniforms {{
    mvp: mat4x4<f32>,
    weights: array<vec4<f32>, 4>,
    time: f32,
    curl_freq: f32,
    current_frame: f32,
    total_frames: f32,
    vat_scale: f32,
    flow_strength: f32,
    nearest_mask: u32,
    _padding: f32,
}};

@group(0) @binding(0) var<uniform> u: SimUniforms;
@group(0) @binding(1) var positions: texture_2d<f32>;
@group(0) @binding(2) var flow: texture_2d<f32>;
@group(0) @binding(3) var linear_sampler: sampler;
@group(0) @binding(4) var nearest_sampler: sampler;
{bindings}
const FOLLOW_RATE: f32 = {follow:?};
const SWIRL_STEP: f32 = {swirl:?};
const EPSILON: f32 = 1.1920929e-7;
{FULLSCREEN_VERTEX}{VAT_SAMPLING}
fn weight(i: u32) -> f32 {{
    return u.weights[i / 4u][i % 4u];
}}

fn swirl(p: vec3<f32>, time: f32, freq: f32) -> vec3<f32> {{
    let q = p * freq + vec3<f32>(time);
    return vec3<f32>(sin(q.y) - cos(q.z), sin(q.z) - cos(q.x), sin(q.x) - cos(q.y));
}}

@fragment
fn fs_main(@builtin(position) frag: vec4<f32>) -> @location(0) vec4<f32> {{
    let texel = vec2<i32>(frag.xy);
    let width = textureDimensions(positions).x;
    let index = u32(texel.y) * width + u32(texel.x);
    let previous = textureLoad(positions, texel, 0);
    let p = previous.xyz;

    var goal = vec3<f32>(0.0);
    var total = 0.0;
    var w = 0.0;
{blend}
    let clip = u.mvp * vec4<f32>(p, 1.0);
    let clip_w = select(EPSILON, clip.w, abs(clip.w) > EPSILON);
    let screen = clip.xy / clip_w * 0.5 + 0.5;
    let velocity = textureSampleLevel(flow, linear_sampler, screen, 0.0).xy;

    let pull = clamp(total, 0.0, 1.0);
    let freedom = 1.0 - pull;
    let next = p
        + (goal - p) * pull * FOLLOW_RATE
        + swirl(p, u.time, u.curl_freq) * freedom * SWIRL_STEP
        + vec3<f32>(velocity * u.flow_strength, 0.0);
    return vec4<f32>(next, previous.w);
}}
"#,
        follow = FOLLOW_RATE,
        swirl = SWIRL_STEP,
    )
}

/// Build the particle render shader.
///
/// Each particle is an instanced camera-facing quad. Its size and alpha
/// follow the circle of confusion around the focus distance; its color is
/// the weighted color VATs over a white base, tinted by the fluid density
/// behind it.
pub fn particle_render_shader() -> String {
    let bindings = vat_bindings("color", COLOR_SLOTS);
    let blend: String = COLOR_KEYS
        .iter()
        .enumerate()
        .map(|(slot, key)| {
            format!(
                "    // {name}\n    \
                 w = color_weight({slot}u);\n    \
                 tinted += w * sample_slot(color_{slot}, vat_uv(color_{slot}, index, u.current_frame, u.total_frames), {slot}u, u.nearest_mask);\n    \
                 total += w;\n",
                name = key.name(),
            )
        })
        .collect();

    format!(
        r#"
struct RenderUniforms {{
    view_proj: mat4x4<f32>,
    model: mat4x4<f32>,
    color_weights: array<vec4<f32>, 3>,
    time: f32,
    focus: f32,
    fov: f32,
    blur: f32,
    current_frame: f32,
    total_frames: f32,
    nearest_mask: u32,
    _padding0: f32,
    viewport: vec2<f32>,
    _padding1: vec2<f32>,
}};

@group(0) @binding(0) var<uniform> u: RenderUniforms;
@group(0) @binding(1) var positions: texture_2d<f32>;
@group(0) @binding(2) var density: texture_2d<f32>;
@group(0) @binding(3) var linear_sampler: sampler;
@group(0) @binding(4) var nearest_sampler: sampler;
{bindings}
const MIN_POINT_SIZE: f32 = 1.5;
const DENSITY_TINT: f32 = 4.0;
{VAT_SAMPLING}
struct VertexOutput {{
    @builtin(position) clip_position: vec4<f32>,
    @location(0) corner: vec2<f32>,
    @location(1) color: vec3<f32>,
    @location(2) alpha: f32,
}};

fn color_weight(slot: u32) -> f32 {{
    return u.color_weights[slot / 4u][slot % 4u];
}}

@vertex
fn vs_main(
    @builtin(vertex_index) vertex_index: u32,
    @location(0) lookup: vec2<f32>,
) -> VertexOutput {{
    var corners = array<vec2<f32>, 6>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, -1.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(-1.0, 1.0),
    );
    let corner = corners[vertex_index];

    let dims = textureDimensions(positions);
    let texel = vec2<i32>(floor(lookup * vec2<f32>(dims) + 0.5));
    let index = u32(texel.y) * dims.x + u32(texel.x);
    let particle = textureLoad(positions, texel, 0);

    let clip = u.view_proj * u.model * vec4<f32>(particle.xyz, 1.0);
    // clip.w is the view-space distance for a perspective projection.
    let coc = abs(u.focus - clip.w);
    let size = max(MIN_POINT_SIZE, (MIN_POINT_SIZE + coc * abs(u.blur)) * u.fov / 50.0);
    let offset = corner * size / max(u.viewport, vec2<f32>(1.0)) * clip.w;

    var tinted = vec3<f32>(0.0);
    var total = 0.0;
    var w = 0.0;
{blend}
    let base = vec3<f32>(1.0) * (1.0 - clamp(total, 0.0, 1.0));
    let screen = clip.xy / max(clip.w, 1e-4) * 0.5 + 0.5;
    let ink = textureSampleLevel(density, linear_sampler, screen, 0.0).rgb;

    var out: VertexOutput;
    out.clip_position = vec4<f32>(clip.xy + offset, clip.zw);
    out.corner = corner;
    out.color = tinted + base + ink * DENSITY_TINT;
    out.alpha = (1.04 - clamp(coc * 1.5, 0.0, 1.0)) * particle.w;
    return out;
}}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {{
    let d = dot(in.corner, in.corner);
    if d > 1.0 {{
        discard;
    }}
    let falloff = 1.0 - d;
    return vec4<f32>(in.color, in.alpha * falloff);
}}
"#
    )
}
