pub(crate) const SHADER: &str = r#"
struct Globals {
    view: mat4x4<f32>,
    projection: mat4x4<f32>,
    light_position: vec4<f32>,
    // x: ambient amount, y: diffuse amount
    lighting: vec4<f32>,
}

struct ObjectConstants {
    model: mat4x4<f32>,
    shadow: mat4x4<f32>,
    normal: mat3x4<f32>,
    color: vec4<f32>,
}

@group(0) @binding(0)
var<uniform> globals: Globals;

@group(1) @binding(0)
var<uniform> object: ObjectConstants;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

struct LitOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) world_pos: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

@vertex
fn vs_lit(input: VertexInput) -> LitOutput {
    var out: LitOutput;
    let world_position = object.model * vec4<f32>(input.position, 1.0);
    out.position = globals.projection * globals.view * world_position;
    out.world_pos = world_position.xyz;

    let world_normal = mat3x3<f32>(
        object.normal[0].xyz,
        object.normal[1].xyz,
        object.normal[2].xyz
    ) * input.normal;
    out.normal = normalize(world_normal);
    return out;
}

@fragment
fn fs_lit(input: LitOutput) -> @location(0) vec4<f32> {
    let light_dir = normalize(globals.light_position.xyz - input.world_pos);
    let cos_theta = dot(normalize(input.normal), light_dir);
    let ambient = globals.lighting.x * object.color.rgb;
    let diffuse = globals.lighting.y * object.color.rgb * clamp(cos_theta, 0.0, 1.0);
    return vec4<f32>(ambient + diffuse, 1.0);
}

@vertex
fn vs_shadow(input: VertexInput) -> @builtin(position) vec4<f32> {
    let world_position = object.model * vec4<f32>(input.position, 1.0);
    // Flatten onto the receiver, then use the regular camera.
    return globals.projection * globals.view * (object.shadow * world_position);
}

@fragment
fn fs_shadow() -> @location(0) vec4<f32> {
    return vec4<f32>(object.color.rgb, 1.0);
}
"#;
