use std::f32::consts::TAU;

use anyhow::{anyhow, bail, Context, Result};
use glam::Vec3;
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

use crate::frame::{InstanceParams, MeshHandle, Renderable};
use crate::shadow::Plane;

/// Full description of the demo scene. Every field has a default, so an
/// empty `<scene/>` document is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SceneConfig {
    pub receiver: ReceiverConfig,
    pub light: LightAnimator,
    pub rings: Vec<CasterRing>,
    pub camera: CameraConfig,
}

/// Flat receiving surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReceiverConfig {
    pub normal: Vec3,
    pub offset: f32,
    pub half_size: f32,
    pub color: Vec3,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            normal: Vec3::Y,
            offset: 4.0,
            half_size: 130.0,
            color: Vec3::ONE,
        }
    }
}

/// Moves the point light along a vertical sine wave.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightAnimator {
    pub base: Vec3,
    pub amplitude: f32,
    pub frequency: f32,
}

impl Default for LightAnimator {
    fn default() -> Self {
        Self {
            base: Vec3::new(0.0, 30.0, 0.0),
            amplitude: 10.0,
            frequency: 0.01,
        }
    }
}

impl LightAnimator {
    pub fn position(&self, tick: u64) -> Vec3 {
        let phase = (self.frequency as f64 * tick as f64).sin() as f32;
        self.base + Vec3::Y * (self.amplitude * phase)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CasterMesh {
    /// The loaded model, or the built-in sphere.
    Model,
    Box,
}

impl CasterMesh {
    fn parse(name: &str) -> Result<Self> {
        match name {
            "model" => Ok(Self::Model),
            "box" => Ok(Self::Box),
            other => Err(anyhow!("unknown ring mesh {other:?}, expected model or box")),
        }
    }
}

/// Handles of the meshes a ring can reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CasterMeshes {
    pub model: MeshHandle,
    pub cube: MeshHandle,
}

impl CasterMeshes {
    fn get(&self, mesh: CasterMesh) -> MeshHandle {
        match mesh {
            CasterMesh::Model => self.model,
            CasterMesh::Box => self.cube,
        }
    }
}

/// Colour generated per ring slot: `hash(i) * range + base` per channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Palette {
    pub base: Vec3,
    pub range: Vec3,
}

impl Palette {
    pub fn color(&self, i: f32) -> Vec3 {
        let i = i as f64;
        let hash = |value: f64| ((value.abs() % 255.0) / 255.0) as f32;
        let h = Vec3::new(
            hash(23232.0 * i * i + 100212.0),
            hash(32278.0 * i + 213.0),
            hash(3112.0 * i * i * i + 2137.0 + i),
        );
        h * self.range + self.base
    }
}

/// Shadow casters spaced around a circle that spins with time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CasterRing {
    pub mesh: CasterMesh,
    pub count: u32,
    /// Fraction of a full turn between neighbours.
    pub step: f32,
    pub radius: f32,
    pub height: f32,
    pub scale: f32,
    /// Radians per tick.
    pub spin: f32,
    pub palette: Palette,
}

impl CasterRing {
    pub fn models() -> Self {
        Self {
            mesh: CasterMesh::Model,
            count: 10,
            step: 0.1,
            radius: 20.0,
            height: 3.0,
            scale: 0.7,
            spin: 0.002,
            palette: Palette {
                base: Vec3::new(0.3, 0.15, 0.05),
                range: Vec3::new(0.4, 0.4, 0.05),
            },
        }
    }

    pub fn boxes() -> Self {
        Self {
            mesh: CasterMesh::Box,
            count: 7,
            step: 0.15,
            radius: 35.0,
            height: 9.0,
            scale: 4.2,
            spin: -0.004,
            palette: Palette {
                base: Vec3::new(0.05, 0.4, 0.4),
                range: Vec3::new(0.4, 0.3, 0.4),
            },
        }
    }

    fn defaults_for(mesh: CasterMesh) -> Self {
        match mesh {
            CasterMesh::Model => Self::models(),
            CasterMesh::Box => Self::boxes(),
        }
    }

    pub fn instances(&self, tick: u64) -> impl Iterator<Item = InstanceParams> + '_ {
        let phase = (self.spin as f64 * tick as f64) as f32;
        (0..self.count).map(move |k| {
            let i = k as f32 * self.step;
            let theta = TAU * i + phase;
            InstanceParams::new(
                Vec3::new(
                    self.radius * theta.cos(),
                    self.height,
                    self.radius * theta.sin(),
                ),
                self.scale,
                self.palette.color(i),
            )
        })
    }
}

/// Orbit camera placement, angles in radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub center: Vec3,
    pub distance: f32,
    pub theta: f32,
    pub phi: f32,
    pub near: f32,
    pub far: f32,
    /// Vertical field of view in degrees.
    pub fov: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            center: Vec3::ZERO,
            distance: 130.0,
            theta: 1.57,
            phi: 0.4,
            near: 0.01,
            far: 400.0,
            fov: 45.0,
        }
    }
}

impl CameraConfig {
    fn validate(&self) -> Result<()> {
        if !self.center.is_finite()
            || ![self.distance, self.theta, self.phi, self.near, self.far, self.fov]
                .iter()
                .all(|value| value.is_finite())
        {
            bail!("camera values must be finite");
        }
        if self.near <= 0.0 {
            bail!("camera near plane must be positive, got {}", self.near);
        }
        if self.far <= self.near {
            bail!("camera far plane {} must lie beyond near plane {}", self.far, self.near);
        }
        if self.fov <= 0.0 || self.fov >= 180.0 {
            bail!("camera fov must be between 0 and 180 degrees, got {}", self.fov);
        }
        Ok(())
    }
}

impl SceneConfig {
    /// Default scene: a model ring and a box ring spinning over a
    /// white floor.
    pub fn demo() -> Self {
        Self {
            rings: vec![CasterRing::models(), CasterRing::boxes()],
            ..Self::default()
        }
    }

    /// Parses a scene description, falling back to [`SceneConfig::demo`]
    /// for anything left out.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let document = Document::parse(xml).context("invalid scene XML")?;
        let root = document.root_element();
        if !root.has_tag_name("scene") {
            bail!("expected <scene> root element, found <{}>", root.tag_name().name());
        }
        let mut config = Self::demo();

        if let Some(node) = child(&root, "receiver") {
            let receiver = &mut config.receiver;
            receiver.normal = parse_vec3(optional_text(&node, "normal"), receiver.normal)?;
            receiver.offset = parse_f32(optional_text(&node, "offset"), receiver.offset)?;
            receiver.half_size = parse_f32(optional_text(&node, "size"), receiver.half_size)?;
            receiver.color = parse_color(optional_text(&node, "color"), receiver.color)?;
        }

        if let Some(node) = child(&root, "light") {
            let light = &mut config.light;
            light.base = parse_vec3(optional_text(&node, "base"), light.base)?;
            light.amplitude = parse_f32(optional_text(&node, "amplitude"), light.amplitude)?;
            light.frequency = parse_f32(optional_text(&node, "frequency"), light.frequency)?;
        }

        let rings = root
            .children()
            .filter(|n| n.has_tag_name("ring"))
            .map(|node| parse_ring(&node))
            .collect::<Result<Vec<_>>>()?;
        if root.children().any(|n| n.has_tag_name("ring")) {
            config.rings = rings;
        }

        if let Some(node) = child(&root, "camera") {
            let camera = &mut config.camera;
            camera.center = parse_vec3(optional_text(&node, "center"), camera.center)?;
            camera.distance = parse_f32(optional_text(&node, "distance"), camera.distance)?;
            camera.theta = parse_f32(optional_text(&node, "theta"), camera.theta)?;
            camera.phi = parse_f32(optional_text(&node, "phi"), camera.phi)?;
            camera.near = parse_f32(optional_text(&node, "near"), camera.near)?;
            camera.far = parse_f32(optional_text(&node, "far"), camera.far)?;
            camera.fov = parse_f32(optional_text(&node, "fov"), camera.fov)?;
            camera.validate()?;
        }

        Ok(config)
    }

    pub fn plane(&self) -> Result<Plane> {
        Plane::new(self.receiver.normal, self.receiver.offset).context("invalid receiver plane")
    }

    pub fn receiver(&self, mesh: MeshHandle) -> Renderable {
        Renderable {
            mesh,
            instance: InstanceParams::new(Vec3::ZERO, 1.0, self.receiver.color),
        }
    }

    /// Every caster instance for the given frame tick.
    pub fn casters(&self, tick: u64, meshes: &CasterMeshes) -> Vec<Renderable> {
        self.rings
            .iter()
            .flat_map(|ring| {
                let mesh = meshes.get(ring.mesh);
                ring.instances(tick)
                    .map(move |instance| Renderable { mesh, instance })
            })
            .collect()
    }
}

fn parse_ring(node: &Node<'_, '_>) -> Result<CasterRing> {
    let mesh = optional_text(node, "mesh")
        .map(|name| CasterMesh::parse(&name))
        .transpose()?
        .unwrap_or(CasterMesh::Model);
    let mut ring = CasterRing::defaults_for(mesh);
    ring.count = match optional_text(node, "count") {
        Some(value) => value
            .parse::<u32>()
            .map_err(|err| anyhow!("failed to parse ring count: {err}"))?,
        None => ring.count,
    };
    ring.step = parse_f32(optional_text(node, "step"), ring.step)?;
    ring.radius = parse_f32(optional_text(node, "radius"), ring.radius)?;
    ring.height = parse_f32(optional_text(node, "height"), ring.height)?;
    ring.scale = parse_f32(optional_text(node, "scale"), ring.scale)?;
    ring.spin = parse_f32(optional_text(node, "spin"), ring.spin)?;
    ring.palette.base = parse_vec3(optional_text(node, "color-base"), ring.palette.base)?;
    ring.palette.range = parse_vec3(optional_text(node, "color-range"), ring.palette.range)?;
    Ok(ring)
}

fn child<'a, 'input>(node: &Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(tag))
}

fn optional_text(node: &Node<'_, '_>, tag: &str) -> Option<String> {
    child(node, tag)
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| text.to_string())
}

fn parse_vec3(value: Option<String>, default: Vec3) -> Result<Vec3> {
    let Some(value) = value else {
        return Ok(default);
    };
    let numbers = value
        .split_whitespace()
        .map(|component| {
            component
                .parse::<f32>()
                .map_err(|err| anyhow!("invalid vector component {component:?}: {err}"))
        })
        .collect::<Result<Vec<_>>>()?;
    match numbers.as_slice() {
        [x, y, z] => Ok(Vec3::new(*x, *y, *z)),
        _ => Err(anyhow!("expected 3 vector components, got {:?}", value)),
    }
}

fn parse_color(value: Option<String>, default: Vec3) -> Result<Vec3> {
    match value {
        Some(value) => Ok(parse_vec3(Some(value), default)? / 255.0),
        None => Ok(default),
    }
}

fn parse_f32(value: Option<String>, default: f32) -> Result<f32> {
    match value {
        Some(value) => value
            .parse::<f32>()
            .map_err(|err| anyhow!("failed to parse float: {err}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MESHES: CasterMeshes = CasterMeshes {
        model: MeshHandle(1),
        cube: MeshHandle(2),
    };

    #[test]
    fn light_oscillates_around_base() {
        let light = LightAnimator::default();
        assert_eq!(light.position(0), Vec3::new(0.0, 30.0, 0.0));
        let peak = light.position(157);
        assert!((peak.y - 40.0).abs() < 0.01);
        assert_ne!(light.position(10), light.position(11));
    }

    #[test]
    fn demo_rings_match_layout() {
        let config = SceneConfig::demo();
        let casters = config.casters(0, &MESHES);
        assert_eq!(casters.len(), 17);

        let first = casters[0].instance;
        assert_eq!(casters[0].mesh, MESHES.model);
        assert_eq!(first.translate, Vec3::new(20.0, 3.0, 0.0));
        assert_eq!(first.scale, 0.7);

        let first_box = casters[10];
        assert_eq!(first_box.mesh, MESHES.cube);
        assert_eq!(first_box.instance.translate, Vec3::new(35.0, 9.0, 0.0));
        assert_eq!(first_box.instance.scale, 4.2);
    }

    #[test]
    fn rings_spin_with_ticks() {
        let ring = CasterRing::models();
        let start: Vec<_> = ring.instances(0).collect();
        let later: Vec<_> = ring.instances(100).collect();
        for (a, b) in start.iter().zip(&later) {
            assert!((a.translate.length() - b.translate.length()).abs() < 1e-3);
            assert_ne!(a.translate, b.translate);
            assert_eq!(a.color, b.color);
        }
    }

    #[test]
    fn palette_stays_in_range() {
        let palette = CasterRing::boxes().palette;
        for k in 0..7 {
            let color = palette.color(k as f32 * 0.15);
            assert!(color.cmpge(palette.base).all());
            assert!(color.cmple(palette.base + palette.range).all());
        }
        // |100212| mod 255 = 252
        let first = CasterRing::models().palette.color(0.0);
        assert!((first.x - (252.0 / 255.0 * 0.4 + 0.3)).abs() < 1e-6);
    }

    #[test]
    fn parses_overrides_and_keeps_defaults() {
        let xml = r#"
        <scene>
            <receiver>
                <offset>2</offset>
                <color>255 0 0</color>
            </receiver>
            <light>
                <amplitude>5</amplitude>
            </light>
            <ring>
                <mesh>box</mesh>
                <count>3</count>
                <radius>12.5</radius>
            </ring>
            <camera>
                <distance>80</distance>
            </camera>
        </scene>
        "#;
        let config = SceneConfig::from_xml(xml).unwrap();
        assert_eq!(config.receiver.offset, 2.0);
        assert_eq!(config.receiver.half_size, 130.0);
        assert_eq!(config.receiver.color, Vec3::X);
        assert_eq!(config.light.amplitude, 5.0);
        assert_eq!(config.light.base, Vec3::new(0.0, 30.0, 0.0));
        assert_eq!(config.rings.len(), 1);
        assert_eq!(config.rings[0].mesh, CasterMesh::Box);
        assert_eq!(config.rings[0].count, 3);
        assert_eq!(config.rings[0].radius, 12.5);
        assert_eq!(config.rings[0].height, 9.0);
        assert_eq!(config.camera.distance, 80.0);
        assert_eq!(config.camera.phi, 0.4);
    }

    #[test]
    fn empty_scene_is_the_demo() {
        assert_eq!(SceneConfig::from_xml("<scene/>").unwrap(), SceneConfig::demo());
    }

    #[test]
    fn bad_documents_are_errors() {
        assert!(SceneConfig::from_xml("<world/>").is_err());
        assert!(SceneConfig::from_xml("<scene><ring><mesh>teapot</mesh></ring></scene>").is_err());
        assert!(SceneConfig::from_xml("<scene><light><base>0 1</base></light></scene>").is_err());
        let zero = SceneConfig::from_xml("<scene><receiver><normal>0 0 0</normal></receiver></scene>")
            .unwrap();
        assert!(zero.plane().is_err());

        for camera in [
            "<near>1</near><far>0.5</far>",
            "<far>NaN</far>",
            "<near>0</near>",
            "<distance>inf</distance>",
            "<fov>180</fov>",
        ] {
            let xml = format!("<scene><camera>{camera}</camera></scene>");
            assert!(SceneConfig::from_xml(&xml).is_err(), "accepted {camera}");
        }
    }

    #[test]
    fn camera_overrides_are_kept() {
        let config =
            SceneConfig::from_xml("<scene><camera><near>1</near><far>50</far></camera></scene>")
                .unwrap();
        assert_eq!(config.camera.near, 1.0);
        assert_eq!(config.camera.far, 50.0);
    }
}
