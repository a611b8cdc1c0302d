//! Per-frame draw ordering for planar shadows.
//!
//! Every frame issues three passes in a fixed order:
//!
//! 1. the receiver, lit, with depth test and write enabled;
//! 2. every caster flattened through the [`ShadowMatrix`] in a flat dark
//!    colour with depth testing disabled;
//! 3. every caster again, lit, at its real transform with depth enabled.
//!
//! The shadow geometry is coplanar with the receiver, so a depth comparison
//! against it would be unreliable. Drawing it untested between the receiver
//! and the casters gives the correct image without any depth bias.

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::shadow::{Plane, ShadowMatrix, ShadowProjector};

pub const SHADOW_COLOR: Vec3 = Vec3::splat(0.4);
pub const AMBIENT_LIGHT: f32 = 0.3;
pub const DIFFUSE_LIGHT: f32 = 0.7;

/// Opaque handle to geometry owned by the draw backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshHandle(pub usize);

/// Ephemeral placement of one mesh instance for a single draw.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InstanceParams {
    pub translate: Vec3,
    pub scale: f32,
    pub color: Vec3,
}

impl InstanceParams {
    pub fn new(translate: Vec3, scale: f32, color: Vec3) -> Self {
        Self {
            translate,
            scale,
            color,
        }
    }

    /// `translate * scale`, so scaling happens around the mesh origin.
    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_translation(self.translate) * Mat4::from_scale(Vec3::splat(self.scale))
    }
}

impl Default for InstanceParams {
    fn default() -> Self {
        Self::new(Vec3::ZERO, 1.0, Vec3::ONE)
    }
}

/// One mesh placed in the world for the current frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Renderable {
    pub mesh: MeshHandle,
    pub instance: InstanceParams,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    Receiver,
    Shadow,
    Caster,
}

/// Pass order every frame must follow.
pub const FRAME_PASSES: [PassKind; 3] = [PassKind::Receiver, PassKind::Shadow, PassKind::Caster];

impl PassKind {
    pub fn pipeline(self) -> Pipeline {
        match self {
            Self::Receiver | Self::Caster => Pipeline::Normal,
            Self::Shadow => Pipeline::Shadow,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthState {
    pub test: bool,
    pub write: bool,
}

/// The two pipeline configurations a draw can run under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pipeline {
    /// Ambient plus diffuse lighting from the point light.
    Normal,
    /// Geometry pre-multiplied by the shadow matrix, unlit.
    Shadow,
}

impl Pipeline {
    pub fn depth_state(self) -> DepthState {
        match self {
            Self::Normal => DepthState {
                test: true,
                write: true,
            },
            Self::Shadow => DepthState {
                test: false,
                write: false,
            },
        }
    }
}

/// Camera and light state sampled once at the start of a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInputs {
    pub view: Mat4,
    pub projection: Mat4,
    pub light: Vec3,
}

/// Read-only values shared by every draw of one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameContext {
    pub view: Mat4,
    pub projection: Mat4,
    pub light: Vec3,
    pub shadow: ShadowMatrix,
}

impl FrameContext {
    pub fn new(plane: &Plane, inputs: FrameInputs) -> Self {
        Self {
            view: inputs.view,
            projection: inputs.projection,
            light: inputs.light,
            shadow: ShadowProjector::compute(plane, inputs.light),
        }
    }
}

/// Everything a backend needs to submit one instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawCall {
    pub pass: PassKind,
    pub pipeline: Pipeline,
    pub mesh: MeshHandle,
    pub model: Mat4,
    pub color: Vec3,
    /// Set only for shadow-pass draws.
    pub shadow: Option<ShadowMatrix>,
}

/// Backend receiving the ordered draw stream.
pub trait DrawSink {
    /// Called once per frame before any pass with the shared frame values.
    fn begin_frame(&mut self, frame: &FrameContext);

    fn begin_pass(&mut self, pass: PassKind, pipeline: Pipeline);

    fn draw(&mut self, call: &DrawCall);

    fn end_frame(&mut self);
}

/// Issues the receiver, shadow and caster passes for one frame.
#[derive(Debug, Clone)]
pub struct FrameRenderer {
    plane: Plane,
}

impl FrameRenderer {
    pub fn new(plane: Plane) -> Self {
        Self { plane }
    }

    pub fn plane(&self) -> &Plane {
        &self.plane
    }

    /// Renders one frame and returns the context the draws were issued with.
    pub fn render_frame<S: DrawSink + ?Sized>(
        &self,
        sink: &mut S,
        inputs: FrameInputs,
        receiver: &Renderable,
        casters: &[Renderable],
    ) -> FrameContext {
        let frame = FrameContext::new(&self.plane, inputs);
        if ShadowProjector::is_degenerate(&self.plane, frame.light) {
            log::warn!("light {} lies on the receiver plane", frame.light);
        }

        sink.begin_frame(&frame);
        for pass in FRAME_PASSES {
            let pipeline = pass.pipeline();
            sink.begin_pass(pass, pipeline);
            let drawn = match pass {
                PassKind::Receiver => std::slice::from_ref(receiver),
                PassKind::Shadow | PassKind::Caster => casters,
            };
            for renderable in drawn {
                sink.draw(&draw_call(pass, &frame, renderable));
            }
        }
        sink.end_frame();
        frame
    }
}

fn draw_call(pass: PassKind, frame: &FrameContext, renderable: &Renderable) -> DrawCall {
    let pipeline = pass.pipeline();
    let (color, shadow) = match pipeline {
        Pipeline::Normal => (renderable.instance.color, None),
        Pipeline::Shadow => (SHADOW_COLOR, Some(frame.shadow)),
    };
    DrawCall {
        pass,
        pipeline,
        mesh: renderable.mesh,
        model: renderable.instance.model_matrix(),
        color,
        shadow,
    }
}

/// Event captured by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    BeginFrame(FrameContext),
    BeginPass(PassKind, Pipeline),
    Draw(DrawCall),
    EndFrame,
}

/// Sink that keeps every event, for headless runs and for checking the
/// pass order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<Recorded>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn frames(&self) -> Vec<FrameContext> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Recorded::BeginFrame(frame) => Some(*frame),
                _ => None,
            })
            .collect()
    }

    pub fn draws(&self) -> impl Iterator<Item = &DrawCall> {
        self.events.iter().filter_map(|event| match event {
            Recorded::Draw(call) => Some(call),
            _ => None,
        })
    }

    pub fn draw_count(&self, pass: PassKind) -> usize {
        self.draws().filter(|call| call.pass == pass).count()
    }

    /// Checks that every recorded frame issued exactly the receiver, shadow
    /// and caster passes in that order. Draws must sit inside their pass and
    /// use its pipeline, and only shadow draws carry the shadow matrix.
    pub fn verify_pass_order(&self) -> Result<usize, String> {
        let mut frames = 0;
        let mut in_frame = false;
        let mut next_pass = 0usize;
        let mut current: Option<PassKind> = None;

        for (index, event) in self.events.iter().enumerate() {
            match event {
                Recorded::BeginFrame(_) => {
                    if in_frame {
                        return Err(format!("event {index}: frame started twice"));
                    }
                    in_frame = true;
                    next_pass = 0;
                    current = None;
                }
                Recorded::BeginPass(pass, pipeline) => {
                    let expected = FRAME_PASSES.get(next_pass).copied();
                    if !in_frame || expected != Some(*pass) {
                        return Err(format!(
                            "event {index}: got {pass:?} pass, expected {expected:?}"
                        ));
                    }
                    if pass.pipeline() != *pipeline {
                        return Err(format!(
                            "event {index}: {pass:?} pass bound {pipeline:?} pipeline"
                        ));
                    }
                    next_pass += 1;
                    current = Some(*pass);
                }
                Recorded::Draw(call) => {
                    if current != Some(call.pass) {
                        return Err(format!(
                            "event {index}: {:?} draw outside its pass",
                            call.pass
                        ));
                    }
                    if call.pipeline != call.pass.pipeline() {
                        return Err(format!(
                            "event {index}: {:?} draw used {:?} pipeline",
                            call.pass, call.pipeline
                        ));
                    }
                    if call.shadow.is_some() != (call.pipeline == Pipeline::Shadow) {
                        return Err(format!(
                            "event {index}: {:?} draw has shadow matrix {}",
                            call.pass,
                            if call.shadow.is_some() { "set" } else { "missing" }
                        ));
                    }
                }
                Recorded::EndFrame => {
                    if !in_frame || next_pass != FRAME_PASSES.len() {
                        return Err(format!("event {index}: frame ended early"));
                    }
                    in_frame = false;
                    current = None;
                    frames += 1;
                }
            }
        }
        if in_frame {
            return Err("last frame never ended".to_string());
        }
        Ok(frames)
    }
}

impl DrawSink for RecordingSink {
    fn begin_frame(&mut self, frame: &FrameContext) {
        self.events.push(Recorded::BeginFrame(*frame));
    }

    fn begin_pass(&mut self, pass: PassKind, pipeline: Pipeline) {
        self.events.push(Recorded::BeginPass(pass, pipeline));
    }

    fn draw(&mut self, call: &DrawCall) {
        self.events.push(Recorded::Draw(*call));
    }

    fn end_frame(&mut self) {
        self.events.push(Recorded::EndFrame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECEIVER: MeshHandle = MeshHandle(0);
    const CASTER: MeshHandle = MeshHandle(1);

    fn inputs(light_height: f32) -> FrameInputs {
        FrameInputs {
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            light: Vec3::new(0.0, light_height, 0.0),
        }
    }

    fn receiver() -> Renderable {
        Renderable {
            mesh: RECEIVER,
            instance: InstanceParams::default(),
        }
    }

    fn casters() -> Vec<Renderable> {
        (0..3)
            .map(|i| Renderable {
                mesh: CASTER,
                instance: InstanceParams::new(
                    Vec3::new(i as f32 * 10.0, 3.0, 0.0),
                    0.7,
                    Vec3::new(0.8, 0.2, 0.1),
                ),
            })
            .collect()
    }

    #[test]
    fn model_matrix_scales_then_translates() {
        let params = InstanceParams::new(Vec3::new(1.0, 2.0, 3.0), 2.0, Vec3::ONE);
        let moved = params.model_matrix().transform_point3(Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(moved, Vec3::new(3.0, 2.0, 3.0));
    }

    #[test]
    fn passes_are_issued_in_order() {
        let renderer = FrameRenderer::new(Plane::horizontal(4.0));
        let mut sink = RecordingSink::new();
        renderer.render_frame(&mut sink, inputs(30.0), &receiver(), &casters());

        let passes: Vec<PassKind> = sink
            .events
            .iter()
            .filter_map(|event| match event {
                Recorded::BeginPass(pass, _) => Some(*pass),
                _ => None,
            })
            .collect();
        assert_eq!(passes, FRAME_PASSES.to_vec());
        assert_eq!(sink.verify_pass_order(), Ok(1));
        assert_eq!(sink.draw_count(PassKind::Receiver), 1);
        assert_eq!(sink.draw_count(PassKind::Shadow), 3);
        assert_eq!(sink.draw_count(PassKind::Caster), 3);
    }

    #[test]
    fn shadow_draws_are_flat_and_untested() {
        let renderer = FrameRenderer::new(Plane::horizontal(4.0));
        let mut sink = RecordingSink::new();
        let frame = renderer.render_frame(&mut sink, inputs(30.0), &receiver(), &casters());

        for call in sink.draws() {
            let depth = call.pipeline.depth_state();
            match call.pass {
                PassKind::Shadow => {
                    assert_eq!(call.shadow, Some(frame.shadow));
                    assert_eq!(call.color, SHADOW_COLOR);
                    assert!(!depth.test && !depth.write);
                }
                PassKind::Receiver | PassKind::Caster => {
                    assert_eq!(call.shadow, None);
                    assert!(depth.test && depth.write);
                }
            }
        }
    }

    #[test]
    fn caster_pass_keeps_real_transform_and_color() {
        let renderer = FrameRenderer::new(Plane::horizontal(4.0));
        let mut sink = RecordingSink::new();
        let casters = casters();
        renderer.render_frame(&mut sink, inputs(30.0), &receiver(), &casters);

        let lit: Vec<&DrawCall> = sink
            .draws()
            .filter(|call| call.pass == PassKind::Caster)
            .collect();
        for (call, caster) in lit.iter().zip(&casters) {
            assert_eq!(call.model, caster.instance.model_matrix());
            assert_eq!(call.color, caster.instance.color);
        }
    }

    #[test]
    fn out_of_order_passes_are_rejected() {
        let mut sink = RecordingSink::new();
        let frame = FrameContext::new(&Plane::horizontal(4.0), inputs(30.0));
        sink.begin_frame(&frame);
        sink.begin_pass(PassKind::Receiver, Pipeline::Normal);
        sink.begin_pass(PassKind::Caster, Pipeline::Normal);
        sink.begin_pass(PassKind::Shadow, Pipeline::Shadow);
        sink.end_frame();
        assert!(sink.verify_pass_order().is_err());

        let mut wrong_pipeline = RecordingSink::new();
        wrong_pipeline.begin_frame(&frame);
        wrong_pipeline.begin_pass(PassKind::Receiver, Pipeline::Normal);
        wrong_pipeline.begin_pass(PassKind::Shadow, Pipeline::Normal);
        assert!(wrong_pipeline.verify_pass_order().is_err());

        let shadow = frame.shadow;
        let draw = DrawCall {
            pass: PassKind::Shadow,
            pipeline: Pipeline::Shadow,
            mesh: CASTER,
            model: Mat4::IDENTITY,
            color: Vec3::ZERO,
            shadow: Some(shadow),
        };
        let misconfigured = [
            DrawCall {
                pipeline: Pipeline::Normal,
                shadow: None,
                ..draw
            },
            DrawCall {
                shadow: None,
                ..draw
            },
            DrawCall {
                pass: PassKind::Caster,
                ..draw
            },
        ];
        for call in misconfigured {
            let mut sink = RecordingSink::new();
            sink.begin_frame(&frame);
            sink.begin_pass(PassKind::Receiver, Pipeline::Normal);
            sink.begin_pass(PassKind::Shadow, Pipeline::Shadow);
            if call.pass == PassKind::Caster {
                sink.begin_pass(PassKind::Caster, Pipeline::Normal);
            }
            sink.draw(&call);
            if call.pass == PassKind::Shadow {
                sink.begin_pass(PassKind::Caster, Pipeline::Normal);
            }
            sink.end_frame();
            assert!(sink.verify_pass_order().is_err(), "accepted {call:?}");
        }

        let mut valid = RecordingSink::new();
        valid.begin_frame(&frame);
        valid.begin_pass(PassKind::Receiver, Pipeline::Normal);
        valid.begin_pass(PassKind::Shadow, Pipeline::Shadow);
        valid.draw(&draw);
        valid.begin_pass(PassKind::Caster, Pipeline::Normal);
        valid.end_frame();
        assert_eq!(valid.verify_pass_order(), Ok(1));
    }

    #[test]
    fn matrix_is_recomputed_every_frame() {
        let renderer = FrameRenderer::new(Plane::horizontal(4.0));
        let mut sink = RecordingSink::new();
        for tick in 0..8 {
            let height = 30.0 + 10.0 * (0.5 * tick as f32).sin();
            renderer.render_frame(&mut sink, inputs(height), &receiver(), &casters());
        }
        assert_eq!(sink.verify_pass_order(), Ok(8));

        let frames = sink.frames();
        for pair in frames.windows(2) {
            assert_ne!(pair[0].light, pair[1].light);
            assert_ne!(pair[0].shadow, pair[1].shadow);
        }
        for frame in &frames {
            assert_eq!(
                frame.shadow,
                ShadowProjector::compute(renderer.plane(), frame.light)
            );
        }
    }
}
