use anyhow::{anyhow, Result};
use glam::Vec3;

use crate::camera::OrbitCamera;
use crate::frame::{FrameInputs, FrameRenderer, MeshHandle, PassKind, RecordingSink};
use crate::scene::{CasterMeshes, SceneConfig};

const RECEIVER: MeshHandle = MeshHandle(0);
const MESHES: CasterMeshes = CasterMeshes {
    model: MeshHandle(1),
    cube: MeshHandle(2),
};

/// What one simulated frame issued.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSummary {
    pub tick: u64,
    pub light: Vec3,
    pub receiver_draws: usize,
    pub shadow_draws: usize,
    pub caster_draws: usize,
    /// Where the centre of the first caster lands on the receiver.
    pub probe: Option<(Vec3, Option<Vec3>)>,
}

/// Runs the frame protocol without a GPU, checking the pass order of every
/// frame as it goes.
pub fn simulate(scene: &SceneConfig, frames: u64, aspect: f32) -> Result<Vec<FrameSummary>> {
    let renderer = FrameRenderer::new(scene.plane()?);
    let camera = OrbitCamera::new(scene.camera).params(aspect);
    let receiver = scene.receiver(RECEIVER);
    let mut sink = RecordingSink::new();
    let mut summaries = Vec::new();

    for tick in 0..frames {
        sink.clear();
        let casters = scene.casters(tick, &MESHES);
        let inputs = FrameInputs {
            view: camera.view,
            projection: camera.projection,
            light: scene.light.position(tick),
        };
        let frame = renderer.render_frame(&mut sink, inputs, &receiver, &casters);
        sink.verify_pass_order()
            .map_err(|err| anyhow!("frame {tick}: {err}"))?;

        let probe = casters.first().map(|caster| {
            let point = caster.instance.translate;
            (point, frame.shadow.project_point(point))
        });
        summaries.push(FrameSummary {
            tick,
            light: frame.light,
            receiver_draws: sink.draw_count(PassKind::Receiver),
            shadow_draws: sink.draw_count(PassKind::Shadow),
            caster_draws: sink.draw_count(PassKind::Caster),
            probe,
        });
    }
    Ok(summaries)
}
