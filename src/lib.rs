//! Planar projective shadows.
//!
//! Casters are flattened onto a single receiving plane through a per-frame
//! shadow matrix and drawn between the receiver and the lit casters, which
//! avoids z-fighting without depth bias. The math and the draw ordering are
//! independent of the GPU backend so they can be exercised headlessly.

pub mod app;
pub mod camera;
pub mod frame;
pub mod headless;
pub mod input;
pub mod mesh;
pub mod render;
pub mod scene;
pub mod shadow;

pub use camera::{CameraParams, OrbitCamera};
pub use frame::{
    DrawCall, DrawSink, FrameContext, FrameInputs, FrameRenderer, InstanceParams, MeshHandle,
    PassKind, Pipeline, RecordingSink, Renderable,
};
pub use mesh::{load_obj_from_str, Mesh};
pub use render::Renderer;
pub use scene::{CasterRing, LightAnimator, SceneConfig};
pub use shadow::{Plane, PlaneCoefficients, PlaneError, ShadowMatrix, ShadowProjector};
