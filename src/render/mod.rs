mod native;
mod shader;

pub use native::Renderer;
