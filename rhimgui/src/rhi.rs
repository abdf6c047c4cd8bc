//! The narrow hardware-abstraction contract the bridge consumes.
//!
//! The resource cache and the frame recorder never talk to a GPU API
//! directly. Everything they need is expressed by three small traits:
//!
//! - [`Rhi`]: creation of buffers, textures, samplers, shader-resource sets
//!   and the one graphics pipeline the UI uses;
//! - [`ResourceUpdates`]: a batch of buffer/texture uploads that is built
//!   during `prepare` and submitted by the caller, never by the core;
//! - [`CommandRecorder`]: the ordered viewport/scissor/bind/draw operations
//!   recorded into a render pass.
//!
//! The default implementation over wgpu lives in [`wgpu`](self::wgpu)
//! (feature `backend_wgpu`). A deterministic recording backend for tests
//! lives in [`testing`](self::testing) (feature `testing`).
//!
//! Pass compatibility is tracked through [`Rhi::PassFormat`], an opaque
//! value type compared with `==`. Pointer identity of render targets is
//! deliberately never used: a target can be torn down and recreated with an
//! identical format (window resize) without invalidating the pipeline,
//! while reparenting into a differently-formatted target triggers a
//! rebuild.

use thiserror::Error;

use crate::snapshot::{AtlasImage, TexId};

#[cfg(feature = "backend_wgpu")]
pub mod wgpu;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Errors surfaced by resource management.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// The device layer rejected creation of a GPU object. The current
    /// frame is abandoned by the caller; there are no internal retries.
    #[error("gpu {kind} creation failed: {reason}")]
    CreateFailed {
        kind: &'static str,
        reason: String,
    },
    /// A draw command references a texture identity that was never
    /// registered. Integration error; the offending draw is skipped.
    #[error("texture identity {0:?} was never registered")]
    UnknownTexture(TexId),
}

impl ResourceError {
    pub(crate) fn create_failed(kind: &'static str, reason: impl Into<String>) -> Self {
        ResourceError::CreateFailed {
            kind,
            reason: reason.into(),
        }
    }
}

/// What a buffer is bound as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    Vertex,
    Index,
    Uniform,
}

/// Texture sampling filter. Wrap mode is fixed to repeat in both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Linear,
    Nearest,
}

/// Host-configurable pipeline state. The rest of the pipeline is fixed:
/// premultiplied-alpha blending, no culling, depth write off, scissor on,
/// and the 20-byte vertex layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSpec {
    /// Depth-test against the scene so the UI participates in ordering.
    /// Depth writes stay off either way.
    pub depth_test: bool,
}

impl Default for PipelineSpec {
    fn default() -> Self {
        PipelineSpec { depth_test: true }
    }
}

/// Description of the render target a frame is prepared against.
pub struct RenderTargetInfo<R: Rhi> {
    /// Target size in device pixels.
    pub pixel_size: [u32; 2],
    /// Opaque pass-compatibility descriptor, compared by value.
    pub format: R::PassFormat,
}

/// Resource creation surface of the device layer.
///
/// All objects are single-owner handles; dropping one releases it. Textures
/// additionally support [`destroy_texture`](Rhi::destroy_texture) so the
/// cache can free cache-owned textures eagerly while merely detaching
/// caller-owned ones.
pub trait Rhi: Sized {
    type Buffer;
    type Texture;
    type Sampler;
    type ShaderResources;
    type Pipeline;
    /// Opaque serialized pass-format descriptor.
    type PassFormat: Clone + PartialEq + core::fmt::Debug;
    type UpdateBatch: ResourceUpdates<Self>;

    fn new_update_batch(&self) -> Self::UpdateBatch;

    fn create_buffer(
        &self,
        usage: BufferUsage,
        size: u64,
        label: &str,
    ) -> Result<Self::Buffer, ResourceError>;

    /// Creates an RGBA8 2D texture of the given pixel size.
    fn create_texture(&self, size: [u32; 2], label: &str) -> Result<Self::Texture, ResourceError>;

    fn create_sampler(&self, filter: FilterMode) -> Result<Self::Sampler, ResourceError>;

    /// Creates the shader-resource set binding the uniform buffer, one
    /// texture and one sampler, matching the UI pipeline's layout.
    fn create_shader_resources(
        &self,
        uniforms: &Self::Buffer,
        texture: &Self::Texture,
        sampler: &Self::Sampler,
    ) -> Result<Self::ShaderResources, ResourceError>;

    fn create_pipeline(
        &self,
        spec: PipelineSpec,
        format: &Self::PassFormat,
    ) -> Result<Self::Pipeline, ResourceError>;

    /// Eagerly frees a texture's GPU storage. Called for cache-owned
    /// textures on release; caller-owned textures are dropped (detached)
    /// without going through this.
    fn destroy_texture(&self, texture: Self::Texture);
}

/// A batch of resource uploads.
///
/// `prepare` appends updates; the batch takes effect only when the caller
/// submits it together with the frame's command buffer.
pub trait ResourceUpdates<R: Rhi> {
    fn update_buffer(&mut self, buffer: &R::Buffer, offset: u64, bytes: &[u8]);

    fn upload_texture(&mut self, texture: &R::Texture, image: &AtlasImage);
}

/// Ordered draw recording against a command target.
///
/// Offsets handed to [`set_index_input`](CommandRecorder::set_index_input)
/// are byte offsets; the index element width is always 32 bits.
pub trait CommandRecorder<R: Rhi> {
    fn set_viewport(&mut self, width: f32, height: f32);

    fn set_scissor(&mut self, x: u32, y: u32, width: u32, height: u32);

    fn set_pipeline(&mut self, pipeline: &R::Pipeline);

    fn set_shader_resources(&mut self, resources: &R::ShaderResources);

    fn set_vertex_input(&mut self, buffer: &R::Buffer, offset: u64);

    fn set_index_input(&mut self, buffer: &R::Buffer, offset: u64);

    fn draw_indexed(&mut self, elem_count: u32);
}
