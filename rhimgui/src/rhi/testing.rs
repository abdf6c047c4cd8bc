//! Deterministic recording backend for tests.
//!
//! Handles are numbered `Arc`s so tests can check object identity across
//! `ensure` calls, texture liveness after `release`, and the exact sequence
//! of recorded operations, all without a GPU. Creation failures are
//! injectable to exercise the frame-skip path.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use parking_lot::Mutex;

use crate::{
    rhi::{BufferUsage, CommandRecorder, FilterMode, PipelineSpec, ResourceError, ResourceUpdates, Rhi},
    snapshot::AtlasImage,
};

#[derive(Default)]
struct RhiState {
    next_id: u64,
    counts: CreationCounts,
    fail_next_create: bool,
}

/// How many objects of each kind the backend has created so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreationCounts {
    pub buffers: u32,
    pub textures: u32,
    pub samplers: u32,
    pub shader_resources: u32,
    pub pipelines: u32,
}

/// Recording device backend. Cloning shares the same counters.
#[derive(Clone, Default)]
pub struct TestRhi {
    state: Arc<Mutex<RhiState>>,
}

impl TestRhi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `create_*` call fail with `CreateFailed`.
    pub fn fail_next_create(&self) {
        self.state.lock().fail_next_create = true;
    }

    pub fn creation_counts(&self) -> CreationCounts {
        self.state.lock().counts
    }

    /// A texture created outside the cache, standing in for host-rendered
    /// content. Not counted in [`CreationCounts::textures`].
    pub fn external_texture(&self, size: [u32; 2]) -> TestTexture {
        TestTexture(Arc::new(TextureInner {
            id: self.next_id(),
            size,
            destroyed: AtomicBool::new(false),
        }))
    }

    fn next_id(&self) -> u64 {
        let mut state = self.state.lock();
        state.next_id += 1;
        state.next_id
    }

    fn check_create(&self, kind: &'static str) -> Result<(), ResourceError> {
        let mut state = self.state.lock();
        if state.fail_next_create {
            state.fail_next_create = false;
            return Err(ResourceError::create_failed(kind, "injected failure"));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct BufferInner {
    id: u64,
    usage: BufferUsage,
    size: u64,
}

#[derive(Debug, Clone)]
pub struct TestBuffer(Arc<BufferInner>);

impl TestBuffer {
    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn usage(&self) -> BufferUsage {
        self.0.usage
    }

    pub fn size(&self) -> u64 {
        self.0.size
    }
}

#[derive(Debug)]
struct TextureInner {
    id: u64,
    size: [u32; 2],
    destroyed: AtomicBool,
}

#[derive(Debug, Clone)]
pub struct TestTexture(Arc<TextureInner>);

impl TestTexture {
    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn size(&self) -> [u32; 2] {
        self.0.size
    }

    /// Whether `destroy_texture` ran on this texture. Dropping a handle
    /// never sets this; only an explicit destroy does, which is what the
    /// ownership tests observe.
    pub fn is_destroyed(&self) -> bool {
        self.0.destroyed.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct SamplerInner {
    id: u64,
    filter: FilterMode,
}

#[derive(Debug, Clone)]
pub struct TestSampler(Arc<SamplerInner>);

impl TestSampler {
    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn filter(&self) -> FilterMode {
        self.0.filter
    }
}

#[derive(Debug)]
struct ShaderResourcesInner {
    id: u64,
    texture: u64,
}

#[derive(Debug, Clone)]
pub struct TestShaderResources(Arc<ShaderResourcesInner>);

impl TestShaderResources {
    pub fn id(&self) -> u64 {
        self.0.id
    }

    /// Id of the texture this set binds.
    pub fn texture(&self) -> u64 {
        self.0.texture
    }
}

#[derive(Debug)]
struct PipelineInner {
    id: u64,
    spec: PipelineSpec,
    format: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct TestPipeline(Arc<PipelineInner>);

impl TestPipeline {
    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn spec(&self) -> PipelineSpec {
        self.0.spec
    }

    pub fn format(&self) -> &[u32] {
        &self.0.format
    }
}

/// One buffered `update_buffer` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferWrite {
    pub buffer: u64,
    pub offset: u64,
    pub bytes: Vec<u8>,
}

/// One buffered `upload_texture` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureUpload {
    pub texture: u64,
    pub size: [u32; 2],
}

#[derive(Debug, Default)]
pub struct TestUpdateBatch {
    pub buffer_writes: Vec<BufferWrite>,
    pub texture_uploads: Vec<TextureUpload>,
}

impl ResourceUpdates<TestRhi> for TestUpdateBatch {
    fn update_buffer(&mut self, buffer: &TestBuffer, offset: u64, bytes: &[u8]) {
        self.buffer_writes.push(BufferWrite {
            buffer: buffer.id(),
            offset,
            bytes: bytes.to_vec(),
        });
    }

    fn upload_texture(&mut self, texture: &TestTexture, image: &AtlasImage) {
        self.texture_uploads.push(TextureUpload {
            texture: texture.id(),
            size: [image.width, image.height],
        });
    }
}

impl Rhi for TestRhi {
    type Buffer = TestBuffer;
    type Texture = TestTexture;
    type Sampler = TestSampler;
    type ShaderResources = TestShaderResources;
    type Pipeline = TestPipeline;
    type PassFormat = Vec<u32>;
    type UpdateBatch = TestUpdateBatch;

    fn new_update_batch(&self) -> TestUpdateBatch {
        TestUpdateBatch::default()
    }

    fn create_buffer(
        &self,
        usage: BufferUsage,
        size: u64,
        _label: &str,
    ) -> Result<TestBuffer, ResourceError> {
        self.check_create("buffer")?;
        self.state.lock().counts.buffers += 1;
        Ok(TestBuffer(Arc::new(BufferInner {
            id: self.next_id(),
            usage,
            size,
        })))
    }

    fn create_texture(&self, size: [u32; 2], _label: &str) -> Result<TestTexture, ResourceError> {
        self.check_create("texture")?;
        self.state.lock().counts.textures += 1;
        Ok(TestTexture(Arc::new(TextureInner {
            id: self.next_id(),
            size,
            destroyed: AtomicBool::new(false),
        })))
    }

    fn create_sampler(&self, filter: FilterMode) -> Result<TestSampler, ResourceError> {
        self.check_create("sampler")?;
        self.state.lock().counts.samplers += 1;
        Ok(TestSampler(Arc::new(SamplerInner {
            id: self.next_id(),
            filter,
        })))
    }

    fn create_shader_resources(
        &self,
        _uniforms: &TestBuffer,
        texture: &TestTexture,
        _sampler: &TestSampler,
    ) -> Result<TestShaderResources, ResourceError> {
        self.check_create("shader resources")?;
        self.state.lock().counts.shader_resources += 1;
        Ok(TestShaderResources(Arc::new(ShaderResourcesInner {
            id: self.next_id(),
            texture: texture.id(),
        })))
    }

    fn create_pipeline(
        &self,
        spec: PipelineSpec,
        format: &Vec<u32>,
    ) -> Result<TestPipeline, ResourceError> {
        self.check_create("pipeline")?;
        self.state.lock().counts.pipelines += 1;
        Ok(TestPipeline(Arc::new(PipelineInner {
            id: self.next_id(),
            spec,
            format: format.clone(),
        })))
    }

    fn destroy_texture(&self, texture: TestTexture) {
        texture.0.destroyed.store(true, Ordering::SeqCst);
    }
}

/// Everything a [`TestRecorder`] saw, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedOp {
    Viewport { width: f32, height: f32 },
    Scissor { x: u32, y: u32, width: u32, height: u32 },
    BindPipeline(u64),
    BindShaderResources(u64),
    VertexInput { buffer: u64, offset: u64 },
    IndexInput { buffer: u64, offset: u64 },
    DrawIndexed { elem_count: u32 },
}

/// Command target capturing the recorded operation sequence.
#[derive(Debug, Default)]
pub struct TestRecorder {
    pub ops: Vec<RecordedOp>,
}

impl TestRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draw_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, RecordedOp::DrawIndexed { .. }))
            .count()
    }

    pub fn scissors(&self) -> Vec<(u32, u32, u32, u32)> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                RecordedOp::Scissor { x, y, width, height } => Some((*x, *y, *width, *height)),
                _ => None,
            })
            .collect()
    }
}

impl CommandRecorder<TestRhi> for TestRecorder {
    fn set_viewport(&mut self, width: f32, height: f32) {
        self.ops.push(RecordedOp::Viewport { width, height });
    }

    fn set_scissor(&mut self, x: u32, y: u32, width: u32, height: u32) {
        self.ops.push(RecordedOp::Scissor { x, y, width, height });
    }

    fn set_pipeline(&mut self, pipeline: &TestPipeline) {
        self.ops.push(RecordedOp::BindPipeline(pipeline.id()));
    }

    fn set_shader_resources(&mut self, resources: &TestShaderResources) {
        self.ops.push(RecordedOp::BindShaderResources(resources.id()));
    }

    fn set_vertex_input(&mut self, buffer: &TestBuffer, offset: u64) {
        self.ops.push(RecordedOp::VertexInput {
            buffer: buffer.id(),
            offset,
        });
    }

    fn set_index_input(&mut self, buffer: &TestBuffer, offset: u64) {
        self.ops.push(RecordedOp::IndexInput {
            buffer: buffer.id(),
            offset,
        });
    }

    fn draw_indexed(&mut self, elem_count: u32) {
        self.ops.push(RecordedOp::DrawIndexed { elem_count });
    }
}
