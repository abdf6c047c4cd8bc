//! Retained-side aggregate tying the pieces together.
//!
//! [`ImguiBridge`] is what a scene-graph node (or any render-loop owner)
//! holds on the render-recording context: the resource cache, the frame
//! recorder and the consumer half of the snapshot handoff. Its methods
//! mirror the host's node lifecycle:
//!
//! 1. `sync` during the host's synchronization barrier (producing context
//!    quiesced): adopts the latest published snapshot and lets the custom
//!    render hook register textures;
//! 2. `prepare_frame` while a command buffer is being built, outside any
//!    render pass: returns the resource-update batch for the caller to
//!    submit;
//! 3. `record_frame` inside the render pass;
//! 4. `release_resources` on render-target teardown. The bridge can keep
//!    rendering afterwards; resources are recreated lazily.

use glam::Mat4;

use crate::{
    cache::{ResourceCache, TextureOwnership, TextureSource},
    handoff::SnapshotConsumer,
    recorder::FrameRecorder,
    rhi::{CommandRecorder, FilterMode, PipelineSpec, RenderTargetInfo, ResourceError, Rhi},
    snapshot::{FrameSnapshot, TexId},
};

/// Host-tunable bridge behavior.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Depth-test the UI against the scene (depth writes stay off). Turn
    /// off for plain overlay rendering into passes without depth.
    pub depth_test: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig { depth_test: true }
    }
}

/// Capability hook for hosts that render their own content into textures
/// shown inside the UI.
///
/// Injected into the bridge explicitly; both methods run on the
/// render-recording context. `sync` runs with the producing context
/// quiesced and is the only place custom textures may be registered.
/// `render` runs while a frame is being recorded but before the UI's
/// render pass begins.
pub trait CustomRenderHook<R: Rhi> {
    fn sync(&mut self, cache: &mut ResourceCache<R>);

    fn render(&mut self) {}
}

/// The render-recording side of the integration.
pub struct ImguiBridge<R: Rhi> {
    cache: ResourceCache<R>,
    recorder: FrameRecorder,
    consumer: SnapshotConsumer,
    current: Option<FrameSnapshot>,
    hook: Option<Box<dyn CustomRenderHook<R>>>,
}

impl<R: Rhi> ImguiBridge<R> {
    pub fn new(rhi: R, config: BridgeConfig, consumer: SnapshotConsumer) -> Self {
        ImguiBridge {
            cache: ResourceCache::new(
                rhi,
                PipelineSpec {
                    depth_test: config.depth_test,
                },
            ),
            recorder: FrameRecorder::new(),
            consumer,
            current: None,
            hook: None,
        }
    }

    pub fn set_custom_render_hook(&mut self, hook: Box<dyn CustomRenderHook<R>>) {
        self.hook = Some(hook);
    }

    /// Adopts the latest published snapshot, if any, and runs the custom
    /// render hook's sync point. Must be called under the host's barrier,
    /// with the producing context quiesced. A frame that produced no new
    /// snapshot keeps the previous one; it is re-recorded as-is.
    pub fn sync(&mut self) {
        if let Some(mut snapshot) = self.consumer.take() {
            // The atlas is registered once per arrival; the retained
            // snapshot may be re-prepared every display frame without
            // re-uploading it.
            if let Some(atlas) = snapshot.font_atlas.take() {
                self.cache.register_texture(
                    TexId::FONT_ATLAS,
                    TextureSource::Pixels(atlas),
                    FilterMode::Linear,
                    TextureOwnership::Cache,
                );
            }
            self.current = Some(snapshot);
        }
        if let Some(hook) = self.hook.as_mut() {
            hook.sync(&mut self.cache);
        }
    }

    /// Whether a snapshot is available for preparing and recording.
    pub fn has_frame(&self) -> bool {
        self.current.is_some()
    }

    /// Prepares the adopted snapshot against `target`. Returns `Ok(None)`
    /// when there is nothing to render. On `Err` the caller skips this
    /// frame's UI and retries with the next one.
    pub fn prepare_frame(
        &mut self,
        target: &RenderTargetInfo<R>,
        opacity: f32,
        projection: Option<Mat4>,
    ) -> Result<Option<R::UpdateBatch>, ResourceError> {
        let Some(snapshot) = self.current.as_ref() else {
            return Ok(None);
        };
        if let Some(hook) = self.hook.as_mut() {
            hook.render();
        }
        let batch = self
            .recorder
            .prepare(snapshot, &mut self.cache, target, opacity, projection)?;
        Ok(Some(batch))
    }

    /// Records the adopted snapshot's draws. No-op without a snapshot or
    /// with an empty one.
    pub fn record_frame<C: CommandRecorder<R>>(&self, recorder: &mut C) {
        if let Some(snapshot) = self.current.as_ref() {
            self.recorder.record(snapshot, &self.cache, recorder);
        }
    }

    /// Releases all GPU resources. Registered caller-owned textures are
    /// detached, not destroyed. The adopted snapshot is kept; resources are
    /// recreated lazily if the bridge prepares again.
    pub fn release_resources(&mut self) {
        self.cache.release();
    }

    /// Access for sync-point texture registration from outside a hook.
    pub fn cache_mut(&mut self) -> &mut ResourceCache<R> {
        &mut self.cache
    }

    pub fn cache(&self) -> &ResourceCache<R> {
        &self.cache
    }
}
