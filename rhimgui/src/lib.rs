//! rhimgui integrates Dear ImGui into retained-mode, multi-threaded
//! scene-graph renderers.
//!
//! An immediate-mode UI rebuilds its draw list every frame; a scene graph
//! retains GPU resources across frames and may record on a dedicated render
//! thread. This crate bridges the two:
//!
//! - [`UiContext`] runs one UI frame on the producing context and captures
//!   it into an immutable, thread-transferable [`FrameSnapshot`];
//! - [`SnapshotHandoff`] moves the snapshot to the recording context, one
//!   frame in flight at a time;
//! - [`ResourceCache`] owns the persistent GPU objects (buffers, textures,
//!   samplers, the pipeline) and grows or rebuilds them on demand;
//! - [`FrameRecorder`] turns a snapshot plus the cache into a resource
//!   update batch and an ordered sequence of draw calls.
//!
//! [`ImguiBridge`] packages the recording side for hosts with a
//! sync/prepare/record node lifecycle.
//!
//! The GPU is reached through the narrow contract in [`rhi`]; the default
//! backend targets wgpu (feature `backend_wgpu`, enabled by default).
//!
//! # Example
//!
//! ```rust,ignore
//! use rhimgui::{BridgeConfig, ImguiBridge, SnapshotHandoff, UiContext, rhi::wgpu::WgpuRhi};
//!
//! let (producer, consumer) = SnapshotHandoff::channel();
//! let mut ui = UiContext::new();
//! let mut bridge = ImguiBridge::new(
//!     WgpuRhi::new(device, queue.clone()),
//!     BridgeConfig::default(),
//!     consumer,
//! );
//!
//! // Producing context, once per UI frame:
//! let snapshot = ui.capture_frame([1280.0, 720.0], scale, [0.0, 0.0], |ui| {
//!     ui.show_demo_window(&mut true);
//! })?;
//! producer.publish(snapshot);
//!
//! // Recording context, once per display frame:
//! bridge.sync(); // host barrier: producer quiesced
//! let target = WgpuRhi::target_info([2560, 1440], surface_format, None, 1);
//! if let Some(batch) = bridge.prepare_frame(&target, 1.0, None)? {
//!     batch.commit(&queue);
//! }
//! // ... inside the render pass:
//! bridge.record_frame(&mut render_pass);
//! ```
//!
//! # Threading
//!
//! The producing and recording contexts may be the same thread or two
//! threads. Snapshots are moved, never shared; the cache and recorder are
//! owned by the recording context alone. The one contract the host must
//! uphold is the synchronization barrier: the producing context is quiesced
//! while [`ImguiBridge::sync`] (and any texture registration) runs.

/// Scene integration aggregate and custom-render hook.
pub mod bridge;
/// GPU resource ownership and lazy (re)creation.
pub mod cache;
/// Immediate-mode frame capture and input plumbing.
pub mod capture;
/// Snapshot ownership transfer between contexts.
pub mod handoff;
/// Snapshot-to-GPU conversion.
pub mod recorder;
/// The hardware-abstraction contract and its backends.
pub mod rhi;
/// The frame snapshot data model.
pub mod snapshot;
/// winit event mapping for the capture side.
#[cfg(feature = "winit")]
pub mod winit_support;

#[cfg(test)]
mod test;

pub use bridge::{BridgeConfig, CustomRenderHook, ImguiBridge};
pub use cache::{ResourceCache, TextureOwnership, TextureRecord, TextureSource};
pub use capture::{CaptureError, UiContext};
pub use handoff::{SnapshotConsumer, SnapshotHandoff, SnapshotProducer};
pub use recorder::FrameRecorder;
pub use rhi::{
    BufferUsage, CommandRecorder, FilterMode, PipelineSpec, RenderTargetInfo, ResourceError,
    ResourceUpdates, Rhi,
};
pub use snapshot::{AtlasImage, DrawCommand, FrameSnapshot, SegmentBuffer, TexId};

// Re-exported so hosts build against the same versions the bridge uses.
pub use imgui;
#[cfg(feature = "backend_wgpu")]
pub use wgpu;
