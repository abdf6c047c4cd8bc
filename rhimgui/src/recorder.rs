//! Converting a frame snapshot into resource updates and draw calls.
//!
//! [`FrameRecorder::prepare`] sizes the cache's buffers to the snapshot,
//! appends the frame's uploads to an update batch and ensures every GPU
//! object the frame needs. [`FrameRecorder::record`] then replays the
//! snapshot's draw commands, in order, against a command recorder. Both run
//! on the render-recording context; submission of the returned batch is the
//! caller's responsibility.

use glam::Mat4;
use smallvec::SmallVec;
use tracing::warn;

use crate::{
    cache::{OPACITY_OFFSET, ResourceCache, TextureOwnership, TextureSource, UNIFORM_BUFFER_SIZE},
    rhi::{CommandRecorder, FilterMode, RenderTargetInfo, ResourceError, ResourceUpdates, Rhi},
    snapshot::{DrawCommand, FrameSnapshot, TexId},
};

/// Per-recorder frame-diff state: what was last uploaded into the uniform
/// buffer, to skip redundant uploads, and the viewport recorded draws use.
#[derive(Debug, Default)]
pub struct FrameRecorder {
    last_output_size: Option<[u32; 2]>,
    last_projection: Option<Mat4>,
    last_opacity: Option<f32>,
    viewport: [u32; 2],
}

impl FrameRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the resource-update batch for one snapshot.
    ///
    /// `projection` overrides the snapshot's own orthographic projection
    /// when the host composites the UI inside a scene graph and supplies
    /// the combined model-view-projection itself.
    ///
    /// On failure the frame is abandoned: the returned error is reported to
    /// the caller, nothing is retried internally, and the diff state stays
    /// untouched so the next successful prepare re-uploads everything that
    /// was pending.
    pub fn prepare<R: Rhi>(
        &mut self,
        snapshot: &FrameSnapshot,
        cache: &mut ResourceCache<R>,
        target: &RenderTargetInfo<R>,
        opacity: f32,
        projection: Option<Mat4>,
    ) -> Result<R::UpdateBatch, ResourceError> {
        let mut batch = cache.backend().new_update_batch();

        // The font atlas travels with the first snapshot (and again after a
        // rebuild); registering it here keeps identity 0 populated before
        // any draw references it.
        if let Some(atlas) = &snapshot.font_atlas {
            cache.register_texture(
                TexId::FONT_ATLAS,
                TextureSource::Pixels(atlas.clone()),
                FilterMode::Linear,
                TextureOwnership::Cache,
            );
        }

        cache.ensure_buffers(
            snapshot.total_vbuf_size as u64,
            snapshot.total_ibuf_size as u64,
            UNIFORM_BUFFER_SIZE,
        )?;

        let effective_projection = projection.unwrap_or(snapshot.projection);
        let projection_dirty = self.last_output_size != Some(target.pixel_size)
            || self.last_projection != Some(effective_projection);
        let opacity_dirty = self.last_opacity != Some(opacity);

        {
            let vbuf = cache
                .vertex_buffer()
                .expect("ensure_buffers creates the vertex buffer");
            let ibuf = cache
                .index_buffer()
                .expect("ensure_buffers creates the index buffer");
            for segment in &snapshot.vbuf {
                batch.update_buffer(vbuf, segment.offset as u64, &segment.data);
            }
            for segment in &snapshot.ibuf {
                batch.update_buffer(ibuf, segment.offset as u64, &segment.data);
            }

            let ubuf = cache
                .uniform_buffer()
                .expect("ensure_buffers creates the uniform buffer");
            if projection_dirty {
                batch.update_buffer(ubuf, 0, bytemuck::cast_slice(&effective_projection.to_cols_array()));
            }
            if opacity_dirty {
                batch.update_buffer(ubuf, OPACITY_OFFSET, bytemuck::bytes_of(&opacity));
            }
        }

        cache.ensure_sampler()?;

        let mut ensured: SmallVec<[TexId; 8]> = SmallVec::new();
        for command in &snapshot.draws {
            if ensured.contains(&command.texture) {
                continue;
            }
            ensured.push(command.texture);
            match cache.ensure_texture(command.texture, &mut batch) {
                Ok(_) => {}
                Err(ResourceError::UnknownTexture(id)) => {
                    // Integration error, typically a registration race at
                    // startup. The draw is skipped during record; the rest
                    // of the frame still renders.
                    warn!(?id, "draw references an unregistered texture");
                }
                Err(err) => return Err(err),
            }
        }

        cache.ensure_pipeline(&target.format)?;

        self.last_output_size = Some(target.pixel_size);
        self.last_projection = Some(effective_projection);
        self.last_opacity = Some(opacity);
        self.viewport = target.pixel_size;

        Ok(batch)
    }

    /// Replays the snapshot's draws against `recorder`.
    ///
    /// The pipeline is bound once, the viewport is set once with the full
    /// target size, and commands are recorded strictly in snapshot order.
    /// An empty snapshot records nothing.
    pub fn record<R: Rhi, C: CommandRecorder<R>>(
        &self,
        snapshot: &FrameSnapshot,
        cache: &ResourceCache<R>,
        recorder: &mut C,
    ) {
        if snapshot.is_empty() {
            return;
        }
        let Some(pipeline) = cache.pipeline() else {
            warn!("record skipped, pipeline was never prepared");
            return;
        };
        let (Some(vbuf), Some(ibuf)) = (cache.vertex_buffer(), cache.index_buffer()) else {
            warn!("record skipped, buffers were never prepared");
            return;
        };

        recorder.set_pipeline(pipeline);
        let mut needs_viewport = true;

        for command in &snapshot.draws {
            let resources = cache
                .texture_record(command.texture)
                .and_then(|record| record.shader_resources());
            let Some(resources) = resources else {
                warn!(id = ?command.texture, "skipping draw with missing texture");
                continue;
            };
            let Some(segment) = snapshot.vbuf.get(command.segment) else {
                warn!(segment = command.segment, "skipping draw with out-of-range segment");
                continue;
            };

            if needs_viewport {
                needs_viewport = false;
                recorder.set_viewport(self.viewport[0] as f32, self.viewport[1] as f32);
            }

            let Some((x, y, width, height)) = scissor_for(command, self.viewport) else {
                continue;
            };
            recorder.set_scissor(x, y, width, height);
            recorder.set_shader_resources(resources);
            recorder.set_vertex_input(vbuf, segment.offset as u64);
            recorder.set_index_input(ibuf, command.index_offset as u64);
            recorder.draw_indexed(command.elem_count);
        }
    }
}

/// Derives the scissor rectangle for one draw: clip rect plus item offset,
/// clamped to the viewport on both axes and both dimensions. Clip rects can
/// legitimately exceed the viewport during resizes, so out-of-range input
/// is clamped rather than passed through; a fully clipped draw yields
/// `None` and is skipped.
fn scissor_for(command: &DrawCommand, viewport: [u32; 2]) -> Option<(u32, u32, u32, u32)> {
    let [vw, vh] = viewport;
    let x0 = (command.clip_rect[0] + command.item_pixel_offset[0]).max(0.0);
    let y0 = (command.clip_rect[1] + command.item_pixel_offset[1]).max(0.0);
    let x1 = (command.clip_rect[2] + command.item_pixel_offset[0]).min(vw as f32);
    let y1 = (command.clip_rect[3] + command.item_pixel_offset[1]).min(vh as f32);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    let x = x0.floor() as u32;
    let y = y0.floor() as u32;
    let width = (x1.ceil() as u32).min(vw) - x;
    let height = (y1.ceil() as u32).min(vh) - y;
    if width == 0 || height == 0 {
        return None;
    }
    Some((x, y, width, height))
}

#[cfg(test)]
mod tests {
    use glam::Mat4;
    use smallvec::smallvec;

    use super::*;
    use crate::{
        rhi::{
            PipelineSpec,
            testing::{RecordedOp, TestRecorder, TestRhi},
        },
        snapshot::{AtlasImage, SegmentBuffer},
    };

    fn command(texture: TexId, clip: [f32; 4]) -> DrawCommand {
        DrawCommand {
            segment: 0,
            texture,
            index_offset: 0,
            elem_count: 6,
            clip_rect: clip,
            item_pixel_offset: [0.0, 0.0],
        }
    }

    fn snapshot(draws: Vec<DrawCommand>) -> FrameSnapshot {
        FrameSnapshot {
            total_vbuf_size: 80,
            total_ibuf_size: 24,
            vbuf: smallvec![SegmentBuffer {
                offset: 0,
                data: vec![0u8; 80],
            }],
            ibuf: smallvec![SegmentBuffer {
                offset: 0,
                data: vec![0u8; 24],
            }],
            draws,
            output_pixel_size: [640, 480],
            projection: Mat4::orthographic_rh(0.0, 640.0, 480.0, 0.0, -1.0, 1.0),
            font_atlas: Some(AtlasImage {
                width: 4,
                height: 4,
                data: vec![0xff; 64],
            }),
        }
    }

    fn target(format: Vec<u32>) -> RenderTargetInfo<TestRhi> {
        RenderTargetInfo {
            pixel_size: [640, 480],
            format,
        }
    }

    fn prepared() -> (TestRhi, ResourceCache<TestRhi>, FrameRecorder, FrameSnapshot) {
        let rhi = TestRhi::new();
        let mut cache = ResourceCache::new(rhi.clone(), PipelineSpec::default());
        let mut recorder = FrameRecorder::new();
        let snap = snapshot(vec![
            command(TexId::FONT_ATLAS, [0.0, 0.0, 640.0, 480.0]),
            command(TexId::FONT_ATLAS, [10.0, 10.0, 200.0, 100.0]),
        ]);
        recorder
            .prepare(&snap, &mut cache, &target(vec![1]), 1.0, None)
            .unwrap();
        (rhi, cache, recorder, snap)
    }

    #[test]
    fn scissor_is_clamped_to_viewport() {
        let cmd = command(TexId::FONT_ATLAS, [-50.0, -20.0, 700.0, 500.0]);
        let (x, y, w, h) = match scissor_for(&cmd, [640, 480]) {
            Some(rect) => rect,
            None => panic!("scissor unexpectedly empty"),
        };
        assert_eq!((x, y), (0, 0));
        assert!(x + w <= 640 && y + h <= 480);
        assert_eq!((w, h), (640, 480));
    }

    #[test]
    fn scissor_applies_item_offset_before_clamping() {
        let mut cmd = command(TexId::FONT_ATLAS, [0.0, 0.0, 100.0, 100.0]);
        cmd.item_pixel_offset = [600.0, 0.0];
        let (x, _, w, _) = match scissor_for(&cmd, [640, 480]) {
            Some(rect) => rect,
            None => panic!("scissor unexpectedly empty"),
        };
        assert_eq!(x, 600);
        assert_eq!(w, 40);
    }

    #[test]
    fn fully_clipped_draw_yields_no_scissor() {
        let cmd = command(TexId::FONT_ATLAS, [700.0, 0.0, 800.0, 100.0]);
        assert!(scissor_for(&cmd, [640, 480]).is_none());
    }

    #[test]
    fn prepare_uploads_projection_and_opacity_once() {
        let (_, mut cache, mut recorder, snap) = prepared();

        // Same size, projection and opacity: only the segment uploads remain.
        let batch = recorder
            .prepare(&snap, &mut cache, &target(vec![1]), 1.0, None)
            .unwrap();
        assert_eq!(batch.buffer_writes.len(), 2);

        // Opacity change re-uploads just the scalar.
        let batch = recorder
            .prepare(&snap, &mut cache, &target(vec![1]), 0.5, None)
            .unwrap();
        assert_eq!(batch.buffer_writes.len(), 3);
        let opacity_write = batch
            .buffer_writes
            .iter()
            .find(|write| write.offset == OPACITY_OFFSET);
        assert!(opacity_write.is_some());
    }

    #[test]
    fn prepare_uploads_projection_on_resize() {
        let (_, mut cache, mut recorder, snap) = prepared();
        let resized = RenderTargetInfo::<TestRhi> {
            pixel_size: [800, 600],
            format: vec![1],
        };
        let batch = recorder.prepare(&snap, &mut cache, &resized, 1.0, None).unwrap();
        let projection_write = batch.buffer_writes.iter().find(|write| write.offset == 0 && write.bytes.len() == 64);
        assert!(projection_write.is_some());
    }

    #[test]
    fn pipeline_recreated_exactly_once_on_format_change() {
        let (rhi, mut cache, mut recorder, snap) = prepared();
        assert_eq!(rhi.creation_counts().pipelines, 1);

        recorder
            .prepare(&snap, &mut cache, &target(vec![2]), 1.0, None)
            .unwrap();
        assert_eq!(rhi.creation_counts().pipelines, 2);

        recorder
            .prepare(&snap, &mut cache, &target(vec![2]), 1.0, None)
            .unwrap();
        assert_eq!(rhi.creation_counts().pipelines, 2);
    }

    #[test]
    fn record_preserves_draw_order_and_sets_viewport_once() {
        let (_, cache, recorder, snap) = prepared();
        let mut rec = TestRecorder::new();
        recorder.record(&snap, &cache, &mut rec);

        assert_eq!(rec.draw_count(), 2);
        let viewports = rec
            .ops
            .iter()
            .filter(|op| matches!(op, RecordedOp::Viewport { .. }))
            .count();
        assert_eq!(viewports, 1);

        // Pipeline bound once, before any draw.
        assert!(matches!(rec.ops[0], RecordedOp::BindPipeline(_)));
        let scissors = rec.scissors();
        assert_eq!(scissors.len(), 2);
        assert_eq!(scissors[1], (10, 10, 190, 90));
    }

    #[test]
    fn record_is_noop_for_empty_snapshot() {
        let (_, cache, recorder, _) = prepared();
        let empty = snapshot(Vec::new());
        let mut rec = TestRecorder::new();
        recorder.record(&empty, &cache, &mut rec);
        assert!(rec.ops.is_empty());
    }

    #[test]
    fn unknown_texture_draw_is_skipped_not_fatal() {
        let rhi = TestRhi::new();
        let mut cache = ResourceCache::new(rhi.clone(), PipelineSpec::default());
        let mut recorder = FrameRecorder::new();
        let snap = snapshot(vec![
            command(TexId::FONT_ATLAS, [0.0, 0.0, 100.0, 100.0]),
            command(TexId::new(42), [0.0, 0.0, 100.0, 100.0]),
        ]);

        recorder
            .prepare(&snap, &mut cache, &target(vec![1]), 1.0, None)
            .unwrap();
        let mut rec = TestRecorder::new();
        recorder.record(&snap, &cache, &mut rec);
        assert_eq!(rec.draw_count(), 1);
    }

    #[test]
    fn create_failure_aborts_prepare() {
        let rhi = TestRhi::new();
        let mut cache = ResourceCache::new(rhi.clone(), PipelineSpec::default());
        let mut recorder = FrameRecorder::new();
        let snap = snapshot(vec![command(TexId::FONT_ATLAS, [0.0, 0.0, 64.0, 64.0])]);

        rhi.fail_next_create();
        let result = recorder.prepare(&snap, &mut cache, &target(vec![1]), 1.0, None);
        assert!(matches!(result, Err(ResourceError::CreateFailed { .. })));

        // The next frame succeeds and re-uploads the uniform state.
        let batch = recorder
            .prepare(&snap, &mut cache, &target(vec![1]), 1.0, None)
            .unwrap();
        assert!(batch.buffer_writes.iter().any(|write| write.bytes.len() == 64));
    }
}
