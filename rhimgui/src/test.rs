//! End-to-end scenarios over the testing backend.

use glam::Mat4;
use parking_lot::{Mutex, MutexGuard};
use smallvec::smallvec;

use crate::{
    bridge::{BridgeConfig, CustomRenderHook, ImguiBridge},
    cache::{ResourceCache, TextureOwnership, TextureSource},
    handoff::SnapshotHandoff,
    recorder::FrameRecorder,
    rhi::{
        FilterMode, PipelineSpec, RenderTargetInfo,
        testing::{RecordedOp, TestRecorder, TestRhi, TestTexture},
    },
    snapshot::{AtlasImage, DrawCommand, FrameSnapshot, INDEX_STRIDE, SegmentBuffer, TexId, VERTEX_STRIDE},
};

static UI_CONTEXT_LOCK: Mutex<()> = Mutex::new(());

/// The UI library allows one active context per process; tests that create
/// a [`crate::UiContext`] serialize on this.
pub(crate) fn ui_context_lock() -> MutexGuard<'static, ()> {
    UI_CONTEXT_LOCK.lock()
}

fn atlas() -> AtlasImage {
    AtlasImage {
        width: 8,
        height: 8,
        data: vec![0xff; 8 * 8 * 4],
    }
}

/// One window containing one colored rectangle: a single segment holding
/// four vertices, and two draw commands of one triangle's worth of indices
/// each, both sampling the font atlas.
fn rectangle_snapshot() -> FrameSnapshot {
    let vertex_data = vec![0u8; (4 * VERTEX_STRIDE) as usize];
    let indices: [u32; 6] = [0, 1, 2, 2, 1, 3];
    let index_data: Vec<u8> = bytemuck::cast_slice(&indices).to_vec();
    let clip = [10.0, 10.0, 110.0, 60.0];

    FrameSnapshot {
        total_vbuf_size: vertex_data.len() as u32,
        total_ibuf_size: index_data.len() as u32,
        vbuf: smallvec![SegmentBuffer {
            offset: 0,
            data: vertex_data,
        }],
        ibuf: smallvec![SegmentBuffer {
            offset: 0,
            data: index_data,
        }],
        draws: vec![
            DrawCommand {
                segment: 0,
                texture: TexId::FONT_ATLAS,
                index_offset: 0,
                elem_count: 3,
                clip_rect: clip,
                item_pixel_offset: [0.0, 0.0],
            },
            DrawCommand {
                segment: 0,
                texture: TexId::FONT_ATLAS,
                index_offset: 3 * INDEX_STRIDE,
                elem_count: 3,
                clip_rect: clip,
                item_pixel_offset: [0.0, 0.0],
            },
        ],
        output_pixel_size: [640, 480],
        projection: Mat4::orthographic_rh(0.0, 640.0, 480.0, 0.0, -1.0, 1.0),
        font_atlas: Some(atlas()),
    }
}

fn target(format: Vec<u32>) -> RenderTargetInfo<TestRhi> {
    RenderTargetInfo {
        pixel_size: [640, 480],
        format,
    }
}

#[test]
fn one_rectangle_frame_creates_and_draws_exactly_what_it_needs() {
    let rhi = TestRhi::new();
    let mut cache = ResourceCache::new(rhi.clone(), PipelineSpec::default());
    let mut recorder = FrameRecorder::new();
    let snapshot = rectangle_snapshot();

    let batch = recorder
        .prepare(&snapshot, &mut cache, &target(vec![1]), 1.0, None)
        .unwrap();

    // Buffers sized to exactly the rectangle's bytes.
    assert_eq!(cache.vertex_buffer().map(|b| b.size()), Some(80));
    assert_eq!(cache.index_buffer().map(|b| b.size()), Some(24));

    // Exactly one texture (the font atlas, identity 0) and one pipeline.
    let counts = rhi.creation_counts();
    assert_eq!(counts.textures, 1);
    assert_eq!(counts.pipelines, 1);
    assert_eq!(batch.texture_uploads.len(), 1);

    // Segment uploads plus the first frame's projection and opacity.
    assert_eq!(batch.buffer_writes.len(), 4);

    let mut rec = TestRecorder::new();
    recorder.record(&snapshot, &cache, &mut rec);

    assert_eq!(rec.draw_count(), 2);
    let viewports: Vec<_> = rec
        .ops
        .iter()
        .filter(|op| matches!(op, RecordedOp::Viewport { .. }))
        .collect();
    assert_eq!(viewports.len(), 1);
    assert_eq!(rec.scissors(), vec![(10, 10, 100, 50), (10, 10, 100, 50)]);

    // Index offsets advance by one triangle.
    let index_inputs: Vec<u64> = rec
        .ops
        .iter()
        .filter_map(|op| match op {
            RecordedOp::IndexInput { offset, .. } => Some(*offset),
            _ => None,
        })
        .collect();
    assert_eq!(index_inputs, vec![0, 12]);
}

struct RegisterExternal {
    texture: TestTexture,
}

impl CustomRenderHook<TestRhi> for RegisterExternal {
    fn sync(&mut self, cache: &mut ResourceCache<TestRhi>) {
        cache.register_texture(
            TexId::new(1),
            TextureSource::External(self.texture.clone()),
            FilterMode::Linear,
            TextureOwnership::Caller,
        );
    }
}

#[test]
fn caller_owned_texture_survives_release() {
    let rhi = TestRhi::new();
    let external = rhi.external_texture([64, 64]);
    let (producer, consumer) = SnapshotHandoff::channel();
    let mut bridge = ImguiBridge::new(rhi.clone(), BridgeConfig::default(), consumer);
    bridge.set_custom_render_hook(Box::new(RegisterExternal {
        texture: external.clone(),
    }));

    let mut snapshot = rectangle_snapshot();
    snapshot.draws.push(DrawCommand {
        segment: 0,
        texture: TexId::new(1),
        index_offset: 0,
        elem_count: 3,
        clip_rect: [0.0, 0.0, 64.0, 64.0],
        item_pixel_offset: [0.0, 0.0],
    });
    producer.publish(snapshot);

    bridge.sync();
    let batch = bridge
        .prepare_frame(&target(vec![1]), 1.0, None)
        .unwrap();
    assert!(batch.is_some());

    let mut rec = TestRecorder::new();
    bridge.record_frame(&mut rec);
    assert_eq!(rec.draw_count(), 3);

    let font_texture = bridge
        .cache()
        .texture_record(TexId::FONT_ATLAS)
        .and_then(|record| record.texture())
        .cloned();

    bridge.release_resources();

    let font_texture = match font_texture {
        Some(texture) => texture,
        None => panic!("font texture missing before release"),
    };
    assert!(font_texture.is_destroyed());
    assert!(!external.is_destroyed());
}

#[test]
fn reparenting_rebuilds_the_pipeline_exactly_once() {
    let rhi = TestRhi::new();
    let (producer, consumer) = SnapshotHandoff::channel();
    let mut bridge = ImguiBridge::new(rhi.clone(), BridgeConfig::default(), consumer);

    producer.publish(rectangle_snapshot());
    bridge.sync();

    bridge.prepare_frame(&target(vec![1]), 1.0, None).unwrap();
    bridge.prepare_frame(&target(vec![1]), 1.0, None).unwrap();
    assert_eq!(rhi.creation_counts().pipelines, 1);

    // The item moved into a layer with a different pass format.
    bridge.prepare_frame(&target(vec![9]), 1.0, None).unwrap();
    assert_eq!(rhi.creation_counts().pipelines, 2);
}

#[test]
fn bridge_without_snapshot_prepares_and_records_nothing() {
    let rhi = TestRhi::new();
    let (_producer, consumer) = SnapshotHandoff::channel();
    let mut bridge = ImguiBridge::new(rhi.clone(), BridgeConfig::default(), consumer);

    bridge.sync();
    assert!(!bridge.has_frame());
    let batch = bridge.prepare_frame(&target(vec![1]), 1.0, None).unwrap();
    assert!(batch.is_none());

    let mut rec = TestRecorder::new();
    bridge.record_frame(&mut rec);
    assert!(rec.ops.is_empty());
    assert_eq!(rhi.creation_counts(), Default::default());
}

#[test]
fn captured_ui_frame_flows_through_the_whole_bridge() {
    let _guard = ui_context_lock();
    let mut ui = crate::capture::UiContext::new();
    let (producer, consumer) = SnapshotHandoff::channel();
    let rhi = TestRhi::new();
    let mut bridge = ImguiBridge::new(rhi.clone(), BridgeConfig::default(), consumer);

    let snapshot = ui
        .capture_frame([640.0, 480.0], 1.0, [0.0, 0.0], |ui| {
            ui.window("scenario")
                .size([220.0, 140.0], imgui::Condition::Always)
                .position([20.0, 20.0], imgui::Condition::Always)
                .build(|| {
                    ui.text("bridged");
                });
        })
        .unwrap();
    let expected_draws = snapshot.draws.len();
    let expected_vbuf = snapshot.total_vbuf_size as u64;
    assert!(expected_draws > 0);

    producer.publish(snapshot);
    bridge.sync();
    let batch = bridge.prepare_frame(&target(vec![1]), 1.0, None).unwrap();
    assert!(batch.is_some());
    assert_eq!(bridge.cache().vertex_buffer().map(|b| b.size()), Some(expected_vbuf));

    let mut rec = TestRecorder::new();
    bridge.record_frame(&mut rec);
    assert_eq!(rec.draw_count(), expected_draws);

    // Every recorded scissor is contained in the viewport.
    for (x, y, w, h) in rec.scissors() {
        assert!(x + w <= 640);
        assert!(y + h <= 480);
    }
}
