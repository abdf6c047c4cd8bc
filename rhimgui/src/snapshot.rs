//! Frame snapshot data model.
//!
//! A [`FrameSnapshot`] is the self-contained, thread-transferable capture of
//! one immediate-mode UI frame: raw vertex/index bytes split per draw list,
//! the ordered draw commands referencing them, and the frame-global state
//! (output size, projection, and on the first frame the font atlas pixels).
//! Snapshots are immutable after production and are moved, never shared,
//! between the producing and the recording context.

use glam::Mat4;
use smallvec::SmallVec;

/// Byte stride of a single UI vertex: 2xf32 position, 2xf32 texcoord,
/// 4xu8 packed color.
pub const VERTEX_STRIDE: u32 = 20;

/// Byte stride of a single index. Indices are 32-bit in the snapshot even
/// though the UI library emits 16-bit ones; widening happens during capture
/// so every index-buffer byte offset stays 4-byte aligned.
pub const INDEX_STRIDE: u32 = 4;

// The capture path copies `imgui::DrawVert` slices as raw bytes, so the
// binding's layout must match the 20-byte wire layout exactly.
const _: () = assert!(size_of::<imgui::DrawVert>() as u32 == VERTEX_STRIDE);
const _: () = assert!(core::mem::offset_of!(imgui::DrawVert, pos) == 0);
const _: () = assert!(core::mem::offset_of!(imgui::DrawVert, uv) == 8);
const _: () = assert!(core::mem::offset_of!(imgui::DrawVert, col) == 16);

/// Opaque texture identity.
///
/// Identity [`TexId::FONT_ATLAS`] is always the UI library's font atlas.
/// Custom identities are assigned by the host when registering textures with
/// the resource cache and stay stable for the lifetime of the registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TexId(u64);

impl TexId {
    /// The font atlas texture, present in every cache.
    pub const FONT_ATLAS: TexId = TexId(0);

    pub const fn new(raw: u64) -> Self {
        TexId(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl From<imgui::TextureId> for TexId {
    fn from(id: imgui::TextureId) -> Self {
        TexId(id.id() as u64)
    }
}

/// A raw RGBA8 image, used for the font atlas and other pixel-sourced
/// textures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtlasImage {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA8 rows, `width * height * 4` bytes.
    pub data: Vec<u8>,
}

/// One contiguous run of vertex or index bytes belonging to a single
/// internal draw list of the UI library, placed at `offset` in the frame's
/// combined vertex or index buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentBuffer {
    /// Byte offset into the combined buffer.
    pub offset: u32,
    /// The raw bytes to upload at `offset`.
    pub data: Vec<u8>,
}

impl SegmentBuffer {
    pub fn len(&self) -> u32 {
        self.data.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// One GPU draw call extracted from the UI draw list.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCommand {
    /// Index of the [`SegmentBuffer`] whose vertex base this draw binds.
    pub segment: usize,
    /// Texture identity to bind for this draw.
    pub texture: TexId,
    /// Byte offset into the frame's combined index buffer.
    pub index_offset: u32,
    /// Number of indices to draw.
    pub elem_count: u32,
    /// Clip rectangle as `[x1, y1, x2, y2]` in device pixels, top-left
    /// origin. Scaling by the device pixel ratio happens during capture;
    /// the recorder derives scissor rectangles from this without rescaling.
    pub clip_rect: [f32; 4],
    /// Item-local offset in device pixels, added to the clip rectangle
    /// before scissor computation when the UI is embedded in a scene item.
    pub item_pixel_offset: [f32; 2],
}

/// Immutable capture of one UI frame's renderable output.
#[derive(Debug, Clone)]
pub struct FrameSnapshot {
    /// Total size in bytes of the combined vertex buffer.
    pub total_vbuf_size: u32,
    /// Total size in bytes of the combined index buffer.
    pub total_ibuf_size: u32,
    /// Per-draw-list vertex bytes, ordered by ascending `offset`.
    pub vbuf: SmallVec<[SegmentBuffer; 4]>,
    /// Per-draw-list index bytes, ordered by ascending `offset`.
    pub ibuf: SmallVec<[SegmentBuffer; 4]>,
    /// Draw calls in paint order. Later commands draw on top; the recorder
    /// never reorders them.
    pub draws: Vec<DrawCommand>,
    /// Output size in device pixels at capture time.
    pub output_pixel_size: [u32; 2],
    /// Orthographic projection over the logical output size. Hosts that
    /// composite the UI inside a scene graph may override this in
    /// `prepare` with their own model-view-projection.
    pub projection: Mat4,
    /// Font atlas pixels, present on the first captured frame and after an
    /// atlas rebuild only.
    pub font_atlas: Option<AtlasImage>,
}

impl FrameSnapshot {
    /// A snapshot with no draws renders nothing; recording it is a no-op.
    pub fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send<T: Send>() {}

    #[test]
    fn snapshot_is_thread_transferable() {
        assert_send::<FrameSnapshot>();
    }

    #[test]
    fn font_atlas_identity_is_zero() {
        assert_eq!(TexId::FONT_ATLAS.raw(), 0);
        assert_eq!(TexId::from(imgui::TextureId::new(0)), TexId::FONT_ATLAS);
    }

    #[test]
    fn segment_len_tracks_data() {
        let seg = SegmentBuffer {
            offset: 40,
            data: vec![0u8; 60],
        };
        assert_eq!(seg.len(), 60);
        assert!(!seg.is_empty());
    }
}
