//! Driving the immediate-mode UI and capturing its output.
//!
//! [`UiContext`] owns an explicit `imgui::Context`. One call to
//! [`capture_frame`](UiContext::capture_frame) runs exactly one logical UI
//! frame and extracts the resulting draw data into a [`FrameSnapshot`]: raw
//! vertex bytes per draw list, indices widened to 32 bits, clip rectangles
//! scaled into device pixels, and draw commands in paint order. The
//! snapshot owns copies of everything, so it can leave the producing
//! context immediately.
//!
//! Input state reaches the UI library through the setter methods below.
//! They are forwarded to `imgui::Io` directly; mapping a windowing
//! toolkit's key codes onto [`imgui::Key`] is the host's concern (see the
//! `winit_support` module for the winit mapping).

use std::time::Instant;

use glam::Mat4;
use imgui::internal::RawWrapper;
use smallvec::SmallVec;
use thiserror::Error;
use tracing::debug;

use crate::snapshot::{AtlasImage, DrawCommand, FrameSnapshot, INDEX_STRIDE, SegmentBuffer, TexId};

/// Errors surfaced by frame capture.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Capture was attempted after the UI context was released. The caller
    /// must order context lifecycle before capture.
    #[error("no active ui context")]
    NoActiveContext,
}

/// Owner of the immediate-mode UI library's context and input state.
///
/// The context is explicit rather than process-global: it is created with
/// the `UiContext`, released with it (or earlier via
/// [`release`](UiContext::release)), and never reached through hidden
/// statics. Reentrant capture is not supported; one `UiContext` drives one
/// UI surface.
///
/// All methods must be called from the producing context. The produced
/// snapshots are the only values that cross threads.
pub struct UiContext {
    imgui: Option<imgui::Context>,
    pending_atlas: Option<AtlasImage>,
    last_frame: Option<Instant>,
}

impl UiContext {
    /// Creates the UI context and builds the font atlas.
    ///
    /// The atlas pixels travel with the first captured snapshot under
    /// texture identity [`TexId::FONT_ATLAS`].
    pub fn new() -> Self {
        let mut imgui = imgui::Context::create();
        imgui.set_ini_filename(None);
        imgui.set_platform_name(Some("rhimgui".to_string()));
        imgui.set_renderer_name(Some("rhimgui".to_string()));
        let atlas = Self::build_atlas(&mut imgui);
        UiContext {
            imgui: Some(imgui),
            pending_atlas: Some(atlas),
            last_frame: None,
        }
    }

    fn build_atlas(imgui: &mut imgui::Context) -> AtlasImage {
        let fonts = imgui.fonts();
        let texture = fonts.build_rgba32_texture();
        let atlas = AtlasImage {
            width: texture.width,
            height: texture.height,
            data: texture.data.to_vec(),
        };
        fonts.tex_id = imgui::TextureId::new(TexId::FONT_ATLAS.raw() as usize);
        atlas
    }

    pub fn is_active(&self) -> bool {
        self.imgui.is_some()
    }

    /// Direct access to the UI library context, e.g. for adding fonts
    /// before a [`rebuild_font_atlas`](Self::rebuild_font_atlas).
    pub fn imgui_mut(&mut self) -> Option<&mut imgui::Context> {
        self.imgui.as_mut()
    }

    /// Rebuilds the font atlas (after the host changed its fonts). The new
    /// pixels are re-uploaded with the next captured snapshot.
    pub fn rebuild_font_atlas(&mut self) -> Result<(), CaptureError> {
        let imgui = self.imgui.as_mut().ok_or(CaptureError::NoActiveContext)?;
        self.pending_atlas = Some(Self::build_atlas(imgui));
        debug!("font atlas rebuilt");
        Ok(())
    }

    /// Releases the UI library context. Further captures fail with
    /// [`CaptureError::NoActiveContext`]. Idempotent.
    pub fn release(&mut self) {
        self.imgui = None;
        self.pending_atlas = None;
    }

    /// Runs one logical UI frame and captures its draw output.
    ///
    /// `logical_size` and `item_logical_offset` are in logical pixels;
    /// `device_pixel_ratio` must be positive. `frame` issues the frame's UI
    /// calls against the provided [`imgui::Ui`]. Embedded draw-list
    /// callbacks run synchronously here and never appear in the snapshot.
    ///
    /// Clip rectangles are scaled by `device_pixel_ratio` during capture,
    /// so everything downstream operates in device pixels with a top-left
    /// origin. Vertex positions stay logical and are mapped by the
    /// snapshot's orthographic projection.
    pub fn capture_frame(
        &mut self,
        logical_size: [f32; 2],
        device_pixel_ratio: f32,
        item_logical_offset: [f32; 2],
        frame: impl FnOnce(&mut imgui::Ui),
    ) -> Result<FrameSnapshot, CaptureError> {
        let imgui = self.imgui.as_mut().ok_or(CaptureError::NoActiveContext)?;
        debug_assert!(device_pixel_ratio > 0.0);
        debug_assert!(logical_size[0] >= 0.0 && logical_size[1] >= 0.0);

        let now = Instant::now();
        let delta = self
            .last_frame
            .map(|earlier| now.duration_since(earlier).as_secs_f32())
            .unwrap_or(1.0 / 60.0);
        self.last_frame = Some(now);

        let io = imgui.io_mut();
        io.display_size = logical_size;
        io.display_framebuffer_scale = [device_pixel_ratio, device_pixel_ratio];
        io.delta_time = delta.max(f32::EPSILON);

        let ui = imgui.new_frame();
        frame(ui);
        let draw_data = imgui.render();

        let scale = device_pixel_ratio;
        let display_pos = draw_data.display_pos;
        let item_pixel_offset = [
            item_logical_offset[0] * scale,
            item_logical_offset[1] * scale,
        ];

        let mut vbuf: SmallVec<[SegmentBuffer; 4]> = SmallVec::new();
        let mut ibuf: SmallVec<[SegmentBuffer; 4]> = SmallVec::new();
        let mut draws = Vec::new();
        let mut total_vbuf_size = 0u32;
        let mut total_ibuf_size = 0u32;

        for (segment, list) in draw_data.draw_lists().enumerate() {
            let index_base = total_ibuf_size;

            for command in list.commands() {
                match command {
                    imgui::DrawCmd::Elements { count, cmd_params } => {
                        // Vertex offsets are never advertised to the
                        // library, so draw lists split instead of offsetting.
                        debug_assert_eq!(cmd_params.vtx_offset, 0);
                        if count == 0 {
                            continue;
                        }
                        let clip = cmd_params.clip_rect;
                        draws.push(DrawCommand {
                            segment,
                            texture: cmd_params.texture_id.into(),
                            index_offset: index_base + cmd_params.idx_offset as u32 * INDEX_STRIDE,
                            elem_count: count as u32,
                            clip_rect: [
                                (clip[0] - display_pos[0]) * scale,
                                (clip[1] - display_pos[1]) * scale,
                                (clip[2] - display_pos[0]) * scale,
                                (clip[3] - display_pos[1]) * scale,
                            ],
                            item_pixel_offset,
                        });
                    }
                    imgui::DrawCmd::ResetRenderState => {}
                    // Pass-through, not deferred: the callback runs now and
                    // its side effects are outside this contract.
                    imgui::DrawCmd::RawCallback { callback, raw_cmd } => unsafe {
                        callback(list.raw(), raw_cmd)
                    },
                }
            }

            let vertex_data = vertex_bytes(list.vtx_buffer()).to_vec();
            let widened: Vec<u32> = list.idx_buffer().iter().map(|&index| u32::from(index)).collect();
            let index_data: Vec<u8> = bytemuck::cast_slice(&widened).to_vec();

            total_vbuf_size += vertex_data.len() as u32;
            total_ibuf_size += index_data.len() as u32;
            vbuf.push(SegmentBuffer {
                offset: total_vbuf_size - vertex_data.len() as u32,
                data: vertex_data,
            });
            ibuf.push(SegmentBuffer {
                offset: index_base,
                data: index_data,
            });
        }

        let output_pixel_size = [
            (logical_size[0] * scale).round() as u32,
            (logical_size[1] * scale).round() as u32,
        ];
        let projection = if logical_size[0] > 0.0 && logical_size[1] > 0.0 {
            Mat4::orthographic_rh(0.0, logical_size[0], logical_size[1], 0.0, -1.0, 1.0)
        } else {
            Mat4::IDENTITY
        };

        Ok(FrameSnapshot {
            total_vbuf_size,
            total_ibuf_size,
            vbuf,
            ibuf,
            draws,
            output_pixel_size,
            projection,
            font_atlas: self.pending_atlas.take(),
        })
    }

    /// Current mouse position in logical coordinates, matching the
    /// `logical_size` space handed to capture.
    pub fn set_mouse_position(&mut self, logical_pos: [f32; 2]) {
        if let Some(imgui) = self.imgui.as_mut() {
            imgui.io_mut().mouse_pos = logical_pos;
        }
    }

    pub fn set_mouse_button(&mut self, button: imgui::MouseButton, down: bool) {
        if let Some(imgui) = self.imgui.as_mut() {
            imgui.io_mut().mouse_down[mouse_button_index(button)] = down;
        }
    }

    /// Accumulates wheel deltas in lines, `[horizontal, vertical]`.
    pub fn add_mouse_wheel(&mut self, delta: [f32; 2]) {
        if let Some(imgui) = self.imgui.as_mut() {
            let io = imgui.io_mut();
            io.mouse_wheel_h += delta[0];
            io.mouse_wheel += delta[1];
        }
    }

    pub fn add_key_event(&mut self, key: imgui::Key, down: bool) {
        if let Some(imgui) = self.imgui.as_mut() {
            imgui.io_mut().add_key_event(key, down);
        }
    }

    pub fn set_modifiers(&mut self, ctrl: bool, shift: bool, alt: bool, sup: bool) {
        if let Some(imgui) = self.imgui.as_mut() {
            let io = imgui.io_mut();
            io.add_key_event(imgui::Key::ModCtrl, ctrl);
            io.add_key_event(imgui::Key::ModShift, shift);
            io.add_key_event(imgui::Key::ModAlt, alt);
            io.add_key_event(imgui::Key::ModSuper, sup);
        }
    }

    pub fn add_text_input(&mut self, text: &str) {
        if let Some(imgui) = self.imgui.as_mut() {
            let io = imgui.io_mut();
            for character in text.chars() {
                io.add_input_character(character);
            }
        }
    }

    /// Clears transient input state when the UI surface loses focus.
    pub fn focus_lost(&mut self) {
        if let Some(imgui) = self.imgui.as_mut() {
            let io = imgui.io_mut();
            io.mouse_down = [false; 5];
            io.mouse_wheel = 0.0;
            io.mouse_wheel_h = 0.0;
            io.add_key_event(imgui::Key::ModCtrl, false);
            io.add_key_event(imgui::Key::ModShift, false);
            io.add_key_event(imgui::Key::ModAlt, false);
            io.add_key_event(imgui::Key::ModSuper, false);
        }
    }

    /// Whether the UI wants to consume mouse events instead of the host.
    pub fn want_capture_mouse(&self) -> bool {
        self.imgui
            .as_ref()
            .is_some_and(|imgui| imgui.io().want_capture_mouse)
    }

    /// Whether the UI wants to consume keyboard events instead of the host.
    pub fn want_capture_keyboard(&self) -> bool {
        self.imgui
            .as_ref()
            .is_some_and(|imgui| imgui.io().want_capture_keyboard)
    }

    /// Installs the host's clipboard integration.
    pub fn set_clipboard_backend(&mut self, backend: impl imgui::ClipboardBackend) {
        if let Some(imgui) = self.imgui.as_mut() {
            imgui.set_clipboard_backend(backend);
        }
    }
}

impl Default for UiContext {
    fn default() -> Self {
        Self::new()
    }
}

fn mouse_button_index(button: imgui::MouseButton) -> usize {
    match button {
        imgui::MouseButton::Left => 0,
        imgui::MouseButton::Right => 1,
        imgui::MouseButton::Middle => 2,
        imgui::MouseButton::Extra1 => 3,
        imgui::MouseButton::Extra2 => 4,
    }
}

// DrawVert is a plain repr(C) struct whose layout is guarded in snapshot.rs.
fn vertex_bytes(vertices: &[imgui::DrawVert]) -> &[u8] {
    unsafe { core::slice::from_raw_parts(vertices.as_ptr().cast::<u8>(), size_of_val(vertices)) }
}
