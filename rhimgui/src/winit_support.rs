//! winit event plumbing for the capture side.
//!
//! Pure data mapping between winit window events and the input setters on
//! [`UiContext`]. Hosts embedding the UI in another windowing stack write
//! the equivalent of this module for theirs; nothing in the core depends
//! on it.

use winit::{
    event::{ElementState, MouseScrollDelta, WindowEvent},
    keyboard::{KeyCode, PhysicalKey},
};

use crate::capture::UiContext;

/// Feeds one window event into the UI input state.
///
/// `scale_factor` is the window's current device pixel ratio; positions are
/// handed to the UI in logical coordinates. Returns whether the UI claims
/// the event, so the host can stop propagating it to the scene underneath.
pub fn handle_window_event(
    context: &mut UiContext,
    event: &WindowEvent,
    scale_factor: f64,
) -> bool {
    match event {
        WindowEvent::CursorMoved { position, .. } => {
            let logical = position.to_logical::<f64>(scale_factor);
            context.set_mouse_position([logical.x as f32, logical.y as f32]);
            context.want_capture_mouse()
        }
        WindowEvent::MouseInput { state, button, .. } => {
            if let Some(button) = mouse_button(*button) {
                context.set_mouse_button(button, *state == ElementState::Pressed);
            }
            context.want_capture_mouse()
        }
        WindowEvent::MouseWheel { delta, .. } => {
            let lines = match delta {
                MouseScrollDelta::LineDelta(horizontal, vertical) => [*horizontal, *vertical],
                // Treat roughly one line per 20 logical pixels.
                MouseScrollDelta::PixelDelta(position) => {
                    let logical = position.to_logical::<f64>(scale_factor);
                    [logical.x as f32 / 20.0, logical.y as f32 / 20.0]
                }
            };
            context.add_mouse_wheel(lines);
            context.want_capture_mouse()
        }
        WindowEvent::KeyboardInput { event, .. } => {
            let down = event.state == ElementState::Pressed;
            if let PhysicalKey::Code(code) = event.physical_key
                && let Some(key) = imgui_key(code)
            {
                context.add_key_event(key, down);
            }
            if down && let Some(text) = event.text.as_ref() {
                context.add_text_input(text);
            }
            context.want_capture_keyboard()
        }
        WindowEvent::ModifiersChanged(modifiers) => {
            let state = modifiers.state();
            context.set_modifiers(
                state.control_key(),
                state.shift_key(),
                state.alt_key(),
                state.super_key(),
            );
            false
        }
        WindowEvent::Ime(winit::event::Ime::Commit(text)) => {
            context.add_text_input(text);
            context.want_capture_keyboard()
        }
        WindowEvent::Focused(false) => {
            context.focus_lost();
            false
        }
        _ => false,
    }
}

fn mouse_button(button: winit::event::MouseButton) -> Option<imgui::MouseButton> {
    match button {
        winit::event::MouseButton::Left => Some(imgui::MouseButton::Left),
        winit::event::MouseButton::Right => Some(imgui::MouseButton::Right),
        winit::event::MouseButton::Middle => Some(imgui::MouseButton::Middle),
        winit::event::MouseButton::Back => Some(imgui::MouseButton::Extra1),
        winit::event::MouseButton::Forward => Some(imgui::MouseButton::Extra2),
        winit::event::MouseButton::Other(_) => None,
    }
}

fn imgui_key(code: KeyCode) -> Option<imgui::Key> {
    use imgui::Key;

    Some(match code {
        KeyCode::KeyA => Key::A,
        KeyCode::KeyB => Key::B,
        KeyCode::KeyC => Key::C,
        KeyCode::KeyD => Key::D,
        KeyCode::KeyE => Key::E,
        KeyCode::KeyF => Key::F,
        KeyCode::KeyG => Key::G,
        KeyCode::KeyH => Key::H,
        KeyCode::KeyI => Key::I,
        KeyCode::KeyJ => Key::J,
        KeyCode::KeyK => Key::K,
        KeyCode::KeyL => Key::L,
        KeyCode::KeyM => Key::M,
        KeyCode::KeyN => Key::N,
        KeyCode::KeyO => Key::O,
        KeyCode::KeyP => Key::P,
        KeyCode::KeyQ => Key::Q,
        KeyCode::KeyR => Key::R,
        KeyCode::KeyS => Key::S,
        KeyCode::KeyT => Key::T,
        KeyCode::KeyU => Key::U,
        KeyCode::KeyV => Key::V,
        KeyCode::KeyW => Key::W,
        KeyCode::KeyX => Key::X,
        KeyCode::KeyY => Key::Y,
        KeyCode::KeyZ => Key::Z,
        KeyCode::Digit0 => Key::Alpha0,
        KeyCode::Digit1 => Key::Alpha1,
        KeyCode::Digit2 => Key::Alpha2,
        KeyCode::Digit3 => Key::Alpha3,
        KeyCode::Digit4 => Key::Alpha4,
        KeyCode::Digit5 => Key::Alpha5,
        KeyCode::Digit6 => Key::Alpha6,
        KeyCode::Digit7 => Key::Alpha7,
        KeyCode::Digit8 => Key::Alpha8,
        KeyCode::Digit9 => Key::Alpha9,
        KeyCode::F1 => Key::F1,
        KeyCode::F2 => Key::F2,
        KeyCode::F3 => Key::F3,
        KeyCode::F4 => Key::F4,
        KeyCode::F5 => Key::F5,
        KeyCode::F6 => Key::F6,
        KeyCode::F7 => Key::F7,
        KeyCode::F8 => Key::F8,
        KeyCode::F9 => Key::F9,
        KeyCode::F10 => Key::F10,
        KeyCode::F11 => Key::F11,
        KeyCode::F12 => Key::F12,
        KeyCode::ArrowLeft => Key::LeftArrow,
        KeyCode::ArrowRight => Key::RightArrow,
        KeyCode::ArrowUp => Key::UpArrow,
        KeyCode::ArrowDown => Key::DownArrow,
        KeyCode::Tab => Key::Tab,
        KeyCode::Enter => Key::Enter,
        KeyCode::Escape => Key::Escape,
        KeyCode::Backspace => Key::Backspace,
        KeyCode::Delete => Key::Delete,
        KeyCode::Insert => Key::Insert,
        KeyCode::Home => Key::Home,
        KeyCode::End => Key::End,
        KeyCode::PageUp => Key::PageUp,
        KeyCode::PageDown => Key::PageDown,
        KeyCode::Space => Key::Space,
        KeyCode::Minus => Key::Minus,
        KeyCode::Equal => Key::Equal,
        KeyCode::BracketLeft => Key::LeftBracket,
        KeyCode::BracketRight => Key::RightBracket,
        KeyCode::Backslash => Key::Backslash,
        KeyCode::Semicolon => Key::Semicolon,
        KeyCode::Quote => Key::Apostrophe,
        KeyCode::Comma => Key::Comma,
        KeyCode::Period => Key::Period,
        KeyCode::Slash => Key::Slash,
        KeyCode::Backquote => Key::GraveAccent,
        KeyCode::CapsLock => Key::CapsLock,
        KeyCode::ShiftLeft => Key::LeftShift,
        KeyCode::ShiftRight => Key::RightShift,
        KeyCode::ControlLeft => Key::LeftCtrl,
        KeyCode::ControlRight => Key::RightCtrl,
        KeyCode::AltLeft => Key::LeftAlt,
        KeyCode::AltRight => Key::RightAlt,
        KeyCode::SuperLeft => Key::LeftSuper,
        KeyCode::SuperRight => Key::RightSuper,
        KeyCode::Numpad0 => Key::Keypad0,
        KeyCode::Numpad1 => Key::Keypad1,
        KeyCode::Numpad2 => Key::Keypad2,
        KeyCode::Numpad3 => Key::Keypad3,
        KeyCode::Numpad4 => Key::Keypad4,
        KeyCode::Numpad5 => Key::Keypad5,
        KeyCode::Numpad6 => Key::Keypad6,
        KeyCode::Numpad7 => Key::Keypad7,
        KeyCode::Numpad8 => Key::Keypad8,
        KeyCode::Numpad9 => Key::Keypad9,
        KeyCode::NumpadEnter => Key::KeypadEnter,
        KeyCode::NumpadAdd => Key::KeypadAdd,
        KeyCode::NumpadSubtract => Key::KeypadSubtract,
        KeyCode::NumpadMultiply => Key::KeypadMultiply,
        KeyCode::NumpadDivide => Key::KeypadDivide,
        KeyCode::NumpadDecimal => Key::KeypadDecimal,
        _ => return None,
    })
}
