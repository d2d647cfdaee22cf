//! Observations: the immutable per-step snapshot handed to the policy.
//!
//! The mandatory signal is the visual frame; the accessibility tree,
//! terminal text and window metadata are independently optional. Frames
//! are always resampled from the backend's native resolution to the
//! session's configured resolution before the policy sees them, so the
//! policy never observes native-resolution variance.

use ndarray::Array3;
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// A tightly packed RGB8 raster at a known resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// `width * height * 3` bytes, row major, RGB interleaved.
    pub pixels: Vec<u8>,
}

impl Frame {
    /// Wraps raw RGB bytes, validating the buffer length.
    pub fn from_rgb(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, SessionError> {
        let expected = width as usize * height as usize * 3;
        if pixels.len() != expected {
            return Err(SessionError::BadFrame(format!(
                "{}x{} frame needs {} bytes, got {}",
                width,
                height,
                expected,
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// A solid-color frame. Used by the null backend and tests.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = rgb
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Resamples the frame to the target resolution with a separable
    /// Lanczos-3 filter. Returns a clone when the resolution already
    /// matches.
    pub fn resize(&self, width: u32, height: u32) -> Frame {
        if (width, height) == (self.width, self.height) || width == 0 || height == 0 {
            return self.clone();
        }

        let src = Array3::from_shape_fn(
            (self.height as usize, self.width as usize, 3),
            |(y, x, c)| self.pixels[(y * self.width as usize + x) * 3 + c] as f32,
        );

        let horizontal = resample_taps(self.width as usize, width as usize);
        let vertical = resample_taps(self.height as usize, height as usize);

        // Horizontal pass, then vertical.
        let mut mid = Array3::<f32>::zeros((self.height as usize, width as usize, 3));
        for y in 0..self.height as usize {
            for (ox, taps) in horizontal.iter().enumerate() {
                for c in 0..3 {
                    let mut acc = 0.0;
                    for (offset, weight) in taps.weights.iter().enumerate() {
                        acc += weight * src[(y, taps.start + offset, c)];
                    }
                    mid[(y, ox, c)] = acc;
                }
            }
        }

        let mut pixels = vec![0u8; width as usize * height as usize * 3];
        for (oy, taps) in vertical.iter().enumerate() {
            for x in 0..width as usize {
                for c in 0..3 {
                    let mut acc = 0.0;
                    for (offset, weight) in taps.weights.iter().enumerate() {
                        acc += weight * mid[(taps.start + offset, x, c)];
                    }
                    pixels[(oy * width as usize + x) * 3 + c] = acc.round().clamp(0.0, 255.0) as u8;
                }
            }
        }

        Frame {
            width,
            height,
            pixels,
        }
    }
}

/// Filter taps for one output coordinate: source start index plus
/// normalized weights over a contiguous source window.
struct Taps {
    start: usize,
    weights: Vec<f32>,
}

const LANCZOS_RADIUS: f32 = 3.0;

fn lanczos3(x: f32) -> f32 {
    let x = x.abs();
    if x < 1e-6 {
        1.0
    } else if x >= LANCZOS_RADIUS {
        0.0
    } else {
        let pi_x = std::f32::consts::PI * x;
        let sinc = pi_x.sin() / pi_x;
        let window = (pi_x / LANCZOS_RADIUS).sin() / (pi_x / LANCZOS_RADIUS);
        sinc * window
    }
}

/// Precomputes the Lanczos taps for one axis.
fn resample_taps(len_in: usize, len_out: usize) -> Vec<Taps> {
    let scale = len_in as f32 / len_out as f32;
    // When downscaling the kernel widens to cover the source footprint.
    let filter_scale = scale.max(1.0);
    let support = LANCZOS_RADIUS * filter_scale;

    (0..len_out)
        .map(|i| {
            let center = (i as f32 + 0.5) * scale - 0.5;
            let left = ((center - support).floor().max(0.0)) as usize;
            let right = ((center + support).ceil() as usize).min(len_in.saturating_sub(1));

            let mut weights: Vec<f32> = (left..=right)
                .map(|j| lanczos3((j as f32 - center) / filter_scale))
                .collect();
            let sum: f32 = weights.iter().sum();
            if sum.abs() > f32::EPSILON {
                for w in &mut weights {
                    *w /= sum;
                }
            }
            Taps {
                start: left,
                weights,
            }
        })
        .collect()
}

/// Foreground window metadata plus clipboard and optional human input,
/// captured together in one backend call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowState {
    pub title: String,
    /// `(left, top, width, height)` in native pixels.
    pub rect: (i32, i32, i32, i32),
    /// Names of all open windows, newline separated.
    pub window_names: String,
    pub clipboard: Option<String>,
    pub human_input: Option<String>,
}

/// One immutable snapshot of the VM, produced once per reset/step.
///
/// Replaced wholesale each step; the caller owns the previous one only
/// until the next capture returns.
#[derive(Debug, Clone)]
pub struct Observation {
    pub frame: Frame,
    pub accessibility_tree: Option<String>,
    pub terminal: Option<String>,
    pub window: Option<WindowState>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rgb_validates_length() {
        assert!(Frame::from_rgb(2, 2, vec![0; 12]).is_ok());
        assert!(Frame::from_rgb(2, 2, vec![0; 11]).is_err());
    }

    #[test]
    fn resize_noop_at_matching_resolution() {
        let frame = Frame::solid(4, 4, [10, 20, 30]);
        let same = frame.resize(4, 4);
        assert_eq!(same, frame);
    }

    #[test]
    fn resize_preserves_solid_color() {
        let frame = Frame::solid(1920, 4, [200, 100, 50]);
        let resized = frame.resize(1280, 4);

        assert_eq!(resized.resolution(), (1280, 4));
        // A constant image stays constant under a normalized kernel.
        for pixel in resized.pixels.chunks(3) {
            assert!((pixel[0] as i32 - 200).abs() <= 1);
            assert!((pixel[1] as i32 - 100).abs() <= 1);
            assert!((pixel[2] as i32 - 50).abs() <= 1);
        }
    }

    #[test]
    fn resize_upscales() {
        let frame = Frame::solid(8, 8, [255, 255, 255]);
        let resized = frame.resize(16, 16);
        assert_eq!(resized.resolution(), (16, 16));
        assert_eq!(resized.pixels.len(), 16 * 16 * 3);
    }
}
