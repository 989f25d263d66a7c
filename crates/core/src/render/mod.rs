use crate::{color::Rgb, Result};

/// Output backend for rendered frames. Raw pixel-bus addressing lives behind
/// this trait; the scheduler is the only caller.
pub trait PixelSink {
    /// Pushes a whole frame. `scale` is the final output level in `[0, 1]`
    /// with the hardware ceiling already applied.
    fn show(&mut self, pixels: &[Rgb], scale: f32) -> Result<()>;
}

/// Sink that writes a frame summary to the log instead of driving hardware.
#[derive(Debug, Default)]
pub struct TracingSink {
    frames: u64,
}

impl TracingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl PixelSink for TracingSink {
    fn show(&mut self, pixels: &[Rgb], scale: f32) -> Result<()> {
        self.frames += 1;
        let lit = pixels.iter().filter(|p| !p.is_black()).count();
        tracing::trace!(frame = self.frames, lit, scale, "frame");
        Ok(())
    }
}

/// The pixel buffer. Exclusively owned by the controller; effects write into
/// it through the mutable slice handed to `draw`.
///
/// Brightness is stored here and nowhere else, on the canonical 0–255 scale.
/// The hardware-safe ceiling is only applied when computing the output scale.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    pixels: Vec<Rgb>,
    brightness: u8,
    ceiling: f32,
}

impl PixelBuffer {
    pub fn new(len: usize, brightness: u8, ceiling: f32) -> Self {
        Self {
            pixels: vec![Rgb::BLACK; len],
            brightness,
            ceiling: if ceiling.is_finite() {
                ceiling.clamp(0.0, 1.0)
            } else {
                0.0
            },
        }
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn pixels(&self) -> &[Rgb] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [Rgb] {
        &mut self.pixels
    }

    pub fn fill(&mut self, color: Rgb) {
        self.pixels.fill(color);
    }

    pub fn is_dark(&self) -> bool {
        self.pixels.iter().all(Rgb::is_black)
    }

    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    pub fn set_brightness(&mut self, brightness: u8) {
        self.brightness = brightness;
    }

    pub fn ceiling(&self) -> f32 {
        self.ceiling
    }

    /// Output level handed to the sink: the 0–255 brightness rescaled into
    /// `[0, ceiling]`.
    pub fn output_scale(&self) -> f32 {
        self.brightness as f32 / 255.0 * self.ceiling
    }

    pub fn show(&self, sink: &mut dyn PixelSink) -> Result<()> {
        sink.show(&self.pixels, self.output_scale())
    }
}

/// Sink that keeps the last frame around for assertions.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct CaptureSink {
    pub frames: usize,
    pub last: Vec<Rgb>,
    pub last_scale: f32,
}

#[cfg(test)]
impl PixelSink for CaptureSink {
    fn show(&mut self, pixels: &[Rgb], scale: f32) -> Result<()> {
        self.frames += 1;
        self.last = pixels.to_vec();
        self.last_scale = scale;
        Ok(())
    }
}
