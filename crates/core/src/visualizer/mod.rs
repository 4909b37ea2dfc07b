//! Level vector shared between the capture loop and the render step, plus the
//! pure geometry that turns it into a row of bars.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::{analysis, config::VisualizerConfig, Result, SoundcheckError};

/// Number of bars in the rendered row.
pub const BAR_COUNT: usize = 4;

/// Divisor applied to an amplitude before scaling it to the bar height.
pub const HEIGHT_DIVISOR: f32 = 40.0;

/// Ordered levels produced by the capture loop.
///
/// The vector holds three scaled copies of the latest amplitude; it is
/// overwritten in place on every read and never accumulates history.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LevelVector {
    levels: [f32; 3],
}

impl LevelVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the vector with the fan-out of a freshly derived amplitude.
    pub fn update(&mut self, amplitude: f32) {
        self.levels = analysis::fan_out(amplitude);
    }

    pub fn levels(&self) -> [f32; 3] {
        self.levels
    }

    pub fn reset(&mut self) {
        self.levels = [0.0; 3];
    }
}

/// Shared, thread-safe view over the level vector.
///
/// The capture worker publishes through one clone while the render loop
/// snapshots through another.
#[derive(Clone, Default)]
pub struct LevelsHandle {
    shared: Arc<Mutex<LevelVector>>,
}

impl LevelsHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a new amplitude, overwriting the previous levels.
    pub fn publish(&self, amplitude: f32) -> Result<()> {
        let mut levels = self.lock()?;
        levels.update(amplitude);
        Ok(())
    }

    /// Returns a copy of the current levels.
    pub fn snapshot(&self) -> Result<[f32; 3]> {
        let levels = self.lock()?;
        Ok(levels.levels())
    }

    fn lock(&self) -> Result<MutexGuard<'_, LevelVector>> {
        self.shared
            .lock()
            .map_err(|_| SoundcheckError::msg("level vector has been poisoned"))
    }
}

impl std::fmt::Debug for LevelsHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LevelsHandle").finish()
    }
}

/// Reorders the level vector into the four displayed bars.
///
/// Input shorter than four slots is padded with zeros. The displayed row is
/// `[slot 2, slot 0, slot 2, slot 1]` — slot two appears twice and a fourth
/// slot is never read. Downstream output relies on this exact ordering.
pub fn bar_order(levels: &[f32]) -> [f32; BAR_COUNT] {
    let mut padded = [0.0_f32; BAR_COUNT];
    for (slot, value) in padded.iter_mut().zip(levels.iter()) {
        *slot = *value;
    }

    [padded[2], padded[0], padded[2], padded[1]]
}

/// Pixel height of a single bar for the given amplitude.
pub fn bar_height(amplitude: f32, max_height: f32) -> f32 {
    (amplitude / HEIGHT_DIVISOR) * max_height
}

/// One positioned bar, in pixels. Origin is the canvas top-left.
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub corner_radius: f32,
}

/// Lays the reordered bars out on a canvas of the given width.
///
/// Bars are fixed-width and evenly spaced, the row is centred horizontally,
/// and every bar is centred vertically on the shared centreline at half the
/// configured maximum height.
pub fn layout(levels: &[f32], canvas_width: f32, config: &VisualizerConfig) -> Vec<Bar> {
    let ordered = bar_order(levels);
    let total_width =
        config.bar_width * BAR_COUNT as f32 + config.bar_spacing * (BAR_COUNT as f32 - 1.0);
    let start_x = (canvas_width - total_width) / 2.0;
    let center_y = config.max_height / 2.0;

    ordered
        .iter()
        .enumerate()
        .map(|(index, amplitude)| {
            let height = bar_height(*amplitude, config.max_height);
            Bar {
                x: start_x + index as f32 * (config.bar_width + config.bar_spacing),
                y: center_y - height / 2.0,
                width: config.bar_width,
                height,
                corner_radius: config.corner_radius,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_order_repeats_slot_two() {
        let row = bar_order(&[1.0, 2.0, 3.0]);
        assert_eq!(row, [3.0, 1.0, 3.0, 2.0]);
    }

    #[test]
    fn short_input_pads_with_zeros() {
        assert_eq!(bar_order(&[5.0]), [0.0, 5.0, 0.0, 0.0]);
        assert_eq!(bar_order(&[]), [0.0; BAR_COUNT]);
    }

    #[test]
    fn bar_height_is_zero_at_silence_and_linear() {
        assert_eq!(bar_height(0.0, 250.0), 0.0);
        let half = bar_height(20.0, 250.0);
        let full = bar_height(40.0, 250.0);
        assert_eq!(full, 250.0);
        assert_eq!(half * 2.0, full);
    }

    #[test]
    fn layout_centres_the_row() {
        let config = VisualizerConfig::default();
        let canvas_width = 400.0;
        let bars = layout(&[40.0, 40.0, 40.0], canvas_width, &config);
        assert_eq!(bars.len(), BAR_COUNT);

        let total = config.bar_width * BAR_COUNT as f32
            + config.bar_spacing * (BAR_COUNT as f32 - 1.0);
        let left_margin = bars[0].x;
        let right_margin = canvas_width - (bars[BAR_COUNT - 1].x + config.bar_width);
        assert!((left_margin - right_margin).abs() < 1e-3);
        assert!((left_margin - (canvas_width - total) / 2.0).abs() < 1e-3);
    }

    #[test]
    fn layout_centres_each_bar_on_the_centreline() {
        let config = VisualizerConfig::default();
        let bars = layout(&[10.0, 20.0, 30.0], 400.0, &config);
        for bar in &bars {
            let mid = bar.y + bar.height / 2.0;
            assert!((mid - config.max_height / 2.0).abs() < 1e-3);
        }
    }

    #[test]
    fn handle_publishes_fanned_levels() {
        let handle = LevelsHandle::new();
        handle.publish(100.0).unwrap();
        assert_eq!(handle.snapshot().unwrap(), analysis::fan_out(100.0));
    }
}
