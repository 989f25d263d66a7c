use std::sync::Arc;

use crate::color::Rgb;
use crate::coords::{Axis, CoordinateSpace};

pub const DEFAULT_LEAD: u32 = 20;
pub const DEFAULT_LAG: u32 = 80;
pub const DEFAULT_STEP: u32 = 5;
pub const DEFAULT_COLOR: Rgb = Rgb::BLUE;
/// Largest accepted lead, lag or step, in layout units.
pub const MAX_PARAM: u32 = 100_000;

/// One moving plane. Several lanes share a pixel buffer and are composited by
/// per-channel maximum.
#[derive(Debug, Clone)]
struct Lane {
    color: Rgb,
    axis_slot: usize,
    cursor: i32,
    contribution: Vec<Rgb>,
}

/// A glowing plane that sweeps through the tree one axis at a time, fading in
/// over `lead` units ahead of the cursor and out over `lag` units behind it.
#[derive(Debug, Clone)]
pub struct Sweep {
    coords: Arc<CoordinateSpace>,
    axes: Vec<Axis>,
    lanes: Vec<Lane>,
    lead: i32,
    lag: i32,
    step: i32,
    pub(crate) speed: u8,
    pub(crate) frozen: bool,
}

impl Sweep {
    pub fn new(
        coords: Arc<CoordinateSpace>,
        colors: &[Rgb],
        lead: u32,
        lag: u32,
        step: u32,
    ) -> Self {
        let colors = if colors.is_empty() {
            &[DEFAULT_COLOR][..]
        } else {
            colors
        };
        let lanes = colors
            .iter()
            .map(|color| Lane {
                color: *color,
                axis_slot: 0,
                cursor: 0,
                contribution: vec![Rgb::BLACK; coords.len()],
            })
            .collect();

        let mut sweep = Self {
            coords,
            axes: Axis::ALL.to_vec(),
            lanes,
            lead: clamp_param(lead),
            lag: clamp_param(lag),
            step: clamp_param(step),
            speed: super::DEFAULT_SPEED,
            frozen: false,
        };
        sweep.reset();
        sweep
    }

    pub fn lead(&self) -> u32 {
        self.lead as u32
    }

    pub fn lag(&self) -> u32 {
        self.lag as u32
    }

    pub fn step(&self) -> u32 {
        self.step as u32
    }

    pub fn colors(&self) -> Vec<Rgb> {
        self.lanes.iter().map(|lane| lane.color).collect()
    }

    /// Current `(axis, cursor)` of the first lane.
    pub fn cursor(&self) -> (Axis, i32) {
        let lane = &self.lanes[0];
        (self.axes[lane.axis_slot], lane.cursor)
    }

    /// Width of the band behind `-lag` that is forced to black. Wider than
    /// one step so no pixel is skipped over between frames.
    pub fn cleanup_window(&self) -> i32 {
        (self.step + 2).max(5)
    }

    /// Maps 0–100 onto step 1–10, widening the lag with the step so trailing
    /// pixels are still cleared at high speed.
    pub fn set_speed(&mut self, speed: u8) {
        let fraction = speed as f32 / 100.0;
        self.speed = speed;
        self.step = 1 + (fraction * 9.0) as i32;
        self.lag = 40 + (fraction * 80.0) as i32;
    }

    pub fn reset(&mut self) {
        let axes = self.axes.len();
        for (index, lane) in self.lanes.iter_mut().enumerate() {
            lane.axis_slot = index % axes;
            lane.contribution.fill(Rgb::BLACK);
        }
        for index in 0..self.lanes.len() {
            let axis = self.axes[self.lanes[index].axis_slot];
            self.lanes[index].cursor = self.travel(axis).0;
        }
    }

    pub fn draw(&mut self, frame: &mut [Rgb]) {
        let window = self.cleanup_window();
        for (index, point) in self.coords.points().iter().enumerate() {
            let mut touched = false;
            for lane in &mut self.lanes {
                let axis = self.axes[lane.axis_slot];
                let distance = point[axis.index()].saturating_sub(lane.cursor);
                if let Some(color) = sample(lane.color, distance, self.lead, self.lag, window) {
                    lane.contribution[index] = color;
                    touched = true;
                }
            }

            if touched {
                if let Some(pixel) = frame.get_mut(index) {
                    *pixel = self
                        .lanes
                        .iter()
                        .fold(Rgb::BLACK, |acc, lane| acc.max(lane.contribution[index]));
                }
            }
        }
    }

    pub fn after_draw(&mut self) {
        for index in 0..self.lanes.len() {
            let axis = self.axes[self.lanes[index].axis_slot];
            let (_, end) = self.travel(axis);
            self.lanes[index].cursor = self.lanes[index].cursor.saturating_add(self.step);
            if self.lanes[index].cursor > end {
                let slot = (self.lanes[index].axis_slot + 1) % self.axes.len();
                let (start, _) = self.travel(self.axes[slot]);
                let lane = &mut self.lanes[index];
                lane.axis_slot = slot;
                lane.cursor = start;
                lane.contribution.fill(Rgb::BLACK);
            }
        }
    }

    /// Cursor range along `axis`: from `lead` before the first pixel to `lag`
    /// past the last, so every pixel fades in and is cleaned up.
    fn travel(&self, axis: Axis) -> (i32, i32) {
        let (min, max) = self.coords.bounds(axis);
        (min.saturating_sub(self.lead), max.saturating_add(self.lag))
    }
}

fn clamp_param(value: u32) -> i32 {
    value.clamp(1, MAX_PARAM) as i32
}

/// Colour one lane contributes at `distance` from its plane, or `None` when
/// the pixel is outside the lane's reach and must be left untouched.
fn sample(color: Rgb, distance: i32, lead: i32, lag: i32, window: i32) -> Option<Rgb> {
    if -lag <= distance && distance < -lag + window {
        return Some(Rgb::BLACK);
    }
    if distance < -lag || distance > lead {
        return None;
    }
    let reach = if distance >= 0 { lead } else { lag };
    let brightness = 1.0 - (distance.abs() as f32 / reach as f32).clamp(0.0, 1.0);
    Some(color.scale(brightness))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(len: i32) -> Arc<CoordinateSpace> {
        Arc::new(CoordinateSpace::new((0..len).map(|x| [x, 0, 0]).collect()).unwrap())
    }

    #[test]
    fn plane_is_brightest_at_cursor() {
        assert_eq!(sample(Rgb::BLUE, 0, 20, 80, 7), Some(Rgb::BLUE));
        assert_eq!(sample(Rgb::BLUE, 10, 20, 80, 7), Some(Rgb::new(0, 0, 127)));
        assert_eq!(sample(Rgb::BLUE, 21, 20, 80, 7), None);
        assert_eq!(sample(Rgb::BLUE, -81, 20, 80, 7), None);
        assert_eq!(sample(Rgb::BLUE, -80, 20, 80, 7), Some(Rgb::BLACK));
        assert_eq!(sample(Rgb::BLUE, -74, 20, 80, 7), Some(Rgb::BLACK));
        assert!(sample(Rgb::BLUE, -73, 20, 80, 7).unwrap().b > 0);
    }

    #[test]
    fn cleanup_window_grows_with_step() {
        let mut sweep = Sweep::new(line(10), &[], 20, 80, 1);
        assert_eq!(sweep.cleanup_window(), 5);
        sweep.set_speed(100);
        assert_eq!(sweep.step(), 10);
        assert_eq!(sweep.lag(), 120);
        assert_eq!(sweep.cleanup_window(), 12);
    }

    #[test]
    fn params_are_clamped_to_one() {
        let sweep = Sweep::new(line(3), &[], 0, 0, 0);
        assert_eq!((sweep.lead(), sweep.lag(), sweep.step()), (1, 1, 1));
    }

    #[test]
    fn trailing_pixels_are_cleared() {
        let coords = line(200);
        for step in [1, 5, 10, 37] {
            let mut sweep = Sweep::new(coords.clone(), &[Rgb::BLUE], 20, 30, step);
            let mut frame = vec![Rgb::BLACK; 200];
            let window = sweep.cleanup_window();
            loop {
                let (axis, cursor) = sweep.cursor();
                if axis != Axis::X {
                    break;
                }
                sweep.draw(&mut frame);
                for (x, pixel) in frame.iter().enumerate() {
                    let distance = x as i32 - cursor;
                    if distance < -30 - window || (-30..-30 + window).contains(&distance) {
                        assert!(pixel.is_black(), "step {step}: pixel {x} stale at cursor {cursor}");
                    }
                }
                sweep.after_draw();
            }
            assert!(frame.iter().all(Rgb::is_black), "step {step} left pixels lit");
        }
    }

    #[test]
    fn extreme_params_and_coordinates_saturate() {
        let sweep = Sweep::new(line(3), &[], u32::MAX, u32::MAX, u32::MAX);
        assert_eq!(
            (sweep.lead(), sweep.lag(), sweep.step()),
            (MAX_PARAM, MAX_PARAM, MAX_PARAM)
        );

        let coords = CoordinateSpace::new(vec![[i32::MIN, 0, 0], [i32::MAX, 0, 0]]).unwrap();
        let mut sweep = Sweep::new(Arc::new(coords), &[], MAX_PARAM, MAX_PARAM, MAX_PARAM);
        assert_eq!(sweep.cursor(), (Axis::X, i32::MIN));
        let mut frame = vec![Rgb::BLACK; 2];
        for _ in 0..10 {
            sweep.draw(&mut frame);
            sweep.after_draw();
        }
    }

    #[test]
    fn cycles_through_axes() {
        let mut sweep = Sweep::new(line(5), &[], 1, 1, 100);
        assert_eq!(sweep.cursor().0, Axis::X);
        sweep.after_draw();
        assert_eq!(sweep.cursor(), (Axis::Y, -1));
        sweep.after_draw();
        assert_eq!(sweep.cursor().0, Axis::Z);
        sweep.after_draw();
        assert_eq!(sweep.cursor().0, Axis::X);
    }

    #[test]
    fn overlapping_lanes_composite_by_max() {
        let coords = Arc::new(CoordinateSpace::new(vec![[0, 0, 0], [10, 10, 10]]).unwrap());
        let red = Rgb::new(255, 0, 0);
        let mut sweep = Sweep::new(coords, &[red, Rgb::BLUE], 50, 50, 1);
        // lane 0 sweeps X, lane 1 sweeps Y; park both cursors on the first pixel
        sweep.lanes[0].cursor = 0;
        sweep.lanes[1].cursor = 0;
        let mut frame = vec![Rgb::BLACK; 2];
        sweep.draw(&mut frame);
        assert_eq!(frame[0], Rgb::new(255, 0, 255));
    }

    #[test]
    fn untouched_pixels_keep_their_colour() {
        let mut sweep = Sweep::new(line(300), &[], 5, 5, 1);
        let green = Rgb::new(0, 255, 0);
        let mut frame = vec![green; 300];
        sweep.draw(&mut frame);
        assert_eq!(frame[299], green);
    }
}
