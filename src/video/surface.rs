//! Composite frame layout and the drawing surface the compositor paints on

use crate::media::VideoFrame;

/// Fill used when the remote party has no picture yet (slate-800)
pub const PLACEHOLDER_RGBA: [u8; 4] = [0x1e, 0x29, 0x3b, 0xff];
pub const INSET_BORDER_RGBA: [u8; 4] = [0xff, 0xff, 0xff, 0xff];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }
}

/// Where each participant lands on the canvas.
///
/// The inset is a quarter of the canvas in each dimension, anchored
/// bottom-right with a padding of 1/64 of the canvas width: at 1280x720
/// that is a 320x180 inset, 20 px from the edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositeLayout {
    pub canvas: Rect,
    pub inset: Rect,
    pub border_width: u32,
}

impl CompositeLayout {
    pub fn for_canvas(width: u32, height: u32) -> Self {
        let inset_width = (width / 4).max(1);
        let inset_height = (height / 4).max(1);
        let padding = width / 64;

        Self {
            canvas: Rect {
                x: 0,
                y: 0,
                width,
                height,
            },
            inset: Rect {
                x: width.saturating_sub(inset_width + padding),
                y: height.saturating_sub(inset_height + padding),
                width: inset_width,
                height: inset_height,
            },
            border_width: 2,
        }
    }
}

/// RGBA8 canvas owned by the redraw loop
pub struct CompositeSurface {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl CompositeSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; (width as usize) * (height as usize) * 4],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn fill(&mut self, rgba: [u8; 4]) {
        for px in self.data.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
    }

    /// Draw `frame` scaled (nearest neighbour) into `dest`, optionally mirrored horizontally
    pub fn draw_scaled(&mut self, frame: &VideoFrame, dest: Rect, mirrored: bool) {
        if !frame.is_well_formed() || dest.width == 0 || dest.height == 0 {
            return;
        }

        let src_w = frame.width as u64;
        let src_h = frame.height as u64;
        let x_end = (dest.x + dest.width).min(self.width);
        let y_end = (dest.y + dest.height).min(self.height);

        for y in dest.y..y_end {
            let sy = ((y - dest.y) as u64 * src_h / dest.height as u64) as usize;
            let src_row = sy * frame.width as usize * 4;
            let dst_row = y as usize * self.width as usize * 4;

            for x in dest.x..x_end {
                let mut dx = (x - dest.x) as u64;
                if mirrored {
                    dx = dest.width as u64 - 1 - dx;
                }
                let sx = (dx * src_w / dest.width as u64) as usize;
                let src = src_row + sx * 4;
                let dst = dst_row + x as usize * 4;
                self.data[dst..dst + 4].copy_from_slice(&frame.data[src..src + 4]);
            }
        }
    }

    /// Stroke a border of `width` pixels just outside `rect`, clipped to the canvas
    pub fn stroke_outside(&mut self, rect: Rect, width: u32, rgba: [u8; 4]) {
        let left = rect.x.saturating_sub(width);
        let top = rect.y.saturating_sub(width);
        let right = (rect.x + rect.width + width).min(self.width);
        let bottom = (rect.y + rect.height + width).min(self.height);

        for y in top..bottom {
            for x in left..right {
                if rect.contains(x, y) {
                    continue;
                }
                let offset = (y as usize * self.width as usize + x as usize) * 4;
                self.data[offset..offset + 4].copy_from_slice(&rgba);
            }
        }
    }

    /// Copy the current contents out as a frame
    pub fn snapshot(&self, timestamp_ms: u64) -> VideoFrame {
        VideoFrame {
            width: self.width,
            height: self.height,
            data: self.data.clone(),
            timestamp_ms,
        }
    }
}
