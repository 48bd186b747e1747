//! Pixel rectangles.

use rand::Rng;

/// An axis-aligned rectangle in frame pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn center(&self) -> (u32, u32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }

    pub fn translate(&self, dx: u32, dy: u32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Clip to a `width` x `height` frame. `None` when nothing is left.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Self> {
        let x = self.x.min(width);
        let y = self.y.min(height);
        let right = self.right().min(width);
        let bottom = self.bottom().min(height);
        if right <= x || bottom <= y {
            return None;
        }
        Some(Self::new(x, y, right - x, bottom - y))
    }

    /// Horizontal overlap with `other`, in pixels.
    pub fn x_overlap(&self, other: &Rect) -> u32 {
        let left = self.x.max(other.x);
        let right = self.right().min(other.right());
        right.saturating_sub(left)
    }

    /// A random point at least `margin` pixels inside the rectangle.
    ///
    /// Falls back to the centre axis when the rectangle is too small for
    /// the margin.
    pub fn random_interior(&self, margin: u32) -> (u32, u32) {
        let mut rng = rand::rng();
        let pick = |start: u32, len: u32, rng: &mut rand::rngs::ThreadRng| {
            if len > 2 * margin {
                rng.random_range(start + margin..=start + len - margin)
            } else {
                start + len / 2
            }
        };
        let x = pick(self.x, self.width, &mut rng);
        let y = pick(self.y, self.height, &mut rng);
        (x, y)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_interior_respects_margin() {
        let rect = Rect::new(100, 200, 60, 40);
        for _ in 0..200 {
            let (x, y) = rect.random_interior(10);
            assert!((110..=150).contains(&x));
            assert!((210..=230).contains(&y));
        }
    }

    #[test]
    fn random_interior_small_rect_uses_centre() {
        let rect = Rect::new(0, 0, 12, 8);
        assert_eq!(rect.random_interior(10), (6, 4));
    }

    #[test]
    fn clamp_to_frame() {
        let rect = Rect::new(90, 90, 20, 20);
        assert_eq!(rect.clamp_to(100, 100), Some(Rect::new(90, 90, 10, 10)));
        assert_eq!(Rect::new(120, 0, 5, 5).clamp_to(100, 100), None);
    }

    #[test]
    fn x_overlap() {
        let a = Rect::new(0, 0, 10, 10);
        assert_eq!(a.x_overlap(&Rect::new(5, 50, 10, 10)), 5);
        assert_eq!(a.x_overlap(&Rect::new(20, 0, 10, 10)), 0);
    }
}
