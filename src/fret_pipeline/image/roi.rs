//! Region-of-interest predicates

/// A pixel-membership predicate in image coordinates.
///
/// Pixel `(x, y)` is tested at its centre `(x + 0.5, y + 0.5)` for the
/// ellipse shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Roi {
    Rectangle {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    },
    /// Ellipse inscribed in the given bounding box.
    Ellipse {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    },
    /// Arbitrary mask; `mask` is row-major over the bounding box.
    Mask {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
        mask: Vec<bool>,
    },
}

impl Roi {
    pub fn rectangle(x: usize, y: usize, width: usize, height: usize) -> Self {
        Roi::Rectangle { x, y, width, height }
    }

    pub fn ellipse(x: usize, y: usize, width: usize, height: usize) -> Self {
        Roi::Ellipse { x, y, width, height }
    }

    /// Bounding box as `(x, y, width, height)`.
    pub fn bounds(&self) -> (usize, usize, usize, usize) {
        match *self {
            Roi::Rectangle { x, y, width, height }
            | Roi::Ellipse { x, y, width, height }
            | Roi::Mask { x, y, width, height, .. } => (x, y, width, height),
        }
    }

    pub fn contains(&self, px: usize, py: usize) -> bool {
        let (x, y, width, height) = self.bounds();
        if px < x || py < y || px >= x + width || py >= y + height {
            return false;
        }
        match self {
            Roi::Rectangle { .. } => true,
            Roi::Ellipse { .. } => {
                let rx = width as f64 / 2.0;
                let ry = height as f64 / 2.0;
                let dx = (px - x) as f64 + 0.5 - rx;
                let dy = (py - y) as f64 + 0.5 - ry;
                (dx / rx).powi(2) + (dy / ry).powi(2) <= 1.0
            }
            Roi::Mask { mask, .. } => mask
                .get((py - y) * width + (px - x))
                .copied()
                .unwrap_or(false),
        }
    }

    /// Row-major indices of the ROI pixels that fall inside a
    /// `image_width` x `image_height` raster.
    pub fn pixel_indices(&self, image_width: usize, image_height: usize) -> Vec<usize> {
        let (x, y, width, height) = self.bounds();
        let x_end = (x + width).min(image_width);
        let y_end = (y + height).min(image_height);
        let mut indices = Vec::new();
        for py in y.min(y_end)..y_end {
            for px in x.min(x_end)..x_end {
                if self.contains(px, py) {
                    indices.push(py * image_width + px);
                }
            }
        }
        indices
    }
}
