//! Bounding box types and operations.

use serde::{Deserialize, Serialize};

/// A world-space bounding box in the units of the raster CRS.
///
/// For the Canada-wide mosaics this is metres in EPSG:3978.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Create a new bounding box from corner coordinates.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Parse a "minx,miny,maxx,maxy" string.
    pub fn from_csv_string(s: &str) -> Result<Self, BboxParseError> {
        let values = parse_four::<f64>(s)?;
        Ok(Self::new(values[0], values[1], values[2], values[3]))
    }

    /// Smallest box enclosing every `(x, y)` in `points`, or `None` when empty.
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        points.into_iter().fold(None, |acc, (x, y)| {
            Some(match acc {
                None => Self::new(x, y, x, y),
                Some(b) => b.expand_to(x, y),
            })
        })
    }

    /// Width of the bounding box in coordinate units.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height of the bounding box in coordinate units.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// All corners finite and min <= max on both axes.
    pub fn is_valid(&self) -> bool {
        [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite())
            && self.min_x <= self.max_x
            && self.min_y <= self.max_y
    }

    /// Check if this bbox intersects another (touching edges do not count).
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x < other.max_x
            && self.max_x > other.min_x
            && self.min_y < other.max_y
            && self.max_y > other.min_y
    }

    /// Compute the intersection of two bounding boxes.
    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        if !self.intersects(other) {
            return None;
        }

        Some(BoundingBox {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
        })
    }

    /// Check if a point is contained within this bbox.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Grow the box to include a point.
    pub fn expand_to(&self, x: f64, y: f64) -> Self {
        Self {
            min_x: self.min_x.min(x),
            min_y: self.min_y.min(y),
            max_x: self.max_x.max(x),
            max_y: self.max_y.max(y),
        }
    }
}

/// Parse exactly four comma-separated numbers, tolerating surrounding
/// parentheses and whitespace ("(0, 0, 500, 500)").
pub(crate) fn parse_four<T: std::str::FromStr>(s: &str) -> Result<[T; 4], BboxParseError> {
    let trimmed = s.trim().trim_start_matches('(').trim_end_matches(')');
    let parts: Vec<&str> = trimmed.split(',').map(str::trim).collect();
    if parts.len() != 4 {
        return Err(BboxParseError::InvalidFormat(s.to_string()));
    }

    let mut parsed = Vec::with_capacity(4);
    for part in &parts {
        parsed.push(
            part.parse::<T>()
                .map_err(|_| BboxParseError::InvalidNumber(part.to_string()))?,
        );
    }

    match <[T; 4]>::try_from(parsed) {
        Ok(values) => Ok(values),
        Err(_) => Err(BboxParseError::InvalidFormat(s.to_string())),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BboxParseError {
    #[error("Invalid box format: {0}. Expected four comma-separated values")]
    InvalidFormat(String),

    #[error("Invalid number in box: {0}")]
    InvalidNumber(String),
}
