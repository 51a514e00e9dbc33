//! Piecewise-linear lookup tables and value limiting.

/// Errors raised when a lookup table cannot be built.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AfgenError {
    /// The flat table does not hold complete `(x, y)` pairs.
    #[error("lookup table needs an even number of values, found {len}")]
    OddLength {
        /// Number of values in the flat table.
        len: usize,
    },

    /// The table is empty.
    #[error("lookup table is empty")]
    Empty,

    /// X values ascend again after a break.
    #[error("x values of lookup table not strictly ascending: {xs:?}")]
    NotAscending {
        /// The x values as given.
        xs: Vec<f64>,
    },
}

/// Linear interpolation over `(x, y)` pairs, clamped at both ends.
///
/// Built from a flat `[x1, y1, x2, y2, ...]` list. Trailing pairs after the
/// ascending run of x values are padding and are dropped, so
/// `[0, 0, 30, 30, 0, 0]` is read as two points.
#[derive(Debug, Clone, PartialEq)]
pub struct Afgen {
    points: Vec<(f64, f64)>,
}

impl Afgen {
    /// Build a table from a flat list of pairs.
    pub fn new(table: &[f64]) -> Result<Self, AfgenError> {
        let chunks = table.chunks_exact(2);
        if !chunks.remainder().is_empty() {
            return Err(AfgenError::OddLength { len: table.len() });
        }
        let pairs: Vec<(f64, f64)> = chunks
            .filter_map(|pair| match pair {
                [x, y] => Some((*x, *y)),
                _ => None,
            })
            .collect();

        let mut points: Vec<(f64, f64)> = Vec::with_capacity(pairs.len());
        let mut broken = false;
        for (x, y) in pairs.iter().copied() {
            let ascending = points.last().is_none_or(|(last_x, _)| x > *last_x);
            match (broken, ascending) {
                (false, true) => points.push((x, y)),
                (false, false) => broken = true,
                (true, false) => {}
                (true, true) => {
                    return Err(AfgenError::NotAscending {
                        xs: pairs.iter().map(|(x, _)| *x).collect(),
                    });
                }
            }
        }
        if points.is_empty() {
            return Err(AfgenError::Empty);
        }
        Ok(Self { points })
    }

    /// Interpolated value at `x`.
    pub fn eval(&self, x: f64) -> f64 {
        let (Some(&(x_first, y_first)), Some(&(x_last, y_last))) =
            (self.points.first(), self.points.last())
        else {
            return 0.0;
        };
        if x <= x_first {
            return y_first;
        }
        if x >= x_last {
            return y_last;
        }
        self.points
            .windows(2)
            .find_map(|segment| match segment {
                [(x1, y1), (x2, y2)] if x <= *x2 => {
                    Some(y1 + (y2 - y1) / (x2 - x1) * (x - x1))
                }
                _ => None,
            })
            .unwrap_or(y_last)
    }

    /// Number of points after padding was dropped.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the table has no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// `value` limited to `[min, max]`. Unlike `f64::clamp` this never panics;
/// when `min > max` the result is `max`.
pub fn limit(min: f64, max: f64, value: f64) -> f64 {
    if value < min {
        min
    } else if value < max {
        value
    } else {
        max
    }
}
