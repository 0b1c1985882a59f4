//! Canonically ordered line segment with exact intersection tests.

use super::Point;

/// A segment whose endpoints are stored so that `low <= high`
/// lexicographically. Two segments covering the same points compare equal
/// regardless of construction order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OrderedSegment {
  low: Point,
  high: Point,
}

impl OrderedSegment {
  pub fn new(a: Point, b: Point) -> Self {
    if a <= b {
      Self { low: a, high: b }
    } else {
      Self { low: b, high: a }
    }
  }

  #[inline]
  pub fn low(self) -> Point {
    self.low
  }

  #[inline]
  pub fn high(self) -> Point {
    self.high
  }

  #[inline]
  pub fn length(self) -> f64 {
    self.low.l2_distance(self.high)
  }

  #[inline]
  pub fn length_squared(self) -> i64 {
    self.low.distance_squared(self.high)
  }

  /// Segment-segment intersection, inclusive of touching endpoints and
  /// collinear overlap. Exact on integer coordinates.
  pub fn intersects(self, other: OrderedSegment) -> bool {
    segments_intersect(self.low, self.high, other.low, other.high)
  }
}

impl std::fmt::Display for OrderedSegment {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} -- {}", self.low, self.high)
  }
}

/// Sign of the cross product (b-a) × (c-a).
#[inline]
fn orientation(a: Point, b: Point, c: Point) -> i64 {
  let v = (b.x as i64 - a.x as i64) * (c.y as i64 - a.y as i64)
    - (b.y as i64 - a.y as i64) * (c.x as i64 - a.x as i64);
  v.signum()
}

/// True when `c` lies on the closed segment `a`-`b`, assuming collinearity.
#[inline]
fn on_segment(a: Point, b: Point, c: Point) -> bool {
  c.x >= a.x.min(b.x) && c.x <= a.x.max(b.x) && c.y >= a.y.min(b.y) && c.y <= a.y.max(b.y)
}

/// Closed segment intersection test (touch counts).
pub fn segments_intersect(p1: Point, p2: Point, q1: Point, q2: Point) -> bool {
  let o1 = orientation(p1, p2, q1);
  let o2 = orientation(p1, p2, q2);
  let o3 = orientation(q1, q2, p1);
  let o4 = orientation(q1, q2, p2);

  if o1 != o2 && o3 != o4 {
    return true;
  }

  (o1 == 0 && on_segment(p1, p2, q1))
    || (o2 == 0 && on_segment(p1, p2, q2))
    || (o3 == 0 && on_segment(q1, q2, p1))
    || (o4 == 0 && on_segment(q1, q2, p2))
}

#[cfg(test)]
#[path = "segment_test.rs"]
mod segment_test;
