use super::*;

fn seg(a: (i32, i32), b: (i32, i32)) -> OrderedSegment {
  OrderedSegment::new(Point::new(a.0, a.1), Point::new(b.0, b.1))
}

#[test]
fn test_canonical_order() {
  let s1 = seg((5, 5), (1, 1));
  let s2 = seg((1, 1), (5, 5));
  assert_eq!(s1, s2);
  assert_eq!(s1.low(), Point::new(1, 1));
}

#[test]
fn test_crossing_segments_intersect() {
  let a = seg((0, 0), (4, 4));
  let b = seg((0, 4), (4, 0));
  assert!(a.intersects(b));
}

#[test]
fn test_touching_endpoint_counts() {
  let a = seg((0, 0), (2, 2));
  let b = seg((2, 2), (4, 0));
  assert!(a.intersects(b));
}

#[test]
fn test_collinear_overlap_counts() {
  let a = seg((0, 0), (3, 0));
  let b = seg((2, 0), (5, 0));
  assert!(a.intersects(b));
}

#[test]
fn test_parallel_disjoint() {
  let a = seg((0, 0), (3, 0));
  let b = seg((0, 1), (3, 1));
  assert!(!a.intersects(b));
}

#[test]
fn test_collinear_disjoint() {
  let a = seg((0, 0), (1, 0));
  let b = seg((3, 0), (5, 0));
  assert!(!a.intersects(b));
}
