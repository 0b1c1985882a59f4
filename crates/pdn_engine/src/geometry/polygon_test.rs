use super::*;

fn rect_set(x1: i32, y1: i32, x2: i32, y2: i32) -> PolygonSet {
  PolygonSet::from_rect(Rect::new(x1, y1, x2, y2))
}

#[test]
fn test_union_and_area() {
  let mut a = rect_set(0, 0, 2, 2);
  let b = rect_set(1, 0, 3, 2);
  a.union_with(&b);
  assert_eq!(a.area(), 6);
}

#[test]
fn test_difference_splits_fragments() {
  // 3x1 bar minus the middle cell leaves two fragments
  let mut a = rect_set(0, 0, 3, 1);
  a.remove_cell(Point::new(1, 0));
  let frags = a.fragments();
  assert_eq!(frags.len(), 2);
  assert_eq!(frags[0].area() + frags[1].area(), 2);
}

#[test]
fn test_fragments_sorted_by_area() {
  let mut a = rect_set(0, 0, 4, 4);
  a.insert_cell(Point::new(10, 10));
  let frags = a.fragments();
  assert_eq!(frags.len(), 2);
  assert_eq!(frags[0].area(), 16);
  assert_eq!(frags[1].area(), 1);
}

#[test]
fn test_hole_detection() {
  // 3x3 ring
  let mut a = rect_set(0, 0, 3, 3);
  a.remove_cell(Point::new(1, 1));
  assert_eq!(a.hole_count(), 1);

  // opening one side drains the hole
  a.remove_cell(Point::new(1, 0));
  assert_eq!(a.hole_count(), 0);
}

#[test]
fn test_slab_tilings() {
  // L-shape: 2x1 bar plus one cell on top-left
  let mut a = rect_set(0, 0, 2, 1);
  a.insert_cell(Point::new(0, 1));
  let h = a.hrects();
  assert_eq!(h.len(), 2);
  let hsum: i64 = h.iter().map(|r| r.area()).sum();
  assert_eq!(hsum, a.area());

  let v = a.vrects();
  let vsum: i64 = v.iter().map(|r| r.area()).sum();
  assert_eq!(vsum, a.area());
}

#[test]
fn test_min_inner_width() {
  assert_eq!(PolygonSet::new().min_inner_width(), i32::MIN);
  assert_eq!(rect_set(0, 0, 5, 2).min_inner_width(), 2);
  // a 1-wide neck caps the inner width
  let mut a = rect_set(0, 0, 3, 3);
  a.insert_cell(Point::new(3, 1));
  a.insert_rect(Rect::new(4, 0, 7, 3));
  assert_eq!(a.min_inner_width(), 1);
}

#[test]
fn test_perimeter_of_unit_square() {
  assert_eq!(rect_set(0, 0, 1, 1).perimeter(), 4);
  assert_eq!(rect_set(0, 0, 2, 2).perimeter(), 8);
}

mod properties {
  use proptest::prelude::*;

  use super::*;

  fn arb_cells() -> impl Strategy<Value = Vec<(i32, i32)>> {
    proptest::collection::vec((0i32..12, 0i32..12), 0..40)
  }

  proptest! {
    #[test]
    fn fragments_partition_the_region(cells in arb_cells()) {
      let set: PolygonSet = cells.iter().map(|&(x, y)| Point::new(x, y)).collect();
      let frags = set.fragments();
      let total: i64 = frags.iter().map(|f| f.area()).sum();
      prop_assert_eq!(total, set.area());
      // fragments are pairwise disjoint
      for (i, a) in frags.iter().enumerate() {
        for b in frags.iter().skip(i + 1) {
          let mut inter = a.clone();
          inter.intersect_with(b);
          prop_assert!(inter.is_empty());
        }
      }
    }

    #[test]
    fn slab_tilings_cover_exactly(cells in arb_cells()) {
      let set: PolygonSet = cells.iter().map(|&(x, y)| Point::new(x, y)).collect();
      for rects in [set.hrects(), set.vrects()] {
        let mut rebuilt = PolygonSet::new();
        let mut area = 0i64;
        for r in rects {
          area += r.area();
          rebuilt.insert_rect(r);
        }
        prop_assert_eq!(area, set.area());
        prop_assert_eq!(rebuilt, set.clone());
      }
    }

    #[test]
    fn boolean_ops_respect_areas(a in arb_cells(), b in arb_cells()) {
      let sa: PolygonSet = a.iter().map(|&(x, y)| Point::new(x, y)).collect();
      let sb: PolygonSet = b.iter().map(|&(x, y)| Point::new(x, y)).collect();

      let mut union = sa.clone();
      union.union_with(&sb);
      let mut inter = sa.clone();
      inter.intersect_with(&sb);
      prop_assert_eq!(union.area() + inter.area(), sa.area() + sb.area());

      let mut diff = sa.clone();
      diff.subtract(&sb);
      prop_assert_eq!(diff.area() + inter.area(), sa.area());
    }
  }
}
