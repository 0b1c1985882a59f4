//! Rectilinear region with exact Boolean ops.
//!
//! A `PolygonSet` is a 90°-restricted region stored as the set of unit grid
//! cells it covers. On a unit grid this scanline-style representation is
//! exact: Boolean ops are set ops, fragment extraction is a 4-neighbour
//! flood, and hole detection is a complement flood inside the bounding box.
//! The legalisation steps of the Voronoi pipeline run entirely on this type;
//! floating point never enters.

use std::collections::BTreeSet;

use super::{Point, Rect};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PolygonSet {
  cells: BTreeSet<(i32, i32)>,
}

impl PolygonSet {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_rect(rect: Rect) -> Self {
    let mut set = Self::new();
    set.insert_rect(rect);
    set
  }

  pub fn insert_cell(&mut self, p: Point) {
    self.cells.insert((p.x, p.y));
  }

  pub fn remove_cell(&mut self, p: Point) {
    self.cells.remove(&(p.x, p.y));
  }

  pub fn insert_rect(&mut self, rect: Rect) {
    for c in rect.cells() {
      self.insert_cell(c);
    }
  }

  pub fn remove_rect(&mut self, rect: Rect) {
    for c in rect.cells() {
      self.remove_cell(c);
    }
  }

  #[inline]
  pub fn contains(&self, p: Point) -> bool {
    self.cells.contains(&(p.x, p.y))
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.cells.is_empty()
  }

  /// Covered area in unit cells.
  #[inline]
  pub fn area(&self) -> i64 {
    self.cells.len() as i64
  }

  pub fn cells(&self) -> impl Iterator<Item = Point> + '_ {
    self.cells.iter().map(|&(x, y)| Point::new(x, y))
  }

  pub fn union_with(&mut self, other: &PolygonSet) {
    self.cells.extend(other.cells.iter().copied());
  }

  pub fn intersect_with(&mut self, other: &PolygonSet) {
    self.cells.retain(|c| other.cells.contains(c));
  }

  pub fn subtract(&mut self, other: &PolygonSet) {
    self.cells.retain(|c| !other.cells.contains(c));
  }

  pub fn bounding_box(&self) -> Option<Rect> {
    let mut it = self.cells.iter();
    let &(x0, y0) = it.next()?;
    let (mut xl, mut yl, mut xh, mut yh) = (x0, y0, x0 + 1, y0 + 1);
    for &(x, y) in it {
      xl = xl.min(x);
      yl = yl.min(y);
      xh = xh.max(x + 1);
      yh = yh.max(y + 1);
    }
    Some(Rect::new(xl, yl, xh, yh))
  }

  /// Total boundary length: cell edges not shared with another covered cell.
  pub fn perimeter(&self) -> i64 {
    let mut p = 0i64;
    for &(x, y) in &self.cells {
      for (dx, dy) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
        if !self.cells.contains(&(x + dx, y + dy)) {
          p += 1;
        }
      }
    }
    p
  }

  /// Split into 4-connected fragments, largest-area first. Ties keep scan
  /// order so the result is deterministic.
  pub fn fragments(&self) -> Vec<PolygonSet> {
    let mut seen: BTreeSet<(i32, i32)> = BTreeSet::new();
    let mut out: Vec<PolygonSet> = Vec::new();

    for &seed in &self.cells {
      if seen.contains(&seed) {
        continue;
      }
      let mut frag = PolygonSet::new();
      let mut stack = vec![seed];
      seen.insert(seed);
      while let Some((x, y)) = stack.pop() {
        frag.cells.insert((x, y));
        for (dx, dy) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
          let n = (x + dx, y + dy);
          if self.cells.contains(&n) && seen.insert(n) {
            stack.push(n);
          }
        }
      }
      out.push(frag);
    }

    out.sort_by_key(|f| std::cmp::Reverse(f.area()));
    out
  }

  /// Number of interior holes: 4-connected components of the complement
  /// inside the bounding box that do not reach its border.
  pub fn hole_count(&self) -> usize {
    let Some(bbox) = self.bounding_box() else {
      return 0;
    };

    let mut seen: BTreeSet<(i32, i32)> = BTreeSet::new();
    let mut holes = 0;

    for y in bbox.yl()..bbox.yh() {
      for x in bbox.xl()..bbox.xh() {
        if self.cells.contains(&(x, y)) || seen.contains(&(x, y)) {
          continue;
        }
        let mut stack = vec![(x, y)];
        seen.insert((x, y));
        let mut open = false;
        while let Some((cx, cy)) = stack.pop() {
          if cx == bbox.xl() || cx == bbox.xh() - 1 || cy == bbox.yl() || cy == bbox.yh() - 1 {
            open = true;
          }
          for (dx, dy) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
            let n = (cx + dx, cy + dy);
            let inside = n.0 >= bbox.xl() && n.0 < bbox.xh() && n.1 >= bbox.yl() && n.1 < bbox.yh();
            if inside && !self.cells.contains(&n) && seen.insert(n) {
              stack.push(n);
            }
          }
        }
        if !open {
          holes += 1;
        }
      }
    }

    holes
  }

  /// Maximal horizontal slab tiling: per-row runs merged downward while the
  /// run below is identical.
  pub fn hrects(&self) -> Vec<Rect> {
    self.slab_rects(false)
  }

  /// Maximal vertical slab tiling (transposed scan).
  pub fn vrects(&self) -> Vec<Rect> {
    self.slab_rects(true)
  }

  fn slab_rects(&self, transpose: bool) -> Vec<Rect> {
    let has = |x: i32, y: i32| {
      if transpose {
        self.cells.contains(&(y, x))
      } else {
        self.cells.contains(&(x, y))
      }
    };
    let Some(bbox) = self.bounding_box() else {
      return Vec::new();
    };
    let (al, ah, bl, bh) = if transpose {
      (bbox.yl(), bbox.yh(), bbox.xl(), bbox.xh())
    } else {
      (bbox.xl(), bbox.xh(), bbox.yl(), bbox.yh())
    };

    // runs[b] = sorted list of [a0, a1) runs on scanline b
    let mut runs: Vec<Vec<(i32, i32)>> = Vec::new();
    for b in bl..bh {
      let mut line = Vec::new();
      let mut a = al;
      while a < ah {
        if has(a, b) {
          let a0 = a;
          while a < ah && has(a, b) {
            a += 1;
          }
          line.push((a0, a));
        } else {
          a += 1;
        }
      }
      runs.push(line);
    }

    let mut out = Vec::new();
    let mut consumed: Vec<Vec<bool>> = runs.iter().map(|l| vec![false; l.len()]).collect();
    for (bi, line) in runs.iter().enumerate() {
      for (ri, &run) in line.iter().enumerate() {
        if consumed[bi][ri] {
          continue;
        }
        consumed[bi][ri] = true;
        let mut span = 1usize;
        'grow: loop {
          let next = bi + span;
          if next >= runs.len() {
            break;
          }
          for (nri, &nrun) in runs[next].iter().enumerate() {
            if nrun == run && !consumed[next][nri] {
              consumed[next][nri] = true;
              span += 1;
              continue 'grow;
            }
          }
          break;
        }
        let b0 = bl + bi as i32;
        let b1 = b0 + span as i32;
        out.push(if transpose {
          Rect::new(b0, run.0, b1, run.1)
        } else {
          Rect::new(run.0, b0, run.1, b1)
        });
      }
    }
    out
  }

  /// Minimum slab dimension across both tilings; `i32::MIN` for the empty
  /// region.
  pub fn min_inner_width(&self) -> i32 {
    if self.is_empty() {
      return i32::MIN;
    }
    let h = self
      .hrects()
      .iter()
      .map(|r| r.height())
      .min()
      .unwrap_or(i32::MAX);
    let v = self
      .vrects()
      .iter()
      .map(|r| r.width())
      .min()
      .unwrap_or(i32::MAX);
    h.min(v)
  }
}

impl FromIterator<Point> for PolygonSet {
  fn from_iter<T: IntoIterator<Item = Point>>(iter: T) -> Self {
    let mut set = PolygonSet::new();
    for p in iter {
      set.insert_cell(p);
    }
    set
  }
}

#[cfg(test)]
#[path = "polygon_test.rs"]
mod polygon_test;
