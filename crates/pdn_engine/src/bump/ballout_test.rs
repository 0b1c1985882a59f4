use std::path::PathBuf;

use super::*;

const SMALL: &str = "\
MAX_CURRENT = 1.5 A
BEGIN_CHIPLET tile 2 2
A1,POWER_1 A2,GND
B1,SIG B2,POWER_2
";

fn parse_small() -> BallOut {
  BallOut::parse(SMALL, &PathBuf::from("tile.ballout")).unwrap()
}

#[test]
fn test_parse_flips_to_bottom_left_origin() {
  let b = parse_small();
  assert_eq!(b.name, "tile");
  assert_eq!((b.width(), b.height()), (2, 2));
  assert_eq!(b.max_current, 1.5);
  // row A is the top row of the file, so it lands at y = 1
  assert_eq!(b.get(0, 1), SignalType::Power(1));
  assert_eq!(b.get(1, 1), SignalType::Ground);
  assert_eq!(b.get(0, 0), SignalType::Signal);
  assert_eq!(b.get(1, 0), SignalType::Power(2));
}

#[test]
fn test_csv_cell_parsing() {
  assert_eq!(csv_cell_to_point("A1"), Some(Point::new(0, 0)));
  assert_eq!(csv_cell_to_point("B3"), Some(Point::new(2, 1)));
  assert_eq!(csv_cell_to_point("AA12"), Some(Point::new(11, 26)));
  assert_eq!(csv_cell_to_point("7"), None);
  assert_eq!(csv_cell_to_point("A0"), None);
}

#[test]
fn test_four_quarter_turns_identity() {
  let b = parse_small();
  let r = b
    .rotated(Rotation::R90)
    .rotated(Rotation::R90)
    .rotated(Rotation::R90)
    .rotated(Rotation::R90);
  for y in 0..2 {
    for x in 0..2 {
      assert_eq!(b.get(x, y), r.get(x, y));
    }
  }
}

#[test]
fn test_r180_maps_corners() {
  let b = parse_small();
  let r = b.rotated(Rotation::R180);
  assert_eq!(r.get(0, 0), b.get(1, 1));
  assert_eq!(r.get(1, 1), b.get(0, 0));
}

#[test]
fn test_r90_dimension_swap() {
  const WIDE: &str = "\
BEGIN_CHIPLET wide 3 1
A1,P1 A2,P2 A3,P3
";
  let b = BallOut::parse(WIDE, &PathBuf::from("wide.ballout")).unwrap();
  let r = b.rotated(Rotation::R90);
  assert_eq!((r.width(), r.height()), (1, 3));
}

#[test]
fn test_discontinuous_cell_rejected() {
  const BAD: &str = "\
BEGIN_CHIPLET bad 2 1
A1,P1 A3,P2
";
  assert!(BallOut::parse(BAD, &PathBuf::from("bad.ballout")).is_err());
}

mod properties {
  use proptest::prelude::*;

  use super::*;

  /// Random ballout text with the signals laid out row-major.
  fn arb_ballout() -> impl Strategy<Value = (usize, usize, Vec<u8>)> {
    (1usize..6, 1usize..6)
      .prop_flat_map(|(w, h)| {
        proptest::collection::vec(1u8..=10, w * h).prop_map(move |sigs| (w, h, sigs))
      })
  }

  fn build(w: usize, h: usize, sigs: &[u8]) -> BallOut {
    let mut text = format!("BEGIN_CHIPLET prop {w} {h}\n");
    for j in 0..h {
      for i in 0..w {
        let row: String = {
          // spreadsheet row letters, 1-based
          let mut n = j + 1;
          let mut s = String::new();
          while n > 0 {
            s.insert(0, (b'A' + ((n - 1) % 26) as u8) as char);
            n = (n - 1) / 26;
          }
          s
        };
        text.push_str(&format!("{row}{},P{} ", i + 1, sigs[j * w + i]));
      }
      text.push('\n');
    }
    BallOut::parse(&text, &PathBuf::from("prop.ballout")).unwrap()
  }

  proptest! {
    #[test]
    fn four_quarter_turns_are_identity((w, h, sigs) in arb_ballout()) {
      let b = build(w, h, &sigs);
      let r = b
        .rotated(Rotation::R90)
        .rotated(Rotation::R90)
        .rotated(Rotation::R90)
        .rotated(Rotation::R90);
      prop_assert_eq!((b.width(), b.height()), (r.width(), r.height()));
      for y in 0..b.height() {
        for x in 0..b.width() {
          prop_assert_eq!(b.get(x, y), r.get(x, y));
        }
      }
    }

    #[test]
    fn two_half_turns_are_identity((w, h, sigs) in arb_ballout()) {
      let b = build(w, h, &sigs);
      let r = b.rotated(Rotation::R180).rotated(Rotation::R180);
      for y in 0..b.height() {
        for x in 0..b.width() {
          prop_assert_eq!(b.get(x, y), r.get(x, y));
        }
      }
    }
  }
}

#[test]
fn test_rotation_parse() {
  assert_eq!(Rotation::parse("R90"), Some(Rotation::R90));
  assert_eq!(Rotation::parse("180"), Some(Rotation::R180));
  assert_eq!(Rotation::parse("rotation_270"), Some(Rotation::R270));
  assert_eq!(Rotation::parse("diagonal"), None);
}
