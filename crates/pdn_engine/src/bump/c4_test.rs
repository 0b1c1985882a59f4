use std::path::PathBuf;

use super::*;

fn c4_ballout() -> BallOut {
  const SRC: &str = "\
BEGIN_CHIPLET c4map 2 2
A1,POWER_1 A2,GND
B1,GND B2,POWER_1
";
  BallOut::parse(SRC, &PathBuf::from("c4.ballout")).unwrap()
}

fn layout() -> C4Layout {
  C4Layout {
    cluster_pin_count_width: 2,
    cluster_pin_count_height: 2,
    cluster_pitch_width: 4,
    cluster_pitch_height: 4,
    cluster_count_width: 2,
    cluster_count_height: 2,
    left_border: 1,
    right_border: 2,
    up_border: 2,
    down_border: 1,
  }
}

#[test]
fn test_lattice_expansion() {
  // span: 1 + 2 + 2 + 4*1 = 9 on both axes
  let c4 = C4Bump::build(9, 9, layout(), &c4_ballout(), Rotation::R0).unwrap();
  assert_eq!(c4.clusters.len(), 4);
  for cluster in &c4.clusters {
    assert_eq!(cluster.pins.len(), 4);
    for pin in &cluster.pins {
      assert_eq!(c4.canvas.get_point(*pin), cluster.signal);
    }
  }
  // bottom-left cluster starts at the borders
  assert_eq!(c4.canvas.get(1, 1), SignalType::Ground);
}

#[test]
fn test_span_mismatch_rejected() {
  assert!(C4Bump::build(10, 9, layout(), &c4_ballout(), Rotation::R0).is_err());
}

#[test]
fn test_rotation_respects_ballout() {
  let plain = C4Bump::build(9, 9, layout(), &c4_ballout(), Rotation::R0).unwrap();
  let turned = C4Bump::build(9, 9, layout(), &c4_ballout(), Rotation::R180).unwrap();
  // the 2x2 ballout is 180-degree symmetric here, so the lattices agree
  for y in 0..9 {
    for x in 0..9 {
      assert_eq!(plain.canvas.get(x, y), turned.canvas.get(x, y));
    }
  }
}
