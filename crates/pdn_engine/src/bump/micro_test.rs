use std::path::PathBuf;

use super::*;

fn tile() -> BallOut {
  const SRC: &str = "\
MAX_CURRENT = 2.0 A
BEGIN_CHIPLET tile 2 2
A1,POWER_1 A2,POWER_2
B1,GND B2,POWER_1
";
  BallOut::parse(SRC, &PathBuf::from("tile.ballout")).unwrap()
}

#[test]
fn test_place_chiplet_stamps_canvas() {
  let mut ub = MicroBump::new(10, 10);
  ub.include_ballout(tile());
  ub.place_chiplet("tile", "u0", Rotation::R0, Point::new(3, 4)).unwrap();

  // bottom row of the ballout is GND / POWER_1
  assert_eq!(ub.canvas.get(3, 4), SignalType::Ground);
  assert_eq!(ub.canvas.get(4, 4), SignalType::Power(1));
  assert_eq!(ub.canvas.get(3, 5), SignalType::Power(1));
  assert_eq!(ub.canvas.get(4, 5), SignalType::Power(2));

  assert_eq!(ub.instances.len(), 1);
  assert_eq!(ub.instances[0].power_signals, vec![SignalType::Power(1), SignalType::Power(2)]);
}

#[test]
fn test_out_of_envelope_rejected() {
  let mut ub = MicroBump::new(4, 4);
  ub.include_ballout(tile());
  assert!(ub.place_chiplet("tile", "u0", Rotation::R0, Point::new(3, 3)).is_err());
}

#[test]
fn test_unknown_ballout_rejected() {
  let mut ub = MicroBump::new(4, 4);
  assert!(ub.place_chiplet("ghost", "u0", Rotation::R0, Point::new(0, 0)).is_err());
}

#[test]
fn test_signal_currents_sum_instances() {
  let mut ub = MicroBump::new(10, 10);
  ub.include_ballout(tile());
  ub.place_chiplet("tile", "u0", Rotation::R0, Point::new(0, 0)).unwrap();
  ub.place_chiplet("tile", "u1", Rotation::R0, Point::new(5, 5)).unwrap();

  let currents = ub.signal_currents();
  assert_eq!(currents[&SignalType::Power(1)], 4.0);
  assert_eq!(currents[&SignalType::Power(2)], 4.0);
}
