use std::io::Write;

use super::*;

fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
  let path = dir.path().join(name);
  let mut f = std::fs::File::create(&path).unwrap();
  f.write_all(content.as_bytes()).unwrap();
  path
}

/// A 8x8 grid / 9x9 pin interposer with one 2x2 chiplet and a 2x2 c4
/// lattice.
fn small_pinout(dir: &tempfile::TempDir) -> std::path::PathBuf {
  write_file(
    dir,
    "cpu.ballout",
    "MAX_CURRENT = 1.0 A\nBEGIN_CHIPLET cpu 2 2\nA1,POWER_1 A2,POWER_1\nB1,GND B2,POWER_1\n",
  );
  write_file(
    dir,
    "c4.ballout",
    "BEGIN_CHIPLET c4map 2 2\nA1,POWER_1 A2,GND\nB1,GND B2,POWER_1\n",
  );
  write_file(
    dir,
    "m1.preplace",
    "BEGIN_PREPLACE\nSIGNAL: OBSTACLE\nCord(4,0) to Cord(4,3)\nEND_PREPLACE\n",
  );
  write_file(
    dir,
    "design.pinout",
    "# small fixture\n\
     TECHNOLOGY_BEGIN\n\
     GRID_WIDTH = 8\n\
     GRID_HEIGHT = 8\n\
     PIN_WIDTH = 9\n\
     PIN_HEIGHT = 9\n\
     LAYERS = 2\n\
     TECHNOLOGY_END\n\
     PDN_PREPLACE_START\n\
     METAL_LAYER 1 \"m1.preplace\"\n\
     PDN_PREPLACE_END\n\
     MICROBUMP_START\n\
     include \"cpu.ballout\"\n\
     CHIPLET cpu u0 R0 (2, 5)\n\
     MICROBUMP_END\n\
     C4_START\n\
     C4_WIDTH = 2\n\
     C4_HEIGHT = 2\n\
     C4_PITCH_WIDTH = 4\n\
     C4_PITCH_HEIGHT = 4\n\
     C4_COUNT_WIDTH = 2\n\
     C4_COUNT_HEIGHT = 2\n\
     C4_LEFT_BORDER = 1\n\
     C4_RIGHT_BORDER = 2\n\
     C4_UP_BORDER = 2\n\
     C4_DOWN_BORDER = 1\n\
     include \"c4.ballout\"\n\
     ROTATION R0\n\
     C4_END\n",
  )
}

#[test]
fn test_parse_pinout_builds_substrate() {
  let dir = tempfile::tempdir().unwrap();
  let path = small_pinout(&dir);
  let sub = PdnSubstrate::from_pinout_file(&path).unwrap();

  assert_eq!(sub.grid_width(), 8);
  assert_eq!(sub.metal_layer_count(), 2);
  assert_eq!(sub.via_layer_count(), 1);
  assert_eq!(sub.ubump.instances.len(), 1);
  assert_eq!(sub.c4.clusters.len(), 4);
  assert!(sub.metal_layers[1]
    .preplaced
    .contains_key(&SignalType::Obstacle));
}

#[test]
fn test_mark_preplaced_and_insert_pads() {
  let dir = tempfile::tempdir().unwrap();
  let sub_path = small_pinout(&dir);
  let mut sub = PdnSubstrate::from_pinout_file(&sub_path).unwrap();
  sub.mark_preplaced_and_insert_pads();

  // chiplet power pin at pin (3, 6) marks its four surrounding cells
  assert_eq!(sub.metal_layers[0].get(2, 5), SignalType::Power(1));
  assert_eq!(sub.metal_layers[0].get(3, 6), SignalType::Power(1));

  // c4 GND pins become obstacles only after mark_obstacles; first they stamp
  // their own signal on the bottom layer
  sub.mark_obstacles_on_canvas();
  assert_eq!(sub.metal_layers[1].get(1, 1), SignalType::Obstacle);

  // the preplaced obstacle stripe survives where no pad overlaps it
  assert_eq!(sub.metal_layers[1].get(4, 3), SignalType::Obstacle);
}

#[test]
fn test_mark_preplaced_idempotent() {
  let dir = tempfile::tempdir().unwrap();
  let path = small_pinout(&dir);
  let mut a = PdnSubstrate::from_pinout_file(&path).unwrap();
  a.mark_preplaced_and_insert_pads();
  let mut b = a.clone();
  b.mark_preplaced_and_insert_pads();
  for layer in 0..a.metal_layer_count() {
    for y in 0..a.grid_height() {
      for x in 0..a.grid_width() {
        assert_eq!(a.metal_layers[layer].get(x, y), b.metal_layers[layer].get(x, y));
      }
    }
  }
}

#[test]
fn test_check_one_piece_detects_split() {
  let mut sub = PdnSubstrate::new_empty(6, 6, 2);
  sub.metal_layers[0].set(0, 0, SignalType::Power(1));
  sub.metal_layers[0].set(5, 5, SignalType::Power(1));
  assert!(!sub.check_one_piece(0));

  // join them
  for x in 0..6 {
    sub.metal_layers[0].set(x, 0, SignalType::Power(1));
  }
  for y in 0..6 {
    sub.metal_layers[0].set(5, y, SignalType::Power(1));
  }
  assert!(sub.check_one_piece(0));
}

#[test]
fn test_assign_vias_requires_agreement() {
  let mut sub = PdnSubstrate::new_empty(4, 4, 2);
  // fill the 2x2 block around pin (2,2) on both layers
  for layer in 0..2 {
    for y in 1..3 {
      for x in 1..3 {
        sub.metal_layers[layer].set(x, y, SignalType::Power(2));
      }
    }
  }
  sub.assign_vias();
  assert_eq!(sub.via_layers[0].get(2, 2), SignalType::Power(2));
  // a corner pin bordering empty cells stays empty
  assert_eq!(sub.via_layers[0].get(0, 0), SignalType::Empty);
}

#[test]
fn test_remove_floating_planes_keeps_anchored() {
  let mut sub = PdnSubstrate::new_empty(6, 6, 2);
  // anchored region: preplaced at (0,0)
  sub.metal_layers[0]
    .preplaced
    .entry(SignalType::Power(1))
    .or_default()
    .push(Point::new(0, 0));
  sub.metal_layers[0].set(0, 0, SignalType::Power(1));
  sub.metal_layers[0].set(1, 0, SignalType::Power(1));
  // floating region far away
  sub.metal_layers[0].set(5, 5, SignalType::Power(1));

  sub.remove_floating_planes(0);
  assert_eq!(sub.metal_layers[0].get(0, 0), SignalType::Power(1));
  assert_eq!(sub.metal_layers[0].get(1, 0), SignalType::Power(1));
  assert_eq!(sub.metal_layers[0].get(5, 5), SignalType::Empty);
}

#[test]
fn test_check_pin_pad_valid() {
  let mut sub = PdnSubstrate::new_empty(4, 4, 2);
  sub.ubump.canvas.set(2, 2, SignalType::Power(1));
  sub
    .ubump
    .signal_cords
    .entry(SignalType::Power(1))
    .or_default()
    .insert(Point::new(2, 2));

  // pads not yet stamped: invalid
  assert!(!sub.check_pin_pad_valid(0));
  sub.mark_preplaced_and_insert_pads();
  assert!(sub.check_pin_pad_valid(0));
  // the c4 side carries no pins here, so it is vacuously valid
  assert!(sub.check_pin_pad_valid(1));
}

#[test]
fn test_pad_cells_of_corner() {
  let cells = pad_cells(0, 0);
  assert!(cells.contains(&(0, 0)));
  assert!(cells.contains(&(-1, -1)));
}
