//! Signal type enumeration.
//!
//! The closed set of signals a cell can carry. The ten power nets are the
//! ones the synthesiser decides; everything else is fixed input or a
//! diagnostic sentinel. `Unknown` must never survive into a finished canvas.

/// One signal on the interposer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SignalType {
  #[default]
  Empty,
  /// Power net 1..=10.
  Power(u8),
  Ground,
  Signal,
  Obstacle,
  Overlap,
  Unknown,
}

/// The ten decidable power nets, in index order.
pub const POWER_SIGNAL_SET: [SignalType; 10] = [
  SignalType::Power(1),
  SignalType::Power(2),
  SignalType::Power(3),
  SignalType::Power(4),
  SignalType::Power(5),
  SignalType::Power(6),
  SignalType::Power(7),
  SignalType::Power(8),
  SignalType::Power(9),
  SignalType::Power(10),
];

impl SignalType {
  #[inline]
  pub fn is_power(self) -> bool {
    matches!(self, SignalType::Power(_))
  }

  /// Canonical display name, `POWER_n` style.
  pub fn as_str(self) -> &'static str {
    match self {
      SignalType::Empty => "EMPTY",
      SignalType::Power(1) => "POWER_1",
      SignalType::Power(2) => "POWER_2",
      SignalType::Power(3) => "POWER_3",
      SignalType::Power(4) => "POWER_4",
      SignalType::Power(5) => "POWER_5",
      SignalType::Power(6) => "POWER_6",
      SignalType::Power(7) => "POWER_7",
      SignalType::Power(8) => "POWER_8",
      SignalType::Power(9) => "POWER_9",
      SignalType::Power(10) => "POWER_10",
      SignalType::Power(_) => "UNKNOWN",
      SignalType::Ground => "GROUND",
      SignalType::Signal => "SIGNAL",
      SignalType::Obstacle => "OBSTACLE",
      SignalType::Overlap => "OVERLAP",
      SignalType::Unknown => "UNKNOWN",
    }
  }

  /// Parse a signal name. Case-insensitive; accepts the short aliases
  /// (`PWR_n`, `Pn`, `GND`, `SIG`, `OBST`, `OBSTACLES`) and an optional
  /// `SIGNALTYPE::` / `SIGNALTYPE_` prefix. Unrecognised input maps to
  /// `Unknown` so callers can decide whether that is fatal.
  pub fn parse(s: &str) -> SignalType {
    let upper = s.trim().to_ascii_uppercase();
    let name = upper
      .strip_prefix("SIGNALTYPE::")
      .or_else(|| upper.strip_prefix("SIGNALTYPE_"))
      .unwrap_or(&upper);

    if let Some(n) = name
      .strip_prefix("POWER_")
      .or_else(|| name.strip_prefix("PWR_"))
      .or_else(|| name.strip_prefix("P"))
    {
      if let Ok(idx) = n.parse::<u8>() {
        if (1..=10).contains(&idx) {
          return SignalType::Power(idx);
        }
      }
    }

    match name {
      "EMPTY" => SignalType::Empty,
      "GROUND" | "GND" => SignalType::Ground,
      "SIGNAL" | "SIG" => SignalType::Signal,
      "OBSTACLE" | "OBSTACLES" | "OBST" => SignalType::Obstacle,
      "OVERLAP" => SignalType::Overlap,
      _ => SignalType::Unknown,
    }
  }
}

impl std::fmt::Display for SignalType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_aliases() {
    assert_eq!(SignalType::parse("POWER_3"), SignalType::Power(3));
    assert_eq!(SignalType::parse("pwr_10"), SignalType::Power(10));
    assert_eq!(SignalType::parse("P7"), SignalType::Power(7));
    assert_eq!(SignalType::parse("GND"), SignalType::Ground);
    assert_eq!(SignalType::parse("SIGNALTYPE::OBSTACLES"), SignalType::Obstacle);
    assert_eq!(SignalType::parse("whatever"), SignalType::Unknown);
  }

  #[test]
  fn test_power_round_trips_through_name() {
    for st in POWER_SIGNAL_SET {
      assert_eq!(SignalType::parse(st.as_str()), st);
    }
  }

  #[test]
  fn test_out_of_range_power_is_unknown() {
    assert_eq!(SignalType::parse("POWER_11"), SignalType::Unknown);
    assert_eq!(SignalType::parse("P0"), SignalType::Unknown);
  }
}
