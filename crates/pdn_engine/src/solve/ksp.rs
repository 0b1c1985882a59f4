//! SPD linear-system oracle.
//!
//! `G_n V_n = I_n` solves of the filler go through this trait. The default
//! backend is preconditioned conjugate gradient with a Jacobi
//! preconditioner; it accepts a warm-start vector, which plays the role of
//! the retained factorisation in amortised backends.

use crate::error::{EngineError, Result};

use super::sparse::SparseSym;

pub trait KspOracle {
  /// Solve `a * x = b`. `warm` seeds the iteration when the caller solved
  /// a nearby system before.
  fn solve(&mut self, a: &SparseSym, b: &[f64], warm: Option<&[f64]>) -> Result<Vec<f64>>;
}

/// Conjugate gradient with Jacobi preconditioning.
pub struct CgSolver {
  pub max_iterations: usize,
  pub tolerance: f64,
}

impl Default for CgSolver {
  fn default() -> Self {
    Self {
      max_iterations: 10_000,
      tolerance: 1e-10,
    }
  }
}

impl KspOracle for CgSolver {
  fn solve(&mut self, a: &SparseSym, b: &[f64], warm: Option<&[f64]>) -> Result<Vec<f64>> {
    let n = a.len();
    debug_assert_eq!(b.len(), n);
    if n == 0 {
      return Ok(Vec::new());
    }

    let inv_diag: Vec<f64> = (0..n)
      .map(|i| {
        let d = a.diagonal(i);
        if d.abs() > 0.0 {
          1.0 / d
        } else {
          1.0
        }
      })
      .collect();

    let mut x = match warm {
      Some(w) if w.len() == n => w.to_vec(),
      _ => vec![0.0; n],
    };

    let mut ax = vec![0.0; n];
    a.mul_vec(&x, &mut ax);
    let mut r: Vec<f64> = b.iter().zip(&ax).map(|(bi, axi)| bi - axi).collect();
    let mut z: Vec<f64> = r.iter().zip(&inv_diag).map(|(ri, di)| ri * di).collect();
    let mut p = z.clone();

    let b_norm = b.iter().map(|v| v * v).sum::<f64>().sqrt().max(1e-300);
    let mut rz: f64 = r.iter().zip(&z).map(|(a, b)| a * b).sum();

    for _ in 0..self.max_iterations {
      let r_norm = r.iter().map(|v| v * v).sum::<f64>().sqrt();
      if r_norm / b_norm < self.tolerance {
        return Ok(x);
      }

      let mut ap = vec![0.0; n];
      a.mul_vec(&p, &mut ap);
      let p_ap: f64 = p.iter().zip(&ap).map(|(a, b)| a * b).sum();
      if p_ap.abs() < 1e-300 {
        return Err(EngineError::KspDiverged("zero curvature direction".into()));
      }
      let alpha = rz / p_ap;

      for i in 0..n {
        x[i] += alpha * p[i];
        r[i] -= alpha * ap[i];
      }
      for i in 0..n {
        z[i] = r[i] * inv_diag[i];
      }
      let rz_next: f64 = r.iter().zip(&z).map(|(a, b)| a * b).sum();
      let beta = rz_next / rz;
      rz = rz_next;
      for i in 0..n {
        p[i] = z[i] + beta * p[i];
      }
    }

    let r_norm = r.iter().map(|v| v * v).sum::<f64>().sqrt();
    if r_norm / b_norm < self.tolerance * 100.0 {
      Ok(x)
    } else {
      Err(EngineError::KspDiverged(format!(
        "cg residual {r_norm:e} after {} iterations",
        self.max_iterations
      )))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_cg_solves_small_network() {
    // two resistors in series to ground: g=1 between 0-1, g=1 from 1 to gnd
    let mut a = SparseSym::new(2);
    a.add_conductance(0, 1, 1.0);
    a.add_conductance_to_ground(1, 1.0);

    // inject 1A at node 0
    let b = [1.0, 0.0];
    let mut solver = CgSolver::default();
    let x = solver.solve(&a, &b, None).unwrap();
    // V1 = 1V, V0 = 2V
    assert!((x[0] - 2.0).abs() < 1e-8);
    assert!((x[1] - 1.0).abs() < 1e-8);
  }

  #[test]
  fn test_cg_warm_start_matches_cold() {
    let mut a = SparseSym::new(3);
    a.add_conductance(0, 1, 2.0);
    a.add_conductance(1, 2, 1.0);
    a.add_conductance_to_ground(2, 0.5);
    let b = [0.5, 0.0, 0.0];

    let mut solver = CgSolver::default();
    let cold = solver.solve(&a, &b, None).unwrap();
    let warm = solver.solve(&a, &b, Some(&cold)).unwrap();
    for (c, w) in cold.iter().zip(&warm) {
      assert!((c - w).abs() < 1e-8);
    }
  }
}
