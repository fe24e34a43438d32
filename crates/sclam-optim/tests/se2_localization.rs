use approx::assert_relative_eq;
use faer::Mat;
use glam::{DVec2, DVec3};
use sclam_lie::se2::SE2;
use sclam_optim::{
    Factor, FactorError, FactorResult, LevenbergMarquardt, Linearization, Manifold, Problem,
};

fn pose(x: &[f64]) -> FactorResult<SE2> {
    match x {
        [x, y, theta] => Ok(SE2::from_xytheta(*x, *y, *theta)),
        _ => Err(FactorError::WrongDimension {
            expected: 3,
            actual: x.len(),
        }),
    }
}

/// A known landmark seen from the robot: r = X⁻¹ · landmark - observed.
struct LandmarkObservation {
    landmark: DVec2,
    observed: DVec2,
}

impl Factor for LandmarkObservation {
    fn residual_dim(&self) -> usize {
        2
    }

    fn residual(&self, x: &[f64]) -> FactorResult<Vec<f64>> {
        let r = pose(x)?.inverse() * self.landmark - self.observed;
        Ok(vec![r.x, r.y])
    }

    fn linearize(&self, x: &[f64]) -> FactorResult<Linearization> {
        let q = pose(x)?.inverse() * self.landmark;
        // exp(-δ) q ≈ q - ρ - θ (-q.y, q.x)
        let rows = [[-1.0, 0.0, q.y], [0.0, -1.0, -q.x]];
        Ok(Linearization {
            residual: self.residual(x)?,
            jacobian: Mat::from_fn(2, 3, |i, j| rows[i][j]),
        })
    }
}

fn landmarks() -> Vec<DVec2> {
    vec![
        DVec2::new(4.0, 1.0),
        DVec2::new(-2.0, 3.0),
        DVec2::new(0.5, -3.5),
        DVec2::new(2.5, 2.5),
    ]
}

fn localization_problem(truth: &SE2, start: &SE2) -> Problem {
    let mut problem = Problem::new(Manifold::SE2, start.to_vector().to_vec()).unwrap();
    for landmark in landmarks() {
        problem.add_factor(Box::new(LandmarkObservation {
            landmark,
            observed: truth.inverse() * landmark,
        }));
    }
    problem
}

#[test]
fn jacobian_matches_finite_differences() {
    let factor = LandmarkObservation {
        landmark: DVec2::new(3.0, -1.0),
        observed: DVec2::new(0.2, 0.4),
    };
    let x = SE2::from_xytheta(0.4, -0.7, 2.1);
    let lin = factor.linearize(&x.to_vector()).unwrap();

    let h = 1e-6;
    for k in 0..3 {
        let mut d = DVec3::ZERO;
        d[k] = h;
        let plus = factor.residual(&x.rplus(d).to_vector()).unwrap();
        let minus = factor.residual(&x.rplus(-d).to_vector()).unwrap();
        for row in 0..2 {
            let numeric = (plus[row] - minus[row]) / (2.0 * h);
            assert_relative_eq!(lin.jacobian.read(row, k), numeric, epsilon = 1e-7);
        }
    }
}

#[test]
fn se2_block_converges_to_the_true_pose() {
    let truth = SE2::from_xytheta(1.0, -0.5, 2.8);
    let start = SE2::from_xytheta(0.6, 0.0, -2.9);
    let mut problem = localization_problem(&truth, &start);

    let initial_cost = problem.cost().unwrap();
    let result = LevenbergMarquardt::default().optimize(&mut problem).unwrap();

    assert!(result.converged(), "{result:?}");
    assert!(result.final_cost < initial_cost);
    assert!(result.final_cost < 1e-16);

    let [x, y, theta] = truth.to_vector();
    let values = problem.values();
    assert_relative_eq!(values[0], x, epsilon = 1e-8);
    assert_relative_eq!(values[1], y, epsilon = 1e-8);
    assert_relative_eq!(values[2], theta, epsilon = 1e-8);
}

#[test]
fn information_is_full_rank_with_spread_landmarks() {
    let truth = SE2::from_xytheta(1.0, -0.5, 0.3);
    let problem = localization_problem(&truth, &truth);
    let normal = problem.normal_equations().unwrap();

    assert!(normal.cost < 1e-20);
    let singular_values = normal.hessian.singular_values();
    assert!(singular_values.iter().all(|s| *s > 1e-3));
}
