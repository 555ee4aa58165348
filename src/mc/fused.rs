use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use rayon::prelude::*;

use super::distribution::StartDistribution;
use super::sampler::{history_rng, sample_cdf};
use super::types::{Estimator, McData, SolverConfig};

/// One full random walk, accumulated into a private tally buffer.
///
/// The terminating stage's own contribution is always recorded first; the
/// stage bound and then the weight cutoff are checked only after the tally.
pub(crate) fn run_history(
    data: &McData,
    coeffs: &[f64],
    start: &StartDistribution,
    cfg: &SolverConfig,
    history: u64,
    tally: &mut [f64],
) {
    let max_stage = coeffs.len() - 1;
    let mut rng = history_rng(cfg.seed, history);

    let Some(mut state) = sample_cdf(&start.cdf, rng.random()) else {
        return;
    };
    let mut weight = start.weight[state];
    if weight == 0.0 {
        return;
    }
    let initial_weight = weight;

    // collision tallies the zeroth-order term itself; expected_value gets it
    // added deterministically after the reduction, so its walks start at 1
    let mut stage = match cfg.estimator {
        Estimator::Collision => 0usize,
        Estimator::ExpectedValue => 1usize,
    };

    loop {
        let row = data.row(state);
        match cfg.estimator {
            Estimator::ExpectedValue => {
                let wt = coeffs[stage] * weight;
                for (k, &ind) in row.inds.iter().enumerate() {
                    tally[ind] += wt * row.h[k];
                }
            }
            Estimator::Collision => {
                tally[state] += coeffs[stage] * weight;
            }
        }

        if stage >= max_stage {
            break;
        }
        if (weight / initial_weight).abs() < cfg.weight_cutoff {
            break;
        }

        let Some(k) = sample_cdf(row.cdf, rng.random()) else {
            break; // row cdf did not cover the draw: absorption
        };
        weight *= row.wts[k];
        state = row.inds[k];
        stage += 1;
    }
}

/// Run every history as an independent task and merge the private tallies
/// elementwise. The merge is a plain associative add over zero-initialized
/// buffers, so any reduction tree gives the same expected value.
pub(crate) fn accumulate(
    data: &McData,
    coeffs: &[f64],
    start: &StartDistribution,
    cfg: &SolverConfig,
) -> Vec<f64> {
    let n = data.num_states();

    let pb = cfg.print.then(|| {
        let pb = ProgressBar::new(cfg.num_histories as u64);
        pb.set_style(
            ProgressStyle::with_template("[{elapsed_precise}] {bar:40} {pos}/{len} histories")
                .unwrap()
                .progress_chars("=>-"),
        );
        pb
    });

    let tally = (0..cfg.num_histories as u64)
        .into_par_iter()
        .fold(
            || vec![0.0f64; n],
            |mut acc, history| {
                run_history(data, coeffs, start, cfg, history, &mut acc);
                if let Some(pb) = &pb {
                    pb.inc(1);
                }
                acc
            },
        )
        .reduce(
            || vec![0.0f64; n],
            |mut a, b| {
                for (av, bv) in a.iter_mut().zip(b.iter()) {
                    *av += bv;
                }
                a
            },
        );

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    tally
}
