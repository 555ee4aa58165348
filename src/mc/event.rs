use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use super::distribution::StartDistribution;
use super::sampler::{history_rng, sample_cdf};
use super::types::{McData, SolverConfig};

const DEAD: usize = usize::MAX;

/// In-flight walk for the stage-synchronized kernel. The whole population
/// advances one stage per round; finished walks are parked on DEAD and
/// skipped by later passes.
pub(crate) struct History {
    state: usize,
    weight: f64,
    initial_weight: f64,
    rng: ChaCha8Rng,
}

impl History {
    #[inline]
    fn alive(&self) -> bool {
        self.state != DEAD
    }
}

/// Sample every history's starting state. A walk whose draw misses the start
/// cdf, or that lands on a zero-weight state, never goes live.
pub(crate) fn init_population(start: &StartDistribution, cfg: &SolverConfig) -> Vec<History> {
    (0..cfg.num_histories as u64)
        .into_par_iter()
        .map(|h| {
            let mut rng = history_rng(cfg.seed, h);
            let draw: f64 = rng.random();
            match sample_cdf(&start.cdf, draw) {
                Some(s) if start.weight[s] != 0.0 => History {
                    state: s,
                    weight: start.weight[s],
                    initial_weight: start.weight[s],
                    rng,
                },
                _ => History {
                    state: DEAD,
                    weight: 0.0,
                    initial_weight: 0.0,
                    rng,
                },
            }
        })
        .collect()
}

/// Advance every live walk by one transition. Cutoff first, then the row
/// draw, matching the per-history loop order: the tally for the stage being
/// left has already been recorded by the time this pass runs.
pub(crate) fn transition(population: &mut [History], data: &McData, weight_cutoff: f64) {
    population.par_iter_mut().for_each(|hst| {
        if !hst.alive() {
            return;
        }
        if (hst.weight / hst.initial_weight).abs() < weight_cutoff {
            hst.state = DEAD;
            return;
        }
        let row = data.row(hst.state);
        match sample_cdf(row.cdf, hst.rng.random()) {
            Some(k) => {
                hst.weight *= row.wts[k];
                hst.state = row.inds[k];
            }
            None => hst.state = DEAD,
        }
    });
}

/// Collision tally for one stage, single-owner over the shared accumulator
/// in history order so the merge order is fixed.
pub(crate) fn tally_collision(population: &[History], coeff: f64, y: &mut [f64]) {
    for hst in population {
        if hst.alive() {
            y[hst.state] += coeff * hst.weight;
        }
    }
}

/// Stage-synchronized execution: one init round plus max_history_length
/// transition rounds, a tally after every round.
pub(crate) fn accumulate(
    data: &McData,
    coeffs: &[f64],
    start: &StartDistribution,
    cfg: &SolverConfig,
) -> Vec<f64> {
    let mut y = vec![0.0f64; data.num_states()];
    let mut population = init_population(start, cfg);
    tally_collision(&population, coeffs[0], &mut y);
    for &coeff in &coeffs[1..] {
        transition(&mut population, data, cfg.weight_cutoff);
        tally_collision(&population, coeff, &mut y);
    }
    y
}
