use anyhow::{Result, ensure};
use std::time::Instant;

use super::distribution::build_start_distribution;
use super::event;
use super::fused;
use super::types::{Estimator, Kernel, McData, SolverConfig};

/// Capability shared by the solver kernels: estimate y from x over the data
/// the solver was built with. Kernels hold no mutable state between solves.
pub trait McSolver {
    fn solve(&self, x: &[f64], y: &mut [f64]) -> Result<()>;
}

/// One rayon task per history, each walking to completion into a private
/// tally buffer, tree-merged afterwards. Supports both estimators.
pub struct FusedSolver<'a> {
    data: &'a McData,
    coeffs: &'a [f64],
    cfg: SolverConfig,
}

impl<'a> FusedSolver<'a> {
    pub fn new(data: &'a McData, coeffs: &'a [f64], cfg: SolverConfig) -> Result<Self> {
        check_problem(data, coeffs)?;
        Ok(FusedSolver { data, coeffs, cfg })
    }
}

impl McSolver for FusedSolver<'_> {
    fn solve(&self, x: &[f64], y: &mut [f64]) -> Result<()> {
        check_vectors(self.data, x, y)?;
        let start = build_start_distribution(x, self.cfg.start_weight_factor)?;
        let tally = fused::accumulate(self.data, self.coeffs, &start, &self.cfg);
        finalize(y, &tally, x, self.coeffs, &self.cfg);
        Ok(())
    }
}

/// Stage-synchronized population kernel. Collision estimator only; the
/// expected-value fan-out has no per-round formulation here.
pub struct EventSolver<'a> {
    data: &'a McData,
    coeffs: &'a [f64],
    cfg: SolverConfig,
}

impl<'a> EventSolver<'a> {
    pub fn new(data: &'a McData, coeffs: &'a [f64], cfg: SolverConfig) -> Result<Self> {
        check_problem(data, coeffs)?;
        ensure!(
            cfg.estimator == Estimator::Collision,
            "expected_value estimator is not available in the event kernel"
        );
        Ok(EventSolver { data, coeffs, cfg })
    }
}

impl McSolver for EventSolver<'_> {
    fn solve(&self, x: &[f64], y: &mut [f64]) -> Result<()> {
        check_vectors(self.data, x, y)?;
        let start = build_start_distribution(x, self.cfg.start_weight_factor)?;
        let tally = event::accumulate(self.data, self.coeffs, &start, &self.cfg);
        finalize(y, &tally, x, self.coeffs, &self.cfg);
        Ok(())
    }
}

fn check_problem(data: &McData, coeffs: &[f64]) -> Result<()> {
    data.validate()?;
    ensure!(!coeffs.is_empty(), "coefficient sequence must not be empty");
    Ok(())
}

fn check_vectors(data: &McData, x: &[f64], y: &[f64]) -> Result<()> {
    let n = data.num_states();
    ensure!(x.len() == n, "x has {} entries, matrix has {} states", x.len(), n);
    ensure!(y.len() == n, "y has {} entries, matrix has {} states", y.len(), n);
    Ok(())
}

/// Scale the merged tally by 1/num_histories. Expected-value walks skip the
/// zeroth-order term, so it is superposed here deterministically.
fn finalize(y: &mut [f64], tally: &[f64], x: &[f64], coeffs: &[f64], cfg: &SolverConfig) {
    let scale = 1.0 / cfg.num_histories as f64;
    for (yi, ti) in y.iter_mut().zip(tally.iter()) {
        *yi = scale * ti;
    }
    if cfg.estimator == Estimator::ExpectedValue {
        for (yi, xi) in y.iter_mut().zip(x.iter()) {
            *yi += coeffs[0] * xi;
        }
    }
}

/// Build the configured kernel, solve, and report.
pub fn run_solve(data: &McData, coeffs: &[f64], x: &[f64], cfg: &SolverConfig) -> Result<Vec<f64>> {
    let mut y = vec![0.0f64; data.num_states()];
    let t0 = Instant::now();
    match cfg.kernel {
        Kernel::Fused => FusedSolver::new(data, coeffs, cfg.clone())?.solve(x, &mut y)?,
        Kernel::Event => EventSolver::new(data, coeffs, cfg.clone())?.solve(x, &mut y)?,
    }
    let wall = t0.elapsed().as_secs_f64();
    eprintln!(
        "[solve] kernel={} estimator={} | {} histories x {} stages in {:.3}s",
        cfg.kernel.as_str(),
        cfg.estimator.as_str(),
        cfg.num_histories,
        coeffs.len(),
        wall
    );
    if cfg.print {
        report_memory();
    }
    Ok(y)
}

// -------------------------------------------------------------------------------------
// Memory reporting (HPC safety)
// -------------------------------------------------------------------------------------

const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;

fn current_rss_bytes() -> Option<u64> {
    let contents = std::fs::read_to_string("/proc/self/statm").ok()?;
    let mut parts = contents.split_whitespace();
    let _total = parts.next()?;
    let resident_pages: u64 = parts.next()?.parse().ok()?;
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if page_size <= 0 {
        return None;
    }
    Some(resident_pages.saturating_mul(page_size as u64))
}

fn report_memory() {
    if let Some(rss) = current_rss_bytes() {
        eprintln!("[mem] rss={:.2} GiB", rss as f64 / GB as f64);
    }
}
