use anyhow::{Result, ensure};

/// Start cdf and per-state weights derived from the input vector, built once
/// per solve and read-only for every history afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct StartDistribution {
    pub cdf: Vec<f64>,
    pub weight: Vec<f64>,
}

/// Start pdf is proportional to |x_i|^factor; the weight of a sampled state
/// is x_i over that pdf value. Operation order is fixed: weights must read
/// the pdf entries before the in-place prefix sum turns them into the cdf.
pub fn build_start_distribution(x: &[f64], start_wt_factor: f64) -> Result<StartDistribution> {
    let mut cdf: Vec<f64> = x.iter().map(|v| v.abs().powf(start_wt_factor)).collect();
    let pdf_sum: f64 = cdf.iter().sum();
    ensure!(
        pdf_sum > 0.0,
        "degenerate input vector: start pdf sums to {}",
        pdf_sum
    );
    for v in cdf.iter_mut() {
        *v /= pdf_sum;
    }

    let weight: Vec<f64> = x
        .iter()
        .zip(cdf.iter())
        .map(|(&xv, &pv)| if pv == 0.0 { 0.0 } else { xv / pv })
        .collect();

    let mut acc = 0.0;
    for v in cdf.iter_mut() {
        acc += *v;
        *v = acc;
    }

    Ok(StartDistribution { cdf, weight })
}
