use ahash::AHashMap;
use anyhow::{Context, Result, bail, ensure};
use std::str::FromStr;

/// Probability-matrix data for one solve, compressed-sparse-row layout.
/// Four flat arrays share `offsets`; row r of the matrix is the half-open
/// range `[offsets[r], offsets[r+1])` in each of them.
#[derive(Debug, Clone)]
pub struct McData {
    pub offsets: Vec<usize>, // len = num_states + 1
    pub h: Vec<f64>,         // tally contribution values
    pub p: Vec<f64>,         // row-local cdf, non-decreasing, last entry <= 1
    pub w: Vec<f64>,         // transition weight multipliers
    pub inds: Vec<usize>,    // destination state indices
}

/// Borrowed view of one row's parallel slices.
pub struct McRow<'a> {
    pub h: &'a [f64],
    pub cdf: &'a [f64],
    pub wts: &'a [f64],
    pub inds: &'a [usize],
}

impl McData {
    #[inline]
    pub fn num_states(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    #[inline]
    pub fn row(&self, state: usize) -> McRow<'_> {
        let lo = self.offsets[state];
        let hi = self.offsets[state + 1];
        McRow {
            h: &self.h[lo..hi],
            cdf: &self.p[lo..hi],
            wts: &self.w[lo..hi],
            inds: &self.inds[lo..hi],
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.offsets.is_empty(), "offsets must have at least one entry");
        let nnz = *self.offsets.last().unwrap();
        ensure!(
            self.offsets.windows(2).all(|o| o[0] <= o[1]),
            "offsets must be non-decreasing"
        );
        ensure!(self.offsets[0] == 0, "offsets must start at 0");
        for (name, len) in [("H", self.h.len()), ("P", self.p.len()), ("W", self.w.len()), ("inds", self.inds.len())] {
            ensure!(len == nnz, "{} has {} entries, offsets say {}", name, len, nnz);
        }
        let n = self.num_states();
        if let Some(&bad) = self.inds.iter().find(|&&i| i >= n) {
            bail!("column index {} out of range for {} states", bad, n);
        }
        Ok(())
    }
}

/// One problem file's worth of inputs.
#[derive(Debug, Clone)]
pub struct Problem {
    pub data: McData,
    pub coeffs: Vec<f64>,
    pub x: Vec<f64>,
}

impl Problem {
    pub fn validate(&self) -> Result<()> {
        self.data.validate()?;
        ensure!(!self.coeffs.is_empty(), "coefficient sequence must not be empty");
        ensure!(
            self.x.len() == self.data.num_states(),
            "x has {} entries, matrix has {} states",
            self.x.len(),
            self.data.num_states()
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Estimator {
    Collision,
    ExpectedValue,
}

impl Estimator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Estimator::Collision => "collision",
            Estimator::ExpectedValue => "expected_value",
        }
    }
}

impl FromStr for Estimator {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "collision" => Ok(Estimator::Collision),
            "expected_value" => Ok(Estimator::ExpectedValue),
            other => bail!("unknown estimator {:?} (want collision or expected_value)", other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kernel {
    Fused,
    Event,
}

impl Kernel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kernel::Fused => "fused",
            Kernel::Event => "event",
        }
    }
}

impl FromStr for Kernel {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fused" => Ok(Kernel::Fused),
            "event" => Ok(Kernel::Event),
            other => bail!("unknown kernel {:?} (want fused or event)", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SolverConfig {
    pub num_histories: usize,
    pub estimator: Estimator,
    pub kernel: Kernel,
    pub start_weight_factor: f64,
    pub weight_cutoff: f64,
    pub seed: u64,
    pub print: bool, // verbosity=high
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            num_histories: 1000,
            estimator: Estimator::ExpectedValue,
            kernel: Kernel::Fused,
            start_weight_factor: 1.0,
            weight_cutoff: 0.0,
            seed: 31891,
            print: false,
        }
    }
}

impl SolverConfig {
    /// Parse `key=value` option pairs. Unknown keys and duplicates are fatal
    /// so a typo never silently runs with defaults.
    pub fn from_pairs(pairs: &[String]) -> Result<Self> {
        let mut map: AHashMap<&str, &str> = AHashMap::with_capacity(pairs.len());
        for raw in pairs {
            let (k, v) = raw
                .split_once('=')
                .with_context(|| format!("expected key=value, got {:?}", raw))?;
            if map.insert(k, v).is_some() {
                bail!("duplicate option {:?}", k);
            }
        }

        let mut cfg = SolverConfig::default();
        if let Some(v) = map.remove("num_histories") {
            cfg.num_histories = v.parse().with_context(|| format!("num_histories={:?}", v))?;
            ensure!(cfg.num_histories > 0, "num_histories must be positive");
        }
        if let Some(v) = map.remove("estimator") {
            cfg.estimator = v.parse()?;
        }
        if let Some(v) = map.remove("kernel") {
            cfg.kernel = v.parse()?;
        }
        if let Some(v) = map.remove("start_weight_factor") {
            cfg.start_weight_factor = v.parse().with_context(|| format!("start_weight_factor={:?}", v))?;
            ensure!(cfg.start_weight_factor >= 0.0, "start_weight_factor must be >= 0");
        }
        if let Some(v) = map.remove("weight_cutoff") {
            cfg.weight_cutoff = v.parse().with_context(|| format!("weight_cutoff={:?}", v))?;
            ensure!(cfg.weight_cutoff >= 0.0, "weight_cutoff must be >= 0");
        }
        if let Some(v) = map.remove("seed") {
            cfg.seed = v.parse().with_context(|| format!("seed={:?}", v))?;
        }
        if let Some(v) = map.remove("verbosity") {
            cfg.print = match v.to_ascii_lowercase().as_str() {
                "high" => true,
                "low" => false,
                other => bail!("unknown verbosity {:?} (want low or high)", other),
            };
        }
        if !map.is_empty() {
            let mut keys: Vec<&str> = map.keys().copied().collect();
            keys.sort_unstable();
            bail!("unrecognized options: {}", keys.join(", "));
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = SolverConfig::default();
        assert_eq!(cfg.num_histories, 1000);
        assert_eq!(cfg.estimator, Estimator::ExpectedValue);
        assert_eq!(cfg.kernel, Kernel::Fused);
        assert_eq!(cfg.start_weight_factor, 1.0);
        assert_eq!(cfg.weight_cutoff, 0.0);
        assert!(!cfg.print);
    }

    #[test]
    fn parses_full_option_set() {
        let cfg = SolverConfig::from_pairs(&pairs(&[
            "num_histories=5000",
            "estimator=collision",
            "kernel=event",
            "start_weight_factor=2.0",
            "weight_cutoff=1e-6",
            "seed=7",
            "verbosity=high",
        ]))
        .unwrap();
        assert_eq!(cfg.num_histories, 5000);
        assert_eq!(cfg.estimator, Estimator::Collision);
        assert_eq!(cfg.kernel, Kernel::Event);
        assert_eq!(cfg.start_weight_factor, 2.0);
        assert_eq!(cfg.weight_cutoff, 1e-6);
        assert_eq!(cfg.seed, 7);
        assert!(cfg.print);
    }

    #[test]
    fn rejects_unknown_estimator() {
        let err = SolverConfig::from_pairs(&pairs(&["estimator=track_length"])).unwrap_err();
        assert!(err.to_string().contains("track_length"));
    }

    #[test]
    fn rejects_unknown_and_duplicate_keys() {
        assert!(SolverConfig::from_pairs(&pairs(&["histories=10"])).is_err());
        assert!(SolverConfig::from_pairs(&pairs(&["seed=1", "seed=2"])).is_err());
        assert!(SolverConfig::from_pairs(&pairs(&["seed"])).is_err());
    }

    #[test]
    fn validate_catches_bad_structure() {
        let good = McData {
            offsets: vec![0, 2, 3],
            h: vec![1.0, 2.0, 3.0],
            p: vec![0.5, 1.0, 1.0],
            w: vec![1.0, 1.0, 1.0],
            inds: vec![0, 1, 0],
        };
        good.validate().unwrap();

        let mut short = good.clone();
        short.w.pop();
        assert!(short.validate().is_err());

        let mut oob = good.clone();
        oob.inds[2] = 5;
        assert!(oob.validate().is_err());

        let mut decreasing = good;
        decreasing.offsets = vec![0, 3, 2];
        assert!(decreasing.validate().is_err());
    }

    #[test]
    fn row_returns_parallel_slices() {
        let data = McData {
            offsets: vec![0, 2, 3],
            h: vec![1.0, 2.0, 3.0],
            p: vec![0.5, 1.0, 1.0],
            w: vec![0.9, 0.8, 0.7],
            inds: vec![0, 1, 0],
        };
        let row = data.row(0);
        assert_eq!(row.h, &[1.0, 2.0]);
        assert_eq!(row.cdf, &[0.5, 1.0]);
        assert_eq!(row.wts, &[0.9, 0.8]);
        assert_eq!(row.inds, &[0, 1]);
        assert_eq!(data.row(1).inds, &[0]);
    }
}
