use anyhow::{Context, Result, bail};
use std::env;
use std::path::{Path, PathBuf};

mod mc;
mod runtime;

use mc::SolverConfig;

struct Args {
    problem: PathBuf,
    solution_out: PathBuf,
    options: Vec<String>,
}

fn usage() -> ! {
    eprintln!(
        "usage: walker <problem.npz> [solution_out.npz] [key=value ...]\n       options: num_histories estimator kernel start_weight_factor weight_cutoff seed verbosity"
    );
    std::process::exit(1);
}

fn default_solution_path(input: &Path) -> PathBuf {
    let parent = input
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("solution");
    parent.join(format!("{stem}_solution.npz"))
}

fn parse_args() -> Result<Args> {
    let mut args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() || args[0] == "-h" || args[0] == "--help" {
        usage();
    }

    let problem = PathBuf::from(args.remove(0));
    if !problem.exists() {
        bail!("problem {:?} does not exist", problem);
    }

    // a bare path before the key=value options overrides the output location
    let solution_out = if args.first().is_some_and(|a| !a.contains('=')) {
        PathBuf::from(args.remove(0))
    } else if let Ok(from_env) = env::var("WALKER_SOLUTION_PATH") {
        PathBuf::from(from_env)
    } else {
        default_solution_path(&problem)
    };

    Ok(Args {
        problem,
        solution_out,
        options: args,
    })
}

fn main() -> Result<()> {
    runtime::configure_thread_pool();

    let args = parse_args()?;
    let cfg = SolverConfig::from_pairs(&args.options)?;

    eprintln!("[load] reading problem from {}", args.problem.display());
    let problem = mc::load_problem(&args.problem.to_string_lossy())?;
    eprintln!(
        "[load] {} states, {} nonzeros, {} coefficients",
        problem.data.num_states(),
        problem.data.inds.len(),
        problem.coeffs.len()
    );

    let y = mc::run_solve(&problem.data, &problem.coeffs, &problem.x, &cfg)?;

    if let Some(parent) = args.solution_out.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create dir {}", parent.display()))?;
        }
    }
    mc::save_solution(&args.solution_out.to_string_lossy(), &y)?;

    let norm = y.iter().map(|v| v * v).sum::<f64>().sqrt();
    println!(
        "Solution: {} entries, l2 norm {:.6} (histories={}, kernel={}, estimator={})",
        y.len(),
        norm,
        cfg.num_histories,
        cfg.kernel.as_str(),
        cfg.estimator.as_str()
    );
    eprintln!("[done] solution written to {}", args.solution_out.display());
    Ok(())
}
