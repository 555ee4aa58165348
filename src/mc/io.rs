use anyhow::{Context, Result, ensure};
use ndarray::Array1;
use ndarray_npy::{NpzReader, NpzWriter};
use std::fs::File;

use super::types::{McData, Problem};

fn read_i64<R: std::io::Read + std::io::Seek>(
    npz: &mut NpzReader<R>,
    name: &str,
) -> Result<Array1<i64>> {
    let arr: Array1<i64> = npz
        .by_name(name)
        .with_context(|| format!("missing {}", name))?;
    Ok(arr)
}
fn read_f64<R: std::io::Read + std::io::Seek>(
    npz: &mut NpzReader<R>,
    name: &str,
) -> Result<Array1<f64>> {
    let arr: Array1<f64> = npz
        .by_name(name)
        .with_context(|| format!("missing {}", name))?;
    Ok(arr)
}

fn to_indices(arr: &Array1<i64>, name: &str) -> Result<Vec<usize>> {
    let mut out = Vec::with_capacity(arr.len());
    for &v in arr.iter() {
        ensure!(v >= 0, "negative entry {} in {}", v, name);
        out.push(v as usize);
    }
    Ok(out)
}

/// Load one problem file: the four CSR arrays plus offsets, the coefficient
/// sequence, and the input vector.
pub fn load_problem(path: &str) -> Result<Problem> {
    let f = File::open(path).with_context(|| format!("open {}", path))?;
    let mut npz = NpzReader::new(f).context("read npz")?;

    let offsets = to_indices(&read_i64(&mut npz, "offsets.npy")?, "offsets")?;
    let h = read_f64(&mut npz, "H.npy")?.to_vec();
    let p = read_f64(&mut npz, "P.npy")?.to_vec();
    let w = read_f64(&mut npz, "W.npy")?.to_vec();
    let inds = to_indices(&read_i64(&mut npz, "inds.npy")?, "inds")?;
    let coeffs = read_f64(&mut npz, "coeffs.npy")?.to_vec();
    let x = read_f64(&mut npz, "x.npy")?.to_vec();

    let problem = Problem {
        data: McData { offsets, h, p, w, inds },
        coeffs,
        x,
    };
    problem.validate()?;
    Ok(problem)
}

pub fn save_solution(path: &str, y: &[f64]) -> Result<()> {
    let f = File::create(path).with_context(|| format!("create {}", path))?;
    let mut npz = NpzWriter::new(f);
    npz.add_array("y.npy", &Array1::from_vec(y.to_vec()))?;
    npz.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("walker_{}_{}.npz", tag, std::process::id()))
    }

    fn write_problem_npz(path: &PathBuf, offsets: &[i64], inds: &[i64]) {
        let f = File::create(path).unwrap();
        let mut npz = NpzWriter::new(f);
        npz.add_array("offsets.npy", &Array1::from_vec(offsets.to_vec()))
            .unwrap();
        let nnz = *offsets.last().unwrap() as usize;
        npz.add_array("H.npy", &Array1::from_vec(vec![1.0; nnz])).unwrap();
        npz.add_array("P.npy", &Array1::from_vec(vec![1.0; nnz])).unwrap();
        npz.add_array("W.npy", &Array1::from_vec(vec![0.5; nnz])).unwrap();
        npz.add_array("inds.npy", &Array1::from_vec(inds.to_vec()))
            .unwrap();
        npz.add_array("coeffs.npy", &Array1::from_vec(vec![1.0, 0.5]))
            .unwrap();
        let n = offsets.len() - 1;
        npz.add_array("x.npy", &Array1::from_vec(vec![1.0; n])).unwrap();
        npz.finish().unwrap();
    }

    #[test]
    fn problem_roundtrip() {
        let path = temp_path("problem");
        write_problem_npz(&path, &[0, 1, 2], &[1, 0]);
        let problem = load_problem(path.to_str().unwrap()).unwrap();
        assert_eq!(problem.data.num_states(), 2);
        assert_eq!(problem.data.inds, vec![1, 0]);
        assert_eq!(problem.coeffs, vec![1.0, 0.5]);
        assert_eq!(problem.x, vec![1.0, 1.0]);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn structurally_broken_file_is_rejected() {
        let path = temp_path("broken");
        // column index out of range for a 2-state matrix
        write_problem_npz(&path, &[0, 1, 2], &[1, 5]);
        assert!(load_problem(path.to_str().unwrap()).is_err());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn solution_roundtrip() {
        let path = temp_path("solution");
        save_solution(path.to_str().unwrap(), &[1.25, -0.5]).unwrap();
        let f = File::open(&path).unwrap();
        let mut npz = NpzReader::new(f).unwrap();
        let y: Array1<f64> = npz.by_name("y.npy").unwrap();
        assert_eq!(y.to_vec(), vec![1.25, -0.5]);
        std::fs::remove_file(&path).ok();
    }
}
