//! Sampling the image of the parameter-box edges for plotting.
//!
//! Each edge of the box is swept in equal subdivisions while the other
//! coordinates sit on a corner; evaluating the state polynomials along it
//! traces the outline of the propagated uncertainty set. The output is a
//! plain whitespace-separated table with blank lines between sweeps, which
//! gnuplot reads as separate curves.

use crate::flow::FlowIntegrator;
use crate::interval::Interval;
use crate::traits::Scalar;
use anyhow::{bail, Context, Result};
use std::fmt::Display;
use std::io::Write;

pub const DEFAULT_SUBDIVISIONS: usize = 30;

/// Sweeps along every edge of `domain`. Coordinates whose interval has zero
/// width contribute no edges of their own.
pub fn edge_sweeps<T: Scalar>(
    domain: &[Interval<T>],
    subdivisions: usize,
) -> Result<Vec<Vec<Vec<T>>>> {
    let n = domain.len();
    if n >= usize::BITS as usize {
        bail!("Parameter box with {} coordinates has too many corners to enumerate.", n);
    }
    if subdivisions == 0 {
        bail!("subdivisions must be at least 1.");
    }
    let steps = T::from_usize(subdivisions).context("subdivision count not representable")?;

    let mut sweeps = Vec::new();
    for cur in 0..n {
        let range = domain[cur];
        if range.hi == range.lo {
            continue;
        }
        let others: Vec<usize> = (0..n).filter(|&k| k != cur).collect();
        for mask in 0..(1usize << others.len()) {
            let mut corner: Vec<T> = domain.iter().map(|r| r.lo).collect();
            for (bit, &k) in others.iter().enumerate() {
                if mask & (1 << bit) != 0 {
                    corner[k] = domain[k].hi;
                }
            }

            let mut sweep = Vec::with_capacity(subdivisions + 1);
            for s in 0..=subdivisions {
                let fraction = T::from_usize(s).context("sample index not representable")? / steps;
                let mut point = corner.clone();
                point[cur] = range.lo + (range.hi - range.lo) * fraction;
                sweep.push(point);
            }
            sweeps.push(sweep);
        }
    }
    Ok(sweeps)
}

/// State values along every edge sweep of the integrator's parameter box.
pub fn boundary_table<T: Scalar>(
    flow: &FlowIntegrator<T>,
    subdivisions: usize,
) -> Result<Vec<Vec<Vec<T>>>> {
    let sweeps = edge_sweeps(flow.parameter_box(), subdivisions)?;
    Ok(sweeps
        .iter()
        .map(|sweep| {
            sweep
                .iter()
                .map(|point| flow.state().iter().map(|s| s.evaluate(point)).collect())
                .collect()
        })
        .collect())
}

/// Writes one block of the table: a row per sample, a blank line after
/// each sweep and one more after the block.
pub fn write_table<W: Write, T: Display>(writer: &mut W, sweeps: &[Vec<Vec<T>>]) -> Result<()> {
    for sweep in sweeps {
        for row in sweep {
            let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            writeln!(writer, "{}", line.join(" ")).context("Failed to write table row.")?;
        }
        if !sweep.is_empty() {
            writeln!(writer).context("Failed to write table separator.")?;
        }
    }
    writeln!(writer).context("Failed to write table separator.")?;
    Ok(())
}

/// Appends the current boundary of `flow` to `writer`.
pub fn write_snapshot<W: Write, T: Scalar + Display>(
    writer: &mut W,
    flow: &FlowIntegrator<T>,
) -> Result<()> {
    let table = boundary_table(flow, DEFAULT_SUBDIVISIONS)?;
    write_table(writer, &table)
}

#[cfg(test)]
mod tests {
    use super::{boundary_table, edge_sweeps, write_snapshot, write_table};
    use crate::flow::FlowIntegrator;
    use crate::interval::Interval;

    #[test]
    fn sweeps_cover_every_edge_of_a_rectangle() {
        let domain = [Interval::symmetric(1.0), Interval::symmetric(2.0)];
        let sweeps = edge_sweeps(&domain, 4).unwrap();
        // Two directions, two corners each.
        assert_eq!(sweeps.len(), 4);
        for sweep in &sweeps {
            assert_eq!(sweep.len(), 5);
        }
        assert_eq!(sweeps[0][0], vec![-1.0, -2.0]);
        assert_eq!(sweeps[0][4], vec![1.0, -2.0]);
        assert_eq!(sweeps[1][0], vec![-1.0, 2.0]);
        assert_eq!(sweeps[2][2], vec![-1.0, 0.0]);
        assert_eq!(sweeps[3][4], vec![1.0, 2.0]);
    }

    #[test]
    fn degenerate_coordinates_are_skipped() {
        let domain = [Interval::symmetric(1.0), Interval::symmetric(0.0)];
        let sweeps = edge_sweeps(&domain, 2).unwrap();
        assert_eq!(sweeps.len(), 2);
        assert!(sweeps.iter().all(|s| s.iter().all(|p| p[1] == 0.0)));
        assert!(edge_sweeps::<f64>(&domain, 0).is_err());
    }

    #[test]
    fn table_is_whitespace_delimited_with_block_breaks() {
        let sweeps = vec![vec![vec![1.0, 2.0], vec![3.0, 4.5]], vec![vec![5.0, 6.0]]];
        let mut buffer = Vec::new();
        write_table(&mut buffer, &sweeps).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(text, "1 2\n3 4.5\n\n5 6\n\n\n");
    }

    #[test]
    fn initial_boundary_traces_the_input_box() {
        let mut flow = FlowIntegrator::<f64>::new(2, 0, 3).unwrap();
        flow.initialize(&[Interval::new(-1.0, 1.0), Interval::new(1.0, 3.0)])
            .unwrap();
        let table = boundary_table(&flow, 2).unwrap();
        assert_eq!(table.len(), 4);
        for sweep in &table {
            for row in sweep {
                assert!(row[0] >= -1.0 && row[0] <= 1.0);
                assert!(row[1] >= 1.0 && row[1] <= 3.0);
            }
        }
        assert_eq!(table[0][0], vec![-1.0, 1.0]);
        assert_eq!(table[3][2], vec![1.0, 3.0]);

        let mut buffer = Vec::new();
        write_snapshot(&mut buffer, &flow).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let rows = text.lines().filter(|l| !l.is_empty()).count();
        assert_eq!(rows, 4 * 31);
    }
}
