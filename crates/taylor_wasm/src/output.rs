//! Enclosure readouts, boundary sampling and coefficient-table export.

use crate::system::WasmTaylorFlow;
use js_sys::Float64Array;
use serde::Serialize;
use serde_wasm_bindgen::to_value;
use taylor_core::boundary::{boundary_table, write_table, DEFAULT_SUBDIVISIONS};
use taylor_core::coefficients::CoefficientRow;
use taylor_core::interval::Interval;
use wasm_bindgen::prelude::*;

#[derive(Serialize)]
struct CoefficientTableResult {
    order: usize,
    variables: usize,
    series_size: usize,
    rows: Vec<CoefficientRow>,
}

/// Interleaves interval bounds as `[lo0, hi0, lo1, hi1, ...]`.
pub(crate) fn flatten_intervals(intervals: &[Interval<f64>]) -> Vec<f64> {
    intervals.iter().flat_map(|iv| [iv.lo, iv.hi]).collect()
}

#[wasm_bindgen]
impl WasmTaylorFlow {
    /// Constant coefficient of each state series.
    pub fn get_midpoints(&self) -> Float64Array {
        let midpoints: Vec<f64> = self
            .flow
            .state()
            .iter()
            .map(|s| s.coefficients()[0])
            .collect();
        Float64Array::from(midpoints.as_slice())
    }

    /// Remainder intervals, interleaved lo/hi.
    pub fn get_errors(&self) -> Float64Array {
        let errors: Vec<Interval<f64>> = self.flow.state().iter().map(|s| s.error()).collect();
        Float64Array::from(flatten_intervals(&errors).as_slice())
    }

    /// Range of each state over the parameter box, interleaved lo/hi.
    pub fn get_enclosures(&self) -> Float64Array {
        let snapshot = self.flow.snapshot();
        Float64Array::from(flatten_intervals(&snapshot.enclosures).as_slice())
    }

    pub fn get_snapshot(&self) -> Result<JsValue, JsValue> {
        to_value(&self.flow.snapshot())
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    /// Edge sweeps of the current state; zero selects the default resolution.
    pub fn boundary_table(&self, subdivisions: u32) -> Result<JsValue, JsValue> {
        let subdivisions = match subdivisions {
            0 => DEFAULT_SUBDIVISIONS,
            n => n as usize,
        };
        let table = boundary_table(&self.flow, subdivisions)
            .map_err(|e| JsValue::from_str(&format!("Boundary sampling failed: {}", e)))?;
        to_value(&table).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    /// Boundary table in the plain-text layout gnuplot reads.
    pub fn boundary_text(&self, subdivisions: u32) -> Result<String, JsValue> {
        let subdivisions = match subdivisions {
            0 => DEFAULT_SUBDIVISIONS,
            n => n as usize,
        };
        render_boundary(self, subdivisions).map_err(|e| JsValue::from_str(&e.to_string()))
    }

    pub fn coefficient_table(&self) -> Result<JsValue, JsValue> {
        let index = self.flow.index();
        let result = CoefficientTableResult {
            order: index.order(),
            variables: index.variables(),
            series_size: index.series_size(),
            rows: index.rows().collect(),
        };
        to_value(&result).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }
}

fn render_boundary(flow: &WasmTaylorFlow, subdivisions: usize) -> anyhow::Result<String> {
    let table = boundary_table(&flow.flow, subdivisions)?;
    let mut buffer = Vec::new();
    write_table(&mut buffer, &table)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::{flatten_intervals, render_boundary};
    use crate::system::WasmTaylorFlow;
    use taylor_core::interval::Interval;

    #[test]
    fn flatten_interleaves_bounds() {
        let flat = flatten_intervals(&[Interval::new(-1.0, 2.0), Interval::new(0.5, 0.75)]);
        assert_eq!(flat, vec![-1.0, 2.0, 0.5, 0.75]);
        assert!(flatten_intervals(&[]).is_empty());
    }

    #[test]
    fn boundary_text_has_one_row_per_sample() {
        let mut flow = WasmTaylorFlow::new(
            vec!["y".to_string(), "-x".to_string()],
            vec!["x".to_string(), "y".to_string()],
            Vec::new(),
            3,
        )
        .unwrap_or_else(|_| panic!("flow"));
        flow.initialize(vec![-1.0, -1.0], vec![1.0, 1.0])
            .unwrap_or_else(|_| panic!("initialize"));
        let text = render_boundary(&flow, 5).expect("render");
        let rows = text.lines().filter(|l| !l.is_empty()).count();
        assert_eq!(rows, 4 * 6);
        assert!(text.ends_with("\n\n\n"));
    }
}
