//! Core WASM integrator wrapper and low-level utilities.

use anyhow::{bail, Result};
use serde_wasm_bindgen::to_value;
use taylor_core::equation_engine::EquationSystem;
use taylor_core::flow::{FlowIntegrator, FlowSnapshot, IntegrationSettings};
use taylor_core::interval::Interval;
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub struct WasmTaylorFlow {
    pub(crate) flow: FlowIntegrator<f64>,
    pub(crate) system: EquationSystem<f64>,
}

pub(crate) fn to_js(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

pub(crate) fn build_flow(
    equations: &[String],
    var_names: &[String],
    param_names: &[String],
    order: usize,
) -> Result<(FlowIntegrator<f64>, EquationSystem<f64>)> {
    let system = EquationSystem::from_sources(equations, var_names, param_names)?;
    let flow = FlowIntegrator::new(var_names.len(), param_names.len(), order)?;
    Ok((flow, system))
}

pub(crate) fn pair_bounds(lo: &[f64], hi: &[f64]) -> Result<Vec<Interval<f64>>> {
    if lo.len() != hi.len() {
        bail!(
            "Lower and upper bounds differ in length ({} vs {}).",
            lo.len(),
            hi.len()
        );
    }
    Ok(lo
        .iter()
        .zip(hi)
        .map(|(&l, &h)| Interval::new(l, h))
        .collect())
}

pub(crate) fn run_recorded(
    flow: &mut FlowIntegrator<f64>,
    system: &EquationSystem<f64>,
    settings: &IntegrationSettings,
) -> Result<Vec<FlowSnapshot<f64>>> {
    let mut snapshots = Vec::new();
    flow.integrate_with(system, settings, |f| {
        snapshots.push(f.snapshot());
        Ok(())
    })?;
    Ok(snapshots)
}

#[wasm_bindgen]
impl WasmTaylorFlow {
    #[wasm_bindgen(constructor)]
    pub fn new(
        equations: Vec<String>,
        var_names: Vec<String>,
        param_names: Vec<String>,
        order: u32,
    ) -> Result<WasmTaylorFlow, JsValue> {
        console_error_panic_hook::set_once();

        let (flow, system) =
            build_flow(&equations, &var_names, &param_names, order as usize).map_err(to_js)?;
        Ok(WasmTaylorFlow { flow, system })
    }

    /// Seeds the state from `[lo[k], hi[k]]`, variables first, then parameters.
    pub fn initialize(&mut self, lo: Vec<f64>, hi: Vec<f64>) -> Result<(), JsValue> {
        let bounds = pair_bounds(&lo, &hi).map_err(to_js)?;
        self.flow.initialize(&bounds).map_err(to_js)
    }

    pub fn set_t(&mut self, t: f64) {
        self.flow.set_t(t);
    }

    pub fn get_t(&self) -> f64 {
        self.flow.t()
    }

    pub fn series_size(&self) -> usize {
        self.flow.index().series_size()
    }

    pub fn step(&mut self, dt: f64) -> Result<(), JsValue> {
        self.flow.step(&self.system, dt).map_err(to_js)
    }

    /// Integrates over `[t_start, t_end]` and returns the recorded snapshots.
    pub fn integrate(
        &mut self,
        t_start: f64,
        t_end: f64,
        dt: f64,
        record_every: u32,
    ) -> Result<JsValue, JsValue> {
        let settings = IntegrationSettings {
            t_start,
            t_end,
            step: dt,
            record_every: Some((record_every as usize).max(1)),
            ..IntegrationSettings::default()
        };
        let snapshots = run_recorded(&mut self.flow, &self.system, &settings)
            .map_err(|e| JsValue::from_str(&format!("Integration failed: {}", e)))?;
        to_value(&snapshots).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }
}
