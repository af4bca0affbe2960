//! Output rendering for cost estimates

use crate::error::Result;
use crate::estimate::CostEstimate;

/// How each estimate is written to stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable block with specs and totals
    Text,
    /// Monthly total only, optionally prefixed with the instance name
    Quiet { print_name: bool },
    /// One JSON object per estimate
    Json,
}

pub fn render(estimate: &CostEstimate, mode: OutputMode) -> Result<String> {
    let out = match mode {
        OutputMode::Text => render_text(estimate),
        OutputMode::Quiet { print_name: false } => format!("{:.2}", estimate.monthly),
        OutputMode::Quiet { print_name: true } => {
            format!("{},{:.2}", estimate.instance_type, estimate.monthly)
        }
        OutputMode::Json => serde_json::to_string(estimate)?,
    };
    Ok(out)
}

fn render_text(estimate: &CostEstimate) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "\n--- Estimating {} ({}) ---\n",
        estimate.instance_type, estimate.region
    ));
    out.push_str(&format!(
        "Specs: {} vCPUs | {} GB RAM\n",
        estimate.spec.vcpus, estimate.spec.ram_gb
    ));
    out.push_str(&format!(
        "Unit prices: ${:.6}/vCPU-hour, ${:.6}/GB-hour\n",
        estimate.prices.cpu_price, estimate.prices.ram_price
    ));
    out.push_str(&format!("Total Hourly:  ${:.4}\n", estimate.hourly));
    out.push_str(&format!("Total Monthly: ${:.2}", estimate.monthly));
    out
}
