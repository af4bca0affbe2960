//! Process exit codes
//!
//! - `0` = Success
//! - `1` = User error (bad instance type, missing instance list, invalid input)
//! - `2` = System error (Cloud Billing API failure, network, cache or I/O fault)
//! - `3` = Configuration error (config file or machine spec table)

use crate::error::CostError;

pub mod codes {
    #[allow(dead_code)]
    pub const SUCCESS: i32 = 0;
    pub const USER_ERROR: i32 = 1;
    pub const SYSTEM_ERROR: i32 = 2;
    pub const CONFIG_ERROR: i32 = 3;
}

pub fn exit_code_for_error(error: &CostError) -> i32 {
    use CostError::*;
    match error {
        Config(_) => codes::CONFIG_ERROR,

        Validation { .. } => codes::USER_ERROR,
        InstanceType(_) => codes::USER_ERROR,

        BillingApi { .. } => codes::SYSTEM_ERROR,
        Cache { .. } => codes::SYSTEM_ERROR,
        Io(_) => codes::SYSTEM_ERROR,
        Json(_) => codes::SYSTEM_ERROR,
    }
}

/// Exit code for an error surfacing in `main`; unknown errors are system errors.
pub fn exit_code_for_anyhow(error: &anyhow::Error) -> i32 {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<CostError>())
        .map(exit_code_for_error)
        .unwrap_or(codes::SYSTEM_ERROR)
}
