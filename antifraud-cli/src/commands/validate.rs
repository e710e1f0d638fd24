//! Validate command implementation.

use antifraud_core::{NumberLike, ValidationRequest};
use antifraud_validator::{TransactionValidator, ValidatorError};
use clap::Args;
use serde::Serialize;

use crate::output;

/// Exit code for an approved transaction.
pub const EXIT_APPROVED: i32 = 0;
/// Exit code for invalid input.
pub const EXIT_INVALID: i32 = 1;
/// Exit code for a rejected transaction.
pub const EXIT_REJECTED: i32 = 2;

/// Arguments for the validate command.
#[derive(Args)]
pub struct ValidateArgs {
    /// Destination Bitcoin address
    #[arg(short, long)]
    pub address: String,

    /// Amount in BTC
    #[arg(long, allow_hyphen_values = true)]
    pub amount: String,

    /// Fee rate in sat/vB
    #[arg(short, long, allow_hyphen_values = true)]
    pub fee_rate: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// JSON output for a failed validation.
#[derive(Serialize)]
struct JsonError {
    error: String,
}

/// Run the validate command.
pub async fn run(args: ValidateArgs) -> i32 {
    let request = ValidationRequest {
        address: Some(args.address),
        amount: Some(NumberLike::Text(args.amount)),
        fee_rate: Some(NumberLike::Text(args.fee_rate)),
    };

    let validator = TransactionValidator::from_env();
    match validator.validate(request).await {
        Ok(result) => {
            if args.json {
                match serde_json::to_string_pretty(&result) {
                    Ok(text) => println!("{}", text),
                    Err(e) => {
                        output::error(&format!("Failed to encode result: {}", e));
                        return EXIT_INVALID;
                    }
                }
            } else {
                output::decision(&result);
            }
            if result.is_approved() {
                EXIT_APPROVED
            } else {
                EXIT_REJECTED
            }
        }
        Err(err) => {
            report_error(&err, args.json);
            EXIT_INVALID
        }
    }
}

fn report_error(err: &ValidatorError, json: bool) {
    if json {
        let body = JsonError { error: err.to_string() };
        if let Ok(text) = serde_json::to_string_pretty(&body) {
            println!("{}", text);
        }
    } else {
        output::error(&err.to_string());
        output::hint("Address must be non-empty; amount and fee rate must be positive numbers.");
    }
}
