use std::process;

use rust_decimal::Decimal;
use seedlab_engine::ReplicateStatistics;

use crate::{report_error, OutputFormat};

pub(crate) fn cmd_stats(weights: &[Decimal], output: OutputFormat, quiet: bool) {
    if let Some(bad) = weights.iter().find(|w| **w <= Decimal::ZERO) {
        report_error(
            &format!("error: weights must be positive, got {}", bad),
            output,
            quiet,
        );
        process::exit(1);
    }
    let stats = match ReplicateStatistics::compute(weights) {
        Ok(s) => s,
        Err(e) => {
            report_error(&format!("error: {}", e), output, quiet);
            process::exit(1);
        }
    };

    match output {
        OutputFormat::Json => match serde_json::to_string_pretty(&stats) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                report_error(&format!("error serializing statistics: {}", e), output, quiet);
                process::exit(1);
            }
        },
        OutputFormat::Text => {
            println!("count                     {}", stats.count);
            println!("mean                      {}", stats.mean);
            println!("std_dev                   {}", stats.std_dev);
            println!("coefficient_of_variation  {}", stats.coefficient_of_variation);
            println!("derived_weight            {}", stats.derived_weight);
        }
    }
}
