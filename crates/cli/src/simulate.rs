//! `seedlab pms`: run a list of weighings through an in-memory lab.

use std::process;
use std::sync::Arc;

use rust_decimal::Decimal;
use seedlab_engine::{
    AnalysisEdit, LabConfig, LabError, LogDispatcher, MemoryHistory, Readiness, ReplicateRequest,
    Role, SeedLab, StaticRoleAuthority,
};
use seedlab_storage::{
    AnalysisDetail, AnalysisKind, AnalysisRecord, MemoryStorage, PmsDetail, ReplicateRecord,
};
use serde::Serialize;

use crate::{report_error, OutputFormat};

pub(crate) struct PmsRun {
    pub per_batch: u32,
    pub fluffy: bool,
    pub rounded: Option<Decimal>,
    pub finalize: bool,
    pub role: Role,
    pub weights: Vec<Decimal>,
}

/// A weighing the lab declined to record.
#[derive(Debug, Serialize)]
struct Refusal {
    weight: Decimal,
    reason: String,
}

#[derive(Debug, Serialize)]
struct PmsReport {
    analysis: AnalysisRecord,
    replicates: Vec<ReplicateRecord>,
    refused: Vec<Refusal>,
    readiness: Readiness,
}

pub(crate) async fn cmd_pms(run: PmsRun, config: &LabConfig, output: OutputFormat, quiet: bool) {
    match simulate(run, config).await {
        Ok(report) => print_report(&report, output, quiet),
        Err(e) => {
            report_error(&format!("error: {}", e), output, quiet);
            process::exit(1);
        }
    }
}

async fn simulate(run: PmsRun, config: &LabConfig) -> Result<PmsReport, LabError> {
    let lab = SeedLab::new(
        MemoryStorage::new(),
        Arc::new(StaticRoleAuthority::new("cli", run.role)),
        Arc::new(MemoryHistory::new()),
        Arc::new(LogDispatcher),
    )
    .with_policy(config.pms)
    .map_err(|e| LabError::InvalidRequest(e.to_string()))?;

    let lot = lab.create_lot("CLI-1", "unspecified").await?;
    let created = lab
        .create_analysis(
            lot.id,
            AnalysisDetail::Pms(PmsDetail::new(run.per_batch, run.fluffy)),
            None,
        )
        .await?;

    let mut refused = Vec::new();
    for weight in run.weights {
        match lab
            .add_replicate(created.id, ReplicateRequest { weight })
            .await
        {
            Ok(_) => {}
            Err(
                e @ (LabError::BatchLimitReached { .. } | LabError::NoMoreReplicatesNeeded { .. }),
            ) => refused.push(Refusal {
                weight,
                reason: e.to_string(),
            }),
            Err(e) => return Err(e),
        }
    }

    tracing::debug!(
        analysis_id = created.id,
        refused = refused.len(),
        "intake finished"
    );

    if let Some(rounded) = run.rounded {
        let mut current = lab.analysis(created.id).await?;
        if let Some(pms) = current.pms_mut() {
            pms.derived_weight_rounded = Some(rounded);
        }
        let edit = AnalysisEdit {
            comments: None,
            detail: Some(current.detail),
        };
        lab.update_analysis(AnalysisKind::Pms, created.id, edit)
            .await?;
    }

    let readiness = lab.is_ready_to_finalize(created.id).await?;
    if run.finalize {
        lab.finalize(AnalysisKind::Pms, created.id).await?;
    }

    Ok(PmsReport {
        analysis: lab.analysis(created.id).await?,
        replicates: lab.replicates(created.id).await?,
        refused,
        readiness,
    })
}

fn print_report(report: &PmsReport, output: OutputFormat, quiet: bool) {
    match output {
        OutputFormat::Json => match serde_json::to_string_pretty(report) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                report_error(&format!("error serializing report: {}", e), output, quiet);
                process::exit(1);
            }
        },
        OutputFormat::Text => {
            for r in &report.replicates {
                println!(
                    "batch {} #{}  {}  {:?}",
                    r.batch_number, r.sequence_in_batch, r.weight, r.validity
                );
            }
            for refusal in &report.refused {
                println!("refused {}: {}", refusal.weight, refusal.reason);
            }
            if let Some(agg) = report.analysis.pms().and_then(|p| p.aggregates) {
                println!(
                    "mean {}  sd {}  cv {}  derived {}",
                    agg.mean_weight,
                    agg.std_dev,
                    agg.coefficient_of_variation,
                    agg.derived_weight_unrounded
                );
            }
            let verdict = match report.readiness {
                Readiness::Accepted { batch, .. } => format!("accepted (batch {})", batch),
                Readiness::ForcedAtCap => "ready at replicate cap".to_string(),
                Readiness::NotReady => "not ready".to_string(),
            };
            if !quiet {
                println!("readiness: {}", verdict);
            }
            println!("state: {}", report.analysis.state.as_str());
        }
    }
}
