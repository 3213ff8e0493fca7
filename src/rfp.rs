//! RFP job processing: sheet in, answered sheet out.
//!
//! The `rfps` record moves `processing → completed`, or `→ failed` when the
//! sheet cannot be read or the output cannot be written. Individual row
//! failures do not fail the job; those rows carry the apology answer.

use anyhow::Result;
use rfp_harness_core::models::Scope;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::agent::{BatchLabel, RowStatus};
use crate::app::App;
use crate::sheet::{processed_file_name, read_sheet};
use crate::sqlite_store::RfpStatus;

#[derive(Debug, Clone)]
pub struct RfpJob {
    pub scope: Scope,
    pub input: PathBuf,
    /// Defaults to the input file name.
    pub rfp_name: Option<String>,
    /// Used in the session id. Defaults to the project id.
    pub project_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RfpOutcome {
    pub rfp_id: i64,
    pub session_id: String,
    pub output_path: PathBuf,
    pub rows: usize,
    pub failed_rows: usize,
}

pub async fn process_rfp(app: &App, job: &RfpJob) -> Result<RfpOutcome> {
    let rfp_name = job.rfp_name.clone().unwrap_or_else(|| {
        job.input
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| "rfp".to_string())
    });
    let project_name = job
        .project_name
        .clone()
        .unwrap_or_else(|| job.scope.project_id.to_string());
    let stem = Path::new(&rfp_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(&rfp_name)
        .to_string();
    let label = BatchLabel::new(&stem, &project_name);

    let rfp_id = app
        .store
        .insert_rfp(
            job.scope,
            &rfp_name,
            &job.input.display().to_string(),
            &label.session_id,
        )
        .await?;
    info!(rfp_id, session = %label.session_id, "processing rfp");

    match answer_sheet(app, job, &rfp_name, &label).await {
        Ok((output_path, rows, failed_rows)) => {
            app.store
                .set_rfp_status(
                    rfp_id,
                    RfpStatus::Completed,
                    Some(&output_path.display().to_string()),
                )
                .await?;
            info!(rfp_id, rows, failed_rows, output = %output_path.display(), "rfp completed");
            Ok(RfpOutcome {
                rfp_id,
                session_id: label.session_id,
                output_path,
                rows,
                failed_rows,
            })
        }
        Err(e) => {
            error!(rfp_id, "rfp failed: {:#}", e);
            app.store
                .set_rfp_status(rfp_id, RfpStatus::Failed, None)
                .await?;
            Err(e)
        }
    }
}

async fn answer_sheet(
    app: &App,
    job: &RfpJob,
    rfp_name: &str,
    label: &BatchLabel,
) -> Result<(PathBuf, usize, usize)> {
    let sheet = read_sheet(&job.input)?;
    let requirements = sheet.requirement_texts();

    let reports = app.agent.process_rows(&requirements, job.scope, label).await;
    let failed = reports
        .iter()
        .filter(|r| matches!(r.status, RowStatus::Failed { .. }))
        .count();
    let answers: Vec<String> = reports.into_iter().map(|r| r.answer).collect();

    let output_path = app.config.output.dir.join(processed_file_name(rfp_name));
    sheet.write_processed_csv(&answers, &output_path)?;
    Ok((output_path, answers.len(), failed))
}
