//! Job requests: the JSON messages a queue consumer or `rfp job` hands us.
//!
//! ```json
//! {"request_type": "rfp", "user_id": 1, "project_id": 2, "path": "in/q.xlsx"}
//! {"request_type": "document_process", "user_id": 1, "project_id": 2, "files": ["a.txt"]}
//! {"request_type": "document_delete", "user_id": 1, "file_id": 7}
//! {"request_type": "project_delete", "user_id": 1, "project_id": 2}
//! ```

use anyhow::{Context, Result};
use rfp_harness_core::models::Scope;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::app::App;
use crate::ingest::IngestReport;
use crate::rfp::{process_rfp, RfpJob, RfpOutcome};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "request_type", rename_all = "snake_case")]
pub enum JobRequest {
    Rfp {
        user_id: i64,
        project_id: i64,
        path: PathBuf,
        #[serde(default)]
        rfp_name: Option<String>,
        #[serde(default)]
        project_name: Option<String>,
    },
    DocumentProcess {
        user_id: i64,
        project_id: i64,
        files: Vec<PathBuf>,
    },
    DocumentDelete {
        user_id: i64,
        file_id: i64,
    },
    ProjectDelete {
        user_id: i64,
        project_id: i64,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum JobOutcome {
    Rfp(RfpOutcome),
    DocumentsProcessed {
        indexed: Vec<IngestedFile>,
        failed: Vec<FailedFile>,
    },
    DocumentDeleted {
        file_id: i64,
        existed: bool,
    },
    ProjectDeleted {
        files: u64,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestedFile {
    pub path: PathBuf,
    pub file_id: i64,
    pub chunks: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedFile {
    pub path: PathBuf,
    pub error: String,
}

pub fn parse_request(json: &str) -> Result<JobRequest> {
    serde_json::from_str(json).context("Invalid job request")
}

/// Run one request to completion.
pub async fn dispatch(app: &App, request: JobRequest) -> Result<JobOutcome> {
    match request {
        JobRequest::Rfp {
            user_id,
            project_id,
            path,
            rfp_name,
            project_name,
        } => {
            let job = RfpJob {
                scope: Scope::new(user_id, project_id),
                input: path,
                rfp_name,
                project_name,
            };
            Ok(JobOutcome::Rfp(process_rfp(app, &job).await?))
        }
        JobRequest::DocumentProcess {
            user_id,
            project_id,
            files,
        } => {
            let scope = Scope::new(user_id, project_id);
            let mut indexed = Vec::new();
            let mut failed = Vec::new();
            for path in files {
                match app.ingestor.ingest_file(scope, &path).await {
                    Ok(IngestReport { file_id, chunks }) => indexed.push(IngestedFile {
                        path,
                        file_id,
                        chunks,
                    }),
                    Err(e) => {
                        warn!(path = %path.display(), "document processing failed: {:#}", e);
                        failed.push(FailedFile {
                            path,
                            error: format!("{:#}", e),
                        });
                    }
                }
            }
            Ok(JobOutcome::DocumentsProcessed { indexed, failed })
        }
        JobRequest::DocumentDelete { user_id, file_id } => {
            let existed = app.store.delete_file(file_id, user_id).await?;
            info!(file_id, existed, "document deleted");
            Ok(JobOutcome::DocumentDeleted { file_id, existed })
        }
        JobRequest::ProjectDelete {
            user_id,
            project_id,
        } => {
            let files = app
                .store
                .delete_project(Scope::new(user_id, project_id))
                .await?;
            info!(user_id, project_id, files, "project deleted");
            Ok(JobOutcome::ProjectDeleted { files })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_request_type() {
        let rfp = parse_request(
            r#"{"request_type":"rfp","user_id":1,"project_id":2,"path":"q.csv","project_name":"Acme"}"#,
        )
        .unwrap();
        assert_eq!(
            rfp,
            JobRequest::Rfp {
                user_id: 1,
                project_id: 2,
                path: PathBuf::from("q.csv"),
                rfp_name: None,
                project_name: Some("Acme".into()),
            }
        );

        let docs = parse_request(
            r#"{"request_type":"document_process","user_id":1,"project_id":2,"files":["a.txt","b.txt"]}"#,
        )
        .unwrap();
        assert!(matches!(docs, JobRequest::DocumentProcess { files, .. } if files.len() == 2));

        let del = parse_request(r#"{"request_type":"document_delete","user_id":1,"file_id":9}"#)
            .unwrap();
        assert_eq!(
            del,
            JobRequest::DocumentDelete {
                user_id: 1,
                file_id: 9
            }
        );

        let proj =
            parse_request(r#"{"request_type":"project_delete","user_id":1,"project_id":2}"#)
                .unwrap();
        assert_eq!(
            proj,
            JobRequest::ProjectDelete {
                user_id: 1,
                project_id: 2
            }
        );
    }

    #[test]
    fn unknown_request_type_is_rejected() {
        assert!(parse_request(r#"{"request_type":"crawl","urls":[]}"#).is_err());
        assert!(parse_request(r#"{"user_id":1}"#).is_err());
    }
}
