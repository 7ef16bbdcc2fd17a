//! Runs a planned script against the live database inside one transaction.
//! The first failing statement aborts the run; nothing is retried and
//! nothing after the failure executes.

use tracing::{debug, info};

use crate::diff::planner::{ChangeAction, ChangeOp, SyncScript};
use crate::mssql::connection::MssqlClient;
use crate::util::{Result, SyncError};

/// Per-action counts for the executed plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub created: usize,
    pub altered: usize,
    pub dropped: usize,
    pub renamed: usize,
}

impl ExecutionResult {
    pub fn record(&mut self, action: ChangeAction) {
        match action {
            ChangeAction::Create => self.created += 1,
            ChangeAction::Alter => self.altered += 1,
            ChangeAction::Drop => self.dropped += 1,
            ChangeAction::Rename => self.renamed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.created + self.altered + self.dropped + self.renamed
    }
}

/// Executes every operation in plan order. Each op runs as its own batch so
/// batch-leading statements like CREATE PROCEDURE stay valid; the
/// surrounding transaction spans the whole plan.
pub async fn execute_script(
    script: &SyncScript,
    client: &mut MssqlClient,
) -> Result<ExecutionResult> {
    let mut result = ExecutionResult::default();
    if script.ops.is_empty() {
        return Ok(result);
    }

    run_batch(client, "BEGIN TRANSACTION", &script.ops[0], "begin").await?;

    for op in &script.ops {
        debug!(object = %op.object, action = op.action.verb(), "executing");
        if let Err(err) = run_batch(client, &op.statement, op, op.action.verb()).await {
            let _ = client
                .simple_query("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION")
                .await;
            return Err(err);
        }
        result.record(op.action);
    }

    let last = script.ops.last().unwrap_or(&script.ops[0]);
    if let Err(err) = run_batch(client, "COMMIT TRANSACTION", last, "commit").await {
        let _ = client
            .simple_query("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION")
            .await;
        return Err(err);
    }

    info!(
        created = result.created,
        altered = result.altered,
        dropped = result.dropped,
        renamed = result.renamed,
        "sync script applied"
    );
    Ok(result)
}

async fn run_batch(
    client: &mut MssqlClient,
    sql: &str,
    op: &ChangeOp,
    action: &str,
) -> Result<()> {
    let to_error = |e: tiberius::error::Error| SyncError::Execution {
        object: op.object.clone(),
        action: action.to_string(),
        message: e.to_string(),
    };
    client
        .simple_query(sql)
        .await
        .map_err(to_error)?
        .into_results()
        .await
        .map_err(to_error)?;
    Ok(())
}
