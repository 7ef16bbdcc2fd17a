//! Embeddable entry points: load both schemas, diff, plan, write the sync
//! script, and optionally execute it. The CLI is a thin shell over this
//! module.

use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{debug, info};

use crate::apply::{self, ExecutionResult};
use crate::diff::planner::{self, SyncScript};
use crate::diff::{self, Difference};
use crate::emit;
use crate::filter::{apply_policy, FilterPolicy};
use crate::model::SchemaModel;
use crate::mssql::connection::{self, ConnectionInfo, MssqlClient};
use crate::mssql::introspect;
use crate::parser;
use crate::util::{Result, SyncError};

/// Everything one run needs. `execute` gates applying the script; the
/// script file is written either way.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub script_folder: PathBuf,
    pub server: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub trust_cert: bool,
    pub execute: bool,
    pub output_path: PathBuf,
    /// Replaces the built-in deny list when set.
    pub exclude_prefixes: Option<Vec<String>>,
}

impl SyncOptions {
    fn connection(&self) -> ConnectionInfo {
        ConnectionInfo {
            server: self.server.clone(),
            database: self.database.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            trust_cert: self.trust_cert,
        }
    }

    fn policy(&self) -> FilterPolicy {
        match &self.exclude_prefixes {
            Some(prefixes) => FilterPolicy::with_deny_prefixes(prefixes.clone()),
            None => FilterPolicy::default(),
        }
    }
}

/// What a run produced. `no_changes` distinguishes a clean match from a
/// run that planned and wrote a script.
#[derive(Debug)]
pub struct SyncResult {
    pub differences: Vec<Difference>,
    pub script_path: Option<PathBuf>,
    pub execution: Option<ExecutionResult>,
    pub no_changes: bool,
}

/// Full pipeline: parse the folder and introspect the database
/// concurrently, then diff, filter, plan, emit, and (optionally) apply.
pub async fn sync(options: &SyncOptions) -> Result<SyncResult> {
    let (source, (mut client, target)) = load_models(options).await?;
    debug!(
        source = %source.fingerprint(),
        target = %target.fingerprint(),
        "schemas loaded"
    );

    let differences = apply_policy(diff::compare(&source, &target), &options.policy());
    let script = match planner::plan(&differences, &source, &target) {
        Ok(script) => script,
        Err(SyncError::NoChanges) => {
            info!(
                database = %options.database,
                "schemas match; no sync script needed"
            );
            return Ok(SyncResult {
                differences,
                script_path: None,
                execution: None,
                no_changes: true,
            });
        }
        Err(err) => return Err(err),
    };

    let text = emit::render_script(&script);
    let out_dir = resolve_output_dir(&options.script_folder, &options.output_path);
    let path = write_script(&out_dir, &options.server, &options.database, &text)?;

    let execution = if options.execute {
        Some(apply::execute_script(&script, &mut client).await?)
    } else {
        None
    };

    Ok(SyncResult {
        differences: script.differences,
        script_path: Some(path),
        execution,
        no_changes: false,
    })
}

/// Builds the plan without touching the filesystem or executing anything.
pub async fn plan_only(options: &SyncOptions) -> Result<SyncScript> {
    let (source, (_client, target)) = load_models(options).await?;
    let differences = apply_policy(diff::compare(&source, &target), &options.policy());
    planner::plan(&differences, &source, &target)
}

/// Synchronous wrapper for callers without a runtime.
pub fn sync_blocking(options: &SyncOptions) -> Result<SyncResult> {
    runtime(options)?.block_on(sync(options))
}

pub fn plan_only_blocking(options: &SyncOptions) -> Result<SyncScript> {
    runtime(options)?.block_on(plan_only(options))
}

fn runtime(options: &SyncOptions) -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| SyncError::Connection {
        server: options.server.clone(),
        database: options.database.clone(),
        message: format!("failed to start async runtime: {e}"),
    })
}

async fn load_models(options: &SyncOptions) -> Result<(SchemaModel, (MssqlClient, SchemaModel))> {
    let info = options.connection();
    let folder = options.script_folder.clone();
    let folder_display = options.script_folder.display().to_string();

    // Folder parsing is file I/O and regex work; it runs on a blocking
    // thread while the catalog queries stream in.
    let parse = tokio::task::spawn_blocking(move || parser::load_folder(&folder));
    let source_fut = async {
        Ok(parse
            .await
            .map_err(|e| SyncError::SourceUnreadable {
                path: folder_display,
                message: e.to_string(),
            })??)
    };
    let live_fut = async {
        let mut client = connection::connect(&info).await?;
        let model = introspect::load_model(&mut client, &info).await?;
        Ok::<_, SyncError>((client, model))
    };

    tokio::try_join!(source_fut, live_fut)
}

/// A relative output path is taken relative to the script folder, so the
/// default `../Deploys` lands beside the schema scripts.
fn resolve_output_dir(script_folder: &Path, output_path: &Path) -> PathBuf {
    if output_path.is_absolute() {
        output_path.to_path_buf()
    } else {
        script_folder.join(output_path)
    }
}

fn write_script(dir: &Path, server: &str, database: &str, text: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| SyncError::ScriptWrite {
        path: dir.display().to_string(),
        message: e.to_string(),
    })?;
    let path = dir.join(emit::script_file_name(server, database, Local::now()));
    std::fs::write(&path, text).map_err(|e| SyncError::ScriptWrite {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    info!(path = %path.display(), "sync script written");
    Ok(path)
}
