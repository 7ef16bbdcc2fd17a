use std::path::PathBuf;

use clap::Parser;

use crate::api::SyncOptions;

/// Synchronize a SQL Server database with a schema script folder.
#[derive(Parser, Debug)]
#[command(name = "dbsync", version, about)]
pub struct Cli {
    /// Folder holding the schema scripts (the desired state).
    #[arg(short = 'f', long = "source-folder")]
    pub source_folder: PathBuf,

    /// Target server, as host or host,port.
    #[arg(short = 's', long)]
    pub server: String,

    /// Target database name.
    #[arg(short = 'd', long)]
    pub database: String,

    /// SQL login name; integrated security is used when omitted.
    #[arg(short = 'u', long, requires = "password")]
    pub username: Option<String>,

    /// Password for the SQL login.
    #[arg(
        short = 'p',
        long,
        requires = "username",
        env = "DBSYNC_PASSWORD",
        hide_env_values = true
    )]
    pub password: Option<String>,

    /// Apply the generated script to the target after writing it.
    #[arg(
        short = 'e',
        long = "deploy",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub deploy: bool,

    /// Directory the sync script is written to.
    #[arg(short = 'o', long = "output-path", default_value = "../Deploys")]
    pub output_path: PathBuf,

    /// Qualified-name prefix to skip (repeatable; replaces the default list).
    #[arg(long = "exclude-prefix", value_name = "PREFIX")]
    pub exclude_prefix: Vec<String>,

    /// Accept the server TLS certificate without validation.
    #[arg(long)]
    pub trust_cert: bool,
}

impl Cli {
    pub fn into_options(self) -> SyncOptions {
        SyncOptions {
            script_folder: self.source_folder,
            server: self.server,
            database: self.database,
            username: self.username,
            password: self.password,
            trust_cert: self.trust_cert,
            execute: self.deploy,
            output_path: self.output_path,
            exclude_prefixes: if self.exclude_prefix.is_empty() {
                None
            } else {
                Some(self.exclude_prefix)
            },
        }
    }
}
