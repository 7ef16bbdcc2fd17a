#![allow(unused_imports, dead_code)]

pub use dbsync::diff::planner::{plan, ChangeAction, ChangeOp, SyncScript};
pub use dbsync::diff::{compare, Difference, DifferenceKind};
pub use dbsync::emit::{render_script, render_summary, script_file_name};
pub use dbsync::filter::{apply_policy, FilterPolicy};
pub use dbsync::model::{ObjectDefinition, ObjectId, ObjectType, SchemaModel};
pub use dbsync::parser::{load_folder, parse_batch, split_batches};
pub use dbsync::util::SyncError;
pub use std::fs;
pub use tempfile::TempDir;

/// Writes the given (relative path, contents) pairs into a fresh temp dir.
pub fn script_folder(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, contents) in files {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }
    dir
}

pub fn model_from_sql(sql: &str) -> SchemaModel {
    let dir = script_folder(&[("schema.sql", sql)]);
    load_folder(dir.path()).unwrap()
}

/// Diff two script texts under the default policy and plan the result.
pub fn plan_between(source_sql: &str, target_sql: &str) -> Result<SyncScript, SyncError> {
    let source = model_from_sql(source_sql);
    let target = model_from_sql(target_sql);
    let diffs = apply_policy(compare(&source, &target), &FilterPolicy::default());
    plan(&diffs, &source, &target)
}

pub fn op_names(script: &SyncScript) -> Vec<String> {
    script.ops.iter().map(|op| op.object.name.clone()).collect()
}
