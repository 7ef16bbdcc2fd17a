//! Builds a [`SchemaModel`] from a folder of T-SQL scripts. Scripts are
//! split on `GO` separators and each batch is classified by its leading
//! CREATE statement; batches that define nothing (SET options, GRANTs,
//! seed data) are skipped.

pub mod loader;

use std::path::Path;

use regex::Regex;
use tracing::debug;

use crate::model::{
    ColumnDef, ForeignKeyDef, IndexDef, ObjectDefinition, ObjectId, ObjectType, PrincipalDef,
    RoutineDef, SchemaModel, SchemaObject, TableDef,
};
use crate::util::{normalize_default, strip_sql_comments, Result, SyncError};

const IDENT: &str = r"(?:\[[^\]]+\]|[A-Za-z_][\w$]*)";

fn qualified_pattern() -> String {
    format!(r"{IDENT}(?:\s*\.\s*{IDENT})?")
}

/// Parses every `.sql` file under `folder` into one model.
pub fn load_folder(folder: &Path) -> Result<SchemaModel> {
    let mut model = SchemaModel::new();
    for file in loader::sql_files(folder)? {
        let text = loader::read_file(&file)?;
        let file_name = file.display().to_string();
        for batch in split_batches(&text) {
            parse_batch(&batch, &file_name, &mut model)?;
        }
    }
    model.finish();
    Ok(model)
}

/// Splits a script on `GO` batch separators. `GO` must stand on its own
/// line; a trailing semicolon is tolerated.
pub fn split_batches(script: &str) -> Vec<String> {
    let mut batches = Vec::new();
    let mut current = String::new();
    for line in script.replace("\r\n", "\n").lines() {
        if is_batch_separator(line) {
            if !current.trim().is_empty() {
                batches.push(std::mem::take(&mut current));
            } else {
                current.clear();
            }
        } else {
            current.push_str(line);
            current.push('\n');
        }
    }
    if !current.trim().is_empty() {
        batches.push(current);
    }
    batches
}

fn is_batch_separator(line: &str) -> bool {
    line.trim()
        .trim_end_matches(';')
        .trim_end()
        .eq_ignore_ascii_case("go")
}

/// Classifies one batch and adds the object it defines to the model.
/// Unrecognized batches are logged and skipped.
pub fn parse_batch(batch: &str, file: &str, model: &mut SchemaModel) -> Result<()> {
    let stripped = strip_sql_comments(batch);
    let head = stripped.trim();
    if head.is_empty() {
        return Ok(());
    }
    let qualified = qualified_pattern();

    let table_re =
        Regex::new(&format!(r"(?is)^CREATE\s+TABLE\s+(?P<name>{qualified})\s*\(")).unwrap();
    if let Some(caps) = table_re.captures(head) {
        let name = qualify(&caps["name"]);
        let open = caps.get(0).unwrap().end() - 1;
        let body = balanced_parens(head, open).ok_or_else(|| SyncError::Parse {
            file: file.to_string(),
            object: Some(ObjectId::new(ObjectType::Table, name.clone())),
            message: "unbalanced parentheses in CREATE TABLE".to_string(),
        })?;
        let def = parse_table_body(body, &name, file)?;
        return insert_object(
            model,
            SchemaObject::new(
                ObjectId::new(ObjectType::Table, name),
                ObjectDefinition::Table(def),
            ),
            file,
        );
    }

    let index_re = Regex::new(&format!(
        concat!(
            r"(?is)^CREATE\s+(?P<unique>UNIQUE\s+)?(?:(?P<clustering>CLUSTERED|NONCLUSTERED)\s+)?",
            r"INDEX\s+(?P<name>{IDENT})\s+ON\s+(?P<table>{qualified})\s*\((?P<cols>[^)]*)\)"
        ),
        IDENT = IDENT,
        qualified = qualified
    ))
    .unwrap();
    if let Some(caps) = index_re.captures(head) {
        let table = qualify(&caps["table"]);
        let leaf = strip_brackets(&caps["name"]);
        let def = IndexDef {
            table: table.clone(),
            columns: ident_list(&caps["cols"]),
            unique: caps.name("unique").is_some(),
            clustered: caps
                .name("clustering")
                .is_some_and(|m| m.as_str().eq_ignore_ascii_case("CLUSTERED")),
        };
        return insert_object(
            model,
            SchemaObject::new(
                ObjectId::new(ObjectType::Index, format!("{table}.{leaf}")),
                ObjectDefinition::Index(def),
            ),
            file,
        );
    }

    let routine_re = Regex::new(&format!(
        r"(?is)^CREATE\s+(?:OR\s+ALTER\s+)?(?P<kind>VIEW|PROCEDURE|PROC|FUNCTION|TRIGGER)\s+(?P<name>{qualified})"
    ))
    .unwrap();
    if let Some(caps) = routine_re.captures(head) {
        let object_type = match caps["kind"].to_uppercase().as_str() {
            "VIEW" => ObjectType::View,
            "PROCEDURE" | "PROC" => ObjectType::StoredProcedure,
            "TRIGGER" => ObjectType::Trigger,
            _ => ObjectType::Function,
        };
        let name = qualify(&caps["name"]);
        return insert_object(
            model,
            SchemaObject::new(
                ObjectId::new(object_type, name),
                ObjectDefinition::Routine(RoutineDef {
                    body: batch.trim().to_string(),
                }),
            ),
            file,
        );
    }

    let principal_re = Regex::new(&format!(
        r"(?is)^CREATE\s+(?P<kind>USER|ROLE|QUEUE|SERVICE)\s+(?P<name>{qualified})"
    ))
    .unwrap();
    if let Some(caps) = principal_re.captures(head) {
        let (object_type, name) = match caps["kind"].to_uppercase().as_str() {
            "USER" => (ObjectType::User, strip_brackets(&caps["name"])),
            "ROLE" => (ObjectType::Role, strip_brackets(&caps["name"])),
            "QUEUE" => (ObjectType::Queue, qualify(&caps["name"])),
            _ => (ObjectType::Service, strip_brackets(&caps["name"])),
        };
        return insert_object(
            model,
            SchemaObject::new(
                ObjectId::new(object_type, name),
                ObjectDefinition::Principal(PrincipalDef {
                    definition: batch.trim().to_string(),
                }),
            ),
            file,
        );
    }

    debug!(file, "skipping batch without a recognized definition");
    Ok(())
}

fn insert_object(model: &mut SchemaModel, object: SchemaObject, file: &str) -> Result<()> {
    let id = object.id.clone();
    if !model.insert(object) {
        return Err(SyncError::Parse {
            file: file.to_string(),
            object: Some(id),
            message: "object is defined more than once".to_string(),
        });
    }
    Ok(())
}

fn parse_table_body(body: &str, table: &str, file: &str) -> Result<TableDef> {
    let mut def = TableDef::default();
    for item in split_top_level(body) {
        let upper = item.to_uppercase();
        if upper.starts_with("CONSTRAINT")
            || upper.starts_with("PRIMARY KEY")
            || upper.starts_with("FOREIGN KEY")
        {
            parse_table_constraint(&item, table, &mut def)?;
        } else if upper.starts_with("UNIQUE") || upper.starts_with("CHECK") {
            // Not modeled; harmless to the diff.
        } else {
            def.columns.push(parse_column(&item, table, file)?);
        }
    }
    Ok(def)
}

fn parse_table_constraint(item: &str, table: &str, def: &mut TableDef) -> Result<()> {
    let name_re = Regex::new(&format!(r"(?is)^CONSTRAINT\s+(?P<name>{IDENT})")).unwrap();
    let constraint_name = name_re
        .captures(item)
        .map(|caps| strip_brackets(&caps["name"]));

    let pk_re =
        Regex::new(r"(?is)PRIMARY\s+KEY\s*(?:CLUSTERED|NONCLUSTERED)?\s*\(([^)]*)\)").unwrap();
    if let Some(caps) = pk_re.captures(item) {
        def.primary_key = ident_list(&caps[1]);
        return Ok(());
    }

    let fk_re = Regex::new(&format!(
        r"(?is)FOREIGN\s+KEY\s*\(([^)]*)\)\s*REFERENCES\s+(?P<table>{})\s*\(([^)]*)\)",
        qualified_pattern()
    ))
    .unwrap();
    if let Some(caps) = fk_re.captures(item) {
        let referenced_table = qualify(&caps["table"]);
        let name = constraint_name.unwrap_or_else(|| {
            format!(
                "FK_{}_{}",
                leaf(table),
                leaf(&referenced_table)
            )
        });
        def.foreign_keys.push(ForeignKeyDef {
            name,
            columns: ident_list(&caps[1]),
            referenced_columns: ident_list(&caps[3]),
            referenced_table,
        });
    }
    // Named UNIQUE/CHECK constraints fall through unmodeled.
    Ok(())
}

fn parse_column(item: &str, table: &str, file: &str) -> Result<ColumnDef> {
    let re = Regex::new(&format!(
        r"(?is)^(?P<name>{IDENT})\s+(?P<ty>[A-Za-z_]\w*(?:\s*\([^)]*\))?)(?P<rest>.*)$"
    ))
    .unwrap();
    let caps = re.captures(item).ok_or_else(|| SyncError::Parse {
        file: file.to_string(),
        object: Some(ObjectId::new(ObjectType::Table, table.to_string())),
        message: format!("unrecognized column definition: {item}"),
    })?;

    let rest = caps["rest"].to_string();
    let identity = Regex::new(r"(?i)\bIDENTITY\b").unwrap().is_match(&rest);
    let nullable = !Regex::new(r"(?i)\bNOT\s+NULL\b").unwrap().is_match(&rest);
    let default = Regex::new(r"(?is)\bDEFAULT\s+(.+?)\s*(?:NOT\s+NULL|NULL)?\s*$")
        .unwrap()
        .captures(&rest)
        .map(|c| normalize_default(&c[1]));

    Ok(ColumnDef {
        name: strip_brackets(&caps["name"]),
        data_type: normalize_type(&caps["ty"]),
        nullable,
        default,
        identity,
    })
}

/// Content between the paren at `open` and its matching close.
fn balanced_parens(text: &str, open: usize) -> Option<&str> {
    let mut depth = 0usize;
    for (i, b) in text.bytes().enumerate().skip(open) {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[open + 1..i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Splits on commas at paren depth zero, respecting single-quoted strings.
fn split_top_level(body: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_string = false;
    for ch in body.chars() {
        match ch {
            '\'' => {
                in_string = !in_string;
                current.push(ch);
            }
            '(' if !in_string => {
                depth += 1;
                current.push(ch);
            }
            ')' if !in_string => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if !in_string && depth == 0 => {
                if !current.trim().is_empty() {
                    parts.push(current.trim().to_string());
                }
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

fn strip_brackets(raw: &str) -> String {
    raw.replace(['[', ']'], "").trim().to_string()
}

fn leaf(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

/// Unbrackets and schema-qualifies a name; a bare identifier lands in `dbo`.
fn qualify(raw: &str) -> String {
    let parts: Vec<String> = raw
        .split('.')
        .map(|p| strip_brackets(p))
        .collect();
    if parts.len() == 1 {
        format!("dbo.{}", parts[0])
    } else {
        parts.join(".")
    }
}

/// Column names from a key/index column list, dropping ASC/DESC markers.
fn ident_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .filter_map(|piece| {
            piece
                .replace(['[', ']'], "")
                .split_whitespace()
                .next()
                .map(str::to_string)
        })
        .collect()
}

/// Types compare against catalog output, so strip internal whitespace and
/// lowercase: `DECIMAL (18, 2)` becomes `decimal(18,2)`.
fn normalize_type(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}
