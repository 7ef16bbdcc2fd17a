//! Builds a [`SchemaModel`] from the target database's `sys.*` catalog
//! views. One query per object family; rows arrive pre-ordered so the
//! model assembles in a single pass each.

use std::collections::BTreeMap;

use tiberius::Row;

use crate::model::{
    ColumnDef, ForeignKeyDef, IndexDef, ObjectDefinition, ObjectId, ObjectType, PrincipalDef,
    RoutineDef, SchemaModel, SchemaObject, TableDef,
};
use crate::mssql::connection::{ConnectionInfo, MssqlClient};
use crate::util::{normalize_default, Result};

const COLUMNS_SQL: &str = "\
SELECT s.name AS schema_name, t.name AS table_name, c.name AS column_name, \
       ty.name AS type_name, c.max_length, c.precision, c.scale, \
       c.is_nullable, c.is_identity, d.definition AS default_definition \
FROM sys.tables t \
JOIN sys.schemas s ON s.schema_id = t.schema_id \
JOIN sys.columns c ON c.object_id = t.object_id \
JOIN sys.types ty ON ty.user_type_id = c.user_type_id \
LEFT JOIN sys.default_constraints d \
    ON d.parent_object_id = t.object_id AND d.parent_column_id = c.column_id \
WHERE t.is_ms_shipped = 0 \
ORDER BY s.name, t.name, c.column_id";

const PRIMARY_KEYS_SQL: &str = "\
SELECT s.name AS schema_name, t.name AS table_name, c.name AS column_name \
FROM sys.key_constraints kc \
JOIN sys.tables t ON t.object_id = kc.parent_object_id \
JOIN sys.schemas s ON s.schema_id = t.schema_id \
JOIN sys.index_columns ic \
    ON ic.object_id = kc.parent_object_id AND ic.index_id = kc.unique_index_id \
JOIN sys.columns c ON c.object_id = ic.object_id AND c.column_id = ic.column_id \
WHERE kc.type = 'PK' \
ORDER BY s.name, t.name, ic.key_ordinal";

const FOREIGN_KEYS_SQL: &str = "\
SELECT fk.name AS fk_name, ps.name AS schema_name, pt.name AS table_name, \
       pc.name AS column_name, rs.name AS ref_schema, rt.name AS ref_table, \
       rc.name AS ref_column \
FROM sys.foreign_keys fk \
JOIN sys.tables pt ON pt.object_id = fk.parent_object_id \
JOIN sys.schemas ps ON ps.schema_id = pt.schema_id \
JOIN sys.tables rt ON rt.object_id = fk.referenced_object_id \
JOIN sys.schemas rs ON rs.schema_id = rt.schema_id \
JOIN sys.foreign_key_columns fkc ON fkc.constraint_object_id = fk.object_id \
JOIN sys.columns pc \
    ON pc.object_id = fkc.parent_object_id AND pc.column_id = fkc.parent_column_id \
JOIN sys.columns rc \
    ON rc.object_id = fkc.referenced_object_id AND rc.column_id = fkc.referenced_column_id \
ORDER BY ps.name, pt.name, fk.name, fkc.constraint_column_id";

const INDEXES_SQL: &str = "\
SELECT s.name AS schema_name, t.name AS table_name, i.name AS index_name, \
       i.is_unique, i.type_desc, c.name AS column_name \
FROM sys.indexes i \
JOIN sys.tables t ON t.object_id = i.object_id \
JOIN sys.schemas s ON s.schema_id = t.schema_id \
JOIN sys.index_columns ic \
    ON ic.object_id = i.object_id AND ic.index_id = i.index_id \
   AND ic.is_included_column = 0 \
JOIN sys.columns c ON c.object_id = ic.object_id AND c.column_id = ic.column_id \
WHERE i.is_primary_key = 0 AND i.is_unique_constraint = 0 \
  AND i.name IS NOT NULL AND t.is_ms_shipped = 0 \
ORDER BY s.name, t.name, i.name, ic.key_ordinal";

const MODULES_SQL: &str = "\
SELECT s.name AS schema_name, o.name AS object_name, o.type AS object_kind, m.definition \
FROM sys.sql_modules m \
JOIN sys.objects o ON o.object_id = m.object_id \
JOIN sys.schemas s ON s.schema_id = o.schema_id \
WHERE o.type IN ('V', 'P', 'FN', 'IF', 'TF', 'TR') AND o.is_ms_shipped = 0 \
ORDER BY s.name, o.name";

const PRINCIPALS_SQL: &str = "\
SELECT name, type AS principal_kind \
FROM sys.database_principals \
WHERE type IN ('S', 'U', 'R') AND principal_id > 4 AND is_fixed_role = 0 \
ORDER BY name";

const QUEUES_SQL: &str = "\
SELECT s.name AS schema_name, q.name AS queue_name \
FROM sys.service_queues q \
JOIN sys.schemas s ON s.schema_id = q.schema_id \
WHERE q.is_ms_shipped = 0 \
ORDER BY s.name, q.name";

const SERVICES_SQL: &str = "\
SELECT name FROM sys.services \
WHERE name NOT LIKE 'http://schemas.microsoft.com%' \
ORDER BY name";

/// Reads the complete schema of the connected database.
pub async fn load_model(client: &mut MssqlClient, info: &ConnectionInfo) -> Result<SchemaModel> {
    let mut tables: BTreeMap<String, TableDef> = BTreeMap::new();

    for row in fetch(client, info, COLUMNS_SQL).await? {
        let table = qualified(&row, info, "schema_name", "table_name")?;
        let column = ColumnDef {
            name: string(&row, info, "column_name")?,
            data_type: format_data_type(
                &string(&row, info, "type_name")?,
                get::<i16>(&row, info, "max_length")?,
                get::<u8>(&row, info, "precision")?,
                get::<u8>(&row, info, "scale")?,
            ),
            nullable: get::<bool>(&row, info, "is_nullable")?,
            identity: get::<bool>(&row, info, "is_identity")?,
            default: opt_string(&row, info, "default_definition")?
                .map(|expr| normalize_default(&expr)),
        };
        tables.entry(table).or_default().columns.push(column);
    }

    for row in fetch(client, info, PRIMARY_KEYS_SQL).await? {
        let table = qualified(&row, info, "schema_name", "table_name")?;
        let column = string(&row, info, "column_name")?;
        tables.entry(table).or_default().primary_key.push(column);
    }

    for row in fetch(client, info, FOREIGN_KEYS_SQL).await? {
        let table = qualified(&row, info, "schema_name", "table_name")?;
        let fk_name = string(&row, info, "fk_name")?;
        let column = string(&row, info, "column_name")?;
        let referenced_table = qualified(&row, info, "ref_schema", "ref_table")?;
        let referenced_column = string(&row, info, "ref_column")?;
        let foreign_keys = &mut tables.entry(table).or_default().foreign_keys;
        match foreign_keys.last_mut() {
            // Multi-column keys arrive as consecutive rows for one name.
            Some(fk) if fk.name == fk_name => {
                fk.columns.push(column);
                fk.referenced_columns.push(referenced_column);
            }
            _ => foreign_keys.push(ForeignKeyDef {
                name: fk_name,
                columns: vec![column],
                referenced_table,
                referenced_columns: vec![referenced_column],
            }),
        }
    }

    let mut model = SchemaModel::new();
    for (name, def) in tables {
        model.insert(SchemaObject::new(
            ObjectId::new(ObjectType::Table, name),
            ObjectDefinition::Table(def),
        ));
    }

    let mut indexes: BTreeMap<String, IndexDef> = BTreeMap::new();
    for row in fetch(client, info, INDEXES_SQL).await? {
        let table = qualified(&row, info, "schema_name", "table_name")?;
        let key = format!("{table}.{}", string(&row, info, "index_name")?);
        let unique = get::<bool>(&row, info, "is_unique")?;
        let clustered = string(&row, info, "type_desc")? == "CLUSTERED";
        let column = string(&row, info, "column_name")?;
        indexes
            .entry(key)
            .or_insert_with(|| IndexDef {
                table,
                columns: Vec::new(),
                unique,
                clustered,
            })
            .columns
            .push(column);
    }
    for (name, def) in indexes {
        model.insert(SchemaObject::new(
            ObjectId::new(ObjectType::Index, name),
            ObjectDefinition::Index(def),
        ));
    }

    for row in fetch(client, info, MODULES_SQL).await? {
        let name = qualified(&row, info, "schema_name", "object_name")?;
        let object_type = match string(&row, info, "object_kind")?.trim() {
            "V" => ObjectType::View,
            "P" => ObjectType::StoredProcedure,
            "TR" => ObjectType::Trigger,
            _ => ObjectType::Function,
        };
        let body = string(&row, info, "definition")?;
        model.insert(SchemaObject::new(
            ObjectId::new(object_type, name),
            ObjectDefinition::Routine(RoutineDef {
                body,
            }),
        ));
    }

    for row in fetch(client, info, PRINCIPALS_SQL).await? {
        let name = string(&row, info, "name")?;
        let (object_type, keyword) = match string(&row, info, "principal_kind")?.trim() {
            "R" => (ObjectType::Role, "ROLE"),
            _ => (ObjectType::User, "USER"),
        };
        model.insert(SchemaObject::new(
            ObjectId::new(object_type, name.clone()),
            ObjectDefinition::Principal(PrincipalDef {
                definition: format!("CREATE {keyword} [{name}]"),
            }),
        ));
    }

    for row in fetch(client, info, QUEUES_SQL).await? {
        let name = qualified(&row, info, "schema_name", "queue_name")?;
        model.insert(SchemaObject::new(
            ObjectId::new(ObjectType::Queue, name.clone()),
            ObjectDefinition::Principal(PrincipalDef {
                definition: format!("CREATE QUEUE {}", super::sqlgen::quote_name(&name)),
            }),
        ));
    }

    for row in fetch(client, info, SERVICES_SQL).await? {
        let name = string(&row, info, "name")?;
        model.insert(SchemaObject::new(
            ObjectId::new(ObjectType::Service, name.clone()),
            ObjectDefinition::Principal(PrincipalDef {
                definition: format!("CREATE SERVICE [{name}]"),
            }),
        ));
    }

    model.finish();
    Ok(model)
}

async fn fetch(client: &mut MssqlClient, info: &ConnectionInfo, sql: &str) -> Result<Vec<Row>> {
    client
        .simple_query(sql)
        .await
        .map_err(|e| info.connection_error(e))?
        .into_first_result()
        .await
        .map_err(|e| info.connection_error(e))
}

fn get<'a, T: tiberius::FromSql<'a> + Copy>(
    row: &'a Row,
    info: &ConnectionInfo,
    column: &str,
) -> Result<T> {
    row.try_get::<T, _>(column)
        .map_err(|e| info.connection_error(e))?
        .ok_or_else(|| info.connection_error(format!("catalog column {column} was NULL")))
}

fn string(row: &Row, info: &ConnectionInfo, column: &str) -> Result<String> {
    opt_string(row, info, column)?
        .ok_or_else(|| info.connection_error(format!("catalog column {column} was NULL")))
}

fn opt_string(row: &Row, info: &ConnectionInfo, column: &str) -> Result<Option<String>> {
    Ok(row
        .try_get::<&str, _>(column)
        .map_err(|e| info.connection_error(e))?
        .map(str::to_string))
}

fn qualified(row: &Row, info: &ConnectionInfo, schema: &str, name: &str) -> Result<String> {
    Ok(format!(
        "{}.{}",
        string(row, info, schema)?,
        string(row, info, name)?
    ))
}

/// Renders a catalog type row the way scripts declare it. Length and
/// precision arguments are only attached where T-SQL requires them.
pub fn format_data_type(type_name: &str, max_length: i16, precision: u8, scale: u8) -> String {
    match type_name {
        "varchar" | "char" | "varbinary" | "binary" => {
            if max_length == -1 {
                format!("{type_name}(max)")
            } else {
                format!("{type_name}({max_length})")
            }
        }
        // nvarchar/nchar lengths are stored in bytes, two per character.
        "nvarchar" | "nchar" => {
            if max_length == -1 {
                format!("{type_name}(max)")
            } else {
                format!("{type_name}({})", max_length / 2)
            }
        }
        "decimal" | "numeric" => format!("{type_name}({precision},{scale})"),
        "datetime2" | "datetimeoffset" | "time" => format!("{type_name}({scale})"),
        other => other.to_string(),
    }
}
