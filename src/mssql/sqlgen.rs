//! Renders change operations as self-contained T-SQL. Every statement is
//! executable on its own against the target database; batching and `GO`
//! separators are the emitter's concern.

use regex::Regex;

use crate::model::{ColumnDef, IndexDef, ObjectId, ObjectType, RoutineDef, TableDef};

/// Brackets each dot-separated part of a name: `dbo.Orders` becomes
/// `[dbo].[Orders]`. Closing brackets inside a part are doubled.
pub fn quote_name(name: &str) -> String {
    name.split('.')
        .map(|part| format!("[{}]", part.replace(']', "]]")))
        .collect::<Vec<_>>()
        .join(".")
}

/// Last dot-separated segment of a qualified name.
pub fn leaf_name(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

fn column_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_name(c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn column_clause(column: &ColumnDef) -> String {
    let mut parts = vec![quote_name(&column.name), column.data_type.clone()];
    if column.identity {
        parts.push("IDENTITY(1,1)".to_string());
    }
    parts.push(if column.nullable { "NULL" } else { "NOT NULL" }.to_string());
    if let Some(default) = &column.default {
        parts.push(format!("DEFAULT ({default})"));
    }
    parts.join(" ")
}

/// Primary keys are rendered under a derived name so a later alter can drop
/// them without catalog access.
fn pk_constraint_name(table: &str) -> String {
    format!("PK_{}", leaf_name(table))
}

pub fn create_table(name: &str, def: &TableDef) -> String {
    let mut lines: Vec<String> = def
        .columns
        .iter()
        .map(|c| format!("    {}", column_clause(c)))
        .collect();
    if !def.primary_key.is_empty() {
        lines.push(format!(
            "    CONSTRAINT {} PRIMARY KEY ({})",
            quote_name(&pk_constraint_name(name)),
            column_list(&def.primary_key)
        ));
    }
    for fk in &def.foreign_keys {
        lines.push(format!(
            "    CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            quote_name(&fk.name),
            column_list(&fk.columns),
            quote_name(&fk.referenced_table),
            column_list(&fk.referenced_columns)
        ));
    }
    format!("CREATE TABLE {} (\n{}\n)", quote_name(name), lines.join(",\n"))
}

/// Statements that take the live table from `current` to `desired`:
/// constraint drops first, then column changes, then constraint adds.
pub fn alter_table(name: &str, desired: &TableDef, current: &TableDef) -> Vec<String> {
    let table = quote_name(name);
    let mut statements = Vec::new();

    for fk in &current.foreign_keys {
        if !desired.foreign_keys.contains(fk) {
            statements.push(format!(
                "ALTER TABLE {table} DROP CONSTRAINT {}",
                quote_name(&fk.name)
            ));
        }
    }
    let pk_changed = desired.primary_key != current.primary_key;
    if pk_changed && !current.primary_key.is_empty() {
        statements.push(format!(
            "ALTER TABLE {table} DROP CONSTRAINT {}",
            quote_name(&pk_constraint_name(name))
        ));
    }

    for column in &current.columns {
        if !desired.columns.iter().any(|c| c.name == column.name) {
            statements.push(format!(
                "ALTER TABLE {table} DROP COLUMN {}",
                quote_name(&column.name)
            ));
        }
    }
    for column in &desired.columns {
        match current.columns.iter().find(|c| c.name == column.name) {
            None => statements.push(format!(
                "ALTER TABLE {table} ADD {}",
                column_clause(column)
            )),
            Some(existing) if existing != column => {
                // Identity and defaults cannot change through ALTER COLUMN;
                // type and nullability can.
                let nullability = if column.nullable { "NULL" } else { "NOT NULL" };
                statements.push(format!(
                    "ALTER TABLE {table} ALTER COLUMN {} {} {nullability}",
                    quote_name(&column.name),
                    column.data_type
                ));
            }
            Some(_) => {}
        }
    }

    if pk_changed && !desired.primary_key.is_empty() {
        statements.push(format!(
            "ALTER TABLE {table} ADD CONSTRAINT {} PRIMARY KEY ({})",
            quote_name(&pk_constraint_name(name)),
            column_list(&desired.primary_key)
        ));
    }
    for fk in &desired.foreign_keys {
        if !current.foreign_keys.contains(fk) {
            statements.push(format!(
                "ALTER TABLE {table} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
                quote_name(&fk.name),
                column_list(&fk.columns),
                quote_name(&fk.referenced_table),
                column_list(&fk.referenced_columns)
            ));
        }
    }

    statements
}

pub fn create_index(name: &str, def: &IndexDef) -> String {
    let unique = if def.unique { "UNIQUE " } else { "" };
    let clustering = if def.clustered {
        "CLUSTERED "
    } else {
        "NONCLUSTERED "
    };
    format!(
        "CREATE {unique}{clustering}INDEX {} ON {} ({})",
        quote_name(leaf_name(name)),
        quote_name(&def.table),
        column_list(&def.columns)
    )
}

pub fn drop_index(name: &str, def: &IndexDef) -> String {
    format!(
        "DROP INDEX {} ON {}",
        quote_name(leaf_name(name)),
        quote_name(&def.table)
    )
}

/// `sp_rename` wants the unbracketed table-qualified old name.
pub fn rename_index(table: &str, old_leaf: &str, new_leaf: &str) -> String {
    format!("EXEC sp_rename N'{table}.{old_leaf}', N'{new_leaf}', N'INDEX'")
}

pub fn create_routine(def: &RoutineDef) -> String {
    def.body.trim().to_string()
}

/// Rewrites the leading CREATE into CREATE OR ALTER so a changed routine
/// replaces the live one in a single statement.
pub fn alter_routine(def: &RoutineDef) -> String {
    let re = Regex::new(r"(?i)^\s*CREATE\s+(OR\s+ALTER\s+)?").unwrap();
    re.replace(def.body.trim(), "CREATE OR ALTER ").to_string()
}

/// DROP statement for everything except indexes, which need their table.
pub fn drop_statement(id: &ObjectId) -> String {
    let keyword = match id.object_type {
        ObjectType::Table => "TABLE",
        ObjectType::View => "VIEW",
        ObjectType::StoredProcedure => "PROCEDURE",
        ObjectType::Function => "FUNCTION",
        ObjectType::Trigger => "TRIGGER",
        ObjectType::User => "USER",
        ObjectType::Role => "ROLE",
        ObjectType::Queue => "QUEUE",
        ObjectType::Service => "SERVICE",
        ObjectType::Index => unreachable!("index drops go through drop_index"),
    };
    format!("DROP {keyword} {}", quote_name(&id.name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ForeignKeyDef;

    fn column(name: &str, data_type: &str, nullable: bool) -> ColumnDef {
        ColumnDef {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            default: None,
            identity: false,
        }
    }

    #[test]
    fn quote_brackets_each_part() {
        assert_eq!(quote_name("dbo.Orders"), "[dbo].[Orders]");
        assert_eq!(quote_name("Odd]Name"), "[Odd]]Name]");
    }

    #[test]
    fn create_table_renders_columns_pk_and_fk() {
        let def = TableDef {
            columns: vec![
                ColumnDef {
                    identity: true,
                    ..column("Id", "int", false)
                },
                column("CustomerId", "int", false),
                ColumnDef {
                    default: Some("0".into()),
                    ..column("Total", "decimal(18,2)", true)
                },
            ],
            primary_key: vec!["Id".into()],
            foreign_keys: vec![ForeignKeyDef {
                name: "FK_Orders_Customers".into(),
                columns: vec!["CustomerId".into()],
                referenced_table: "dbo.Customers".into(),
                referenced_columns: vec!["Id".into()],
            }],
        };
        let sql = create_table("dbo.Orders", &def);
        assert!(sql.starts_with("CREATE TABLE [dbo].[Orders] (\n"));
        assert!(sql.contains("[Id] int IDENTITY(1,1) NOT NULL"));
        assert!(sql.contains("[Total] decimal(18,2) NULL DEFAULT (0)"));
        assert!(sql.contains("CONSTRAINT [PK_Orders] PRIMARY KEY ([Id])"));
        assert!(sql.contains(
            "CONSTRAINT [FK_Orders_Customers] FOREIGN KEY ([CustomerId]) \
             REFERENCES [dbo].[Customers] ([Id])"
        ));
    }

    #[test]
    fn alter_table_adds_drops_and_retypes_columns() {
        let current = TableDef {
            columns: vec![column("Id", "int", false), column("Legacy", "text", true)],
            ..Default::default()
        };
        let desired = TableDef {
            columns: vec![
                column("Id", "bigint", false),
                column("CreatedAt", "datetime2", false),
            ],
            ..Default::default()
        };
        let statements = alter_table("dbo.Orders", &desired, &current);
        assert_eq!(
            statements,
            vec![
                "ALTER TABLE [dbo].[Orders] DROP COLUMN [Legacy]",
                "ALTER TABLE [dbo].[Orders] ALTER COLUMN [Id] bigint NOT NULL",
                "ALTER TABLE [dbo].[Orders] ADD [CreatedAt] datetime2 NOT NULL",
            ]
        );
    }

    #[test]
    fn alter_table_replaces_changed_primary_key() {
        let current = TableDef {
            columns: vec![column("Id", "int", false), column("Code", "nvarchar(20)", false)],
            primary_key: vec!["Id".into()],
            ..Default::default()
        };
        let desired = TableDef {
            primary_key: vec!["Code".into()],
            ..current.clone()
        };
        let statements = alter_table("dbo.Orders", &desired, &current);
        assert_eq!(
            statements,
            vec![
                "ALTER TABLE [dbo].[Orders] DROP CONSTRAINT [PK_Orders]",
                "ALTER TABLE [dbo].[Orders] ADD CONSTRAINT [PK_Orders] PRIMARY KEY ([Code])",
            ]
        );
    }

    #[test]
    fn index_statements_target_the_owning_table() {
        let def = IndexDef {
            table: "dbo.Orders".into(),
            columns: vec!["CustomerId".into()],
            unique: true,
            clustered: false,
        };
        assert_eq!(
            create_index("dbo.Orders.IX_Orders_Customer", &def),
            "CREATE UNIQUE NONCLUSTERED INDEX [IX_Orders_Customer] \
             ON [dbo].[Orders] ([CustomerId])"
        );
        assert_eq!(
            drop_index("dbo.Orders.IX_Orders_Customer", &def),
            "DROP INDEX [IX_Orders_Customer] ON [dbo].[Orders]"
        );
    }

    #[test]
    fn rename_index_uses_sp_rename() {
        assert_eq!(
            rename_index("dbo.Orders", "IX_Old", "IX_New"),
            "EXEC sp_rename N'dbo.Orders.IX_Old', N'IX_New', N'INDEX'"
        );
    }

    #[test]
    fn alter_routine_rewrites_create() {
        let def = RoutineDef {
            body: "CREATE PROCEDURE dbo.GetOrders AS SELECT 1".into(),
        };
        assert_eq!(
            alter_routine(&def),
            "CREATE OR ALTER PROCEDURE dbo.GetOrders AS SELECT 1"
        );
        let already = RoutineDef {
            body: "CREATE OR ALTER VIEW dbo.V AS SELECT 1 AS x".into(),
        };
        assert_eq!(
            alter_routine(&already),
            "CREATE OR ALTER VIEW dbo.V AS SELECT 1 AS x"
        );
    }

    #[test]
    fn drop_statement_matches_object_type() {
        assert_eq!(
            drop_statement(&ObjectId::new(ObjectType::View, "dbo.OpenOrders")),
            "DROP VIEW [dbo].[OpenOrders]"
        );
        assert_eq!(
            drop_statement(&ObjectId::new(ObjectType::StoredProcedure, "dbo.GetOrders")),
            "DROP PROCEDURE [dbo].[GetOrders]"
        );
    }
}
