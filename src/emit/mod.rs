//! Pure text rendering: difference summary, script body, and the deploy
//! file name. No I/O happens here.

use chrono::{DateTime, Local};

use crate::diff::planner::SyncScript;

const SUMMARY_RULE: &str = "=============================================";

/// Comment block listing each difference selected for the plan with its
/// state marker, in differ order. Equal and filter-excluded rows are
/// omitted.
pub fn render_summary(script: &SyncScript) -> String {
    let mut out = String::from("/*\nDifferences summary:\n");
    out.push_str(&format!(
        "{}{}\n{}\n",
        pad_right("Object Type", 18),
        "Diff   Object Name",
        SUMMARY_RULE
    ));
    for difference in script.differences.iter().filter(|d| d.included) {
        out.push_str(&pad_right(difference.object_type.display_name(), 18));
        out.push_str(difference.kind.marker());
        out.push_str(&difference.name);
        out.push('\n');
    }
    out.push_str("*/\n");
    out
}

/// The executable script: summary header, then each operation's statement
/// followed by a `GO` batch separator.
pub fn render_script(script: &SyncScript) -> String {
    let mut out = render_summary(script);
    out.push('\n');
    for op in &script.ops {
        out.push_str(&op.statement);
        out.push_str("\nGO\n");
    }
    out
}

/// `{server}_{database}_{yyyyMMdd}_{mmss}SyncScript.sql`, matching the
/// historical deploy naming so existing tooling keeps finding the files.
pub fn script_file_name(server: &str, database: &str, at: DateTime<Local>) -> String {
    format!(
        "{}_{}_{}_{}SyncScript.sql",
        server,
        database,
        at.format("%Y%m%d"),
        at.format("%M%S")
    )
}

fn pad_right(text: &str, width: usize) -> String {
    format!("{text:<width$}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::planner::{ChangeAction, ChangeOp};
    use crate::diff::{Difference, DifferenceKind};
    use crate::model::{ObjectId, ObjectType};
    use chrono::TimeZone;

    fn difference(object_type: ObjectType, name: &str, kind: DifferenceKind) -> Difference {
        Difference {
            object_type,
            name: name.into(),
            kind,
            source: None,
            target: None,
            included: kind != DifferenceKind::Equal,
        }
    }

    fn script() -> SyncScript {
        let mut excluded = difference(
            ObjectType::StoredProcedure,
            "dbo.aspnet_sql_refresh",
            DifferenceKind::OnlyTarget,
        );
        excluded.included = false;
        SyncScript {
            differences: vec![
                difference(ObjectType::Table, "dbo.Orders", DifferenceKind::OnlySource),
                difference(ObjectType::Table, "dbo.Legacy", DifferenceKind::OnlyTarget),
                difference(ObjectType::Table, "dbo.Shared", DifferenceKind::Equal),
                difference(
                    ObjectType::StoredProcedure,
                    "dbo.GetOrders",
                    DifferenceKind::Changed,
                ),
                excluded,
            ],
            ops: vec![ChangeOp {
                action: ChangeAction::Create,
                object: ObjectId::new(ObjectType::Table, "dbo.Orders"),
                statement: "CREATE TABLE [dbo].[Orders] (\n    [Id] int NOT NULL\n)".into(),
                depends_on: vec![],
            }],
        }
    }

    #[test]
    fn summary_lists_only_planned_differences() {
        let text = render_summary(&script());
        assert!(text.starts_with("/*\nDifferences summary:\n"));
        assert!(text.contains("Table             OnlyInSrc dbo.Orders\n"));
        assert!(text.contains("Table             OnlyInDest dbo.Legacy\n"));
        assert!(text.contains("StoredProcedure   Diff dbo.GetOrders\n"));
        assert!(!text.contains("dbo.Shared"));
        assert!(!text.contains("dbo.aspnet_sql_refresh"));
        assert!(text.ends_with("*/\n"));
    }

    #[test]
    fn script_follows_each_op_with_go() {
        let text = render_script(&script());
        assert!(text.contains("CREATE TABLE [dbo].[Orders] (\n    [Id] int NOT NULL\n)\nGO\n"));
    }

    #[test]
    fn file_name_encodes_server_database_and_timestamp() {
        let at = Local.with_ymd_and_hms(2024, 3, 7, 14, 25, 9).unwrap();
        assert_eq!(
            script_file_name("sql01", "Northwind", at),
            "sql01_Northwind_20240307_2509SyncScript.sql"
        );
    }
}
