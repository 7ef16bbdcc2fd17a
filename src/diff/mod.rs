pub mod planner;

use std::collections::BTreeSet;

use crate::model::{ObjectId, ObjectType, SchemaModel, SchemaObject};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DifferenceKind {
    OnlySource,
    OnlyTarget,
    Changed,
    Equal,
}

impl DifferenceKind {
    /// Short marker used in the script summary block.
    pub fn marker(&self) -> &'static str {
        match self {
            DifferenceKind::OnlySource => "OnlyInSrc ",
            DifferenceKind::OnlyTarget => "OnlyInDest ",
            DifferenceKind::Changed => "Diff ",
            DifferenceKind::Equal => "EQ ",
        }
    }
}

/// One object's comparison result. `included` starts true for everything
/// except Equal and is only ever rewritten by the filter.
#[derive(Debug, Clone)]
pub struct Difference {
    pub object_type: ObjectType,
    pub name: String,
    pub kind: DifferenceKind,
    pub source: Option<SchemaObject>,
    pub target: Option<SchemaObject>,
    pub included: bool,
}

impl Difference {
    pub fn id(&self) -> ObjectId {
        ObjectId::new(self.object_type, self.name.clone())
    }
}

/// Compares two models object-by-object. Output is ordered by
/// (ObjectType, name) and is reproducible run-to-run for the same inputs.
/// Equal results are kept for reporting but default to excluded.
pub fn compare(source: &SchemaModel, target: &SchemaModel) -> Vec<Difference> {
    let ids: BTreeSet<ObjectId> = source.ids().chain(target.ids()).cloned().collect();

    ids.into_iter()
        .map(|id| {
            let src = source.get(&id).cloned();
            let tgt = target.get(&id).cloned();
            let kind = match (&src, &tgt) {
                (Some(s), Some(t)) => {
                    if s.definition_equals(t) {
                        DifferenceKind::Equal
                    } else {
                        DifferenceKind::Changed
                    }
                }
                (Some(_), None) => DifferenceKind::OnlySource,
                (None, Some(_)) => DifferenceKind::OnlyTarget,
                (None, None) => unreachable!("id came from one of the models"),
            };
            Difference {
                object_type: id.object_type,
                name: id.name,
                kind,
                source: src,
                target: tgt,
                included: kind != DifferenceKind::Equal,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ColumnDef, ObjectDefinition, RoutineDef, TableDef};

    fn table_object(name: &str, columns: Vec<ColumnDef>) -> SchemaObject {
        SchemaObject::new(
            ObjectId::new(ObjectType::Table, name),
            ObjectDefinition::Table(TableDef {
                columns,
                primary_key: vec![],
                foreign_keys: vec![],
            }),
        )
    }

    fn column(name: &str, data_type: &str) -> ColumnDef {
        ColumnDef {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            default: None,
            identity: false,
        }
    }

    fn model_with(objects: Vec<SchemaObject>) -> SchemaModel {
        let mut model = SchemaModel::new();
        for object in objects {
            model.insert(object);
        }
        model.finish();
        model
    }

    #[test]
    fn identical_models_yield_only_equal() {
        let a = model_with(vec![table_object("dbo.Orders", vec![column("Id", "int")])]);
        let b = model_with(vec![table_object("dbo.Orders", vec![column("Id", "int")])]);

        let diffs = compare(&a, &b);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].kind, DifferenceKind::Equal);
        assert!(!diffs[0].included);
    }

    #[test]
    fn source_only_object_is_only_source() {
        let source = model_with(vec![table_object("dbo.Orders", vec![])]);
        let target = model_with(vec![]);

        let diffs = compare(&source, &target);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].kind, DifferenceKind::OnlySource);
        assert!(diffs[0].included);
        assert_eq!(diffs[0].name, "dbo.Orders");
    }

    #[test]
    fn target_only_object_is_only_target() {
        let source = model_with(vec![]);
        let target = model_with(vec![table_object("dbo.Legacy", vec![])]);

        let diffs = compare(&source, &target);
        assert_eq!(diffs[0].kind, DifferenceKind::OnlyTarget);
    }

    #[test]
    fn payload_change_is_detected() {
        let source = model_with(vec![table_object(
            "dbo.Orders",
            vec![column("Id", "int"), column("Total", "decimal(18,2)")],
        )]);
        let target = model_with(vec![table_object("dbo.Orders", vec![column("Id", "int")])]);

        let diffs = compare(&source, &target);
        assert_eq!(diffs[0].kind, DifferenceKind::Changed);
    }

    #[test]
    fn routine_whitespace_change_is_equal() {
        let proc_a = SchemaObject::new(
            ObjectId::new(ObjectType::StoredProcedure, "dbo.GetOrders"),
            ObjectDefinition::Routine(RoutineDef {
                body: "CREATE PROCEDURE dbo.GetOrders AS SELECT 1".into(),
            }),
        );
        let proc_b = SchemaObject::new(
            ObjectId::new(ObjectType::StoredProcedure, "dbo.GetOrders"),
            ObjectDefinition::Routine(RoutineDef {
                body: "CREATE PROCEDURE dbo.GetOrders\nAS\n    SELECT 1".into(),
            }),
        );
        let diffs = compare(&model_with(vec![proc_a]), &model_with(vec![proc_b]));
        assert_eq!(diffs[0].kind, DifferenceKind::Equal);
    }

    #[test]
    fn output_is_ordered_by_type_then_name() {
        let source = model_with(vec![
            table_object("dbo.Zebra", vec![]),
            table_object("dbo.Apple", vec![]),
            SchemaObject::new(
                ObjectId::new(ObjectType::View, "dbo.AView"),
                ObjectDefinition::Routine(RoutineDef {
                    body: "CREATE VIEW dbo.AView AS SELECT 1 AS x".into(),
                }),
            ),
        ]);
        let target = model_with(vec![]);

        let diffs = compare(&source, &target);
        let names: Vec<&str> = diffs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["dbo.Apple", "dbo.Zebra", "dbo.AView"]);
        assert_eq!(diffs[2].object_type, ObjectType::View);
    }
}
