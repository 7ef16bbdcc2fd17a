mod common;
use common::*;

use proptest::prelude::*;

#[test]
fn objects_can_be_spread_across_nested_files() {
    let dir = script_folder(&[
        (
            "tables/customers.sql",
            "CREATE TABLE dbo.Customers ([Id] int NOT NULL, CONSTRAINT [PK_Customers] PRIMARY KEY ([Id]))",
        ),
        (
            "tables/orders.sql",
            "CREATE TABLE dbo.Orders (\n\
                 [Id] int NOT NULL,\n\
                 [CustomerId] int NOT NULL,\n\
                 CONSTRAINT [FK_Orders_Customers] FOREIGN KEY ([CustomerId]) REFERENCES dbo.Customers ([Id])\n)",
        ),
        (
            "views/open_orders.sql",
            "CREATE VIEW dbo.OpenOrders AS SELECT Id FROM dbo.Orders",
        ),
    ]);
    let model = load_folder(dir.path()).unwrap();
    assert_eq!(model.len(), 3);
    assert!(model.contains(&ObjectId::new(ObjectType::View, "dbo.OpenOrders")));
}

#[test]
fn duplicate_definition_across_files_fails_with_the_second_file() {
    let dir = script_folder(&[
        ("a.sql", "CREATE TABLE dbo.Orders ([Id] int NOT NULL)"),
        ("b.sql", "CREATE TABLE dbo.Orders ([Id] int NOT NULL)"),
    ]);
    match load_folder(dir.path()) {
        Err(SyncError::Parse { file, object, .. }) => {
            assert!(file.ends_with("b.sql"));
            assert_eq!(object, Some(ObjectId::new(ObjectType::Table, "dbo.Orders")));
        }
        other => panic!("expected Parse error, got {other:?}"),
    }
}

#[test]
fn missing_folder_is_source_unreadable() {
    let err = load_folder(std::path::Path::new("/nonexistent/schema")).unwrap_err();
    assert!(matches!(err, SyncError::SourceUnreadable { .. }));
}

#[test]
fn empty_folder_against_empty_target_is_no_changes() {
    let dir = script_folder(&[]);
    let source = load_folder(dir.path()).unwrap();
    let target = SchemaModel::new();
    let diffs = apply_policy(compare(&source, &target), &FilterPolicy::default());
    assert!(matches!(
        plan(&diffs, &source, &target),
        Err(SyncError::NoChanges)
    ));
}

// Round trip: for a create-only plan, parsing the emitted script back in
// must reproduce the source schema exactly.
#[test]
fn emitted_script_reproduces_the_source_schema() {
    let source_sql = "CREATE TABLE [dbo].[Customers] (\n\
             [Id] int IDENTITY(1,1) NOT NULL,\n\
             [Name] nvarchar(200) NOT NULL,\n\
             CONSTRAINT [PK_Customers] PRIMARY KEY ([Id])\n)\nGO\n\
         CREATE TABLE [dbo].[Orders] (\n\
             [Id] int IDENTITY(1,1) NOT NULL,\n\
             [CustomerId] int NOT NULL,\n\
             [Total] decimal(18,2) NULL DEFAULT (0),\n\
             CONSTRAINT [PK_Orders] PRIMARY KEY ([Id]),\n\
             CONSTRAINT [FK_Orders_Customers] FOREIGN KEY ([CustomerId]) REFERENCES [dbo].[Customers] ([Id])\n)\nGO\n\
         CREATE UNIQUE NONCLUSTERED INDEX [IX_Orders_CustomerId] ON [dbo].[Orders] ([CustomerId])\nGO\n\
         CREATE VIEW [dbo].[OpenOrders] AS SELECT Id FROM [dbo].[Orders]";
    let source = model_from_sql(source_sql);

    let script = plan_between(source_sql, "").unwrap();
    let emitted = render_script(&script);
    let round_tripped = model_from_sql(&emitted);

    let diffs = compare(&round_tripped, &source);
    assert!(
        diffs.iter().all(|d| d.kind == DifferenceKind::Equal),
        "round-tripped schema drifted: {:?}",
        diffs
            .iter()
            .filter(|d| d.kind != DifferenceKind::Equal)
            .map(|d| &d.name)
            .collect::<Vec<_>>()
    );
}

proptest! {
    #[test]
    fn planning_is_deterministic_for_any_table_set(
        names in prop::collection::btree_set("[A-Z][a-z]{2,8}", 1..8)
    ) {
        let sql = names
            .iter()
            .map(|n| format!("CREATE TABLE dbo.{n} ([Id] int NOT NULL)"))
            .collect::<Vec<_>>()
            .join("\nGO\n");
        let first = plan_between(&sql, "").unwrap();
        let second = plan_between(&sql, "").unwrap();
        prop_assert_eq!(op_names(&first), op_names(&second));

        let mut sorted = op_names(&first);
        sorted.sort();
        prop_assert_eq!(op_names(&first), sorted);
    }
}
