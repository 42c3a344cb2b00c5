//! Delete scenarios: cascades, detaching and undeletable rows.

use std::sync::Arc;

use duality_schema::{Column, ColumnType, Table};
use duality_tests::prelude::*;
use pretty_assertions::assert_eq;

const LOCK: &str = "FOR UPDATE NOWAIT";

fn customer_key() -> PrimaryKeyColumnValues {
    PrimaryKeyColumnValues::new().with("id", 7i64)
}

fn stored_customer() -> Reply {
    Reply::document(&json!({"id": 7, "name": "Ada"}), &["7"])
}

fn lines(delete: bool, update: bool) -> Arc<Table> {
    Arc::new(
        Table::new("shop", "order_line")
            .column("id", Column::new("id", ColumnType::Integer).primary())
            .column("orderId", Column::new("order_id", ColumnType::Integer))
            .with_delete(delete)
            .with_update(update),
    )
}

#[test]
fn test_cascade_deletes_owned_rows_deepest_first() {
    // GIVEN
    let customer = fixtures::customer();
    let mut db = ScriptedSession::new().on(LOCK, stored_customer());

    // WHEN
    DualitySession::new(&mut db, SessionConfig::new(), RowOwnership::disabled())
        .delete(&customer, &customer_key())
        .unwrap();

    // THEN the referenced country is left alone
    assert_eq!(
        db.writes(),
        vec![
            "DELETE FROM `shop`.`address` WHERE `customer_id` = 7",
            "DELETE FROM `shop`.`order_line` WHERE (`order_id`) IN \
             (SELECT `id` FROM `shop`.`orders` WHERE `customer_id` = 7)",
            "DELETE FROM `shop`.`orders` WHERE `customer_id` = 7",
            "DELETE FROM `shop`.`customer` WHERE `id` = 7",
        ]
    );
    assert_eq!(db.statements().last().map(String::as_str), Some("COMMIT"));
}

#[test]
fn test_update_only_rows_are_detached() {
    // GIVEN
    let customer = fixtures::customer_with(fixtures::orders_with(lines(false, true)));
    let mut db = ScriptedSession::new().on(LOCK, stored_customer());

    // WHEN
    DualitySession::new(&mut db, SessionConfig::new(), RowOwnership::disabled())
        .delete(&customer, &customer_key())
        .unwrap();

    // THEN
    assert_eq!(
        db.writes()[1],
        "UPDATE `shop`.`order_line` SET `order_id` = NULL WHERE (`order_id`) IN \
         (SELECT `id` FROM `shop`.`orders` WHERE `customer_id` = 7)"
    );
    assert_eq!(db.writes().len(), 4);
}

#[test]
fn test_foreign_key_violation_on_undeletable_rows() {
    // GIVEN order lines may be neither deleted nor detached
    let customer = fixtures::customer_with(fixtures::orders_with(lines(false, false)));
    let mut db = ScriptedSession::new()
        .on(LOCK, stored_customer())
        .on(
            "DELETE FROM `shop`.`orders`",
            Reply::Error(SqlError::new(1451, "23000", "Cannot delete or update a parent row")),
        );

    // WHEN
    let err = DualitySession::new(&mut db, SessionConfig::new(), RowOwnership::disabled())
        .delete(&customer, &customer_key())
        .unwrap_err();

    // THEN
    assert!(matches!(
        err,
        SessionError::Mutation(MutationError::NoDelete { ref table }) if table == "shop.order_line"
    ));
    assert_eq!(err.kind(), ErrorKind::Policy);
    assert_eq!(db.statements().last().map(String::as_str), Some("ROLLBACK"));
}

#[test]
fn test_other_database_errors_pass_through() {
    let customer = fixtures::customer();
    let mut db = ScriptedSession::new()
        .on(LOCK, stored_customer())
        .on("DELETE FROM `shop`.`address`", Reply::Error(SqlError::new(1205, "HY000", "Lock wait timeout")));

    let err = DualitySession::new(&mut db, SessionConfig::new(), RowOwnership::disabled())
        .delete(&customer, &customer_key())
        .unwrap_err();

    assert!(matches!(err, SessionError::Mutation(MutationError::Sql(ref e)) if e.code == 1205));
    assert_eq!(err.kind(), ErrorKind::Database);
}

#[test]
fn test_missing_row() {
    let customer = fixtures::customer();
    let mut db = ScriptedSession::new();

    let err = DualitySession::new(&mut db, SessionConfig::new(), RowOwnership::disabled())
        .delete(&customer, &customer_key())
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert!(db.writes().is_empty());
}

mod filtered {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_delete_where_links_children_by_subquery() {
        // GIVEN
        let orders = fixtures::orders();
        let mut db = ScriptedSession::new();

        // WHEN
        DualitySession::new(&mut db, SessionConfig::new(), RowOwnership::disabled())
            .delete_where(&orders, SqlString::new("`note` = ?").value("old"))
            .unwrap();

        // THEN
        assert_eq!(
            db.writes(),
            vec![
                "DELETE FROM `shop`.`order_line` WHERE (`order_id`) IN \
                 (SELECT `id` FROM `shop`.`orders` WHERE `note` = 'old')",
                "DELETE FROM `shop`.`orders` WHERE `note` = 'old'",
            ]
        );
    }

    #[test]
    fn test_owner_predicate_is_always_added() {
        // GIVEN
        let note = fixtures::note();
        let filter = || SqlString::new("`text` = ?").value("x");
        let mut owned = ScriptedSession::new();
        let mut anonymous = ScriptedSession::new();

        // WHEN
        DualitySession::new(&mut owned, SessionConfig::new(), RowOwnership::new(Some(SqlValue::Int(9))))
            .delete_where(&note, filter())
            .unwrap();
        DualitySession::new(&mut anonymous, SessionConfig::new(), RowOwnership::new(None))
            .delete_where(&note, filter())
            .unwrap();

        // THEN a missing user id matches unowned rows only
        assert_eq!(
            owned.writes(),
            vec!["DELETE FROM `shop`.`note` WHERE (`text` = 'x') AND (`owner_id` = 9)"]
        );
        assert_eq!(
            anonymous.writes(),
            vec!["DELETE FROM `shop`.`note` WHERE (`text` = 'x') AND (`owner_id` IS NULL)"]
        );
    }

    #[test]
    fn test_hierarchy_and_group_ownership_restrict_deletes() {
        // GIVEN a principal with reports and group memberships
        let note = Table::new("shop", "note")
            .column("id", Column::new("id", ColumnType::Integer).primary())
            .column("owner", Column::new("owner_id", ColumnType::Integer).row_owner())
            .column("groupId", Column::new("group_id", ColumnType::Integer))
            .column("text", Column::new("text", ColumnType::String));
        let principal = RowOwnership::new(Some(SqlValue::Int(9)))
            .with_user_hierarchy()
            .with_group(GroupOwnership::new("group_id", 2i64));
        let mut db = ScriptedSession::new();

        // WHEN
        DualitySession::new(&mut db, SessionConfig::new(), principal)
            .delete_where(&note, SqlString::new("`text` = ?").value("x"))
            .unwrap();

        // THEN
        let writes = db.writes();
        assert_eq!(writes.len(), 1);
        assert!(writes[0].starts_with("DELETE FROM `shop`.`note` WHERE (`text` = 'x') AND ("));
        assert!(writes[0].contains("`owner_id` IN (WITH RECURSIVE `usr` (`id`) AS (SELECT 9"));
        assert!(writes[0].contains("`owner_id` IS NULL AND"));
        assert!(writes[0].contains("`group_id` IN (WITH RECURSIVE `grp`"));
    }
}
