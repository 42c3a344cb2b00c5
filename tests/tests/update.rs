//! Update scenarios: array diffing, etags, immutable values and row
//! ownership.

use std::sync::Arc;

use duality_schema::{Column, ColumnType, Field, ForeignKeyReference, Table};
use duality_tests::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::Value;

const LOCK: &str = "FOR UPDATE NOWAIT";

fn order_key() -> PrimaryKeyColumnValues {
    PrimaryKeyColumnValues::new().with("id", 7i64)
}

fn line(id: i64, product: &str) -> Value {
    json!({"id": id, "orderId": 7, "product": product, "quantity": 1})
}

fn order(lines: Vec<Value>) -> Value {
    json!({"id": 7, "customerId": 1, "note": "n", "lines": lines})
}

mod array_diff {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_removed_matched_and_new_elements() {
        // GIVEN stored lines 2, 3, 4 and submitted lines 1, 2, 3
        let orders = fixtures::orders();
        let current = order(vec![line(2, "b"), line(3, "x"), line(4, "d")]);
        let doc = order(vec![line(1, "a"), line(2, "b"), line(3, "c")]);
        let mut db = ScriptedSession::new().on(LOCK, Reply::document(&current, &["7"]));

        // WHEN
        DualitySession::new(&mut db, SessionConfig::new(), RowOwnership::disabled())
            .update(&orders, &order_key(), &doc)
            .unwrap();

        // THEN 4 is deleted, 1 inserted, 2 and 3 updated
        assert_eq!(
            db.writes(),
            vec![
                "DELETE FROM `shop`.`order_line` WHERE `id` = 4",
                "UPDATE `shop`.`orders` SET `customer_id` = 1, `note` = 'n' WHERE `id` = 7",
                "INSERT INTO `shop`.`order_line` (`order_id`, `id`, `product`, `quantity`) VALUES (7, 1, 'a', 1) \
                 AS `new` ON DUPLICATE KEY UPDATE `order_id` = `new`.`order_id`, `product` = `new`.`product`, \
                 `quantity` = `new`.`quantity`",
                "UPDATE `shop`.`order_line` SET `order_id` = 7, `product` = 'b', `quantity` = 1 WHERE `id` = 2",
                "UPDATE `shop`.`order_line` SET `order_id` = 7, `product` = 'c', `quantity` = 1 WHERE `id` = 3",
            ]
        );
        assert_eq!(db.statements().last().map(String::as_str), Some("COMMIT"));
    }

    #[test]
    fn test_new_element_linked_to_another_order_is_rejected() {
        // GIVEN line 1 exists but belongs to a different order
        let orders = fixtures::orders();
        let current = order(vec![]);
        let mut db = ScriptedSession::new()
            .on(LOCK, Reply::document(&current, &["7"]))
            .on("SELECT `order_id` = 7 FROM `shop`.`order_line`", Reply::row(&["0"]));

        // WHEN
        let err = DualitySession::new(&mut db, SessionConfig::new(), RowOwnership::disabled())
            .update(&orders, &order_key(), &order(vec![line(1, "stolen")]))
            .unwrap_err();

        // THEN the line is neither moved nor overwritten
        assert_eq!(err.kind(), ErrorKind::Policy);
        assert!(matches!(
            err,
            SessionError::Mutation(MutationError::RowNotAccessible { ref table }) if table == "shop.order_line"
        ));
        assert_eq!(db.count("INSERT INTO"), 0);
        assert_eq!(db.statements().last().map(String::as_str), Some("ROLLBACK"));
    }

    #[test]
    fn test_unlisted_elements_are_detached_when_delete_is_not_allowed() {
        // GIVEN lines may be updated but not deleted, and no stored view is known
        let lines = Arc::new(
            Table::new("shop", "order_line")
                .column("id", Column::new("id", ColumnType::Integer).primary())
                .column("orderId", Column::new("order_id", ColumnType::Integer))
                .column("product", Column::new("product", ColumnType::String))
                .column("quantity", Column::new("quantity", ColumnType::Integer))
                .with_delete(false),
        );
        let orders = fixtures::orders_with(lines);
        let mut db = ScriptedSession::new();

        // WHEN
        let mut tree = Planner::default()
            .plan_update(&orders, &order_key(), &order(vec![line(2, "b")]), None, false)
            .unwrap();
        tree.run(&mut ExecContext::new(&mut db, &SequenceUuid::new())).unwrap();

        // THEN every other line of the order loses its parent instead of being deleted
        assert_eq!(
            db.writes()[0],
            "UPDATE `shop`.`order_line` SET `order_id` = NULL WHERE (`order_id` = 7) AND (NOT ((`id`) IN ((2))))"
        );
        assert_eq!(db.count("DELETE"), 0);
    }

    #[test]
    fn test_removed_element_without_delete_or_update() {
        // GIVEN
        let lines = Arc::new(
            Table::new("shop", "order_line")
                .column("id", Column::new("id", ColumnType::Integer).primary())
                .column("orderId", Column::new("order_id", ColumnType::Integer))
                .column("product", Column::new("product", ColumnType::String))
                .column("quantity", Column::new("quantity", ColumnType::Integer))
                .with_delete(false)
                .with_update(false),
        );
        let orders = fixtures::orders_with(lines);
        let current = order(vec![line(2, "b")]);
        let mut db = ScriptedSession::new().on(LOCK, Reply::document(&current, &["7"]));

        // WHEN
        let result = DualitySession::new(&mut db, SessionConfig::new(), RowOwnership::disabled())
            .update(&orders, &order_key(), &order(vec![]));

        // THEN nothing was written
        assert!(matches!(
            result,
            Err(SessionError::Mutation(MutationError::NoDelete { ref table })) if table == "shop.order_line"
        ));
        assert!(db.writes().is_empty());
        assert_eq!(db.statements().last().map(String::as_str), Some("ROLLBACK"));
    }

    #[test]
    fn test_changed_element_of_immutable_table() {
        // GIVEN
        let lines = Arc::new(
            Table::new("shop", "order_line")
                .column("id", Column::new("id", ColumnType::Integer).primary())
                .column("orderId", Column::new("order_id", ColumnType::Integer))
                .column("product", Column::new("product", ColumnType::String))
                .column("quantity", Column::new("quantity", ColumnType::Integer))
                .with_update(false),
        );
        let orders = fixtures::orders_with(lines);
        let current = order(vec![line(2, "b")]);
        let mut db = ScriptedSession::new()
            .on(LOCK, Reply::document(&current, &["7"]))
            .on("<=>", Reply::row(&["0"]));

        // WHEN
        let result = DualitySession::new(&mut db, SessionConfig::new(), RowOwnership::disabled())
            .update(&orders, &order_key(), &order(vec![line(2, "x")]));

        // THEN
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Policy);
        assert!(matches!(err, SessionError::Mutation(MutationError::ImmutableField { .. })));
        assert_eq!(db.count("<=>"), 1);
        assert_eq!(db.statements().last().map(String::as_str), Some("ROLLBACK"));
    }
}

mod etags {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_matching_etag_is_accepted() {
        // GIVEN
        let orders = fixtures::orders();
        let current = order(vec![line(2, "b")]);
        let mut doc = order(vec![line(2, "c")]);
        doc["_metadata"] = json!({"etag": compute_checksum(&orders, &current)});
        let mut db = ScriptedSession::new().on(LOCK, Reply::document(&current, &["7"]));

        // WHEN
        let result = DualitySession::new(&mut db, SessionConfig::new(), RowOwnership::disabled())
            .update(&orders, &order_key(), &doc);

        // THEN
        assert!(result.is_ok());
        assert_eq!(db.statements().last().map(String::as_str), Some("COMMIT"));
    }

    #[test]
    fn test_concurrent_change_fails_precondition() {
        // GIVEN the client read the order before line 2 changed
        let orders = fixtures::orders();
        let read = order(vec![line(2, "b")]);
        let current = order(vec![line(2, "changed elsewhere")]);
        let mut doc = order(vec![line(2, "c")]);
        doc["_metadata"] = json!({"etag": compute_checksum(&orders, &read)});
        let mut db = ScriptedSession::new().on(LOCK, Reply::document(&current, &["7"]));

        // WHEN
        let err = DualitySession::new(&mut db, SessionConfig::new(), RowOwnership::disabled())
            .update(&orders, &order_key(), &doc)
            .unwrap_err();

        // THEN
        assert_eq!(err.kind(), ErrorKind::Precondition);
        assert!(matches!(err, SessionError::PreconditionFailed { .. }));
        assert!(db.writes().is_empty());
    }

    #[test]
    fn test_unchecked_field_does_not_affect_etag() {
        // GIVEN updatedAt is excluded from the checksum
        let orders = fixtures::orders();
        let mut read = order(vec![line(2, "b")]);
        read["updatedAt"] = json!("2024-01-01");
        let mut current = read.clone();
        current["updatedAt"] = json!("2024-06-30");
        let mut doc = order(vec![line(2, "b")]);
        doc["_metadata"] = json!({"etag": compute_checksum(&orders, &read)});
        let mut db = ScriptedSession::new().on(LOCK, Reply::document(&current, &["7"]));

        // WHEN
        let result = DualitySession::new(&mut db, SessionConfig::new(), RowOwnership::disabled())
            .update(&orders, &order_key(), &doc);

        // THEN
        assert!(result.is_ok());
    }
}

mod keys {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_changed_or_omitted_key_is_rejected_before_sql() {
        let orders = fixtures::orders();
        let planner = Planner::default();
        let mut changed = order(vec![]);
        changed["id"] = json!(8);

        let changed = planner.plan_update(&orders, &order_key(), &changed, None, false);
        let omitted = planner.plan_update(&orders, &order_key(), &json!({"note": "n"}), None, false);

        assert!(matches!(changed, Err(MutationError::ImmutableId { .. })));
        assert!(matches!(omitted, Err(MutationError::ImmutableId { .. })));
    }

    #[test]
    fn test_missing_row() {
        // GIVEN
        let orders = fixtures::orders();
        let mut db = ScriptedSession::new();

        // WHEN
        let err = DualitySession::new(&mut db, SessionConfig::new(), RowOwnership::disabled())
            .update(&orders, &order_key(), &order(vec![]))
            .unwrap_err();

        // THEN
        assert!(matches!(err, SessionError::Mutation(MutationError::RowNotFound { .. })));
        assert_eq!(err.kind(), ErrorKind::Precondition);
    }

    #[test]
    fn test_missing_row_is_created_with_upsert() {
        // GIVEN
        let orders = fixtures::orders();
        let mut db = ScriptedSession::new();
        let config = SessionConfig::new().with_upsert_on_update(true);

        // WHEN
        DualitySession::new(&mut db, config, RowOwnership::disabled())
            .update(&orders, &order_key(), &order(vec![line(1, "a")]))
            .unwrap();

        // THEN
        let writes = db.writes();
        assert_eq!(writes.len(), 2);
        assert!(writes[0].starts_with(
            "INSERT INTO `shop`.`orders` (`id`, `customer_id`, `note`) VALUES (7, 1, 'n') \
             AS `new` ON DUPLICATE KEY UPDATE"
        ));
        assert!(writes[1].starts_with("INSERT INTO `shop`.`order_line` (`order_id`, `id`, `product`, `quantity`)"));
    }
}

mod immutable_references {
    use super::*;
    use pretty_assertions::assert_eq;

    fn customer() -> Table {
        let country = Arc::new(
            Table::new("shop", "country")
                .column("id", Column::new("id", ColumnType::Integer).primary())
                .column("name", Column::new("name", ColumnType::String))
                .with_update(false),
        );
        Table::new("shop", "customer")
            .column("id", Column::new("id", ColumnType::Integer).primary())
            .column("name", Column::new("name", ColumnType::String))
            .field(Field::column("countryId", Column::new("country_id", ColumnType::Integer)).disabled())
            .field(
                Field::reference("country", ForeignKeyReference::to_one(country).map("country_id", "id"))
                    .no_check(),
            )
    }

    #[test]
    fn test_unchecked_reference_to_read_only_table_is_ignored() {
        // GIVEN the client renamed the country it cannot update
        let customer = customer();
        let current = json!({"id": 7, "name": "Ada", "country": {"id": 51, "name": "Peru"}});
        let doc = json!({"id": 7, "name": "Ada", "country": {"id": 51, "name": "Renamed"}});
        let mut db = ScriptedSession::new().on(LOCK, Reply::document(&current, &["7"]));

        // WHEN
        DualitySession::new(&mut db, SessionConfig::new(), RowOwnership::disabled())
            .update(&customer, &order_key(), &doc)
            .unwrap();

        // THEN only the customer row is written and the country is left alone
        assert_eq!(
            db.writes(),
            vec!["UPDATE `shop`.`customer` SET `name` = 'Ada', `country_id` = 51 WHERE `id` = 7"]
        );
        assert_eq!(db.count("<=>"), 0);
        assert_eq!(db.statements().last().map(String::as_str), Some("COMMIT"));
    }
}

mod ownership {
    use super::*;
    use pretty_assertions::assert_eq;

    fn memo() -> Table {
        Table::new("shop", "memo")
            .column("id", Column::new("id", ColumnType::Integer).primary())
            .column("owner", Column::new("owner_id", ColumnType::Integer).row_owner())
            .column("groupId", Column::new("group_id", ColumnType::Integer))
            .column("text", Column::new("text", ColumnType::String))
    }

    fn memo_key() -> PrimaryKeyColumnValues {
        PrimaryKeyColumnValues::new().with("id", 1i64)
    }

    fn principal() -> RowOwnership {
        RowOwnership::new(Some(SqlValue::Int(9)))
    }

    #[test]
    fn test_upsert_cannot_take_over_a_foreign_row() {
        // GIVEN memo 1 exists but is owned by someone else, so the lock sees nothing
        let memo = memo();
        let mut db = ScriptedSession::new().on("SELECT `owner_id` = 9 FROM `shop`.`memo`", Reply::row(&["0"]));
        let config = SessionConfig::new().with_upsert_on_update(true);

        // WHEN
        let err = DualitySession::new(&mut db, config, principal())
            .update(&memo, &memo_key(), &json!({"id": 1, "groupId": 2, "text": "hijacked"}))
            .unwrap_err();

        // THEN
        assert_eq!(err.kind(), ErrorKind::Policy);
        assert!(matches!(err, SessionError::Mutation(MutationError::RowNotAccessible { .. })));
        assert!(db.writes().is_empty());
        assert_eq!(
            db.count("SELECT `owner_id` = 9 FROM `shop`.`memo` WHERE `id` = 1 FOR UPDATE"),
            1
        );
        assert_eq!(db.statements().last().map(String::as_str), Some("ROLLBACK"));
    }

    #[test]
    fn test_upsert_creates_missing_owned_row() {
        // GIVEN
        let memo = memo();
        let mut db = ScriptedSession::new();
        let config = SessionConfig::new().with_upsert_on_update(true);

        // WHEN
        DualitySession::new(&mut db, config, principal())
            .update(&memo, &memo_key(), &json!({"id": 1, "groupId": 2, "text": "new"}))
            .unwrap();

        // THEN the owner comes from the principal
        let writes = db.writes();
        assert_eq!(writes.len(), 1);
        assert!(writes[0].starts_with(
            "INSERT INTO `shop`.`memo` (`owner_id`, `id`, `group_id`, `text`) VALUES (9, 1, 2, 'new')"
        ));
        assert_eq!(db.statements().last().map(String::as_str), Some("COMMIT"));
    }

    #[test]
    fn test_hierarchy_and_group_ownership_restrict_updates() {
        // GIVEN managers reach their reports' rows and members their groups' unowned rows
        let memo = memo();
        let current = json!({"id": 1, "groupId": 2, "text": "a"});
        let mut db = ScriptedSession::new().on(LOCK, Reply::document(&current, &["1"]));
        let principal = principal()
            .with_user_hierarchy()
            .with_group(GroupOwnership::new("group_id", 2i64));

        // WHEN
        DualitySession::new(&mut db, SessionConfig::new(), principal)
            .update(&memo, &memo_key(), &json!({"id": 1, "groupId": 2, "text": "b"}))
            .unwrap();

        // THEN
        let writes = db.writes();
        assert_eq!(writes.len(), 1);
        assert!(writes[0].starts_with("UPDATE `shop`.`memo` SET `group_id` = 2, `text` = 'b' WHERE (`id` = 1) AND ("));
        assert!(writes[0].contains("`owner_id` IN (WITH RECURSIVE `usr`"));
        assert!(writes[0].contains("`owner_id` IS NULL AND"));
        assert!(writes[0].contains("`group_id` IN (WITH RECURSIVE `grp`"));
    }
}
