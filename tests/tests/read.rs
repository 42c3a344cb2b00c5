//! Read scenarios: etags, field filters, links and row ownership.

use duality_tests::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::Value;

const READ: &str = "SELECT JSON_OBJECT";

fn stored_customer() -> Value {
    json!({
        "id": 7,
        "name": "Ada",
        "email": "ada@example.com",
        "country": {"id": 51, "name": "Peru"},
        "address": {"customerId": 7, "street": "Main", "city": "Lima"},
        "orders": [{"id": 100, "customerId": 7, "note": "rush", "updatedAt": "2024-01-01", "lines": []}]
    })
}

fn key() -> PrimaryKeyColumnValues {
    PrimaryKeyColumnValues::new().with("id", 7i64)
}

mod documents {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_etag_covers_fields_removed_by_filter() {
        // GIVEN
        let customer = fixtures::customer();
        let filter = ObjectFieldFilter::from_paths(&["!orders.note"]).unwrap();
        let mut db = ScriptedSession::new().on(READ, Reply::document(&stored_customer(), &["7"]));

        // WHEN
        let doc = DualitySession::new(&mut db, SessionConfig::new(), RowOwnership::disabled())
            .with_field_filter(filter)
            .get(&customer, &key())
            .unwrap()
            .unwrap();

        // THEN
        assert_eq!(doc.primary_key, key());
        assert_eq!(doc.value["orders"][0].get("note"), None);
        assert_eq!(doc.value["orders"][0]["id"], json!(100));
        assert_eq!(
            extract_etag(&doc.value),
            Some(compute_checksum(&customer, &stored_customer()).as_str())
        );
    }

    #[test]
    fn test_self_link() {
        // GIVEN
        let customer = fixtures::customer();
        let config = SessionConfig::new()
            .with_etag(false)
            .with_links_base_url("/shop/customer/");
        let mut db = ScriptedSession::new().on(READ, Reply::document(&stored_customer(), &["7"]));

        // WHEN
        let doc = DualitySession::new(&mut db, config, RowOwnership::disabled())
            .get(&customer, &key())
            .unwrap()
            .unwrap();

        // THEN
        assert_eq!(doc.value["links"], json!([{"rel": "self", "href": "/shop/customer/7"}]));
        assert_eq!(doc.value.get("_metadata"), None);
    }

    #[test]
    fn test_missing_row_reads_as_none() {
        let customer = fixtures::customer();
        let mut db = ScriptedSession::new();

        let doc = DualitySession::new(&mut db, SessionConfig::new(), RowOwnership::disabled())
            .get(&customer, &key())
            .unwrap();

        assert_eq!(doc, None);
    }

    #[test]
    fn test_list_window() {
        // GIVEN
        let customer = fixtures::customer();
        let mut limited = ScriptedSession::new();
        let mut unlimited = ScriptedSession::new();

        // WHEN
        DualitySession::new(&mut limited, SessionConfig::new(), RowOwnership::disabled())
            .list(&customer, None, 50)
            .unwrap();
        DualitySession::new(&mut unlimited, SessionConfig::new().with_read_limit(None), RowOwnership::disabled())
            .list(&customer, None, 50)
            .unwrap();

        // THEN
        assert!(limited.statements()[0].ends_with("LIMIT 25 OFFSET 50"));
        assert!(!unlimited.statements()[0].contains("LIMIT 25"));
    }
}

mod ownership {
    use super::*;

    #[test]
    fn test_reads_are_restricted_to_the_owner() {
        // GIVEN
        let note = fixtures::note();
        let mut owned = ScriptedSession::new();
        let mut anonymous = ScriptedSession::new();
        let filter = || Some(SqlString::new("`t0`.`text` LIKE ?").value("a%"));

        // WHEN
        DualitySession::new(&mut owned, SessionConfig::new(), RowOwnership::new(Some(SqlValue::Int(9))))
            .list(&note, filter(), 0)
            .unwrap();
        DualitySession::new(&mut anonymous, SessionConfig::new(), RowOwnership::new(None))
            .list(&note, filter(), 0)
            .unwrap();

        // THEN the caller filter never replaces the owner predicate
        assert!(owned.statements()[0].contains("WHERE (`t0`.`text` LIKE 'a%') AND (`t0`.`owner_id` = 9)"));
        assert!(anonymous.statements()[0].contains("WHERE (`t0`.`text` LIKE 'a%') AND (`t0`.`owner_id` IS NULL)"));
    }
}

mod filters {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_exclusive_filter() {
        let filter = ObjectFieldFilter::from_paths(&["!orders.note"]).unwrap();

        assert!(!filter.is_path_included("orders.note"));
        assert!(filter.is_path_included("orders"));
        assert!(filter.is_path_included("orders.id"));
        assert!(filter.is_path_included("name"));
    }

    #[test]
    fn test_inclusive_filter() {
        let filter = ObjectFieldFilter::from_paths(&["orders.note"]).unwrap();

        assert!(filter.is_path_included("orders"));
        assert!(filter.is_path_included("orders.note"));
        assert!(!filter.is_path_included("orders.id"));
        assert!(!filter.is_path_included("name"));
    }

    #[test]
    fn test_mixed_filter_is_an_input_error() {
        let err = ObjectFieldFilter::from_paths(&["name", "!email"]).unwrap_err();

        assert_eq!(SessionError::from(err).kind(), ErrorKind::Input);
    }
}

mod checksums {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_checksum_tracks_checked_fields_only() {
        // GIVEN
        let customer = fixtures::customer();
        let doc = stored_customer();
        let mut renamed = doc.clone();
        renamed["orders"][0]["note"] = json!("slow");
        let mut touched = doc.clone();
        touched["orders"][0]["updatedAt"] = json!("2025-01-01");

        // WHEN
        let checksum = compute_checksum(&customer, &doc);

        // THEN
        assert_eq!(checksum, compute_checksum(&customer, &doc));
        assert_ne!(checksum, compute_checksum(&customer, &renamed));
        assert_eq!(checksum, compute_checksum(&customer, &touched));
        assert_eq!(checksum.len(), 64);
    }
}
