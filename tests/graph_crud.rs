//! Integration tests for create, update, delete and query
//!
//! These run against an in-memory SQLite database and check both results
//! and the statements sent to the driver.

mod common;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;

use common::{CARD, GROUP, PET, USER, group, int_ids, pet, setup, setup_without_transactions, user};
use entgraph::error::MutationStep;
use entgraph::sql::Aggregate;
use entgraph::{EntError, Id, Order, Predicate, Value};

// ============================================================================
// Create
// ============================================================================

mod create {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_save_applies_defaults() {
        let (client, _) = setup().await;
        let node = client
            .create(&USER)
            .set("name", "alice")
            .set("age", 30)
            .save()
            .await
            .unwrap();

        assert_eq!(node.label(), "User");
        assert_eq!(node.get::<String>("name").unwrap(), "alice");
        assert_eq!(node.get::<i64>("age").unwrap(), 30);
        assert_eq!(node.get::<Option<String>>("nickname").unwrap(), None);
        assert!(node.get::<chrono::DateTime<chrono::Utc>>("created_at").is_ok());
    }

    #[tokio::test]
    async fn test_source_key_is_inlined() {
        let (client, driver) = setup().await;
        let owner = user(&client, "alice", 30).await;
        driver.reset();

        pet(&client, "rex", Some(&owner)).await;
        assert_eq!(
            driver.statements(),
            vec!["INSERT INTO \"pets\" (\"name\", \"owner_id\") VALUES (?, ?)".to_string()]
        );
    }

    #[tokio::test]
    async fn test_target_edges_run_after_insert_in_transaction() {
        let (client, driver) = setup().await;
        let rex = pet(&client, "rex", None).await;
        let fido = pet(&client, "fido", None).await;
        driver.reset();

        let owner = client
            .create(&USER)
            .set("name", "bob")
            .set("age", 40)
            .add_edge("pets", [rex.clone(), fido.clone()])
            .exec()
            .await
            .unwrap();

        let statements = driver.statements();
        assert_eq!(statements.len(), 3);
        assert!(statements[0].starts_with("INSERT INTO \"users\""));
        assert!(statements[1].starts_with("UPDATE \"pets\" SET \"owner_id\" = ?"));
        assert_eq!(statements[2], "COMMIT");

        let owned = client
            .query(&PET)
            .filter(Predicate::eq("owner_id", &owner))
            .ids()
            .await
            .unwrap();
        assert_eq!(owned, vec![rex, fido]);
    }

    #[tokio::test]
    async fn test_to_one_edge_rejects_multiple_targets_before_sql() {
        let (client, driver) = setup().await;
        let a = user(&client, "a", 1).await;
        let b = user(&client, "b", 2).await;
        driver.reset();

        let err = client
            .create(&PET)
            .set("name", "rex")
            .add_edge("owner", [a, b])
            .exec()
            .await
            .unwrap_err();
        assert_matches!(err, EntError::EdgeCardinality { edge, .. } if edge == "owner");
        assert!(driver.statements().is_empty());
    }

    #[tokio::test]
    async fn test_validator_runs_before_sql() {
        let (client, driver) = setup().await;
        let err = client
            .create(&USER)
            .set("name", "  ")
            .set("age", 1)
            .exec()
            .await
            .unwrap_err();
        assert_matches!(err, EntError::Validation { column, .. } if column == "name");
        assert!(driver.statements().is_empty());
    }

    #[tokio::test]
    async fn test_unique_violation_is_typed() {
        let (client, _) = setup().await;
        user(&client, "alice", 30).await;
        let err = client
            .create(&USER)
            .set("name", "alice")
            .set("age", 31)
            .exec()
            .await
            .unwrap_err();
        assert!(err.is_constraint(), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn test_uuid_ids_and_required_edge() {
        let (client, _) = setup().await;
        let owner = user(&client, "alice", 30).await;

        let err = client.create(&CARD).set("number", "1").exec().await.unwrap_err();
        assert_matches!(err, EntError::EdgeCardinality { edge, .. } if edge == "owner");

        let card = client
            .create(&CARD)
            .set("number", "1")
            .add_edge("owner", [owner.clone()])
            .save()
            .await
            .unwrap();
        assert_matches!(card.id(), Id::Str(s) if s.len() == 36);
        let holder = client
            .query(&CARD)
            .where_id(card.id().clone())
            .query_edge("owner")
            .unwrap()
            .only_id()
            .await
            .unwrap();
        assert_eq!(holder, owner);

        // cards.owner_id is unique
        let err = client
            .create(&CARD)
            .set("number", "2")
            .add_edge("owner", [owner])
            .exec()
            .await
            .unwrap_err();
        assert!(err.is_constraint());
    }

    #[tokio::test]
    async fn test_partial_failure_without_transaction() {
        let (client, _) = setup_without_transactions().await;
        let err = client
            .create(&USER)
            .set("name", "alice")
            .set("age", 30)
            .add_edge("groups", [Id::Int(999)])
            .exec()
            .await
            .unwrap_err();

        assert_matches!(
            &err,
            EntError::Partial {
                step: MutationStep::AddEdges,
                ..
            }
        );
        assert!(err.is_constraint());
        // The insert itself landed.
        assert_eq!(client.query(&USER).count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failure_in_transaction_rolls_back() {
        let (client, driver) = setup().await;
        let err = client
            .create(&USER)
            .set("name", "alice")
            .set("age", 30)
            .add_edge("groups", [Id::Int(999)])
            .exec()
            .await
            .unwrap_err();

        assert_matches!(err, EntError::ConstraintViolation { .. });
        assert_eq!(driver.statements().last().map(String::as_str), Some("ROLLBACK"));
        assert_eq!(client.query(&USER).count().await.unwrap(), 0);
    }
}

// ============================================================================
// Update
// ============================================================================

mod update {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_update_one_returns_refreshed_node() {
        let (client, _) = setup().await;
        let id = user(&client, "alice", 30).await;
        let before = client.get(&USER, id.clone()).await.unwrap();

        let after = client
            .update_one(&USER, id)
            .set("nickname", "al")
            .add("age", 2)
            .save()
            .await
            .unwrap();

        assert_eq!(after.get::<String>("nickname").unwrap(), "al");
        assert_eq!(after.get::<i64>("age").unwrap(), 32);
        let created: chrono::DateTime<chrono::Utc> = before.get("updated_at").unwrap();
        let updated: chrono::DateTime<chrono::Utc> = after.get("updated_at").unwrap();
        assert!(updated >= created);
    }

    #[tokio::test]
    async fn test_bulk_update_counts_matches() {
        let (client, _) = setup().await;
        user(&client, "a", 10).await;
        user(&client, "b", 20).await;
        user(&client, "c", 30).await;

        let matched = client
            .update(&USER)
            .filter(Predicate::gte("age", 20))
            .add("age", 1)
            .exec()
            .await
            .unwrap();
        assert_eq!(matched, 2);

        let ages = client
            .query(&USER)
            .order(Order::asc("id"))
            .select(["age"])
            .ints()
            .await
            .unwrap();
        assert_eq!(ages, vec![10, 21, 31]);
    }

    #[tokio::test]
    async fn test_clear_field() {
        let (client, _) = setup().await;
        let id = client
            .create(&USER)
            .set("name", "a")
            .set("age", 1)
            .set("nickname", "x")
            .exec()
            .await
            .unwrap();

        let node = client.update_one(&USER, id).clear_field("nickname").save().await.unwrap();
        assert_eq!(node.value("nickname"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_set_and_clear_same_field_is_rejected() {
        let (client, driver) = setup().await;
        let id = user(&client, "a", 1).await;
        driver.reset();

        let err = client
            .update_one(&USER, id)
            .set("nickname", "x")
            .clear_field("nickname")
            .exec()
            .await
            .unwrap_err();
        assert_matches!(err, EntError::Validation { column, .. } if column == "nickname");
        assert!(driver.statements().is_empty());
    }

    #[tokio::test]
    async fn test_clear_and_set_unique_edge_is_rejected() {
        let (client, driver) = setup().await;
        let a = user(&client, "a", 1).await;
        let b = user(&client, "b", 1).await;
        let rex = pet(&client, "rex", Some(&a)).await;
        driver.reset();

        let err = client
            .update_one(&PET, rex)
            .clear_edge("owner")
            .add_edge("owner", [b])
            .exec()
            .await
            .unwrap_err();
        assert_matches!(err, EntError::EdgeCardinality { .. });
        assert!(driver.statements().is_empty());
    }

    #[tokio::test]
    async fn test_clearing_required_edge_is_rejected() {
        let (client, _) = setup().await;
        let owner = user(&client, "a", 1).await;
        let card = client
            .create(&CARD)
            .set("number", "1")
            .add_edge("owner", [owner])
            .exec()
            .await
            .unwrap();

        let err = client.update_one(&CARD, card).clear_edge("owner").exec().await.unwrap_err();
        assert_matches!(err, EntError::EdgeCardinality { reason, .. } if reason.contains("required"));
    }

    #[tokio::test]
    async fn test_missing_node_is_not_found() {
        let (client, _) = setup().await;
        let err = client.update_one(&USER, 42).set("age", 1).exec().await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_reassign_to_one_edge() {
        let (client, _) = setup().await;
        let a = user(&client, "a", 1).await;
        let b = user(&client, "b", 1).await;
        let rex = pet(&client, "rex", Some(&a)).await;

        client.update_one(&PET, rex.clone()).add_edge("owner", [b.clone()]).exec().await.unwrap();
        let owner = client.query(&PET).where_id(rex).query_edge("owner").unwrap().only_id().await;
        assert_eq!(owner.unwrap(), b);
    }

    #[tokio::test]
    async fn test_attach_child_owned_elsewhere_is_constraint_violation() {
        let (client, _) = setup().await;
        let a = user(&client, "a", 1).await;
        let b = user(&client, "b", 1).await;
        let rex = pet(&client, "rex", Some(&a)).await;

        let err = client.update_one(&USER, b).add_edge("pets", [rex]).exec().await.unwrap_err();
        assert_matches!(err, EntError::ConstraintViolation { message } if message.contains("already connected"));
    }

    #[tokio::test]
    async fn test_inverse_o2o_replaces_previous_target() {
        let (client, _) = setup().await;
        let a = user(&client, "a", 1).await;
        let b = user(&client, "b", 1).await;
        let first = client
            .create(&CARD)
            .set("number", "1")
            .add_edge("owner", [a.clone()])
            .exec()
            .await
            .unwrap();
        let second = client
            .create(&CARD)
            .set("number", "2")
            .add_edge("owner", [b.clone()])
            .exec()
            .await
            .unwrap();

        // Still held by `b`.
        let err = client
            .update_one(&USER, a.clone())
            .add_edge("card", [second.clone()])
            .exec()
            .await
            .unwrap_err();
        assert!(err.is_constraint());

        client.update_one(&USER, b).clear_edge("card").exec().await.unwrap();
        client
            .update_one(&USER, a.clone())
            .add_edge("card", [second.clone()])
            .exec()
            .await
            .unwrap();

        let card = client.query(&USER).where_id(a).query_edge("card").unwrap().only_id().await;
        assert_eq!(card.unwrap(), second);
        let released = client.query(&CARD).where_id(first).query_edge("owner").unwrap().exist().await;
        assert!(!released.unwrap());
    }

    #[tokio::test]
    async fn test_bidi_o2o_links_both_sides() {
        let (client, _) = setup().await;
        let a = user(&client, "a", 1).await;
        let b = user(&client, "b", 1).await;
        let c = user(&client, "c", 1).await;

        client.update_one(&USER, a.clone()).add_edge("spouse", [b.clone()]).exec().await.unwrap();
        let spouse_of = |id: Id| {
            let client = client.clone();
            async move {
                client
                    .query(&USER)
                    .where_id(id)
                    .query_edge("spouse")
                    .unwrap()
                    .first_id()
                    .await
                    .unwrap()
            }
        };
        assert_eq!(spouse_of(a.clone()).await, Some(b.clone()));
        assert_eq!(spouse_of(b.clone()).await, Some(a.clone()));

        // Re-pairing `a` with `c` releases `b`.
        client.update_one(&USER, a.clone()).add_edge("spouse", [c.clone()]).exec().await.unwrap();
        assert_eq!(spouse_of(a.clone()).await, Some(c.clone()));
        assert_eq!(spouse_of(c).await, Some(a));
        assert_eq!(spouse_of(b).await, None);
    }

    #[tokio::test]
    async fn test_m2m_add_and_remove() {
        let (client, _) = setup().await;
        let a = user(&client, "a", 1).await;
        let g1 = group(&client, "g1").await;
        let g2 = group(&client, "g2").await;

        client
            .update_one(&USER, a.clone())
            .add_edge("groups", [g1.clone(), g2.clone()])
            .exec()
            .await
            .unwrap();
        client
            .update_one(&USER, a.clone())
            .remove_edge("groups", [g1.clone()])
            .exec()
            .await
            .unwrap();

        let groups = client.query(&USER).where_id(a.clone()).query_edge("groups").unwrap().ids().await;
        assert_eq!(groups.unwrap(), vec![g2.clone()]);

        // Traversal from the inverse side reads the same junction rows.
        let members = client.query(&GROUP).where_id(g2).query_edge("users").unwrap().ids().await;
        assert_eq!(members.unwrap(), vec![a]);
    }

    #[tokio::test]
    async fn test_bidi_m2m_is_symmetric() {
        let (client, _) = setup().await;
        let a = user(&client, "a", 1).await;
        let b = user(&client, "b", 1).await;

        client.update_one(&USER, a.clone()).add_edge("friends", [b.clone()]).exec().await.unwrap();
        let of_b = client.query(&USER).where_id(b.clone()).query_edge("friends").unwrap().ids().await;
        assert_eq!(of_b.unwrap(), vec![a.clone()]);

        client.update_one(&USER, b.clone()).clear_edge("friends").exec().await.unwrap();
        let of_a = client.query(&USER).where_id(a).query_edge("friends").unwrap().ids().await;
        assert!(of_a.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_o2m_targets_collapse() {
        let (client, _) = setup().await;
        let a = user(&client, "a", 1).await;
        let p = pet(&client, "rex", None).await;

        client
            .update_one(&USER, a.clone())
            .add_edge("pets", [p.clone(), p.clone()])
            .add_edge("pets", [p.clone()])
            .exec()
            .await
            .unwrap();

        let pets = client.query(&USER).where_id(a).query_edge("pets").unwrap().ids().await;
        assert_eq!(pets.unwrap(), vec![p]);
    }

    #[tokio::test]
    async fn test_repeated_m2m_targets_collapse() {
        let (client, driver) = setup().await;
        let a = user(&client, "a", 1).await;
        let g = group(&client, "g").await;
        driver.reset();

        client
            .update_one(&USER, a.clone())
            .add_edge("groups", [g.clone(), g.clone()])
            .exec()
            .await
            .unwrap();

        let insert = driver
            .statements()
            .into_iter()
            .find(|s| s.starts_with("INSERT INTO \"user_groups\""))
            .unwrap();
        assert!(insert.ends_with("VALUES (?, ?)"));
        let groups = client.query(&USER).where_id(a).query_edge("groups").unwrap().ids().await;
        assert_eq!(groups.unwrap(), vec![g]);
    }

    #[tokio::test]
    async fn test_repeated_targets_on_create() {
        let (client, _) = setup().await;
        let g = group(&client, "g").await;

        let a = client
            .create(&USER)
            .set("name", "a")
            .set("age", 1)
            .add_edge("groups", [g.clone()])
            .add_edge("groups", [g.clone()])
            .exec()
            .await
            .unwrap();

        let count = client.query(&GROUP).where_id(g).query_edge("users").unwrap().count().await;
        assert_eq!(count.unwrap(), 1);
        assert!(client.get(&USER, a).await.is_ok());
    }
}

// ============================================================================
// Delete
// ============================================================================

mod delete {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_delete_one_missing_is_not_found() {
        let (client, _) = setup().await;
        let err = client.delete_one(&USER, 7).exec().await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_by_predicate_cascades_junction_rows() {
        let (client, driver) = setup().await;
        let a = user(&client, "a", 10).await;
        user(&client, "b", 20).await;
        let g = group(&client, "g").await;
        client.update_one(&USER, a).add_edge("groups", [g.clone()]).exec().await.unwrap();

        let deleted = client
            .delete(&USER)
            .filter(Predicate::lt("age", 15))
            .exec()
            .await
            .unwrap();
        assert_eq!(deleted, 1);

        let rows: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM user_groups")
            .fetch_one(driver.pool())
            .await
            .unwrap();
        assert_eq!(rows.0, 0);
    }

    #[tokio::test]
    async fn test_id_type_mismatch() {
        let (client, driver) = setup().await;
        let err = client.delete_one(&USER, "abc").exec().await.unwrap_err();
        assert_matches!(err, EntError::IdTypeMismatch { .. });
        assert!(driver.statements().is_empty());
    }
}

// ============================================================================
// Query
// ============================================================================

mod query {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn users(client: &entgraph::Client) -> Vec<Id> {
        let mut ids = Vec::new();
        for (name, age) in [("a", 10), ("b", 20), ("c", 30), ("d", 40), ("e", 50)] {
            ids.push(user(client, name, age).await);
        }
        ids
    }

    #[tokio::test]
    async fn test_offset_without_limit() {
        let (client, driver) = setup().await;
        let ids = users(&client).await;
        driver.reset();

        let rest = client
            .query(&USER)
            .order(Order::asc("id"))
            .offset(3)
            .ids()
            .await
            .unwrap();
        assert_eq!(rest, ids[3..].to_vec());
        assert!(driver.statements()[0].ends_with("LIMIT 2147483647 OFFSET 3"));
    }

    #[tokio::test]
    async fn test_only_and_first() {
        let (client, _) = setup().await;
        users(&client).await;

        let err = client.query(&USER).filter(Predicate::gt("age", 30)).only().await.unwrap_err();
        assert!(err.is_not_singular());
        let err = client.query(&USER).filter(Predicate::gt("age", 99)).only_id().await.unwrap_err();
        assert!(err.is_not_found());

        let only = client.query(&USER).filter(Predicate::eq("name", "c")).only().await.unwrap();
        assert_eq!(only.get::<i64>("age").unwrap(), 30);

        let first = client.query(&USER).order(Order::desc("age")).first().await.unwrap();
        assert_eq!(first.unwrap().get::<String>("name").unwrap(), "e");
        assert!(client.query(&USER).filter(Predicate::eq("name", "z")).first_id().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_count_ignores_limit_and_exist() {
        let (client, _) = setup().await;
        users(&client).await;

        assert_eq!(client.query(&USER).limit(2).count().await.unwrap(), 5);
        assert!(client.query(&USER).filter(Predicate::contains("name", "c")).exist().await.unwrap());
        assert!(!client.query(&USER).filter(Predicate::has_prefix("name", "%")).exist().await.unwrap());
    }

    #[tokio::test]
    async fn test_group_by_aggregate() {
        let (client, _) = setup().await;
        let ids = users(&client).await;
        pet(&client, "p1", Some(&ids[0])).await;
        pet(&client, "p2", Some(&ids[0])).await;
        pet(&client, "p3", Some(&ids[1])).await;

        let rows = client
            .query(&PET)
            .filter(Predicate::not_null("owner_id"))
            .order(Order::asc("name"))
            .group_by(["name"])
            .aggregate(Aggregate::Count)
            .rows()
            .await
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].get("count"), Some(&Value::Int(1)));

        let total = client
            .query(&USER)
            .select(Vec::<String>::new())
            .aggregate(Aggregate::Sum("age".into()))
            .ints()
            .await
            .unwrap();
        assert_eq!(total, vec![150]);
    }

    #[tokio::test]
    async fn test_scalar_projection() {
        let (client, _) = setup().await;
        users(&client).await;

        let names = client
            .query(&USER)
            .filter(Predicate::in_values("age", [20, 40]))
            .order(Order::asc("name"))
            .select(["name"])
            .strings()
            .await
            .unwrap();
        assert_eq!(names, vec!["b", "d"]);

        let err = client.query(&USER).select(["name", "age"]).strings().await.unwrap_err();
        assert_matches!(err, EntError::Validation { .. });
        let err = client.query(&USER).select(["nope"]).rows().await.unwrap_err();
        assert_matches!(err, EntError::Validation { column, .. } if column == "nope");
    }

    #[tokio::test]
    async fn test_traversal_and_edge_predicates() {
        let (client, _) = setup().await;
        let ids = users(&client).await;
        let p1 = pet(&client, "p1", Some(&ids[0])).await;
        pet(&client, "p2", Some(&ids[3])).await;
        pet(&client, "stray", None).await;

        let young_pets = client
            .query(&USER)
            .filter(Predicate::lt("age", 30))
            .query_edge("pets")
            .unwrap()
            .ids()
            .await
            .unwrap();
        assert_eq!(young_pets, vec![p1]);

        let owners = client.query(&USER).where_has_edge("pets").order(Order::asc("id")).ids().await;
        assert_eq!(int_ids(&owners.unwrap()), int_ids(&[ids[0].clone(), ids[3].clone()]));

        let owners_of_p2 = client
            .query(&USER)
            .where_has_edge_with("pets", Predicate::eq("name", "p2"))
            .only_id()
            .await
            .unwrap();
        assert_eq!(owners_of_p2, ids[3]);

        let err = client.query(&USER).where_has_edge("nope").all().await.unwrap_err();
        assert_matches!(err, EntError::UnknownEdge { edge, .. } if edge == "nope");
    }

    #[tokio::test]
    async fn test_get_checks_id_type() {
        let (client, _) = setup().await;
        let err = client.get(&USER, "abc").await.unwrap_err();
        assert_matches!(err, EntError::IdTypeMismatch { .. });
    }
}
