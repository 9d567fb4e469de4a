use chrono::{Duration, Utc};
use tracker_api::models::{NewIdentity, NewTask, ProfilePatch, TaskStatus};
use tracker_api::store::{
    PgStore, ProjectStore, ResetTokenStore, StoreError, TaskStore, UserStore,
};
use tracker_api::test_support::{TestDatabase, TestDatabaseError, TestFixtures};

async fn database() -> Option<TestDatabase> {
    match TestDatabase::new_from_env().await {
        Ok(db) => Some(db),
        Err(TestDatabaseError::MissingUrl) => {
            eprintln!("skipping postgres store test: TEST_DATABASE_URL not set");
            None
        }
        Err(err) => panic!("failed to provision test database: {err:?}"),
    }
}

fn identity(email: &str) -> NewIdentity {
    NewIdentity {
        email: email.to_string(),
        first_name: "Ada".into(),
        last_name: "Lovelace".into(),
        phone: None,
        address: None,
        password_hash: "hash-v1".into(),
    }
}

#[tokio::test]
async fn duplicate_emails_conflict_case_insensitively() {
    let Some(test_db) = database().await else {
        return;
    };
    let store = PgStore::new(test_db.pool_clone());

    let created = store
        .create_user(identity("Ada@X.com"))
        .await
        .expect("first insert");
    assert_eq!(created.email, "ada@x.com");

    let err = store
        .create_user(identity("ada@x.COM"))
        .await
        .expect_err("duplicate email");
    assert!(matches!(err, StoreError::Conflict(_)));

    let other = store
        .create_user(identity("other@x.com"))
        .await
        .expect("second user");
    let err = store
        .update_profile(
            other.id,
            &ProfilePatch {
                email: Some("ADA@x.com".into()),
                ..Default::default()
            },
        )
        .await
        .expect_err("email taken");
    assert!(matches!(err, StoreError::Conflict(_)));

    test_db.close().await.expect("failed to drop test database");
}

#[tokio::test]
async fn reset_tokens_are_single_use_and_one_per_user() {
    let Some(test_db) = database().await else {
        return;
    };
    let store = PgStore::new(test_db.pool_clone());
    let user = store
        .create_user(identity("a@x.com"))
        .await
        .expect("insert user");
    let now = Utc::now();

    store
        .upsert_reset_token(user.id, "first-digest", now + Duration::hours(1))
        .await
        .expect("first upsert");
    store
        .upsert_reset_token(user.id, "second-digest", now + Duration::hours(1))
        .await
        .expect("second upsert");
    assert_eq!(
        TestFixtures::new(test_db.pool())
            .count_reset_tokens()
            .await
            .expect("count"),
        1
    );
    assert!(
        store
            .find_reset_token("first-digest")
            .await
            .expect("lookup")
            .is_none()
    );

    let late = now + Duration::hours(2);
    assert_eq!(
        store
            .complete_password_reset("second-digest", "hash-v2", late)
            .await
            .expect("late attempt"),
        None
    );

    assert_eq!(
        store
            .complete_password_reset("second-digest", "hash-v2", now)
            .await
            .expect("first confirm"),
        Some(user.id)
    );
    assert_eq!(
        store
            .complete_password_reset("second-digest", "hash-v3", now)
            .await
            .expect("second confirm"),
        None
    );

    let stored = store
        .find_user_by_id(user.id)
        .await
        .expect("lookup")
        .expect("user exists");
    assert_eq!(stored.password_hash, "hash-v2");

    test_db.close().await.expect("failed to drop test database");
}

#[tokio::test]
async fn reset_token_for_unknown_user_is_rejected() {
    let Some(test_db) = database().await else {
        return;
    };
    let store = PgStore::new(test_db.pool_clone());

    let err = store
        .upsert_reset_token(4242, "digest", Utc::now() + Duration::hours(1))
        .await
        .expect_err("no such user");
    assert!(matches!(err, StoreError::InvalidReference(_)));

    test_db.close().await.expect("failed to drop test database");
}

#[tokio::test]
async fn deleting_a_project_cascades_to_tasks() {
    let Some(test_db) = database().await else {
        return;
    };
    let store = PgStore::new(test_db.pool_clone());
    let fixtures = TestFixtures::new(test_db.pool());
    let user_id = fixtures
        .insert_user("a@x.com", "hash-v1")
        .await
        .expect("insert user");
    let project_id = fixtures
        .insert_project("compiler")
        .await
        .expect("insert project");

    let task = store
        .create_task(NewTask {
            name: "write parser".into(),
            status: TaskStatus::InTesting,
            project_id,
            assigned_to_id: user_id,
        })
        .await
        .expect("create task");
    assert_eq!(task.status, TaskStatus::InTesting);

    let err = store
        .create_task(NewTask {
            name: "write parser".into(),
            status: TaskStatus::Todo,
            project_id,
            assigned_to_id: user_id,
        })
        .await
        .expect_err("duplicate task name");
    assert!(matches!(err, StoreError::Conflict(_)));

    let filtered = store
        .tasks_assigned_to(user_id, Some(TaskStatus::InTesting))
        .await
        .expect("filtered");
    assert_eq!(filtered, vec![task.clone()]);

    assert!(store.delete_project(project_id).await.expect("delete"));
    assert!(store.get_task(task.id).await.expect("lookup").is_none());
    assert!(!store.delete_project(project_id).await.expect("second delete"));

    test_db.close().await.expect("failed to drop test database");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_confirms_consume_the_token_once() {
    let Some(test_db) = database().await else {
        return;
    };
    let store = PgStore::new(test_db.pool_clone());
    let user = store
        .create_user(identity("a@x.com"))
        .await
        .expect("insert user");
    let now = Utc::now();
    store
        .upsert_reset_token(user.id, "race-digest", now + Duration::hours(1))
        .await
        .expect("upsert");

    let (first, second) = tokio::join!(
        store.complete_password_reset("race-digest", "hash-from-a", now),
        store.complete_password_reset("race-digest", "hash-from-b", now),
    );
    let first = first.expect("first confirm");
    let second = second.expect("second confirm");

    let winner = match (first, second) {
        (Some(id), None) => {
            assert_eq!(id, user.id);
            "hash-from-a"
        }
        (None, Some(id)) => {
            assert_eq!(id, user.id);
            "hash-from-b"
        }
        other => panic!("expected exactly one confirm to win, got {other:?}"),
    };

    let stored = store
        .find_user_by_id(user.id)
        .await
        .expect("lookup")
        .expect("user exists");
    assert_eq!(stored.password_hash, winner);
    assert_eq!(
        TestFixtures::new(test_db.pool())
            .count_reset_tokens()
            .await
            .expect("count"),
        0
    );

    test_db.close().await.expect("failed to drop test database");
}
