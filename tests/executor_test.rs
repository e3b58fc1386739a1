//! Executor behavior against a scripted client: row mapping, cursor release
//! accounting, parameter composition, and not-found translation.

mod common;

use std::sync::Arc;

use common::{FakeClient, User, user_row};
use rowkit::{Error, Executor, Row, Sql, Statement, Value, ok_if_not_found};

fn executor(client: &Arc<FakeClient>) -> Executor<User, FakeClient> {
    Executor::new(Arc::clone(client))
}

#[tokio::test]
async fn rows_maps_every_row_into_an_entity() {
    let client = Arc::new(FakeClient::new());
    client.push_result(Ok(vec![user_row(1, "a"), user_row(2, "b")]));

    let users = executor(&client)
        .rows(&Sql::new("SELECT id, name FROM users"), &[])
        .await
        .unwrap();

    assert_eq!(
        users,
        vec![
            User { id: 1, name: "a".into() },
            User { id: 2, name: "b".into() },
        ]
    );
    assert_eq!(client.release_count(), 1);
}

#[tokio::test]
async fn decode_failure_aborts_and_releases_cursor() {
    let client = Arc::new(FakeClient::new());
    // Second row has a string where the entity expects an integer.
    client.push_result(Ok(vec![
        user_row(1, "a"),
        Row::new(
            vec!["id".to_string(), "name".to_string()],
            vec![Value::String("oops".into()), Value::String("b".into())],
        ),
    ]));

    let err = executor(&client)
        .rows(&Sql::new("SELECT id, name FROM users"), &[])
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Decode { column: 0, .. }));
    assert_eq!(client.release_count(), 1);
}

#[tokio::test]
async fn row_translates_empty_result_to_not_found() {
    let client = Arc::new(FakeClient::new());
    client.push_result(Ok(vec![]));

    let err = executor(&client)
        .row(&Sql::new("SELECT id, name FROM users WHERE id = @p1").bind(99i64))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(client.release_count(), 1);
}

#[tokio::test]
async fn not_found_translator_yields_absent_result() {
    let client = Arc::new(FakeClient::new());
    client.push_result(Ok(vec![]));

    let result = executor(&client)
        .row(&Sql::new("SELECT id, name FROM users WHERE id = @p1").bind(99i64))
        .await;
    assert_eq!(ok_if_not_found(result).unwrap(), None);
}

#[tokio::test]
async fn not_found_translator_passes_other_errors_through() {
    let client = Arc::new(FakeClient::new());
    client.push_result(Err(Error::database("disk I/O error", None)));

    let result = executor(&client)
        .row(&Sql::new("SELECT id, name FROM users WHERE id = @p1").bind(1i64))
        .await;
    let err = ok_if_not_found(result).unwrap_err();
    assert!(matches!(err, Error::Database { .. }));
}

#[tokio::test]
async fn row_returns_first_entity() {
    let client = Arc::new(FakeClient::new());
    client.push_result(Ok(vec![user_row(42, "alice"), user_row(43, "bob")]));

    let user = executor(&client)
        .row(&Sql::new("SELECT id, name FROM users WHERE id = @p1").bind(42i64))
        .await
        .unwrap();
    assert_eq!(user, User { id: 42, name: "alice".into() });
}

#[tokio::test]
async fn positional_args_become_numbered_parameters() {
    let client = Arc::new(FakeClient::new());
    client.push_result(Ok(vec![]));

    let builder = Sql::new("SELECT id, name FROM users WHERE id = @p1 AND name = @p2")
        .bind(42i64)
        .bind("alice");
    executor(&client).rows(&builder, &[]).await.unwrap();

    let queries = client.queries.lock().unwrap();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].params["p1"], Value::Int(42));
    assert_eq!(queries[0].params["p2"], Value::String("alice".into()));
}

#[tokio::test]
async fn extra_args_merge_into_parameters() {
    let client = Arc::new(FakeClient::new());
    client.push_result(Ok(vec![]));

    let builder = Sql::new("SELECT id, name FROM users WHERE org = @org");
    executor(&client)
        .rows(&builder, &[Value::String("org".into()), Value::Int(7)])
        .await
        .unwrap();

    let queries = client.queries.lock().unwrap();
    assert_eq!(queries[0].params["org"], Value::Int(7));
}

#[tokio::test]
async fn odd_extra_args_rejected_before_database_call() {
    let client = Arc::new(FakeClient::new());

    let err = executor(&client)
        .rows(&Sql::new("SELECT 1"), &[Value::String("org".into())])
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidArgument { .. }));
    assert_eq!(client.query_count(), 0);
}

#[tokio::test]
async fn non_string_extra_key_rejected_before_database_call() {
    let client = Arc::new(FakeClient::new());

    let err = executor(&client)
        .rows(&Sql::new("SELECT 1"), &[Value::Int(1), Value::Int(2)])
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidArgument { .. }));
    assert_eq!(client.query_count(), 0);
}

#[tokio::test]
async fn extra_key_colliding_with_positional_rejected() {
    let client = Arc::new(FakeClient::new());

    let builder = Sql::new("SELECT 1 WHERE a = @p1").bind(1i64);
    let err = executor(&client)
        .rows(&builder, &[Value::String("p1".into()), Value::Int(2)])
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidArgument { .. }));
    assert_eq!(client.query_count(), 0);
}

#[tokio::test]
async fn builder_error_fails_without_database_call() {
    struct Broken;
    impl rowkit::ToSql for Broken {
        fn to_sql(&self) -> rowkit::DbResult<(String, Vec<Value>)> {
            Err(Error::invalid_argument("empty column list"))
        }
    }

    let client = Arc::new(FakeClient::new());
    let err = executor(&client).rows(&Broken, &[]).await.unwrap_err();

    assert!(matches!(err, Error::InvalidArgument { .. }));
    assert_eq!(client.query_count(), 0);
}

#[tokio::test]
async fn scalar_decodes_first_row() {
    let client = Arc::new(FakeClient::new());
    client.push_result(Ok(vec![Row::new(
        vec!["count".to_string()],
        vec![Value::Int(5)],
    )]));

    let count: i64 = Executor::<i64, _>::new(Arc::clone(&client))
        .scalar(&Sql::new("SELECT COUNT(*) FROM users"), &[])
        .await
        .unwrap();
    assert_eq!(count, 5);
    assert_eq!(client.release_count(), 1);
}

#[tokio::test]
async fn scalar_returns_default_on_zero_rows() {
    let client = Arc::new(FakeClient::new());
    client.push_result(Ok(vec![]));

    let count: i64 = Executor::<i64, _>::new(Arc::clone(&client))
        .scalar(&Sql::new("SELECT COUNT(*) FROM users"), &[])
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn rows_for_stmt_routes_through_session() {
    let client = Arc::new(FakeClient::new());
    client.push_result(Ok(vec![user_row(1, "a")]));

    let users = executor(&client)
        .rows_for_stmt(Statement::new("SELECT id, name FROM users"), Some(&()))
        .await
        .unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(client.query_count(), 1);
}
