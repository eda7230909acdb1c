//! The query lifecycle through the public API: lazy execution, caching,
//! finder dispatch, and mutation actions.

mod support;

use std::sync::Arc;

use pretty_assertions::assert_eq;

use support::{row, FixtureWebservice, TestEndpoint};
use tether_orm::prelude::*;
use tether_query::ExecuteResult;

fn articles_with(
    rows: Vec<Row>,
) -> (Arc<dyn Endpoint>, Arc<FixtureWebservice>) {
    let webservice = FixtureWebservice::new();
    webservice.load("Articles", rows);
    let endpoint = TestEndpoint::new("Articles", Arc::clone(&webservice)).arc();
    (endpoint, webservice)
}

#[tokio::test]
async fn test_results_are_cached_until_a_clause_changes() {
    let (articles, webservice) = articles_with(vec![row(&[("id", Value::Int(1))])]);
    let mut query = Query::new(articles);

    query.all().await.unwrap();
    query.all().await.unwrap();
    assert_eq!(webservice.calls_for("Articles"), 1);

    let mut query = query.where_clause(Conditions::eq("published", true), false);
    query.all().await.unwrap();
    assert_eq!(webservice.calls_for("Articles"), 2);
}

#[tokio::test]
async fn test_find_applies_caller_options() {
    let (articles, webservice) = articles_with(vec![]);
    let mut options = Row::new();
    options.insert("limit", Value::Int(5));
    options.insert(
        "conditions",
        Value::Map(row(&[("published", Value::Bool(true))])),
    );

    let mut query = Query::new(articles).find("all", options).unwrap();
    assert_eq!(query.clauses().limit, Some(5));
    query.all().await.unwrap();

    let sent = webservice.last_conditions_for("Articles").unwrap();
    assert_eq!(sent.value("published"), Some(&Value::Bool(true)));
}

#[tokio::test]
async fn test_unknown_finder_is_a_configuration_error() {
    let (articles, _) = articles_with(vec![]);
    let err = Query::new(articles).find("trending", Row::new()).unwrap_err();
    assert!(matches!(err, QueryError::Configuration(_)));
}

#[tokio::test]
async fn test_first_on_empty_set() {
    let (articles, _) = articles_with(vec![]);
    let mut query = Query::new(articles);
    assert_eq!(query.first().await.unwrap(), None);

    let err = query.first_or_fail().await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_update_executes_with_set_clause() {
    let (articles, webservice) = articles_with(vec![]);
    let mut query = Query::new(articles)
        .update()
        .set(row(&[("published", Value::Bool(true))]), false)
        .unwrap()
        .where_clause(Conditions::eq("id", 1i64), false);

    let result = query.execute().await.unwrap();
    assert_eq!(result, ExecuteResult::Affected(1));
    assert_eq!(webservice.calls_for("Articles"), 1);
}

#[tokio::test]
async fn test_delete_does_not_read() {
    let (articles, webservice) = articles_with(vec![row(&[("id", Value::Int(1))])]);
    let mut query = Query::new(articles)
        .delete()
        .where_clause(Conditions::eq("id", 1i64), false);

    let result = query.execute().await.unwrap();
    assert_eq!(result, ExecuteResult::Affected(1));
    // a mutation never consults the read cache path
    assert_eq!(query.count().await.unwrap(), 0);
    assert_eq!(webservice.calls_for("Articles"), 1);
}
