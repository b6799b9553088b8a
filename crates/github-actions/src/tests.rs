/// Driver tests against a local mockito server standing in for api.github.com.
#[cfg(test)]
mod http {
    use crate::{GitHubClient, GitHubError};
    use lifecycle_core::backend::{ExecutionBackend, RepoPage, WorkflowInputs};
    use lifecycle_core::types::Conclusion;
    use lifecycle_core::LifecycleError;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn client(server: &Server) -> GitHubClient {
        GitHubClient::with_base_url(&server.url(), "tok").unwrap()
    }

    fn q(pairs: &[(&str, &str)]) -> Matcher {
        Matcher::AllOf(
            pairs
                .iter()
                .map(|(k, v)| Matcher::UrlEncoded(k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[tokio::test]
    async fn repo_page_sends_conditional_header_and_reads_etag() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/users/acme/repos")
            .match_query(q(&[("page", "1"), ("per_page", "100")]))
            .match_header("authorization", "Bearer tok")
            .match_header("accept", "application/vnd.github+json")
            .match_header("x-github-api-version", "2022-11-28")
            .match_header("if-none-match", "\"old\"")
            .with_status(200)
            .with_header("etag", "\"new\"")
            .with_body(
                json!([
                    {"name": "billing-config", "default_branch": "main",
                     "topics": ["saas-lifecycle", "billing"], "owner": {"login": "acme"}},
                    {"name": "docs", "default_branch": "main", "owner": {"login": "acme"}}
                ])
                .to_string(),
            )
            .create_async()
            .await;

        let page = client(&server)
            .list_repos("acme", 1, 100, Some("\"old\""))
            .await
            .unwrap();
        mock.assert_async().await;

        let RepoPage::Page {
            repos,
            validation_tag,
        } = page
        else {
            panic!("expected a page");
        };
        assert_eq!(validation_tag.as_deref(), Some("\"new\""));
        assert_eq!(repos.len(), 2);
        assert!(repos[0].is_opted_in("saas-lifecycle"));
        assert!(repos[1].topics.is_empty());
    }

    #[tokio::test]
    async fn not_modified_listing() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/users/acme/repos")
            .match_query(Matcher::Any)
            .with_status(304)
            .create_async()
            .await;

        let page = client(&server)
            .list_repos("acme", 1, 100, Some("\"same\""))
            .await
            .unwrap();
        assert_eq!(page, RepoPage::NotModified);
    }

    #[tokio::test]
    async fn completed_runs_skip_runs_without_branch_or_conclusion() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/acme/billing-config/actions/runs")
            .match_query(q(&[
                ("event", "workflow_dispatch"),
                ("status", "completed"),
                ("per_page", "100"),
            ]))
            .with_status(200)
            .with_body(
                json!({
                    "total_count": 3,
                    "workflow_runs": [
                        {"id": 1, "head_branch": "abc123", "conclusion": "success",
                         "html_url": "https://github.com/acme/billing-config/actions/runs/1",
                         "created_at": "2026-03-01T10:00:00Z", "updated_at": "2026-03-01T10:05:00Z"},
                        {"id": 2, "head_branch": "def456", "conclusion": "startup_failure",
                         "html_url": "u2"},
                        {"id": 3, "head_branch": null, "conclusion": "failure", "html_url": "u3"}
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let runs = client(&server)
            .list_completed_runs("acme", "billing-config")
            .await
            .unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].run_id, "1");
        assert_eq!(runs[0].branch_name, "abc123");
        assert_eq!(runs[0].conclusion, Conclusion::Success);
        assert!(runs[0].updated_at.is_some());
        assert_eq!(runs[1].conclusion, Conclusion::Other("startup_failure".into()));
    }

    #[tokio::test]
    async fn head_commit_reads_first_commit() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/acme/a/commits")
            .match_query(q(&[("sha", "main"), ("per_page", "1")]))
            .with_status(200)
            .with_body(json!([{"sha": "deadbeef"}]).to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/repos/acme/empty/commits")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let gh = client(&server);
        assert_eq!(gh.get_head_commit("acme", "a", "main").await.unwrap(), "deadbeef");
        let err = gh.head_commit("acme", "empty", "main").await.unwrap_err();
        assert!(matches!(err, GitHubError::EmptyHistory { .. }));
    }

    #[tokio::test]
    async fn workflow_exists_maps_200_404_and_errors() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/acme/a/actions/workflows/configure.yml")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;
        server
            .mock("GET", "/repos/acme/a/actions/workflows/missing.yml")
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("GET", "/repos/acme/a/actions/workflows/broken.yml")
            .with_status(500)
            .create_async()
            .await;

        let gh = client(&server);
        assert!(gh.workflow_exists("acme", "a", "configure").await.unwrap());
        assert!(!gh.workflow_exists("acme", "a", "missing").await.unwrap());
        assert!(matches!(
            gh.workflow_exists("acme", "a", "broken").await,
            Err(LifecycleError::Backend(_))
        ));
    }

    #[tokio::test]
    async fn create_branch_posts_full_ref() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/repos/acme/a/git/refs")
            .match_body(Matcher::Json(
                json!({"ref": "refs/heads/abc123", "sha": "deadbeef"}),
            ))
            .with_status(201)
            .with_body("{}")
            .create_async()
            .await;

        client(&server)
            .create_branch("acme", "a", "deadbeef", "abc123")
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn delete_branch_tolerates_missing_ref() {
        let mut server = Server::new_async().await;
        server
            .mock("DELETE", "/repos/acme/a/git/refs/heads/gone")
            .with_status(422)
            .with_body(r#"{"message":"Reference does not exist"}"#)
            .create_async()
            .await;
        server
            .mock("DELETE", "/repos/acme/a/git/refs/heads/never")
            .with_status(404)
            .create_async()
            .await;
        let ok = server
            .mock("DELETE", "/repos/acme/a/git/refs/heads/abc123")
            .with_status(204)
            .create_async()
            .await;

        let gh = client(&server);
        gh.delete_branch("acme", "a", "gone").await.unwrap();
        gh.delete_branch("acme", "a", "never").await.unwrap();
        gh.delete_branch("acme", "a", "abc123").await.unwrap();
        ok.assert_async().await;
    }

    #[tokio::test]
    async fn dispatch_posts_ref_and_inputs() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock(
                "POST",
                "/repos/acme/a/actions/workflows/configure.yml/dispatches",
            )
            .match_body(Matcher::Json(json!({
                "ref": "abc123",
                "inputs": {
                    "operationId": "abc123",
                    "tenantId": "t1",
                    "subscriptionId": "s1",
                    "context": "{\"seats\":5}"
                }
            })))
            .with_status(204)
            .create_async()
            .await;

        let inputs = WorkflowInputs {
            operation_id: "abc123".into(),
            tenant_id: "t1".into(),
            subscription_id: "s1".into(),
            context: Some("{\"seats\":5}".into()),
        };
        client(&server)
            .dispatch_workflow("acme", "a", "configure", "abc123", &inputs)
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unauthorized_is_backend_auth() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/acme/a/actions/runs")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body(r#"{"message":"Bad credentials"}"#)
            .create_async()
            .await;

        let err = client(&server)
            .list_completed_runs("acme", "a")
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::BackendAuth(ref m) if m.contains("Bad credentials")));
    }

    #[tokio::test]
    async fn malformed_body_is_decode_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/acme/a/actions/runs")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let err = client(&server).completed_runs("acme", "a").await.unwrap_err();
        assert!(matches!(err, GitHubError::Decode { .. }));
    }
}
