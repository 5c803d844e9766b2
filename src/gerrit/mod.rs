//! A batching client for the review server's REST API.
//!
//! Issue identifiers are resolved in groups of at most [MAX_BATCH_SIZE]. Groups run concurrently
//! and fail independently: a group whose request fails resolves all of its identifiers to [None]
//! without affecting any other group.

use crate::{
    constants::{DEFAULT_MAX_IN_FLIGHT, MAX_BATCH_SIZE, XSSI_PREFIX},
    errors::RemoteError,
    record::{RemoteChanges, RemoteChangeItem},
};
use async_trait::async_trait;
use futures::future::join_all;
use itertools::Itertools;
use serde::de::DeserializeOwned;
use std::{collections::HashMap, sync::Arc};
use tokio::{sync::Semaphore, task::JoinSet};

mod models;
use models::{ChangeInfo, ChangeQueryResponse, MergeableInfo};

/// Query options requesting the current revision and per-label votes.
const QUERY_OPTIONS: [&str; 2] = ["CURRENT_REVISION", "DETAILED_LABELS"];

/// Strips the anti-XSSI prefix from a response body, if present.
///
/// Bodies without the prefix are returned unchanged.
pub(crate) fn strip_xssi_prefix(body: &str) -> &str {
    body.strip_prefix(XSSI_PREFIX).unwrap_or(body)
}

/// Splits `ids` into contiguous groups of at most [MAX_BATCH_SIZE].
pub(crate) fn batches(ids: &[String]) -> impl Iterator<Item = &[String]> {
    ids.chunks(MAX_BATCH_SIZE)
}

/// Client for a review server's change endpoints.
#[derive(Debug, Clone)]
pub struct GerritClient {
    http: reqwest::Client,
    permits: Arc<Semaphore>,
}

impl Default for GerritClient {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IN_FLIGHT)
    }
}

impl GerritClient {
    /// Creates a new [GerritClient] that keeps at most `max_in_flight` requests open at once.
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            http: reqwest::Client::new(),
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
        }
    }

    /// Resolves `issue_ids` against the server at `server_url`.
    ///
    /// ## Takes
    /// - `server_url` - The base URL of the review server.
    /// - `issue_ids` - The change numbers to resolve.
    ///
    /// ## Returns
    /// A map containing exactly the given identifiers. An identifier maps to [None] if it was not
    /// found, is not a change number, or belongs to a group whose request failed.
    pub async fn fetch_changes(
        &self,
        server_url: &str,
        issue_ids: &[String],
    ) -> HashMap<String, Option<RemoteChangeItem>> {
        let ids = issue_ids.iter().unique().cloned().collect::<Vec<_>>();
        let server = server_url.trim_end_matches('/').to_string();

        let mut groups = JoinSet::new();
        for (index, group) in batches(&ids).enumerate() {
            let client = self.clone();
            let server = server.clone();
            let group = group.to_vec();
            groups.spawn(async move {
                let result = client.fetch_group(&server, &group).await;
                (index, group, result)
            });
        }

        let mut resolved = HashMap::with_capacity(ids.len());
        while let Some(joined) = groups.join_next().await {
            match joined {
                Ok((_, group, Ok(mut found))) => {
                    for id in group {
                        let item = found.remove(&id);
                        resolved.insert(id, item);
                    }
                }
                Ok((index, group, Err(err))) => {
                    tracing::warn!(
                        %server,
                        group = index,
                        size = group.len(),
                        %err,
                        "change batch failed"
                    );
                    resolved.extend(group.into_iter().map(|id| (id, None)));
                }
                Err(err) => tracing::warn!(%server, %err, "change batch task did not complete"),
            }
        }

        // Identifiers of a group whose task panicked never made it into the map.
        for id in ids {
            resolved.entry(id).or_insert(None);
        }
        resolved
    }

    /// Resolves a single group with one batched query, then queries mergeability of every match
    /// concurrently.
    ///
    /// Matches are joined to the requested identifiers by change number, never by position.
    async fn fetch_group(
        &self,
        server: &str,
        ids: &[String],
    ) -> Result<HashMap<String, RemoteChangeItem>, RemoteError> {
        let numbers = ids
            .iter()
            .filter_map(|id| match id.trim().parse::<u64>() {
                Ok(number) => Some(number),
                Err(_) => {
                    tracing::warn!(%id, "not a change number; skipping lookup");
                    None
                }
            })
            .collect::<Vec<_>>();
        if numbers.is_empty() {
            return Ok(HashMap::new());
        }

        let mut query = numbers
            .iter()
            .map(|n| ("q", format!("change:{n}")))
            .collect::<Vec<_>>();
        query.extend(QUERY_OPTIONS.iter().map(|o| ("o", o.to_string())));

        let url = format!("{server}/changes/");
        let response: ChangeQueryResponse = self.get_json(&url, &query).await?;

        let mut by_number = response
            .into_matches()
            .into_iter()
            .map(|change| (change.number, change))
            .collect::<HashMap<_, _>>();
        let matched = ids
            .iter()
            .filter_map(|id| {
                let number = id.trim().parse::<u64>().ok()?;
                Some((id.clone(), by_number.remove(&number)?))
            })
            .collect::<Vec<_>>();
        if !by_number.is_empty() {
            let unrequested = by_number.keys().collect::<Vec<_>>();
            tracing::debug!(?unrequested, "ignoring unrequested matches");
        }

        let items = join_all(
            matched
                .into_iter()
                .map(|(id, change)| self.resolve_mergeable(server, id, change)),
        )
        .await;

        Ok(items.into_iter().collect())
    }

    /// Completes a match with its mergeability, assuming no conflict if the sub-query fails.
    async fn resolve_mergeable(
        &self,
        server: &str,
        id: String,
        change: ChangeInfo,
    ) -> (String, RemoteChangeItem) {
        let url = format!(
            "{server}/changes/{}/revisions/current/mergeable",
            change.number
        );
        let mergeable = match self.get_json::<MergeableInfo>(&url, &[]).await {
            Ok(info) => info.mergeable,
            Err(err) => {
                tracing::warn!(
                    change = change.number,
                    %err,
                    "mergeability query failed; assuming mergeable"
                );
                true
            }
        };
        (id, change.into_item(mergeable))
    }

    /// Performs a `GET`, strips the anti-XSSI prefix, and parses the body as JSON.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, RemoteError> {
        let _permit = self.permits.acquire().await.ok();
        tracing::debug!(%url, terms = query.len(), "requesting");

        let response = self.http.get(url).query(query).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status(status));
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(strip_xssi_prefix(&body))?)
    }
}

#[async_trait]
impl RemoteChanges for GerritClient {
    async fn fetch(
        &self,
        server_url: &str,
        issue_ids: &[String],
    ) -> HashMap<String, Option<RemoteChangeItem>> {
        self.fetch_changes(server_url, issue_ids).await
    }
}

#[cfg(test)]
mod test {
    use super::{batches, strip_xssi_prefix, GerritClient};
    use crate::record::ChangeState;
    use serde_json::{json, Value};
    use std::{
        sync::{Arc, Mutex},
        time::{Duration, Instant},
    };
    use wiremock::{
        matchers::{method, path, path_regex, query_param},
        Mock, MockServer, Request, Respond, ResponseTemplate,
    };

    /// Answers a batched query with one NEW change per requested `change:<n>` term, in reverse
    /// order, recording how many terms each request carried.
    #[derive(Default)]
    struct EchoChanges {
        sizes: Arc<Mutex<Vec<usize>>>,
        delay: Duration,
    }

    impl Respond for EchoChanges {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let numbers = request
                .url
                .query_pairs()
                .filter(|(key, _)| key == "q")
                .filter_map(|(_, value)| value.strip_prefix("change:")?.parse::<u64>().ok())
                .collect::<Vec<_>>();
            self.sizes.lock().unwrap().push(numbers.len());

            let body = numbers
                .iter()
                .rev()
                .map(|n| {
                    json!([{
                        "_number": n,
                        "status": "NEW",
                        "updated": "2024-01-15 10:20:30.000000000",
                        "current_revision": format!("rev{n}"),
                    }])
                })
                .collect::<Vec<Value>>();
            ResponseTemplate::new(200)
                .set_body_string(format!(")]}}'\n{}", Value::Array(body)))
                .set_delay(self.delay)
        }
    }

    async fn mount_mergeable(server: &MockServer, mergeable: bool) {
        mount_slow_mergeable(server, mergeable, Duration::ZERO).await;
    }

    async fn mount_slow_mergeable(server: &MockServer, mergeable: bool, delay: Duration) {
        Mock::given(method("GET"))
            .and(path_regex(r"^/changes/\d+/revisions/current/mergeable$"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(format!(")]}}'\n{{\"mergeable\": {mergeable}}}"))
                    .set_delay(delay),
            )
            .mount(server)
            .await;
    }

    fn ids(range: std::ops::RangeInclusive<u64>) -> Vec<String> {
        range.map(|n| n.to_string()).collect()
    }

    #[test]
    fn groups_are_bounded() {
        for n in [0usize, 1, 9, 10, 11, 23, 100] {
            let ids = (0..n).map(|i| i.to_string()).collect::<Vec<_>>();
            let groups = batches(&ids).collect::<Vec<_>>();
            assert_eq!(groups.len(), n.div_ceil(10));
            assert!(groups.iter().all(|g| g.len() <= 10));
            assert_eq!(groups.concat(), ids);
        }
    }

    #[test]
    fn prefix_is_stripped_once_and_only_if_present() {
        let prefixed = ")]}'\n[[]]";
        let clean = "[[]]";
        let a: Value = serde_json::from_str(strip_xssi_prefix(prefixed)).unwrap();
        let b: Value = serde_json::from_str(strip_xssi_prefix(clean)).unwrap();
        assert_eq!(a, b);
        assert_eq!(strip_xssi_prefix(")]}')]}'x"), ")]}'x");
    }

    #[tokio::test]
    async fn resolves_all_groups_and_joins_by_value() {
        let server = MockServer::start().await;
        let sizes = Arc::new(Mutex::new(Vec::new()));
        Mock::given(method("GET"))
            .and(path("/changes/"))
            .and(query_param("o", "CURRENT_REVISION"))
            .and(query_param("o", "DETAILED_LABELS"))
            .respond_with(EchoChanges {
                sizes: sizes.clone(),
                ..Default::default()
            })
            .expect(3)
            .mount(&server)
            .await;
        mount_mergeable(&server, true).await;

        let requested = ids(1..=23);
        let resolved = GerritClient::default()
            .fetch_changes(&server.uri(), &requested)
            .await;

        assert_eq!(resolved.len(), 23);
        for id in &requested {
            let change = resolved[id].as_ref().unwrap();
            assert_eq!(change.status, ChangeState::New);
            assert_eq!(change.current_revision, Some(format!("rev{id}")));
            assert!(change.mergeable);
        }

        let mut sizes = sizes.lock().unwrap().clone();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![3, 10, 10]);
    }

    #[tokio::test]
    async fn failing_group_does_not_affect_siblings() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/changes/"))
            .and(query_param("q", "change:11"))
            .respond_with(ResponseTemplate::new(500))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/changes/"))
            .respond_with(EchoChanges::default())
            .mount(&server)
            .await;
        mount_mergeable(&server, true).await;

        let resolved = GerritClient::default()
            .fetch_changes(&server.uri(), &ids(1..=23))
            .await;

        assert_eq!(resolved.len(), 23);
        let missing = resolved.values().filter(|v| v.is_none()).count();
        assert_eq!(missing, 10);
        assert!(ids(11..=20).iter().all(|id| resolved[id].is_none()));
        assert!(ids(1..=10).iter().all(|id| resolved[id].is_some()));
        assert!(ids(21..=23).iter().all(|id| resolved[id].is_some()));
    }

    #[tokio::test]
    async fn reports_conflicts_from_mergeability() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/changes/"))
            .respond_with(EchoChanges::default())
            .mount(&server)
            .await;
        mount_mergeable(&server, false).await;

        let resolved = GerritClient::default()
            .fetch_changes(&server.uri(), &ids(1..=2))
            .await;
        assert!(resolved.values().all(|v| !v.as_ref().unwrap().mergeable));
    }

    #[tokio::test]
    async fn failed_mergeability_assumes_no_conflict() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/changes/"))
            .respond_with(EchoChanges::default())
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"/mergeable$"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let resolved = GerritClient::default()
            .fetch_changes(&server.uri(), &ids(1..=3))
            .await;
        assert_eq!(resolved.len(), 3);
        assert!(resolved.values().all(|v| v.as_ref().unwrap().mergeable));
    }

    #[tokio::test]
    async fn missing_matches_and_bad_bodies_resolve_to_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/changes/"))
            .and(query_param("q", "change:1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"[[{"_number": 1, "status": "ABANDONED"}], []]"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/changes/"))
            .and(query_param("q", "change:50"))
            .respond_with(ResponseTemplate::new(200).set_body_string(")]}'\nnot json"))
            .mount(&server)
            .await;
        mount_mergeable(&server, true).await;

        let client = GerritClient::default();
        let resolved = client
            .fetch_changes(&server.uri(), &["1".to_string(), "2".to_string()])
            .await;
        assert_eq!(
            resolved["1"].as_ref().unwrap().status,
            ChangeState::Abandoned
        );
        assert!(resolved["2"].is_none());

        let resolved = client
            .fetch_changes(&server.uri(), &["50".to_string(), "not-a-number".to_string()])
            .await;
        assert_eq!(resolved.len(), 2);
        assert!(resolved.values().all(Option::is_none));
    }

    #[tokio::test]
    async fn groups_and_mergeability_queries_overlap() {
        let delay = Duration::from_millis(300);
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/changes/"))
            .respond_with(EchoChanges {
                delay,
                ..Default::default()
            })
            .expect(3)
            .mount(&server)
            .await;
        mount_slow_mergeable(&server, false, delay).await;

        let started = Instant::now();
        let resolved = GerritClient::new(32)
            .fetch_changes(&server.uri(), &ids(1..=30))
            .await;
        let elapsed = started.elapsed();

        assert_eq!(resolved.len(), 30);
        assert!(resolved.values().all(|v| !v.as_ref().unwrap().mergeable));
        // One round of batch queries, then one round of mergeability queries. Running either the
        // groups or the per-group sub-queries one after another takes at least 6 delays.
        assert!(elapsed >= delay * 2, "took {elapsed:?}");
        assert!(elapsed < delay * 4, "took {elapsed:?}");
    }

    #[tokio::test]
    async fn single_permit_serializes_requests() {
        let delay = Duration::from_millis(150);
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/changes/"))
            .respond_with(EchoChanges {
                delay,
                ..Default::default()
            })
            .mount(&server)
            .await;
        mount_slow_mergeable(&server, true, delay).await;

        // One batch query, then three mergeability queries that would overlap given the permits.
        let started = Instant::now();
        let resolved = GerritClient::new(1)
            .fetch_changes(&server.uri(), &ids(1..=3))
            .await;
        let elapsed = started.elapsed();

        assert_eq!(resolved.len(), 3);
        assert!(resolved.values().all(Option::is_some));
        assert!(elapsed >= delay * 4, "took {elapsed:?}");
    }

    #[tokio::test]
    async fn unreachable_server_resolves_everything_to_none() {
        let resolved = GerritClient::default()
            .fetch_changes("http://127.0.0.1:9", &ids(1..=12))
            .await;
        assert_eq!(resolved.len(), 12);
        assert!(resolved.values().all(Option::is_none));
    }
}
