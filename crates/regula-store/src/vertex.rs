//! Vertex AI Vector Search index client (REST, streaming updates).

use async_trait::async_trait;
use regula_core::{IndexEntry, Restrict};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{IndexError, IndexMatch, VectorIndex};

/// How the deployed index measures distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DistanceMeasure {
    #[default]
    CosineDistance,
    /// Dot product over unit vectors; the service returns the product itself.
    DotProductDistance,
}

/// Coordinates of a Vertex AI index and the endpoint it is deployed to.
#[derive(Debug, Clone)]
pub struct VertexConfig {
    pub project_id: String,
    pub location: String,
    pub index_id: String,
    pub index_endpoint_id: String,
    pub deployed_index_id: String,
    /// Public endpoint domain for `findNeighbors`, e.g. `1234.us-central1-5678.vdb.vertexai.goog`.
    pub public_endpoint_domain: String,
    /// OAuth2 bearer token.
    pub access_token: String,
    pub distance_measure: DistanceMeasure,
}

impl VertexConfig {
    fn admin_base(&self) -> String {
        format!(
            "https://{}-aiplatform.googleapis.com/v1/projects/{}/locations/{}",
            self.location, self.project_id, self.location
        )
    }

    fn upsert_url(&self) -> String {
        format!("{}/indexes/{}:upsertDatapoints", self.admin_base(), self.index_id)
    }

    fn remove_url(&self) -> String {
        format!("{}/indexes/{}:removeDatapoints", self.admin_base(), self.index_id)
    }

    fn find_neighbors_url(&self) -> String {
        format!(
            "https://{}/v1/projects/{}/locations/{}/indexEndpoints/{}:findNeighbors",
            self.public_endpoint_domain.trim_end_matches('/'),
            self.project_id,
            self.location,
            self.index_endpoint_id
        )
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Datapoint<'a> {
    datapoint_id: &'a str,
    feature_vector: &'a [f32],
    #[serde(skip_serializing_if = "no_restricts")]
    restricts: &'a [Restrict],
}

fn no_restricts(r: &&[Restrict]) -> bool {
    r.is_empty()
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    datapoints: Vec<Datapoint<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RemoveRequest<'a> {
    datapoint_ids: Vec<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NeighborQuery<'a> {
    datapoint: Datapoint<'a>,
    neighbor_count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FindNeighborsRequest<'a> {
    deployed_index_id: &'a str,
    queries: Vec<NeighborQuery<'a>>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct FindNeighborsResponse {
    #[serde(default)]
    nearest_neighbors: Vec<NearestNeighbors>,
}

#[derive(Deserialize)]
struct NearestNeighbors {
    #[serde(default)]
    neighbors: Vec<Neighbor>,
}

#[derive(Deserialize)]
struct Neighbor {
    datapoint: NeighborDatapoint,
    #[serde(default)]
    distance: f32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NeighborDatapoint {
    datapoint_id: String,
}

/// Vertex AI Vector Search over vectorized requirements.
pub struct VertexIndex {
    client: reqwest::Client,
    config: VertexConfig,
}

impl VertexIndex {
    pub fn new(config: VertexConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<reqwest::Response, IndexError> {
        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.config.access_token)
            .json(body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(IndexError::Server {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }

    fn to_distance(&self, raw: f32) -> f32 {
        match self.config.distance_measure {
            DistanceMeasure::CosineDistance => raw,
            DistanceMeasure::DotProductDistance => 1.0 - raw,
        }
    }
}

fn parse_neighbors(body: FindNeighborsResponse) -> Vec<(String, f32)> {
    body.nearest_neighbors
        .into_iter()
        .flat_map(|n| n.neighbors)
        .map(|n| (n.datapoint.datapoint_id, n.distance))
        .collect()
}

#[async_trait]
impl VectorIndex for VertexIndex {
    fn name(&self) -> &'static str {
        "vertex"
    }

    async fn upsert(&self, entry: IndexEntry) -> Result<(), IndexError> {
        let body = UpsertRequest {
            datapoints: vec![Datapoint {
                datapoint_id: &entry.id,
                feature_vector: &entry.vector,
                restricts: &entry.restricts,
            }],
        };
        self.post(&self.config.upsert_url(), &body).await?;
        debug!(id = %entry.id, "upserted datapoint to vertex index");
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        restricts: &[Restrict],
        limit: usize,
    ) -> Result<Vec<IndexMatch>, IndexError> {
        let body = FindNeighborsRequest {
            deployed_index_id: &self.config.deployed_index_id,
            queries: vec![NeighborQuery {
                datapoint: Datapoint {
                    datapoint_id: "query",
                    feature_vector: vector,
                    restricts,
                },
                neighbor_count: limit,
            }],
        };
        let resp = self.post(&self.config.find_neighbors_url(), &body).await?;
        let text = resp.text().await?;
        let parsed: FindNeighborsResponse = if text.trim().is_empty() {
            FindNeighborsResponse::default()
        } else {
            serde_json::from_str(&text)?
        };
        let mut matches: Vec<IndexMatch> = parse_neighbors(parsed)
            .into_iter()
            .map(|(id, raw)| IndexMatch {
                id,
                distance: self.to_distance(raw),
            })
            .collect();
        matches.sort_by(|a, b| a.distance.total_cmp(&b.distance).then_with(|| a.id.cmp(&b.id)));
        matches.truncate(limit);
        info!(neighbors = matches.len(), "vertex findNeighbors");
        Ok(matches)
    }

    async fn delete(&self, id: &str) -> Result<(), IndexError> {
        let body = RemoveRequest {
            datapoint_ids: vec![id],
        };
        self.post(&self.config.remove_url(), &body).await?;
        debug!(id, "removed datapoint from vertex index");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regula_core::Framework;
    use regula_core::restrict::{entry_restricts, query_restricts};

    fn config() -> VertexConfig {
        VertexConfig {
            project_id: "regula-prod".into(),
            location: "us-central1".into(),
            index_id: "111".into(),
            index_endpoint_id: "222".into(),
            deployed_index_id: "requirements_v1".into(),
            public_endpoint_domain: "333.us-central1-444.vdb.vertexai.goog/".into(),
            access_token: "token".into(),
            distance_measure: DistanceMeasure::CosineDistance,
        }
    }

    #[test]
    fn endpoint_urls() {
        let c = config();
        assert_eq!(
            c.upsert_url(),
            "https://us-central1-aiplatform.googleapis.com/v1/projects/regula-prod/locations/us-central1/indexes/111:upsertDatapoints"
        );
        assert!(c.remove_url().ends_with("/indexes/111:removeDatapoints"));
        assert_eq!(
            c.find_neighbors_url(),
            "https://333.us-central1-444.vdb.vertexai.goog/v1/projects/regula-prod/locations/us-central1/indexEndpoints/222:findNeighbors"
        );
    }

    #[test]
    fn upsert_body_carries_restricts() {
        let restricts = entry_restricts(Some("acme"), Framework::Ons);
        let body = UpsertRequest {
            datapoints: vec![Datapoint {
                datapoint_id: "req-1",
                feature_vector: &[0.5, 0.25],
                restricts: &restricts,
            }],
        };
        let json = serde_json::to_value(&body).unwrap();
        let dp = &json["datapoints"][0];
        assert_eq!(dp["datapointId"], "req-1");
        assert_eq!(dp["featureVector"][1], 0.25);
        assert_eq!(dp["restricts"][0]["namespace"], "tenant_id");
        assert_eq!(dp["restricts"][0]["allowList"][0], "acme");
        assert_eq!(dp["restricts"][1]["allowList"][0], "private");
    }

    #[test]
    fn find_neighbors_body_shape() {
        let restricts = query_restricts(None, None);
        let body = FindNeighborsRequest {
            deployed_index_id: "requirements_v1",
            queries: vec![NeighborQuery {
                datapoint: Datapoint {
                    datapoint_id: "query",
                    feature_vector: &[1.0],
                    restricts: &restricts,
                },
                neighbor_count: 7,
            }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["deployedIndexId"], "requirements_v1");
        assert_eq!(json["queries"][0]["neighborCount"], 7);
        assert_eq!(json["queries"][0]["datapoint"]["restricts"][0]["namespace"], "scope");
    }

    #[test]
    fn remove_body_shape() {
        let json = serde_json::to_value(RemoveRequest {
            datapoint_ids: vec!["req-9"],
        })
        .unwrap();
        assert_eq!(json["datapointIds"][0], "req-9");
    }

    #[test]
    fn parses_neighbors_response() {
        let body: FindNeighborsResponse = serde_json::from_str(
            r#"{"nearestNeighbors":[{"id":"query","neighbors":[
                {"datapoint":{"datapointId":"a"},"distance":0.12},
                {"datapoint":{"datapointId":"b"}}
            ]}]}"#,
        )
        .unwrap();
        let n = parse_neighbors(body);
        assert_eq!(n, vec![("a".to_string(), 0.12), ("b".to_string(), 0.0)]);

        let empty: FindNeighborsResponse = serde_json::from_str("{}").unwrap();
        assert!(parse_neighbors(empty).is_empty());
    }

    #[test]
    fn dot_product_scores_become_distances() {
        let index = VertexIndex::new(VertexConfig {
            distance_measure: DistanceMeasure::DotProductDistance,
            ..config()
        });
        assert!((index.to_distance(0.9) - 0.1).abs() < 1e-6);
        let index = VertexIndex::new(config());
        assert_eq!(index.to_distance(0.3), 0.3);
    }
}
