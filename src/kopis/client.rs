use std::time::Duration;

use chrono::NaiveDate;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::error::KopisError;
use super::types::{Envelope, RawDetail, RawItem};
use crate::config::IngestConfig;

pub const API_URL: &str = "http://www.kopis.or.kr/openApi/restful/pblprfr";

/// Upstream date parameter format (`yyyyMMdd`).
const QUERY_DATE_FORMAT: &str = "%Y%m%d";

/// Where the pipelines get performances from.
///
/// Neither method fails: a broken call is logged and reported as "nothing",
/// so one state code or one record can never take down its siblings.
pub trait PerformanceSource {
    /// One bounded page of listings for a state code and date window.
    async fn fetch_list(&self, state_code: &str, start: NaiveDate, end: NaiveDate)
    -> Vec<RawItem>;

    /// Detail for one performance, or `None` when the upstream cannot supply it.
    async fn fetch_detail(&self, external_id: &str) -> Option<RawDetail>;
}

pub struct KopisClient {
    api_key: String,
    client: Client,
    base_url: Url,
    rows: u32,
}

impl KopisClient {
    pub fn new(config: &IngestConfig) -> Result<Self, KopisError> {
        if config.api_key.trim().is_empty() {
            return Err(KopisError::MissingApiKey);
        }
        let base_url = Url::parse(config.base_url.trim_end_matches('/'))
            .map_err(|e| KopisError::InvalidBaseUrl(format!("{}: {e}", config.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(KopisError::InvalidBaseUrl(config.base_url.clone()));
        }
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            api_key: config.api_key.clone(),
            client,
            base_url,
            rows: config.rows,
        })
    }

    /// Fetches the first page of performances for `state_code`.
    pub async fn list(
        &self,
        state_code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawItem>, KopisError> {
        let stdate = start.format(QUERY_DATE_FORMAT).to_string();
        let eddate = end.format(QUERY_DATE_FORMAT).to_string();
        let rows = self.rows.to_string();
        let request = self.client.get(self.base_url.clone()).query(&[
            ("service", self.api_key.as_str()),
            ("stdate", stdate.as_str()),
            ("eddate", eddate.as_str()),
            ("cpage", "1"),
            ("rows", rows.as_str()),
            ("prfstate", state_code),
        ]);
        let envelope: Envelope<RawItem> = self.get_xml(request).await?;
        Ok(envelope.items)
    }

    /// Fetches the detail document for one performance.
    pub async fn detail(&self, external_id: &str) -> Result<Option<RawDetail>, KopisError> {
        let request = self
            .client
            .get(self.detail_url(external_id))
            .query(&[("service", self.api_key.as_str())]);
        let envelope: Envelope<RawDetail> = self.get_xml(request).await?;
        Ok(envelope.items.into_iter().next())
    }

    /// `{base}/{external_id}`, with the id percent-encoded as a single segment.
    fn detail_url(&self, external_id: &str) -> Url {
        let mut url = self.base_url.clone();
        // `new` rejects bases that cannot carry path segments.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(external_id);
        }
        url
    }

    async fn get_xml<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<Envelope<T>, KopisError> {
        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(KopisError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        Ok(quick_xml::de::from_str(&body)?)
    }
}

impl PerformanceSource for KopisClient {
    async fn fetch_list(
        &self,
        state_code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Vec<RawItem> {
        match self.list(state_code, start, end).await {
            Ok(items) => {
                debug!(state_code, count = items.len(), "fetched listing page");
                items
            }
            Err(e) => {
                warn!(state_code, error = %e, "list call failed");
                Vec::new()
            }
        }
    }

    async fn fetch_detail(&self, external_id: &str) -> Option<RawDetail> {
        match self.detail(external_id).await {
            Ok(Some(detail)) => Some(detail),
            Ok(None) => {
                debug!(external_id, "detail response was empty");
                None
            }
            Err(e) => {
                warn!(external_id, error = %e, "detail call failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> KopisClient {
        let config = IngestConfig {
            api_key: "test-key".into(),
            base_url: format!("{}/openApi/restful/pblprfr", server.uri()),
            request_timeout_secs: 5,
            ..IngestConfig::default()
        };
        KopisClient::new(&config).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn new_requires_api_key() {
        let result = KopisClient::new(&IngestConfig::default());
        assert!(matches!(result, Err(KopisError::MissingApiKey)));
    }

    #[tokio::test]
    async fn list_sends_bounded_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/openApi/restful/pblprfr"))
            .and(query_param("service", "test-key"))
            .and(query_param("stdate", "20240201"))
            .and(query_param("eddate", "20240302"))
            .and(query_param("cpage", "1"))
            .and(query_param("rows", "100"))
            .and(query_param("prfstate", "01"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<dbs><db><mt20id>PF1</mt20id><prfnm>A</prfnm></db>\
                 <db><mt20id>PF2</mt20id><prfnm>B</prfnm></db></dbs>",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let items = client_for(&server)
            .fetch_list("01", date(2024, 2, 1), date(2024, 3, 2))
            .await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].mt20id, "PF1");
    }

    #[tokio::test]
    async fn list_degrades_to_empty_on_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .list("01", date(2024, 2, 1), date(2024, 3, 2))
            .await
            .unwrap_err();
        assert!(matches!(err, KopisError::ApiError { status: 500, .. }));

        let items = client
            .fetch_list("01", date(2024, 2, 1), date(2024, 3, 2))
            .await;
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn list_degrades_to_empty_on_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<dbs><db>"))
            .mount(&server)
            .await;

        let items = client_for(&server)
            .fetch_list("02", date(2024, 2, 1), date(2024, 3, 2))
            .await;
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn list_degrades_to_empty_when_unreachable() {
        let config = IngestConfig {
            api_key: "test-key".into(),
            base_url: "http://127.0.0.1:9/pblprfr".into(),
            request_timeout_secs: 2,
            ..IngestConfig::default()
        };
        let client = KopisClient::new(&config).unwrap();
        let items = client
            .fetch_list("01", date(2024, 2, 1), date(2024, 3, 2))
            .await;
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn detail_embeds_id_in_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/openApi/restful/pblprfr/PF000001"))
            .and(query_param("service", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<dbs><db><mt20id>PF000001</mt20id><mt10id>FC1</mt10id></db></dbs>",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let detail = client_for(&server).fetch_detail("PF000001").await.unwrap();
        assert_eq!(detail.facility_id().as_deref(), Some("FC1"));
    }

    #[test]
    fn new_rejects_unusable_base_url() {
        for base_url in ["not a url", "mailto:kopis@example.com"] {
            let config = IngestConfig {
                api_key: "test-key".into(),
                base_url: base_url.into(),
                ..IngestConfig::default()
            };
            assert!(matches!(
                KopisClient::new(&config),
                Err(KopisError::InvalidBaseUrl(_))
            ));
        }
    }

    #[test]
    fn detail_url_keeps_id_in_one_segment() {
        let config = IngestConfig {
            api_key: "test-key".into(),
            base_url: "http://kopis.test/openApi/restful/pblprfr/".into(),
            ..IngestConfig::default()
        };
        let client = KopisClient::new(&config).unwrap();
        assert_eq!(
            client.detail_url("PF1").as_str(),
            "http://kopis.test/openApi/restful/pblprfr/PF1"
        );
        assert_eq!(
            client.detail_url("PF/1?x#y").as_str(),
            "http://kopis.test/openApi/restful/pblprfr/PF%2F1%3Fx%23y"
        );
    }

    #[tokio::test]
    async fn detail_request_encodes_reserved_characters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/openApi/restful/pblprfr/PF%2F1%3Fx"))
            .and(query_param("service", "test-key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<dbs><db><mt10id>FC9</mt10id></db></dbs>"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let detail = client_for(&server).fetch_detail("PF/1?x").await.unwrap();
        assert_eq!(detail.facility_id().as_deref(), Some("FC9"));
    }

    #[tokio::test]
    async fn detail_absent_for_empty_and_failed_responses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/openApi/restful/pblprfr/EMPTY"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<dbs></dbs>"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/openApi/restful/pblprfr/BROKEN"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/openApi/restful/pblprfr/GARBLED"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<dbs><db><mt10id>FC1"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(client.fetch_detail("EMPTY").await.is_none());
        assert!(client.fetch_detail("BROKEN").await.is_none());
        assert!(client.fetch_detail("GARBLED").await.is_none());
    }
}
