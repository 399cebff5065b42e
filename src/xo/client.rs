use crate::settings::ConnectionProfile;
use crate::xo::error::{Result as XoResult, XoError};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, COOKIE};
use reqwest::{Certificate, Client, Method};
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::{ParseError, Url};

pub const DEFAULT_LIMIT: u64 = 42;

/// Shared handle on the Xen Orchestra REST API.
///
/// Cloning is cheap and clones share one connection pool; the client holds no
/// per-call state.
#[derive(Clone)]
pub struct XoClient {
    pub(crate) client: Client,
    pub(crate) base_url: Url,
}

/// Query parameters understood by XO collection endpoints.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub fields: Vec<String>,
    pub filter: Vec<(String, String)>,
    pub limit: Option<u64>,
}

impl ListQuery {
    pub fn with_fields(fields: &[&str]) -> Self {
        Self {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            ..Default::default()
        }
    }

    fn apply(&self, url: &mut Url) {
        let mut pairs = url.query_pairs_mut();
        if !self.fields.is_empty() {
            pairs.append_pair("fields", &self.fields.join(","));
        }
        if !self.filter.is_empty() {
            let filter = self
                .filter
                .iter()
                .map(|(k, v)| format!("{}:{}", k, v))
                .collect::<Vec<_>>()
                .join(" ");
            pairs.append_pair("filter", &filter);
        }
        pairs.append_pair("limit", &self.limit.unwrap_or(DEFAULT_LIMIT).to_string());
    }
}

impl XoClient {
    pub fn new(profile: &ConnectionProfile) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            secret_header(format!("Bearer {}", profile.api_token))?,
        );
        // The REST API authenticates through this cookie; the bearer header covers proxies.
        headers.insert(
            COOKIE,
            secret_header(format!("authenticationToken={}", profile.api_token))?,
        );

        let mut builder = Client::builder()
            .default_headers(headers)
            .timeout(profile.timeout)
            .connect_timeout(profile.timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")));

        if profile.tls_verify {
            if let Some(path) = profile.ca_cert_path() {
                let pem = std::fs::read(path)
                    .with_context(|| format!("Failed to read CA bundle {}", path.display()))?;
                let certs = Certificate::from_pem_bundle(&pem)
                    .with_context(|| format!("Invalid CA bundle {}", path.display()))?;
                if certs.is_empty() {
                    anyhow::bail!("CA bundle {} contains no certificates", path.display());
                }
                for cert in certs {
                    builder = builder.add_root_certificate(cert);
                }
                info!("Trusting CA bundle {}", path.display());
            }
        } else {
            warn!(
                "TLS certificate verification is DISABLED for {}; the upstream identity is not checked",
                profile.base_url
            );
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder.build().context("Failed to build reqwest client")?;

        Ok(Self {
            client,
            base_url: profile.base_url.clone(),
        })
    }

    /// Builds `<base>/rest/v0/<segments..>`, encoding each segment on its own.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> XoResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| XoError::Url(ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(["rest", "v0"])
            .extend(segments);
        Ok(url)
    }

    pub(crate) async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> XoResult<T> {
        debug!("{} {}", method, url);
        let mut req = self.client.request(method, url);

        if let Some(b) = body {
            req = req.json(b);
        }

        let resp = req.send().await.map_err(XoError::from_transport)?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(XoError::from_status(status, text));
        }

        let bytes = resp.bytes().await.map_err(XoError::from_transport)?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            // 204 and empty acknowledgments
            return serde_json::from_value(Value::Null).map_err(XoError::Json);
        }
        serde_json::from_slice(&bytes).map_err(|e| XoError::Malformed(e.to_string()))
    }

    pub(crate) async fn list(&self, collection: &str, query: &ListQuery) -> XoResult<Vec<Value>> {
        let mut url = self.endpoint(&[collection])?;
        query.apply(&mut url);

        let body: Value = self.request(Method::GET, url, None).await?;
        let items = match body {
            Value::Array(items) => items,
            Value::Object(mut map) => match map.remove("data") {
                Some(Value::Array(items)) => items,
                _ => {
                    return Err(XoError::Malformed(format!(
                        "expected a list of {}",
                        collection
                    )))
                }
            },
            other => {
                return Err(XoError::Malformed(format!(
                    "expected a list of {}, got {}",
                    collection, other
                )))
            }
        };

        Ok(items.into_iter().map(strip_href).collect())
    }
}

fn secret_header(value: String) -> Result<HeaderValue> {
    let mut header = HeaderValue::from_str(&value)
        .context("XO_API_TOKEN contains characters that are not valid in an HTTP header")?;
    header.set_sensitive(true);
    Ok(header)
}

// hrefs point back into the REST API and only confuse the host
fn strip_href(mut item: Value) -> Value {
    if let Some(map) = item.as_object_mut() {
        map.remove("href");
    }
    item
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn profile(base_url: &str) -> ConnectionProfile {
        ConnectionProfile {
            base_url: Url::parse(base_url).unwrap(),
            api_token: "token".to_string(),
            tls_verify: true,
            ca_cert_path: None,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let client = XoClient::new(&profile("https://xo.lab/")).unwrap();
        let url = client.endpoint(&["vms", "a/b c"]).unwrap();
        assert_eq!(url.as_str(), "https://xo.lab/rest/v0/vms/a%2Fb%20c");
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let client = XoClient::new(&profile("https://xo.lab/xo/")).unwrap();
        let url = client.endpoint(&["backup-jobs"]).unwrap();
        assert_eq!(url.as_str(), "https://xo.lab/xo/rest/v0/backup-jobs");
    }

    #[test]
    fn test_list_query_parameters() {
        let mut url = Url::parse("https://xo.lab/rest/v0/vms").unwrap();
        let query = ListQuery {
            fields: vec!["id".into(), "name_label".into()],
            filter: vec![("power_state".into(), "Running".into())],
            limit: None,
        };
        query.apply(&mut url);

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("fields".to_string(), "id,name_label".to_string()),
                ("filter".to_string(), "power_state:Running".to_string()),
                ("limit".to_string(), "42".to_string()),
            ]
        );
    }

    #[test]
    fn test_missing_ca_bundle_fails_construction() {
        let mut p = profile("https://xo.lab/");
        p.ca_cert_path = Some("/nonexistent/ca.pem".into());
        assert!(XoClient::new(&p).is_err());
    }

    #[test]
    fn test_token_must_be_header_safe() {
        let mut p = profile("https://xo.lab/");
        p.api_token = "bad\ntoken".to_string();
        assert!(XoClient::new(&p).is_err());
    }
}
