//! HTTP client for the Exoscale v2 compute API.
//!
//! [`ExoscaleClient`] implements [`ComputeApi`] with signed JSON requests.
//! Lists are unwrapped from their envelope objects, and HTTP 404 and 409
//! responses map to [`ApiError::NotFound`] and [`ApiError::Conflict`].

pub mod signer;

use std::sync::LazyLock;
use std::time::Duration;

use reqwest::{Method, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tracing::debug;
use uuid::Uuid;

use crate::compute::{
    AntiAffinityGroup, ApiError, ApiFuture, ComputeApi, CreateAntiAffinityGroupRequest,
    CreateInstanceRequest, CreateSecurityGroupRequest, Credentials, Instance, InstanceType,
    Operation, RegisterSshKeyRequest, SecurityGroup, SecurityGroupRule, SshKey, Template, Zone,
};
use crate::config::DriverConfig;

use self::signer::{SignedRequest, authorization, expiry_from_now};

/// Global endpoint used for zone discovery.
pub const DEFAULT_ENDPOINT: &str = "https://api-ch-gva-2.exoscale.com/v2";
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);
const PUBLIC_TEMPLATES: [(&str, &str); 1] = [("visibility", "public")];

static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

#[derive(Deserialize)]
struct ZoneList {
    #[serde(default)]
    zones: Vec<Zone>,
}

#[derive(Deserialize)]
struct TemplateList {
    #[serde(default)]
    templates: Vec<Template>,
}

#[derive(Deserialize)]
struct InstanceTypeList {
    #[serde(default, rename = "instance-types")]
    instance_types: Vec<InstanceType>,
}

#[derive(Deserialize)]
struct SecurityGroupList {
    #[serde(default, rename = "security-groups")]
    security_groups: Vec<SecurityGroup>,
}

#[derive(Deserialize)]
struct AntiAffinityGroupList {
    #[serde(default, rename = "anti-affinity-groups")]
    anti_affinity_groups: Vec<AntiAffinityGroup>,
}

#[derive(Deserialize)]
struct InstancePassword {
    password: String,
}

/// Signed client for one API endpoint.
#[derive(Clone, Debug)]
pub struct ExoscaleClient {
    credentials: Credentials,
    endpoint: String,
}

impl ExoscaleClient {
    /// Creates a client for `endpoint`, or [`DEFAULT_ENDPOINT`] when absent.
    #[must_use]
    pub fn new(credentials: Credentials, endpoint: Option<&str>) -> Self {
        let base = endpoint.unwrap_or(DEFAULT_ENDPOINT);
        Self {
            credentials,
            endpoint: base.trim_end_matches('/').to_owned(),
        }
    }

    /// Creates a client from the credentials and endpoint override of a
    /// machine configuration.
    #[must_use]
    pub fn from_config(config: &DriverConfig) -> Self {
        Self::new(config.credentials.clone(), config.endpoint.as_deref())
    }

    /// Returns the base URL requests are sent to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        self.send(Method::GET, path, query, String::new()).await
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let encoded = encode_body(path, body)?;
        self.send(Method::POST, path, &[], encoded).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: String,
    ) -> Result<T, ApiError> {
        let label = format!("{method} {path}");
        let mut url = Url::parse(&format!("{}{path}", self.endpoint)).map_err(|err| {
            ApiError::Transport {
                message: format!("invalid URL for {label}: {err}"),
            }
        })?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        let expires = expiry_from_now()?;
        let signed = SignedRequest {
            method: method.as_str(),
            path: url.path(),
            body: &body,
            query,
        };
        let header = authorization(&self.credentials, &signed, expires)?;

        debug!(request = %label, "calling compute API");
        let mut request = HTTP_CLIENT
            .request(method, url)
            .header(reqwest::header::AUTHORIZATION, header);
        if !body.is_empty() {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body);
        }
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(status_error(&label, status, text));
        }

        serde_json::from_str(&text).map_err(|err| ApiError::Decode {
            endpoint: label,
            message: err.to_string(),
        })
    }
}

fn encode_body<B: Serialize>(path: &str, body: &B) -> Result<String, ApiError> {
    serde_json::to_string(body).map_err(|err| ApiError::Decode {
        endpoint: path.to_owned(),
        message: err.to_string(),
    })
}

fn status_error(label: &str, status: StatusCode, body: String) -> ApiError {
    match status {
        StatusCode::NOT_FOUND => ApiError::NotFound {
            resource: label.to_owned(),
        },
        StatusCode::CONFLICT => ApiError::Conflict { message: body },
        _ => ApiError::Http {
            endpoint: label.to_owned(),
            status: status.as_u16(),
            message: body,
        },
    }
}

impl ComputeApi for ExoscaleClient {
    fn with_endpoint(&self, endpoint: &str) -> Self {
        Self::new(self.credentials.clone(), Some(endpoint))
    }

    fn list_zones(&self) -> ApiFuture<'_, Vec<Zone>> {
        Box::pin(async move {
            let list: ZoneList = self.get("/zone", &[]).await?;
            Ok(list.zones)
        })
    }

    fn list_templates(&self) -> ApiFuture<'_, Vec<Template>> {
        Box::pin(async move {
            let list: TemplateList = self.get("/template", &PUBLIC_TEMPLATES).await?;
            Ok(list.templates)
        })
    }

    fn list_instance_types(&self) -> ApiFuture<'_, Vec<InstanceType>> {
        Box::pin(async move {
            let list: InstanceTypeList = self.get("/instance-type", &[]).await?;
            Ok(list.instance_types)
        })
    }

    fn list_security_groups(&self) -> ApiFuture<'_, Vec<SecurityGroup>> {
        Box::pin(async move {
            let list: SecurityGroupList = self.get("/security-group", &[]).await?;
            Ok(list.security_groups)
        })
    }

    fn create_security_group<'a>(
        &'a self,
        request: &'a CreateSecurityGroupRequest,
    ) -> ApiFuture<'a, Operation> {
        Box::pin(self.post("/security-group", request))
    }

    fn add_rule_to_security_group<'a>(
        &'a self,
        security_group_id: Uuid,
        rule: &'a SecurityGroupRule,
    ) -> ApiFuture<'a, Operation> {
        Box::pin(async move {
            let path = format!("/security-group/{security_group_id}/rules");
            self.post(&path, rule).await
        })
    }

    fn list_anti_affinity_groups(&self) -> ApiFuture<'_, Vec<AntiAffinityGroup>> {
        Box::pin(async move {
            let list: AntiAffinityGroupList = self.get("/anti-affinity-group", &[]).await?;
            Ok(list.anti_affinity_groups)
        })
    }

    fn create_anti_affinity_group<'a>(
        &'a self,
        request: &'a CreateAntiAffinityGroupRequest,
    ) -> ApiFuture<'a, Operation> {
        Box::pin(self.post("/anti-affinity-group", request))
    }

    fn register_ssh_key<'a>(
        &'a self,
        request: &'a RegisterSshKeyRequest,
    ) -> ApiFuture<'a, Operation> {
        Box::pin(self.post("/ssh-key", request))
    }

    fn get_ssh_key<'a>(&'a self, name: &'a str) -> ApiFuture<'a, SshKey> {
        Box::pin(async move { self.get(&format!("/ssh-key/{name}"), &[]).await })
    }

    fn delete_ssh_key<'a>(&'a self, name: &'a str) -> ApiFuture<'a, Operation> {
        Box::pin(async move {
            self.send(Method::DELETE, &format!("/ssh-key/{name}"), &[], String::new())
                .await
        })
    }

    fn create_instance<'a>(
        &'a self,
        request: &'a CreateInstanceRequest,
    ) -> ApiFuture<'a, Operation> {
        Box::pin(self.post("/instance", request))
    }

    fn get_instance(&self, id: Uuid) -> ApiFuture<'_, Instance> {
        Box::pin(async move { self.get(&format!("/instance/{id}"), &[]).await })
    }

    fn start_instance(&self, id: Uuid) -> ApiFuture<'_, Operation> {
        Box::pin(self.instance_action(id, "start"))
    }

    fn stop_instance(&self, id: Uuid) -> ApiFuture<'_, Operation> {
        Box::pin(self.instance_action(id, "stop"))
    }

    fn reboot_instance(&self, id: Uuid) -> ApiFuture<'_, Operation> {
        Box::pin(self.instance_action(id, "reboot"))
    }

    fn delete_instance(&self, id: Uuid) -> ApiFuture<'_, Operation> {
        Box::pin(async move {
            self.send(Method::DELETE, &format!("/instance/{id}"), &[], String::new())
                .await
        })
    }

    fn reveal_instance_password(&self, id: Uuid) -> ApiFuture<'_, String> {
        Box::pin(async move {
            let revealed: InstancePassword =
                self.get(&format!("/instance/{id}:password"), &[]).await?;
            Ok(revealed.password)
        })
    }

    fn get_operation(&self, id: Uuid) -> ApiFuture<'_, Operation> {
        Box::pin(async move { self.get(&format!("/operation/{id}"), &[]).await })
    }
}

impl ExoscaleClient {
    async fn instance_action(&self, id: Uuid, action: &str) -> Result<Operation, ApiError> {
        let path = format!("/instance/{id}:{action}");
        self.send(Method::PUT, &path, &[], String::from("{}")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(StatusCode::NOT_FOUND, "NotFound")]
    #[case(StatusCode::CONFLICT, "Conflict")]
    #[case(StatusCode::INTERNAL_SERVER_ERROR, "Http")]
    #[case(StatusCode::FORBIDDEN, "Http")]
    fn statuses_map_to_api_errors(#[case] status: StatusCode, #[case] expected: &str) {
        let err = status_error("GET /instance/x", status, String::from("body"));

        let variant = match err {
            ApiError::NotFound { .. } => "NotFound",
            ApiError::Conflict { .. } => "Conflict",
            ApiError::Http { .. } => "Http",
            _ => "other",
        };
        assert_eq!(variant, expected);
    }

    #[test]
    fn http_errors_keep_status_and_body() {
        let err = status_error(
            "POST /instance",
            StatusCode::BAD_REQUEST,
            String::from("invalid disk size"),
        );

        assert_eq!(
            err,
            ApiError::Http {
                endpoint: String::from("POST /instance"),
                status: 400,
                message: String::from("invalid disk size"),
            }
        );
    }

    #[test]
    fn new_defaults_to_global_endpoint() {
        let client = ExoscaleClient::new(Credentials::new("key", "secret"), None);

        assert_eq!(client.endpoint(), DEFAULT_ENDPOINT);
    }

    #[test]
    fn with_endpoint_rebinds_and_keeps_credentials() {
        let client = ExoscaleClient::new(Credentials::new("key", "secret"), None);

        let zoned = client.with_endpoint("https://api-de-fra-1.exoscale.com/v2/");

        assert_eq!(zoned.endpoint(), "https://api-de-fra-1.exoscale.com/v2");
        assert_eq!(zoned.credentials, client.credentials);
    }

    #[test]
    fn envelopes_decode_kebab_case_lists() {
        let body = r#"{"instance-types":[{"id":"8e4e1f4e-2f3b-4a4f-9d5c-2b7f8a1c0d11","family":"standard","size":"small"}]}"#;

        let list: InstanceTypeList = serde_json::from_str(body).expect("decodes");

        let first = list.instance_types.first().expect("one type");
        assert_eq!(first.composite_key(), "standard.small");
    }

    #[test]
    fn security_group_listing_tolerates_portless_rules() {
        let body = r#"{"security-groups":[
            {"id":"0b7e5c1a-9d2f-4c3e-8a6b-1f2e3d4c5b6a","name":"default","rules":[
                {"id":"5f1c2d3e-4a5b-6c7d-8e9f-0a1b2c3d4e5f","flow-direction":"ingress","protocol":"icmp","icmp":{"code":0,"type":8},"network":"0.0.0.0/0"},
                {"flow-direction":"ingress","protocol":"tcp","start-port":22,"end-port":22,"security-group":{"id":"0b7e5c1a-9d2f-4c3e-8a6b-1f2e3d4c5b6a","name":"default"}}
            ]},
            {"id":"7a6b5c4d-3e2f-4a1b-9c8d-7e6f5a4b3c2d","name":"exomachine"}
        ]}"#;

        let list: SecurityGroupList = serde_json::from_str(body).expect("decodes");

        let names: Vec<&str> = list
            .security_groups
            .iter()
            .map(|group| group.name.as_str())
            .collect();
        assert_eq!(names, ["default", "exomachine"]);
        let rules = &list
            .security_groups
            .first()
            .expect("default group")
            .rules;
        let icmp = rules.first().expect("icmp rule");
        assert_eq!(icmp.protocol, "icmp");
        assert_eq!(icmp.start_port, None);
        assert_eq!(icmp.network.as_deref(), Some("0.0.0.0/0"));
        let ssh = rules.get(1).expect("ssh rule");
        assert_eq!(ssh.start_port, Some(22));
        let source = ssh.security_group.as_ref().expect("group source");
        assert_eq!(source.visibility, "");
    }

    #[test]
    fn missing_envelope_field_decodes_as_empty() {
        let list: SecurityGroupList = serde_json::from_str("{}").expect("decodes");

        assert!(list.security_groups.is_empty());
    }
}
