//! reqwest-backed implementation of [`ExecutionTransport`].

use async_trait::async_trait;
use remote_exec_core::{ExecutionTransport, OutputPoll, SessionId, TransportError};
use reqwest::{
    Client, RequestBuilder, Response,
    header::{HeaderName, HeaderValue},
};
use serde::de::DeserializeOwned;
use url::Url;

use crate::{
    ConstructionError, CsrfToken, TransportConfig,
    protocol::{
        AckResponse, EndSessionRequest, ErrorBody, GetOutputResponse, SendInputRequest,
        StartSessionRequest, StartSessionResponse,
    },
};

struct Urls {
    start_session: Url,
    get_output: Url,
    send_input: Url,
    end_session: Url,
}

/// HTTP transport for the execution service.
///
/// Every request carries the forgery-protection header. Session cookies set
/// by the service are kept in the client's cookie store.
pub struct HttpTransport {
    client: Client,
    urls: Urls,
    token_header: HeaderName,
    token_value: HeaderValue,
}

impl HttpTransport {
    /// Create a transport.
    ///
    /// # Errors
    /// Returns `MissingToken` if `token` is absent or blank; the client
    /// refuses to initialize without one.
    pub fn new(config: &TransportConfig, token: Option<String>) -> Result<Self, ConstructionError> {
        let token = CsrfToken::new(token.ok_or(ConstructionError::MissingToken)?)?;
        let client = Client::builder().cookie_store(true).build()?;
        Self::with_client(client, config, &token)
    }

    /// Create a transport around an existing client.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if the header name, token or endpoints are invalid.
    pub fn with_client(
        client: Client,
        config: &TransportConfig,
        token: &CsrfToken,
    ) -> Result<Self, ConstructionError> {
        let token_header = HeaderName::from_bytes(config.token_header().as_bytes())
            .map_err(|err| ConstructionError::InvalidConfig(format!("token header: {err}")))?;
        let mut token_value = HeaderValue::from_str(token.expose())
            .map_err(|err| ConstructionError::InvalidConfig(format!("token value: {err}")))?;
        token_value.set_sensitive(true);

        let endpoints = config.endpoints();
        let urls = Urls {
            start_session: config.endpoint(&endpoints.start_session)?,
            get_output: config.endpoint(&endpoints.get_output)?,
            send_input: config.endpoint(&endpoints.send_input)?,
            end_session: config.endpoint(&endpoints.end_session)?,
        };

        Ok(Self {
            client,
            urls,
            token_header,
            token_value,
        })
    }

    /// Load the service's page and take the token from its
    /// `<meta name="csrf-token">` tag.
    ///
    /// The same client (and cookie jar) is used for later requests.
    ///
    /// # Errors
    /// Returns `MissingToken` if the page has no token, or a client error if
    /// the page cannot be fetched.
    pub async fn discover(config: &TransportConfig) -> Result<Self, ConstructionError> {
        let client = Client::builder().cookie_store(true).build()?;
        let response = client.get(config.base_url().clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ConstructionError::InvalidConfig(format!(
                "token page returned HTTP {status}"
            )));
        }
        let page = response.text().await?;
        let token = CsrfToken::from_meta(&page)?;
        tracing::debug!(url = %config.base_url(), "discovered forgery-protection token");
        Self::with_client(client, config, &token)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, TransportError> {
        let response = builder
            .header(self.token_header.clone(), self.token_value.clone())
            .send()
            .await
            .map_err(|err| TransportError::Network(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let reason = response
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|body| body.error);
        Err(TransportError::HttpStatus {
            status: status.as_u16(),
            reason,
        })
    }

    async fn send_json<R: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<R, TransportError> {
        self.send(builder)
            .await?
            .json::<R>()
            .await
            .map_err(|err| TransportError::InvalidResponse(err.to_string()))
    }
}

fn rejected(error: Option<String>, fallback: &str) -> TransportError {
    TransportError::Rejected(error.unwrap_or_else(|| fallback.to_string()))
}

#[async_trait]
impl ExecutionTransport for HttpTransport {
    async fn start_session(
        &self,
        code: &str,
        language: &str,
    ) -> Result<SessionId, TransportError> {
        tracing::debug!(language, bytes = code.len(), "starting session");
        let builder = self
            .client
            .post(self.urls.start_session.clone())
            .json(&StartSessionRequest { code, language });
        let response: StartSessionResponse = self.send_json(builder).await?;

        if !response.success {
            return Err(rejected(response.error, "Failed to start session"));
        }
        response
            .session_id
            .filter(|id| !id.is_empty())
            .map(SessionId::new)
            .ok_or_else(|| TransportError::InvalidResponse("missing session_id".into()))
    }

    async fn get_output(&self, session_id: &SessionId) -> Result<OutputPoll, TransportError> {
        let builder = self
            .client
            .get(self.urls.get_output.clone())
            .query(&[("session_id", session_id.as_str())]);
        let response: GetOutputResponse = self.send_json(builder).await?;

        if !response.success {
            return Err(rejected(response.error, "Failed to get output"));
        }
        Ok(response.into())
    }

    async fn send_input(&self, session_id: &SessionId, input: &str) -> Result<(), TransportError> {
        tracing::debug!(%session_id, bytes = input.len(), "sending input");
        let builder = self
            .client
            .post(self.urls.send_input.clone())
            .json(&SendInputRequest { session_id, input });
        let response: AckResponse = self.send_json(builder).await?;

        if response.success {
            Ok(())
        } else {
            Err(rejected(response.error, "Failed to send input"))
        }
    }

    async fn end_session(&self, session_id: &SessionId) -> Result<(), TransportError> {
        tracing::debug!(%session_id, "ending session");
        let builder = self
            .client
            .post(self.urls.end_session.clone())
            .json(&EndSessionRequest { session_id });
        // Only the status matters; the body is not inspected.
        self.send(builder).await.map(drop)
    }
}
