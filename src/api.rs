use crate::sensor::DeviceCapability;
use std::time::Duration;

/// The status endpoints this tool reads from the device's local HTTP API.
///
/// Each command names one JSON payload; sensors refer to their source payload
/// through this identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[derive(strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum ApiCommand {
    NetworkStatus,
    PowerStatus,
    P1Status,
}

impl ApiCommand {
    pub fn path(self) -> &'static str {
        match self {
            Self::NetworkStatus => "api/v1/network/status",
            Self::PowerStatus => "api/v1/power/status",
            Self::P1Status => "api/v1/p1/status",
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("could not construct the HTTP client")]
    CreateClient(#[source] reqwest::Error),
    #[error("{1} API request failed")]
    Request(#[source] reqwest::Error, ApiCommand),
    #[error("{1} response payload is not valid JSON")]
    DecodeJson(#[source] reqwest::Error, ApiCommand),
}

#[derive(clap::Parser, Clone)]
#[group(id = "api::Args")]
pub struct Args {
    /// The base URL of the device's local API (e.g. `http://192.168.1.50`).
    #[arg(long)]
    pub device: String,

    /// The local API username printed on the device label.
    #[arg(long, short = 'u')]
    pub username: Option<String>,

    /// The local API password printed on the device label.
    #[arg(long, short = 'p')]
    pub password: Option<String>,

    /// Consider an API request failed if no response arrives in this amount
    /// of time.
    #[arg(long, default_value = "10s")]
    pub request_timeout: humantime::Duration,
}

impl Args {
    pub fn to_client(&self) -> Result<DeviceClient, Error> {
        let credentials = match (&self.username, &self.password) {
            (Some(user), Some(password)) => Some((user.clone(), password.clone())),
            _ => None,
        };
        DeviceClient::new(&self.device, credentials, *self.request_timeout)
    }
}

/// Client for the device's local HTTP JSON API.
pub struct DeviceClient {
    http: reqwest::Client,
    base: String,
    credentials: Option<(String, String)>,
}

impl DeviceClient {
    pub fn new(
        base: &str,
        credentials: Option<(String, String)>,
        request_timeout: Duration,
    ) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(Error::CreateClient)?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    /// Fetches the named status payload once.
    pub async fn get_status(&self, command: ApiCommand) -> Result<serde_json::Value, Error> {
        let url = format!("{}/{}", self.base, command.path());
        let mut request = self.http.get(&url);
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, Some(password));
        }
        let response = request
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| Error::Request(e, command))?;
        response.json().await.map_err(|e| Error::DecodeJson(e, command))
    }

    /// Classifies the connected device into one of the known families.
    ///
    /// The classification happens exactly once during setup; everything after
    /// this point branches on the returned tag. A device answering neither
    /// probe is not an error, it merely gets the minimal sensor set.
    pub async fn detect_capability(&self) -> DeviceCapability {
        match self.get_status(ApiCommand::PowerStatus).await {
            Ok(_) => return DeviceCapability::Battery,
            Err(error) => {
                tracing::debug!(
                    error = &error as &dyn std::error::Error,
                    "device did not answer the battery status probe"
                );
            }
        }
        match self.get_status(ApiCommand::P1Status).await {
            Ok(_) => return DeviceCapability::MeterReader,
            Err(error) => {
                tracing::debug!(
                    error = &error as &dyn std::error::Error,
                    "device did not answer the meter status probe"
                );
            }
        }
        tracing::warn!("device family not recognized, only base diagnostics will be exposed");
        DeviceCapability::Unknown
    }
}
