//! Robot-server adapter over HTTP/JSON.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::{CommandId, ProtocolId, RunId},
    error::{ApiError, ApiException},
    protocol::{
        Command, CommandKind, CreateRunRequest, Envelope, ProtocolAnalysis, ProtocolRecord,
        RunRecord,
    },
};
use tracing::{debug, info, warn};
use url::Url;

use crate::{CommandDispatch, DispatchError, ProtocolResource, RunControl, RunResource};

#[derive(Clone)]
pub struct HttpRobotClient {
    http: Client,
    base_url: Url,
}

impl HttpRobotClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base_url =
            Url::parse(base_url).with_context(|| format!("invalid robot url '{base_url}'"))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            http: Client::new(),
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("failed to build robot endpoint for '{path}'"))
    }

    async fn get_data<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.endpoint(path)?;
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?;
        read_envelope(response).await
    }
}

async fn read_envelope<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ApiException::from(ApiError::from_response(status.as_u16(), &body)).into());
    }
    let envelope: Envelope<T> = response
        .json()
        .await
        .context("robot server returned an unexpected body")?;
    Ok(envelope.data)
}

#[async_trait]
impl CommandDispatch for HttpRobotClient {
    async fn dispatch(
        &self,
        run_id: &RunId,
        command: CommandKind,
    ) -> Result<Command, DispatchError> {
        let command_type = command.command_type().to_string();
        let transport = |reason: String| DispatchError::Transport {
            command_type: command_type.clone(),
            reason,
        };

        let url = self
            .endpoint(&format!("runs/{run_id}/commands"))
            .map_err(|e| transport(e.to_string()))?;
        let response = self
            .http
            .post(url)
            .json(&Envelope::new(command))
            .send()
            .await
            .map_err(|e| transport(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            let error = ApiError::from_response(status.as_u16(), &body);
            warn!(%run_id, %command_type, code = ?error.code, "robot rejected command");
            return Err(DispatchError::Rejected {
                command_type: command_type.clone(),
                reason: error.message,
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = ApiError::from_response(status.as_u16(), &body);
            return Err(transport(error.message));
        }

        let accepted: Envelope<Command> = response
            .json()
            .await
            .map_err(|e| transport(format!("unexpected response body: {e}")))?;
        debug!(%run_id, %command_type, command_id = %accepted.data.id, "robot accepted command");
        Ok(accepted.data)
    }
}

#[async_trait]
impl RunResource for HttpRobotClient {
    async fn run(&self, run_id: &RunId) -> Result<RunRecord> {
        self.get_data(&format!("runs/{run_id}")).await
    }

    async fn command(&self, run_id: &RunId, command_id: &CommandId) -> Result<Command> {
        self.get_data(&format!("runs/{run_id}/commands/{command_id}"))
            .await
    }
}

#[async_trait]
impl ProtocolResource for HttpRobotClient {
    async fn protocol_analysis(&self, protocol_id: &ProtocolId) -> Result<ProtocolAnalysis> {
        let record: ProtocolRecord = self.get_data(&format!("protocols/{protocol_id}")).await?;
        record
            .latest_completed_analysis()
            .cloned()
            .ok_or_else(|| anyhow!("analysis of protocol {protocol_id} is still pending"))
    }
}

#[async_trait]
impl RunControl for HttpRobotClient {
    async fn restart_run(&self, run_id: &RunId) -> Result<RunId> {
        let previous = self.run(run_id).await?;
        let protocol_id = previous
            .protocol_id
            .ok_or_else(|| anyhow!("run {run_id} has no protocol to restart"))?;

        let url = self.endpoint("runs")?;
        let response = self
            .http
            .post(url)
            .json(&Envelope::new(CreateRunRequest {
                protocol_id: protocol_id.clone(),
            }))
            .send()
            .await
            .context("failed to create replacement run")?;
        let created: RunRecord = read_envelope(response).await?;
        info!(previous_run = %run_id, new_run = %created.id, %protocol_id, "restarted run");
        Ok(created.id)
    }
}
