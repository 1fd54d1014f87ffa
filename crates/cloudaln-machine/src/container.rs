//! Container run protocol.
//!
//! Pull → create → start → wait, strictly in order. Each stage either
//! yields what the next one needs or ends the run; nothing is retried.

use serde::Deserialize;
use tracing::{error, info};

use cloudaln_core::{RunOutcome, RunRequest, RunStage};

use crate::error::ProtocolError;
use crate::transport::{EngineRequest, EngineResponse, EngineTransport};

#[derive(Debug, Deserialize)]
struct CreateResponse {
    #[serde(rename = "Id")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct WaitResponse {
    #[serde(rename = "StatusCode")]
    status_code: i64,
}

/// Run `request` to completion over `transport`.
///
/// Returns the workload's exit code, or [`RunOutcome::ProtocolFailure`] if
/// any stage failed. Exactly one outcome is produced per call.
pub async fn run_container(transport: &dyn EngineTransport, request: &RunRequest) -> RunOutcome {
    match drive(transport, request).await {
        Ok(code) => {
            info!(image = %request.image, exit_code = code, "Container exited");
            RunOutcome::Exited(code)
        }
        Err(e) => {
            error!(stage = %e.stage(), error = %e, "Container run failed");
            RunOutcome::ProtocolFailure
        }
    }
}

async fn drive(transport: &dyn EngineTransport, request: &RunRequest) -> Result<i32, ProtocolError> {
    pull(transport, &request.image).await?;
    let id = create(transport, request).await?;
    start(transport, &id).await?;
    wait(transport, &id).await
}

async fn pull(transport: &dyn EngineTransport, image: &str) -> Result<(), ProtocolError> {
    info!(image = %image, "Pulling image...");
    let request =
        EngineRequest::new(RunStage::Pulling, "/images/create").with_query("fromImage", image);
    call(transport, request).await?;
    Ok(())
}

async fn create(transport: &dyn EngineTransport, request: &RunRequest) -> Result<String, ProtocolError> {
    info!(image = %request.image, "Creating container...");
    let body = serde_json::to_value(request).map_err(|e| ProtocolError::InvalidBody {
        stage: RunStage::Creating,
        reason: e.to_string(),
    })?;

    let response = call(
        transport,
        EngineRequest::new(RunStage::Creating, "/containers/create").with_body(body),
    )
    .await?;

    let parsed: CreateResponse = parse_body(RunStage::Creating, &response)?;
    if parsed.id.is_empty() {
        error!(body = %response.body_text(), "Container create returned an empty id");
        return Err(ProtocolError::InvalidBody {
            stage: RunStage::Creating,
            reason: "empty container id".to_string(),
        });
    }

    info!(container = %parsed.id, "Container created");
    Ok(parsed.id)
}

async fn start(transport: &dyn EngineTransport, id: &str) -> Result<(), ProtocolError> {
    info!(container = %id, "Starting container...");
    let path = format!("/containers/{}/start", id);
    call(transport, EngineRequest::new(RunStage::Starting, path)).await?;
    Ok(())
}

async fn wait(transport: &dyn EngineTransport, id: &str) -> Result<i32, ProtocolError> {
    info!(container = %id, "Waiting for container...");
    let path = format!("/containers/{}/wait", id);
    let response = call(transport, EngineRequest::new(RunStage::Waiting, path)).await?;

    let parsed: WaitResponse = parse_body(RunStage::Waiting, &response)?;
    i32::try_from(parsed.status_code)
        .ok()
        .filter(|code| *code >= 0)
        .ok_or_else(|| ProtocolError::InvalidBody {
            stage: RunStage::Waiting,
            reason: format!("exit code {} out of range", parsed.status_code),
        })
}

/// Send one request and require a 2xx reply.
async fn call(
    transport: &dyn EngineTransport,
    request: EngineRequest,
) -> Result<EngineResponse, ProtocolError> {
    let stage = request.stage;
    let response = transport
        .send(request)
        .await
        .map_err(|source| ProtocolError::Transport { stage, source })?;

    if !response.is_success() {
        error!(
            stage = %stage,
            status = response.status,
            body = %response.body_text(),
            "Received invalid status code"
        );
        return Err(ProtocolError::Status {
            stage,
            status: response.status,
        });
    }

    Ok(response)
}

fn parse_body<T: serde::de::DeserializeOwned>(
    stage: RunStage,
    response: &EngineResponse,
) -> Result<T, ProtocolError> {
    serde_json::from_slice(&response.body).map_err(|e| {
        error!(stage = %stage, body = %response.body_text(), error = %e, "Unparseable engine response");
        ProtocolError::InvalidBody {
            stage,
            reason: e.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::TransportError;
    use cloudaln_core::PROTOCOL_FAILURE;

    /// Transport replaying scripted responses and recording requests.
    struct ScriptedTransport {
        replies: Mutex<VecDeque<Result<EngineResponse, TransportError>>>,
        requests: Mutex<Vec<EngineRequest>>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<Result<EngineResponse, TransportError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn happy() -> Vec<Result<EngineResponse, TransportError>> {
            vec![
                Ok(EngineResponse::new(200, r#"{"status":"Downloaded"}"#)),
                Ok(EngineResponse::new(201, r#"{"Id":"c0ffee","Warnings":[]}"#)),
                Ok(EngineResponse::new(204, "")),
                Ok(EngineResponse::new(200, r#"{"StatusCode":0}"#)),
            ]
        }

        fn stages(&self) -> Vec<RunStage> {
            self.requests.lock().unwrap().iter().map(|r| r.stage).collect()
        }

        fn paths(&self) -> Vec<String> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.path.clone())
                .collect()
        }
    }

    #[async_trait]
    impl EngineTransport for ScriptedTransport {
        async fn send(&self, request: EngineRequest) -> Result<EngineResponse, TransportError> {
            self.requests.lock().unwrap().push(request);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected extra engine request")
        }
    }

    fn request() -> RunRequest {
        RunRequest::new(
            "statgen/alignment",
            vec!["/bin/bash".to_string(), "-c".to_string(), "true".to_string()],
        )
    }

    fn transport_error() -> TransportError {
        TransportError::Credentials {
            path: "/certs/cert.pem".into(),
            source: std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"),
        }
    }

    #[tokio::test]
    async fn test_all_stages_succeed() {
        let transport = ScriptedTransport::new(ScriptedTransport::happy());
        let outcome = run_container(&transport, &request()).await;

        assert_eq!(outcome, RunOutcome::Exited(0));
        assert_eq!(transport.stages(), RunStage::ALL.to_vec());
    }

    #[tokio::test]
    async fn test_container_id_propagates_into_paths() {
        let transport = ScriptedTransport::new(ScriptedTransport::happy());
        run_container(&transport, &request()).await;

        assert_eq!(
            transport.paths(),
            vec![
                "/images/create",
                "/containers/create",
                "/containers/c0ffee/start",
                "/containers/c0ffee/wait",
            ]
        );
    }

    #[tokio::test]
    async fn test_pull_and_create_payloads() {
        let transport = ScriptedTransport::new(ScriptedTransport::happy());
        run_container(&transport, &request()).await;

        let requests = transport.requests.lock().unwrap();
        assert_eq!(
            requests[0].query,
            vec![("fromImage".to_string(), "statgen/alignment".to_string())]
        );
        let body = requests[1].body.as_ref().unwrap();
        assert_eq!(body["Image"], "statgen/alignment");
        assert_eq!(body["Cmd"][0], "/bin/bash");
        assert!(requests[2].body.is_none());
    }

    #[tokio::test]
    async fn test_workload_exit_code_is_returned() {
        let mut replies = ScriptedTransport::happy();
        replies[3] = Ok(EngineResponse::new(200, r#"{"StatusCode":137}"#));
        let transport = ScriptedTransport::new(replies);

        assert_eq!(run_container(&transport, &request()).await, RunOutcome::Exited(137));
    }

    #[tokio::test]
    async fn test_failure_at_each_stage_short_circuits() {
        for (k, stage) in RunStage::ALL.iter().enumerate() {
            let mut replies = ScriptedTransport::happy();
            replies.truncate(k);
            replies.push(Ok(EngineResponse::new(500, "boom")));
            let transport = ScriptedTransport::new(replies);

            let outcome = run_container(&transport, &request()).await;

            assert_eq!(outcome, RunOutcome::ProtocolFailure, "stage {}", stage);
            assert_eq!(outcome.exit_status(), PROTOCOL_FAILURE);
            assert_eq!(transport.stages(), RunStage::ALL[..=k].to_vec());
        }
    }

    #[tokio::test]
    async fn test_transport_error_at_each_stage_short_circuits() {
        for k in 0..RunStage::ALL.len() {
            let mut replies = ScriptedTransport::happy();
            replies.truncate(k);
            replies.push(Err(transport_error()));
            let transport = ScriptedTransport::new(replies);

            assert_eq!(
                run_container(&transport, &request()).await,
                RunOutcome::ProtocolFailure
            );
            assert_eq!(transport.stages().len(), k + 1);
        }
    }

    #[tokio::test]
    async fn test_pull_500_yields_sentinel() {
        let transport = ScriptedTransport::new(vec![Ok(EngineResponse::new(
            500,
            r#"{"message":"server error"}"#,
        ))]);

        let outcome = run_container(&transport, &request()).await;
        assert_eq!(outcome.exit_status(), PROTOCOL_FAILURE);
        assert_eq!(transport.stages(), vec![RunStage::Pulling]);
    }

    #[tokio::test]
    async fn test_unparseable_create_body() {
        let mut replies = ScriptedTransport::happy();
        replies[1] = Ok(EngineResponse::new(201, "not json"));
        replies.truncate(2);
        let transport = ScriptedTransport::new(replies);

        assert_eq!(
            run_container(&transport, &request()).await,
            RunOutcome::ProtocolFailure
        );
        assert_eq!(transport.stages().len(), 2);
    }

    #[tokio::test]
    async fn test_create_body_without_id() {
        let mut replies = ScriptedTransport::happy();
        replies[1] = Ok(EngineResponse::new(201, r#"{"Warnings":[]}"#));
        replies.truncate(2);
        let transport = ScriptedTransport::new(replies);

        assert_eq!(
            run_container(&transport, &request()).await,
            RunOutcome::ProtocolFailure
        );
    }

    #[tokio::test]
    async fn test_wait_body_without_integer_status() {
        for body in [r#"{"StatusCode":"0"}"#, r#"{}"#, r#"{"StatusCode":-1}"#] {
            let mut replies = ScriptedTransport::happy();
            replies[3] = Ok(EngineResponse::new(200, body));
            let transport = ScriptedTransport::new(replies);

            assert_eq!(
                run_container(&transport, &request()).await,
                RunOutcome::ProtocolFailure,
                "body {}",
                body
            );
        }
    }
}
