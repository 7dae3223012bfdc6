//! End-to-end orchestration of one diagnostic query.
//!
//! Accepting a request resolves the device and source identity, builds the
//! dialect command, registers the query, and detaches a background task
//! that owns its own SSH session for the query's whole lifetime. Nothing
//! cancels that task early except the whole-operation ceiling; a client
//! that stops watching the stream leaves the entry to finish on its own.

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use secrecy::ExposeSecret;

use crate::driver::exec;
use crate::error::{Error, Result};
use crate::glass::command::{self, DEFAULT_MAX_HOPS, SourcePolicy};
use crate::glass::query::{Query, QueryKind, QueryRequest, QueryResponse, QueryStatus};
use crate::glass::registry::QueryStore;
use crate::inventory::{AddressFamily, Device, DeviceDirectory};
use crate::secret;
use crate::transport::{AuthMethod, SshConfig, SshTransport};

/// Executor tuning.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Ceiling for one query's connect plus command time. Distinct from
    /// the driver's per-read timeouts; exceeding it marks the query as a
    /// timeout, not a generic failure.
    pub operation_timeout: Duration,

    /// Connect timeout for the session.
    pub connect_timeout: Duration,

    /// Pause before the device work starts, giving the client time to
    /// attach to the stream before output lands.
    pub start_delay: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_secs(90),
            connect_timeout: Duration::from_secs(10),
            start_delay: Duration::from_millis(500),
        }
    }
}

/// Orchestrates diagnostic queries against the device fleet.
pub struct QueryExecutor {
    directory: Arc<dyn DeviceDirectory>,
    store: Arc<dyn QueryStore>,
    config: ExecutorConfig,
}

impl QueryExecutor {
    pub fn new(
        directory: Arc<dyn DeviceDirectory>,
        store: Arc<dyn QueryStore>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            directory,
            store,
            config,
        }
    }

    /// Accept a diagnostic request.
    ///
    /// An unknown device answers with an error-status response without ever
    /// registering a query (so its id is never streamable). A missing or
    /// unknown source identity is a validation error raised before any
    /// query exists or any connection is attempted. Anything accepted past
    /// those checks is registered as pending and handed to a detached task.
    pub fn submit(self: &Arc<Self>, request: QueryRequest) -> Result<QueryResponse> {
        let Some(device) = self.directory.device(request.router_id) else {
            // Preserved convention of this entry point: report the failure
            // in the response body, never in the registry.
            return Ok(QueryResponse::error(
                uuid::Uuid::new_v4().to_string(),
                format!("router {} not found", request.router_id),
            ));
        };

        let family = AddressFamily::of_target(&request.target);
        let template = command::template_for(request.kind, family).ok_or_else(|| {
            Error::validation(format!(
                "no command template for {} over {:?}",
                request.kind.as_str(),
                family
            ))
        })?;

        let source = match (template.source, request.options.source_ip.as_deref()) {
            (SourcePolicy::Required, None) => {
                return Err(Error::validation(format!(
                    "a source address is required for {}; available: {}",
                    request.kind.as_str(),
                    device.available_sources()
                )));
            }
            (SourcePolicy::Required | SourcePolicy::Optional, Some(identifier)) => {
                Some(device.resolve_source(identifier)?.ip.clone())
            }
            _ => None,
        };

        let max_hops = request.options.max_hops.unwrap_or(DEFAULT_MAX_HOPS);
        let command_line = template.render(&request.target, source.as_deref(), max_hops);

        let query = Query::new(request.kind, &request.target, &device.name);
        let id = self.store.create(query);

        info!(
            "accepted {} query {} for {} on {}",
            request.kind.as_str(),
            id,
            request.target,
            device.name
        );

        let executor = Arc::clone(self);
        let task_id = id.clone();
        tokio::spawn(async move {
            executor.run(task_id, device, request, command_line).await;
        });

        Ok(QueryResponse::accepted(id))
    }

    /// Background body: drive the state machine to a terminal state.
    async fn run(&self, id: String, device: Device, request: QueryRequest, command_line: String) {
        let _ = self
            .store
            .update(&id, &mut |q| q.status = QueryStatus::Running);

        tokio::time::sleep(self.config.start_delay).await;

        let ceiling = self.config.operation_timeout;
        let outcome = tokio::time::timeout(
            ceiling,
            self.execute(&device, request.kind, &request.target, &command_line),
        )
        .await;

        match outcome {
            Err(_) => {
                let message = format!(
                    "timeout running {} on {} (limit {}s)",
                    request.kind.as_str(),
                    device.name,
                    ceiling.as_secs()
                );
                warn!("query {id}: {message}");
                let _ = self.store.update(&id, &mut |q| {
                    q.status = QueryStatus::Error;
                    q.error = Some(message.clone());
                });
            }
            Ok(Err(e)) => {
                warn!("query {id} failed: {e}");
                let message = e.to_string();
                let _ = self.store.update(&id, &mut |q| {
                    q.status = QueryStatus::Error;
                    q.error = Some(message.clone());
                });
            }
            Ok(Ok(output)) => {
                info!("query {id} completed ({} bytes)", output.len());
                let _ = self.store.update(&id, &mut |q| {
                    q.status = QueryStatus::Completed;
                    q.output = Some(output.clone());
                });
            }
        }
    }

    /// Open a session, run the command, close the session.
    async fn execute(
        &self,
        device: &Device,
        kind: QueryKind,
        target: &str,
        command_line: &str,
    ) -> Result<String> {
        let transport = self.connect(device).await?;
        let result =
            exec::run_command(&transport, command_line, self.config.operation_timeout).await;
        if let Err(e) = transport.close().await {
            warn!("closing session to {} failed: {e}", device.name);
        }
        let output = result?.output;

        // An empty route lookup is an answer, not a blank screen.
        let trimmed_empty = output.trim().is_empty();
        if trimmed_empty && matches!(kind, QueryKind::Bgp | QueryKind::BgpSummary) {
            return Ok(format!("no BGP route found for {target}"));
        }
        Ok(output)
    }

    async fn connect(&self, device: &Device) -> Result<SshTransport> {
        let password = secret::reveal_secret(&device.ssh_password);
        let config = SshConfig::new(
            device.host.clone(),
            device.ssh_port,
            device.ssh_user.clone(),
            AuthMethod::Password(password.expose_secret().to_owned()),
        )
        .with_timeout(self.config.connect_timeout);
        SshTransport::connect(config).await
    }

    /// Connectivity probe: connect, run a trivial command, report timings.
    pub async fn test_connection(&self, device_id: i64) -> Result<ConnectionReport> {
        let device = self
            .directory
            .device(device_id)
            .ok_or_else(|| Error::not_found("router", device_id.to_string()))?;

        let connect_start = std::time::Instant::now();
        let transport = self.connect(&device).await?;
        let connect_time = connect_start.elapsed();

        let result =
            exec::run_command(&transport, "echo connectivity test", Duration::from_secs(10)).await;
        let _ = transport.close().await;
        let exec_output = result?;

        Ok(ConnectionReport {
            router_name: device.name,
            router_host: device.host,
            connect_ms: connect_time.as_millis() as u64,
            command_ms: exec_output.elapsed.as_millis() as u64,
            output: exec_output.output.trim().to_owned(),
        })
    }
}

/// Result of a connectivity probe.
#[derive(Debug, serde::Serialize)]
pub struct ConnectionReport {
    pub router_name: String,
    pub router_host: String,
    pub connect_ms: u64,
    pub command_ms: u64,
    pub output: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glass::query::QueryOptions;
    use crate::glass::registry::MemoryRegistry;
    use crate::inventory::Inventory;

    fn directory() -> Arc<dyn DeviceDirectory> {
        // Port 1 on loopback refuses connections immediately, so accepted
        // queries reach a terminal error without real devices.
        Inventory::from_json(
            r#"{
                "devices": [{
                    "id": 1, "name": "core-1", "host": "127.0.0.1",
                    "ssh_port": 1, "ssh_user": "ops", "ssh_password": "aHVudGVyMg==",
                    "asn": 64512,
                    "source_addresses": [
                        {"id": 1, "name": "lo0", "type": "ipv4", "ip": "192.0.2.1"}
                    ]
                }, {
                    "id": 2, "name": "bare", "host": "127.0.0.2",
                    "ssh_port": 1, "ssh_user": "ops", "ssh_password": "x",
                    "asn": 64513
                }]
            }"#,
        )
        .unwrap()
        .into_shared()
    }

    fn executor(store: Arc<MemoryRegistry>) -> Arc<QueryExecutor> {
        let config = ExecutorConfig {
            start_delay: Duration::from_millis(1),
            connect_timeout: Duration::from_secs(2),
            ..ExecutorConfig::default()
        };
        Arc::new(QueryExecutor::new(directory(), store, config))
    }

    fn request(kind: QueryKind, router_id: i64, source_ip: Option<&str>) -> QueryRequest {
        QueryRequest {
            kind,
            target: "8.8.8.8".into(),
            router_id,
            options: QueryOptions {
                source_ip: source_ip.map(str::to_owned),
                max_hops: None,
            },
        }
    }

    #[tokio::test]
    async fn unknown_device_errors_without_registering() {
        let store = Arc::new(MemoryRegistry::new());
        let executor = executor(store.clone());

        let response = executor.submit(request(QueryKind::Ping, 99, Some("1"))).unwrap();
        assert_eq!(response.status, "error");
        assert!(response.error.unwrap().contains("not found"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn ping_without_source_is_rejected_before_any_query_exists() {
        let store = Arc::new(MemoryRegistry::new());
        let executor = executor(store.clone());

        let err = executor
            .submit(request(QueryKind::Ping, 1, None))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("source address"));
        assert!(err.to_string().contains("192.0.2.1"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn device_without_sources_names_the_gap() {
        let store = Arc::new(MemoryRegistry::new());
        let executor = executor(store.clone());

        let err = executor
            .submit(request(QueryKind::Ping, 2, None))
            .unwrap_err();
        assert!(err.to_string().contains("available: none"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn unknown_source_identity_lists_valid_ones() {
        let store = Arc::new(MemoryRegistry::new());
        let executor = executor(store.clone());

        let err = executor
            .submit(request(QueryKind::Ping, 1, Some("42")))
            .unwrap_err();
        assert!(err.to_string().contains("192.0.2.1 (id 1)"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn exceeding_the_operation_ceiling_reads_as_a_timeout() {
        // A listener that accepts connections but never completes the SSH
        // handshake: the connect succeeds, then everything stalls until the
        // whole-operation ceiling fires.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    use tokio::io::AsyncReadExt;
                    let mut buf = [0u8; 1024];
                    while socket.read(&mut buf).await.unwrap_or(0) > 0 {}
                });
            }
        });

        let directory = Inventory::from_json(&format!(
            r#"{{
                "devices": [{{
                    "id": 1, "name": "stalled", "host": "127.0.0.1",
                    "ssh_port": {port}, "ssh_user": "ops", "ssh_password": "x",
                    "asn": 64512,
                    "source_addresses": [
                        {{"id": 1, "name": "lo0", "type": "ipv4", "ip": "192.0.2.1"}}
                    ]
                }}]
            }}"#
        ))
        .unwrap()
        .into_shared();

        let store = Arc::new(MemoryRegistry::new());
        let config = ExecutorConfig {
            operation_timeout: Duration::from_millis(200),
            connect_timeout: Duration::from_secs(30),
            start_delay: Duration::from_millis(1),
        };
        let executor = Arc::new(QueryExecutor::new(directory, store.clone(), config));

        let response = executor
            .submit(request(QueryKind::Ping, 1, Some("1")))
            .unwrap();
        assert_eq!(response.status, "success");

        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        loop {
            let query = store.get(&response.id).unwrap();
            if query.is_terminal() {
                assert_eq!(query.status, QueryStatus::Error);
                let error = query.error.unwrap();
                // Must read as a timeout, not a generic device failure.
                assert!(error.contains("timeout"), "got: {error}");
                assert!(error.contains("stalled"), "got: {error}");
                break;
            }
            assert!(std::time::Instant::now() < deadline, "query never finished");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn accepted_query_reaches_a_terminal_error_on_dead_device() {
        let store = Arc::new(MemoryRegistry::new());
        let executor = executor(store.clone());

        let response = executor
            .submit(request(QueryKind::Ping, 1, Some("1")))
            .unwrap();
        assert_eq!(response.status, "success");

        // The refused connection should surface quickly.
        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        loop {
            let query = store.get(&response.id).unwrap();
            if query.is_terminal() {
                assert_eq!(query.status, QueryStatus::Error);
                assert!(query.error.is_some());
                break;
            }
            assert!(std::time::Instant::now() < deadline, "query never finished");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}
