//! Peering administration: enabling and disabling BGP sessions.
//!
//! The device dialect shuts a peering by marking it `ignore` inside the
//! BGP process and restores it with `undo ... ignore`, committed in the
//! same shell session. Group operations batch every member into one
//! session and one commit, so a group is never left half-applied by a
//! dropped connection between members.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_core::Stream;
use log::{debug, info, warn};
use secrecy::ExposeSecret;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::driver::shell::{self, ShellConfig};
use crate::error::{Error, Result};
use crate::glass::relay::END_MARKER;
use crate::inventory::{Device, DeviceDirectory};
use crate::secret;
use crate::transport::{AuthMethod, SshConfig, SshTransport};

/// Direction of a peering toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleAction {
    Enable,
    Disable,
}

impl fmt::Display for ToggleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ToggleAction::Enable => "enable",
            ToggleAction::Disable => "disable",
        })
    }
}

/// Build the configuration-shell sequence that toggles the given peers
/// inside one BGP process.
pub fn toggle_commands(asn: u32, peer_ips: &[String], action: ToggleAction) -> Vec<String> {
    let mut commands = Vec::with_capacity(peer_ips.len() + 4);
    commands.push("system-view".to_owned());
    commands.push(format!("bgp {asn}"));
    for ip in peer_ips {
        commands.push(match action {
            ToggleAction::Enable => format!("undo peer {ip} ignore"),
            ToggleAction::Disable => format!("peer {ip} ignore"),
        });
    }
    commands.push("commit".to_owned());
    commands.push("return".to_owned());
    commands
}

/// Toggle tuning.
#[derive(Debug, Clone)]
pub struct ToggleConfig {
    pub connect_timeout: Duration,
    pub shell: ShellConfig,
}

impl Default for ToggleConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            shell: ShellConfig::default(),
        }
    }
}

/// Result of a completed (non-streamed) toggle.
#[derive(Debug, Serialize)]
pub struct ToggleOutcome {
    pub action: String,
    /// What was toggled, e.g. `peering 198.51.100.7` or `group transit`.
    pub subject: String,
    pub router: String,
    /// Full shell transcript of the applied sequence.
    pub transcript: String,
}

/// One group member's toggle result.
#[derive(Debug, Serialize)]
pub struct MemberOutcome {
    pub peering_id: i64,
    pub ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A resolved toggle, ready to run.
struct TogglePlan {
    device: Device,
    commands: Vec<String>,
    subject: String,
    action: ToggleAction,
}

/// Applies peering toggles against the device fleet.
pub struct BgpController {
    directory: Arc<dyn DeviceDirectory>,
    config: ToggleConfig,
}

impl BgpController {
    pub fn new(directory: Arc<dyn DeviceDirectory>, config: ToggleConfig) -> Self {
        Self { directory, config }
    }

    fn plan_peering(&self, peering_id: i64, action: ToggleAction) -> Result<TogglePlan> {
        let peering = self
            .directory
            .peering(peering_id)
            .ok_or_else(|| Error::not_found("peering", peering_id.to_string()))?;
        let device = self
            .directory
            .device(peering.device_id)
            .ok_or_else(|| Error::not_found("router", peering.device_id.to_string()))?;

        let commands = toggle_commands(device.asn, std::slice::from_ref(&peering.ip), action);
        Ok(TogglePlan {
            device,
            commands,
            subject: format!("peering {}", peering.ip),
            action,
        })
    }

    fn plan_group(&self, group_id: i64, action: ToggleAction) -> Result<TogglePlan> {
        let group = self
            .directory
            .peering_group(group_id)
            .ok_or_else(|| Error::not_found("peering group", group_id.to_string()))?;
        let device = self
            .directory
            .device(group.device_id)
            .ok_or_else(|| Error::not_found("router", group.device_id.to_string()))?;

        let members = self.directory.group_peerings(&group);
        if members.is_empty() {
            return Err(Error::validation(format!(
                "group '{}' has no peerings",
                group.name
            )));
        }

        let ips: Vec<String> = members.into_iter().map(|p| p.ip).collect();
        let commands = toggle_commands(device.asn, &ips, action);
        Ok(TogglePlan {
            device,
            commands,
            subject: format!("group {} ({} peers)", group.name, ips.len()),
            action,
        })
    }

    /// Enable or disable a single peering, returning the transcript.
    pub async fn toggle_peering(
        &self,
        peering_id: i64,
        action: ToggleAction,
    ) -> Result<ToggleOutcome> {
        let plan = self.plan_peering(peering_id, action)?;
        self.apply(plan).await
    }

    /// Enable or disable every peering in a group in one session.
    pub async fn toggle_group(&self, group_id: i64, action: ToggleAction) -> Result<ToggleOutcome> {
        let plan = self.plan_group(group_id, action)?;
        self.apply(plan).await
    }

    /// Enable or disable a group's peerings one by one, reporting each
    /// member's result and continuing past individual failures.
    pub async fn toggle_group_members(
        &self,
        group_id: i64,
        action: ToggleAction,
    ) -> Result<Vec<MemberOutcome>> {
        let group = self
            .directory
            .peering_group(group_id)
            .ok_or_else(|| Error::not_found("peering group", group_id.to_string()))?;
        let members = self.directory.group_peerings(&group);
        if members.is_empty() {
            return Err(Error::validation(format!(
                "group '{}' has no peerings",
                group.name
            )));
        }

        let mut results = Vec::with_capacity(members.len());
        for peering in members {
            let outcome = self.toggle_peering(peering.id, action).await;
            results.push(match outcome {
                Ok(applied) => MemberOutcome {
                    peering_id: peering.id,
                    ip: peering.ip,
                    output: Some(applied.transcript),
                    error: None,
                },
                Err(e) => {
                    warn!("{} of peering {} failed: {e}", action, peering.id);
                    MemberOutcome {
                        peering_id: peering.id,
                        ip: peering.ip,
                        output: None,
                        error: Some(e.to_string()),
                    }
                }
            });
        }
        Ok(results)
    }

    async fn apply(&self, plan: TogglePlan) -> Result<ToggleOutcome> {
        info!(
            "applying {} to {} on {}",
            plan.action, plan.subject, plan.device.name
        );
        let transport = self.connect(&plan.device).await?;
        let result = shell::run_sequence(&transport, &plan.commands, &self.config.shell, &mut |line| {
            debug!("{}: {line}", plan.device.name);
        })
        .await;
        if let Err(e) = transport.close().await {
            warn!("closing session to {} failed: {e}", plan.device.name);
        }
        Ok(ToggleOutcome {
            action: plan.action.to_string(),
            subject: plan.subject,
            router: plan.device.name,
            transcript: result?,
        })
    }

    /// Streamed variant of [`toggle_peering`](Self::toggle_peering).
    ///
    /// Lookup failures are raised here, before any stream exists; failures
    /// past that point are reported as stream lines. Every stream ends with
    /// [`END_MARKER`].
    pub fn toggle_peering_stream(
        self: &Arc<Self>,
        peering_id: i64,
        action: ToggleAction,
    ) -> Result<impl Stream<Item = String> + Send + use<>> {
        let plan = self.plan_peering(peering_id, action)?;
        Ok(self.stream_plan(plan))
    }

    /// Streamed variant of [`toggle_group`](Self::toggle_group).
    pub fn toggle_group_stream(
        self: &Arc<Self>,
        group_id: i64,
        action: ToggleAction,
    ) -> Result<impl Stream<Item = String> + Send + use<>> {
        let plan = self.plan_group(group_id, action)?;
        Ok(self.stream_plan(plan))
    }

    fn stream_plan(self: &Arc<Self>, plan: TogglePlan) -> impl Stream<Item = String> + Send + use<> {
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            controller.run_streamed(plan, tx).await;
        });
        futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|line| (line, rx))
        })
    }

    async fn run_streamed(&self, plan: TogglePlan, tx: mpsc::UnboundedSender<String>) {
        let _ = tx.send(format!(
            "applying {} to {} on {}",
            plan.action, plan.subject, plan.device.name
        ));

        let outcome = async {
            let transport = self.connect(&plan.device).await?;
            let sink_tx = tx.clone();
            let result = shell::run_sequence(
                &transport,
                &plan.commands,
                &self.config.shell,
                &mut |line| {
                    let _ = sink_tx.send(line.to_owned());
                },
            )
            .await;
            if let Err(e) = transport.close().await {
                warn!("closing session to {} failed: {e}", plan.device.name);
            }
            result
        }
        .await;

        match outcome {
            Ok(_) => {
                let _ = tx.send(format!("{} applied", plan.action));
            }
            Err(e) => {
                warn!("{} of {} failed: {e}", plan.action, plan.subject);
                let _ = tx.send(format!("remote command failed: {e}"));
            }
        }
        let _ = tx.send(END_MARKER.to_owned());
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::Inventory;
    use futures_util::StreamExt;

    fn directory() -> Arc<dyn DeviceDirectory> {
        Inventory::from_json(
            r#"{
                "devices": [{
                    "id": 1, "name": "core-1", "host": "127.0.0.1",
                    "ssh_port": 1, "ssh_user": "ops", "ssh_password": "cHc=",
                    "asn": 64512
                }],
                "peerings": [
                    {"id": 10, "ip": "198.51.100.7", "family": "ipv4",
                     "remote_asn": 64700, "device_id": 1},
                    {"id": 11, "ip": "2001:db8:7::7", "family": "ipv6",
                     "remote_asn": 64700, "device_id": 1}
                ],
                "groups": [
                    {"id": 100, "name": "transit", "device_id": 1,
                     "peering_ids": [10, 11]},
                    {"id": 101, "name": "empty", "device_id": 1, "peering_ids": []}
                ]
            }"#,
        )
        .unwrap()
        .into_shared()
    }

    fn controller() -> Arc<BgpController> {
        let config = ToggleConfig {
            connect_timeout: Duration::from_secs(2),
            ..ToggleConfig::default()
        };
        Arc::new(BgpController::new(directory(), config))
    }

    #[test]
    fn disable_wraps_the_peer_in_ignore() {
        let commands = toggle_commands(
            64512,
            &["198.51.100.7".to_owned()],
            ToggleAction::Disable,
        );
        assert_eq!(
            commands,
            vec![
                "system-view",
                "bgp 64512",
                "peer 198.51.100.7 ignore",
                "commit",
                "return",
            ]
        );
    }

    #[test]
    fn enable_undoes_the_ignore() {
        let commands =
            toggle_commands(64512, &["2001:db8:7::7".to_owned()], ToggleAction::Enable);
        assert_eq!(commands[2], "undo peer 2001:db8:7::7 ignore");
    }

    #[test]
    fn group_batches_all_members_into_one_commit() {
        let commands = toggle_commands(
            64512,
            &["198.51.100.7".to_owned(), "2001:db8:7::7".to_owned()],
            ToggleAction::Disable,
        );
        assert_eq!(commands.len(), 6);
        assert_eq!(commands[2], "peer 198.51.100.7 ignore");
        assert_eq!(commands[3], "peer 2001:db8:7::7 ignore");
        assert_eq!(commands.iter().filter(|c| *c == "commit").count(), 1);
    }

    #[tokio::test]
    async fn unknown_peering_fails_before_any_stream_exists() {
        let controller = controller();
        let err = controller
            .toggle_peering_stream(999, ToggleAction::Enable)
            .err()
            .unwrap();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn empty_group_is_rejected() {
        let controller = controller();
        let err = controller
            .toggle_group(101, ToggleAction::Disable)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no peerings"));
    }

    #[tokio::test]
    async fn group_member_toggle_continues_past_failures() {
        let controller = controller();
        let results = controller
            .toggle_group_members(100, ToggleAction::Disable)
            .await
            .unwrap();

        // Both members are reported even though every session fails.
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].peering_id, 10);
        assert_eq!(results[1].peering_id, 11);
        for member in &results {
            assert!(member.output.is_none());
            assert!(member.error.is_some());
        }
    }

    #[tokio::test]
    async fn stream_reports_connection_failure_and_still_terminates() {
        let controller = controller();
        let lines: Vec<String> = controller
            .toggle_peering_stream(10, ToggleAction::Disable)
            .unwrap()
            .collect()
            .await;

        assert!(lines[0].contains("applying disable to peering 198.51.100.7"));
        assert!(
            lines.iter().any(|l| l.starts_with("remote command failed:")),
            "got: {lines:?}"
        );
        assert_eq!(lines.last().map(String::as_str), Some(END_MARKER));
    }
}
