//! Config reconciliation loop
//!
//! Polls the persisted credentials file and the battery on a fixed
//! interval. Wi-Fi or login changes are applied through the network
//! provisioner and the remote API; the last-applied values only advance
//! on success, so a failing change is retried on every tick.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::collab::{BatteryMonitor, Channel, Display, NetworkProvisioner, RemoteApi};
use crate::credentials::{CredentialSnapshot, CredentialWriter, LoginCredentials, WifiCredentials};
use crate::events::{CredentialKind, EngineEvent};
use crate::lifecycle::RunFlag;

/// Side effects performed by one tick
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub wifi_attempted: bool,
    pub wifi_applied: bool,
    pub login_attempted: bool,
    pub login_applied: bool,
}

pub struct ConfigReconciler {
    path: PathBuf,
    interval: Duration,
    credentials: CredentialWriter,
    provisioner: Arc<dyn NetworkProvisioner>,
    api: Arc<dyn RemoteApi>,
    battery: Arc<dyn BatteryMonitor>,
    display: Arc<dyn Display>,
    event_tx: broadcast::Sender<EngineEvent>,
    applied_wifi: Option<WifiCredentials>,
    applied_login: Option<LoginCredentials>,
}

impl ConfigReconciler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        path: PathBuf,
        interval: Duration,
        credentials: CredentialWriter,
        provisioner: Arc<dyn NetworkProvisioner>,
        api: Arc<dyn RemoteApi>,
        battery: Arc<dyn BatteryMonitor>,
        display: Arc<dyn Display>,
        event_tx: broadcast::Sender<EngineEvent>,
    ) -> Self {
        Self {
            path,
            interval,
            credentials,
            provisioner,
            api,
            battery,
            display,
            event_tx,
            applied_wifi: None,
            applied_login: None,
        }
    }

    /// Tick until the run flag is cleared
    pub fn run(&mut self, running: RunFlag) {
        info!(path = ?self.path, interval_secs = self.interval.as_secs(), "config reconciliation started");

        while running.is_running() {
            let report = self.tick();
            debug!(?report, "reconciliation tick");
            if !running.sleep(self.interval) {
                break;
            }
        }

        info!("config reconciliation stopped");
    }

    /// One poll: battery, then credentials
    pub fn tick(&mut self) -> TickReport {
        self.report_battery();

        let snapshot = match CredentialSnapshot::read(&self.path) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return TickReport::default(),
            Err(e) => {
                warn!(?e, path = ?self.path, "failed to read credentials");
                return TickReport::default();
            }
        };

        if self.credentials.differs_from(&snapshot) {
            self.credentials.set(&snapshot);
        }

        let mut report = TickReport::default();

        if let Some(wifi) = snapshot.wifi() {
            if self.applied_wifi.as_ref() != Some(&wifi) {
                report.wifi_attempted = true;
                report.wifi_applied = self.apply_wifi(&wifi);
                if report.wifi_applied {
                    self.applied_wifi = Some(wifi);
                }
            }
        }

        if let Some(login) = snapshot.login() {
            if self.applied_login.as_ref() != Some(&login) {
                report.login_attempted = true;
                report.login_applied = self.apply_login(&login);
                if report.login_applied {
                    self.applied_login = Some(login);
                }
            }
        }

        report
    }

    fn report_battery(&self) {
        match self.battery.read() {
            Some(status) => self.display.show(Channel::Battery, &status.to_string()),
            None => self
                .display
                .show(Channel::Battery, "Battery information not available."),
        }
    }

    fn apply_wifi(&self, wifi: &WifiCredentials) -> bool {
        info!(ssid = %wifi.name, "Wi-Fi change detected, connecting");
        match self.provisioner.connect(&wifi.name, &wifi.password) {
            Ok(()) => {
                self.display
                    .show(Channel::Wifi, &format!("Connected to {}", wifi.name));
                let _ = self.event_tx.send(EngineEvent::CredentialsApplied {
                    kind: CredentialKind::Wifi,
                });
                true
            }
            Err(e) => {
                warn!(?e, ssid = %wifi.name, "Wi-Fi connection failed");
                self.display
                    .show(Channel::Wifi, &format!("Failed to connect to {}", wifi.name));
                false
            }
        }
    }

    fn apply_login(&self, login: &LoginCredentials) -> bool {
        info!(username = %login.username, "login change detected, logging in");
        match self.api.login(&login.username, &login.password) {
            Ok(_) => {
                self.display.show(Channel::Username, &login.username);
                let _ = self.event_tx.send(EngineEvent::CredentialsApplied {
                    kind: CredentialKind::Login,
                });
                true
            }
            Err(e) => {
                warn!(?e, username = %login.username, "login failed");
                false
            }
        }
    }
}
