//! Line-oriented front panel.
//!
//! This is the control loop: it owns every piece of panel state, reacts to
//! operator input and is the only place the [`StatusReporter`] is driven.
//! Slow instrument I/O happens on dispatcher tasks whose outcomes come back
//! through the notification queue.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::PanelConfig;
use crate::connection::ConnectionManager;
use crate::discovery::ResourceDirectory;
use crate::dispatch::{Dispatcher, NotificationQueue};
use crate::error::PanelError;
use crate::instrument::{
    Acquisition, Channel, Coupling, PanelSettings, ProbeAttenuation, TriggerMode, TriggerSource,
    serialize_all, serialize_channel, serialize_timebase, serialize_trigger,
};
use crate::status::{Notification, StatusReporter};
use crate::transport::{InstrumentAddress, Transport};

#[derive(Debug, Parser)]
#[command(no_binary_name = true, disable_version_flag = true)]
pub struct ConsoleLine {
    #[command(subcommand)]
    pub command: ConsoleCommand,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Enumerate instrument resources
    Scan,
    /// Select a scanned resource by its index
    Select { index: usize },
    /// Add a resource string by hand and select it
    Resource { address: String },
    /// Set the LAN IP field; without an argument the field is cleared
    Ip { address: Option<String> },
    /// Open a session to the IP field, or to the selected resource
    Connect,
    Disconnect,
    Run,
    Stop,
    Autoset,
    /// Edit channel settings
    Channel {
        #[arg(long, value_enum)]
        channel: Option<Channel>,
        #[arg(long, allow_hyphen_values = true)]
        scale: Option<String>,
        #[arg(long, allow_hyphen_values = true)]
        offset: Option<String>,
        #[arg(long, value_enum)]
        coupling: Option<Coupling>,
        #[arg(long, value_enum)]
        probe: Option<ProbeAttenuation>,
    },
    /// Edit timebase settings
    Timebase {
        #[arg(long, allow_hyphen_values = true)]
        scale: Option<String>,
        #[arg(long, allow_hyphen_values = true)]
        position: Option<String>,
    },
    /// Edit trigger settings
    Trigger {
        #[arg(long, value_enum)]
        source: Option<TriggerSource>,
        #[arg(long, value_enum)]
        mode: Option<TriggerMode>,
        #[arg(long, allow_hyphen_values = true)]
        level: Option<String>,
    },
    /// Push settings to the instrument
    Apply {
        #[arg(value_enum, default_value_t = ApplyTarget::All)]
        target: ApplyTarget,
    },
    /// Show connection state and the current settings
    Status,
    #[command(alias = "exit")]
    Quit,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum ApplyTarget {
    Channel,
    Timebase,
    Trigger,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Panel<W: Write> {
    directory: ResourceDirectory,
    manager: ConnectionManager,
    dispatcher: Dispatcher,
    notifications: NotificationQueue,
    reporter: StatusReporter<W>,
    settings: PanelSettings,
    ip: String,
    in_flight: Vec<JoinHandle<()>>,
}

impl<W: Write> Panel<W> {
    pub fn new(config: &PanelConfig, transport: Arc<dyn Transport>, out: W) -> Self {
        let (dispatcher, notifications) = Dispatcher::new();
        Self {
            directory: ResourceDirectory::new(),
            manager: ConnectionManager::new(transport, config.io_timeout),
            dispatcher,
            notifications,
            reporter: StatusReporter::new(out),
            settings: PanelSettings::default(),
            ip: config.ip.clone(),
            in_flight: Vec::new(),
        }
    }

    pub fn settings(&self) -> &PanelSettings {
        &self.settings
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn into_output(self) -> W {
        self.reporter.into_inner()
    }

    /// Drive the panel from `input` until `quit` or end of input.
    ///
    /// Input is decoded lossily; a broken input stream ends the session the
    /// same way end of input does.
    pub async fn run<R: AsyncBufRead + Unpin>(&mut self, input: R) -> Result<()> {
        let mut lines = input.split(b'\n');
        self.reporter.render_status()?;
        loop {
            tokio::select! {
                Some(notification) = self.notifications.recv() => {
                    self.reporter.notify(&notification)?;
                }
                segment = lines.next_segment() => {
                    let bytes = match segment {
                        Ok(Some(bytes)) => bytes,
                        Ok(None) => break,
                        Err(e) => {
                            warn!("console input failed: {e}");
                            self.reporter.notify(&Notification::error("Input", e.to_string()))?;
                            break;
                        }
                    };
                    let line = String::from_utf8_lossy(&bytes);
                    if self.handle_line(&line).await? == Flow::Quit {
                        break;
                    }
                }
            }
        }
        self.shutdown().await
    }

    pub async fn handle_line(&mut self, line: &str) -> Result<Flow> {
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.is_empty() {
            return Ok(Flow::Continue);
        }
        match ConsoleLine::try_parse_from(words) {
            Ok(parsed) => self.handle(parsed.command).await,
            Err(e) => {
                self.reporter.line(e.render().to_string().trim_end())?;
                Ok(Flow::Continue)
            }
        }
    }

    pub async fn handle(&mut self, command: ConsoleCommand) -> Result<Flow> {
        debug!("console command: {command:?}");
        self.reap_finished();
        match command {
            ConsoleCommand::Scan => self.scan().await?,
            ConsoleCommand::Select { index } => {
                if self.directory.select(index) {
                    self.reporter.line(format!("Selected {}", self.directory.selected()))?;
                } else {
                    self.reporter
                        .notify(&Notification::warning("Select", format!("No resource at index {index}.")))?;
                }
            }
            ConsoleCommand::Resource { address } => {
                self.directory.insert(InstrumentAddress::new(address));
                self.reporter.line(format!("Selected {}", self.directory.selected()))?;
            }
            ConsoleCommand::Ip { address } => {
                self.ip = address.unwrap_or_default();
                self.reporter.line(format!("IP: {}", display_or_dash(&self.ip)))?;
            }
            ConsoleCommand::Connect => self.connect().await?,
            ConsoleCommand::Disconnect => {
                self.manager.disconnect().await;
                self.reporter.disconnected()?;
            }
            ConsoleCommand::Run => self.send(Acquisition::Run)?,
            ConsoleCommand::Stop => self.send(Acquisition::Stop)?,
            ConsoleCommand::Autoset => self.send(Acquisition::Autoset)?,
            ConsoleCommand::Channel {
                channel,
                scale,
                offset,
                coupling,
                probe,
            } => {
                let cfg = &mut self.settings.channel;
                if let Some(channel) = channel {
                    cfg.channel = channel;
                }
                if let Some(scale) = scale {
                    cfg.scale = scale;
                }
                if let Some(offset) = offset {
                    cfg.offset = offset;
                }
                if let Some(coupling) = coupling {
                    cfg.coupling = coupling;
                }
                if let Some(probe) = probe {
                    cfg.probe = probe;
                }
            }
            ConsoleCommand::Timebase { scale, position } => {
                let cfg = &mut self.settings.timebase;
                if let Some(scale) = scale {
                    cfg.scale = scale;
                }
                if let Some(position) = position {
                    cfg.position = position;
                }
            }
            ConsoleCommand::Trigger { source, mode, level } => {
                let cfg = &mut self.settings.trigger;
                if let Some(source) = source {
                    cfg.source = source;
                }
                if let Some(mode) = mode {
                    cfg.mode = mode;
                }
                if let Some(level) = level {
                    cfg.level = level;
                }
            }
            ConsoleCommand::Apply { target } => self.apply(target)?,
            ConsoleCommand::Status => self.show_status()?,
            ConsoleCommand::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    async fn scan(&mut self) -> Result<()> {
        match self.directory.refresh(self.manager.transport()).await {
            Ok(0) => self
                .reporter
                .notify(&Notification::warning("Scan", "No VISA instruments detected."))?,
            Ok(found) => {
                for (index, resource) in self.directory.resources().iter().enumerate() {
                    self.reporter.line(format!("  [{index}] {resource}"))?;
                }
                self.reporter
                    .notify(&Notification::info("Scan Complete", format!("Found {found} device(s).")))?;
            }
            Err(e) => self.reporter.report(&e)?,
        }
        Ok(())
    }

    async fn connect(&mut self) -> Result<()> {
        let selected = self.directory.selected().to_string();
        match self.manager.connect(&self.ip, Some(&selected)).await {
            Ok(identity) => {
                let address = self
                    .manager
                    .current_session()
                    .map(|s| s.address().to_string())
                    .unwrap_or_default();
                self.reporter.connected(&address, &identity)?;
            }
            Err(e) => {
                // a rejected target leaves any open session untouched
                if self.manager.is_connected() {
                    self.reporter.render_status()?;
                } else {
                    self.reporter.disconnected()?;
                }
                self.reporter.report(&e)?;
            }
        }
        Ok(())
    }

    fn send(&mut self, key: Acquisition) -> Result<()> {
        let spawned = self.dispatcher.spawn_command(&self.manager, key.command());
        self.track(spawned)
    }

    fn apply(&mut self, target: ApplyTarget) -> Result<()> {
        let (batch, success) = match target {
            ApplyTarget::Channel => (
                serialize_channel(&self.settings.channel),
                format!("{} configured successfully.", self.settings.channel.channel.label()),
            ),
            ApplyTarget::Timebase => (
                serialize_timebase(&self.settings.timebase),
                "Timebase configured successfully.".to_string(),
            ),
            ApplyTarget::Trigger => (
                serialize_trigger(&self.settings.trigger),
                "Trigger configured successfully.".to_string(),
            ),
            ApplyTarget::All => (
                serialize_all(&self.settings),
                "All settings applied successfully.".to_string(),
            ),
        };
        let spawned = self.dispatcher.spawn_batch(&self.manager, batch, success);
        self.track(spawned)
    }

    fn track(&mut self, spawned: Result<JoinHandle<()>, PanelError>) -> Result<()> {
        match spawned {
            Ok(handle) => self.in_flight.push(handle),
            Err(e) => self.reporter.report(&e)?,
        }
        Ok(())
    }

    fn reap_finished(&mut self) {
        self.in_flight.retain(|handle| !handle.is_finished());
    }

    fn show_status(&mut self) -> Result<()> {
        self.reporter.render_status()?;
        self.reporter.line(format!("IP: {}", display_or_dash(&self.ip)))?;
        self.reporter.line(format!("Resource: {}", self.directory.selected()))?;
        let s = &self.settings;
        self.reporter.line(format!(
            "Channel: {} scale={} offset={} coupling={:?} probe={:?}",
            s.channel.channel.label(),
            s.channel.scale,
            s.channel.offset,
            s.channel.coupling,
            s.channel.probe
        ))?;
        self.reporter.line(format!(
            "Timebase: scale={} position={}",
            s.timebase.scale, s.timebase.position
        ))?;
        self.reporter.line(format!(
            "Trigger: source={:?} mode={:?} level={}",
            s.trigger.source, s.trigger.mode, s.trigger.level
        ))?;
        Ok(())
    }

    /// Let in-flight actions finish, report their outcomes, then disconnect.
    pub async fn shutdown(&mut self) -> Result<()> {
        for handle in self.in_flight.drain(..) {
            if let Err(e) = handle.await {
                debug!("dispatch task ended abnormally: {e}");
            }
        }
        while let Ok(notification) = self.notifications.try_recv() {
            self.reporter.notify(&notification)?;
        }
        if self.manager.is_connected() {
            self.manager.disconnect().await;
            self.reporter.disconnected()?;
        }
        Ok(())
    }
}

fn display_or_dash(value: &str) -> &str {
    if value.is_empty() { "---" } else { value }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionState;
    use crate::testing::MockTransport;

    fn parse(line: &str) -> ConsoleCommand {
        ConsoleLine::try_parse_from(line.split_whitespace())
            .unwrap()
            .command
    }

    fn panel(transport: &MockTransport, ip: &str) -> Panel<Vec<u8>> {
        let config = PanelConfig {
            ip: ip.to_string(),
            ..PanelConfig::default()
        };
        Panel::new(&config, Arc::new(transport.clone()), Vec::new())
    }

    #[test]
    fn parses_editing_commands() {
        assert_eq!(
            parse("channel --channel CH2 --scale 0.2 --offset -0.1 --coupling AC --probe 10"),
            ConsoleCommand::Channel {
                channel: Some(Channel::Ch2),
                scale: Some("0.2".to_string()),
                offset: Some("-0.1".to_string()),
                coupling: Some(Coupling::Ac),
                probe: Some(ProbeAttenuation::X10),
            }
        );
        assert_eq!(
            parse("trigger --source EXT --mode SINGLE"),
            ConsoleCommand::Trigger {
                source: Some(TriggerSource::Ext),
                mode: Some(TriggerMode::Single),
                level: None,
            }
        );
        assert_eq!(parse("apply"), ConsoleCommand::Apply { target: ApplyTarget::All });
        assert_eq!(
            parse("apply timebase"),
            ConsoleCommand::Apply {
                target: ApplyTarget::Timebase
            }
        );
        assert_eq!(parse("ip"), ConsoleCommand::Ip { address: None });
        assert_eq!(parse("exit"), ConsoleCommand::Quit);
    }

    #[test]
    fn rejects_values_outside_the_choice_lists() {
        assert!(ConsoleLine::try_parse_from(["channel", "--coupling", "HF"]).is_err());
        assert!(ConsoleLine::try_parse_from(["channel", "--probe", "1000"]).is_err());
        assert!(ConsoleLine::try_parse_from(["launch"]).is_err());
    }

    #[tokio::test]
    async fn commands_before_connect_only_warn() {
        let transport = MockTransport::new();
        let mut panel = panel(&transport, "");

        panel.handle(ConsoleCommand::Run).await.unwrap();
        panel.handle(ConsoleCommand::Apply { target: ApplyTarget::All }).await.unwrap();
        panel.handle(ConsoleCommand::Connect).await.unwrap();
        panel.shutdown().await.unwrap();

        assert!(transport.writes().is_empty());
        let out = String::from_utf8(panel.into_output()).unwrap();
        assert_eq!(out.matches("[WARN] Warning: Connect to scope first.").count(), 2);
        assert!(out.contains("[ERROR] Connection Error: No device selected or found."));
    }

    #[tokio::test]
    async fn edits_are_applied_after_connect() {
        let transport = MockTransport::new();
        let mut panel = panel(&transport, "169.254.41.244");

        for line in [
            "connect",
            "channel --channel CH4 --scale 1 --coupling GND",
            "timebase --scale 2e-3",
            "apply channel",
        ] {
            assert_eq!(panel.handle_line(line).await.unwrap(), Flow::Continue);
        }
        assert_eq!(panel.manager().state(), ConnectionState::Connected);
        assert_eq!(panel.settings().timebase.scale, "2e-3");

        panel.shutdown().await.unwrap();
        assert_eq!(
            transport.writes(),
            vec!["CH4:SCAL 1", "CH4:OFFS 0.0", "CH4:COUP GND", "CH4:PROB 1"]
        );
        assert_eq!(panel.manager().state(), ConnectionState::Disconnected);

        let out = String::from_utf8(panel.into_output()).unwrap();
        assert!(out.contains("[INFO] Success: CH4 configured successfully."));
        assert!(out.contains("Status: Connected | ID: Rohde&Schwarz,RTB2004"));
    }

    #[tokio::test]
    async fn scan_then_connect_to_selection() {
        let mut transport = MockTransport::new();
        transport.resources = Some(vec![
            "TCPIP::10.0.0.2::INSTR".to_string(),
            "TCPIP::10.0.0.3::INSTR".to_string(),
        ]);
        let mut panel = panel(&transport, "");

        panel.handle_line("scan").await.unwrap();
        panel.handle_line("select 1").await.unwrap();
        panel.handle_line("connect").await.unwrap();
        panel.shutdown().await.unwrap();

        assert_eq!(transport.with_wire(|w| w.opened.clone()), vec!["TCPIP::10.0.0.3::INSTR"]);
        let out = String::from_utf8(panel.into_output()).unwrap();
        assert!(out.contains("[INFO] Scan Complete: Found 2 device(s)."));
        assert!(out.contains("[1] TCPIP::10.0.0.3::INSTR"));
    }

    #[tokio::test]
    async fn failed_scan_is_reported() {
        let mut transport = MockTransport::new();
        transport.resources = None;
        let mut panel = panel(&transport, "");

        panel.handle_line("scan").await.unwrap();
        let out = String::from_utf8(panel.into_output()).unwrap();
        assert!(out.contains("[ERROR] Error: VISA scan failed: resource manager unavailable"));
    }

    #[tokio::test]
    async fn parse_errors_do_not_stop_the_panel() {
        let transport = MockTransport::new();
        let mut panel = panel(&transport, "");
        assert_eq!(panel.handle_line("bogus").await.unwrap(), Flow::Continue);
        assert_eq!(panel.handle_line("   ").await.unwrap(), Flow::Continue);
        assert_eq!(panel.handle_line("quit").await.unwrap(), Flow::Quit);
    }

    #[tokio::test]
    async fn failed_retarget_keeps_existing_session() {
        let transport = MockTransport::new();
        let mut panel = panel(&transport, "169.254.41.244");

        for line in ["connect", "ip", "connect", "status", "run"] {
            assert_eq!(panel.handle_line(line).await.unwrap(), Flow::Continue);
        }
        assert_eq!(panel.manager().state(), ConnectionState::Connected);
        panel.shutdown().await.unwrap();

        assert_eq!(transport.writes(), vec!["RUN"]);
        let out = String::from_utf8(panel.into_output()).unwrap();
        assert!(out.contains("[ERROR] Connection Error: No device selected or found."));
        assert_eq!(out.matches("Status: Connected | ID: Rohde&Schwarz,RTB2004").count(), 3);
        assert_eq!(out.matches("Status: Disconnected").count(), 1);
        assert!(!out.contains("[WARN] Warning: Connect to scope first."));
        assert!(out.trim_end().ends_with("Status: Disconnected | Instrument ID: ---"));
    }

    #[tokio::test]
    async fn undecodable_input_does_not_end_the_session() {
        let transport = MockTransport::new();
        let mut panel = panel(&transport, "169.254.41.244");

        panel.run(&b"connect\n\xff\nrun\nquit\n"[..]).await.unwrap();

        assert_eq!(transport.writes(), vec!["RUN"]);
        let out = String::from_utf8(panel.into_output()).unwrap();
        assert!(out.contains("error:"));
        assert!(out.contains("[INFO] Command: Sent command: RUN"));
        assert!(out.trim_end().ends_with("Status: Disconnected | Instrument ID: ---"));
    }
}
