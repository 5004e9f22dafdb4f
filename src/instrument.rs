use clap::ValueEnum;
use std::fmt;

/// Identification query issued right after a session is opened.
pub const IDN_QUERY: &str = "*IDN?";

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Default)]
pub enum Channel {
    #[default]
    #[value(name = "CH1")]
    Ch1,
    #[value(name = "CH2")]
    Ch2,
    #[value(name = "CH3")]
    Ch3,
    #[value(name = "CH4")]
    Ch4,
}

impl Channel {
    fn as_scpi(self) -> &'static str {
        match self {
            Channel::Ch1 => "CH1",
            Channel::Ch2 => "CH2",
            Channel::Ch3 => "CH3",
            Channel::Ch4 => "CH4",
        }
    }

    pub fn label(self) -> &'static str {
        self.as_scpi()
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Default)]
pub enum Coupling {
    #[default]
    #[value(name = "DC")]
    Dc,
    #[value(name = "AC")]
    Ac,
    #[value(name = "GND")]
    Gnd,
}

impl Coupling {
    fn as_scpi(self) -> &'static str {
        match self {
            Coupling::Dc => "DC",
            Coupling::Ac => "AC",
            Coupling::Gnd => "GND",
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Default)]
pub enum ProbeAttenuation {
    #[default]
    #[value(name = "1")]
    X1,
    #[value(name = "10")]
    X10,
    #[value(name = "100")]
    X100,
}

impl ProbeAttenuation {
    fn as_value(self) -> u8 {
        match self {
            ProbeAttenuation::X1 => 1,
            ProbeAttenuation::X10 => 10,
            ProbeAttenuation::X100 => 100,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Default)]
pub enum TriggerSource {
    #[default]
    #[value(name = "CH1")]
    Ch1,
    #[value(name = "CH2")]
    Ch2,
    #[value(name = "CH3")]
    Ch3,
    #[value(name = "CH4")]
    Ch4,
    #[value(name = "EXT")]
    Ext,
}

impl TriggerSource {
    fn as_scpi(self) -> &'static str {
        match self {
            TriggerSource::Ch1 => "CH1",
            TriggerSource::Ch2 => "CH2",
            TriggerSource::Ch3 => "CH3",
            TriggerSource::Ch4 => "CH4",
            TriggerSource::Ext => "EXT",
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Default)]
pub enum TriggerMode {
    #[default]
    #[value(name = "AUTO")]
    Auto,
    #[value(name = "NORMAL")]
    Normal,
    #[value(name = "SINGLE")]
    Single,
}

impl TriggerMode {
    fn as_scpi(self) -> &'static str {
        match self {
            TriggerMode::Auto => "AUTO",
            TriggerMode::Normal => "NORMAL",
            TriggerMode::Single => "SINGLE",
        }
    }
}

/// Front-panel acquisition keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquisition {
    Run,
    Stop,
    Autoset,
}

impl Acquisition {
    pub fn command(self) -> &'static str {
        match self {
            Acquisition::Run => "RUN",
            Acquisition::Stop => "STOP",
            Acquisition::Autoset => "AUT",
        }
    }
}

/// Vertical settings of one channel.
///
/// `scale` and `offset` hold whatever the operator typed. They are forwarded
/// untouched; the oscilloscope decides whether a value is acceptable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    pub channel: Channel,
    pub scale: String,
    pub offset: String,
    pub coupling: Coupling,
    pub probe: ProbeAttenuation,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            channel: Channel::Ch1,
            scale: "0.5".to_string(),
            offset: "0.0".to_string(),
            coupling: Coupling::Dc,
            probe: ProbeAttenuation::X1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimebaseConfig {
    pub scale: String,
    pub position: String,
}

impl Default for TimebaseConfig {
    fn default() -> Self {
        Self {
            scale: "0.001".to_string(),
            position: "0".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerConfig {
    pub source: TriggerSource,
    pub mode: TriggerMode,
    pub level: String,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            source: TriggerSource::Ch1,
            mode: TriggerMode::Auto,
            level: "0.0".to_string(),
        }
    }
}

/// Everything the panel can push to the scope in one "apply all".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PanelSettings {
    pub channel: ChannelConfig,
    pub timebase: TimebaseConfig,
    pub trigger: TriggerConfig,
}

/// Ordered SCPI commands. Each one is applied on its own; a batch is not atomic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandBatch {
    commands: Vec<String>,
}

impl CommandBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: impl Into<String>) {
        self.commands.push(command.into());
    }

    pub fn append(&mut self, other: CommandBatch) {
        self.commands.extend(other.commands);
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.commands
    }
}

impl From<Vec<String>> for CommandBatch {
    fn from(commands: Vec<String>) -> Self {
        Self { commands }
    }
}

impl fmt::Display for CommandBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.commands.join("; "))
    }
}

pub fn serialize_channel(cfg: &ChannelConfig) -> CommandBatch {
    let ch = cfg.channel.as_scpi();
    let mut batch = CommandBatch::new();
    batch.push(format!("{}:SCAL {}", ch, cfg.scale));
    batch.push(format!("{}:OFFS {}", ch, cfg.offset));
    batch.push(format!("{}:COUP {}", ch, cfg.coupling.as_scpi()));
    batch.push(format!("{}:PROB {}", ch, cfg.probe.as_value()));
    batch
}

pub fn serialize_timebase(cfg: &TimebaseConfig) -> CommandBatch {
    let mut batch = CommandBatch::new();
    batch.push(format!("TIM:SCAL {}", cfg.scale));
    batch.push(format!("TIM:POS {}", cfg.position));
    batch
}

pub fn serialize_trigger(cfg: &TriggerConfig) -> CommandBatch {
    let mut batch = CommandBatch::new();
    batch.push(format!("TRIG:A:SOUR {}", cfg.source.as_scpi()));
    batch.push(format!("TRIG:A:MODE {}", cfg.mode.as_scpi()));
    batch.push(format!("TRIG:A:LEV {}", cfg.level));
    batch
}

/// Channel, then timebase, then trigger.
pub fn serialize_all(settings: &PanelSettings) -> CommandBatch {
    let mut batch = serialize_channel(&settings.channel);
    batch.append(serialize_timebase(&settings.timebase));
    batch.append(serialize_trigger(&settings.trigger));
    batch
}
