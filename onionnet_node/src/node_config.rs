use std::collections::HashMap;
use std::net::SocketAddr;
use std::num::ParseIntError;
use std::str::FromStr;
use std::time::Duration;

use clap::{Arg, ArgMatches, builder::PossibleValue, Command, ValueEnum, value_parser};
use config::{Config, File as CfgFile, FileFormat as CfgFileFormat};
use onionnet::core::net::{DEFAULT_CONNECTIONS_LIMIT, DEFAULT_IO_TIMEOUT};
use onionnet::core::relay::DEFAULT_REGISTRATION_ATTEMPTS;
use onionnet::packet::directory::DEFAULT_CIRCUIT_LENGTH;
use serde::{de, Deserialize, Deserializer};
use serde_yaml::Value;

use crate::tools;

/// Config for threading.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize)]
pub enum Threads {
    /// Detect number of threads automatically by the number of CPU cores.
    Auto,
    /// Exact number of threads.
    N(u16)
}

impl FromStr for Threads {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "auto" {
            Ok(Threads::Auto)
        } else {
            u16::from_str(s).map(Threads::N)
        }
    }
}

/// Specifies where to write logs.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize)]
pub enum LogType {
    Stderr,
    Stdout,
    #[cfg(unix)]
    Syslog,
    None,
}

#[cfg(unix)]
const LOG_TYPES: &[LogType] = &[LogType::Stderr, LogType::Stdout, LogType::Syslog, LogType::None];
#[cfg(not(unix))]
const LOG_TYPES: &[LogType] = &[LogType::Stderr, LogType::Stdout, LogType::None];

impl ValueEnum for LogType {
    fn value_variants<'a>() -> &'a [Self] {
        LOG_TYPES
    }

    fn to_possible_value(&self) -> Option<PossibleValue> {
        use self::LogType::*;
        Some(match self {
            Stderr => PossibleValue::new("Stderr"),
            Stdout => PossibleValue::new("Stdout"),
            #[cfg(unix)]
            Syslog => PossibleValue::new("Syslog"),
            None => PossibleValue::new("None")
        })
    }
}

/// Which node to run.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Central directory server.
    Cds,
    /// Relay node.
    Relay,
    /// Destination server.
    Destination,
}

impl Role {
    /// Port the node listens on when no address is given.
    pub fn default_port(self) -> u16 {
        match self {
            Role::Cds => 9001,
            Role::Relay => 9101,
            Role::Destination => 9100,
        }
    }
}

fn de_threads<'de, D>(deserializer: D) -> Result<Threads, D::Error> where D: Deserializer<'de> {
    let s = String::deserialize(deserializer)?;

    Threads::from_str(&s)
        .map_err(|e| de::Error::custom(format!("threads: {:?}", e)))
}

fn de_secs<'de, D>(deserializer: D) -> Result<Duration, D::Error> where D: Deserializer<'de> {
    u64::deserialize(deserializer).map(Duration::from_secs)
}

fn de_opt_secs<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error> where D: Deserializer<'de> {
    Option::<u64>::deserialize(deserializer).map(|secs| secs.map(Duration::from_secs))
}

/// Config parsed from command line arguments or from a config file.
#[derive(Clone, Debug, Deserialize)]
pub struct NodeConfig {
    /// Which node to run.
    pub role: Role,
    /// TCP address to listen on.
    #[serde(rename = "listen-address")]
    pub listen_addr: SocketAddr,
    /// Address of the directory server. Required for relays.
    #[serde(rename = "cds-address")]
    #[serde(default)]
    pub cds_addr: Option<SocketAddr>,
    /// Human readable id of the relay.
    #[serde(rename = "relay-id")]
    #[serde(default)]
    pub relay_id: Option<String>,
    /// Address announced to the directory if it differs from the listen
    /// address.
    #[serde(rename = "public-address")]
    #[serde(default)]
    pub public_addr: Option<SocketAddr>,
    /// Path to the file where relay keys are stored.
    #[serde(rename = "keys-file")]
    #[serde(default)]
    pub keys_file: Option<String>,
    /// Destination of exit traffic that doesn't name one.
    #[serde(default)]
    pub destination: Option<SocketAddr>,
    /// Time after which the directory forgets a relay that didn't refresh.
    #[serde(rename = "relay-ttl")]
    #[serde(default, deserialize_with = "de_opt_secs")]
    pub relay_ttl: Option<Duration>,
    /// Interval of relay re-registration.
    #[serde(default, deserialize_with = "de_opt_secs")]
    pub heartbeat: Option<Duration>,
    /// Timeout of every connect, read and write.
    #[serde(rename = "io-timeout")]
    #[serde(deserialize_with = "de_secs")]
    pub io_timeout: Duration,
    /// Number of registration attempts on relay startup.
    #[serde(rename = "registration-attempts")]
    pub registration_attempts: u32,
    /// Maximum number of simultaneous connections.
    #[serde(rename = "connections-limit")]
    pub connections_limit: usize,
    /// Number of threads for execution.
    #[serde(deserialize_with = "de_threads")]
    pub threads: Threads,
    /// Specifies where to write logs.
    #[serde(rename = "log-type")]
    pub log_type: LogType,
    /// Unused fields while parsing config file
    #[serde(flatten)]
    pub unused: HashMap<String, Value>,
}

fn create_listen_arg() -> Arg {
    Arg::new("listen-address")
        .short('a')
        .long("listen-address")
        .help("TCP address to listen on. Defaults to 127.0.0.1 with port 9001 \
               for the directory, 9101 for a relay and 9100 for a destination")
        .num_args(1)
        .value_parser(value_parser!(SocketAddr))
}

fn create_cds_arg() -> Arg {
    Arg::new("cds-address")
        .short('c')
        .long("cds-address")
        .help("Address of the directory server")
        .num_args(1)
        .value_parser(value_parser!(SocketAddr))
        .required(true)
}

fn create_keys_file_arg() -> Arg {
    Arg::new("keys-file")
        .short('k')
        .long("keys-file")
        .help("Path to the file where relay keys are stored")
        .num_args(1)
}

fn create_destination_arg() -> Arg {
    Arg::new("destination")
        .short('d')
        .long("destination")
        .help("Destination server of exit traffic")
        .num_args(1)
        .value_parser(value_parser!(SocketAddr))
}

fn create_io_timeout_arg() -> Arg {
    Arg::new("io-timeout")
        .short('t')
        .long("io-timeout")
        .help("Timeout in seconds of every connect, read and write")
        .num_args(1)
        .value_parser(value_parser!(u64))
        .default_value("10")
}

fn node_command(name: &'static str) -> Command {
    Command::new(name)
        .arg(create_listen_arg())
        .arg(create_io_timeout_arg())
        .arg(Arg::new("connections-limit")
            .long("connections-limit")
            .help("Maximum number of simultaneous connections")
            .num_args(1)
            .value_parser(value_parser!(usize))
            .default_value("512"))
        .arg(Arg::new("threads")
            .short('j')
            .long("threads")
            .help("Number of threads to use. The value 'auto' means that the \
                   number of threads will be determined automatically by the \
                   number of CPU cores")
            .num_args(1)
            .value_parser(value_parser!(Threads))
            .default_value("1"))
        .arg(Arg::new("log-type")
            .short('l')
            .long("log-type")
            .help("Where to write logs")
            .num_args(1)
            .value_parser(value_parser!(LogType))
            .default_value("Stderr"))
}

fn app() -> Command {
    Command::new(crate_name!())
        .version(crate_version!())
        .about(crate_description!())
        .subcommand_required(true)
        .subcommand(node_command("cds")
            .about("Run central directory server")
            .arg(Arg::new("relay-ttl")
                .long("relay-ttl")
                .help("Forget relays that didn't re-register within this \
                       number of seconds. Relays are kept forever by default")
                .num_args(1)
                .value_parser(value_parser!(u64).range(1..))))
        .subcommand(node_command("relay")
            .about("Run relay node")
            .arg(create_cds_arg())
            .arg(Arg::new("relay-id")
                .short('i')
                .long("relay-id")
                .help("Human readable id of the relay")
                .num_args(1))
            .arg(Arg::new("public-address")
                .short('p')
                .long("public-address")
                .help("Address announced to the directory. Defaults to the \
                       listen address")
                .num_args(1)
                .value_parser(value_parser!(SocketAddr)))
            .arg(create_keys_file_arg()
                .help("Path to the file where relay keys are stored. Defaults \
                       to 'relay_<id>.keys' in the working directory"))
            .arg(create_destination_arg()
                .help("Destination of exit traffic that doesn't name one"))
            .arg(Arg::new("heartbeat")
                .long("heartbeat")
                .help("Re-register in the directory every this number of seconds")
                .num_args(1)
                .value_parser(value_parser!(u64).range(1..)))
            .arg(Arg::new("registration-attempts")
                .long("registration-attempts")
                .help("Number of attempts to register in the directory on startup")
                .num_args(1)
                .value_parser(value_parser!(u32))
                .default_value("5")))
        .subcommand(node_command("destination")
            .about("Run destination server"))
        .subcommand(Command::new("config")
            .about("Run node with settings from a config file")
            .arg(Arg::new("cfg-file")
                .index(1)
                .help("Load settings from saved config file. \
                    Config file format is YAML")
                .num_args(1)
                .required(true)))
        .subcommand(Command::new("send")
            .about("Send a message through a new circuit and print the response")
            .arg(create_cds_arg())
            .arg(create_destination_arg())
            .arg(create_io_timeout_arg())
            .arg(Arg::new("length")
                .short('n')
                .long("length")
                .help("Number of relays in the circuit")
                .num_args(1)
                .value_parser(value_parser!(usize))
                .default_value("3"))
            .arg(Arg::new("message")
                .index(1)
                .help("Message to send. Text that is not JSON is sent as {\"msg\": text}")
                .num_args(1)
                .required(true)))
        .subcommand(Command::new("relays")
            .about("Print relays known to the directory")
            .arg(create_cds_arg())
            .arg(create_io_timeout_arg()))
        .subcommand(Command::new("fingerprint")
            .about("Print public key and fingerprint stored in a keys file")
            .arg(create_keys_file_arg().required(true)))
}

/// Parse command line arguments.
pub fn cli_parse() -> NodeConfig {
    let matches = app().get_matches();

    match matches.subcommand() {
        Some(("cds", m)) => run_args(Role::Cds, m),
        Some(("relay", m)) => run_args(Role::Relay, m),
        Some(("destination", m)) => run_args(Role::Destination, m),
        Some(("config", m)) => run_config(m),
        Some(("send", m)) => tools::run_send(m),
        Some(("relays", m)) => tools::run_relays(m),
        Some(("fingerprint", m)) => tools::run_fingerprint(m),
        _ => unreachable!("Subcommand is required"),
    }
}

/// Parse settings from a saved file.
fn parse_config(config_path: &str) -> NodeConfig {
    let config_builder = Config::builder()
        .set_default("log-type", "Stderr").expect("Can't set default value for `log-type`")
        .set_default("threads", "1").expect("Can't set default value for `threads`")
        .set_default("io-timeout", 10_i64).expect("Can't set default value for `io-timeout`")
        .set_default("registration-attempts", DEFAULT_REGISTRATION_ATTEMPTS as i64)
            .expect("Can't set default value for `registration-attempts`")
        .set_default("connections-limit", DEFAULT_CONNECTIONS_LIMIT as i64)
            .expect("Can't set default value for `connections-limit`")
        .add_source(CfgFile::new(config_path, CfgFileFormat::Yaml));

    let config_file = match config_builder.build() {
        Ok(cfg) => cfg,
        Err(e) => panic!("Can't build config file {}", e),
    };

    let config: NodeConfig = config_file.try_deserialize().expect("Can't deserialize config");

    if config.role == Role::Relay && config.cds_addr.is_none() {
        panic!("Can't deserialize config: 'cds-address' is not set");
    }
    if config.heartbeat == Some(Duration::ZERO) {
        panic!("Can't deserialize config: 'heartbeat' must be positive");
    }
    if config.relay_ttl == Some(Duration::ZERO) {
        panic!("Can't deserialize config: 'relay-ttl' must be positive");
    }

    config
}

fn run_config(matches: &ArgMatches) -> NodeConfig {
    let config_path = matches.get_one::<String>("cfg-file").map(String::as_str).unwrap_or_default();

    parse_config(config_path)
}

/// Value of an argument that only some subcommands define.
pub fn optional<T: Clone + Send + Sync + 'static>(matches: &ArgMatches, id: &str) -> Option<T> {
    matches.try_get_one::<T>(id).ok().flatten().cloned()
}

fn run_args(role: Role, matches: &ArgMatches) -> NodeConfig {
    let listen_addr = optional::<SocketAddr>(matches, "listen-address")
        .unwrap_or_else(|| SocketAddr::new([127, 0, 0, 1].into(), role.default_port()));

    let secs = |id: &str| optional::<u64>(matches, id).map(Duration::from_secs);

    let registration_attempts = optional::<u32>(matches, "registration-attempts")
        .unwrap_or(DEFAULT_REGISTRATION_ATTEMPTS);

    let connections_limit = optional::<usize>(matches, "connections-limit")
        .unwrap_or(DEFAULT_CONNECTIONS_LIMIT);

    let threads = optional::<Threads>(matches, "threads").unwrap_or(Threads::N(1));

    let log_type = optional::<LogType>(matches, "log-type").unwrap_or(LogType::Stderr);

    NodeConfig {
        role,
        listen_addr,
        cds_addr: optional(matches, "cds-address"),
        relay_id: optional(matches, "relay-id"),
        public_addr: optional(matches, "public-address"),
        keys_file: optional(matches, "keys-file"),
        destination: optional(matches, "destination"),
        relay_ttl: secs("relay-ttl"),
        heartbeat: secs("heartbeat"),
        io_timeout: secs("io-timeout").unwrap_or(DEFAULT_IO_TIMEOUT),
        registration_attempts,
        connections_limit,
        threads,
        log_type,
        unused: HashMap::new(),
    }
}

/// Circuit length of the `send` tool.
pub fn circuit_length(matches: &ArgMatches) -> usize {
    optional(matches, "length").unwrap_or(DEFAULT_CIRCUIT_LENGTH)
}
