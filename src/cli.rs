use clap::builder::BoolishValueParser;
use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config file path
    #[arg(short, long, env = "XO_CONFIG")]
    pub config: Option<String>,

    /// Xen Orchestra base URL (e.g., https://xo.example.com)
    #[arg(short = 'H', long, env = "XO_BASE_URL")]
    pub base_url: Option<String>,

    /// Xen Orchestra API token
    #[arg(short = 'T', long, env = "XO_API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    /// Verify the server certificate (true/false)
    #[arg(long, env = "CERT_VERIFY", value_parser = BoolishValueParser::new())]
    pub cert_verify: Option<bool>,

    /// PEM bundle of CA certificates to trust for the XO server
    #[arg(long, env = "CERT_PATH")]
    pub cert_path: Option<String>,

    /// Upstream request timeout in seconds (default: 10)
    #[arg(long, env = "XO_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short = 'L', long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Enable logging to a file
    #[arg(long, env = "XO_LOG_FILE_ENABLE", default_value_t = false)]
    pub log_file_enable: bool,

    /// Log file directory
    #[arg(long, env = "XO_LOG_DIR", default_value = ".")]
    pub log_dir: String,

    /// Log filename prefix
    #[arg(long, env = "XO_LOG_FILENAME", default_value = "xo-mcp-rs.log")]
    pub log_filename: String,

    /// Log rotation strategy (daily, hourly, never)
    #[arg(long, env = "XO_LOG_ROTATE", default_value = "daily")]
    pub log_rotate: String,

    /// Server type
    #[arg(short = 't', long, env = "XO_SERVER_TYPE", value_enum, default_value_t = ServerType::Stdio)]
    pub server_type: ServerType,

    /// HTTP Host (only for http type)
    #[arg(long, env = "XO_HTTP_HOST", default_value = "127.0.0.1")]
    pub http_host: String,

    /// HTTP Port (only for http type)
    #[arg(short = 'l', long, env = "XO_HTTP_PORT", default_value_t = 8080)]
    pub http_port: u16,

    /// HTTP Auth Token (only for http type)
    #[arg(long, env = "XO_HTTP_AUTH_TOKEN", hide_env_values = true)]
    pub http_auth_token: Option<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ServerType {
    Stdio,
    Http,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate shell completion scripts
    Completions {
        /// The shell to generate the script for
        #[arg(value_enum)]
        shell: Shell,
    },
}
