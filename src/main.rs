use clap::{CommandFactory, Parser};
use log::{error, info};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use xo_mcp_rs::cli::{Args, Commands, ServerType};
use xo_mcp_rs::logging::{self, LogOptions};
use xo_mcp_rs::mcp::{http, McpServer};
use xo_mcp_rs::settings::Settings;
use xo_mcp_rs::xo::XoClient;

#[tokio::main]
async fn main() {
    // Bad flag or env values are configuration errors; help and version still exit 0.
    let args = Args::try_parse().unwrap_or_else(|e| {
        if e.use_stderr() {
            let _ = e.print();
            process::exit(1);
        }
        e.exit()
    });

    if let Some(Commands::Completions { shell }) = args.command {
        let mut cmd = Args::command();
        let name = cmd.get_name().to_string();
        clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
        return;
    }

    let _log_guard = match logging::init(&LogOptions {
        level: args.log_level.clone(),
        file_enable: args.log_file_enable,
        dir: PathBuf::from(&args.log_dir),
        filename: args.log_filename.clone(),
        rotate: args.log_rotate.clone(),
    }) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialise logging: {:#}", e);
            process::exit(1);
        }
    };

    let mut settings = match Settings::new(args.config.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };

    // Override settings with CLI arguments if provided
    if let Some(base_url) = args.base_url {
        settings.base_url = Some(base_url);
    }
    if let Some(api_token) = args.api_token {
        settings.api_token = Some(api_token);
    }
    if let Some(cert_verify) = args.cert_verify {
        settings.cert_verify = Some(cert_verify);
    }
    if let Some(cert_path) = args.cert_path {
        settings.cert_path = Some(cert_path);
    }
    if let Some(timeout_secs) = args.timeout_secs {
        settings.timeout_secs = Some(timeout_secs);
    }

    let profile = match settings.resolve() {
        Ok(p) => p,
        Err(e) => {
            error!("Configuration error: {}", e);
            process::exit(1);
        }
    };

    info!("Connecting to Xen Orchestra at {}", profile.base_url);

    let client = match XoClient::new(&profile) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to create client: {:#}", e);
            process::exit(1);
        }
    };

    let server = Arc::new(McpServer::new(client));

    let result = match args.server_type {
        ServerType::Stdio => {
            info!("Starting MCP Server (stdio transport)...");
            server.run_stdio().await
        }
        ServerType::Http => {
            info!("Starting MCP Server (http transport)...");
            http::serve(server, &args.http_host, args.http_port, args.http_auth_token).await
        }
    };

    if let Err(e) = result {
        error!("Server error: {:#}", e);
        process::exit(1);
    }
}
