use clap::Parser;
use std::path::PathBuf;

/// Periscope - an intercepting proxy for AI API traffic
#[derive(Debug, Parser)]
#[command(name = "periscope-server")]
#[command(about = "Intercepting reverse proxy that observes AI API traffic", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Port the proxy listener binds to
    #[arg(long, env = "PORT_PROXY", default_value_t = 8080)]
    pub proxy_port: u16,

    /// Port the admin listener (events, health) binds to
    #[arg(long, env = "PORT_ADMIN", default_value_t = 8081)]
    pub admin_port: u16,

    /// Default target origin, seeded into the config on first boot only
    #[arg(long, env = "TARGET_URL")]
    pub target_url: Option<String>,

    /// Path to the SQLite database
    #[arg(long, env = "PERISCOPE_DB", default_value = "periscope.db")]
    pub db: PathBuf,

    /// Address both listeners bind to
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_args() {
        let cli = Cli::try_parse_from(["periscope-server"]).unwrap();
        assert_eq!(cli.proxy_port, 8080);
        assert_eq!(cli.admin_port, 8081);
        assert_eq!(cli.db, PathBuf::from("periscope.db"));
        assert!(cli.target_url.is_none());
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "periscope-server",
            "--proxy-port",
            "9000",
            "--target-url",
            "https://api.openai.com",
        ])
        .unwrap();
        assert_eq!(cli.proxy_port, 9000);
        assert_eq!(cli.target_url.as_deref(), Some("https://api.openai.com"));
    }
}
