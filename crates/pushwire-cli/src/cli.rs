use clap::{Parser, Subcommand, ValueEnum};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "pushwire")]
#[command(about = "pushwire: web push dispatch for registered applications")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (overrides PUSHWIRE_CONFIG and ./pushwire.toml)
    #[arg(short, long, global = true, env = "PUSHWIRE_CONFIG")]
    pub config: Option<String>,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Send a notification to every subscriber of an application
    Send(SendArgs),
    /// Show one delivery log
    Log(LogArgs),
    /// List recent delivery logs of an application
    Logs(LogsArgs),
    /// Generate a VAPID key pair
    VapidKeys,
}

#[derive(clap::Args)]
pub struct SendArgs {
    /// Application ID
    #[arg(long)]
    pub app: Uuid,
    /// Notification title
    #[arg(long)]
    pub title: String,
    /// Notification body
    #[arg(long)]
    pub body: Option<String>,
    /// Icon URL
    #[arg(long)]
    pub icon: Option<String>,
    /// URL opened when the notification is clicked
    #[arg(long)]
    pub url: Option<String>,
    /// Extra JSON object passed through as `data`
    #[arg(long)]
    pub data: Option<String>,
    /// Print the final delivery log once the dispatch finishes
    #[arg(long)]
    pub wait: bool,
}

#[derive(clap::Args)]
pub struct LogArgs {
    /// Delivery log ID
    pub id: Uuid,
}

#[derive(clap::Args)]
pub struct LogsArgs {
    /// Application ID
    #[arg(long)]
    pub app: Uuid,
    /// Maximum number of logs
    #[arg(long, default_value_t = 20)]
    pub limit: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_args_parse() {
        let app = Uuid::new_v4();
        let cli = Cli::try_parse_from([
            "pushwire",
            "send",
            "--app",
            &app.to_string(),
            "--title",
            "Hello",
            "--data",
            r#"{"k":1}"#,
            "--wait",
        ])
        .unwrap();
        match cli.command {
            Commands::Send(args) => {
                assert_eq!(args.app, app);
                assert_eq!(args.title, "Hello");
                assert!(args.wait);
                assert_eq!(args.data.as_deref(), Some(r#"{"k":1}"#));
            }
            _ => panic!("expected send"),
        }
    }

    #[test]
    fn test_send_requires_title() {
        let app = Uuid::new_v4().to_string();
        assert!(Cli::try_parse_from(["pushwire", "send", "--app", &app]).is_err());
    }

    #[test]
    fn test_logs_default_limit() {
        let app = Uuid::new_v4().to_string();
        let cli = Cli::try_parse_from(["pushwire", "logs", "--app", &app, "-f", "json"]).unwrap();
        assert_eq!(cli.format, Some(OutputFormat::Json));
        match cli.command {
            Commands::Logs(args) => assert_eq!(args.limit, 20),
            _ => panic!("expected logs"),
        }
    }
}
