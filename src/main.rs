use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{json, Map, Value};
use stanford_mcp::config::{default_config_path, find_config_file, load_config, Config, LogFormat};
use stanford_mcp::mcp::{McpServer, ToolKind};
use stanford_mcp::sources::ExploreCoursesSource;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Stanford MCP - Stanford ExploreCourses catalog as MCP tools
#[derive(Parser, Debug)]
#[command(name = "stanford-mcp")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "MCP server and CLI for Stanford's ExploreCourses catalog", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Output format for one-shot commands
    #[arg(long, short, value_enum, global = true, default_value_t = OutputFormat::Auto)]
    output: OutputFormat,

    /// Log format (overrides the config file)
    #[arg(long, value_enum, global = true)]
    log_format: Option<LogFormat>,

    /// Configuration file path
    #[arg(long, global = true, env = "STANFORD_MCP_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Output format for results
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    /// Text on a terminal, JSON otherwise
    Auto,
    /// Human-readable text, as MCP clients see it
    Text,
    /// Structured JSON
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the MCP server (stdio by default)
    Serve {
        /// Serve streamable HTTP instead of stdio
        #[arg(long)]
        http: bool,

        /// Host to bind in HTTP mode
        #[arg(long)]
        host: Option<String>,

        /// Port to bind in HTTP mode
        #[arg(long, short, env = "PORT")]
        port: Option<u16>,

        /// Require this bearer token on /mcp in HTTP mode
        #[arg(long, env = "API_AUTH_TOKEN", hide_env_values = true)]
        auth_token: Option<String>,
    },

    /// Search courses offered in a term
    #[command(alias = "s")]
    Search {
        /// Free-text search
        keyword: Option<String>,

        /// Term, e.g. "2024-2025 Autumn" or "Winter"
        #[arg(long, short)]
        term: String,

        /// Subject code, e.g. CS
        #[arg(long, short)]
        department: Option<String>,

        /// Course number, e.g. 106A
        #[arg(long, short)]
        number: Option<String>,

        /// Undergraduate requirement filter (repeatable), e.g. WAY_FR
        #[arg(long = "ug-req")]
        ug_reqs: Vec<String>,

        /// Units filter (repeatable): 1-5 or GT5
        #[arg(long)]
        units: Vec<String>,

        /// Time-of-day filter (repeatable), e.g. morning
        #[arg(long = "time")]
        times: Vec<String>,

        /// Meeting day filter (repeatable), e.g. monday
        #[arg(long = "day")]
        days: Vec<String>,

        /// Career filter (repeatable): UG, GR, GSB, LAW, MED
        #[arg(long = "career")]
        careers: Vec<String>,
    },

    /// Show the full record of one course
    #[command(alias = "c")]
    Course {
        /// Course id (105645) or code (CS106A)
        course_id: String,

        /// Term, e.g. "2024-2025 Autumn"
        #[arg(long, short)]
        term: String,
    },

    /// Show the sections and meeting times of one course
    Schedule {
        /// Course id (105645) or code (CS106A)
        course_id: String,

        /// Term, e.g. "2024-2025 Autumn"
        #[arg(long, short)]
        term: String,
    },

    /// List departments, optionally of one school
    Departments {
        /// Term or academic year, e.g. "2024-2025"
        #[arg(long, short)]
        term: String,

        /// School name, e.g. "School of Engineering"
        #[arg(long, short)]
        school: Option<String>,
    },

    /// List schools
    Schools {
        /// Term or academic year (default: configured year)
        #[arg(long, short)]
        term: Option<String>,

        /// Include department counts
        #[arg(long)]
        counts: bool,
    },

    /// List the MCP tools this server offers
    Tools {
        /// Print input and output schemas
        #[arg(long)]
        schemas: bool,
    },

    /// Inspect or create the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,

    /// Print the config file in use and the default location
    Path,

    /// Write a config file with default values
    Init {
        /// Destination (default: per-user config location)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn init_logging(cli: &Cli, config: &Config) {
    let level = if cli.quiet {
        "error".to_string()
    } else {
        match cli.verbose {
            0 => config.logging.level.clone(),
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("stanford_mcp={}", level)));

    // stdout carries protocol messages in stdio mode, so logs always go to stderr
    let registry = tracing_subscriber::registry().with(filter);
    match cli.log_format.unwrap_or(config.logging.format) {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(std::io::stderr().is_terminal()),
            )
            .init(),
    }
}

fn build_server(config: &Config) -> Result<McpServer> {
    let source = ExploreCoursesSource::from_config(&config.catalog)
        .context("Failed to create ExploreCourses client")?;
    Ok(McpServer::from_config(Arc::new(source), config)?)
}

/// Arguments object with `None`s and empty lists left out
fn tool_args(pairs: Vec<(&str, Value)>) -> Value {
    let map: Map<String, Value> = pairs
        .into_iter()
        .filter(|(_, v)| !v.is_null() && v.as_array().map_or(true, |a| !a.is_empty()))
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    Value::Object(map)
}

async fn run_tool(server: &McpServer, tool: ToolKind, args: Value, output: OutputFormat) -> Result<()> {
    let output_json = match output {
        OutputFormat::Auto => !std::io::stdout().is_terminal(),
        OutputFormat::Text => false,
        OutputFormat::Json => true,
    };

    let result = match server.tools().invoke(tool.name(), Some(args)).await {
        Ok(result) => result,
        Err(e) => bail!("{}", e),
    };

    if output_json {
        println!("{}", serde_json::to_string_pretty(&result.structured)?);
    } else {
        println!("{}", result.text);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    init_logging(&cli, &config);

    match cli.command {
        None => {
            let server = build_server(&config)?;
            let _maintenance = server.spawn_maintenance(config.session.reap_interval());
            server.run_stdio().await?;
        }

        Some(Commands::Serve {
            http,
            host,
            port,
            auth_token,
        }) => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if auth_token.is_some() {
                config.server.auth_token = auth_token;
            }

            let server = build_server(&config)?;
            let _maintenance = server.spawn_maintenance(config.session.reap_interval());

            if http {
                let addr = format!("{}:{}", config.server.host, config.server.port);
                let (bound_addr, handle) = server
                    .run_http(&addr, config.server.auth_token.clone())
                    .await?;
                tracing::info!("MCP server listening on http://{}/mcp", bound_addr);

                handle
                    .await
                    .map_err(|e| anyhow::anyhow!("Server task failed: {}", e))?;
            } else {
                server.run_stdio().await?;
            }
        }

        Some(Commands::Search {
            keyword,
            term,
            department,
            number,
            ug_reqs,
            units,
            times,
            days,
            careers,
        }) => {
            let server = build_server(&config)?;
            let args = tool_args(vec![
                ("term", json!(term)),
                ("department", json!(department)),
                ("number", json!(number)),
                ("keyword", json!(keyword)),
                ("ug_reqs", json!(ug_reqs)),
                ("units", json!(units)),
                ("times", json!(times)),
                ("days", json!(days)),
                ("careers", json!(careers)),
            ]);
            run_tool(&server, ToolKind::SearchCourses, args, cli.output).await?;
        }

        Some(Commands::Course { course_id, term }) => {
            let server = build_server(&config)?;
            let args = json!({ "course_id": course_id, "term": term });
            run_tool(&server, ToolKind::GetCourse, args, cli.output).await?;
        }

        Some(Commands::Schedule { course_id, term }) => {
            let server = build_server(&config)?;
            let args = json!({ "course_id": course_id, "term": term });
            run_tool(&server, ToolKind::GetSchedule, args, cli.output).await?;
        }

        Some(Commands::Departments { term, school }) => {
            let server = build_server(&config)?;
            let args = tool_args(vec![("term", json!(term)), ("school", json!(school))]);
            run_tool(&server, ToolKind::ListDepartments, args, cli.output).await?;
        }

        Some(Commands::Schools { term, counts }) => {
            let server = build_server(&config)?;
            let args = tool_args(vec![
                ("term", json!(term)),
                ("include_department_count", json!(counts)),
            ]);
            run_tool(&server, ToolKind::ListSchools, args, cli.output).await?;
        }

        Some(Commands::Tools { schemas }) => {
            let server = build_server(&config)?;
            for tool in server.tools().all() {
                if schemas {
                    println!("{}", serde_json::to_string_pretty(&tool.to_tool())?);
                } else {
                    println!("{} - {}", tool.name(), tool.kind.title());
                    println!("  {}", tool.kind.description());
                }
            }
        }

        Some(Commands::Config { command }) => match command {
            ConfigCommands::Show => {
                print!("{}", config.to_toml()?);
            }
            ConfigCommands::Path => {
                let active = cli.config.clone().or_else(find_config_file);
                match active {
                    Some(path) => println!("Active config: {}", path.display()),
                    None => println!("Active config: (none, using defaults)"),
                }
                if let Some(path) = default_config_path() {
                    println!("Default location: {}", path.display());
                }
            }
            ConfigCommands::Init { path, force } => {
                let path = match path.or_else(default_config_path) {
                    Some(path) => path,
                    None => bail!("No config directory on this platform; pass a path"),
                };
                Config::default().save(&path, force)?;
                if !cli.quiet {
                    eprintln!("Wrote {}", path.display());
                }
            }
        },
    }

    Ok(())
}
