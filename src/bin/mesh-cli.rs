use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};

#[derive(Parser)]
#[command(name = "mesh-cli")]
#[command(about = "Management CLI for the service mesh", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8761")]
    registry: String,

    #[arg(short, long, default_value = "http://localhost:8888")]
    config_server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List known services with instance counts
    Services,
    /// Show the UP instances of a service
    Lookup { service: String },
    /// Register an instance
    Register {
        service: String,
        instance_id: String,
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long)]
        port: u16,
    },
    /// Renew an instance lease, optionally changing its status
    Heartbeat {
        service: String,
        instance_id: String,
        /// UP, DOWN, STARTING or OUT_OF_SERVICE
        #[arg(long)]
        status: Option<String>,
    },
    /// Remove an instance
    Deregister { service: String, instance_id: String },
    /// Fetch the merged config document of an application
    ConfigGet {
        application: String,
        #[arg(default_value = "default")]
        profile: String,
    },
    /// Commit properties to a config source (KEY=VALUE, values parsed as JSON when possible)
    ConfigPut {
        application: String,
        profile: String,
        #[arg(required = true)]
        properties: Vec<String>,
    },
    /// Health of the registry and config server
    Health,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let registry = cli.registry.trim_end_matches('/');
    let config_server = cli.config_server.trim_end_matches('/');

    match cli.command {
        Commands::Services => {
            let res = client.get(format!("{}/instances", registry)).send().await?;
            print_response(res).await?;
        }
        Commands::Lookup { service } => {
            let res = client
                .get(format!("{}/instances/{}", registry, service))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Register {
            service,
            instance_id,
            host,
            port,
        } => {
            let res = client
                .post(format!("{}/instances/{}/{}", registry, service, instance_id))
                .json(&json!({ "host": host, "port": port }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Heartbeat {
            service,
            instance_id,
            status,
        } => {
            let res = client
                .put(format!("{}/instances/{}/{}", registry, service, instance_id))
                .json(&json!({ "status": status }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Deregister {
            service,
            instance_id,
        } => {
            let res = client
                .delete(format!("{}/instances/{}/{}", registry, service, instance_id))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::ConfigGet {
            application,
            profile,
        } => {
            let res = client
                .get(format!("{}/{}/{}", config_server, application, profile))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::ConfigPut {
            application,
            profile,
            properties,
        } => {
            let body = parse_properties(&properties)?;
            let res = client
                .put(format!("{}/{}/{}", config_server, application, profile))
                .json(&body)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Health => {
            for (name, base) in [("registry", registry), ("config-server", config_server)] {
                let status = match client.get(format!("{}/health", base)).send().await {
                    Ok(res) => res.json::<Value>().await.unwrap_or(Value::Null),
                    Err(e) => json!({ "status": "UNREACHABLE", "error": e.to_string() }),
                };
                println!("{}", serde_json::to_string_pretty(&json!({ name: status }))?);
            }
        }
    }

    Ok(())
}

fn parse_properties(pairs: &[String]) -> Result<Map<String, Value>, Box<dyn std::error::Error>> {
    let mut map = Map::new();
    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", pair))?;
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        map.insert(key.trim().to_string(), value);
    }
    Ok(map)
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    if text.is_empty() {
        println!("{}", json!({ "status": status.as_u16() }));
    } else {
        match serde_json::from_str::<Value>(&text) {
            Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
            Err(_) => println!("{}", text),
        }
    }
    if !status.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
