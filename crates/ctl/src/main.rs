use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use visits_core::{
    api::{
        CreateTaskRequest, CreateTaskResponse, ErrorResponse, OkResponse, SetModeRequest,
        SetModeResponse, TaskListResponse, ADMIN_PASS_HEADER,
    },
    SweepReport, Task,
};

#[derive(Parser, Debug)]
#[command(name = "visitsctl", version, about = "Client for the visits tracker daemon")]
struct Args {
    /// Daemon base URL.
    #[arg(long, env = "VISITS_DAEMON", default_value = "http://127.0.0.1:8000")]
    daemon: String,

    /// Admin credential for list / set-mode / sweep / ping.
    #[arg(long, env = "ADMIN_PASS", hide_env_values = true)]
    admin_pass: Option<String>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Start tracking a user toward a target.
    Create {
        #[arg(long)]
        uid: String,
        #[arg(long)]
        target: i64,
    },
    Stop {
        #[arg(long)]
        id: String,
    },
    Get {
        #[arg(long)]
        id: String,
    },
    List,
    /// Switch between add_reports and add_increase.
    SetMode {
        #[arg(long)]
        mode: String,
    },
    /// Run one iteration over every running task.
    Sweep,
    /// Trigger a sweep every N seconds until interrupted.
    Ping {
        #[arg(long, default_value_t = 15)]
        every_secs: u64,
    },
}

struct Daemon {
    base: String,
    admin_pass: Option<String>,
    client: reqwest::Client,
}

impl Daemon {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base.trim_end_matches('/'), path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, admin: bool) -> anyhow::Result<T> {
        let req = self.admin(self.client.get(self.url(path)), admin)?;
        decode(req.send().await.context("send request")?).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<&B>,
        admin: bool,
    ) -> anyhow::Result<T> {
        let mut req = self.admin(self.client.post(self.url(path)), admin)?;
        if let Some(body) = body {
            req = req.json(body);
        }
        decode(req.send().await.context("send request")?).await
    }

    fn admin(
        &self,
        req: reqwest::RequestBuilder,
        admin: bool,
    ) -> anyhow::Result<reqwest::RequestBuilder> {
        if !admin {
            return Ok(req);
        }
        match &self.admin_pass {
            Some(pass) => Ok(req.header(ADMIN_PASS_HEADER, pass)),
            None => bail!("this command needs --admin-pass"),
        }
    }

    async fn sweep(&self) -> anyhow::Result<SweepReport> {
        self.post::<(), _>("/api/worker/run", None, true).await
    }
}

/// Decodes a success body, or turns the daemon's error body into an error.
async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> anyhow::Result<T> {
    let status = resp.status();
    if status.is_success() {
        return resp.json().await.context("decode response");
    }
    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&text)
        .map(|e| e.error)
        .unwrap_or(text);
    bail!("daemon returned {status}: {message}")
}

fn print<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let daemon = Daemon {
        base: args.daemon,
        admin_pass: args.admin_pass,
        client: reqwest::Client::new(),
    };

    match args.cmd {
        Cmd::Create { uid, target } => {
            let req = CreateTaskRequest { uid, target };
            let resp: CreateTaskResponse =
                daemon.post("/api/task/create", Some(&req), false).await?;
            print(&resp)?;
        }
        Cmd::Stop { id } => {
            let resp: OkResponse = daemon
                .post::<(), _>(&format!("/api/task/{id}/stop"), None, false)
                .await?;
            print(&resp)?;
        }
        Cmd::Get { id } => {
            let task: Task = daemon.get(&format!("/api/task/{id}"), false).await?;
            print(&task)?;
        }
        Cmd::List => {
            let resp: TaskListResponse = daemon.get("/api/tasks", true).await?;
            print(&resp)?;
        }
        Cmd::SetMode { mode } => {
            let req = SetModeRequest { mode };
            let resp: SetModeResponse = daemon
                .post("/api/admin/set_mode", Some(&req), true)
                .await?;
            print(&resp)?;
        }
        Cmd::Sweep => {
            let report = daemon.sweep().await?;
            print(&report)?;
        }
        Cmd::Ping { every_secs } => {
            let mut tick = tokio::time::interval(Duration::from_secs(every_secs.max(1)));
            info!(daemon = %daemon.base, every_secs, "pinging sweep endpoint");
            loop {
                tick.tick().await;
                match daemon.sweep().await {
                    Ok(report) => info!(
                        processed = report.processed_count,
                        mode = %report.accum_mode,
                        "sweep done"
                    ),
                    Err(e) => warn!(error = %e, "sweep failed"),
                }
            }
        }
    }

    Ok(())
}
