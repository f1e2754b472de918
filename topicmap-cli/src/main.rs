//! topicmap-cli — inspect and edit a running topicmap knowledge graph
//!
//! Talks to the topicmap HTTP API (default `http://127.0.0.1:8766`).
//!
//! # Subcommands
//! - `status`                          — server health and graph counts
//! - `list [--json]`                   — all topic nodes, oldest first
//! - `show <id> [--json]`              — one node
//! - `neighbors <id> [--json]`         — linked topics, most similar first
//! - `graph [--json]`                  — nodes and links
//! - `add <transcript.json | ->`       — run a session transcript through ingest
//! - `delete <id>`                     — delete a node and its links
//! - `clear --yes`                     — empty the graph

use std::io::Read;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8766";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "topicmap-cli",
    version,
    about = "Inspect and edit a topicmap knowledge graph"
)]
struct Cli {
    /// topicmap HTTP server URL (overrides TOPICMAP_HTTP_URL env var)
    #[arg(long, env = "TOPICMAP_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show server status
    Status,

    /// List topic nodes
    List {
        #[arg(long)]
        json: bool,
    },

    /// Show one topic node
    Show {
        id: String,
        #[arg(long)]
        json: bool,
    },

    /// List nodes linked to a topic
    Neighbors {
        id: String,
        #[arg(long)]
        json: bool,
    },

    /// Print the whole graph
    Graph {
        #[arg(long)]
        json: bool,
    },

    /// Ingest a session transcript (JSON file, or `-` for stdin)
    Add {
        transcript: String,

        /// Session id to use when the input is a bare array of turns
        #[arg(long)]
        session: Option<String>,
    },

    /// Delete a topic node and its links
    Delete { id: String },

    /// Remove every node and link
    Clear {
        /// Required: clearing cannot be undone
        #[arg(long)]
        yes: bool,
    },
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeView {
    pub id: String,
    pub label: String,
    pub session_id: String,
    #[serde(default)]
    pub message_count: u32,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct LinkView {
    pub source: String,
    pub target: String,
    pub similarity: f32,
}

#[derive(Debug, Deserialize)]
pub struct GraphView {
    pub nodes: Vec<NodeView>,
    pub links: Vec<LinkView>,
    pub version: u64,
}

#[derive(Debug, Deserialize)]
pub struct NeighborView {
    pub node: NodeView,
    pub similarity: f32,
}

// ============================================================================
// Formatting
// ============================================================================

/// First 8 characters of a UUID, enough to tell nodes apart on screen.
pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

pub fn format_node(node: &NodeView) -> String {
    let date = node.created_at.get(..10).unwrap_or(&node.created_at);
    format!(
        "{}  {:<40}  {:>3} msgs  {}",
        short_id(&node.id),
        node.label,
        node.message_count,
        date
    )
}

/// `Logarithmic Equations → Logarithms (0.92)`, falling back to ids for
/// endpoints missing from `graph`.
pub fn format_link(graph: &GraphView, link: &LinkView) -> String {
    let label = |id: &str| -> String {
        graph
            .nodes
            .iter()
            .find(|n| n.id == id)
            .map(|n| n.label.clone())
            .unwrap_or_else(|| short_id(id).to_string())
    };
    format!(
        "{} → {} ({:.2})",
        label(&link.source),
        label(&link.target),
        link.similarity
    )
}

/// One-line summary of a `POST /sessions` response body.
pub fn describe_outcome(body: &serde_json::Value) -> String {
    match body["outcome"].as_str() {
        Some("created") => {
            let label = body["node"]["label"].as_str().unwrap_or("?");
            let id = body["node"]["id"].as_str().unwrap_or("?");
            let links = body["links"].as_array().map(|l| l.len()).unwrap_or(0);
            format!("Created \"{}\" ({}) with {} link(s)", label, short_id(id), links)
        }
        Some("skipped") => match body["reason"].as_str() {
            Some("undetermined") => "Skipped: no clear topic yet".to_string(),
            Some("not_topic_worthy") => "Skipped: session too short to name a topic".to_string(),
            other => format!("Skipped: {}", other.unwrap_or("unknown reason")),
        },
        _ => format!("Unexpected response: {}", body),
    }
}

/// Accepts a full transcript object, or a bare array of turns with `session`.
pub fn parse_transcript(input: &str, session: Option<&str>) -> anyhow::Result<serde_json::Value> {
    let value: serde_json::Value =
        serde_json::from_str(input).context("transcript is not valid JSON")?;

    match value {
        serde_json::Value::Object(ref obj) if obj.contains_key("turns") => {
            if !obj.contains_key("sessionId") {
                bail!("transcript object needs a \"sessionId\" field");
            }
            Ok(value)
        }
        serde_json::Value::Array(turns) => {
            let Some(session) = session else {
                bail!("a bare array of turns needs --session <id>");
            };
            Ok(serde_json::json!({ "sessionId": session, "turns": turns }))
        }
        _ => bail!("expected {{\"sessionId\", \"turns\"}} or an array of turns"),
    }
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

struct Api {
    client: reqwest::blocking::Client,
    server: String,
}

impl Api {
    fn new(server: &str) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            server: server.trim_end_matches('/').to_string(),
        })
    }

    fn send(&self, req: reqwest::blocking::RequestBuilder) -> anyhow::Result<serde_json::Value> {
        let resp = req
            .send()
            .with_context(|| format!("cannot reach {}", self.server))?;
        let status = resp.status();
        let body: serde_json::Value = resp.json().unwrap_or_default();
        if !status.is_success() {
            let msg = body["error"].as_str().unwrap_or("no error message");
            bail!("server returned {}: {}", status, msg);
        }
        Ok(body)
    }

    fn get(&self, path: &str) -> anyhow::Result<serde_json::Value> {
        self.send(self.client.get(format!("{}{}", self.server, path)))
    }

    fn delete(&self, path: &str) -> anyhow::Result<serde_json::Value> {
        self.send(self.client.delete(format!("{}{}", self.server, path)))
    }

    fn post(&self, path: &str, body: &serde_json::Value) -> anyhow::Result<serde_json::Value> {
        self.send(self.client.post(format!("{}{}", self.server, path)).json(body))
    }
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn do_status(api: &Api) -> anyhow::Result<()> {
    let body = api.get("/health")?;
    println!("topicmap server: {}", body["status"].as_str().unwrap_or("unknown"));
    println!("Version:         {}", body["version"].as_str().unwrap_or("?"));
    println!("Store:           {}", body["store"].as_str().unwrap_or("?"));
    println!("Nodes:           {}", body["nodes"]);
    println!("Links:           {}", body["links"]);
    println!("Graph version:   {}", body["graph_version"]);
    println!("Ingest enabled:  {}", body["ingest_enabled"]);
    println!("Socket:          {}", body["socket"].as_str().unwrap_or("?"));
    Ok(())
}

fn do_list(api: &Api, json: bool) -> anyhow::Result<()> {
    let body = api.get("/nodes")?;
    if json {
        return print_json(&body["nodes"]);
    }
    let nodes: Vec<NodeView> = serde_json::from_value(body["nodes"].clone())?;
    if nodes.is_empty() {
        eprintln!("The graph is empty.");
    }
    for node in &nodes {
        println!("{}", format_node(node));
    }
    Ok(())
}

fn do_show(api: &Api, id: &str, json: bool) -> anyhow::Result<()> {
    let body = api.get(&format!("/nodes/{}", id))?;
    if json {
        return print_json(&body);
    }
    let node: NodeView = serde_json::from_value(body)?;
    println!("Id:        {}", node.id);
    println!("Label:     {}", node.label);
    println!("Session:   {}", node.session_id);
    println!("Messages:  {}", node.message_count);
    println!("Created:   {}", node.created_at);
    Ok(())
}

fn do_neighbors(api: &Api, id: &str, json: bool) -> anyhow::Result<()> {
    let body = api.get(&format!("/nodes/{}/neighbors", id))?;
    if json {
        return print_json(&body["neighbors"]);
    }
    let neighbors: Vec<NeighborView> = serde_json::from_value(body["neighbors"].clone())?;
    if neighbors.is_empty() {
        eprintln!("No linked topics.");
    }
    for n in &neighbors {
        println!("{:.2}  {}", n.similarity, format_node(&n.node));
    }
    Ok(())
}

fn do_graph(api: &Api, json: bool) -> anyhow::Result<()> {
    let body = api.get("/graph")?;
    if json {
        return print_json(&body);
    }
    let graph: GraphView = serde_json::from_value(body)?;
    println!(
        "{} nodes, {} links (version {})",
        graph.nodes.len(),
        graph.links.len(),
        graph.version
    );
    for node in &graph.nodes {
        println!("  {}", format_node(node));
    }
    for link in &graph.links {
        println!("  {}", format_link(&graph, link));
    }
    Ok(())
}

fn do_add(api: &Api, source: &str, session: Option<&str>) -> anyhow::Result<()> {
    let input = if source == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(source).with_context(|| format!("cannot read {}", source))?
    };
    let transcript = parse_transcript(&input, session)?;
    let body = api.post("/sessions", &transcript)?;
    println!("{}", describe_outcome(&body));
    Ok(())
}

fn do_delete(api: &Api, id: &str) -> anyhow::Result<()> {
    let body = api.delete(&format!("/nodes/{}", id))?;
    if body["deleted"].as_bool().unwrap_or(false) {
        println!("Deleted {}", id);
    } else {
        println!("No node {} (nothing to delete)", id);
    }
    Ok(())
}

fn do_clear(api: &Api, yes: bool) -> anyhow::Result<()> {
    if !yes {
        bail!("refusing to clear the graph without --yes");
    }
    api.delete("/graph")?;
    println!("Graph cleared.");
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn run(cli: Cli) -> anyhow::Result<()> {
    let api = Api::new(&cli.server)?;
    match cli.command {
        Commands::Status => do_status(&api),
        Commands::List { json } => do_list(&api, json),
        Commands::Show { id, json } => do_show(&api, &id, json),
        Commands::Neighbors { id, json } => do_neighbors(&api, &id, json),
        Commands::Graph { json } => do_graph(&api, json),
        Commands::Add { transcript, session } => do_add(&api, &transcript, session.as_deref()),
        Commands::Delete { id } => do_delete(&api, &id),
        Commands::Clear { yes } => do_clear(&api, yes),
    }
}

fn main() {
    if let Err(e) = run(Cli::parse()) {
        eprintln!("topicmap-cli: {:#}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
