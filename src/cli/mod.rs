use crate::config::Config;
use crate::occupancy::{self, Classifier, NameClassifier};
use crate::rtc::{RoomControl, RtcClient};
use anyhow::Result;
use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "roomwarden")]
#[command(about = "Room lifecycle manager for telemedicine RTC rooms", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Print version information
    Version,
    /// Dispatch a worker to a room once, bypassing the loop
    Dispatch(DispatchCliArgs),
    /// List live rooms and their participants
    Rooms,
}

#[derive(ClapArgs, Debug)]
pub struct DispatchCliArgs {
    /// Room to dispatch into
    pub room: String,
    /// Worker to dispatch (defaults to the room's configured route)
    #[arg(short, long)]
    pub agent: Option<String>,
}

fn build_client(config: &Config) -> Result<RtcClient> {
    let credentials = config.server.resolve()?;
    Ok(RtcClient::new(
        &credentials.url,
        &credentials.api_key,
        &credentials.api_secret,
    ))
}

pub async fn handle_dispatch_command(args: DispatchCliArgs) -> Result<()> {
    let config = Config::load()?;
    let client = build_client(&config)?;

    let agent = args.agent.or_else(|| {
        config
            .routing
            .routes
            .iter()
            .find(|rule| args.room.starts_with(rule.prefix.as_str()))
            .map(|rule| rule.agent.clone())
    });
    let Some(agent) = agent else {
        anyhow::bail!(
            "no route matches room '{}'; pass --agent explicitly",
            args.room
        );
    };

    client.dispatch_agent(&args.room, &agent).await?;
    println!("Dispatched {agent} to {}", args.room);
    Ok(())
}

pub async fn handle_rooms_command() -> Result<()> {
    let config = Config::load()?;
    let client = build_client(&config)?;
    let classifier = NameClassifier::from_config(&config.classifier);

    let rooms = client.list_rooms().await?;
    if rooms.is_empty() {
        println!("No live rooms.");
        return Ok(());
    }

    for room in rooms {
        let participants = client.list_participants(&room.name).await?;
        let real = occupancy::real_count(&participants, &classifier);
        println!(
            "{} ({} participants, {} real)",
            room.name,
            participants.len(),
            real
        );
        for p in &participants {
            let mut flags = Vec::new();
            if p.audio_muted() {
                flags.push("audio muted");
            }
            if p.video_muted() {
                flags.push("video muted");
            }
            let flags = if flags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", flags.join(", "))
            };
            let name = if p.name.is_empty() || p.name == p.identity {
                String::new()
            } else {
                format!(" ({})", p.name)
            };
            println!("  {:?} {}{}{}", classifier.classify(p), p.identity, name, flags);
        }
    }
    Ok(())
}
