use anyhow::Result;
use colored::Colorize;
use lightswitch::prelude::*;
use lightswitch::{ENGINE_NAME, VERSION as LIB_VERSION};
use rustyline::highlight::Highlighter;
use rustyline::Editor;
use rustyline_derive::{Completer, Helper, Hinter, Validator};
use std::borrow::Cow;
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

const SHELL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A custom helper struct for rustyline that enables syntax highlighting.
#[derive(Completer, Helper, Hinter, Validator)]
struct MyHighlighter;

impl Highlighter for MyHighlighter {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if let Some((command, rest)) = line.split_once(' ') {
            let colored_command = command.yellow().bold();
            let colored_rest = rest.yellow();
            Cow::Owned(format!("{} {}", colored_command, colored_rest))
        } else {
            Cow::Owned(line.yellow().bold().to_string())
        }
    }
    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

/// A parsed shell command.
#[derive(Debug, Clone, PartialEq)]
enum Command {
    Step(u64),
    Reset,
    Status,
    Send(i32),
    AddLight { name: String, range: f64 },
    RemoveLight(String),
    Watch,
    Unwatch,
    Help,
    Exit,
    Empty,
}

fn parse_command(line: &str) -> Result<Command, String> {
    let args = line.split_whitespace().collect::<Vec<_>>();
    let Some(command) = args.first() else {
        return Ok(Command::Empty);
    };
    match *command {
        "step" => match args.get(1) {
            None => Ok(Command::Step(1)),
            Some(count) => count
                .parse::<u64>()
                .map(Command::Step)
                .map_err(|_| format!("'{}' is not a valid step count.", count)),
        },
        "reset" => Ok(Command::Reset),
        "status" => Ok(Command::Status),
        "send" => match args.get(1) {
            Some(value) => value
                .parse::<i32>()
                .map(Command::Send)
                .map_err(|_| format!("'{}' is not a valid range.", value)),
            None => Err("Usage: send <RANGE>".to_string()),
        },
        "add" => match (args.get(1), args.get(2), args.get(3)) {
            (Some(&"light"), Some(name), range) => {
                let range = match range {
                    Some(value) => value
                        .parse::<f64>()
                        .map_err(|_| format!("'{}' is not a valid range.", value))?,
                    None => 0.0,
                };
                Ok(Command::AddLight {
                    name: name.to_string(),
                    range,
                })
            }
            _ => Err("Usage: add light <NAME> [RANGE]".to_string()),
        },
        "remove" => match (args.get(1), args.get(2)) {
            (Some(&"light"), Some(name)) => Ok(Command::RemoveLight(name.to_string())),
            _ => Err("Usage: remove light <NAME>".to_string()),
        },
        "watch" => Ok(Command::Watch),
        "unwatch" => Ok(Command::Unwatch),
        "help" => Ok(Command::Help),
        "exit" | "quit" => Ok(Command::Exit),
        _ => Err(format!("Unknown command: '{}'. Type 'help'.", line.trim())),
    }
}

fn print_banner() {
    if env::var("QUIET_MODE").is_ok() {
        return;
    }
    println!("{}", "-----------------------------------------------------------------".dimmed());
    println!("{}", format!("  {} shell", ENGINE_NAME).cyan().bold());
    println!(
        "          Shell   v{:<8} Library   v{:<8}",
        SHELL_VERSION, LIB_VERSION
    );
    let license_blurb = "
    This software is provided 'as is', without warranty of any kind.
    Distributed under the MIT OR Apache-2.0 license. Use at your own risk.
    ";
    println!("{}", license_blurb.dimmed());
    println!("{}", "-----------------------------------------------------------------".dimmed());
}

fn print_help() {
    println!("Available commands:");
    println!("  step [N]                 - Advances the world by N steps (default 1).");
    println!("  reset                    - Resets the world clock to zero.");
    println!("  status                   - Shows sim time, plugins and light ranges.");
    println!("  send <RANGE>             - Publishes a range on every switch topic.");
    println!("  add light <NAME> [R]     - Adds a light to the scene.");
    println!("  remove light <NAME>      - Removes a light from the scene.");
    println!("  watch / unwatch          - Toggles printing of switch messages.");
    println!("  exit                     - Quits the shell.");
}

fn switch_topics(host: &SimulationHost) -> Vec<String> {
    let mut topics: Vec<String> = host
        .config()
        .models
        .iter()
        .chain(host.config().visuals.iter())
        .filter_map(|slot| slot.plugin.namespace().ok().map(lightswitcher_topic))
        .collect();
    topics.sort();
    topics.dedup();
    topics
}

/// Spawns tasks printing system events and, while `watching` is set, every
/// switch message.
fn spawn_event_listeners(host: &SimulationHost, watching: Arc<AtomicBool>) -> Result<()> {
    let mut system_rx = host.subscribe_system_events();
    tokio::spawn(async move {
        while let Ok(event) = system_rx.recv().await {
            println!("\n<-- [SYSTEM EVENT] {:?}\n>> ", event);
        }
    });

    for topic in switch_topics(host) {
        let mut rx = host.node().receiver::<msgs::Int>(&topic)?;
        let watching = watching.clone();
        let clock = host.clone();
        tokio::spawn(async move {
            while let Ok(msg) = rx.recv().await {
                if watching.load(Ordering::Relaxed) {
                    println!(
                        "<-- [{}] range={} at {}",
                        topic.cyan(),
                        msg.data,
                        clock.sim_time()
                    );
                }
            }
        });
    }
    Ok(())
}

fn print_status(host: &SimulationHost) {
    println!(
        "Sim time {} after {} step(s).",
        host.sim_time().to_string().cyan(),
        host.step_count()
    );
    println!("Plugins:");
    for (owner, plugin, status) in host.plugin_status() {
        println!("  {}/{}: {}", owner, plugin, status);
    }
    println!("Lights:");
    for light in host.scene().lights() {
        println!("  {}: range {}", light.name, light.range);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = match env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => LightSwitchConfig::load(&path)?,
        None => LightSwitchConfig::default(),
    };
    let host = SimulationHost::new(config);

    // Create the shared flag for the message listener.
    let watching = Arc::new(AtomicBool::new(true));
    spawn_event_listeners(&host, watching.clone())?;

    info!("Loading plugins into {}...", ENGINE_NAME.cyan());
    host.load_plugins();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let publishers: Vec<Publisher<msgs::Int>> = switch_topics(&host)
        .iter()
        .map(|topic| host.node().advertise::<msgs::Int>(topic))
        .collect::<Result<_, _>>()?;

    let mut rl = Editor::new()?;
    let helper = MyHighlighter {};
    rl.set_helper(Some(helper));

    println!(
        "{} world is paused. Type 'help' for commands or 'exit' to quit.",
        ENGINE_NAME.cyan()
    );

    loop {
        let prompt = format!("{}", ">> ".cyan().bold());
        let line = match rl.readline(&prompt) {
            Ok(line) => line,
            Err(_) => {
                println!("Exiting lightshell...");
                break;
            }
        };
        rl.add_history_entry(line.as_str())?;

        match parse_command(&line) {
            Ok(Command::Step(count)) => {
                for _ in 0..count {
                    host.step();
                }
                // Let subscribers catch up before the next prompt.
                tokio::time::sleep(Duration::from_millis(10)).await;
                println!("--> Now at {}.", host.sim_time());
            }
            Ok(Command::Reset) => {
                host.reset_time();
                println!("--> World clock reset.");
            }
            Ok(Command::Status) => print_status(&host),
            Ok(Command::Send(range)) => {
                for publisher in &publishers {
                    publisher.publish(msgs::Int::new(range));
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
                println!("--> Sent range {} on {} topic(s).", range, publishers.len());
            }
            Ok(Command::AddLight { name, range }) => match host.scene().add_light(&name, range) {
                Ok(_) => println!("--> Added light '{}'.", name),
                Err(err) => println!("Error: {}", err),
            },
            Ok(Command::RemoveLight(name)) => match host.scene().remove_light(&name) {
                Some(_) => println!("--> Removed light '{}'.", name),
                None => println!("Error: no light named '{}'.", name),
            },
            Ok(Command::Watch) => {
                watching.store(true, Ordering::Relaxed);
                println!("--> Printing switch messages.");
            }
            Ok(Command::Unwatch) => {
                watching.store(false, Ordering::Relaxed);
                println!("--> Stopped printing switch messages.");
            }
            Ok(Command::Help) => print_help(),
            Ok(Command::Exit) => break,
            Ok(Command::Empty) => {}
            Err(message) => println!("{}", message),
        }
    }

    host.unload_plugins();
    Ok(())
}
