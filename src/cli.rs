//! Interactive console for driving the gateway without deck hardware
//!
//! A small REPL that places simulated controls, presses them, turns dials
//! and edits their settings. Every placed control renders through
//! [`ConsoleControl`], so the full action pipeline runs against the log.

use crate::actions::ActionKind;
use crate::router::Router;
use crate::surface::{ConsoleControl, SurfaceEvent};
use anyhow::{anyhow, bail, Result};
use colored::*;
use rustyline::DefaultEditor;
use serde_json::json;
use std::sync::Arc;

/// Print the supported action kinds
pub fn list_actions_formatted() {
    println!("\n{}", "Supported action kinds:".bold());
    for kind in ActionKind::ALL {
        println!("  {}", kind.as_str().yellow());
    }
    println!();
}

pub async fn run_repl(router: Arc<Router>) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    println!(
        "{}",
        "CamDeck GW console — type 'help' for commands, 'quit' to exit".bold()
    );

    loop {
        let readline = rl.readline("camdeck> ");
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                if line == "quit" || line == "exit" {
                    break;
                }

                if let Err(e) = handle_command(&router, line).await {
                    println!("{} {}", "error:".red(), e);
                }
            }
            Err(_) => break,
        }
    }

    Ok(())
}

async fn handle_command(router: &Arc<Router>, line: &str) -> Result<()> {
    let mut parts = line.split_whitespace();
    let command = parts.next().unwrap_or_default();
    let args: Vec<&str> = parts.collect();

    match command {
        "help" => print_help(),
        "kinds" => list_actions_formatted(),
        "place" => {
            let kind_name = args.first().ok_or_else(|| anyhow!("usage: place <kind> <id> [dial]"))?;
            let id = args.get(1).ok_or_else(|| anyhow!("usage: place <kind> <id> [dial]"))?;
            let kind = ActionKind::parse(kind_name)
                .ok_or_else(|| anyhow!("unknown kind '{}' (see 'kinds')", kind_name))?;
            let is_key = args.get(2).map(|a| *a != "dial").unwrap_or(true);

            router
                .on_appear(kind, Arc::new(ConsoleControl::new(*id, is_key)))
                .await;
            println!("placed {} as {}", id.green(), kind_name.yellow());
        }
        "remove" => {
            let id = args.first().ok_or_else(|| anyhow!("usage: remove <id>"))?;
            router.on_disappear(id).await;
        }
        "press" => {
            let id = args.first().ok_or_else(|| anyhow!("usage: press <id>"))?;
            router.dispatch(id, SurfaceEvent::KeyDown).await;
        }
        "rotate" => {
            let id = args.first().ok_or_else(|| anyhow!("usage: rotate <id> <ticks>"))?;
            let ticks: i32 = args
                .get(1)
                .ok_or_else(|| anyhow!("usage: rotate <id> <ticks>"))?
                .parse()?;
            router.dispatch(id, SurfaceEvent::DialRotate { ticks }).await;
        }
        "dialpress" => {
            let id = args.first().ok_or_else(|| anyhow!("usage: dialpress <id>"))?;
            router.dispatch(id, SurfaceEvent::DialDown).await;
            router.dispatch(id, SurfaceEvent::DialUp).await;
        }
        "set" => {
            let id = args.first().ok_or_else(|| anyhow!("usage: set <id> key=value ..."))?;
            apply_settings(router, id, &args[1..]).await?;
            router.dispatch(id, SurfaceEvent::SettingsChanged).await;
        }
        "test" => {
            let id = args.first().ok_or_else(|| anyhow!("usage: test <id> [host] [port]"))?;
            let mut payload = json!({ "action": "testConnection", "success": true });
            if let Some(host) = args.get(1) {
                payload["host"] = json!(host);
            }
            if let Some(port) = args.get(2) {
                payload["port"] = json!(port.parse::<u16>()?);
            }
            router
                .dispatch(id, SurfaceEvent::InspectorMessage { payload })
                .await;
        }
        "list" => {
            let listing = router.list_instances().await;
            if listing.is_empty() {
                println!("no controls placed");
            }
            for (context, kind) in listing {
                println!("  {}  {}", context.green(), kind.as_str().yellow());
            }
        }
        other => bail!("unknown command '{}' (see 'help')", other),
    }

    Ok(())
}

async fn apply_settings(router: &Arc<Router>, id: &str, pairs: &[&str]) -> Result<()> {
    if pairs.is_empty() {
        bail!("usage: set <id> key=value ...");
    }

    let handle = router.settings().handle_for(id);
    let mut settings = handle.load().await;

    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("expected key=value, got '{}'", pair))?;
        match key {
            "host" => settings.host = Some(value.to_string()),
            "port" => settings.port = value.parse()?,
            "sensitivity" => settings.sensitivity = Some(value.parse()?),
            "polling_interval" => settings.polling_interval = Some(value.parse()?),
            "check_interval" => settings.check_interval = Some(value.parse()?),
            "warning_level" => settings.warning_level = Some(value.parse()?),
            "critical_level" => settings.critical_level = Some(value.parse()?),
            "show_percentage" => settings.show_percentage = Some(value.parse()?),
            "title" => settings.title = Some(value.to_string()),
            "target_mode" => settings.target_mode = Some(value.parse()?),
            "manual_value" => settings.manual_value = Some(value.parse()?),
            other => bail!("unknown setting '{}'", other),
        }
    }

    handle.save(settings).await;
    println!("settings updated for {}", id.green());
    Ok(())
}

fn print_help() {
    println!("\n{}", "Commands:".bold());
    println!("  {}  place a control", "place <kind> <id> [dial]".yellow());
    println!("  {}               remove a control", "remove <id>".yellow());
    println!("  {}                press a key control", "press <id>".yellow());
    println!("  {}        turn a dial control", "rotate <id> <ticks>".yellow());
    println!("  {}            press a dial control", "dialpress <id>".yellow());
    println!("  {}     update persisted settings", "set <id> key=value ...".yellow());
    println!("  {}   settings-UI test connection", "test <id> [host] [port]".yellow());
    println!("  {}                      list placed controls", "list".yellow());
    println!("  {}                     list action kinds", "kinds".yellow());
    println!("  {}                      exit", "quit".yellow());
    println!();
}
