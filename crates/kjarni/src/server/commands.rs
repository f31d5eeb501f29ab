//! Moderation and messaging commands run against the [`Server`].

use super::{Outgoing, Server};
use crate::command::{Command, CommandRegistry};
use crate::error::Result;

const NOT_ONLINE: &str = "Player is not online or does not exist";

/// Register `kick`, `ban`, `unban`, `log`, `msg`, `reply`, `stop`,
/// `restart`, and `save`.
pub fn register_server_commands(commands: &mut CommandRegistry<Server>) -> Result<()> {
    commands.add_command(Command::new("kick", 3, |_, server: &mut Server, args| {
        let (player, reason) = split_player(args);
        let Some(id) = server.client_by_name(player).map(|c| c.id) else {
            return Some(NOT_ONLINE.to_string());
        };
        server.kick(id, &reason);
        log::info!("{} kicked {player}. Reason: {reason}", server.caller_name());
        Some(format!("Kicked {player}"))
    }))?;

    commands.add_command(Command::new("ban", 4, |_, server: &mut Server, args| {
        let (player, reason) = split_player(args);
        let Some(id) = server.client_by_name(player).map(|c| c.id) else {
            return Some(NOT_ONLINE.to_string());
        };
        server.ban(id, &reason);
        log::info!("{} banned {player}. Reason: {reason}", server.caller_name());
        Some(format!("Banned {player}"))
    }))?;

    commands.add_command(Command::new("unban", 4, |_, server: &mut Server, args| {
        let (player, reason) = split_player(args);
        match server.accounts().by_username(player) {
            Ok(Some(account)) => {
                server.access_mut().blacklist.remove(&account.id);
                log::info!("{} unbanned {player}. Reason: {reason}", server.caller_name());
                Some(format!("Unbanned {player}"))
            }
            Ok(None) => Some(NOT_ONLINE.to_string()),
            Err(err) => {
                log::warn!("Account lookup for {player} failed: {err}");
                Some(NOT_ONLINE.to_string())
            }
        }
    }))?;

    commands.add_command(Command::new("log", 1, |_, server: &mut Server, args| {
        log::info!("{} logged {}", server.caller_name(), args.join(" "));
        None
    }))?;

    commands.add_command(Command::new("msg", 0, |_, server: &mut Server, args| {
        let (player, message) = split_player(args);
        let Some(target) = server.client_by_name(player).map(|c| c.id) else {
            return Some("That user is not online".to_string());
        };
        let sender = server.caller_name().to_string();
        server.send(target, Outgoing::Chat(format!("[{sender} -> me] {message}")));
        log::info!("[{sender} -> {player}] {message}");
        if let Some(client) = server.client_mut(target) {
            client.last_messager = Some(sender);
        }
        Some(format!("[me -> {player}] {message}"))
    }))?;

    commands.add_command(Command::new("reply", 0, |commands, server: &mut Server, args| {
        let last = server
            .caller()
            .and_then(|id| server.client(id))
            .and_then(|c| c.last_messager.clone());
        let Some(last) = last else {
            return Some("No one messaged you yet =(".to_string());
        };
        let mut msg_args = vec![last.as_str()];
        msg_args.extend_from_slice(args);
        commands.invoke("msg", server, &msg_args)
    }))?;

    commands.add_command(Command::new("stop", 4, |_, server: &mut Server, _| {
        server.stop();
        None
    }))?;

    commands.add_command(Command::new("restart", 4, |_, server: &mut Server, _| {
        server.restart();
        None
    }))?;

    commands.add_command(Command::new("save", 4, |_, server: &mut Server, _| {
        match server.save() {
            Ok(()) => Some("Saved the current level".to_string()),
            Err(err) => {
                log::error!("Failed to save level: {err}");
                Some(format!("Failed to save level: {err}"))
            }
        }
    }))
}

/// First argument as the player name, the rest joined as free text.
fn split_player<'a>(args: &[&'a str]) -> (&'a str, String) {
    match args.split_first() {
        Some((player, rest)) => (*player, rest.join(" ")),
        None => ("", String::new()),
    }
}
