use std::net::Ipv4Addr;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::tracker::{format_reset_time, Clock, QuotaError, QuotaManager};

use super::command::{Command, CommandError};
use super::registry::AccessRegistry;

const RETRY_LATER: &str = "Please try again later.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    /// The privileged identity; no quota was checked or spent.
    Owner,
    Granted { remaining: u32 },
}

/// Gatekeeper between inbound commands and the quota manager.
pub struct AccessController {
    quota: Arc<QuotaManager>,
    registry: AccessRegistry,
    clock: Arc<dyn Clock>,
    owner_id: Option<String>,
}

impl AccessController {
    pub fn new(
        quota: Arc<QuotaManager>,
        registry: AccessRegistry,
        clock: Arc<dyn Clock>,
        owner_id: Option<String>,
    ) -> Self {
        Self {
            quota,
            registry,
            clock,
            owner_id,
        }
    }

    pub fn is_owner(&self, identity: &str) -> bool {
        self.owner_id.as_deref() == Some(identity)
    }

    /// Reports whether `identity` could spend a unit right now, without
    /// spending it.
    pub async fn check(&self, identity: &str) -> Result<Authorization, QuotaError> {
        if self.is_owner(identity) {
            return Ok(Authorization::Owner);
        }
        let status = self.quota.get_status(identity).await?;
        if status.is_exhausted() {
            return Err(QuotaError::Exhausted {
                identity: identity.to_string(),
                next_reset: status.next_reset,
            });
        }
        Ok(Authorization::Granted {
            remaining: status.remaining,
        })
    }

    /// Spends one unit of quota unless `identity` is the owner.
    pub async fn authorize(&self, identity: &str) -> Result<Authorization, QuotaError> {
        if self.is_owner(identity) {
            return Ok(Authorization::Owner);
        }
        let remaining = self.quota.try_consume(identity).await?;
        Ok(Authorization::Granted { remaining })
    }

    /// Runs one chat command for `identity` and returns the reply text.
    pub async fn handle(&self, identity: &str, text: &str) -> String {
        let command = match Command::parse(text) {
            Ok(command) => command,
            Err(err) => return command_error_reply(&err),
        };
        debug!(identity, ?command, "handling command");

        match command {
            Command::Start => {
                "Welcome to the access registry bot!\n\nUse /help to see the available commands."
                    .to_string()
            }
            Command::Help => self.help(identity),
            Command::Add { name, ip } => self.add(identity, &name, ip).await,
            Command::List => self.list(identity).await,
            Command::Quota => self.quota(identity).await,
            Command::Remove { ip } => self.remove(identity, ip).await,
        }
    }

    fn help(&self, identity: &str) -> String {
        let mut help = String::from(
            "Available commands:\n\
             /add name|IP - register a new IP\n\
             /list - show the IPs you registered\n\
             /quota - show your remaining quota",
        );
        if self.is_owner(identity) {
            help.push_str("\n\nOwner commands:\n/remove IP - delete an IP");
        }
        help
    }

    /// Checks quota, writes the entry, then spends the unit, so a failed
    /// registry write costs nothing.
    ///
    /// Another request for the same identity can spend the last unit between
    /// the check and the spend. The spend stays authoritative: when it fails
    /// the fresh entry is withdrawn again.
    async fn add(&self, identity: &str, name: &str, ip: Ipv4Addr) -> String {
        if let Err(err) = self.check(identity).await {
            return quota_error_reply(&err);
        }

        let entry = match self
            .registry
            .add(identity, name, ip, self.clock.now())
            .await
        {
            Ok(entry) => entry,
            Err(err) => {
                warn!(identity, %ip, error = %err, "registry write failed, no quota spent");
                return format!("Could not add IP {ip}. {RETRY_LATER}");
            }
        };

        match self.authorize(identity).await {
            Ok(Authorization::Owner) => format!("IP {ip} added (owner)."),
            Ok(Authorization::Granted { remaining }) => {
                format!("IP {ip} added. Remaining quota: {remaining}")
            }
            Err(err) => {
                if let Err(withdraw) = self.registry.remove(&entry.id).await {
                    warn!(
                        identity,
                        %ip,
                        record_id = %entry.id,
                        error = %withdraw,
                        "could not withdraw entry after quota was refused"
                    );
                }
                quota_error_reply(&err)
            }
        }
    }

    async fn list(&self, identity: &str) -> String {
        match self.registry.list_for(identity).await {
            Ok(entries) if entries.is_empty() => "You have not added any IP yet.".to_string(),
            Ok(entries) => {
                let lines: Vec<String> = entries
                    .iter()
                    .map(|entry| format!("- {}: {}", entry.name, entry.ip))
                    .collect();
                format!("Your IPs:\n{}", lines.join("\n"))
            }
            Err(err) => {
                warn!(identity, error = %err, "failed to list access entries");
                format!("Could not load your IPs. {RETRY_LATER}")
            }
        }
    }

    async fn quota(&self, identity: &str) -> String {
        if self.is_owner(identity) {
            return "You are the owner; no quota applies.".to_string();
        }
        match self.quota.get_status(identity).await {
            Ok(status) => format!(
                "Your quota:\n- Remaining: {}\n- Total added: {}\n- Next reset: {}",
                status.remaining,
                status.total_consumed,
                format_reset_time(status.next_reset)
            ),
            Err(err) => quota_error_reply(&err),
        }
    }

    async fn remove(&self, identity: &str, ip: Ipv4Addr) -> String {
        if !self.is_owner(identity) {
            return "Only the owner can use this command.".to_string();
        }
        match self.registry.remove_ip(ip).await {
            Ok(0) => format!("IP {ip} not found."),
            Ok(_) => format!("IP {ip} removed."),
            Err(err) => {
                warn!(%ip, error = %err, "failed to remove access entries");
                format!("Could not remove IP {ip}. {RETRY_LATER}")
            }
        }
    }
}

pub fn quota_error_reply(err: &QuotaError) -> String {
    match err {
        QuotaError::Exhausted { next_reset, .. } => format!(
            "Your quota is used up. It resets on {}.",
            format_reset_time(*next_reset)
        ),
        QuotaError::StoreUnavailable(_) => format!("Something went wrong. {RETRY_LATER}"),
        QuotaError::InvalidIdentity(_) => "Could not identify you.".to_string(),
    }
}

fn command_error_reply(err: &CommandError) -> String {
    match err {
        CommandError::NotACommand | CommandError::Unknown(_) => {
            "Unknown command. Use /help to see the available commands.".to_string()
        }
        CommandError::Usage(usage) => format!("Invalid format. Use: {usage}"),
        CommandError::InvalidIp(_) => "Invalid IP address.".to_string(),
    }
}
