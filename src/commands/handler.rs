//! Executes parsed commands against the link store and dispatcher

use std::sync::Arc;
use tracing::{debug, error, info};

use super::{Command, LinkRequest, UnlinkTarget};
use crate::services::alias::AliasResolver;
use crate::services::dispatcher::ReportDispatcher;
use crate::types::{ChatId, Link, RevtrackError, WindowLabel};

/// Turns chat commands into reply text
pub struct CommandHandler {
    dispatcher: Arc<ReportDispatcher>,
}

impl CommandHandler {
    pub fn new(dispatcher: Arc<ReportDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Reply for a raw message, `None` when the message is not a command
    pub async fn handle_text(&self, chat_id: ChatId, text: &str) -> Option<String> {
        let command = Command::parse(text)?;
        Some(self.handle(chat_id, command).await)
    }

    pub async fn handle(&self, chat_id: ChatId, command: Command) -> String {
        debug!(chat_id, ?command, "handling command");
        let fmt = self.dispatcher.formatter();

        match command {
            Command::Start | Command::Help => fmt.help(),
            Command::Link(args) => self.link(chat_id, &args),
            Command::Unlink(args) => self.unlink(chat_id, &args),
            Command::Report { label, token } => self.report(chat_id, token.as_deref(), label).await,
            Command::Stats => self.report(chat_id, None, WindowLabel::Today).await,
            Command::Models => fmt.models(&self.dispatcher.store().get(chat_id)),
        }
    }

    fn link(&self, chat_id: ChatId, args: &[String]) -> String {
        let fmt = self.dispatcher.formatter();
        let request = match LinkRequest::from_args(args) {
            Ok(request) => request,
            Err(e) => {
                debug!(chat_id, error = %e, "rejected link command");
                return fmt.link_usage(&usage_detail(&e));
            }
        };

        let mut link = Link::new(chat_id, request.platform, request.account_id).with_role(request.role);
        link.nickname = request.nickname;

        let store = self.dispatcher.store();
        match store.put(link.clone()) {
            Ok(change) => {
                info!(
                    chat_id,
                    platform = %link.platform,
                    account_id = %link.account_id,
                    ?change,
                    "linked account"
                );
                fmt.link_reply(&link, change, &store.get(chat_id))
            }
            Err(e) => self.persistence_error(chat_id, e),
        }
    }

    fn unlink(&self, chat_id: ChatId, args: &[String]) -> String {
        let fmt = self.dispatcher.formatter();
        let store = self.dispatcher.store();
        let linked = store.get(chat_id);
        if linked.is_empty() {
            return fmt.not_linked();
        }

        let target = match UnlinkTarget::from_args(args) {
            Ok(target) => target,
            Err(e) => {
                debug!(chat_id, error = %e, "rejected unlink command");
                return fmt.unlink_usage(&linked);
            }
        };

        let removed = match &target {
            UnlinkTarget::All => store.remove(chat_id, None, None),
            UnlinkTarget::Account {
                platform,
                account_id,
            } => store.remove(chat_id, Some(*platform), Some(account_id.as_str())),
            UnlinkTarget::Token(token) => {
                let matches = AliasResolver::resolve(&linked, Some(token));
                store.remove_links(chat_id, &matches)
            }
        };

        match removed {
            Ok(removed) if removed.is_empty() => {
                let token = match target {
                    UnlinkTarget::Account {
                        platform,
                        account_id,
                    } => format!("{} {}", platform, account_id),
                    UnlinkTarget::Token(token) => token,
                    UnlinkTarget::All => String::from("all"),
                };
                debug!(chat_id, token = %token, "unlink matched nothing");
                fmt.token_not_found(&token, &linked)
            }
            Ok(removed) => {
                info!(chat_id, removed = removed.len(), "unlinked accounts");
                fmt.unlink_reply(&removed, &store.get(chat_id))
            }
            Err(e) => self.persistence_error(chat_id, e),
        }
    }

    async fn report(&self, chat_id: ChatId, token: Option<&str>, label: WindowLabel) -> String {
        let fmt = self.dispatcher.formatter();
        match self.dispatcher.build_report(chat_id, token, label).await {
            Ok(text) => text,
            Err(RevtrackError::NotLinked) => {
                debug!(chat_id, "report requested by unlinked chat");
                fmt.not_linked()
            }
            Err(RevtrackError::TokenNotFound(token)) => {
                debug!(chat_id, token = %token, "report token not found");
                fmt.token_not_found(&token, &self.dispatcher.store().get(chat_id))
            }
            Err(e) => {
                error!(chat_id, error = %e, "failed to build report");
                fmt.report_failure()
            }
        }
    }

    fn persistence_error(&self, chat_id: ChatId, e: RevtrackError) -> String {
        error!(chat_id, error = %e, "failed to persist link change");
        self.dispatcher.formatter().persistence_failure()
    }
}

/// Message text of a user-facing error without the error-kind prefix
fn usage_detail(e: &RevtrackError) -> String {
    match e {
        RevtrackError::InvalidArguments(msg) => msg.clone(),
        other => other.to_string(),
    }
}
