//! Resolves user-supplied tokens to linked accounts

use crate::services::link_store::LinkStore;
use crate::types::{ChatId, Link};

/// Maps a nickname or raw account id to the links it selects
pub struct AliasResolver;

impl AliasResolver {
    /// Resolve `token` against a chat's links.
    ///
    /// No token (or a blank one) selects every link. Otherwise nicknames are
    /// matched case-insensitively first, returning every match in insertion
    /// order; failing that, the token is compared exactly against account ids.
    pub fn resolve(links: &[Link], token: Option<&str>) -> Vec<Link> {
        let token = match token.map(str::trim) {
            Some(t) if !t.is_empty() => t,
            _ => return links.to_vec(),
        };

        let wanted = token.to_lowercase();
        let by_nickname: Vec<Link> = links
            .iter()
            .filter(|link| {
                link.nickname
                    .as_deref()
                    .map(|nick| nick.trim().to_lowercase() == wanted)
                    .unwrap_or(false)
            })
            .cloned()
            .collect();

        if !by_nickname.is_empty() {
            return by_nickname;
        }

        links
            .iter()
            .filter(|link| link.account_id == token)
            .cloned()
            .collect()
    }

    pub fn resolve_for_chat(store: &LinkStore, chat_id: ChatId, token: Option<&str>) -> Vec<Link> {
        Self::resolve(&store.get(chat_id), token)
    }
}
