use serenity::model::id::GuildId;
use tracing::warn;

/// Servidor de Discord Bots, donde los clones no deben listarse
pub const BOT_LIST_GUILD: GuildId = GuildId::new(110373943822540800);

/// `true` si el bot está en el servidor de listados sin permiso para ello.
pub fn listing_violation(guilds: &[GuildId], allow_bot_listing: bool) -> bool {
    !allow_bot_listing && guilds.contains(&BOT_LIST_GUILD)
}

pub fn check(guilds: &[GuildId], allow_bot_listing: bool) {
    if listing_violation(guilds, allow_bot_listing) {
        warn!(
            "⚠️ Este bot está en el servidor {} de listados de bots. No listes clones de este bot ahí.",
            BOT_LIST_GUILD
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_violation() {
        let guilds = [GuildId::new(1), BOT_LIST_GUILD];
        assert!(listing_violation(&guilds, false));
        assert!(!listing_violation(&guilds, true));
        assert!(!listing_violation(&[GuildId::new(1)], false));
    }
}
