use anyhow::Result;
use serenity::{
    builder::{
        CreateCommand, CreateCommandOption, CreateInteractionResponse,
        CreateInteractionResponseMessage, EditInteractionResponse,
    },
    http::Http,
    model::{
        application::{CommandInteraction, CommandOptionType},
        channel::ChannelType,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{info, warn};

use crate::{
    audio::{queue::RequestMetadata, DefaultPlayback},
    bot::events::Router,
    ui::embeds,
};

/// Registra los comandos; por guild si hay servidor de desarrollo
pub async fn register(http: &Http, dev_guild: Option<GuildId>) -> Result<()> {
    info!("📝 Registrando comandos slash...");

    match dev_guild {
        Some(guild_id) => {
            guild_id.set_commands(http, definitions()).await?;
            info!("✅ Comandos de guild registrados para: {}", guild_id);
        }
        None => {
            for command in definitions() {
                http.create_global_command(&command).await?;
            }
            info!("✅ Comandos globales registrados");
        }
    }

    Ok(())
}

fn definitions() -> Vec<CreateCommand> {
    vec![play_command(), setvc_command(), autoplaylist_command()]
}

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Play a song or add it to the queue")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "query", "URL or search terms")
                .required(true),
        )
}

fn setvc_command() -> CreateCommand {
    CreateCommand::new("setvc")
        .description("Set the voice channel the bot joins on startup")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Channel,
                "channel",
                "Voice channel; leave empty to clear",
            )
            .channel_types(vec![ChannelType::Voice, ChannelType::Stage])
            .required(false),
        )
}

fn autoplaylist_command() -> CreateCommand {
    CreateCommand::new("autoplaylist")
        .description("Set the playlist played on startup")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "name",
                "Playlist name; leave empty to clear",
            )
            .required(false),
        )
}

/// Maneja comandos slash
pub async fn handle_command(router: &Router, ctx: &Context, command: CommandInteraction) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        return reply(ctx, &command, "❌ This command only works in a server").await;
    };

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(router, ctx, &command, guild_id).await,
        "setvc" => handle_setvc(router, ctx, &command, guild_id).await,
        "autoplaylist" => handle_autoplaylist(router, ctx, &command, guild_id).await,
        _ => reply(ctx, &command, "❌ Unknown command").await,
    }
}

async fn handle_play(
    router: &Router,
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
) -> Result<()> {
    // Discord exige `query`, pero puede llegar sólo con espacios
    let Some(query) = string_option(command, "query").map(str::to_string) else {
        return reply(ctx, command, MISSING_QUERY).await;
    };

    // Resolver con yt-dlp puede tardar más que el límite de respuesta
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let response = match play(router, ctx, command, guild_id, &query).await {
        Ok(response) => response,
        Err(e) => {
            warn!("/play falló en guild {}: {:?}", guild_id, e);
            EditInteractionResponse::new().content(format!("❌ {}", e))
        }
    };
    command.edit_response(&ctx.http, response).await?;

    Ok(())
}

async fn play(
    router: &Router,
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    query: &str,
) -> Result<EditInteractionResponse> {
    let voice_channel_id = user_voice_channel(ctx, guild_id, command.user.id)?;

    let player = router.players.set_up_handler(guild_id);
    player.set_announce_channel(command.channel_id);

    let metadata = RequestMetadata::user(command.user.id, command.user.name.clone());
    let item = router.players.resolve(query, metadata).await?;
    let position = player.enqueue(item.clone()).await?;

    // Conectar después de encolar: al unirse arranca la cola si está ociosa
    if !router.players.is_connected(guild_id) {
        router.players.open_connection(guild_id, voice_channel_id).await?;
    }

    let status = format!("🎶 Queued **{}** (#{})", item.title, position);
    if let Err(e) = router.panel.publish(command.channel_id, &status).await {
        warn!("No se pudo publicar el panel en canal {}: {:?}", command.channel_id, e);
    }

    Ok(EditInteractionResponse::new().embed(embeds::create_track_added_embed(&item, position)))
}

async fn handle_setvc(
    router: &Router,
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
) -> Result<()> {
    let channel_id = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "channel")
        .and_then(|opt| opt.value.as_channel_id());

    router
        .storage
        .lock()
        .await
        .set_voice_channel(guild_id, channel_id)
        .await?;

    let text = match channel_id {
        Some(channel_id) => format!("✅ Default voice channel set to <#{}>", channel_id),
        None => "✅ Default voice channel cleared".to_string(),
    };
    reply(ctx, command, &text).await
}

async fn handle_autoplaylist(
    router: &Router,
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
) -> Result<()> {
    let name = string_option(command, "name").map(str::to_string);

    if let Some(name) = &name {
        if !router.playlists.exists(name).await {
            let available = router.playlists.names().await.unwrap_or_default();
            let text = if available.is_empty() {
                format!("❌ Playlist `{}` doesn't exist", name)
            } else {
                format!(
                    "❌ Playlist `{}` doesn't exist. Available: {}",
                    name,
                    available.join(", ")
                )
            };
            return reply(ctx, command, &text).await;
        }
    }

    router
        .storage
        .lock()
        .await
        .set_default_playlist(guild_id, name.clone())
        .await?;

    let text = match name {
        Some(name) => format!("✅ Default playlist set to `{}`", name),
        None => "✅ Default playlist cleared".to_string(),
    };
    reply(ctx, command, &text).await
}

const MISSING_QUERY: &str = "❌ Tell me what to play: a URL or some search terms";

fn string_option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    non_blank(
        command
            .data
            .options
            .iter()
            .find(|opt| opt.name == name)
            .and_then(|opt| opt.value.as_str()),
    )
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Result<ChannelId> {
    let guild = guild_id
        .to_guild_cached(&ctx.cache)
        .ok_or_else(|| anyhow::anyhow!("Guild no encontrada en caché"))?;

    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
        .ok_or_else(|| anyhow::anyhow!("You need to be in a voice channel"))
}

async fn reply(ctx: &Context, command: &CommandInteraction, text: &str) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(text)
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    fn serialized() -> Vec<Value> {
        definitions()
            .iter()
            .map(|command| serde_json::to_value(command).unwrap())
            .collect()
    }

    #[test]
    fn test_command_names() {
        let names: Vec<String> = serialized()
            .iter()
            .map(|command| command["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["play", "setvc", "autoplaylist"]);
    }

    #[test]
    fn test_blank_option_counts_as_missing() {
        assert_eq!(non_blank(None), None);
        assert_eq!(non_blank(Some("")), None);
        assert_eq!(non_blank(Some("   \t ")), None);
        assert_eq!(non_blank(Some("  lofi beats ")), Some("lofi beats"));
    }

    #[test]
    fn test_only_play_requires_an_option() {
        for command in serialized() {
            let required = command["options"][0]["required"].as_bool().unwrap_or(false);
            assert_eq!(required, command["name"] == "play", "{}", command["name"]);
        }
    }
}
