use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::audio::queue::{QueueItem, Requester};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Panel Music";

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(item: &QueueItem) -> CreateEmbed {
    let duration = item
        .duration
        .map(format_duration)
        .unwrap_or_else(|| "🔴 Live".to_string());

    CreateEmbed::default()
        .title("🎵 Now Playing")
        .description(format!("**{}**", item.title))
        .url(&item.url)
        .color(colors::MUSIC_PURPLE)
        .field("⏱️ Duration", duration, true)
        .field("👤 Requested by", requester_label(&item.metadata.requester), true)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para un track agregado a la cola
pub fn create_track_added_embed(item: &QueueItem, position: usize) -> CreateEmbed {
    CreateEmbed::default()
        .title("➕ Added to queue")
        .description(format!("**{}**", item.title))
        .url(&item.url)
        .color(colors::SUCCESS_GREEN)
        .field("📍 Position", position.to_string(), true)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn requester_label(requester: &Requester) -> String {
    match requester {
        Requester::Autoplay => "autoplay".to_string(),
        Requester::User { id, .. } => format!("<@{}>", id),
    }
}

/// Formatea la duración en formato legible
pub fn format_duration(duration: Duration) -> String {
    // Sin milisegundos: "3m 5s" en vez de "3m 5s 120ms"
    humantime::format_duration(Duration::from_secs(duration.as_secs())).to_string()
}
