use serenity::{
    all::ButtonStyle,
    builder::{CreateActionRow, CreateButton},
};

/// IDs personalizados para los botones del panel
pub mod button_ids {
    pub const SHUFFLE: &str = "shuffle";
    pub const SKIP: &str = "skip";
    pub const CLEAR: &str = "clear";
}

/// Fila de controles del panel: mezclar, saltar y limpiar
pub fn create_control_buttons() -> Vec<CreateActionRow> {
    let shuffle_btn = CreateButton::new(button_ids::SHUFFLE)
        .label("Shuffle")
        .emoji('🔀')
        .style(ButtonStyle::Primary);

    let skip_btn = CreateButton::new(button_ids::SKIP)
        .label("Skip")
        .emoji('⏭')
        .style(ButtonStyle::Success);

    let clear_btn = CreateButton::new(button_ids::CLEAR)
        .label("Clear")
        .emoji('🗑')
        .style(ButtonStyle::Danger);

    vec![CreateActionRow::Buttons(vec![shuffle_btn, skip_btn, clear_btn])]
}
