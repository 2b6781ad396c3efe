use anyhow::Result;
use serenity::{
    all::Context,
    builder::{CreateCommand, CreateCommandOption},
    model::{application::Command, application::CommandOptionType, id::GuildId},
};
use tracing::info;

/// Registra los comandos slash globalmente (tarda hasta una hora en
/// propagarse por Discord).
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    let commands = all_commands();
    let registered = Command::set_global_commands(&ctx.http, commands).await?;
    info!("✅ {} comandos globales registrados", registered.len());
    Ok(())
}

/// Registra los comandos en una guild concreta; la propagación es
/// inmediata, útil en desarrollo.
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    let commands = all_commands();
    let registered = guild_id.set_commands(&ctx.http, commands).await?;
    info!(
        "✅ {} comandos registrados en guild {}",
        registered.len(),
        guild_id
    );
    Ok(())
}

fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        pause_command(),
        resume_command(),
        skip_command(),
        previous_command(),
        stop_command(),
        queue_command(),
        nowplaying_command(),
        shuffle_command(),
        loop_command(),
        clear_command(),
        remove_command(),
        autoplaylist_command(),
        volume_command(),
        join_command(),
        leave_command(),
        help_command(),
    ]
}

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce un video de Bilibili o busca por palabras clave")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "URL de Bilibili (BV..., b23.tv) o términos de búsqueda",
            )
            .required(true),
        )
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pausa la reproducción actual")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Reanuda la reproducción pausada")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Salta a la siguiente canción")
}

fn previous_command() -> CreateCommand {
    CreateCommand::new("previous").description("Vuelve a la canción anterior")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Detiene la reproducción y vacía la cola")
}

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue")
        .description("Muestra la cola de reproducción")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "page", "Número de página")
                .min_int_value(1)
                .required(false),
        )
}

fn nowplaying_command() -> CreateCommand {
    CreateCommand::new("nowplaying").description("Muestra la canción actual con controles")
}

fn shuffle_command() -> CreateCommand {
    CreateCommand::new("shuffle").description("Baraja la cola manteniendo la canción actual")
}

fn loop_command() -> CreateCommand {
    CreateCommand::new("loop")
        .description("Cambia el modo de repetición")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "mode", "Modo de repetición")
                .required(true)
                .add_string_choice("Desactivado", "off")
                .add_string_choice("Canción actual", "track")
                .add_string_choice("Cola completa", "queue"),
        )
}

fn clear_command() -> CreateCommand {
    CreateCommand::new("clear").description("Vacía la cola conservando la canción actual")
}

fn remove_command() -> CreateCommand {
    CreateCommand::new("remove")
        .description("Quita una canción de la cola")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Integer,
                "position",
                "Posición en la cola (como aparece en /queue)",
            )
            .min_int_value(1)
            .required(true),
        )
}

fn autoplaylist_command() -> CreateCommand {
    CreateCommand::new("autoplaylist")
        .description("Llena la cola con resultados de búsqueda de calidad")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "keyword", "Tema o artista")
                .required(true),
        )
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Integer,
                "count",
                "Cuántas canciones añadir (por defecto 5)",
            )
            .min_int_value(1)
            .max_int_value(20)
            .required(false),
        )
}

fn volume_command() -> CreateCommand {
    CreateCommand::new("volume")
        .description("Ajusta el volumen de reproducción")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "level", "Volumen (0-200)")
                .min_int_value(0)
                .max_int_value(200)
                .required(true),
        )
}

fn join_command() -> CreateCommand {
    CreateCommand::new("join").description("Une el bot a tu canal de voz")
}

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("Saca el bot del canal de voz")
}

fn help_command() -> CreateCommand {
    CreateCommand::new("help").description("Muestra la ayuda del bot")
}
