use anyhow::Result;
use serenity::{
    all::Context,
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::{CommandInteraction, ComponentInteraction},
        id::{ChannelId, GuildId, UserId},
    },
};
use tracing::{info, warn};

use crate::{
    audio::{GuildPlayer, LoopMode},
    bot::BiliMusicBot,
    error::MusicError,
    ui::{buttons, embeds},
};
use std::sync::Arc;

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &BiliMusicBot,
) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        respond_text(ctx, &command, "❌ Este comando solo funciona en servidores", true).await?;
        return Ok(());
    };

    info!(
        "📝 Comando /{} de {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, command, bot, guild_id).await?,
        "pause" => simple_op(ctx, command, bot, guild_id, Op::Pause).await?,
        "resume" => simple_op(ctx, command, bot, guild_id, Op::Resume).await?,
        "skip" => simple_op(ctx, command, bot, guild_id, Op::Skip).await?,
        "previous" => simple_op(ctx, command, bot, guild_id, Op::Previous).await?,
        "stop" => simple_op(ctx, command, bot, guild_id, Op::Stop).await?,
        "shuffle" => simple_op(ctx, command, bot, guild_id, Op::Shuffle).await?,
        "clear" => simple_op(ctx, command, bot, guild_id, Op::Clear).await?,
        "queue" => handle_queue(ctx, command, bot, guild_id).await?,
        "nowplaying" => handle_nowplaying(ctx, command, bot, guild_id).await?,
        "loop" => handle_loop(ctx, command, bot, guild_id).await?,
        "remove" => handle_remove(ctx, command, bot, guild_id).await?,
        "autoplaylist" => handle_autoplaylist(ctx, command, bot, guild_id).await?,
        "volume" => handle_volume(ctx, command, bot, guild_id).await?,
        "join" => handle_join(ctx, command, bot, guild_id).await?,
        "leave" => handle_leave(ctx, command, bot, guild_id).await?,
        "help" => handle_help(ctx, command).await?,
        _ => {
            respond_text(ctx, &command, "❌ Comando no reconocido", true).await?;
        }
    }

    Ok(())
}

/// Operaciones sin argumentos, agrupadas para no repetir el mismo esqueleto
/// de respuesta diecisiete veces.
enum Op {
    Pause,
    Resume,
    Skip,
    Previous,
    Stop,
    Shuffle,
    Clear,
}

async fn simple_op(
    ctx: &Context,
    command: CommandInteraction,
    bot: &BiliMusicBot,
    guild_id: GuildId,
    op: Op,
) -> Result<()> {
    let Some(player) = bot.manager.get(guild_id) else {
        respond_error(ctx, &command, &MusicError::NothingPlaying).await?;
        return Ok(());
    };

    let outcome: Result<String, MusicError> = match op {
        Op::Pause => player.pause().await.map(|_| "⏸️ Pausado".to_string()),
        Op::Resume => player.resume().await.map(|_| "▶️ Reanudado".to_string()),
        Op::Skip => player
            .next()
            .await
            .map(|t| format!("⏭️ Saltando a **{}**", t.title)),
        Op::Previous => player
            .previous()
            .await
            .map(|t| format!("⏮️ Volviendo a **{}**", t.title)),
        Op::Stop => player
            .stop()
            .await
            .map(|n| format!("⏹️ Detenido, {} canciones fuera de la cola", n)),
        Op::Shuffle => player
            .shuffle()
            .await
            .map(|n| format!("🔀 Cola barajada ({} canciones)", n)),
        Op::Clear => player
            .clear()
            .await
            .map(|n| format!("🗑️ Cola limpiada ({} canciones fuera)", n)),
    };

    match outcome {
        Ok(message) => respond_text(ctx, &command, &message, false).await?,
        Err(e) => respond_error(ctx, &command, &e).await?,
    }
    Ok(())
}

async fn handle_play(
    ctx: &Context,
    command: CommandInteraction,
    bot: &BiliMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(query) = option_str(&command, "query") else {
        respond_text(ctx, &command, "❌ Falta la consulta", true).await?;
        return Ok(());
    };
    let query = query.to_string();

    // La extracción puede tardar más que la ventana de 3s de Discord
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    if let Err(e) = ensure_connected(ctx, bot, guild_id, command.user.id).await {
        edit_with_error(ctx, &command, &e).await?;
        return Ok(());
    }

    match bot.manager.play(guild_id, command.user.id, &query).await {
        Ok(enqueued) => {
            let embed = embeds::create_queued_embed(&enqueued);
            command
                .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
                .await?;
        }
        Err(e) => edit_with_error(ctx, &command, &e).await?,
    }
    Ok(())
}

async fn handle_autoplaylist(
    ctx: &Context,
    command: CommandInteraction,
    bot: &BiliMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(keyword) = option_str(&command, "keyword") else {
        respond_text(ctx, &command, "❌ Falta la palabra clave", true).await?;
        return Ok(());
    };
    let keyword = keyword.to_string();
    let count = option_i64(&command, "count").unwrap_or(5).clamp(1, 20) as usize;

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    if let Err(e) = ensure_connected(ctx, bot, guild_id, command.user.id).await {
        edit_with_error(ctx, &command, &e).await?;
        return Ok(());
    }

    match bot
        .manager
        .autoplaylist(guild_id, command.user.id, &keyword, count)
        .await
    {
        Ok(tracks) => {
            let embed = embeds::create_autoplaylist_embed(&keyword, &tracks);
            command
                .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
                .await?;
        }
        Err(e) => edit_with_error(ctx, &command, &e).await?,
    }
    Ok(())
}

async fn handle_queue(
    ctx: &Context,
    command: CommandInteraction,
    bot: &BiliMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(player) = bot.manager.get(guild_id) else {
        respond_error(ctx, &command, &MusicError::EmptyQueue).await?;
        return Ok(());
    };

    let page = option_i64(&command, "page").unwrap_or(1).max(1) as usize - 1;
    let (tracks, current, total) = player.queue_view().await;
    let total_pages = tracks.len().div_ceil(embeds::QUEUE_PAGE_SIZE).max(1);
    let embed = embeds::create_queue_embed(&tracks, current, total, page);

    let mut message = CreateInteractionResponseMessage::new().embed(embed);
    if total_pages > 1 {
        message = message.components(vec![buttons::create_pagination_row(
            page.min(total_pages - 1),
            total_pages,
        )]);
    }
    command
        .create_response(&ctx.http, CreateInteractionResponse::Message(message))
        .await?;
    Ok(())
}

/// Responde con el panel de reproducción y lo registra para que el bus de
/// estado lo mantenga al día.
async fn handle_nowplaying(
    ctx: &Context,
    command: CommandInteraction,
    bot: &BiliMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(player) = bot.manager.get(guild_id) else {
        respond_error(ctx, &command, &MusicError::NothingPlaying).await?;
        return Ok(());
    };

    let state = player.state().await;
    let elapsed = player.elapsed().await;
    let embed = embeds::create_now_playing_embed(&state, elapsed);
    let rows = buttons::create_control_rows(&state);

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .components(rows),
            ),
        )
        .await?;

    let message = command.get_response(&ctx.http).await?;
    bot.panels
        .register(guild_id, message.channel_id, message.id, state.seq);
    Ok(())
}

async fn handle_loop(
    ctx: &Context,
    command: CommandInteraction,
    bot: &BiliMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(player) = bot.manager.get(guild_id) else {
        respond_error(ctx, &command, &MusicError::NothingPlaying).await?;
        return Ok(());
    };

    let mode = option_str(&command, "mode")
        .and_then(LoopMode::parse)
        .unwrap_or_default();
    player.set_loop_mode(mode).await;
    respond_with_embed(ctx, &command, embeds::create_loop_embed(mode), false).await?;
    Ok(())
}

async fn handle_remove(
    ctx: &Context,
    command: CommandInteraction,
    bot: &BiliMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(player) = bot.manager.get(guild_id) else {
        respond_error(ctx, &command, &MusicError::EmptyQueue).await?;
        return Ok(());
    };

    let Some(position) = option_i64(&command, "position") else {
        respond_text(ctx, &command, "❌ Falta la posición", true).await?;
        return Ok(());
    };
    let index = (position.max(1) as usize) - 1;

    match player.remove_at(index).await {
        Ok(removed) => {
            respond_text(
                ctx,
                &command,
                &format!("🗑️ **{}** fuera de la cola", removed.title),
                false,
            )
            .await?
        }
        Err(e) => respond_error(ctx, &command, &e).await?,
    }
    Ok(())
}

async fn handle_volume(
    ctx: &Context,
    command: CommandInteraction,
    bot: &BiliMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(player) = bot.manager.get(guild_id) else {
        respond_error(ctx, &command, &MusicError::NothingPlaying).await?;
        return Ok(());
    };

    let level = option_i64(&command, "level").unwrap_or(100).clamp(0, 200);
    match player.set_volume(level as f32 / 100.0).await {
        Ok(()) => respond_text(ctx, &command, &format!("🔊 Volumen al {}%", level), false).await?,
        Err(e) => respond_error(ctx, &command, &e).await?,
    }
    Ok(())
}

async fn handle_join(
    ctx: &Context,
    command: CommandInteraction,
    bot: &BiliMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    match ensure_connected(ctx, bot, guild_id, command.user.id).await {
        Ok(_) => respond_text(ctx, &command, "🔊 Conectado a tu canal de voz", false).await?,
        Err(e) => respond_error(ctx, &command, &e).await?,
    }
    Ok(())
}

async fn handle_leave(
    ctx: &Context,
    command: CommandInteraction,
    bot: &BiliMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    match bot.manager.leave(guild_id).await {
        Ok(()) => {
            bot.panels.forget(guild_id);
            respond_text(ctx, &command, "👋 Hasta luego", false).await?
        }
        Err(e) => respond_error(ctx, &command, &e).await?,
    }
    Ok(())
}

async fn handle_help(ctx: &Context, command: CommandInteraction) -> Result<()> {
    let embed = CreateEmbed::default()
        .title("🎵 Bili Music Bot")
        .description("Reproduce audio de Bilibili en canales de voz")
        .field(
            "Reproducción",
            "`/play` URL o búsqueda • `/pause` • `/resume` • `/skip` • `/previous` • `/stop`",
            false,
        )
        .field(
            "Cola",
            "`/queue` • `/remove` • `/clear` • `/shuffle` • `/loop` • `/autoplaylist`",
            false,
        )
        .field(
            "Otros",
            "`/nowplaying` panel con controles • `/volume` • `/join` • `/leave`",
            false,
        )
        .color(embeds::colors::INFO_BLUE);

    respond_with_embed(ctx, &command, embed, true).await?;
    Ok(())
}

/// Maneja clics en los botones del panel
pub async fn handle_component(
    ctx: &Context,
    component: ComponentInteraction,
    bot: &BiliMusicBot,
) -> Result<()> {
    let Some(guild_id) = component.guild_id else {
        return Ok(());
    };

    // Paginación de la cola: edita el propio mensaje del embed
    if let Some(page) = buttons::parse_queue_page(&component.data.custom_id) {
        if let Some(player) = bot.manager.get(guild_id) {
            let (tracks, current, total) = player.queue_view().await;
            let total_pages = tracks.len().div_ceil(embeds::QUEUE_PAGE_SIZE).max(1);
            let page = page.min(total_pages - 1);
            let embed = embeds::create_queue_embed(&tracks, current, total, page);
            component
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::UpdateMessage(
                        CreateInteractionResponseMessage::new()
                            .embed(embed)
                            .components(vec![buttons::create_pagination_row(page, total_pages)]),
                    ),
                )
                .await?;
        }
        return Ok(());
    }

    let Some(player) = bot.manager.get(guild_id) else {
        component
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Message(
                    CreateInteractionResponseMessage::new()
                        .content("❌ No hay nada reproduciéndose")
                        .ephemeral(true),
                ),
            )
            .await?;
        return Ok(());
    };

    use buttons::button_ids as ids;
    let outcome: Result<(), MusicError> = match component.data.custom_id.as_str() {
        ids::PLAY_PAUSE => {
            let state = player.state().await;
            if state.is_paused {
                player.resume().await
            } else {
                player.pause().await
            }
        }
        ids::SKIP => player.next().await.map(|_| ()),
        ids::PREVIOUS => player.previous().await.map(|_| ()),
        ids::STOP => player.stop().await.map(|_| ()),
        ids::SHUFFLE => player.shuffle().await.map(|_| ()),
        ids::LOOP_MODE => {
            let current = player.state().await.loop_mode;
            let next = match current {
                LoopMode::Off => LoopMode::Track,
                LoopMode::Track => LoopMode::Queue,
                LoopMode::Queue => LoopMode::Off,
            };
            player.set_loop_mode(next).await;
            Ok(())
        }
        ids::QUEUE => {
            let (tracks, current, total) = player.queue_view().await;
            let embed = embeds::create_queue_embed(&tracks, current, total, 0);
            component
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .embed(embed)
                            .ephemeral(true),
                    ),
                )
                .await?;
            return Ok(());
        }
        other => {
            warn!("⚠️ Botón no reconocido: {}", other);
            return Ok(());
        }
    };

    match outcome {
        Ok(()) => {
            // El bus de estado re-renderiza el panel; basta con confirmar
            component
                .create_response(&ctx.http, CreateInteractionResponse::Acknowledge)
                .await?;
        }
        Err(e) => {
            component
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .embed(embeds::create_error_embed(&e))
                            .ephemeral(true),
                    ),
                )
                .await?;
        }
    }
    Ok(())
}

/// Garantiza que el bot está en el canal de voz del usuario, uniéndose si
/// hace falta.
async fn ensure_connected(
    ctx: &Context,
    bot: &BiliMusicBot,
    guild_id: GuildId,
    user_id: UserId,
) -> Result<Arc<GuildPlayer>, MusicError> {
    if let Some(player) = bot.manager.get(guild_id) {
        return Ok(player);
    }
    let channel_id =
        user_voice_channel(ctx, guild_id, user_id).ok_or(MusicError::NotInVoiceChannel)?;
    bot.manager.join(guild_id, channel_id).await
}

/// Canal de voz donde está el usuario, según la caché del gateway
fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

fn option_str<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

fn option_i64(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
}

async fn respond_text(
    ctx: &Context,
    command: &CommandInteraction,
    content: &str,
    ephemeral: bool,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;
    Ok(())
}

async fn respond_with_embed(
    ctx: &Context,
    command: &CommandInteraction,
    embed: CreateEmbed,
    ephemeral: bool,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;
    Ok(())
}

async fn respond_error(
    ctx: &Context,
    command: &CommandInteraction,
    error: &MusicError,
) -> Result<()> {
    respond_with_embed(ctx, command, embeds::create_error_embed(error), true).await
}

async fn edit_with_error(
    ctx: &Context,
    command: &CommandInteraction,
    error: &MusicError,
) -> Result<()> {
    command
        .edit_response(
            &ctx.http,
            EditInteractionResponse::new().embed(embeds::create_error_embed(error)),
        )
        .await?;
    Ok(())
}
