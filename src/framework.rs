//! poise framework wiring: the admission check and the release hooks

use crate::commands::{BotCommand, CommandManager, register_commands};
use crate::config::BotConfig;
use crate::events::EventRegistry;
use crate::reply::{Alert, AlertStyle, REJECTION_TITLE, rejection_alert, send_alert};
use crate::{Context, Data, Error, GATE_TARGET, logging};
use poise::FrameworkError;
use poise::serenity_prelude::Permissions;
use std::time::Duration;
use tracing::{debug, info};

/// Name the command's policy is registered under
fn policy_name(ctx: Context<'_>) -> &str {
    ctx.parent_commands()
        .first()
        .map_or(&ctx.command().name, |root| &root.name)
}

/// Effective permissions of the author in the current guild
async fn author_permissions(ctx: Context<'_>) -> Permissions {
    let Some(member) = ctx.author_member().await else {
        return Permissions::empty();
    };
    if let Some(permissions) = member.permissions {
        return permissions;
    }
    let Some(guild) = ctx.guild() else {
        return Permissions::empty();
    };
    guild.member_permissions(&member)
}

/// Admission check run before every command
///
/// # Errors
/// Fails on invalid gate input or when the rejection alert cannot be sent.
pub async fn gate_check(ctx: Context<'_>) -> Result<bool, Error> {
    let data = ctx.data();
    if data.running.contains_key(&ctx.id()) {
        return Ok(true);
    }
    let policy = data.policies.resolve(policy_name(ctx));

    if ctx.guild_id().is_some() && !policy.required_permissions.is_empty() {
        let granted = author_permissions(ctx).await;
        if !policy.permits(granted) {
            info!(
                target: GATE_TARGET,
                command = %policy.name,
                user_id = %ctx.author().id,
                required = ?policy.required_permissions,
                "Missing permissions"
            );
            let alert = Alert::new(
                REJECTION_TITLE,
                format!(
                    "You need the {} permission(s) to run **/{}**.",
                    policy.required_permissions, policy.name
                ),
            );
            send_alert(ctx, &alert, AlertStyle::Red).await?;
            return Ok(false);
        }
    }

    let rejection = data.admit_context(ctx.id(), ctx.author().id.get(), &policy)?;
    if let Some(rejection) = rejection {
        logging::log_admission(ctx, &rejection);
        send_alert(ctx, &rejection_alert(&policy.name, &rejection), AlertStyle::Red).await?;
        return Ok(false);
    }
    Ok(true)
}

/// Release whatever the failed invocation still holds, then log the error
pub async fn on_error(error: FrameworkError<'_, Data, Error>) {
    if let Some(ctx) = error.ctx() {
        if ctx.data().release(ctx.id()) {
            debug!(target: GATE_TARGET, invocation_id = ctx.id(), "Released after error");
        }
    }
    logging::log_command_error(&error);
}

/// Framework options with the gate hooks installed
#[must_use]
pub fn options(commands: Vec<BotCommand>) -> poise::FrameworkOptions<Data, Error> {
    poise::FrameworkOptions {
        commands,
        command_check: Some(|ctx| Box::pin(gate_check(ctx))),
        pre_command: |ctx| Box::pin(logging::log_command_start(ctx)),
        post_command: |ctx| {
            Box::pin(async move {
                ctx.data().release(ctx.id());
                logging::log_command_end(ctx).await;
            })
        },
        on_error: |error| Box::pin(on_error(error)),
        event_handler: |ctx, event, _framework, data| {
            Box::pin(async move { data.events.dispatch(ctx, event, data).await })
        },
        ..Default::default()
    }
}

/// Build the framework around the given commands and event bindings
#[must_use]
pub fn build(
    manager: CommandManager,
    events: EventRegistry,
    config: BotConfig,
) -> poise::Framework<Data, Error> {
    let plan = manager
        .should_register()
        .then(|| manager.plan_registration());
    let (commands, policies) = manager.into_parts();
    let data = Data::new(config, policies, events);

    poise::Framework::builder()
        .options(options(commands))
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                if let Some(plan) = plan {
                    logging::log_console("Registering commands");
                    register_commands(&ctx.http, &framework.options().commands, &plan).await?;
                }

                data.gate.spawn_sweeper(
                    Duration::from_secs(data.config.sweep_interval_secs.max(1)),
                    Duration::from_secs(data.config.stale_invocation_secs),
                );
                Ok(data)
            })
        })
        .build()
}
