use clank_dash::auth;
use clank_dash::session::{Route, Session};
use clank_dash::tasks;
use clank_dash::types::format_count;
use clank_dash::Config;
use std::env;

pub async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    let mut session = Session::connect(config).await?;
    session.restore().await?;

    let args: Vec<String> = env::args().skip(1).collect();
    let verb = args.first().map(String::as_str).unwrap_or("status");

    match verb {
        "login" => {
            let url = auth::begin_login(&mut session).await?;
            println!("Open this URL in your browser to authorize:");
            println!("{}", url);
        }
        "callback" => {
            let (code, state) = match (args.get(1), args.get(2)) {
                (Some(code), Some(state)) => (code.clone(), state.clone()),
                _ => return Err("Usage: clank-dash callback <code> <state>".into()),
            };
            auth::authenticate(&mut session, &code, &state).await?;
            if session.route == Route::Dashboard {
                auth::fetch_profile(&mut session).await?;
            }
            report(&session);
        }
        "guilds" => {
            session.get_guilds(false).await?;
            for guild in &session.servers {
                let members = guild
                    .approximate_member_count
                    .map(format_count)
                    .unwrap_or_else(|| "?".to_string());
                println!("{}  {} ({} members)", guild.id, guild.name, members);
            }
            report(&session);
        }
        "select" => {
            let guild_id = match args.get(1) {
                Some(id) => id.clone(),
                None => return Err("Usage: clank-dash select <guild_id>".into()),
            };
            session.get_guilds(false).await?;
            let guild = session
                .servers
                .iter()
                .find(|g| g.id == guild_id)
                .cloned()
                .ok_or("Unknown guild id; run `clank-dash guilds` first")?;
            session.select_guild(guild).await?;
            session.get_server_data(false).await?;
            report(&session);
        }
        "logout" => {
            auth::logout(&mut session).await?;
            println!("Logged out.");
        }
        "status" => {
            report(&session);
        }
        other => {
            return Err(format!(
                "Unknown command '{}'. Commands: login, callback, guilds, select, logout, status",
                other
            )
            .into());
        }
    }

    Ok(())
}

fn report(session: &Session) {
    if let Some(error) = &session.error {
        println!("Error: {} ({} / {})", error.reason, error.title_key, error.desc_key);
        return;
    }

    match &session.profile {
        Some(profile) => println!("Logged in as {}", profile.username),
        None => println!("Not logged in."),
    }
    match &session.active_guild {
        Some(guild) => {
            println!("Managing guild: {} ({})", guild.name, guild.id);
            println!(
                "Setup progress: {}/{}",
                tasks::completed_count(&session.tasks),
                tasks::total_count(&session.tasks)
            );
        }
        None => println!("No guild selected."),
    }
}
