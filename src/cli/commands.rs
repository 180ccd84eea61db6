use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::admin::AdminClient;
use crate::app::{AppContext, Result, Service};
use crate::cli::{AdminAction, OpmlAction};
use crate::config::{duration, Config};

/// Resolve the configuration path: the flag, or the per-user default.
pub fn config_path(flag: Option<PathBuf>) -> Result<PathBuf> {
    match flag {
        Some(path) => Ok(path),
        None => Ok(Config::default_config_path()?),
    }
}

pub async fn serve(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)?;
    tracing::info!(
        config = %config_path.display(),
        sync_interval = %duration::format(config.sync.interval),
        workers = config.sync.workers,
        "Loaded configuration"
    );

    let ctx = Arc::new(AppContext::open(&config)?);
    let service = Service::new(ctx, &config);
    service.run().await
}

pub async fn admin(config: Option<PathBuf>, socket: Option<PathBuf>, action: AdminAction) -> Result<()> {
    let socket = match socket {
        Some(socket) => socket,
        None => Config::read(&config_path(config)?)?.admin.socket_path,
    };
    let mut client = AdminClient::connect(&socket).await?;

    match action {
        AdminAction::NewUser { username, password } => {
            let user = client.new_user(&username, &password).await?;
            println!("Created user {} ({})", user.name, user.id);
        }
        AdminAction::DeleteUser { user_id } => {
            client.delete_user(&user_id).await?;
            println!("Deleted user {}", user_id);
        }
        AdminAction::Users { limit } => {
            let users = client.users(limit).await?;
            if users.is_empty() {
                println!("No users");
            }
            for user in users {
                println!("{}\t{}", user.id, user.name);
            }
        }
        AdminAction::RenameUser { user_id, new_name } => {
            client.rename_user(&user_id, &new_name).await?;
            println!("Renamed user {} to {}", user_id, new_name);
        }
        AdminAction::SetPassword { user_id, password } => {
            client.set_password(&user_id, &password).await?;
            println!("Changed password of {}", user_id);
        }
        AdminAction::UserId { username } => {
            println!("{}", client.user_id(&username).await?);
        }
    }

    Ok(())
}

/// OPML runs directly against the database, so it works with the service
/// stopped.
pub fn opml(config_path: &Path, action: OpmlAction) -> Result<()> {
    let config = Config::load(config_path)?;
    let ctx = AppContext::open(&config)?;

    match action {
        OpmlAction::Export { user, output } => {
            let user_id = ctx.users.id_of(&user)?;
            let document = ctx.opml.export_user(&user_id)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &document)?;
                    println!("Exported subscriptions of {} to {}", user, path.display());
                }
                None => std::io::stdout().write_all(&document)?,
            }
        }
        OpmlAction::Import { user, path } => {
            let user_id = ctx.users.id_of(&user)?;
            let content = std::fs::read(&path)?;
            let added = ctx.opml.import_user(&user_id, &content)?;
            println!("Imported {} feeds for {}", added, user);
        }
    }

    Ok(())
}

pub fn config_template() {
    print!("{}", Config::default_config_content());
}
