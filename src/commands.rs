use std::collections::HashMap;

use crate::agg;
use crate::config::Config;
use crate::db::{Database, User};
use crate::error::{Error, Result};
use crate::fetcher::Fetcher;

/// Everything a command handler may touch, built once at startup. The
/// current user lives in `config`, never in ambient global state.
pub struct State {
    pub db: Database,
    pub config: Config,
    pub fetcher: Fetcher,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Login,
    Register,
    Reset,
    Users,
    Agg,
    AddFeed,
    Feeds,
    Follow,
    Following,
    Unfollow,
    Browse,
}

impl Command {
    /// Commands that act as a user. The dispatcher resolves the current
    /// user before any of their handlers run.
    fn requires_auth(self) -> bool {
        matches!(
            self,
            Command::AddFeed
                | Command::Follow
                | Command::Following
                | Command::Unfollow
                | Command::Browse
        )
    }
}

pub struct Registry {
    commands: HashMap<&'static str, Command>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            commands: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: &'static str, command: Command) {
        self.commands.insert(name, command);
    }

    /// The full CLI surface.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("login", Command::Login);
        registry.register("register", Command::Register);
        registry.register("reset", Command::Reset);
        registry.register("users", Command::Users);
        registry.register("agg", Command::Agg);
        registry.register("addfeed", Command::AddFeed);
        registry.register("feeds", Command::Feeds);
        registry.register("follow", Command::Follow);
        registry.register("following", Command::Following);
        registry.register("unfollow", Command::Unfollow);
        registry.register("browse", Command::Browse);
        registry
    }

    pub async fn dispatch(&self, state: &mut State, name: &str, args: &[String]) -> Result<()> {
        let command = *self
            .commands
            .get(name)
            .ok_or_else(|| Error::UnknownCommand(name.to_string()))?;

        if command.requires_auth() {
            let user = current_user(state).await?;
            return match command {
                Command::AddFeed => add_feed(state, args, &user).await,
                Command::Follow => follow(state, args, &user).await,
                Command::Following => following(state, &user).await,
                Command::Unfollow => unfollow(state, args, &user).await,
                Command::Browse => browse(state, args, &user).await,
                _ => Err(Error::UnknownCommand(name.to_string())),
            };
        }

        match command {
            Command::Login => login(state, args).await,
            Command::Register => register(state, args).await,
            Command::Reset => reset(state).await,
            Command::Users => users(state).await,
            Command::Agg => run_agg(state, args).await,
            Command::Feeds => feeds(state).await,
            _ => Err(Error::UnknownCommand(name.to_string())),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// The authentication middleware step: resolve the configured current user
/// against the store. Handlers never see a partially-authenticated state.
async fn current_user(state: &State) -> Result<User> {
    let name = state
        .config
        .current_user_name
        .as_deref()
        .ok_or_else(|| Error::Authentication("no user is logged in".to_string()))?;

    state.db.get_user(name).await.map_err(|e| match e {
        Error::NotFound(_) => {
            Error::Authentication(format!("current user '{}' no longer exists", name))
        }
        other => other,
    })
}

async fn login(state: &mut State, args: &[String]) -> Result<()> {
    let name = args
        .first()
        .ok_or_else(|| Error::Validation("usage: login <name>".to_string()))?;
    state.db.get_user(name).await?;
    state.config.set_user(name)?;
    println!("current user is now '{}'", name);
    Ok(())
}

async fn register(state: &mut State, args: &[String]) -> Result<()> {
    let name = args
        .first()
        .ok_or_else(|| Error::Validation("usage: register <name>".to_string()))?;
    let user = state.db.create_user(name).await?;
    state.config.set_user(&user.name)?;
    println!("user '{}' registered", user.name);
    Ok(())
}

async fn reset(state: &mut State) -> Result<()> {
    state.db.reset().await?;
    println!("all users removed");
    Ok(())
}

async fn users(state: &mut State) -> Result<()> {
    let users = state.db.list_users().await?;
    for user in users {
        if state.config.current_user_name.as_deref() == Some(user.name.as_str()) {
            println!("{} (current)", user.name);
        } else {
            println!("{}", user.name);
        }
    }
    Ok(())
}

async fn run_agg(state: &mut State, args: &[String]) -> Result<()> {
    let raw = args
        .first()
        .ok_or_else(|| Error::Validation("usage: agg <interval>".to_string()))?;
    let interval = agg::parse_duration(raw)?;
    println!("collecting feeds every {}", raw);
    agg::run(&state.db, &state.fetcher, interval).await;
    Ok(())
}

async fn add_feed(state: &mut State, args: &[String], user: &User) -> Result<()> {
    let (Some(name), Some(url)) = (args.first(), args.get(1)) else {
        return Err(Error::Validation("usage: addfeed <name> <url>".to_string()));
    };
    let feed = state.db.create_feed(name, url, user.id).await?;
    state.db.create_feed_follow(user.id, feed.id).await?;
    println!("feed '{}' added and followed", feed.name);
    Ok(())
}

async fn feeds(state: &mut State) -> Result<()> {
    let feeds = state.db.list_feeds().await?;
    for feed in feeds {
        println!("'{}' by {}: {}", feed.name, feed.owner, feed.url);
    }
    Ok(())
}

async fn follow(state: &mut State, args: &[String], user: &User) -> Result<()> {
    let url = args
        .first()
        .ok_or_else(|| Error::Validation("usage: follow <url>".to_string()))?;
    let feed = state.db.get_feed_by_url(url).await?;
    state
        .db
        .create_feed_follow(user.id, feed.id)
        .await
        .map_err(|e| match e {
            Error::Conflict(_) => Error::Conflict(format!(
                "{} is already following '{}'",
                user.name, feed.name
            )),
            other => other,
        })?;
    println!("'{}' followed by {}", feed.name, user.name);
    Ok(())
}

async fn following(state: &mut State, user: &User) -> Result<()> {
    let names = state.db.follows_for_user(user.id).await?;
    for name in names {
        println!("{}", name);
    }
    Ok(())
}

async fn unfollow(state: &mut State, args: &[String], user: &User) -> Result<()> {
    let url = args
        .first()
        .ok_or_else(|| Error::Validation("usage: unfollow <url>".to_string()))?;
    let feed = state.db.get_feed_by_url(url).await?;
    state
        .db
        .delete_feed_follow(user.id, feed.id)
        .await
        .map_err(|e| match e {
            Error::NotFound(_) => {
                Error::NotFound(format!("{} is not following '{}'", user.name, feed.name))
            }
            other => other,
        })?;
    println!("'{}' unfollowed by {}", feed.name, user.name);
    Ok(())
}

const DEFAULT_BROWSE_LIMIT: i64 = 2;

fn browse_limit(args: &[String]) -> Result<i64> {
    let Some(raw) = args.first() else {
        return Ok(DEFAULT_BROWSE_LIMIT);
    };
    let limit: i64 = raw
        .parse()
        .map_err(|_| Error::Validation(format!("invalid limit '{}'", raw)))?;
    // SQLite reads a negative LIMIT as "no limit", so keep those out.
    if limit <= 0 {
        return Err(Error::Validation(format!(
            "limit must be positive, got '{}'",
            raw
        )));
    }
    Ok(limit)
}

async fn browse(state: &mut State, args: &[String], user: &User) -> Result<()> {
    let limit = browse_limit(args)?;
    let posts = state.db.posts_for_user(user.id, limit).await?;
    for post in posts {
        println!("{}\n  {}\n", post.title, post.description);
    }
    Ok(())
}
