use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

use workorder_server::user::{
    AuthTokenStore, PasswordCredentials, SqliteUserStore, User, UserCredentialsStore, UserStore,
};

use rustyline::{
    completion::Completer, highlight::Highlighter, history::FileHistory, validate::Validator,
    CompletionType, Config, Editor, Helper,
};

fn parse_path(s: &str) -> Result<PathBuf> {
    let original_path = PathBuf::from(s);
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the users SQLite database file.
    #[clap(value_parser = parse_path)]
    pub path: PathBuf,
}

#[derive(Parser)]
#[command(name = "")]
struct InnerCli {
    #[command(subcommand)]
    command: InnerCommand,
}

#[derive(Subcommand)]
enum InnerCommand {
    /// Creates a user with the given id, name, email and sector.
    AddUser {
        user_id: String,
        name: String,
        email: String,
        sector_id: String,
    },

    /// Sets (or replaces) the password of a user.
    SetPassword { user_id: String, password: String },

    /// Verifies the password of a given user. It doesn't make any
    /// persistent change, nor does it create any token, it just
    /// compares the password hash.
    CheckPassword { user_id: String, password: String },

    /// Shows a user record, their credentials and auth tokens.
    Show { user_id: String },

    /// Shows all users.
    Users,

    /// Adds a permission group to a user.
    AddGroup { user_id: String, group_id: String },

    /// Removes a permission group from a user.
    RemoveGroup { user_id: String, group_id: String },

    /// Marks a user as active.
    Activate { user_id: String },

    /// Marks a user as inactive. Their tokens stop working immediately.
    Deactivate { user_id: String },

    /// Deletes all auth tokens of a user, forcing a re-login.
    RevokeTokens { user_id: String },

    /// Shows the path of the current users db.
    Where,

    /// Close this program.
    Exit,
}

enum CommandExecutionResult {
    Ok,
    Exit,
    Error(String),
}

const PROMPT: &str = ">> ";

fn load_user(store: &SqliteUserStore, user_id: &str) -> Result<User, String> {
    match store.get_user(user_id) {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err(format!("User '{}' not found", user_id)),
        Err(e) => Err(format!("{}", e)),
    }
}

fn execute_command(
    line: String,
    store: &SqliteUserStore,
    db_path: String,
) -> CommandExecutionResult {
    if line.is_empty() {
        return CommandExecutionResult::Ok;
    }

    let args =
        shlex::split(&line).unwrap_or_else(|| line.split_whitespace().map(String::from).collect());

    let cli = InnerCli::try_parse_from(std::iter::once(" ").chain(args.iter().map(String::as_str)));

    match cli {
        Ok(cli) => {
            println!("{} {}", PROMPT, &line);
            match cli.command {
                InnerCommand::AddUser {
                    user_id,
                    name,
                    email,
                    sector_id,
                } => {
                    let user = User {
                        id: user_id,
                        name,
                        email,
                        sector_id,
                        group_ids: Vec::new(),
                        active: true,
                        avatar: None,
                        last_access: chrono::Utc::now(),
                    };
                    if let Err(err) = store.upsert_user(&user) {
                        return CommandExecutionResult::Error(format!("{}", err));
                    }
                    println!("User '{}' created", user.id);
                }
                InnerCommand::SetPassword { user_id, password } => {
                    if let Err(err) = load_user(store, &user_id) {
                        return CommandExecutionResult::Error(err);
                    }
                    let credentials =
                        match PasswordCredentials::from_plain_password(&user_id, &password) {
                            Ok(c) => c,
                            Err(err) => {
                                return CommandExecutionResult::Error(format!("{}", err));
                            }
                        };
                    if let Err(err) = store.update_user_credentials(credentials) {
                        return CommandExecutionResult::Error(format!("{}", err));
                    }
                    println!("Password set for user '{}'", user_id);
                }
                InnerCommand::CheckPassword { user_id, password } => {
                    let credentials = match store.get_user_credentials(&user_id) {
                        Ok(Some(c)) => c,
                        Ok(None) => {
                            return CommandExecutionResult::Error(format!(
                                "User '{}' has no password set",
                                user_id
                            ));
                        }
                        Err(err) => {
                            return CommandExecutionResult::Error(format!("{}", err));
                        }
                    };
                    let msg = if credentials.verify(&password) {
                        "The password provided is correct!"
                    } else {
                        "Wrong password."
                    };
                    println!("{}", msg);
                }
                InnerCommand::Show { user_id } => {
                    let user = match load_user(store, &user_id) {
                        Ok(u) => u,
                        Err(err) => return CommandExecutionResult::Error(err),
                    };
                    println!("User:");
                    println!("{:#?}", user);

                    match store.get_user_credentials(&user_id) {
                        Ok(credentials) => {
                            println!("\nCredentials:");
                            println!("{:#?}", credentials);
                        }
                        Err(err) => println!("\nFailed to get credentials: {}", err),
                    }

                    match store.get_all_auth_tokens(&user_id) {
                        Ok(tokens) => {
                            println!("\nAuth Tokens:");
                            if tokens.is_empty() {
                                println!("  (none)");
                            }
                            for token in tokens.iter() {
                                println!("{:#?}", token);
                            }
                        }
                        Err(err) => println!("\nFailed to get tokens: {}", err),
                    }
                }
                InnerCommand::Users => match store.fetch_all_users() {
                    Ok(users) => {
                        for user in users.iter() {
                            let active = if user.active { "active" } else { "inactive" };
                            println!(
                                "{}  {}  <{}>  sector={}  [{}]  {}",
                                user.id,
                                user.name,
                                user.email,
                                user.sector_id,
                                user.group_ids.join(", "),
                                active
                            );
                        }
                    }
                    Err(err) => {
                        return CommandExecutionResult::Error(format!("{}", err));
                    }
                },
                InnerCommand::AddGroup { user_id, group_id } => {
                    let mut user = match load_user(store, &user_id) {
                        Ok(u) => u,
                        Err(err) => return CommandExecutionResult::Error(err),
                    };
                    if user.is_in_group(&group_id) {
                        return CommandExecutionResult::Error(format!(
                            "User '{}' is already in group '{}'",
                            user_id, group_id
                        ));
                    }
                    user.group_ids.push(group_id.clone());
                    if let Err(err) = store.upsert_user(&user) {
                        return CommandExecutionResult::Error(format!("{}", err));
                    }
                    println!("Group '{}' added to user '{}'", group_id, user_id);
                }
                InnerCommand::RemoveGroup { user_id, group_id } => {
                    let mut user = match load_user(store, &user_id) {
                        Ok(u) => u,
                        Err(err) => return CommandExecutionResult::Error(err),
                    };
                    if !user.is_in_group(&group_id) {
                        return CommandExecutionResult::Error(format!(
                            "User '{}' is not in group '{}'",
                            user_id, group_id
                        ));
                    }
                    user.group_ids.retain(|g| g != &group_id);
                    if let Err(err) = store.upsert_user(&user) {
                        return CommandExecutionResult::Error(format!("{}", err));
                    }
                    println!("Group '{}' removed from user '{}'", group_id, user_id);
                }
                InnerCommand::Activate { user_id } => {
                    let mut user = match load_user(store, &user_id) {
                        Ok(u) => u,
                        Err(err) => return CommandExecutionResult::Error(err),
                    };
                    user.active = true;
                    if let Err(err) = store.upsert_user(&user) {
                        return CommandExecutionResult::Error(format!("{}", err));
                    }
                    println!("User '{}' is now active", user_id);
                }
                InnerCommand::Deactivate { user_id } => {
                    let mut user = match load_user(store, &user_id) {
                        Ok(u) => u,
                        Err(err) => return CommandExecutionResult::Error(err),
                    };
                    user.active = false;
                    if let Err(err) = store.upsert_user(&user) {
                        return CommandExecutionResult::Error(format!("{}", err));
                    }
                    println!("User '{}' is now inactive", user_id);
                }
                InnerCommand::RevokeTokens { user_id } => {
                    let tokens = match store.get_all_auth_tokens(&user_id) {
                        Ok(t) => t,
                        Err(err) => {
                            return CommandExecutionResult::Error(format!("{}", err));
                        }
                    };
                    let count = tokens.len();
                    for token in tokens {
                        if let Err(err) = store.delete_auth_token(&token.value) {
                            return CommandExecutionResult::Error(format!("{}", err));
                        }
                    }
                    println!("Revoked {} token(s) for user '{}'", count, user_id);
                }
                InnerCommand::Where => {
                    println!("{}", db_path);
                }
                InnerCommand::Exit => return CommandExecutionResult::Exit,
            }
        }

        Err(e) => {
            if e.print().is_err() {
                println!("{}", e);
            }
        }
    }
    CommandExecutionResult::Ok
}

#[derive(rustyline_derive::Hinter)]
struct MyHelper {
    commands_names: Vec<String>,
}

impl MyHelper {
    pub fn new() -> Self {
        let commands_names: Vec<String> = InnerCli::command()
            .get_subcommands()
            .map(|sc| sc.get_name().to_string())
            .collect();

        MyHelper { commands_names }
    }
}

impl Completer for MyHelper {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        _pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        if line.contains(" ") {
            return Ok((0, Vec::with_capacity(0)));
        }
        let matches = self
            .commands_names
            .iter()
            .filter(|c| c.starts_with(line))
            .map(|c| c.to_string())
            .collect::<Vec<_>>();

        Ok((0, matches))
    }
}

impl Highlighter for MyHelper {}
impl Validator for MyHelper {}
impl Helper for MyHelper {}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();
    let store = SqliteUserStore::new(&cli_args.path)?;

    InnerCli::command().print_long_help()?;

    let config = Config::builder()
        .completion_type(CompletionType::List)
        .build();

    let mut rl = Editor::<MyHelper, FileHistory>::with_config(config)?;

    let helper = MyHelper::new();
    rl.set_helper(Some(helper));
    let _ = rl.clear_screen();

    loop {
        let readline = rl.readline(PROMPT);

        let _ = rl.clear_screen();
        match readline {
            Ok(line) => {
                let _ = rl.add_history_entry(&line);
                match execute_command(line, &store, cli_args.path.display().to_string()) {
                    CommandExecutionResult::Ok => {}
                    CommandExecutionResult::Exit => {
                        break;
                    }
                    CommandExecutionResult::Error(err) => {
                        eprintln!("Error: {:?}", err);
                        continue;
                    }
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(rustyline::error::ReadlineError::Eof) => {
                println!("CTRL-D: exiting.");
                break;
            }
            Err(e) => {
                println!("Error: {:?}", e);
                break;
            }
        }
    }
    Ok(())
}
